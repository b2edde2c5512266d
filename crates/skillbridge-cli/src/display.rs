//! Plain-text rendering of ranked results for the terminal.

use skillbridge_core::SourceType;
use skillbridge_query::{JobHit, TrainingHit};

const SKILLS_PREVIEW_CHARS: usize = 90;
const EXCERPT_CHARS: usize = 100;

pub const RULE_WIDTH: usize = 70;

pub fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    (head, chars.next().is_some())
}

pub fn job_hit_block(hit: &JobHit) -> String {
    let job = &hit.record;
    let badge = match job.source_type {
        SourceType::Premium => "PREMIUM",
        SourceType::General => "GENERAL",
    };
    let detail = match job.source_type {
        SourceType::Premium => {
            let (skills, truncated) = truncate_chars(&job.unified_skills, SKILLS_PREVIEW_CHARS);
            if truncated {
                format!("   Skills:  {skills}...")
            } else {
                format!("   Skills:  {skills}")
            }
        }
        SourceType::General => {
            let (excerpt, _) = truncate_chars(&job.text_for_emb, EXCERPT_CHARS);
            format!("   Excerpt: {}...", excerpt.replace('\n', " "))
        }
    };
    format!(
        "[{badge}] Match: {:.1}%\n   Title:   {}\n   Company: {}\n{detail}",
        hit.match_score(),
        job.unified_title,
        job.display_company(),
    )
}

pub fn training_hit_block(hit: &TrainingHit) -> String {
    format!(
        "[{:.1}%] {}\n       {}",
        hit.match_score(),
        hit.record.title,
        hit.record.description
    )
}
