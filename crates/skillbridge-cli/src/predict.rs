//! Interactive search loop.

use std::io::Write;

use anyhow::Result;
use skillbridge_query::QueryService;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::display::{job_hit_block, rule, training_hit_block};

pub const PREDICT_JOB_K: usize = 5;
pub const PREDICT_TRAINING_K: usize = 3;

pub async fn run_predict<R, W>(service: &QueryService, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "SKILLBRIDGE UNIFIED PREDICTOR")?;
    writeln!(out, "   Loaded {} jobs.", service.corpus().jobs.len())?;
    writeln!(out, "{}", "=".repeat(60))?;

    loop {
        writeln!(out, "\nOptions:")?;
        writeln!(
            out,
            " [1] Search Jobs by Skill/Description (e.g., 'python developer in jakarta')"
        )?;
        writeln!(out, " [2] Find Training for a Skill (e.g., 'learn plc programming')")?;
        writeln!(out, " [q] Quit")?;
        write!(out, "\nSelect: ")?;
        out.flush()?;

        let Some(choice) = lines.next_line().await? else {
            break;
        };
        match choice.trim().to_lowercase().as_str() {
            "q" => break,
            "1" => {
                write!(out, "Enter Job Search Query: ")?;
                out.flush()?;
                let Some(query) = lines.next_line().await? else {
                    break;
                };
                let query = query.trim();
                if query.is_empty() {
                    continue;
                }
                match service.search_jobs(query, PREDICT_JOB_K).await {
                    Ok(hits) => {
                        writeln!(out, "\nTop {PREDICT_JOB_K} Job Recommendations:")?;
                        writeln!(out, "{}", rule())?;
                        for hit in &hits {
                            writeln!(out, "{}", job_hit_block(hit))?;
                            writeln!(out, "{}", rule())?;
                        }
                    }
                    Err(err) => writeln!(out, "search failed: {err}")?,
                }
            }
            "2" => {
                write!(out, "Enter Training Topic: ")?;
                out.flush()?;
                let Some(topic) = lines.next_line().await? else {
                    break;
                };
                let topic = topic.trim();
                if topic.is_empty() {
                    continue;
                }
                match service.search_trainings(topic, PREDICT_TRAINING_K).await {
                    Ok(hits) => {
                        writeln!(out, "\nRecommended Training Modules:")?;
                        writeln!(out, "{}", rule())?;
                        for hit in &hits {
                            writeln!(out, "{}", training_hit_block(hit))?;
                        }
                        writeln!(out, "{}", rule())?;
                    }
                    Err(err) => writeln!(out, "search failed: {err}")?,
                }
            }
            _ => writeln!(out, "Unknown option.")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_core::{CorpusArtifact, CorpusRecord, JobRecord, SourceType, TrainingRecord};
    use skillbridge_embed::{HashingEncoder, TextEncoder};
    use skillbridge_query::ServingCorpus;
    use std::sync::Arc;

    fn embed<R: CorpusRecord>(encoder: &HashingEncoder, records: Vec<R>) -> CorpusArtifact<R> {
        let texts: Vec<String> = records.iter().map(|r| r.text_for_emb().to_string()).collect();
        CorpusArtifact::new(records, encoder.encode(&texts).unwrap()).unwrap()
    }

    fn service() -> QueryService {
        let encoder = HashingEncoder::new(256);
        let jobs = vec![
            JobRecord {
                unified_id: "1".into(),
                unified_title: "Rust Engineer".into(),
                unified_company: Some("Tech/IT Sector".into()),
                unified_skills: "Rust; Tokio".into(),
                text_for_emb: "Rust Engineer rust tokio".into(),
                source_type: SourceType::Premium,
            },
            JobRecord {
                unified_id: "RAW-2".into(),
                unified_title: "Cashier".into(),
                unified_company: Some("Retail".into()),
                unified_skills: String::new(),
                text_for_emb: "Cashier retail store payments".into(),
                source_type: SourceType::General,
            },
        ];
        let trainings = vec![TrainingRecord::new(
            "T1".into(),
            "Async Rust".into(),
            "Futures and tokio".into(),
            "Rust".into(),
        )];
        let corpus = ServingCorpus::new(
            CorpusArtifact::empty(),
            embed(&encoder, jobs),
            embed(&encoder, trainings),
            encoder.model_id(),
        );
        QueryService::new(Arc::new(encoder), corpus)
    }

    #[tokio::test]
    async fn session_runs_both_searches_and_quits() {
        let input: &[u8] = b"1\nrust tokio\n2\nasync rust\n\nx\nq\n";
        let mut out = Vec::new();
        run_predict(&service(), input, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Loaded 2 jobs."));
        assert!(text.contains("Top 5 Job Recommendations:"));
        let first_job = text.find("[PREMIUM] Match:").unwrap();
        let second_job = text.find("[GENERAL] Match:").unwrap();
        assert!(first_job < second_job);
        assert!(text.contains("   Skills:  Rust; Tokio"));
        assert!(text.contains("Recommended Training Modules:"));
        assert!(text.contains("% Async Rust\n       Futures and tokio"));
        assert!(text.contains("Unknown option."));
    }

    #[tokio::test]
    async fn end_of_input_ends_the_session() {
        let input: &[u8] = b"1\n";
        let mut out = Vec::new();
        run_predict(&service(), input, &mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("Enter Job Search Query: "));
    }
}
