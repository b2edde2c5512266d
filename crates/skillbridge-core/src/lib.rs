//! Core domain model for SkillBridge: unified records, embedding matrices and ranking.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod matrix;
pub mod similarity;
pub mod skills;

pub use matrix::{CorpusArtifact, EmbeddingMatrix, IntegrityError, MatrixError};
pub use similarity::{cosine_similarity, rank_top_k, DimensionMismatch, ScoredIndex};
pub use skills::SkillVocabulary;

pub const CRATE_NAME: &str = "skillbridge-core";

/// Company shown when a job carries no company at all.
pub const CONFIDENTIAL_COMPANY: &str = "Confidential";

/// Which side of the job corpus a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Structured, curated sources with explicit skill fields.
    Premium,
    /// The bulk, loosely structured source.
    General,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Premium => "Premium",
            SourceType::General => "General",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three entity tables that get an artifact of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorpusKind {
    Candidates,
    Jobs,
    Trainings,
}

impl CorpusKind {
    pub const ALL: [CorpusKind; 3] =
        [CorpusKind::Candidates, CorpusKind::Jobs, CorpusKind::Trainings];

    pub fn as_str(&self) -> &'static str {
        match self {
            CorpusKind::Candidates => "candidates",
            CorpusKind::Jobs => "jobs",
            CorpusKind::Trainings => "trainings",
        }
    }
}

impl fmt::Display for CorpusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that can be embedded and stored in a corpus artifact.
pub trait CorpusRecord {
    const KIND: CorpusKind;

    /// Text fed to the embedding model for this row.
    fn text_for_emb(&self) -> &str;
}

/// Unified job posting, regardless of which source produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub unified_id: String,
    pub unified_title: String,
    pub unified_company: Option<String>,
    /// Empty when the source has no structured skills field.
    pub unified_skills: String,
    pub text_for_emb: String,
    pub source_type: SourceType,
}

impl JobRecord {
    pub fn display_company(&self) -> &str {
        self.unified_company
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(CONFIDENTIAL_COMPANY)
    }
}

impl CorpusRecord for JobRecord {
    const KIND: CorpusKind = CorpusKind::Jobs;

    fn text_for_emb(&self) -> &str {
        &self.text_for_emb
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candidate_id: String,
    pub first_name: String,
    pub email: String,
    pub skills: String,
    pub summary: String,
    pub text_for_emb: String,
}

impl CandidateRecord {
    pub fn new(
        candidate_id: String,
        first_name: String,
        email: String,
        skills: String,
        summary: String,
    ) -> Self {
        let text_for_emb = join_text_fields([summary.as_str(), skills.as_str()]);
        Self {
            candidate_id,
            first_name,
            email,
            skills,
            summary,
            text_for_emb,
        }
    }
}

impl CorpusRecord for CandidateRecord {
    const KIND: CorpusKind = CorpusKind::Candidates;

    fn text_for_emb(&self) -> &str {
        &self.text_for_emb
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub module_id: String,
    pub title: String,
    pub description: String,
    pub skills_covered: String,
    pub text_for_emb: String,
}

impl TrainingRecord {
    pub fn new(
        module_id: String,
        title: String,
        description: String,
        skills_covered: String,
    ) -> Self {
        let text_for_emb = join_text_fields([title.as_str(), description.as_str()]);
        Self {
            module_id,
            title,
            description,
            skills_covered,
            text_for_emb,
        }
    }
}

impl CorpusRecord for TrainingRecord {
    const KIND: CorpusKind = CorpusKind::Trainings;

    fn text_for_emb(&self) -> &str {
        &self.text_for_emb
    }
}

/// Joins descriptive fields with single spaces, skipping missing or blank ones.
pub fn join_text_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    fields
        .into_iter()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Raw cosine similarity rendered as the 0-100, one-decimal score clients display.
pub fn match_score(similarity: f32) -> f64 {
    let clamped = f64::from(similarity).clamp(0.0, 1.0);
    (clamped * 1000.0).round() / 10.0
}
