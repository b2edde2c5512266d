//! Query Service: embeds a query, ranks it against a loaded corpus, and shapes
//! the results the CLI and HTTP shells present.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use skillbridge_core::{
    match_score, rank_top_k, CandidateRecord, CorpusArtifact, DimensionMismatch, JobRecord,
    SkillVocabulary, SourceType, TrainingRecord,
};
use skillbridge_embed::{
    load_encoder, EmbedError, EncoderKind, SharedEncoder, DEFAULT_HASHING_DIMENSION,
};
use skillbridge_storage::ArtifactStore;
use thiserror::Error;
use tracing::{debug, info};

pub mod corpus;
pub mod extract;

pub use corpus::{ServingCorpus, StartupError};
pub use extract::{collapse_whitespace, DocumentExtractor, ExtractionError, TextExtractor};

pub const CRATE_NAME: &str = "skillbridge-query";

pub const DEFAULT_JOB_K: usize = 10;
pub const DEFAULT_TRAINING_K: usize = 3;
pub const DEFAULT_FEED_LIMIT: usize = 20;
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(10);
pub const RESUME_PREVIEW_CHARS: usize = 200;
/// Shown instead of skills for jobs whose source has no skills column.
pub const SEE_DESCRIPTION: &str = "See Description";

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub models_dir: PathBuf,
    pub encoder: EncoderKind,
    pub hashing_dimension: usize,
    pub embed_timeout: Duration,
    pub port: u16,
}

impl ServeConfig {
    pub fn from_env() -> Result<Self> {
        let models_dir = match std::env::var("SKILLBRIDGE_MODELS_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::var("SKILLBRIDGE_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("models"),
        };
        let encoder = match std::env::var("SKILLBRIDGE_ENCODER") {
            Ok(v) => v
                .parse::<EncoderKind>()
                .context("SKILLBRIDGE_ENCODER must be `hashing` or `fastembed`")?,
            Err(_) => EncoderKind::default(),
        };
        let hashing_dimension = match std::env::var("SKILLBRIDGE_HASHING_DIM") {
            Ok(v) => v.parse().context("SKILLBRIDGE_HASHING_DIM must be a positive integer")?,
            Err(_) => DEFAULT_HASHING_DIMENSION,
        };
        let embed_timeout = match std::env::var("SKILLBRIDGE_EMBED_TIMEOUT_MS") {
            Ok(v) => Duration::from_millis(
                v.parse().context("SKILLBRIDGE_EMBED_TIMEOUT_MS must be milliseconds")?,
            ),
            Err(_) => DEFAULT_EMBED_TIMEOUT,
        };
        let port = std::env::var("SKILLBRIDGE_WEB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);
        Ok(Self {
            models_dir,
            encoder,
            hashing_dimension,
            embed_timeout,
            port,
        })
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("embedding the query took longer than {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),
    #[error("embedding task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// A ranked corpus row.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<R> {
    pub index: usize,
    pub record: R,
    /// Raw cosine similarity.
    pub score: f32,
}

impl<R> Hit<R> {
    pub fn match_score(&self) -> f64 {
        match_score(self.score)
    }
}

pub type JobHit = Hit<JobRecord>;
pub type TrainingHit = Hit<TrainingRecord>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub match_score: f64,
    pub source_type: SourceType,
}

impl From<&JobHit> for JobSummary {
    fn from(hit: &JobHit) -> Self {
        Self {
            job_id: hit.record.unified_id.clone(),
            title: hit.record.unified_title.clone(),
            company: hit.record.display_company().to_string(),
            match_score: hit.match_score(),
            source_type: hit.record.source_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub module_id: String,
    pub title: String,
    pub description: String,
    pub skills_covered: String,
    pub match_score: f64,
}

impl From<&TrainingHit> for TrainingSummary {
    fn from(hit: &TrainingHit) -> Self {
        Self {
            module_id: hit.record.module_id.clone(),
            title: hit.record.title.clone(),
            description: hit.record.description.clone(),
            skills_covered: hit.record.skills_covered.clone(),
            match_score: hit.match_score(),
        }
    }
}

/// A job as listed in the feed, before any query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedJob {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub source_type: SourceType,
    pub required_skills: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub candidate_id: String,
    pub first_name: String,
    pub email: String,
    pub skills: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumeMatch {
    pub hits: Vec<JobHit>,
    pub extracted_text_preview: String,
    pub extracted_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub candidates: usize,
    pub jobs: usize,
    pub trainings: usize,
    pub encoder_id: String,
    pub dimension: usize,
}

#[derive(Clone)]
pub struct QueryService {
    encoder: SharedEncoder,
    corpus: Arc<ServingCorpus>,
    vocabulary: Arc<SkillVocabulary>,
    extractor: Arc<dyn TextExtractor>,
    embed_timeout: Duration,
}

impl QueryService {
    pub fn new(encoder: SharedEncoder, corpus: ServingCorpus) -> Self {
        let vocabulary = SkillVocabulary::from_fields(
            corpus
                .jobs
                .records()
                .iter()
                .filter(|job| job.source_type == SourceType::Premium)
                .map(|job| job.unified_skills.as_str()),
        );
        debug!(skills = vocabulary.len(), "skill vocabulary built");
        Self {
            encoder,
            corpus: Arc::new(corpus),
            vocabulary: Arc::new(vocabulary),
            extractor: Arc::new(DocumentExtractor),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    /// Loads the configured encoder and the three artifacts it must have built.
    pub async fn start(config: &ServeConfig) -> Result<Self, StartupError> {
        let encoder = load_encoder(config.encoder, config.hashing_dimension)?;
        let store = ArtifactStore::new(&config.models_dir);
        let corpus = ServingCorpus::load(&store, encoder.model_id()).await?;
        info!(encoder = encoder.model_id(), dimension = corpus.dimension(), "query service ready");
        Ok(Self::new(encoder, corpus).with_embed_timeout(config.embed_timeout))
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn corpus(&self) -> &ServingCorpus {
        &self.corpus
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            candidates: self.corpus.candidates.len(),
            jobs: self.corpus.jobs.len(),
            trainings: self.corpus.trainings.len(),
            encoder_id: self.corpus.encoder_id().to_string(),
            dimension: self.corpus.dimension(),
        }
    }

    /// Top `k` jobs for free text. Blank text yields no results.
    pub async fn search_jobs(&self, query_text: &str, k: usize) -> Result<Vec<JobHit>, QueryError> {
        self.search(&self.corpus.jobs, query_text, k).await
    }

    /// Top `k` training modules for a topic. Blank text yields no results.
    pub async fn search_trainings(
        &self,
        topic_text: &str,
        k: usize,
    ) -> Result<Vec<TrainingHit>, QueryError> {
        self.search(&self.corpus.trainings, topic_text, k).await
    }

    /// Ranks jobs against already-extracted resume text.
    pub async fn match_resume(
        &self,
        resume_text: &str,
        k: usize,
    ) -> Result<ResumeMatch, QueryError> {
        let hits = self.search_jobs(resume_text, k).await?;
        let preview: String = resume_text.chars().take(RESUME_PREVIEW_CHARS).collect();
        Ok(ResumeMatch {
            hits,
            extracted_text_preview: format!("{preview}..."),
            extracted_skills: self.vocabulary.extract(resume_text),
        })
    }

    /// Extracts text from an uploaded document, then matches it like [`Self::match_resume`].
    pub async fn match_resume_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        k: usize,
    ) -> Result<ResumeMatch, ResumeError> {
        let extractor = self.extractor.clone();
        let name = file_name.to_string();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&name, &bytes))
            .await
            .map_err(|err| ExtractionError::Unreadable {
                file_name: file_name.to_string(),
                reason: err.to_string(),
            })??;
        Ok(self.match_resume(&text, k).await?)
    }

    /// First `limit` jobs in corpus order.
    pub fn list_jobs(&self, limit: usize) -> Vec<FeedJob> {
        self.corpus
            .jobs
            .records()
            .iter()
            .take(limit)
            .map(|job| FeedJob {
                job_id: job.unified_id.clone(),
                title: job.unified_title.clone(),
                company: job.display_company().to_string(),
                source_type: job.source_type,
                required_skills: match job.source_type {
                    SourceType::Premium => job.unified_skills.clone(),
                    SourceType::General => SEE_DESCRIPTION.to_string(),
                },
            })
            .collect()
    }

    pub fn list_candidates(&self) -> Vec<CandidateSummary> {
        self.corpus
            .candidates
            .records()
            .iter()
            .map(|c: &CandidateRecord| CandidateSummary {
                candidate_id: c.candidate_id.clone(),
                first_name: c.first_name.clone(),
                email: c.email.clone(),
                skills: c.skills.clone(),
            })
            .collect()
    }

    async fn search<R: Clone>(
        &self,
        artifact: &CorpusArtifact<R>,
        text: &str,
        k: usize,
    ) -> Result<Vec<Hit<R>>, QueryError> {
        if text.trim().is_empty() || k == 0 || artifact.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embed_query(text).await?;
        let ranked = rank_top_k(&query, artifact.embeddings(), k)?;
        Ok(ranked
            .into_iter()
            .filter_map(|scored| {
                artifact.records().get(scored.index).map(|record| Hit {
                    index: scored.index,
                    record: record.clone(),
                    score: scored.score,
                })
            })
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QueryError> {
        let encoder = self.encoder.clone();
        let text = text.to_string();
        let task = tokio::task::spawn_blocking(move || encoder.encode_one(&text));
        match tokio::time::timeout(self.embed_timeout, task).await {
            Err(_) => Err(QueryError::Timeout(self.embed_timeout)),
            Ok(Err(join)) => Err(QueryError::Task(join.to_string())),
            Ok(Ok(vector)) => Ok(vector?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_core::EmbeddingMatrix;
    use skillbridge_embed::{HashingEncoder, TextEncoder};
    use std::collections::HashMap;

    /// Returns preset vectors for known texts and zeros otherwise.
    struct FixedEncoder {
        dimension: usize,
        vectors: HashMap<String, Vec<f32>>,
    }

    impl FixedEncoder {
        fn new(dimension: usize, entries: Vec<(&str, Vec<f32>)>) -> Self {
            Self {
                dimension,
                vectors: entries.into_iter().map(|(t, v)| (t.to_string(), v)).collect(),
            }
        }
    }

    impl TextEncoder for FixedEncoder {
        fn model_id(&self) -> &str {
            "fixed-test"
        }

        fn encode(&self, texts: &[String]) -> Result<EmbeddingMatrix, EmbedError> {
            let rows = texts
                .iter()
                .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| vec![0.0; self.dimension]))
                .collect();
            Ok(EmbeddingMatrix::from_rows(rows)?)
        }
    }

    struct SlowEncoder;

    impl TextEncoder for SlowEncoder {
        fn model_id(&self) -> &str {
            "slow-test"
        }

        fn encode(&self, texts: &[String]) -> Result<EmbeddingMatrix, EmbedError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(EmbeddingMatrix::from_rows(texts.iter().map(|_| vec![1.0, 0.0]).collect())?)
        }
    }

    fn job(id: &str, title: &str, skills: &str, source_type: SourceType) -> JobRecord {
        JobRecord {
            unified_id: id.to_string(),
            unified_title: title.to_string(),
            unified_company: None,
            unified_skills: skills.to_string(),
            text_for_emb: format!("{title} {skills}").trim().to_string(),
            source_type,
        }
    }

    fn three_job_corpus() -> ServingCorpus {
        let jobs = vec![
            job("J0", "Accountant", "Excel; Auditing", SourceType::Premium),
            job("J1", "Data Analyst", "SQL; Python", SourceType::Premium),
            job("RAW-7", "Data Scientist", "", SourceType::General),
        ];
        let embeddings = EmbeddingMatrix::from_rows(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.6, 0.8, 0.0],
            vec![0.0, 1.0, 0.0],
        ])
        .unwrap();
        let trainings = vec![
            TrainingRecord::new(
                "T1".into(),
                "Python Basics".into(),
                "Intro".into(),
                "Python".into(),
            ),
            TrainingRecord::new(
                "T2".into(),
                "Audit 101".into(),
                "Ledgers".into(),
                "Auditing".into(),
            ),
        ];
        let training_embeddings =
            EmbeddingMatrix::from_rows(vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]]).unwrap();
        let candidates = vec![CandidateRecord::new(
            "C1".into(),
            "Ada".into(),
            "ada@example.com".into(),
            "Python".into(),
            "Analyst".into(),
        )];
        let candidate_embeddings = EmbeddingMatrix::from_rows(vec![vec![0.0, 0.0, 1.0]]).unwrap();
        ServingCorpus::new(
            CorpusArtifact::new(candidates, candidate_embeddings).unwrap(),
            CorpusArtifact::new(jobs, embeddings).unwrap(),
            CorpusArtifact::new(trainings, training_embeddings).unwrap(),
            "fixed-test",
        )
    }

    fn service() -> QueryService {
        let encoder = FixedEncoder::new(
            3,
            vec![
                ("statistics and python", vec![0.1, 1.0, 0.0]),
                ("learn python", vec![0.0, 1.0, 0.0]),
            ],
        );
        QueryService::new(Arc::new(encoder), three_job_corpus())
    }

    #[tokio::test]
    async fn closest_job_ranks_first_then_the_runner_up() {
        let hits = service().search_jobs("statistics and python", 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.record.unified_id.as_str()).collect();
        assert_eq!(ids, vec!["RAW-7", "J1"]);
        assert!(hits[0].score > hits[1].score);
        for hit in &hits {
            assert!((0.0..=100.0).contains(&hit.match_score()));
        }
        assert_eq!(hits[0].match_score(), 99.5);
    }

    #[tokio::test]
    async fn blank_queries_return_nothing() {
        let svc = service();
        assert!(svc.search_jobs("", 5).await.unwrap().is_empty());
        assert!(svc.search_jobs("  \n\t", 5).await.unwrap().is_empty());
        assert!(svc.search_trainings(" ", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn k_beyond_corpus_returns_every_row() {
        let hits = service().search_jobs("statistics and python", 50).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn training_search_uses_the_training_corpus() {
        let hits = service().search_trainings("learn python", 3).await.unwrap();
        assert_eq!(hits[0].record.module_id, "T1");
        assert_eq!(hits[0].match_score(), 100.0);
        assert_eq!(TrainingSummary::from(&hits[0]).title, "Python Basics");
    }

    #[tokio::test]
    async fn dimension_mismatch_surfaces_as_an_error() {
        let svc = QueryService::new(Arc::new(HashingEncoder::new(8)), three_job_corpus());
        let err = svc.search_jobs("anything", 2).await.unwrap_err();
        assert!(matches!(err, QueryError::Dimension(DimensionMismatch { query: 8, corpus: 3 })));
    }

    #[tokio::test]
    async fn slow_embedding_times_out() {
        let svc = QueryService::new(Arc::new(SlowEncoder), three_job_corpus())
            .with_embed_timeout(Duration::from_millis(20));
        let err = svc.search_jobs("anything", 2).await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
    }

    #[tokio::test]
    async fn resume_match_reports_preview_and_known_skills() {
        let text = "Experienced analyst fluent in SQL and python. ".repeat(10);
        let result = service().match_resume(&text, 10).await.unwrap();
        assert_eq!(result.extracted_text_preview.chars().count(), RESUME_PREVIEW_CHARS + 3);
        assert!(result.extracted_text_preview.ends_with("..."));
        assert_eq!(result.extracted_skills, vec!["sql".to_string(), "python".to_string()]);
        assert_eq!(result.hits.len(), 3);
    }

    #[tokio::test]
    async fn unreadable_uploads_are_extraction_errors() {
        let svc = service();
        let err = svc
            .match_resume_file("cv.odt", b"PK".to_vec(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ResumeError::Extraction(ExtractionError::UnsupportedFormat(_))));
        let ok = svc
            .match_resume_file("cv.txt", b"SQL expert".to_vec(), 10)
            .await
            .unwrap();
        assert_eq!(ok.extracted_skills, vec!["sql".to_string()]);
    }

    #[test]
    fn feed_lists_premium_skills_and_general_placeholder() {
        let feed = service().list_jobs(DEFAULT_FEED_LIMIT);
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].required_skills, "Excel; Auditing");
        assert_eq!(feed[0].company, skillbridge_core::CONFIDENTIAL_COMPANY);
        assert_eq!(feed[2].required_skills, SEE_DESCRIPTION);
        assert_eq!(service().list_jobs(1).len(), 1);
    }

    #[test]
    fn candidates_and_stats_reflect_the_corpus() {
        let svc = service();
        let candidates = svc.list_candidates();
        assert_eq!(candidates[0].email, "ada@example.com");
        let stats = svc.stats();
        assert_eq!((stats.candidates, stats.jobs, stats.trainings, stats.dimension), (1, 3, 2, 3));
    }
}
