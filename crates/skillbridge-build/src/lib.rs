//! Offline build: unify sources, embed every table, and snapshot the three artifacts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillbridge_adapters::{
    build_job_corpus, load_candidates, load_trainings, AdapterError, JobSourceSpec, LoadedTable,
    SourceKind, SourceOutcome,
};
use skillbridge_core::{CorpusArtifact, CorpusRecord};
use skillbridge_embed::{
    encode_batched, load_encoder, EncoderKind, SharedEncoder, DEFAULT_BATCH_SIZE,
    DEFAULT_HASHING_DIMENSION,
};
use skillbridge_storage::ArtifactStore;
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "skillbridge-build";

pub const REPORT_FILE: &str = "build_report.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub jobs: Vec<JobSourceSpec>,
    #[serde(default)]
    pub candidates: Option<PathBuf>,
    #[serde(default)]
    pub trainings: Option<PathBuf>,
}

impl SourceRegistry {
    /// Layout used when no `sources.yaml` exists.
    pub fn default_layout() -> Self {
        let job = |source_id: &str, kind, path: &str, delimiter| JobSourceSpec {
            source_id: source_id.to_string(),
            kind,
            path: PathBuf::from(path),
            enabled: true,
            row_limit: None,
            delimiter,
        };
        Self {
            jobs: vec![
                job("job-dataset-csv", SourceKind::PremiumCsv, "data/job_dataset.csv", None),
                job("job-dataset-json", SourceKind::PremiumJson, "data/job_dataset.json", None),
                job("all-jobs", SourceKind::BulkCsv, "data/all.csv", Some('|')),
            ],
            candidates: Some(PathBuf::from("data/candidates.csv")),
            trainings: Some(PathBuf::from("data/trainings.csv")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub workspace_root: PathBuf,
    pub models_dir: PathBuf,
    pub encoder: EncoderKind,
    pub hashing_dimension: usize,
    /// Overrides `row_limit` on every bulk source when set.
    pub bulk_row_limit: Option<usize>,
}

impl BuildConfig {
    pub fn from_env() -> Result<Self> {
        let workspace_root = std::env::var("SKILLBRIDGE_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let models_dir = std::env::var("SKILLBRIDGE_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| workspace_root.join("models"));
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
        let bulk_row_limit = match std::env::var("SKILLBRIDGE_BULK_ROW_LIMIT") {
            Ok(v) => Some(v.parse().context("SKILLBRIDGE_BULK_ROW_LIMIT must be an integer")?),
            Err(_) => None,
        };
        Ok(Self {
            workspace_root,
            models_dir,
            encoder,
            hashing_dimension,
            bulk_row_limit,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredSummary {
    pub kind: String,
    pub path: String,
    pub rows: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub encoder_id: String,
    pub dimension: usize,
    pub candidates: usize,
    pub jobs: usize,
    pub trainings: usize,
    pub job_sources: Vec<SourceOutcome>,
    /// Optional inputs that were absent or unreadable; the build degraded around them.
    pub missing_inputs: Vec<String>,
    pub artifacts: Vec<StoredSummary>,
    pub report_path: String,
}

pub struct BuildPipeline {
    config: BuildConfig,
    store: ArtifactStore,
    encoder: SharedEncoder,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig) -> Result<Self> {
        let encoder = load_encoder(config.encoder, config.hashing_dimension)
            .context("loading text encoder")?;
        Ok(Self::with_encoder(config, encoder))
    }

    pub fn with_encoder(config: BuildConfig, encoder: SharedEncoder) -> Self {
        let store = ArtifactStore::new(config.models_dir.clone());
        Self { config, store, encoder }
    }

    pub async fn run_once(&self) -> Result<BuildSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("build", %run_id, encoder = self.encoder.model_id());
        self.run(run_id).instrument(span).await
    }

    async fn run(&self, run_id: Uuid) -> Result<BuildSummary> {
        let started_at = Utc::now();
        let root = self.config.workspace_root.clone();
        let registry = self.load_source_registry().await?;
        let mut missing_inputs = Vec::new();

        let candidates = load_optional_table(
            &root,
            registry.candidates.as_deref(),
            load_candidates,
            &mut missing_inputs,
        );
        let trainings = load_optional_table(
            &root,
            registry.trainings.as_deref(),
            load_trainings,
            &mut missing_inputs,
        );
        let job_specs = self.effective_job_specs(registry.jobs);
        let unified = build_job_corpus(&job_specs, &root);
        for outcome in &unified.outcomes {
            if let SourceOutcome::Failed { source_id, error } = outcome {
                missing_inputs.push(format!("jobs/{source_id}: {error}"));
            }
        }
        if unified.records.is_empty() {
            warn!("job corpus is empty; searches will return no results");
        }

        let candidates = self.embed_corpus(candidates).await?;
        let trainings = self.embed_corpus(trainings).await?;
        let jobs = self.embed_corpus(unified.records).await?;

        // Nothing is written until all three tables are embedded. All three
        // carry the run id; serving refuses a mixed set.
        let encoder_id = self.encoder.model_id().to_string();
        let stored = vec![
            self.store.save(&candidates, &encoder_id, run_id).await?,
            self.store.save(&jobs, &encoder_id, run_id).await?,
            self.store.save(&trainings, &encoder_id, run_id).await?,
        ];
        let artifacts = stored
            .iter()
            .map(|s| StoredSummary {
                kind: s.header.kind.to_string(),
                path: s.path.display().to_string(),
                rows: s.header.row_count,
                sha256: s.content_hash.clone(),
            })
            .collect();

        let dimension = [jobs.embeddings(), candidates.embeddings(), trainings.embeddings()]
            .iter()
            .map(|m| m.dimension())
            .max()
            .unwrap_or(0);
        let report_path = self.config.models_dir.join(REPORT_FILE);
        let summary = BuildSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            encoder_id,
            dimension,
            candidates: candidates.len(),
            jobs: jobs.len(),
            trainings: trainings.len(),
            job_sources: unified.outcomes,
            missing_inputs,
            artifacts,
            report_path: report_path.display().to_string(),
        };
        self.write_report(&report_path, &summary).await?;
        info!(
            candidates = summary.candidates,
            jobs = summary.jobs,
            trainings = summary.trainings,
            "build complete"
        );
        Ok(summary)
    }

    fn effective_job_specs(&self, mut specs: Vec<JobSourceSpec>) -> Vec<JobSourceSpec> {
        if let Some(limit) = self.config.bulk_row_limit {
            for spec in specs.iter_mut().filter(|s| s.kind == SourceKind::BulkCsv) {
                spec.row_limit = Some(limit);
            }
        }
        specs
    }

    async fn load_source_registry(&self) -> Result<SourceRegistry> {
        let path = self.config.workspace_root.join("sources.yaml");
        if !fs::try_exists(&path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            info!("no sources.yaml; using the default data layout");
            return Ok(SourceRegistry::default_layout());
        }
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    async fn embed_corpus<R>(&self, records: Vec<R>) -> Result<CorpusArtifact<R>>
    where
        R: CorpusRecord + Send + 'static,
    {
        let texts: Vec<String> = records.iter().map(|r| r.text_for_emb().to_string()).collect();
        let encoder = self.encoder.clone();
        let matrix = tokio::task::spawn_blocking(move || {
            encode_batched(encoder.as_ref(), &texts, DEFAULT_BATCH_SIZE)
        })
        .await
        .context("embedding task aborted")?
        .with_context(|| format!("embedding {}", R::KIND))?;
        CorpusArtifact::new(records, matrix)
            .with_context(|| format!("aligning {} embeddings", R::KIND))
    }

    async fn write_report(&self, path: &Path, summary: &BuildSummary) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(summary).context("serializing build report")?;
        fs::write(path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }
}

fn load_optional_table<R>(
    root: &Path,
    path: Option<&Path>,
    load: fn(&Path) -> Result<LoadedTable<R>, AdapterError>,
    missing_inputs: &mut Vec<String>,
) -> Vec<R> {
    let Some(path) = path else {
        return Vec::new();
    };
    let full = root.join(path);
    match load(&full) {
        Ok(table) => {
            if table.malformed_rows > 0 {
                warn!(
                    path = %full.display(),
                    skipped = table.malformed_rows,
                    "skipped malformed rows"
                );
            }
            info!(path = %full.display(), rows = table.records.len(), "loaded table");
            table.records
        }
        Err(err) => {
            warn!(error = %err, "optional input unavailable; skill-gap features will be limited");
            missing_inputs.push(err.to_string());
            Vec::new()
        }
    }
}

pub async fn run_build_once_from_env() -> Result<BuildSummary> {
    let config = BuildConfig::from_env()?;
    BuildPipeline::new(config)?.run_once().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_core::{CandidateRecord, JobRecord, TrainingRecord};
    use skillbridge_embed::HashingEncoder;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fixtures_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
    }

    fn config(root: PathBuf, models: PathBuf) -> BuildConfig {
        BuildConfig {
            workspace_root: root,
            models_dir: models,
            encoder: EncoderKind::Hashing,
            hashing_dimension: 32,
            bulk_row_limit: None,
        }
    }

    #[tokio::test]
    async fn fixture_build_writes_three_artifacts_and_a_report() {
        let models = tempdir().expect("tempdir");
        let pipeline = BuildPipeline::with_encoder(
            config(fixtures_root(), models.path().to_path_buf()),
            Arc::new(HashingEncoder::new(32)),
        );
        let summary = pipeline.run_once().await.expect("build");

        assert_eq!(summary.artifacts.len(), 3);
        assert_eq!(summary.dimension, 32);
        assert!(summary.jobs > 0);
        assert!(summary.candidates > 0);
        assert!(summary.trainings > 0);
        assert!(models.path().join(REPORT_FILE).exists());

        let store = ArtifactStore::new(models.path());
        let jobs = store.load::<JobRecord>().await.expect("jobs artifact");
        assert_eq!(jobs.artifact.len(), summary.jobs);
        assert_eq!(jobs.header.encoder_id, "hashing-v1-32");
        assert_eq!(jobs.header.build_id, summary.run_id);
        let candidates = store.load::<CandidateRecord>().await.expect("candidates artifact");
        let trainings = store.load::<TrainingRecord>().await.expect("trainings artifact");
        assert_eq!(candidates.header.build_id, summary.run_id);
        assert_eq!(trainings.header.build_id, summary.run_id);
        let ids: std::collections::HashSet<_> =
            jobs.artifact.records().iter().map(|j| j.unified_id.clone()).collect();
        assert_eq!(ids.len(), jobs.artifact.len());
    }

    #[tokio::test]
    async fn missing_optional_inputs_degrade_instead_of_failing() {
        let root = tempdir().expect("tempdir");
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        std::fs::write(
            root.path().join("data/job_dataset.csv"),
            "JobID,Title,ExperienceLevel,Responsibilities,Skills\n1,Rust Engineer,Senior,Build services,Rust\n",
        )
        .unwrap();
        let models = root.path().join("models");
        let pipeline = BuildPipeline::with_encoder(
            config(root.path().to_path_buf(), models.clone()),
            Arc::new(HashingEncoder::new(16)),
        );
        let summary = pipeline.run_once().await.expect("build");

        assert_eq!(summary.jobs, 1);
        assert_eq!(summary.candidates, 0);
        assert_eq!(summary.trainings, 0);
        // json + bulk job sources, candidates, trainings
        assert_eq!(summary.missing_inputs.len(), 4);

        let trainings = ArtifactStore::new(&models)
            .load::<TrainingRecord>()
            .await
            .expect("empty trainings artifact still written");
        assert!(trainings.artifact.is_empty());
    }

    #[tokio::test]
    async fn bulk_row_limit_override_caps_bulk_sources() {
        let models = tempdir().expect("tempdir");
        let mut cfg = config(fixtures_root(), models.path().to_path_buf());
        cfg.bulk_row_limit = Some(1);
        let summary = BuildPipeline::with_encoder(cfg, Arc::new(HashingEncoder::new(8)))
            .run_once()
            .await
            .expect("build");
        let bulk_rows: usize = summary
            .job_sources
            .iter()
            .filter_map(|o| match o {
                SourceOutcome::Loaded {
                    source_type: skillbridge_core::SourceType::General,
                    rows_parsed,
                    ..
                } => Some(*rows_parsed),
                _ => None,
            })
            .sum();
        assert_eq!(bulk_rows, 1);
    }

    #[test]
    fn registry_yaml_parses() {
        let yaml = r#"
jobs:
  - source_id: curated
    kind: premium_csv
    path: data/job_dataset.csv
  - source_id: bulk
    kind: bulk_csv
    path: data/all.csv
    delimiter: "|"
    row_limit: 5000
    enabled: false
trainings: data/trainings.csv
"#;
        let registry: SourceRegistry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(registry.jobs.len(), 2);
        assert_eq!(registry.jobs[1].delimiter, Some('|'));
        assert!(!registry.jobs[1].enabled);
        assert!(registry.candidates.is_none());
    }
}
