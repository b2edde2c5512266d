//! Source adapters and the schema unifier that merges job sources into one corpus.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skillbridge_core::{join_text_fields, CandidateRecord, JobRecord, SourceType, TrainingRecord};
use thiserror::Error;
use tracing::{info, warn};

pub mod table;
pub mod unify;

pub use table::{Row, Table};
pub use unify::{unify_jobs, SourceOutcome, UnifiedJobs};

pub const CRATE_NAME: &str = "skillbridge-adapters";

/// Company placeholder for the curated sources, which carry no employer column.
pub const PREMIUM_COMPANY: &str = "Tech/IT Sector";
/// Company used when a bulk row has no industry.
pub const UNKNOWN_COMPANY: &str = "Unknown";
/// Namespace tag keeping bulk ids apart from curated ids.
pub const BULK_ID_PREFIX: &str = "RAW-";

#[derive(Debug, Error)]
pub enum AdapterError {
    /// An input file is absent; callers degrade instead of failing.
    #[error("input {path} not found")]
    Missing { path: PathBuf },
    #[error("input {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Curated CSV with `JobID`, `Title`, `ExperienceLevel`, `Responsibilities`, `Skills`.
    PremiumCsv,
    /// Same columns as a JSON array of objects.
    PremiumJson,
    /// Bulk export with `id`, `job_title`, `job_description`, `job_function`, `company_industry`.
    BulkCsv,
}

/// One job source as declared in the source registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSourceSpec {
    pub source_id: String,
    pub kind: SourceKind,
    pub path: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub row_limit: Option<usize>,
    #[serde(default)]
    pub delimiter: Option<char>,
}

fn default_enabled() -> bool {
    true
}

/// Records parsed from a single source, before cross-source unification.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub source_id: String,
    pub source_type: SourceType,
    pub records: Vec<JobRecord>,
    pub malformed_rows: usize,
    pub rows_without_key: usize,
}

pub trait JobSourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn source_type(&self) -> SourceType;
    fn parse(&self, spec: &JobSourceSpec, path: &Path) -> Result<ParsedSource, AdapterError>;
}

#[derive(Debug, Clone, Copy)]
struct PremiumAdapter {
    kind: SourceKind,
}

#[derive(Debug, Clone, Copy)]
struct BulkAdapter;

impl PremiumAdapter {
    fn record_from_row(row: &Row) -> Option<JobRecord> {
        let id = row.get("JobID")?;
        let skills = row.text("Skills");
        Some(JobRecord {
            unified_id: id.to_string(),
            unified_title: row.text("Title").to_string(),
            unified_company: Some(PREMIUM_COMPANY.to_string()),
            unified_skills: skills.to_string(),
            text_for_emb: join_text_fields([
                row.text("Title"),
                row.text("ExperienceLevel"),
                row.text("Responsibilities"),
                skills,
            ]),
            source_type: SourceType::Premium,
        })
    }
}

impl JobSourceAdapter for PremiumAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn source_type(&self) -> SourceType {
        SourceType::Premium
    }

    fn parse(&self, spec: &JobSourceSpec, path: &Path) -> Result<ParsedSource, AdapterError> {
        let table = match self.kind {
            SourceKind::PremiumJson => table::read_json_records(path, spec.row_limit)?,
            _ => table::read_delimited(path, delimiter_byte(spec, b','), spec.row_limit)?,
        };
        Ok(rows_to_source(spec, self.source_type(), table, Self::record_from_row))
    }
}

impl BulkAdapter {
    fn record_from_row(row: &Row) -> Option<JobRecord> {
        let id = row.get("id")?;
        Some(JobRecord {
            unified_id: format!("{BULK_ID_PREFIX}{id}"),
            unified_title: row.text("job_title").to_string(),
            unified_company: Some(
                row.get("company_industry").unwrap_or(UNKNOWN_COMPANY).to_string(),
            ),
            unified_skills: String::new(),
            text_for_emb: join_text_fields([
                row.text("job_title"),
                row.text("job_description"),
                row.text("job_function"),
            ]),
            source_type: SourceType::General,
        })
    }
}

impl JobSourceAdapter for BulkAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::BulkCsv
    }

    fn source_type(&self) -> SourceType {
        SourceType::General
    }

    fn parse(&self, spec: &JobSourceSpec, path: &Path) -> Result<ParsedSource, AdapterError> {
        let table = table::read_delimited(path, delimiter_byte(spec, b'|'), spec.row_limit)?;
        Ok(rows_to_source(spec, self.source_type(), table, Self::record_from_row))
    }
}

fn delimiter_byte(spec: &JobSourceSpec, default: u8) -> u8 {
    spec.delimiter
        .filter(char::is_ascii)
        .map(|c| c as u8)
        .unwrap_or(default)
}

fn rows_to_source(
    spec: &JobSourceSpec,
    source_type: SourceType,
    table: Table,
    to_record: fn(&Row) -> Option<JobRecord>,
) -> ParsedSource {
    let mut records = Vec::with_capacity(table.rows.len());
    let mut rows_without_key = 0usize;
    for row in &table.rows {
        match to_record(row) {
            Some(record) => records.push(record),
            None => rows_without_key += 1,
        }
    }
    ParsedSource {
        source_id: spec.source_id.clone(),
        source_type,
        records,
        malformed_rows: table.malformed_rows,
        rows_without_key,
    }
}

pub fn adapter_for_kind(kind: SourceKind) -> Box<dyn JobSourceAdapter> {
    match kind {
        SourceKind::PremiumCsv | SourceKind::PremiumJson => Box::new(PremiumAdapter { kind }),
        SourceKind::BulkCsv => Box::new(BulkAdapter),
    }
}

/// Parses one job source, resolving relative paths against `root`.
pub fn load_job_source(spec: &JobSourceSpec, root: &Path) -> Result<ParsedSource, AdapterError> {
    let path = root.join(&spec.path);
    let parsed = adapter_for_kind(spec.kind).parse(spec, &path)?;
    info!(
        source_id = %parsed.source_id,
        source_type = %parsed.source_type,
        rows = parsed.records.len(),
        malformed = parsed.malformed_rows,
        without_key = parsed.rows_without_key,
        "parsed job source"
    );
    Ok(parsed)
}

/// Loads every enabled job source and unifies them.
///
/// A source that is missing or unparseable is reported in the outcome list and
/// excluded; it never aborts the build.
pub fn build_job_corpus(specs: &[JobSourceSpec], root: &Path) -> UnifiedJobs {
    let mut parsed = Vec::new();
    let mut failed = Vec::new();
    for spec in specs.iter().filter(|s| s.enabled) {
        match load_job_source(spec, root) {
            Ok(source) => parsed.push(source),
            Err(err) => {
                warn!(source_id = %spec.source_id, error = %err, "job source excluded");
                failed.push(SourceOutcome::Failed {
                    source_id: spec.source_id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    let mut unified = unify_jobs(parsed);
    unified.outcomes.extend(failed);
    unified
}

/// Table of candidates plus how many rows were unusable.
#[derive(Debug, Clone, Default)]
pub struct LoadedTable<R> {
    pub records: Vec<R>,
    pub malformed_rows: usize,
}

fn read_profile_table(path: &Path) -> Result<Table, AdapterError> {
    let delimiter = table::sniff_delimiter(path)?;
    table::read_delimited(path, delimiter, None)
}

pub fn load_candidates(path: &Path) -> Result<LoadedTable<CandidateRecord>, AdapterError> {
    let table = read_profile_table(path)?;
    let records = table
        .rows
        .iter()
        .map(|row| {
            CandidateRecord::new(
                row.text("candidate_id").to_string(),
                row.text("first_name").to_string(),
                row.text("email").to_string(),
                row.text("skills").to_string(),
                row.text("summary").to_string(),
            )
        })
        .collect();
    Ok(LoadedTable {
        records,
        malformed_rows: table.malformed_rows,
    })
}

pub fn load_trainings(path: &Path) -> Result<LoadedTable<TrainingRecord>, AdapterError> {
    let table = read_profile_table(path)?;
    let records = table
        .rows
        .iter()
        .map(|row| {
            TrainingRecord::new(
                row.text("module_id").to_string(),
                row.text("title").to_string(),
                row.text("description").to_string(),
                row.text("skills_covered").to_string(),
            )
        })
        .collect();
    Ok(LoadedTable {
        records,
        malformed_rows: table.malformed_rows,
    })
}
