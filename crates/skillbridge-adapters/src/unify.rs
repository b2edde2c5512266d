//! Merging parsed sources into one job table with globally unique ids.

use std::collections::HashSet;

use serde::Serialize;
use skillbridge_core::{JobRecord, SourceType};
use tracing::{info, warn};

use crate::ParsedSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Loaded {
        source_id: String,
        source_type: SourceType,
        rows_parsed: usize,
        rows_kept: usize,
        duplicates_dropped: usize,
        malformed_rows: usize,
        rows_without_key: usize,
    },
    Failed {
        source_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct UnifiedJobs {
    pub records: Vec<JobRecord>,
    pub outcomes: Vec<SourceOutcome>,
}

/// Concatenates sources, structured ones first, keeping the first record seen
/// for every `unified_id`.
///
/// Within each group sources keep the order they were given in, and rows keep
/// their file order, so identical inputs always produce identical output.
pub fn unify_jobs(sources: Vec<ParsedSource>) -> UnifiedJobs {
    let (premium, general): (Vec<_>, Vec<_>) = sources
        .into_iter()
        .partition(|s| s.source_type == SourceType::Premium);

    let mut seen: HashSet<String> = HashSet::new();
    let mut unified = UnifiedJobs::default();

    for source in premium.into_iter().chain(general) {
        let rows_parsed = source.records.len();
        let mut duplicates_dropped = 0usize;
        for record in source.records {
            if seen.insert(record.unified_id.clone()) {
                unified.records.push(record);
            } else {
                duplicates_dropped += 1;
            }
        }
        if duplicates_dropped > 0 {
            warn!(source_id = %source.source_id, duplicates_dropped, "dropped duplicate job ids");
        }
        unified.outcomes.push(SourceOutcome::Loaded {
            source_id: source.source_id,
            source_type: source.source_type,
            rows_parsed,
            rows_kept: rows_parsed - duplicates_dropped,
            duplicates_dropped,
            malformed_rows: source.malformed_rows,
            rows_without_key: source.rows_without_key,
        });
    }

    info!(total = unified.records.len(), "unified job corpus");
    unified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, title: &str, source_type: SourceType) -> JobRecord {
        JobRecord {
            unified_id: id.to_string(),
            unified_title: title.to_string(),
            unified_company: None,
            unified_skills: String::new(),
            text_for_emb: title.to_string(),
            source_type,
        }
    }

    fn source(source_id: &str, source_type: SourceType, records: Vec<JobRecord>) -> ParsedSource {
        ParsedSource {
            source_id: source_id.to_string(),
            source_type,
            records,
            malformed_rows: 0,
            rows_without_key: 0,
        }
    }

    #[test]
    fn shared_key_across_structured_sources_keeps_first_occurrence() {
        let csv = source(
            "csv",
            SourceType::Premium,
            vec![
                job("J1", "From CSV", SourceType::Premium),
                job("J2", "Other", SourceType::Premium),
            ],
        );
        let json = source(
            "json",
            SourceType::Premium,
            vec![
                job("J1", "From JSON", SourceType::Premium),
                job("J3", "Third", SourceType::Premium),
            ],
        );
        let unified = unify_jobs(vec![csv, json]);

        let ids: Vec<_> = unified.records.iter().map(|r| r.unified_id.as_str()).collect();
        assert_eq!(ids, vec!["J1", "J2", "J3"]);
        assert_eq!(unified.records[0].unified_title, "From CSV");
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        match &unified.outcomes[1] {
            SourceOutcome::Loaded { duplicates_dropped, rows_kept, .. } => {
                assert_eq!(*duplicates_dropped, 1);
                assert_eq!(*rows_kept, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn structured_sources_precede_bulk_sources() {
        let bulk =
            source("bulk", SourceType::General, vec![job("RAW-1", "Bulk", SourceType::General)]);
        let premium =
            source("premium", SourceType::Premium, vec![job("1", "Curated", SourceType::Premium)]);
        let unified = unify_jobs(vec![bulk, premium]);
        let ids: Vec<_> = unified.records.iter().map(|r| r.unified_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "RAW-1"]);
    }

    #[test]
    fn unification_is_deterministic() {
        let make = || {
            vec![
                source(
                    "bulk",
                    SourceType::General,
                    vec![
                        job("RAW-2", "b", SourceType::General),
                        job("RAW-2", "c", SourceType::General),
                    ],
                ),
                source("p", SourceType::Premium, vec![job("5", "a", SourceType::Premium)]),
            ]
        };
        assert_eq!(unify_jobs(make()).records, unify_jobs(make()).records);
        assert_eq!(unify_jobs(make()).records.len(), 2);
    }
}
