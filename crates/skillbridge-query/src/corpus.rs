//! The three artifacts a serving process answers from.

use serde::de::DeserializeOwned;
use skillbridge_core::{
    CandidateRecord, CorpusArtifact, CorpusKind, CorpusRecord, JobRecord, TrainingRecord,
};
use skillbridge_embed::EmbedError;
use skillbridge_storage::{ArtifactError, ArtifactHeader, ArtifactStore, LoadedArtifact, Uuid};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Encoder(#[from] EmbedError),
    #[error(
        "{kind} artifact was built with encoder `{built_with}` but `{configured}` is configured; \
         rerun the build step"
    )]
    EncoderMismatch {
        kind: CorpusKind,
        built_with: String,
        configured: String,
    },
    #[error(
        "{kind} artifact comes from build {found}, candidates from build {expected}; \
         rerun the build step"
    )]
    MixedBuilds {
        kind: CorpusKind,
        found: Uuid,
        expected: Uuid,
    },
}

impl StartupError {
    /// True when rebuilding the artifacts would fix the problem.
    pub fn needs_rebuild(&self) -> bool {
        match self {
            StartupError::Artifact(err) => err.needs_rebuild(),
            StartupError::EncoderMismatch { .. } | StartupError::MixedBuilds { .. } => true,
            StartupError::Encoder(_) => false,
        }
    }
}

/// Read-only corpora, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServingCorpus {
    pub candidates: CorpusArtifact<CandidateRecord>,
    pub jobs: CorpusArtifact<JobRecord>,
    pub trainings: CorpusArtifact<TrainingRecord>,
    encoder_id: String,
}

impl ServingCorpus {
    pub fn new(
        candidates: CorpusArtifact<CandidateRecord>,
        jobs: CorpusArtifact<JobRecord>,
        trainings: CorpusArtifact<TrainingRecord>,
        encoder_id: impl Into<String>,
    ) -> Self {
        Self {
            candidates,
            jobs,
            trainings,
            encoder_id: encoder_id.into(),
        }
    }

    /// Loads all three artifacts. Any one missing, corrupt, built with a
    /// different encoder, or left over from another build run fails the
    /// whole load.
    pub async fn load(store: &ArtifactStore, encoder_id: &str) -> Result<Self, StartupError> {
        let candidates = load_checked::<CandidateRecord>(store, encoder_id).await?;
        let build_id = candidates.header.build_id;
        let jobs = load_checked::<JobRecord>(store, encoder_id).await?;
        check_build(&jobs.header, build_id)?;
        let trainings = load_checked::<TrainingRecord>(store, encoder_id).await?;
        check_build(&trainings.header, build_id)?;
        let (candidates, jobs, trainings) =
            (candidates.artifact, jobs.artifact, trainings.artifact);
        info!(
            %build_id,
            root = %store.root().display(),
            candidates = candidates.len(),
            jobs = jobs.len(),
            trainings = trainings.len(),
            encoder = encoder_id,
            "serving corpus loaded"
        );
        Ok(Self::new(candidates, jobs, trainings, encoder_id))
    }

    pub fn encoder_id(&self) -> &str {
        &self.encoder_id
    }

    /// Embedding width shared by the non-empty artifacts.
    pub fn dimension(&self) -> usize {
        [
            self.candidates.embeddings().dimension(),
            self.jobs.embeddings().dimension(),
            self.trainings.embeddings().dimension(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

async fn load_checked<R>(
    store: &ArtifactStore,
    encoder_id: &str,
) -> Result<LoadedArtifact<R>, StartupError>
where
    R: CorpusRecord + DeserializeOwned,
{
    let loaded = store.load::<R>().await?;
    check_encoder(&loaded.header, encoder_id)?;
    Ok(loaded)
}

fn check_build(header: &ArtifactHeader, expected: Uuid) -> Result<(), StartupError> {
    if header.build_id == expected {
        return Ok(());
    }
    Err(StartupError::MixedBuilds {
        kind: header.kind,
        found: header.build_id,
        expected,
    })
}

fn check_encoder(header: &ArtifactHeader, configured: &str) -> Result<(), StartupError> {
    if header.encoder_id == configured {
        return Ok(());
    }
    Err(StartupError::EncoderMismatch {
        kind: header.kind,
        built_with: header.encoder_id.clone(),
        configured: configured.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_core::{EmbeddingMatrix, SourceType};
    use tempfile::tempdir;

    async fn seed(store: &ArtifactStore, encoder_id: &str, build_id: Uuid) {
        let job = JobRecord {
            unified_id: "1".to_string(),
            unified_title: "Rust Engineer".to_string(),
            unified_company: None,
            unified_skills: "rust".to_string(),
            text_for_emb: "Rust Engineer rust".to_string(),
            source_type: SourceType::Premium,
        };
        let matrix = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        let jobs = CorpusArtifact::new(vec![job], matrix).unwrap();
        store.save(&jobs, encoder_id, build_id).await.unwrap();
        store
            .save(&CorpusArtifact::<CandidateRecord>::empty(), encoder_id, build_id)
            .await
            .unwrap();
        store
            .save(&CorpusArtifact::<TrainingRecord>::empty(), encoder_id, build_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loads_when_every_artifact_matches_the_encoder() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        seed(&store, "hashing-v1-2", Uuid::from_u128(1)).await;

        let corpus = ServingCorpus::load(&store, "hashing-v1-2").await.unwrap();
        assert_eq!(corpus.jobs.len(), 1);
        assert!(corpus.candidates.is_empty());
        assert_eq!(corpus.dimension(), 2);
        assert_eq!(corpus.encoder_id(), "hashing-v1-2");
    }

    #[tokio::test]
    async fn encoder_mismatch_is_fatal_and_actionable() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        seed(&store, "hashing-v1-2", Uuid::from_u128(1)).await;

        let err = ServingCorpus::load(&store, "hashing-v1-384").await.unwrap_err();
        assert!(matches!(err, StartupError::EncoderMismatch { .. }));
        assert!(err.needs_rebuild());
        assert!(err.to_string().contains("rerun the build step"));
    }

    #[tokio::test]
    async fn missing_artifacts_ask_for_a_build() {
        let dir = tempdir().unwrap();
        let err = ServingCorpus::load(&ArtifactStore::new(dir.path()), "hashing-v1-2")
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Artifact(ArtifactError::Missing { .. })));
        assert!(err.needs_rebuild());
    }

    #[tokio::test]
    async fn artifacts_from_different_builds_are_rejected() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        seed(&store, "hashing-v1-2", Uuid::from_u128(1)).await;
        // A later build that died after rewriting only the candidates.
        store
            .save(
                &CorpusArtifact::<CandidateRecord>::empty(),
                "hashing-v1-2",
                Uuid::from_u128(2),
            )
            .await
            .unwrap();

        let err = ServingCorpus::load(&store, "hashing-v1-2").await.unwrap_err();
        match &err {
            StartupError::MixedBuilds { kind, found, expected } => {
                assert_eq!(*kind, CorpusKind::Jobs);
                assert_eq!(*found, Uuid::from_u128(1));
                assert_eq!(*expected, Uuid::from_u128(2));
            }
            other => panic!("expected mixed builds, got {other:?}"),
        }
        assert!(err.needs_rebuild());
    }
}
