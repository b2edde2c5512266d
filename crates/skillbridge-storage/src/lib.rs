//! Snapshot storage for corpus artifacts: one checksummed blob per entity table.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use skillbridge_core::{CorpusArtifact, CorpusKind, CorpusRecord, EmbeddingMatrix};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, info_span, Instrument};
pub use uuid::Uuid;

pub const CRATE_NAME: &str = "skillbridge-storage";

const MAGIC: &str = "skillbridge-artifact";
pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact {path} is missing; run the build step first")]
    Missing { path: PathBuf },
    #[error("artifact {path} is corrupt ({reason}); rerun the build step")]
    Corrupt { path: PathBuf, reason: String },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing artifact: {0}")]
    Encode(String),
}

impl ArtifactError {
    /// True for the "missing or corrupt" class that callers answer with "rebuild".
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, ArtifactError::Missing { .. } | ArtifactError::Corrupt { .. })
    }

    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Describes how an artifact was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub kind: CorpusKind,
    pub encoder_id: String,
    /// Shared by every artifact written in the same build run.
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub row_count: u64,
    pub dimension: u64,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    magic: String,
    format_version: u32,
    header: ArtifactHeader,
    payload_sha256: String,
    payload: Vec<u8>,
}

#[derive(Serialize)]
struct PayloadRef<'a, R> {
    records: &'a [R],
    embeddings: &'a EmbeddingMatrix,
}

#[derive(Deserialize)]
struct Payload<R> {
    records: Vec<R>,
    embeddings: EmbeddingMatrix,
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
    pub header: ArtifactHeader,
}

#[derive(Debug, Clone)]
pub struct LoadedArtifact<R> {
    pub header: ArtifactHeader,
    pub artifact: CorpusArtifact<R>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Serializes `artifact` and atomically replaces whatever sits at `path`.
///
/// The blob is written to a temp file in the same directory and renamed into
/// place, so a failed write never clobbers a previously valid artifact.
pub async fn save_artifact<R>(
    path: &Path,
    artifact: &CorpusArtifact<R>,
    encoder_id: &str,
    build_id: Uuid,
) -> Result<StoredArtifact, ArtifactError>
where
    R: CorpusRecord + Serialize,
{
    let span = info_span!("save_artifact", kind = %R::KIND, path = %path.display());
    encode_and_write(path, artifact, encoder_id, build_id).instrument(span).await
}

async fn encode_and_write<R>(
    path: &Path,
    artifact: &CorpusArtifact<R>,
    encoder_id: &str,
    build_id: Uuid,
) -> Result<StoredArtifact, ArtifactError>
where
    R: CorpusRecord + Serialize,
{
    let header = ArtifactHeader {
        kind: R::KIND,
        encoder_id: encoder_id.to_string(),
        build_id,
        built_at: Utc::now(),
        row_count: artifact.len() as u64,
        dimension: artifact.embeddings().dimension() as u64,
    };
    let payload = bincode::serialize(&PayloadRef {
        records: artifact.records(),
        embeddings: artifact.embeddings(),
    })
    .map_err(|e| ArtifactError::Encode(e.to_string()))?;
    let envelope = Envelope {
        magic: MAGIC.to_string(),
        format_version: FORMAT_VERSION,
        header: header.clone(),
        payload_sha256: sha256_hex(&payload),
        payload,
    };
    let bytes = bincode::serialize(&envelope).map_err(|e| ArtifactError::Encode(e.to_string()))?;

    write_atomically(path, &bytes).await?;
    info!(
        rows = header.row_count,
        dimension = header.dimension,
        bytes = bytes.len(),
        "artifact saved"
    );

    Ok(StoredArtifact {
        path: path.to_path_buf(),
        content_hash: sha256_hex(&bytes),
        byte_size: bytes.len(),
        header,
    })
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .map_err(|e| ArtifactError::io(&parent, e))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let write_result = async {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(ArtifactError::io(path, err));
    }
    Ok(())
}

/// Reads and verifies an artifact of record type `R`.
pub async fn load_artifact<R>(path: &Path) -> Result<LoadedArtifact<R>, ArtifactError>
where
    R: CorpusRecord + DeserializeOwned,
{
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ArtifactError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(ArtifactError::io(path, err)),
    };
    decode_artifact(path, &bytes)
}

fn decode_artifact<R>(path: &Path, bytes: &[u8]) -> Result<LoadedArtifact<R>, ArtifactError>
where
    R: CorpusRecord + DeserializeOwned,
{
    let envelope: Envelope = bincode::deserialize(bytes)
        .map_err(|e| ArtifactError::corrupt(path, format!("unreadable envelope: {e}")))?;
    if envelope.magic != MAGIC {
        return Err(ArtifactError::corrupt(path, "not a skillbridge artifact"));
    }
    if envelope.format_version != FORMAT_VERSION {
        return Err(ArtifactError::corrupt(
            path,
            format!("format version {} (expected {FORMAT_VERSION})", envelope.format_version),
        ));
    }
    let header = envelope.header;
    if header.kind != R::KIND {
        return Err(ArtifactError::corrupt(
            path,
            format!("holds {} but {} was expected", header.kind, R::KIND),
        ));
    }
    if sha256_hex(&envelope.payload) != envelope.payload_sha256 {
        return Err(ArtifactError::corrupt(path, "payload checksum mismatch"));
    }

    let payload: Payload<R> = bincode::deserialize(&envelope.payload)
        .map_err(|e| ArtifactError::corrupt(path, format!("unreadable payload: {e}")))?;
    if !payload.embeddings.is_consistent() {
        return Err(ArtifactError::corrupt(path, "embedding matrix shape is inconsistent"));
    }
    if payload.records.len() as u64 != header.row_count {
        return Err(ArtifactError::corrupt(
            path,
            format!("header says {} rows, found {}", header.row_count, payload.records.len()),
        ));
    }
    if !payload.embeddings.is_empty() && payload.embeddings.dimension() as u64 != header.dimension {
        return Err(ArtifactError::corrupt(
            path,
            format!(
                "header says dimension {}, matrix has {}",
                header.dimension,
                payload.embeddings.dimension()
            ),
        ));
    }
    let artifact = CorpusArtifact::new(payload.records, payload.embeddings)
        .map_err(|e| ArtifactError::corrupt(path, e.to_string()))?;

    Ok(LoadedArtifact { header, artifact })
}

/// Directory holding one snapshot per corpus kind.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, kind: CorpusKind) -> PathBuf {
        self.root.join(format!("{}.snapshot", kind.as_str()))
    }

    pub async fn save<R>(
        &self,
        artifact: &CorpusArtifact<R>,
        encoder_id: &str,
        build_id: Uuid,
    ) -> Result<StoredArtifact, ArtifactError>
    where
        R: CorpusRecord + Serialize,
    {
        save_artifact(&self.path_for(R::KIND), artifact, encoder_id, build_id).await
    }

    pub async fn load<R>(&self) -> Result<LoadedArtifact<R>, ArtifactError>
    where
        R: CorpusRecord + DeserializeOwned,
    {
        load_artifact(&self.path_for(R::KIND)).await
    }
}
