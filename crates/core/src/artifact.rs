//! Artifact naming protocol and file staging.
//!
//! Uploaded inputs are stored as `{uuid}.{ext}` and processed outputs as
//! `{uuid}-processed.{ext}`. The retrieval endpoint and the upscale handler
//! both rely on this layout, so the names are parsed strictly: anything that
//! is not exactly one of the two forms is treated as an unknown artifact.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Suffix appended to the id of a processed output.
pub const PROCESSED_SUFFIX: &str = "-processed";

/// Image extensions accepted for upload.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Longest extension the naming protocol accepts.
const MAX_EXTENSION_LEN: usize = 16;

// ---------------------------------------------------------------------------
// ArtifactRef
// ---------------------------------------------------------------------------

/// Whether an artifact is an upload or a handler output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    Input,
    Output,
}

/// Identifies an uploaded or produced file.
///
/// Serialized as its file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactRef {
    id: Uuid,
    role: ArtifactRole,
    extension: String,
}

impl ArtifactRef {
    /// Mint a reference for a new upload.
    pub fn new_input(extension: &str) -> Result<Self, CoreError> {
        validate_extension(extension)
            .map_err(|msg| CoreError::UploadInvalid(msg.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            role: ArtifactRole::Input,
            extension: extension.to_string(),
        })
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The output reference for this input: same id and extension, with the
    /// `-processed` suffix. Deterministic, so a caller can predict where the
    /// result will appear before the job finishes.
    pub fn derive_output_ref(&self) -> ArtifactRef {
        Self {
            id: self.id,
            role: ArtifactRole::Output,
            extension: self.extension.clone(),
        }
    }

    /// On-disk file name.
    pub fn file_name(&self) -> String {
        match self.role {
            ArtifactRole::Input => format!("{}.{}", self.id.hyphenated(), self.extension),
            ArtifactRole::Output => format!(
                "{}{PROCESSED_SUFFIX}.{}",
                self.id.hyphenated(),
                self.extension
            ),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

impl FromStr for ArtifactRef {
    type Err = CoreError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let not_found = || CoreError::artifact_not_found(name);

        let (stem, extension) = name.rsplit_once('.').ok_or_else(not_found)?;
        validate_extension(extension).map_err(|_| not_found())?;

        let (id_part, role) = match stem.strip_suffix(PROCESSED_SUFFIX) {
            Some(id_part) => (id_part, ArtifactRole::Output),
            None => (stem, ArtifactRole::Input),
        };

        let id = Uuid::try_parse(id_part).map_err(|_| not_found())?;
        // Only the canonical lowercase hyphenated form names a real file.
        if id.hyphenated().to_string() != id_part {
            return Err(not_found());
        }

        Ok(Self {
            id,
            role,
            extension: extension.to_string(),
        })
    }
}

impl TryFrom<String> for ArtifactRef {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactRef> for String {
    fn from(value: ArtifactRef) -> Self {
        value.file_name()
    }
}

fn validate_extension(extension: &str) -> Result<(), &'static str> {
    if extension.is_empty() || extension.len() > MAX_EXTENSION_LEN {
        return Err("File extension must be between 1 and 16 characters");
    }
    if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("File extension may only contain ASCII letters and digits");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Upload helpers
// ---------------------------------------------------------------------------

/// Extract and validate the extension of an uploaded image's file name.
///
/// The extension keeps the caller's spelling (`photo.PNG` stays `PNG`) but
/// must name a supported image format.
pub fn upload_extension(file_name: &str) -> Result<String, CoreError> {
    let (_, ext) = file_name.rsplit_once('.').ok_or_else(|| {
        CoreError::UploadInvalid(format!("File name '{file_name}' has no extension"))
    })?;

    if !SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
        return Err(CoreError::UploadInvalid(format!(
            "Unsupported image format '.{ext}'. Supported: {SUPPORTED_IMAGE_EXTENSIONS:?}"
        )));
    }

    Ok(ext.to_string())
}

/// MIME type to serve an artifact with.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Stager
// ---------------------------------------------------------------------------

/// File storage keyed by artifact references.
#[async_trait]
pub trait ArtifactStager: Send + Sync {
    /// Persist an upload under a freshly generated id.
    async fn store(&self, bytes: &[u8], extension: &str) -> Result<ArtifactRef, CoreError>;

    /// Read an artifact. Missing files are `NotFound`.
    async fn load(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, CoreError>;

    /// Write (or replace) the file for `artifact`.
    async fn write(&self, artifact: &ArtifactRef, bytes: &[u8]) -> Result<(), CoreError>;

    /// Delete an artifact. Removing a missing artifact is not an error.
    async fn remove(&self, artifact: &ArtifactRef) -> Result<(), CoreError>;

    fn derive_output_ref(&self, input: &ArtifactRef) -> ArtifactRef {
        input.derive_output_ref()
    }
}

/// Stager backed by a flat directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalArtifactStager {
    root: PathBuf,
}

impl LocalArtifactStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CoreError::Storage(format!("create {}: {e}", self.root.display())))
    }

    pub fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join(artifact.file_name())
    }
}

#[async_trait]
impl ArtifactStager for LocalArtifactStager {
    async fn store(&self, bytes: &[u8], extension: &str) -> Result<ArtifactRef, CoreError> {
        let artifact = ArtifactRef::new_input(extension)?;
        self.write(&artifact, bytes).await?;
        tracing::debug!(artifact = %artifact, size = bytes.len(), "Stored upload");
        Ok(artifact)
    }

    async fn load(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, CoreError> {
        match tokio::fs::read(self.path_for(artifact)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CoreError::artifact_not_found(artifact))
            }
            Err(e) => Err(CoreError::Storage(format!("read {artifact}: {e}"))),
        }
    }

    async fn write(&self, artifact: &ArtifactRef, bytes: &[u8]) -> Result<(), CoreError> {
        self.ensure_root().await?;

        // Write beside the target and rename so readers never see a partial file.
        let target = self.path_for(artifact);
        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", artifact.file_name(), Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| CoreError::Storage(format!("write {artifact}: {e}")))?;

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CoreError::Storage(format!("rename {artifact}: {e}")));
        }
        Ok(())
    }

    async fn remove(&self, artifact: &ArtifactRef) -> Result<(), CoreError> {
        match tokio::fs::remove_file(self.path_for(artifact)).await {
            Ok(()) => {
                tracing::debug!(artifact = %artifact, "Removed artifact");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Storage(format!("remove {artifact}: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
