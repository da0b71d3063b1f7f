use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::error::{ArtifactKind, ClassifierError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// UTF-8 JSON.
    Json,
    /// JSON written by older exporters with Latin-1 encoded strings.
    Latin1Json,
    /// Archival bincode snapshot.
    Bincode,
}

impl ArtifactFormat {
    /// Order in which a load tries formats. The first decode that passes
    /// validation wins.
    pub const FALLBACK_ORDER: [ArtifactFormat; 3] = [
        ArtifactFormat::Json,
        ArtifactFormat::Latin1Json,
        ArtifactFormat::Bincode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactFormat::Json => "json",
            ArtifactFormat::Latin1Json => "json-latin1",
            ArtifactFormat::Bincode => "bincode",
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String> {
        match self {
            ArtifactFormat::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            ArtifactFormat::Latin1Json => {
                // Every byte maps to the code point of the same value.
                let text: String = bytes.iter().map(|b| char::from(*b)).collect();
                serde_json::from_str(&text).map_err(|e| e.to_string())
            }
            ArtifactFormat::Bincode => bincode::deserialize(bytes).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded artifact plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedArtifact<T> {
    pub value: T,
    pub format: ArtifactFormat,
    pub sha256: String,
    pub path: PathBuf,
}

/// Why no format produced a usable artifact.
#[derive(Debug)]
pub enum FallbackError {
    /// Some format decoded but every decoded value failed validation. Holds
    /// the first rejection reason.
    Invalid(String),
    /// Nothing decoded. One entry per attempted format.
    Undecodable(Vec<String>),
}

/// Decode `bytes` with each format in order. The first value that decodes
/// and passes `validate` wins.
pub fn decode_with_fallback<T, V>(
    bytes: &[u8],
    validate: V,
) -> Result<(T, ArtifactFormat), FallbackError>
where
    T: DeserializeOwned,
    V: Fn(&T) -> Result<(), String>,
{
    let mut attempts = Vec::with_capacity(ArtifactFormat::FALLBACK_ORDER.len());
    let mut rejected: Option<String> = None;

    for format in ArtifactFormat::FALLBACK_ORDER {
        match format.decode::<T>(bytes) {
            Ok(value) => match validate(&value) {
                Ok(()) => return Ok((value, format)),
                Err(reason) => {
                    debug!("{} decoded but failed validation: {}", format, reason);
                    attempts.push(format!("{}: {}", format, reason));
                    rejected.get_or_insert(reason);
                }
            },
            Err(e) => {
                debug!("{} decode failed: {}", format, e);
                attempts.push(format!("{}: {}", format, e));
            }
        }
    }

    Err(match rejected {
        Some(reason) => FallbackError::Invalid(reason),
        None => FallbackError::Undecodable(attempts),
    })
}

/// Read one artifact and decode it into a value that passes `validate`.
pub fn load_artifact<T, V>(
    kind: ArtifactKind,
    path: &Path,
    validate: V,
) -> Result<LoadedArtifact<T>, ClassifierError>
where
    T: DeserializeOwned,
    V: Fn(&T) -> Result<(), String>,
{
    if !path.exists() {
        return Err(ClassifierError::ArtifactMissing {
            kind,
            path: path.to_path_buf(),
        });
    }

    let bytes = std::fs::read(path).map_err(|e| ClassifierError::ArtifactCorrupt {
        kind,
        path: path.to_path_buf(),
        reason: format!("read failed: {}", e),
    })?;
    let sha256 = hex::encode(Sha256::digest(&bytes));

    let (value, format) = decode_with_fallback::<T, V>(&bytes, validate).map_err(|failure| {
        warn!("No usable decode for {} artifact {}", kind, path.display());
        match failure {
            FallbackError::Invalid(reason) => ClassifierError::ArtifactCorrupt {
                kind,
                path: path.to_path_buf(),
                reason,
            },
            FallbackError::Undecodable(attempts) => ClassifierError::DeserializationFailed {
                kind,
                path: path.to_path_buf(),
                attempts,
            },
        }
    })?;

    if format != ArtifactFormat::Json {
        warn!("{} artifact {} decoded with fallback format {}", kind, path.display(), format);
    }

    info!(
        "Loaded {} artifact from {} ({}, sha256 {})",
        kind,
        path.display(),
        format,
        &sha256[..12]
    );

    Ok(LoadedArtifact {
        value,
        format,
        sha256,
        path: path.to_path_buf(),
    })
}
