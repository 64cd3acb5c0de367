//! Error types for the dropper core.
//!
//! None of these cross the host event boundary as panics: stores and the
//! progression engine hand them back as values, and the command layer turns
//! them into player feedback.

use thiserror::Error;

/// Failures of a persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the core can refuse to do.
#[derive(Debug, Error)]
pub enum DropperError {
    #[error("map '{0}' not found")]
    MapNotFound(String),
    #[error("level {level} doesn't exist in map '{map}'")]
    LevelNotFound { map: String, level: u32 },
    #[error("level numbers start at 1, got {0}")]
    InvalidLevelNumber(u32),
    #[error("no active game")]
    NoActiveSession,
    #[error("map '{0}' already exists")]
    MapAlreadyExists(String),
    #[error("'{0}' can't be used as a map name")]
    InvalidMapName(String),
    #[error("already playing a map")]
    AlreadyActive,
    #[error("map '{0}' is not ready yet, it needs complete levels starting at level 1")]
    MapNotPlayable(String),
    #[error("malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures while reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        let err = DropperError::LevelNotFound {
            map: "Test".to_string(),
            level: 3,
        };
        assert_eq!(err.to_string(), "level 3 doesn't exist in map 'Test'");
        assert_eq!(
            DropperError::MapNotFound("Sky".to_string()).to_string(),
            "map 'Sky' not found"
        );
    }

    #[test]
    fn test_storage_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DropperError = StorageError::Io {
            key: "maps/Test".to_string(),
            source: io,
        }
        .into();
        assert!(matches!(err, DropperError::Storage(StorageError::Io { .. })));
        assert!(err.to_string().contains("maps/Test"));
    }
}
