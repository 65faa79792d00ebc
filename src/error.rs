// src/error.rs
use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors raised while bootstrapping the control-plane PKI.
#[derive(Debug, Error)]
pub enum PkiError {
    /// Bad or incomplete cluster configuration. Raised before anything is written.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Filesystem read/write/permission failure on a named artifact.
    #[error("storage error: {context} ({}): {source}", path.display())]
    Storage {
        path: PathBuf,
        context: String,
        #[source]
        source: io::Error,
    },

    /// Key generation, signing or encoding failure from openssl.
    #[error("crypto error: {context}: {source}")]
    Crypto {
        context: String,
        #[source]
        source: openssl::error::ErrorStack,
    },

    /// A cancellation request was honoured before the named step started.
    #[error("bootstrap cancelled before step '{step}'")]
    Cancelled { step: String },

    /// On-disk material does not match what the bootstrap would have issued.
    #[error("verification failed: {0}")]
    Verification(String),
}

pub type Result<T> = std::result::Result<T, PkiError>;

impl PkiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn storage(path: impl Into<PathBuf>, context: impl Into<String>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            context: context.into(),
            source,
        }
    }

    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }
}

/// Attaches artifact context to openssl failures without leaking key bytes.
pub trait CryptoContext<T> {
    fn crypto_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> CryptoContext<T> for std::result::Result<T, openssl::error::ErrorStack> {
    fn crypto_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| PkiError::Crypto {
            context: context.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_names_path_and_artifact() {
        let err = PkiError::storage(
            "/var/lib/pki/ca.crt",
            "failed to read root CA certificate",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        let text = err.to_string();
        assert!(text.contains("/var/lib/pki/ca.crt"));
        assert!(text.contains("root CA certificate"));
    }

    #[test]
    fn cancelled_error_names_step() {
        let err = PkiError::Cancelled {
            step: "ensure certificate admin".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "bootstrap cancelled before step 'ensure certificate admin'"
        );
    }
}
