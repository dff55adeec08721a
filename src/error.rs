//! Error taxonomy (spec §7).

use std::fmt;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy described in spec §7.
///
/// `NotFound` is the one variant callers are expected to match on routinely
/// (it drives fallback dispatch, see [`crate::fallback`]); the rest exist so
/// callers can discriminate failure kinds without string-matching messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested component version, tag, resource identity, or blob is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A CTF format value outside {directory, tar, tgz}, or a write attempted
    /// on a legacy artifact-set.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An index file declares a schema version other than the one this crate understands.
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// The schema version this crate supports.
        expected: u32,
        /// The schema version found in the decoded document.
        found: u32,
    },

    /// An OCI reference missing its tag when a tag is required, or a tar
    /// entry name containing `..`.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Surfaced by the credential collaborator (spec §6); recoverable unless
    /// an operation explicitly requires credentials.
    #[error("credentials not found for {0}")]
    CredentialsNotFound(String),

    /// Filesystem / stream I/O failure. Wrapping preserves the underlying cause.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failure (the component-descriptor layer's
    /// on-disk encoding, spec §4.4).
    #[error("yaml serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Multiple failures joined rather than reduced to the first (spec §5/§7:
    /// parallel blob copies, multi-close paths).
    #[error(transparent)]
    Multi(#[from] MultiError),

    /// Catch-all for internal call chains that build up an `anyhow` context
    /// chain (mirrors the teacher crate's `fn_error_context`/`anyhow::Context`
    /// idiom) before being funneled into the typed error surface.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// True if this error represents an absent resource (spec §7: "NotFound
    /// ... consumed internally by fallback dispatch").
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// A list of errors that all contributed to one failed operation.
///
/// Used wherever spec.md calls for errors to be *joined* rather than reduced
/// to the first (parallel blob copies in the directory archive writer,
/// multi-resource close paths).
#[derive(Debug)]
pub struct MultiError(pub Vec<Error>);

impl MultiError {
    /// Build a `MultiError` from a list of failures, returning `Ok(())` if
    /// the list is empty.
    pub fn from_results<T>(results: Vec<std::result::Result<T, Error>>) -> Result<Vec<T>> {
        let mut oks = Vec::with_capacity(results.len());
        let mut errs = Vec::new();
        for r in results {
            match r {
                Ok(v) => oks.push(v),
                Err(e) => errs.push(e),
            }
        }
        if errs.is_empty() {
            Ok(oks)
        } else {
            Err(Error::Multi(MultiError(errs)))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} joined errors: ", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.first().and_then(|e| e.source())
    }
}
