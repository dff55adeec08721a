//! Collaborator interfaces consumed, not implemented, by this crate (spec §6).
//!
//! The core depends only on these traits; credential resolution, repository
//! construction from a spec, and file-backed blob provisioning are all
//! someone else's concern (CLI, plugin host, configuration loader — see
//! spec §1 "Deliberately out of scope").

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::blob::Blob;
use crate::error::Result;
use crate::repository::ComponentVersionRepository;
use crate::resolver::RepositorySpec;

/// The credential-consumer identity for a repository spec: an opaque map a
/// [`CredentialResolver`] matches against (spec §6).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConsumerIdentity(pub std::collections::BTreeMap<String, String>);

impl ConsumerIdentity {
    /// Build a consumer identity from `(key, value)` pairs.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().collect())
    }
}

/// Given a typed repository spec and a credential map, returns a live
/// [`ComponentVersionRepository`]; separately exposes the credential-consumer
/// identity for that spec (spec §6 "Repository provider").
pub trait RepositoryProvider: Send + Sync {
    /// Instantiate a repository for `spec`, using `credentials` if the
    /// backend needs them.
    fn provide(
        &self,
        spec: &dyn RepositorySpec,
        credentials: &HashMap<String, String>,
    ) -> Result<Arc<dyn ComponentVersionRepository>>;

    /// The identity a [`CredentialResolver`] should be asked about for `spec`.
    fn consumer_identity(&self, spec: &dyn RepositorySpec) -> ConsumerIdentity;
}

/// Given a consumer identity, returns a credential map or `NotFound` (spec
/// §6 "Credential resolver"). `NotFound` is recoverable: callers proceed
/// without credentials unless the operation explicitly requires them
/// (spec §7).
pub trait CredentialResolver: Send + Sync {
    /// Resolve credentials for `consumer`.
    fn resolve(&self, consumer: &ConsumerIdentity) -> Result<HashMap<String, String>>;
}

/// A file access specification handed to a [`BlobProvider`] (spec §6 "Blob
/// provider").
#[derive(Debug, Clone)]
pub struct FileAccessSpec {
    /// Path to the file, interpreted by the provider's own filesystem view.
    pub path: Utf8PathBuf,
    /// The blob's declared media type, if known up front.
    pub media_type: Option<String>,
}

/// Given a file access specification, returns a read-only blob (spec §6
/// "Blob provider").
pub trait BlobProvider: Send + Sync {
    /// Resolve `access` to a blob.
    fn provide(&self, access: &FileAccessSpec) -> Result<Box<dyn Blob>>;
}
