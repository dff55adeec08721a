//! CTF index (spec §3 "CTF index entry"/"CTF index", §4.2, Component B).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The only schema version this crate understands.
pub const SCHEMA_VERSION: u32 = 1;

/// One entry in a CTF index: `(repository, tag) -> (digest, mediaType)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactEntry {
    /// Slash-separated path; component descriptors use the prefix
    /// `component-descriptors/<componentName>` by convention.
    pub repository: String,
    /// The human-readable tag, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `algorithm:hex` digest of the referenced blob.
    pub digest: String,
    /// Declared media type of the referenced blob, if recorded.
    #[serde(skip_serializing_if = "Option::is_none", rename = "mediaType")]
    pub media_type: Option<String>,
}

/// `{schemaVersion: 1, artifacts: [entry...]}`.
///
/// A missing or zero-length index file is equivalent to an empty index (see
/// [`CtfIndex::decode`]). Strict decoding rejects unknown top-level fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CtfIndex {
    /// Must be [`SCHEMA_VERSION`].
    pub schema_version: u32,
    /// The artifacts recorded in this index.
    pub artifacts: Vec<ArtifactEntry>,
}

impl CtfIndex {
    /// An empty, schema-version-1 index.
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            artifacts: Vec::new(),
        }
    }

    /// Decode a serialized index. A missing or zero-length document decodes
    /// as an empty index rather than failing. Fails with
    /// [`Error::SchemaVersionMismatch`] unless `schemaVersion == 1`, and on
    /// any unknown top-level field.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let idx: CtfIndex = serde_json::from_slice(bytes)?;
        if idx.schema_version != SCHEMA_VERSION {
            return Err(Error::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: idx.schema_version,
            });
        }
        Ok(idx)
    }

    /// Encode to canonical JSON.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Append an entry without deduplication (spec §4.2: "No deduplication
    /// is performed on add").
    pub fn add_artifact(&mut self, entry: ArtifactEntry) {
        self.artifacts.push(entry);
    }

    /// Add-or-update by `(repository, tag)`, last-write-wins, preserving the
    /// position and relative order of all other entries (spec §4.2, used by
    /// the OCI adapter's `tag` verb).
    pub fn upsert_artifact(&mut self, entry: ArtifactEntry) {
        if let Some(existing) = self
            .artifacts
            .iter_mut()
            .find(|e| e.repository == entry.repository && e.tag == entry.tag)
        {
            *existing = entry;
        } else {
            self.artifacts.push(entry);
        }
    }

    /// All entries, in index order.
    pub fn get_artifacts(&self) -> &[ArtifactEntry] {
        &self.artifacts
    }

    /// Find the entry for `(repository, tag)`.
    pub fn find(&self, repository: &str, tag: &str) -> Option<&ArtifactEntry> {
        self.artifacts
            .iter()
            .find(|e| e.repository == repository && e.tag.as_deref() == Some(tag))
    }

    /// All tags recorded under `repository`, in index order.
    pub fn tags_for(&self, repository: &str) -> Vec<String> {
        self.artifacts
            .iter()
            .filter(|e| e.repository == repository)
            .filter_map(|e| e.tag.clone())
            .collect()
    }
}

impl Default for CtfIndex {
    fn default() -> Self {
        Self::new()
    }
}
