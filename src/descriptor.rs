//! Component descriptors (spec §3, §9 "Tagged access specs inside descriptors").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// `{name -> value}`, always including `name` and optionally `version` plus
/// arbitrary extra keys (spec §3 "Resources and sources carry an identity").
pub type Identity = BTreeMap<String, String>;

/// True iff every key in `query` matches the same key in `candidate`
/// (spec §4.5 `getLocalResource`): extra keys on `candidate` are allowed,
/// and a missing-or-empty `version` in `query` is not compared.
pub fn identity_matches(query: &Identity, candidate: &Identity) -> bool {
    query.iter().all(|(k, v)| {
        if k == "version" && v.is_empty() {
            return true;
        }
        candidate.get(k) == Some(v)
    })
}

/// `{version}` (spec §3 "meta").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// The component descriptor schema version, e.g. `"v2"`.
    pub version: String,
}

/// A resource or source's access specification: a tagged sum over how its
/// bytes are fetched (spec §9).
///
/// Decoding is two-pass: the `type` discriminator is read first, then the
/// matched variant is decoded from the same document. Unknown types
/// round-trip as [`AccessSpec::Other`] so the core never loses data it
/// doesn't understand.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessSpec {
    /// Content lives in the same CTF, addressed by digest.
    LocalBlob {
        /// `algorithm:hex` digest of the blob within the CTF's pool.
        local_reference: String,
        /// The blob's declared media type, if known.
        media_type: Option<String>,
    },
    /// Content is a remote OCI artifact, addressed by reference.
    OciArtifact {
        /// `repository[:tag][@digest]`.
        image_reference: String,
    },
    /// An access type this crate does not model explicitly; preserved
    /// verbatim for round-tripping.
    Other {
        /// The raw `type` discriminator string.
        access_type: String,
        /// The full original JSON document, including `type`.
        raw: Value,
    },
}

const TYPE_LOCAL_BLOB: &str = "localBlob/v1";
const TYPE_OCI_ARTIFACT: &str = "ociArtifact/v1";

impl AccessSpec {
    /// Build a `localBlob/v1` access spec.
    pub fn local_blob(local_reference: impl Into<String>, media_type: Option<String>) -> Self {
        Self::LocalBlob {
            local_reference: local_reference.into(),
            media_type,
        }
    }

    /// The discriminator string this value would (re-)encode as.
    pub fn access_type(&self) -> &str {
        match self {
            AccessSpec::LocalBlob { .. } => TYPE_LOCAL_BLOB,
            AccessSpec::OciArtifact { .. } => TYPE_OCI_ARTIFACT,
            AccessSpec::Other { access_type, .. } => access_type,
        }
    }
}

impl Serialize for AccessSpec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = match self {
            AccessSpec::LocalBlob {
                local_reference,
                media_type,
            } => {
                let mut map = serde_json::Map::new();
                map.insert("type".into(), Value::String(TYPE_LOCAL_BLOB.into()));
                map.insert("localReference".into(), Value::String(local_reference.clone()));
                if let Some(mt) = media_type {
                    map.insert("mediaType".into(), Value::String(mt.clone()));
                }
                Value::Object(map)
            }
            AccessSpec::OciArtifact { image_reference } => {
                let mut map = serde_json::Map::new();
                map.insert("type".into(), Value::String(TYPE_OCI_ARTIFACT.into()));
                map.insert("imageReference".into(), Value::String(image_reference.clone()));
                Value::Object(map)
            }
            AccessSpec::Other { raw, .. } => raw.clone(),
        };
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AccessSpec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let access_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| serde::de::Error::missing_field("type"))?
            .to_string();
        match access_type.as_str() {
            TYPE_LOCAL_BLOB => {
                let local_reference = value
                    .get("localReference")
                    .and_then(Value::as_str)
                    .ok_or_else(|| serde::de::Error::missing_field("localReference"))?
                    .to_string();
                let media_type = value
                    .get("mediaType")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(AccessSpec::LocalBlob {
                    local_reference,
                    media_type,
                })
            }
            TYPE_OCI_ARTIFACT => {
                let image_reference = value
                    .get("imageReference")
                    .and_then(Value::as_str)
                    .ok_or_else(|| serde::de::Error::missing_field("imageReference"))?
                    .to_string();
                Ok(AccessSpec::OciArtifact { image_reference })
            }
            other => Ok(AccessSpec::Other {
                access_type: other.to_string(),
                raw: value,
            }),
        }
    }
}

/// A resource or source entry (spec §3, §4.5): identity plus access, and
/// (for resources materialized by `addLocalResource`) the digest of the
/// stored blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Identifying keys; always includes `name`.
    pub identity: Identity,
    /// How to fetch this resource's bytes.
    pub access: AccessSpec,
    /// `algorithm:hex` digest of the underlying content, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ResourceRef {
    /// This entry's `name` identity key (spec §3: "always including name").
    pub fn name(&self) -> Option<&str> {
        self.identity.get("name").map(String::as_str)
    }
}

/// `{name, version, provider, resources[], sources[], references[], signatures[]}`
/// (spec §3 "component").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// The component's unique name, e.g. `github.com/acme.org/helloworld`.
    pub name: String,
    /// The component version, e.g. `1.0.0`.
    pub version: String,
    /// The organization or individual publishing this component.
    pub provider: String,
    /// Binary artifacts associated with this component version.
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
    /// Source code references associated with this component version.
    #[serde(default)]
    pub sources: Vec<ResourceRef>,
    /// References to other component versions this one depends on.
    /// Preserved opaquely; this crate does not resolve transitive graphs.
    #[serde(default)]
    pub references: Vec<Value>,
    /// Detached signatures over this descriptor. Preserved opaquely.
    #[serde(default)]
    pub signatures: Vec<Value>,
}

/// `{meta: {version}, component: {...}}` (spec §3 "Component descriptor").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Schema metadata.
    pub meta: Meta,
    /// The component record itself.
    pub component: Component,
}

impl ComponentDescriptor {
    /// Serialize to YAML, matching the descriptor layer's on-disk encoding
    /// (spec §4.4).
    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        Ok(serde_yaml::to_string(self)?.into_bytes())
    }

    /// Parse from YAML.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Find a resource by identity match (spec §4.5 `getLocalResource`).
    pub fn find_resource(&self, query: &Identity) -> Option<&ResourceRef> {
        self.component
            .resources
            .iter()
            .find(|r| identity_matches(query, &r.identity))
    }

    /// Find a source by identity match (spec §4.5 `getLocalSource`).
    pub fn find_source(&self, query: &Identity) -> Option<&ResourceRef> {
        self.component
            .sources
            .iter()
            .find(|r| identity_matches(query, &r.identity))
    }
}
