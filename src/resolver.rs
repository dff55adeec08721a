//! Resolver configuration (spec §3 "Resolver", §6 "Configuration", §9
//! "Dynamic dispatch over repository specs", Component G).

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// A typed, versioned repository spec (spec §9: "Repositories are
/// identified by a typed, versioned tag, e.g. `ctf/v1`"). Implementors are
/// decoded from JSON by a [`RepositorySpecRegistry`] keyed on `type_tag()`.
pub trait RepositorySpec: std::fmt::Debug + Send + Sync {
    /// The versioned type tag this spec was constructed under, e.g. `"ctf/v1"`.
    fn type_tag(&self) -> &str;

    /// A stable identity string used both as the fallback repository's
    /// opened-repository cache key (spec §3 "Lifecycles": "memoized by spec
    /// identity") and, combined with [`Self::to_json`], for the "yielding
    /// repository for component" debug log (spec §4.6 Observability).
    fn spec_key(&self) -> String;

    /// A JSON rendering of this spec, for the debug log.
    fn to_json(&self) -> Value;
}

/// A repository spec for a CTF at a filesystem path — the one concrete
/// [`RepositorySpec`] this crate ships, matching the `ctf/v1` type tag CTFs
/// are addressed by throughout spec.md.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtfRepositorySpec {
    /// Path to the CTF (directory, `.tar`, or `.tgz`).
    pub path: Utf8PathBuf,
}

/// The `ctf/v1` type tag.
pub const CTF_V1_TYPE: &str = "ctf/v1";

impl CtfRepositorySpec {
    /// Build a spec for the CTF at `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RepositorySpec for CtfRepositorySpec {
    fn type_tag(&self) -> &str {
        CTF_V1_TYPE
    }

    fn spec_key(&self) -> String {
        format!("{CTF_V1_TYPE}:{}", self.path)
    }

    fn to_json(&self) -> Value {
        serde_json::json!({"type": CTF_V1_TYPE, "path": self.path})
    }
}

/// One entry in a fallback's resolver list (spec §3 "Resolver").
#[derive(Clone)]
pub struct Resolver {
    /// How to open the underlying repository.
    pub repository_spec: Arc<dyn RepositorySpec>,
    /// Literal string matched against a component name via `HasPrefix`
    /// (empty matches everything).
    pub prefix: String,
    /// Higher wins; ties broken by original list order (spec §4.6).
    pub priority: i64,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("repository_spec", &self.repository_spec)
            .field("prefix", &self.prefix)
            .field("priority", &self.priority)
            .finish()
    }
}

/// True iff `prefix` is a `HasPrefix` match of `name` (spec §3: "ordinary
/// string HasPrefix relation"; §8: "Partial string prefix... matches",
/// "not required to stop at path separators").
pub fn prefix_matches(prefix: &str, name: &str) -> bool {
    name.starts_with(prefix)
}

/// Constructs a live [`RepositorySpec`] from a decoded JSON value carrying a
/// `type` discriminator (spec §9 "a registry maps tag -> constructor").
pub trait RepositorySpecConstructor: Send + Sync {
    /// Build a spec from the `repository` document (the `type` field has
    /// already been read by the caller to select this constructor).
    fn construct(&self, value: &Value) -> Result<Arc<dyn RepositorySpec>>;
}

/// The pluggable type-scheme registry of spec §9, populated by external
/// collaborators before use.
#[derive(Default)]
pub struct RepositorySpecRegistry {
    constructors: HashMap<String, Box<dyn RepositorySpecConstructor>>,
}

impl RepositorySpecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the `ctf/v1` constructor this crate ships.
    pub fn with_ctf_v1() -> Self {
        let mut registry = Self::new();
        registry.register(CTF_V1_TYPE, CtfV1Constructor);
        registry
    }

    /// Register a constructor under `type_tag`.
    pub fn register(&mut self, type_tag: impl Into<String>, ctor: impl RepositorySpecConstructor + 'static) {
        self.constructors.insert(type_tag.into(), Box::new(ctor));
    }

    /// Construct a spec from a `{"type": ..., ...}` document.
    pub fn construct(&self, value: &Value) -> Result<Arc<dyn RepositorySpec>> {
        let type_tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidReference("repository spec missing \"type\"".into()))?;
        let ctor = self.constructors.get(type_tag).ok_or_else(|| {
            Error::UnsupportedFormat(format!("no repository spec constructor registered for {type_tag}"))
        })?;
        ctor.construct(value)
    }
}

struct CtfV1Constructor;

impl RepositorySpecConstructor for CtfV1Constructor {
    fn construct(&self, value: &Value) -> Result<Arc<dyn RepositorySpec>> {
        let path = value
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidReference("ctf/v1 repository spec missing \"path\"".into()))?;
        Ok(Arc::new(CtfRepositorySpec::new(path)))
    }
}

/// One entry of the current resolver configuration document (spec §6
/// "Configuration").
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverEntryConfig {
    /// The typed repository spec document, carrying its own `type` field.
    pub repository: Value,
    /// See [`Resolver::prefix`].
    #[serde(default)]
    pub prefix: String,
    /// See [`Resolver::priority`].
    #[serde(default)]
    pub priority: i64,
}

/// The current resolver configuration document: a list of resolver entries.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// The configured resolvers, in their original (pre-sort) order.
    pub resolvers: Vec<ResolverEntryConfig>,
}

/// The legacy (v1) resolver configuration entry: identical to
/// [`ResolverEntryConfig`] plus a silently-ignored `aliases` field (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverEntryConfigV1 {
    /// See [`ResolverEntryConfig::repository`].
    pub repository: Value,
    /// See [`Resolver::prefix`].
    #[serde(default)]
    pub prefix: String,
    /// See [`Resolver::priority`].
    #[serde(default)]
    pub priority: i64,
    /// Ignored; present only for backward decode compatibility.
    #[serde(default)]
    pub aliases: Option<Value>,
}

/// The legacy (v1) resolver configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfigV1 {
    /// The configured resolvers, in their original (pre-sort) order.
    pub resolvers: Vec<ResolverEntryConfigV1>,
}

/// Convert a current-version configuration into runtime [`Resolver`] values
/// via `registry` (spec §6 "Conversion ... instantiates each repository
/// spec from a pluggable type scheme").
pub fn resolve_config(config: &ResolverConfig, registry: &RepositorySpecRegistry) -> Result<Vec<Resolver>> {
    config
        .resolvers
        .iter()
        .map(|entry| {
            Ok(Resolver {
                repository_spec: registry.construct(&entry.repository)?,
                prefix: entry.prefix.clone(),
                priority: entry.priority,
            })
        })
        .collect()
}

/// Convert a legacy (v1) configuration, warning once per entry that carries
/// an `aliases` field (spec §6: "silently ignored with a warning log").
pub fn resolve_config_v1(config: &ResolverConfigV1, registry: &RepositorySpecRegistry) -> Result<Vec<Resolver>> {
    config
        .resolvers
        .iter()
        .map(|entry| {
            if entry.aliases.is_some() {
                tracing::warn!(prefix = %entry.prefix, "ignoring aliases field in legacy (v1) resolver config entry");
            }
            Ok(Resolver {
                repository_spec: registry.construct(&entry.repository)?,
                prefix: entry.prefix.clone(),
                priority: entry.priority,
            })
        })
        .collect()
}
