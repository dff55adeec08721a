//! The fallback repository (spec §4.6, Component F): a prioritized,
//! prefix-filtered router over multiple [`ComponentVersionRepository`]
//! instances, lazily opened and memoized by spec identity.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::blob::Blob;
use crate::descriptor::{ComponentDescriptor, Identity, ResourceRef};
use crate::error::{Error, MultiError, Result};
use crate::provider::{CredentialResolver, RepositoryProvider};
use crate::repository::ComponentVersionRepository;
use crate::resolver::{prefix_matches, Resolver};

/// A prioritized, prefix-matched, read-write router over multiple
/// [`ComponentVersionRepository`] instances (spec §4.6).
pub struct FallbackRepository {
    resolvers: Vec<Resolver>,
    provider: Arc<dyn RepositoryProvider>,
    credential_resolver: Option<Arc<dyn CredentialResolver>>,
    opened: Mutex<HashMap<String, Arc<dyn ComponentVersionRepository>>>,
}

impl FallbackRepository {
    /// Build a router over `resolvers`, using `provider` to lazily open each
    /// underlying repository on demand.
    pub fn new(resolvers: Vec<Resolver>, provider: Arc<dyn RepositoryProvider>) -> Self {
        Self {
            resolvers,
            provider,
            credential_resolver: None,
            opened: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a credential resolver consulted before each (re-)open.
    /// `CredentialsNotFound` is treated as "proceed without credentials"
    /// (spec §7).
    pub fn with_credential_resolver(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.credential_resolver = Some(resolver);
        self
    }

    /// Resolvers whose prefix matches `name`, sorted by descending priority;
    /// ties broken by original list order (spec §4.6 "Ordering" — a stable
    /// sort).
    fn matching_sorted(&self, name: &str) -> Vec<&Resolver> {
        let mut matching: Vec<&Resolver> = self
            .resolvers
            .iter()
            .filter(|r| prefix_matches(&r.prefix, name))
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));
        matching
    }

    /// Open (or return the cached) repository for `resolver`'s spec.
    /// Open failures are never cached — the spec says they are "deferred
    /// until that resolver is actually consulted", i.e. retried each time.
    fn open_repository(&self, resolver: &Resolver) -> Result<Arc<dyn ComponentVersionRepository>> {
        let key = resolver.repository_spec.spec_key();
        if let Some(repo) = self.opened.lock().unwrap().get(&key).cloned() {
            return Ok(repo);
        }

        let credentials = self.resolve_credentials(resolver)?;
        let repo = self.provider.provide(resolver.repository_spec.as_ref(), &credentials)?;
        self.opened.lock().unwrap().insert(key, repo.clone());
        Ok(repo)
    }

    fn resolve_credentials(&self, resolver: &Resolver) -> Result<HashMap<String, String>> {
        let Some(credential_resolver) = &self.credential_resolver else {
            return Ok(HashMap::new());
        };
        let identity = self.provider.consumer_identity(resolver.repository_spec.as_ref());
        match credential_resolver.resolve(&identity) {
            Ok(creds) => Ok(creds),
            Err(e) if e.is_not_found() => Ok(HashMap::new()),
            Err(e) => Err(e),
        }
    }

    /// Emit the one debug log record this router produces per yielded
    /// repository (spec §4.6 Observability: the sole channel by which an
    /// observer learns which backend was chosen).
    fn log_yield(&self, resolver: &Resolver, component: &str) {
        tracing::debug!(
            repository = %resolver.repository_spec.to_json(),
            component,
            priority = resolver.priority,
            "yielding repository for component"
        );
    }

    /// Walk sorted candidates, trying to open each; an open failure aborts
    /// the whole operation immediately (spec §4.6: used by the `get*`
    /// operations, where a non-existing fallback *does* cause failure when
    /// reached).
    fn open_abort_on_failure(&self, resolver: &Resolver) -> Result<Arc<dyn ComponentVersionRepository>> {
        self.open_repository(resolver)
    }

    /// Walk sorted candidates, skipping any whose open fails, until one
    /// opens successfully (spec §4.6: used by the `add*` operations — "the
    /// first candidate that *opens successfully*" receives the write; only
    /// that candidate's own failure aborts the operation).
    fn open_first_available<'a>(
        &self,
        candidates: &[&'a Resolver],
    ) -> Result<(&'a Resolver, Arc<dyn ComponentVersionRepository>)> {
        let mut open_errors = Vec::new();
        for resolver in candidates {
            match self.open_repository(resolver) {
                Ok(repo) => return Ok((resolver, repo)),
                Err(e) => open_errors.push(e),
            }
        }
        if open_errors.is_empty() {
            Err(Error::NotFound("no resolver's prefix matches this component name".into()))
        } else {
            Err(Error::Multi(MultiError(open_errors)))
        }
    }

    /// `getComponentVersion` (spec §4.6 table).
    pub fn get_component_version(&self, name: &str, version: &str) -> Result<ComponentDescriptor> {
        for resolver in self.matching_sorted(name) {
            let repo = self.open_abort_on_failure(resolver)?;
            self.log_yield(resolver, name);
            match repo.get_component_version(name, version) {
                Ok(descriptor) => return Ok(descriptor),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::NotFound(format!("{name}:{version}")))
    }

    /// `listComponentVersions` (spec §4.6 table): fail-fast on any matching
    /// candidate's open or non-`NotFound` error, dedup by string equality,
    /// preserve first-seen order.
    pub fn list_component_versions(&self, name: &str) -> Result<Vec<String>> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        for resolver in self.matching_sorted(name) {
            let repo = self.open_abort_on_failure(resolver)?;
            self.log_yield(resolver, name);
            for version in repo.list_component_versions(name)? {
                if seen.insert(version.clone()) {
                    result.push(version);
                }
            }
        }
        Ok(result)
    }

    /// `addComponentVersion` (spec §4.6 table): written to the first
    /// candidate that opens successfully; that candidate's write failure is
    /// surfaced directly (spec §9 Open Question 1 — no fallthrough on a
    /// partial write).
    pub fn add_component_version(&self, descriptor: &ComponentDescriptor) -> Result<()> {
        let name = descriptor.component.name.clone();
        let candidates = self.matching_sorted(&name);
        let (resolver, repo) = self.open_first_available(&candidates)?;
        self.log_yield(resolver, &name);
        repo.add_component_version(descriptor)
    }

    /// `getLocalResource` (spec §4.6 table): same semantics as
    /// [`Self::get_component_version`].
    pub fn get_local_resource(
        &self,
        name: &str,
        version: &str,
        identity: &Identity,
    ) -> Result<(Box<dyn Blob>, ResourceRef)> {
        for resolver in self.matching_sorted(name) {
            let repo = self.open_abort_on_failure(resolver)?;
            self.log_yield(resolver, name);
            match repo.get_local_resource(name, version, identity) {
                Ok(hit) => return Ok(hit),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::NotFound(format!("resource {identity:?} in {name}:{version}")))
    }

    /// `addLocalResource` (spec §4.6 table): same semantics as
    /// [`Self::add_component_version`].
    pub fn add_local_resource(
        &self,
        name: &str,
        version: &str,
        resource: &ResourceRef,
        blob: &dyn Blob,
    ) -> Result<ResourceRef> {
        let candidates = self.matching_sorted(name);
        let (resolver, repo) = self.open_first_available(&candidates)?;
        self.log_yield(resolver, name);
        repo.add_local_resource(name, version, resource, blob)
    }

    /// `getLocalSource` (spec §4.6 table): same semantics as
    /// [`Self::get_component_version`].
    pub fn get_local_source(
        &self,
        name: &str,
        version: &str,
        identity: &Identity,
    ) -> Result<(Box<dyn Blob>, ResourceRef)> {
        for resolver in self.matching_sorted(name) {
            let repo = self.open_abort_on_failure(resolver)?;
            self.log_yield(resolver, name);
            match repo.get_local_source(name, version, identity) {
                Ok(hit) => return Ok(hit),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::NotFound(format!("source {identity:?} in {name}:{version}")))
    }

    /// `addLocalSource` (spec §4.6 table): same semantics as
    /// [`Self::add_component_version`].
    pub fn add_local_source(
        &self,
        name: &str,
        version: &str,
        source: &ResourceRef,
        blob: &dyn Blob,
    ) -> Result<ResourceRef> {
        let candidates = self.matching_sorted(name);
        let (resolver, repo) = self.open_first_available(&candidates)?;
        self.log_yield(resolver, name);
        repo.add_local_source(name, version, source, blob)
    }
}
