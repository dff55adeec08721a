//! Component-version repository (spec §4.5, Component E): a typed interface
//! over the OCI-over-CTF adapter for descriptors, local resources, and local
//! sources.

use crate::blob::Blob;
use crate::ctf::engine::Ctf;
use crate::descriptor::{ComponentDescriptor, Identity, ResourceRef};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::oci::adapter::OciAdapter;
use crate::oci::component::{get_component_descriptor, push_component_descriptor};

/// The contract of spec §4.5: descriptor add/get/list, and identity-based
/// local resource/source add/get.
pub trait ComponentVersionRepository: Send + Sync {
    /// `addComponentVersion(descriptor)` — the §4.4 upload sequence.
    fn add_component_version(&self, descriptor: &ComponentDescriptor) -> Result<()>;

    /// `getComponentVersion(name, version) -> descriptor | NotFound`.
    fn get_component_version(&self, name: &str, version: &str) -> Result<ComponentDescriptor>;

    /// `listComponentVersions(name) -> [version]` — all tags under
    /// `component-descriptors/<name>`, stable order within one call.
    fn list_component_versions(&self, name: &str) -> Result<Vec<String>>;

    /// Store `blob` under its digest and return `resource` updated to point
    /// at it via a `LocalBlob` access spec. The caller replaces its copy
    /// with the returned value.
    fn add_local_resource(
        &self,
        name: &str,
        version: &str,
        resource: &ResourceRef,
        blob: &dyn Blob,
    ) -> Result<ResourceRef>;

    /// Look up a resource in `(name, version)`'s descriptor by identity
    /// match and return its blob plus the resource as recorded.
    fn get_local_resource(
        &self,
        name: &str,
        version: &str,
        identity: &Identity,
    ) -> Result<(Box<dyn Blob>, ResourceRef)>;

    /// Symmetric to [`Self::add_local_resource`], for sources.
    fn add_local_source(
        &self,
        name: &str,
        version: &str,
        source: &ResourceRef,
        blob: &dyn Blob,
    ) -> Result<ResourceRef>;

    /// Symmetric to [`Self::get_local_resource`], for sources.
    fn get_local_source(
        &self,
        name: &str,
        version: &str,
        identity: &Identity,
    ) -> Result<(Box<dyn Blob>, ResourceRef)>;
}

/// A [`ComponentVersionRepository`] backed by one CTF via the OCI-over-CTF
/// adapter (spec §4.5, built on Component D).
pub struct CtfComponentVersionRepository {
    ctf: Ctf,
    creator: Option<String>,
}

impl CtfComponentVersionRepository {
    /// Wrap an already-opened CTF. `creator` is attached to pushed manifests'
    /// `software.ocm.creator` annotation (spec §6), if given.
    pub fn new(ctf: Ctf) -> Self {
        Self { ctf, creator: None }
    }

    /// Attach a creator string to manifests this repository pushes.
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    fn adapter(&self) -> OciAdapter<'_> {
        OciAdapter::new(&self.ctf)
    }

    fn store_local(&self, blob: &dyn Blob) -> Result<Digest> {
        let reader = blob.reader()?;
        self.ctf.save_blob(reader, blob.digest())
    }
}

const COMPONENT_DESCRIPTORS_PREFIX: &str = "component-descriptors";

impl ComponentVersionRepository for CtfComponentVersionRepository {
    fn add_component_version(&self, descriptor: &ComponentDescriptor) -> Result<()> {
        push_component_descriptor(&self.adapter(), descriptor, &[], &[], self.creator.as_deref())
            .map(|_| ())
    }

    fn get_component_version(&self, name: &str, version: &str) -> Result<ComponentDescriptor> {
        get_component_descriptor(&self.adapter(), name, version)
    }

    fn list_component_versions(&self, name: &str) -> Result<Vec<String>> {
        let repository = format!("{COMPONENT_DESCRIPTORS_PREFIX}/{name}");
        self.adapter().tags(&repository)
    }

    fn add_local_resource(
        &self,
        _name: &str,
        _version: &str,
        resource: &ResourceRef,
        blob: &dyn Blob,
    ) -> Result<ResourceRef> {
        let digest = self.store_local(blob)?;
        let mut updated = resource.clone();
        updated.access = crate::descriptor::AccessSpec::local_blob(digest.to_string(), blob.media_type());
        updated.digest = Some(digest.to_string());
        Ok(updated)
    }

    fn get_local_resource(
        &self,
        name: &str,
        version: &str,
        identity: &Identity,
    ) -> Result<(Box<dyn Blob>, ResourceRef)> {
        let descriptor = self.get_component_version(name, version)?;
        let resource = descriptor
            .find_resource(identity)
            .ok_or_else(|| Error::NotFound(format!("resource {identity:?} in {name}:{version}")))?
            .clone();
        let blob = local_blob_for(&self.ctf, &resource)?;
        Ok((blob, resource))
    }

    fn add_local_source(
        &self,
        _name: &str,
        _version: &str,
        source: &ResourceRef,
        blob: &dyn Blob,
    ) -> Result<ResourceRef> {
        let digest = self.store_local(blob)?;
        let mut updated = source.clone();
        updated.access = crate::descriptor::AccessSpec::local_blob(digest.to_string(), blob.media_type());
        updated.digest = Some(digest.to_string());
        Ok(updated)
    }

    fn get_local_source(
        &self,
        name: &str,
        version: &str,
        identity: &Identity,
    ) -> Result<(Box<dyn Blob>, ResourceRef)> {
        let descriptor = self.get_component_version(name, version)?;
        let source = descriptor
            .find_source(identity)
            .ok_or_else(|| Error::NotFound(format!("source {identity:?} in {name}:{version}")))?
            .clone();
        let blob = local_blob_for(&self.ctf, &source)?;
        Ok((blob, source))
    }
}

fn local_blob_for(ctf: &Ctf, resource: &ResourceRef) -> Result<Box<dyn Blob>> {
    match &resource.access {
        crate::descriptor::AccessSpec::LocalBlob { local_reference, .. } => {
            let digest = Digest::parse(local_reference)?;
            Ok(Box::new(ctf.get_blob(&digest)?))
        }
        other => Err(Error::NotFound(format!(
            "resource access {:?} is not a local blob",
            other.access_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlob;
    use crate::ctf::engine::OpenFlags;
    use crate::descriptor::{AccessSpec, Component, Identity, Meta};
    use crate::digest::Algorithm;
    use camino::Utf8PathBuf;

    fn temp_repo() -> CtfComponentVersionRepository {
        let dir = tempfile::tempdir().unwrap().keep();
        let path = Utf8PathBuf::try_from(dir).unwrap().join("ctf");
        let ctf = Ctf::open(&path, OpenFlags::create()).unwrap();
        CtfComponentVersionRepository::new(ctf)
    }

    fn identity(name: &str) -> Identity {
        let mut m = Identity::new();
        m.insert("name".into(), name.into());
        m
    }

    fn sample_descriptor(resources: Vec<ResourceRef>) -> ComponentDescriptor {
        ComponentDescriptor {
            meta: Meta { version: "v2".into() },
            component: Component {
                name: "github.com/acme.org/helloworld".into(),
                version: "1.0.0".into(),
                provider: "acme.org".into(),
                resources,
                sources: Vec::new(),
                references: Vec::new(),
                signatures: Vec::new(),
            },
        }
    }

    #[test]
    fn add_then_get_component_version() {
        let repo = temp_repo();
        let descriptor = sample_descriptor(Vec::new());
        repo.add_component_version(&descriptor).unwrap();
        let fetched = repo.get_component_version("github.com/acme.org/helloworld", "1.0.0").unwrap();
        assert_eq!(fetched, descriptor);
    }

    #[test]
    fn list_component_versions_returns_tags() {
        let repo = temp_repo();
        repo.add_component_version(&sample_descriptor(Vec::new())).unwrap();
        let mut second = sample_descriptor(Vec::new());
        second.component.version = "2.0.0".into();
        repo.add_component_version(&second).unwrap();

        let mut versions = repo.list_component_versions("github.com/acme.org/helloworld").unwrap();
        versions.sort();
        assert_eq!(versions, vec!["1.0.0".to_string(), "2.0.0".to_string()]);
    }

    #[test]
    fn write_then_read_local_resource() {
        let repo = temp_repo();
        let blob = MemoryBlob::new(b"payload".to_vec(), Algorithm::Sha256).unwrap();
        let resource = ResourceRef {
            identity: identity("image"),
            access: AccessSpec::local_blob("sha256:placeholder", None),
            digest: None,
        };
        let updated = repo
            .add_local_resource("github.com/acme.org/helloworld", "1.0.0", &resource, &blob)
            .unwrap();
        assert!(matches!(updated.access, AccessSpec::LocalBlob { .. }));

        let descriptor = sample_descriptor(vec![updated]);
        repo.add_component_version(&descriptor).unwrap();

        let (fetched_blob, fetched_resource) = repo
            .get_local_resource("github.com/acme.org/helloworld", "1.0.0", &identity("image"))
            .unwrap();
        assert_eq!(fetched_resource.name(), Some("image"));
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut fetched_blob.reader().unwrap(), &mut buf).unwrap();
        assert_eq!(buf, b"payload");
    }

    #[test]
    fn get_local_resource_missing_identity_is_not_found() {
        let repo = temp_repo();
        repo.add_component_version(&sample_descriptor(Vec::new())).unwrap();
        let err = repo
            .get_local_resource("github.com/acme.org/helloworld", "1.0.0", &identity("nope"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
