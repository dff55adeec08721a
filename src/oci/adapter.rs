//! Translates OCI verbs onto CTF primitives (spec §4.4, Component D).

use std::collections::HashMap;
use std::io::Read;

use fn_error_context::context;
use oci_spec::image::{Descriptor, DescriptorBuilder, MediaType};

use crate::blob::Blob;
use crate::ctf::engine::Ctf;
use crate::ctf::index::ArtifactEntry;
use crate::ctf::legacy::LEGACY_ARTIFACT_SET_MEDIA_TYPE;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::oci::reference::Reference;

/// Component-descriptor layer media type (spec §4.4, §6): the descriptor is
/// serialized as YAML, then wrapped in a single-file tar.
pub const COMPONENT_DESCRIPTOR_MEDIA_TYPE: &str =
    "application/vnd.ocm.software.component-descriptor.v2+yaml+tar";
/// Component-config blob media type (spec §4.4, §6).
pub const COMPONENT_CONFIG_MEDIA_TYPE: &str = "application/vnd.ocm.software.component.config.v1+json";

/// `software.ocm.componentversion` OCI annotation key (spec §6).
pub const ANNOTATION_COMPONENT_VERSION: &str = "software.ocm.componentversion";
/// `software.ocm.creator` OCI annotation key (spec §6).
pub const ANNOTATION_CREATOR: &str = "software.ocm.creator";

/// Translates the OCI verbs (resolve/fetch/exists/push/tag/tags) onto a
/// [`Ctf`]'s index and blob pool (spec §4.4).
pub struct OciAdapter<'a> {
    ctf: &'a Ctf,
}

impl<'a> OciAdapter<'a> {
    /// Wrap a CTF for OCI-verb access.
    pub fn new(ctf: &'a Ctf) -> Self {
        Self { ctf }
    }

    /// `fetch(desc) -> stream` — pass-through to `getBlob(desc.digest)`.
    pub fn fetch(&self, desc: &Descriptor) -> Result<Box<dyn Read + Send>> {
        let digest = Digest::parse(desc.digest())?;
        self.ctf.get_blob(&digest)?.reader()
    }

    /// `exists(desc) -> bool` — true iff `listBlobs()` contains the digest.
    /// Filesystem "not found" maps to `false`, not an error.
    pub fn exists(&self, desc: &Descriptor) -> Result<bool> {
        let digest = Digest::parse(desc.digest())?;
        Ok(self.ctf.has_blob(&digest))
    }

    /// `push(desc, stream)` — save a blob whose declared digest and size
    /// come from `desc`.
    pub fn push(&self, desc: &Descriptor, stream: impl Read) -> Result<()> {
        let declared = Digest::parse(desc.digest())?;
        let saved = self.ctf.save_blob(stream, Some(declared))?;
        if saved.to_string() != desc.digest() {
            return Err(Error::InvalidReference(format!(
                "pushed content digest {saved} does not match declared descriptor digest {}",
                desc.digest()
            )));
        }
        Ok(())
    }

    /// `resolve(ref) -> desc` — scan the index for `(repository, tag)`; on a
    /// hit, open the blob to learn its size. A missing `mediaType` on the
    /// index entry falls back to the legacy artifact-set media type (old
    /// CTFs never recorded one).
    #[context("Resolving {reference}")]
    pub fn resolve(&self, reference: &Reference) -> Result<Descriptor> {
        let index = self.ctf.get_index()?;
        let tag = reference.require_tag().unwrap_or_default();
        let entry = index
            .find(reference.repository(), tag)
            .ok_or_else(|| Error::NotFound(format!("no entry for {reference}")))?;
        let digest = Digest::parse(&entry.digest)?;
        let blob = self.ctf.get_blob(&digest)?;
        let size = blob.size().unwrap_or(0);
        let media_type = entry
            .media_type
            .clone()
            .unwrap_or_else(|| LEGACY_ARTIFACT_SET_MEDIA_TYPE.to_string());
        Ok(DescriptorBuilder::default()
            .media_type(MediaType::Other(media_type))
            .digest(entry.digest.clone())
            .size(size as i64)
            .build()
            .map_err(|e| anyhow::anyhow!(e))?)
    }

    /// `tag(desc, ref)` — validate the reference carries a tag; upsert the
    /// `(repository, tag) -> (digest, mediaType)` entry; persist the index.
    pub fn tag(&self, desc: &Descriptor, reference: &Reference) -> Result<()> {
        let tag = reference.require_tag()?;
        let mut index = self.ctf.get_index()?;
        index.upsert_artifact(ArtifactEntry {
            repository: reference.repository().to_string(),
            tag: Some(tag.to_string()),
            digest: desc.digest().to_string(),
            media_type: Some(media_type_string(desc.media_type())),
        });
        self.ctf.set_index(&index)
    }

    /// `tags(repository) -> [tag]` — tags recorded for `repository`.
    pub fn tags(&self, repository: &str) -> Result<Vec<String>> {
        Ok(self.ctf.get_index()?.tags_for(repository))
    }
}

fn media_type_string(m: &MediaType) -> String {
    match m {
        MediaType::Other(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Annotations attached to a component-descriptor manifest (spec §6).
pub fn component_version_annotations(name: &str, version: &str, creator: Option<&str>) -> HashMap<String, String> {
    let mut annotations = HashMap::new();
    annotations.insert(
        ANNOTATION_COMPONENT_VERSION.to_string(),
        format!("component-descriptors/{name}:{version}"),
    );
    if let Some(creator) = creator {
        annotations.insert(ANNOTATION_CREATOR.to_string(), creator.to_string());
    }
    annotations
}
