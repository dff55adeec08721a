//! The component-descriptor-as-OCI-artifact layout (spec §4.4 "Component-descriptor
//! layout in OCI"): descriptor tar layer, component-config blob, image manifest,
//! and an optional wrapping image index when the caller supplies additional
//! descriptor manifests.

use std::io::Read;

use fn_error_context::context;
use oci_spec::image::{
    Descriptor, DescriptorBuilder, ImageIndexBuilder, ImageManifest, ImageManifestBuilder,
    MediaType, SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};

use crate::descriptor::ComponentDescriptor;
use crate::digest::{Algorithm, Digest};
use crate::error::{Error, Result};
use crate::oci::adapter::{
    component_version_annotations, OciAdapter, COMPONENT_CONFIG_MEDIA_TYPE,
    COMPONENT_DESCRIPTOR_MEDIA_TYPE,
};
use crate::oci::reference::Reference;

/// Conventional inner filename of the single-file descriptor tar (spec §4.4
/// item 1: "a conventional inner filename").
const DESCRIPTOR_TAR_ENTRY: &str = "component-descriptor.yaml";

/// The component-config blob (spec §4.4 item 2): references the descriptor
/// layer by digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ComponentConfig {
    #[serde(rename = "componentDescriptorLayer")]
    component_descriptor_layer: Descriptor,
}

/// Wrap `bytes` in a single-file tar named [`DESCRIPTOR_TAR_ENTRY`].
fn wrap_descriptor_tar(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, DESCRIPTOR_TAR_ENTRY, bytes)?;
    Ok(builder.into_inner()?)
}

/// Extract the single entry from a descriptor tar, regardless of its name
/// (older descriptors may have used a different conventional name).
fn unwrap_descriptor_tar(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(bytes);
    let mut entries = archive.entries()?;
    let mut entry = entries
        .next()
        .ok_or_else(|| Error::NotFound("descriptor tar has no entries".into()))??;
    let mut out = Vec::new();
    entry.read_to_end(&mut out)?;
    Ok(out)
}

fn push_json_blob<T: Serialize>(
    adapter: &OciAdapter,
    value: &T,
    media_type: MediaType,
) -> Result<Descriptor> {
    let bytes = serde_json::to_vec(value)?;
    push_bytes_blob(adapter, &bytes, media_type)
}

fn push_bytes_blob(adapter: &OciAdapter, bytes: &[u8], media_type: MediaType) -> Result<Descriptor> {
    let digest = Digest::compute(Algorithm::Sha256, &mut &bytes[..])?;
    let desc = DescriptorBuilder::default()
        .media_type(media_type)
        .digest(digest.to_string())
        .size(bytes.len() as i64)
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;
    adapter.push(&desc, &bytes[..])?;
    Ok(desc)
}

/// Push a component descriptor as the four-artifact OCI layout described in
/// spec §4.4, and tag the top-level artifact under
/// `component-descriptors/<name>:<version>`.
///
/// `additional_layers` are appended after the descriptor layer on the
/// primary manifest; `additional_manifests` are descriptors of other
/// manifests to fold into a wrapping image index alongside the primary one
/// — present if and only if the index wrapper is produced, per spec.
#[context("Pushing component descriptor {}:{}", descriptor.component.name, descriptor.component.version)]
pub fn push_component_descriptor(
    adapter: &OciAdapter,
    descriptor: &ComponentDescriptor,
    additional_layers: &[Descriptor],
    additional_manifests: &[Descriptor],
    creator: Option<&str>,
) -> Result<Descriptor> {
    let name = &descriptor.component.name;
    let version = &descriptor.component.version;

    let descriptor_tar = wrap_descriptor_tar(&descriptor.to_yaml()?)?;
    let descriptor_layer = push_bytes_blob(
        adapter,
        &descriptor_tar,
        MediaType::Other(COMPONENT_DESCRIPTOR_MEDIA_TYPE.to_string()),
    )?;

    let config = ComponentConfig {
        component_descriptor_layer: descriptor_layer.clone(),
    };
    let config_desc = push_json_blob(
        adapter,
        &config,
        MediaType::Other(COMPONENT_CONFIG_MEDIA_TYPE.to_string()),
    )?;

    let mut layers = vec![descriptor_layer];
    layers.extend(additional_layers.iter().cloned());

    let manifest = ImageManifestBuilder::default()
        .schema_version(SCHEMA_VERSION)
        .config(config_desc)
        .layers(layers)
        .annotations(component_version_annotations(name, version, creator))
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;
    let manifest_desc = push_json_blob(adapter, &manifest, MediaType::ImageManifest)?;

    let top_level = if additional_manifests.is_empty() {
        manifest_desc
    } else {
        let mut manifests = vec![manifest_desc];
        manifests.extend(additional_manifests.iter().cloned());
        let index = ImageIndexBuilder::default()
            .schema_version(SCHEMA_VERSION)
            .manifests(manifests)
            .annotations(component_version_annotations(name, version, creator))
            .build()
            .map_err(|e| anyhow::anyhow!(e))?;
        push_json_blob(adapter, &index, MediaType::ImageIndex)?
    };

    let reference = Reference::for_component_version(name, version);
    adapter.tag(&top_level, &reference)?;
    Ok(top_level)
}

/// The exact inverse of [`push_component_descriptor`]: resolve the tag,
/// follow manifest/index → config → descriptor layer, and decode the
/// descriptor (spec §4.4 "Retrieval is the exact inverse").
#[context("Getting component descriptor {name}:{version}")]
pub fn get_component_descriptor(
    adapter: &OciAdapter,
    name: &str,
    version: &str,
) -> Result<ComponentDescriptor> {
    let reference = Reference::for_component_version(name, version);
    let top_level = adapter.resolve(&reference)?;

    let manifest_desc = if is_image_index(&top_level) {
        let mut bytes = Vec::new();
        adapter.fetch(&top_level)?.read_to_end(&mut bytes)?;
        let index: oci_spec::image::ImageIndex = serde_json::from_slice(&bytes)?;
        index
            .manifests()
            .first()
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("empty image index for {reference}")))?
    } else {
        top_level
    };

    let manifest: ImageManifest = {
        let mut bytes = Vec::new();
        adapter.fetch(&manifest_desc)?.read_to_end(&mut bytes)?;
        serde_json::from_slice(&bytes)?
    };

    let config: ComponentConfig = {
        let mut bytes = Vec::new();
        adapter.fetch(manifest.config())?.read_to_end(&mut bytes)?;
        serde_json::from_slice(&bytes)?
    };

    let descriptor_tar = {
        let mut bytes = Vec::new();
        adapter
            .fetch(&config.component_descriptor_layer)?
            .read_to_end(&mut bytes)?;
        bytes
    };
    let yaml = unwrap_descriptor_tar(&descriptor_tar)?;
    ComponentDescriptor::from_yaml(&yaml)
}

fn is_image_index(desc: &Descriptor) -> bool {
    matches!(desc.media_type(), MediaType::ImageIndex)
        || desc.media_type().to_string().contains("image.index")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctf::engine::{Ctf, OpenFlags};
    use crate::descriptor::{Component, Meta};
    use camino::Utf8PathBuf;

    fn temp_ctf() -> Ctf {
        let dir = tempfile::tempdir().unwrap().keep();
        let path = Utf8PathBuf::try_from(dir).unwrap().join("ctf");
        Ctf::open(&path, OpenFlags::create()).unwrap()
    }

    fn sample_descriptor() -> ComponentDescriptor {
        ComponentDescriptor {
            meta: Meta { version: "v2".into() },
            component: Component {
                name: "github.com/acme.org/helloworld".into(),
                version: "1.0.0".into(),
                provider: "acme.org".into(),
                resources: Vec::new(),
                sources: Vec::new(),
                references: Vec::new(),
                signatures: Vec::new(),
            },
        }
    }

    #[test]
    fn push_then_get_roundtrips_byte_for_byte() {
        let ctf = temp_ctf();
        let adapter = OciAdapter::new(&ctf);
        let descriptor = sample_descriptor();
        push_component_descriptor(&adapter, &descriptor, &[], &[], Some("test-suite")).unwrap();

        let fetched =
            get_component_descriptor(&adapter, &descriptor.component.name, &descriptor.component.version)
                .unwrap();
        assert_eq!(fetched, descriptor);
    }

    #[test]
    fn get_missing_component_version_is_not_found() {
        let ctf = temp_ctf();
        let adapter = OciAdapter::new(&ctf);
        let err = get_component_descriptor(&adapter, "nope", "1.0.0").unwrap_err();
        assert!(err.is_not_found());
    }
}
