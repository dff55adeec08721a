//! Legacy "artifact set" read compatibility (spec §4.3, §9).
//!
//! Historically a CTF nests a legacy archive (gzipped tar) inside a blob
//! whose declared media type ends in `+tar+gzip`. This module opens such a
//! nested archive read-only and exposes just enough to retrieve its index
//! and manifests; it is intentionally not extensible (spec §9 "Legacy
//! read-only paths") — writing only ever targets the current layout
//! ([`crate::ctf::engine::Ctf`]).

use std::collections::HashSet;
use std::io::Read;

use cap_std::fs::Dir;
use cap_std_ext::dirext::CapStdExtDirExt;
use serde_json::Value;

use crate::ctf::archive::extract_tgz;
use crate::digest::Digest;
use crate::error::{Error, Result};

/// A media type suffix marking a blob as a legacy artifact set (spec §6).
pub const LEGACY_MARKER_SUFFIX: &str = "+tar+gzip";

/// Substitute media type for index entries that predate `mediaType`
/// recording (spec §4.4 `resolve`).
pub const LEGACY_ARTIFACT_SET_MEDIA_TYPE: &str = "application/vnd.ocm.software.artifactset.v1+tar+gzip";

/// True if `media_type` marks a legacy nested artifact set.
pub fn is_legacy_marker(media_type: &str) -> bool {
    media_type.ends_with(LEGACY_MARKER_SUFFIX)
}

/// The three recognized internal layouts (spec §4.3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyLayout {
    /// `index.json` (OCI image index v1) + flat `blobs/<algo>.<encoded>`.
    LegacyOci,
    /// `artifact-descriptor.json` + flat `blobs/<algo>.<encoded>`.
    LegacyOcm,
    /// `index.json` + `oci-layout` + `blobs/<algo>/<encoded>` subdirectories.
    ModernOci,
}

/// A read-only view over an extracted legacy artifact set.
pub struct LegacyArtifactSet {
    dir: Dir,
    layout: LegacyLayout,
    document: Value,
}

impl LegacyArtifactSet {
    /// Extract a gzip-over-tar blob into a fresh scratch directory and
    /// detect its internal layout (spec §4.3 "Detection order").
    pub fn open_from_tgz(reader: impl Read, scratch: Dir) -> Result<Self> {
        extract_tgz(reader, &scratch)?;
        Self::open(scratch)
    }

    /// Detect the layout of an already-extracted directory.
    pub fn open(dir: Dir) -> Result<Self> {
        if let Some(mut f) = dir.open_optional("index.json")? {
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            let document: Value = serde_json::from_slice(&buf)?;
            let modern = has_algo_subdir(&dir)?;
            let layout = if modern {
                LegacyLayout::ModernOci
            } else {
                LegacyLayout::LegacyOci
            };
            return Ok(Self { dir, layout, document });
        }
        if let Some(mut f) = dir.open_optional("artifact-descriptor.json")? {
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            let document: Value = serde_json::from_slice(&buf)?;
            return Ok(Self {
                dir,
                layout: LegacyLayout::LegacyOcm,
                document,
            });
        }
        Err(Error::NotFound(
            "neither index.json nor artifact-descriptor.json present".into(),
        ))
    }

    /// Which of the three layouts this artifact set uses.
    pub fn layout(&self) -> LegacyLayout {
        self.layout
    }

    /// The raw decoded index/descriptor document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// The manifests recorded by this artifact set, as raw JSON values.
    ///
    /// For [`LegacyLayout::LegacyOci`]/[`LegacyLayout::ModernOci`] this is
    /// the OCI image index's `manifests` array; for
    /// [`LegacyLayout::LegacyOcm`] a single-descriptor `artifact-descriptor.json`
    /// is treated as a one-element list.
    pub fn manifests(&self) -> Vec<Value> {
        match self.document.get("manifests").and_then(Value::as_array) {
            Some(arr) => arr.clone(),
            None => vec![self.document.clone()],
        }
    }

    /// Read a blob by digest, respecting this layout's blob path convention.
    pub fn read_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = match self.layout {
            LegacyLayout::ModernOci => {
                format!("blobs/{}/{}", digest.algorithm, digest.encoded)
            }
            LegacyLayout::LegacyOci | LegacyLayout::LegacyOcm => {
                format!("blobs/{}", digest.to_filename())
            }
        };
        let mut f = self.dir.open(&path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Write this artifact set out as a modern OCI image layout (spec §4.3
    /// "conversion to a modern OCI image layout is provided", §9 "Provide a
    /// one-way converter rather than bidirectional maintenance"): an
    /// `oci-layout` marker, an `index.json` reshaped to a top-level
    /// `manifests` array, and every referenced blob recopied under
    /// `blobs/<algorithm>/<encoded>`.
    ///
    /// `LegacyOcm`'s single `artifact-descriptor.json` has no `manifests`
    /// wrapper, so it is promoted to a one-element index. Blob discovery
    /// walks the index document (and every JSON blob it references, and so
    /// on) for `digest` fields rather than hardcoding the manifest/config/
    /// layer shape, so nested references this crate has no opinion about the
    /// shape of are still carried over.
    pub fn convert_to_modern_oci(&self, dest: &Dir) -> Result<()> {
        dest.atomic_write("oci-layout", br#"{"imageLayoutVersion":"1.0.0"}"#)?;

        let index_document = match self.layout {
            LegacyLayout::ModernOci | LegacyLayout::LegacyOci => self.document.clone(),
            LegacyLayout::LegacyOcm => serde_json::json!({
                "schemaVersion": 2,
                "manifests": [self.document.clone()],
            }),
        };

        let mut seen = HashSet::new();
        let mut stack = vec![index_document.clone()];
        while let Some(value) = stack.pop() {
            match value {
                Value::Object(map) => {
                    if let Some(digest_str) = map.get("digest").and_then(Value::as_str) {
                        if seen.insert(digest_str.to_string()) {
                            let digest = Digest::parse(digest_str)?;
                            let bytes = self.read_blob(&digest)?;
                            let dest_path = format!("blobs/{}/{}", digest.algorithm, digest.encoded);
                            dest.create_dir_all(format!("blobs/{}", digest.algorithm))?;
                            dest.atomic_write(&dest_path, &bytes)?;
                            if let Ok(nested) = serde_json::from_slice::<Value>(&bytes) {
                                stack.push(nested);
                            }
                        }
                    }
                    stack.extend(map.into_values());
                }
                Value::Array(arr) => stack.extend(arr),
                _ => {}
            }
        }

        dest.atomic_write("index.json", serde_json::to_vec(&index_document)?)?;
        Ok(())
    }
}

fn has_algo_subdir(dir: &Dir) -> Result<bool> {
    let Some(blobs) = dir.open_dir_optional("blobs")? else {
        return Ok(false);
    };
    for entry in blobs.entries()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            return Ok(true);
        }
    }
    Ok(false)
}
