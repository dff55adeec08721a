//! CTF format detection (spec §4.3).

use camino::Utf8Path;

use crate::error::{Error, Result};

/// The three on-disk/archived CTF layouts (spec §3 "CTF store").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// A plain directory tree.
    Directory,
    /// A single (uncompressed) tar stream.
    Tar,
    /// Gzip over tar.
    Tgz,
}

impl Format {
    /// Discover the format from a path's file extension: `.tgz`/`.tar.gz` →
    /// [`Format::Tgz`], `.tar` → [`Format::Tar`], anything else → [`Format::Directory`].
    pub fn detect(path: &Utf8Path) -> Self {
        let name = path.file_name().unwrap_or("");
        if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
            Format::Tgz
        } else if name.ends_with(".tar") {
            Format::Tar
        } else {
            Format::Directory
        }
    }

    /// Parse an explicit format name (`"directory"`, `"tar"`, `"tgz"`).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "directory" => Ok(Format::Directory),
            "tar" => Ok(Format::Tar),
            "tgz" => Ok(Format::Tgz),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}
