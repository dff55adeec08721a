//! The CTF engine (spec §4.3, Component C): open/work/archive lifecycle over
//! a filesystem/TAR/TGZ-backed store of blobs and an index.

use std::io::{Read, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::{Dir, DirBuilderExt};
use cap_std_ext::cap_tempfile;
use cap_std_ext::dirext::CapStdExtDirExt;
use fn_error_context::context;
use tracing::{debug, trace};

use crate::blob::{Blob, FileBlob};
use crate::ctf::archive::{self, scratch_dir_name};
use crate::ctf::format::Format;
use crate::ctf::index::{ArtifactEntry, CtfIndex};
use crate::digest::{Algorithm, Digest};
use crate::error::{Error, Result};

const INDEX_FILE: &str = "artifact-index.json";
const BLOBS_DIR: &str = "blobs";

/// Open flags (spec §4.3 "Open modes"), named after the POSIX constants the
/// spec borrows.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// `O_RDWR` — read/write. If unset, the CTF is read-only (`O_RDONLY`).
    pub write: bool,
    /// `O_CREATE` — create the directory or file if missing.
    pub create: bool,
}

impl OpenFlags {
    /// `O_RDONLY`.
    pub fn read_only() -> Self {
        Self::default()
    }

    /// `O_RDWR`.
    pub fn read_write() -> Self {
        Self {
            write: true,
            create: false,
        }
    }

    /// `O_RDWR | O_CREATE`.
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
        }
    }
}

/// An opened CTF.
pub struct Ctf {
    dir: Arc<Dir>,
    format: Format,
    /// Path the CTF was opened from; for TAR/TGZ this is the archive path,
    /// for DIRECTORY the directory path.
    source_path: Utf8PathBuf,
    /// True when writes must be rejected even though the underlying scratch
    /// directory is physically writable (spec §4.3: TAR/TGZ opened
    /// read-only force the scratch dir's writes to be rejected).
    read_only: bool,
}

impl Ctf {
    /// Open the CTF at `path`, discovering its format from the file
    /// extension (spec §4.3).
    pub fn open(path: &Utf8Path, flags: OpenFlags) -> Result<Self> {
        Self::open_as(path, Format::detect(path), flags)
    }

    /// Open the CTF at `path` as an explicitly chosen format.
    pub fn open_as(path: &Utf8Path, format: Format, flags: OpenFlags) -> Result<Self> {
        match format {
            Format::Directory => Self::open_directory(path, flags),
            Format::Tar | Format::Tgz => Self::open_archive(path, format, flags),
        }
    }

    #[context("Opening CTF directory {path}")]
    fn open_directory(path: &Utf8Path, flags: OpenFlags) -> Result<Self> {
        let authority = cap_std::ambient_authority();
        if flags.create {
            std::fs::create_dir_all(path)?;
        }
        let dir = cap_std::fs::Dir::open_ambient_dir(path, authority)?;
        Ok(Self {
            dir: Arc::new(dir),
            format: Format::Directory,
            source_path: path.to_owned(),
            read_only: !flags.write,
        })
    }

    #[context("Opening CTF archive {path}")]
    fn open_archive(path: &Utf8Path, format: Format, flags: OpenFlags) -> Result<Self> {
        let scratch_root = std::env::temp_dir();
        let scratch_name = scratch_dir_name(path);
        let scratch_path = scratch_root.join(&scratch_name);
        let authority = cap_std::ambient_authority();
        std::fs::create_dir_all(&scratch_path)?;
        let scratch = cap_std::fs::Dir::open_ambient_dir(&scratch_path, authority)?;

        if path.exists() {
            let f = std::fs::File::open(path)?;
            match format {
                Format::Tar => archive::extract_tar(f, &scratch)?,
                Format::Tgz => archive::extract_tgz(f, &scratch)?,
                Format::Directory => unreachable!(),
            }
        } else if !flags.create {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{path} does not exist"),
            )));
        }

        debug!(%path, scratch = %scratch_path.display(), ?format, "extracted CTF archive into scratch directory");

        Ok(Self {
            dir: Arc::new(scratch),
            format,
            source_path: path.to_owned(),
            read_only: !flags.write,
        })
    }

    /// The format this CTF was opened as.
    pub fn format(&self) -> Format {
        self.format
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::UnsupportedFormat(format!(
                "{} is open read-only",
                self.source_path
            )));
        }
        Ok(())
    }

    /// Read the index. A missing or zero-length index file is equivalent to
    /// an empty index (spec §3).
    #[context("Reading CTF index")]
    pub fn get_index(&self) -> Result<CtfIndex> {
        match self.dir.open_optional(INDEX_FILE)? {
            None => Ok(CtfIndex::new()),
            Some(mut f) => {
                let mut buf = Vec::new();
                f.read_to_end(&mut buf)?;
                CtfIndex::decode(&buf)
            }
        }
    }

    /// Replace the index in its entirety.
    pub fn set_index(&self, index: &CtfIndex) -> Result<()> {
        self.ensure_writable()?;
        let bytes = index.encode()?;
        self.dir.atomic_write(INDEX_FILE, bytes)?;
        Ok(())
    }

    /// List all blobs present in the pool (spec §4.3: "enumerates regular
    /// files in `blobs/` and converts filenames to digests").
    pub fn list_blobs(&self) -> Result<Vec<Digest>> {
        let mut digests = Vec::new();
        let entries = match self.dir.read_dir(BLOBS_DIR) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(digests),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(digest) = Digest::from_filename(&name) {
                digests.push(digest);
            }
        }
        Ok(digests)
    }

    /// Open a blob by digest.
    pub fn get_blob(&self, digest: &Digest) -> Result<FileBlob> {
        let path = format!("{BLOBS_DIR}/{}", digest.to_filename());
        let meta = self
            .dir
            .metadata(&path)
            .map_err(|e| map_not_found(e, &digest.to_string()))?;
        Ok(FileBlob::with_known_digest(
            self.dir.clone(),
            path,
            meta.len(),
            None,
            digest.clone(),
        ))
    }

    /// True iff a blob with this digest is present in the pool.
    pub fn has_blob(&self, digest: &Digest) -> bool {
        let path = format!("{BLOBS_DIR}/{}", digest.to_filename());
        self.dir.try_exists(path).unwrap_or(false)
    }

    /// Save a blob's content, computing its digest if `known_digest` is
    /// `None`, or verifying it if given.
    pub fn save_blob(&self, mut data: impl Read, known_digest: Option<Digest>) -> Result<Digest> {
        self.ensure_writable()?;
        let algorithm = known_digest.as_ref().map(|d| d.algorithm).unwrap_or(Algorithm::Sha256);
        let mut db = cap_std::fs::DirBuilder::new();
        db.recursive(true).mode(0o755);
        self.dir.ensure_dir_with(BLOBS_DIR, &db)?;
        let mut tmp = cap_tempfile::TempFile::new(&self.dir)?;
        let mut hasher =
            openssl::hash::Hasher::new(algorithm.message_digest()).map_err(|e| anyhow::anyhow!(e))?;
        let mut buf = [0u8; 8192];
        loop {
            let n = data.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]).map_err(|e| anyhow::anyhow!(e))?;
            tmp.as_file_mut().write_all(&buf[..n])?;
        }
        let computed = Digest {
            algorithm,
            encoded: hex::encode(hasher.finish().map_err(|e| anyhow::anyhow!(e))?),
        };
        if let Some(expected) = &known_digest {
            if expected != &computed {
                return Err(Error::InvalidReference(format!(
                    "declared digest {expected} does not match computed digest {computed}"
                )));
            }
        }
        let dest = format!("{BLOBS_DIR}/{}", computed.to_filename());
        tmp.replace(&dest)?;
        trace!(digest = %computed, "saved blob");
        Ok(computed)
    }

    /// Delete a blob by digest. Deleting an absent blob is a no-op (mirrors
    /// CAS "absence is not an error" semantics for the write side too).
    pub fn delete_blob(&self, digest: &Digest) -> Result<()> {
        self.ensure_writable()?;
        let path = format!("{BLOBS_DIR}/{}", digest.to_filename());
        match self.dir.remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Run `body` against this CTF, then — only if `body` succeeds, this CTF
    /// was opened with write intent, and the original format was TAR or
    /// TGZ — re-archive the scratch directory back to the original path
    /// (spec §4.3 "work within CTF"). If `body` fails the archive is left
    /// untouched.
    pub fn work_within<F, R>(&mut self, body: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let result = body(self)?;
        if self.format != Format::Directory && !self.read_only {
            self.repack()?;
        }
        Ok(result)
    }

    fn repack(&self) -> Result<()> {
        let index = self.get_index()?;
        let dir = self.dir.clone();
        let blob_source = move |digest: &Digest| -> Result<Box<dyn Read>> {
            let path = format!("{BLOBS_DIR}/{}", digest.to_filename());
            Ok(Box::new(dir.open(&path)?.into_std()))
        };
        let out = std::fs::File::create(self.source_path.as_std_path())?;
        match self.format {
            Format::Tar => archive::write_tar(&index, blob_source, out).map(|_| ())?,
            Format::Tgz => archive::write_tgz(&index, blob_source, out)?,
            Format::Directory => unreachable!(),
        }
        debug!(path = %self.source_path, ?self.format, "re-archived CTF");
        Ok(())
    }

    /// Copy every blob from `source` into this (directory-format) CTF in
    /// parallel, then write the merged index — blobs strictly before the
    /// index, per spec §5 (grounded on `ocidir::OciDir::clone_to`,
    /// parallelized as spec §4.3's "Archive writer" directory-format clause
    /// describes).
    pub fn clone_blobs_from(&self, source: &Ctf) -> Result<()> {
        self.ensure_writable()?;
        let digests = source.list_blobs()?;
        let src_dir = source.dir.clone();
        let dst_dir = self.dir.clone();
        let mut db = cap_std::fs::DirBuilder::new();
        db.recursive(true).mode(0o755);
        self.dir.ensure_dir_with(BLOBS_DIR, &db)?;
        archive::copy_blobs_parallel(
            &digests,
            |digest| -> Result<Vec<u8>> {
                let path = format!("{BLOBS_DIR}/{}", digest.to_filename());
                let mut f = src_dir.open(&path)?.into_std();
                let mut buf = Vec::new();
                f.read_to_end(&mut buf)?;
                Ok(buf)
            },
            |digest, bytes| -> Result<()> {
                let path = format!("{BLOBS_DIR}/{}", digest.to_filename());
                dst_dir.atomic_write(&path, bytes)?;
                Ok(())
            },
        )?;
        let source_index = source.get_index()?;
        self.set_index(&source_index)
    }

    /// Access the underlying capability-scoped directory (used by the legacy
    /// reader and the OCI adapter, which both need direct filesystem access
    /// beyond the blob/index primitives above).
    pub(crate) fn dir(&self) -> &Arc<Dir> {
        &self.dir
    }
}

fn map_not_found(e: std::io::Error, what: &str) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(what.to_string())
    } else {
        Error::Io(e)
    }
}
