//! Blob store (spec §4.1, Component A).

use std::io::Read;
use std::sync::{Arc, RwLock};

use cap_std::fs::Dir;

use crate::digest::Digest;
use crate::error::Result;

/// A finite byte stream, optionally size- and digest-known, optionally
/// media-type-aware (spec §3 "Blob").
///
/// `reader()` may be called multiple times; each call yields a fresh stream
/// from offset 0. A blob does not own its backing store: it borrows from it
/// (see [`FileBlob`]).
pub trait Blob: Send + Sync {
    /// Open a fresh reader over this blob's content, from offset 0.
    fn reader(&self) -> Result<Box<dyn Read + Send>>;

    /// The blob's size in bytes, if known without reading the whole stream.
    fn size(&self) -> Option<u64>;

    /// The blob's digest, if already known (computed or declared).
    ///
    /// Discovering a digest after reading lazily caches it; implementations
    /// that can only learn the digest by reading (e.g. [`FileBlob`]) do so on
    /// first call and memoize the result.
    fn digest(&self) -> Option<Digest>;

    /// The blob's declared media type, if known.
    fn media_type(&self) -> Option<String>;
}

/// An in-memory blob: all bytes held directly.
#[derive(Debug, Clone)]
pub struct MemoryBlob {
    data: Arc<[u8]>,
    digest: Digest,
    media_type: Option<String>,
}

impl MemoryBlob {
    /// Wrap `data`, computing its digest eagerly (in-memory blobs remember
    /// all bytes, so there is no laziness to gain by deferring it).
    pub fn new(data: impl Into<Arc<[u8]>>, algorithm: crate::digest::Algorithm) -> Result<Self> {
        let data = data.into();
        let mut slice: &[u8] = &data;
        let digest = Digest::compute(algorithm, &mut slice)?;
        Ok(Self {
            data,
            digest,
            media_type: None,
        })
    }

    /// Attach a media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

impl Blob for MemoryBlob {
    fn reader(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::io::Cursor::new(self.data.clone())))
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn digest(&self) -> Option<Digest> {
        Some(self.digest.clone())
    }

    fn media_type(&self) -> Option<String> {
        self.media_type.clone()
    }
}

/// A filesystem-backed blob: re-opens its backing file on every `reader()`
/// call. Holds a borrowed reference to the filesystem view plus a
/// precomputed path, per spec §9 "Cyclic references between blob and store":
/// closing a handle releases the underlying file without preventing the
/// store from being released.
pub struct FileBlob {
    dir: Arc<Dir>,
    path: camino::Utf8PathBuf,
    size: u64,
    media_type: Option<String>,
    digest_cache: RwLock<Option<Digest>>,
}

impl FileBlob {
    /// Construct a handle for a file at `path` within `dir`, of known `size`.
    pub fn new(
        dir: Arc<Dir>,
        path: impl Into<camino::Utf8PathBuf>,
        size: u64,
        media_type: Option<String>,
    ) -> Self {
        Self {
            dir,
            path: path.into(),
            size,
            media_type,
            digest_cache: RwLock::new(None),
        }
    }

    /// Construct a handle with a digest already known, avoiding a later
    /// recompute (used when the digest came from the CTF index entry).
    pub fn with_known_digest(
        dir: Arc<Dir>,
        path: impl Into<camino::Utf8PathBuf>,
        size: u64,
        media_type: Option<String>,
        digest: Digest,
    ) -> Self {
        let blob = Self::new(dir, path, size, media_type);
        *blob.digest_cache.write().unwrap() = Some(digest);
        blob
    }

    fn open(&self) -> Result<cap_std::fs::File> {
        self.dir.open(self.path.as_std_path()).map_err(Into::into)
    }
}

impl Blob for FileBlob {
    fn reader(&self) -> Result<Box<dyn Read + Send>> {
        let f = self.open()?;
        Ok(Box::new(f.into_std()))
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn digest(&self) -> Option<Digest> {
        // Reads check under a read lock; populate under a write lock; once
        // set, the digest is immutable (spec §5).
        if let Some(d) = self.digest_cache.read().unwrap().clone() {
            return Some(d);
        }
        let mut f = match self.open() {
            Ok(f) => f.into_std(),
            Err(_) => return None,
        };
        let digest = Digest::compute(crate::digest::Algorithm::Sha256, &mut f).ok()?;
        *self.digest_cache.write().unwrap() = Some(digest.clone());
        Some(digest)
    }

    fn media_type(&self) -> Option<String> {
        self.media_type.clone()
    }
}

/// A cancellation signal threaded through long-running operations (spec §5).
///
/// Cooperative: checked at I/O boundaries, never forcibly interrupts a read
/// in progress.
pub trait CancellationToken: Send + Sync {
    /// Returns an error if cancellation has been requested, `Ok(())` otherwise.
    fn check(&self) -> std::io::Result<()>;
}

/// A token that is never cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancelled;

impl CancellationToken for NeverCancelled {
    fn check(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A reader wrapper that checks a [`CancellationToken`] before and after
/// each read (spec §4.1 "Context-bound reader").
pub struct CancellableRead<R> {
    inner: R,
    token: Arc<dyn CancellationToken>,
}

impl<R: Read> CancellableRead<R> {
    /// Wrap `inner`, checking `token` around every read.
    pub fn new(inner: R, token: Arc<dyn CancellationToken>) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancellableRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.token.check()?;
        let n = self.inner.read(buf)?;
        self.token.check()?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Algorithm;

    #[test]
    fn memory_blob_roundtrip() {
        let b = MemoryBlob::new(b"hello".to_vec(), Algorithm::Sha256).unwrap();
        let mut buf = Vec::new();
        b.reader().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(b.size(), Some(5));
        assert!(b.digest().is_some());
    }

    struct Cancelled;
    impl CancellationToken for Cancelled {
        fn check(&self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "cancelled"))
        }
    }

    #[test]
    fn cancellable_read_yields_token_error() {
        let data: &[u8] = b"hello";
        let mut r = CancellableRead::new(data, Arc::new(Cancelled));
        let mut buf = [0u8; 5];
        let err = r.read(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn cancellable_read_passes_through_when_not_cancelled() {
        let data: &[u8] = b"hello";
        let mut r = CancellableRead::new(data, Arc::new(NeverCancelled));
        let mut buf = [0u8; 5];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }
}
