//! # OCM storage core
//!
//! This crate implements the storage layer of the Open Component Model: a
//! content-addressed Common Transport Format (CTF) store, an OCI-over-CTF
//! adapter that lays out component descriptors as OCI artifacts, and a
//! prioritized fallback router over component-version repositories.
//!
//! ## Layout
//!
//! - [`digest`] / [`blob`] — content addressing and the storage-agnostic
//!   [`blob::Blob`] abstraction (files, memory, cap-std-scoped).
//! - [`ctf`] — the CTF engine itself: on-disk [`ctf::format::Format`]
//!   (directory, tar, tgz), the `{repository,tag}` index, and read-only
//!   compatibility with legacy artifact-set layouts.
//! - [`oci`] — OCI verbs (`resolve`/`fetch`/`push`/`tag`/`tags`) translated
//!   onto a CTF's index and blob pool, plus the four-artifact
//!   component-descriptor layout built on top of them.
//! - [`descriptor`] — the component descriptor document model.
//! - [`repository`] — a typed component-version repository backed by one CTF.
//! - [`resolver`] / [`provider`] — the pluggable repository-spec scheme and
//!   the collaborator interfaces (credential resolution, repository
//!   construction, file-backed blob provisioning) this crate consumes but
//!   does not implement.
//! - [`fallback`] — the prioritized, prefix-filtered router over multiple
//!   component-version repositories.
//!
//! ## Dependency on cap-std
//!
//! Filesystem access goes through [cap-std] so that directory-format CTFs
//! and legacy artifact-set reads stay confined to their own root, which
//! matters when unpacking tar streams from less than fully trusted sources.
//!
//! [cap-std]: https://docs.rs/cap-std/

pub mod blob;
pub mod ctf;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod fallback;
pub mod oci;
pub mod provider;
pub mod repository;
pub mod resolver;

pub use blob::{Blob, FileBlob, MemoryBlob};
pub use ctf::engine::{Ctf, OpenFlags};
pub use descriptor::{Component, ComponentDescriptor, Identity, ResourceRef};
pub use digest::{Algorithm, Digest};
pub use error::{Error, MultiError, Result};
pub use fallback::FallbackRepository;
pub use repository::{ComponentVersionRepository, CtfComponentVersionRepository};
pub use resolver::{CtfRepositorySpec, Resolver, RepositorySpec, RepositorySpecRegistry};

pub use cap_std_ext::cap_std;
pub use oci_spec;
