//! The OCI reference grammar used by the adapter (spec §4.4): `repository[:tag][@digest]`.
//!
//! References carry no registry component in CTF scope. To reuse
//! `oci_distribution`'s reference parser without inventing a parallel
//! grammar, a synthetic `CTF/` registry is prepended before parsing and
//! stripped back off afterward — no network registry is ever consulted.

use oci_distribution::Reference as OciDistributionReference;

use crate::error::{Error, Result};

const SYNTHETIC_REGISTRY: &str = "CTF";

/// A parsed `repository[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    /// Parse `s` per spec §4.4's reference grammar.
    pub fn parse(s: &str) -> Result<Self> {
        let synthetic = format!("{SYNTHETIC_REGISTRY}/{s}");
        let parsed: OciDistributionReference = synthetic
            .parse()
            .map_err(|e: oci_distribution::ParseError| {
                Error::InvalidReference(format!("invalid reference {s}: {e}"))
            })?;
        let repository = parsed
            .repository()
            .strip_prefix(&format!("{SYNTHETIC_REGISTRY}/"))
            .unwrap_or(parsed.repository())
            .to_string();
        Ok(Self {
            repository,
            tag: parsed.tag().map(str::to_string),
            digest: parsed.digest().map(str::to_string),
        })
    }

    /// The canonical reference for component version `(name, version)`
    /// (spec §4.4: `component-descriptors/<component>:<version>`).
    pub fn for_component_version(name: &str, version: &str) -> Self {
        Self {
            repository: format!("component-descriptors/{name}"),
            tag: Some(version.to_string()),
            digest: None,
        }
    }

    /// The repository path (no registry, no tag, no digest).
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The tag component, if present.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The digest component, if present.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Require a tag, for verbs that cannot operate on a bare digest
    /// reference (spec §4.4 `tag`).
    pub fn require_tag(&self) -> Result<&str> {
        self.tag
            .as_deref()
            .ok_or_else(|| Error::InvalidReference(format!("{self} has no tag")))
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repository_and_tag() {
        let r = Reference::parse("component-descriptors/acme.org/helloworld:1.0.0").unwrap();
        assert_eq!(r.repository(), "component-descriptors/acme.org/helloworld");
        assert_eq!(r.tag(), Some("1.0.0"));
        assert_eq!(r.digest(), None);
    }

    #[test]
    fn parses_digest_only() {
        let digest = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let r = Reference::parse(&format!("some-repo@{digest}")).unwrap();
        assert_eq!(r.repository(), "some-repo");
        assert_eq!(r.digest(), Some(digest));
    }

    #[test]
    fn canonical_component_version_reference() {
        let r = Reference::for_component_version("acme.org/helloworld", "1.0.0");
        assert_eq!(r.to_string(), "component-descriptors/acme.org/helloworld:1.0.0");
    }

    #[test]
    fn require_tag_fails_without_one() {
        let digest = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let r = Reference::parse(&format!("some-repo@{digest}")).unwrap();
        assert!(r.require_tag().is_err());
    }
}
