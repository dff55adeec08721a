//! Digests (spec §3): `algorithm:hex` pairs, with the on-disk filename
//! encoding CTF blob files use (`algorithm.hex`, colon swapped for dot).

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use openssl::hash::{Hasher, MessageDigest};

use crate::error::{Error, Result};

/// A digest algorithm this crate understands (spec §3: "algorithm ∈ {sha256, sha512, …}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl Algorithm {
    /// The canonical lowercase name used in digest strings and filenames.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }

    pub(crate) fn message_digest(self) -> MessageDigest {
        match self {
            Algorithm::Sha256 => MessageDigest::sha256(),
            Algorithm::Sha512 => MessageDigest::sha512(),
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(Error::UnsupportedFormat(format!(
                "unsupported digest algorithm {other}"
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(algorithm, encoded)` pair with canonical string `algorithm:encoded`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    /// The hash algorithm.
    pub algorithm: Algorithm,
    /// The lowercase hex-encoded digest value.
    pub encoded: String,
}

impl Digest {
    /// Compute the digest of everything readable from `r`.
    pub fn compute(algorithm: Algorithm, r: &mut impl Read) -> Result<Self> {
        let mut hasher = Hasher::new(algorithm.message_digest()).map_err(|e| anyhow::anyhow!(e))?;
        let mut buf = [0u8; 8192];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]).map_err(|e| anyhow::anyhow!(e))?;
        }
        let bytes = hasher.finish().map_err(|e| anyhow::anyhow!(e))?;
        Ok(Digest {
            algorithm,
            encoded: hex::encode(bytes),
        })
    }

    /// Parse a canonical `algorithm:encoded` string.
    pub fn parse(s: &str) -> Result<Self> {
        let (alg, enc) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidReference(format!("invalid digest {s}")))?;
        if enc.is_empty() {
            return Err(Error::InvalidReference(format!("invalid digest {s}")));
        }
        Ok(Digest {
            algorithm: alg.parse()?,
            encoded: enc.to_string(),
        })
    }

    /// The on-disk filename for this digest: `algorithm.encoded`.
    ///
    /// `filename_to_digest ∘ to_filename == identity` (spec §8 invariant).
    pub fn to_filename(&self) -> String {
        format!("{}.{}", self.algorithm, self.encoded)
    }

    /// Parse a blob filename (`algorithm.encoded`) back into a digest.
    pub fn from_filename(name: &str) -> Result<Self> {
        let (alg, enc) = name
            .split_once('.')
            .ok_or_else(|| Error::InvalidReference(format!("invalid blob filename {name}")))?;
        if enc.is_empty() {
            return Err(Error::InvalidReference(format!("invalid blob filename {name}")));
        }
        Ok(Digest {
            algorithm: alg.parse()?,
            encoded: enc.to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_string() {
        let d = Digest::parse("sha256:deadbeef").unwrap();
        assert_eq!(d.to_string(), "sha256:deadbeef");
    }

    #[test]
    fn roundtrip_filename() {
        let d = Digest::parse("sha256:deadbeef").unwrap();
        let name = d.to_filename();
        assert_eq!(name, "sha256.deadbeef");
        let back = Digest::from_filename(&name).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn compute_matches_known_sha256() {
        let mut data: &[u8] = b"test";
        let d = Digest::compute(Algorithm::Sha256, &mut data).unwrap();
        assert_eq!(
            d.to_string(),
            "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(Digest::parse("md5:deadbeef").is_err());
    }

    #[test]
    fn rejects_malformed() {
        assert!(Digest::parse("sha256").is_err());
        assert!(Digest::from_filename("sha256").is_err());
    }
}
