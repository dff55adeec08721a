//! Legacy artifact-set read compatibility, end to end (spec.md §4.3, §8
//! scenario 8): a CTF blob whose declared media type ends in `+tar+gzip`
//! nests a nested gzipped-tar archive with its own `index.json`. Fetching
//! that blob out of a real CTF and opening it as a [`LegacyArtifactSet`]
//! must yield a readable inner index with exactly one manifest.

use camino::Utf8PathBuf;
use cap_std_ext::cap_tempfile;
use ocm_ctf_core::ctf::index::{ArtifactEntry, CtfIndex};
use ocm_ctf_core::ctf::legacy::{LegacyArtifactSet, LegacyLayout, LEGACY_ARTIFACT_SET_MEDIA_TYPE};
use ocm_ctf_core::{Ctf, OpenFlags};

fn build_nested_artifact_set_tgz() -> Vec<u8> {
    let inner_index = br#"{"schemaVersion":2,"manifests":[{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa","size":2}]}"#;

    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        let mut header = tar::Header::new_gnu();
        header.set_size(inner_index.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "index.json", &inner_index[..]).unwrap();

        let blob_body = b"{}";
        let mut header = tar::Header::new_gnu();
        header.set_size(blob_body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "blobs/sha256.aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", &blob_body[..])
            .unwrap();
        builder.finish().unwrap();
    }

    let mut tgz_bytes = Vec::new();
    {
        let mut encoder = flate2::write::GzEncoder::new(&mut tgz_bytes, flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &tar_bytes).unwrap();
        encoder.finish().unwrap();
    }
    tgz_bytes
}

#[test]
fn fetching_nested_artifact_set_blob_yields_one_manifest() {
    let dir = tempfile::tempdir().unwrap().keep();
    let path = Utf8PathBuf::try_from(dir).unwrap().join("ctf");
    let ctf = Ctf::open(&path, OpenFlags::create()).unwrap();

    let nested = build_nested_artifact_set_tgz();
    let digest = ctf.save_blob(&nested[..], None).unwrap();

    let mut index = CtfIndex::new();
    index.add_artifact(ArtifactEntry {
        repository: "component-descriptors/github.com/acme.org/helloworld".into(),
        tag: Some("1.0.0".into()),
        digest: digest.to_string(),
        media_type: Some(LEGACY_ARTIFACT_SET_MEDIA_TYPE.to_string()),
    });
    ctf.set_index(&index).unwrap();

    // Fetch the nested blob back out of the CTF exactly as a caller would,
    // then open it as a legacy artifact set.
    let blob = ctf.get_blob(&digest).unwrap();
    let reader = ocm_ctf_core::Blob::reader(&blob).unwrap();

    let scratch = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
    let set = LegacyArtifactSet::open_from_tgz(reader, scratch).unwrap();

    assert_eq!(set.layout(), LegacyLayout::LegacyOci);
    let manifests = set.manifests();
    assert_eq!(manifests.len(), 1);
    assert_eq!(
        manifests[0]["mediaType"],
        "application/vnd.oci.image.manifest.v1+json"
    );
}

#[test]
fn marker_suffix_identifies_the_nested_blob_media_type() {
    assert!(ocm_ctf_core::ctf::legacy::is_legacy_marker(LEGACY_ARTIFACT_SET_MEDIA_TYPE));
}
