use dif_core::descriptor::{Envelope, Layout};
use dif_core::path_safety::{validate_path, validate_segment, PathPolicy};
use dif_core::verify::Verifier;
use dif_core::{BuildOptions, DescriptorBuilder, Error};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(target_family = "unix")]
fn symlink_dir<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Build a descriptor for `root`, then point its single multi-file entry at `segments`.
fn retargeted_envelope(root: &Path, segments: &[&str]) -> Envelope {
    let built = DescriptorBuilder::new(BuildOptions { piece_length: 1 << 10, ..Default::default() })
        .build(root)
        .unwrap();
    let mut env = built.envelope;
    let Layout::Multi { files } = &mut env.info.layout else {
        panic!("expected multi layout");
    };
    assert_eq!(files.len(), 1);
    files[0].path = segments.iter().map(|s| s.to_string()).collect();
    env
}

#[test]
fn lexical_checks_reject_traversal_and_absolute_paths() {
    let base = PathBuf::from("base");
    assert!(validate_path(&base, Path::new("../outside.txt"), PathPolicy::default()).is_err());
    let abs = if cfg!(windows) { "C:\\Windows\\System32\\cmd.exe" } else { "/etc/passwd" };
    assert!(validate_path(&base, Path::new(abs), PathPolicy::default()).is_err());

    for bad in ["", ".", "..", "a/b"] {
        assert!(validate_segment(bad).is_err(), "accepted segment {bad:?}");
    }
    assert!(validate_segment("file.txt").is_ok());
}

#[test]
fn tampered_descriptor_with_parent_segment_is_refused() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("root");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("file.txt"), b"hello\n").unwrap();
    fs::write(td.path().join("secret.txt"), b"hello\n").unwrap();

    let env = retargeted_envelope(&root, &["..", "secret.txt"]);
    let err = Verifier::new(env.info).check_pieces(td.path()).expect_err("expected refusal");
    assert!(matches!(err, Error::UnsafePath(_)), "unexpected error: {err}");
}

#[cfg(target_family = "unix")]
#[test]
fn symlinks_rejected_by_default_allowed_when_contained() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("root");
    fs::create_dir_all(root.join("target")).unwrap();
    fs::write(root.join("target/file.txt"), b"hello\n").unwrap();

    let env = retargeted_envelope(&root, &["safe", "file.txt"]);
    symlink_dir(root.join("target"), root.join("safe")).unwrap();

    let err = Verifier::new(env.info.clone()).check_pieces(td.path()).expect_err("expected error");
    let msg = format!("{err}");
    assert!(msg.contains("symlink"), "unexpected error: {msg}");

    let policy = PathPolicy { follow_symlinks: true };
    let check = Verifier::new(env.info).with_policy(policy).check_pieces(td.path()).unwrap();
    assert!(check.is_clean());
}

#[cfg(target_family = "unix")]
#[test]
fn symlink_escape_blocked_even_when_following() {
    let td = tempfile::tempdir().unwrap();
    let base = td.path().join("base");
    let root = base.join("root");
    fs::create_dir_all(root.join("target")).unwrap();
    fs::write(root.join("target/file.txt"), b"hello\n").unwrap();
    fs::write(td.path().join("outside.txt"), b"hello\n").unwrap();

    let env = retargeted_envelope(&root, &["evil", "outside.txt"]);
    symlink_dir(td.path(), root.join("evil")).unwrap();

    let policy = PathPolicy { follow_symlinks: true };
    let err = Verifier::new(env.info).with_policy(policy).check_pieces(&base).expect_err("expected escape");
    let msg = format!("{err}");
    assert!(msg.contains("escapes root"), "unexpected error: {msg}");
}
