use dif_core::descriptor::Layout;
use dif_core::fingerprint::sha1_digest;
use dif_core::piece::PieceReader;
use dif_core::{BuildOptions, DescriptorBuilder};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs;
use std::path::Path;

fn opts(piece_length: usize) -> BuildOptions {
    BuildOptions { piece_length, ..BuildOptions::default() }
}

fn write_random(path: &Path, bytes: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    fs::write(path, data).unwrap();
}

#[test]
fn single_file_matches_known_fingerprint() {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("hello.txt");
    fs::write(&p, b"hello world").unwrap();
    let built = DescriptorBuilder::new(BuildOptions::default()).build(&p).unwrap();
    assert_eq!(built.fingerprint.to_hex(), "531d0281ddb1783bd0e67bc2c34e3849e8e21682");
    match &built.envelope.info.layout {
        Layout::Single { length, md5sum } => {
            assert_eq!(*length, 11);
            assert_eq!(md5sum.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
        }
        other => panic!("expected single layout, got {other:?}"),
    }
}

#[test]
fn multi_file_orders_by_path_hash() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.txt"), b"alpha").unwrap();
    fs::write(root.join("sub/b.txt"), b"beta").unwrap();

    let built = DescriptorBuilder::new(opts(4)).build(&root).unwrap();
    assert_eq!(built.fingerprint.to_hex(), "69e3af202ef8c65c57ea45a161bdf27d662d50d1");
    let Layout::Multi { files } = &built.envelope.info.layout else {
        panic!("expected multi layout");
    };
    // md5("sub/b.txt") sorts before md5("a.txt")
    assert_eq!(files[0].path, vec!["sub", "b.txt"]);
    assert_eq!(files[1].path, vec!["a.txt"]);
    assert_eq!(files[0].md5sum.as_deref(), Some("77833c34d8d5524b27cf4186c1e04869"));
    assert_eq!(built.envelope.info.pieces.len(), 3);
}

#[test]
fn cross_file_boundary_piece_hashes_concatenation() {
    let p = 16 * 1024;
    let td = tempfile::tempdir().unwrap();
    let a = td.path().join("a.bin");
    let b = td.path().join("b.bin");
    fs::write(&a, vec![0xAAu8; p / 2]).unwrap();
    fs::write(&b, vec![0xBBu8; p / 2]).unwrap();

    let mut reader = PieceReader::new(vec![a, b], p).unwrap();
    let digests = reader.digest_all().unwrap();
    let mut cat = vec![0xAAu8; p / 2];
    cat.extend(vec![0xBBu8; p / 2]);
    assert_eq!(digests, vec![sha1_digest(&cat)]);
}

#[test]
fn build_is_deterministic_and_ignores_creation_time() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir(&root).unwrap();
    write_random(&root.join("x.bin"), 10_000, 1);
    write_random(&root.join("y.bin"), 3_333, 2);

    let b = DescriptorBuilder::new(opts(4096));
    let mut first = b.build(&root).unwrap();
    let second = b.build(&root).unwrap();
    assert_eq!(first.fingerprint, second.fingerprint);

    first.envelope.creation_date += 86_400;
    assert_eq!(first.envelope.fingerprint(), second.fingerprint);
}

#[test]
fn flipping_one_byte_changes_fingerprint() {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("blob.bin");
    write_random(&p, 50_000, 7);
    let b = DescriptorBuilder::new(opts(8192));
    let before = b.build(&p).unwrap().fingerprint;

    let mut data = fs::read(&p).unwrap();
    data[31_337] ^= 0x01;
    fs::write(&p, &data).unwrap();
    assert_ne!(b.build(&p).unwrap().fingerprint, before);
}

#[test]
fn creation_order_does_not_affect_fingerprint() {
    let td = tempfile::tempdir().unwrap();
    let names = ["one.txt", "two.txt", "three.txt", "nested/four.txt"];

    let left = td.path().join("left").join("set");
    fs::create_dir_all(left.join("nested")).unwrap();
    for (i, n) in names.iter().enumerate() {
        fs::write(left.join(n), format!("content {i}")).unwrap();
    }
    let right = td.path().join("right").join("set");
    fs::create_dir_all(right.join("nested")).unwrap();
    for (i, n) in names.iter().enumerate().rev() {
        fs::write(right.join(n), format!("content {i}")).unwrap();
    }

    let b = DescriptorBuilder::new(opts(5));
    assert_eq!(b.build(&left).unwrap().fingerprint, b.build(&right).unwrap().fingerprint);
}

#[test]
fn empty_files_contribute_no_pieces() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("empty"), b"").unwrap();
    fs::write(root.join("full"), vec![1u8; 64]).unwrap();

    let built = DescriptorBuilder::new(opts(32)).build(&root).unwrap();
    assert_eq!(built.envelope.info.pieces.len(), 2);
    assert_eq!(built.envelope.info.total_length(), 64);
}

proptest! {
    #[test]
    fn piece_count_is_ceil_of_length(len in 0usize..20_000, piece in 1usize..5_000) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut reader = PieceReader::new(vec![&data[..]], piece).unwrap();
        let digests = reader.digest_all().unwrap();
        prop_assert_eq!(digests.len(), len.div_ceil(piece));
    }

    #[test]
    fn split_points_do_not_move_piece_boundaries(
        data in proptest::collection::vec(any::<u8>(), 0..4_000),
        cuts in proptest::collection::vec(0usize..4_000, 0..5),
        piece in 1usize..700,
    ) {
        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(data.len())).collect();
        cuts.sort_unstable();
        let mut parts: Vec<&[u8]> = Vec::new();
        let mut prev = 0;
        for c in cuts {
            parts.push(&data[prev..c]);
            prev = c;
        }
        parts.push(&data[prev..]);

        let whole = PieceReader::new(vec![&data[..]], piece).unwrap().digest_all().unwrap();
        let split = PieceReader::new(parts, piece).unwrap().digest_all().unwrap();
        prop_assert_eq!(whole, split);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn parallel_hashing_matches_streaming(
        sizes in proptest::collection::vec(0usize..9_000, 1..5),
        piece in 1usize..4_096,
        seed in any::<u64>(),
    ) {
        let td = tempfile::tempdir().unwrap();
        let root = td.path().join("data");
        fs::create_dir(&root).unwrap();
        for (i, sz) in sizes.iter().enumerate() {
            write_random(&root.join(format!("f{i}.bin")), *sz, seed.wrapping_add(i as u64));
        }
        let seq = DescriptorBuilder::new(opts(piece)).build(&root).unwrap();
        let par = DescriptorBuilder::new(BuildOptions { parallel: true, ..opts(piece) })
            .build(&root)
            .unwrap();
        prop_assert_eq!(&seq.envelope.info, &par.envelope.info);
        prop_assert_eq!(seq.fingerprint, par.fingerprint);
    }
}

#[cfg(target_family = "unix")]
#[test]
fn symlinked_file_contents_are_fingerprinted() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("data");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), b"alpha").unwrap();
    fs::write(td.path().join("outside.txt"), b"first").unwrap();
    std::os::unix::fs::symlink("../outside.txt", root.join("link.txt")).unwrap();

    let b = DescriptorBuilder::new(opts(4));
    let before = b.build(&root).unwrap();
    let Layout::Multi { files } = &before.envelope.info.layout else {
        panic!("expected multi layout");
    };
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.path == vec!["link.txt"] && f.length == 5));

    fs::write(td.path().join("outside.txt"), b"second").unwrap();
    assert_ne!(b.build(&root).unwrap().fingerprint, before.fingerprint);
}

#[cfg(target_family = "unix")]
#[test]
fn symlinked_root_keeps_its_own_name() {
    let td = tempfile::tempdir().unwrap();
    let target = td.path().join("target.bin");
    fs::write(&target, b"payload").unwrap();
    let alias = td.path().join("alias.bin");
    std::os::unix::fs::symlink(&target, &alias).unwrap();

    let built = DescriptorBuilder::new(opts(4)).build(&alias).unwrap();
    assert_eq!(built.envelope.info.name, "alias.bin");
    assert_eq!(built.envelope.info.total_length(), 7);
}
