use std::fs::{self, File};
use std::io::Write;

use restripe_fs::attrs::compare_attributes;
use restripe_fs::checksum::compare_files;
use restripe_fs::{copy_file, gather_regular_files, temp_path_for, ChecksumAlgorithm};
use tempfile::TempDir;

#[test]
fn copy_then_verify_whole_tree() {
    const FILE_COUNT: usize = 50;

    let temp = TempDir::new().unwrap();
    let src_dir = temp.path().join("src");
    fs::create_dir(&src_dir).unwrap();

    for i in 0..FILE_COUNT {
        let p = src_dir.join(format!("file_{}.dat", i));
        let mut f = File::create(p).unwrap();
        // Sizes from empty up to a few hundred KiB
        let body = vec![(i % 256) as u8; i * 4096];
        f.write_all(&body).unwrap();
    }

    let files = gather_regular_files(&src_dir).unwrap();
    assert_eq!(files.len(), FILE_COUNT);

    for path in &files {
        let temp_copy = temp_path_for(path);
        let n = copy_file(path, &temp_copy).unwrap();
        assert_eq!(n, fs::metadata(path).unwrap().len());

        compare_files(path, &temp_copy, &ChecksumAlgorithm::Sha256).unwrap();
        assert!(
            compare_attributes(path, &temp_copy).unwrap().is_empty(),
            "attribute drift on {}",
            temp_copy.display()
        );
    }

    // Every original now has exactly one sibling artifact
    let stale = restripe_fs::find_temp_artifacts(&src_dir).unwrap();
    assert_eq!(stale.len(), FILE_COUNT);
}

#[test]
fn corrupted_copy_is_caught_by_every_algorithm() {
    let temp = TempDir::new().unwrap();
    let original = temp.path().join("payload.bin");
    fs::write(&original, b"The quick brown fox").unwrap();

    let copy = temp_path_for(&original);
    copy_file(&original, &copy).unwrap();
    // Same length, one flipped byte
    fs::write(&copy, b"The quick brown fix").unwrap();

    for algo in [
        ChecksumAlgorithm::Sha256,
        ChecksumAlgorithm::Md5,
        ChecksumAlgorithm::Blake3,
    ] {
        assert!(compare_files(&original, &copy, &algo).is_err());
    }
}
