use immich_watch::config::Config;
use immich_watch::file_record::{FileRecord, Rejection};
use std::fs;
use tempfile::TempDir;

struct Fixture {
    _root: TempDir,
    watch: std::path::PathBuf,
    archive: std::path::PathBuf,
    config: Config,
}

fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let watch = root.path().join("drop");
    let archive = root.path().join("archive");
    fs::create_dir_all(&watch).unwrap();
    fs::create_dir_all(&archive).unwrap();
    let mut config = Config::new("http://localhost", "key", vec![watch.clone()], &archive);
    config.max_file_size_mb = 1;
    Fixture {
        _root: root,
        watch,
        archive,
        config,
    }
}

#[test]
fn capture_reads_name_extension_size_and_mtime() {
    let fx = fixture();
    let path = fx.watch.join("IMG_0001.JPG");
    fs::write(&path, vec![0u8; 1234]).unwrap();

    let record = FileRecord::capture(&path);
    assert_eq!(record.name, "IMG_0001.JPG");
    assert_eq!(record.extension, "jpg");
    assert_eq!(record.size_bytes, 1234);
    assert!(record.modified_time > 0.0);
    assert!(record.is_valid(&fx.config));
    assert_eq!(
        record.dedup_key(),
        format!("{}_1234_{}", path.display(), record.modified_time)
    );
}

#[test]
fn capture_of_missing_file_yields_zero_identity() {
    let fx = fixture();
    let record = FileRecord::capture(fx.watch.join("gone.jpg"));
    assert_eq!(record.size_bytes, 0);
    assert_eq!(record.modified_time, 0.0);
    assert_eq!(record.validate(&fx.config), Err(Rejection::Missing));
}

#[test]
fn files_over_the_size_limit_are_invalid() {
    let fx = fixture();
    for extra in [1usize, 4096, 1024 * 1024] {
        let path = fx.watch.join(format!("big_{extra}.jpg"));
        fs::write(&path, vec![0u8; 1024 * 1024 + extra]).unwrap();
        let record = FileRecord::capture(&path);
        assert!(matches!(
            record.validate(&fx.config),
            Err(Rejection::TooLarge { .. })
        ));
        assert!(!record.is_valid(&fx.config));
    }

    let exact = fx.watch.join("exact.jpg");
    fs::write(&exact, vec![0u8; 1024 * 1024]).unwrap();
    assert!(FileRecord::capture(&exact).is_valid(&fx.config));
}

#[test]
fn unsupported_extensions_are_invalid_in_any_case() {
    let fx = fixture();
    for name in ["notes.txt", "NOTES.TXT", "archive.tar.gz", "no_extension"] {
        let path = fx.watch.join(name);
        fs::write(&path, b"data").unwrap();
        let record = FileRecord::capture(&path);
        assert!(!record.is_valid(&fx.config), "{name} should be rejected");
    }
    for name in ["a.PNG", "b.Mp4", "c.jpeg"] {
        let path = fx.watch.join(name);
        fs::write(&path, b"data").unwrap();
        assert!(FileRecord::capture(&path).is_valid(&fx.config), "{name} should pass");
    }
}

#[test]
fn files_inside_the_archive_are_invalid_at_any_depth() {
    let fx = fixture();
    let nested = fx.archive.join("2024").join("06");
    fs::create_dir_all(&nested).unwrap();
    for path in [fx.archive.join("a.jpg"), nested.join("b.jpg")] {
        fs::write(&path, b"data").unwrap();
        assert_eq!(
            FileRecord::capture(&path).validate(&fx.config),
            Err(Rejection::InArchive)
        );
    }
}

#[test]
fn directories_and_empty_files_are_invalid() {
    let fx = fixture();
    let dir = fx.watch.join("album.jpg");
    fs::create_dir_all(&dir).unwrap();
    assert_eq!(
        FileRecord::capture(&dir).validate(&fx.config),
        Err(Rejection::NotAFile)
    );

    let empty = fx.watch.join("empty.jpg");
    fs::write(&empty, b"").unwrap();
    assert_eq!(
        FileRecord::capture(&empty).validate(&fx.config),
        Err(Rejection::Vanished)
    );
}

#[test]
fn capturing_again_sees_new_size() {
    let fx = fixture();
    let path = fx.watch.join("grow.jpg");
    fs::write(&path, b"12345").unwrap();
    let first = FileRecord::capture(&path);
    fs::write(&path, b"1234567890").unwrap();
    let second = FileRecord::capture(&path);
    assert_eq!(second.size_bytes, 10);
    assert_ne!(first.dedup_key(), second.dedup_key());
}
