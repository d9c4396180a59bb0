use immich_watch::error::IntegrityError;
use immich_watch::integrity::{
    detect_container, is_video_extension, verify_video, verify_video_file, Container,
    MOOV_SEARCH_WINDOW,
};
use std::io::Cursor;

fn mp4_header() -> Vec<u8> {
    let mut bytes = vec![0, 0, 0, 24];
    bytes.extend_from_slice(b"ftypisom");
    bytes.extend_from_slice(&[0u8; 12]);
    bytes
}

fn check(bytes: Vec<u8>) -> Result<Container, IntegrityError> {
    let len = bytes.len() as u64;
    verify_video(&mut Cursor::new(bytes), len)
}

#[test]
fn mp4_without_moov_is_rejected() {
    let mut bytes = mp4_header();
    bytes.resize(4096, 0);
    let err = check(bytes).unwrap_err();
    assert!(matches!(err, IntegrityError::MissingMoov));
    assert!(err.to_string().contains("Missing moov atom"));
}

#[test]
fn mp4_with_moov_near_start_passes() {
    let mut bytes = mp4_header();
    bytes.extend_from_slice(b"\0\0\0\x08moov");
    bytes.resize(4096, 0);
    assert_eq!(check(bytes).unwrap(), Container::IsoBmff);
}

#[test]
fn large_mp4_with_moov_at_the_end_passes() {
    let window = MOOV_SEARCH_WINDOW as usize;
    let mut bytes = mp4_header();
    bytes.resize(3 * window, 0);
    bytes.extend_from_slice(b"\0\0\0\x08moov");
    assert_eq!(check(bytes).unwrap(), Container::IsoBmff);
}

#[test]
fn large_mp4_with_moov_only_in_the_middle_is_rejected() {
    let window = MOOV_SEARCH_WINDOW as usize;
    let mut bytes = mp4_header();
    bytes.resize(window + window / 2, 0);
    bytes.extend_from_slice(b"moov");
    bytes.resize(4 * window, 0);
    assert!(matches!(check(bytes), Err(IntegrityError::MissingMoov)));
}

#[test]
fn tiny_files_are_rejected() {
    let mut bytes = mp4_header();
    bytes.extend_from_slice(b"moov");
    assert!(matches!(
        check(bytes),
        Err(IntegrityError::TooSmall { size: 28 })
    ));
}

#[test]
fn avi_and_matroska_are_recognised() {
    let mut avi = b"RIFF\0\0\0\0AVI LIST".to_vec();
    avi.resize(2048, 0);
    assert_eq!(check(avi).unwrap(), Container::Avi);

    let mut mkv = vec![0x1A, 0x45, 0xDF, 0xA3];
    mkv.resize(2048, 0);
    assert_eq!(check(mkv).unwrap(), Container::Matroska);
}

#[test]
fn unknown_container_passes_when_fully_readable() {
    assert_eq!(check(vec![0x55; 2048]).unwrap(), Container::Unknown);
}

#[test]
fn detect_container_handles_short_headers() {
    assert_eq!(detect_container(b"RIFF"), Container::Unknown);
    assert_eq!(detect_container(&[]), Container::Unknown);
}

#[test]
fn video_extensions_are_case_insensitive() {
    assert!(is_video_extension("MP4"));
    assert!(is_video_extension("webm"));
    assert!(!is_video_extension("jpg"));
}

#[test]
fn verify_file_on_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let mut bytes = mp4_header();
    bytes.resize(2048, 0);
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(
        verify_video_file(&path),
        Err(IntegrityError::MissingMoov)
    ));
    assert!(verify_video_file(&dir.path().join("absent.mp4")).is_err());
}
