use super::*;
use tempfile::TempDir;

#[test]
fn whitespace_is_collapsed() {
    assert_eq!(clean_text("  a\t\tb \n\n c  "), "a b c");
    assert_eq!(clean_text(" \n\t "), "");
}

#[test]
fn paragraph_boundaries_survive_cleaning() {
    let raw = "Title  line\n\n\n  First   paragraph\nwraps here.\n \t\nSecond.\n";
    assert_eq!(
        clean_paragraphs(raw),
        "Title line\n\nFirst paragraph wraps here.\n\nSecond."
    );
}

#[test]
fn supported_extensions_ignore_case() {
    assert!(is_supported(Path::new("notes.txt")));
    assert!(is_supported(Path::new("README.MD")));
    assert!(is_supported(Path::new("guide.markdown")));
    assert!(!is_supported(Path::new("report.pdf")));
    assert!(!is_supported(Path::new("Makefile")));
}

#[test]
fn reads_text_files() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("doc.md");
    std::fs::write(&path, "# Heading\n\nBody   text\nhere.").expect("should write");

    let text = read_document(&path).expect("should read");
    assert_eq!(text, "# Heading\n\nBody text here.");
}

#[test]
fn invalid_utf8_is_replaced() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("latin1.txt");
    std::fs::write(&path, b"caf\xe9 au lait").expect("should write");

    let text = read_document(&path).expect("should read");
    assert!(text.starts_with("caf"));
    assert!(text.ends_with("au lait"));
}

#[test]
fn unsupported_formats_are_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("scan.pdf");
    std::fs::write(&path, b"%PDF-1.7").expect("should write");

    assert!(matches!(
        read_document(&path),
        Err(RagError::Extraction(_))
    ));
}

#[test]
fn missing_file_is_io_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    assert!(matches!(
        read_document(&temp_dir.path().join("missing.txt")),
        Err(RagError::Io(_))
    ));
}
