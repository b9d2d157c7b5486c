use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;

fn sift_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sift");
    path
}

/// One Helvetica 10pt line per page, written at (72, 700).
fn build_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for line in lines {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("report.pdf"),
        build_pdf(&["Invoice total due", "Payment received"]),
    )
    .unwrap();
    fs::write(files_dir.join("broken.pdf"), b"this is not a pdf").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sift.sqlite"

[storage]
root = "{root}/files"

[queue]
max_workers = 2

[search]
final_limit = 10
"#,
        root = root.display()
    );

    let config_path = config_dir.join("sift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sift_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sift(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_sift(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_search_empty_index() {
    let (_tmp, config_path) = setup_test_env();
    run_sift(&config_path, &["init"]);

    let (stdout, _, success) = run_sift(&config_path, &["search", "invoice"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_index_search_get_delete() {
    let (tmp, config_path) = setup_test_env();
    run_sift(&config_path, &["init"]);

    let (stdout, stderr, success) = run_sift(&config_path, &["index", "report.pdf"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("[info] Document added to tasklist for indexing"));
    assert!(stdout.contains("[success] The document has been indexed report.pdf in "));
    assert!(tmp.path().join("files/report.pdf.d/layout.json").is_file());

    let (stdout, _, success) = run_sift(&config_path, &["search", "invoice"]);
    assert!(success);
    assert!(
        stdout.contains("report.pdf#page=1&search=\"invoice\""),
        "Expected page anchor, got: {}",
        stdout
    );
    assert!(stdout.contains("<mark>Invoice</mark> total due"));
    assert!(!stdout.contains("Payment"));

    let (stdout, _, success) = run_sift(&config_path, &["search", "payment"]);
    assert!(success);
    assert!(stdout.contains("report.pdf#page=2"));

    let (stdout, _, success) = run_sift(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("indexed"));
    assert!(stdout.contains("report.pdf"));

    let (stdout, _, success) = run_sift(&config_path, &["get", "1"]);
    assert!(success);
    assert!(stdout.contains("file:        report.pdf"));
    assert!(stdout.contains("--- Page 1 (612 x 792, 1 blocks) ---"));
    assert!(stdout.contains("Payment received"));

    let (stdout, stderr, success) = run_sift(&config_path, &["verify"]);
    assert!(success, "verify failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Index consistent: 2 rows."));

    let (stdout, _, success) = run_sift(&config_path, &["delete", "report.pdf"]);
    assert!(success);
    assert!(stdout.contains("[success] The document has been deleted report.pdf"));
    assert!(!tmp.path().join("files/report.pdf.d").exists());
    assert!(tmp.path().join("files/report.pdf").exists());

    let (stdout, _, _) = run_sift(&config_path, &["search", "invoice"]);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_sift(&config_path, &["verify"]);
    assert!(success);
    assert!(stdout.contains("Index consistent: 0 rows."));
}

#[test]
fn test_reindex_replaces_document() {
    let (_tmp, config_path) = setup_test_env();
    run_sift(&config_path, &["init"]);
    run_sift(&config_path, &["index", "report.pdf"]);

    let (stdout, stderr, success) = run_sift(&config_path, &["index", "report.pdf"]);
    assert!(success, "reindex failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Reindexing the document"));
    let deleted = stdout.find("has been deleted report.pdf").unwrap();
    let indexed = stdout.find("has been indexed report.pdf").unwrap();
    assert!(deleted < indexed);

    let (stdout, _, _) = run_sift(&config_path, &["list"]);
    assert_eq!(stdout.matches("report.pdf").count(), 1);
    let (stdout, _, _) = run_sift(&config_path, &["verify"]);
    assert!(stdout.contains("Index consistent: 2 rows."));
}

#[test]
fn test_failures_exit_nonzero() {
    let (_tmp, config_path) = setup_test_env();
    run_sift(&config_path, &["init"]);

    let (stdout, _, success) = run_sift(&config_path, &["index", "broken.pdf"]);
    assert!(!success);
    assert!(stdout.contains("[danger] Error during indexing the document: cannot decode"));

    let (stdout, _, success) = run_sift(&config_path, &["index", "missing.pdf"]);
    assert!(!success);
    assert!(stdout.contains("file not found"));

    let (stdout, _, success) = run_sift(&config_path, &["index", "../config/sift.toml"]);
    assert!(!success);
    assert!(stdout.contains("[danger] invalid file reference"));

    let (stdout, _, success) = run_sift(&config_path, &["delete", "nothing.pdf"]);
    assert!(!success);
    assert!(stdout.contains("[danger] document not found: nothing.pdf"));

    let (_, stderr, success) = run_sift(&config_path, &["get", "999"]);
    assert!(!success);
    assert!(stderr.contains("document not found: 999"));
}
