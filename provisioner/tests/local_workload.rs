//! Integration tests for the host-directory workload.
//!
//! These run real host commands (`mv`, `ls`, `tree`, `sh`, `tar`, `sleep`) inside a
//! temporary directory. Tests that need a tool the host lacks return early.

use calibre_library_provisioner::LIBRARY_DIR;
use calibre_library_provisioner::capture::CaptureBuffer;
use calibre_library_provisioner::error::{InspectError, WorkloadError};
use calibre_library_provisioner::inspect::Inspector;
use calibre_library_provisioner::pipeline::{ExtractionTool, LibraryPipeline};
use calibre_library_provisioner::workload::{ExecCommand, FileKind, LocalWorkload, Workload};
use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

struct Host {
    _dir: TempDir,
    workload: LocalWorkload,
}

impl Host {
    fn books(&self) -> Utf8PathBuf {
        self.workload.root().join("books")
    }
}

#[fixture]
fn host() -> Host {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp path is UTF-8");
    std::fs::create_dir(root.join("books")).expect("create books");
    Host {
        _dir: dir,
        workload: LocalWorkload::new(root),
    }
}

fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Extracts with `tar` into a directory named after the archive stem, the
/// same layout `dtrx` produces.
fn tar_extraction_tool() -> ExtractionTool {
    ExtractionTool::new(
        "sh",
        [
            "-c",
            r#"mkdir -p "${0%.*}" && tar -xf "$0" -C "${0%.*}""#,
        ],
    )
}

fn tar_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, *contents)
            .expect("append tar entry");
    }
    builder.into_inner().expect("finish tar")
}

#[rstest]
fn push_list_and_remove(host: Host) {
    let workload = &host.workload;
    let file = Utf8Path::new("/books/Author/Title (1)/metadata.opf");

    workload.push(file, b"<package/>").expect("push");

    assert!(workload.exists(file).expect("exists"));
    let entries = workload
        .list_files(Utf8Path::new("/books/Author"))
        .expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.first().map(|e| e.kind), Some(FileKind::Directory));
    assert_eq!(
        entries.first().map(|e| e.path.as_str()),
        Some("/books/Author/Title (1)")
    );

    let err = workload
        .remove_path(Utf8Path::new("/books/Author"), false)
        .expect_err("directory has entries");
    assert!(matches!(err, WorkloadError::DirectoryNotEmpty { .. }));

    workload
        .remove_path(Utf8Path::new("/books/Author"), true)
        .expect("recursive remove");
    assert!(!host.books().join("Author").exists());
}

#[rstest]
fn listing_a_missing_directory_is_not_found(host: Host) {
    let err = host
        .workload
        .list_files(Utf8Path::new("/missing"))
        .expect_err("missing");
    assert!(matches!(err, WorkloadError::NotFound { .. }));
}

#[rstest]
fn exec_streams_stdout_into_the_sink(host: Host) {
    host.workload
        .push(Utf8Path::new("/books/metadata.db"), b"")
        .expect("push");
    let mut buffer = CaptureBuffer::default();

    let output = host
        .workload
        .exec(
            &ExecCommand::new("ls").arg("-1").working_dir(LIBRARY_DIR),
            &mut buffer,
        )
        .expect("exec");

    assert!(output.success());
    assert_eq!(buffer.joined_lines(), "metadata.db");
}

#[rstest]
fn exec_reports_nonzero_exit_and_stderr(host: Host) {
    let output = host
        .workload
        .run(&ExecCommand::new("sh").args(["-c", "echo broken >&2; exit 3"]))
        .expect("exec");

    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stderr.trim(), "broken");
}

#[rstest]
fn missing_program_is_a_spawn_error(host: Host) {
    let err = host
        .workload
        .run(&ExecCommand::new("calibre-web-no-such-program"))
        .expect_err("spawn fails");
    assert!(matches!(err, WorkloadError::Spawn { .. }));
}

#[test]
fn slow_commands_are_killed_after_the_timeout() {
    if !tool_available("sleep") {
        return;
    }
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp path is UTF-8");
    let workload = LocalWorkload::new(root).with_timeout(Duration::from_millis(200));

    let err = workload
        .run(&ExecCommand::new("sleep").arg("10"))
        .expect_err("timed out");

    assert!(matches!(err, WorkloadError::TimedOut { .. }));
}

#[rstest]
fn tar_archive_is_extracted_and_flattened(host: Host) {
    if !tool_available("tar") {
        return;
    }
    let archive = tar_archive(&[
        ("Calibre Library/Jane Austen/Emma (1)/metadata.opf", b"<package/>"),
        ("Calibre Library/metadata.db", b"sqlite"),
        ("Calibre Library/.hidden", b"dot"),
    ]);

    LibraryPipeline::new(&host.workload)
        .with_extraction_tool(tar_extraction_tool())
        .extract_and_normalize(&archive, Utf8Path::new(LIBRARY_DIR))
        .expect("pipeline succeeds");

    let mut names: Vec<String> = std::fs::read_dir(host.books())
        .expect("read books")
        .map(|entry| {
            entry
                .expect("entry")
                .file_name()
                .into_string()
                .expect("UTF-8 name")
        })
        .collect();
    names.sort();
    assert_eq!(names, vec![".hidden", "Jane Austen", "metadata.db"]);
}

#[rstest]
fn inspection_lists_the_library(host: Host) {
    for name in ["metadata.db", "Jane Austen/Emma (1)/metadata.opf"] {
        host.workload
            .push(&Utf8Path::new(LIBRARY_DIR).join(name), b"x")
            .expect("push");
    }

    let text = Inspector::new(&host.workload)
        .inspect(Utf8Path::new(LIBRARY_DIR), "ls-1")
        .expect("inspect");

    assert_eq!(text, "Jane Austen\nmetadata.db");
}

#[rstest]
fn tree_summary_counts_one_author_and_one_work(host: Host) {
    if !tool_available("tree") {
        return;
    }
    host.workload
        .push(
            &Utf8Path::new(LIBRARY_DIR).join("Jane Austen/Emma (1)/metadata.opf"),
            b"<package/>",
        )
        .expect("push");

    let text = Inspector::new(&host.workload)
        .inspect(Utf8Path::new(LIBRARY_DIR), "tree")
        .expect("inspect");

    assert_eq!(text.lines().next(), Some("."));
    assert!(text.contains("Jane Austen"), "{text}");
    assert_eq!(text.lines().last(), Some("2 directories, 1 file"));
}

#[rstest]
fn oversized_listing_is_library_too_large(host: Host) {
    for index in 0..64 {
        host.workload
            .push(
                &Utf8Path::new(LIBRARY_DIR).join(format!("Author {index:03}")),
                b"",
            )
            .expect("push");
    }

    let err = Inspector::new(&host.workload)
        .with_capture_limit(32)
        .inspect(Utf8Path::new(LIBRARY_DIR), "ls-1")
        .expect_err("too large");

    assert!(matches!(err, InspectError::LibraryTooLarge { limit: 32 }));
}
