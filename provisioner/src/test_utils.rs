//! Shared test utilities for the provisioner and its consumers.
//!
//! [`FakeWorkload`] keeps a virtual filesystem in memory and emulates the
//! handful of commands the provisioner issues: the extraction tool (which
//! unpacks zip payloads into a directory named after the archive stem),
//! `mv --force --target-directory=DIR -- ...`, `tree`, `ls -1` and the
//! package manager. Every operation is recorded so tests can assert on the
//! order of side effects.

use crate::error::WorkloadError;
use crate::workload::{ExecCommand, ExecOutput, FileInfo, FileKind, Workload};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(Vec<u8>),
    Dir,
}

/// An in-memory [`Workload`] for tests.
#[derive(Debug)]
pub struct FakeWorkload {
    nodes: RefCell<BTreeMap<Utf8PathBuf, Node>>,
    operations: RefCell<Vec<String>>,
    failures: RefCell<HashMap<String, ExecOutput>>,
    extractor: String,
}

impl Default for FakeWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWorkload {
    /// Creates an empty filesystem whose extraction tool is `dtrx`.
    pub fn new() -> Self {
        Self::with_extractor("dtrx")
    }

    /// Creates an empty filesystem that treats `program` as the extraction
    /// tool.
    pub fn with_extractor(program: &str) -> Self {
        Self {
            nodes: RefCell::new(BTreeMap::new()),
            operations: RefCell::new(Vec::new()),
            failures: RefCell::new(HashMap::new()),
            extractor: program.to_owned(),
        }
    }

    /// Creates a directory and its ancestors without recording an operation.
    ///
    /// # Panics
    ///
    /// Panics if an ancestor is a file.
    pub fn add_dir(&self, path: &str) {
        self.make_dirs(Utf8Path::new(path))
            .expect("fixture directory should be creatable");
    }

    /// Creates a file (and its ancestors) without recording an operation.
    ///
    /// # Panics
    ///
    /// Panics if an ancestor is a file.
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.write_file(Utf8Path::new(path), contents.to_vec())
            .expect("fixture file should be creatable");
    }

    /// Makes every invocation of `program` exit with `exit_code` and
    /// `stderr`, without side effects.
    pub fn fail_command(&self, program: &str, exit_code: i32, stderr: &str) {
        self.failures.borrow_mut().insert(
            program.to_owned(),
            ExecOutput {
                exit_code,
                stderr: stderr.to_owned(),
            },
        );
    }

    /// Returns the recorded operations in order.
    pub fn operations(&self) -> Vec<String> {
        self.operations.borrow().clone()
    }

    /// Returns `true` if any recorded operation would have changed the
    /// filesystem.
    pub fn mutated(&self) -> bool {
        self.operations.borrow().iter().any(|op| {
            ["push ", "remove ", "exec "]
                .iter()
                .any(|prefix| op.starts_with(prefix))
        })
    }

    /// Returns every path under `root` (exclusive), relative to it and
    /// sorted, with directories suffixed by `/`.
    pub fn snapshot(&self, root: &str) -> Vec<String> {
        let root = Utf8Path::new(root);
        self.nodes
            .borrow()
            .iter()
            .filter_map(|(path, node)| {
                let relative = path.strip_prefix(root).ok()?;
                if relative.as_str().is_empty() {
                    return None;
                }
                Some(match node {
                    Node::Dir => format!("{relative}/"),
                    Node::File(_) => relative.to_string(),
                })
            })
            .collect()
    }

    /// Returns the names of the immediate children of `dir`.
    pub fn names(&self, dir: &str) -> Vec<String> {
        self.children(Utf8Path::new(dir))
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Returns the contents of a file, if it exists.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.borrow().get(Utf8Path::new(path)) {
            Some(Node::File(contents)) => Some(contents.clone()),
            _ => None,
        }
    }

    fn record(&self, operation: String) {
        self.operations.borrow_mut().push(operation);
    }

    fn node(&self, path: &Utf8Path) -> Option<Node> {
        if path == Utf8Path::new("/") {
            return Some(Node::Dir);
        }
        self.nodes.borrow().get(path).cloned()
    }

    fn children(&self, dir: &Utf8Path) -> Vec<(String, Node)> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .filter_map(|(path, node)| Some((path.file_name()?.to_owned(), node.clone())))
            .collect()
    }

    fn make_dirs(&self, path: &Utf8Path) -> Result<(), WorkloadError> {
        let mut current = Utf8PathBuf::from("/");
        for component in path.components() {
            if let Utf8Component::Normal(name) = component {
                current.push(name);
                match self.node(&current) {
                    Some(Node::Dir) => {}
                    Some(Node::File(_)) => {
                        return Err(WorkloadError::NotADirectory { path: current });
                    }
                    None => {
                        self.nodes.borrow_mut().insert(current.clone(), Node::Dir);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_file(&self, path: &Utf8Path, contents: Vec<u8>) -> Result<(), WorkloadError> {
        if let Some(parent) = path.parent() {
            self.make_dirs(parent)?;
        }
        if self.node(path) == Some(Node::Dir) {
            return Err(WorkloadError::Io {
                operation: "push",
                path: path.to_owned(),
                source: std::io::Error::other("is a directory"),
            });
        }
        self.nodes
            .borrow_mut()
            .insert(path.to_owned(), Node::File(contents));
        Ok(())
    }

    fn remove_tree(&self, path: &Utf8Path) {
        self.nodes
            .borrow_mut()
            .retain(|candidate, _| !candidate.starts_with(path));
    }

    fn move_into(&self, source: &Utf8Path, target_dir: &Utf8Path) -> Result<(), String> {
        let name = source
            .file_name()
            .ok_or_else(|| format!("mv: cannot move '{source}'"))?;
        let source_node = self
            .node(source)
            .ok_or_else(|| format!("mv: cannot stat '{source}': No such file or directory"))?;
        let destination = target_dir.join(name);
        match (self.node(&destination), &source_node) {
            (Some(Node::Dir), _) | (Some(Node::File(_)), Node::Dir) => {
                return Err(format!(
                    "mv: cannot overwrite '{destination}': Directory not empty"
                ));
            }
            (Some(Node::File(_)), Node::File(_)) => self.remove_tree(&destination),
            (None, _) => {}
        }

        let mut nodes = self.nodes.borrow_mut();
        let moved: Vec<(Utf8PathBuf, Node)> = nodes
            .iter()
            .filter(|(path, _)| path.starts_with(source))
            .map(|(path, node)| (path.clone(), node.clone()))
            .collect();
        for (path, node) in moved {
            nodes.remove(&path);
            let suffix = path.strip_prefix(source).unwrap_or(Utf8Path::new(""));
            let renamed = if suffix.as_str().is_empty() {
                destination.clone()
            } else {
                destination.join(suffix)
            };
            nodes.insert(renamed, node);
        }
        Ok(())
    }

    fn run_mv(&self, command: &ExecCommand, cwd: &Utf8Path) -> ExecOutput {
        let mut target = None;
        let mut sources = Vec::new();
        let mut after_separator = false;
        for arg in command.arguments() {
            if after_separator {
                sources.push(resolve(cwd, arg));
            } else if arg == "--" {
                after_separator = true;
            } else if let Some(dir) = arg.strip_prefix("--target-directory=") {
                target = Some(resolve(cwd, dir));
            } else if arg != "--force" {
                sources.push(resolve(cwd, arg));
            }
        }
        let Some(target) = target else {
            return failed(1, "mv: missing --target-directory");
        };
        let mut stderr = Vec::new();
        for source in sources {
            if let Err(message) = self.move_into(&source, &target) {
                stderr.push(message);
            }
        }
        if stderr.is_empty() {
            succeeded()
        } else {
            failed(1, &stderr.join("\n"))
        }
    }

    fn run_extractor(&self, command: &ExecCommand, cwd: &Utf8Path) -> ExecOutput {
        let Some(archive_arg) = command.arguments().last() else {
            return failed(1, "no archive given");
        };
        let archive_path = resolve(cwd, archive_arg);
        let Some(Node::File(bytes)) = self.node(&archive_path) else {
            return failed(1, &format!("{archive_arg}: No such file or directory"));
        };
        let stem = archive_path.file_stem().unwrap_or("archive");
        let out_dir = archive_path
            .parent()
            .unwrap_or(Utf8Path::new("/"))
            .join(stem);
        match self.unzip_into(&bytes, &out_dir) {
            Ok(()) => succeeded(),
            Err(message) => failed(1, &format!("ERROR: could not handle {archive_arg}: {message}")),
        }
    }

    fn unzip_into(&self, bytes: &[u8], out_dir: &Utf8Path) -> Result<(), String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
        self.make_dirs(out_dir).map_err(|e| e.to_string())?;
        for index in 0..archive.len() {
            let mut file = archive.by_index(index).map_err(|e| e.to_string())?;
            let Some(relative) = file.enclosed_name() else {
                return Err(format!("unsafe entry name {}", file.name()));
            };
            let relative = Utf8PathBuf::from_path_buf(relative)
                .map_err(|path| format!("non UTF-8 entry {}", path.display()))?;
            let destination = out_dir.join(relative);
            if file.is_dir() {
                self.make_dirs(&destination).map_err(|e| e.to_string())?;
            } else {
                let mut contents = Vec::new();
                file.read_to_end(&mut contents).map_err(|e| e.to_string())?;
                self.write_file(&destination, contents)
                    .map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }

    fn render_tree(&self, dir: &Utf8Path) -> String {
        let mut lines = vec![".".to_owned()];
        let mut counts = (0_usize, 0_usize);
        self.render_level(dir, "", &mut lines, &mut counts);
        let (dirs, files) = counts;
        lines.push(String::new());
        lines.push(format!(
            "{dirs} {}, {files} {}",
            if dirs == 1 { "directory" } else { "directories" },
            if files == 1 { "file" } else { "files" },
        ));
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    fn render_level(
        &self,
        dir: &Utf8Path,
        prefix: &str,
        lines: &mut Vec<String>,
        counts: &mut (usize, usize),
    ) {
        let visible: Vec<(String, Node)> = self
            .children(dir)
            .into_iter()
            .filter(|(name, _)| !name.starts_with('.'))
            .collect();
        let last_index = visible.len().saturating_sub(1);
        for (index, (name, node)) in visible.into_iter().enumerate() {
            let is_last = index == last_index;
            let branch = if is_last { "└── " } else { "├── " };
            lines.push(format!("{prefix}{branch}{name}"));
            match node {
                Node::Dir => {
                    counts.0 += 1;
                    let nested = format!("{prefix}{}", if is_last { "    " } else { "│   " });
                    self.render_level(&dir.join(&name), &nested, lines, counts);
                }
                Node::File(_) => counts.1 += 1,
            }
        }
    }

    fn render_listing(&self, dir: &Utf8Path) -> String {
        self.children(dir)
            .into_iter()
            .filter(|(name, _)| !name.starts_with('.'))
            .map(|(name, _)| format!("{name}\n"))
            .collect()
    }
}

fn resolve(cwd: &Utf8Path, path: &str) -> Utf8PathBuf {
    let joined = cwd.join(path);
    let mut resolved = Utf8PathBuf::from("/");
    for component in joined.components() {
        match component {
            Utf8Component::Normal(name) => resolved.push(name),
            Utf8Component::ParentDir => {
                resolved.pop();
            }
            Utf8Component::RootDir | Utf8Component::CurDir | Utf8Component::Prefix(_) => {}
        }
    }
    resolved
}

fn succeeded() -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stderr: String::new(),
    }
}

fn failed(exit_code: i32, stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_code,
        stderr: stderr.to_owned(),
    }
}

impl Workload for FakeWorkload {
    fn exec(
        &self,
        command: &ExecCommand,
        stdout: &mut dyn Write,
    ) -> Result<ExecOutput, WorkloadError> {
        self.record(format!("exec {command}"));
        if let Some(output) = self.failures.borrow().get(command.program()) {
            return Ok(output.clone());
        }

        let cwd = command.current_dir().unwrap_or(Utf8Path::new("/")).to_owned();
        if !matches!(self.node(&cwd), Some(Node::Dir)) {
            return Err(WorkloadError::Spawn {
                program: command.program().to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let program = command.program();
        let (output, text) = if program == self.extractor {
            (self.run_extractor(command, &cwd), String::new())
        } else {
            match program {
                "mv" => (self.run_mv(command, &cwd), String::new()),
                "tree" => (succeeded(), self.render_tree(&cwd)),
                "ls" if command.arguments() == ["-1"] => (succeeded(), self.render_listing(&cwd)),
                "apt" | "apt-get" => (succeeded(), String::new()),
                other => (failed(127, &format!("{other}: command not found")), String::new()),
            }
        };

        stdout
            .write_all(text.as_bytes())
            .map_err(|source| WorkloadError::OutputRejected {
                program: program.to_owned(),
                source,
            })?;
        Ok(output)
    }

    fn push(&self, path: &Utf8Path, contents: &[u8]) -> Result<(), WorkloadError> {
        self.record(format!("push {path}"));
        self.write_file(path, contents.to_vec())
    }

    fn remove_path(&self, path: &Utf8Path, recursive: bool) -> Result<(), WorkloadError> {
        self.record(format!("remove {path}"));
        match self.node(path) {
            None => Err(WorkloadError::NotFound {
                path: path.to_owned(),
            }),
            Some(Node::Dir) if !recursive && !self.children(path).is_empty() => {
                Err(WorkloadError::DirectoryNotEmpty {
                    path: path.to_owned(),
                })
            }
            Some(_) => {
                self.remove_tree(path);
                Ok(())
            }
        }
    }

    fn exists(&self, path: &Utf8Path) -> Result<bool, WorkloadError> {
        self.record(format!("exists {path}"));
        Ok(self.node(path).is_some())
    }

    fn list_files(&self, path: &Utf8Path) -> Result<Vec<FileInfo>, WorkloadError> {
        self.record(format!("list {path}"));
        match self.node(path) {
            None => Err(WorkloadError::NotFound {
                path: path.to_owned(),
            }),
            Some(Node::File(_)) => Err(WorkloadError::NotADirectory {
                path: path.to_owned(),
            }),
            Some(Node::Dir) => Ok(self
                .children(path)
                .into_iter()
                .map(|(name, node)| FileInfo {
                    path: path.join(&name),
                    kind: match node {
                        Node::Dir => FileKind::Directory,
                        Node::File(_) => FileKind::File,
                    },
                    name,
                })
                .collect()),
        }
    }
}

/// Builds a zip payload from `(name, contents)` pairs.
///
/// Names ending in `/` become directory entries and their contents are
/// ignored.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        if let Some(dir) = name.strip_suffix('/') {
            writer
                .add_directory(dir, options)
                .expect("zip directory entry");
        } else {
            writer.start_file(*name, options).expect("zip file entry");
            writer.write_all(contents).expect("zip file contents");
        }
    }
    writer.finish().expect("zip finish").into_inner()
}

/// A small library with its payload at the archive's top level.
pub fn flat_library() -> Vec<u8> {
    zip_archive(&[
        ("Jane Austen/", b""),
        ("Jane Austen/Emma (1)/", b""),
        ("Jane Austen/Emma (1)/metadata.opf", b"<package/>"),
        ("Jane Austen/Emma (1)/Emma - Jane Austen.epub", b"epub"),
        ("metadata.db", b"sqlite"),
        (".calnotes/notes.db", b"notes"),
    ])
}

/// The same library nested inside a `Calibre Library` wrapper folder.
pub fn wrapped_library() -> Vec<u8> {
    zip_archive(&[
        ("Calibre Library/", b""),
        ("Calibre Library/Jane Austen/", b""),
        ("Calibre Library/Jane Austen/Emma (1)/", b""),
        ("Calibre Library/Jane Austen/Emma (1)/metadata.opf", b"<package/>"),
        (
            "Calibre Library/Jane Austen/Emma (1)/Emma - Jane Austen.epub",
            b"epub",
        ),
        ("Calibre Library/metadata.db", b"sqlite"),
    ])
}
