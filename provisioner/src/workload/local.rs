//! A workload backed by a host directory.
//!
//! Container paths are resolved beneath a root directory on the host, so
//! `/books` maps to `<root>/books`. Commands run as host processes with the
//! mapped working directory; their arguments are passed through untouched,
//! which is why callers refer to files relative to the working directory.

use super::{ExecCommand, ExecOutput, FileInfo, FileKind, Workload};
use crate::error::WorkloadError;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

const READ_CHUNK: usize = 8 * 1024;

/// Runs workload operations against a host directory.
#[derive(Debug, Clone)]
pub struct LocalWorkload {
    root: Utf8PathBuf,
    timeout: Option<Duration>,
}

impl LocalWorkload {
    /// Creates a workload whose container root is `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: None,
        }
    }

    /// Kills commands that run longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the host directory standing in for the container root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Maps an absolute container path onto the host.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError::OutsideRoot`] for relative paths and paths
    /// containing `..`.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibre_library_provisioner::workload::LocalWorkload;
    /// use camino::Utf8Path;
    ///
    /// let workload = LocalWorkload::new("/srv/container");
    /// let host = workload.host_path(Utf8Path::new("/books/Author"))?;
    /// assert_eq!(host, "/srv/container/books/Author");
    /// assert!(workload.host_path(Utf8Path::new("/books/../etc")).is_err());
    /// # Ok::<(), calibre_library_provisioner::error::WorkloadError>(())
    /// ```
    pub fn host_path(&self, path: &Utf8Path) -> Result<Utf8PathBuf, WorkloadError> {
        let outside = || WorkloadError::OutsideRoot {
            path: path.to_owned(),
        };
        if !path.is_absolute() {
            return Err(outside());
        }
        let mut host = self.root.clone();
        for component in path.components() {
            match component {
                Utf8Component::RootDir | Utf8Component::CurDir => {}
                Utf8Component::Normal(name) => host.push(name),
                Utf8Component::ParentDir | Utf8Component::Prefix(_) => return Err(outside()),
            }
        }
        Ok(host)
    }

    fn wait(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
        program: &str,
    ) -> Result<ExitStatus, WorkloadError> {
        let spawn_error = |source| WorkloadError::Spawn {
            program: program.to_owned(),
            source,
        };
        match deadline {
            None => child.wait().map_err(spawn_error),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match child.wait_timeout(remaining).map_err(spawn_error)? {
                    Some(status) => Ok(status),
                    None => Err(self.abandon(child, program)),
                }
            }
        }
    }

    fn abandon(&self, child: &mut Child, program: &str) -> WorkloadError {
        let _ = child.kill();
        let _ = child.wait();
        let seconds = self.timeout.map_or(0, |t| t.as_secs());
        warn!("{program} killed after exceeding {seconds}s timeout");
        WorkloadError::TimedOut {
            program: program.to_owned(),
            seconds,
        }
    }
}

fn io_error(operation: &'static str, path: &Utf8Path, source: io::Error) -> WorkloadError {
    match source.kind() {
        io::ErrorKind::NotFound => WorkloadError::NotFound {
            path: path.to_owned(),
        },
        io::ErrorKind::NotADirectory => WorkloadError::NotADirectory {
            path: path.to_owned(),
        },
        io::ErrorKind::DirectoryNotEmpty => WorkloadError::DirectoryNotEmpty {
            path: path.to_owned(),
        },
        _ => WorkloadError::Io {
            operation,
            path: path.to_owned(),
            source,
        },
    }
}

/// Forwards stdout chunks until the pipe closes or the receiver goes away.
fn forward_chunks(pipe: Option<ChildStdout>, chunks: &Sender<Vec<u8>>) {
    let Some(mut pipe) = pipe else {
        return;
    };
    let mut buf = [0_u8; READ_CHUNK];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                let Some(chunk) = buf.get(..n) else {
                    return;
                };
                if chunks.send(chunk.to_vec()).is_err() {
                    return;
                }
            }
        }
    }
}

impl Workload for LocalWorkload {
    fn exec(
        &self,
        command: &ExecCommand,
        stdout: &mut dyn Write,
    ) -> Result<ExecOutput, WorkloadError> {
        let program = command.program();
        let mut cmd = Command::new(program);
        cmd.args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = command.current_dir() {
            cmd.current_dir(self.host_path(dir)?);
        }

        debug!("exec: {command}");
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut child = cmd.spawn().map_err(|source| WorkloadError::Spawn {
            program: program.to_owned(),
            source,
        })?;

        let stderr_pipe = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let mut raw = Vec::new();
                let _ = pipe.read_to_end(&mut raw);
                text = String::from_utf8_lossy(&raw).into_owned();
            }
            text
        });

        let (sender, chunks) = mpsc::channel();
        let stdout_pipe = child.stdout.take();
        thread::spawn(move || forward_chunks(stdout_pipe, &sender));

        loop {
            let chunk = match deadline {
                None => match chunks.recv() {
                    Ok(chunk) => chunk,
                    Err(_) => break,
                },
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match chunks.recv_timeout(remaining) {
                        Ok(chunk) => chunk,
                        Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            return Err(self.abandon(&mut child, program));
                        }
                    }
                }
            };
            if let Err(source) = stdout.write_all(&chunk) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WorkloadError::OutputRejected {
                    program: program.to_owned(),
                    source,
                });
            }
        }

        let status = self.wait(&mut child, deadline, program)?;
        let stderr = stderr_reader.join().unwrap_or_default();
        Ok(ExecOutput {
            exit_code: status.code().unwrap_or(-1),
            stderr,
        })
    }

    fn push(&self, path: &Utf8Path, contents: &[u8]) -> Result<(), WorkloadError> {
        let host = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("push", path, e))?;
        }
        fs::write(&host, contents).map_err(|e| io_error("push", path, e))
    }

    fn remove_path(&self, path: &Utf8Path, recursive: bool) -> Result<(), WorkloadError> {
        let host = self.host_path(path)?;
        let metadata = fs::symlink_metadata(&host).map_err(|e| io_error("remove", path, e))?;
        let result = if !metadata.is_dir() {
            fs::remove_file(&host)
        } else if recursive {
            fs::remove_dir_all(&host)
        } else {
            fs::remove_dir(&host)
        };
        result.map_err(|e| io_error("remove", path, e))
    }

    fn exists(&self, path: &Utf8Path) -> Result<bool, WorkloadError> {
        let host = self.host_path(path)?;
        host.try_exists().map_err(|e| io_error("exists", path, e))
    }

    fn list_files(&self, path: &Utf8Path) -> Result<Vec<FileInfo>, WorkloadError> {
        let host = self.host_path(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&host).map_err(|e| io_error("list", path, e))? {
            let entry = entry.map_err(|e| io_error("list", path, e))?;
            let name = entry.file_name().into_string().map_err(|raw| {
                io_error(
                    "list",
                    path,
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("entry name {raw:?} is not valid UTF-8"),
                    ),
                )
            })?;
            let file_type = entry.file_type().map_err(|e| io_error("list", path, e))?;
            let kind = if file_type.is_dir() {
                FileKind::Directory
            } else if file_type.is_file() {
                FileKind::File
            } else if file_type.is_symlink() {
                FileKind::Symlink
            } else {
                FileKind::Other
            };
            entries.push(FileInfo {
                path: path.join(&name),
                name,
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
