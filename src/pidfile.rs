//! Single-instance guard.
//!
//! A running controller holds an exclusive `flock` on its PID file for its whole
//! lifetime. The lock, not the recorded PID, decides whether an instance is
//! running, so a file left behind by a crash is recognised as stale.

use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const PID_FILE_NAME: &str = "homerow-mouse.pid";

/// What a PID file says about the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    NotRunning,
    Running(i32),
    /// The file exists but nobody holds its lock
    Stale(Option<i32>),
}

/// Default PID file location: `$XDG_RUNTIME_DIR`, falling back to the cache dir.
pub fn default_path() -> Result<PathBuf> {
    let dir = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .context("Could not find a runtime or cache directory for the PID file")?;
    Ok(dir.join(PID_FILE_NAME))
}

/// Held PID file. Dropping it removes the file and releases the lock.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    _file: File,
}

impl PidFile {
    /// Locks `path` and records the current process ID in it.
    ///
    /// # Errors
    /// Fails if another instance holds the lock or the file cannot be written.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open PID file {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            let holder = read_pid(&mut file)
                .map(|pid| format!(" (pid {pid})"))
                .unwrap_or_default();
            return Err(anyhow!("homerow-mouse is already running{holder}"));
        }

        write_pid(&mut file)
            .with_context(|| format!("Failed to write PID file {}", path.display()))?;

        debug!("Holding PID file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove PID file {}: {}", self.path.display(), e);
        }
    }
}

fn write_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

fn read_pid(file: &mut File) -> Option<i32> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok().filter(|pid| *pid > 0)
}

/// Inspects `path` without disturbing a running instance.
///
/// # Errors
/// Fails only if an existing file cannot be opened.
pub fn inspect(path: &Path) -> Result<InstanceStatus> {
    if !path.exists() {
        return Ok(InstanceStatus::NotRunning);
    }
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open PID file {}", path.display()))?;
    let pid = read_pid(&mut file);

    if file.try_lock_exclusive().is_ok() {
        // Closing the file drops the lock taken here
        return Ok(InstanceStatus::Stale(pid));
    }
    match pid {
        Some(pid) => Ok(InstanceStatus::Running(pid)),
        None => Ok(InstanceStatus::Stale(None)),
    }
}

/// Deletes a stale PID file.
pub fn remove_stale(path: &Path) -> Result<()> {
    fs::remove_file(path)
        .with_context(|| format!("Failed to remove stale PID file {}", path.display()))
}
