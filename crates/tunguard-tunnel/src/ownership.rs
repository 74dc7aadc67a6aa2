use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;
use tunguard_types::{TunguardError, TunguardResult};

/// On-disk marker naming the tunnel process this daemon started.
///
/// Plain text, a single pid. Missing, unparsable or `<= 1` all read as "no
/// record"; nothing else in the process may cache its contents.
#[derive(Clone, Debug)]
pub(crate) struct PidRecord {
    path: PathBuf,
}

impl PidRecord {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read(&self) -> Option<u32> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read pid record {:?}: {}", self.path, e);
                return None;
            }
        };
        parse_pid(&raw)
    }

    pub(crate) fn write(&self, pid: u32) -> TunguardResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    TunguardError::Storage(format!(
                        "Failed to create pid record dir {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }
        fs::write(&self.path, format!("{}\n", pid)).map_err(|e| {
            TunguardError::Storage(format!("Failed to write pid record {:?}: {}", self.path, e))
        })
    }

    /// Removing an already-missing record is not an error.
    pub(crate) fn clear(&self) -> TunguardResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TunguardError::Storage(format!(
                "Failed to remove pid record {:?}: {}",
                self.path, e
            ))),
        }
    }
}

fn parse_pid(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(pid) if pid > 1 => Some(pid),
        _ => None,
    }
}
