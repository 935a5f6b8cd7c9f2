use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::PersistenceError;

/// A fully written sibling temp file waiting to replace its target.
#[derive(Debug)]
pub(crate) struct Staged {
    tmp: PathBuf,
    target: PathBuf,
}

impl Staged {
    /// Write `bytes` to `<target>.tmp` and fsync. The target is untouched.
    pub(crate) fn write(target: &Path, bytes: &[u8]) -> Result<Self, PersistenceError> {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        let tmp = target.with_file_name(name);

        let mut f = File::create(&tmp).map_err(|e| PersistenceError::io(&tmp, e))?;
        f.write_all(bytes).map_err(|e| PersistenceError::io(&tmp, e))?;
        f.sync_all().map_err(|e| PersistenceError::io(&tmp, e))?;

        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    /// Rename over the target.
    pub(crate) fn commit(self) -> Result<(), PersistenceError> {
        let res = fs::rename(&self.tmp, &self.target).map_err(|e| PersistenceError::io(&self.target, e));
        if res.is_err() {
            let _ = fs::remove_file(&self.tmp);
        }
        res
    }

    pub(crate) fn discard(self) {
        let _ = fs::remove_file(&self.tmp);
    }
}

/// Stage then rename in one step.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    Staged::write(target, bytes)?.commit()
}

/// Current contents, or `None` when the file does not exist.
pub(crate) fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, PersistenceError> {
    match fs::read(path) {
        Ok(b) => Ok(Some(b)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PersistenceError::io(path, e)),
    }
}

/// Put `path` back to `before` (deleting it when it did not exist).
pub(crate) fn restore(path: &Path, before: Option<&[u8]>) -> Result<(), PersistenceError> {
    match before {
        Some(b) => write_atomic(path, b),
        None => match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::io(path, e)),
        },
    }
}
