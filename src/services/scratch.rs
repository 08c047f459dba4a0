//! Per-request scratch files.
//!
//! A `ScratchFile` reserves a unique path under the scratch directory and
//! removes whatever was written there when it is dropped, so every exit
//! path of a handler cleans up after itself.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;
use uuid::Uuid;

const MAX_SUFFIX_LEN: usize = 200;

#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve `dir/<uuid>-<name>`. Nothing is created on disk until the
    /// caller writes to `path()`.
    ///
    /// Names too long for a file name keep only their extension.
    pub fn reserve(dir: &Path, name: &str) -> Self {
        let file_name = if name.len() <= MAX_SUFFIX_LEN {
            format!("{}-{}", Uuid::new_v4(), name)
        } else {
            match Path::new(name).extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.len() <= 16 => format!("{}.{}", Uuid::new_v4(), ext),
                _ => Uuid::new_v4().to_string(),
            }
        };
        Self {
            path: dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed scratch file {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => debug!(
                "failed to remove scratch file {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchFile::reserve(dir.path(), "cat.jpg");
            std::fs::write(scratch.path(), b"data").unwrap();
            assert!(scratch.path().exists());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn unused_reservation_drops_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::reserve(dir.path(), "never-written.jpg");
        assert!(!scratch.path().exists());
        drop(scratch);
    }

    #[test]
    fn same_name_gets_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScratchFile::reserve(dir.path(), "cat.jpg");
        let b = ScratchFile::reserve(dir.path(), "cat.jpg");
        assert_ne!(a.path(), b.path());
        assert!(a.path().to_string_lossy().ends_with("-cat.jpg"));
    }

    #[test]
    fn long_names_keep_only_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("{}.jpg", "x".repeat(600));
        let scratch = ScratchFile::reserve(dir.path(), &name);
        let file_name = scratch.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.len() < 64);
        assert!(file_name.ends_with(".jpg"));
        std::fs::write(scratch.path(), b"ok").unwrap();
    }
}
