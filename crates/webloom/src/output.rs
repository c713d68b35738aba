use crate::error::{IoContext, Result, WebloomError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

/// Writes `content` to `destination` through a temporary file in the same
/// directory, so readers see either the old file or the complete new one.
pub fn write_atomic(destination: &Path, content: &[u8]) -> Result<()> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).io_context("creating directory", parent)?;

    let mut temporary =
        NamedTempFile::new_in(parent).io_context("creating temporary file in", parent)?;
    temporary
        .write_all(content)
        .io_context("writing", temporary.path())?;
    set_output_permissions(temporary.as_file(), destination)?;

    temporary
        .persist(destination)
        .map_err(|error| WebloomError::IoAt {
            context: "replacing",
            path: destination.to_path_buf(),
            source: error.error,
        })?;
    Ok(())
}

pub fn copy_static(source: &Path, destination: &Path) -> Result<()> {
    let content = fs::read(source).io_context("reading", source)?;
    write_atomic(destination, &content)
}

pub fn remove_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != std::io::ErrorKind::NotFound => {
            Err(error).io_context("removing", path)
        }
        _ => Ok(()),
    }
}

pub fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).io_context("creating directory", parent)?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .io_context("opening", path)?;
    file.set_modified(SystemTime::now())
        .io_context("touching", path)
}

#[cfg(unix)]
fn set_output_permissions(file: &File, destination: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(OUTPUT_MODE))
        .io_context("setting permissions of", destination)
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &File, _destination: &Path) -> Result<()> {
    Ok(())
}

pub type Owner = (PathBuf, usize);

#[derive(Debug, Default)]
pub struct DestinationLedger {
    claims: Mutex<HashMap<PathBuf, Owner>>,
}

impl DestinationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, destination: &Path, owner: Owner) -> Result<()> {
        let mut claims = self.claims.lock();
        match claims.get(destination) {
            Some(existing) if *existing != owner => Err(WebloomError::DestinationCollision {
                destination: destination.to_path_buf(),
                path: owner.0,
                existing: existing.0.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                claims.insert(destination.to_path_buf(), owner);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.claims.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.lock().is_empty()
    }
}
