// src/utils/fs.rs
use crate::error::{PkiError, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::Path,
};
use uuid::Uuid;

/// The service identity a file is handed to once written.
///
/// `uid`/`gid` are only known when the cluster config maps the identity; without them
/// the file keeps the bootstrap process's ownership and only the mode is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOwner {
    pub name: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl FileOwner {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: None,
            gid: None,
        }
    }
}

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

pub fn all_exist<P: AsRef<Path>>(paths: &[P]) -> bool {
    paths.iter().all(|p| file_exists(p.as_ref()))
}

pub fn read_to_string(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| PkiError::storage(path, format!("failed to read {}", what), e))
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| PkiError::storage(dir, "failed to create directory", e))
}

/// Writes `contents` so that `path` is either absent or complete.
///
/// Data goes to a uniquely named sibling, is fsynced, gets its mode and owner, and is
/// then renamed over `path`.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32, owner: Option<&FileOwner>) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = write_tmp(&tmp, contents, mode, owner)
        .and_then(|_| fs::rename(&tmp, path).map_err(|e| (tmp.clone(), e)));

    if let Err((failed, e)) = result {
        let _ = fs::remove_file(&tmp);
        return Err(PkiError::storage(failed, format!("failed to write {}", file_name), e));
    }

    // Best effort: make the rename durable.
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
    Ok(())
}

fn write_tmp(
    tmp: &Path,
    contents: &[u8],
    mode: u32,
    owner: Option<&FileOwner>,
) -> std::result::Result<(), (std::path::PathBuf, std::io::Error)> {
    let wrap = |e| (tmp.to_path_buf(), e);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options.open(tmp).map_err(wrap)?;
    file.write_all(contents).map_err(wrap)?;
    file.sync_all().map_err(wrap)?;
    drop(file);

    set_mode(tmp, mode).map_err(wrap)?;
    if let Some(owner) = owner {
        apply_owner(tmp, owner).map_err(wrap)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn apply_owner(path: &Path, owner: &FileOwner) -> std::io::Result<()> {
    if owner.uid.is_none() && owner.gid.is_none() {
        return Ok(());
    }
    std::os::unix::fs::chown(path, owner.uid, owner.gid)
}

#[cfg(not(unix))]
fn apply_owner(_path: &Path, _owner: &FileOwner) -> std::io::Result<()> {
    Ok(())
}
