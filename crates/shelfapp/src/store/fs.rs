//! On-disk layout and low-level file helpers.
//!
//! All metadata and patch writes are atomic: content goes to a uniquely named
//! temp file in the target directory, which is then renamed over the target.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use uuid::Uuid;

use crate::error::{Result, ShelfError};
use crate::patch::{FilePatch, ParsedPatch, PatchCodec, PatchContext};

pub const INDEX_FILE: &str = "index.json";
pub const ENTRY_FILE: &str = "entry.json";
pub const PATCH_FILE: &str = "shelved.patch";

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ShelfError::Store(format!("{} has no parent", path.display())))?;
    ensure_dir(dir)?;

    let stem = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let tmp = dir.join(format!(".{}-{}.tmp", stem, Uuid::new_v4()));
    fs::write(&tmp, content)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

/// Modification time, `None` when the file does not exist.
pub fn file_mtime(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub fn read_patch(path: &Path, codec: &dyn PatchCodec) -> Result<ParsedPatch> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| ShelfError::corrupt(path, "patch file is not valid UTF-8"))?;
    codec
        .decode(&text)
        .map_err(|err| ShelfError::corrupt(path, err.to_string()))
}

pub fn write_patch(
    path: &Path,
    codec: &dyn PatchCodec,
    patches: &[FilePatch],
    ctx: &PatchContext,
) -> Result<()> {
    atomic_write(path, codec.encode(patches, ctx).as_bytes())
}
