//! Moving processed files into the archive and failure directories.
//!
//! Existing files are never overwritten, not even by a file that appears
//! between choosing a name and moving onto it. A clash gets `_<YYYYMMDD_HHMMSS>`
//! inserted before the extension, and a numeric counter on top of that if the
//! timestamped name is taken too.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Format of the collision suffix.
pub const COLLISION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Highest counter tried after the timestamped name before giving up.
const MAX_COLLISION_COUNTER: u32 = 9_999;

/// Destination names for `file_name` inside `dest_dir`, in the order they are
/// tried: the plain name, the timestamped name, then numbered variants of it.
pub fn destination_candidates(
    dest_dir: &Path,
    file_name: &str,
    now: DateTime<Local>,
) -> impl Iterator<Item = PathBuf> {
    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string();
    let ext = name.extension().and_then(|e| e.to_str()).map(str::to_string);
    let stamp = now.format(COLLISION_TIMESTAMP_FORMAT).to_string();
    let dir = dest_dir.to_path_buf();

    let build = move |suffix: String| match &ext {
        Some(ext) => dir.join(format!("{stem}_{suffix}.{ext}")),
        None => dir.join(format!("{stem}_{suffix}")),
    };

    std::iter::once(dest_dir.join(file_name)).chain(
        std::iter::once(stamp.clone())
            .chain((1..=MAX_COLLISION_COUNTER).map(move |n| format!("{stamp}_{n}")))
            .map(build),
    )
}

/// Move `source` into `dest_dir`, keeping its name unless that would clash.
/// Returns the final path.
///
/// A name is only claimed if nothing exists there at the moment of the move;
/// a file that appears concurrently pushes the move on to the next candidate.
pub fn relocate(source: &Path, dest_dir: &Path, now: DateTime<Local>) -> io::Result<PathBuf> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no usable file name in {}", source.display()),
            )
        })?;

    for dest in destination_candidates(dest_dir, file_name, now) {
        match move_new(source, &dest) {
            Ok(()) => return Ok(dest),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {file_name} in {}", dest_dir.display()),
    ))
}

/// Move `source` to `dest`, failing with `AlreadyExists` instead of replacing
/// an existing file.
///
/// Links the file into place and unlinks the source. Where hard links are not
/// available (another filesystem, FAT, some network shares) the content is
/// copied into a freshly created file instead.
fn move_new(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::hard_link(source, dest) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(dest);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(link_err) => {
            tracing::debug!(
                source = %source.display(),
                dest = %dest.display(),
                error = %link_err,
                "hard link failed, falling back to copy"
            );
            copy_new(source, dest)?;
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(dest);
                return Err(e);
            }
            Ok(())
        }
    }
}

fn copy_new(source: &Path, dest: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let permissions = input.metadata()?.permissions();
    let mut output = OpenOptions::new().write(true).create_new(true).open(dest)?;

    let copied = io::copy(&mut input, &mut output)
        .and_then(|_| output.set_permissions(permissions))
        .and_then(|()| output.sync_all());
    if let Err(e) = copied {
        drop(output);
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}
