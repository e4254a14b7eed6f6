//! Filesystem helpers used to lay out experiments: creating nested folders, copying and removing
//! sets of files relative to a base folder, and moving whole directory trees around.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Expand a leading `~` to the home directory of the current user. Paths without a leading `~`
/// are returned unchanged, and so is everything if no home directory can be found.
pub fn expand_user(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => {
            log::warn!("Cannot determine the home directory, keeping {path:?}");
            path.to_path_buf()
        }
    }
}

/// Join `parts` to `base` and make sure the resulting folder exists.
pub fn get_path<I, P>(base: impl AsRef<Path>, parts: I) -> io::Result<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut path = base.as_ref().to_path_buf();
    for part in parts {
        path.push(part);
    }
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Copy files given as `(source, destination)` pairs, where sources are relative to `src_dir` and
/// destinations are relative to `dst_dir`. Parent folders of the destinations are created.
pub fn copy_files<I, S, D>(src_dir: impl AsRef<Path>, dst_dir: impl AsRef<Path>, files: I) -> io::Result<()>
where
    I: IntoIterator<Item = (S, D)>,
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    for (src, dst) in files {
        let src = src_dir.as_ref().join(src);
        let dst = dst_dir.as_ref().join(dst);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        log::trace!("copying {src:?} to {dst:?}");
        fs::copy(&src, &dst).map_err(|e| annotate(e, &src))?;
    }
    Ok(())
}

/// Remove the given files relative to `dir`. Files that do not exist are skipped.
pub fn remove_files<I, P>(dir: impl AsRef<Path>, files: I) -> io::Result<()>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for file in files {
        let path = dir.as_ref().join(file);
        match fs::remove_file(&path) {
            Ok(()) => log::trace!("removed {path:?}"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(annotate(e, &path)),
        }
    }
    Ok(())
}

/// Remove a folder and all of its content. A missing folder is not an error.
pub fn remove_folder(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    match fs::remove_dir_all(path) {
        Ok(()) => {
            log::trace!("removed folder {path:?}");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(annotate(e, path)),
    }
}

/// Recursively copy the folder `src` to `dst`. `dst` must not exist yet.
pub fn copy_folder(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> io::Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("cannot copy {src:?}: {dst:?} already exists"),
        ));
    }
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src).map_err(|e| annotate(e, src))? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_folder(entry.path(), target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

/// Move the folder `src` to `dst`. Falls back to copy-then-remove when a plain rename is not
/// possible, e.g., across filesystems.
pub fn move_folder(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> io::Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("cannot move {src:?}: {dst:?} already exists"),
        ));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    log::trace!("moving {src:?} to {dst:?}");
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_folder(src, dst)?;
    fs::remove_dir_all(src).map_err(|e| annotate(e, src))
}

/// List all regular files below `dir`, as paths relative to `dir`, sorted.
pub fn list_files(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    fn walk(root: &Path, rel: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in fs::read_dir(root.join(rel)).map_err(|e| annotate(e, &root.join(rel)))? {
            let entry = entry?;
            let rel = rel.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                walk(root, &rel, files)?;
            } else {
                files.push(rel);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir.as_ref(), Path::new(""), &mut files)?;
    files.sort();
    Ok(files)
}

/// Attach the offending path to an IO error, as `std::fs` does not.
fn annotate(e: io::Error, path: &Path) -> io::Error {
    io::Error::new(e.kind(), format!("{}: {e}", path.display()))
}
