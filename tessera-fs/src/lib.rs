//! Shared filesystem helpers built on `cap-std` and `camino`.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;
use std::time::UNIX_EPOCH;


/// What a path currently refers to on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Nothing exists at the path.
    Missing,
    /// A regular file of the given length in bytes.
    File {
        /// File length in bytes.
        len: u64,
    },
    /// A directory.
    Directory,
}

/// Size, kind and modification time of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStamp {
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Length in bytes as reported by the filesystem.
    pub len: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_millis: i64,
}

/// Open a UTF-8 file path for reading using ambient authority.
pub fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Resolve an ambient directory for the given path and return the directory with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Ensure the parent directory for `path` exists, handling absolute paths safely for cap-std.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    ensure_dir(parent)
}

/// Create `dir` and any missing ancestors.
pub fn ensure_dir(dir: &Utf8Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(dir)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)?;
    Ok(())
}

/// Report what `path` refers to without following it into the filesystem further.
pub fn path_kind(path: &Utf8Path) -> io::Result<PathKind> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(PathKind::Missing),
        Err(err) => return Err(err),
    };
    match dir.metadata(name.as_str()) {
        Ok(meta) if meta.is_dir() => Ok(PathKind::Directory),
        Ok(meta) => Ok(PathKind::File { len: meta.len() }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(PathKind::Missing),
        Err(err) => Err(err),
    }
}

/// Return whether a path exists and is a regular file using capability-based IO.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_dir_and_file(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Return whether anything exists at `path`.
pub fn path_exists(path: &Utf8Path) -> io::Result<bool> {
    path_kind(path).map(|kind| kind != PathKind::Missing)
}

/// Read the size, kind and modification time of `path`, or `None` when it is missing.
pub fn entry_stamp(path: &Utf8Path) -> io::Result<Option<EntryStamp>> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let meta = match dir.metadata(name.as_str()) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let modified = meta.modified()?.into_std();
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|_| io::Error::other("modification time precedes the Unix epoch"))?;
    let modified_millis = i64::try_from(since_epoch.as_millis())
        .map_err(|_| io::Error::other("modification time out of range"))?;
    Ok(Some(EntryStamp {
        is_directory: meta.is_dir(),
        len: meta.len(),
        modified_millis,
    }))
}

/// Delete the regular file at `path`. A missing file is not an error.
pub fn remove_file_if_exists(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.remove_file(name.as_str()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Remove `dir` and everything beneath it. Returns `false` when it was already gone.
pub fn remove_dir_all_if_exists(dir: &Utf8Path) -> io::Result<bool> {
    let (parent, name) = match open_dir_and_file(dir) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match parent.remove_dir_all(name.as_str()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Atomically create a new, empty file in `dir` named
/// `<stem>-<random><suffix>`. The file stays on disk after the call.
pub fn create_unique_file(dir: &Utf8Path, stem: &str, suffix: &str) -> io::Result<Utf8PathBuf> {
    let prefix = format!("{stem}-");
    let (_, path) = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(suffix)
        .tempfile_in(dir)?
        .keep()?;
    Utf8PathBuf::from_path_buf(path).map_err(|path| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("created non-UTF-8 path {}", path.display()),
        )
    })
}

/// Regular files directly inside `dir` whose names end with `suffix`,
/// sorted by path.
pub fn files_with_suffix(dir: &Utf8Path, suffix: &str) -> io::Result<Vec<Utf8PathBuf>> {
    let handle = fs_utf8::Dir::open_ambient_dir(dir, ambient_authority())?;
    let mut files = Vec::new();
    for listed in handle.entries()? {
        let entry = listed?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name()?;
        if name.ends_with(suffix) {
            files.push(dir.join(name));
        }
    }
    files.sort();
    Ok(files)
}

/// Split an absolute or relative parent path into an ambient base directory and a relative suffix.
pub fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        // Windows absolute path with a drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        // Unix-style absolute path.
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        // Relative path: resolve from the current directory.
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}
