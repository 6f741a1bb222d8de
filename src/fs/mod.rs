//! Filesystem helpers used around downloads.
//!
//! [`FileOps`] bundles the handful of operations callers need once a
//! download has landed in a temporary file: moving it into place, creating
//! directories, querying sizes and opening files. [`PortableFileOps`] works
//! everywhere on top of `std::fs`; on Windows with the `backend-winhttp`
//! feature, [`Win32FileOps`] calls the wide-character Win32 API directly.
//!
//! The free functions in this module use the platform's native
//! implementation.
//!
//! ```no_run
//! # fn example(downloaded: &std::path::Path) -> std::io::Result<()> {
//! netw::fs::move_file(downloaded, "mods/cache/catalog.json", true)?;
//! assert!(netw::fs::size("mods/cache/catalog.json").is_some());
//! # Ok(())
//! # }
//! ```

mod portable;
#[cfg(all(windows, feature = "backend-winhttp"))]
mod win32;

pub use portable::PortableFileOps;
#[cfg(all(windows, feature = "backend-winhttp"))]
pub use win32::Win32FileOps;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::str::FromStr;

/// The implementation used by the free functions of this module
#[cfg(all(windows, feature = "backend-winhttp"))]
pub type NativeFileOps = Win32FileOps;
/// The implementation used by the free functions of this module
#[cfg(not(all(windows, feature = "backend-winhttp")))]
pub type NativeFileOps = PortableFileOps;

/// Filesystem operations with the semantics the download path relies on
pub trait FileOps {
    /// Create a single directory. Fails if it already exists.
    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    /// Delete a file
    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    /// Create `path` and every missing ancestor.
    ///
    /// Succeeds when the directory already exists, and only when the full
    /// path exists as a directory afterwards.
    fn mkdir_recursive(&self, path: &Path) -> io::Result<()> {
        if path.is_dir() {
            return Ok(());
        }

        // Walk back to the deepest existing ancestor, then create forward.
        let missing: Vec<&Path> = path
            .ancestors()
            .take_while(|dir| !dir.as_os_str().is_empty() && !dir.is_dir())
            .collect();

        for dir in missing.into_iter().rev() {
            match self.create_dir(dir) {
                Ok(()) => tracing::trace!(path = %dir.display(), "created directory"),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
                Err(e) => {
                    tracing::debug!(path = %dir.display(), "mkdir failed: {}", e);
                    return Err(e);
                }
            }
        }

        if path.is_dir() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} could not be created", path.display()),
            ))
        }
    }

    /// Move `src` to `dst`.
    ///
    /// With `replace` false an existing `dst` is an error and `src` is left
    /// untouched. A missing destination directory is created.
    fn move_file(&self, src: &Path, dst: &Path, replace: bool) -> io::Result<()>;

    /// Size of a regular file, `None` if it is missing or not a file
    fn size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
    }

    /// Open a file, creating its parent directory first if `mode` writes
    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<File> {
        if mode.writes() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                self.mkdir_recursive(parent)?;
            }
        }
        mode.options().open(path)
    }
}

/// How [`FileOps::open`] opens a file
///
/// Parses the C `fopen` mode strings; the binary and text flags (`b`, `t`)
/// are accepted and ignored.
///
/// ```
/// use netw::fs::OpenMode;
///
/// assert_eq!("wb".parse::<OpenMode>().unwrap(), OpenMode::Write);
/// assert_eq!("r+b".parse::<OpenMode>().unwrap(), OpenMode::ReadWrite);
/// assert!("q".parse::<OpenMode>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `r`: read an existing file
    Read,
    /// `w`: create or truncate, write only
    Write,
    /// `a`: create if missing, append only
    Append,
    /// `r+`: read and write an existing file
    ReadWrite,
    /// `w+`: create or truncate, read and write
    ReadWriteTruncate,
    /// `a+`: create if missing, read and append
    ReadAppend,
}

impl OpenMode {
    /// Whether the mode can modify the file
    pub fn writes(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
            OpenMode::ReadWrite => options.read(true).write(true),
            OpenMode::ReadWriteTruncate => options.read(true).write(true).create(true).truncate(true),
            OpenMode::ReadAppend => options.read(true).append(true).create(true),
        };
        options
    }
}

impl FromStr for OpenMode {
    type Err = io::Error;

    fn from_str(mode: &str) -> io::Result<Self> {
        let flags: String = mode.chars().filter(|c| !matches!(c, 'b' | 't')).collect();
        match flags.as_str() {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "a" => Ok(OpenMode::Append),
            "r+" => Ok(OpenMode::ReadWrite),
            "w+" => Ok(OpenMode::ReadWriteTruncate),
            "a+" => Ok(OpenMode::ReadAppend),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported open mode {mode:?}"),
            )),
        }
    }
}

/// Delete a file
pub fn remove(path: impl AsRef<Path>) -> io::Result<()> {
    NativeFileOps::default().remove(path.as_ref())
}

/// Create a directory and all missing ancestors
pub fn mkdir_recursive(path: impl AsRef<Path>) -> io::Result<()> {
    NativeFileOps::default().mkdir_recursive(path.as_ref())
}

/// Move a file, see [`FileOps::move_file`]
pub fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>, replace: bool) -> io::Result<()> {
    NativeFileOps::default().move_file(src.as_ref(), dst.as_ref(), replace)
}

/// Size of a regular file
pub fn size(path: impl AsRef<Path>) -> Option<u64> {
    NativeFileOps::default().size(path.as_ref())
}

/// Open a file with an `fopen`-style mode string
pub fn open(path: impl AsRef<Path>, mode: &str) -> io::Result<File> {
    NativeFileOps::default().open(path.as_ref(), mode.parse()?)
}
