use super::FileOps;
use crate::backend::winhttp::error::win32_code;
use crate::codec::NativeString;
use std::io;
use std::path::Path;
use windows::Win32::Foundation::ERROR_PATH_NOT_FOUND;
use windows::Win32::Storage::FileSystem::{
    CreateDirectoryW, DeleteFileW, MOVEFILE_COPY_ALLOWED, MOVEFILE_REPLACE_EXISTING,
    MOVEFILE_WRITE_THROUGH, MoveFileExW,
};
use windows::core::PCWSTR;

/// [`FileOps`] calling the wide-character Win32 file API
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32FileOps;

fn to_io_error(error: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(win32_code(error.code().0) as i32)
}

fn wide(path: &Path) -> NativeString {
    NativeString::from(path)
}

impl Win32FileOps {
    fn move_once(src: &NativeString, dst: &NativeString, replace: bool) -> io::Result<()> {
        // Cross-volume moves copy; write-through returns only once data is on disk.
        let mut flags = MOVEFILE_COPY_ALLOWED | MOVEFILE_WRITE_THROUGH;
        if replace {
            flags |= MOVEFILE_REPLACE_EXISTING;
        }
        unsafe { MoveFileExW(PCWSTR(src.as_ptr()), PCWSTR(dst.as_ptr()), flags) }
            .map_err(to_io_error)
    }
}

impl FileOps for Win32FileOps {
    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let path = wide(path);
        unsafe { CreateDirectoryW(PCWSTR(path.as_ptr()), None) }.map_err(to_io_error)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let path = wide(path);
        unsafe { DeleteFileW(PCWSTR(path.as_ptr())) }.map_err(to_io_error)
    }

    fn move_file(&self, src: &Path, dst: &Path, replace: bool) -> io::Result<()> {
        let (wide_src, wide_dst) = (wide(src), wide(dst));

        match Self::move_once(&wide_src, &wide_dst, replace) {
            Err(e) if e.raw_os_error() == Some(ERROR_PATH_NOT_FOUND.0 as i32) => {
                tracing::debug!(dst = %dst.display(), "MoveFileEx: path not found, creating directory");
                if let Some(parent) = dst.parent() {
                    self.mkdir_recursive(parent)?;
                }
                Self::move_once(&wide_src, &wide_dst, replace)
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn move_creates_destination_directory() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.tmp");
        let dst = dir.path().join("nested").join("dst.bin");
        std::fs::write(&src, b"data").unwrap();

        Win32FileOps.move_file(&src, &dst, false).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"data");
    }

    #[test]
    fn move_without_replace_fails_on_existing() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a");
        let dst = dir.path().join("b");
        std::fs::write(&src, b"a").unwrap();
        std::fs::write(&dst, b"b").unwrap();

        assert!(Win32FileOps.move_file(&src, &dst, false).is_err());
        assert!(src.exists());
        Win32FileOps.move_file(&src, &dst, true).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"a");
    }

    #[test]
    fn mkdir_and_remove_use_wide_paths() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("ä").join("ö");
        Win32FileOps.mkdir_recursive(&nested).unwrap();
        assert!(nested.is_dir());

        let file = nested.join("f");
        std::fs::write(&file, b"x").unwrap();
        Win32FileOps.remove(&file).unwrap();
        assert!(!file.exists());
    }
}
