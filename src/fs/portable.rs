use super::FileOps;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// [`FileOps`] on top of `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableFileOps;

impl FileOps for PortableFileOps {
    fn move_file(&self, src: &Path, dst: &Path, replace: bool) -> io::Result<()> {
        if !replace && dst.symlink_metadata().is_ok() {
            return Err(destination_exists(dst));
        }

        match rename_or_copy(src, dst, replace) {
            Err(e) if e.kind() == io::ErrorKind::NotFound && src.exists() => {
                let Some(parent) = dst.parent() else {
                    return Err(e);
                };
                tracing::debug!(dst = %dst.display(), "destination directory missing, creating it");
                self.mkdir_recursive(parent)?;
                rename_or_copy(src, dst, replace)
            }
            result => result,
        }
    }
}

fn destination_exists(dst: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{} already exists", dst.display()),
    )
}

fn rename_or_copy(src: &Path, dst: &Path, replace: bool) -> io::Result<()> {
    match fs::rename(src, dst) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "rename crosses devices, copying instead"
            );
            copy_across(src, dst, replace)?;
            fs::remove_file(src)
        }
        result => result,
    }
}

/// Copy `src` over to `dst`, synced to disk before returning
fn copy_across(src: &Path, dst: &Path, replace: bool) -> io::Result<()> {
    if !replace && dst.symlink_metadata().is_ok() {
        return Err(destination_exists(dst));
    }

    let mut reader = File::open(src)?;
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        PortableFileOps.mkdir_recursive(parent)?;
    }
    match fs::remove_file(dst) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut writer = File::create(dst)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    tracing::trace!(bytes = copied, dst = %dst.display(), "copied file");
    Ok(())
}
