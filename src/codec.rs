//! Conversion between UTF-8 text and the platform's native string form
//!
//! Windows APIs take NUL-terminated UTF-16, everything else takes
//! NUL-terminated bytes. [`NativeString`] owns one such buffer and always
//! carries exactly one trailing NUL unit.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;

/// Code unit of the platform's native string form
#[cfg(windows)]
pub type NativeUnit = u16;

/// Code unit of the platform's native string form
#[cfg(not(windows))]
pub type NativeUnit = u8;

/// An owned, NUL-terminated string in the platform's native encoding
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NativeString {
    units: Vec<NativeUnit>,
}

impl NativeString {
    /// Convert UTF-8 text to the native form
    pub fn from_utf8(text: &str) -> Self {
        #[cfg(windows)]
        let units = text.encode_utf16().collect();
        #[cfg(not(windows))]
        let units = text.as_bytes().to_vec();

        Self::terminated(units)
    }

    /// Convert an OS string (typically a path) to the native form
    pub fn from_os_str(text: &OsStr) -> Self {
        #[cfg(windows)]
        let units = {
            use std::os::windows::ffi::OsStrExt;
            text.encode_wide().collect()
        };
        #[cfg(unix)]
        let units = {
            use std::os::unix::ffi::OsStrExt;
            text.as_bytes().to_vec()
        };
        #[cfg(not(any(windows, unix)))]
        let units = text.to_string_lossy().as_bytes().to_vec();

        Self::terminated(units)
    }

    fn terminated(mut units: Vec<NativeUnit>) -> Self {
        // Text past an interior NUL is unreachable for the native APIs.
        if let Some(nul) = units.iter().position(|&u| u == 0) {
            units.truncate(nul);
        }
        units.push(0);
        Self { units }
    }

    /// Convert back to UTF-8, replacing invalid sequences
    pub fn to_utf8(&self) -> String {
        #[cfg(windows)]
        {
            String::from_utf16_lossy(self.as_units())
        }
        #[cfg(not(windows))]
        {
            String::from_utf8_lossy(self.as_units()).into_owned()
        }
    }

    /// Convert back to an OS string
    pub fn to_os_string(&self) -> OsString {
        #[cfg(windows)]
        {
            use std::os::windows::ffi::OsStringExt;
            OsString::from_wide(self.as_units())
        }
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStringExt;
            OsString::from_vec(self.as_units().to_vec())
        }
        #[cfg(not(any(windows, unix)))]
        {
            OsString::from(self.to_utf8())
        }
    }

    /// The code units, without the terminator
    pub fn as_units(&self) -> &[NativeUnit] {
        &self.units[..self.units.len() - 1]
    }

    /// The code units including the trailing NUL
    pub fn as_units_with_nul(&self) -> &[NativeUnit] {
        &self.units
    }

    /// Pointer to the NUL-terminated buffer, valid while `self` is alive
    pub fn as_ptr(&self) -> *const NativeUnit {
        self.units.as_ptr()
    }

    /// Number of code units, without the terminator
    pub fn len(&self) -> usize {
        self.units.len() - 1
    }

    /// Whether the string holds no code units besides the terminator
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NativeString {
    fn default() -> Self {
        Self { units: vec![0] }
    }
}

impl From<&str> for NativeString {
    fn from(text: &str) -> Self {
        Self::from_utf8(text)
    }
}

impl From<&Path> for NativeString {
    fn from(path: &Path) -> Self {
        Self::from_os_str(path.as_os_str())
    }
}

impl fmt::Display for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_utf8())
    }
}

impl fmt::Debug for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_utf8(), f)
    }
}
