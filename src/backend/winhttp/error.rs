//! WinHTTP error mapping

use crate::Error;
use crate::error::TransportStage;
use windows::Win32::Foundation::GetLastError;
use windows::core;

/// Describe the WinHTTP error codes a task is likely to hit
fn describe(code: u32) -> Option<&'static str> {
    let message = match code {
        12002 => "The request has timed out",
        12005 => "The URL is invalid",
        12006 => "The URL scheme could not be recognized",
        12007 => "The server name or address could not be resolved",
        12017 => "The operation was cancelled",
        12029 => "A connection with the server could not be established",
        12030 => "The connection with the server was terminated abnormally",
        12152 => "The server returned an invalid or unrecognized response",
        12175 => "A secure connection could not be established",
        _ => return None,
    };
    Some(message)
}

/// Extract the Win32 code from a `FACILITY_WIN32` HRESULT
pub(crate) fn win32_code(hresult: i32) -> u32 {
    let value = hresult as u32;
    if value & 0xFFFF_0000 == 0x8007_0000 {
        value & 0xFFFF
    } else {
        value
    }
}

fn from_code(stage: TransportStage, code: u32, fallback: impl FnOnce() -> String) -> Error {
    let message = describe(code)
        .map(str::to_string)
        .unwrap_or_else(fallback);
    Error::transport(stage, i64::from(code), message)
}

/// Map a failed WinHTTP call to a transport error for `stage`
pub fn map_winhttp_error(stage: TransportStage, error: core::Error) -> Error {
    let code = win32_code(error.code().0);
    from_code(stage, code, || error.message().to_string())
}

/// Build a transport error from the calling thread's last error code
pub fn last_error(stage: TransportStage) -> Error {
    let code = unsafe { GetLastError() }.0;
    from_code(stage, code, || format!("WinHTTP error {}", code))
}
