//! URI decomposition and header block serialization
//!
//! Both operations are pure: no I/O and no shared state. They run on the
//! caller's thread while a task is being built.

use crate::codec::NativeString;
use url::Url;

/// Port used when neither the URI nor its scheme supplies one
pub const DEFAULT_PORT: u16 = 443;

/// The pieces of a URI the transport needs to address a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    /// Whether the scheme asks for TLS
    pub secure: bool,
    /// Host name or address
    pub host: String,
    /// Explicit port, or the scheme's default
    pub port: u16,
    /// Path including the query string
    pub path: String,
}

impl Default for UriParts {
    fn default() -> Self {
        Self {
            secure: true,
            host: String::new(),
            port: DEFAULT_PORT,
            path: String::new(),
        }
    }
}

/// Split a URI into security flag, host, port and path.
///
/// Never fails: a URI that cannot be parsed yields empty fields, and the
/// task built from it fails later when connecting.
///
/// # Examples
///
/// ```
/// let parts = netw::parse_uri("https://host:8443/a/b?q=1");
/// assert!(parts.secure);
/// assert_eq!(parts.host, "host");
/// assert_eq!(parts.port, 8443);
/// assert_eq!(parts.path, "/a/b?q=1");
/// ```
pub fn parse_uri(uri: &str) -> UriParts {
    let url = match Url::parse(uri) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(uri, error = %e, "unable to parse URI");
            return UriParts::default();
        }
    };

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    UriParts {
        secure: url.scheme() == "https",
        host: url.host_str().unwrap_or_default().to_string(),
        port: url.port_or_known_default().unwrap_or(DEFAULT_PORT),
        path,
    }
}

/// Request headers serialized into a single wire-ready block.
///
/// Each entry is `key: value\r\n`, in the order the caller supplied them.
/// The native form adds one trailing NUL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    text: String,
}

impl HeaderBlock {
    /// The serialized block
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether no headers were supplied
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The block in native form, NUL-terminated
    pub fn to_native(&self) -> NativeString {
        NativeString::from_utf8(&self.text)
    }

    /// Iterate the `(key, value)` entries of the block in order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        split_header_block(&self.text)
    }
}

/// Serialize headers into a [`HeaderBlock`].
///
/// Keys and values are copied verbatim: no escaping, no validation and no
/// deduplication.
///
/// # Examples
///
/// ```
/// let block = netw::combine_headers([("Accept", "*/*"), ("X-Token", "abc")]);
/// assert_eq!(block.as_str(), "Accept: */*\r\nX-Token: abc\r\n");
/// ```
pub fn combine_headers<I, K, V>(headers: I) -> HeaderBlock
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut text = String::new();
    for (key, value) in headers {
        text.push_str(key.as_ref());
        text.push_str(": ");
        text.push_str(value.as_ref());
        text.push_str("\r\n");
    }
    HeaderBlock { text }
}

/// Split a serialized header block back into entries.
///
/// Lines without a `": "` separator are skipped.
pub(crate) fn split_header_block(block: &str) -> impl Iterator<Item = (&str, &str)> {
    block
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once(": "))
}
