use crate::errors::ProtocolError;

/// HTTP protocol version
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/1.0 [RFC 1945](https://tools.ietf.org/html/rfc1945)
    Http10,
    /// HTTP/1.1 [RFC 7230](https://tools.ietf.org/html/rfc7230) and related
    Http11,
}

impl Version {
    /// Parses the version token of a request line.
    ///
    /// A token that is not `HTTP/<x>.<y>`-shaped is a malformed request line
    /// (400); a well-shaped but unknown version is 505.
    #[inline]
    pub(crate) fn from_bytes(src: &[u8]) -> Result<Self, ProtocolError> {
        match src {
            b"HTTP/1.1" => Ok(Self::Http11),
            b"HTTP/1.0" => Ok(Self::Http10),
            _ if src.starts_with(b"HTTP/") => Err(ProtocolError::UnsupportedVersion),
            _ => Err(ProtocolError::BadRequestLine),
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}
