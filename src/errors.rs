use crate::http::status::StatusCode;
use std::{error, fmt};

/// Protocol-level rejection raised while decoding a request or its body.
///
/// Every variant maps to a fixed status code; the connection is closed after
/// the error response is written since framing can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProtocolError {
    BadRequestLine,
    UnsupportedVersion,
    MissingHost,
    BadHeader,
    DuplicateHeader,
    HeadersTooLarge,
    BadContentLength,
    ConflictingFraming,
    BodyTooLarge,
    BadChunk,
    ForbiddenTrailer,
    TrailersTooLarge,
    BadPath,
    BadEncodingHeader,
    UnsupportedEncoding,
    DecompressedTooLarge,
    CorruptPayload,
    ExpectationFailed,
}

macro_rules! protocol_errors {
    ($($name:ident => $status:ident, $text:literal;)*) => {
        impl ProtocolError {
            #[inline]
            pub(crate) const fn status(&self) -> StatusCode {
                match self { $( Self::$name => StatusCode::$status, )* }
            }

            pub(crate) const fn reason(&self) -> &'static str {
                match self { $( Self::$name => $text, )* }
            }
        }
    };
}

protocol_errors! {
    BadRequestLine       => BAD_REQUEST, "malformed request line";
    UnsupportedVersion   => HTTP_VERSION_NOT_SUPPORTED, "unsupported HTTP version";
    MissingHost          => BAD_REQUEST, "missing Host header";
    BadHeader            => BAD_REQUEST, "malformed header field";
    DuplicateHeader      => BAD_REQUEST, "duplicate header not allowed";
    HeadersTooLarge      => REQUEST_HEADER_FIELDS_TOO_LARGE, "request headers exceed limit";
    BadContentLength     => BAD_REQUEST, "invalid Content-Length";
    ConflictingFraming   => BAD_REQUEST, "conflicting body framing";
    BodyTooLarge         => PAYLOAD_TOO_LARGE, "request body exceeds limit";
    BadChunk             => BAD_REQUEST, "malformed chunked encoding";
    ForbiddenTrailer     => BAD_REQUEST, "forbidden trailer field";
    TrailersTooLarge     => REQUEST_HEADER_FIELDS_TOO_LARGE, "request trailers exceed limit";
    BadPath              => BAD_REQUEST, "malformed request target";
    BadEncodingHeader    => BAD_REQUEST, "malformed Content-Encoding";
    UnsupportedEncoding  => UNSUPPORTED_MEDIA_TYPE, "unsupported content encoding";
    DecompressedTooLarge => PAYLOAD_TOO_LARGE, "decompressed body exceeds limit";
    CorruptPayload       => BAD_REQUEST, "corrupt compressed payload";
    ExpectationFailed    => EXPECTATION_FAILED, "expectation failed";
}

impl error::Error for ProtocolError {}
impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Error raised when a route pattern fails to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The path does not start with `/`.
    NotAbsolute,
    /// The path contains an empty segment (`//`).
    EmptySegment,
    /// A `{` was not closed, or a stray `}` was found.
    UnbalancedBrace,
    /// Named (`{id}`) and anonymous (`{}`) parameters mixed in one route.
    MixedParamNaming,
    /// A `*` wildcard appeared anywhere but as the final full segment.
    MisplacedWildcard,
    /// A parameter name was repeated within the route.
    DuplicateParamName,
}

impl error::Error for RouteError {}
impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RouteError::NotAbsolute => "route path must start with '/'",
            RouteError::EmptySegment => "route path contains an empty segment",
            RouteError::UnbalancedBrace => "unbalanced brace in route pattern",
            RouteError::MixedParamNaming => "named and anonymous parameters cannot be mixed",
            RouteError::MisplacedWildcard => "wildcard must be the final segment",
            RouteError::DuplicateParamName => "duplicate parameter name in route",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        #[rustfmt::skip]
        let cases = [
            (ProtocolError::BadRequestLine,       400),
            (ProtocolError::UnsupportedVersion,   505),
            (ProtocolError::HeadersTooLarge,      431),
            (ProtocolError::TrailersTooLarge,     431),
            (ProtocolError::BodyTooLarge,         413),
            (ProtocolError::DecompressedTooLarge, 413),
            (ProtocolError::UnsupportedEncoding,  415),
            (ProtocolError::CorruptPayload,       400),
            (ProtocolError::ExpectationFailed,    417),
        ];

        for (err, code) in cases {
            assert_eq!(err.status().as_u16(), code);
        }
    }
}
