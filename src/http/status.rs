//! HTTP status codes.

/// An HTTP status code.
///
/// Stored as a plain `u16` so interim statuses (any 1xx an expectation
/// handler wishes to emit) and uncommon codes are representable; the common
/// codes are available as associated constants with canonical reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

macro_rules! set_status_codes {
    ($( $name:ident = ($num:expr, $str:expr); )+) => {
        impl StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            pub const $name: StatusCode = StatusCode($num);
        )+ }

        impl StatusCode {
            /// Canonical reason phrase, or an empty string for codes
            /// without a registered one.
            pub const fn canonical_reason(&self) -> &'static str {
                match self.0 { $(
                    $num => $str,
                )+
                    _ => "",
                }
            }
        }
    }
}

set_status_codes! {
    CONTINUE = (100, "Continue");
    SWITCHING_PROTOCOLS = (101, "Switching Protocols");
    PROCESSING = (102, "Processing");

    OK = (200, "OK");
    CREATED = (201, "Created");
    ACCEPTED = (202, "Accepted");
    NO_CONTENT = (204, "No Content");
    PARTIAL_CONTENT = (206, "Partial Content");

    MOVED_PERMANENTLY = (301, "Moved Permanently");
    FOUND = (302, "Found");
    SEE_OTHER = (303, "See Other");
    NOT_MODIFIED = (304, "Not Modified");
    TEMPORARY_REDIRECT = (307, "Temporary Redirect");
    PERMANENT_REDIRECT = (308, "Permanent Redirect");

    BAD_REQUEST = (400, "Bad Request");
    UNAUTHORIZED = (401, "Unauthorized");
    FORBIDDEN = (403, "Forbidden");
    NOT_FOUND = (404, "Not Found");
    METHOD_NOT_ALLOWED = (405, "Method Not Allowed");
    NOT_ACCEPTABLE = (406, "Not Acceptable");
    REQUEST_TIMEOUT = (408, "Request Timeout");
    CONFLICT = (409, "Conflict");
    GONE = (410, "Gone");
    LENGTH_REQUIRED = (411, "Length Required");
    PRECONDITION_FAILED = (412, "Precondition Failed");
    PAYLOAD_TOO_LARGE = (413, "Payload Too Large");
    URI_TOO_LONG = (414, "URI Too Long");
    UNSUPPORTED_MEDIA_TYPE = (415, "Unsupported Media Type");
    RANGE_NOT_SATISFIABLE = (416, "Range Not Satisfiable");
    EXPECTATION_FAILED = (417, "Expectation Failed");
    UNPROCESSABLE_ENTITY = (422, "Unprocessable Entity");
    UPGRADE_REQUIRED = (426, "Upgrade Required");
    TOO_MANY_REQUESTS = (429, "Too Many Requests");
    REQUEST_HEADER_FIELDS_TOO_LARGE = (431, "Request Header Fields Too Large");

    INTERNAL_SERVER_ERROR = (500, "Internal Server Error");
    NOT_IMPLEMENTED = (501, "Not Implemented");
    BAD_GATEWAY = (502, "Bad Gateway");
    SERVICE_UNAVAILABLE = (503, "Service Unavailable");
    GATEWAY_TIMEOUT = (504, "Gateway Timeout");
    HTTP_VERSION_NOT_SUPPORTED = (505, "HTTP Version Not Supported");
}

impl StatusCode {
    /// Builds a status code from a raw value.
    ///
    /// # Panics
    /// Panics in debug mode when `code` is outside `100..=599`.
    #[inline]
    #[track_caller]
    pub const fn new(code: u16) -> Self {
        debug_assert!(code >= 100 && code <= 599, "status code out of range");
        StatusCode(code)
    }

    #[inline(always)]
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub const fn is_informational(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    #[inline(always)]
    pub const fn is_success(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.canonical_reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons() {
        #[rustfmt::skip]
        let cases = [
            (StatusCode::OK,                              "OK"),
            (StatusCode::NOT_FOUND,                       "Not Found"),
            (StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE, "Request Header Fields Too Large"),
            (StatusCode::HTTP_VERSION_NOT_SUPPORTED,      "HTTP Version Not Supported"),
            (StatusCode::new(599),                        ""),
        ];

        for (status, reason) in cases {
            assert_eq!(status.canonical_reason(), reason);
        }
    }

    #[test]
    fn classes() {
        assert!(StatusCode::CONTINUE.is_informational());
        assert!(StatusCode::OK.is_success());
        assert!(!StatusCode::NOT_FOUND.is_success());
    }
}
