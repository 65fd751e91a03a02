//! HTTP request methods and method bitmaps.

/// HTTP request methods
///
/// # References
///
/// - [RFC 7231, Section 4](https://datatracker.ietf.org/doc/html/rfc7231#section-4)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method - transfer a current representation of the target resource
    /// [[RFC7231, Section 4.3.1](https://tools.ietf.org/html/rfc7231#section-4.3.1)]
    Get,
    /// HEAD method - same as GET but without response body
    /// [[RFC7231, Section 4.3.2](https://tools.ietf.org/html/rfc7231#section-4.3.2)]
    Head,
    /// POST method - perform resource-specific processing on the request payload
    /// [[RFC7231, Section 4.3.3](https://tools.ietf.org/html/rfc7231#section-4.3.3)]
    Post,
    /// PUT method - replace all current representations of the target resource
    /// [[RFC7231, Section 4.3.4](https://tools.ietf.org/html/rfc7231#section-4.3.4)]
    Put,
    /// DELETE method - remove all current representations of the target resource
    /// [[RFC7231, Section 4.3.5](https://tools.ietf.org/html/rfc7231#section-4.3.5)]
    Delete,
    /// PATCH method - apply partial modifications to a resource
    /// [[RFC5789, Section 2](https://tools.ietf.org/html/rfc5789#section-2)]
    Patch,
    /// OPTIONS method - describe the communication options for the target resource
    /// [[RFC7231, Section 4.3.7](https://tools.ietf.org/html/rfc7231#section-4.3.7)]
    Options,
    /// TRACE method - message loop-back test; only served when tracing is enabled
    /// [[RFC7231, Section 4.3.8](https://tools.ietf.org/html/rfc7231#section-4.3.8)]
    Trace,
    /// CONNECT method - accepted by the parser, never routable
    /// [[RFC7231, Section 4.3.6](https://tools.ietf.org/html/rfc7231#section-4.3.6)]
    Connect,
}

pub(crate) const NB_METHODS: usize = 9;

pub(crate) const ALL_METHODS: [Method; NB_METHODS] = [
    Method::Get,
    Method::Head,
    Method::Post,
    Method::Put,
    Method::Delete,
    Method::Patch,
    Method::Options,
    Method::Trace,
    Method::Connect,
];

impl Method {
    /// Parses a request-line method token. Matching is case-insensitive.
    #[inline]
    pub(crate) fn from_token(token: &[u8]) -> Option<Self> {
        for method in ALL_METHODS {
            if token.eq_ignore_ascii_case(method.as_str().as_bytes()) {
                return Some(method);
            }
        }
        None
    }

    /// Canonical upper-case token.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }

    #[inline(always)]
    pub(crate) const fn idx(self) -> usize {
        self as usize
    }
}

/// A set of HTTP methods stored as a bitmap.
///
/// Used for route registration (`router.route(Method::Get | Method::Post, ..)`)
/// and to build `Allow` headers for 405 responses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MethodSet(u16);

impl MethodSet {
    pub const EMPTY: MethodSet = MethodSet(0);

    #[inline]
    pub const fn of(method: Method) -> Self {
        MethodSet(1 << method.idx())
    }

    #[inline]
    pub const fn all() -> Self {
        MethodSet((1 << NB_METHODS) - 1)
    }

    #[inline]
    pub const fn contains(&self, method: Method) -> bool {
        self.0 & (1 << method.idx()) != 0
    }

    #[inline]
    pub fn insert(&mut self, method: Method) {
        self.0 |= 1 << method.idx();
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub(crate) const fn union(self, other: MethodSet) -> MethodSet {
        MethodSet(self.0 | other.0)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = Method> + '_ {
        ALL_METHODS.into_iter().filter(|m| self.contains(*m))
    }

    /// Builds an `Allow` header value.
    ///
    /// When `synthesize_head` is set, HEAD is listed whenever GET is present,
    /// mirroring the dispatch-time HEAD->GET fallback.
    pub(crate) fn allow_header(&self, synthesize_head: bool) -> String {
        let mut set = *self;
        if synthesize_head && set.contains(Method::Get) {
            set.insert(Method::Head);
        }
        let mut out = String::new();
        for method in set.iter() {
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(method.as_str());
        }
        out
    }
}

impl From<Method> for MethodSet {
    #[inline]
    fn from(method: Method) -> Self {
        MethodSet::of(method)
    }
}

impl std::ops::BitOr for Method {
    type Output = MethodSet;

    #[inline]
    fn bitor(self, rhs: Method) -> MethodSet {
        MethodSet::of(self).union(MethodSet::of(rhs))
    }
}

impl std::ops::BitOr<Method> for MethodSet {
    type Output = MethodSet;

    #[inline]
    fn bitor(self, rhs: Method) -> MethodSet {
        self.union(MethodSet::of(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_token() {
        #[rustfmt::skip]
        let cases = [
            (&b"GET"[..],     Some(Method::Get)),
            (b"get",          Some(Method::Get)),
            (b"Post",         Some(Method::Post)),
            (b"OPTIONS",      Some(Method::Options)),
            (b"TRACE",        Some(Method::Trace)),
            (b"CONNECT",      Some(Method::Connect)),
            (b"PYU",          None),
            (b"GETX",         None),
            (b"",             None),
        ];

        for (token, expected) in cases {
            assert_eq!(Method::from_token(token), expected);
        }
    }

    #[test]
    fn set_ops() {
        let set = Method::Get | Method::Post;
        assert!(set.contains(Method::Get));
        assert!(set.contains(Method::Post));
        assert!(!set.contains(Method::Put));

        let set = set | Method::Delete;
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Method::Get, Method::Post, Method::Delete]
        );
    }

    #[test]
    fn allow_header_synthesizes_head() {
        let set = Method::Get | Method::Post;
        assert_eq!(set.allow_header(true), "GET, HEAD, POST");
        assert_eq!(set.allow_header(false), "GET, POST");

        let only_put = MethodSet::of(Method::Put);
        assert_eq!(only_put.allow_header(true), "PUT");
    }
}
