//! Content-coding identifiers.

/// A content coding supported by the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Encoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl Encoding {
    /// Wire token (`Content-Encoding` / `Accept-Encoding` value).
    #[inline]
    pub const fn token(&self) -> &'static str {
        match self {
            Encoding::Identity => "identity",
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
            Encoding::Brotli => "br",
            Encoding::Zstd => "zstd",
        }
    }

    /// Parses a coding token case-insensitively. `x-gzip` is accepted as an
    /// alias per RFC 7230 §4.2.3.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        #[rustfmt::skip]
        const TOKENS: [(&[u8], Encoding); 6] = [
            (b"identity", Encoding::Identity),
            (b"gzip",     Encoding::Gzip),
            (b"x-gzip",   Encoding::Gzip),
            (b"deflate",  Encoding::Deflate),
            (b"br",       Encoding::Brotli),
            (b"zstd",     Encoding::Zstd),
        ];
        TOKENS
            .iter()
            .find(|(t, _)| token.eq_ignore_ascii_case(t))
            .map(|(_, e)| *e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<Encoding>); 7] = [
            (b"gzip",     Some(Encoding::Gzip)),
            (b"GZIP",     Some(Encoding::Gzip)),
            (b"x-gzip",   Some(Encoding::Gzip)),
            (b"br",       Some(Encoding::Brotli)),
            (b"zstd",     Some(Encoding::Zstd)),
            (b"identity", Some(Encoding::Identity)),
            (b"lzma",     None),
        ];

        for (token, expected) in cases {
            assert_eq!(Encoding::from_token(token), expected);
        }
    }
}
