//! Quality-aware `Accept-Encoding` negotiation.

use crate::codec::encoding::Encoding;

/// Outcome of matching a request's `Accept-Encoding` against the configured
/// codec preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Negotiated {
    /// No coding applies; send the payload as-is.
    Identity,
    /// Compress with this coding when the payload is eligible.
    Encoded(Encoding),
    /// The client forbids identity and accepts none of the configured
    /// codings: eligible payloads must fail with 406.
    NotAcceptable,
}

/// One parsed `Accept-Encoding` member.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AcceptEntry {
    coding: Option<Encoding>, // None for "*"
    q: f32,
}

fn parse_entry(member: &[u8]) -> Option<AcceptEntry> {
    let mut parts = member.split(|&b| b == b';');
    let token = trim(parts.next()?);
    if token.is_empty() {
        return None;
    }

    let mut q = 1.0f32;
    for param in parts {
        let param = trim(param);
        if let Some(value) = param
            .strip_prefix(b"q=")
            .or_else(|| param.strip_prefix(b"Q="))
        {
            q = parse_q(value).unwrap_or(0.0);
        }
    }

    let coding = if token == b"*" {
        None
    } else {
        Some(Encoding::from_token(token)?)
    };
    Some(AcceptEntry { coding, q })
}

/// qvalue per RFC 7231 §5.3.1: `0.` to `1.` with up to three decimals.
fn parse_q(value: &[u8]) -> Option<f32> {
    let text = std::str::from_utf8(value).ok()?;
    let parsed: f32 = text.trim().parse().ok()?;
    if (0.0..=1.0).contains(&parsed) {
        Some(parsed)
    } else {
        None
    }
}

#[inline]
fn trim(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Picks the response coding for one request.
///
/// `preferred` is the server-side priority list; the first entry the client
/// accepts (q > 0) wins. Unknown client tokens are ignored. A `*` member
/// stands for every coding not otherwise listed, including identity.
pub(crate) fn select_encoding(accept_encoding: Option<&[u8]>, preferred: &[Encoding]) -> Negotiated {
    let Some(raw) = accept_encoding else {
        // absent header: any coding is acceptable; stay with identity
        return Negotiated::Identity;
    };

    let mut entries: Vec<AcceptEntry> = Vec::new();
    for member in raw.split(|&b| b == b',') {
        if trim(member).is_empty() {
            continue;
        }
        if let Some(entry) = parse_entry(member) {
            entries.push(entry);
        }
    }

    let q_of = |coding: Encoding| -> f32 {
        entries
            .iter()
            .find(|e| e.coding == Some(coding))
            .or_else(|| entries.iter().find(|e| e.coding.is_none()))
            .map(|e| e.q)
            .unwrap_or(0.0)
    };

    for &coding in preferred {
        if coding != Encoding::Identity && q_of(coding) > 0.0 {
            return Negotiated::Encoded(coding);
        }
    }

    // identity is acceptable unless explicitly prohibited
    let identity_q = entries
        .iter()
        .find(|e| e.coding == Some(Encoding::Identity))
        .or_else(|| entries.iter().find(|e| e.coding.is_none()))
        .map(|e| e.q)
        .unwrap_or(1.0);

    if identity_q > 0.0 {
        Negotiated::Identity
    } else {
        Negotiated::NotAcceptable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GZIP_BR: &[Encoding] = &[Encoding::Gzip, Encoding::Brotli];

    #[test]
    fn selection() {
        #[rustfmt::skip]
        let cases: [(Option<&[u8]>, Negotiated); 10] = [
            (None,                                  Negotiated::Identity),
            (Some(b""),                             Negotiated::Identity),
            (Some(b"gzip"),                         Negotiated::Encoded(Encoding::Gzip)),
            (Some(b"br, gzip"),                     Negotiated::Encoded(Encoding::Gzip)),
            (Some(b"br"),                           Negotiated::Encoded(Encoding::Brotli)),
            (Some(b"gzip;q=0, br"),                 Negotiated::Encoded(Encoding::Brotli)),
            (Some(b"gzip;q=0.5"),                   Negotiated::Encoded(Encoding::Gzip)),
            (Some(b"lzma"),                         Negotiated::Identity),
            (Some(b"*"),                            Negotiated::Encoded(Encoding::Gzip)),
            (Some(b"gzip;q=0, br;q=0"),             Negotiated::Identity),
        ];

        for (header, expected) in cases {
            assert_eq!(select_encoding(header, GZIP_BR), expected, "{:?}", header);
        }
    }

    #[test]
    fn identity_prohibition() {
        #[rustfmt::skip]
        let cases: [(&[u8], Negotiated); 4] = [
            (b"identity;q=0",                 Negotiated::NotAcceptable),
            (b"*;q=0",                        Negotiated::NotAcceptable),
            (b"gzip, identity;q=0",           Negotiated::Encoded(Encoding::Gzip)),
            (b"identity;q=0, *;q=0",          Negotiated::NotAcceptable),
        ];

        for (header, expected) in cases {
            assert_eq!(select_encoding(Some(header), GZIP_BR), expected, "{:?}", header);
        }
    }

    #[test]
    fn no_codecs_configured() {
        assert_eq!(select_encoding(Some(b"gzip"), &[]), Negotiated::Identity);
        assert_eq!(
            select_encoding(Some(b"identity;q=0"), &[]),
            Negotiated::NotAcceptable
        );
    }

    #[test]
    fn star_covers_unlisted_codings() {
        // br explicitly zero, * allows gzip
        assert_eq!(
            select_encoding(Some(b"br;q=0, *;q=0.1"), GZIP_BR),
            Negotiated::Encoded(Encoding::Gzip)
        );
    }
}
