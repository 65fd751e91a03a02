//! Request body decompression: multi-stage `Content-Encoding` peeling with
//! absolute and expansion-ratio guards.

use crate::codec::encoding::Encoding;
use crate::errors::ProtocolError;
use std::io::{self, Read};

/// Request (inbound) body decompression configuration.
#[derive(Debug, Clone)]
pub struct DecompressionConfig {
    /// Master switch. When off, encoded bodies are delivered verbatim to
    /// handlers and no 415 is generated for unknown codings.
    pub enable: bool,

    /// Absolute cap on the decompressed size; exceeding it rejects the
    /// request with 413 (default: 8 MiB).
    pub max_decompressed_bytes: usize,

    /// Reject when `decompressed > compressed * ratio`, catching
    /// compression bombs that stay under the absolute cap. `0.0` disables
    /// the guard (default: `50.0`).
    pub max_expansion_ratio: f64,

    /// Bodies at least this large take the streaming decode path, which
    /// preallocates output ahead of the capped inflate loop
    /// (default: 64 KiB).
    pub streaming_decompression_threshold_bytes: usize,
}

impl Default for DecompressionConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_decompressed_bytes: 8 * 1024 * 1024,
            max_expansion_ratio: 50.0,
            streaming_decompression_threshold_bytes: 64 * 1024,
        }
    }
}

/// Parses a `Content-Encoding` header into its coding list.
///
/// Empty members (leading/trailing/double commas) are malformed; unknown
/// codings map to 415.
pub(crate) fn parse_content_encodings(value: &[u8]) -> Result<Vec<Encoding>, ProtocolError> {
    let mut encodings = Vec::new();
    for member in value.split(|&b| b == b',') {
        let token = trim(member);
        if token.is_empty() {
            return Err(ProtocolError::BadEncodingHeader);
        }
        let encoding = Encoding::from_token(token).ok_or(ProtocolError::UnsupportedEncoding)?;
        encodings.push(encoding);
    }
    if encodings.is_empty() {
        return Err(ProtocolError::BadEncodingHeader);
    }
    Ok(encodings)
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

/// Decodes one coding stage under the configured guards.
///
/// The inflate loop re-checks both caps after every chunk, so a bomb aborts
/// long before the decoder is drained. `prealloc` sizes the output buffer up
/// front on the streaming path.
pub(crate) fn decode_stage(
    encoding: Encoding,
    input: &[u8],
    max_bytes: usize,
    max_ratio: f64,
    prealloc: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let ratio_cap = if max_ratio > 0.0 {
        (input.len() as f64 * max_ratio) as usize
    } else {
        usize::MAX
    };
    let cap = max_bytes.min(ratio_cap);

    let mut reader: Box<dyn Read + '_> = match encoding {
        Encoding::Gzip => Box::new(flate2::read::GzDecoder::new(input)),
        Encoding::Deflate => Box::new(flate2::read::ZlibDecoder::new(input)),
        Encoding::Brotli => Box::new(brotli::Decompressor::new(input, 4096)),
        Encoding::Zstd => Box::new(
            zstd::stream::read::Decoder::new(input).map_err(|_| ProtocolError::CorruptPayload)?,
        ),
        Encoding::Identity => return Ok(input.to_vec()),
    };

    let mut out = Vec::with_capacity(prealloc.min(cap));
    let mut chunk = [0u8; 16 * 1024];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(out),
            Ok(n) => {
                if out.len() + n > cap {
                    return Err(ProtocolError::DecompressedTooLarge);
                }
                out.extend_from_slice(&chunk[..n]);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(ProtocolError::CorruptPayload),
        }
    }
}

/// Applies the full decompression chain to a complete request body.
///
/// Codings are peeled in reverse of their listed order (RFC 7231);
/// `identity` members are skipped. Returns `None` when nothing had to be
/// decoded (the caller keeps the original body view).
pub(crate) fn decompress_body(
    content_encoding: &[u8],
    body: &[u8],
    cfg: &DecompressionConfig,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let encodings = parse_content_encodings(content_encoding)?;
    if encodings.iter().all(|&e| e == Encoding::Identity) {
        return Ok(None);
    }

    let prealloc = if body.len() >= cfg.streaming_decompression_threshold_bytes {
        cfg.max_decompressed_bytes.min(body.len().saturating_mul(4))
    } else {
        0
    };

    let mut current: Option<Vec<u8>> = None;
    for &encoding in encodings.iter().rev() {
        if encoding == Encoding::Identity {
            continue;
        }
        let input = current.as_deref().unwrap_or(body);
        let decoded = decode_stage(
            encoding,
            input,
            cfg.max_decompressed_bytes,
            cfg.max_expansion_ratio,
            prealloc,
        )?;
        current = Some(decoded);
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::compress::encode_full;

    fn cfg() -> DecompressionConfig {
        DecompressionConfig::default()
    }

    #[test]
    fn parse_encoding_lists() {
        assert_eq!(
            parse_content_encodings(b"gzip"),
            Ok(vec![Encoding::Gzip])
        );
        assert_eq!(
            parse_content_encodings(b"identity, gzip , br"),
            Ok(vec![Encoding::Identity, Encoding::Gzip, Encoding::Brotli])
        );
        assert_eq!(
            parse_content_encodings(b"gzip,,br"),
            Err(ProtocolError::BadEncodingHeader)
        );
        assert_eq!(
            parse_content_encodings(b""),
            Err(ProtocolError::BadEncodingHeader)
        );
        assert_eq!(
            parse_content_encodings(b"lzma"),
            Err(ProtocolError::UnsupportedEncoding)
        );
    }

    #[test]
    fn single_stage() {
        let body = encode_full(Encoding::Gzip, b"payload bytes").unwrap();
        let decoded = decompress_body(b"gzip", &body, &cfg()).unwrap();
        assert_eq!(decoded.as_deref(), Some(&b"payload bytes"[..]));
    }

    #[test]
    fn identity_only_is_passthrough() {
        assert_eq!(decompress_body(b"identity", b"raw", &cfg()).unwrap(), None);
        assert_eq!(
            decompress_body(b"identity, identity", b"raw", &cfg()).unwrap(),
            None
        );
    }

    #[test]
    fn stacked_stages_peel_right_to_left() {
        // applied gzip first, then zstd: header lists "gzip, zstd"
        let inner = encode_full(Encoding::Gzip, b"stacked").unwrap();
        let outer = encode_full(Encoding::Zstd, &inner).unwrap();

        let decoded = decompress_body(b"gzip, zstd", &outer, &cfg()).unwrap();
        assert_eq!(decoded.as_deref(), Some(&b"stacked"[..]));
    }

    #[test]
    fn identity_members_skipped_in_chain() {
        let body = encode_full(Encoding::Brotli, b"data").unwrap();
        let decoded = decompress_body(b"identity, br, identity", &body, &cfg()).unwrap();
        assert_eq!(decoded.as_deref(), Some(&b"data"[..]));
    }

    #[test]
    fn absolute_cap_enforced() {
        let big = vec![b'a'; 64 * 1024];
        let body = encode_full(Encoding::Gzip, &big).unwrap();
        let cfg = DecompressionConfig {
            max_decompressed_bytes: 1024,
            max_expansion_ratio: 0.0,
            ..cfg()
        };
        assert_eq!(
            decompress_body(b"gzip", &body, &cfg),
            Err(ProtocolError::DecompressedTooLarge)
        );
    }

    #[test]
    fn ratio_guard_enforced() {
        // highly compressible: tiny wire size, huge expansion
        let bomb = vec![0u8; 512 * 1024];
        let body = encode_full(Encoding::Gzip, &bomb).unwrap();
        let cfg = DecompressionConfig {
            max_expansion_ratio: 4.0,
            ..cfg()
        };
        assert_eq!(
            decompress_body(b"gzip", &body, &cfg),
            Err(ProtocolError::DecompressedTooLarge)
        );
    }

    #[test]
    fn corrupt_stream_rejected() {
        assert_eq!(
            decompress_body(b"gzip", b"definitely not gzip", &cfg()),
            Err(ProtocolError::CorruptPayload)
        );
    }

    #[test]
    fn all_supported_codings_round_trip() {
        for encoding in [Encoding::Gzip, Encoding::Deflate, Encoding::Brotli, Encoding::Zstd] {
            let body = encode_full(encoding, b"round trip").unwrap();
            let decoded =
                decompress_body(encoding.token().as_bytes(), &body, &cfg()).unwrap();
            assert_eq!(decoded.as_deref(), Some(&b"round trip"[..]), "{encoding:?}");
        }
    }
}
