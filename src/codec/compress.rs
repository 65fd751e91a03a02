//! Response compression: buffered encoding for `HttpResponse` bodies and
//! streaming encoders for the response writer.

use crate::codec::encoding::Encoding;
use crate::http::response::HttpResponse;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::{self, Write};

/// Response (outbound) compression configuration.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Server-side codec priority; the first entry the client accepts wins.
    /// Empty disables response compression entirely.
    pub preferred_formats: Vec<Encoding>,

    /// Bodies smaller than this are never compressed (default: `512`).
    pub min_bytes: usize,

    /// `Content-Type` prefixes eligible for compression. A response without
    /// a content type, or with one outside this list, is sent as-is.
    pub content_type_allow_list: Vec<String>,

    /// When `compressed_len / original_len` exceeds this ratio the encoded
    /// result is discarded and identity is sent (default: `0.95`).
    pub max_compression_ratio: f64,

    /// Append `Accept-Encoding` to `Vary` on compressible responses
    /// (default: `true`).
    pub add_vary_accept_encoding_header: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            preferred_formats: vec![
                Encoding::Gzip,
                Encoding::Brotli,
                Encoding::Zstd,
                Encoding::Deflate,
            ],
            min_bytes: 512,
            content_type_allow_list: vec![
                "text/".to_owned(),
                "application/json".to_owned(),
                "application/javascript".to_owned(),
                "application/xml".to_owned(),
                "image/svg+xml".to_owned(),
            ],
            max_compression_ratio: 0.95,
            add_vary_accept_encoding_header: true,
        }
    }
}

impl CompressionConfig {
    #[inline]
    pub(crate) fn content_type_eligible(&self, content_type: Option<&[u8]>) -> bool {
        let Some(content_type) = content_type else {
            return false;
        };
        self.content_type_allow_list
            .iter()
            .any(|prefix| starts_with_ignore_case(content_type, prefix.as_bytes()))
    }
}

#[inline]
fn starts_with_ignore_case(value: &[u8], prefix: &[u8]) -> bool {
    value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// An active streaming encoder feeding an internal output vector.
///
/// Output produced so far is drained with `take_output`; `finish` flushes
/// the coding's end-of-stream marker and returns the remaining bytes.
pub(crate) enum StreamEncoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
    Brotli(Box<brotli::CompressorWriter<Vec<u8>>>),
    Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
}

impl StreamEncoder {
    pub(crate) fn new(encoding: Encoding) -> io::Result<Self> {
        match encoding {
            Encoding::Gzip => Ok(Self::Gzip(GzEncoder::new(Vec::new(), Compression::default()))),
            Encoding::Deflate => Ok(Self::Deflate(ZlibEncoder::new(
                Vec::new(),
                Compression::default(),
            ))),
            Encoding::Brotli => Ok(Self::Brotli(Box::new(brotli::CompressorWriter::new(
                Vec::new(),
                4096,
                5,
                22,
            )))),
            Encoding::Zstd => Ok(Self::Zstd(zstd::stream::write::Encoder::new(Vec::new(), 0)?)),
            Encoding::Identity => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "identity has no encoder",
            )),
        }
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(enc) => enc.write_all(data),
            Self::Deflate(enc) => enc.write_all(data),
            Self::Brotli(enc) => enc.write_all(data),
            Self::Zstd(enc) => enc.write_all(data),
        }
    }

    /// Drains the bytes the encoder has produced so far.
    pub(crate) fn take_output(&mut self) -> Vec<u8> {
        match self {
            Self::Gzip(enc) => std::mem::take(enc.get_mut()),
            Self::Deflate(enc) => std::mem::take(enc.get_mut()),
            Self::Brotli(enc) => std::mem::take(enc.get_mut()),
            Self::Zstd(enc) => std::mem::take(enc.get_mut()),
        }
    }

    /// Finalizes the stream and returns any not-yet-drained output.
    pub(crate) fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Self::Gzip(enc) => enc.finish(),
            Self::Deflate(enc) => enc.finish(),
            Self::Brotli(enc) => Ok(enc.into_inner()),
            Self::Zstd(enc) => enc.finish(),
        }
    }
}

/// One-shot encode of a full payload.
pub(crate) fn encode_full(encoding: Encoding, data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = StreamEncoder::new(encoding)?;
    encoder.write(data)?;
    encoder.finish()
}

/// Attempts to compress a buffered response in place.
///
/// Returns `true` when the compressed form was discarded by the ratio guard
/// (the caller counts those fallbacks).
pub(crate) fn try_compress_response(
    resp: &mut HttpResponse,
    encoding: Encoding,
    cfg: &CompressionConfig,
) -> bool {
    debug_assert!(encoding != Encoding::Identity);

    if resp.header("Content-Encoding").is_some() {
        return false;
    }
    let eligible_type = cfg.content_type_eligible(resp.header("Content-Type"));
    if cfg.add_vary_accept_encoding_header && eligible_type {
        // negotiation happened for this response regardless of outcome
        resp.append_vary("Accept-Encoding");
    }
    if !eligible_type {
        return false;
    }
    let Some(body) = resp.body_bytes() else {
        return false; // file payloads stream as-is
    };
    if body.len() < cfg.min_bytes {
        return false;
    }

    let encoded = match encode_full(encoding, body) {
        Ok(encoded) => encoded,
        Err(err) => {
            log::warn!("response encode failed, sending identity: {err}");
            return false;
        }
    };

    if encoded.len() as f64 > body.len() as f64 * cfg.max_compression_ratio {
        return true; // incompressible payload, keep identity
    }

    resp.set_header("Content-Encoding", encoding.token());
    resp.set_body(encoded);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::status::StatusCode;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    fn text_response(len: usize) -> HttpResponse {
        HttpResponse::new(StatusCode::OK)
            .with_content_type("text/plain")
            .with_body(vec![b'a'; len])
    }

    #[test]
    fn compresses_eligible_body() {
        let mut resp = text_response(1024);
        let cfg = CompressionConfig {
            min_bytes: 1,
            ..CompressionConfig::default()
        };

        let fallback = try_compress_response(&mut resp, Encoding::Gzip, &cfg);
        assert!(!fallback);
        assert_eq!(resp.header("Content-Encoding"), Some(&b"gzip"[..]));
        assert_eq!(resp.header("Vary"), Some(&b"Accept-Encoding"[..]));

        let body = resp.body_bytes().unwrap();
        assert_eq!(&body[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(body), vec![b'a'; 1024]);
    }

    #[test]
    fn below_min_bytes_stays_identity() {
        let mut resp = text_response(16);
        let cfg = CompressionConfig {
            min_bytes: 64,
            ..CompressionConfig::default()
        };
        try_compress_response(&mut resp, Encoding::Gzip, &cfg);
        assert_eq!(resp.header("Content-Encoding"), None);
        assert_eq!(resp.body_bytes().unwrap(), vec![b'a'; 16].as_slice());
    }

    #[test]
    fn content_type_allowlist_is_prefix_matched() {
        let cfg = CompressionConfig::default();
        assert!(cfg.content_type_eligible(Some(b"text/plain; charset=utf-8")));
        assert!(cfg.content_type_eligible(Some(b"application/json")));
        assert!(!cfg.content_type_eligible(Some(b"image/png")));
        assert!(!cfg.content_type_eligible(None));

        let mut resp = HttpResponse::new(StatusCode::OK)
            .with_content_type("image/png")
            .with_body(vec![b'a'; 2048]);
        try_compress_response(&mut resp, Encoding::Gzip, &cfg);
        assert_eq!(resp.header("Content-Encoding"), None);
    }

    #[test]
    fn ratio_guard_discards_incompressible() {
        // random-ish bytes do not compress; ratio guard keeps identity
        let noise: Vec<u8> = (0..2048u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        let mut resp = HttpResponse::new(StatusCode::OK)
            .with_content_type("text/plain")
            .with_body(noise.clone());
        let cfg = CompressionConfig {
            min_bytes: 1,
            max_compression_ratio: 0.5,
            ..CompressionConfig::default()
        };

        let fallback = try_compress_response(&mut resp, Encoding::Gzip, &cfg);
        assert!(fallback);
        assert_eq!(resp.header("Content-Encoding"), None);
        assert_eq!(resp.body_bytes().unwrap(), noise.as_slice());
    }

    #[test]
    fn user_content_encoding_suppresses() {
        let mut resp = text_response(2048);
        resp.set_header("Content-Encoding", "gzip");
        let before = resp.body_bytes().unwrap().to_vec();
        let cfg = CompressionConfig {
            min_bytes: 1,
            ..CompressionConfig::default()
        };
        try_compress_response(&mut resp, Encoding::Gzip, &cfg);
        assert_eq!(resp.body_bytes().unwrap(), before.as_slice());
    }

    #[test]
    fn stream_encoder_round_trips() {
        for encoding in [Encoding::Gzip, Encoding::Deflate, Encoding::Brotli, Encoding::Zstd] {
            let mut encoder = StreamEncoder::new(encoding).unwrap();
            encoder.write(b"hello ").unwrap();
            let mut wire = encoder.take_output();
            encoder.write(b"world").unwrap();
            wire.extend_from_slice(&encoder.finish().unwrap());

            let decoded = crate::codec::decompress::decode_stage(
                encoding,
                &wire,
                usize::MAX,
                0.0,
                0,
            )
            .unwrap();
            assert_eq!(decoded, b"hello world");
        }
    }

    #[test]
    fn vary_added_even_on_ratio_fallback() {
        let noise: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut resp = HttpResponse::new(StatusCode::OK)
            .with_content_type("text/plain")
            .with_body(noise);
        let cfg = CompressionConfig {
            min_bytes: 1,
            max_compression_ratio: 0.01,
            ..CompressionConfig::default()
        };
        try_compress_response(&mut resp, Encoding::Gzip, &cfg);
        assert_eq!(resp.header("Vary"), Some(&b"Accept-Encoding"[..]));
    }
}
