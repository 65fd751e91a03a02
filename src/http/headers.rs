//! Request header storage: duplicate policies and the zero-copy view map.
//!
//! Header names and values are byte ranges into the connection read buffer;
//! only values produced by comma-merging duplicates live in a side scratch
//! buffer owned by the same connection. Views handed to handlers borrow both
//! buffers, which pins the "no compaction while a request is live" rule into
//! the type system.

use crate::errors::ProtocolError;
use std::ops::Range;

/// What to do when a header name repeats within one header block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum DuplicatePolicy {
    /// List-typed headers: values joined with `", "`.
    MergeComma,
    /// Singleton headers where the last occurrence wins.
    KeepLast,
    /// Duplicates are a protocol error.
    Reject,
}

#[rustfmt::skip]
const MERGE_HEADERS: &[&[u8]] = &[
    b"accept", b"accept-charset", b"accept-encoding", b"accept-language",
    b"cache-control", b"connection", b"expect", b"forwarded", b"pragma",
    b"te", b"trailer", b"upgrade", b"vary", b"via", b"warning",
    b"x-forwarded-for",
];

#[rustfmt::skip]
const KEEP_LAST_HEADERS: &[&[u8]] = &[
    b"from", b"host", b"referer", b"user-agent",
];

#[rustfmt::skip]
const REJECT_HEADERS: &[&[u8]] = &[
    b"authorization", b"content-length", b"transfer-encoding",
];

/// Connection-control and framing headers that may never appear in trailers.
#[rustfmt::skip]
const FORBIDDEN_TRAILERS: &[&[u8]] = &[
    b"authorization", b"connection", b"content-length", b"host",
    b"keep-alive", b"proxy-connection", b"te", b"trailer",
    b"transfer-encoding", b"upgrade",
];

#[inline]
fn name_in(name: &[u8], table: &[&[u8]]) -> bool {
    table.iter().any(|n| name.eq_ignore_ascii_case(n))
}

#[inline]
pub(crate) fn duplicate_policy(name: &[u8], merge_unknown: bool) -> DuplicatePolicy {
    if name_in(name, MERGE_HEADERS) {
        DuplicatePolicy::MergeComma
    } else if name_in(name, KEEP_LAST_HEADERS) {
        DuplicatePolicy::KeepLast
    } else if name_in(name, REJECT_HEADERS) || !merge_unknown {
        DuplicatePolicy::Reject
    } else {
        DuplicatePolicy::MergeComma
    }
}

#[inline]
pub(crate) fn forbidden_in_trailers(name: &[u8]) -> bool {
    name_in(name, FORBIDDEN_TRAILERS)
}

/// Where a header value lives: the read buffer, or the merge scratch buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ValueSpan {
    Buf(Range<usize>),
    Scratch(Range<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderSlot {
    pub(crate) name: Range<usize>,
    pub(crate) value: ValueSpan,
}

/// Inserts one parsed header line into `slots`, applying the duplicate
/// policy for its name. `buf` is the connection read buffer; merged values
/// are appended to `scratch`.
pub(crate) fn insert_header(
    slots: &mut Vec<HeaderSlot>,
    scratch: &mut Vec<u8>,
    buf: &[u8],
    name: Range<usize>,
    value: Range<usize>,
    merge_unknown: bool,
) -> Result<(), ProtocolError> {
    let name_bytes = &buf[name.clone()];
    let existing = slots
        .iter()
        .position(|slot| buf[slot.name.clone()].eq_ignore_ascii_case(name_bytes));

    let Some(idx) = existing else {
        slots.push(HeaderSlot {
            name,
            value: ValueSpan::Buf(value),
        });
        return Ok(());
    };
    let slot = &mut slots[idx];

    match duplicate_policy(name_bytes, merge_unknown) {
        DuplicatePolicy::Reject => Err(ProtocolError::DuplicateHeader),
        DuplicatePolicy::KeepLast => {
            slot.value = ValueSpan::Buf(value);
            Ok(())
        }
        DuplicatePolicy::MergeComma => {
            let start = scratch.len();
            match &slot.value {
                ValueSpan::Buf(range) => scratch.extend_from_slice(&buf[range.clone()]),
                ValueSpan::Scratch(range) => {
                    let merged = scratch[range.clone()].to_vec();
                    scratch.extend_from_slice(&merged);
                }
            }
            scratch.extend_from_slice(b", ");
            scratch.extend_from_slice(&buf[value]);
            slot.value = ValueSpan::Scratch(start..scratch.len());
            Ok(())
        }
    }
}

/// Case-insensitive, order-preserving view over one header (or trailer)
/// block. Lifetimes are bounded by the request's processing window.
#[derive(Debug, Copy, Clone)]
pub struct HeadersView<'a> {
    buf: &'a [u8],
    scratch: &'a [u8],
    slots: &'a [HeaderSlot],
}

impl<'a> HeadersView<'a> {
    #[inline]
    pub(crate) fn new(buf: &'a [u8], scratch: &'a [u8], slots: &'a [HeaderSlot]) -> Self {
        Self { buf, scratch, slots }
    }

    #[inline]
    fn value_of(&self, slot: &HeaderSlot) -> &'a [u8] {
        match &slot.value {
            ValueSpan::Buf(range) => &self.buf[range.clone()],
            ValueSpan::Scratch(range) => &self.scratch[range.clone()],
        }
    }

    /// Returns the value for `name` with case-insensitive matching.
    pub fn get(&self, name: &[u8]) -> Option<&'a [u8]> {
        self.slots
            .iter()
            .find(|slot| self.buf[slot.name.clone()].eq_ignore_ascii_case(name))
            .map(|slot| self.value_of(slot))
    }

    /// Iterates `(name, value)` pairs in received order, original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + '_ {
        self.slots
            .iter()
            .map(|slot| (&self.buf[slot.name.clone()], self.value_of(slot)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_and_keep_last() {
        let buf = b"Accept: text/html\r\nACCEPT: text/plain\r\nHost: a\r\nhost: b\r\n";
        let mut slots = Vec::new();
        let mut scratch = Vec::new();

        // Accept at 0, ACCEPT at 19
        insert_header(&mut slots, &mut scratch, buf, 0..6, 8..17, true).unwrap();
        insert_header(&mut slots, &mut scratch, buf, 19..25, 27..37, true).unwrap();
        // Host at 39, host at 48
        insert_header(&mut slots, &mut scratch, buf, 39..43, 45..46, true).unwrap();
        insert_header(&mut slots, &mut scratch, buf, 48..52, 54..55, true).unwrap();

        let view = HeadersView::new(buf, &scratch, &slots);
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(b"accept"), Some(&b"text/html, text/plain"[..]));
        assert_eq!(view.get(b"HOST"), Some(&b"b"[..]));
        // first-insertion casing preserved
        assert_eq!(view.iter().next().unwrap().0, b"Accept");
    }

    #[test]
    fn reject_duplicate_content_length() {
        let buf = b"Content-Length: 5\r\nContent-Length: 6\r\n";
        let mut slots = Vec::new();
        let mut scratch = Vec::new();

        insert_header(&mut slots, &mut scratch, buf, 0..14, 16..17, true).unwrap();
        let err = insert_header(&mut slots, &mut scratch, buf, 19..33, 35..36, true);
        assert_eq!(err, Err(ProtocolError::DuplicateHeader));
    }

    #[test]
    fn unknown_duplicates_follow_config() {
        let buf = b"X-Tag: a\r\nX-Tag: b\r\n";
        let mut slots = Vec::new();
        let mut scratch = Vec::new();

        insert_header(&mut slots, &mut scratch, buf, 0..5, 7..8, true).unwrap();
        insert_header(&mut slots, &mut scratch, buf, 10..15, 17..18, true).unwrap();
        let view = HeadersView::new(buf, &scratch, &slots);
        assert_eq!(view.get(b"x-tag"), Some(&b"a, b"[..]));

        let mut slots = Vec::new();
        let mut scratch = Vec::new();
        insert_header(&mut slots, &mut scratch, buf, 0..5, 7..8, false).unwrap();
        let err = insert_header(&mut slots, &mut scratch, buf, 10..15, 17..18, false);
        assert_eq!(err, Err(ProtocolError::DuplicateHeader));
    }

    #[test]
    fn triple_merge_goes_through_scratch() {
        let buf = b"Via: a\r\nVia: b\r\nVia: c\r\n";
        let mut slots = Vec::new();
        let mut scratch = Vec::new();

        insert_header(&mut slots, &mut scratch, buf, 0..3, 5..6, true).unwrap();
        insert_header(&mut slots, &mut scratch, buf, 8..11, 13..14, true).unwrap();
        insert_header(&mut slots, &mut scratch, buf, 16..19, 21..22, true).unwrap();

        let view = HeadersView::new(buf, &scratch, &slots);
        assert_eq!(view.get(b"via"), Some(&b"a, b, c"[..]));
    }

    #[test]
    fn trailer_blocklist() {
        for name in [&b"Transfer-Encoding"[..], b"content-length", b"HOST", b"authorization"] {
            assert!(forbidden_in_trailers(name), "{:?}", name);
        }
        assert!(!forbidden_in_trailers(b"x-checksum"));
    }
}
