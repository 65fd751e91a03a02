//! Route pattern compilation.
//!
//! Grammar per segment: literal text, `{name}` named captures, `{}`
//! anonymous captures (keyed by zero-based index), `{{` / `}}` escaping
//! literal braces, and a terminal `*` wildcard segment matching any
//! remainder. Literals and captures may mix inside one segment
//! (`v{major}.txt`).

use crate::errors::RouteError;
use memchr::memmem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SegmentPart {
    Literal(String),
    /// Index into `CompiledRoute::param_names`.
    Param(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CompiledSegment {
    Literal(String),
    Pattern(Vec<SegmentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompiledRoute {
    pub(crate) segments: Vec<CompiledSegment>,
    pub(crate) param_names: Vec<String>,
    pub(crate) wildcard: bool,
    pub(crate) trailing_slash: bool,
}

pub(crate) fn compile(path: &str) -> Result<CompiledRoute, RouteError> {
    if !path.starts_with('/') {
        return Err(RouteError::NotAbsolute);
    }

    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let trimmed = &path[1..path.len() - usize::from(trailing_slash)];

    let mut route = CompiledRoute {
        segments: Vec::new(),
        param_names: Vec::new(),
        wildcard: false,
        trailing_slash,
    };

    if trimmed.is_empty() {
        return Ok(route); // root
    }

    let mut named = false;
    let mut anonymous = false;

    let raw_segments: Vec<&str> = trimmed.split('/').collect();
    let last = raw_segments.len() - 1;
    for (idx, raw) in raw_segments.iter().enumerate() {
        if raw.is_empty() {
            return Err(RouteError::EmptySegment);
        }
        if *raw == "*" {
            if idx != last {
                return Err(RouteError::MisplacedWildcard);
            }
            route.wildcard = true;
            break;
        }
        route
            .segments
            .push(compile_segment(raw, &mut route.param_names, &mut named, &mut anonymous)?);
    }

    if named && anonymous {
        return Err(RouteError::MixedParamNaming);
    }
    Ok(route)
}

fn compile_segment(
    raw: &str,
    param_names: &mut Vec<String>,
    named: &mut bool,
    anonymous: &mut bool,
) -> Result<CompiledSegment, RouteError> {
    let bytes = raw.as_bytes();
    let mut parts: Vec<SegmentPart> = Vec::new();
    let mut literal = String::new();
    let mut idx = 0;

    while idx < bytes.len() {
        match bytes[idx] {
            b'{' if bytes.get(idx + 1) == Some(&b'{') => {
                literal.push('{');
                idx += 2;
            }
            b'}' if bytes.get(idx + 1) == Some(&b'}') => {
                literal.push('}');
                idx += 2;
            }
            b'}' => return Err(RouteError::UnbalancedBrace),
            b'{' => {
                let close = raw[idx + 1..]
                    .find('}')
                    .map(|pos| idx + 1 + pos)
                    .ok_or(RouteError::UnbalancedBrace)?;
                let name = &raw[idx + 1..close];
                if name.contains('{') {
                    return Err(RouteError::UnbalancedBrace);
                }
                if !literal.is_empty() {
                    parts.push(SegmentPart::Literal(std::mem::take(&mut literal)));
                }
                let key = if name.is_empty() {
                    *anonymous = true;
                    param_names.len().to_string()
                } else {
                    *named = true;
                    name.to_owned()
                };
                if param_names.contains(&key) {
                    return Err(RouteError::DuplicateParamName);
                }
                param_names.push(key);
                parts.push(SegmentPart::Param(param_names.len() - 1));
                idx = close + 1;
            }
            byte => {
                literal.push(byte as char);
                idx += 1;
            }
        }
    }

    if parts.is_empty() {
        return Ok(CompiledSegment::Literal(literal));
    }
    if !literal.is_empty() {
        parts.push(SegmentPart::Literal(literal));
    }
    Ok(CompiledSegment::Pattern(parts))
}

/// Matches one pattern segment against one path segment, appending captured
/// spans (as sub-slices of `value`) with their parameter indices.
///
/// Literal parts anchor the scan: a part that follows a capture is located
/// at its first occurrence after the capture start, and a capture consumes
/// at least one byte. The final capture swallows the remainder.
pub(crate) fn match_segment<'v>(
    parts: &[SegmentPart],
    value: &'v str,
    captures: &mut Vec<(usize, &'v str)>,
) -> bool {
    let checkpoint = captures.len();
    let mut rest = value;
    let mut pending_param: Option<usize> = None;

    for part in parts {
        match part {
            SegmentPart::Literal(lit) => {
                match pending_param.take() {
                    None => {
                        let Some(stripped) = rest.strip_prefix(lit.as_str()) else {
                            captures.truncate(checkpoint);
                            return false;
                        };
                        rest = stripped;
                    }
                    Some(param) => {
                        // capture needs >= 1 byte before the literal; byte
                        // search is boundary-safe since UTF-8 self-syncs
                        if rest.is_empty() {
                            captures.truncate(checkpoint);
                            return false;
                        }
                        let Some(pos) = memmem::find(&rest.as_bytes()[1..], lit.as_bytes()) else {
                            captures.truncate(checkpoint);
                            return false;
                        };
                        let split = 1 + pos;
                        captures.push((param, &rest[..split]));
                        rest = &rest[split + lit.len()..];
                    }
                }
            }
            SegmentPart::Param(param) => {
                if pending_param.is_some() {
                    // adjacent captures are ambiguous; compile never emits them
                    captures.truncate(checkpoint);
                    return false;
                }
                pending_param = Some(*param);
            }
        }
    }

    match pending_param {
        Some(param) => {
            if rest.is_empty() {
                captures.truncate(checkpoint);
                return false;
            }
            captures.push((param, rest));
            true
        }
        None => {
            if rest.is_empty() {
                true
            } else {
                captures.truncate(checkpoint);
                false
            }
        }
    }
}
