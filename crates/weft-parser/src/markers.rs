//! Generated-region markers
//!
//! Every edit the weaver makes is bracketed:
//!
//! ```text
//! /*weft:begin kind=wrap-expression aspect=http-client orig=http.Get(u)*/ ... /*weft:end*/
//! ```
//!
//! `orig` carries the replaced source text (percent-encoded) so a region can
//! be reverted exactly; insert-only regions have no `orig`. When generated
//! text spans lines, the end marker is immediately followed by a
//! `/*line file:L:C*/` directive restoring the original position, and the
//! directive belongs to the region.

use std::ops::Range;

use thiserror::Error;

pub const BEGIN_PREFIX: &str = "/*weft:begin";
pub const END_MARKER: &str = "/*weft:end*/";
pub const IGNORE_DIRECTIVE: &str = "weft:ignore";
const LINE_PREFIX: &str = "/*line ";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MarkerError {
    #[error("malformed region marker at byte {0}: {1}")]
    Malformed(usize, String),
}

/// Attributes of a begin marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerAttrs {
    pub kind: String,
    pub aspect: String,
    pub orig: Option<String>,
}

impl MarkerAttrs {
    pub fn new(kind: impl Into<String>, aspect: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            aspect: aspect.into(),
            orig: None,
        }
    }

    pub fn with_orig(mut self, orig: impl Into<String>) -> Self {
        self.orig = Some(orig.into());
        self
    }

    pub fn begin_marker(&self) -> String {
        let mut marker = format!("{} kind={} aspect={}", BEGIN_PREFIX, self.kind, self.aspect);
        if let Some(orig) = &self.orig {
            marker.push_str(" orig=");
            marker.push_str(&encode(orig));
        }
        marker.push_str("*/");
        marker
    }

    fn parse(comment: &str, at: usize) -> Result<Self, MarkerError> {
        let body = comment
            .strip_prefix(BEGIN_PREFIX)
            .and_then(|b| b.strip_suffix("*/"))
            .ok_or_else(|| MarkerError::Malformed(at, comment.to_string()))?;

        let mut kind = None;
        let mut aspect = None;
        let mut orig = None;
        for field in body.split_whitespace() {
            match field.split_once('=') {
                Some(("kind", v)) => kind = Some(v.to_string()),
                Some(("aspect", v)) => aspect = Some(v.to_string()),
                Some(("orig", v)) => {
                    orig = Some(decode(v).ok_or_else(|| {
                        MarkerError::Malformed(at, format!("bad encoding in {:?}", v))
                    })?)
                }
                _ => return Err(MarkerError::Malformed(at, field.to_string())),
            }
        }

        Ok(Self {
            kind: kind.ok_or_else(|| MarkerError::Malformed(at, "missing kind".into()))?,
            aspect: aspect.ok_or_else(|| MarkerError::Malformed(at, "missing aspect".into()))?,
            orig,
        })
    }
}

/// An outermost generated region found in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Whole region including both markers and any trailing line directive.
    pub range: Range<usize>,
    /// Text between the markers.
    pub body: Range<usize>,
    pub attrs: MarkerAttrs,
}

impl Region {
    pub fn contains(&self, range: &Range<usize>) -> bool {
        self.range.start <= range.start && range.end <= self.range.end
    }

    pub fn overlaps(&self, range: &Range<usize>) -> bool {
        self.range.start < range.end && range.start < self.range.end
    }
}

/// Render a complete region around `body`.
pub fn wrap_region(attrs: &MarkerAttrs, body: &str, line_directive: Option<&str>) -> String {
    let mut out = attrs.begin_marker();
    out.push_str(body);
    out.push_str(END_MARKER);
    if let Some(directive) = line_directive {
        out.push_str(directive);
    }
    out
}

/// `/*line path:L:C*/`, placing the next character at `line:col`.
pub fn line_directive(path: &str, line: usize, col: usize) -> String {
    format!("{}{}:{}:{}*/", LINE_PREFIX, path, line, col)
}

/// Find the outermost generated regions, skipping string and rune literals.
///
/// Begin and end markers pair up innermost first. A marker comment left
/// without a partner is ordinary comment text and bounds no region.
pub fn scan_regions(text: &str) -> Result<Vec<Region>, MarkerError> {
    let mut open: Vec<Range<usize>> = Vec::new();
    let mut pairs: Vec<(Range<usize>, Range<usize>)> = Vec::new();
    for comment in marker_comments(text) {
        if is_begin(&text[comment.clone()]) {
            open.push(comment);
        } else if let Some(begin) = open.pop() {
            pairs.push((begin, comment));
        }
    }
    pairs.sort_by_key(|(begin, _)| begin.start);

    let mut regions: Vec<Region> = Vec::new();
    for (begin, end) in pairs {
        if regions.last().is_some_and(|r| begin.start < r.range.end) {
            continue;
        }
        let attrs = MarkerAttrs::parse(&text[begin.clone()], begin.start)?;
        let mut region_end = end.end;
        if text[region_end..].starts_with(LINE_PREFIX) {
            if let Some(close) = text[region_end..].find("*/") {
                region_end += close + 2;
            }
        }
        regions.push(Region {
            range: begin.start..region_end,
            body: begin.end..end.start,
            attrs,
        });
    }
    Ok(regions)
}

/// Byte ranges of block comments that look like begin or end markers.
fn marker_comments(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => i = skip_quoted(bytes, i),
            b'`' => {
                i = text[i + 1..]
                    .find('`')
                    .map(|end| i + end + 2)
                    .unwrap_or(bytes.len())
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = text[i..].find('\n').map(|end| i + end).unwrap_or(bytes.len())
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = text[i + 2..]
                    .find("*/")
                    .map(|e| i + 2 + e + 2)
                    .unwrap_or(bytes.len());
                let comment = &text[i..end];
                if is_begin(comment) || comment == END_MARKER {
                    found.push(i..end);
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    found
}

fn is_begin(comment: &str) -> bool {
    comment
        .strip_prefix(BEGIN_PREFIX)
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Percent-encode the characters that cannot appear in a marker field.
pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '*' | '/' | '=') || c.is_whitespace() || c.is_control() {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", b));
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
