//! Byte-level text classification: encoding detection, BOM handling, line
//! endings, and binary sniffing.
//!
//! Everything here is a pure function over byte slices. The document store
//! calls [`detect_encoding_info`] once per open and then uses the individual
//! helpers when rendering bytes back to disk.

use serde::{Deserialize, Serialize};

/// How many leading bytes [`is_binary`] inspects.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// Fraction of non-whitespace control bytes above which content is binary.
const BINARY_CONTROL_RATIO: f64 = 0.10;

/// Fraction of total line terminators a minority style needs before the
/// file counts as mixed.
const MIXED_EOL_RATIO: f64 = 0.10;

const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Text encoding of a document's on-disk bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    #[default]
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl Encoding {
    /// BOM byte prefix for encodings that carry one.
    pub fn bom(self) -> &'static [u8] {
        match self {
            Encoding::Utf8Bom => BOM_UTF8,
            Encoding::Utf16Le => BOM_UTF16_LE,
            Encoding::Utf16Be => BOM_UTF16_BE,
            _ => &[],
        }
    }

    pub fn has_bom(self) -> bool {
        !self.bom().is_empty()
    }

    pub fn is_utf16(self) -> bool {
        matches!(self, Encoding::Utf16Le | Encoding::Utf16Be)
    }
}

/// Dominant line-terminator style of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
    Cr,
    Mixed,
}

impl LineEnding {
    /// Terminator bytes for a concrete style. `Mixed` has no single form.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf | LineEnding::Mixed => b"\n",
            LineEnding::Crlf => b"\r\n",
            LineEnding::Cr => b"\r",
        }
    }
}

/// One-shot classification of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingInfo {
    pub encoding: Encoding,
    pub line_ending: LineEnding,
    pub has_bom: bool,
    pub is_binary: bool,
    pub line_count: usize,
}

// ---------------------------------------------------------------------------
// Encoding detection
// ---------------------------------------------------------------------------

/// Detect the encoding of `data`. A BOM prefix wins; otherwise valid UTF-8 is
/// classified ASCII (all bytes < 128) or UTF-8, and anything else Latin-1.
/// Empty input is UTF-8.
pub fn detect_encoding(data: &[u8]) -> Encoding {
    if data.is_empty() {
        return Encoding::Utf8;
    }
    if data.starts_with(BOM_UTF8) {
        return Encoding::Utf8Bom;
    }
    if data.starts_with(BOM_UTF16_LE) {
        return Encoding::Utf16Le;
    }
    if data.starts_with(BOM_UTF16_BE) {
        return Encoding::Utf16Be;
    }
    if std::str::from_utf8(data).is_ok() {
        if data.iter().all(|&b| b < 128) {
            Encoding::Ascii
        } else {
            Encoding::Utf8
        }
    } else {
        Encoding::Latin1
    }
}

/// Remove the BOM prefix for `encoding` from `data`, if present.
pub fn strip_bom(data: &[u8], encoding: Encoding) -> Vec<u8> {
    let bom = encoding.bom();
    if !bom.is_empty() && data.starts_with(bom) {
        data[bom.len()..].to_vec()
    } else {
        data.to_vec()
    }
}

/// Prepend the BOM for `encoding` to `data`. No-op for BOM-less encodings or
/// when the prefix is already present.
pub fn add_bom(data: &[u8], encoding: Encoding) -> Vec<u8> {
    let bom = encoding.bom();
    if bom.is_empty() || data.starts_with(bom) {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(bom.len() + data.len());
    out.extend_from_slice(bom);
    out.extend_from_slice(data);
    out
}

// ---------------------------------------------------------------------------
// Line endings
// ---------------------------------------------------------------------------

/// Per-style terminator counts from a single scan. CRLF consumes both bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EolCounts {
    lf: usize,
    crlf: usize,
    cr: usize,
}

impl EolCounts {
    fn total(self) -> usize {
        self.lf + self.crlf + self.cr
    }
}

fn count_eols(data: &[u8]) -> EolCounts {
    let mut counts = EolCounts::default();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' => {
                if data.get(i + 1) == Some(&b'\n') {
                    counts.crlf += 1;
                    i += 2;
                    continue;
                }
                counts.cr += 1;
            }
            b'\n' => counts.lf += 1,
            _ => {}
        }
        i += 1;
    }
    counts
}

/// Detect the dominant line-ending style. No terminators at all reads as LF.
/// Two or more styles each holding at least 10 % of the total (minimum one
/// occurrence) is `Mixed`; otherwise the majority wins, with CRLF beating LF
/// on ties and CR winning only when strictly ahead of LF.
pub fn detect_line_ending(data: &[u8]) -> LineEnding {
    let counts = count_eols(data);
    let total = counts.total();
    if total == 0 {
        return LineEnding::Lf;
    }

    let threshold = (((total as f64) * MIXED_EOL_RATIO) as usize).max(1);
    let significant = [counts.lf, counts.crlf, counts.cr]
        .iter()
        .filter(|&&c| c >= threshold)
        .count();
    if significant >= 2 {
        return LineEnding::Mixed;
    }

    if counts.crlf >= counts.lf && counts.crlf >= counts.cr {
        LineEnding::Crlf
    } else if counts.cr > counts.lf && counts.cr > counts.crlf {
        LineEnding::Cr
    } else {
        LineEnding::Lf
    }
}

/// Rewrite every line terminator in `data` to `target`. All CRLF and lone CR
/// are first folded to LF, then expanded when the target is CRLF or CR.
/// `Mixed` is a no-op (there is no single form to normalize to).
pub fn normalize_line_endings(data: &[u8], target: LineEnding) -> Vec<u8> {
    if target == LineEnding::Mixed {
        return data.to_vec();
    }

    let mut folded = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' => {
                folded.push(b'\n');
                if data.get(i + 1) == Some(&b'\n') {
                    i += 2;
                    continue;
                }
            }
            b => folded.push(b),
        }
        i += 1;
    }

    match target {
        LineEnding::Lf => folded,
        LineEnding::Crlf | LineEnding::Cr => {
            let rep = target.as_bytes();
            let mut out = Vec::with_capacity(folded.len() + folded.len() / 16);
            for &b in &folded {
                if b == b'\n' {
                    out.extend_from_slice(rep);
                } else {
                    out.push(b);
                }
            }
            out
        }
        LineEnding::Mixed => unreachable!(),
    }
}

/// Count logical lines. A trailing terminator closes the final line rather
/// than opening an empty one; empty input has zero lines.
pub fn count_lines(data: &[u8]) -> usize {
    if data.is_empty() {
        return 0;
    }
    let terminators = count_eols(data).total();
    let ends_with_eol = matches!(data.last(), Some(&b'\n') | Some(&b'\r'));
    if ends_with_eol {
        terminators
    } else {
        terminators + 1
    }
}

// ---------------------------------------------------------------------------
// Binary sniffing
// ---------------------------------------------------------------------------

/// Heuristic binary check over the first 8 KiB: any NUL byte, or more than
/// 10 % control characters other than TAB, LF, CR.
pub fn is_binary(data: &[u8]) -> bool {
    let sample = &data[..data.len().min(BINARY_SNIFF_LEN)];
    if sample.is_empty() {
        return false;
    }
    let mut control = 0usize;
    for &b in sample {
        if b == 0 {
            return true;
        }
        if b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r' {
            control += 1;
        }
    }
    (control as f64) / (sample.len() as f64) > BINARY_CONTROL_RATIO
}

// ---------------------------------------------------------------------------
// Bundled detection
// ---------------------------------------------------------------------------

/// Classify a buffer in one pass. Content with a BOM is always treated as
/// text (UTF-16 would otherwise trip the NUL check); BOM-less binary content
/// short-circuits with zeroed text fields.
pub fn detect_encoding_info(data: &[u8]) -> EncodingInfo {
    let encoding = detect_encoding(data);
    let has_bom = encoding.has_bom();

    if !has_bom && is_binary(data) {
        return EncodingInfo {
            encoding,
            line_ending: LineEnding::Lf,
            has_bom: false,
            is_binary: true,
            line_count: 0,
        };
    }

    let body = strip_bom(data, encoding);
    // UTF-16 code units pad ASCII terminators with NULs; drop them so the
    // byte-oriented scanners see the terminators.
    let scan: Vec<u8> = if encoding.is_utf16() {
        body.iter().copied().filter(|&b| b != 0).collect()
    } else {
        body
    };

    EncodingInfo {
        encoding,
        line_ending: detect_line_ending(&scan),
        has_bom,
        is_binary: false,
        line_count: count_lines(&scan),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
