//! Character encoding detection for chart sources.
//!
//! BMS files in the wild are mostly Shift_JIS, Korean charts are often
//! EUC-KR, and newer files are UTF-8 with or without a BOM. Loaders call
//! [`decode`] once on the raw bytes before any parsing; all model strings
//! are plain UTF-8 afterwards.

use std::borrow::Cow;

/// How the source bytes were decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceEncoding {
    /// Valid UTF-8 (with or without BOM).
    Utf8,
    /// Decoded as Shift_JIS.
    ShiftJis,
    /// Decoded as EUC-KR.
    EucKr,
    /// Nothing matched; decoded as UTF-8 with replacement characters.
    LossyFallback,
}

/// Decodes chart source bytes with the fallback cascade
/// UTF-8 → Shift_JIS → EUC-KR → lossy UTF-8.
#[must_use]
pub fn decode(raw: &[u8]) -> (Cow<'_, str>, SourceEncoding) {
    let raw = raw
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(raw);

    if let Ok(s) = std::str::from_utf8(raw) {
        return (Cow::Borrowed(s), SourceEncoding::Utf8);
    }

    let (decoded, _, had_errors) = encoding_rs::SHIFT_JIS.decode(raw);
    if !had_errors {
        return (decoded, SourceEncoding::ShiftJis);
    }

    let (decoded, _, had_errors) = encoding_rs::EUC_KR.decode(raw);
    if !had_errors {
        return (decoded, SourceEncoding::EucKr);
    }

    (
        Cow::Owned(String::from_utf8_lossy(raw).into_owned()),
        SourceEncoding::LossyFallback,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        let (s, enc) = decode("#TITLE flower".as_bytes());
        assert_eq!(s, "#TITLE flower");
        assert_eq!(enc, SourceEncoding::Utf8);
    }

    #[test]
    fn bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"#TITLE a");
        let (s, enc) = decode(&bytes);
        assert_eq!(s, "#TITLE a");
        assert_eq!(enc, SourceEncoding::Utf8);
    }

    #[test]
    fn shift_jis_title() {
        // "#TITLE 花" in Shift_JIS; 0x89 0xD4 is the kanji.
        let bytes = b"#TITLE \x89\xD4";
        let (s, enc) = decode(bytes);
        assert_eq!(enc, SourceEncoding::ShiftJis);
        assert_eq!(s, "#TITLE 花");
    }
}
