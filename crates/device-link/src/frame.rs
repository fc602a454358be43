//! STX/ETX framing contract for Zebra printer responses.
//!
//! Zebra printers wrap query responses (`~HQES`, `~HI`, `^HH`) between
//! STX (0x02) and ETX (0x03). The transport carries no framing of its own,
//! so a response is only trusted once both control codes bracket it.

use tracing::trace;

/// ASCII Start of Text
pub const STX: char = '\u{2}';
/// ASCII End of Text
pub const ETX: char = '\u{3}';

/// Terminator the read loop waits for on framed responses.
pub(crate) const ETX_TERMINATOR: &str = "\u{3}";

/// Returns `true` if `raw` starts with STX and ends with ETX.
///
/// Surrounding whitespace is not skipped; callers trim first.
pub fn has_control_characters(raw: &str) -> bool {
    let framed = raw.starts_with(STX) && raw.ends_with(ETX);
    if !framed {
        trace!(len = raw.len(), "response did not contain proper control characters");
    }
    framed
}

/// Trim `raw` and return the payload between STX and ETX, or `None` if the
/// response is not framed.
pub fn strip_control_characters(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if !has_control_characters(trimmed) {
        return None;
    }
    trimmed
        .strip_prefix(STX)
        .and_then(|rest| rest.strip_suffix(ETX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_response() {
        assert!(has_control_characters("\u{2}Hello\u{3}"));
        assert_eq!(strip_control_characters("\u{2}Hello\u{3}"), Some("Hello"));
    }

    #[test]
    fn empty_frame() {
        assert!(has_control_characters("\u{2}\u{3}"));
        assert_eq!(strip_control_characters("\u{2}\u{3}"), Some(""));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed_before_stripping() {
        assert_eq!(
            strip_control_characters("\r\n\u{2}data\u{3}\r\n"),
            Some("data")
        );
    }

    #[test]
    fn missing_control_codes() {
        assert!(!has_control_characters(""));
        assert!(!has_control_characters("Hello"));
        assert!(!has_control_characters("\u{2}Hello"));
        assert!(!has_control_characters("Hello\u{3}"));
        assert!(!has_control_characters("\u{3}Hello\u{2}"));
        assert_eq!(strip_control_characters("\u{2}partial"), None);
    }

    #[test]
    fn lone_control_code_is_not_a_frame() {
        assert!(!has_control_characters("\u{2}"));
        assert!(!has_control_characters("\u{3}"));
    }
}
