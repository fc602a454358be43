//! Zebra printer status and identification parsers.
//!
//! Parses `~HQES` (host query error status) and `~HI` (host identification)
//! responses into typed Rust structs.

use std::fmt;

use crate::LinkError;
use crate::frame::{has_control_characters, strip_control_characters};

// ── Status ──────────────────────────────────────────────────────────────

/// Byte offsets of the flag digits in a framed `~HQES` response.
const PAPER_OUT_OFFSET: usize = 5;
const PAUSED_OFFSET: usize = 7;
const HEAD_OPEN_OFFSET: usize = 43;
const RIBBON_OUT_OFFSET: usize = 45;

/// Parsed `~HQES` response.
///
/// A response that is not STX/ETX framed is not an error: it decodes to the
/// offline status, which is how an unreachable printer is represented.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Status {
    /// The printer could not be reached or answered garbage.
    pub offline: bool,
    /// Media is depleted or not detected.
    pub paper_out: bool,
    /// The printer is paused.
    pub paused: bool,
    /// The print head is open.
    pub head_open: bool,
    /// Ribbon is depleted or missing.
    pub ribbon_out: bool,
}

impl Status {
    /// The offline status: `offline` set, every other flag clear.
    pub fn offline() -> Self {
        Status {
            offline: true,
            ..Status::default()
        }
    }

    /// Decode a raw `~HQES` response.
    pub fn parse(raw: &str) -> Status {
        let raw = raw.trim();
        if !has_control_characters(raw) {
            return Status::offline();
        }

        let bytes = raw.as_bytes();
        let flag = |offset: usize| bytes.get(offset) == Some(&b'1');

        Status {
            offline: false,
            paper_out: flag(PAPER_OUT_OFFSET),
            paused: flag(PAUSED_OFFSET),
            head_open: flag(HEAD_OPEN_OFFSET),
            ribbon_out: flag(RIBBON_OUT_OFFSET),
        }
    }

    /// Returns `true` when no error flag is set and the printer is online.
    pub fn is_printer_ready(&self) -> bool {
        !(self.paper_out || self.paused || self.head_open || self.ribbon_out || self.offline)
    }

    /// English description of the most important condition.
    pub fn message(&self) -> &'static str {
        if self.is_printer_ready() {
            "Ready"
        } else if self.offline {
            "Offline"
        } else if self.paper_out {
            "Paper Out"
        } else if self.head_open {
            "Head Open"
        } else if self.ribbon_out {
            "Ribbon Out"
        } else if self.paused {
            "Paused"
        } else {
            "Ready"
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

// ── Info ────────────────────────────────────────────────────────────────

/// Parsed `~HI` (Host Identification) response.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Info {
    /// Printer model string (e.g. `"ZD410-203dpi"`).
    pub model: String,
    /// Firmware version (e.g. `"V84.20.18Z"`).
    pub firmware: String,
}

impl Info {
    /// Parse a framed `~HI` response: `STX model,firmware,... ETX`.
    ///
    /// Fields after the firmware version are ignored.
    pub fn parse(raw: &str) -> Result<Info, LinkError> {
        if raw.trim().is_empty() {
            return Err(LinkError::framing("~HI: empty response"));
        }
        let payload = strip_control_characters(raw)
            .ok_or_else(|| LinkError::framing("~HI: missing STX/ETX"))?;

        let mut fields = payload.split(',');
        let model = fields.next().unwrap_or_default().to_string();
        let firmware = fields
            .next()
            .ok_or_else(|| LinkError::framing("~HI: missing firmware field"))?
            .to_string();

        Ok(Info { model, firmware })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a framed `~HQES`-style response with the given flags set.
    fn status_response(paper_out: bool, paused: bool, head_open: bool, ribbon_out: bool) -> String {
        let mut body: Vec<u8> = b"1234567890123456789012345678901234567890123456789".to_vec();
        body[PAPER_OUT_OFFSET - 1] = if paper_out { b'1' } else { b'0' };
        body[PAUSED_OFFSET - 1] = if paused { b'1' } else { b'0' };
        body[HEAD_OPEN_OFFSET - 1] = if head_open { b'1' } else { b'0' };
        body[RIBBON_OUT_OFFSET - 1] = if ribbon_out { b'1' } else { b'0' };
        format!("\u{2}{}\u{3}", String::from_utf8(body).unwrap())
    }

    // ── Status ──────────────────────────────────────────────────────

    #[test]
    fn parse_status_all_clear() {
        let status = Status::parse(&status_response(false, false, false, false));
        assert_eq!(status, Status::default());
        assert!(status.is_printer_ready());
        assert_eq!(status.message(), "Ready");
    }

    #[test]
    fn parse_status_head_open() {
        // 46 characters, '1' only at offset 43.
        let mut raw = String::from("\u{2}");
        raw.push_str(&"0".repeat(42));
        raw.push('1');
        raw.push('0');
        raw.push('\u{3}');
        assert_eq!(raw.len(), 46);

        let status = Status::parse(&raw);
        assert!(status.head_open);
        assert!(!status.offline);
        assert!(!status.paper_out);
        assert!(!status.paused);
        assert!(!status.ribbon_out);
        assert!(!status.is_printer_ready());
        assert_eq!(status.message(), "Head Open");
    }

    #[test]
    fn parse_status_each_flag() {
        let s = Status::parse(&status_response(true, false, false, false));
        assert!(s.paper_out);
        assert_eq!(s.message(), "Paper Out");

        let s = Status::parse(&status_response(false, true, false, false));
        assert!(s.paused);
        assert_eq!(s.message(), "Paused");

        let s = Status::parse(&status_response(false, false, false, true));
        assert!(s.ribbon_out);
        assert_eq!(s.message(), "Ribbon Out");
    }

    #[test]
    fn message_priority() {
        let s = Status::parse(&status_response(true, true, true, true));
        assert_eq!(s.message(), "Paper Out");

        let s = Status::parse(&status_response(false, true, true, true));
        assert_eq!(s.message(), "Head Open");

        let s = Status::parse(&status_response(false, true, false, true));
        assert_eq!(s.message(), "Ribbon Out");
    }

    #[test]
    fn unframed_status_is_offline() {
        for raw in ["", "garbage", "12341608901234567890123456789012345678901214"] {
            let status = Status::parse(raw);
            assert_eq!(status, Status::offline(), "raw {raw:?}");
            assert!(!status.is_printer_ready());
            assert_eq!(status.message(), "Offline");
        }
    }

    #[test]
    fn short_framed_status_has_clear_flags() {
        let status = Status::parse("\u{2}0000\u{3}");
        assert_eq!(status, Status::default());
    }

    #[test]
    fn status_display_uses_message() {
        assert_eq!(Status::offline().to_string(), "Offline");
    }

    // ── Info ────────────────────────────────────────────────────────

    #[test]
    fn parse_info_normal() {
        let info = Info::parse("\u{2}ZD410-203dpi,V84.20.18Z,8,8176KB\u{3}").expect("should parse");
        assert_eq!(info.model, "ZD410-203dpi");
        assert_eq!(info.firmware, "V84.20.18Z");
    }

    #[test]
    fn parse_info_two_fields_does_not_keep_etx() {
        let info = Info::parse("\u{2}ZTC ZD421-300dpi ZPL,V85.20.19\u{3}\r\n").expect("should parse");
        assert_eq!(info.model, "ZTC ZD421-300dpi ZPL");
        assert_eq!(info.firmware, "V85.20.19");
    }

    #[test]
    fn parse_info_empty() {
        let err = Info::parse("").unwrap_err();
        assert!(matches!(err, LinkError::Framing { .. }));
        assert!(err.to_string().contains("empty"), "unexpected error: {err}");
    }

    #[test]
    fn parse_info_unframed() {
        let err = Info::parse("ZD410-203dpi,V84.20.18Z").unwrap_err();
        assert!(err.to_string().contains("STX/ETX"), "unexpected error: {err}");
    }

    #[test]
    fn parse_info_missing_firmware() {
        let err = Info::parse("\u{2}ZD410-203dpi\u{3}").unwrap_err();
        assert!(err.to_string().contains("firmware"), "unexpected error: {err}");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn status_serializes_to_json() {
        let json = serde_json::to_string(&Status::offline()).expect("should serialize");
        assert!(json.contains("\"offline\":true"));
        assert!(json.contains("\"head_open\":false"));
    }
}
