//! Parser for the printer configuration label (`^XA^HH^XZ`).
//!
//! The printer answers with one framed block of fixed-width lines: the first
//! 20 columns hold the value, the rest of the line holds the setting label.
//!
//! ```text
//! +10.0               DARKNESS
//! 4 IPS               PRINT SPEED
//! 832                 PRINT WIDTH
//! 1215                LABEL LENGTH
//! V84.20.18Z <-       FIRMWARE
//! ```

use std::collections::BTreeMap;

use crate::LinkError;
use crate::frame::strip_control_characters;

/// Width of the value column.
const VALUE_COLUMNS: usize = 20;

const DARKNESS: &str = "DARKNESS";
const PRINT_SPEED: &str = "PRINT SPEED";
const PRINT_WIDTH: &str = "PRINT WIDTH";
const LABEL_LENGTH: &str = "LABEL LENGTH";
const FIRMWARE: &str = "FIRMWARE";
const LINK_OS_VERSION: &str = "LINK-OS VERSION";

/// Marker the printer appends to the active firmware line.
const FIRMWARE_MARKER: &str = "<-";

// ── Helpers ─────────────────────────────────────────────────────────────

/// Length of the numeric prefix of `raw` (optional sign, digits, and an
/// optional fractional part when `allow_fraction` is set).
fn numeric_prefix_len(raw: &str, allow_fraction: bool) -> usize {
    let bytes = raw.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if allow_fraction && bytes.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > end + 1 || end > digits_start {
            end = frac_end;
        }
    }
    if end == digits_start { 0 } else { end }
}

/// Parse the leading integer of a value such as `"4 IPS"` or `"832"`.
fn parse_int_setting(label: &str, raw: &str) -> Result<i64, LinkError> {
    let trimmed = raw.trim();
    let len = numeric_prefix_len(trimmed, false);
    trimmed[..len]
        .parse::<i64>()
        .map_err(|_| LinkError::InvalidField {
            label: label.to_string(),
            value: trimmed.to_string(),
        })
}

/// Parse the leading decimal number of a value such as `"+10.0"`.
fn parse_float_setting(label: &str, raw: &str) -> Result<f64, LinkError> {
    let trimmed = raw.trim();
    let len = numeric_prefix_len(trimmed, true);
    trimmed[..len]
        .parse::<f64>()
        .map_err(|_| LinkError::InvalidField {
            label: label.to_string(),
            value: trimmed.to_string(),
        })
}

/// Split one configuration line into `(value, label)`. The column count
/// starts after any leading whitespace.
fn split_line(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.char_indices().nth(VALUE_COLUMNS) {
        Some((idx, _)) => (line[..idx].trim(), line[idx..].trim()),
        None => (line.trim(), ""),
    }
}

// ── Configuration ───────────────────────────────────────────────────────

/// Parsed printer configuration.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Configuration {
    /// Darkness setting (e.g. `10.0`).
    pub darkness: f64,
    /// Print speed in inches per second.
    pub print_speed: i64,
    /// Print width in dots.
    pub print_width: i64,
    /// Label length in dots.
    pub label_length: i64,
    /// Version of the firmware running on the printer.
    pub firmware_version: String,
    /// Link-OS version, or `"0"` if the printer is not a Link-OS printer.
    pub link_os_version: String,
    settings: BTreeMap<String, String>,
}

impl Configuration {
    /// Parse a framed `^HH` configuration response.
    pub fn parse(raw: &str) -> Result<Configuration, LinkError> {
        if raw.trim().is_empty() {
            return Err(LinkError::framing("^HH: empty response"));
        }
        let payload = strip_control_characters(raw)
            .ok_or_else(|| LinkError::framing("^HH: missing STX/ETX"))?;

        let settings: BTreeMap<String, String> = payload
            .split('\n')
            .map(split_line)
            .filter(|(_, label)| !label.is_empty())
            .map(|(value, label)| (label.to_string(), value.to_string()))
            .collect();

        let required = |label: &str| -> Result<&str, LinkError> {
            settings
                .get(label)
                .map(String::as_str)
                .ok_or_else(|| LinkError::framing(format!("^HH: missing setting {label:?}")))
        };

        let darkness = parse_float_setting(DARKNESS, required(DARKNESS)?)?;
        let print_speed = parse_int_setting(PRINT_SPEED, required(PRINT_SPEED)?)?;
        let print_width = parse_int_setting(PRINT_WIDTH, required(PRINT_WIDTH)?)?;
        let label_length = parse_int_setting(LABEL_LENGTH, required(LABEL_LENGTH)?)?;

        let firmware = required(FIRMWARE)?.trim_end();
        let firmware_version = firmware
            .strip_suffix(FIRMWARE_MARKER)
            .unwrap_or(firmware)
            .trim()
            .to_string();

        let link_os_version = settings
            .get(LINK_OS_VERSION)
            .cloned()
            .unwrap_or_else(|| "0".to_string());

        Ok(Configuration {
            darkness,
            print_speed,
            print_width,
            label_length,
            firmware_version,
            link_os_version,
            settings,
        })
    }

    /// Raw value of any setting on the configuration label.
    pub fn setting(&self, label: &str) -> Option<&str> {
        self.settings.get(label).map(String::as_str)
    }

    /// All settings, keyed by label.
    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a framed configuration block from `(value, label)` pairs.
    fn config_block(lines: &[(&str, &str)]) -> String {
        let body: Vec<String> = lines
            .iter()
            .map(|(value, label)| format!("{value:<20}{label}"))
            .collect();
        format!("\u{2}{}\u{3}", body.join("\r\n"))
    }

    fn standard_lines() -> Vec<(&'static str, &'static str)> {
        vec![
            ("+10.0", "DARKNESS"),
            ("4 IPS", "PRINT SPEED"),
            ("832", "PRINT WIDTH"),
            ("1215", "LABEL LENGTH"),
            ("V84.20.18Z <-", "FIRMWARE"),
            ("TEAR OFF", "PRINT MODE"),
        ]
    }

    #[test]
    fn parse_configuration_normal() {
        let cfg = Configuration::parse(&config_block(&standard_lines())).expect("should parse");
        assert_eq!(cfg.darkness, 10.0);
        assert_eq!(cfg.print_speed, 4);
        assert_eq!(cfg.print_width, 832);
        assert_eq!(cfg.label_length, 1215);
        assert_eq!(cfg.firmware_version, "V84.20.18Z");
        assert_eq!(cfg.link_os_version, "0");
        assert_eq!(cfg.setting("PRINT MODE"), Some("TEAR OFF"));
        assert_eq!(cfg.settings().len(), 6);
    }

    #[test]
    fn parse_configuration_link_os() {
        let mut lines = standard_lines();
        lines.push(("4.3", "LINK-OS VERSION"));
        let cfg = Configuration::parse(&config_block(&lines)).expect("should parse");
        assert_eq!(cfg.link_os_version, "4.3");
    }

    #[test]
    fn parse_configuration_fractional_darkness() {
        let mut lines = standard_lines();
        lines[0] = ("-3.5", "DARKNESS");
        let cfg = Configuration::parse(&config_block(&lines)).expect("should parse");
        assert_eq!(cfg.darkness, -3.5);
    }

    #[test]
    fn parse_configuration_missing_setting() {
        let lines: Vec<_> = standard_lines()
            .into_iter()
            .filter(|(_, label)| *label != "PRINT WIDTH")
            .collect();
        let err = Configuration::parse(&config_block(&lines)).unwrap_err();
        assert!(matches!(err, LinkError::Framing { .. }));
        assert!(err.to_string().contains("PRINT WIDTH"), "unexpected error: {err}");
    }

    #[test]
    fn parse_configuration_non_numeric_value() {
        let mut lines = standard_lines();
        lines[3] = ("CONTINUOUS", "LABEL LENGTH");
        let err = Configuration::parse(&config_block(&lines)).unwrap_err();
        match err {
            LinkError::InvalidField { label, value } => {
                assert_eq!(label, "LABEL LENGTH");
                assert_eq!(value, "CONTINUOUS");
            }
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn parse_configuration_unframed() {
        let err = Configuration::parse("+10.0               DARKNESS").unwrap_err();
        assert!(err.to_string().contains("STX/ETX"), "unexpected error: {err}");

        let err = Configuration::parse("   ").unwrap_err();
        assert!(err.to_string().contains("empty"), "unexpected error: {err}");
    }

    #[test]
    fn short_lines_are_skipped() {
        let block = format!("{}\r\nshort\r\n", config_block(&standard_lines()));
        // Trailing text after ETX breaks framing; put the short line inside.
        assert!(Configuration::parse(&block).is_err());

        let mut body = config_block(&standard_lines());
        body.insert_str(1, "short\r\n");
        let cfg = Configuration::parse(&body).expect("should parse");
        assert_eq!(cfg.settings().len(), 6);
    }

    #[test]
    fn columns_count_from_first_non_blank() {
        let line = format!("  {:<20}{}", "ZBR3668123-WIFI", "HOST NAME");
        assert_eq!(split_line(&line), ("ZBR3668123-WIFI", "HOST NAME"));

        let line = format!("  {:<20}{}", "1234567890123456789", "SERIAL");
        assert_eq!(split_line(&line), ("1234567890123456789", "SERIAL"));

        assert_eq!(split_line("   short   "), ("short", ""));
    }

    #[test]
    fn numeric_prefix() {
        assert_eq!(numeric_prefix_len("4 IPS", false), 1);
        assert_eq!(numeric_prefix_len("+10.0", true), 5);
        assert_eq!(numeric_prefix_len("+10.0", false), 3);
        assert_eq!(numeric_prefix_len(".5", true), 2);
        assert_eq!(numeric_prefix_len("IPS", false), 0);
        assert_eq!(numeric_prefix_len("-", false), 0);
        assert_eq!(numeric_prefix_len("", true), 0);
    }
}
