//! G-code command model and parsing
//!
//! A [`GCode`] is one parsed command line: a sparse letter→value map plus an
//! optional line number and an optional text tail (`M117` messages, `@` host
//! commands). [`packet`] turns a command into wire bytes — checksummed ASCII
//! or the compact binary frame.

use std::collections::HashMap;

pub mod packet;

pub use packet::GCodeDataPacket;

/// Canonical field emission order, after the line number.
pub const FIELD_ORDER: [char; 21] = [
    'G', 'M', 'T', 'S', 'P', 'X', 'Y', 'Z', 'E', 'F', 'I', 'J', 'R', 'D', 'C', 'H', 'A', 'B', 'K',
    'L', 'O',
];

/// One parsed G-code command.
///
/// Semantic equality ignores the original source text and the
/// `has_checksum` parse artifact, so `parse(render(gc)) == gc` holds for
/// every renderable command.
#[derive(Debug, Clone, Default)]
pub struct GCode {
    original: String,
    fields: HashMap<char, f64>,
    n: Option<u16>,
    text: Option<String>,
    host_command: bool,
    force_ascii: bool,
    has_checksum: bool,
}

impl PartialEq for GCode {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
            && self.n == other.n
            && self.text == other.text
            && self.host_command == other.host_command
            && self.force_ascii == other.force_ascii
    }
}

impl GCode {
    /// Parse a source line into a command.
    ///
    /// - a line that is empty or starts with `;` yields an empty command
    ///   (callers filter these before enqueueing)
    /// - a leading `@` marks a host command; the remainder is stored verbatim
    /// - `M117` captures the rest of the line as its display text
    /// - a trailing `*<checksum>` is stripped before tokenizing
    ///
    /// Lowercase field letters are accepted; unparseable tokens are skipped.
    pub fn parse(line: &str) -> Self {
        let mut gcode = GCode {
            original: line.to_string(),
            ..Default::default()
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return gcode;
        }
        if let Some(rest) = trimmed.strip_prefix('@') {
            gcode.host_command = true;
            gcode.text = Some(rest.trim().to_string());
            return gcode;
        }

        // Strip a trailing comment before tokenizing. M117 text is cut at the
        // comment too, like every host does.
        let code = match trimmed.find(';') {
            Some(pos) => trimmed[..pos].trim_end(),
            None => trimmed,
        };

        // A `*<digits>` tail is the line checksum, not part of the command.
        // It comes off before tokenizing so an M117 text capture cannot
        // swallow it.
        let code = match code.rfind('*') {
            Some(pos)
                if !code[pos + 1..].trim().is_empty()
                    && code[pos + 1..]
                        .trim()
                        .chars()
                        .all(|c| c.is_ascii_digit()) =>
            {
                gcode.has_checksum = true;
                code[..pos].trim_end()
            }
            _ => code,
        };

        for token in code.split_whitespace() {
            let mut chars = token.chars();
            let letter = match chars.next() {
                Some(c) => c.to_ascii_uppercase(),
                None => continue,
            };
            let value: f64 = match chars.as_str().parse() {
                Ok(v) => v,
                Err(_) => {
                    tracing::debug!(token, "skipping unparseable G-code token");
                    continue;
                }
            };
            match letter {
                'N' => gcode.n = Some(value as i64 as u16),
                letter if FIELD_ORDER.contains(&letter) => {
                    gcode.fields.insert(letter, value);
                    if letter == 'M' && value as i64 == 117 {
                        // The LCD message is everything after the M117 token.
                        let upper = code.to_ascii_uppercase();
                        if let Some(pos) = upper.find("M117") {
                            gcode.text =
                                Some(code[pos + 4..].trim().to_string());
                        }
                        break;
                    }
                }
                _ => {
                    tracing::debug!(token, "skipping unknown G-code letter");
                }
            }
        }

        // M110 (set line number), M112 (emergency stop) and M117 must reach
        // the firmware as plain ASCII even on a binary connection.
        if matches!(gcode.m(), Some(110) | Some(112) | Some(117)) {
            gcode.force_ascii = true;
        }
        gcode
    }

    /// The unmodified source line.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Numeric value of a field letter, if present.
    pub fn value(&self, letter: char) -> Option<f64> {
        self.fields.get(&letter).copied()
    }

    /// Whether a field letter is present.
    pub fn has(&self, letter: char) -> bool {
        self.fields.contains_key(&letter)
    }

    /// The G number, if this is a G command.
    pub fn g(&self) -> Option<i32> {
        self.value('G').map(|v| v as i32)
    }

    /// The M number, if this is an M command.
    pub fn m(&self) -> Option<i32> {
        self.value('M').map(|v| v as i32)
    }

    /// The T (tool select) number, if present.
    pub fn t(&self) -> Option<i32> {
        self.value('T').map(|v| v as i32)
    }

    /// The assigned line number.
    pub fn n(&self) -> Option<u16> {
        self.n
    }

    /// Assign the line number (mod 2^16).
    pub fn set_n(&mut self, n: u16) {
        self.n = Some(n);
    }

    /// The text tail (`M117` message or host command).
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// True for `@` commands interpreted by the host, never sent to firmware.
    pub fn is_host_command(&self) -> bool {
        self.host_command
    }

    /// True when the command must be framed as ASCII even on a binary
    /// connection.
    pub fn force_ascii(&self) -> bool {
        self.force_ascii
    }

    /// True when the source line carried a `*<checksum>` tail.
    pub fn has_checksum(&self) -> bool {
        self.has_checksum
    }

    /// True when the line parsed to nothing worth sending.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.text.is_none() && !self.host_command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_move_command() {
        let gc = GCode::parse("G1 X10 Y-2.5 F3000");
        assert_eq!(gc.g(), Some(1));
        assert_eq!(gc.value('X'), Some(10.0));
        assert_eq!(gc.value('Y'), Some(-2.5));
        assert_eq!(gc.value('F'), Some(3000.0));
        assert!(gc.n().is_none());
        assert!(!gc.force_ascii());
    }

    #[test]
    fn lowercase_letters_are_uppercased() {
        let gc = GCode::parse("g28 x0 y0");
        assert_eq!(gc.g(), Some(28));
        assert!(gc.has('X'));
        assert!(gc.has('Y'));
    }

    #[test]
    fn comment_and_empty_lines_are_empty_commands() {
        assert!(GCode::parse("; layer 3").is_empty());
        assert!(GCode::parse("   ").is_empty());
        assert!(GCode::parse("").is_empty());
    }

    #[test]
    fn trailing_comment_is_stripped() {
        let gc = GCode::parse("G1 X5 ; move right");
        assert_eq!(gc.value('X'), Some(5.0));
        assert!(!gc.has('F'));
    }

    #[test]
    fn host_command_is_captured() {
        let gc = GCode::parse("@pause filament change");
        assert!(gc.is_host_command());
        assert_eq!(gc.text(), Some("pause filament change"));
        assert!(!gc.is_empty());
    }

    #[test]
    fn m117_captures_text_verbatim() {
        let gc = GCode::parse("M117 Hello World");
        assert_eq!(gc.m(), Some(117));
        assert_eq!(gc.text(), Some("Hello World"));
        assert!(gc.force_ascii());
    }

    #[test]
    fn m110_and_m112_force_ascii() {
        assert!(GCode::parse("M110 N0").force_ascii());
        assert!(GCode::parse("M112").force_ascii());
        assert!(!GCode::parse("M105").force_ascii());
    }

    #[test]
    fn explicit_line_number_is_parsed() {
        let gc = GCode::parse("N17 G1 X1");
        assert_eq!(gc.n(), Some(17));
    }

    #[test]
    fn checksum_tail_is_stripped() {
        let gc = GCode::parse("N1 G1 X10 *112");
        assert!(gc.has_checksum());
        assert_eq!(gc.n(), Some(1));
        assert_eq!(gc.value('X'), Some(10.0));
    }

    #[test]
    fn m117_text_with_checksum_tail() {
        let gc = GCode::parse("M117 Layer 2 of 100 *83");
        assert_eq!(gc.text(), Some("Layer 2 of 100"));
        assert!(gc.has_checksum());
    }

    #[test]
    fn asterisks_inside_m117_text_survive() {
        let gc = GCode::parse("M117 *** DONE ***");
        assert_eq!(gc.text(), Some("*** DONE ***"));
        assert!(!gc.has_checksum());
    }

    #[test]
    fn set_n_overrides() {
        let mut gc = GCode::parse("M105");
        gc.set_n(42);
        assert_eq!(gc.n(), Some(42));
    }
}
