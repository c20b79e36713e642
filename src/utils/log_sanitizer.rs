// ============================================================================
// Log Sanitization
// ============================================================================
//
// Scanned codes, customer names, emails and uploaded filenames end up in log
// lines. They pass through here first so a crafted value cannot forge log
// entries or drive the terminal.
//
// ============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length (characters) of a logged user value
const MAX_LOG_LENGTH: usize = 200;

static ANSI_ESCAPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("static ANSI pattern"));

/// Strips ANSI sequences and control characters, flattens line breaks and
/// tabs to spaces and truncates to `MAX_LOG_LENGTH` characters.
///
/// ```
/// use orderdesk::utils::log_sanitizer::sanitize_for_log;
///
/// assert_eq!(sanitize_for_log("ML-1\nINFO fake"), "ML-1 INFO fake");
/// ```
pub fn sanitize_for_log(input: &str) -> String {
    let no_ansi = ANSI_ESCAPE_REGEX.replace_all(input, "");

    let mut clean = String::with_capacity(no_ansi.len().min(MAX_LOG_LENGTH + 3));
    let mut count = 0;
    for c in no_ansi.chars() {
        let c = match c {
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => continue,
            c => c,
        };
        if count == MAX_LOG_LENGTH {
            clean.push_str("...");
            break;
        }
        clean.push(c);
        count += 1;
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_removes_newlines() {
        let result = sanitize_for_log("user@example.com\r\nINFO: Fake log entry");
        assert_eq!(result, "user@example.com  INFO: Fake log entry");
    }

    #[test]
    fn test_sanitize_removes_ansi_escapes() {
        assert_eq!(sanitize_for_log("test\x1b[31mred text\x1b[0m"), "testred text");
    }

    #[test]
    fn test_sanitize_removes_control_chars() {
        assert_eq!(sanitize_for_log("]C1\x1d0107801234567891"), "]C10107801234567891");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundaries() {
        let long_input = "ñ".repeat(300);
        let result = sanitize_for_log(&long_input);
        assert_eq!(result.chars().count(), MAX_LOG_LENGTH + 3);
        assert!(result.ends_with("..."));
        assert_eq!(sanitize_for_log(&"a".repeat(MAX_LOG_LENGTH)).len(), MAX_LOG_LENGTH);
    }

    #[test]
    fn test_sanitize_preserves_normal_text() {
        assert_eq!(sanitize_for_log("Pérez, Juan <juan+ml@example.cl>"), "Pérez, Juan <juan+ml@example.cl>");
    }
}
