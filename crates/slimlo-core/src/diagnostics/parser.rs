//! Best-effort extraction of diagnostics from engine log lines.
//!
//! Engine log lines look like:
//!
//! ```text
//! warn:vcl.fonts:1234:Could not select font "Calibri", using "Liberation Sans"
//! ```
//!
//! This is pattern matching over free text, not a grammar. Unrecognized
//! phrasing yields a diagnostic without font details; it is never an error.
//! The matching rules are versioned by [`PARSER_VERSION`], independently of
//! the wire protocol.

use super::{Category, Diagnostic};
use crate::config::DiagnosticConfig;

/// Bumped whenever the matching rules change.
pub const PARSER_VERSION: u32 = 1;

const WARN_MARKER: &str = "warn:";
const FONT_MARKERS: [&str; 2] = [":fonts:", ":vcl.fonts:"];
const MISSING_FONT_PHRASES: [&str; 3] = [
    "Could not select font",
    "Could not find font",
    "not available",
];
const TRAILING_PHRASE: &str = "not available";
const SUBSTITUTION_PHRASES: [&str; 3] = ["substitut", "replaced", "using"];
const PREFIX_SEGMENTS: usize = 3;

/// Parse raw captured bytes. Invalid UTF-8 is replaced, not rejected.
pub fn parse_bytes(raw: &[u8]) -> Vec<Diagnostic> {
    if raw.is_empty() {
        return Vec::new();
    }
    parse_diagnostics(&String::from_utf8_lossy(raw))
}

/// Parse newline-delimited engine output into diagnostics.
pub fn parse_diagnostics(text: &str) -> Vec<Diagnostic> {
    text.split('\n').filter_map(parse_line).collect()
}

/// Parse a single log line. Returns `None` for anything that is not a warning.
pub fn parse_line(line: &str) -> Option<Diagnostic> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.len() <= WARN_MARKER.len() || !line.contains(WARN_MARKER) {
        return None;
    }

    let is_font = FONT_MARKERS.iter().any(|marker| line.contains(marker));
    let category = if is_font {
        Category::Font
    } else {
        Category::General
    };

    let message = truncate(strip_log_prefix(line), DiagnosticConfig::MAX_MESSAGE_BYTES);
    let mut diagnostic = Diagnostic::warning(category, message);

    if is_font {
        if let Some((font, end)) = missing_font(line) {
            diagnostic.font = non_empty(font);
            diagnostic.substituted_with = substitution(&line[end..]).and_then(non_empty);
        }
    }

    Some(diagnostic)
}

/// Drop the `component:subcomponent:id:` prefix and leading spaces.
fn strip_log_prefix(line: &str) -> &str {
    let body = match line.match_indices(':').nth(PREFIX_SEGMENTS - 1) {
        Some((idx, _)) => &line[idx + 1..],
        None => line,
    };
    body.trim_start_matches(' ')
}

fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn non_empty(name: &str) -> Option<String> {
    (!name.is_empty()).then(|| name.to_string())
}

/// First `"..."` in `text`: the inner slice and the offset just past the
/// closing quote.
fn first_quoted(text: &str) -> Option<(&str, usize)> {
    let open = text.find('"')?;
    let close = open + 1 + text[open + 1..].find('"')?;
    Some((&text[open + 1..close], close + 1))
}

/// Last `"..."` in `text`.
fn last_quoted(text: &str) -> Option<(&str, usize)> {
    let close = text.rfind('"')?;
    let open = text[..close].rfind('"')?;
    Some((&text[open + 1..close], close + 1))
}

/// Locate the unavailable font name. Returns the name and the offset in
/// `line` just past its closing quote.
fn missing_font(line: &str) -> Option<(&str, usize)> {
    let phrase = MISSING_FONT_PHRASES
        .iter()
        .find_map(|phrase| line.find(phrase).map(|pos| (*phrase, pos)));

    if let Some((phrase, pos)) = phrase {
        // `Font "X" not available` names the font before the phrase.
        if phrase == TRAILING_PHRASE {
            if let Some(found) = last_quoted(&line[..pos]) {
                return Some(found);
            }
        }
        let after = pos + phrase.len();
        return first_quoted(&line[after..]).map(|(name, end)| (name, after + end));
    }

    let marker_end = FONT_MARKERS
        .iter()
        .find_map(|marker| line.find(marker).map(|pos| pos + marker.len()))?;
    first_quoted(&line[marker_end..]).map(|(name, end)| (name, marker_end + end))
}

/// Locate the replacement font in the text following the missing font name.
fn substitution(rest: &str) -> Option<&str> {
    let pos = SUBSTITUTION_PHRASES
        .iter()
        .find_map(|phrase| rest.find(phrase))?;
    first_quoted(&rest[pos..]).map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    fn warning(line: &str) -> Diagnostic {
        parse_line(line).expect("warning line")
    }

    #[test]
    fn test_font_substitution_example() {
        let diag = warning(
            r#"warn:vcl.fonts:1234:Could not select font "Calibri", using "Liberation Sans""#,
        );

        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.category, Category::Font);
        assert_eq!(diag.font.as_deref(), Some("Calibri"));
        assert_eq!(diag.substituted_with.as_deref(), Some("Liberation Sans"));
        assert_eq!(
            diag.message,
            r#"Could not select font "Calibri", using "Liberation Sans""#
        );
    }

    #[test]
    fn test_substituted_with_phrasing() {
        let diag = warning(
            r#"warn:fonts:77: Could not find font "Cambria" - substituted with "DejaVu Serif""#,
        );
        assert_eq!(diag.font.as_deref(), Some("Cambria"));
        assert_eq!(diag.substituted_with.as_deref(), Some("DejaVu Serif"));
        assert_eq!(
            diag.message,
            r#"Could not find font "Cambria" - substituted with "DejaVu Serif""#
        );
    }

    #[test]
    fn test_not_available_names_preceding_font() {
        let diag = warning(
            r#"warn:vcl.fonts:9:font "Segoe UI" not available, replaced by "Carlito""#,
        );
        assert_eq!(diag.font.as_deref(), Some("Segoe UI"));
        assert_eq!(diag.substituted_with.as_deref(), Some("Carlito"));
    }

    #[test]
    fn test_generic_quoted_font_after_marker() {
        let diag = warning(r#"warn:fonts:3:glyph fallback for "Wingdings""#);
        assert_eq!(diag.category, Category::Font);
        assert_eq!(diag.font.as_deref(), Some("Wingdings"));
        assert_eq!(diag.substituted_with, None);
    }

    #[test]
    fn test_general_warning_has_no_font_fields() {
        let diag = warning(r#"warn:sfx.doc:42:Could not select font "Calibri""#);
        assert_eq!(diag.category, Category::General);
        assert_eq!(diag.font, None);
        assert_eq!(diag.message, r#"Could not select font "Calibri""#);
    }

    #[test]
    fn test_font_line_without_recognizable_pattern() {
        let diag = warning("warn:vcl.fonts:5:font cache rebuilt");
        assert_eq!(diag.category, Category::Font);
        assert_eq!(diag.font, None);
        assert_eq!(diag.substituted_with, None);
        assert_eq!(diag.message, "font cache rebuilt");
    }

    #[test]
    fn test_empty_and_unterminated_quotes_yield_no_names() {
        let diag = warning(
            r#"warn:vcl.fonts:1:Could not select font "", using "Arial""#,
        );
        assert_eq!(diag.font, None);
        assert_eq!(diag.substituted_with.as_deref(), Some("Arial"));

        let diag = warning(r#"warn:vcl.fonts:1:Could not select font "Calibri"#);
        assert_eq!(diag.font, None);
        assert_eq!(diag.substituted_with, None);
    }

    #[test]
    fn test_non_warning_lines_are_skipped() {
        let text = "info:vcl:1:starting\n\nwarn:\nplain chatter\n";
        assert!(parse_diagnostics(text).is_empty());
    }

    #[test]
    fn test_multiple_lines_and_crlf() {
        let text = "warn:vcl.fonts:1:Could not select font \"A\", using \"B\"\r\n\
                    info:vcl:2:noise\r\n\
                    warn:sw:3:table layout overflow\r\n";
        let diags = parse_diagnostics(text);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].substituted_with.as_deref(), Some("B"));
        assert_eq!(diags[1].category, Category::General);
        assert_eq!(diags[1].message, "table layout overflow");
    }

    #[test]
    fn test_short_prefix_keeps_whole_line() {
        let diag = warning("warn: disk almost full");
        assert_eq!(diag.message, "warn: disk almost full");
    }

    #[test]
    fn test_long_message_is_truncated_on_char_boundary() {
        let body = "é".repeat(800); // 1600 bytes
        let line = format!("warn:sw:1:{}", body);
        let diag = warning(&line);
        assert!(diag.message.len() <= DiagnosticConfig::MAX_MESSAGE_BYTES);
        assert_eq!(diag.message.len(), 1024);
        assert!(diag.message.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_invalid_utf8_does_not_panic() {
        let mut raw = b"warn:vcl.fonts:1:Could not select font \"".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe, b'"', b'\n', 0xc3]);
        let diags = parse_bytes(&raw);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].category, Category::Font);
        assert!(parse_bytes(&[]).is_empty());
    }

    #[test]
    fn test_adversarial_inputs_do_not_panic() {
        let inputs = [
            "warn:",
            "warn:::",
            "warn:\"\"\"\"",
            "warn:fonts:\"",
            ":fonts:warn:\"x",
            "warn:vcl.fonts:1:not available\"",
            "warn:vcl.fonts:1:\"a\" not available",
            "warn:vcl.fonts:1:Could not select font\"",
        ];
        for input in inputs {
            let _ = parse_line(input);
        }
        let diag = warning("warn:vcl.fonts:1:\"a\" not available");
        assert_eq!(diag.font.as_deref(), Some("a"));
    }
}
