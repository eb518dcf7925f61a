//! Input sanitization for the vigil security core.
//!
//! Implements the per-field-type text transformation layer: a pure,
//! non-throwing function from raw user input to a safe-to-store value.
//! Sanitization never judges the input — that is the validator's job — it
//! only removes markup, script vectors, and characters a given field type
//! has no business containing, then trims and truncates.
//!
//! The transformation is idempotent for every field kind: sanitizing an
//! already-sanitized value returns it unchanged. Script-vector stripping is
//! therefore applied to a fixpoint, so removals can never splice a new
//! `javascript:` fragment into existence.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil::sanitizer::{FieldKind, Sanitizer};
//!
//! let sanitizer = Sanitizer::new();
//! let clean = sanitizer.sanitize("<script>alert(1)</script>Hello", FieldKind::Message);
//! assert_eq!(clean, "alert(1)Hello");
//! ```

use crate::constants::{MAX_EMAIL_LEN, MAX_MESSAGE_LEN, MAX_NAME_LEN, MAX_PHONE_LEN};
use regex::Regex;
use serde::{Deserialize, Serialize};

// =============================================================================
// REGEX PATTERNS
// =============================================================================

/// Pattern for complete HTML tags (`<b>`, `</script>`, `<img onerror=...>`).
const HTML_TAG_PATTERN: &str = r"<[^>]*>";

/// Pattern for stray angle brackets left after tag removal.
const ANGLE_BRACKET_PATTERN: &str = r"[<>]";

/// Pattern for script-capable protocol handlers.
const SCRIPT_PROTOCOL_PATTERN: &str = r"(?i)(?:javascript|vbscript)\s*:";

/// Pattern for inline event handler attributes (`onerror=`, `onload =`).
const EVENT_HANDLER_PATTERN: &str = r"(?i)\bon\w+\s*=";

/// Pattern for characters a phone field may not contain.
/// Digits, `+`, parentheses, hyphen, and whitespace survive.
const PHONE_STRIP_PATTERN: &str = r"[^\d+()\-\s]";

/// Pattern for quote characters stripped from name-like fields.
const QUOTE_PATTERN: &str = "['\"`]";

// =============================================================================
// FIELD KIND
// =============================================================================

/// The type of a form field, selecting its sanitization and length policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// A person or business name.
    Name,

    /// An email address.
    Email,

    /// A phone number, possibly formatted.
    Phone,

    /// Free-form message text.
    Message,
}

impl FieldKind {
    /// Get all field kinds.
    pub fn all() -> Vec<Self> {
        vec![Self::Name, Self::Email, Self::Phone, Self::Message]
    }

    /// Maximum accepted length for this field kind, in characters.
    pub fn max_len(&self) -> usize {
        match self {
            Self::Name => MAX_NAME_LEN,
            Self::Email => MAX_EMAIL_LEN,
            Self::Phone => MAX_PHONE_LEN,
            Self::Message => MAX_MESSAGE_LEN,
        }
    }

    /// Check whether this kind carries free text (subject to content policy).
    pub fn is_free_text(&self) -> bool {
        matches!(self, Self::Message)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Email => write!(f, "email"),
            Self::Phone => write!(f, "phone"),
            Self::Message => write!(f, "message"),
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "email" => Ok(Self::Email),
            "phone" | "tel" => Ok(Self::Phone),
            "message" | "text" => Ok(Self::Message),
            _ => Err(crate::Error::Validation(format!(
                "Unknown field kind: '{}'. Valid: name, email, phone, message",
                s
            ))),
        }
    }
}

// =============================================================================
// SANITIZER
// =============================================================================

/// Per-field-type input sanitizer.
///
/// Pure and non-throwing: `sanitize` has no side effects and returns a
/// well-formed string for any input. Regexes are compiled once at
/// construction.
///
/// Transformation order:
///
/// 1. Kind-specific pass (tag stripping for messages, quote stripping for
///    names, lowercasing for email, character whitelist for phone).
/// 2. Script-vector stripping to a fixpoint (angle brackets, script
///    protocols, inline event handlers).
/// 3. Trim.
/// 4. Truncate to the field kind's maximum length.
#[derive(Debug)]
pub struct Sanitizer {
    html_tags: Regex,
    angle_brackets: Regex,
    script_protocols: Regex,
    event_handlers: Regex,
    phone_strip: Regex,
    quotes: Regex,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    /// Create a sanitizer with all patterns compiled.
    pub fn new() -> Self {
        Self {
            html_tags: Regex::new(HTML_TAG_PATTERN).expect("Invalid HTML tag pattern"),
            angle_brackets: Regex::new(ANGLE_BRACKET_PATTERN)
                .expect("Invalid angle bracket pattern"),
            script_protocols: Regex::new(SCRIPT_PROTOCOL_PATTERN)
                .expect("Invalid script protocol pattern"),
            event_handlers: Regex::new(EVENT_HANDLER_PATTERN)
                .expect("Invalid event handler pattern"),
            phone_strip: Regex::new(PHONE_STRIP_PATTERN).expect("Invalid phone strip pattern"),
            quotes: Regex::new(QUOTE_PATTERN).expect("Invalid quote pattern"),
        }
    }

    /// Sanitize `value` according to the policy for `kind`.
    ///
    /// Never fails; the worst input yields an empty string.
    pub fn sanitize(&self, value: &str, kind: FieldKind) -> String {
        let pass = match kind {
            FieldKind::Email => {
                let lowered = value.to_lowercase();
                self.strip_script_vectors(&lowered)
            }
            FieldKind::Phone => self.phone_strip.replace_all(value, "").into_owned(),
            FieldKind::Message => {
                let untagged = strip_to_fixpoint(&self.html_tags, value);
                self.strip_script_vectors(&untagged)
            }
            FieldKind::Name => {
                let untagged = strip_to_fixpoint(&self.html_tags, value);
                let unquoted = self.quotes.replace_all(&untagged, "").into_owned();
                self.strip_script_vectors(&unquoted)
            }
        };

        truncate_chars(pass.trim(), kind.max_len())
    }

    /// Remove angle brackets, script protocols, and event handlers until
    /// none remain.
    fn strip_script_vectors(&self, value: &str) -> String {
        let no_brackets = self.angle_brackets.replace_all(value, "").into_owned();
        let no_protocols = strip_to_fixpoint(&self.script_protocols, &no_brackets);
        strip_to_fixpoint(&self.event_handlers, &no_protocols)
    }
}

/// Repeatedly delete matches of `re` until the string is a fixpoint.
///
/// Deleting one match can concatenate surrounding text into a new match
/// (`java<b>script:` is the classic), so a single pass is not idempotent.
/// Each iteration shrinks the string, so this terminates.
fn strip_to_fixpoint(re: &Regex, value: &str) -> String {
    let mut current = value.to_string();
    loop {
        let next = re.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new()
    }

    // -------------------------------------------------------------------------
    // FieldKind Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_field_kind_max_lengths() {
        assert_eq!(FieldKind::Name.max_len(), 50);
        assert_eq!(FieldKind::Email.max_len(), 254);
        assert_eq!(FieldKind::Phone.max_len(), 20);
        assert_eq!(FieldKind::Message.max_len(), 2000);
    }

    #[test]
    fn test_field_kind_from_str() {
        assert_eq!("email".parse::<FieldKind>().unwrap(), FieldKind::Email);
        assert_eq!("tel".parse::<FieldKind>().unwrap(), FieldKind::Phone);
        assert_eq!("Message".parse::<FieldKind>().unwrap(), FieldKind::Message);
        assert!("address".parse::<FieldKind>().is_err());
    }

    #[test]
    fn test_field_kind_display_roundtrip() {
        for kind in FieldKind::all() {
            assert_eq!(kind.to_string().parse::<FieldKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_free_text() {
        assert!(FieldKind::Message.is_free_text());
        assert!(!FieldKind::Email.is_free_text());
    }

    // -------------------------------------------------------------------------
    // Message Sanitization Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_message_strips_tags() {
        let s = sanitizer();
        let out = s.sanitize("Hello <b>world</b>!", FieldKind::Message);
        assert_eq!(out, "Hello world!");
    }

    #[test]
    fn test_message_strips_script_block() {
        let s = sanitizer();
        let out = s.sanitize("<script>alert(1)</script>", FieldKind::Message);
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert!(!out.to_lowercase().contains("<script"));
    }

    #[test]
    fn test_message_strips_javascript_protocol() {
        let s = sanitizer();
        let out = s.sanitize("click javascript:alert(1) here", FieldKind::Message);
        assert!(!out.to_lowercase().contains("javascript:"));
    }

    #[test]
    fn test_message_strips_spliced_protocol() {
        // Tag removal concatenates "java" + "script:"; the fixpoint pass
        // must still remove it.
        let s = sanitizer();
        let out = s.sanitize("java<b>script:alert(1)", FieldKind::Message);
        assert!(!out.to_lowercase().contains("javascript:"));
    }

    #[test]
    fn test_message_strips_event_handlers() {
        let s = sanitizer();
        let out = s.sanitize("x onerror=alert(1) y", FieldKind::Message);
        assert!(!out.to_lowercase().contains("onerror"));
    }

    #[test]
    fn test_message_truncates_to_limit() {
        let s = sanitizer();
        let long = "a".repeat(3000);
        let out = s.sanitize(&long, FieldKind::Message);
        assert_eq!(out.chars().count(), 2000);
    }

    #[test]
    fn test_message_idempotent() {
        let s = sanitizer();
        let inputs = [
            "Hello <b>world</b>!",
            "<script>alert('xss')</script> trailing",
            "java<b>script:alert(1)",
            "  spaced  out  ",
            "plain text message.",
        ];
        for input in inputs {
            let once = s.sanitize(input, FieldKind::Message);
            let twice = s.sanitize(&once, FieldKind::Message);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    // -------------------------------------------------------------------------
    // Name Sanitization Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_name_strips_quotes() {
        let s = sanitizer();
        assert_eq!(s.sanitize("O'Brien", FieldKind::Name), "OBrien");
        assert_eq!(s.sanitize("\"Jane\"", FieldKind::Name), "Jane");
    }

    #[test]
    fn test_name_strips_markup_and_truncates() {
        let s = sanitizer();
        let out = s.sanitize("<i>Bob</i>", FieldKind::Name);
        assert_eq!(out, "Bob");

        let long = "x".repeat(80);
        assert_eq!(s.sanitize(&long, FieldKind::Name).chars().count(), 50);
    }

    #[test]
    fn test_name_idempotent() {
        let s = sanitizer();
        for input in ["O'Brien", "<b>Ann</b>", "  Mary Jane  "] {
            let once = s.sanitize(input, FieldKind::Name);
            assert_eq!(s.sanitize(&once, FieldKind::Name), once);
        }
    }

    // -------------------------------------------------------------------------
    // Email Sanitization Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_email_lowercases_and_trims() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("  John@Example.COM  ", FieldKind::Email),
            "john@example.com"
        );
    }

    #[test]
    fn test_email_strips_brackets() {
        let s = sanitizer();
        let out = s.sanitize("<john@example.com>", FieldKind::Email);
        assert_eq!(out, "john@example.com");
    }

    // -------------------------------------------------------------------------
    // Phone Sanitization Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_phone_keeps_allowed_charset() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("+1 (555) 123-4567", FieldKind::Phone),
            "+1 (555) 123-4567"
        );
    }

    #[test]
    fn test_phone_strips_letters_and_symbols() {
        let s = sanitizer();
        assert_eq!(s.sanitize("555.123.4567 ext#9", FieldKind::Phone), "5551234567 9");
    }

    // -------------------------------------------------------------------------
    // Contract Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_never_panics_on_garbage() {
        let s = sanitizer();
        let garbage = ["", "   ", "\u{0}\u{202E}<<<>>>", "<<<", "💜💜💜", "\r\n\r\n"];
        for g in garbage {
            for kind in FieldKind::all() {
                let _ = s.sanitize(g, kind);
            }
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = sanitizer();
        let emoji = "💜".repeat(60);
        let out = s.sanitize(&emoji, FieldKind::Name);
        assert_eq!(out.chars().count(), 50);
    }
}
