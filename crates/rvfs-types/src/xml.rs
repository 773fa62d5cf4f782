//! Checks for text that will be embedded in XML output.

/// Whether `text` can be XML-escaped without loss.
///
/// XML 1.0 has no representation for U+0000 through U+001F other than tab,
/// newline, and carriage return. DEL and the C1 controls are legal `Char`s.
pub fn is_xml_safe(text: &str) -> bool {
    !text
        .chars()
        .any(|c| c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r'))
}
