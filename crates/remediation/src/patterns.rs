//! Compiled regular expressions shared by the parser, formatter and actions.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Candidate `Label:` token. Labels are one or more words on a single
    /// line, preceded by start of text, whitespace or a list separator.
    pub static ref LABEL_PATTERN: Regex =
        Regex::new(r"(?:^|[\s,;])([A-Za-z][A-Za-z0-9_/-]*(?:[ \t]+[A-Za-z][A-Za-z0-9_/-]*)*)[ \t]*:")
            .unwrap();

    /// Single-brace `{NAME}` placeholder used by legacy template documents
    pub static ref LEGACY_PLACEHOLDER_PATTERN: Regex =
        Regex::new(r"\{([A-Z][A-Z0-9_]*)\}").unwrap();

    /// First decimal number in a measurement transcript
    pub static ref NUMBER_PATTERN: Regex =
        Regex::new(r"-?\d+(?:\.\d+)?").unwrap();

    /// One `ps -eo pid,comm,%cpu` row: pid, command, usage
    pub static ref PS_ROW_PATTERN: Regex =
        Regex::new(r"^\s*(\d+)\s+(.+?)\s+(\d+(?:\.\d+)?)\s*$").unwrap();
}

/// Extract the first number from command output
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER_PATTERN
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}
