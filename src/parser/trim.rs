//! Whitespace trimming rules applied by `{{-`, `-}}`, `{%-` and `-%}`.
//!
//! The parser only decides *which* literal a trim request targets; the
//! rule for *how much* whitespace goes is a [`TrimStrategy`] chosen by
//! [`TrimMode`].

use crate::lexer::is_whitespace;

/// Which trimming rule the parser applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum TrimMode {
    /// Remove all whitespace on the requested side.
    #[default]
    Standard,
    /// Reproduce historical output: a trailing trim that would empty a
    /// literal keeps the literal's first character.
    LegacyCompatible,
}

impl TrimMode {
    pub fn strategy(self) -> &'static dyn TrimStrategy {
        match self {
            TrimMode::Standard => &StandardTrim,
            TrimMode::LegacyCompatible => &LegacyTrim,
        }
    }
}

pub trait TrimStrategy: Send + Sync {
    /// Trim the start of a literal that follows a `-}}` or `-%}`.
    fn trim_start<'a>(&self, text: &'a str) -> &'a str;

    /// Trim, in place, the end of a literal that precedes a `{{-` or `{%-`.
    fn trim_end(&self, text: &mut String);
}

pub struct StandardTrim;

impl TrimStrategy for StandardTrim {
    fn trim_start<'a>(&self, text: &'a str) -> &'a str {
        text.trim_start_matches(is_whitespace)
    }

    fn trim_end(&self, text: &mut String) {
        let keep = text.trim_end_matches(is_whitespace).len();
        text.truncate(keep);
    }
}

pub struct LegacyTrim;

impl TrimStrategy for LegacyTrim {
    fn trim_start<'a>(&self, text: &'a str) -> &'a str {
        StandardTrim.trim_start(text)
    }

    fn trim_end(&self, text: &mut String) {
        let first = text.chars().next();
        StandardTrim.trim_end(text);
        if text.is_empty()
            && let Some(first) = first
        {
            text.push(first);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trimmed_end(mode: TrimMode, text: &str) -> String {
        let mut s = text.to_string();
        mode.strategy().trim_end(&mut s);
        s
    }

    #[test]
    fn test_standard_trims_everything() {
        assert_eq!(trimmed_end(TrimMode::Standard, "a \n\t "), "a");
        assert_eq!(trimmed_end(TrimMode::Standard, "\n"), "");
        assert_eq!(trimmed_end(TrimMode::Standard, "\n \n"), "");
        assert_eq!(TrimMode::Standard.strategy().trim_start(" \n\r\nx "), "x ");
    }

    #[test]
    fn test_legacy_keeps_first_char_when_emptied() {
        assert_eq!(trimmed_end(TrimMode::LegacyCompatible, "\n "), "\n");
        assert_eq!(trimmed_end(TrimMode::LegacyCompatible, " \n"), " ");
        assert_eq!(trimmed_end(TrimMode::LegacyCompatible, "\n\n\n"), "\n");
    }

    #[test]
    fn test_legacy_matches_standard_when_text_remains() {
        assert_eq!(trimmed_end(TrimMode::LegacyCompatible, "B\n "), "B");
        assert_eq!(trimmed_end(TrimMode::LegacyCompatible, "a  b \n"), "a  b");
    }

    #[test]
    fn test_legacy_leading_trim_is_standard() {
        assert_eq!(TrimMode::LegacyCompatible.strategy().trim_start("\n  x"), "x");
        assert_eq!(TrimMode::LegacyCompatible.strategy().trim_start(" \n"), "");
    }

    #[test]
    fn test_empty_is_noop() {
        assert_eq!(trimmed_end(TrimMode::LegacyCompatible, ""), "");
        assert_eq!(trimmed_end(TrimMode::Standard, ""), "");
    }

    #[test]
    fn test_non_ascii_whitespace_is_kept() {
        assert_eq!(trimmed_end(TrimMode::Standard, "a\u{3000}"), "a\u{3000}");
    }
}
