//! Terminator patterns for detecting the end of a command's response.
//!
//! Callers describe terminators as plain strings: a leading `^` anchors the
//! pattern to the start of the accumulated text, a trailing `$` anchors it to
//! the end, anything else matches as a substring. Internally each string is
//! parsed into one or more [`Terminator`] values.

use memchr::memmem;

/// Trait for prompt matching over accumulated output.
pub trait PromptMatcher: Send + Sync {
    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool;
}

/// A single completion pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Accumulated text must start with this string.
    Prefix(String),

    /// Accumulated text must end with this string.
    Suffix(String),

    /// This string must occur anywhere in the accumulated text.
    Contains(String),
}

impl Terminator {
    /// Parse one caller-facing pattern string.
    ///
    /// The anchors are independent: `^abc$` yields both a prefix anchor on
    /// `abc$` and a suffix anchor on `^abc`. A bare `^` or `$` anchors the
    /// empty string and so matches any text. An empty pattern yields nothing.
    pub fn parse(pattern: &str) -> Vec<Terminator> {
        let mut parsed = Vec::new();
        if pattern.is_empty() {
            return parsed;
        }

        if let Some(rest) = pattern.strip_prefix('^') {
            parsed.push(Terminator::Prefix(rest.to_string()));
        }
        if let Some(rest) = pattern.strip_suffix('$') {
            parsed.push(Terminator::Suffix(rest.to_string()));
        }
        if parsed.is_empty() {
            parsed.push(Terminator::Contains(pattern.to_string()));
        }
        parsed
    }

    /// Parse a list of caller-facing patterns.
    pub fn parse_all<S: AsRef<str>>(patterns: &[S]) -> Vec<Terminator> {
        patterns
            .iter()
            .flat_map(|p| Terminator::parse(p.as_ref()))
            .collect()
    }
}

impl PromptMatcher for Terminator {
    fn is_match(&self, data: &[u8]) -> bool {
        match self {
            Terminator::Prefix(s) => data.starts_with(s.as_bytes()),
            Terminator::Suffix(s) => data.ends_with(s.as_bytes()),
            Terminator::Contains(s) => memmem::find(data, s.as_bytes()).is_some(),
        }
    }
}

/// Check whether any of `terminators` matches `data`.
pub fn any_match(data: &[u8], terminators: &[Terminator]) -> bool {
    terminators.iter().any(|t| t.is_match(data))
}

/// Check whether `text` satisfies any of the caller-facing `patterns`.
///
/// Empty patterns never match.
pub fn matches<S: AsRef<str>>(text: &str, patterns: &[S]) -> bool {
    any_match(text.as_bytes(), &Terminator::parse_all(patterns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(Terminator::parse("^foo"), vec![Terminator::Prefix("foo".into())]);
        assert_eq!(Terminator::parse("bar$"), vec![Terminator::Suffix("bar".into())]);
        assert_eq!(Terminator::parse("> "), vec![Terminator::Contains("> ".into())]);
        assert!(Terminator::parse("").is_empty());
    }

    #[test]
    fn test_parse_both_anchors() {
        assert_eq!(
            Terminator::parse("^ok$"),
            vec![
                Terminator::Prefix("ok$".into()),
                Terminator::Suffix("^ok".into()),
            ]
        );
    }

    #[test]
    fn test_bare_anchors_match_anything() {
        assert_eq!(Terminator::parse("$"), vec![Terminator::Suffix(String::new())]);
        assert_eq!(Terminator::parse("^"), vec![Terminator::Prefix(String::new())]);
        assert!(matches("root@host:~# ", &["$"]));
        assert!(matches("anything", &["^"]));
        assert!(matches("", &["$"]));
    }

    #[test]
    fn test_substring_match() {
        assert!(matches("some output\n> ", &["> "]));
        assert!(matches("a > b", &["> "]));
        assert!(!matches("abc", &["> "]));
    }

    #[test]
    fn test_prefix_anchor_only_checks_start() {
        assert!(matches("foobar", &["^foo"]));
        assert!(!matches("xfoo", &["^foo"]));
        // The literal pattern text is not a substring fallback
        assert!(!matches("x^foo", &["^foo"]));
    }

    #[test]
    fn test_suffix_anchor_only_checks_end() {
        assert!(matches("foobar", &["bar$"]));
        assert!(!matches("barfoo", &["bar$"]));
        assert!(!matches("bar$x", &["bar$"]));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        assert!(!matches("anything", &[""]));
        assert!(!matches("", &[""]));
        assert!(matches("anything", &["", "thing"]));
    }

    #[test]
    fn test_any_pattern_is_enough() {
        let patterns = ["Linux", "Darwin", "#"];
        assert!(matches("Darwin\r\n", &patterns));
        assert!(matches("root# ", &patterns));
        assert!(!matches("FreeBSD\r\n", &patterns));
        // A bare suffix anchor accepts whatever arrived
        assert!(matches("FreeBSD\r\n% ", &["Linux", "Darwin", "$", "#"]));
    }

    #[test]
    fn test_is_match() {
        let data = b"abc> def";
        assert!(Terminator::Contains("> ".into()).is_match(data));
        assert!(Terminator::Prefix("ab".into()).is_match(data));
        assert!(Terminator::Suffix("def".into()).is_match(data));
        assert!(!Terminator::Suffix("abc".into()).is_match(data));
    }
}
