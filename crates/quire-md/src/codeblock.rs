//! Fenced code block classification.

use syntect::parsing::SyntaxSet;

/// How a fenced code block is rendered, decided by its language tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceKind {
    /// A language the highlighter knows; rendered token by token.
    Source(String),
    /// Shell transcript, wrapped in `<div class="shell">`.
    Shell,
    /// Command output, wrapped in `<div class="output">`.
    Output,
    /// Untagged or unknown language; default rendering.
    Plain,
}

impl FenceKind {
    /// Classify a code fence info string.
    ///
    /// Only the first word of the info string is the language tag.
    pub fn from_info(info: &str, syntaxes: &SyntaxSet) -> Self {
        let lang = language_tag(info);
        match lang {
            "" => Self::Plain,
            "shell" => Self::Shell,
            "output" => Self::Output,
            _ if syntaxes.find_syntax_by_token(lang).is_some() => Self::Source(lang.to_string()),
            _ => Self::Plain,
        }
    }

    /// Whether the block gets the token-level highlighter.
    pub fn is_highlighted(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// CSS class of the wrapping `<div>`, if any.
    pub fn wrapper_class(&self) -> Option<&'static str> {
        match self {
            Self::Shell => Some("shell"),
            Self::Output => Some("output"),
            _ => None,
        }
    }
}

/// First word of a fence info string.
pub fn language_tag(info: &str) -> &str {
    info.split_whitespace().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fences() {
        let syntaxes = SyntaxSet::load_defaults_newlines();

        assert_eq!(FenceKind::from_info("shell", &syntaxes), FenceKind::Shell);
        assert_eq!(FenceKind::from_info("output", &syntaxes), FenceKind::Output);
        assert_eq!(FenceKind::from_info("", &syntaxes), FenceKind::Plain);
        assert_eq!(
            FenceKind::from_info("rust ignore", &syntaxes),
            FenceKind::Source("rust".to_string())
        );
        assert_eq!(
            FenceKind::from_info("go", &syntaxes),
            FenceKind::Source("go".to_string())
        );
        assert_eq!(FenceKind::from_info("no-such-lang", &syntaxes), FenceKind::Plain);
    }

    #[test]
    fn wrapper_classes() {
        assert_eq!(FenceKind::Shell.wrapper_class(), Some("shell"));
        assert_eq!(FenceKind::Output.wrapper_class(), Some("output"));
        assert_eq!(FenceKind::Plain.wrapper_class(), None);
        assert!(FenceKind::Source("rs".into()).is_highlighted());
        assert!(!FenceKind::Shell.is_highlighted());
    }

    #[test]
    fn takes_first_word_as_language() {
        assert_eq!(language_tag("rust,ignore extra"), "rust,ignore");
        assert_eq!(language_tag("  python  "), "python");
        assert_eq!(language_tag(""), "");
    }
}
