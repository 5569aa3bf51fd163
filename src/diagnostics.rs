use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Io,
    Config,
    Lex,
    Parse,
    Load,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Io => "E-IO",
            Code::Config => "E-CONFIG",
            Code::Lex => "E-LEX",
            Code::Parse => "E-PARSE",
            Code::Load => "E-LOAD",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Code::Io => "check the input path and read permissions",
            Code::Config => "check the [[syntax]] delimiters and default_syntax in askama.toml",
            Code::Lex => "look for an unterminated string, comment or tag",
            Code::Parse => "check the statement keyword and expression syntax inside the tag",
            Code::Load => "the grammar accessor returned no grammar; rebuild the grammar artifact",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<&str> for Code {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Byte range in a template plus the 1-based line and column of its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn locate(src: &str, range: Range<usize>) -> Self {
        let before = src.get(..range.start).unwrap_or_default();
        let line_start = before.rfind('\n').map_or(0, |nl| nl + 1);
        Self {
            start: range.start,
            end: range.end,
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: Code,
    pub message: String,
    pub span: Option<Span>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            span: None,
            source: None,
        }
    }

    pub fn at(code: Code, message: impl Into<String>, src: &str, range: Range<usize>) -> Self {
        Self {
            span: Some(Span::locate(src, range)),
            ..Self::new(code, message)
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = self.source() {
            write!(f, "{source}: ")?;
        }
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(span) = &self.span {
            write!(f, " at {}:{}", span.line, span.column)?;
        }
        write!(f, " (hint: {})", self.code.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_counts_columns_in_chars() {
        let span = Span::locate("ab\né{{ x", 5..7);
        assert_eq!((span.line, span.column), (2, 2));
    }

    #[test]
    fn display_includes_source_position_and_hint() {
        let diag = Diagnostic::at(Code::Lex, "unclosed tag", "\n{{", 1..3).with_source("a.html");
        assert_eq!(
            diag.to_string(),
            "a.html: E-LEX: unclosed tag at 2:1 (hint: look for an unterminated string, comment or tag)"
        );
    }
}
