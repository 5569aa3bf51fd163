use crate::diagnostics::{Code, Diagnostic};
use crate::scanner::scan_nested_comment;
use crate::syntax::Syntax;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Block,
    Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whitespace {
    Suppress,
    Preserve,
    Minimize,
}

impl Whitespace {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '-' => Some(Whitespace::Suppress),
            '+' => Some(Whitespace::Preserve),
            '~' => Some(Whitespace::Minimize),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Punct(&'static str),
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        &src[self.start..self.end]
    }

    pub fn is_punct(&self, p: &str) -> bool {
        matches!(self.kind, TokenKind::Punct(q) if q == p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    pub start: usize,
    pub end: usize,
    pub whitespace: Option<Whitespace>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub kind: TagKind,
    pub open: Delimiter,
    pub tokens: Vec<Token>,
    pub close: Option<Delimiter>,
    pub end: usize,
    pub error: Option<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Content {
        start: usize,
        end: usize,
    },
    Comment {
        start: usize,
        close: Option<usize>,
        end: usize,
    },
    Tag(Tag),
}

const PUNCTUATION: &[&str] = &[
    "..=", "..", "::", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%",
    "!", "&", "|", "~", "(", ")", "[", "]", ",", ".", "=",
];

pub fn lex_template(src: &str, syntax: &Syntax) -> Vec<Item> {
    let mut items = Vec::new();
    let mut i = 0usize;

    while i < src.len() {
        let rest = &src[i..];
        if rest.starts_with(syntax.comment_start.as_str()) {
            let body = i + syntax.comment_start.len();
            match scan_nested_comment(src, body, &syntax.comment_start, &syntax.comment_end) {
                Some(close) => {
                    let end = close + syntax.comment_end.len();
                    items.push(Item::Comment {
                        start: i,
                        close: Some(close),
                        end,
                    });
                    i = end;
                }
                None => {
                    items.push(Item::Comment {
                        start: i,
                        close: None,
                        end: src.len(),
                    });
                    i = src.len();
                }
            }
            continue;
        }
        if rest.starts_with(syntax.block_start.as_str()) {
            let tag = lex_tag(src, i, TagKind::Block, &syntax.block_start, &syntax.block_end);
            i = tag.end;
            items.push(Item::Tag(tag));
            continue;
        }
        if rest.starts_with(syntax.expr_start.as_str()) {
            let tag = lex_tag(src, i, TagKind::Expr, &syntax.expr_start, &syntax.expr_end);
            i = tag.end;
            items.push(Item::Tag(tag));
            continue;
        }

        let end = content_end(src, i, syntax);
        let text = &src[i..end];
        let trimmed = text.trim_start();
        if !trimmed.is_empty() {
            items.push(Item::Content {
                start: end - trimmed.len(),
                end,
            });
        }
        i = end;
    }

    items
}

fn starts_tag(src: &str, at: usize, syntax: &Syntax) -> bool {
    let rest = &src[at..];
    rest.starts_with(syntax.block_start.as_str())
        || rest.starts_with(syntax.expr_start.as_str())
        || rest.starts_with(syntax.comment_start.as_str())
}

// Content tokens follow `[^{]+|\{[^{#%]` generalized to the opener lead
// characters: a run up to the next lead, or a lone lead plus the char after it.
fn content_end(src: &str, from: usize, syntax: &Syntax) -> usize {
    let leads = [
        syntax.block_start.chars().next(),
        syntax.expr_start.chars().next(),
        syntax.comment_start.chars().next(),
    ];
    let is_lead = |c: char| leads.contains(&Some(c));

    let mut chars = src[from..].char_indices();
    let Some((_, first)) = chars.next() else {
        return src.len();
    };
    if is_lead(first) {
        let after = from + first.len_utf8();
        return match src[after..].chars().next() {
            Some(next) if !starts_tag(src, after, syntax) => after + next.len_utf8(),
            _ => after,
        };
    }
    chars
        .find(|&(_, c)| is_lead(c))
        .map_or(src.len(), |(off, _)| from + off)
}

fn lex_tag(src: &str, start: usize, kind: TagKind, open: &str, close: &str) -> Tag {
    let mut i = start + open.len();
    let whitespace = src[i..].chars().next().and_then(Whitespace::from_char);
    if whitespace.is_some() {
        i += 1;
    }
    let open = Delimiter {
        start,
        end: i,
        whitespace,
    };

    let mut tokens = Vec::new();
    let mut error = None;
    let bytes = src.as_bytes();

    while i < src.len() {
        let rest = &src[i..];
        let ch = match rest.chars().next() {
            Some(ch) => ch,
            None => break,
        };

        if ch.is_whitespace() {
            i += ch.len_utf8();
            continue;
        }

        if let Some(delim) = match_close(src, i, close) {
            return Tag {
                kind,
                open,
                tokens,
                close: Some(delim),
                end: delim.end,
                error,
            };
        }

        if ch == '"' {
            match scan_string(bytes, i) {
                Some(end) => {
                    tokens.push(Token {
                        kind: TokenKind::Str,
                        start: i,
                        end,
                    });
                    i = end;
                }
                None => {
                    error.get_or_insert_with(|| {
                        Diagnostic::at(Code::Lex, "unterminated string literal", src, i..src.len())
                    });
                    // Resume at the closer the string swallowed, if any.
                    let resume = src[i + 1..]
                        .find(close)
                        .map(|off| i + 1 + off)
                        .unwrap_or(src.len());
                    tokens.push(Token {
                        kind: TokenKind::Unknown,
                        start: i,
                        end: resume,
                    });
                    i = resume;
                }
            }
            continue;
        }

        if ch.is_ascii_digit() {
            let after_dot = tokens.last().is_some_and(|t: &Token| t.is_punct("."));
            let end = scan_number(bytes, i, !after_dot);
            tokens.push(Token {
                kind: TokenKind::Number,
                start: i,
                end,
            });
            i = end;
            continue;
        }

        if is_ident_start(ch) {
            let end = rest
                .char_indices()
                .find(|&(_, c)| !is_ident_continue(c))
                .map_or(src.len(), |(off, _)| i + off);
            tokens.push(Token {
                kind: TokenKind::Ident,
                start: i,
                end,
            });
            i = end;
            continue;
        }

        if let Some(p) = PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            tokens.push(Token {
                kind: TokenKind::Punct(*p),
                start: i,
                end: i + p.len(),
            });
            i += p.len();
            continue;
        }

        tokens.push(Token {
            kind: TokenKind::Unknown,
            start: i,
            end: i + ch.len_utf8(),
        });
        i += ch.len_utf8();
    }

    let error =
        error.unwrap_or_else(|| Diagnostic::at(Code::Lex, "unclosed tag", src, start..open.end));
    Tag {
        kind,
        open,
        tokens,
        close: None,
        end: src.len(),
        error: Some(error),
    }
}

fn match_close(src: &str, i: usize, close: &str) -> Option<Delimiter> {
    let rest = &src[i..];
    if rest.starts_with(close) {
        return Some(Delimiter {
            start: i,
            end: i + close.len(),
            whitespace: None,
        });
    }
    let whitespace = rest.chars().next().and_then(Whitespace::from_char)?;
    if rest[1..].starts_with(close) {
        return Some(Delimiter {
            start: i,
            end: i + 1 + close.len(),
            whitespace: Some(whitespace),
        });
    }
    None
}

fn scan_string(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn scan_number(bytes: &[u8], start: usize, allow_fraction: bool) -> usize {
    let digits = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = digits(start);
    if !allow_fraction {
        return i;
    }
    if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
        i = digits(i + 1);
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            i = digits(j);
        }
    }
    i
}

fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_continue(c)
}
