use thiserror::Error;
use tracing::debug;

use crate::diagnostics::{Code, Diagnostic};
use crate::language::{ABI_VERSION, Language, language};
use crate::lexer::{Delimiter, Item, Tag, TagKind, Token, TokenKind, Whitespace, lex_template};
use crate::syntax::Syntax;
use crate::tree::{Node, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no language is set on the parser")]
    NoLanguage,
    #[error("incompatible grammar ABI version {found} (expected {expected})")]
    IncompatibleLanguage { found: u32, expected: u32 },
}

mod prec {
    pub const CALLS: u8 = 14;
    pub const FIELD: u8 = 12;
    pub const UNARY: u8 = 11;
    pub const FILTER: u8 = 10;
    pub const MULTIPLICATIVE: u8 = 9;
    pub const ADDITIVE: u8 = 8;
    pub const BITAND: u8 = 7;
    pub const XOR: u8 = 6;
    pub const BITOR: u8 = 5;
    pub const COMPARATIVE: u8 = 4;
    pub const AND: u8 = 3;
    pub const OR: u8 = 2;
    pub const RANGE: u8 = 1;
}

#[derive(Debug, Clone, Default)]
pub struct Parser {
    language: Option<Language>,
    syntax: Syntax,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_language(&mut self, language: &Language) -> Result<(), ParseError> {
        if language.abi_version() != ABI_VERSION {
            return Err(ParseError::IncompatibleLanguage {
                found: language.abi_version(),
                expected: ABI_VERSION,
            });
        }
        self.language = Some(*language);
        Ok(())
    }

    pub fn set_syntax(&mut self, syntax: Syntax) {
        self.syntax = syntax;
    }

    /// Malformed tags and comments become `ERROR` nodes reported by
    /// [`Tree::errors`]; only a missing language fails the parse.
    pub fn parse(&mut self, src: &str) -> Result<Tree, ParseError> {
        let language = self.language.ok_or(ParseError::NoLanguage)?;
        let items = lex_template(src, &self.syntax);

        let mut children = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for item in &items {
            match parse_item(src, item, &self.syntax) {
                Ok(node) => children.push(node),
                Err((node, diag)) => {
                    children.push(node);
                    errors.push(diag);
                }
            }
        }

        let root = Node::branch("source", children).with_span(0, src.len());
        debug!(
            syntax = %self.syntax.name,
            items = items.len(),
            errors = errors.len(),
            "parsed template"
        );
        Ok(Tree::new(language, root, errors))
    }
}

pub fn parse_template(src: &str) -> Result<Tree, Vec<Diagnostic>> {
    parse_template_with_syntax(src, &Syntax::default())
}

pub fn parse_template_with_syntax(src: &str, syntax: &Syntax) -> Result<Tree, Vec<Diagnostic>> {
    let mut parser = Parser::new();
    parser
        .set_language(&language())
        .map_err(|err| vec![Diagnostic::new(Code::Load, err.to_string())])?;
    parser.set_syntax(syntax.clone());
    let tree = parser
        .parse(src)
        .map_err(|err| vec![Diagnostic::new(Code::Load, err.to_string())])?;
    if tree.has_error() {
        Err(tree.errors().to_vec())
    } else {
        Ok(tree)
    }
}

fn parse_item(src: &str, item: &Item, syntax: &Syntax) -> Result<Node, (Node, Diagnostic)> {
    match item {
        Item::Content { start, end } => Ok(Node::leaf("content", true, *start, *end)),
        Item::Comment {
            start,
            close: Some(close),
            end,
        } => Ok(Node::branch(
            "comment",
            vec![
                Node::token("{#", *start, start + syntax.comment_start.len()),
                Node::token("#}", *close, *end),
            ],
        )),
        Item::Comment {
            start,
            close: None,
            end,
        } => Err((
            Node::error(*start, *end),
            Diagnostic::at(
                Code::Lex,
                "unclosed comment",
                src,
                *start..start + syntax.comment_start.len(),
            ),
        )),
        Item::Tag(tag) => parse_tag(src, tag),
    }
}

fn parse_tag(src: &str, tag: &Tag) -> Result<Node, (Node, Diagnostic)> {
    let error_node = || Node::error(tag.open.start, tag.end);
    if let Some(diag) = &tag.error {
        return Err((error_node(), diag.clone()));
    }
    let Some(close) = tag.close else {
        let diag = Diagnostic::at(Code::Lex, "unclosed tag", src, tag.open.start..tag.open.end);
        return Err((error_node(), diag));
    };

    let mut p = TagParser {
        src,
        tokens: &tag.tokens,
        pos: 0,
        end: close.start,
        depth: 0,
    };
    let (kind, body) = match tag.kind {
        TagKind::Block => ("control_tag", p.statement()),
        TagKind::Expr => ("render_expression", p.expression()),
    };
    let body = body.and_then(|node| p.finish().map(|()| node));

    match body {
        Ok(node) => Ok(Node::branch(
            kind,
            vec![
                Node::token(open_kind(tag.kind, tag.open), tag.open.start, tag.open.end),
                node,
                Node::token(close_kind(tag.kind, close), close.start, close.end),
            ],
        )),
        Err(diag) => Err((error_node(), diag)),
    }
}

fn open_kind(kind: TagKind, delim: Delimiter) -> &'static str {
    match (kind, delim.whitespace) {
        (TagKind::Block, None) => "{%",
        (TagKind::Block, Some(Whitespace::Suppress)) => "{%-",
        (TagKind::Block, Some(Whitespace::Preserve)) => "{%+",
        (TagKind::Block, Some(Whitespace::Minimize)) => "{%~",
        (TagKind::Expr, None) => "{{",
        (TagKind::Expr, Some(Whitespace::Suppress)) => "{{-",
        (TagKind::Expr, Some(Whitespace::Preserve)) => "{{+",
        (TagKind::Expr, Some(Whitespace::Minimize)) => "{{~",
    }
}

fn close_kind(kind: TagKind, delim: Delimiter) -> &'static str {
    match (kind, delim.whitespace) {
        (TagKind::Block, None) => "%}",
        (TagKind::Block, Some(Whitespace::Suppress)) => "-%}",
        (TagKind::Block, Some(Whitespace::Preserve)) => "+%}",
        (TagKind::Block, Some(Whitespace::Minimize)) => "~%}",
        (TagKind::Expr, None) => "}}",
        (TagKind::Expr, Some(Whitespace::Suppress)) => "-}}",
        (TagKind::Expr, Some(Whitespace::Preserve)) => "+}}",
        (TagKind::Expr, Some(Whitespace::Minimize)) => "~}}",
    }
}

type PResult<T> = Result<T, Diagnostic>;

const KEYWORDS: &[&str] = &[
    "block", "endblock", "filter", "endfilter", "extends", "include", "import", "as", "let",
    "set", "mut", "for", "in", "endfor", "if", "elif", "else", "endif", "match", "endmatch",
    "when", "endwhen", "with", "macro", "endmacro", "call", "endcall", "is", "defined", "true",
    "false", "xor", "bitor", "bitand",
];

fn keyword(text: &str) -> Option<&'static str> {
    KEYWORDS.iter().copied().find(|kw| *kw == text)
}

// Bounds both the recursion of the tag parser and the depth of the nodes it
// builds, so nesting past it fails the tag instead of the process.
const MAX_NESTING: usize = 128;

struct TagParser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    pos: usize,
    // offset of the tag closer
    end: usize,
    depth: usize,
}

impl<'a> TagParser<'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<Token> {
        self.tokens.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    fn text(&self, tok: Token) -> &'a str {
        tok.text(self.src)
    }

    fn at_punct(&self, p: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(p))
    }

    fn at_punct_n(&self, n: usize, p: &str) -> bool {
        self.peek_at(n).is_some_and(|t| t.is_punct(p))
    }

    fn at_word(&self, word: &str) -> bool {
        self.at_word_n(0, word)
    }

    fn at_word_n(&self, n: usize, word: &str) -> bool {
        self.peek_at(n)
            .is_some_and(|t| t.kind == TokenKind::Ident && self.text(t) == word)
    }

    fn at_ident(&self) -> bool {
        self.peek().is_some_and(|t| t.kind == TokenKind::Ident)
    }

    fn error_here(&self, message: impl Into<String>) -> Diagnostic {
        let (start, end) = match self.peek() {
            Some(tok) => (tok.start, tok.end),
            None => (self.end, self.end),
        };
        Diagnostic::at(Code::Parse, message, self.src, start..end)
    }

    fn nest(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_here("expression nested too deeply"));
        }
        Ok(())
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::Unknown => self.error_here(format!(
                "unexpected character '{}'",
                self.text(tok)
            )),
            Some(tok) => self.error_here(format!(
                "expected {expected}, found '{}'",
                self.text(tok)
            )),
            None => self.error_here(format!("expected {expected}, found end of tag")),
        }
    }

    fn finish(&self) -> PResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of tag")),
        }
    }

    fn punct(&mut self, p: &'static str) -> PResult<Node> {
        match self.peek() {
            Some(tok) if tok.is_punct(p) => {
                self.pos += 1;
                Ok(Node::token(p, tok.start, tok.end))
            }
            _ => Err(self.unexpected(&format!("'{p}'"))),
        }
    }

    fn word(&mut self, word: &'static str) -> PResult<Node> {
        if self.at_word(word) {
            let tok = self.bump().ok_or_else(|| self.unexpected(word))?;
            Ok(Node::token(word, tok.start, tok.end))
        } else {
            Err(self.unexpected(&format!("'{word}'")))
        }
    }

    fn identifier(&mut self) -> PResult<Node> {
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::Ident => {
                self.pos += 1;
                Ok(Node::leaf("identifier", true, tok.start, tok.end))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn string_literal(&mut self) -> PResult<Node> {
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::Str => {
                self.pos += 1;
                Ok(Node::leaf("string_literal", true, tok.start, tok.end))
            }
            _ => Err(self.unexpected("string literal")),
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> PResult<Node> {
        let Some(head) = self.peek() else {
            return Err(self.error_here("empty block tag"));
        };
        let kw = match head.kind {
            TokenKind::Ident => keyword(self.text(head)),
            _ => None,
        };
        let Some(kw) = kw else {
            return Err(self.unexpected("statement keyword"));
        };

        match kw {
            "block" => {
                let kw = self.word("block")?;
                let name = self.identifier()?.with_field("name");
                Ok(Node::branch("block_statement", vec![kw, name]))
            }
            "endblock" => self.end_with_optional_name("endblock", "endblock_statement"),
            "filter" => {
                let mut children = vec![self.word("filter")?];
                children.push(self.filter()?.with_field("filters"));
                while self.at_punct("|") {
                    children.push(self.punct("|")?);
                    children.push(self.filter()?.with_field("filters"));
                }
                Ok(Node::branch("filter_statement", children))
            }
            "endfilter" => self.bare("endfilter", "endfilter_statement"),
            "extends" | "include" => {
                let node_kind = if kw == "extends" {
                    "extends_statement"
                } else {
                    "include_statement"
                };
                let kw = self.word(kw)?;
                let path = self.string_literal()?;
                Ok(Node::branch(node_kind, vec![kw, path]))
            }
            "import" => {
                let kw = self.word("import")?;
                let path = self.string_literal()?.with_field("path");
                let as_kw = self.word("as")?;
                let alias = self.identifier()?.with_field("alias");
                Ok(Node::branch("import_statement", vec![kw, path, as_kw, alias]))
            }
            "let" | "set" => {
                let mut children = vec![self.word(kw)?];
                if self.at_word("mut") {
                    children.push(self.word("mut")?);
                }
                children.push(self.pattern()?.with_field("pattern"));
                if self.at_punct("=") {
                    children.push(self.punct("=")?);
                    children.push(self.expression()?.with_field("value"));
                }
                Ok(Node::branch("let_statement", children))
            }
            "for" => {
                let kw = self.word("for")?;
                let pattern = self.pattern()?.with_field("pattern");
                let in_kw = self.word("in")?;
                let value = self.expression()?.with_field("value");
                Ok(Node::branch("for_statement", vec![kw, pattern, in_kw, value]))
            }
            "endfor" => self.bare("endfor", "endfor_statement"),
            "if" => {
                let kw = self.word("if")?;
                let condition = if self.at_word("let") {
                    self.let_condition()?
                } else {
                    self.expression()?
                };
                Ok(Node::branch(
                    "if_statement",
                    vec![kw, condition.with_field("condition")],
                ))
            }
            "else" if self.at_word_n(1, "if") => {
                let else_tok = self.bump().ok_or_else(|| self.unexpected("else"))?;
                let if_tok = self.bump().ok_or_else(|| self.unexpected("if"))?;
                let kw = Node::token("else if", else_tok.start, if_tok.end);
                let condition = self.expression()?.with_field("condition");
                Ok(Node::branch("else_if_statement", vec![kw, condition]))
            }
            "elif" => {
                let kw = self.word("elif")?;
                let condition = self.expression()?.with_field("condition");
                Ok(Node::branch("else_if_statement", vec![kw, condition]))
            }
            "else" => self.bare("else", "else_statement"),
            "endif" => self.bare("endif", "endif_statement"),
            "match" => {
                let kw = self.word("match")?;
                let value = self.expression()?.with_field("value");
                Ok(Node::branch("match_statement", vec![kw, value]))
            }
            "endmatch" => self.bare("endmatch", "endmatch_statement"),
            "when" => {
                let kw = self.word("when")?;
                let pattern = self.match_pattern()?.with_field("pattern");
                Ok(Node::branch("when_statement", vec![kw, pattern]))
            }
            "endwhen" => self.bare("endwhen", "endwhen_statement"),
            "macro" => {
                let kw = self.word("macro")?;
                let name = self.identifier()?.with_field("name");
                let arguments = self.arguments("arguments")?.with_field("arguments");
                Ok(Node::branch("macro_statement", vec![kw, name, arguments]))
            }
            "endmacro" => self.end_with_optional_name("endmacro", "endmacro_statement"),
            "call" => self.macro_call_statement(),
            "endcall" => self.bare("endcall", "endcall_statement"),
            other => Err(self.error_here(format!("unknown statement '{other}'"))),
        }
    }

    fn bare(&mut self, word: &'static str, node_kind: &'static str) -> PResult<Node> {
        let tok = self.word(word)?;
        Ok(Node::leaf(node_kind, true, tok.start_byte(), tok.end_byte()))
    }

    fn end_with_optional_name(
        &mut self,
        word: &'static str,
        node_kind: &'static str,
    ) -> PResult<Node> {
        let mut children = vec![self.word(word)?];
        if self.at_ident() {
            children.push(self.identifier()?.with_field("name"));
        }
        Ok(Node::branch(node_kind, children))
    }

    fn let_condition(&mut self) -> PResult<Node> {
        let kw = self.word("let")?;
        let pattern = self.pattern()?.with_field("pattern");
        let eq = self.punct("=")?;
        let value = self.expression()?.with_field("value");
        Ok(Node::branch("let_condition", vec![kw, pattern, eq, value]))
    }

    fn macro_call_statement(&mut self) -> PResult<Node> {
        let mut children = vec![self.word("call")?];
        if self.at_punct("(") {
            children.push(self.punct("(")?);
            children.push(self.identifier()?.with_field("arguments"));
            while self.at_punct(",") {
                children.push(self.punct(",")?);
                children.push(self.identifier()?.with_field("arguments"));
            }
            children.push(self.punct(")")?);
        }
        let call = self.expression()?;
        if call.kind() != "call_expression" {
            return Err(Diagnostic::at(
                Code::Parse,
                "call expects a macro call such as `name(args)`",
                self.src,
                call.start_byte()..call.end_byte(),
            ));
        }
        children.push(call);
        Ok(Node::branch("macro_call_statement", children))
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult<Node> {
        self.expr_bp(0)
    }

    fn expr_bp(&mut self, min_prec: u8) -> PResult<Node> {
        let base = self.depth;
        let mut lhs = self.prefix()?;

        while let Some(tok) = self.peek() {
            if let Some((op_prec, op)) = self.binary_operator(tok) {
                if op_prec < min_prec {
                    break;
                }
                self.nest()?;
                self.pos += 1;
                let op = Node::token(op, tok.start, tok.end).with_field("operator");
                let rhs = self.expr_bp(op_prec + 1)?;
                lhs = Node::branch(
                    "binary_expression",
                    vec![lhs.with_field("left"), op, rhs.with_field("right")],
                );
                continue;
            }

            let is_range = lhs.kind() == "range_expression";
            match tok.kind {
                TokenKind::Punct("(") if !is_range && prec::CALLS >= min_prec => {
                    self.nest()?;
                    let arguments = self.arguments("arguments")?.with_field("arguments");
                    lhs = Node::branch(
                        "call_expression",
                        vec![lhs.with_field("function"), arguments],
                    );
                }
                TokenKind::Punct("[") if prec::CALLS >= min_prec => {
                    self.nest()?;
                    let open = self.punct("[")?;
                    let index = self.expression()?;
                    let close = self.punct("]")?;
                    lhs = Node::branch("index_expression", vec![lhs, open, index, close]);
                }
                TokenKind::Punct(".") if prec::FIELD >= min_prec => {
                    self.nest()?;
                    let dot = self.punct(".")?;
                    let field = match self.peek() {
                        Some(t) if t.kind == TokenKind::Ident => {
                            self.pos += 1;
                            Node::leaf("field_identifier", true, t.start, t.end)
                        }
                        Some(t) if t.kind == TokenKind::Number => {
                            self.pos += 1;
                            Node::leaf("number_literal", true, t.start, t.end)
                        }
                        _ => return Err(self.unexpected("field name")),
                    };
                    lhs = Node::branch(
                        "field_access_expression",
                        vec![lhs.with_field("value"), dot, field.with_field("field")],
                    );
                }
                TokenKind::Punct("|") if prec::FILTER >= min_prec => {
                    self.nest()?;
                    let chain = self.filter_chain()?.with_field("filters");
                    lhs = Node::branch("filter_expression", vec![lhs.with_field("value"), chain]);
                }
                TokenKind::Punct(p @ ("..=" | "..")) if prec::RANGE >= min_prec => {
                    self.nest()?;
                    let op = self.punct(p)?;
                    if p == ".." && !self.starts_expression() {
                        lhs = Node::branch("range_expression", vec![lhs, op]);
                    } else {
                        let rhs = self.expr_bp(prec::RANGE + 1)?;
                        lhs = Node::branch("range_expression", vec![lhs, op, rhs]);
                    }
                }
                _ => break,
            }
        }

        self.depth = base;
        Ok(lhs)
    }

    fn binary_operator(&self, tok: Token) -> Option<(u8, &'static str)> {
        match tok.kind {
            TokenKind::Punct(p) => {
                let level = match p {
                    "||" => prec::OR,
                    "&&" => prec::AND,
                    "==" | "!=" | "<" | "<=" | ">" | ">=" => prec::COMPARATIVE,
                    "+" | "-" => prec::ADDITIVE,
                    "*" | "/" | "%" => prec::MULTIPLICATIVE,
                    _ => return None,
                };
                Some((level, p))
            }
            TokenKind::Ident => match self.text(tok) {
                "xor" => Some((prec::XOR, "xor")),
                "bitor" => Some((prec::BITOR, "bitor")),
                "bitand" => Some((prec::BITAND, "bitand")),
                _ => None,
            },
            _ => None,
        }
    }

    fn starts_expression(&self) -> bool {
        let Some(tok) = self.peek() else {
            return false;
        };
        match tok.kind {
            TokenKind::Ident => !matches!(self.text(tok), "xor" | "bitor" | "bitand"),
            TokenKind::Number | TokenKind::Str => true,
            TokenKind::Punct("(" | "[" | "*" | "!" | "&" | "::") => true,
            TokenKind::Punct("-") => self
                .peek_at(1)
                .is_some_and(|t| t.kind == TokenKind::Number),
            _ => false,
        }
    }

    fn prefix(&mut self) -> PResult<Node> {
        self.nest()?;
        let node = self.prefix_operand()?;
        self.depth -= 1;
        Ok(node)
    }

    fn prefix_operand(&mut self) -> PResult<Node> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected("expression"));
        };
        match tok.kind {
            TokenKind::Punct(op @ ("*" | "!")) => {
                let op = self.punct(op)?;
                let operand = self.expr_bp(prec::UNARY)?;
                Ok(Node::branch("unary_expression", vec![op, operand]))
            }
            TokenKind::Punct("&") => {
                let op = self.punct("&")?;
                let value = self.expr_bp(prec::UNARY)?.with_field("value");
                Ok(Node::branch("reference_expression", vec![op, value]))
            }
            TokenKind::Punct("..") => {
                let op = self.punct("..")?;
                if self.starts_expression() {
                    let rhs = self.expr_bp(prec::RANGE + 1)?;
                    Ok(Node::branch("range_expression", vec![op, rhs]))
                } else {
                    Ok(Node::branch("range_expression", vec![op]))
                }
            }
            TokenKind::Punct("-") => match self.peek_at(1) {
                Some(num) if num.kind == TokenKind::Number => {
                    self.pos += 2;
                    let literal = Node::hidden(
                        "_negative_literal",
                        vec![
                            Node::token("-", tok.start, tok.end),
                            Node::leaf("number_literal", true, num.start, num.end),
                        ],
                    );
                    self.primary_suffix(literal)
                }
                _ => Err(self.unexpected("expression")),
            },
            TokenKind::Punct("(") => self.parenthesized_or_tuple(),
            TokenKind::Punct("[") => self.array_expression(),
            TokenKind::Punct("::") => {
                let path = self.path_tail(None)?;
                self.after_path(path)
            }
            TokenKind::Str => {
                let lit = self.string_literal()?;
                self.primary_suffix(lit)
            }
            TokenKind::Number => {
                self.pos += 1;
                self.primary_suffix(Node::leaf("number_literal", true, tok.start, tok.end))
            }
            TokenKind::Ident => match self.text(tok) {
                "true" | "false" => {
                    self.pos += 1;
                    self.primary_suffix(Node::leaf("boolean_literal", true, tok.start, tok.end))
                }
                _ => self.identifier_expression(),
            },
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `is [not] defined` after a literal or identifier.
    fn primary_suffix(&mut self, primary: Node) -> PResult<Node> {
        if !self.at_word("is") {
            return Ok(primary);
        }
        let is_tok = self.bump().ok_or_else(|| self.unexpected("is"))?;
        let op = if self.at_word("not") {
            let not_tok = self.bump().ok_or_else(|| self.unexpected("not"))?;
            Node::token("is not", is_tok.start, not_tok.end)
        } else {
            Node::token("is", is_tok.start, is_tok.end)
        };
        let defined = self.word("defined")?;
        Ok(Node::branch("is_defined_expression", vec![primary, op, defined]))
    }

    fn identifier_expression(&mut self) -> PResult<Node> {
        let ident = self.identifier()?;
        if self.at_punct("::") {
            let path = self.path_tail(Some(ident))?;
            return self.after_path(path);
        }
        if self.at_punct("~") {
            let mut children = vec![ident];
            while self.at_punct("~") {
                children.push(self.punct("~")?);
                children.push(self.identifier()?);
            }
            return Ok(Node::branch("string_concatenation", children));
        }
        if self.at_punct("!") && self.at_punct_n(1, "(") {
            return self.macro_invocation(ident);
        }
        self.primary_suffix(ident)
    }

    fn path_tail(&mut self, path: Option<Node>) -> PResult<Node> {
        let base = self.depth;
        let mut current = path;
        loop {
            self.nest()?;
            let sep = self.punct("::")?;
            let name = self.identifier()?.with_field("name");
            let mut children = Vec::with_capacity(3);
            if let Some(prefix) = current.take() {
                children.push(prefix.with_field("path"));
            }
            children.push(sep);
            children.push(name);
            let node = Node::branch("path_expression", children);
            if !self.at_punct("::") {
                self.depth = base;
                return Ok(node);
            }
            current = Some(node);
        }
    }

    fn after_path(&mut self, path: Node) -> PResult<Node> {
        if self.at_punct("!") && self.at_punct_n(1, "(") {
            self.macro_invocation(path)
        } else {
            Ok(path)
        }
    }

    fn macro_invocation(&mut self, name: Node) -> PResult<Node> {
        let bang = self.punct("!")?;
        let tree = self.arguments("token_tree")?;
        Ok(Node::branch(
            "macro_invocation",
            vec![name.with_field("macro"), bang, tree],
        ))
    }

    fn parenthesized_or_tuple(&mut self) -> PResult<Node> {
        let open = self.punct("(")?;
        let first = self.expression()?;
        if self.at_punct(")") {
            let close = self.punct(")")?;
            return Ok(Node::branch(
                "parenthesized_expression",
                vec![open, first, close],
            ));
        }

        let mut children = vec![open, first.with_field("first"), self.punct(",")?];
        while !self.at_punct(")") {
            children.push(self.expression()?.with_field("rest"));
            if self.at_punct(",") {
                children.push(self.punct(",")?);
            } else {
                break;
            }
        }
        children.push(self.punct(")")?);
        Ok(Node::branch("tuple_expression", children))
    }

    fn array_expression(&mut self) -> PResult<Node> {
        let mut children = vec![self.punct("[")?];
        while !self.at_punct("]") {
            children.push(self.expression()?.with_field("elements"));
            if self.at_punct(",") {
                children.push(self.punct(",")?);
            } else {
                break;
            }
        }
        children.push(self.punct("]")?);
        Ok(Node::branch("array_expression", children))
    }

    /// `( [named_argument | expression], ... )`, produced as `node_kind`.
    fn arguments(&mut self, node_kind: &'static str) -> PResult<Node> {
        let mut children = vec![self.punct("(")?];
        while !self.at_punct(")") {
            let arg = if self.at_ident() && self.at_punct_n(1, "=") {
                let name = self.identifier()?.with_field("name");
                let eq = self.punct("=")?;
                let value = self.expression()?.with_field("value");
                Node::branch("named_argument", vec![name, eq, value])
            } else {
                self.expression()?
            };
            children.push(arg);
            if self.at_punct(",") {
                children.push(self.punct(",")?);
            } else {
                break;
            }
        }
        children.push(self.punct(")")?);
        Ok(Node::branch(node_kind, children))
    }

    fn filter_chain(&mut self) -> PResult<Node> {
        let mut children = Vec::new();
        while self.at_punct("|") {
            children.push(self.punct("|")?);
            children.push(self.filter()?);
        }
        Ok(Node::branch("filter_chain", children))
    }

    fn filter(&mut self) -> PResult<Node> {
        let mut children = vec![self.identifier()?.with_field("name")];
        if self.at_punct("(") {
            children.push(self.arguments("arguments")?.with_field("arguments"));
        }
        Ok(Node::branch("filter", children))
    }

    // ---- patterns ----

    fn match_pattern(&mut self) -> PResult<Node> {
        let first = self.pattern()?;
        if self.at_punct("|") {
            let mut children = vec![first];
            while self.at_punct("|") {
                children.push(self.punct("|")?);
                children.push(self.pattern()?);
            }
            return Ok(Node::branch("or_pattern", children));
        }
        if self.at_word("with") {
            let with = self.word("with")?;
            let (open, close) = if self.at_punct("[") {
                ("[", "]")
            } else {
                ("(", ")")
            };
            let mut children = vec![first, with, self.punct(open)?];
            children.push(self.destructure_element()?);
            while self.at_punct(",") {
                children.push(self.punct(",")?);
                children.push(self.destructure_element()?);
            }
            children.push(self.punct(close)?);
            return Ok(Node::branch("with_pattern", children));
        }
        Ok(first)
    }

    fn destructure_element(&mut self) -> PResult<Node> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected("destructuring element"));
        };
        self.pos += 1;
        let node = match tok.kind {
            TokenKind::Ident => match self.text(tok) {
                "_" => Node::leaf("placeholder", true, tok.start, tok.end),
                "true" | "false" => Node::leaf("boolean_literal", true, tok.start, tok.end),
                _ => Node::leaf("identifier", true, tok.start, tok.end),
            },
            TokenKind::Str => Node::leaf("string_literal", true, tok.start, tok.end),
            TokenKind::Number => Node::leaf("number_literal", true, tok.start, tok.end),
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("destructuring element"));
            }
        };
        Ok(node)
    }

    fn pattern(&mut self) -> PResult<Node> {
        self.nest()?;
        let node = self.single_pattern()?;
        self.depth -= 1;
        Ok(node)
    }

    fn single_pattern(&mut self) -> PResult<Node> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected("pattern"));
        };
        match tok.kind {
            TokenKind::Str => self.string_literal(),
            TokenKind::Number => {
                self.pos += 1;
                Ok(Node::leaf("number_literal", true, tok.start, tok.end))
            }
            TokenKind::Punct("[") => self.sequence_pattern("[", "]", "array_pattern"),
            TokenKind::Punct("(") => self.sequence_pattern("(", ")", "tuple_pattern"),
            TokenKind::Punct("::") => {
                let path = self.path_tail(None)?;
                self.pattern_after_name(path)
            }
            TokenKind::Ident => match self.text(tok) {
                "_" => {
                    self.pos += 1;
                    Ok(Node::leaf("placeholder", true, tok.start, tok.end))
                }
                "true" | "false" => {
                    self.pos += 1;
                    Ok(Node::leaf("boolean_literal", true, tok.start, tok.end))
                }
                _ => {
                    let ident = self.identifier()?;
                    let name = if self.at_punct("::") {
                        self.path_tail(Some(ident))?
                    } else {
                        ident
                    };
                    self.pattern_after_name(name)
                }
            },
            _ => Err(self.unexpected("pattern")),
        }
    }

    fn pattern_after_name(&mut self, name: Node) -> PResult<Node> {
        if self.at_punct("!") && self.at_punct_n(1, "(") {
            return self.macro_invocation(name);
        }
        if self.at_punct("(") {
            let mut children = vec![name.with_field("type"), self.punct("(")?];
            while !self.at_punct(")") {
                children.push(self.pattern()?);
                if self.at_punct(",") {
                    children.push(self.punct(",")?);
                } else {
                    break;
                }
            }
            children.push(self.punct(")")?);
            return Ok(Node::branch("tuple_struct_pattern", children));
        }
        Ok(name)
    }

    fn sequence_pattern(
        &mut self,
        open: &'static str,
        close: &'static str,
        node_kind: &'static str,
    ) -> PResult<Node> {
        let mut children = vec![self.punct(open)?];
        while !self.at_punct(close) {
            if self.at_punct("..") {
                let tok = self.bump().ok_or_else(|| self.unexpected(".."))?;
                children.push(Node::leaf("wildcard", true, tok.start, tok.end));
            } else {
                children.push(self.pattern()?);
            }
            if self.at_punct(",") {
                children.push(self.punct(",")?);
            } else {
                break;
            }
        }
        children.push(self.punct(close)?);
        Ok(Node::branch(node_kind, children))
    }
}
