pub mod diagnostics;
pub mod language;
pub mod lexer;
pub mod node_types;
pub mod parser;
pub mod scanner;
pub mod syntax;
pub mod tree;

pub use diagnostics::{Code, Diagnostic, Span};
pub use language::{LANGUAGE, Language, LanguageFn, LoadError, language, load_check};
pub use node_types::{NodeTypeInfo, node_types, node_types_json};
pub use parser::{ParseError, Parser, parse_template, parse_template_with_syntax};
pub use syntax::{Config, Syntax};
pub use tree::{Node, Tree};
