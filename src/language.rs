use std::fmt;
use std::ptr;

use thiserror::Error;
use tracing::debug;

pub const ABI_VERSION: u32 = 14;

pub const LOAD_FAILURE_MESSAGE: &str = "Error loading Askama grammar";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("{}", LOAD_FAILURE_MESSAGE)]
    LoadFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKind {
    pub name: &'static str,
    pub named: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Grammar {
    pub name: &'static str,
    pub abi_version: u32,
    pub node_kinds: &'static [NodeKind],
    pub fields: &'static [&'static str],
    // fields each named kind may carry
    pub node_fields: &'static [(&'static str, &'static [&'static str])],
}

#[derive(Clone, Copy)]
pub struct LanguageFn(fn() -> Option<&'static Grammar>);

impl LanguageFn {
    pub const fn from_raw(f: fn() -> Option<&'static Grammar>) -> Self {
        Self(f)
    }

    pub const fn into_raw(self) -> fn() -> Option<&'static Grammar> {
        self.0
    }
}

impl fmt::Debug for LanguageFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LanguageFn")
    }
}

pub const LANGUAGE: LanguageFn = LanguageFn::from_raw(askama_grammar);

fn askama_grammar() -> Option<&'static Grammar> {
    Some(&ASKAMA)
}

pub fn language() -> Language {
    Language(&ASKAMA)
}

pub fn load_check(accessor: LanguageFn) -> Result<Language, LoadError> {
    let language = Language::new(accessor)?;
    debug!(
        name = language.name(),
        kinds = language.node_kind_count(),
        fields = language.field_count(),
        "grammar loaded"
    );
    Ok(language)
}

#[derive(Clone, Copy)]
pub struct Language(&'static Grammar);

impl Language {
    pub fn new(accessor: LanguageFn) -> Result<Self, LoadError> {
        match (accessor.into_raw())() {
            Some(grammar) => Ok(Self(grammar)),
            None => Err(LoadError::LoadFailure),
        }
    }

    pub fn grammar(&self) -> &'static Grammar {
        self.0
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn abi_version(&self) -> u32 {
        self.0.abi_version
    }

    pub fn node_kind_count(&self) -> usize {
        self.0.node_kinds.len()
    }

    pub fn node_kind_for_id(&self, id: u16) -> Option<&'static str> {
        self.0.node_kinds.get(id as usize).map(|k| k.name)
    }

    pub fn node_kind_is_named(&self, id: u16) -> bool {
        self.0
            .node_kinds
            .get(id as usize)
            .is_some_and(|k| k.named)
    }

    pub fn id_for_node_kind(&self, kind: &str, named: bool) -> Option<u16> {
        self.0
            .node_kinds
            .iter()
            .position(|k| k.name == kind && k.named == named)
            .map(|i| i as u16)
    }

    pub fn field_count(&self) -> usize {
        self.0.fields.len()
    }

    /// Field ids start at 1; 0 means "no field".
    pub fn field_name_for_id(&self, id: u16) -> Option<&'static str> {
        if id == 0 {
            return None;
        }
        self.0.fields.get(id as usize - 1).copied()
    }

    pub fn field_id_for_name(&self, name: &str) -> Option<u16> {
        self.0
            .fields
            .iter()
            .position(|f| *f == name)
            .map(|i| i as u16 + 1)
    }

    pub fn fields_for_kind(&self, kind: &str) -> &'static [&'static str] {
        self.0
            .node_fields
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, fields)| *fields)
            .unwrap_or(&[])
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.0, other.0)
    }
}

impl Eq for Language {}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.0.name)
            .field("abi_version", &self.0.abi_version)
            .finish()
    }
}

const fn named(name: &'static str) -> NodeKind {
    NodeKind { name, named: true }
}

const fn anon(name: &'static str) -> NodeKind {
    NodeKind { name, named: false }
}

pub(crate) const ERROR_KIND: &str = "ERROR";

static NODE_KINDS: &[NodeKind] = &[
    named("ERROR"),
    named("source"),
    named("content"),
    named("comment"),
    named("control_tag"),
    named("render_expression"),
    named("block_statement"),
    named("endblock_statement"),
    named("filter_statement"),
    named("endfilter_statement"),
    named("extends_statement"),
    named("include_statement"),
    named("import_statement"),
    named("let_statement"),
    named("for_statement"),
    named("endfor_statement"),
    named("if_statement"),
    named("let_condition"),
    named("else_if_statement"),
    named("else_statement"),
    named("endif_statement"),
    named("match_statement"),
    named("endmatch_statement"),
    named("when_statement"),
    named("endwhen_statement"),
    named("macro_statement"),
    named("endmacro_statement"),
    named("macro_call_statement"),
    named("endcall_statement"),
    named("tuple_struct_pattern"),
    named("array_pattern"),
    named("tuple_pattern"),
    named("or_pattern"),
    named("with_pattern"),
    named("placeholder"),
    named("wildcard"),
    named("binary_expression"),
    named("string_concatenation"),
    named("is_defined_expression"),
    named("filter_expression"),
    named("filter_chain"),
    named("filter"),
    named("macro_invocation"),
    named("token_tree"),
    named("call_expression"),
    named("field_access_expression"),
    named("index_expression"),
    named("range_expression"),
    named("unary_expression"),
    named("reference_expression"),
    named("arguments"),
    named("named_argument"),
    named("path_expression"),
    named("parenthesized_expression"),
    named("tuple_expression"),
    named("array_expression"),
    named("number_literal"),
    named("boolean_literal"),
    named("string_literal"),
    named("identifier"),
    named("field_identifier"),
    anon("{%"),
    anon("{%-"),
    anon("{%+"),
    anon("{%~"),
    anon("%}"),
    anon("-%}"),
    anon("+%}"),
    anon("~%}"),
    anon("{{"),
    anon("{{-"),
    anon("{{+"),
    anon("{{~"),
    anon("}}"),
    anon("-}}"),
    anon("+}}"),
    anon("~}}"),
    anon("{#"),
    anon("#}"),
    anon("block"),
    anon("endblock"),
    anon("filter"),
    anon("endfilter"),
    anon("extends"),
    anon("include"),
    anon("import"),
    anon("as"),
    anon("let"),
    anon("set"),
    anon("mut"),
    anon("for"),
    anon("in"),
    anon("endfor"),
    anon("if"),
    anon("else if"),
    anon("elif"),
    anon("else"),
    anon("endif"),
    anon("match"),
    anon("endmatch"),
    anon("when"),
    anon("endwhen"),
    anon("with"),
    anon("macro"),
    anon("endmacro"),
    anon("call"),
    anon("endcall"),
    anon("_"),
    anon("is"),
    anon("is not"),
    anon("defined"),
    anon("true"),
    anon("false"),
    anon("xor"),
    anon("bitor"),
    anon("bitand"),
    anon("||"),
    anon("&&"),
    anon("=="),
    anon("!="),
    anon("<"),
    anon("<="),
    anon(">"),
    anon(">="),
    anon("+"),
    anon("-"),
    anon("*"),
    anon("/"),
    anon("%"),
    anon("~"),
    anon("|"),
    anon("!"),
    anon("&"),
    anon("."),
    anon(".."),
    anon("..="),
    anon("::"),
    anon("="),
    anon(","),
    anon("("),
    anon(")"),
    anon("["),
    anon("]"),
];

static FIELDS: &[&str] = &[
    "alias",
    "arguments",
    "condition",
    "elements",
    "field",
    "filters",
    "first",
    "function",
    "left",
    "macro",
    "name",
    "operator",
    "path",
    "pattern",
    "rest",
    "right",
    "type",
    "value",
];

static NODE_FIELDS: &[(&str, &[&str])] = &[
    ("block_statement", &["name"]),
    ("endblock_statement", &["name"]),
    ("filter_statement", &["filters"]),
    ("import_statement", &["alias", "path"]),
    ("let_statement", &["pattern", "value"]),
    ("for_statement", &["pattern", "value"]),
    ("if_statement", &["condition"]),
    ("let_condition", &["pattern", "value"]),
    ("else_if_statement", &["condition"]),
    ("match_statement", &["value"]),
    ("when_statement", &["pattern"]),
    ("macro_statement", &["arguments", "name"]),
    ("endmacro_statement", &["name"]),
    ("macro_call_statement", &["arguments"]),
    ("tuple_struct_pattern", &["type"]),
    ("binary_expression", &["left", "operator", "right"]),
    ("filter_expression", &["filters", "value"]),
    ("filter", &["arguments", "name"]),
    ("macro_invocation", &["macro"]),
    ("call_expression", &["arguments", "function"]),
    ("field_access_expression", &["field", "value"]),
    ("reference_expression", &["value"]),
    ("named_argument", &["name", "value"]),
    ("path_expression", &["name", "path"]),
    ("tuple_expression", &["first", "rest"]),
    ("array_expression", &["elements"]),
];

static ASKAMA: Grammar = Grammar {
    name: "askama",
    abi_version: ABI_VERSION,
    node_kinds: NODE_KINDS,
    fields: FIELDS,
    node_fields: NODE_FIELDS,
};
