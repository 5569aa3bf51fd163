use crate::diagnostics::Diagnostic;
use crate::language::{ERROR_KIND, Language};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: &'static str,
    named: bool,
    start: usize,
    end: usize,
    field: Option<&'static str>,
    children: Vec<Node>,
}

impl Node {
    pub(crate) fn leaf(kind: &'static str, named: bool, start: usize, end: usize) -> Self {
        Self {
            kind,
            named,
            start,
            end,
            field: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn token(kind: &'static str, start: usize, end: usize) -> Self {
        Self::leaf(kind, false, start, end)
    }

    /// A named node spanning its first to last child. Hidden children are
    /// spliced in place.
    pub(crate) fn branch(kind: &'static str, children: Vec<Node>) -> Self {
        let children = splice_hidden(children);
        let start = children.first().map_or(0, |c| c.start);
        let end = children.last().map_or(start, |c| c.end);
        Self {
            kind,
            named: true,
            start,
            end,
            field: None,
            children,
        }
    }

    // Stands for a grammar rule whose name starts with `_`; it never
    // survives into a tree.
    pub(crate) fn hidden(kind: &'static str, children: Vec<Node>) -> Self {
        Self {
            named: false,
            ..Self::branch(kind, children)
        }
    }

    fn is_hidden(&self) -> bool {
        self.kind.len() > 1 && self.kind.starts_with('_')
    }

    pub(crate) fn error(start: usize, end: usize) -> Self {
        Self::leaf(ERROR_KIND, true, start, end)
    }

    pub(crate) fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub(crate) fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_named(&self) -> bool {
        self.named
    }

    pub fn is_error(&self) -> bool {
        self.kind == ERROR_KIND
    }

    pub fn has_error(&self) -> bool {
        self.is_error() || self.children.iter().any(Node::has_error)
    }

    pub fn start_byte(&self) -> usize {
        self.start
    }

    pub fn end_byte(&self) -> usize {
        self.end
    }

    pub fn field_name(&self) -> Option<&'static str> {
        self.field
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn named_children(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|c| c.named)
    }

    pub fn named_child(&self, index: usize) -> Option<&Node> {
        self.named_children().nth(index)
    }

    pub fn named_child_count(&self) -> usize {
        self.named_children().count()
    }

    pub fn child_by_field_name(&self, field: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.field == Some(field))
    }

    pub fn children_by_field_name<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.field == Some(field))
    }

    pub fn utf8_text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start..self.end).unwrap_or("")
    }

    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out);
        out
    }

    fn write_sexp(&self, out: &mut String) {
        out.push('(');
        out.push_str(self.kind);
        for child in self.named_children() {
            out.push(' ');
            if let Some(field) = child.field {
                out.push_str(field);
                out.push_str(": ");
            }
            child.write_sexp(out);
        }
        out.push(')');
    }

    /// Pre-order walk over this node and all descendants.
    pub fn walk(&self) -> impl Iterator<Item = &Node> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

fn splice_hidden(children: Vec<Node>) -> Vec<Node> {
    if !children.iter().any(Node::is_hidden) {
        return children;
    }
    let mut out = Vec::with_capacity(children.len() + 1);
    for child in children {
        if child.is_hidden() {
            let field = child.field;
            out.extend(child.children.into_iter().map(|grandchild| Node {
                field: grandchild.field.or(field),
                ..grandchild
            }));
        } else {
            out.push(child);
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Tree {
    language: Language,
    root: Node,
    errors: Vec<Diagnostic>,
}

impl Tree {
    pub(crate) fn new(language: Language, root: Node, errors: Vec<Diagnostic>) -> Self {
        Self {
            language,
            root,
            errors,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn root_node(&self) -> &Node {
        &self.root
    }

    pub fn to_sexp(&self) -> String {
        self.root.to_sexp()
    }

    /// One diagnostic per `ERROR` node, in source order.
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }
}
