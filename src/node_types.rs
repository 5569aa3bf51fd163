use serde::Serialize;

use crate::language::{ERROR_KIND, Language};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeTypeInfo {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub named: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<&'static str>,
}

/// Every node kind of `language` except the internal `ERROR` kind, named
/// kinds first.
pub fn node_types(language: &Language) -> Vec<NodeTypeInfo> {
    let grammar = language.grammar();
    let mut out: Vec<NodeTypeInfo> = grammar
        .node_kinds
        .iter()
        .filter(|k| k.name != ERROR_KIND)
        .map(|k| NodeTypeInfo {
            kind: k.name,
            named: k.named,
            fields: if k.named {
                language.fields_for_kind(k.name).to_vec()
            } else {
                Vec::new()
            },
        })
        .collect();
    out.sort_by(|a, b| b.named.cmp(&a.named).then(a.kind.cmp(b.kind)));
    out
}

pub fn node_types_json(language: &Language) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&node_types(language))
}
