use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::diagnostics::{Code, Diagnostic};

pub const DEFAULT_SYNTAX_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub name: String,
    pub block_start: String,
    pub block_end: String,
    pub expr_start: String,
    pub expr_end: String,
    pub comment_start: String,
    pub comment_end: String,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            name: DEFAULT_SYNTAX_NAME.to_string(),
            block_start: "{%".to_string(),
            block_end: "%}".to_string(),
            expr_start: "{{".to_string(),
            expr_end: "}}".to_string(),
            comment_start: "{#".to_string(),
            comment_end: "#}".to_string(),
        }
    }
}

impl Syntax {
    fn validate(&self) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let delimiters = [
            ("block_start", &self.block_start),
            ("block_end", &self.block_end),
            ("expr_start", &self.expr_start),
            ("expr_end", &self.expr_end),
            ("comment_start", &self.comment_start),
            ("comment_end", &self.comment_end),
        ];
        for (key, value) in delimiters {
            if value.chars().count() < 2 {
                errors.push(config_error(format!(
                    "syntax '{}': {key} must be at least 2 characters, got {value:?}",
                    self.name
                )));
            }
            if value.chars().any(char::is_whitespace) {
                errors.push(config_error(format!(
                    "syntax '{}': {key} must not contain whitespace, got {value:?}",
                    self.name
                )));
            }
        }

        let starts = [
            ("block_start", &self.block_start),
            ("expr_start", &self.expr_start),
            ("comment_start", &self.comment_start),
        ];
        for (i, (a_key, a)) in starts.iter().enumerate() {
            for (b_key, b) in starts.iter().skip(i + 1) {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    errors.push(config_error(format!(
                        "syntax '{}': {a_key} {a:?} and {b_key} {b:?} must not share a prefix",
                        self.name
                    )));
                }
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    general: RawGeneral,
    #[serde(default)]
    syntax: Vec<RawSyntax>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawGeneral {
    default_syntax: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSyntax {
    name: String,
    block_start: Option<String>,
    block_end: Option<String>,
    expr_start: Option<String>,
    expr_end: Option<String>,
    comment_start: Option<String>,
    comment_end: Option<String>,
}

impl RawSyntax {
    fn into_syntax(self) -> Syntax {
        let d = Syntax::default();
        Syntax {
            name: self.name,
            block_start: self.block_start.unwrap_or(d.block_start),
            block_end: self.block_end.unwrap_or(d.block_end),
            expr_start: self.expr_start.unwrap_or(d.expr_start),
            expr_end: self.expr_end.unwrap_or(d.expr_end),
            comment_start: self.comment_start.unwrap_or(d.comment_start),
            comment_end: self.comment_end.unwrap_or(d.comment_end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    syntaxes: Vec<Syntax>,
    default_syntax: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            syntaxes: vec![Syntax::default()],
            default_syntax: DEFAULT_SYNTAX_NAME.to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Vec<Diagnostic>> {
        let body = fs::read_to_string(path).map_err(|err| {
            vec![Diagnostic::new(
                Code::Io,
                format!("failed to read {}: {err}", path.display()),
            )]
        })?;
        Self::from_toml_str(&body)
            .map_err(|errs| {
                errs.into_iter()
                    .map(|d| d.with_source(path.display().to_string()))
                    .collect()
            })
            .inspect(|config| {
                debug!(
                    path = %path.display(),
                    syntaxes = config.syntaxes.len(),
                    default = %config.default_syntax,
                    "loaded syntax config"
                );
            })
    }

    pub fn from_toml_str(src: &str) -> Result<Self, Vec<Diagnostic>> {
        let raw: RawConfig = toml::from_str(src)
            .map_err(|err| vec![config_error(format!("invalid askama config: {err}"))])?;

        let mut errors = Vec::new();
        let mut config = Config::default();
        let mut seen = HashSet::new();
        for raw_syntax in raw.syntax {
            let syntax = raw_syntax.into_syntax();
            if syntax.name == DEFAULT_SYNTAX_NAME {
                errors.push(config_error(format!(
                    "syntax name '{DEFAULT_SYNTAX_NAME}' is reserved"
                )));
                continue;
            }
            if !seen.insert(syntax.name.clone()) {
                errors.push(config_error(format!(
                    "syntax '{}' is defined more than once",
                    syntax.name
                )));
                continue;
            }
            errors.extend(syntax.validate());
            config.syntaxes.push(syntax);
        }

        if let Some(name) = raw.general.default_syntax {
            if config.syntax(&name).is_none() {
                errors.push(config_error(format!(
                    "default_syntax '{name}' is not a defined syntax"
                )));
            } else {
                config.default_syntax = name;
            }
        }

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }

    pub fn syntax(&self, name: &str) -> Option<&Syntax> {
        self.syntaxes.iter().find(|s| s.name == name)
    }

    pub fn default_syntax(&self) -> &Syntax {
        self.syntax(&self.default_syntax)
            .unwrap_or(&self.syntaxes[0])
    }

    pub fn syntaxes(&self) -> &[Syntax] {
        &self.syntaxes
    }
}

fn config_error(message: String) -> Diagnostic {
    Diagnostic::new(Code::Config, message)
}
