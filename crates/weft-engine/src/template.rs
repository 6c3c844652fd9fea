//! `{{token}}` placeholder substitution.
//!
//! A token is looked up in this order:
//! 1. the execution's input variables,
//! 2. `node_<id>_output`, which reads `results[<id>]`,
//! 3. `results` by the literal token name.
//!
//! Tokens that match nothing are left in the output unchanged.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Variable {
        name: String,
        /// The placeholder exactly as written, emitted when unresolved.
        raw: String,
    },
}

/// A template parsed once into literal and variable segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in placeholder().captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Variable {
                name: name.as_str().to_string(),
                raw: whole.as_str().to_string(),
            });
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of every referenced token, in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(
        &self,
        variables: &Map<String, Value>,
        results: &HashMap<String, Value>,
    ) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable { name, raw } => match lookup(name, variables, results) {
                    Some(value) => out.push_str(&stringify(value)),
                    None => out.push_str(raw),
                },
            }
        }
        out
    }
}

fn lookup<'a>(
    name: &str,
    variables: &'a Map<String, Value>,
    results: &'a HashMap<String, Value>,
) -> Option<&'a Value> {
    if let Some(value) = variables.get(name) {
        return Some(value);
    }
    if let Some(node_id) = name
        .strip_prefix("node_")
        .and_then(|rest| rest.strip_suffix("_output"))
    {
        if let Some(value) = results.get(node_id) {
            return Some(value);
        }
    }
    results.get(name)
}

/// Strings verbatim, scalars via `to_string`, arrays and objects as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse and render in one step.
pub fn resolve(
    template: &str,
    variables: &Map<String, Value>,
    results: &HashMap<String, Value>,
) -> String {
    Template::parse(template).render(variables, results)
}
