// Token-substitution engine for message templates
//
// Tokens are dotted paths in double braces, e.g. {{lead.name}}. Resolution
// walks the data bag from its root. A missing terminal value renders as an
// empty string; an unresolvable intermediate segment leaves the token text
// in place so broken paths stay visible in previews.

use chrono::Utc;
use regex::{Captures, Regex};
use serde_json::{Map, Value, json};

const TOKEN_PATTERN: &str = r"\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}";

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    token: Regex,
}

enum Resolution {
    Value(String),
    Empty,
    Unresolved,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            token: Regex::new(TOKEN_PATTERN).expect("token pattern is a valid regex"),
        }
    }

    /// Render `template` against `data`. A `currentDate` key (YYYY-MM-DD) is
    /// injected unless the caller supplied one.
    pub fn render(&self, template: &str, data: &Value) -> String {
        let mut bag = match data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        bag.entry("currentDate")
            .or_insert_with(|| json!(Utc::now().format("%Y-%m-%d").to_string()));

        let root = Value::Object(bag);
        self.token
            .replace_all(template, |caps: &Captures| {
                match resolve(&root, &caps[1]) {
                    Resolution::Value(text) => text,
                    Resolution::Empty => String::new(),
                    Resolution::Unresolved => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Render against a fixed sample lead for UI display.
    pub fn preview(&self, template: &str) -> String {
        self.render(template, &sample_data())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(root: &Value, path: &str) -> Resolution {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        match current.get(segment) {
            Some(value) if is_last => {
                return if value.is_null() {
                    Resolution::Empty
                } else {
                    Resolution::Value(stringify(value))
                };
            }
            Some(value) => current = value,
            None if is_last => return Resolution::Empty,
            None => return Resolution::Unresolved,
        }
    }

    Resolution::Unresolved
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sample_data() -> Value {
    json!({
        "lead": {
            "name": "Jordan Avery",
            "email": "jordan.avery@example.com",
            "company": "Avery Holdings",
            "phone": "555-0142",
            "status": "qualified"
        },
        "sequence": {
            "name": "New Lead Welcome"
        }
    })
}
