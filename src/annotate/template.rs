//! Display templates with `${name}` placeholders.
//!
//! A template is parsed once into literal and variable segments; rendering a
//! line is then a single concatenation pass. Compiled templates are memoized
//! by their exact source string until `clear` is called (configuration
//! change).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed template, ready to interpolate.
#[derive(Debug, PartialEq, Eq)]
pub struct CompiledTemplate {
    source: String,
    segments: Vec<Segment>,
}

/// Placeholder values for one interpolation.
pub type TemplateFields<'a> = HashMap<&'a str, String>;

impl CompiledTemplate {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                break;
            };

            let name = &after[..end];
            literal.push_str(&rest[..start]);
            if name.is_empty() {
                literal.push_str("${}");
            } else {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name.to_string()));
            }
            rest = &after[end + 1..];
        }

        // Unterminated `${` and trailing text are kept verbatim.
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_string(),
            segments,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the placeholders, in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn uses(&self, name: &str) -> bool {
        self.variables().any(|v| v == name)
    }

    /// Substitute placeholders; missing fields render as empty strings.
    pub fn interpolate(&self, fields: &TemplateFields<'_>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    if let Some(value) = fields.get(name.as_str()) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

/// Process-wide memo of compiled templates, keyed by exact source text.
#[derive(Debug, Default)]
pub struct TemplateCompiler {
    compiled: Mutex<HashMap<String, Arc<CompiledTemplate>>>,
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, template: &str) -> Arc<CompiledTemplate> {
        let mut compiled = self.compiled.lock();
        if let Some(existing) = compiled.get(template) {
            return Arc::clone(existing);
        }

        let parsed = Arc::new(CompiledTemplate::parse(template));
        compiled.insert(template.to_string(), Arc::clone(&parsed));
        parsed
    }

    pub fn clear(&self) {
        self.compiled.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.compiled.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
