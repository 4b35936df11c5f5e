use futures::future::BoxFuture;
use regex::{Captures, Regex};
use serde_json::Value;

use trellis_core::config::TemplateFormat;
use trellis_core::error::{Result, TrellisError};

use crate::graph::{Context, Node};

const JINJA_PATTERN: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";
const FSTRING_PATTERN: &str = r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Renders a prompt from a template. Pure string substitution.
///
/// Input names are the template's placeholders, in order of first
/// appearance. When any input is a list, one prompt is rendered per
/// element and the output is a list; every list input must then have the
/// same length and non-list inputs are repeated for each element.
/// Otherwise the output is a single string.
#[derive(Debug, Clone)]
pub struct PromptTemplateNode {
    template: String,
    pattern: Regex,
    placeholders: Vec<String>,
}

impl PromptTemplateNode {
    pub fn new(template: impl Into<String>, format: TemplateFormat) -> Result<Self> {
        let template = template.into();
        let source = match format {
            TemplateFormat::Jinja => JINJA_PATTERN,
            TemplateFormat::FString => FSTRING_PATTERN,
        };
        let pattern = Regex::new(source).map_err(|e| TrellisError::Template(e.to_string()))?;

        let mut placeholders: Vec<String> = Vec::new();
        let mut last = 0;
        for caps in pattern.captures_iter(&template) {
            let Some(whole) = caps.get(0) else { continue };
            if format == TemplateFormat::FString {
                check_stray_braces(&template[last..whole.start()])?;
            }
            last = whole.end();
            if let Some(name) = caps.get(1) {
                if !placeholders.iter().any(|p| p == name.as_str()) {
                    placeholders.push(name.as_str().to_string());
                }
            }
        }
        if format == TemplateFormat::FString {
            check_stray_braces(&template[last..])?;
        }

        Ok(Self {
            template,
            pattern,
            placeholders,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render with one value per placeholder, in placeholder order.
    fn render_one(&self, values: &[&Value]) -> String {
        self.pattern
            .replace_all(&self.template, |caps: &Captures| match caps.get(1) {
                Some(name) => self
                    .placeholders
                    .iter()
                    .position(|p| p == name.as_str())
                    .map(|i| render_value(values[i]))
                    .unwrap_or_default(),
                // Escaped brace.
                None => caps[0][..1].to_string(),
            })
            .into_owned()
    }

    /// Render every prompt for the given inputs.
    pub fn render(&self, inputs: &[&Value]) -> Result<Value> {
        if inputs.len() != self.placeholders.len() {
            return Err(TrellisError::Template(format!(
                "template has {} placeholder(s) but {} value(s) were given",
                self.placeholders.len(),
                inputs.len()
            )));
        }

        let mut batch: Option<usize> = None;
        for (name, value) in self.placeholders.iter().zip(inputs) {
            if let Value::Array(items) = value {
                match batch {
                    Some(n) if n != items.len() => {
                        return Err(TrellisError::Template(format!(
                            "list input '{}' has {} element(s), expected {}",
                            name,
                            items.len(),
                            n
                        )));
                    }
                    _ => batch = Some(items.len()),
                }
            }
        }

        let Some(n) = batch else {
            return Ok(Value::String(self.render_one(inputs)));
        };

        let prompts = (0..n)
            .map(|i| {
                let row: Vec<&Value> = inputs
                    .iter()
                    .map(|v| match v {
                        Value::Array(items) => &items[i],
                        scalar => *scalar,
                    })
                    .collect();
                Value::String(self.render_one(&row))
            })
            .collect();
        Ok(Value::Array(prompts))
    }
}

impl Node for PromptTemplateNode {
    fn input_names(&self) -> Vec<String> {
        self.placeholders.clone()
    }

    fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
        Box::pin(async move {
            let output = self.render(&ctx.get_inputs(&self.placeholders)?)?;
            ctx.set_output(output)?;
            Ok(ctx)
        })
    }
}

fn check_stray_braces(segment: &str) -> Result<()> {
    if segment.contains(['{', '}']) {
        return Err(TrellisError::Template(format!(
            "unmatched brace in template near '{}'",
            segment.trim()
        )));
    }
    Ok(())
}

/// Text for one substituted value.
///
/// Lists become one line per element; retrieved records contribute their
/// `page_content`.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => match map.get("page_content") {
            Some(Value::String(text)) => text.clone(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}
