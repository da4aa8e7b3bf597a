//! Template engine
//!
//! Page and email templates are compiled into the binary with rust-embed.
//! An optional directory can override any of them by relative name, which
//! is how a deployment restyles pages without rebuilding.

use anyhow::{Context, Result};
use rust_embed::RustEmbed;
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera, Value};

mod error;

pub use error::ThemeError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

pub struct ThemeEngine {
    tera: Tera,
}

impl ThemeEngine {
    /// Build the engine from the embedded templates plus any overrides.
    pub fn new(override_dir: Option<&Path>) -> Result<Self> {
        let mut templates: BTreeMap<String, String> = BTreeMap::new();

        for name in EmbeddedTemplates::iter() {
            let Some(file) = EmbeddedTemplates::get(&name) else {
                continue;
            };
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|_| ThemeError::Template(format!("Template {} is not UTF-8", name)))?;
            templates.insert(name.to_string(), content);
        }

        if let Some(dir) = override_dir {
            if dir.is_dir() {
                let before = templates.len();
                collect_templates_from_dir(dir, dir, &mut templates)?;
                tracing::info!(
                    "Loaded template overrides from {:?} ({} new)",
                    dir,
                    templates.len() - before
                );
            } else {
                tracing::warn!("Template override directory {:?} does not exist, ignoring", dir);
            }
        }

        let mut tera = Tera::default();
        register_filters(&mut tera);
        tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())
            .map_err(|e| ThemeError::Template(describe_error(&e)))?;

        Ok(Self { tera })
    }

    /// Engine with only the embedded templates
    pub fn embedded() -> Result<Self> {
        Self::new(None)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            ThemeError::Template(format!("Failed to render '{}': {}", template, describe_error(&e)))
                .into()
        })
    }

    /// Render, falling back to `error.html` and then to bare HTML.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render template '{}': {}, trying error template", template, e);

                let mut error_context = context.clone();
                error_context.insert("status", &500);
                error_context.insert("message", "Something went wrong while rendering this page.");

                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(error_template_err) => {
                        tracing::warn!("Failed to render error template: {}", error_template_err);
                        simple_error_page(template)
                    }
                }
            }
        }
    }

    pub fn has_template(&self, template: &str) -> bool {
        self.tera.get_template_names().any(|name| name == template)
    }
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut BTreeMap<String, String>,
) -> Result<()> {
    for entry in fs::read_dir(current_path).map_err(ThemeError::Overrides)? {
        let path = entry.map_err(ThemeError::Overrides)?.path();
        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative = path
                .strip_prefix(base_path)
                .map_err(|_| ThemeError::Template("Failed to get relative path".to_string()))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.insert(name, content);
        }
    }
    Ok(())
}

fn describe_error(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn simple_error_page(template: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Server Error</title></head>
<body>
<h1>Server Error</h1>
<p>The page <code>{}</code> could not be rendered.</p>
</body>
</html>"#,
        template
    )
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("sub", sub_filter);
    tera.register_filter("abs", abs_filter);
    tera.register_filter("price", price_filter);
}

fn number_arg(value: &Value, filter: &str) -> tera::Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| tera::Error::msg(format!("Filter `{}` got a non-finite number", filter))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| tera::Error::msg(format!("Filter `{}` expected a number, got {:?}", filter, s))),
        other => Err(tera::Error::msg(format!(
            "Filter `{}` expected a number, got {}",
            filter, other
        ))),
    }
}

fn to_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}

/// `{{ a | sub(value=b) }}`
fn sub_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let rhs = args
        .get("value")
        .ok_or_else(|| tera::Error::msg("Filter `sub` requires a `value` argument"))?;
    Ok(to_value(number_arg(value, "sub")? - number_arg(rhs, "sub")?))
}

fn abs_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(to_value(number_arg(value, "abs")?.abs()))
}

/// Thousands-separated price with two decimals: `1234.5` -> `1,234.50`
fn price_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let amount = number_arg(value, "price")?;
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    Ok(Value::from(format!("{}{}.{:02}", sign, grouped, cents % 100)))
}
