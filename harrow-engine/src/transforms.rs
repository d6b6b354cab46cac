// The transform pipeline applied after a property read. Transforms are
// pure, unary, and applied in order. Names nobody recognizes are kept as
// no-ops so configs stay forward compatible.

use crate::value::{as_number, number, stringify};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// `prepend(x)` - prefix the value with `x`. No argument, no effect.
    Prepend(Option<String>),
    Lowercase,
    /// URL/filename-safe slug of the value.
    Slug,
    /// Coerce the value to a number (non-numeric becomes 0.0) and subtract
    /// the argument when one is given.
    Subtract(Option<f64>),
    /// Truncate at the first `?`.
    ClearUrlParams,
    Trim,
    /// Unrecognized transform, kept verbatim and skipped at apply time.
    Unknown(String),
}

impl Transform {
    pub fn from_name(name: &str, args: &[String]) -> Self {
        match name.trim() {
            "prepend" => Transform::Prepend(args.first().cloned()),
            "lowercase" => Transform::Lowercase,
            "slug" => Transform::Slug,
            "subtract" => Transform::Subtract(
                args.first().and_then(|a| a.trim().parse::<f64>().ok()),
            ),
            "clear_url_params" => Transform::ClearUrlParams,
            "trim" => Transform::Trim,
            other => Transform::Unknown(other.to_string()),
        }
    }

    fn apply_one(&self, value: Value) -> Value {
        match self {
            Transform::Prepend(Some(prefix)) => {
                Value::String(format!("{}{}", prefix, stringify(&value)))
            }
            Transform::Prepend(None) => value,
            Transform::Lowercase => Value::String(stringify(&value).to_lowercase()),
            Transform::Slug => Value::String(slugify(&stringify(&value))),
            Transform::Subtract(arg) => {
                let base = as_number(&value).unwrap_or(0.0);
                match arg {
                    Some(x) => number(base - x),
                    None => number(base),
                }
            }
            Transform::ClearUrlParams => {
                let s = stringify(&value);
                Value::String(s.split('?').next().unwrap_or_default().to_string())
            }
            Transform::Trim => Value::String(stringify(&value).trim().to_string()),
            Transform::Unknown(_) => value,
        }
    }
}

/// Run a value through the whole pipeline.
pub fn apply(transforms: &[Transform], value: Value) -> Value {
    transforms
        .iter()
        .fold(value, |acc, t| t.apply_one(acc))
}

/// Lowercased, alphanumeric-and-dash rendition of the input. Runs of
/// anything else collapse into a single dash.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }

    out
}
