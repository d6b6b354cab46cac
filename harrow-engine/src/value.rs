// Scalar-or-list evaluation results and scalar coercion helpers.

use serde_json::Value;

/// Outcome of evaluating a template or attribute getter. A getter that
/// matched several elements produces `Many`; everything else is `One`.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    One(Value),
    Many(Vec<Value>),
}

impl Evaluated {
    /// Collapse into a plain JSON value (`Many` becomes an array).
    pub fn into_value(self) -> Value {
        match self {
            Evaluated::One(v) => v,
            Evaluated::Many(vs) => Value::Array(vs),
        }
    }
}

/// Render a JSON scalar the way it reads when spliced into a template.
/// Null renders empty, integral floats drop their fraction.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Numeric view of a scalar, if it has one.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Build a JSON number from an f64, mapping non-finite input to Null.
pub fn number(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stringify_drops_integral_fraction() {
        assert_eq!(stringify(&json!(7.0)), "7");
        assert_eq!(stringify(&json!(7.5)), "7.5");
        assert_eq!(stringify(&json!(7)), "7");
    }

    #[test]
    fn stringify_null_is_empty() {
        assert_eq!(stringify(&Value::Null), "");
    }

    #[test]
    fn as_number_parses_strings() {
        assert_eq!(as_number(&json!("10")), Some(10.0));
        assert_eq!(as_number(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(as_number(&json!("abc")), None);
    }

    #[test]
    fn many_collapses_to_array() {
        let e = Evaluated::Many(vec![json!("a"), json!("b")]);
        assert_eq!(e.into_value(), json!(["a", "b"]));
    }
}
