// Tokenizer and parser for the `attr{...}` / `var{...}` getter notation
// embedded in template strings.
//
// Concrete grammar accepted inside the braces:
//
//   body      := accessor ( "|" transform )*  [ ">" bind ]
//   accessor  := [ selector "=>" ] ( qualifier "," )* property
//   qualifier := "page" | "parent" | "one" | "all" | "child(" N ")"
//   transform := name [ "(" args ")" ]
//
// Examples: `attr{href}`, `attr{.next => page, all, text | trim}`,
// `attr{count > total}`, `var{_url | clear_url_params}`.

use crate::error::{EngineError, Result};
use crate::transforms::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Context {
    /// Search within the current element.
    #[default]
    Parent,
    /// Search the whole document.
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    One,
    All,
}

/// A parsed attribute or variable getter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Accessor {
    pub selector: Option<String>,
    pub context: Option<Context>,
    pub cardinality: Option<Cardinality>,
    pub child_node: Option<usize>,
    pub property: String,
    pub transforms: Vec<Transform>,
    pub bind: Option<String>,
}

impl Accessor {
    pub fn context(&self) -> Context {
        self.context.unwrap_or_default()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality.unwrap_or_default()
    }

    /// True when any element-targeting qualifier is present. Variable
    /// getters must not carry these.
    fn has_qualifiers(&self) -> bool {
        self.selector.is_some()
            || self.context.is_some()
            || self.cardinality.is_some()
            || self.child_node.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Literal(String),
    Attr(Accessor),
    Var(Accessor),
}

/// A template string broken into literal runs and getters.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub parts: Vec<Part>,
}

impl Template {
    pub fn has_getters(&self) -> bool {
        self.parts
            .iter()
            .any(|p| !matches!(p, Part::Literal(_)))
    }
}

/// Scan a template left to right, splitting out every getter.
pub fn parse_template(input: &str) -> Result<Template> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &input[i..];
        let marker = if rest.starts_with("attr{") {
            Some(("attr", 5))
        } else if rest.starts_with("var{") {
            Some(("var", 4))
        } else {
            None
        };

        // A getter keyword glued to a preceding word is plain text.
        let bounded = marker.is_some()
            && (i == 0 || !is_ident_char(bytes[i - 1] as char));

        if let (Some((kind, skip)), true) = (marker, bounded) {
            let body_start = i + skip;
            let body_end = input[body_start..].find('}').map(|p| body_start + p).ok_or_else(|| {
                EngineError::Notation(format!("unclosed {}{{...}} getter in: {}", kind, input))
            })?;

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }

            let accessor = parse_body(&input[body_start..body_end])?;
            parts.push(match kind {
                "attr" => Part::Attr(accessor),
                _ => Part::Var(validate_var(accessor, input)?),
            });

            i = body_end + 1;
        } else {
            let c = rest.chars().next().unwrap();
            literal.push(c);
            i += c.len_utf8();
        }
    }

    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }

    Ok(Template { parts })
}

/// Parse the inside of a single getter's braces.
pub fn parse_body(body: &str) -> Result<Accessor> {
    let mut segments = split_pipeline(body);
    let accessor_src = segments.remove(0);

    let (accessor_src, bind) = if segments.is_empty() {
        strip_bind(&accessor_src)
    } else {
        let last = segments.pop().unwrap();
        let (kept, bind) = strip_bind(&last);
        if !kept.trim().is_empty() {
            segments.push(kept);
        }
        (accessor_src, bind)
    };

    let mut accessor = parse_accessor(&accessor_src)?;
    accessor.bind = bind;
    accessor.transforms = segments
        .iter()
        .map(|s| parse_transform(s))
        .collect::<Result<Vec<_>>>()?;

    Ok(accessor)
}

fn validate_var(accessor: Accessor, template: &str) -> Result<Accessor> {
    if accessor.has_qualifiers() {
        return Err(EngineError::Notation(format!(
            "var{{...}} getters take a plain name, found qualifiers in: {}",
            template
        )));
    }
    Ok(accessor)
}

fn parse_accessor(src: &str) -> Result<Accessor> {
    let mut accessor = Accessor::default();
    let src = match src.split_once("=>") {
        Some((selector, rest)) => {
            let selector = selector.trim();
            if selector.is_empty() {
                return Err(EngineError::Notation(format!(
                    "empty selector before '=>' in: {}",
                    src
                )));
            }
            accessor.selector = Some(selector.to_string());
            rest
        }
        None => src,
    };

    let tokens: Vec<&str> = src.split(',').map(str::trim).collect();
    let (property, qualifiers) = tokens
        .split_last()
        .ok_or_else(|| EngineError::Notation("empty getter body".into()))?;

    for token in qualifiers {
        apply_qualifier(&mut accessor, token)?;
    }

    if property.is_empty() || classify_qualifier(property) {
        return Err(EngineError::Notation(format!(
            "getter is missing a property name: {}",
            src
        )));
    }
    accessor.property = property.to_string();

    Ok(accessor)
}

fn classify_qualifier(token: &str) -> bool {
    matches!(token, "page" | "parent" | "one" | "all") || token.starts_with("child(")
}

fn apply_qualifier(accessor: &mut Accessor, token: &str) -> Result<()> {
    match token {
        "page" | "parent" => {
            let ctx = if token == "page" { Context::Page } else { Context::Parent };
            if accessor.context.is_some_and(|c| c != ctx) {
                return Err(EngineError::Notation(
                    "conflicting context qualifiers".into(),
                ));
            }
            accessor.context = Some(ctx);
        }
        "one" | "all" => {
            let card = if token == "all" { Cardinality::All } else { Cardinality::One };
            if accessor.cardinality.is_some_and(|c| c != card) {
                return Err(EngineError::Notation(
                    "conflicting cardinality qualifiers".into(),
                ));
            }
            accessor.cardinality = Some(card);
        }
        other if other.starts_with("child(") && other.ends_with(')') => {
            let inner = &other["child(".len()..other.len() - 1];
            let n: usize = inner.trim().parse().map_err(|_| {
                EngineError::Notation(format!("invalid child index: {}", other))
            })?;
            if n == 0 {
                return Err(EngineError::Notation(
                    "child indices are 1-based".into(),
                ));
            }
            accessor.child_node = Some(n);
        }
        other => {
            return Err(EngineError::Notation(format!(
                "unknown qualifier: {}",
                other
            )));
        }
    }
    Ok(())
}

fn parse_transform(src: &str) -> Result<Transform> {
    let src = src.trim();
    if src.is_empty() {
        return Err(EngineError::Notation("empty transform in pipeline".into()));
    }

    if let Some(open) = src.find('(') {
        if !src.ends_with(')') {
            return Err(EngineError::Notation(format!(
                "unbalanced parentheses in transform: {}",
                src
            )));
        }
        let name = &src[..open];
        let args: Vec<String> = src[open + 1..src.len() - 1]
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        Ok(Transform::from_name(name, &args))
    } else {
        Ok(Transform::from_name(src, &[]))
    }
}

/// Split on `|` outside parentheses.
fn split_pipeline(body: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in body.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if depth == 0 => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Peel a trailing `> name` variable binding off a segment. The marker only
/// counts when what follows it is a bare identifier, so CSS child
/// combinators in selectors pass through untouched.
fn strip_bind(segment: &str) -> (String, Option<String>) {
    for (pos, _) in segment.char_indices().rev().filter(|(_, c)| *c == '>') {
        // The '>' of a '=>' arrow is never a binding marker.
        if segment[..pos].ends_with('=') {
            continue;
        }
        let candidate = segment[pos + 1..].trim();
        if !candidate.is_empty() && candidate.chars().all(is_ident_char) {
            return (
                segment[..pos].trim_end().to_string(),
                Some(candidate.to_string()),
            );
        }
        // Suffixes only grow leftward, so no '>' further left can bind.
        break;
    }
    (segment.to_string(), None)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
