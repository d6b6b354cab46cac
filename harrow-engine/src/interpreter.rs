// Recursive-descent executor over the node/interaction grammar. One
// `Session` per visit target: it owns the page session and the exclusive
// variable scope, and writes through the shared state.

use crate::config::{
    DataSpec, DataValue, InteractSpec, LinkCollectSpec, NodeEntry, NodeSpec, PageSpec,
    RangeBound, RepeatCondition, RepeatSpec, ValueGetter,
};
use crate::error::{EngineError, Result};
use crate::notation::{self, Accessor, Cardinality, Context, Part};
use crate::provider::{ElementHandle, PageSession};
use crate::state::{SharedState, VisitTarget};
use crate::transforms::{self, slugify};
use crate::value::{as_number, stringify, Evaluated};
use colored::Colorize;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// How often a configured `wait` re-checks for matches.
const WAIT_POLL_MS: u64 = 50;

pub struct Session {
    pub(crate) page: Box<dyn PageSession>,
    pub(crate) vars: HashMap<String, Value>,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) logging: bool,
}

impl Session {
    pub fn new(
        page: Box<dyn PageSession>,
        target: &VisitTarget,
        shared: Arc<SharedState>,
        logging: bool,
    ) -> Self {
        let mut vars: HashMap<String, Value> = target
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.insert("_url".to_string(), Value::String(target.url.clone()));

        Session {
            page,
            vars,
            shared,
            logging,
        }
    }

    /// Navigate to the visit target and walk its interaction spec.
    pub async fn run(&mut self, spec: &PageSpec, url: &str) -> Result<()> {
        let Some(interact) = &spec.interact else {
            return Ok(());
        };

        if self.logging {
            println!("{} {}", "Opening a new page:".green().bold(), url.blue());
        }
        info!(url, "opening page");

        self.page.navigate(url).await?;
        self.interact(interact, None).await
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.logging {
            println!("{} {}", "Closing page:".yellow(), self.page.current_url().blue());
        }
        debug!(url = %self.page.current_url(), "closing page");
        self.page.close().await
    }

    /// Run an interaction spec: once, a fixed number of times, or while
    /// every guard condition holds (checked before each iteration, so
    /// zero iterations are possible).
    pub fn interact<'a>(
        &'a mut self,
        spec: &'a InteractSpec,
        root: Option<&'a dyn ElementHandle>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            match &spec.repeat {
                Some(RepeatSpec::Count(n)) => {
                    for _ in 0..*n {
                        self.browse(&spec.nodes, root).await?;
                    }
                }
                Some(RepeatSpec::While(conditions)) => {
                    while self.should_repeat(conditions).await? {
                        self.browse(&spec.nodes, root).await?;
                    }
                }
                None => self.browse(&spec.nodes, root).await?,
            }
            Ok(())
        }
        .boxed()
    }

    /// Walk one node list. Each entry is a node or an alternative group;
    /// within a group the first spec with a nonzero match count wins and
    /// the rest are ignored.
    async fn browse(
        &mut self,
        nodes: &[NodeEntry],
        root: Option<&dyn ElementHandle>,
    ) -> Result<()> {
        for entry in nodes {
            let alternatives: &[NodeSpec] = match entry {
                NodeEntry::Group(group) => group,
                NodeEntry::Node(node) => std::slice::from_ref(node),
            };

            for node in alternatives {
                self.vars.insert(
                    "_node".to_string(),
                    Value::String(slugify(node.display_name())),
                );

                if self.logging {
                    println!(
                        "{} {}",
                        "Interacting with:".green(),
                        node.selector.white().dimmed()
                    );
                }
                debug!(selector = %node.selector, "interacting with node");

                if let Some(timeout_ms) = node.wait {
                    self.wait_for_node(node, root, timeout_ms).await?;
                }

                let elements = self.locate_node(node, root).await?;
                let count = elements.len();
                if count == 0 {
                    continue;
                }

                let (start, stop, step) = resolve_range(&node.range, count);
                let start = start.min(count);
                let stop = stop.min(count).max(start);
                let ranged = &elements[start..stop];
                let selected = if node.all {
                    ranged
                } else {
                    &ranged[..ranged.len().min(1)]
                };

                let mut i = 0;
                while i < selected.len() {
                    self.vars.insert("_nth".to_string(), json!(i));
                    let element = selected[i].as_ref();

                    if node.show {
                        element.scroll_into_view().await?;
                    }

                    self.run_actions(&node.actions, element).await?;

                    if !node.links.is_empty() {
                        self.collect_links(element, &node.links).await?;
                    }
                    if !node.data.is_empty() {
                        self.extract_data(element, &node.data, node.all).await?;
                    }
                    if let Some(nested) = &node.interact {
                        self.interact(nested, Some(element)).await?;
                    }

                    i += step.max(1);
                }

                // First alternative with matches wins.
                break;
            }
        }

        Ok(())
    }

    async fn locate_node(
        &self,
        node: &NodeSpec,
        root: Option<&dyn ElementHandle>,
    ) -> Result<Vec<Box<dyn ElementHandle>>> {
        let has_text = node.contains.as_deref();
        let has_not_text = node.excludes.as_deref();
        match root {
            Some(element) => element.locate(&node.selector, has_text, has_not_text).await,
            None => self.page.locate(&node.selector, has_text, has_not_text).await,
        }
    }

    /// Block until the node has at least one match or the timeout
    /// elapses. Timeouts are fatal, matching every other explicit wait.
    async fn wait_for_node(
        &self,
        node: &NodeSpec,
        root: Option<&dyn ElementHandle>,
        timeout_ms: u64,
    ) -> Result<()> {
        if root.is_none() {
            return self
                .page
                .wait_for(
                    &node.selector,
                    node.contains.as_deref(),
                    node.excludes.as_deref(),
                    timeout_ms,
                )
                .await;
        }

        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if !self.locate_node(node, root).await?.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::WaitTimeout {
                    selector: node.selector.clone(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(Duration::from_millis(WAIT_POLL_MS)).await;
        }
    }

    /// Evaluate every guard in order; the loop continues only while all of
    /// them hold. Guards read from the document root, not the current
    /// node. Malformed guards are skipped.
    async fn should_repeat(&mut self, conditions: &[RepeatCondition]) -> Result<bool> {
        let roots = self.page.locate("html", None, None).await?;
        let Some(root) = roots.first() else {
            return Ok(false);
        };
        let root = root.as_ref();

        for condition in conditions {
            if condition.guard.len() != 2 {
                continue;
            }
            let Some(op) = condition.guard[0].as_str() else {
                continue;
            };
            let operand = &condition.guard[1];
            let value = self.getter_value(&condition.value, root).await?;

            match compare(op, &value, operand) {
                Some(true) => {}
                Some(false) => return Ok(false),
                None => {
                    warn!(operator = op, "unknown repeat operator, guard skipped");
                }
            }
        }

        Ok(true)
    }

    /// Resolve a value getter against an element: a template string with
    /// getters, a bare accessor body, or a structured attribute query.
    pub(crate) async fn getter_value(
        &mut self,
        getter: &ValueGetter,
        element: &dyn ElementHandle,
    ) -> Result<Value> {
        match getter {
            ValueGetter::Template(s) => {
                let template = notation::parse_template(s)?;
                if template.has_getters() {
                    Ok(self.evaluate_parsed(&template, element).await?.into_value())
                } else {
                    let accessor = notation::parse_body(s)?;
                    Ok(self.attribute(&accessor, element).await?.into_value())
                }
            }
            ValueGetter::Query(query) => {
                let accessor = query.to_accessor()?;
                Ok(self.attribute(&accessor, element).await?.into_value())
            }
        }
    }

    /// Evaluate a template against an element. Getters substitute
    /// textually unless one yields a list, in which case the template is
    /// abandoned and all list values concatenate.
    pub(crate) async fn evaluate(
        &mut self,
        template: &str,
        element: &dyn ElementHandle,
    ) -> Result<Evaluated> {
        let parsed = notation::parse_template(template)?;
        self.evaluate_parsed(&parsed, element).await
    }

    async fn evaluate_parsed(
        &mut self,
        template: &notation::Template,
        element: &dyn ElementHandle,
    ) -> Result<Evaluated> {
        let mut text = String::new();
        let mut lists: Vec<Value> = Vec::new();

        for part in &template.parts {
            match part {
                Part::Literal(s) => text.push_str(s),
                Part::Attr(accessor) => match self.attribute(accessor, element).await? {
                    Evaluated::One(v) => text.push_str(&stringify(&v)),
                    Evaluated::Many(vs) => lists.extend(vs),
                },
                Part::Var(accessor) => {
                    let value = self.var_value(accessor);
                    text.push_str(&stringify(&value));
                }
            }
        }

        if lists.is_empty() {
            Ok(Evaluated::One(Value::String(text)))
        } else {
            Ok(Evaluated::Many(lists))
        }
    }

    /// The attribute-resolution algorithm: optionally re-locate from the
    /// element or the page, short-circuit `count`, read the property off
    /// each match, run the pipeline, collapse to one value unless `all`.
    pub(crate) async fn attribute(
        &mut self,
        accessor: &Accessor,
        element: &dyn ElementHandle,
    ) -> Result<Evaluated> {
        let located: Option<Vec<Box<dyn ElementHandle>>> = match &accessor.selector {
            Some(selector) => Some(match accessor.context() {
                Context::Parent => element.locate(selector, None, None).await?,
                Context::Page => self.page.locate(selector, None, None).await?,
            }),
            None => None,
        };

        let targets: Vec<&dyn ElementHandle> = match &located {
            Some(boxed) => boxed.iter().map(|b| b.as_ref()).collect(),
            None => vec![element],
        };

        // `count` never reads a property; the pipeline applies to the
        // match count itself.
        if accessor.property == "count" {
            let counted = transforms::apply(&accessor.transforms, json!(targets.len()));
            let n = as_number(&counted).unwrap_or(0.0) as i64;
            return Ok(Evaluated::One(json!(n)));
        }

        let targets = match accessor.cardinality() {
            Cardinality::One => &targets[..targets.len().min(1)],
            Cardinality::All => &targets[..],
        };

        let mut values = Vec::with_capacity(targets.len());
        for target in targets {
            let raw = match accessor.property.as_str() {
                "disabled" => Value::Bool(target.is_disabled().await?),
                "visible" => Value::Bool(target.is_visible().await?),
                name => target.read_property(name, accessor.child_node).await?,
            };
            values.push(transforms::apply(&accessor.transforms, raw));
        }

        let result = match accessor.cardinality() {
            Cardinality::One => {
                let single = values
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| Value::String(String::new()));
                Evaluated::One(single)
            }
            Cardinality::All => Evaluated::Many(values),
        };

        if let Some(name) = &accessor.bind {
            self.vars.insert(name.clone(), result.clone().into_value());
        }

        Ok(result)
    }

    /// Variable getter: scope lookup plus the getter's own pipeline.
    /// Unset variables render empty.
    pub(crate) fn var_value(&self, accessor: &Accessor) -> Value {
        match self.vars.get(&accessor.property) {
            Some(value) => transforms::apply(&accessor.transforms, value.clone()),
            None => {
                debug!(name = %accessor.property, "variable not set, rendering empty");
                Value::Null
            }
        }
    }

    /// Evaluate a node's data list and merge each value into the shared
    /// result tree at its resolved scope.
    async fn extract_data(
        &mut self,
        element: &dyn ElementHandle,
        specs: &[DataSpec],
        all: bool,
    ) -> Result<()> {
        for spec in specs {
            let mut value = match &spec.value {
                DataValue::Template(template) => {
                    self.evaluate(template, element).await?.into_value()
                }
                DataValue::Many(templates) => {
                    let mut items = Vec::with_capacity(templates.len());
                    for template in templates {
                        items.push(self.evaluate(template, element).await?.into_value());
                    }
                    Value::Array(items)
                }
                DataValue::Query(query) => {
                    let accessor = query.to_accessor()?;
                    self.attribute(&accessor, element).await?.into_value()
                }
                DataValue::Map(entries) => {
                    let mut object = Map::new();
                    for (key, getter) in entries {
                        let v = match getter {
                            ValueGetter::Template(template) => {
                                self.evaluate(template, element).await?.into_value()
                            }
                            ValueGetter::Query(query) => {
                                let accessor = query.to_accessor()?;
                                self.attribute(&accessor, element).await?.into_value()
                            }
                        };
                        object.insert(key.clone(), v);
                    }
                    Value::Object(object)
                }
            };

            // Per-element writes under `all` wrap in a sequence so merges
            // accumulate instead of overwriting.
            if all {
                value = Value::Array(vec![value]);
            }
            if let Value::Array(items) = &value {
                if items.first() == Some(&Value::Null) {
                    value = Value::Array(Vec::new());
                }
            }

            // One critical section for resolve and write, so parallel
            // workers appending to the same sequence never land on the
            // same index.
            let path = self
                .shared
                .resolve_and_assign(&spec.scope, &self.vars, value, true)
                .await?;

            if self.logging {
                println!(
                    "{} {}",
                    "Extracting data to".green(),
                    crate::keypath::to_string(&path).cyan()
                );
            }
            debug!(scope = %crate::keypath::to_string(&path), "extracting data");
        }

        Ok(())
    }

    /// Evaluate a node's link list and append the discovered targets to
    /// the shared registry.
    async fn collect_links(
        &mut self,
        element: &dyn ElementHandle,
        specs: &[LinkCollectSpec],
    ) -> Result<()> {
        for spec in specs {
            let result = self.evaluate(&spec.url, element).await?;

            let mut metadata = std::collections::BTreeMap::new();
            for (key, template) in &spec.metadata {
                metadata.insert(
                    key.clone(),
                    self.evaluate(template, element).await?.into_value(),
                );
            }

            let entries = match result {
                Evaluated::One(v) => vec![VisitTarget {
                    url: self.absolutize(&stringify(&v)),
                    metadata,
                }],
                Evaluated::Many(vs) => vs
                    .iter()
                    .map(|v| VisitTarget {
                        url: self.absolutize(&stringify(v)),
                        metadata: metadata.clone(),
                    })
                    .collect(),
            };

            debug!(group = %spec.name, count = entries.len(), "collecting links");
            self.shared.append_links(&spec.name, entries).await;
        }

        Ok(())
    }

    /// Resolve a collected href against the page it was found on.
    /// Unresolvable values are kept as-is and left for navigation to
    /// reject.
    fn absolutize(&self, href: &str) -> String {
        if Url::parse(href).is_ok() {
            return href.to_string();
        }

        if let Some(Value::String(base)) = self.vars.get("_url")
            && let Ok(base) = Url::parse(base)
            && let Ok(joined) = base.join(href)
        {
            return joined.to_string();
        }

        href.to_string()
    }
}

/// Resolve a `[start, stop, step]` triple, each position defaulting to
/// `(0, max, 1)` when absent or `'_'`.
pub fn resolve_range(range: &[RangeBound], max: usize) -> (usize, usize, usize) {
    let pick = |i: usize, default: usize| match range.get(i) {
        Some(RangeBound::At(n)) => *n,
        Some(RangeBound::Default) | None => default,
    };
    (pick(0, 0), pick(1, max), pick(2, 1))
}

/// Compare an observed value against an operand. Numeric when both sides
/// read as numbers, textual otherwise. Unknown operators return None.
fn compare(op: &str, value: &Value, operand: &Value) -> Option<bool> {
    let eq = || value == operand || stringify(value) == stringify(operand);
    let ord = || -> std::cmp::Ordering {
        match (as_number(value), as_number(operand)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
            _ => stringify(value).cmp(&stringify(operand)),
        }
    };

    match op {
        "equal" | "is" => Some(eq()),
        "not_equal" | "not" => Some(!eq()),
        "greater_than" => Some(ord() == std::cmp::Ordering::Greater),
        "less_than" => Some(ord() == std::cmp::Ordering::Less),
        "greater_than_or_equal" => Some(ord() != std::cmp::Ordering::Less),
        "less_than_or_equal" => Some(ord() != std::cmp::Ordering::Greater),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_defaults_to_full_span() {
        assert_eq!(resolve_range(&[], 10), (0, 10, 1));
    }

    #[test]
    fn underscore_start_and_step_default() {
        let range = vec![RangeBound::Default, RangeBound::At(5), RangeBound::Default];
        assert_eq!(resolve_range(&range, 10), (0, 5, 1));
    }

    #[test]
    fn underscore_stop_defaults_to_max() {
        let range = vec![RangeBound::At(2), RangeBound::Default, RangeBound::At(2)];
        assert_eq!(resolve_range(&range, 10), (2, 10, 2));
    }

    #[test]
    fn compare_equal_and_aliases() {
        assert_eq!(compare("equal", &json!("a"), &json!("a")), Some(true));
        assert_eq!(compare("is", &json!("a"), &json!("b")), Some(false));
        assert_eq!(compare("not", &json!("a"), &json!("b")), Some(true));
        assert_eq!(compare("not_equal", &json!(1), &json!(1)), Some(false));
    }

    #[test]
    fn compare_is_numeric_when_both_sides_parse() {
        assert_eq!(compare("greater_than", &json!("10"), &json!(9)), Some(true));
        assert_eq!(compare("less_than", &json!("2"), &json!("10")), Some(true));
        assert_eq!(
            compare("greater_than_or_equal", &json!(3), &json!(3)),
            Some(true)
        );
        assert_eq!(
            compare("less_than_or_equal", &json!(4), &json!(3)),
            Some(false)
        );
    }

    #[test]
    fn compare_falls_back_to_text() {
        assert_eq!(compare("less_than", &json!("a"), &json!("b")), Some(true));
    }

    #[test]
    fn unknown_operator_is_none() {
        assert_eq!(compare("matches", &json!("a"), &json!("a")), None);
    }

    #[test]
    fn loose_equality_crosses_types() {
        assert_eq!(compare("equal", &json!(5), &json!("5")), Some(true));
    }
}
