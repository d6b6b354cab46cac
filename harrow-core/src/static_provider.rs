// The bundled provider: plain HTTP fetches parsed with scraper. Pages
// are immutable snapshots, so anything that would require a live DOM
// (clicks, events, screenshots) reports itself as unsupported instead
// of silently doing nothing.

use async_trait::async_trait;
use harrow_engine::config::ClickOptions;
use harrow_engine::provider::{ElementHandle, PageProvider, PageSession, Rect, SessionOptions};
use harrow_engine::{EngineError, Result};
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub struct StaticProvider {
    client: Client,
}

impl StaticProvider {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("harrow/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS / 2))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| EngineError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(StaticProvider { client })
    }
}

#[async_trait]
impl PageProvider for StaticProvider {
    async fn open_session(&self, options: &SessionOptions) -> Result<Box<dyn PageSession>> {
        Ok(Box::new(StaticSession {
            client: self.client.clone(),
            html: String::new(),
            url: String::new(),
            timeout: options.navigation_timeout_ms.map(Duration::from_millis),
            ready_on: options.ready_on.clone(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct StaticSession {
    client: Client,
    html: String,
    url: String,
    timeout: Option<Duration>,
    ready_on: Option<String>,
}

#[async_trait]
impl PageSession for StaticSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!(url, "fetching page");

        let mut request = self.client.get(url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Navigation(format!("{}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Navigation(format!("{}: HTTP {}", url, status)));
        }

        self.html = response
            .text()
            .await
            .map_err(|e| EngineError::Navigation(format!("{}: {}", url, e)))?;
        self.url = url.to_string();

        if let Some(ready_on) = self.ready_on.clone() {
            // Static documents never change after the fetch, so this is a
            // single check rather than a wait.
            if select_in_document(&self.html, &ready_on, None, None)?.is_empty() {
                warn!(selector = %ready_on, url, "ready_on selector absent from fetched page");
            }
        }

        Ok(())
    }

    async fn locate(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
    ) -> Result<Vec<Box<dyn ElementHandle>>> {
        Ok(boxed(select_in_document(
            &self.html,
            selector,
            has_text,
            has_not_text,
        )?))
    }

    async fn wait_for(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
        timeout_ms: u64,
    ) -> Result<()> {
        // The document cannot gain elements over time, so an empty match
        // now is already a timeout.
        if select_in_document(&self.html, selector, has_text, has_not_text)?.is_empty() {
            return Err(EngineError::WaitTimeout {
                selector: selector.to_string(),
                timeout_ms,
            });
        }
        Ok(())
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<()> {
        Err(unsupported("mouse input"))
    }

    async fn mouse_down(&self) -> Result<()> {
        Err(unsupported("mouse input"))
    }

    async fn mouse_up(&self) -> Result<()> {
        Err(unsupported("mouse input"))
    }

    async fn screenshot(&self, _path: &str, _full_page: bool) -> Result<()> {
        Err(unsupported("screenshots"))
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.html.clear();
        Ok(())
    }
}

/// Owned snapshot of one matched element. Nested lookups re-parse the
/// captured inner HTML; `scraper` documents are not `Send`, so nothing
/// borrowed from one may cross an await point.
struct StaticElement {
    inner_html: String,
    text: String,
    attrs: HashMap<String, String>,
    child_nodes: Vec<ChildSnapshot>,
}

/// One child node in document order: an element, or a text run.
/// Whitespace-only text runs between elements are dropped so indices
/// match what a reader of the markup would count.
struct ChildSnapshot {
    text: String,
    attrs: HashMap<String, String>,
}

impl StaticElement {
    fn snapshot(element: ElementRef<'_>) -> Self {
        let child_nodes = element
            .children()
            .filter_map(|node| match node.value() {
                Node::Text(t) if !t.text.trim().is_empty() => Some(ChildSnapshot {
                    text: t.text.to_string(),
                    attrs: HashMap::new(),
                }),
                Node::Element(_) => ElementRef::wrap(node).map(|el| ChildSnapshot {
                    text: el.text().collect(),
                    attrs: el
                        .value()
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                }),
                _ => None,
            })
            .collect();

        StaticElement {
            inner_html: element.inner_html(),
            text: element.text().collect::<String>(),
            attrs: element
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            child_nodes,
        }
    }
}

#[async_trait]
impl ElementHandle for StaticElement {
    async fn read_property(&self, name: &str, child_node: Option<usize>) -> Result<Value> {
        if let Some(nth) = child_node {
            let Some(child) = nth.checked_sub(1).and_then(|i| self.child_nodes.get(i)) else {
                return Ok(Value::Null);
            };
            return Ok(match name {
                "text" => Value::String(child.text.trim().to_string()),
                attr => child
                    .attrs
                    .get(attr)
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null),
            });
        }

        match name {
            "text" => Ok(Value::String(self.text.trim().to_string())),
            "html" => Ok(Value::String(self.inner_html.clone())),
            attr => Ok(self
                .attrs
                .get(attr)
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null)),
        }
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(!self.attrs.contains_key("hidden"))
    }

    async fn is_disabled(&self) -> Result<bool> {
        Ok(self.attrs.contains_key("disabled"))
    }

    async fn bounding_box(&self) -> Result<Rect> {
        Ok(Rect::default())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        Ok(())
    }

    async fn dispatch_event(&self, _event: &str) -> Result<()> {
        Err(unsupported("event dispatch"))
    }

    async fn click(&self, _options: &ClickOptions) -> Result<()> {
        Err(unsupported("clicking"))
    }

    async fn locate(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
    ) -> Result<Vec<Box<dyn ElementHandle>>> {
        Ok(boxed(select_in_fragment(
            &self.inner_html,
            selector,
            has_text,
            has_not_text,
        )?))
    }
}

fn unsupported(what: &str) -> EngineError {
    EngineError::Unsupported(format!(
        "{} requires a browser provider; the static provider only reads pages",
        what
    ))
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| EngineError::Provider(format!("invalid selector {:?}: {}", selector, e)))
}

fn select_in_document(
    html: &str,
    selector: &str,
    has_text: Option<&str>,
    has_not_text: Option<&str>,
) -> Result<Vec<StaticElement>> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(html);
    Ok(collect(document.select(&parsed), has_text, has_not_text))
}

fn select_in_fragment(
    html: &str,
    selector: &str,
    has_text: Option<&str>,
    has_not_text: Option<&str>,
) -> Result<Vec<StaticElement>> {
    let parsed = parse_selector(selector)?;
    let fragment = Html::parse_fragment(html);
    Ok(collect(fragment.select(&parsed), has_text, has_not_text))
}

fn collect<'a>(
    matches: impl Iterator<Item = ElementRef<'a>>,
    has_text: Option<&str>,
    has_not_text: Option<&str>,
) -> Vec<StaticElement> {
    matches
        .map(StaticElement::snapshot)
        .filter(|e| {
            has_text.is_none_or(|t| e.text.contains(t))
                && has_not_text.is_none_or(|t| !e.text.contains(t))
        })
        .collect()
}

fn boxed(elements: Vec<StaticElement>) -> Vec<Box<dyn ElementHandle>> {
    elements
        .into_iter()
        .map(|e| Box::new(e) as Box<dyn ElementHandle>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
            <div class="card" data-id="7">
                <h2>First</h2>
                <a href="/one?x=1" disabled>read</a>
            </div>
            <div class="card" hidden>
                <h2>Second</h2>
            </div>
        </body></html>
    "#;

    #[tokio::test]
    async fn selects_and_snapshots_elements() {
        let cards = select_in_document(PAGE, ".card", None, None).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].attrs.get("data-id"), Some(&"7".to_string()));

        let prop = cards[0].read_property("data-id", None).await.unwrap();
        assert_eq!(prop, Value::String("7".into()));
    }

    #[tokio::test]
    async fn text_filters_apply_to_whole_subtree_text() {
        let cards = select_in_document(PAGE, ".card", Some("First"), None).unwrap();
        assert_eq!(cards.len(), 1);
        let none = select_in_document(PAGE, ".card", Some("First"), Some("read")).unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn nested_locate_reparses_inner_html() {
        let cards = select_in_document(PAGE, ".card", None, None).unwrap();
        let links = cards[0].locate("a", None, None).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(
            links[0].read_property("href", None).await.unwrap(),
            Value::String("/one?x=1".into())
        );
        assert!(links[0].is_disabled().await.unwrap());
    }

    #[tokio::test]
    async fn child_node_reads_are_one_based() {
        let cards = select_in_document(PAGE, ".card", None, None).unwrap();
        let first = cards[0].read_property("text", Some(1)).await.unwrap();
        assert_eq!(first, Value::String("First".into()));
        let missing = cards[0].read_property("text", Some(9)).await.unwrap();
        assert_eq!(missing, Value::Null);
    }

    #[tokio::test]
    async fn child_nodes_include_text_runs_in_document_order() {
        let page = r#"<html><body><p class="note">lead <b data-k="v">bold</b> tail</p></body></html>"#;
        let notes = select_in_document(page, ".note", None, None).unwrap();
        let note = &notes[0];

        assert_eq!(
            note.read_property("text", Some(1)).await.unwrap(),
            Value::String("lead".into())
        );
        assert_eq!(
            note.read_property("text", Some(2)).await.unwrap(),
            Value::String("bold".into())
        );
        assert_eq!(
            note.read_property("text", Some(3)).await.unwrap(),
            Value::String("tail".into())
        );
        assert_eq!(
            note.read_property("data-k", Some(2)).await.unwrap(),
            Value::String("v".into())
        );
        // Text runs carry no attributes.
        assert_eq!(note.read_property("href", Some(1)).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn hidden_attribute_marks_invisible() {
        let cards = select_in_document(PAGE, ".card", None, None).unwrap();
        assert!(cards[0].is_visible().await.unwrap());
        assert!(!cards[1].is_visible().await.unwrap());
    }

    #[test]
    fn invalid_selector_is_a_provider_error() {
        assert!(matches!(
            select_in_document(PAGE, ":::nope", None, None),
            Err(EngineError::Provider(_))
        ));
    }
}
