// In-memory page automation provider used by the engine tests. Pages are
// plain selector-to-element maps; element state (clicks, dispatched
// events) is shared through Arcs so tests can observe what the
// interpreter did.

#![allow(dead_code)]

use async_trait::async_trait;
use harrow_engine::config::ClickOptions;
use harrow_engine::error::{EngineError, Result};
use harrow_engine::provider::{ElementHandle, PageProvider, PageSession, Rect, SessionOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct MockElement {
    pub text: TextSource,
    pub attrs: HashMap<String, String>,
    pub disabled: bool,
    pub hidden: bool,
    pub children: HashMap<String, Vec<MockElement>>,
    pub clicks: Arc<AtomicUsize>,
    pub events: Arc<Mutex<Vec<String>>>,
}

/// Element text: fixed, or derived from the element's click counter so
/// repeat-condition tests can observe progress.
#[derive(Clone)]
pub enum TextSource {
    Static(String),
    ClickCount(Arc<AtomicUsize>),
}

impl Default for TextSource {
    fn default() -> Self {
        TextSource::Static(String::new())
    }
}

impl MockElement {
    pub fn with_text(text: &str) -> Self {
        MockElement {
            text: TextSource::Static(text.to_string()),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn child(mut self, selector: &str, elements: Vec<MockElement>) -> Self {
        self.children.insert(selector.to_string(), elements);
        self
    }

    pub fn counting_text(clicks: Arc<AtomicUsize>) -> Self {
        MockElement {
            text: TextSource::ClickCount(clicks.clone()),
            clicks,
            ..Default::default()
        }
    }

    fn text(&self) -> String {
        match &self.text {
            TextSource::Static(s) => s.clone(),
            TextSource::ClickCount(n) => n.load(Ordering::SeqCst).to_string(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockPage {
    pub selectors: HashMap<String, Vec<MockElement>>,
}

impl MockPage {
    pub fn with(mut self, selector: &str, elements: Vec<MockElement>) -> Self {
        self.selectors.insert(selector.to_string(), elements);
        self
    }
}

#[derive(Default)]
pub struct MockProvider {
    pages: Mutex<HashMap<String, MockPage>>,
    /// Currently open sessions and the highest count ever observed.
    pub open: Arc<AtomicUsize>,
    pub max_open: Arc<AtomicUsize>,
    pub shutdown_called: Arc<AtomicBool>,
    pub screenshots: Arc<Mutex<Vec<String>>>,
    /// Raw mouse traffic, one entry per primitive call.
    pub mouse: Arc<Mutex<Vec<String>>>,
    /// Slows navigation down so concurrency is observable.
    pub navigate_delay_ms: u64,
    /// Navigating to this URL fails, for partial-failure tests.
    pub fail_url: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, page: MockPage) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), page);
        self
    }

    pub fn with_navigate_delay(mut self, ms: u64) -> Self {
        self.navigate_delay_ms = ms;
        self
    }

    pub fn failing_on(mut self, url: &str) -> Self {
        self.fail_url = Some(url.to_string());
        self
    }
}

#[async_trait]
impl PageProvider for MockProvider {
    async fn open_session(&self, _options: &SessionOptions) -> Result<Box<dyn PageSession>> {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            pages: self.pages.lock().unwrap().clone(),
            current: None,
            url: String::new(),
            open: self.open.clone(),
            screenshots: self.screenshots.clone(),
            mouse: self.mouse.clone(),
            navigate_delay_ms: self.navigate_delay_ms,
            fail_url: self.fail_url.clone(),
            closed: false,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockSession {
    pages: HashMap<String, MockPage>,
    current: Option<MockPage>,
    url: String,
    open: Arc<AtomicUsize>,
    screenshots: Arc<Mutex<Vec<String>>>,
    mouse: Arc<Mutex<Vec<String>>>,
    navigate_delay_ms: u64,
    fail_url: Option<String>,
    closed: bool,
}

impl MockSession {
    fn select(&self, selector: &str) -> Vec<MockElement> {
        let Some(page) = &self.current else {
            return Vec::new();
        };
        if let Some(found) = page.selectors.get(selector) {
            return found.clone();
        }
        if selector == "html" {
            // Synthesized document root whose descendants are the page.
            return vec![MockElement {
                children: page.selectors.clone(),
                ..Default::default()
            }];
        }
        Vec::new()
    }
}

fn filter(elements: Vec<MockElement>, has_text: Option<&str>, has_not_text: Option<&str>) -> Vec<MockElement> {
    elements
        .into_iter()
        .filter(|e| {
            let text = e.text();
            has_text.is_none_or(|t| text.contains(t))
                && has_not_text.is_none_or(|t| !text.contains(t))
        })
        .collect()
}

fn boxed(elements: Vec<MockElement>) -> Vec<Box<dyn ElementHandle>> {
    elements
        .into_iter()
        .map(|e| Box::new(e) as Box<dyn ElementHandle>)
        .collect()
}

#[async_trait]
impl PageSession for MockSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        if self.navigate_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.navigate_delay_ms)).await;
        }
        if self.fail_url.as_deref() == Some(url) {
            return Err(EngineError::Navigation(format!("cannot reach {}", url)));
        }
        self.current = Some(self.pages.get(url).cloned().unwrap_or_default());
        self.url = url.to_string();
        Ok(())
    }

    async fn locate(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
    ) -> Result<Vec<Box<dyn ElementHandle>>> {
        Ok(boxed(filter(self.select(selector), has_text, has_not_text)))
    }

    async fn wait_for(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
        timeout_ms: u64,
    ) -> Result<()> {
        if filter(self.select(selector), has_text, has_not_text).is_empty() {
            return Err(EngineError::WaitTimeout {
                selector: selector.to_string(),
                timeout_ms,
            });
        }
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
        self.mouse.lock().unwrap().push(format!("move {} {}", x, y));
        Ok(())
    }

    async fn mouse_down(&self) -> Result<()> {
        self.mouse.lock().unwrap().push("down".to_string());
        Ok(())
    }

    async fn mouse_up(&self) -> Result<()> {
        self.mouse.lock().unwrap().push("up".to_string());
        Ok(())
    }

    async fn screenshot(&self, path: &str, _full_page: bool) -> Result<()> {
        self.screenshots.lock().unwrap().push(path.to_string());
        Ok(())
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl ElementHandle for MockElement {
    async fn read_property(&self, name: &str, _child_node: Option<usize>) -> Result<Value> {
        match name {
            "text" => Ok(Value::String(self.text())),
            other => Ok(self
                .attrs
                .get(other)
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null)),
        }
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(!self.hidden)
    }

    async fn is_disabled(&self) -> Result<bool> {
        Ok(self.disabled)
    }

    async fn bounding_box(&self) -> Result<Rect> {
        Ok(Rect {
            x: 40.0,
            y: 10.0,
            width: 120.0,
            height: 30.0,
        })
    }

    async fn scroll_into_view(&self) -> Result<()> {
        Ok(())
    }

    async fn dispatch_event(&self, event: &str) -> Result<()> {
        self.events.lock().unwrap().push(event.to_string());
        Ok(())
    }

    async fn click(&self, _options: &ClickOptions) -> Result<()> {
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn locate(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
    ) -> Result<Vec<Box<dyn ElementHandle>>> {
        let found = self.children.get(selector).cloned().unwrap_or_default();
        Ok(boxed(filter(found, has_text, has_not_text)))
    }
}
