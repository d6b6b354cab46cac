// The page automation capability the interpreter drives. Implementations
// live outside the engine; the bundled one speaks static HTML over HTTP,
// real-browser providers plug in through the same traits.

use crate::config::{BrowserConfig, ClickOptions};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Browser engine families a provider may offer, plus the bundled static
/// fetcher. Anything else in `browser.type` is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Static,
    Chromium,
    Firefox,
    Webkit,
}

impl EngineKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "static" => Ok(EngineKind::Static),
            "chromium" => Ok(EngineKind::Chromium),
            "firefox" => Ok(EngineKind::Firefox),
            "webkit" => Ok(EngineKind::Webkit),
            other => Err(EngineError::Config(format!(
                "unsupported or invalid browser type: {}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Static => "static",
            EngineKind::Chromium => "chromium",
            EngineKind::Firefox => "firefox",
            EngineKind::Webkit => "webkit",
        }
    }
}

/// Per-session options derived from the `browser` config section.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Run without a visible window. Meaningless to non-browser providers.
    pub headless: bool,
    /// Milliseconds of slow-motion per operation, for watching a visible run.
    pub slowdown_ms: Option<u64>,
    pub viewport: Option<(u32, u32)>,
    pub blocked_resources: Vec<String>,
    pub ready_on: Option<String>,
    pub navigation_timeout_ms: Option<u64>,
}

impl SessionOptions {
    pub fn from_browser_config(browser: &BrowserConfig) -> Self {
        SessionOptions {
            headless: !browser.show,
            slowdown_ms: browser.slowdown,
            viewport: browser
                .viewport
                .as_ref()
                .filter(|v| v.len() == 2)
                .map(|v| (v[0], v[1])),
            blocked_resources: browser.block.clone(),
            ready_on: browser.ready_on.clone(),
            navigation_timeout_ms: browser.timeout,
        }
    }
}

/// An element's bounding rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Horizontal and vertical midpoint.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[async_trait]
pub trait PageProvider: Send + Sync {
    /// Open an isolated page session.
    async fn open_session(&self, options: &SessionOptions) -> Result<Box<dyn PageSession>>;

    /// Release everything the provider holds. Called exactly once at the
    /// end of a run, success or failure.
    async fn shutdown(&self) -> Result<()>;
}

#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Locate all elements matching `selector`, keeping only those whose
    /// text contains `has_text` and not `has_not_text`.
    async fn locate(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
    ) -> Result<Vec<Box<dyn ElementHandle>>>;

    /// Block until at least one match appears or the timeout elapses.
    async fn wait_for(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
        timeout_ms: u64,
    ) -> Result<()>;

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()>;
    async fn mouse_down(&self) -> Result<()>;
    async fn mouse_up(&self) -> Result<()>;

    async fn screenshot(&self, path: &str, full_page: bool) -> Result<()>;

    fn current_url(&self) -> String;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// Read a named property (`text`, `href`, `src`, ...), optionally from
    /// the element's Nth child node (1-based). Unknown properties read as
    /// null.
    async fn read_property(&self, name: &str, child_node: Option<usize>) -> Result<Value>;

    async fn is_visible(&self) -> Result<bool>;
    async fn is_disabled(&self) -> Result<bool>;
    async fn bounding_box(&self) -> Result<Rect>;
    async fn scroll_into_view(&self) -> Result<()>;
    async fn dispatch_event(&self, event: &str) -> Result<()>;
    async fn click(&self, options: &ClickOptions) -> Result<()>;

    /// Locate descendants of this element.
    async fn locate(
        &self,
        selector: &str,
        has_text: Option<&str>,
        has_not_text: Option<&str>,
    ) -> Result<Vec<Box<dyn ElementHandle>>>;
}
