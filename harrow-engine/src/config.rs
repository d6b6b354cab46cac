// Strongly typed configuration model. The on-disk document is YAML or
// JSON; polymorphic spots (node-or-group, count-or-conditions,
// string-or-object links) are untagged enums so the loose source format
// deserializes into one validated shape.

use crate::error::{EngineError, Result};
use crate::notation::{Accessor, Cardinality, Context};
use crate::transforms::Transform;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Ordered page specs, processed strictly sequentially.
    #[serde(default, rename = "rake")]
    pub pages: Vec<PageSpec>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: bool,
    /// Concurrency budget: visit queue capacity and worker count.
    #[serde(default = "default_race")]
    pub race: usize,
}

fn default_race() -> usize {
    1
}

impl Config {
    /// Load a configuration document, picking the parser by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let config: Config = match ext.as_str() {
            "yml" | "yaml" => serde_yaml::from_str(&raw)
                .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?,
            "json" => serde_json::from_str(&raw)
                .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?,
            other => {
                return Err(EngineError::Config(format!(
                    "unsupported config file type '.{}': {}",
                    other,
                    path.display()
                )));
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Shape checks that are cheaper to run once at load time than on
    /// every access during traversal.
    pub fn validate(&self) -> Result<()> {
        if self.race == 0 {
            return Err(EngineError::Config(
                "race must be at least 1".into(),
            ));
        }

        if let Some(viewport) = &self.browser.viewport {
            if viewport.len() != 2 {
                return Err(EngineError::Config(format!(
                    "browser.viewport takes [width, height], found {} entries",
                    viewport.len()
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BrowserConfig {
    /// Engine kind understood by the page automation provider.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Run visibly instead of headless.
    #[serde(default)]
    pub show: bool,
    /// Slow-motion factor in milliseconds per operation.
    pub slowdown: Option<u64>,
    pub viewport: Option<Vec<u32>>,
    /// Resource kinds the provider should refuse to load.
    #[serde(default)]
    pub block: Vec<String>,
    /// Navigation readiness condition, provider-defined.
    pub ready_on: Option<String>,
    /// Navigation timeout in milliseconds.
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageSpec {
    pub link: LinkSpec,
    pub interact: Option<InteractSpec>,
}

/// A page's link field: a URL, a URL with metadata, a mixed list, or a
/// `$group` reference into the link registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LinkSpec {
    Many(Vec<LinkEntry>),
    One(LinkEntry),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LinkEntry {
    Url(String),
    Target {
        url: String,
        #[serde(default)]
        metadata: BTreeMap<String, Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractSpec {
    pub repeat: Option<RepeatSpec>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RepeatSpec {
    Count(u64),
    While(Vec<RepeatCondition>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepeatCondition {
    pub value: ValueGetter,
    /// `[operator, operand]`; entries of any other shape are skipped.
    #[serde(rename = "while", default)]
    pub guard: Vec<Value>,
}

/// A node list entry: a single node spec or an ordered alternative group
/// where only the first spec with a nonzero match count runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NodeEntry {
    Group(Vec<NodeSpec>),
    Node(NodeSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub selector: String,
    /// Display name; defaults to the selector when absent.
    pub name: Option<String>,
    /// Visit every ranged element instead of just the first.
    #[serde(default)]
    pub all: bool,
    /// `[start, stop, step]`, each position optionally `'_'` for its
    /// default of `(0, match count, 1)`.
    #[serde(default)]
    pub range: Vec<RangeBound>,
    /// Keep only elements containing this text.
    pub contains: Option<String>,
    /// Drop elements containing this text.
    pub excludes: Option<String>,
    /// Block until a match appears, failing after this many milliseconds.
    pub wait: Option<u64>,
    /// Scroll each selected element into view first.
    #[serde(default)]
    pub show: bool,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub links: Vec<LinkCollectSpec>,
    #[serde(default)]
    pub data: Vec<DataSpec>,
    pub interact: Option<Box<InteractSpec>>,
}

impl NodeSpec {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.selector)
    }
}

/// One bound of a range triple: a number, or `'_'` meaning "default".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    At(usize),
    Default,
}

impl<'de> Deserialize<'de> for RangeBound {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let v = Value::deserialize(deserializer)?;
        match v {
            Value::Number(n) => n
                .as_u64()
                .map(|n| RangeBound::At(n as usize))
                .ok_or_else(|| D::Error::custom("range bounds must be non-negative integers")),
            Value::String(s) if s == "_" => Ok(RangeBound::Default),
            other => Err(D::Error::custom(format!(
                "range bounds are integers or '_', found {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds to wait before each repetition.
    pub delay: Option<u64>,
    /// Milliseconds to wait after each repetition.
    pub wait: Option<u64>,
    /// Template for the screenshot path, evaluated before the action fires.
    pub screenshot: Option<String>,
    /// Bypass action semantics and dispatch the named event directly.
    #[serde(default)]
    pub dispatch: bool,
    pub count: Option<CountSpec>,
    #[serde(default)]
    pub options: ClickOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CountSpec {
    Fixed(u64),
    Template(String),
    Query(AttrQuery),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClickOptions {
    pub button: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSpec {
    /// Scope expression locating the write in the result tree.
    pub scope: String,
    pub value: DataValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Template(String),
    Many(Vec<String>),
    // Ordered before Map: a structured query always carries `attribute`,
    // which the map shape cannot require.
    Query(AttrQuery),
    Map(BTreeMap<String, ValueGetter>),
}

/// A value source: a template string or a structured attribute query.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValueGetter {
    Template(String),
    Query(AttrQuery),
}

/// Structured form of an attribute getter, mirroring the `attr{...}`
/// notation field for field.
#[derive(Debug, Clone, Deserialize)]
pub struct AttrQuery {
    pub attribute: String,
    /// 1-based child node index.
    pub child_node: Option<usize>,
    /// `parent` (default) or `page`.
    pub context: Option<String>,
    #[serde(default)]
    pub all: bool,
    pub selector: Option<String>,
    #[serde(default)]
    pub utils: Vec<UtilSpec>,
    pub set_var: Option<String>,
}

/// One transform pipeline entry in structured form: a bare name, or a
/// single-entry map of name to argument list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UtilSpec {
    Name(String),
    WithArgs(BTreeMap<String, Vec<String>>),
}

impl AttrQuery {
    /// Lower the structured query into the same accessor the string
    /// notation parses to.
    pub fn to_accessor(&self) -> Result<Accessor> {
        let context = match self.context.as_deref() {
            None => None,
            Some("parent") => Some(Context::Parent),
            Some("page") => Some(Context::Page),
            Some(other) => {
                return Err(EngineError::Config(format!(
                    "unsupported attribute context: {}",
                    other
                )));
            }
        };

        let mut transforms = Vec::new();
        for util in &self.utils {
            match util {
                UtilSpec::Name(name) => transforms.push(Transform::from_name(name, &[])),
                UtilSpec::WithArgs(map) => {
                    for (name, args) in map {
                        transforms.push(Transform::from_name(name, args));
                    }
                }
            }
        }

        Ok(Accessor {
            selector: self.selector.clone(),
            context,
            cardinality: if self.all {
                Some(Cardinality::All)
            } else {
                None
            },
            child_node: self.child_node,
            property: self.attribute.clone(),
            transforms,
            bind: self.set_var.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkCollectSpec {
    /// Registry group the collected links append to.
    pub name: String,
    /// Template producing one URL or a list of URLs.
    pub url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default = "default_output_name")]
    pub name: String,
    #[serde(default)]
    pub formats: Vec<OutputFormatSpec>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            path: default_output_path(),
            name: default_output_name(),
            formats: Vec::new(),
        }
    }
}

fn default_output_path() -> String {
    "./".to_string()
}

fn default_output_name() -> String {
    "harrow_output".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OutputFormatSpec {
    Name(String),
    Full {
        #[serde(rename = "type")]
        kind: String,
        transform: Option<String>,
    },
}

impl OutputFormatSpec {
    pub fn kind(&self) -> &str {
        match self {
            OutputFormatSpec::Name(name) => name,
            OutputFormatSpec::Full { kind, .. } => kind,
        }
    }

    pub fn transform(&self) -> Option<&str> {
        match self {
            OutputFormatSpec::Name(_) => None,
            OutputFormatSpec::Full { transform, .. } => transform.as_deref(),
        }
    }
}
