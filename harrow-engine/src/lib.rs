//! Declarative raking core: a configuration describes pages to visit,
//! elements to locate, actions to perform and values to extract; the
//! engine interprets it against a page automation provider and merges
//! everything it finds into one shared result tree.

pub mod actions;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod keypath;
pub mod links;
pub mod notation;
pub mod provider;
pub mod scheduler;
pub mod state;
pub mod transforms;
pub mod value;

pub use config::Config;
pub use error::{EngineError, Result};
pub use interpreter::Session;
pub use provider::{ElementHandle, EngineKind, PageProvider, PageSession, SessionOptions};
pub use scheduler::{Engine, RunReport};
pub use state::{LinkRegistry, SharedState, VisitTarget};
pub use value::Evaluated;
