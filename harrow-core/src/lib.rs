//! Batteries for running harrow configurations: the bundled static-HTML
//! provider, output sinks, and run orchestration on top of the engine.

pub mod run;
pub mod sink;
pub mod static_provider;
pub mod summary;

pub use run::{execute_run, RunOutcome};
pub use sink::{OutputFormat, ResolvedOutput, SinkTransform, TransformRegistry};
pub use static_provider::StaticProvider;
pub use summary::RunSummary;
