//! Natural-language financial report agent core
//!
//! A user states an intent in Chinese ("导出贵州茅台2023年1月的日线到Excel并画图"),
//! and this crate resolves it into a runnable data-fetch/transform/export
//! script, executes it in an isolated subprocess, and surfaces the produced
//! artifact (spreadsheet or chart), self-correcting on failure.
//!
//! Components:
//!
//! - [`intent`] — free text → structured request (entity, dates, actions)
//! - [`knowledge`] — textual schema context for the generation prompt
//! - [`runner`] — subprocess execution with preamble, timeout, output capture
//! - [`engine`] — the generate → execute → observe → repair loop
//! - [`locator`] — resolving the produced artifact path
//! - [`fallback`] — deterministic last-resort script template

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fallback;
pub mod intent;
pub mod knowledge;
pub mod locator;
pub mod prompts;
pub mod runner;
pub mod symbols;

pub use config::AgentConfig;
pub use engine::{AgentEngine, RunOutcome, StopFlag};
pub use error::{AgentError, Result};
pub use event::{ChannelSink, CollectingSink, EventSink, LifecycleEvent};
pub use intent::{Actions, ExtractionHints, Intent};
pub use runner::{ExecutionResult, ScriptRunner};
pub use symbols::{StaticSymbolTable, SymbolLookup};
