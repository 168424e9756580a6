//! Abacus - an agentic loop for LLM-generated data analysis code
//!
//! This library drives a coder agent to produce Python code for user
//! requests, executes the code in a persistent sandboxed interpreter, and
//! repairs failures through an inspector agent, bounded by a configurable
//! attempt budget.
//!
//! # Modules
//!
//! - `llm` - Streaming chat-completion client for the agent endpoints
//! - `agent` - Prompt templates and per-agent message stores
//! - `kernel` - Persistent Python interpreter, outcome classification, notebook export
//! - `knowledge` - Optional snippet retrieval injected into coder requests
//! - `session` - Working context: cache directory, transcripts, live kernel
//! - `orchestrator` - The generate/execute/repair turn state machine
//! - `config` - Endpoint, model, and loop-budget configuration
//! - `metrics` - Prometheus metrics for observability
//!
//! # Quick Start
//!
//! ```ignore
//! use abacus::{Config, Orchestrator, Session, TurnInput};
//!
//! let config = Config::from_env();
//! let orchestrator = Orchestrator::from_config(&config);
//! let mut session = Session::open(config).await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! orchestrator
//!     .run_turn(&mut session, TurnInput::Message("plot y=x^2".into()), &tx)
//!     .await;
//! ```

pub mod agent;
pub mod config;
pub mod kernel;
pub mod knowledge;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use config::Config;
pub use kernel::{ExecutionResult, Outcome, PyKernel, Runner};
pub use orchestrator::{Orchestrator, TurnEvent, TurnInput, TurnReport, TurnState};
pub use session::{Artifact, Session};
