//! Execution engine: persistent sandboxed interpreter, outcome model,
//! notebook export
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──execute(code)──► PyKernel ──JSON line──► python3 driver
//!                                     ▲                        │
//!                                     └──── reply line ────────┘
//!          ExecutionResult {sign, human_message, raw_output}
//!                        │
//!                   classify() ──► Success | ExecutionError
//!                                  | SemanticCheckRequested | InfraFailure
//! ```

pub mod engine;
pub mod notebook;
pub mod outcome;

pub use engine::{KernelError, PyKernel, Runner};
pub use notebook::NotebookCell;
pub use outcome::{classify, ExecutionResult, Outcome, Sign, SEMANTIC_CHECK_MARKER};
