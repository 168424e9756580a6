//! Prometheus metrics for the orchestration loop
//!
//! Registered lazily on first use; all counters start at zero when the
//! process boots.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Histogram,
    HistogramVec,
};

lazy_static! {
    /// Completed user turns, by terminal state.
    ///
    /// Labels:
    /// - state: "succeeded", "escalated", "infra_failed", "faulted"
    pub static ref TURNS: CounterVec = register_counter_vec!(
        "abacus_turns_total",
        "Completed user turns by terminal state",
        &["state"]
    ).expect("failed to register TURNS metric");

    /// Code executions in the sandbox, by execution status.
    ///
    /// Labels:
    /// - status: "success", "error", "timeout"
    pub static ref CODE_EXECUTIONS: CounterVec = register_counter_vec!(
        "abacus_code_executions_total",
        "Code executions in the sandbox by status",
        &["status"]
    ).expect("failed to register CODE_EXECUTIONS metric");

    /// Repair rounds consumed per failed execution before the loop exited.
    pub static ref REPAIR_ROUNDS: Histogram = register_histogram!(
        "abacus_repair_rounds",
        "Repair rounds consumed per failed execution",
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 10.0]
    ).expect("failed to register REPAIR_ROUNDS metric");

    /// Wall-clock time of a single LLM call, by model.
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "abacus_llm_call_seconds",
        "Wall-clock time of a single LLM call",
        &["model"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register LLM_CALL_TIME metric");
}
