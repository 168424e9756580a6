//! Turn orchestration: generation, execution, and the bounded repair loop
//!
//! ```text
//!   user input ──► coder ──► code? ──► kernel ──► classify
//!                    ▲                               │
//!                    │ repair request        error   │ success
//!                    └──── inspector ◄───────────────┤
//!                                                    ▼
//!                                       artifacts + explanation
//! ```
//!
//! Every turn runs to a terminal state. Execution errors are retried through
//! the inspector/coder repair loop at most `max_attempts` times, with one
//! configurable round that substitutes a fallback instruction for the
//! inspector. Kernel-level failures and orchestrator faults bypass the loop
//! and surface to the user.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

use crate::agent::prompts;
use crate::kernel::{classify, Outcome, Runner};
use crate::knowledge::{KnowledgeBase, SnippetRegistry};
use crate::llm::{ChatClient, Completion, LlmError};
use crate::metrics::{REPAIR_ROUNDS, TURNS};
use crate::session::Session;

/// One unit of user input driving a turn
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// A natural-language request for the coder
    Message(String),
    /// Code supplied by the user directly, executed without generation
    CodeOverride(String),
}

/// Streamed progress of a running turn
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A fragment of an agent reply, in arrival order
    Token(String),
    /// Orchestrator-authored text: execution output, apologies, failures
    Notice(String),
    /// A new file observed in the session cache directory
    Artifact(crate::session::Artifact),
    /// Terminal marker; always the last event of a turn
    Done(TurnReport),
}

/// Terminal state of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// The request completed, possibly after repairs
    Succeeded,
    /// The repair loop exhausted its attempts and handed back to the user
    Escalated,
    /// The execution backend failed; nothing to repair
    InfraFailed,
    /// The orchestrator itself faulted, e.g. the coder was unreachable
    Faulted,
}

impl TurnState {
    fn label(&self) -> &'static str {
        match self {
            TurnState::Succeeded => "succeeded",
            TurnState::Escalated => "escalated",
            TurnState::InfraFailed => "infra_failed",
            TurnState::Faulted => "faulted",
        }
    }
}

/// Summary of a completed turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnReport {
    pub state: TurnState,
    /// Sandbox executions performed, including the first attempt
    pub executions: usize,
    /// Repair rounds consumed
    pub repair_rounds: usize,
}

impl TurnReport {
    fn new() -> Self {
        Self {
            state: TurnState::Succeeded,
            executions: 0,
            repair_rounds: 0,
        }
    }
}

/// Error type for report generation
#[derive(Debug)]
pub enum ReportError {
    Llm(LlmError),
    Io(std::io::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Llm(e) => write!(f, "Report generation failed: {}", e),
            ReportError::Io(e) => write!(f, "Report write failed: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<LlmError> for ReportError {
    fn from(e: LlmError) -> Self {
        ReportError::Llm(e)
    }
}

impl From<std::io::Error> for ReportError {
    fn from(e: std::io::Error) -> Self {
        ReportError::Io(e)
    }
}

enum TurnAbort {
    /// The sandbox backend failed; the message goes to the user verbatim
    Infra(String),
    /// An agent call failed mid-turn
    Fault(LlmError),
}

/// Drives coder, inspector, and kernel through complete turns
pub struct Orchestrator<C: Completion = ChatClient> {
    coder: C,
    inspector: C,
    chat: C,
    knowledge: Option<SnippetRegistry>,
}

impl Orchestrator<ChatClient> {
    /// Wire up the three agent endpoints from configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            coder: ChatClient::new(
                &config.coder_base_url,
                &config.api_key,
                &config.coder_model,
            ),
            inspector: ChatClient::new(
                &config.inspector_base_url,
                &config.api_key,
                &config.inspector_model,
            ),
            chat: ChatClient::new(&config.chat_base_url, &config.api_key, &config.chat_model),
            knowledge: None,
        }
    }
}

impl<C: Completion> Orchestrator<C> {
    /// Build an orchestrator around explicit agent clients. Used by tests
    /// with scripted completions.
    pub fn with_clients(coder: C, inspector: C, chat: C) -> Self {
        Self {
            coder,
            inspector,
            chat,
            knowledge: None,
        }
    }

    pub fn with_knowledge(mut self, registry: SnippetRegistry) -> Self {
        self.knowledge = Some(registry);
        self
    }

    /// The attached snippet registry, for re-priming a cleared session
    pub fn knowledge(&self) -> Option<&SnippetRegistry> {
        self.knowledge.as_ref()
    }

    /// Run one complete turn against the session
    ///
    /// Progress is streamed over `events`; the returned report is also sent
    /// as the final [`TurnEvent::Done`]. A dropped receiver never aborts the
    /// turn.
    pub async fn run_turn<R: Runner>(
        &self,
        session: &mut Session<R>,
        input: TurnInput,
        events: &mpsc::Sender<TurnEvent>,
    ) -> TurnReport {
        let span = info_span!("turn", session_id = %session.id);
        let mut report = TurnReport::new();
        let outcome = self
            .turn_inner(session, input, events, &mut report)
            .instrument(span)
            .await;

        match outcome {
            Ok(()) => {}
            Err(TurnAbort::Infra(message)) => {
                report.state = TurnState::InfraFailed;
                let _ = events.send(TurnEvent::Notice(message)).await;
            }
            Err(TurnAbort::Fault(e)) => {
                warn!(error = %e, "turn faulted");
                report.state = TurnState::Faulted;
                // The transcript must stay alternating for the next turn.
                if session
                    .coder
                    .last()
                    .map(|m| m.role == "user")
                    .unwrap_or(false)
                {
                    session
                        .coder
                        .push_assistant(prompts::INTERNAL_ERROR_NOTICE.trim());
                }
                let _ = events
                    .send(TurnEvent::Notice(prompts::INTERNAL_ERROR_NOTICE.to_string()))
                    .await;
            }
        }

        TURNS.with_label_values(&[report.state.label()]).inc();
        info!(
            state = report.state.label(),
            executions = report.executions,
            repair_rounds = report.repair_rounds,
            "turn finished"
        );
        let _ = events.send(TurnEvent::Done(report)).await;
        report
    }

    async fn turn_inner<R: Runner>(
        &self,
        session: &mut Session<R>,
        input: TurnInput,
        events: &mpsc::Sender<TurnEvent>,
        report: &mut TurnReport,
    ) -> Result<(), TurnAbort> {
        let code = match input {
            TurnInput::Message(text) => {
                let augmentation = self
                    .knowledge
                    .as_ref()
                    .and_then(|kb| kb.retrieve(&text))
                    .map(|snippet| snippet.render());
                session.coder.push_user(text);
                let messages = session.coder.augmented(augmentation.as_deref());
                let reply = self
                    .stream_reply(&self.coder, &messages, events)
                    .await
                    .map_err(TurnAbort::Fault)?;
                session.coder.push_assistant(&reply);
                extract_code(&reply)
            }
            TurnInput::CodeOverride(user_code) => {
                // Record the override as the coder's own code so a later
                // failure repairs it like any generated attempt.
                session.coder.push_user(prompts::human_loop(&user_code));
                session
                    .coder
                    .push_assistant(format!("```python\n{}\n```", user_code));
                Some(user_code)
            }
        };

        // A reply without code is a plain conversational answer.
        let Some(mut code) = code else {
            return Ok(());
        };

        let mut result = session.run_code(&code).await;
        report.executions += 1;
        let mut outcome = classify(&result);

        if matches!(
            outcome,
            Outcome::ExecutionError | Outcome::SemanticCheckRequested
        ) {
            session.error_count += 1;
            let max_attempts = session.config.max_attempts;
            let mut round = 0;

            while matches!(
                outcome,
                Outcome::ExecutionError | Outcome::SemanticCheckRequested
            ) && round < max_attempts
            {
                round += 1;
                report.repair_rounds += 1;
                let error = result.human_message.clone();
                let diagnosis = self.diagnose(session, &code, &error, round).await;
                session.coder.push_repair_request(&code, &error, &diagnosis);

                let reply = self
                    .stream_reply(&self.coder, session.coder.messages(), events)
                    .await
                    .map_err(TurnAbort::Fault)?;
                session.coder.push_assistant(&reply);

                if let Some(fixed) = extract_code(&reply) {
                    code = fixed;
                    result = session.run_code(&code).await;
                    report.executions += 1;
                    outcome = classify(&result);
                    if outcome == Outcome::Success {
                        session.repair_count += 1;
                    }
                }
            }
            REPAIR_ROUNDS.observe(round as f64);
        }

        match outcome {
            Outcome::Success => {}
            Outcome::InfraFailure => return Err(TurnAbort::Infra(result.human_message)),
            Outcome::ExecutionError | Outcome::SemanticCheckRequested => {
                report.state = TurnState::Escalated;
                let _ = events
                    .send(TurnEvent::Notice(prompts::escalation_apology(
                        session.config.max_attempts,
                    )))
                    .await;
                return Ok(());
            }
        }

        let _ = events
            .send(TurnEvent::Notice(format!(
                "\n```\n{}\n```\n",
                result.human_message
            )))
            .await;
        for artifact in session.check_folder() {
            let _ = events.send(TurnEvent::Artifact(artifact)).await;
        }

        session
            .coder
            .push_user(prompts::result_prompt(&result.human_message));
        let explanation = self
            .stream_reply(&self.coder, session.coder.messages(), events)
            .await
            .map_err(TurnAbort::Fault)?;
        session.coder.push_assistant(explanation);
        Ok(())
    }

    /// Produce a fix method for a failed execution
    ///
    /// The inspection request is recorded every round. At the configured
    /// escalation round the diagnosis call is skipped and the fallback
    /// instruction used. An unreachable inspector degrades to a canned
    /// diagnosis instead of failing the turn.
    async fn diagnose<R: Runner>(
        &self,
        session: &mut Session<R>,
        code: &str,
        error: &str,
        round: usize,
    ) -> String {
        session.inspector.push_inspect_request(code, error);
        if round == session.config.inspector_escalation_round {
            return prompts::FALLBACK_FIX.to_string();
        }
        let diagnosis = match self.inspector.complete(session.inspector.messages()).await {
            Ok(diagnosis) => diagnosis,
            Err(e) => {
                warn!(error = %e, "inspector unreachable, degrading");
                prompts::INSPECTOR_UNAVAILABLE.to_string()
            }
        };
        session.inspector.push_assistant(&diagnosis);
        diagnosis
    }

    async fn stream_reply(
        &self,
        client: &C,
        messages: &[crate::llm::ChatMessage],
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<String, LlmError> {
        let mut rx = client.complete_stream(messages).await?;
        let mut reply = String::new();
        while let Some(token) = rx.recv().await {
            reply.push_str(&token);
            let _ = events.send(TurnEvent::Token(token)).await;
        }
        if reply.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(reply)
    }

    /// Generate a markdown analysis report from the session transcript and
    /// write it into the cache directory
    pub async fn generate_report<R: Runner>(
        &self,
        session: &Session<R>,
    ) -> Result<PathBuf, ReportError> {
        let mut messages = vec![crate::llm::ChatMessage::system(prompts::REPORT_SYSTEM)];
        // Skip the coder preamble; the report writer has its own role.
        messages.extend(
            session
                .coder
                .messages()
                .iter()
                .filter(|m| m.role != "system")
                .cloned(),
        );
        messages.push(crate::llm::ChatMessage::user(prompts::report_request(
            &session.figure_links(),
        )));

        let report = self.chat.complete(&messages).await?;
        let path = session.cache_dir.join("report.md");
        std::fs::write(&path, report)?;
        info!(path = %path.display(), "report written");
        Ok(path)
    }
}

/// Extract the first python-fenced code block from an agent reply
pub fn extract_code(reply: &str) -> Option<String> {
    let start = reply.find("```python")? + "```python".len();
    let rest = &reply[start..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest.find("```")?;
    let code = rest[..end].trim_end();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_first_block() {
        let reply = "Here you go:\n```python\nprint(1)\n```\nand then\n```python\nprint(2)\n```";
        assert_eq!(extract_code(reply).unwrap(), "print(1)");
    }

    #[test]
    fn test_extract_code_none_without_fence() {
        assert!(extract_code("There is no code to write here.").is_none());
        assert!(extract_code("```\nnot tagged\n```").is_none());
    }

    #[test]
    fn test_extract_code_unterminated_fence() {
        assert!(extract_code("```python\nprint(1)").is_none());
    }

    #[test]
    fn test_extract_code_empty_block() {
        assert!(extract_code("```python\n```").is_none());
    }

    #[test]
    fn test_turn_state_labels() {
        assert_eq!(TurnState::Succeeded.label(), "succeeded");
        assert_eq!(TurnState::Escalated.label(), "escalated");
        assert_eq!(TurnState::InfraFailed.label(), "infra_failed");
        assert_eq!(TurnState::Faulted.label(), "faulted");
    }
}
