//! Main agent loop: call model → parse → execute one tool → repeat.
//!
//! The loop is bounded by `max_iterations` and always terminates with a
//! user-visible response: a terminal envelope, a plain-text fallback, a
//! recovered partial, or the fixed exhaustion message. Iteration-level
//! failures are resolved through the recovery-strategy table; nothing
//! escapes [`AgentSession::run`] as an error.
//!
//! One session is strictly sequential (each step depends on the previous
//! tool result); independent sessions run in parallel, sharing only the
//! model client, the tool registry, and optionally the circuit breaker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, Retryable};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::agent::circuit_breaker::CircuitBreaker;
use crate::agent::recovery::{select_strategy, RecoveryStrategy};
use crate::agent::sanitize;
use crate::agent::tools::base::ToolExecutionResult;
use crate::agent::tools::registry::ToolRegistry;
use crate::config::schema::{Config, LoopConfig, RecoveryPolicy};
use crate::errors::{agent_error_from_provider, AgentError, ProviderError};
use crate::parser::{ParseOutcome, ParsedCommand, ToolCallParser};
use crate::providers::base::{message, ModelClient, ModelProfile};
use crate::providers::retry::{adjust_for_rate_limit, model_backoff, tool_backoff};

/// Terminal-response envelope. Explicit intent to stop wins over any
/// command-shaped text in the same output.
const FINAL_OPEN: &str = "<final_response>";
const FINAL_CLOSE: &str = "</final_response>";

/// Emitted when the iteration budget runs out without a terminal response.
const EXHAUSTED_FALLBACK: &str =
    "I ran out of tool iterations before producing a final answer. The actions above may be incomplete.";

/// Emitted when an unrecoverable upstream failure ends the session.
const DEGRADED_FALLBACK: &str =
    "I hit a problem I couldn't recover from while working on this. Please try again in a moment.";

// ---------------------------------------------------------------------------
// Session records
// ---------------------------------------------------------------------------

/// Append-only record of one iteration.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub index: u32,
    pub model_output: String,
    pub parse_outcome: Option<ParseOutcome>,
    pub executed_command: Option<ParsedCommand>,
    pub execution_result: Option<String>,
    pub elapsed: Duration,
    pub timestamp: String,
}

/// What a finished session hands back to the caller.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// The terminal, user-visible response text. Never empty.
    pub response: String,
    pub records: Vec<IterationRecord>,
}

// ---------------------------------------------------------------------------
// Iteration state machine
// ---------------------------------------------------------------------------

/// The phase within a single agent loop iteration.
enum IterationPhase {
    /// Call the model with the accumulated conversation.
    Calling,
    /// Terminal-envelope check, then parse.
    Processing { output: String },
    /// Execute the first parsed command.
    Executing { outcome: ParseOutcome },
}

/// Outcome of a single iteration, returned to the outer loop.
enum IterationOutcome {
    /// Continue to next iteration.
    Continue,
    /// Agent produced final content — use as response.
    Finished(String),
    /// Unrecoverable failure — use the message as final content.
    Error(String),
}

/// What a step function produces: either the next phase or a terminal outcome.
enum StepResult {
    Next(IterationPhase),
    Done(IterationOutcome),
}

// ---------------------------------------------------------------------------
// Per-session state
// ---------------------------------------------------------------------------

/// Per-turn duplicate-call budget: the same tool+args pair is allowed only a
/// fixed number of times per session before it is blocked with a note.
struct CallGuard {
    seen: HashMap<String, u32>,
    max_same_call: u32,
}

impl CallGuard {
    fn new(max_same_call: u32) -> Self {
        Self {
            seen: HashMap::new(),
            max_same_call: max_same_call.max(1),
        }
    }

    fn key(name: &str, args: &HashMap<String, Value>) -> String {
        let mut keys: Vec<&String> = args.keys().collect();
        keys.sort();
        let mut parts = Vec::with_capacity(keys.len());
        for k in keys {
            parts.push(format!("{}={}", k, args.get(k).cloned().unwrap_or(Value::Null)));
        }
        format!("{}|{}", name, parts.join("&"))
    }

    fn allow(&mut self, name: &str, args: &HashMap<String, Value>) -> Result<(), String> {
        let count = self.seen.entry(Self::key(name, args)).or_insert(0);
        *count += 1;
        if *count > self.max_same_call {
            return Err(format!(
                "duplicate tool call blocked for '{}': exceeded {} identical calls",
                name, self.max_same_call
            ));
        }
        Ok(())
    }
}

/// Mutable state that flows through one session.
struct SessionContext {
    messages: Vec<Value>,
    records: Vec<IterationRecord>,
    profile: ModelProfile,
    guard: CallGuard,
    // Per-iteration scratch, folded into an IterationRecord by the driver.
    draft_output: String,
    draft_parse: Option<ParseOutcome>,
    draft_command: Option<ParsedCommand>,
    draft_result: Option<String>,
}

impl SessionContext {
    fn clear_draft(&mut self) {
        self.draft_output.clear();
        self.draft_parse = None;
        self.draft_command = None;
        self.draft_result = None;
    }
}

// ---------------------------------------------------------------------------
// Session runner
// ---------------------------------------------------------------------------

/// The iteration controller.
///
/// Holds the external collaborators (model client, tool registry) and the
/// parser. `run` is the sole public entry point; intermediate tool activity
/// is visible only through the returned iteration records.
pub struct AgentSession {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    parser: ToolCallParser<Arc<ToolRegistry>>,
    loop_config: LoopConfig,
    recovery_policy: RecoveryPolicy,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl AgentSession {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>, config: &Config) -> Self {
        let breaker = Arc::new(Mutex::new(CircuitBreaker::new(&config.circuit_breaker)));
        Self::with_breaker(model, tools, config, breaker)
    }

    /// Share one circuit breaker across sessions so tool health outlives a
    /// single conversation turn.
    pub fn with_breaker(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        config: &Config,
        breaker: Arc<Mutex<CircuitBreaker>>,
    ) -> Self {
        Self {
            model,
            parser: ToolCallParser::new(Arc::clone(&tools), config.parser.clone()),
            tools,
            loop_config: config.agent.clone(),
            recovery_policy: config.recovery.clone(),
            breaker,
        }
    }

    /// Run one agent session to completion.
    ///
    /// Always returns a non-empty response within `max_iterations` model
    /// calls, whatever the model or the tools do.
    #[instrument(name = "agent_session", skip(self, seed_messages))]
    pub async fn run(&self, seed_messages: Vec<Value>) -> SessionOutcome {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        info!(request_id = %request_id, "Agent session started");

        let mut ctx = SessionContext {
            messages: seed_messages,
            records: Vec::new(),
            profile: ModelProfile::Primary,
            guard: CallGuard::new(self.loop_config.max_same_call),
            draft_output: String::new(),
            draft_parse: None,
            draft_command: None,
            draft_result: None,
        };

        let mut response = None;
        for iteration in 0..self.loop_config.max_iterations {
            debug!(
                request_id = %request_id,
                "Agent iteration {}/{}",
                iteration + 1,
                self.loop_config.max_iterations
            );

            ctx.clear_draft();
            let started = Instant::now();
            let outcome = self.run_iteration(&mut ctx).await;
            ctx.records.push(IterationRecord {
                index: iteration,
                model_output: std::mem::take(&mut ctx.draft_output),
                parse_outcome: ctx.draft_parse.take(),
                executed_command: ctx.draft_command.take(),
                execution_result: ctx.draft_result.take(),
                elapsed: started.elapsed(),
                timestamp: Utc::now().to_rfc3339(),
            });

            match outcome {
                IterationOutcome::Continue => continue,
                IterationOutcome::Finished(content) => {
                    response = Some(content);
                    break;
                }
                IterationOutcome::Error(msg) => {
                    response = Some(msg);
                    break;
                }
            }
        }

        let response = match response {
            Some(r) if !r.trim().is_empty() => r,
            _ => EXHAUSTED_FALLBACK.to_string(),
        };
        info!(
            request_id = %request_id,
            iterations = ctx.records.len(),
            "Agent session finished"
        );
        SessionOutcome {
            response,
            records: ctx.records,
        }
    }

    /// Drive a single iteration through the phase state machine.
    async fn run_iteration(&self, ctx: &mut SessionContext) -> IterationOutcome {
        let mut phase = IterationPhase::Calling;
        loop {
            match match phase {
                IterationPhase::Calling => self.step_call_model(ctx).await,
                IterationPhase::Processing { output } => self.step_process(ctx, output),
                IterationPhase::Executing { outcome } => self.step_execute(ctx, outcome).await,
            } {
                StepResult::Next(next_phase) => phase = next_phase,
                StepResult::Done(outcome) => return outcome,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Step 1: Calling — model completion with recovery
    // -----------------------------------------------------------------------

    async fn step_call_model(&self, ctx: &mut SessionContext) -> StepResult {
        match self.complete_with_recovery(ctx).await {
            Ok(output) => {
                ctx.draft_output = output.clone();
                StepResult::Next(IterationPhase::Processing { output })
            }
            Err(terminal) => StepResult::Done(terminal),
        }
    }

    /// Call the model, resolving failures through the strategy table.
    ///
    /// `Err` carries a terminal outcome (recovered partial or degraded
    /// fallback), never a raw error.
    async fn complete_with_recovery(
        &self,
        ctx: &mut SessionContext,
    ) -> Result<String, IterationOutcome> {
        let mut fallback_tried = false;
        loop {
            let profile = ctx.profile;
            let first_err = match self.model.complete(&ctx.messages, profile).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            let agent_err = to_agent_error(&first_err);
            let strategy = select_strategy(&agent_err, &self.recovery_policy);
            warn!(
                model = self.model.model_name(profile),
                error = %agent_err,
                ?strategy,
                "Model call failed"
            );

            match strategy {
                RecoveryStrategy::RetryWithBackoff => {
                    let messages = &ctx.messages;
                    let retried = (|| async { self.model.complete(messages, profile).await })
                        .retry(model_backoff())
                        .adjust(adjust_for_rate_limit)
                        .await;
                    match retried {
                        Ok(output) => return Ok(output),
                        Err(e) => {
                            warn!(error = %e, "Model retries exhausted");
                            return Err(IterationOutcome::Error(DEGRADED_FALLBACK.to_string()));
                        }
                    }
                }
                RecoveryStrategy::AbortWithPartial => {
                    let partial = match &agent_err {
                        AgentError::Timeout { partial_output, .. } => {
                            partial_output.clone().unwrap_or_default()
                        }
                        _ => String::new(),
                    };
                    return Err(IterationOutcome::Finished(sanitize::strip_markup(&partial)));
                }
                RecoveryStrategy::UseFallbackModel if !fallback_tried => {
                    fallback_tried = true;
                    ctx.profile = ModelProfile::Fallback;
                    continue;
                }
                _ => {
                    return Err(IterationOutcome::Error(DEGRADED_FALLBACK.to_string()));
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Step 2: Processing — terminal detection, then parse
    // -----------------------------------------------------------------------

    fn step_process(&self, ctx: &mut SessionContext, output: String) -> StepResult {
        // Explicit terminal envelope takes priority over any tool markup.
        if let Some(inner) = extract_final_envelope(&output) {
            return StepResult::Done(IterationOutcome::Finished(sanitize::strip_markup(inner)));
        }

        let lint = crate::parser::quick_check::quick_validate(&output);
        for issue in &lint.issues {
            debug!(issue = %issue, "Markup lint");
        }

        let outcome = self.parser.parse(&output);
        for diag in &outcome.diagnostics {
            debug!(diagnostic = %diag, "Parse note");
        }
        ctx.draft_parse = Some(outcome.clone());

        if outcome.commands.is_empty() {
            // Plain-text fallback: the residual is the answer.
            let text = sanitize::strip_markup(&outcome.residual_text);
            return StepResult::Done(IterationOutcome::Finished(text));
        }

        StepResult::Next(IterationPhase::Executing { outcome })
    }

    // -----------------------------------------------------------------------
    // Step 3: Executing — one tool invocation per turn
    // -----------------------------------------------------------------------

    /// Execute only the first command. One tool per turn bounds the blast
    /// radius of any single model output and keeps the loop auditable.
    async fn step_execute(&self, ctx: &mut SessionContext, outcome: ParseOutcome) -> StepResult {
        let command = outcome
            .commands
            .into_iter()
            .next()
            .expect("Executing phase requires at least one command");
        let commentary = outcome.residual_text.trim().to_string();

        // Record what the assistant said and asked for before any outcome.
        let call_summary = json!({
            "tool_call": {"tool": command.name, "args": command.arguments}
        })
        .to_string();
        let assistant_content = if commentary.is_empty() {
            call_summary
        } else {
            format!("{}\n{}", commentary, call_summary)
        };
        ctx.messages.push(message("assistant", &assistant_content));

        if let Err(note) = ctx.guard.allow(&command.name, &command.arguments) {
            warn!(tool = %command.name, "Duplicate call blocked");
            ctx.messages.push(message(
                "system",
                &format!("Note: {}. Take a different action or answer directly.", note),
            ));
            ctx.draft_command = Some(command);
            return StepResult::Done(IterationOutcome::Continue);
        }

        if !self.breaker_available(&command.name) {
            let err = AgentError::CircuitOpen {
                tool: command.name.clone(),
                failure_count: self.breaker_failures(&command.name),
                threshold: self.breaker_threshold(),
            };
            // Decision table: CircuitOpen → SkipAndContinue.
            let strategy = select_strategy(&err, &self.recovery_policy);
            debug_assert_eq!(strategy, RecoveryStrategy::SkipAndContinue);
            warn!(tool = %command.name, "Skipping tool with open circuit");
            ctx.messages.push(message(
                "system",
                &format!(
                    "Note: tool '{}' is temporarily unavailable ({}). Use another tool or answer directly.",
                    command.name, err
                ),
            ));
            ctx.draft_command = Some(command);
            return StepResult::Done(IterationOutcome::Continue);
        }

        let result = self.execute_with_attempts(&command).await;

        let rendered =
            sanitize::truncate_result(&result.data, self.loop_config.max_tool_result_chars);
        let tool_result_msg = json!({
            "tool_result": {
                "tool": command.name,
                "success": result.ok,
                "output": rendered,
            }
        })
        .to_string();
        ctx.messages.push(message("tool", &tool_result_msg));

        if !result.ok {
            // Attempts exhausted inside execute_with_attempts: nudge the
            // model toward a different approach (TryAlternativeTool).
            ctx.messages.push(message(
                "system",
                &format!(
                    "Note: tool '{}' kept failing. Try an alternative tool or answer with what you have.",
                    command.name
                ),
            ));
        }

        ctx.draft_result = Some(rendered);
        ctx.draft_command = Some(command);
        StepResult::Done(IterationOutcome::Continue)
    }

    /// Run one tool with per-failure strategy selection: retry with backoff
    /// while attempts remain, then give up and let the caller nudge the
    /// model toward an alternative.
    async fn execute_with_attempts(&self, command: &ParsedCommand) -> ToolExecutionResult {
        let max_attempts = self.loop_config.tool_max_attempts.max(1);
        let mut delays = tool_backoff().build();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .tools
                .execute(&command.name, command.arguments.clone())
                .await;
            if result.ok {
                self.breaker_record(&command.name, true);
                return result;
            }

            let err = AgentError::ToolFailure {
                tool: command.name.clone(),
                attempt,
                max_attempts,
                message: result.error.clone().unwrap_or_default(),
            };
            match select_strategy(&err, &self.recovery_policy) {
                RecoveryStrategy::RetryWithBackoff => {
                    warn!(tool = %command.name, attempt, "Tool failed, retrying");
                    if let Some(delay) = delays.next() {
                        tokio::time::sleep(delay).await;
                    }
                }
                _ => {
                    warn!(tool = %command.name, attempt, "Tool failed, giving up");
                    self.breaker_record(&command.name, false);
                    return result;
                }
            }
        }
    }

    fn breaker_available(&self, tool: &str) -> bool {
        self.breaker
            .lock()
            .map(|b| b.is_available(tool))
            .unwrap_or(true)
    }

    fn breaker_failures(&self, tool: &str) -> u32 {
        self.breaker.lock().map(|b| b.failure_count(tool)).unwrap_or(0)
    }

    fn breaker_threshold(&self) -> u32 {
        self.breaker.lock().map(|b| b.threshold()).unwrap_or(0)
    }

    fn breaker_record(&self, tool: &str, success: bool) {
        if let Ok(mut b) = self.breaker.lock() {
            if success {
                b.record_success(tool);
            } else {
                b.record_failure(tool);
            }
        }
    }
}

/// Extract the inner text of a complete terminal envelope, if present.
fn extract_final_envelope(output: &str) -> Option<&str> {
    let start = output.find(FINAL_OPEN)?;
    let inner_start = start + FINAL_OPEN.len();
    let rel_end = output[inner_start..].find(FINAL_CLOSE)?;
    Some(output[inner_start..inner_start + rel_end].trim())
}

fn to_agent_error(err: &anyhow::Error) -> AgentError {
    match err.downcast_ref::<ProviderError>() {
        Some(p) => agent_error_from_provider(p),
        None => AgentError::Upstream {
            status: 0,
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_final_envelope() {
        let out = "preamble <final_response> All set. </final_response> trailing";
        assert_eq!(extract_final_envelope(out), Some("All set."));
    }

    #[test]
    fn test_incomplete_final_envelope_ignored() {
        assert_eq!(extract_final_envelope("<final_response> cut off"), None);
    }

    #[test]
    fn test_call_guard_blocks_repeats() {
        let mut g = CallGuard::new(1);
        let mut args = HashMap::new();
        args.insert("url".to_string(), Value::String("https://a".into()));
        assert!(g.allow("web_fetch", &args).is_ok());
        assert!(g.allow("web_fetch", &args).is_err());
    }

    #[test]
    fn test_call_guard_key_is_order_insensitive() {
        let mut a = HashMap::new();
        a.insert("x".to_string(), json!(1));
        a.insert("y".to_string(), json!(2));
        let mut b = HashMap::new();
        b.insert("y".to_string(), json!(2));
        b.insert("x".to_string(), json!(1));
        assert_eq!(CallGuard::key("t", &a), CallGuard::key("t", &b));
    }
}
