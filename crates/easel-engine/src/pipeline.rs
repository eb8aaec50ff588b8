use easel_contracts::config::StudioConfig;
use easel_contracts::conversation::store::ConversationStore;
use easel_contracts::conversation::Conversation;
use easel_contracts::events::EventLog;
use easel_contracts::prompt::{Critique, StructuredPrompt};
use serde_json::{json, Value};
use similar::TextDiff;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::critic::Critic;
use crate::error::{PipelineError, PipelineWarning};
use crate::generator::Generator;
use crate::synthesizer::{Synthesis, Synthesizer, SynthesizerSession};
use crate::transport::{error_chain_text, map_object};
use crate::{critic_for, generator_for, synthesizer_for};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an expert SDXL Prompt Engineer with persistent memory.
ALWAYS check history. Output structured JSON {positive, negative}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Synthesizing,
    Generating,
    Critiquing,
    Repairing,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synthesizing => "synthesizing",
            Self::Generating => "generating",
            Self::Critiquing => "critiquing",
            Self::Repairing => "repairing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStatus {
    NotNeeded,
    Applied,
    Failed,
}

impl RepairStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotNeeded => "not_needed",
            Self::Applied => "applied",
            Self::Failed => "failed",
        }
    }
}

/// What a successful run delivers.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub prompt: StructuredPrompt,
    pub artifact: Artifact,
    /// Raw synthesizer text of the delivered attempt.
    pub response_text: String,
    /// `None` when visual feedback is disabled.
    pub critique: Option<Critique>,
    pub repair: RepairStatus,
    pub warnings: Vec<PipelineWarning>,
}

struct Attempt {
    synthesis: Synthesis,
    artifact: Artifact,
}

/// Per-run working record threaded through every stage.
struct PipelineState<'a> {
    run_id: String,
    user_input: &'a str,
    stage: PipelineStage,
    session: SynthesizerSession,
    critique: Option<Critique>,
    repair: RepairStatus,
    warnings: Vec<PipelineWarning>,
}

impl PipelineState<'_> {
    fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
        info!(run_id = %self.run_id, stage = stage.as_str(), "pipeline stage");
    }
}

/// Brain, painter and critic sequenced into one run with at most one repair.
///
/// The conversation is only mutated when a run reaches `done`; a failed run
/// leaves it exactly as it was.
pub struct Pipeline {
    synthesizer: Box<dyn Synthesizer>,
    generator: Box<dyn Generator>,
    critic: Box<dyn Critic>,
    store: ConversationStore,
    conversation: Conversation,
    feedback_enabled: bool,
    system_instruction: String,
    events: Option<EventLog>,
}

impl Pipeline {
    pub fn new(
        synthesizer: Box<dyn Synthesizer>,
        generator: Box<dyn Generator>,
        critic: Box<dyn Critic>,
        store: ConversationStore,
        feedback_enabled: bool,
    ) -> Self {
        let conversation = store.load();
        Self {
            synthesizer,
            generator,
            critic,
            store,
            conversation,
            feedback_enabled,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            events: None,
        }
    }

    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(
            synthesizer_for(config),
            generator_for(config),
            critic_for(config),
            ConversationStore::from_config(&config.memory),
            config.visual_feedback.enabled,
        )
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn feedback_enabled(&self) -> bool {
        self.feedback_enabled
    }

    pub fn set_feedback_enabled(&mut self, enabled: bool) {
        self.feedback_enabled = enabled;
    }

    /// Forgets the in-memory history and deletes the persisted one.
    pub fn clear_memory(&mut self) -> anyhow::Result<()> {
        self.store.clear()?;
        self.conversation = Conversation::new();
        let event_id = Uuid::new_v4().to_string();
        info!(path = %self.store.path().display(), "memory cleared");
        self.emit(
            &event_id,
            "memory_cleared",
            json!({ "path": self.store.path().to_string_lossy() }),
        );
        Ok(())
    }

    pub fn run(&mut self, user_input: &str) -> Result<PipelineOutcome, PipelineError> {
        if user_input.trim().is_empty() {
            return Err(PipelineError::EmptyRequest);
        }
        let run_id = Uuid::new_v4().to_string();
        self.emit(
            &run_id,
            "pipeline_started",
            json!({
                "user_input": user_input,
                "feedback_enabled": self.feedback_enabled,
                "history_turns": self.conversation.len(),
            }),
        );

        let mut state = PipelineState {
            run_id,
            user_input,
            stage: PipelineStage::Synthesizing,
            session: self
                .synthesizer
                .open(&self.conversation, &self.system_instruction),
            critique: None,
            repair: RepairStatus::NotNeeded,
            warnings: Vec::new(),
        };
        match self.execute(&mut state) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let failed_at = state.stage;
                state.enter(PipelineStage::Failed);
                error!(
                    run_id = %state.run_id,
                    failed_at = failed_at.as_str(),
                    error = %err,
                    "pipeline failed"
                );
                self.emit(
                    &state.run_id,
                    "pipeline_failed",
                    json!({
                        "stage": failed_at.as_str(),
                        "kind": err.kind(),
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    fn execute(&mut self, state: &mut PipelineState<'_>) -> Result<PipelineOutcome, PipelineError> {
        state.enter(PipelineStage::Synthesizing);
        let synthesis = self
            .synthesizer
            .send(&mut state.session, state.user_input)
            .map_err(|err| PipelineError::synthesis(&err))?;
        self.emit_synthesis(&state.run_id, 1, &synthesis);

        state.enter(PipelineStage::Generating);
        let artifact = self
            .generator
            .render(&synthesis.prompt)
            .map_err(|err| PipelineError::generation(&err))?;
        self.emit_artifact(&state.run_id, 1, &artifact);

        let mut delivered = Attempt {
            synthesis,
            artifact,
        };

        if self.feedback_enabled {
            state.enter(PipelineStage::Critiquing);
            let verdict = self.inspect(state, &delivered.artifact);
            if !verdict.passed {
                state.enter(PipelineStage::Repairing);
                match self.repair(state, &verdict) {
                    Ok(attempt) => {
                        let diff = prompt_diff(
                            &delivered.synthesis.prompt.positive,
                            &attempt.synthesis.prompt.positive,
                        );
                        self.emit(
                            &state.run_id,
                            "repair_applied",
                            json!({
                                "missing_elements": verdict.missing_elements,
                                "positive_diff": diff,
                            }),
                        );
                        delivered = attempt;
                        state.repair = RepairStatus::Applied;
                    }
                    Err(err) => {
                        warn!(
                            run_id = %state.run_id,
                            error = %format!("{err:#}"),
                            "repair failed; keeping the first attempt"
                        );
                        self.emit(
                            &state.run_id,
                            "repair_failed",
                            json!({ "error": error_chain_text(&err, 2000) }),
                        );
                        state.warnings.push(PipelineWarning::repair_failed(&err));
                        state.repair = RepairStatus::Failed;
                    }
                }
            }
            state.critique = Some(verdict);
        }

        state.enter(PipelineStage::Done);
        if let Some(warning) = self.commit(state, &delivered.synthesis.response_text) {
            state.warnings.push(warning);
        }
        self.emit(
            &state.run_id,
            "pipeline_finished",
            json!({
                "repair": state.repair.as_str(),
                "warnings": state.warnings.iter().map(PipelineWarning::kind).collect::<Vec<_>>(),
                "positive": delivered.synthesis.prompt.positive,
            }),
        );

        Ok(PipelineOutcome {
            run_id: state.run_id.clone(),
            prompt: delivered.synthesis.prompt,
            artifact: delivered.artifact,
            response_text: delivered.synthesis.response_text,
            critique: state.critique.take(),
            repair: state.repair,
            warnings: std::mem::take(&mut state.warnings),
        })
    }

    /// Critic errors count as a pass.
    fn inspect(&self, state: &mut PipelineState<'_>, artifact: &Artifact) -> Critique {
        let verdict = match self.critic.inspect(artifact, state.user_input) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(
                    run_id = %state.run_id,
                    critic = self.critic.name(),
                    error = %format!("{err:#}"),
                    "critique unavailable; treating as passed"
                );
                state.warnings.push(PipelineWarning::critique_unavailable(&err));
                Critique::pass(format!("Analysis failed: {}", error_chain_text(&err, 200)))
            }
        };
        if verdict.passed {
            info!(run_id = %state.run_id, reason = %verdict.reason, "critique passed");
        } else {
            warn!(
                run_id = %state.run_id,
                reason = %verdict.reason,
                missing = %verdict.missing_elements,
                "critique failed"
            );
        }
        self.emit(
            &state.run_id,
            "critique_completed",
            json!({
                "passed": verdict.passed,
                "reason": verdict.reason,
                "missing_elements": verdict.missing_elements,
            }),
        );
        verdict
    }

    fn repair(
        &self,
        state: &mut PipelineState<'_>,
        critique: &Critique,
    ) -> anyhow::Result<Attempt> {
        let instruction = correction_instruction(critique);
        let synthesis = self.synthesizer.send(&mut state.session, &instruction)?;
        self.emit_synthesis(&state.run_id, 2, &synthesis);
        let artifact = self.generator.render(&synthesis.prompt)?;
        self.emit_artifact(&state.run_id, 2, &artifact);
        Ok(Attempt {
            synthesis,
            artifact,
        })
    }

    /// Appends the delivered exchange and persists it. A failed write is
    /// reported, never fatal.
    fn commit(
        &mut self,
        state: &PipelineState<'_>,
        response_text: &str,
    ) -> Option<PipelineWarning> {
        let mut updated = self.conversation.clone();
        updated.record_exchange(state.user_input, response_text);
        let updated = updated.trimmed(self.store.max_depth());
        let warning = match self.store.save(&updated) {
            Ok(()) => {
                self.emit(
                    &state.run_id,
                    "memory_saved",
                    json!({
                        "turns": updated.len(),
                        "persisted": self.store.is_enabled(),
                    }),
                );
                None
            }
            Err(err) => {
                warn!(
                    run_id = %state.run_id,
                    path = %self.store.path().display(),
                    error = %format!("{err:#}"),
                    "memory write failed"
                );
                Some(PipelineWarning::memory_write_failed(&err))
            }
        };
        self.conversation = updated;
        warning
    }

    fn emit_synthesis(&self, run_id: &str, attempt: u8, synthesis: &Synthesis) {
        info!(
            run_id = %run_id,
            attempt,
            positive = %synthesis.prompt.positive,
            "prompt synthesized"
        );
        self.emit(
            run_id,
            "prompt_synthesized",
            json!({
                "attempt": attempt,
                "synthesizer": self.synthesizer.name(),
                "positive": synthesis.prompt.positive,
                "negative": synthesis.prompt.negative,
            }),
        );
    }

    fn emit_artifact(&self, run_id: &str, attempt: u8, artifact: &Artifact) {
        info!(run_id = %run_id, attempt, bytes = artifact.len(), "artifact rendered");
        self.emit(
            run_id,
            "artifact_created",
            json!({
                "attempt": attempt,
                "generator": self.generator.name(),
                "mime_type": artifact.mime_type(),
                "bytes": artifact.len(),
                "sha256": artifact.digest(),
            }),
        );
    }

    fn emit(&self, run_id: &str, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.record(run_id, event_type, map_object(payload)) {
            warn!(event = event_type, error = %err, "event write failed");
        }
    }
}

pub fn correction_instruction(critique: &Critique) -> String {
    format!(
        "SYSTEM ALERT: The previous image failed visual inspection.\n\
         Reason: {reason}.\n\
         Missing Elements: {missing}.\n\
         TASK: Regenerate the SDXL JSON prompt.\n\
         Keep the style, but STRONG EMPHASIS on including: {missing}.",
        reason = critique.reason,
        missing = critique.missing_elements,
    )
}

/// Unified diff over comma-separated prompt fragments, one per line.
fn prompt_diff(before: &str, after: &str) -> String {
    let before = prompt_lines(before);
    let after = prompt_lines(after);
    TextDiff::from_lines(&before, &after)
        .unified_diff()
        .header("attempt-1", "attempt-2")
        .to_string()
}

fn prompt_lines(prompt: &str) -> String {
    let mut out = String::new();
    for fragment in prompt.split(',').map(str::trim).filter(|row| !row.is_empty()) {
        out.push_str(fragment);
        out.push('\n');
    }
    out
}
