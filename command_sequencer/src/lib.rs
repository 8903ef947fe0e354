//! # Command Sequencer
//!
//! This crate executes resolved command batches as strictly ordered
//! sequences of steps on a single global queue.
//!
//! ## Philosophy
//!
//! - **One queue, total order**: Batches run in FIFO order and steps never
//!   interleave, within or across batches
//! - **Fail hard inside a batch, never across batches**: One failing step
//!   skips the rest of its batch; the next batch is unaffected
//! - **History before execution**: The batch's history entry is appended
//!   before the first step runs, so a crash mid-batch still leaves a record
//! - **Deterministic time**: History timestamps come from a logical clock,
//!   not the wall
//!
//! ## Example
//!
//! ```ignore
//! use command_registry::TargetContext;
//! use command_sequencer::CommandSequencer;
//!
//! let mut sequencer = CommandSequencer::new();
//! sequencer.run(&registry, "open_file notes.txt", TargetContext::new())?;
//! assert_eq!(sequencer.history().len(), 1);
//! ```

use argument_types::ArgValue;
use command_parser::{resolve, ResolveError, ResolvedStep, StepFailure};
use command_registry::{CommandRegistry, TargetContext};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a submitted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Creates a new random batch ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a batch ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch({})", self.0)
    }
}

/// Lifecycle status of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Not yet invoked
    Pending,
    /// Handler settled successfully
    Succeeded,
    /// Handler settled with a failure
    Failed { reason: String },
    /// Never invoked because an earlier step in the batch failed
    Skipped,
    /// The command name was not registered
    Unrecognized,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed { reason } => write!(f, "failed: {}", reason),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// Per-step history record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Normalized command name
    pub command_name: String,
    /// Typed arguments the handler was (or would have been) given
    pub arguments: Vec<ArgValue>,
    /// Current status
    pub status: StepStatus,
    /// Context the step ran against
    pub target_context: TargetContext,
}

/// History record for one invoked batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Batch identifier
    pub batch_id: BatchId,
    /// Logical timestamp (monotonic per sequencer)
    pub timestamp: u64,
    /// Raw invocation text
    pub input: String,
    /// Per-step records in execution order
    pub steps: Vec<StepRecord>,
}

/// Append-only log of invoked batches
#[derive(Debug, Default, Serialize)]
pub struct CommandHistory {
    entries: Vec<HistoryEntry>,
}

impl CommandHistory {
    fn push(&mut self, entry: HistoryEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    fn set_status(&mut self, entry: usize, step: usize, status: StepStatus) {
        self.entries[entry].steps[step].status = status;
    }

    fn set_context(&mut self, entry: usize, step: usize, context: TargetContext) {
        self.entries[entry].steps[step].target_context = context;
    }

    /// Returns all entries, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Returns the entry for a batch, if recorded
    pub fn entry(&self, batch_id: BatchId) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.batch_id == batch_id)
    }

    /// Returns the number of recorded batches
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no batch has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the whole log as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries)
    }
}

/// Observer fired synchronously just before each step's handler runs
pub type BeforeExecuteObserver = Box<dyn Fn(&str) + Send + Sync>;

/// Observer fired when a step fails, with the command name and reason
pub type FailureObserver = Box<dyn Fn(&str, &str) + Send + Sync>;

/// A resolved batch waiting on the global queue
struct PendingBatch {
    steps: Vec<ResolvedStep>,
    context: TargetContext,
    history_index: usize,
}

/// Serial executor for command batches
///
/// All batches share one FIFO queue; `submit` enqueues and `drain` walks
/// queued batches to completion in order. `run` is the common
/// submit-then-drain path.
pub struct CommandSequencer {
    queue: VecDeque<PendingBatch>,
    history: CommandHistory,
    before_execute: Vec<BeforeExecuteObserver>,
    on_failure: Vec<FailureObserver>,
    clock: u64,
}

impl CommandSequencer {
    /// Creates a sequencer with an empty queue and history
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            history: CommandHistory::default(),
            before_execute: Vec::new(),
            on_failure: Vec::new(),
            clock: 0,
        }
    }

    /// Registers a before-execute observer
    pub fn on_before_execute(&mut self, observer: BeforeExecuteObserver) {
        self.before_execute.push(observer);
    }

    /// Registers a failure observer (the error side channel)
    pub fn on_failure(&mut self, observer: FailureObserver) {
        self.on_failure.push(observer);
    }

    /// Returns the batch history
    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Resolves and enqueues a batch without executing it
    ///
    /// Run-last steps are stable-partitioned to the end of the batch and
    /// the history entry is appended here, before any execution. A
    /// circular alias aborts the whole batch and leaves no trace.
    pub fn submit(
        &mut self,
        registry: &CommandRegistry,
        input: &str,
        context: TargetContext,
    ) -> Result<BatchId, ResolveError> {
        let mut steps = resolve(input, registry)?;
        // Stable: ties within the flagged and unflagged groups keep their
        // original order.
        steps.sort_by_key(|step| step.run_last);

        let batch_id = BatchId::new();
        self.clock += 1;
        let entry = HistoryEntry {
            batch_id,
            timestamp: self.clock,
            input: input.to_string(),
            steps: steps
                .iter()
                .map(|step| StepRecord {
                    command_name: step.command_name.clone(),
                    arguments: step.args.clone(),
                    status: StepStatus::Pending,
                    target_context: context,
                })
                .collect(),
        };
        let history_index = self.history.push(entry);

        self.queue.push_back(PendingBatch {
            steps,
            context,
            history_index,
        });
        Ok(batch_id)
    }

    /// Walks every queued batch to completion, in FIFO order
    ///
    /// A failure inside one batch never aborts the queue; the next batch
    /// starts once the failing batch has been fully visited.
    pub fn drain(&mut self, registry: &CommandRegistry) {
        while let Some(batch) = self.queue.pop_front() {
            self.walk(registry, batch);
        }
    }

    /// Submits a batch and drains the queue
    ///
    /// Settles (returns) once every queued batch, including this one, has
    /// been fully walked; a batch full of failures still settles normally.
    pub fn run(
        &mut self,
        registry: &CommandRegistry,
        input: &str,
        context: TargetContext,
    ) -> Result<BatchId, ResolveError> {
        let batch_id = self.submit(registry, input, context)?;
        self.drain(registry);
        Ok(batch_id)
    }

    /// Executes one batch's steps in order with fail-hard semantics
    fn walk(&mut self, registry: &CommandRegistry, batch: PendingBatch) {
        let mut failed = false;
        let mut context = batch.context;

        for (index, step) in batch.steps.iter().enumerate() {
            if failed {
                self.history
                    .set_status(batch.history_index, index, StepStatus::Skipped);
                continue;
            }

            if let Some(failure) = &step.failure {
                let reason = failure.to_string();
                let status = match failure {
                    StepFailure::Unrecognized => StepStatus::Unrecognized,
                    _ => StepStatus::Failed {
                        reason: reason.clone(),
                    },
                };
                self.history.set_status(batch.history_index, index, status);
                self.notify_failure(&step.command_name, &reason);
                failed = true;
                continue;
            }

            self.history
                .set_context(batch.history_index, index, context);
            for observer in &self.before_execute {
                observer(&step.command_name);
            }

            let outcome = match registry.lookup(&step.command_name).and_then(|c| {
                c.handler().map(|handler| (c.reassigns_context(), handler))
            }) {
                Some((reassigns, handler)) => {
                    handler(&context, &step.args).map(|output| (reassigns, output))
                }
                None => Err("handler unavailable".to_string()),
            };

            match outcome {
                Ok((reassigns, output)) => {
                    self.history
                        .set_status(batch.history_index, index, StepStatus::Succeeded);
                    if reassigns {
                        if let Some(new_context) = output.new_context() {
                            if new_context != context {
                                context = new_context;
                            }
                        }
                    }
                }
                Err(reason) => {
                    self.history.set_status(
                        batch.history_index,
                        index,
                        StepStatus::Failed {
                            reason: reason.clone(),
                        },
                    );
                    self.notify_failure(&step.command_name, &reason);
                    failed = true;
                }
            }
        }
    }

    fn notify_failure(&self, command_name: &str, reason: &str) {
        for observer in &self.on_failure {
            observer(command_name, reason);
        }
    }
}

impl Default for CommandSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_log::MemorySink;
    use command_registry::{CommandSpec, HandlerOutput};
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<String>>>;

    fn logging_registry(names: &[&str], failing: &[&str], log: &CallLog) -> CommandRegistry {
        let sink = MemorySink::new();
        let mut registry = CommandRegistry::new();
        for name in names {
            let name = name.to_string();
            let fails = failing.contains(&name.as_str());
            let log = Arc::clone(log);
            registry
                .define(
                    CommandSpec::new(&name).with_handler(Box::new(move |_ctx, _args| {
                        log.lock().unwrap().push(name.clone());
                        if fails {
                            Err("boom".to_string())
                        } else {
                            Ok(HandlerOutput::done())
                        }
                    })),
                    &sink,
                )
                .unwrap();
        }
        registry
    }

    fn statuses(sequencer: &CommandSequencer, batch_id: BatchId) -> Vec<StepStatus> {
        sequencer
            .history()
            .entry(batch_id)
            .unwrap()
            .steps
            .iter()
            .map(|s| s.status.clone())
            .collect()
    }

    #[test]
    fn test_run_records_success() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a"], &[], &log);
        let mut sequencer = CommandSequencer::new();

        let batch_id = sequencer
            .run(&registry, "cmd_a", TargetContext::new())
            .unwrap();

        assert_eq!(statuses(&sequencer, batch_id), vec![StepStatus::Succeeded]);
        assert_eq!(log.lock().unwrap().as_slice(), ["cmd_a"]);
    }

    #[test]
    fn test_failure_skips_rest_of_batch() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a", "cmd_b", "cmd_c"], &["cmd_b"], &log);
        let mut sequencer = CommandSequencer::new();

        let batch_id = sequencer
            .run(&registry, "cmd_a\ncmd_b\ncmd_c", TargetContext::new())
            .unwrap();

        assert_eq!(
            statuses(&sequencer, batch_id),
            vec![
                StepStatus::Succeeded,
                StepStatus::Failed {
                    reason: "boom".to_string()
                },
                StepStatus::Skipped
            ]
        );
        // The skipped handler is never invoked.
        assert_eq!(log.lock().unwrap().as_slice(), ["cmd_a", "cmd_b"]);
    }

    #[test]
    fn test_failure_does_not_abort_next_batch() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a", "cmd_b"], &["cmd_a"], &log);
        let mut sequencer = CommandSequencer::new();

        sequencer
            .run(&registry, "cmd_a", TargetContext::new())
            .unwrap();
        let second = sequencer
            .run(&registry, "cmd_b", TargetContext::new())
            .unwrap();

        assert_eq!(statuses(&sequencer, second), vec![StepStatus::Succeeded]);
    }

    #[test]
    fn test_unrecognized_records_without_invocation() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a"], &[], &log);
        let mut sequencer = CommandSequencer::new();

        let batch_id = sequencer
            .run(&registry, "missing", TargetContext::new())
            .unwrap();

        let entry = sequencer.history().entry(batch_id).unwrap();
        assert_eq!(entry.steps.len(), 1);
        assert_eq!(entry.steps[0].status, StepStatus::Unrecognized);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_last_steps_move_to_end() {
        let sink = MemorySink::new();
        let log = CallLog::default();
        let mut registry = logging_registry(&["cmd_a", "cmd_b"], &[], &log);
        {
            let log = Arc::clone(&log);
            registry
                .define(
                    CommandSpec::new("cleanup")
                        .with_handler(Box::new(move |_ctx, _args| {
                            log.lock().unwrap().push("cleanup".to_string());
                            Ok(HandlerOutput::done())
                        }))
                        .run_last(),
                    &sink,
                )
                .unwrap();
        }
        let mut sequencer = CommandSequencer::new();

        sequencer
            .run(&registry, "cmd_a\ncleanup\ncmd_b", TargetContext::new())
            .unwrap();

        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["cmd_a", "cmd_b", "cleanup"]
        );
    }

    #[test]
    fn test_batches_never_interleave() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a", "cmd_b", "cmd_c", "cmd_d"], &[], &log);
        let mut sequencer = CommandSequencer::new();

        // Submit both before draining; the queue must keep them whole.
        sequencer
            .submit(&registry, "cmd_a\ncmd_b", TargetContext::new())
            .unwrap();
        sequencer
            .submit(&registry, "cmd_c\ncmd_d", TargetContext::new())
            .unwrap();
        sequencer.drain(&registry);

        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["cmd_a", "cmd_b", "cmd_c", "cmd_d"]
        );
    }

    #[test]
    fn test_before_execute_observer_fires_per_step() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a", "cmd_b"], &[], &log);
        let mut sequencer = CommandSequencer::new();

        let seen = CallLog::default();
        {
            let seen = Arc::clone(&seen);
            sequencer.on_before_execute(Box::new(move |name| {
                seen.lock().unwrap().push(name.to_string());
            }));
        }

        sequencer
            .run(&registry, "cmd_a\ncmd_b", TargetContext::new())
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), ["cmd_a", "cmd_b"]);
    }

    #[test]
    fn test_failure_observer_receives_name_and_reason() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a"], &["cmd_a"], &log);
        let mut sequencer = CommandSequencer::new();

        let reports = CallLog::default();
        {
            let reports = Arc::clone(&reports);
            sequencer.on_failure(Box::new(move |name, reason| {
                reports.lock().unwrap().push(format!("{name}: {reason}"));
            }));
        }

        sequencer
            .run(&registry, "cmd_a", TargetContext::new())
            .unwrap();

        assert_eq!(reports.lock().unwrap().as_slice(), ["cmd_a: boom"]);
    }

    #[test]
    fn test_context_reassignment_flows_to_later_steps() {
        let sink = MemorySink::new();
        let mut registry = CommandRegistry::new();
        let replacement = TargetContext::new();

        registry
            .define(
                CommandSpec::new("refocus")
                    .with_handler(Box::new(move |_ctx, _args| {
                        Ok(HandlerOutput::with_context(replacement))
                    }))
                    .reassigns_context(),
                &sink,
            )
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            registry
                .define(
                    CommandSpec::new("observe").with_handler(Box::new(move |ctx, _args| {
                        seen.lock().unwrap().push(*ctx);
                        Ok(HandlerOutput::done())
                    })),
                    &sink,
                )
                .unwrap();
        }

        let mut sequencer = CommandSequencer::new();
        let original = TargetContext::new();
        let batch_id = sequencer
            .run(&registry, "observe\nrefocus\nobserve", original)
            .unwrap();

        let contexts = seen.lock().unwrap();
        assert_eq!(contexts.as_slice(), [original, replacement]);

        let entry = sequencer.history().entry(batch_id).unwrap();
        assert_eq!(entry.steps[0].target_context, original);
        assert_eq!(entry.steps[2].target_context, replacement);
    }

    #[test]
    fn test_circular_alias_aborts_before_execution() {
        let sink = MemorySink::new();
        let mut registry = CommandRegistry::new();
        registry.alias("a", "a", &sink).unwrap();
        let mut sequencer = CommandSequencer::new();

        let result = sequencer.run(&registry, "a", TargetContext::new());
        assert!(result.is_err());
        assert!(sequencer.history().is_empty());
    }

    #[test]
    fn test_history_entry_recorded_before_execution() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a"], &[], &log);
        let mut sequencer = CommandSequencer::new();

        let batch_id = sequencer
            .submit(&registry, "cmd_a", TargetContext::new())
            .unwrap();

        // Submitted but not drained: entry exists with a pending step.
        let entry = sequencer.history().entry(batch_id).unwrap();
        assert_eq!(entry.steps[0].status, StepStatus::Pending);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a"], &[], &log);
        let mut sequencer = CommandSequencer::new();

        sequencer
            .run(&registry, "cmd_a", TargetContext::new())
            .unwrap();
        sequencer
            .run(&registry, "cmd_a", TargetContext::new())
            .unwrap();

        let entries = sequencer.history().entries();
        assert!(entries[0].timestamp < entries[1].timestamp);
    }

    #[test]
    fn test_history_json_export() {
        let log = CallLog::default();
        let registry = logging_registry(&["cmd_a"], &[], &log);
        let mut sequencer = CommandSequencer::new();

        sequencer
            .run(&registry, "cmd_a", TargetContext::new())
            .unwrap();

        let json = sequencer.history().to_json().unwrap();
        assert!(json.contains("cmd_a"));
        assert!(json.contains("Succeeded"));
    }
}
