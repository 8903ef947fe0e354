//! # Command Engine Integration Tests
//!
//! End-to-end tests across the template compiler, registry, parser and
//! sequencer.
//!
//! ## Test Philosophy
//!
//! - **Grammar properties**: Deterministic compilation, optional/rest
//!   placement enforcement, cast round-trips
//! - **Resolution**: Typed arguments, alias fan-out, synthetic failures
//! - **Sequencing**: Fail-hard batches, FIFO queueing, run-last ordering,
//!   auditable history

#![cfg(test)]

use argument_types::{cast, ArgType, ArgValue};
use command_log::MemorySink;
use command_registry::{CommandHandler, CommandRegistry, CommandSpec, HandlerOutput, TargetContext};
use command_sequencer::{CommandSequencer, StepStatus};
use std::sync::{Arc, Mutex};

type CallLog = Arc<Mutex<Vec<String>>>;

fn recording_handler(name: &str, log: &CallLog) -> CommandHandler {
    let name = name.to_string();
    let log = Arc::clone(log);
    Box::new(move |_ctx, args| {
        let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        log.lock().unwrap().push(format!("{}({})", name, rendered.join(", ")));
        Ok(HandlerOutput::done())
    })
}

// ============================================================================
// Grammar properties
// ============================================================================

#[test]
fn test_compiling_twice_yields_identical_grammar() {
    let sink = MemorySink::new();
    let raw = "{name?} ({count:number}, {...items:array<string>})";
    let first = command_template::compile(raw, &sink).unwrap();
    let second = command_template::compile(raw, &sink).unwrap();

    assert_eq!(first.descriptors(), second.descriptors());
    assert_eq!(first.pattern_source(), second.pattern_source());
    assert_eq!(first.required_count(), second.required_count());
}

#[test]
fn test_optional_must_stay_optional_to_the_end() {
    let sink = MemorySink::new();
    assert!(command_template::compile("{a?} {b}", &sink).is_none());

    let accepted = command_template::compile("{a} {b?} {c?}", &sink).unwrap();
    assert!(accepted.descriptors().iter().skip(1).all(|d| d.optional));
}

#[test]
fn test_rest_only_on_final_descriptor() {
    let sink = MemorySink::new();
    let template = command_template::compile("{...a} {b} {...c:number}", &sink).unwrap();
    let rest_flags: Vec<bool> = template.descriptors().iter().map(|d| d.rest).collect();
    assert_eq!(rest_flags, vec![false, false, true]);
}

#[test]
fn test_cast_round_trips() {
    let values = [
        ArgValue::Number(42.0),
        ArgValue::Number(0.5),
        ArgValue::Bool(true),
        ArgValue::Bool(false),
        ArgValue::NumberList(vec![1.0, 2.0, 3.5]),
    ];
    for value in values {
        let arg_type = match &value {
            ArgValue::Number(_) => ArgType::Number,
            ArgValue::Bool(_) => ArgType::Boolean,
            ArgValue::NumberList(_) => ArgType::NumberArray,
            _ => unreachable!(),
        };
        assert_eq!(cast(&value.to_string(), arg_type), Some(value));
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_count_and_rest_items_resolution() {
    let sink = MemorySink::new();
    let log = CallLog::default();
    let mut registry = CommandRegistry::new();
    registry
        .define(
            CommandSpec::new("fill")
                .with_handler(recording_handler("fill", &log))
                .with_template("{count:number} {...items:array<string>}"),
            &sink,
        )
        .unwrap();

    let steps = command_parser::resolve("fill 3 [a, b, c]", &registry).unwrap();
    assert_eq!(
        steps[0].args,
        vec![
            ArgValue::Number(3.0),
            ArgValue::TextList(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        ]
    );
}

#[test]
fn test_alias_expands_to_two_boolean_steps() {
    let sink = MemorySink::new();
    let log = CallLog::default();
    let mut registry = CommandRegistry::new();
    registry
        .define(
            CommandSpec::new("split_v")
                .with_handler(recording_handler("split_v", &log))
                .with_template("{focus:boolean}"),
            &sink,
        )
        .unwrap();
    registry
        .define(
            CommandSpec::new("split_h")
                .with_handler(recording_handler("split_h", &log))
                .with_template("{focus:boolean}"),
            &sink,
        )
        .unwrap();
    registry
        .alias("sb", "split_v {0}\nsplit_h {0}", &sink)
        .unwrap();

    let steps = command_parser::resolve("sb true", &registry).unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps
        .iter()
        .all(|step| step.args == vec![ArgValue::Bool(true)]));

    let mut sequencer = CommandSequencer::new();
    sequencer.run(&registry, "sb true", TargetContext::new()).unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["split_v(true)", "split_h(true)"]
    );
}

#[test]
fn test_unregistered_name_yields_one_unrecognized_step() {
    let registry = CommandRegistry::new();
    let steps = command_parser::resolve("ghost", &registry).unwrap();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].is_failed());

    let mut sequencer = CommandSequencer::new();
    let batch_id = sequencer
        .run(&registry, "ghost", TargetContext::new())
        .unwrap();
    let entry = sequencer.history().entry(batch_id).unwrap();
    assert_eq!(entry.steps.len(), 1);
    assert_eq!(entry.steps[0].status, StepStatus::Unrecognized);
}

#[test]
fn test_self_alias_raises_before_execution() {
    let sink = MemorySink::new();
    let mut registry = CommandRegistry::new();
    registry.alias("a", "a", &sink).unwrap();

    let err = command_parser::resolve("a", &registry).unwrap_err();
    let command_parser::ResolveError::CircularAlias { chain } = err;
    assert_eq!(chain, vec!["a".to_string(), "a".to_string()]);

    let mut sequencer = CommandSequencer::new();
    assert!(sequencer.run(&registry, "a", TargetContext::new()).is_err());
    assert!(sequencer.history().is_empty());
}

// ============================================================================
// Sequencing
// ============================================================================

#[test]
fn test_failing_middle_step_fails_hard() {
    let sink = MemorySink::new();
    let log = CallLog::default();
    let mut registry = CommandRegistry::new();
    registry
        .define(
            CommandSpec::new("cmd_a").with_handler(recording_handler("cmd_a", &log)),
            &sink,
        )
        .unwrap();
    registry
        .define(
            CommandSpec::new("cmd_b").with_handler(Box::new(|_ctx, _args| {
                Err("disk unavailable".to_string())
            })),
            &sink,
        )
        .unwrap();
    registry
        .define(
            CommandSpec::new("cmd_c").with_handler(recording_handler("cmd_c", &log)),
            &sink,
        )
        .unwrap();

    let mut sequencer = CommandSequencer::new();
    let batch_id = sequencer
        .run(&registry, "cmd_a\ncmd_b\ncmd_c", TargetContext::new())
        .unwrap();

    let entry = sequencer.history().entry(batch_id).unwrap();
    assert_eq!(entry.steps[0].status, StepStatus::Succeeded);
    assert_eq!(
        entry.steps[1].status,
        StepStatus::Failed {
            reason: "disk unavailable".to_string()
        }
    );
    assert_eq!(entry.steps[2].status, StepStatus::Skipped);
    // cmd_c never ran.
    assert_eq!(log.lock().unwrap().as_slice(), ["cmd_a()"]);
}

#[test]
fn test_back_to_back_batches_stay_whole() {
    let sink = MemorySink::new();
    let log = CallLog::default();
    let mut registry = CommandRegistry::new();
    for name in ["one", "two", "three", "four"] {
        registry
            .define(
                CommandSpec::new(name).with_handler(recording_handler(name, &log)),
                &sink,
            )
            .unwrap();
    }

    let mut sequencer = CommandSequencer::new();
    sequencer
        .submit(&registry, "one\ntwo", TargetContext::new())
        .unwrap();
    sequencer
        .submit(&registry, "three\nfour", TargetContext::new())
        .unwrap();
    sequencer.drain(&registry);

    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["one()", "two()", "three()", "four()"]
    );
}

#[test]
fn test_run_last_partition_is_stable() {
    let sink = MemorySink::new();
    let log = CallLog::default();
    let mut registry = CommandRegistry::new();
    for (name, deferred) in [
        ("first", false),
        ("late_a", true),
        ("second", false),
        ("late_b", true),
    ] {
        let spec = CommandSpec::new(name).with_handler(recording_handler(name, &log));
        let spec = if deferred { spec.run_last() } else { spec };
        registry.define(spec, &sink).unwrap();
    }

    let mut sequencer = CommandSequencer::new();
    sequencer
        .run(
            &registry,
            "first\nlate_a\nsecond\nlate_b",
            TargetContext::new(),
        )
        .unwrap();

    // Relative order within each group is preserved.
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["first()", "second()", "late_a()", "late_b()"]
    );
}

#[test]
fn test_history_export_names_every_step() {
    let sink = MemorySink::new();
    let log = CallLog::default();
    let mut registry = CommandRegistry::new();
    registry
        .define(
            CommandSpec::new("jump")
                .with_handler(recording_handler("jump", &log))
                .with_template("{line:number}"),
            &sink,
        )
        .unwrap();

    let mut sequencer = CommandSequencer::new();
    sequencer
        .run(&registry, "jump 12", TargetContext::new())
        .unwrap();

    let json = sequencer.history().to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    let steps = parsed[0]["steps"].as_array().unwrap();
    assert_eq!(steps[0]["command_name"], "jump");
    assert_eq!(steps[0]["status"], "Succeeded");
}
