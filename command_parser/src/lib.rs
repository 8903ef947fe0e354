//! # Invocation Parser
//!
//! This crate resolves raw invocation text into a sequence of typed command
//! steps.
//!
//! ## Philosophy
//!
//! - **Failure is local**: An unrecognized name or bad argument becomes a
//!   synthetic failing step for that line; other lines still resolve
//! - **Cycles are fatal for the batch**: A circular alias aborts resolution
//!   of the whole batch with the full chain, before anything executes
//! - **Iterative, not recursive**: Alias expansion runs on an explicit
//!   worklist that carries the recursion chain, so expansion depth never
//!   grows the call stack
//!
//! ## Processing model
//!
//! Input is line-oriented: each non-blank line resolves independently and
//! the results are concatenated. An alias may expand to several lines; its
//! steps are spliced in place of the alias line.

use argument_types::{cast, ArgType, ArgValue};
use command_registry::{expand_alias, ArgCount, Command, CommandRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a resolved step can never run
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StepFailure {
    /// The command name is not registered
    #[error("not recognized")]
    Unrecognized,

    /// The argument text does not fit the command's template
    #[error("insufficient or incorrect arguments, expected: {expected}")]
    InvalidArguments {
        /// The command's declared template string
        expected: String,
    },

    /// A matched argument failed its type cast
    #[error("argument '{argument}' rejected value '{value}'")]
    CastFailed { argument: String, value: String },
}

/// One resolved step of a batch
///
/// A step carrying a [`StepFailure`] is the synthetic failing command of
/// the resolution rules: the sequencer records its failure without ever
/// invoking a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    /// Normalized command name (the attempted name when unrecognized)
    pub command_name: String,
    /// Ordered typed arguments
    pub args: Vec<ArgValue>,
    /// Set when the step can never run
    pub failure: Option<StepFailure>,
    /// Whether the command is deferred to the end of its batch
    pub run_last: bool,
}

impl ResolvedStep {
    fn synthetic(command_name: String, failure: StepFailure) -> Self {
        Self {
            command_name,
            args: Vec::new(),
            failure: Some(failure),
            run_last: false,
        }
    }

    /// Returns true if this step will be recorded as failed without running
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Hard resolution errors that abort the whole batch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// An alias expansion reached a command already being expanded
    #[error("circular alias expansion: {}", chain.join(" -> "))]
    CircularAlias { chain: Vec<String> },
}

/// Resolves invocation text against the registry
///
/// Returns the concatenated steps of every non-blank line, or a
/// [`ResolveError::CircularAlias`] carrying the full chain when alias
/// expansion loops.
pub fn resolve(
    input: &str,
    registry: &CommandRegistry,
) -> Result<Vec<ResolvedStep>, ResolveError> {
    let mut steps = Vec::new();

    // Worklist of (line, alias chain), pushed in reverse so expansion
    // splices in place.
    let mut work: Vec<(String, Vec<String>)> = input
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .map(|line| (line.to_string(), Vec::new()))
        .collect();

    while let Some((line, chain)) = work.pop() {
        let trimmed = line.trim();
        let (name_token, remainder) = match trimmed.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest),
            None => (trimmed, ""),
        };

        let command = match registry.lookup(name_token) {
            Some(command) => command,
            None => {
                steps.push(ResolvedStep::synthetic(
                    name_token.to_lowercase(),
                    StepFailure::Unrecognized,
                ));
                continue;
            }
        };

        let name = command.name().as_str().to_string();
        if chain.iter().any(|visited| visited == &name) {
            let mut full_chain = chain;
            full_chain.push(name);
            return Err(ResolveError::CircularAlias { chain: full_chain });
        }

        let tokens = shape_arguments(command, remainder);

        if let Some(target) = command.alias_target() {
            let expansion = expand_alias(target, &tokens);
            let mut next_chain = chain;
            next_chain.push(name);
            for line in expansion
                .lines()
                .rev()
                .filter(|line| !line.trim().is_empty())
            {
                work.push((line.to_string(), next_chain.clone()));
            }
            continue;
        }

        steps.push(resolve_step(command, &tokens));
    }

    Ok(steps)
}

/// Applies the whole-command argument splitting rule to the remainder
fn shape_arguments(command: &Command, remainder: &str) -> Vec<String> {
    if remainder.is_empty() {
        return Vec::new();
    }

    match command.arg_count() {
        ArgCount::Zero | ArgCount::Max(0) => Vec::new(),
        ArgCount::Variadic => vec![remainder.to_string()],
        ArgCount::Max(max) => {
            let delimiter = command.delimiter();
            let tokens: Vec<&str> = remainder.split(delimiter).collect();
            if tokens.len() <= max {
                tokens.into_iter().map(str::to_string).collect()
            } else {
                // Collapse the overflow tail into the final slot, keeping
                // the original separators inside it.
                let mut shaped: Vec<String> =
                    tokens[..max - 1].iter().map(|t| t.to_string()).collect();
                shaped.push(tokens[max - 1..].join(delimiter));
                shaped
            }
        }
    }
}

/// Validates and casts one non-alias step
fn resolve_step(command: &Command, tokens: &[String]) -> ResolvedStep {
    let name = command.name().as_str().to_string();
    let run_last = command.run_last();

    let template = match command.template() {
        Some(template) => template,
        None => {
            // Template-less command: tokens pass through as text.
            let args = tokens
                .iter()
                .filter_map(|token| cast(token, ArgType::Text))
                .collect();
            return ResolvedStep {
                command_name: name,
                args,
                failure: None,
                run_last,
            };
        }
    };

    let joined = tokens.join(command.delimiter());
    let captures = match template.captures(&joined) {
        Some(captures) => captures,
        None => {
            if template.required_count() > 0 {
                return ResolvedStep {
                    run_last,
                    ..ResolvedStep::synthetic(
                        name,
                        StepFailure::InvalidArguments {
                            expected: template.source().to_string(),
                        },
                    )
                };
            }
            // Nothing required; the invocation simply has no arguments.
            return ResolvedStep {
                command_name: name,
                args: Vec::new(),
                failure: None,
                run_last,
            };
        }
    };

    let mut args = Vec::new();
    for (descriptor, capture) in template.descriptors().iter().zip(captures) {
        let capture = match capture {
            Some(capture) => capture,
            None => continue,
        };

        if descriptor.rest {
            for element in template.explode_rest(&capture) {
                match cast(&element, descriptor.arg_type) {
                    Some(value) => args.push(value),
                    None => {
                        return ResolvedStep {
                            run_last,
                            ..ResolvedStep::synthetic(
                                name,
                                StepFailure::CastFailed {
                                    argument: descriptor.name.clone(),
                                    value: element,
                                },
                            )
                        };
                    }
                }
            }
        } else {
            match cast(&capture, descriptor.arg_type) {
                Some(value) => args.push(value),
                None => {
                    return ResolvedStep {
                        run_last,
                        ..ResolvedStep::synthetic(
                            name,
                            StepFailure::CastFailed {
                                argument: descriptor.name.clone(),
                                value: capture,
                            },
                        )
                    };
                }
            }
        }
    }

    ResolvedStep {
        command_name: name,
        args,
        failure: None,
        run_last,
    }
}
