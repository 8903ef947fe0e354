//! # Command Registry
//!
//! This crate implements the process-wide table of registered commands and
//! aliases.
//!
//! ## Philosophy
//!
//! - **Explicit state, not ambient globals**: The registry is constructed
//!   once at startup and passed by reference to the parser and sequencer
//! - **Write-once, read-many**: Populated at extension-load time, read-only
//!   during invocation
//! - **Reject loudly, continue running**: A bad definition is refused with
//!   a diagnostic; it never takes the application down
//!
//! ## Example
//!
//! ```ignore
//! use command_log::MemorySink;
//! use command_registry::{CommandRegistry, CommandSpec, HandlerOutput};
//!
//! let sink = MemorySink::new();
//! let mut registry = CommandRegistry::new();
//! registry.define(
//!     CommandSpec::new("open_file")
//!         .with_handler(Box::new(|_ctx, _args| Ok(HandlerOutput::done())))
//!         .with_template("{path}"),
//!     &sink,
//! )?;
//! registry.alias("o", "open_file {0}", &sink)?;
//! ```

use argument_types::ArgValue;
use command_log::{Diagnostic, DiagnosticSink};
use command_template::Template;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Matches one `{0}`, `{1}`, ... positional placeholder in an alias target
fn positional_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\d+)\}").expect("positional pattern is a valid regex"))
}

/// Unique identifier for a registered command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Creates a new random command ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a command ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({})", self.0)
    }
}

/// Case-normalized command name
///
/// Non-empty, contains no whitespace, always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandName(String);

impl CommandName {
    /// Parses and normalizes a raw name
    pub fn parse(raw: &str) -> Result<Self, DefineError> {
        if raw.is_empty() {
            return Err(DefineError::EmptyName);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(DefineError::NameContainsWhitespace(raw.to_string()));
        }
        Ok(Self(raw.to_lowercase()))
    }

    /// Returns the normalized name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution context a command runs against (e.g. the target pane)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetContext(Uuid);

impl TargetContext {
    /// Creates a new random context
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a context from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TargetContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({})", self.0)
    }
}

/// Successful handler completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutput {
    new_context: Option<TargetContext>,
}

impl HandlerOutput {
    /// Completion without side effects on the batch
    pub fn done() -> Self {
        Self { new_context: None }
    }

    /// Completion that hands subsequent steps a new context
    ///
    /// Only honored when the command was defined with
    /// [`CommandSpec::reassigns_context`].
    pub fn with_context(context: TargetContext) -> Self {
        Self {
            new_context: Some(context),
        }
    }

    /// Returns the replacement context, if any
    pub fn new_context(&self) -> Option<TargetContext> {
        self.new_context
    }
}

/// Result of one handler invocation; the error carries the failure reason
pub type CommandResult = Result<HandlerOutput, String>;

/// Command handler function signature
pub type CommandHandler =
    Box<dyn Fn(&TargetContext, &[ArgValue]) -> CommandResult + Send + Sync>;

/// Whole-command argument splitting rule
///
/// Applied to the invocation remainder before template matching; the
/// compiled template stays the authoritative validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgCount {
    /// The command takes no arguments
    Zero,
    /// All remaining text becomes one single argument
    Variadic,
    /// At most this many arguments; overflow collapses into the final slot
    Max(usize),
}

/// What a command does when invoked
enum CommandKind {
    /// Regular command backed by a handler
    Handler(CommandHandler),
    /// Pure expansion into other command text with `{k}` placeholders
    Alias(String),
}

/// A registered unit of behavior
pub struct Command {
    id: CommandId,
    name: CommandName,
    kind: CommandKind,
    arg_count: ArgCount,
    delimiter: String,
    run_last: bool,
    reassigns_context: bool,
    template: Option<Template>,
}

impl Command {
    /// Returns the unique command ID
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Returns the normalized name
    pub fn name(&self) -> &CommandName {
        &self.name
    }

    /// Returns the argument delimiter
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Returns the whole-command argument splitting rule
    pub fn arg_count(&self) -> ArgCount {
        self.arg_count
    }

    /// Returns true if this command is deferred to the end of its batch
    pub fn run_last(&self) -> bool {
        self.run_last
    }

    /// Returns true if a successful handler may replace the batch context
    pub fn reassigns_context(&self) -> bool {
        self.reassigns_context
    }

    /// Returns the compiled argument grammar, if the command has one
    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    /// Returns the alias expansion text for alias commands
    pub fn alias_target(&self) -> Option<&str> {
        match &self.kind {
            CommandKind::Alias(target) => Some(target),
            CommandKind::Handler(_) => None,
        }
    }

    /// Returns the handler for non-alias commands
    pub fn handler(&self) -> Option<&CommandHandler> {
        match &self.kind {
            CommandKind::Handler(handler) => Some(handler),
            CommandKind::Alias(_) => None,
        }
    }

    /// Returns true if this command is an alias
    pub fn is_alias(&self) -> bool {
        matches!(self.kind, CommandKind::Alias(_))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alias", &self.is_alias())
            .field("arg_count", &self.arg_count)
            .field("delimiter", &self.delimiter)
            .field("run_last", &self.run_last)
            .finish()
    }
}

/// Declarative command definition consumed by [`CommandRegistry::define`]
pub struct CommandSpec {
    name: String,
    handler: Option<CommandHandler>,
    template: String,
    arg_count: Option<ArgCount>,
    delimiter: String,
    run_last: bool,
    reassigns_context: bool,
}

impl CommandSpec {
    /// Creates a definition for the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            template: String::new(),
            arg_count: None,
            delimiter: " ".to_string(),
            run_last: false,
            reassigns_context: false,
        }
    }

    /// Sets the handler invoked with the resolved arguments
    pub fn with_handler(mut self, handler: CommandHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the declared argument template
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Overrides the whole-command argument splitting rule
    pub fn with_arg_count(mut self, arg_count: ArgCount) -> Self {
        self.arg_count = Some(arg_count);
        self
    }

    /// Sets the argument delimiter (default: single space)
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Defers this command to the end of its batch
    pub fn run_last(mut self) -> Self {
        self.run_last = true;
        self
    }

    /// Allows a successful handler to replace the batch context
    pub fn reassigns_context(mut self) -> Self {
        self.reassigns_context = true;
        self
    }
}

/// Errors for command and alias definitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefineError {
    #[error("command name is empty")]
    EmptyName,

    #[error("command name '{0}' contains whitespace")]
    NameContainsWhitespace(String),

    #[error("command '{0}' is already registered")]
    DuplicateName(String),

    #[error("command '{0}' has no handler")]
    MissingHandler(String),
}

/// Substitutes `{k}` positional placeholders in an alias target
///
/// A placeholder with no corresponding argument becomes the empty string.
pub fn expand_alias(target: &str, args: &[String]) -> String {
    positional_regex()
        .replace_all(target, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .and_then(|index| args.get(index))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

/// Process-wide command table
///
/// Keys are normalized names; aliases live in the same namespace as
/// regular commands.
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers a command
    ///
    /// Fails on an empty, whitespace-containing or duplicate name and on a
    /// missing handler. The template is compiled here; an unusable template
    /// degrades the command to text-uncallable with a diagnostic rather
    /// than failing the definition.
    pub fn define(
        &mut self,
        spec: CommandSpec,
        sink: &dyn DiagnosticSink,
    ) -> Result<CommandId, DefineError> {
        let name = CommandName::parse(&spec.name)?;
        if self.commands.contains_key(name.as_str()) {
            sink.emit(
                Diagnostic::error("registry", "duplicate command definition rejected")
                    .with_field("name", name.as_str()),
            );
            return Err(DefineError::DuplicateName(name.as_str().to_string()));
        }
        let handler = spec
            .handler
            .ok_or_else(|| DefineError::MissingHandler(name.as_str().to_string()))?;

        let template = command_template::compile(&spec.template, sink);
        let arg_count = spec.arg_count.unwrap_or(match &template {
            Some(template) => ArgCount::Max(template.descriptors().len()),
            None => ArgCount::Zero,
        });

        // Self-consistency: a declared maximum below the template's
        // required argument count can never match.
        if let (ArgCount::Max(max), Some(template)) = (arg_count, &template) {
            if max < template.required_count() {
                sink.emit(
                    Diagnostic::warn("registry", "argument count below template requirement")
                        .with_field("name", name.as_str())
                        .with_field("max", max.to_string())
                        .with_field("required", template.required_count().to_string()),
                );
            }
        }

        let id = CommandId::new();
        self.commands.insert(
            name.as_str().to_string(),
            Command {
                id,
                name,
                kind: CommandKind::Handler(handler),
                arg_count,
                delimiter: spec.delimiter,
                run_last: spec.run_last,
                reassigns_context: spec.reassigns_context,
                template,
            },
        );
        Ok(id)
    }

    /// Registers an alias
    ///
    /// The alias's argument count is the number of distinct positional
    /// placeholders (`{0}`, `{1}`, ...) in the target text. No template is
    /// compiled; the aliased command parses the substituted text.
    pub fn alias(
        &mut self,
        alias_name: &str,
        target: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<CommandId, DefineError> {
        let name = CommandName::parse(alias_name)?;
        if self.commands.contains_key(name.as_str()) {
            sink.emit(
                Diagnostic::error("registry", "duplicate alias definition rejected")
                    .with_field("name", name.as_str()),
            );
            return Err(DefineError::DuplicateName(name.as_str().to_string()));
        }

        let distinct: HashSet<&str> = positional_regex()
            .captures_iter(target)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();
        let arg_count = if distinct.is_empty() {
            ArgCount::Zero
        } else {
            ArgCount::Max(distinct.len())
        };

        let id = CommandId::new();
        self.commands.insert(
            name.as_str().to_string(),
            Command {
                id,
                name,
                kind: CommandKind::Alias(target.to_string()),
                arg_count,
                delimiter: " ".to_string(),
                run_last: false,
                reassigns_context: false,
                template: None,
            },
        );
        Ok(id)
    }

    /// Looks up a command by name (case-normalized)
    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.get(&name.to_lowercase())
    }

    /// Returns true if the name is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    /// Returns all registered names, sorted
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered commands and aliases
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
