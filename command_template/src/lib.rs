//! # Command Template Compiler
//!
//! This crate compiles a command's declared template string into a typed
//! argument grammar and a single matching pattern.
//!
//! ## Philosophy
//!
//! - **Compile once, match many**: A template is compiled at registration
//!   time; invocations only run the compiled pattern
//! - **Deterministic**: The same template string always compiles to the
//!   same grammar
//! - **Degrade, don't crash**: Malformed placeholders produce diagnostics
//!   and a rejected or degraded template, never a panic
//!
//! ## Template grammar
//!
//! Each argument is written `{` + optional `...` (rest marker) + identifier
//! + optional `?` (optional marker) + optional `:type` + `}`. Literal text
//! before a placeholder becomes that argument's delimiter.
//!
//! ## Example
//!
//! ```ignore
//! use command_log::MemorySink;
//! use command_template::compile;
//!
//! let sink = MemorySink::new();
//! let template = compile("{count:number} {...items:array<string>}", &sink).unwrap();
//! assert_eq!(template.descriptors().len(), 2);
//! ```

use argument_types::ArgType;
use command_log::{Diagnostic, DiagnosticSink};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Matches one `{...name?:type}` placeholder occurrence
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{(\.\.\.)?([A-Za-z_][A-Za-z0-9_]*)(\?)?(?::([A-Za-z0-9_<>]+))?\}")
            .expect("placeholder pattern is a valid regex")
    })
}

/// One argument's metadata within a compiled template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDescriptor {
    /// Argument name from the placeholder
    pub name: String,
    /// Declared (or defaulted) argument type
    pub arg_type: ArgType,
    /// Literal text that precedes this argument in an invocation
    pub delimiter: String,
    /// Whether the argument may be omitted
    pub optional: bool,
    /// Whether the argument is variadic (last descriptor only)
    pub rest: bool,
}

/// Compiled argument grammar for one command
#[derive(Debug, Clone)]
pub struct Template {
    descriptors: Vec<ArgumentDescriptor>,
    pattern: Regex,
    rest_pattern: Option<Regex>,
    required_count: usize,
    trailing_delimiter: String,
    source: String,
}

impl Template {
    /// Returns the ordered argument descriptors
    pub fn descriptors(&self) -> &[ArgumentDescriptor] {
        &self.descriptors
    }

    /// Returns the number of non-optional arguments
    pub fn required_count(&self) -> usize {
        self.required_count
    }

    /// Returns the literal text following the last argument, if any
    pub fn trailing_delimiter(&self) -> &str {
        &self.trailing_delimiter
    }

    /// Returns the raw template string this grammar was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the source of the compiled whole-template pattern
    pub fn pattern_source(&self) -> &str {
        self.pattern.as_str()
    }

    /// Matches invocation argument text against the template
    ///
    /// On a match, returns one raw capture per descriptor in order; an
    /// omitted optional argument yields `None` in its slot. Returns `None`
    /// when the text does not fit the grammar at all.
    pub fn captures(&self, text: &str) -> Option<Vec<Option<String>>> {
        let caps = self.pattern.captures(text)?;
        Some(
            (0..self.descriptors.len())
                .map(|i| caps.get(i + 1).map(|m| m.as_str().to_string()))
                .collect(),
        )
    }

    /// Explodes a rest capture into its repeated elements
    ///
    /// The captured text is re-terminated with the rest argument's own
    /// delimiter and the auxiliary pattern is applied repeatedly, yielding
    /// one element per match. Returns an empty list for templates without
    /// a rest descriptor.
    pub fn explode_rest(&self, captured: &str) -> Vec<String> {
        let (rest_pattern, delimiter) = match (
            &self.rest_pattern,
            self.descriptors.iter().find(|d| d.rest),
        ) {
            (Some(pattern), Some(descriptor)) => (pattern, &descriptor.delimiter),
            _ => return Vec::new(),
        };

        let mut text = captured.to_string();
        text.push_str(delimiter);
        rest_pattern
            .captures_iter(&text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

/// Compiles a raw template string into a grammar
///
/// Returns `None` when the template is unusable: a non-empty string with no
/// placeholders, or a non-optional placeholder following an optional one.
/// Both cases (and every degraded placeholder) emit a diagnostic; an empty
/// string returns `None` silently and simply means "no arguments".
pub fn compile(raw: &str, sink: &dyn DiagnosticSink) -> Option<Template> {
    if raw.is_empty() {
        return None;
    }

    let matches: Vec<regex::Captures<'_>> = placeholder_regex().captures_iter(raw).collect();
    if matches.is_empty() {
        sink.emit(
            Diagnostic::warn("template", "template contains no placeholders")
                .with_field("template", raw),
        );
        return None;
    }

    let mut descriptors = Vec::with_capacity(matches.len());
    let mut cursor = 0;
    let mut seen_optional = false;
    let last_index = matches.len() - 1;

    for (index, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).expect("capture 0 always present");
        let delimiter = raw[cursor..whole.start()].to_string();
        cursor = whole.end();

        let mut rest = caps.get(1).is_some();
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default().to_string();
        let optional = caps.get(3).is_some();
        let type_name = caps.get(4).map(|m| m.as_str());

        if rest && index != last_index {
            sink.emit(
                Diagnostic::warn("template", "rest marker on a non-final argument is ignored")
                    .with_field("template", raw)
                    .with_field("argument", name.clone()),
            );
            rest = false;
        }

        let arg_type = match type_name {
            None => ArgType::Text,
            Some(type_name) => match ArgType::parse(type_name) {
                Some(arg_type) => arg_type,
                None => {
                    sink.emit(
                        Diagnostic::warn("template", "unknown argument type, using string")
                            .with_field("template", raw)
                            .with_field("argument", name.clone())
                            .with_field("type", type_name),
                    );
                    ArgType::Text
                }
            },
        };

        if seen_optional && !optional {
            sink.emit(
                Diagnostic::error(
                    "template",
                    "required argument after an optional one; template rejected",
                )
                .with_field("template", raw)
                .with_field("argument", name.clone()),
            );
            return None;
        }
        seen_optional |= optional;

        descriptors.push(ArgumentDescriptor {
            name,
            arg_type,
            delimiter,
            optional,
            rest,
        });
    }

    let trailing_delimiter = raw[cursor..].to_string();
    let required_count = descriptors.iter().filter(|d| !d.optional).count();

    let pattern_source = build_pattern(&descriptors, &trailing_delimiter);
    let pattern = match Regex::new(&pattern_source) {
        Ok(pattern) => pattern,
        Err(err) => {
            sink.emit(
                Diagnostic::error("template", "compiled pattern is invalid")
                    .with_field("template", raw)
                    .with_field("error", err.to_string()),
            );
            return None;
        }
    };

    let rest_pattern = match descriptors.iter().find(|d| d.rest) {
        None => None,
        Some(descriptor) => {
            let source = build_rest_pattern(descriptor);
            match Regex::new(&source) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    sink.emit(
                        Diagnostic::error("template", "rest extraction pattern is invalid")
                            .with_field("template", raw)
                            .with_field("error", err.to_string()),
                    );
                    return None;
                }
            }
        }
    };

    Some(Template {
        descriptors,
        pattern,
        rest_pattern,
        required_count,
        trailing_delimiter,
        source: raw.to_string(),
    })
}

/// Builds the anchored whole-template matching pattern
///
/// Non-final captures are lazy and the final capture greedy, so overflow
/// text accrues to the last argument slot. Optional arguments have their
/// whole segment (delimiter plus capture) made optional.
fn build_pattern(descriptors: &[ArgumentDescriptor], trailing_delimiter: &str) -> String {
    let mut pattern = String::from("^");
    let count = descriptors.len();

    for (index, descriptor) in descriptors.iter().enumerate() {
        let lazy = index + 1 != count;
        let fragment = type_fragment(descriptor.arg_type, lazy);

        let mut segment = regex::escape(&descriptor.delimiter);
        if descriptor.rest {
            let separator = regex::escape(&descriptor.delimiter);
            segment.push_str(&format!(
                "({fragment}(?:{separator}{fragment})*)",
                fragment = fragment,
                separator = separator
            ));
        } else {
            segment.push_str(&format!("({})", fragment));
        }

        if descriptor.optional {
            pattern.push_str(&format!("(?:{})?", segment));
        } else {
            pattern.push_str(&segment);
        }
    }

    pattern.push_str(&regex::escape(trailing_delimiter));
    pattern.push('$');
    pattern
}

/// Builds the auxiliary pattern that extracts one rest element per match
fn build_rest_pattern(descriptor: &ArgumentDescriptor) -> String {
    if descriptor.delimiter.is_empty() {
        format!("({})", type_fragment(descriptor.arg_type, false))
    } else {
        format!(
            "({}){}",
            type_fragment(descriptor.arg_type, true),
            regex::escape(&descriptor.delimiter)
        )
    }
}

/// Returns a type's pattern fragment as a non-capturing group
///
/// The lazy variant lets literal delimiters after the capture win over the
/// unbounded tail of the fragment.
fn type_fragment(arg_type: ArgType, lazy: bool) -> String {
    let fragment = arg_type.pattern_fragment();
    if lazy && fragment.ends_with('+') {
        format!("(?:{}?)", fragment)
    } else {
        format!("(?:{})", fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_log::{DiagnosticLevel, MemorySink};

    fn compile_ok(raw: &str) -> Template {
        let sink = MemorySink::new();
        let template = compile(raw, &sink);
        assert!(template.is_some(), "template {:?} should compile", raw);
        template.unwrap()
    }

    #[test]
    fn test_compile_empty_is_silent_none() {
        let sink = MemorySink::new();
        assert!(compile("", &sink).is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_compile_no_placeholders_diagnosed() {
        let sink = MemorySink::new();
        assert!(compile("just words", &sink).is_none());
        assert_eq!(sink.len(), 1);
        assert!(sink.has_level(DiagnosticLevel::Warn));
    }

    #[test]
    fn test_compile_single_argument() {
        let template = compile_ok("{path}");
        assert_eq!(template.descriptors().len(), 1);
        let descriptor = &template.descriptors()[0];
        assert_eq!(descriptor.name, "path");
        assert_eq!(descriptor.arg_type, ArgType::Text);
        assert_eq!(descriptor.delimiter, "");
        assert!(!descriptor.optional);
        assert!(!descriptor.rest);
        assert_eq!(template.required_count(), 1);
    }

    #[test]
    fn test_compile_delimiters_from_literals() {
        let template = compile_ok("{a} -> {b:number}");
        assert_eq!(template.descriptors()[0].delimiter, "");
        assert_eq!(template.descriptors()[1].delimiter, " -> ");
        assert_eq!(template.descriptors()[1].arg_type, ArgType::Number);
        assert_eq!(template.trailing_delimiter(), "");
    }

    #[test]
    fn test_compile_trailing_delimiter() {
        let template = compile_ok("({x:number})");
        assert_eq!(template.descriptors()[0].delimiter, "(");
        assert_eq!(template.trailing_delimiter(), ")");
    }

    #[test]
    fn test_compile_unknown_type_degrades_to_string() {
        let sink = MemorySink::new();
        let template = compile("{p:path}", &sink).unwrap();
        assert_eq!(template.descriptors()[0].arg_type, ArgType::Text);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_compile_rest_marker_only_final() {
        let sink = MemorySink::new();
        let template = compile("{...a} {b}", &sink).unwrap();
        assert!(!template.descriptors()[0].rest);
        assert!(!template.descriptors()[1].rest);
        assert!(sink.has_level(DiagnosticLevel::Warn));
    }

    #[test]
    fn test_compile_required_after_optional_rejected() {
        let sink = MemorySink::new();
        assert!(compile("{a?} {b}", &sink).is_none());
        assert!(sink.has_level(DiagnosticLevel::Error));
    }

    #[test]
    fn test_compile_optional_run_allowed() {
        let template = compile_ok("{a} {b?} {c?}");
        assert_eq!(template.required_count(), 1);
        assert!(template.descriptors()[1].optional);
        assert!(template.descriptors()[2].optional);
    }

    #[test]
    fn test_compile_deterministic() {
        let raw = "{name?} ({count:number}, {...items:array<string>})";
        let first = compile_ok(raw);
        let second = compile_ok(raw);
        assert_eq!(first.descriptors(), second.descriptors());
        assert_eq!(first.pattern_source(), second.pattern_source());
        assert_eq!(first.required_count(), second.required_count());
        assert_eq!(first.trailing_delimiter(), second.trailing_delimiter());
    }

    #[test]
    fn test_captures_two_arguments() {
        let template = compile_ok("{a} {b}");
        let caps = template.captures("left right").unwrap();
        assert_eq!(caps[0].as_deref(), Some("left"));
        assert_eq!(caps[1].as_deref(), Some("right"));
    }

    #[test]
    fn test_captures_overflow_goes_to_final_slot() {
        let template = compile_ok("{a} {b}");
        let caps = template.captures("one two three").unwrap();
        assert_eq!(caps[0].as_deref(), Some("one"));
        assert_eq!(caps[1].as_deref(), Some("two three"));
    }

    #[test]
    fn test_captures_optional_omitted() {
        let template = compile_ok("{a} {b?}");
        let caps = template.captures("solo").unwrap();
        assert_eq!(caps[0].as_deref(), Some("solo"));
        assert_eq!(caps[1], None);
    }

    #[test]
    fn test_captures_rejects_mismatch() {
        let template = compile_ok("{n:number} {items:array}");
        assert!(template.captures("not-bracketed at all").is_none());
    }

    #[test]
    fn test_captures_number_then_array() {
        let template = compile_ok("{count:number} {...items:array<string>}");
        let caps = template.captures("3 [a, b, c]").unwrap();
        assert_eq!(caps[0].as_deref(), Some("3"));
        assert_eq!(caps[1].as_deref(), Some("[a, b, c]"));
    }

    #[test]
    fn test_explode_rest_single_element() {
        let template = compile_ok("{count:number} {...items:array<string>}");
        assert_eq!(template.explode_rest("[a, b, c]"), vec!["[a, b, c]"]);
    }

    #[test]
    fn test_explode_rest_multiple_elements() {
        let template = compile_ok("{count:number} {...items:array<string>}");
        assert_eq!(template.explode_rest("[a] [b]"), vec!["[a]", "[b]"]);
    }

    #[test]
    fn test_explode_rest_words() {
        let template = compile_ok("{first} {...rest:boolean}");
        let caps = template.captures("go yes no").unwrap();
        assert_eq!(caps[1].as_deref(), Some("yes no"));
        assert_eq!(template.explode_rest("yes no"), vec!["yes", "no"]);
    }

    #[test]
    fn test_explode_rest_without_rest_descriptor() {
        let template = compile_ok("{a} {b}");
        assert!(template.explode_rest("anything").is_empty());
    }

    #[test]
    fn test_full_example_template() {
        let template = compile_ok("{name?} ({count:number}, {...items:array<string>})");
        let caps = template.captures("joe (3, [a], [b])").unwrap();
        assert_eq!(caps[0].as_deref(), Some("joe"));
        assert_eq!(caps[1].as_deref(), Some("3"));
        assert_eq!(caps[2].as_deref(), Some("[a], [b]"));
        assert_eq!(template.explode_rest("[a], [b]"), vec!["[a]", "[b]"]);
    }
}
