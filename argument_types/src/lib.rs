//! # Argument Types
//!
//! This crate implements the type registry for command arguments.
//!
//! ## Philosophy
//!
//! - **Closed variants, not coercion**: Handlers pattern-match on `ArgValue`
//!   instead of relying on implicit conversions
//! - **Patterns validate shape, casts validate meaning**: A fragment accepts
//!   candidate text; the cast decides whether it is a real value
//! - **Failure is a value**: A failed cast is `None`, never a panic
//!
//! ## Recognized types
//!
//! Exactly six type names are recognized in command templates: `number`,
//! `string`, `boolean`, `array`, `array<string>` and `array<number>`.
//! Unknown names degrade to `string` at template-compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Argument type recognized by the template grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgType {
    /// Floating-point number
    Number,
    /// Quoted or bare text
    Text,
    /// Boolean word (`true`/`yes`/`y`, `false`/`no`/`n`)
    Boolean,
    /// Bracketed list with per-element type inference
    Array,
    /// Bracketed list of text elements
    TextArray,
    /// Bracketed list of numbers
    NumberArray,
}

impl ArgType {
    /// Parses a template type name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "number" => Some(ArgType::Number),
            "string" => Some(ArgType::Text),
            "boolean" => Some(ArgType::Boolean),
            "array" => Some(ArgType::Array),
            "array<string>" => Some(ArgType::TextArray),
            "array<number>" => Some(ArgType::NumberArray),
            _ => None,
        }
    }

    /// Returns the template name for this type
    pub fn name(&self) -> &'static str {
        match self {
            ArgType::Number => "number",
            ArgType::Text => "string",
            ArgType::Boolean => "boolean",
            ArgType::Array => "array",
            ArgType::TextArray => "array<string>",
            ArgType::NumberArray => "array<number>",
        }
    }

    /// Returns the regex fragment that matches this type's raw text
    ///
    /// Boolean shape is deliberately loose (any bare word); the word is
    /// only checked when it is cast.
    pub fn pattern_fragment(&self) -> &'static str {
        match self {
            ArgType::Number => r"[\d.]+",
            ArgType::Text => r#"'[^']*'|"[^"]*"|[^,'"]+"#,
            ArgType::Boolean => r"\w+",
            ArgType::Array | ArgType::TextArray | ArgType::NumberArray => r"\[[^\]]*\]",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed command argument
///
/// This is the closed set of values a handler can receive. The canonical
/// textual form produced by `Display` round-trips through `cast` for
/// numbers, booleans and number lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    /// Floating-point number
    Number(f64),
    /// Text with surrounding quotes removed
    Text(String),
    /// Boolean
    Bool(bool),
    /// Homogeneous number list
    NumberList(Vec<f64>),
    /// Text list
    TextList(Vec<String>),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Number(n) => write!(f, "{}", n),
            ArgValue::Text(s) => write!(f, "{}", s),
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::NumberList(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ArgValue::TextList(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Casts raw invocation text to a typed value
///
/// Returns `None` when the text is not a valid value of the requested type,
/// including when any element of an array fails to cast.
pub fn cast(raw: &str, arg_type: ArgType) -> Option<ArgValue> {
    match arg_type {
        ArgType::Number => raw.trim().parse::<f64>().ok().map(ArgValue::Number),
        ArgType::Text => Some(ArgValue::Text(strip_quotes(raw).to_string())),
        ArgType::Boolean => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" => Some(ArgValue::Bool(true)),
            "false" | "no" | "n" => Some(ArgValue::Bool(false)),
            _ => None,
        },
        ArgType::Array => {
            let elements = split_array(raw)?;
            let numbers: Option<Vec<f64>> = elements
                .iter()
                .map(|e| e.parse::<f64>().ok())
                .collect();
            match numbers {
                // Per-element inference: numbers when every element parses,
                // otherwise the whole list stays textual.
                Some(numbers) if !elements.is_empty() => Some(ArgValue::NumberList(numbers)),
                _ => Some(ArgValue::TextList(
                    elements.iter().map(|e| strip_quotes(e).to_string()).collect(),
                )),
            }
        }
        ArgType::TextArray => {
            let elements = split_array(raw)?;
            Some(ArgValue::TextList(
                elements.iter().map(|e| strip_quotes(e).to_string()).collect(),
            ))
        }
        ArgType::NumberArray => {
            let elements = split_array(raw)?;
            let numbers: Option<Vec<f64>> =
                elements.iter().map(|e| e.parse::<f64>().ok()).collect();
            numbers.map(ArgValue::NumberList)
        }
    }
}

/// Removes one pair of matching surrounding quotes, if present
fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'\'' || first == b'"') {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Splits bracketed array text into trimmed element strings
///
/// Commas inside quoted elements do not split. Returns `None` when the text
/// is not bracket-delimited; an empty body yields an empty list.
fn split_array(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix('[')?.strip_suffix(']')?;
    if body.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut elements = Vec::new();
    let mut current = String::new();
    let mut in_quote: Option<char> = None;
    for ch in body.chars() {
        match ch {
            '\'' | '"' => {
                match in_quote {
                    Some(q) if q == ch => in_quote = None,
                    None => in_quote = Some(ch),
                    Some(_) => {}
                }
                current.push(ch);
            }
            ',' if in_quote.is_none() => {
                elements.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    elements.push(current.trim().to_string());
    Some(elements)
}
