// Parse error types
// Carries location, surrounding source context, and a fix suggestion

use std::fmt;

/// Detailed parse error with location and context
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// A few source lines around the error
    pub context: String,
    /// Optional suggestion for fixing the error
    pub suggestion: Option<String>,
    /// The kind of error
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// YAML syntax error
    YamlSyntax,
    /// Invalid schema (wrong types, missing fields)
    InvalidSchema,
    /// Invalid value
    InvalidValue,
    /// IO error (file not found, etc.)
    IoError,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            context: String::new(),
            suggestion: None,
            kind: ParseErrorKind::InvalidSchema,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: 0,
            column: 0,
            context: String::new(),
            suggestion: None,
            kind: ParseErrorKind::IoError,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a context excerpt taken from the source text
    pub fn with_source_context(mut self, source: &str, context_lines: usize) -> Self {
        let lines: Vec<&str> = source.lines().collect();
        if self.line == 0 || lines.is_empty() {
            return self;
        }
        let start = self.line.saturating_sub(context_lines + 1);
        let end = (self.line + context_lines).min(lines.len());

        let mut context = String::new();
        for (i, line) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = i + 1;
            let marker = if line_num == self.line { ">" } else { " " };
            context.push_str(&format!("{} {:4} | {}\n", marker, line_num, line));
        }

        self.context = context;
        self
    }

    /// Build from a serde_yaml error, cleaning up the message and attaching
    /// a suggestion for known mistakes.
    pub fn from_yaml_error(err: &serde_yaml::Error, source: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));

        let message = tidy_yaml_message(&err.to_string());
        let suggestion = suggest_fix(&message, source, line);

        let mut parse_err = ParseError::new(message, line, column)
            .with_kind(ParseErrorKind::YamlSyntax)
            .with_source_context(source, 2);
        parse_err.suggestion = suggestion;
        parse_err
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;
        if self.line > 0 {
            writeln!(f, "  --> line {}:{}", self.line, self.column)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            write!(f, "{}", self.context)?;
        }

        if let Some(suggestion) = &self.suggestion {
            writeln!(f)?;
            writeln!(f, "help: {}", suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Clean up common serde_yaml error phrasing
fn tidy_yaml_message(msg: &str) -> String {
    if msg.contains("missing field") {
        if let Some(field) = between(msg, "missing field `", "`") {
            return format!("missing required field '{}'", field);
        }
    }

    if msg.contains("invalid type") {
        if let (Some(expected), Some(found)) =
            (between(msg, "expected ", ","), between(msg, "found ", " at"))
        {
            return format!("expected {}, but found {}", expected, found);
        }
    }

    msg.to_string()
}

fn between(msg: &str, prefix: &str, suffix: &str) -> Option<String> {
    let start = msg.find(prefix)? + prefix.len();
    let end = msg[start..].find(suffix)? + start;
    Some(msg[start..end].to_string())
}

/// Suggest fixes for common workflow mistakes
fn suggest_fix(message: &str, source: &str, line: usize) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let error_line = lines.get(line.saturating_sub(1)).copied().unwrap_or("");
    let lower_line = error_line.to_lowercase();

    if message.contains("data did not match any variant") && lower_line.contains("- ") {
        return Some(
            "each step needs either 'run:' with a script or 'publish:' with package and path"
                .to_string(),
        );
    }

    // Underscore spellings of kebab-case keys
    let typo_suggestions = [
        ("need:", "needs"),
        ("fail_fast", "fail-fast"),
        ("max_parallel", "max-parallel"),
        ("continue_on_error", "continue-on-error"),
        ("timeout_minutes", "timeout-minutes"),
        ("working_directory", "working-directory"),
    ];
    for (typo, correct) in typo_suggestions {
        if lower_line.contains(typo) {
            return Some(format!("did you mean '{}'?", correct));
        }
    }

    if error_line.starts_with('\t') {
        return Some("YAML prefers spaces over tabs for indentation".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location_and_help() {
        let err = ParseError::new("missing required field 'package'", 4, 7)
            .with_suggestion("publish steps need a 'package:' field");

        let output = format!("{}", err);
        assert!(output.contains("missing required field"));
        assert!(output.contains("line 4:7"));
        assert!(output.contains("help:"));
    }

    #[test]
    fn test_source_context_marks_error_line() {
        let source = "name: release\njobs:\n  package:\n    steps:\n      - run echo hi";
        let err = ParseError::new("bad step", 5, 9).with_source_context(source, 1);

        assert!(err.context.contains(">    5 |"));
        assert!(err.context.contains("run echo hi"));
    }

    #[test]
    fn test_tidy_missing_field() {
        assert_eq!(
            tidy_yaml_message("missing field `path` at line 3 column 5"),
            "missing required field 'path'"
        );
    }

    #[test]
    fn test_suggest_underscore_typo() {
        let source = "jobs:\n  test:\n    strategy:\n      fail_fast: true";
        let suggestion = suggest_fix("unknown field", source, 4);
        assert_eq!(suggestion, Some("did you mean 'fail-fast'?".to_string()));
    }
}
