use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Number of characters shown on each side of an offending span when
/// rendering a caret pointer.
const CONTEXT_WINDOW: usize = 24;

/// Unified error type for Quarry operations that cross a file or
/// configuration boundary.
#[derive(Debug, Error, Diagnostic)]
pub enum QuarryError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed version, specifier, marker or dependency text.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    /// The lock file exists but could not be read back.
    #[error("Lock file is corrupt: {message}")]
    #[diagnostic(
        code(quarry::lock_file_corrupt),
        help("Delete the lock file or run an unlocked resolution to regenerate it")
    )]
    LockFileCorrupt { message: String },

    /// A single candidate's metadata could not be read.
    #[error("Malformed package source for {package}: {message}")]
    MalformedPackageSource { package: String, message: String },

    /// Invalid resolver configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check ~/.quarry/config.toml for syntax errors"))]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type QuarryResult<T> = miette::Result<T>;

/// Malformed input text, pointing at the offending span.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
#[error("{message}: `{offending}`")]
#[diagnostic(code(quarry::parse))]
pub struct ParseError {
    pub message: String,
    pub offending: String,
    #[source_code]
    pub source_text: String,
    #[label("{message}")]
    pub span: SourceSpan,
}

impl ParseError {
    /// Build an error for the byte range `start..end` of `source`.
    ///
    /// The range is clamped to the source and widened to char boundaries.
    pub fn new(message: impl Into<String>, source: &str, start: usize, end: usize) -> Self {
        let mut start = start.min(source.len());
        let mut end = end.clamp(start, source.len());
        while !source.is_char_boundary(start) {
            start -= 1;
        }
        while !source.is_char_boundary(end) {
            end += 1;
        }
        Self {
            message: message.into(),
            offending: source[start..end].to_string(),
            source_text: source.to_string(),
            span: (start, end - start).into(),
        }
    }

    /// Error covering the whole input.
    pub fn whole(message: impl Into<String>, source: &str) -> Self {
        Self::new(message, source, 0, source.len())
    }

    /// Shift the span by `offset` bytes and replace the source text.
    ///
    /// Used when a clause was parsed out of a larger string.
    pub fn within(self, source: &str, offset: usize) -> Self {
        let start = self.span.offset() + offset;
        Self::new(self.message, source, start, start + self.span.len())
    }

    /// Render the surrounding text with a caret line under the offending span.
    pub fn pointer(&self) -> String {
        let start = self.span.offset();
        let len = self.span.len().max(1);
        let window_start = floor_boundary(&self.source_text, start.saturating_sub(CONTEXT_WINDOW));
        let window_end = ceil_boundary(
            &self.source_text,
            (start + len + CONTEXT_WINDOW).min(self.source_text.len()),
        );
        let window = &self.source_text[window_start..window_end];
        let pad = self.source_text[window_start..start.min(self.source_text.len())]
            .chars()
            .count();
        let carets = self.offending.chars().count().max(1);
        format!(
            "{window}\n{}{} {}",
            " ".repeat(pad),
            "^".repeat(carets),
            self.message
        )
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
