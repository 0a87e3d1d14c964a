//! Internal error representation for the assembler core.
//!
//! Two shapes exist below the crate boundary: [`LineError`] (anchored to a
//! token, so it can grow a caret) and the fully-rendered, location-qualified
//! [`Error`] that crosses into [`weld_errors::Error`]. The driver is the only
//! place that turns one into the other, because it's the only place that
//! knows the current file name, line number, and source text.

use std::fmt;

/// An error raised while processing a single token or line, before the
/// driver has had a chance to stamp it with file/line context.
#[derive(Debug, Clone)]
pub(crate) enum LineError {
    /// A malformed numeric literal (wrong digit for the base, empty body).
    /// `column` points at the start of the offending token.
    Parse { message: String, column: usize },
    /// An unexpected token, directive, or out-of-range value. `column`
    /// points at the offending token.
    Syntax { message: String, column: usize },
    /// Misuse of a segment (offset below `start`, write past declared
    /// size). Not anchored to a token.
    Segment { message: String },
    /// A label reference left unresolved at end of file.
    Reference { message: String },
    /// An included file failed to assemble. `message` already carries the
    /// inner file's fully-rendered diagnostic.
    Nested { message: String },
}

impl LineError {
    pub(crate) fn parse(message: impl Into<String>, column: usize) -> Self {
        Self::Parse { message: message.into(), column }
    }

    pub(crate) fn syntax(message: impl Into<String>, column: usize) -> Self {
        Self::Syntax { message: message.into(), column }
    }

    pub(crate) fn segment(message: impl Into<String>) -> Self {
        Self::Segment { message: message.into() }
    }

    pub(crate) fn reference(message: impl Into<String>) -> Self {
        Self::Reference { message: message.into() }
    }

    pub(crate) fn nested(message: impl Into<String>) -> Self {
        Self::Nested { message: message.into() }
    }

    /// The bare message, without file/line/caret context.
    fn message(&self) -> &str {
        match self {
            Self::Parse { message, .. }
            | Self::Syntax { message, .. }
            | Self::Segment { message }
            | Self::Reference { message }
            | Self::Nested { message } => message,
        }
    }

    /// Render this error with its source location, and a caret line when
    /// the error is anchored to a token column.
    pub(crate) fn render(&self, file: &str, line_number: usize, source_line: &str) -> String {
        let kind = match self {
            Self::Parse { .. } => "ParseError",
            Self::Syntax { .. } => "SyntaxError",
            Self::Segment { .. } => "SegmentError",
            Self::Reference { .. } => "ReferenceError",
            Self::Nested { .. } => "NestedError",
        };

        let mut rendered =
            format!("[{file}:{line_number}] {kind}: {message}", message = self.message());

        if let Self::Parse { column, .. } | Self::Syntax { column, .. } = self {
            rendered.push('\n');
            rendered.push_str(source_line);
            rendered.push('\n');
            rendered.push_str(&" ".repeat(*column));
            rendered.push('^');
        }

        rendered
    }
}

impl fmt::Display for LineError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.message())
    }
}

/// A fully location-qualified error, ready to become a
/// [`weld_errors::Error`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Wraps [`LineError::Parse`], already carrying file/line/caret context.
    #[error("{0}")]
    Parse(String),
    /// Wraps [`LineError::Syntax`], already carrying file/line/caret context.
    #[error("{0}")]
    Syntax(String),
    /// Wraps [`LineError::Segment`], already carrying file/line context.
    #[error("{0}")]
    Segment(String),
    /// Wraps [`LineError::Reference`], already carrying file/line context.
    #[error("{0}")]
    Reference(String),
    /// An included file failed to assemble; carries the inner diagnostic.
    #[error("{0}")]
    Nested(String),
    /// The architecture description named by `.arch` could not be loaded.
    #[error("{0}")]
    Config(String),
}

impl Error {
    pub(crate) fn from_line_error(
        error: &LineError,
        file: &str,
        line_number: usize,
        source_line: &str,
    ) -> Self {
        let rendered = error.render(file, line_number, source_line);

        match error {
            LineError::Parse { .. } => Self::Parse(rendered),
            LineError::Syntax { .. } => Self::Syntax(rendered),
            LineError::Segment { .. } => Self::Segment(rendered),
            LineError::Reference { .. } => Self::Reference(rendered),
            LineError::Nested { .. } => Self::Nested(rendered),
        }
    }
}

impl From<weld_arch::Error> for Error {
    fn from(error: weld_arch::Error) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<Error> for weld_errors::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Parse(message) => weld_errors::Error::Parse(message),
            Error::Syntax(message) => weld_errors::Error::Syntax(message),
            Error::Segment(message) => weld_errors::Error::Segment(message),
            Error::Reference(message) => weld_errors::Error::Reference(message),
            Error::Nested(message) => weld_errors::Error::Nested(message),
            Error::Config(message) => weld_errors::Error::Config(message),
        }
    }
}
