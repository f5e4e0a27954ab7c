//! All error-related Tomo types.

use crate::source::Span;
use serde::Serialize;
use std::fmt::{self, Debug, Display, Formatter};
use thiserror::Error;

/// A trait for any error that originates in source code. [SourceError]s rely
/// on having source code present in order to display themselves.
pub trait SourceError: 'static + Send + Sync + Debug + Serialize {
    /// A simple type label for this error, e.g. `"syntax"`.
    fn type_label(&self) -> &'static str;

    /// Format this error into a simple message. `spanned_src` is the slice of
    /// the source code that corresponds to this error's [Span]. This needs to
    /// be provided by the caller in order to create a proper error message.
    fn fmt_msg(&self, f: &mut Formatter<'_>, spanned_src: &str) -> fmt::Result;
}

/// An error that occurs while parsing a program. The error is due to a flaw
/// in the program, _not_ an internal parser bug. Parser bugs always panic.
/// Every parse failure (lexical, syntactic, or semantic-lite) converges on
/// this one shape: a message plus the span the wrapper carries.
#[derive(Clone, Debug, Serialize)]
pub enum ParseError {
    /// The parser could not make sense of the spanned source. `message`
    /// explains what was expected where the error occurred.
    Syntax { message: String },
}

impl SourceError for ParseError {
    fn type_label(&self) -> &'static str {
        "Syntax"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>, _spanned_src: &str) -> fmt::Result {
        match self {
            Self::Syntax { message } => write!(f, "{message}"),
        }
    }
}

/// An error that occurs in the runtime value library. Unlike parse errors
/// these carry no source span; they surface through `Result` returns on the
/// operations that can fail.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
pub enum RuntimeError {
    /// Numeric conversion would lose information and `truncate` was false.
    #[error("Could not convert to {target} without truncation: {value}")]
    InvalidConversion { value: String, target: &'static str },
    /// Out-of-bounds access that is not one of the saturating variants.
    #[error("Invalid index: {index} for a value with length {length}")]
    InvalidIndex { index: i64, length: i64 },
    /// Sampling weights must be finite, non-negative, and not all zero.
    #[error("Invalid sampling weight: {reason}")]
    InvalidWeight { reason: &'static str },
    /// Malformed input bytes: invalid UTF-8, or a truncated byte stream
    /// handed to deserialization.
    #[error("Invalid data: {reason}")]
    InvalidData { reason: &'static str },
    /// Pointers, functions, and closures have no serialized form.
    #[error("Values of type {type_name} cannot be serialized or deserialized")]
    SerializationUnsupported { type_name: String },
    /// Filesystem problems: missing files, bad path text, permission issues.
    #[error("Path error for {path}: {reason}")]
    PathError { path: String, reason: String },
    /// A table outgrew the maximum bucket count, or a similar hard limit.
    #[error("Resource exhausted: {reason}")]
    ResourceExhausted { reason: &'static str },
    /// A user-supplied callback broke its contract (e.g. a random number
    /// generator returning an out-of-range value).
    #[error("{reason}")]
    CallbackContract { reason: String },
}

impl SourceError for RuntimeError {
    fn type_label(&self) -> &'static str {
        "Runtime"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>, _spanned_src: &str) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A wrapper around a [SourceError], that holds some extra data:
/// - The [Span] of the source code that caused the error
/// - The offending chunk of source code itself
///
/// This type on its own can be formatted, without any external data.
#[derive(Clone, Debug, Error, Serialize)]
pub struct SourceErrorWrapper<E: SourceError> {
    error: E,
    span: Span,
    spanned_source: String,
}

impl<E: SourceError> SourceErrorWrapper<E> {
    pub fn new(error: E, span: Span, src: &str) -> Self {
        Self {
            error,
            span,
            spanned_source: span.get_source_slice(src).into(),
        }
    }

    pub fn error(&self) -> &E {
        &self.error
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

impl<E: SourceError> Display for SourceErrorWrapper<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error at {}:{}: ",
            self.error.type_label(),
            self.span.start_line,
            self.span.start_col,
        )?;
        self.error.fmt_msg(f, &self.spanned_source)?;
        Ok(())
    }
}

/// A wrapper around a collection of errors. This holds the errors as well as
/// the source code, and can be used to render associated source code with
/// each error.
#[derive(Clone, Debug, Error, Serialize)]
pub struct WithSource<E: SourceError> {
    errors: Vec<SourceErrorWrapper<E>>,
    #[serde(skip)]
    source_code: String,
}

impl<E: SourceError> WithSource<E> {
    /// Wrap a collection of errors with its source code.
    pub(crate) fn new(
        errors: impl IntoIterator<Item = SourceErrorWrapper<E>>,
        source: String,
    ) -> Self {
        Self {
            errors: errors.into_iter().collect(),
            source_code: source,
        }
    }

    /// Get a reference to the errors wrapped by this type.
    pub fn errors(&self) -> &[SourceErrorWrapper<E>] {
        &self.errors
    }
}

impl<E: SourceError> Display for WithSource<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }

            write!(f, "{}", error)?;
            if f.alternate() {
                crate::source::fmt_src_highlights(
                    f,
                    &error.span,
                    &self.source_code,
                )?;
            }
        }
        Ok(())
    }
}
