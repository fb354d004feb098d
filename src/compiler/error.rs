use crate::{StringTable, StringTableError};

use super::{SourceMap, Span};

/// Represents an error generated from within the compiler along with the
/// region of source code the error applies to.
///
/// This type captures the metadata which is necessarily present for every
/// error caused by input source code (the [`Span`] the error occurs at) and
/// handles formatting the universal metadata along with the inner, stage
/// specific, error value.
#[derive(Clone, Debug, PartialEq)]
pub struct CompilerError<IE> {
    span: Span,
    inner: IE,
}

impl<IE> CompilerError<IE> {
    pub fn new(span: Span, inner: IE) -> Self {
        CompilerError { span, inner }
    }

    pub fn inner(self) -> IE {
        self.inner
    }

    pub fn inner_ref(&self) -> &IE {
        &self.inner
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

impl<IE: CompilerDisplay> CompilerError<IE> {
    /// Renders this error as `file:line: message` using the [`SourceMap`] to
    /// recover the location and the [`StringTable`] to recover identifiers.
    pub fn format(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        let inner = self.inner.fmt(sm, st)?;
        Ok(format!("{}: {}", sm.format_span(self.span), inner))
    }
}

/// Errors that can arise when converting a compiler value into a human
/// readable form.
#[derive(Clone, Debug, PartialEq)]
pub enum CompilerDisplayError {
    StringIdNotFound,
    SpanNotFound,
}

impl From<StringTableError> for CompilerDisplayError {
    fn from(ste: StringTableError) -> Self {
        match ste {
            StringTableError::NotFound => Self::StringIdNotFound,
        }
    }
}

/// Define how a compiler value is converted into a human readable string.
///
/// Compiler values reference [`crate::StringId`]s and [`Span`]s rather than
/// raw strings, so rendering them requires the [`StringTable`] and the
/// [`SourceMap`] for the compilation run.
pub trait CompilerDisplay {
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError>;
}
