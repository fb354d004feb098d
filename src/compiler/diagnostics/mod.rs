//! The single diagnostic sink for a compilation run.
//!
//! Recoverable errors are never propagated across pass boundaries: each pass
//! reports the error here, substitutes an error placeholder into whatever it
//! was resolving, and keeps going.  The sink accumulates a count; at the end
//! of semantic analysis a nonzero count suppresses lowering and emission for
//! the entire run.

use std::cell::{Cell, RefCell};

use log::debug;

use crate::StringTable;

use super::{CompilerDisplay, CompilerError, SourceMap, Span};

/// One rendered diagnostic, retained so the driver can print everything at
/// the end of the run in the order it was reported.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
}

#[derive(Default)]
pub struct Diagnostics {
    records: RefCell<Vec<Diagnostic>>,
    errors: Cell<u32>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    /// Report a recoverable error.  Increments the error counter; the caller
    /// is expected to substitute an error placeholder and continue.
    pub fn report<E: CompilerDisplay>(
        &self,
        err: CompilerError<E>,
        sm: &SourceMap,
        st: &StringTable,
    ) {
        let message = err
            .format(sm, st)
            .unwrap_or_else(|_| format!("{}: <unrenderable error>", sm.format_span(err.span())));
        debug!("error: {}", message);
        self.records.borrow_mut().push(Diagnostic {
            span: err.span(),
            message,
        });
        self.errors.set(self.errors.get() + 1);
    }

    /// Report a condition that indicates a bug in the compiler itself (e.g.
    /// the deferred semantic queue failing to reach a fixpoint).  Counted
    /// like any other error so emission is suppressed.
    pub fn report_internal(&self, message: String) {
        debug!("internal error: {}", message);
        self.records.borrow_mut().push(Diagnostic {
            span: Span::zero(),
            message: format!("internal error: {}", message),
        });
        self.errors.set(self.errors.get() + 1);
    }

    pub fn error_count(&self) -> u32 {
        self.errors.get()
    }

    pub fn has_errors(&self) -> bool {
        self.errors.get() > 0
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("errors", &self.errors.get())
            .finish()
    }
}
