//! Local scope frames used while analyzing a function body.
//!
//! Frames follow stack discipline exactly: one is pushed for each nested
//! block and discarded on the way out, mirroring the source's block
//! structure.  Nothing here survives past the analysis of one function.

use crate::compiler::semantics::tree::LocalId;
use crate::StringId;

#[derive(Debug, Default)]
struct Frame {
    locals: Vec<(StringId, LocalId)>,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> ScopeStack {
        ScopeStack::default()
    }

    pub fn enter_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pops the current frame, returning the locals it declared in
    /// declaration order.
    pub fn leave_scope(&mut self) -> Vec<LocalId> {
        let frame = self
            .frames
            .pop()
            .expect("leave_scope without a matching enter_scope");
        frame.locals.into_iter().map(|(_, id)| id).collect()
    }

    /// Declares a local in the innermost frame.  Shadowing an outer local is
    /// allowed; redeclaring within one frame is the caller's error to
    /// report.
    pub fn declare(&mut self, name: StringId, id: LocalId) -> Result<(), ()> {
        let frame = self
            .frames
            .last_mut()
            .expect("declare without an open scope");
        if frame.locals.iter().any(|(n, _)| *n == name) {
            return Err(());
        }
        frame.locals.push((name, id));
        Ok(())
    }

    /// Searches frames innermost-out.
    pub fn lookup(&self, name: StringId) -> Option<LocalId> {
        for frame in self.frames.iter().rev() {
            if let Some((_, id)) = frame.locals.iter().rev().find(|(n, _)| *n == name) {
                return Some(*id);
            }
        }
        None
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StringTable;

    #[test]
    fn shadowing_resolves_to_innermost() {
        let st = StringTable::new();
        let x = st.insert("x".into());
        let mut ss = ScopeStack::new();
        ss.enter_scope();
        ss.declare(x, LocalId(0)).unwrap();
        ss.enter_scope();
        ss.declare(x, LocalId(1)).unwrap();
        assert_eq!(ss.lookup(x), Some(LocalId(1)));
        ss.leave_scope();
        assert_eq!(ss.lookup(x), Some(LocalId(0)));
    }

    #[test]
    fn redeclaration_in_same_frame_is_rejected() {
        let st = StringTable::new();
        let x = st.insert("x".into());
        let mut ss = ScopeStack::new();
        ss.enter_scope();
        ss.declare(x, LocalId(0)).unwrap();
        assert!(ss.declare(x, LocalId(1)).is_err());
    }

    #[test]
    fn leave_scope_reports_locals_in_declaration_order() {
        let st = StringTable::new();
        let mut ss = ScopeStack::new();
        ss.enter_scope();
        ss.declare(st.insert("a".into()), LocalId(0)).unwrap();
        ss.declare(st.insert("b".into()), LocalId(1)).unwrap();
        assert_eq!(ss.leave_scope(), vec![LocalId(0), LocalId(1)]);
    }
}
