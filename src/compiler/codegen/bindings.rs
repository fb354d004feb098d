//! Binding levels: the backend's lexical-scope bookkeeping.
//!
//! The front end does not use binding levels as a symbol table; scoping was
//! fully resolved during semantic analysis.  The stack exists only so the
//! backend gets correct debug scoping for local variables: one level is
//! pushed per lexical block, declarations are chained into the current
//! level, and popping a level produces the block record handed to the
//! backend.
//!
//! Declarations are prepended to the level's chain (O(1), matching the
//! backend's singly linked decl chains) and the chain is reversed once at
//! pop time to restore source order.

use std::collections::VecDeque;

use crate::compiler::backend::{BlockId, BlockInfo};

#[derive(Debug, Default)]
struct Level {
    /// Declared names, newest first.
    names: VecDeque<String>,
    /// Blocks of already-popped inner levels waiting to be attached.
    blocks: Vec<BlockInfo>,
    this_block: Option<BlockId>,
}

/// The stack of binding levels for one backend unit.  The root level is
/// created by [`Bindings::init`]; `global_bindings_p` must answer `true`
/// before that happens, because the backend queries it before any parsing
/// begins (and would loop forever on a wrong answer).
#[derive(Debug, Default)]
pub struct Bindings {
    levels: Vec<Level>,
}

impl Bindings {
    pub fn new() -> Bindings {
        Bindings::default()
    }

    /// Establishes the root (global) level.
    pub fn init(&mut self) {
        debug_assert!(self.levels.is_empty());
        self.levels.push(Level::default());
    }

    pub fn push_level(&mut self) {
        self.levels.push(Level::default());
    }

    /// Records a declaration in the current level.
    pub fn push_decl(&mut self, name: String) {
        let level = self
            .levels
            .last_mut()
            .expect("push_decl with no binding level");
        level.names.push_front(name);
    }

    /// Pops the current level.  `keep` forces a block record even when the
    /// level declared nothing; `reverse` restores the decl chain to source
    /// order; `routine_body` marks the function's outermost level, whose
    /// block is returned to attach to the function itself rather than to the
    /// enclosing level.
    pub fn pop_level(
        &mut self,
        keep: bool,
        reverse: bool,
        routine_body: bool,
        new_block: impl FnOnce() -> BlockId,
    ) -> Option<BlockInfo> {
        let level = self.levels.pop().expect("pop_level with no binding level");

        let mut names: Vec<String> = level.names.into_iter().collect();
        if reverse {
            names.reverse();
        }

        let make_block = level.this_block.is_some() || keep || routine_body || !names.is_empty();
        if !make_block {
            // No block for this level: carry inner blocks up so they attach
            // to some outer block later.
            if let Some(parent) = self.levels.last_mut() {
                parent.blocks.extend(level.blocks);
            }
            return None;
        }

        let block = BlockInfo {
            id: level.this_block.unwrap_or_else(new_block),
            vars: names,
            subblocks: level.blocks,
        };

        if routine_body {
            Some(block)
        } else {
            match self.levels.last_mut() {
                Some(parent) => {
                    parent.blocks.push(block);
                    None
                }
                None => Some(block),
            }
        }
    }

    pub fn set_block(&mut self, block: BlockId) {
        let level = self
            .levels
            .last_mut()
            .expect("set_block with no binding level");
        level.this_block = Some(block);
    }

    /// True exactly when the current level is the root, or no root has been
    /// established yet.
    pub fn global_bindings_p(&self) -> bool {
        self.levels.len() <= 1
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn block_source() -> impl FnMut() -> BlockId {
        let n = Cell::new(0u32);
        move || {
            let v = n.get();
            n.set(v + 1);
            BlockId(v)
        }
    }

    #[test]
    fn global_bindings_true_before_init_and_at_root() {
        let mut b = Bindings::new();
        assert!(b.global_bindings_p());
        b.init();
        assert!(b.global_bindings_p());
        b.push_level();
        assert!(!b.global_bindings_p());
    }

    #[test]
    fn push_pop_nest_exactly() {
        let mut next = block_source();
        let mut b = Bindings::new();
        b.init();
        b.push_level();
        b.push_level();
        assert_eq!(b.depth(), 3);
        b.pop_level(true, true, false, &mut next);
        b.pop_level(true, true, false, &mut next);
        assert_eq!(b.depth(), 1);
        assert!(b.global_bindings_p());
    }

    #[test]
    fn pop_reverses_prepended_decls_to_source_order() {
        let mut next = block_source();
        let mut b = Bindings::new();
        b.init();
        b.push_level();
        b.push_decl("a".into());
        b.push_decl("b".into());
        b.push_decl("c".into());
        let block = b
            .pop_level(true, true, true, &mut next)
            .expect("routine body always yields a block");
        assert_eq!(block.vars, vec!["a", "b", "c"]);
    }

    #[test]
    fn unreversed_pop_keeps_chain_order() {
        let mut next = block_source();
        let mut b = Bindings::new();
        b.init();
        b.push_level();
        b.push_decl("a".into());
        b.push_decl("b".into());
        let block = b.pop_level(true, false, true, &mut next).unwrap();
        assert_eq!(block.vars, vec!["b", "a"]);
    }

    #[test]
    fn inner_blocks_become_subblocks() {
        let mut next = block_source();
        let mut b = Bindings::new();
        b.init();
        b.push_level(); // function body
        b.push_level(); // inner block
        b.push_decl("x".into());
        assert!(b.pop_level(true, true, false, &mut next).is_none());
        let outer = b.pop_level(true, true, true, &mut next).unwrap();
        assert_eq!(outer.subblocks.len(), 1);
        assert_eq!(outer.subblocks[0].vars, vec!["x"]);
    }

    #[test]
    fn empty_unkept_level_yields_no_block() {
        let mut next = block_source();
        let mut b = Bindings::new();
        b.init();
        b.push_level();
        assert!(b.pop_level(false, true, false, &mut next).is_none());
    }
}
