/*
 * Semantic analysis of a parsed module set.  This includes:
 * 1. Building the symbol table and module import graph.
 * 2. Resolving every identifier and type reference to a declaration.
 * 3. The three-pass pipeline (headers, members, bodies) with on-demand
 *    template instantiation and the deferred-work queue.
 *
 * The output is a fully typed view of the program hanging off the symbol
 * arena: every function symbol carries a typed body tree, every aggregate
 * its layout, every static its constant initializer.  Code generation
 * consumes those and nothing else.
 */
pub mod const_eval;
pub mod error;
pub mod expr;
pub mod overload;
pub mod passes;
pub mod resolve;
pub mod scope;
pub mod template;
pub mod tree;
pub mod version;

pub use error::SemanticError;

#[cfg(test)]
mod tests;
