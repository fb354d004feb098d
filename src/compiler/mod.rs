/**
 * The Sable front end: everything between raw source text and the backend's
 * tree IR.
 *
 * The pipeline runs in a fixed order over the whole module set: read all
 * input files (overlapped), parse each into an AST, resolve every module's
 * imports, then run the three semantic passes globally; pass 1 resolves
 * declaration headers, pass 2 resolves member bodies and static
 * initializers, pass 3 resolves function bodies; draining the deferred
 * semantic queue to a fixpoint between passes 1 and 2.  Only when the whole
 * set is analyzed and the error counter is zero does lowering run, turning
 * typed trees into backend IR and static data into byte/relocation lists.
 *
 * Passes are global rather than per-module because resolving one module's
 * declarations may recursively resolve declarations in another (forward
 * references across imports), and template instantiation must land in the
 * module that triggered it.
 *
 * Everything stateful hangs off [`context::CompilationContext`]; there are
 * no ambient globals, so multiple runs in one process are isolated.
 */
pub mod ast;
pub mod backend;
pub mod codegen;
pub mod context;
pub mod diagnostics;
pub mod driver;
pub mod io;
pub mod lexer;
pub mod parser;
pub mod semantics;
pub mod source;
pub mod sym;
pub mod target;
pub mod types;

mod error;
mod stringtable;

pub use error::{CompilerDisplay, CompilerDisplayError, CompilerError};
pub use source::{Offset, SourceMap, SourceMapEntry, Span};
pub use stringtable::{StringId, StringTable, StringTableError};
