pub mod cli;
pub mod compiler;

pub use compiler::{StringId, StringTable, StringTableError};
