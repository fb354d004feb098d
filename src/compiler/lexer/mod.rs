mod lexer;
pub mod tokens;

pub use lexer::{Lexer, LexerError};
pub use tokens::{Lex, Token};
