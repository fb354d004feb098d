use crate::compiler::types::BasicKind;
use crate::compiler::{
    CompilerDisplay, CompilerDisplayError, CompilerError, Offset, SourceMap, Span,
};
use crate::StringTable;

use super::tokens::{Lex, Token};

#[derive(Clone, Debug, PartialEq)]
pub enum LexerError {
    InvalidCharacter(char),
    InvalidIntegerSuffix(String),
    InvalidNumber(String),
    UnterminatedString,
    ExpectedLabelName,
}

impl CompilerDisplay for LexerError {
    fn fmt(&self, _sm: &SourceMap, _st: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            LexerError::InvalidCharacter(c) => format!("invalid character '{}'", c),
            LexerError::InvalidIntegerSuffix(s) => format!("invalid integer suffix '{}'", s),
            LexerError::InvalidNumber(s) => format!("invalid numeric literal '{}'", s),
            LexerError::UnterminatedString => "unterminated string literal".into(),
            LexerError::ExpectedLabelName => "expected label name after '".into(),
        })
    }
}

type LexResult = Result<Token, CompilerError<LexerError>>;

/// Converts one source unit's text into tokens.  Offsets in the produced
/// spans are global: `base` is the unit's low offset in the source map.
pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    base: u32,
    strings: &'a StringTable,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &str, base: Offset, strings: &'a StringTable) -> Lexer<'a> {
        Lexer {
            chars: text.chars().collect(),
            pos: 0,
            base: base.as_u32(),
            strings,
        }
    }

    pub fn tokenize(mut self) -> Vec<LexResult> {
        let mut tokens = vec![];
        loop {
            self.skip_whitespace_and_comments();
            if self.peek().is_none() {
                break;
            }
            tokens.push(self.next_token());
        }
        tokens
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn offset(&self) -> Offset {
        Offset::new(self.base + self.pos as u32)
    }

    fn span_from(&self, start: Offset) -> Span {
        Span::new(start, self.offset())
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
                self.advance();
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('/') {
                while self.peek().map(|c| c != '\n').unwrap_or(false) {
                    self.advance();
                }
                continue;
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('*') {
                self.advance();
                self.advance();
                while self.pos < self.chars.len() {
                    if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> LexResult {
        let start = self.offset();
        let c = self.peek().expect("next_token called at end of input");

        if c.is_alphabetic() || c == '_' {
            return Ok(self.identifier_or_keyword(start));
        }
        if c.is_ascii_digit() {
            return self.number(start);
        }
        if c == '"' {
            return self.string_literal(start);
        }
        if c == '\'' {
            self.advance();
            return self.label_name(start);
        }

        self.advance();
        let two = |a: &mut Self, lex| {
            a.advance();
            lex
        };
        let lex = match c {
            '(' => Lex::LParen,
            ')' => Lex::RParen,
            '{' => Lex::LBrace,
            '}' => Lex::RBrace,
            '[' => Lex::LBracket,
            ']' => Lex::RBracket,
            ',' => Lex::Comma,
            ';' => Lex::Semicolon,
            '~' => Lex::Tilde,
            '^' => Lex::Caret,
            '+' => Lex::Add,
            '%' => Lex::Rem,
            '/' => Lex::Div,
            '*' => Lex::Mul,
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.advance();
                    self.advance();
                    Lex::DotDotDot
                } else {
                    Lex::Dot
                }
            }
            ':' => match self.peek() {
                Some('=') => two(self, Lex::Assign),
                Some(':') => two(self, Lex::PathSep),
                _ => Lex::Colon,
            },
            '-' => match self.peek() {
                Some('>') => two(self, Lex::Arrow),
                _ => Lex::Minus,
            },
            '!' => match self.peek() {
                Some('=') => two(self, Lex::BangEq),
                _ => Lex::Bang,
            },
            '=' => match self.peek() {
                Some('=') => two(self, Lex::Eq),
                _ => {
                    return Err(CompilerError::new(
                        self.span_from(start),
                        LexerError::InvalidCharacter('='),
                    ))
                }
            },
            '<' => match self.peek() {
                Some('=') => two(self, Lex::LsEq),
                Some('<') => two(self, Lex::Shl),
                _ => Lex::Ls,
            },
            '>' => match self.peek() {
                Some('=') => two(self, Lex::GrEq),
                Some('>') => two(self, Lex::Shr),
                _ => Lex::Gr,
            },
            '&' => match self.peek() {
                Some('&') => two(self, Lex::AmpAmp),
                _ => Lex::Amp,
            },
            '|' => match self.peek() {
                Some('|') => two(self, Lex::BarBar),
                _ => Lex::Bar,
            },
            _ => {
                return Err(CompilerError::new(
                    self.span_from(start),
                    LexerError::InvalidCharacter(c),
                ))
            }
        };
        Ok(Token::new(self.span_from(start), lex))
    }

    fn identifier_or_keyword(&mut self, start: Offset) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let lex = match Lex::keyword(&text) {
            Some(kw) => kw,
            None => Lex::Ident(self.strings.insert(text)),
        };
        Token::new(self.span_from(start), lex)
    }

    fn label_name(&mut self, start: Offset) -> LexResult {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if text.is_empty() {
            return Err(CompilerError::new(
                self.span_from(start),
                LexerError::ExpectedLabelName,
            ));
        }
        Ok(Token::new(
            self.span_from(start),
            Lex::LabelName(self.strings.insert(text)),
        ))
    }

    fn number(&mut self, start: Offset) -> LexResult {
        let mut digits = String::new();
        let mut is_real = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance();
            } else if c == '.'
                && !is_real
                && self.peek_at(1).map(|n| n.is_ascii_digit()).unwrap_or(false)
            {
                is_real = true;
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // Optional width suffix, e.g. `42u8` or `1.5f32`.
        let mut suffix = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() {
                suffix.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let suffix_kind = if suffix.is_empty() {
            None
        } else {
            match BasicKind::from_name(&suffix) {
                Some(k) if k.is_integer() || k.is_float() => Some(k),
                _ => {
                    return Err(CompilerError::new(
                        self.span_from(start),
                        LexerError::InvalidIntegerSuffix(suffix),
                    ))
                }
            }
        };

        let span = self.span_from(start);
        if is_real || suffix_kind.map(|k| k.is_float()).unwrap_or(false) {
            match digits.parse::<f64>() {
                Ok(v) => Ok(Token::new(span, Lex::Real(v, suffix_kind))),
                Err(_) => Err(CompilerError::new(span, LexerError::InvalidNumber(digits))),
            }
        } else {
            match digits.parse::<i128>() {
                Ok(v) => Ok(Token::new(span, Lex::Integer(v, suffix_kind))),
                Err(_) => Err(CompilerError::new(span, LexerError::InvalidNumber(digits))),
            }
        }
    }

    fn string_literal(&mut self, start: Offset) -> LexResult {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('0') => text.push('\0'),
                    Some(c) => text.push(c),
                    None => {
                        return Err(CompilerError::new(
                            self.span_from(start),
                            LexerError::UnterminatedString,
                        ))
                    }
                },
                Some(c) => text.push(c),
                None => {
                    return Err(CompilerError::new(
                        self.span_from(start),
                        LexerError::UnterminatedString,
                    ))
                }
            }
        }
        Ok(Token::new(
            self.span_from(start),
            Lex::Str(self.strings.insert(text)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<Lex> {
        let st = StringTable::new();
        Lexer::new(text, Offset::new(0), &st)
            .tokenize()
            .into_iter()
            .map(|t| t.unwrap().lex)
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        let st = StringTable::new();
        let toks: Vec<_> = Lexer::new("fn main while whilex", Offset::new(0), &st)
            .tokenize()
            .into_iter()
            .map(|t| t.unwrap().lex)
            .collect();
        assert_eq!(toks[0], Lex::Fn);
        assert!(matches!(toks[1], Lex::Ident(_)));
        assert_eq!(toks[2], Lex::While);
        assert!(matches!(toks[3], Lex::Ident(_)));
    }

    #[test]
    fn integer_suffixes() {
        assert_eq!(
            lex("5 5u8 5i64"),
            vec![
                Lex::Integer(5, None),
                Lex::Integer(5, Some(BasicKind::U8)),
                Lex::Integer(5, Some(BasicKind::I64)),
            ]
        );
    }

    #[test]
    fn compound_punctuation() {
        assert_eq!(
            lex(":= :: -> == != <= >= << >> && || ..."),
            vec![
                Lex::Assign,
                Lex::PathSep,
                Lex::Arrow,
                Lex::Eq,
                Lex::BangEq,
                Lex::LsEq,
                Lex::GrEq,
                Lex::Shl,
                Lex::Shr,
                Lex::AmpAmp,
                Lex::BarBar,
                Lex::DotDotDot,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex("1 // line\n 2 /* block\n more */ 3"),
            vec![
                Lex::Integer(1, None),
                Lex::Integer(2, None),
                Lex::Integer(3, None),
            ]
        );
    }

    #[test]
    fn label_names() {
        let toks = lex("'top goto");
        assert!(matches!(toks[0], Lex::LabelName(_)));
        assert_eq!(toks[1], Lex::Goto);
    }

    #[test]
    fn spans_are_offset_by_base() {
        let st = StringTable::new();
        let toks = Lexer::new("abc", Offset::new(100), &st).tokenize();
        let t = toks[0].as_ref().unwrap();
        assert_eq!(t.span.low(), Offset::new(100));
        assert_eq!(t.span.high(), Offset::new(103));
    }
}
