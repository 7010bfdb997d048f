//! Tokens and a tokenizer for bracketed expressions.

use logos::{Lexer, Logos};

use std::fmt;

use super::ast::Operator;

/// Enumeration of all tokens that can appear between `[` and `]`.
#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Errorneous token that could not be interpreted as any of the other variants.
    #[error]
    #[regex(r"[ \n\t\r\f]+", logos::skip)]
    Error,

    /// A hexadecimal number prefixed with `$`.
    #[regex(r"\$[0-9A-Fa-f]+", hex_callback)]
    HexLiteral(u32),

    /// A symbol reference, `!name`.
    #[regex(r"![A-Za-z_][A-Za-z0-9_]*", variable_callback)]
    Variable(&'a str),

    /// A bare name. Used for the structure, symbol and member in `<Structure> symbol.member`.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", Lexer::slice)]
    Identifier(&'a str),

    #[token("<")]
    InterpretBegin,

    #[token(">")]
    InterpretEnd,

    #[token(".")]
    MemberAccess,

    #[token("(")]
    GroupBegin,

    #[token(")")]
    GroupEnd,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("&")]
    Ampersand,

    #[token("|")]
    Pipe,

    #[token("^")]
    Caret,
}

impl Token<'_> {
    /// The binary operator this token stands for, if any.
    pub fn operator(&self) -> Option<Operator> {
        let op = match self {
            Token::Plus => Operator::Add,
            Token::Minus => Operator::Subtract,
            Token::Star => Operator::Multiply,
            Token::Slash => Operator::Divide,
            Token::Ampersand => Operator::And,
            Token::Pipe => Operator::Or,
            Token::Caret => Operator::Xor,
            _ => return None,
        };

        Some(op)
    }
}

fn hex_callback<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Result<u32, std::num::ParseIntError> {
    u32::from_str_radix(&lex.slice()[1..], 16)
}

fn variable_callback<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    &lex.slice()[1..]
}

impl<'t> fmt::Display for Token<'t> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Error => write!(f, "<error>"),
            Token::HexLiteral(value) => write!(f, "${:x}", value),
            Token::Variable(name) => write!(f, "!{}", name),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::InterpretBegin => write!(f, "<"),
            Token::InterpretEnd => write!(f, ">"),
            Token::MemberAccess => write!(f, "."),
            Token::GroupBegin => write!(f, "("),
            Token::GroupEnd => write!(f, ")"),
            token => match token.operator() {
                Some(op) => write!(f, "{}", op),
                None => write!(f, "<unknown>"),
            },
        }
    }
}

#[test]
fn test_tokenize_expression() {
    let tokens: Vec<_> = Token::lexer("$1F + !start * (<Point> origin.y)").collect();

    assert_eq!(tokens, vec![
        Token::HexLiteral(0x1F),
        Token::Plus,
        Token::Variable("start"),
        Token::Star,
        Token::GroupBegin,
        Token::InterpretBegin,
        Token::Identifier("Point"),
        Token::InterpretEnd,
        Token::Identifier("origin"),
        Token::MemberAccess,
        Token::Identifier("y"),
        Token::GroupEnd,
    ]);
}

#[test]
fn test_tokenize_errors() {
    let tokens: Vec<_> = Token::lexer("$123456789 ? /").collect();

    assert_eq!(tokens, vec![
        Token::Error,
        Token::Error,
        Token::Slash,
    ]);
    assert_eq!(Token::Slash.operator(), Some(Operator::Divide));
}
