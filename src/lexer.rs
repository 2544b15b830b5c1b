use logos::Logos;

use crate::Span;

/// A classified atom: whatever sits between delimiters.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Bool(bool),
    Int(i64),
    Symbol(String),
}

impl Atom {
    /// `T` and `NIL` are booleans; a token that parses *entirely* as a signed
    /// integer is an int; anything else is a symbol.
    pub fn classify(text: &str) -> Atom {
        match text {
            "T" => Atom::Bool(true),
            "NIL" => Atom::Bool(false),
            _ => match parse_int(text) {
                Ok(n) => Atom::Int(n),
                Err(_) => Atom::Symbol(text.to_string()),
            },
        }
    }
}

// `3x`, `--5` and out-of-range literals all fail here and fall back to symbols.
fn parse_int(text: &str) -> Result<i64, std::num::ParseIntError> {
    text.parse::<i64>()
}

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Only the plain space separates tokens.
    #[regex(r" +")]
    Space,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("'")]
    Quote,
    #[regex(r"[^()' ]+", |lex| Atom::classify(lex.slice()))]
    Atom(Atom),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Splits the input into tokens, whitespace runs included, with character spans.
///
/// Every character belongs to exactly one token, so this never fails.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(input);
    let mut char_pos = 0;

    while let Some(result) = lexer.next() {
        let slice = lexer.slice();
        let start = char_pos;
        char_pos += slice.chars().count();
        // The patterns above cover every character; a stray error still
        // reads as a symbol rather than being dropped.
        let kind = result.unwrap_or_else(|()| TokenKind::Atom(Atom::Symbol(slice.to_string())));
        tokens.push(Token {
            kind,
            span: Span::new(start, char_pos),
        });
    }
    tokens
}

/// The lexical category of a display token.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisplayKind {
    Whitespace,
    LParen,
    RParen,
    Quote,
    Symbol,
    Int,
    Bool,
}

/// A raw slice of the input tagged for colorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayToken<'a> {
    pub kind: DisplayKind,
    pub text: &'a str,
    pub span: Span,
}

/// Tags every slice of `input` for syntax highlighting. Never builds a tree
/// and never reports errors; concatenating the `text` fields gives back the
/// input.
pub fn tokenize_for_display(input: &str) -> Vec<DisplayToken<'_>> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(input);
    let mut char_pos = 0;

    while let Some(result) = lexer.next() {
        let text = lexer.slice();
        let start = char_pos;
        char_pos += text.chars().count();
        let kind = match result {
            Ok(TokenKind::Space) => DisplayKind::Whitespace,
            Ok(TokenKind::LParen) => DisplayKind::LParen,
            Ok(TokenKind::RParen) => DisplayKind::RParen,
            Ok(TokenKind::Quote) => DisplayKind::Quote,
            Ok(TokenKind::Atom(Atom::Int(_))) => DisplayKind::Int,
            Ok(TokenKind::Atom(Atom::Bool(_))) => DisplayKind::Bool,
            Ok(TokenKind::Atom(Atom::Symbol(_))) | Err(()) => DisplayKind::Symbol,
        };
        tokens.push(DisplayToken {
            kind,
            text,
            span: Span::new(start, char_pos),
        });
    }
    tokens
}
