use crate::Span;
use crate::lexer::{Atom, Token, TokenKind, tokenize};
use crate::types::{Sexpr, Value};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("no input")]
    NoInput,
    #[error("double quotes are unsupported")]
    DoubleQuote,
    #[error("trying to quote a space")]
    QuotedSpace,
    #[error("unmatched parenthesis")]
    UnmatchedParenthesis,
}

/// A reader failure and the range of input it points at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse Error [at {span}]: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        ParseError { kind, span }
    }
}

// Result type alias for convenience
pub type ParseResult<T> = Result<T, ParseError>;

// A list whose `(` has been read but whose `)` has not.
struct OpenList {
    index: usize,       // position of the list value in the flat stream
    first_child: usize, // where its children begin in the flat stream
}

pub struct Parser {
    tokens: std::vec::IntoIter<Token>,
    values: Vec<Value>,
    open: Vec<OpenList>,
    // Span of a `'` still waiting for something to quote.
    pending_quote: Option<Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter(),
            values: Vec::new(),
            open: Vec::new(),
            pending_quote: None,
        }
    }

    /// Parses every top-level expression in the token stream.
    pub fn parse(mut self) -> ParseResult<Vec<Value>> {
        while let Some(token) = self.tokens.next() {
            self.step(token)?;
        }

        if let Some(quote) = self.pending_quote {
            return Err(ParseError::new(ParseErrorKind::QuotedSpace, quote));
        }
        if let Some(innermost) = self.open.last() {
            let span = self.values[innermost.index].span;
            return Err(ParseError::new(
                ParseErrorKind::UnmatchedParenthesis,
                Span::new(span.start, span.start + 1),
            ));
        }
        Ok(self.values)
    }

    fn step(&mut self, token: Token) -> ParseResult<()> {
        match token.kind {
            TokenKind::Space => match self.pending_quote {
                Some(quote) => Err(ParseError::new(
                    ParseErrorKind::QuotedSpace,
                    quote.merge(token.span),
                )),
                None => Ok(()),
            },
            TokenKind::Quote => match self.pending_quote {
                Some(quote) => Err(ParseError::new(
                    ParseErrorKind::DoubleQuote,
                    quote.merge(token.span),
                )),
                None => {
                    self.pending_quote = Some(token.span);
                    Ok(())
                }
            },
            TokenKind::LParen => {
                self.push(Sexpr::List(Vec::new()), token.span);
                self.open.push(OpenList {
                    index: self.values.len() - 1,
                    first_child: self.values.len(),
                });
                Ok(())
            }
            TokenKind::RParen => {
                if let Some(quote) = self.pending_quote {
                    // A quote directly before `)` has nothing to quote.
                    return Err(ParseError::new(
                        ParseErrorKind::QuotedSpace,
                        quote.merge(token.span),
                    ));
                }
                let Some(list) = self.open.pop() else {
                    return Err(ParseError::new(
                        ParseErrorKind::UnmatchedParenthesis,
                        token.span,
                    ));
                };
                let children = self.values.split_off(list.first_child);
                let value = &mut self.values[list.index];
                value.kind = Sexpr::List(children);
                value.span = value.span.merge(token.span);
                Ok(())
            }
            TokenKind::Atom(atom) => {
                let kind = match atom {
                    Atom::Bool(b) => Sexpr::Bool(b),
                    Atom::Int(n) => Sexpr::Int(n),
                    Atom::Symbol(s) => Sexpr::Symbol(s),
                };
                self.push(kind, token.span);
                Ok(())
            }
        }
    }

    fn push(&mut self, kind: Sexpr, span: Span) {
        let quote = self.pending_quote.take();
        let span = quote.map_or(span, |quote| quote.merge(span));
        self.values
            .push(Value::new(kind, span).with_quote(quote.is_some()));
    }
}

/// Reads every top-level value in `input`.
///
/// On error nothing from the input may be evaluated; the error's span is a
/// character range into `input`.
pub fn read(input: &str) -> ParseResult<Vec<Value>> {
    let tokens = tokenize(input);
    if tokens.iter().all(|token| token.kind == TokenKind::Space) {
        let len = input.chars().count();
        return Err(ParseError::new(ParseErrorKind::NoInput, Span::new(0, len)));
    }
    Parser::new(tokens).parse()
}
