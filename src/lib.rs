// Declare modules publicly so they are part of the library interface
pub mod driver;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod stack;
pub mod types;

pub use environment::{Env, EnvError, Environment};
pub use evaluator::{EvalError, EvalErrorKind, Interpreter, SpecialForm};
pub use lexer::{DisplayKind, DisplayToken, tokenize_for_display};
pub use parser::{ParseError, ParseErrorKind, read};
pub use source::Span;
pub use types::{Lambda, Sexpr, Value, stringify};
