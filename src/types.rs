use crate::environment::Env;
use crate::source::Span;
use std::fmt; // For custom display formatting

/// A datum together with its quote flag and the source span it was read from.
///
/// Values computed by the evaluator carry an empty default span. Spans are
/// positional metadata only: two values are equal when their kinds and quote
/// flags are equal, wherever they came from.
#[derive(Debug, Clone)]
pub struct Value {
    pub kind: Sexpr,
    /// Set by a leading `'`; `eval` clears it and returns the value untouched.
    pub quoted: bool,
    pub span: Span,
}

impl Value {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Value {
            kind,
            quoted: false,
            span,
        }
    }

    pub fn int(n: i64) -> Self {
        Value::new(Sexpr::Int(n), Span::default())
    }

    pub fn bool(b: bool) -> Self {
        Value::new(Sexpr::Bool(b), Span::default())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Value::new(Sexpr::Symbol(name.into()), Span::default())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::new(Sexpr::List(items), Span::default())
    }

    pub fn lambda(lambda: Lambda) -> Self {
        Value::new(Sexpr::Lambda(lambda), Span::default())
    }

    /// The best-effort result handed back whenever evaluation records an error.
    pub fn placeholder() -> Self {
        Value::bool(false)
    }

    pub fn with_quote(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            Sexpr::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            Sexpr::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            Sexpr::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match &self.kind {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.quoted == other.quoted
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "'")?;
        }
        write!(f, "{}", self.kind)
    }
}

/// Every shape a value can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Int(i64),
    Bool(bool),      // T or NIL
    Symbol(String),  // e.g., +, variable-name, quote
    List(Vec<Value>), // e.g., (+ 1 2), (define x 10), and quoted data
    Lambda(Lambda),
}

impl Sexpr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Sexpr::Int(_) => "int",
            Sexpr::Bool(_) => "bool",
            Sexpr::Symbol(_) => "symbol",
            Sexpr::List(_) => "list",
            Sexpr::Lambda(_) => "lambda",
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    write!(f, "(")?;
    let mut first = true;
    for item in items {
        if !first {
            write!(f, " ")?;
        }
        write!(f, "{}", item)?;
        first = false;
    }
    write!(f, ")")
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Int(n) => write!(f, "{}", n),
            Sexpr::Bool(b) => write!(f, "{}", if *b { "T" } else { "NIL" }),
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::List(items) => write_joined(f, items),
            Sexpr::Lambda(lambda) => write!(f, "{}", lambda),
        }
    }
}

/// A closure: parameter names, an owned body and the frame it was created in.
#[derive(Clone)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Box<Value>,
    /// Fixed at creation; gives lambdas lexical rather than dynamic scope.
    pub env: Env,
}

impl Lambda {
    pub fn new(params: Vec<String>, body: Value, env: Env) -> Self {
        Lambda {
            params,
            body: Box::new(body),
            env,
        }
    }
}

// The captured frame may hold this very lambda, so Debug must not walk it.
impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda")
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

// Closures compare by shape; captured environments are not compared.
impl PartialEq for Lambda {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params && self.body == other.body
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.params.join(" "), self.body)
    }
}

/// Renders a value the way the REPL prints results.
pub fn stringify(value: &Value) -> String {
    value.to_string()
}
