use crate::environment::{Env, Environment};
use crate::primitives::{self, Primitive};
use crate::stack::ensure_sufficient_stack;
use crate::types::{Lambda, Sexpr, Value};
use std::fmt;
use thiserror::Error;

// --- Evaluation Error ---
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum EvalErrorKind {
    #[error("invalid number of arguments")]
    InvalidNumberOfArgs,
    #[error("invalid argument types")]
    InvalidArgTypes,
    #[error("not a function")]
    NotAFunction,
    #[error("undefined symbol")]
    Undefined,
    #[error("symbol is already defined")]
    Redefinition,
    #[error("cannot evaluate an empty list")]
    EvalEmptyList,
    #[error("math error")]
    MathErr,
    #[error("integer overflow")]
    Overflow,
    #[error("division by zero")]
    DivideByZero,
    #[error("internal error: reached an unreachable evaluation state")]
    NotReachable,
    // Not a failure: `(quit)` asks the caller to end the session.
    #[error("quit")]
    Quit,
}

/// One recorded evaluation failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}{}", describe(.message))]
pub struct EvalError {
    pub kind: EvalErrorKind,
    /// The value being evaluated, or the operand that was rejected.
    pub value: Value,
    /// The frame a failed lookup searched from.
    pub env: Option<Env>,
    pub message: Option<String>,
}

fn describe(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {}", message),
        None => String::new(),
    }
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, value: &Value) -> Self {
        EvalError {
            kind,
            value: value.clone(),
            env: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_env(mut self, env: &Env) -> Self {
        self.env = Some(env.clone());
        self
    }

    pub fn is_quit(&self) -> bool {
        self.kind == EvalErrorKind::Quit
    }
}

// --- Special Forms ---

/// List heads whose arguments are handed over unevaluated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    If,
    Define,
    Set,
    Defun,
    Lambda,
    Funcall,
    Quit,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 8] = [
        SpecialForm::Quote,
        SpecialForm::If,
        SpecialForm::Define,
        SpecialForm::Set,
        SpecialForm::Defun,
        SpecialForm::Lambda,
        SpecialForm::Funcall,
        SpecialForm::Quit,
    ];

    pub fn from_name(name: &str) -> Option<SpecialForm> {
        SpecialForm::ALL
            .into_iter()
            .find(|form| form.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::If => "if",
            SpecialForm::Define => "define",
            SpecialForm::Set => "set!",
            SpecialForm::Defun => "defun",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Funcall => "funcall",
            SpecialForm::Quit => "quit",
        }
    }
}

impl fmt::Display for SpecialForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Deepest nesting of list evaluations before a computation is abandoned.
pub const MAX_EVAL_DEPTH: usize = 10_000;

// What a symbol in call position turns out to be.
enum Callee {
    Lambda(Lambda),
    Builtin(Primitive),
    NotAFunction(Value),
    Undefined,
}

// --- Interpreter ---

/// An interpreter session: the global frame plus the error accumulator.
///
/// Errors are only ever appended during evaluation; callers inspect them after
/// each top-level `eval` and clear them before the next one. The session is
/// single-threaded (`Rc`/`RefCell` inside); wrap it in a lock to share it.
pub struct Interpreter {
    global: Env,
    errors: Vec<EvalError>,
    // Lists currently being evaluated, innermost included.
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

// `defun` stores lambdas capturing the global frame inside that same frame;
// emptying it on drop breaks those reference cycles.
impl Drop for Interpreter {
    fn drop(&mut self) {
        self.errors.clear();
        self.global.borrow_mut().clear();
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            global: Environment::new(),
            errors: Vec::new(),
            depth: 0,
        }
    }

    pub fn global_env(&self) -> Env {
        self.global.clone()
    }

    /// Every error recorded since the last `clear_errors`, oldest first.
    pub fn errors(&self) -> &[EvalError] {
        &self.errors
    }

    /// The error that gets reported to the user by convention.
    pub fn first_error(&self) -> Option<&EvalError> {
        self.errors.first()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Records an error without interrupting evaluation.
    pub(crate) fn report(&mut self, error: EvalError) {
        tracing::debug!(kind = ?error.kind, value = %error.value, "evaluation error");
        self.errors.push(error);
    }

    /// Records an error and hands back the placeholder result.
    pub(crate) fn fail(&mut self, error: EvalError) -> Value {
        self.report(error);
        Value::placeholder()
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Evaluates against the global frame.
    pub fn eval_global(&mut self, value: &Value) -> Value {
        let global = self.global.clone();
        self.eval(value, &global)
    }

    /// Evaluates `value` in `env`. Never unwinds: failures are appended to
    /// the error list and a placeholder comes back in their place.
    pub fn eval(&mut self, value: &Value, env: &Env) -> Value {
        if value.quoted {
            return value.clone().with_quote(false);
        }

        match &value.kind {
            // 1. Self-evaluating atoms
            Sexpr::Int(_) | Sexpr::Bool(_) => value.clone(),

            // 2. Symbols: Look up in the environment
            Sexpr::Symbol(name) => {
                let found = env.borrow().find(name);
                match found {
                    Some(bound) => bound,
                    None => self.fail(
                        EvalError::new(EvalErrorKind::Undefined, value).with_env(env),
                    ),
                }
            }

            // 3. Lists: special forms or calls
            Sexpr::List(items) => self.eval_list(value, items, env),

            // Lambdas only exist as results; the reader never produces one.
            Sexpr::Lambda(_) => self.fail(EvalError::new(EvalErrorKind::NotReachable, value)),
        }
    }

    fn eval_list(&mut self, form: &Value, items: &[Value], env: &Env) -> Value {
        if self.depth >= MAX_EVAL_DEPTH {
            return self.fail(
                EvalError::new(EvalErrorKind::Overflow, form).with_message(format!(
                    "recursion depth exceeded (limit {})",
                    MAX_EVAL_DEPTH
                )),
            );
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| self.eval_call(form, items, env));
        self.depth -= 1;
        result
    }

    fn eval_call(&mut self, form: &Value, items: &[Value], env: &Env) -> Value {
        let Some((head, args)) = items.split_first() else {
            return self.fail(EvalError::new(EvalErrorKind::EvalEmptyList, form));
        };

        match &head.kind {
            Sexpr::Symbol(name) if !head.quoted => {
                if let Some(special) = SpecialForm::from_name(name) {
                    tracing::trace!(form = %special, "special form");
                    return self.eval_special(special, form, args, env);
                }
                match self.resolve(name, env) {
                    Callee::Lambda(lambda) => self.apply_form(&lambda, form, args, env),
                    Callee::Builtin(primitive) => {
                        let Some(args) = self.eval_args(args, env) else {
                            return Value::placeholder();
                        };
                        self.call_builtin(primitive, args, form, env)
                    }
                    Callee::NotAFunction(found) => self.fail(
                        EvalError::new(EvalErrorKind::NotAFunction, &found)
                            .with_message(format!("'{}' is a {}", name, found.kind.type_name())),
                    ),
                    Callee::Undefined => self.fail(
                        EvalError::new(EvalErrorKind::Undefined, head).with_env(env),
                    ),
                }
            }
            Sexpr::Lambda(lambda) => self.apply_form(lambda, form, args, env),
            Sexpr::List(_) if !head.quoted => {
                let mark = self.error_count();
                let callee = self.eval(head, env);
                if self.error_count() > mark {
                    return Value::placeholder();
                }
                match callee.kind {
                    Sexpr::Lambda(lambda) => self.apply_form(&lambda, form, args, env),
                    _ => self.fail(EvalError::new(EvalErrorKind::NotAFunction, &callee)),
                }
            }
            _ => self.fail(EvalError::new(EvalErrorKind::NotAFunction, head)),
        }
    }

    // A name bound to a lambda wins over a builtin of the same name; any other
    // binding only matters when no builtin is called that.
    fn resolve(&self, name: &str, env: &Env) -> Callee {
        let bound = env.borrow().find(name);
        match bound {
            Some(Value {
                kind: Sexpr::Lambda(lambda),
                ..
            }) => Callee::Lambda(lambda),
            bound => match (primitives::lookup(name), bound) {
                (Some(primitive), _) => Callee::Builtin(primitive),
                (None, Some(other)) => Callee::NotAFunction(other),
                (None, None) => Callee::Undefined,
            },
        }
    }

    /// Evaluates each argument left to right. `None` when any of them
    /// recorded an error, in which case the caller abandons the form.
    pub(crate) fn eval_args(&mut self, args: &[Value], env: &Env) -> Option<Vec<Value>> {
        let mark = self.error_count();
        let values: Vec<Value> = args.iter().map(|arg| self.eval(arg, env)).collect();
        (self.error_count() == mark).then_some(values)
    }

    fn call_builtin(
        &mut self,
        primitive: Primitive,
        args: Vec<Value>,
        form: &Value,
        env: &Env,
    ) -> Value {
        tracing::trace!(builtin = primitive.name, argc = args.len(), "builtin");
        (primitive.func)(self, args, form, env)
    }

    fn apply_form(&mut self, lambda: &Lambda, form: &Value, args: &[Value], env: &Env) -> Value {
        match self.eval_args(args, env) {
            Some(args) => self.apply(lambda, args, form),
            None => Value::placeholder(),
        }
    }

    /// Calls a lambda with already-evaluated arguments in a fresh frame whose
    /// parent is the lambda's captured environment.
    pub fn apply(&mut self, lambda: &Lambda, args: Vec<Value>, form: &Value) -> Value {
        if lambda.params.len() != args.len() {
            return self.fail(
                EvalError::new(EvalErrorKind::InvalidNumberOfArgs, form).with_message(format!(
                    "lambda takes {} arg(s), got {}",
                    lambda.params.len(),
                    args.len()
                )),
            );
        }
        tracing::trace!(params = ?lambda.params, "apply lambda");

        let frame = Environment::new_enclosed(lambda.env.clone());
        {
            let mut frame = frame.borrow_mut();
            for (param, arg) in lambda.params.iter().zip(args) {
                frame.bind(param.clone(), arg);
            }
        }
        self.eval(&lambda.body, &frame)
    }

    /// Applies anything `funcall` and `mapcar` accept as a function: a lambda,
    /// a symbol bound to one, or a symbol naming a builtin.
    pub(crate) fn apply_callable(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        form: &Value,
        env: &Env,
    ) -> Value {
        match &callee.kind {
            Sexpr::Lambda(lambda) => self.apply(lambda, args, form),
            Sexpr::Symbol(name) => match self.resolve(name, env) {
                Callee::Lambda(lambda) => self.apply(&lambda, args, form),
                Callee::Builtin(primitive) => self.call_builtin(primitive, args, form, env),
                Callee::NotAFunction(found) => {
                    self.fail(EvalError::new(EvalErrorKind::NotAFunction, &found))
                }
                Callee::Undefined => {
                    self.fail(EvalError::new(EvalErrorKind::Undefined, callee).with_env(env))
                }
            },
            _ => self.fail(EvalError::new(EvalErrorKind::NotAFunction, callee)),
        }
    }

    fn eval_special(
        &mut self,
        special: SpecialForm,
        form: &Value,
        args: &[Value],
        env: &Env,
    ) -> Value {
        match special {
            SpecialForm::Quote => self.eval_quote(form, args),
            SpecialForm::If => self.eval_if(form, args, env),
            SpecialForm::Define => self.eval_define(form, args, env),
            SpecialForm::Set => self.eval_set(form, args, env),
            SpecialForm::Defun => self.eval_defun(form, args, env),
            SpecialForm::Lambda => self.eval_lambda(form, args, env),
            SpecialForm::Funcall => self.eval_funcall(form, args, env),
            SpecialForm::Quit => self.eval_quit(form, args),
        }
    }

    fn arity_error(&mut self, form: &Value, special: SpecialForm, expected: &str) -> Value {
        self.fail(
            EvalError::new(EvalErrorKind::InvalidNumberOfArgs, form)
                .with_message(format!("{} takes {}", special, expected)),
        )
    }

    fn type_error(&mut self, form: &Value, special: SpecialForm, expected: &str) -> Value {
        self.fail(
            EvalError::new(EvalErrorKind::InvalidArgTypes, form)
                .with_message(format!("{} takes arg types: {}", special, expected)),
        )
    }

    fn eval_quote(&mut self, form: &Value, args: &[Value]) -> Value {
        match args {
            [quoted] => quoted.clone(),
            _ => self.arity_error(form, SpecialForm::Quote, "1 arg"),
        }
    }

    fn eval_if(&mut self, form: &Value, args: &[Value], env: &Env) -> Value {
        let [test, consequent, alternative] = args else {
            return self.arity_error(form, SpecialForm::If, "3 args");
        };

        let mark = self.error_count();
        let test = self.eval(test, env);
        if self.error_count() > mark {
            return Value::placeholder();
        }

        match test.kind {
            Sexpr::Bool(true) => self.eval(consequent, env),
            Sexpr::Bool(false) => self.eval(alternative, env),
            _ => self.type_error(form, SpecialForm::If, "bool any any"),
        }
    }

    fn eval_define(&mut self, form: &Value, args: &[Value], env: &Env) -> Value {
        let [name, value] = args else {
            return self.arity_error(form, SpecialForm::Define, "2 args");
        };
        let Some(name) = name.as_symbol() else {
            return self.type_error(form, SpecialForm::Define, "symbol any");
        };
        if env.borrow().contains(name) {
            return self.fail(
                EvalError::new(EvalErrorKind::Redefinition, form)
                    .with_message(format!("'{}' is already defined", name)),
            );
        }

        let mark = self.error_count();
        let value = self.eval(value, env);
        if self.error_count() > mark {
            return Value::placeholder();
        }
        env.borrow_mut().define(name, value);
        Value::symbol(name)
    }

    fn eval_set(&mut self, form: &Value, args: &[Value], env: &Env) -> Value {
        let [target, value] = args else {
            return self.arity_error(form, SpecialForm::Set, "2 args");
        };
        let Some(name) = target.as_symbol() else {
            return self.type_error(form, SpecialForm::Set, "symbol any");
        };
        if !env.borrow().contains(name) {
            return self.fail(EvalError::new(EvalErrorKind::Undefined, target).with_env(env));
        }

        let mark = self.error_count();
        let value = self.eval(value, env);
        if self.error_count() > mark {
            return Value::placeholder();
        }
        let updated = env.borrow_mut().set(name, value.clone());
        match updated {
            Ok(()) => value,
            Err(err) => self.fail(
                EvalError::new(EvalErrorKind::Undefined, target)
                    .with_env(env)
                    .with_message(err.to_string()),
            ),
        }
    }

    // Parameter lists must be lists of symbols.
    fn params(params: &Value) -> Option<Vec<String>> {
        params
            .as_list()?
            .iter()
            .map(|param| param.as_symbol().map(str::to_string))
            .collect()
    }

    fn eval_defun(&mut self, form: &Value, args: &[Value], env: &Env) -> Value {
        let [name, params, body] = args else {
            return self.arity_error(form, SpecialForm::Defun, "3 args");
        };
        let (Some(name), Some(params)) = (name.as_symbol(), Self::params(params)) else {
            return self.type_error(form, SpecialForm::Defun, "symbol list(symbols) any");
        };
        if env.borrow().contains(name) {
            return self.fail(
                EvalError::new(EvalErrorKind::Redefinition, form)
                    .with_message(format!("'{}' is already defined", name)),
            );
        }

        let lambda = Lambda::new(params, body.clone(), env.clone());
        env.borrow_mut().define(name, Value::lambda(lambda));
        Value::symbol(name)
    }

    fn eval_lambda(&mut self, form: &Value, args: &[Value], env: &Env) -> Value {
        let [params, body] = args else {
            return self.arity_error(form, SpecialForm::Lambda, "2 args");
        };
        let Some(params) = Self::params(params) else {
            return self.type_error(form, SpecialForm::Lambda, "list(symbols) any");
        };
        Value::lambda(Lambda::new(params, body.clone(), env.clone()))
    }

    fn eval_funcall(&mut self, form: &Value, args: &[Value], env: &Env) -> Value {
        let Some((callee, rest)) = args.split_first() else {
            return self.arity_error(form, SpecialForm::Funcall, "at least 1 arg");
        };

        let mark = self.error_count();
        let callee = self.eval(callee, env);
        if self.error_count() > mark {
            return Value::placeholder();
        }
        let Some(rest) = self.eval_args(rest, env) else {
            return Value::placeholder();
        };
        self.apply_callable(&callee, rest, form, env)
    }

    fn eval_quit(&mut self, form: &Value, args: &[Value]) -> Value {
        if !args.is_empty() {
            return self.arity_error(form, SpecialForm::Quit, "0 args");
        }
        self.fail(EvalError::new(EvalErrorKind::Quit, form))
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read;

    // Evaluates each top-level value of `input` in order, returning the last.
    fn eval_str(interp: &mut Interpreter, input: &str) -> Value {
        let values = match read(input) {
            Ok(values) => values,
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        };
        let mut result = Value::placeholder();
        for value in &values {
            result = interp.eval_global(value);
        }
        result
    }

    // Helper to evaluate input and check the result kind (ignores span and errors list)
    fn assert_eval_kind(input: &str, expected_kind: Sexpr) {
        let mut interp = Interpreter::new();
        let result = eval_str(&mut interp, input);
        assert!(
            interp.errors().is_empty(),
            "Evaluation of '{}' recorded errors: {:?}",
            input,
            interp.errors()
        );
        assert_eq!(result.kind, expected_kind, "Input: '{}'", input);
    }

    // Helper to assert the first recorded evaluation error
    fn assert_eval_error(input: &str, expected: EvalErrorKind) {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, input);
        match interp.first_error() {
            Some(e) => assert_eq!(e.kind, expected, "Input: '{}', got: {}", input, e),
            None => panic!("Expected evaluation of '{}' to record {:?}", input, expected),
        }
    }

    fn ints(ns: &[i64]) -> Sexpr {
        Sexpr::List(ns.iter().map(|n| Value::int(*n)).collect())
    }

    #[test]
    fn test_eval_self_evaluating() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.eval_global(&Value::int(5)), Value::int(5));
        assert_eq!(interp.eval_global(&Value::bool(true)), Value::bool(true));
        assert_eq!(interp.eval_global(&Value::bool(false)), Value::bool(false));
        assert!(interp.errors().is_empty());
    }

    #[test]
    fn test_eval_quoted_clears_flag() {
        assert_eval_kind("'a", Sexpr::Symbol("a".to_string()));
        let mut interp = Interpreter::new();
        let result = eval_str(&mut interp, "'(undefined-fn 1)");
        assert!(!result.quoted);
        assert_eq!(stringify_kind(&result), "(undefined-fn 1)");
        assert!(interp.errors().is_empty());
    }

    fn stringify_kind(value: &Value) -> String {
        value.kind.to_string()
    }

    #[test]
    fn test_eval_symbol_lookup_ok() {
        let mut interp = Interpreter::new();
        interp.global_env().borrow_mut().bind("x", Value::int(100));
        assert_eq!(eval_str(&mut interp, "x"), Value::int(100));
    }

    #[test]
    fn test_eval_symbol_lookup_unbound() {
        let mut interp = Interpreter::new();
        let result = eval_str(&mut interp, "y");
        assert_eq!(result, Value::placeholder());
        let error = interp.first_error().unwrap();
        assert_eq!(error.kind, EvalErrorKind::Undefined);
        assert_eq!(error.value, Value::symbol("y"));
        assert!(error.env.is_some());
    }

    #[test]
    fn test_eval_empty_list() {
        assert_eval_error("()", EvalErrorKind::EvalEmptyList);
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eval_kind("(+ 1 2 3)", Sexpr::Int(6));
        assert_eval_kind("(* 2 3 4)", Sexpr::Int(24));
        assert_eval_kind("(+ 1 (* 2 3))", Sexpr::Int(7));
        assert_eval_kind("(- (+ 5 5) (* 2 3))", Sexpr::Int(4));
    }

    #[test]
    fn test_eval_quote() {
        assert_eval_kind("(quote (1 2))", ints(&[1, 2]));
        // No lookup happens inside quoted data.
        assert_eval_kind(
            "(quote (a b))",
            Sexpr::List(vec![Value::symbol("a"), Value::symbol("b")]),
        );
        assert_eval_error("(quote a b)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(quote)", EvalErrorKind::InvalidNumberOfArgs);
    }

    #[test]
    fn test_eval_if() {
        assert_eval_kind("(if T 1 2)", Sexpr::Int(1));
        assert_eval_kind("(if NIL 1 2)", Sexpr::Int(2));
        assert_eval_kind("(if (< 1 2) 'yes 'no)", Sexpr::Symbol("yes".to_string()));
    }

    #[test]
    fn test_eval_if_does_not_evaluate_unused_branch() {
        assert_eval_kind("(if T 'good unbound-variable)", Sexpr::Symbol("good".into()));
        assert_eval_kind("(if NIL unbound-variable 'good)", Sexpr::Symbol("good".into()));
    }

    #[test]
    fn test_eval_if_errors() {
        assert_eval_error("(if T 1)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(if T 1 2 3)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(if 0 1 2)", EvalErrorKind::InvalidArgTypes);
        assert_eval_error("(if unbound 1 2)", EvalErrorKind::Undefined);
    }

    #[test]
    fn test_eval_if_stops_after_failed_test() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "(if unbound (quit) (quit))");
        assert_eq!(interp.errors().len(), 1);
        assert_eq!(interp.errors()[0].kind, EvalErrorKind::Undefined);
    }

    #[test]
    fn test_define_then_lookup() {
        let mut interp = Interpreter::new();
        assert_eq!(eval_str(&mut interp, "(define x 5)"), Value::symbol("x"));
        assert_eq!(eval_str(&mut interp, "x"), Value::int(5));
        assert!(interp.errors().is_empty());
    }

    #[test]
    fn test_redefinition_keeps_old_value() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "(define x 5)");
        eval_str(&mut interp, "(define x 6)");
        assert_eq!(interp.first_error().unwrap().kind, EvalErrorKind::Redefinition);
        interp.clear_errors();
        assert_eq!(eval_str(&mut interp, "x"), Value::int(5));
    }

    #[test]
    fn test_define_errors() {
        assert_eval_error("(define x)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(define 1 2)", EvalErrorKind::InvalidArgTypes);
    }

    #[test]
    fn test_define_failed_value_binds_nothing() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "(define x (car 5))");
        assert_eq!(interp.first_error().unwrap().kind, EvalErrorKind::InvalidArgTypes);
        assert_eq!(interp.global_env().borrow().find("x"), None);
    }

    #[test]
    fn test_define_inside_lambda_is_global() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "((lambda (v) (define inner v)) 9)");
        assert!(interp.errors().is_empty(), "{:?}", interp.errors());
        assert_eq!(eval_str(&mut interp, "inner"), Value::int(9));
    }

    #[test]
    fn test_set() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "(define x 5)");
        assert_eq!(eval_str(&mut interp, "(set! x (+ x 1))"), Value::int(6));
        assert_eq!(eval_str(&mut interp, "x"), Value::int(6));
        assert!(interp.errors().is_empty());
    }

    #[test]
    fn test_set_unbound_creates_nothing() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "(set! ghost 1)");
        assert_eq!(interp.first_error().unwrap().kind, EvalErrorKind::Undefined);
        assert_eq!(interp.global_env().borrow().find("ghost"), None);
    }

    #[test]
    fn test_set_errors() {
        assert_eval_error("(set! x)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(set! 3 4)", EvalErrorKind::InvalidArgTypes);
    }

    #[test]
    fn test_defun() {
        let mut interp = Interpreter::new();
        assert_eq!(
            eval_str(&mut interp, "(defun square (n) (* n n))"),
            Value::symbol("square")
        );
        assert_eq!(eval_str(&mut interp, "(square 7)"), Value::int(49));
        assert!(interp.errors().is_empty());
    }

    #[test]
    fn test_defun_recursion() {
        let mut interp = Interpreter::new();
        eval_str(
            &mut interp,
            "(defun fact (n) (if (< n 2) 1 (* n (fact (- n 1)))))",
        );
        assert_eq!(eval_str(&mut interp, "(fact 10)"), Value::int(3628800));
        eval_str(
            &mut interp,
            "(defun fib (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))",
        );
        assert_eq!(eval_str(&mut interp, "(fib 15)"), Value::int(610));
        assert!(interp.errors().is_empty(), "{:?}", interp.errors());
    }

    #[test]
    fn test_defun_errors() {
        assert_eval_error("(defun f (x))", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(defun f (1) x)", EvalErrorKind::InvalidArgTypes);
        assert_eval_error("(defun f x x)", EvalErrorKind::InvalidArgTypes);
        assert_eval_error("(define f 1) (defun f (x) x)", EvalErrorKind::Redefinition);
    }

    #[test]
    fn test_lambda_application() {
        assert_eval_kind("((lambda (x y) (+ x y)) 3 4)", Sexpr::Int(7));
        assert_eval_kind("((lambda () 42))", Sexpr::Int(42));
        assert_eval_kind("(funcall (lambda (x) x) 'sym)", Sexpr::Symbol("sym".into()));
    }

    #[test]
    fn test_lambda_errors() {
        assert_eval_error("(lambda (x))", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(lambda x x)", EvalErrorKind::InvalidArgTypes);
        assert_eval_error("(lambda (x 1) x)", EvalErrorKind::InvalidArgTypes);
    }

    #[test]
    fn test_application_requires_exact_arity() {
        assert_eval_error("((lambda (x y) x) 1)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("((lambda (x) x) 1 2)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(defun id (x) x) (id)", EvalErrorKind::InvalidNumberOfArgs);
    }

    #[test]
    fn test_lexical_capture() {
        let mut interp = Interpreter::new();
        let adder = eval_str(&mut interp, "((lambda (x) (lambda (y) (+ x y))) 3)");
        assert!(interp.errors().is_empty(), "{:?}", interp.errors());
        let Sexpr::Lambda(lambda) = &adder.kind else {
            panic!("Expected a lambda, got {}", adder);
        };

        // A caller-side x must not leak into the closure.
        eval_str(&mut interp, "(define x 100)");
        let result = interp.apply(lambda, vec![Value::int(4)], &adder);
        assert_eq!(result, Value::int(7));
        assert!(interp.errors().is_empty());
    }

    #[test]
    fn test_closure_called_through_list_head() {
        assert_eval_kind("(((lambda (x) (lambda (y) (+ x y))) 3) 4)", Sexpr::Int(7));
        assert_eval_kind(
            "(funcall ((lambda (x) (lambda (y) (* x y))) 3) 5)",
            Sexpr::Int(15),
        );
    }

    #[test]
    fn test_closure_over_defun_frame() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "(defun make-adder (n) (lambda (m) (+ n m)))");
        eval_str(&mut interp, "(define add5 (make-adder 5))");
        eval_str(&mut interp, "(define add9 (make-adder 9))");
        assert_eq!(eval_str(&mut interp, "(add5 1)"), Value::int(6));
        assert_eq!(eval_str(&mut interp, "(add9 1)"), Value::int(10));
        assert!(interp.errors().is_empty(), "{:?}", interp.errors());
    }

    #[test]
    fn test_funcall() {
        assert_eval_kind("(funcall '+ 1 2 3)", Sexpr::Int(6));
        assert_eval_kind("(defun twice (x) (* 2 x)) (funcall 'twice 4)", Sexpr::Int(8));
        assert_eval_kind("(define f (lambda (x) (- 0 x))) (funcall f 4)", Sexpr::Int(-4));
        assert_eval_error("(funcall)", EvalErrorKind::InvalidNumberOfArgs);
        assert_eval_error("(funcall 5 1)", EvalErrorKind::NotAFunction);
        assert_eval_error("(funcall 'nothing 1)", EvalErrorKind::Undefined);
    }

    #[test]
    fn test_not_a_function() {
        assert_eval_error("(1 2 3)", EvalErrorKind::NotAFunction);
        assert_eval_error("(T)", EvalErrorKind::NotAFunction);
        assert_eval_error("((+ 1 2) 3)", EvalErrorKind::NotAFunction);
        assert_eval_error("(define v 1) (v 2)", EvalErrorKind::NotAFunction);
    }

    #[test]
    fn test_unknown_head_is_undefined() {
        assert_eval_error("(frobnicate 1 2)", EvalErrorKind::Undefined);
    }

    #[test]
    fn test_lambda_value_is_not_reachable() {
        let mut interp = Interpreter::new();
        let lambda = Lambda::new(vec![], Value::int(1), interp.global_env());
        interp.eval_global(&Value::lambda(lambda));
        assert_eq!(interp.first_error().unwrap().kind, EvalErrorKind::NotReachable);
    }

    #[test]
    fn test_quit_sentinel() {
        let mut interp = Interpreter::new();
        let result = eval_str(&mut interp, "(quit)");
        assert_eq!(result, Value::placeholder());
        assert!(interp.first_error().unwrap().is_quit());
        assert_eval_error("(quit now)", EvalErrorKind::InvalidNumberOfArgs);
    }

    #[test]
    fn test_errors_accumulate_until_cleared() {
        let mut interp = Interpreter::new();
        eval_str(&mut interp, "nope");
        eval_str(&mut interp, "(car 1)");
        assert_eq!(interp.errors().len(), 2);
        assert_eq!(interp.errors()[0].kind, EvalErrorKind::Undefined);
        interp.clear_errors();
        assert!(!interp.has_errors());
    }

    #[test]
    fn test_failed_argument_abandons_call() {
        let mut interp = Interpreter::new();
        let result = eval_str(&mut interp, "(+ 1 missing (car 5))");
        assert_eq!(result, Value::placeholder());
        // The second bad argument is still evaluated, then the call is dropped.
        assert_eq!(interp.errors().len(), 2);
        assert_eq!(interp.errors()[0].kind, EvalErrorKind::Undefined);
    }

    #[test]
    fn test_builtin_name_with_value_binding_still_calls_builtin() {
        assert_eval_kind("(define car 3) (car '(1 2))", Sexpr::Int(1));
    }

    #[test]
    fn test_lambda_binding_shadows_builtin() {
        assert_eval_kind("(defun not (x) 'shadowed) (not T)", Sexpr::Symbol("shadowed".into()));
    }

    #[test]
    fn test_error_display() {
        let error = EvalError::new(EvalErrorKind::InvalidNumberOfArgs, &Value::symbol("f"))
            .with_message("car takes 1 arg");
        assert_eq!(error.to_string(), "invalid number of arguments: car takes 1 arg");
        let bare = EvalError::new(EvalErrorKind::Overflow, &Value::int(0));
        assert_eq!(bare.to_string(), "integer overflow");
    }

    #[test]
    fn test_runaway_recursion_is_recorded() {
        let mut interp = Interpreter::new();
        let result = eval_str(&mut interp, "(defun f (n) (f n)) (f 1)");
        assert_eq!(result, Value::placeholder());
        assert_eq!(interp.errors().len(), 1);
        let error = &interp.errors()[0];
        assert_eq!(error.kind, EvalErrorKind::Overflow);
        assert!(
            error.message.as_deref().unwrap().contains("recursion depth exceeded"),
            "{}",
            error
        );

        // The session stays usable afterwards.
        assert_eq!(interp.depth, 0);
        interp.clear_errors();
        assert_eq!(eval_str(&mut interp, "(+ 1 2)"), Value::int(3));
        assert!(interp.errors().is_empty());
    }

    #[test]
    fn test_deep_non_tail_recursion() {
        let mut interp = Interpreter::new();
        eval_str(
            &mut interp,
            "(defun count (n) (if (= n 0) 0 (+ 1 (count (- n 1)))))",
        );
        assert_eq!(eval_str(&mut interp, "(count 1000)"), Value::int(1000));
        assert_eq!(eval_str(&mut interp, "(count 3000)"), Value::int(3000));
        assert!(interp.errors().is_empty(), "{:?}", interp.errors());
    }

    #[test]
    fn test_dropping_session_frees_global_frame() {
        let global = {
            let mut interp = Interpreter::new();
            eval_str(&mut interp, "(defun id (n) n) (define g (lambda (x) x))");
            assert!(interp.errors().is_empty());
            std::rc::Rc::downgrade(&interp.global_env())
        };
        assert!(global.upgrade().is_none());
    }

    #[test]
    fn test_special_form_names() {
        assert_eq!(SpecialForm::from_name("set!"), Some(SpecialForm::Set));
        assert_eq!(SpecialForm::from_name("car"), None);
        for form in SpecialForm::ALL {
            assert_eq!(SpecialForm::from_name(form.name()), Some(form));
        }
    }
}
