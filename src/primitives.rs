use crate::environment::Env;
use crate::evaluator::{EvalError, EvalErrorKind, Interpreter};
use crate::types::{Sexpr, Value};

/// Builtins receive their arguments already evaluated, plus the calling form
/// and environment for error reporting and for calling back into `mapcar`.
pub type PrimitiveFunc = fn(&mut Interpreter, Vec<Value>, &Value, &Env) -> Value;

#[derive(Debug, Copy, Clone)]
pub struct Primitive {
    pub name: &'static str,
    pub func: PrimitiveFunc,
}

const fn primitive(name: &'static str, func: PrimitiveFunc) -> Primitive {
    Primitive { name, func }
}

static BUILTINS: &[Primitive] = &[
    primitive("print", prim_print),
    primitive("car", prim_car),
    primitive("cdr", prim_cdr),
    primitive("cons", prim_cons),
    primitive("sqrt", prim_sqrt),
    primitive("exp", prim_pow),
    primitive("pow", prim_pow),
    primitive("+", prim_add),
    primitive("-", prim_sub),
    primitive("*", prim_mul),
    primitive("/", prim_div),
    primitive("=", prim_equals),
    primitive(">", prim_greater_than),
    primitive("<", prim_less_than),
    primitive("and", prim_and),
    primitive("or", prim_or),
    primitive("not", prim_not),
    primitive("mapcar", prim_mapcar),
];

pub fn lookup(name: &str) -> Option<Primitive> {
    BUILTINS.iter().find(|p| p.name == name).copied()
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

/// Every builtin name, in table order.
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|p| p.name)
}

// Checks the number of arguments
macro_rules! check_arity {
    // Variant for minimum number of args
    ($interp:expr, $args:expr, min $expected:expr, $form:expr, $name:expr) => {
        if $args.len() < $expected {
            return $interp.fail(
                EvalError::new(EvalErrorKind::InvalidNumberOfArgs, $form).with_message(format!(
                    "{} takes {} or more args, got {}",
                    $name,
                    $expected,
                    $args.len()
                )),
            );
        }
    };
    // Exact number of args
    ($interp:expr, $args:expr, $expected:expr, $form:expr, $name:expr) => {
        if $args.len() != $expected {
            return $interp.fail(
                EvalError::new(EvalErrorKind::InvalidNumberOfArgs, $form).with_message(format!(
                    "{} takes {} arg{}, got {}",
                    $name,
                    $expected,
                    if $expected == 1 { "" } else { "s" },
                    $args.len()
                )),
            );
        }
    };
}

fn invalid_arg_error(interp: &mut Interpreter, arg: &Value, name: &str, expected: &str) -> Value {
    interp.fail(
        EvalError::new(EvalErrorKind::InvalidArgTypes, arg).with_message(format!(
            "{} takes arg types: {}, got {}",
            name,
            expected,
            arg.kind.type_name()
        )),
    )
}

// Finds the first argument that is not an int.
fn first_non_int(args: &[Value]) -> Option<&Value> {
    args.iter().find(|arg| arg.as_int().is_none())
}

fn first_non_bool(args: &[Value]) -> Option<&Value> {
    args.iter().find(|arg| arg.as_bool().is_none())
}

fn overflow(interp: &mut Interpreter, wrapped: i64, name: &str) {
    interp.report(
        EvalError::new(EvalErrorKind::Overflow, &Value::int(wrapped))
            .with_message(format!("'{}' overflowed, wrapped to {}", name, wrapped)),
    );
}

/// Left fold over int operands. Overflowing steps are reported and continue
/// with the wrapped value, so the result is always defined.
fn fold_numbers<F: Fn(i64, i64) -> (i64, bool)>(
    interp: &mut Interpreter,
    start: i64,
    rest: &[Value],
    func: F,
    operator: &str,
) -> Value {
    if let Some(bad) = first_non_int(rest) {
        return interp.fail(
            EvalError::new(EvalErrorKind::MathErr, bad).with_message(format!(
                "'{}' expects int arguments, got {}",
                operator,
                bad.kind.type_name()
            )),
        );
    }

    let mut total = start;
    for num in rest.iter().filter_map(Value::as_int) {
        let (next, overflowed) = func(total, num);
        if overflowed {
            overflow(interp, next, operator);
        }
        total = next;
    }
    Value::int(total)
}

// `-` and `/` seed the fold with their first operand.
fn fold_from_first<F: Fn(i64, i64) -> (i64, bool)>(
    interp: &mut Interpreter,
    args: &[Value],
    form: &Value,
    func: F,
    operator: &str,
) -> Value {
    check_arity!(interp, args, min 1, form, operator);
    match args[0].as_int() {
        Some(first) => fold_numbers(interp, first, &args[1..], func, operator),
        None => interp.fail(
            EvalError::new(EvalErrorKind::MathErr, &args[0])
                .with_message(format!("'{}' expects int arguments", operator)),
        ),
    }
}

fn compare_numbers<F: Fn(i64, i64) -> bool>(
    interp: &mut Interpreter,
    args: &[Value],
    form: &Value,
    compare: F,
    operator: &str,
) -> Value {
    check_arity!(interp, args, min 2, form, operator);
    if let Some(bad) = first_non_int(args) {
        return invalid_arg_error(interp, bad, operator, "int int int...");
    }
    let nums: Vec<i64> = args.iter().filter_map(Value::as_int).collect();
    Value::bool(nums.windows(2).all(|pair| compare(pair[0], pair[1])))
}

fn check_bools(
    interp: &mut Interpreter,
    args: &[Value],
    form: &Value,
    operator: &str,
) -> Option<Vec<bool>> {
    if args.len() < 2 {
        interp.report(
            EvalError::new(EvalErrorKind::InvalidNumberOfArgs, form).with_message(format!(
                "{} takes 2 or more args, got {}",
                operator,
                args.len()
            )),
        );
        return None;
    }
    if let Some(bad) = first_non_bool(args) {
        invalid_arg_error(interp, bad, operator, "bool bool bool...");
        return None;
    }
    Some(args.iter().filter_map(Value::as_bool).collect())
}

// --- Output ---

/// `(print x)` hands back `x` with its quote flag set, so a front-end echoes
/// `(print 5)` as `'5`; evaluating that result again yields plain `5`.
pub fn prim_print(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    check_arity!(interp, args, 1, form, "print");
    args[0].clone().with_quote(true)
}

// --- List Primitives ---

pub fn prim_car(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    // (car list) -> first item
    check_arity!(interp, args, 1, form, "car");
    match args[0].as_list() {
        Some([first, ..]) => first.clone(),
        Some([]) => invalid_arg_error(interp, &args[0], "car", "non-empty list"),
        None => invalid_arg_error(interp, &args[0], "car", "list"),
    }
}

pub fn prim_cdr(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    // (cdr list) -> rest of list
    check_arity!(interp, args, 1, form, "cdr");
    match args[0].as_list() {
        Some([_, rest @ ..]) => Value::list(rest.to_vec()),
        Some([]) => invalid_arg_error(interp, &args[0], "cdr", "non-empty list"),
        None => invalid_arg_error(interp, &args[0], "cdr", "list"),
    }
}

pub fn prim_cons(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    // (cons item list) -> (item ..list)
    check_arity!(interp, args, 2, form, "cons");
    match args[1].as_list() {
        Some(tail) => {
            let mut items = Vec::with_capacity(tail.len() + 1);
            items.push(args[0].clone());
            items.extend_from_slice(tail);
            Value::list(items)
        }
        None => invalid_arg_error(interp, &args[1], "cons", "any list"),
    }
}

pub fn prim_mapcar(interp: &mut Interpreter, args: Vec<Value>, form: &Value, env: &Env) -> Value {
    // (mapcar f l1 l2 ...) -> ((f l1[0] l2[0] ...) (f l1[1] l2[1] ...) ...)
    check_arity!(interp, args, min 2, form, "mapcar");
    let (callee, lists) = (&args[0], &args[1..]);
    if !matches!(callee.kind, Sexpr::Symbol(_) | Sexpr::Lambda(_)) {
        return invalid_arg_error(interp, callee, "mapcar", "lambda/symbol list list...");
    }
    let mut columns = Vec::with_capacity(lists.len());
    for list in lists {
        match list.as_list() {
            Some(items) => columns.push(items),
            None => return invalid_arg_error(interp, list, "mapcar", "lambda/symbol list list..."),
        }
    }

    let shortest = columns.iter().map(|items| items.len()).min().unwrap_or(0);
    let mark = interp.error_count();
    let mut results = Vec::with_capacity(shortest);
    for i in 0..shortest {
        let row: Vec<Value> = columns.iter().map(|items| items[i].clone()).collect();
        let result = interp.apply_callable(callee, row, form, env);
        if interp.error_count() > mark {
            return Value::placeholder();
        }
        results.push(result);
    }
    Value::list(results)
}

// --- Numeric Primitives ---

pub fn prim_sqrt(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    check_arity!(interp, args, 1, form, "sqrt");
    match args[0].as_int() {
        Some(n) if n < 0 => interp.fail(
            EvalError::new(EvalErrorKind::MathErr, &args[0])
                .with_message(format!("sqrt of negative number {}", n)),
        ),
        Some(n) => Value::int(n.isqrt()),
        None => invalid_arg_error(interp, &args[0], "sqrt", "int"),
    }
}

// Square-and-multiply with wrapping steps; only used once overflow is certain.
fn wrapping_pow(mut base: i64, mut exp: u64) -> i64 {
    let mut acc: i64 = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    acc
}

pub fn prim_pow(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    // (pow base exponent) -> base^exponent, truncated toward zero
    check_arity!(interp, args, 2, form, "pow");
    let (Some(base), Some(exp)) = (args[0].as_int(), args[1].as_int()) else {
        let bad = if args[0].as_int().is_none() { &args[0] } else { &args[1] };
        return invalid_arg_error(interp, bad, "pow", "int int");
    };

    if exp < 0 {
        return match base {
            0 => interp.fail(
                EvalError::new(EvalErrorKind::DivideByZero, &args[0])
                    .with_message("0 raised to a negative power"),
            ),
            1 => Value::int(1),
            -1 => Value::int(if exp % 2 == 0 { 1 } else { -1 }),
            // |base| > 1: the true result lies strictly between -1 and 1
            _ => Value::int(0),
        };
    }

    let (result, overflowed) = match u32::try_from(exp) {
        Ok(exp) => base.overflowing_pow(exp),
        Err(_) => match base {
            0 | 1 => (base, false),
            -1 => (if exp % 2 == 0 { 1 } else { -1 }, false),
            _ => (wrapping_pow(base, exp.unsigned_abs()), true),
        },
    };
    if overflowed {
        overflow(interp, result, "pow");
    }
    Value::int(result)
}

pub fn prim_add(interp: &mut Interpreter, args: Vec<Value>, _form: &Value, _env: &Env) -> Value {
    // (+) -> 0
    // (+ 1 2 3) -> 6
    fold_numbers(interp, 0, &args, i64::overflowing_add, "+")
}

pub fn prim_sub(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    // (- x y z) -> x - y - z
    fold_from_first(interp, &args, form, i64::overflowing_sub, "-")
}

pub fn prim_mul(interp: &mut Interpreter, args: Vec<Value>, _form: &Value, _env: &Env) -> Value {
    // (*) -> 1
    // (* 1 2 3) -> 6
    fold_numbers(interp, 1, &args, i64::overflowing_mul, "*")
}

pub fn prim_div(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    // (/ x y z) -> x / y / z, truncated toward zero
    check_arity!(interp, args, min 1, form, "/");
    if let Some(bad) = first_non_int(&args) {
        return interp.fail(
            EvalError::new(EvalErrorKind::MathErr, bad)
                .with_message(format!("'/' expects int arguments, got {}", bad.kind.type_name())),
        );
    }

    let mut divisors = args.iter().filter_map(|arg| arg.as_int().map(|n| (n, arg)));
    let Some((mut total, _)) = divisors.next() else {
        return Value::placeholder();
    };
    for (divisor, arg) in divisors {
        if divisor == 0 {
            interp.report(EvalError::new(EvalErrorKind::DivideByZero, arg));
            total = 0;
            continue;
        }
        let (next, overflowed) = total.overflowing_div(divisor);
        if overflowed {
            overflow(interp, next, "/");
        }
        total = next;
    }
    Value::int(total)
}

// --- Comparison Primitives ---

pub fn prim_equals(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    compare_numbers(interp, &args, form, |left, right| left == right, "=")
}

pub fn prim_less_than(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    compare_numbers(interp, &args, form, |left, right| left < right, "<")
}

pub fn prim_greater_than(
    interp: &mut Interpreter,
    args: Vec<Value>,
    form: &Value,
    _env: &Env,
) -> Value {
    compare_numbers(interp, &args, form, |left, right| left > right, ">")
}

// --- Boolean Primitives ---

pub fn prim_and(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    match check_bools(interp, &args, form, "and") {
        Some(bools) => Value::bool(bools.iter().all(|b| *b)),
        None => Value::placeholder(),
    }
}

pub fn prim_or(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    match check_bools(interp, &args, form, "or") {
        Some(bools) => Value::bool(bools.iter().any(|b| *b)),
        None => Value::placeholder(),
    }
}

pub fn prim_not(interp: &mut Interpreter, args: Vec<Value>, form: &Value, _env: &Env) -> Value {
    check_arity!(interp, args, 1, form, "not");
    match args[0].as_bool() {
        Some(b) => Value::bool(!b),
        None => invalid_arg_error(interp, &args[0], "not", "bool"),
    }
}
