use crate::evaluator::{EvalError, Interpreter};
use crate::parser::{ParseError, read};
use crate::types::Value;

/// The outcome of one top-level value, as a front-end reports it.
#[derive(Debug, Clone)]
pub enum Step {
    Value(Value),
    ParseError(ParseError),
    /// The first error recorded while evaluating the value.
    EvalError(EvalError),
    Quit,
}

/// Reads `input` and evaluates each top-level value in order against the
/// global frame. Stops at the first value that fails; `(quit)` yields
/// `Step::Quit`. The session's error list is cleared before every value.
pub fn run(interp: &mut Interpreter, input: &str) -> Vec<Step> {
    let values = match read(input) {
        Ok(values) => values,
        Err(e) => return vec![Step::ParseError(e)],
    };

    let mut steps = Vec::with_capacity(values.len());
    for value in &values {
        interp.clear_errors();
        let result = interp.eval_global(value);
        match interp.first_error() {
            None => steps.push(Step::Value(result)),
            Some(e) if e.is_quit() => {
                steps.push(Step::Quit);
                break;
            }
            Some(e) => {
                steps.push(Step::EvalError(e.clone()));
                break;
            }
        }
    }
    interp.clear_errors();
    steps
}

/// Installs the stderr log subscriber. `RUST_LOG` controls the filter,
/// defaulting to `warn`; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
