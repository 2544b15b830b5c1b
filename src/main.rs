use std::io::{self, Read};
use std::process::ExitCode;

use lispp::Interpreter;
use lispp::driver::{self, Step};

// Only the plain space separates tokens, so other whitespace is folded into it.
fn normalize_whitespace(source: &str) -> String {
    source.replace(['\n', '\t', '\r'], " ")
}

fn main() -> io::Result<ExitCode> {
    driver::init_logging();

    let source = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let input = normalize_whitespace(&source);
    tracing::debug!(chars = input.chars().count(), "running program");

    let mut interp = Interpreter::new();
    for step in driver::run(&mut interp, &input) {
        match step {
            Step::Value(value) => println!("{}", value),
            Step::ParseError(e) => {
                e.pretty_print(&input);
                return Ok(ExitCode::FAILURE);
            }
            Step::EvalError(e) => {
                e.pretty_print(&input);
                return Ok(ExitCode::FAILURE);
            }
            Step::Quit => break,
        }
    }
    Ok(ExitCode::SUCCESS)
}
