use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor, EditMode};

use lispp::Interpreter;
use lispp::driver::{self, Step};
use lispp::primitives;

struct ReplConfig {
    prompt: String,
    edit_mode: EditMode,
}

impl ReplConfig {
    /// `LISPP_EDIT_MODE=vi` switches to vi keys; anything else is emacs.
    fn from_env() -> Self {
        let edit_mode = match std::env::var("LISPP_EDIT_MODE").as_deref() {
            Ok("vi") => EditMode::Vi,
            _ => EditMode::Emacs,
        };
        ReplConfig {
            prompt: "lispp> ".to_string(),
            edit_mode,
        }
    }

    fn editor_config(&self) -> Config {
        Config::builder()
            .edit_mode(self.edit_mode)
            .auto_add_history(true)
            .build()
    }
}

fn print_env(interp: &Interpreter) {
    let mut names: Vec<String> = interp
        .global_env()
        .borrow()
        .identifiers()
        .into_iter()
        .collect();
    names.sort();
    println!("bound:    {}", names.join(" "));
    println!(
        "builtins: {}",
        primitives::names().collect::<Vec<_>>().join(" ")
    );
}

fn main() -> rustyline::Result<()> {
    driver::init_logging();

    let config = ReplConfig::from_env();
    println!("lispp REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type (quit) or press Ctrl-D to quit; :env lists bindings.");

    let mut rl = DefaultEditor::with_config(config.editor_config())?;
    let mut interp = Interpreter::new();

    loop {
        let readline = rl.readline(&config.prompt);
        match readline {
            Ok(line) => {
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input == ":env" {
                    print_env(&interp);
                    continue;
                }

                let input = line.replace('\t', " ");
                for step in driver::run(&mut interp, &input) {
                    match step {
                        Step::Value(value) => println!("{}", value),
                        Step::ParseError(e) => e.pretty_print(&input),
                        Step::EvalError(e) => e.pretty_print(&input),
                        Step::Quit => return Ok(()),
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type (quit) or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}
