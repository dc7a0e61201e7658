use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};

use calla::{CallaError, Interpreter, Repl, value::ValueKind};

#[derive(Parser)]
#[command(author, version, about = "Calla language interpreter")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Calla script file
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of Calla code and print its result
    Eval { source: String },
}

fn main() -> Result<(), CallaError> {
    let args = Args::parse();
    match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => run_script(script),
        Command::Repl => {
            let mut repl = Repl::new();
            repl.run()
        }
        Command::Eval { source } => {
            let mut interpreter = Interpreter::new();
            let value = interpreter.eval_source(&source)?;
            if !matches!(&*value.0, ValueKind::Unit) {
                println!("{value}");
            }
            Ok(())
        }
    }
}

fn run_script(path: PathBuf) -> Result<(), CallaError> {
    let source = fs::read_to_string(&path)?;
    let mut interpreter = Interpreter::new();
    interpreter.eval_source(&source)?;
    Ok(())
}
