//! Minimal entry point: `ember <path>` runs a script file through the VM.
//!
//! Argument parsing, a REPL, and richer diagnostics are process-level
//! concerns this crate deliberately leaves out.

use std::env;
use std::fs;
use std::process::ExitCode;

use ember_vm::{InterpretResult, Vm};

fn main() -> ExitCode {
    let mut args = env::args();
    args.next(); // binary name

    let Some(path) = args.next() else {
        eprintln!("Usage: ember <path>");
        return ExitCode::from(64);
    };

    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read file \"{path}\": {err}");
            return ExitCode::from(74);
        }
    };

    match Vm::new().interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}
