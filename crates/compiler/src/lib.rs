//! Ember Compiler: scanner plus a single-pass Pratt parser that emits
//! bytecode directly, with no intermediate AST.
//!
//! `compile` is the only entry point the VM needs. Everything else here is
//! the scanner (tokens, lexing) and the compiler (parsing, code generation,
//! scope tracking).

mod compiler;
mod scanner;

use ember_core::{Chunk, Heap};

/// Compiles `source` into a `Chunk`. On a syntax error, diagnostics are
/// printed to stderr (line-tagged) and `None` is returned; the caller
/// decides what that means for process exit status.
pub fn compile(source: &str, heap: &mut Heap) -> Option<Chunk> {
    compiler::Compiler::compile(source, heap)
}
