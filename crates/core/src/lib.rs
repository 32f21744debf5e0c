//! Ember Core: value model, bytecode chunk, and hash table
//!
//! This crate provides the language-agnostic primitives shared by the Ember
//! compiler and VM crates:
//!
//! - `value`: the tagged `Value` union (nil, bool, number, heap object)
//! - `object`: heap-allocated objects (currently just interned strings) and
//!   the `Heap` that owns them
//! - `chunk`: a linear bytecode buffer with a parallel line table and a
//!   constant pool
//! - `table`: the open-addressing hash table used for globals and for
//!   string interning
//! - `disassemble`: a human-readable dump of a chunk, used by both the
//!   compiler (`print_code` feature) and the VM (`trace_execution` feature)

pub mod chunk;
pub mod disassemble;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::{Chunk, OpCode};
pub use object::{Heap, StringObj};
pub use table::Table;
pub use value::Value;
