//! abc-vm - Stack virtual machine for compiled BASIC programs.
//!
//! A classical fetch-decode-dispatch loop over the fixed-width
//! instruction stream of a [`CompiledProgram`](abc_byt::CompiledProgram).
//! Runtime state lives entirely in the [`Vm`]: a numeric value stack,
//! a string stack of owned strings, GOSUB and FOR stacks, parallel
//! variable arrays addressed by slot, file channels 1..7, the DATA
//! cursor, the one-shot TRAP target, RNG state, and a private 64 KiB
//! byte buffer backing PEEK/POKE.
//!
//! On a runtime error with a trap armed, both value stacks are
//! cleared, control transfers to the trap target, and the trap
//! disarms; without one the VM prints `ERROR - <message>` to stderr
//! and halts. The program itself is never mutated.

mod channels;
mod error;
mod machine;
mod number;
mod printer;
mod rng;

pub use error::RuntimeError;
pub use machine::Vm;
pub use number::{format_number, parse_number};
