//! abc-byt - The bytecode data model.
//!
//! This crate defines the contract between the compile side and the
//! execute side of the toolchain: fixed-width [`Instruction`]s, the
//! [`Opcode`] inventory, and the [`CompiledProgram`] container that
//! carries code, interned pools, the variable table, the line map,
//! and DATA storage. `CompiledProgram` is plain data with no behavior
//! beyond lookups, which keeps it trivially serializable by the image
//! codec and read-only for the VM.

pub mod opcode;
pub mod program;

pub use opcode::Opcode;
pub use program::{
    CompiledProgram, DataEntry, DataKind, Instruction, LineMapping, VarInfo, VarType,
};
