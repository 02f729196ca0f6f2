//! Textual disassembly of a compiled image.
//!
//! The listing is the assembler's input format: pool and table
//! sections as dot-directives, then `.code` followed by one
//! instruction per line. Lines starting with `;` are comments.

use std::io::{self, Write};

use abc_byt::{CompiledProgram, DataKind, VarType};

use crate::listing::escape;

pub(crate) fn var_type_name(ty: VarType) -> &'static str {
    match ty {
        VarType::Numeric => "NUMERIC",
        VarType::String => "STRING",
        VarType::Array1D => "ARRAY_1D",
        VarType::Array2D => "ARRAY_2D",
    }
}

/// Write the listing for `program` to `out`.
pub fn disassemble(program: &CompiledProgram, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "; abc image listing")?;

    for (i, value) in program.const_pool.iter().enumerate() {
        writeln!(out, ".const {i} {value}")?;
    }
    for (i, text) in program.string_pool.iter().enumerate() {
        writeln!(out, ".string {i} \"{}\"", escape(text))?;
    }
    for var in &program.var_table {
        writeln!(
            out,
            ".var {} \"{}\" {} {} {}",
            var.slot,
            escape(&var.name),
            var_type_name(var.ty),
            var.dim1,
            var.dim2
        )?;
    }
    for mapping in &program.line_map {
        writeln!(out, ".line {} {}", mapping.line, mapping.pc)?;
    }
    for (i, value) in program.data_numeric.iter().enumerate() {
        writeln!(out, ".dnum {i} {value}")?;
    }
    for (i, text) in program.data_strings.iter().enumerate() {
        writeln!(out, ".dstr {i} \"{}\"", escape(text))?;
    }
    for entry in &program.data_entries {
        match entry.kind {
            DataKind::Numeric => writeln!(out, ".data NUMERIC {}", entry.index)?,
            DataKind::String => writeln!(out, ".data STRING {}", entry.index)?,
            DataKind::Null => writeln!(out, ".data NULL")?,
        }
    }

    writeln!(out, ".code")?;
    for (pc, inst) in program.code.iter().enumerate() {
        match inst.opcode() {
            Some(op) if op.uses_operand() => {
                writeln!(out, "{pc:04}  {}  {}", op.mnemonic(), inst.operand)?
            }
            Some(op) => writeln!(out, "{pc:04}  {}", op.mnemonic())?,
            // Unassigned opcode byte: keep it representable.
            None => writeln!(out, "{pc:04}  DB  {}  {}", inst.opcode, inst.operand)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use abc_byt::{Instruction, Opcode};

    #[test]
    fn test_listing_shape() {
        let program = CompiledProgram {
            code: vec![
                Instruction::new(Opcode::PushConst, 0),
                Instruction::new(Opcode::PrintNum, 0),
                Instruction::new(Opcode::PrintNewline, 0),
            ],
            const_pool: vec![5.0],
            ..Default::default()
        };
        let mut out = Vec::new();
        disassemble(&program, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(".const 0 5"));
        assert!(text.contains("0000  PUSH_CONST  0"));
        assert!(text.contains("0001  PRINT_NUM"));
        assert!(text.contains("0002  PRINT_NEWLINE"));
    }

    #[test]
    fn test_nop_operand_is_kept() {
        // ON jump tables live in NOP operands; they must survive the
        // listing.
        let program = CompiledProgram {
            code: vec![Instruction::raw(17)],
            ..Default::default()
        };
        let mut out = Vec::new();
        disassemble(&program, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("NOP  17"));
    }
}
