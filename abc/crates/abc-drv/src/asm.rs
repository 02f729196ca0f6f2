//! Text assembler: the inverse of the disassembler.
//!
//! Reads a listing produced by `abc disasm` (or written by hand) and
//! rebuilds the `CompiledProgram`, ready for the image writer. The
//! format is line-oriented; see [`crate::disasm`] for the shape.

use anyhow::{bail, Context, Result};

use abc_byt::{CompiledProgram, DataEntry, DataKind, Instruction, Opcode, VarInfo, VarType};

use crate::listing::unescape;

fn parse_var_type(text: &str) -> Option<VarType> {
    match text {
        "NUMERIC" => Some(VarType::Numeric),
        "STRING" => Some(VarType::String),
        "ARRAY_1D" => Some(VarType::Array1D),
        "ARRAY_2D" => Some(VarType::Array2D),
        _ => None,
    }
}

/// Slice out a quoted, escaped string and whatever follows it.
fn quoted(text: &str) -> Result<(String, &str)> {
    let open = text.find('"').context("expected opening quote")?;
    let close = text.rfind('"').context("expected closing quote")?;
    if close <= open {
        bail!("unterminated string");
    }
    Ok((unescape(&text[open + 1..close]), &text[close + 1..]))
}

/// Assemble a listing into a program.
pub fn assemble(text: &str) -> Result<CompiledProgram> {
    let mut program = CompiledProgram::default();
    let mut in_code = false;

    for (index, raw) in text.lines().enumerate() {
        let lineno = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if line == ".code" {
            in_code = true;
            continue;
        }

        if let Some(rest) = line.strip_prefix(".const ") {
            let value = rest
                .split_whitespace()
                .nth(1)
                .with_context(|| format!("line {lineno}: .const needs index and value"))?;
            program.const_pool.push(
                value
                    .parse()
                    .with_context(|| format!("line {lineno}: bad constant '{value}'"))?,
            );
        } else if let Some(rest) = line.strip_prefix(".string ") {
            let (text, _) =
                quoted(rest).with_context(|| format!("line {lineno}: bad .string"))?;
            program.string_pool.push(text);
        } else if let Some(rest) = line.strip_prefix(".var ") {
            let slot: u16 = rest
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .with_context(|| format!("line {lineno}: .var needs a slot"))?;
            let (name, tail) =
                quoted(rest).with_context(|| format!("line {lineno}: bad .var name"))?;
            let mut fields = tail.split_whitespace();
            let ty = fields
                .next()
                .and_then(parse_var_type)
                .with_context(|| format!("line {lineno}: bad variable type"))?;
            let dim1 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let dim2 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            program.var_table.push(VarInfo {
                name,
                slot,
                ty,
                dim1,
                dim2,
            });
        } else if let Some(rest) = line.strip_prefix(".line ") {
            let mut fields = rest.split_whitespace();
            let basic_line = fields
                .next()
                .and_then(|s| s.parse().ok())
                .with_context(|| format!("line {lineno}: bad .line"))?;
            let pc = fields
                .next()
                .and_then(|s| s.parse().ok())
                .with_context(|| format!("line {lineno}: bad .line pc"))?;
            program
                .line_map
                .push(abc_byt::LineMapping { line: basic_line, pc });
        } else if let Some(rest) = line.strip_prefix(".dnum ") {
            let value = rest
                .split_whitespace()
                .nth(1)
                .with_context(|| format!("line {lineno}: .dnum needs index and value"))?;
            program.data_numeric.push(
                value
                    .parse()
                    .with_context(|| format!("line {lineno}: bad DATA number '{value}'"))?,
            );
        } else if let Some(rest) = line.strip_prefix(".dstr ") {
            let (text, _) =
                quoted(rest).with_context(|| format!("line {lineno}: bad .dstr"))?;
            program.data_strings.push(text);
        } else if let Some(rest) = line.strip_prefix(".data ") {
            let mut fields = rest.split_whitespace();
            let entry = match fields.next() {
                Some("NUMERIC") => DataEntry {
                    kind: DataKind::Numeric,
                    index: fields.next().and_then(|s| s.parse().ok()).unwrap_or(0),
                },
                Some("STRING") => DataEntry {
                    kind: DataKind::String,
                    index: fields.next().and_then(|s| s.parse().ok()).unwrap_or(0),
                },
                Some("NULL") => DataEntry {
                    kind: DataKind::Null,
                    index: 0,
                },
                other => bail!("line {lineno}: unknown DATA kind {other:?}"),
            };
            program.data_entries.push(entry);
        } else if in_code {
            program.code.push(parse_instruction(line, lineno)?);
        } else {
            bail!("line {lineno}: unknown directive '{line}'");
        }
    }

    Ok(program)
}

fn parse_instruction(line: &str, lineno: usize) -> Result<Instruction> {
    let mut fields = line.split_whitespace();
    let first = fields
        .next()
        .with_context(|| format!("line {lineno}: empty instruction"))?;

    // A leading address from the disassembler is decorative; no
    // mnemonic is purely numeric.
    let mnemonic = if first.bytes().all(|b| b.is_ascii_digit()) {
        fields
            .next()
            .with_context(|| format!("line {lineno}: missing mnemonic"))?
    } else {
        first
    };

    if mnemonic == "DB" {
        let opcode = fields
            .next()
            .and_then(|s| s.parse().ok())
            .with_context(|| format!("line {lineno}: DB needs an opcode byte"))?;
        let operand = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        return Ok(Instruction {
            opcode,
            flags: 0,
            operand,
        });
    }

    let opcode = Opcode::from_mnemonic(mnemonic)
        .with_context(|| format!("line {lineno}: unknown mnemonic '{mnemonic}'"))?;
    let operand = match fields.next() {
        Some(text) => text
            .parse()
            .with_context(|| format!("line {lineno}: bad operand '{text}'"))?,
        None => 0,
    };
    Ok(Instruction::new(opcode, operand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::disassemble;

    #[test]
    fn test_assemble_minimal_listing() {
        let listing = concat!(
            "; hand-written\n",
            ".const 0 5\n",
            ".line 10 0\n",
            ".code\n",
            "PUSH_CONST 0\n",
            "PRINT_NUM\n",
            "PRINT_NEWLINE\n",
        );
        let program = assemble(listing).unwrap();
        assert_eq!(program.const_pool, vec![5.0]);
        assert_eq!(program.code.len(), 3);
        assert_eq!(program.code[0].opcode(), Some(Opcode::PushConst));
    }

    #[test]
    fn test_unknown_mnemonic_is_error() {
        let err = assemble(".code\nFLY 1\n").unwrap_err();
        assert!(err.to_string().contains("unknown mnemonic"));
    }

    #[test]
    fn test_code_before_dot_code_is_error() {
        assert!(assemble("PUSH_CONST 0\n").is_err());
    }

    #[test]
    fn test_quoted_strings_with_escapes() {
        let program = assemble(".string 0 \"say \\\"hi\\\"\"\n.code\n").unwrap();
        assert_eq!(program.string_pool, vec!["say \"hi\"".to_string()]);
    }

    #[test]
    fn test_round_trip_through_listing() {
        // Compile a real program, list it, and assemble the listing:
        // the result must be semantically identical.
        let handler = abc_util::Handler::new();
        let ast = {
            let mut parser = abc_par::Parser::new(
                concat!(
                    "10 DIM A(5)\n",
                    "20 DATA 1,\"TWO\",,3\n",
                    "30 READ A(0),B$,C,D\n",
                    "40 FOR I=1 TO 3 : PRINT I;B$ : NEXT I\n",
                    "50 ON C GOTO 60,70\n",
                    "60 END\n",
                    "70 END\n",
                ),
                &handler,
            );
            parser.parse_program()
        };
        assert!(!handler.has_errors());
        let program = abc_gen::compile(&ast).unwrap();

        let mut listing = Vec::new();
        disassemble(&program, &mut listing).unwrap();
        let rebuilt = assemble(std::str::from_utf8(&listing).unwrap()).unwrap();

        assert_eq!(rebuilt, program);
    }
}
