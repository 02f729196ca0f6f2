//! abc-img - The `.abc` binary image codec.
//!
//! Layout (all little-endian):
//!
//! ```text
//! Header: magic "ABC\0" | version u16 | reserved u16
//! Sections, each a u32 count followed by its payload:
//!   1. code         : count x { opcode u8, flags u8, operand u16 }
//!   2. const_pool   : count x f64
//!   3. string_pool  : count x { len u32, bytes }
//!   4. var_table    : count x { name, slot u16, type u8, dim1 u16, dim2 u16 }
//!   5. line_map     : count x { line u16, pc u32 }
//!   6. data_numeric : count x f64
//!   7. data_string  : count x { len u32, bytes }
//!   8. data_entries : count x { kind u8, pool_index u32 }
//! ```
//!
//! Readers reject a mismatched magic or version outright; a newer
//! writer must bump [`VERSION`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use abc_byt::{CompiledProgram, DataEntry, DataKind, Instruction, LineMapping, VarInfo, VarType};

/// File magic, including the terminating NUL.
pub const MAGIC: [u8; 4] = *b"ABC\0";

/// Current image format version.
pub const VERSION: u16 = 1;

/// Errors from reading or writing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file format (bad magic)")]
    BadMagic,

    #[error("unsupported file version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid variable type {0}")]
    InvalidVarType(u8),

    #[error("invalid data entry kind {0}")]
    InvalidDataKind(u8),

    #[error("invalid string encoding in image")]
    InvalidString,
}

/// Write a program as an image to any sink.
pub fn write<W: Write>(writer: &mut W, program: &CompiledProgram) -> Result<(), ImageError> {
    writer.write_all(&MAGIC)?;
    writer.write_u16::<LittleEndian>(VERSION)?;
    writer.write_u16::<LittleEndian>(0)?;

    // Section 1: code.
    writer.write_u32::<LittleEndian>(program.code.len() as u32)?;
    for inst in &program.code {
        writer.write_u8(inst.opcode)?;
        writer.write_u8(inst.flags)?;
        writer.write_u16::<LittleEndian>(inst.operand)?;
    }

    // Section 2: constant pool.
    writer.write_u32::<LittleEndian>(program.const_pool.len() as u32)?;
    for &value in &program.const_pool {
        writer.write_f64::<LittleEndian>(value)?;
    }

    // Section 3: string pool.
    writer.write_u32::<LittleEndian>(program.string_pool.len() as u32)?;
    for text in &program.string_pool {
        write_string(writer, text)?;
    }

    // Section 4: variable table.
    writer.write_u32::<LittleEndian>(program.var_table.len() as u32)?;
    for var in &program.var_table {
        write_string(writer, &var.name)?;
        writer.write_u16::<LittleEndian>(var.slot)?;
        writer.write_u8(var.ty as u8)?;
        writer.write_u16::<LittleEndian>(var.dim1)?;
        writer.write_u16::<LittleEndian>(var.dim2)?;
    }

    // Section 5: line map.
    writer.write_u32::<LittleEndian>(program.line_map.len() as u32)?;
    for mapping in &program.line_map {
        writer.write_u16::<LittleEndian>(mapping.line)?;
        writer.write_u32::<LittleEndian>(mapping.pc)?;
    }

    // Section 6: DATA numeric pool.
    writer.write_u32::<LittleEndian>(program.data_numeric.len() as u32)?;
    for &value in &program.data_numeric {
        writer.write_f64::<LittleEndian>(value)?;
    }

    // Section 7: DATA string pool.
    writer.write_u32::<LittleEndian>(program.data_strings.len() as u32)?;
    for text in &program.data_strings {
        write_string(writer, text)?;
    }

    // Section 8: DATA entries.
    writer.write_u32::<LittleEndian>(program.data_entries.len() as u32)?;
    for entry in &program.data_entries {
        writer.write_u8(entry.kind as u8)?;
        writer.write_u32::<LittleEndian>(entry.index)?;
    }

    Ok(())
}

/// Read an image from any source.
pub fn read<R: Read>(reader: &mut R) -> Result<CompiledProgram, ImageError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(ImageError::BadMagic);
    }
    let version = reader.read_u16::<LittleEndian>()?;
    if version != VERSION {
        return Err(ImageError::UnsupportedVersion(version));
    }
    let _reserved = reader.read_u16::<LittleEndian>()?;

    let mut program = CompiledProgram::default();

    // Section 1: code.
    let count = reader.read_u32::<LittleEndian>()?;
    program.code.reserve(count as usize);
    for _ in 0..count {
        let opcode = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let operand = reader.read_u16::<LittleEndian>()?;
        program.code.push(Instruction {
            opcode,
            flags,
            operand,
        });
    }

    // Section 2: constant pool.
    let count = reader.read_u32::<LittleEndian>()?;
    for _ in 0..count {
        program.const_pool.push(reader.read_f64::<LittleEndian>()?);
    }

    // Section 3: string pool.
    let count = reader.read_u32::<LittleEndian>()?;
    for _ in 0..count {
        program.string_pool.push(read_string(reader)?);
    }

    // Section 4: variable table.
    let count = reader.read_u32::<LittleEndian>()?;
    for _ in 0..count {
        let name = read_string(reader)?;
        let slot = reader.read_u16::<LittleEndian>()?;
        let ty_byte = reader.read_u8()?;
        let ty = VarType::from_u8(ty_byte).ok_or(ImageError::InvalidVarType(ty_byte))?;
        let dim1 = reader.read_u16::<LittleEndian>()?;
        let dim2 = reader.read_u16::<LittleEndian>()?;
        program.var_table.push(VarInfo {
            name,
            slot,
            ty,
            dim1,
            dim2,
        });
    }

    // Section 5: line map.
    let count = reader.read_u32::<LittleEndian>()?;
    for _ in 0..count {
        let line = reader.read_u16::<LittleEndian>()?;
        let pc = reader.read_u32::<LittleEndian>()?;
        program.line_map.push(LineMapping { line, pc });
    }

    // Section 6: DATA numeric pool.
    let count = reader.read_u32::<LittleEndian>()?;
    for _ in 0..count {
        program
            .data_numeric
            .push(reader.read_f64::<LittleEndian>()?);
    }

    // Section 7: DATA string pool.
    let count = reader.read_u32::<LittleEndian>()?;
    for _ in 0..count {
        program.data_strings.push(read_string(reader)?);
    }

    // Section 8: DATA entries.
    let count = reader.read_u32::<LittleEndian>()?;
    for _ in 0..count {
        let kind_byte = reader.read_u8()?;
        let kind = DataKind::from_u8(kind_byte).ok_or(ImageError::InvalidDataKind(kind_byte))?;
        let index = reader.read_u32::<LittleEndian>()?;
        program.data_entries.push(DataEntry { kind, index });
    }

    Ok(program)
}

fn write_string<W: Write>(writer: &mut W, text: &str) -> Result<(), ImageError> {
    writer.write_u32::<LittleEndian>(text.len() as u32)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, ImageError> {
    let len = reader.read_u32::<LittleEndian>()?;
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| ImageError::InvalidString)
}

/// Extension trait mirroring `byteorder`'s style for image sources.
pub trait ReadImageExt: Read + Sized {
    fn read_image(&mut self) -> Result<CompiledProgram, ImageError> {
        read(self)
    }
}

impl<R: Read + Sized> ReadImageExt for R {}

/// Extension trait for image sinks.
pub trait WriteImageExt: Write + Sized {
    fn write_image(&mut self, program: &CompiledProgram) -> Result<(), ImageError> {
        write(self, program)
    }
}

impl<W: Write + Sized> WriteImageExt for W {}

/// Load an image from disk.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<CompiledProgram, ImageError> {
    BufReader::new(File::open(path)?).read_image()
}

/// Save an image to disk.
pub fn write_file<P: AsRef<Path>>(path: P, program: &CompiledProgram) -> Result<(), ImageError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_image(program)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use abc_byt::Opcode;

    fn sample_program() -> CompiledProgram {
        CompiledProgram {
            code: vec![
                Instruction::new(Opcode::PushConst, 0),
                Instruction::new(Opcode::PrintNum, 0),
                Instruction::new(Opcode::PrintNewline, 0),
                Instruction::raw(0x1234),
            ],
            const_pool: vec![3.25, -1.0e10],
            string_pool: vec!["HELLO".to_string(), String::new()],
            var_table: vec![
                VarInfo {
                    name: "A".to_string(),
                    slot: 0,
                    ty: VarType::Numeric,
                    dim1: 0,
                    dim2: 0,
                },
                VarInfo {
                    name: "GRID".to_string(),
                    slot: 1,
                    ty: VarType::Array2D,
                    dim1: 3,
                    dim2: 4,
                },
            ],
            line_map: vec![
                LineMapping { line: 10, pc: 0 },
                LineMapping { line: 20, pc: 3 },
            ],
            data_numeric: vec![1.0],
            data_strings: vec!["A".to_string()],
            data_entries: vec![
                DataEntry {
                    kind: DataKind::Numeric,
                    index: 0,
                },
                DataEntry {
                    kind: DataKind::String,
                    index: 0,
                },
                DataEntry {
                    kind: DataKind::Null,
                    index: 0,
                },
            ],
        }
    }

    #[test]
    fn test_round_trip_in_memory() {
        let program = sample_program();
        let mut buffer = Vec::new();
        write(&mut buffer, &program).unwrap();
        let loaded = read(&mut buffer.as_slice()).unwrap();
        assert_eq!(loaded, program);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.abc");
        let program = sample_program();
        write_file(&path, &program).unwrap();
        let loaded = read_file(&path).unwrap();
        assert_eq!(loaded, program);
    }

    #[test]
    fn test_header_layout() {
        let mut buffer = Vec::new();
        write(&mut buffer, &CompiledProgram::default()).unwrap();
        assert_eq!(&buffer[0..4], b"ABC\0");
        assert_eq!(&buffer[4..6], &[1, 0]); // version 1, little-endian
        assert_eq!(&buffer[6..8], &[0, 0]); // reserved
    }

    #[test]
    fn test_empty_program_is_header_plus_counts() {
        let mut buffer = Vec::new();
        write(&mut buffer, &CompiledProgram::default()).unwrap();
        // 8-byte header plus eight u32 section counts.
        assert_eq!(buffer.len(), 8 + 8 * 4);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buffer = Vec::new();
        write(&mut buffer, &CompiledProgram::default()).unwrap();
        buffer[0] = b'X';
        assert!(matches!(
            read(&mut buffer.as_slice()),
            Err(ImageError::BadMagic)
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut buffer = Vec::new();
        write(&mut buffer, &CompiledProgram::default()).unwrap();
        buffer[4] = 9;
        assert!(matches!(
            read(&mut buffer.as_slice()),
            Err(ImageError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_image_is_io_error() {
        let mut buffer = Vec::new();
        write(&mut buffer, &sample_program()).unwrap();
        buffer.truncate(buffer.len() / 2);
        assert!(matches!(
            read(&mut buffer.as_slice()),
            Err(ImageError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_var_type_rejected() {
        let program = sample_program();
        let mut buffer = Vec::new();
        write(&mut buffer, &program).unwrap();
        // The var table's first type byte follows its name ("A"):
        // locate it by searching for the name length prefix.
        let name_at = buffer
            .windows(5)
            .position(|w| w == [1, 0, 0, 0, b'A'])
            .unwrap();
        let ty_at = name_at + 5 + 2; // skip len+name, slot u16
        buffer[ty_at] = 7;
        assert!(matches!(
            read(&mut buffer.as_slice()),
            Err(ImageError::InvalidVarType(7))
        ));
    }
}
