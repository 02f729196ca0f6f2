//! The compiled program container and its component records.

use static_assertions::const_assert_eq;

use crate::opcode::Opcode;

/// One fixed-width instruction.
///
/// `operand` semantics depend on the opcode: pool index, variable
/// slot, PC target, or count. `flags` is reserved (type hints for a
/// future tiering compiler) and currently always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Instruction {
    pub opcode: u8,
    pub flags: u8,
    pub operand: u16,
}

const_assert_eq!(std::mem::size_of::<Instruction>(), 4);

impl Instruction {
    pub fn new(opcode: Opcode, operand: u16) -> Self {
        Self {
            opcode: opcode as u8,
            flags: 0,
            operand,
        }
    }

    /// Raw jump-table slot: a `NOP` carrying a PC in its operand, used
    /// after `ON_GOTO`/`ON_GOSUB`.
    pub fn raw(operand: u16) -> Self {
        Self::new(Opcode::Nop, operand)
    }

    pub fn opcode(self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}

/// Variable storage classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum VarType {
    Numeric = 0,
    String = 1,
    Array1D = 2,
    Array2D = 3,
}

impl VarType {
    pub fn from_u8(byte: u8) -> Option<VarType> {
        match byte {
            0 => Some(VarType::Numeric),
            1 => Some(VarType::String),
            2 => Some(VarType::Array1D),
            3 => Some(VarType::Array2D),
            _ => None,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, VarType::Array1D | VarType::Array2D)
    }
}

/// Symbol table entry. `slot` always equals the entry's index; the VM
/// uses it to address its parallel variable arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct VarInfo {
    pub name: String,
    pub slot: u16,
    pub ty: VarType,
    /// Declared first dimension, when DIMed with a constant.
    pub dim1: u16,
    /// Declared second dimension, for 2D arrays.
    pub dim2: u16,
}

/// One line-map entry: the PC of the first instruction a BASIC line
/// produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineMapping {
    pub line: u16,
    pub pc: u32,
}

/// Kind tag of a DATA entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DataKind {
    Numeric = 0,
    String = 1,
    /// The empty form in `DATA 1,,3`; READ converts it to 0 or `""`.
    Null = 2,
}

impl DataKind {
    pub fn from_u8(byte: u8) -> Option<DataKind> {
        match byte {
            0 => Some(DataKind::Numeric),
            1 => Some(DataKind::String),
            2 => Some(DataKind::Null),
            _ => None,
        }
    }
}

/// One DATA entry; `index` points into the numeric or string DATA
/// pool according to `kind` (unused for nulls).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataEntry {
    pub kind: DataKind,
    pub index: u32,
}

/// The durable hand-off artifact between compiler and VM, and the
/// payload of a `.abc` image.
///
/// Invariants the compiler guarantees and the VM relies on:
/// every pool/slot operand is in range, `line_map` is strictly
/// increasing on `line` with one entry per line that produced code,
/// and every constant-PC jump target lands inside `code`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledProgram {
    pub code: Vec<Instruction>,
    /// Interned numeric constants (deduplicated by bit equality).
    pub const_pool: Vec<f64>,
    /// Interned string constants.
    pub string_pool: Vec<String>,
    pub var_table: Vec<VarInfo>,
    pub line_map: Vec<LineMapping>,
    pub data_numeric: Vec<f64>,
    pub data_strings: Vec<String>,
    pub data_entries: Vec<DataEntry>,
}

impl CompiledProgram {
    /// PC of the first instruction of `line`, by binary search.
    pub fn find_line(&self, line: u16) -> Option<u32> {
        self.line_map
            .binary_search_by_key(&line, |m| m.line)
            .ok()
            .map(|i| self.line_map[i].pc)
    }

    /// Slot of a variable by name.
    pub fn find_variable(&self, name: &str) -> Option<u16> {
        self.var_table
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.slot)
    }

    /// Variable name for a slot, for diagnostics.
    pub fn var_name(&self, slot: u16) -> &str {
        self.var_table
            .get(slot as usize)
            .map(|v| v.name.as_str())
            .unwrap_or("?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_layout() {
        let inst = Instruction::new(Opcode::PushConst, 7);
        assert_eq!(inst.opcode, 0x00);
        assert_eq!(inst.flags, 0);
        assert_eq!(inst.operand, 7);
        assert_eq!(inst.opcode(), Some(Opcode::PushConst));
    }

    #[test]
    fn test_raw_instruction_is_nop() {
        let inst = Instruction::raw(42);
        assert_eq!(inst.opcode(), Some(Opcode::Nop));
        assert_eq!(inst.operand, 42);
    }

    #[test]
    fn test_find_line_binary_search() {
        let prog = CompiledProgram {
            line_map: vec![
                LineMapping { line: 10, pc: 0 },
                LineMapping { line: 20, pc: 4 },
                LineMapping { line: 100, pc: 9 },
            ],
            ..Default::default()
        };
        assert_eq!(prog.find_line(10), Some(0));
        assert_eq!(prog.find_line(100), Some(9));
        assert_eq!(prog.find_line(15), None);
    }

    #[test]
    fn test_var_lookup() {
        let prog = CompiledProgram {
            var_table: vec![VarInfo {
                name: "A$".to_string(),
                slot: 0,
                ty: VarType::String,
                dim1: 0,
                dim2: 0,
            }],
            ..Default::default()
        };
        assert_eq!(prog.find_variable("A$"), Some(0));
        assert_eq!(prog.find_variable("B"), None);
        assert_eq!(prog.var_name(0), "A$");
        assert_eq!(prog.var_name(9), "?");
    }

    #[test]
    fn test_var_type_decoding() {
        assert_eq!(VarType::from_u8(2), Some(VarType::Array1D));
        assert_eq!(VarType::from_u8(9), None);
        assert!(VarType::Array2D.is_array());
        assert!(!VarType::String.is_array());
    }

    #[test]
    fn test_data_kind_decoding() {
        assert_eq!(DataKind::from_u8(2), Some(DataKind::Null));
        assert_eq!(DataKind::from_u8(3), None);
    }
}
