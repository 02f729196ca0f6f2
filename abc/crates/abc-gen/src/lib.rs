//! abc-gen - AST to bytecode compiler.
//!
//! Two passes over the parse tree:
//!
//! 1. **Variable discovery** walks the whole tree registering every
//!    referenced identifier. Slots are assigned in discovery order and
//!    stay stable; type comes from the name (`$` means string) or from
//!    DIM (arrays). Per-class limits match the classic interpreters:
//!    128 numeric, 128 string, 64 arrays.
//! 2. **Code generation** emits one fixed-width instruction stream.
//!    Each BASIC line records the PC of its first instruction in the
//!    line map. Backward jump targets resolve immediately; forward
//!    targets emit a `0xFFFF` placeholder and a fixup record, and a
//!    final pass patches them from the finished line map.
//!
//! Expression lowering is a post-order walk producing pure stack
//! code; constants and strings are interned into deduplicated pools
//! on the way.

mod stmt;

use indexmap::IndexMap;
use thiserror::Error;

use abc_byt::{
    CompiledProgram, DataEntry, DataKind, Instruction, LineMapping, Opcode, VarInfo, VarType,
};
use abc_lex::TokenKind;
use abc_par::grammar::is_string_function;
use abc_par::{Node, NodeKind};

/// Per-class variable limits (Atari BASIC compatibility).
pub const MAX_NUMERIC_VARS: usize = 128;
pub const MAX_STRING_VARS: usize = 128;
pub const MAX_ARRAYS: usize = 64;

/// Errors that abort code generation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A jump fixup named a line the program never defined.
    #[error("Undefined line number: {0}")]
    UndefinedLine(u16),

    /// A variable class ran out of slots.
    #[error("Too many {class} (maximum {max}); variable '{name}' cannot be allocated")]
    TooManyVariables {
        class: &'static str,
        max: usize,
        name: String,
    },

    /// RANDOMIZE was written without a seed expression.
    #[error("RANDOMIZE requires an argument")]
    RandomizeWithoutArgument,
}

/// Compile a parse tree into a [`CompiledProgram`].
///
/// `root` is the pseudo-statement produced by the parser; its
/// children are the program's statements in source order.
pub fn compile(root: &Node) -> Result<CompiledProgram, CompileError> {
    let mut cg = Codegen::default();
    cg.discover(root)?;
    for stmt in &root.children {
        if stmt.kind != NodeKind::Statement {
            continue;
        }
        cg.begin_line(stmt.line);
        cg.compile_statement(stmt)?;
    }
    cg.resolve_fixups()?;
    Ok(cg.finish())
}

/// Static value type of an expression node.
///
/// Used by PRINT to choose between `PRINT_NUM` and `PRINT_STR`. The
/// walk is recursive: comparisons yield numbers even over string
/// operands, and wrapper nodes are looked through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Str,
}

pub fn static_type(node: &Node) -> ValueKind {
    match node.kind {
        NodeKind::Constant => {
            if node.token == TokenKind::String {
                ValueKind::Str
            } else {
                ValueKind::Numeric
            }
        }
        NodeKind::Variable => {
            if node.is_string_name() {
                ValueKind::Str
            } else {
                ValueKind::Numeric
            }
        }
        NodeKind::FunctionCall => {
            if is_string_function(node.token) {
                ValueKind::Str
            } else {
                ValueKind::Numeric
            }
        }
        NodeKind::Expression if node.children.len() == 1 => static_type(&node.children[0]),
        _ => ValueKind::Numeric,
    }
}

/// Descend through single-child rule-wrapper nodes.
pub(crate) fn unwrap_expr(node: &Node) -> &Node {
    let mut node = node;
    while node.kind == NodeKind::Expression && node.children.len() == 1 {
        node = &node.children[0];
    }
    node
}

/// First variable node in a subtree, depth-first.
pub(crate) fn find_variable_node(node: &Node) -> Option<&Node> {
    if node.kind == NodeKind::Variable {
        return Some(node);
    }
    node.children.iter().find_map(find_variable_node)
}

/// First string constant in a subtree, depth-first.
pub(crate) fn find_string_constant(node: &Node) -> Option<&Node> {
    if node.kind == NodeKind::Constant && node.token == TokenKind::String {
        return Some(node);
    }
    node.children.iter().find_map(find_string_constant)
}

struct SlotInfo {
    ty: VarType,
    dim1: u16,
    dim2: u16,
}

struct Fixup {
    pc: usize,
    target: u16,
}

#[derive(Default)]
pub(crate) struct Codegen {
    code: Vec<Instruction>,
    /// Numeric constants keyed by bit pattern; position is the index.
    consts: IndexMap<u64, f64>,
    strings: IndexMap<String, ()>,
    vars: IndexMap<String, SlotInfo>,
    line_map: Vec<LineMapping>,
    data_numeric: Vec<f64>,
    data_strings: Vec<String>,
    data_entries: Vec<DataEntry>,
    fixups: Vec<Fixup>,
}

impl Codegen {
    // =========================================================================
    // EMISSION AND INTERNING
    // =========================================================================

    pub(crate) fn emit(&mut self, opcode: Opcode, operand: u16) {
        self.code.push(Instruction::new(opcode, operand));
    }

    pub(crate) fn emit0(&mut self, opcode: Opcode) {
        self.emit(opcode, 0);
    }

    /// Raw jump-table slot for ON GOTO/GOSUB target lists.
    pub(crate) fn emit_raw(&mut self, operand: u16) {
        self.code.push(Instruction::raw(operand));
    }

    pub(crate) fn pc(&self) -> usize {
        self.code.len()
    }

    /// Patch a placeholder operand to the current PC.
    pub(crate) fn patch_here(&mut self, at: usize) {
        let target = self.code.len() as u16;
        self.code[at].operand = target;
    }

    pub(crate) fn intern_const(&mut self, value: f64) -> u16 {
        let (index, _) = self.consts.insert_full(value.to_bits(), value);
        index as u16
    }

    pub(crate) fn intern_string(&mut self, text: &str) -> u16 {
        if let Some(index) = self.strings.get_index_of(text) {
            return index as u16;
        }
        let (index, _) = self.strings.insert_full(text.to_string(), ());
        index as u16
    }

    // =========================================================================
    // VARIABLES
    // =========================================================================

    pub(crate) fn variable_slot(&mut self, node: &Node) -> Result<u16, CompileError> {
        let ty = if node.is_string_name() {
            VarType::String
        } else {
            VarType::Numeric
        };
        self.add_variable(node.text(), ty)
    }

    pub(crate) fn add_variable(&mut self, name: &str, ty: VarType) -> Result<u16, CompileError> {
        if let Some(index) = self.vars.get_index_of(name) {
            return Ok(index as u16);
        }

        let (class, max) = match ty {
            VarType::Numeric => ("numeric variables", MAX_NUMERIC_VARS),
            VarType::String => ("string variables", MAX_STRING_VARS),
            VarType::Array1D | VarType::Array2D => ("arrays", MAX_ARRAYS),
        };
        let count = self
            .vars
            .values()
            .filter(|slot| class_index(slot.ty) == class_index(ty))
            .count();
        if count >= max {
            return Err(CompileError::TooManyVariables {
                class,
                max,
                name: name.to_string(),
            });
        }

        let (index, _) = self.vars.insert_full(
            name.to_string(),
            SlotInfo {
                ty,
                dim1: 0,
                dim2: 0,
            },
        );
        Ok(index as u16)
    }

    /// Register a DIM target, keeping declared constant dimensions in
    /// the symbol table.
    pub(crate) fn add_array(
        &mut self,
        name: &str,
        is_2d: bool,
        dim1: Option<u16>,
        dim2: Option<u16>,
    ) -> Result<u16, CompileError> {
        let ty = if is_2d {
            VarType::Array2D
        } else {
            VarType::Array1D
        };
        let slot = self.add_variable(name, ty)?;
        if let Some(info) = self.vars.get_index_mut(slot as usize).map(|(_, v)| v) {
            if info.ty.is_array() {
                info.dim1 = dim1.unwrap_or(info.dim1);
                info.dim2 = dim2.unwrap_or(info.dim2);
            }
        }
        Ok(slot)
    }

    // =========================================================================
    // PHASE 1: VARIABLE DISCOVERY
    // =========================================================================

    fn discover(&mut self, node: &Node) -> Result<(), CompileError> {
        if node.kind == NodeKind::Statement && node.token == TokenKind::Dim {
            self.discover_dim(node)?;
        }
        if node.kind == NodeKind::Variable {
            self.variable_slot(node)?;
        }
        for child in &node.children {
            self.discover(child)?;
        }
        Ok(())
    }

    /// DIM targets become arrays before the generic walk can register
    /// them as scalars.
    fn discover_dim(&mut self, stmt: &Node) -> Result<(), CompileError> {
        let mut list = stmt.children.first();
        while let Some(node) = list {
            let Some(item) = node.children.first() else {
                break;
            };
            if let Some((name, is_2d, dim1, dim2)) = dim_item_shape(item) {
                self.add_array(name, is_2d, dim1, dim2)?;
            }
            list = node.children.get(1).and_then(|tail| tail.children.get(1));
        }
        Ok(())
    }

    // =========================================================================
    // LINE MAP AND FIXUPS
    // =========================================================================

    /// Record the line map entry for a new BASIC line. Statements
    /// sharing a line map to its first instruction.
    fn begin_line(&mut self, line: u16) {
        if self.line_map.last().map_or(true, |m| m.line != line) {
            self.line_map.push(LineMapping {
                line,
                pc: self.code.len() as u32,
            });
        }
    }

    pub(crate) fn find_line(&self, line: u16) -> Option<u32> {
        self.line_map
            .binary_search_by_key(&line, |m| m.line)
            .ok()
            .map(|i| self.line_map[i].pc)
    }

    /// Emit an instruction whose operand is the PC of a BASIC line,
    /// deferring unresolved targets to the fixup pass.
    pub(crate) fn emit_line_target(&mut self, opcode: Opcode, line: u16) {
        match self.find_line(line) {
            Some(pc) => self.emit(opcode, pc as u16),
            None => {
                let at = self.code.len();
                self.emit(opcode, 0xFFFF);
                self.fixups.push(Fixup { pc: at, target: line });
            }
        }
    }

    /// Raw jump-table slot targeting a BASIC line.
    pub(crate) fn emit_raw_line_target(&mut self, line: u16) {
        match self.find_line(line) {
            Some(pc) => self.emit_raw(pc as u16),
            None => {
                let at = self.code.len();
                self.emit_raw(0xFFFF);
                self.fixups.push(Fixup { pc: at, target: line });
            }
        }
    }

    fn resolve_fixups(&mut self) -> Result<(), CompileError> {
        for i in 0..self.fixups.len() {
            let Fixup { pc, target } = self.fixups[i];
            let Some(resolved) = self.find_line(target) else {
                return Err(CompileError::UndefinedLine(target));
            };
            self.code[pc].operand = resolved as u16;
        }
        Ok(())
    }

    // =========================================================================
    // EXPRESSION LOWERING
    // =========================================================================

    /// Post-order expression compilation onto the value/string stacks.
    pub(crate) fn compile_expr(&mut self, node: &Node) -> Result<(), CompileError> {
        match node.kind {
            NodeKind::Constant => {
                if node.token == TokenKind::String {
                    let index = self.intern_string(node.text());
                    self.emit(Opcode::StrPush, index);
                } else {
                    let index = self.intern_const(node.value);
                    self.emit(Opcode::PushConst, index);
                }
            }
            NodeKind::Variable => self.compile_variable_read(node)?,
            NodeKind::Operator => self.compile_operator(node)?,
            NodeKind::FunctionCall => self.compile_function(node)?,
            NodeKind::Expression => match node.children.len() {
                0 => {
                    let index = self.intern_const(0.0);
                    self.emit(Opcode::PushConst, index);
                }
                1 => self.compile_expr(&node.children[0])?,
                _ => {
                    // Rule wrapper with several children: compile the
                    // operator child if one exists, otherwise each
                    // child in order.
                    if let Some(op) = node
                        .children
                        .iter()
                        .find(|c| c.kind == NodeKind::Operator && !c.children.is_empty())
                    {
                        self.compile_expr(op)?;
                    } else {
                        for child in &node.children {
                            self.compile_expr(child)?;
                        }
                    }
                }
            },
            NodeKind::Statement | NodeKind::Assignment => {}
        }
        Ok(())
    }

    fn compile_variable_read(&mut self, node: &Node) -> Result<(), CompileError> {
        let slot = self.variable_slot(node)?;
        let is_string = node.is_string_name();

        if node.children.is_empty() {
            self.emit(
                if is_string {
                    Opcode::StrPushVar
                } else {
                    Opcode::PushVar
                },
                slot,
            );
            return Ok(());
        }

        self.compile_expr(&node.children[0])?;
        if node.children.len() > 1 {
            self.compile_expr(&node.children[1])?;
            self.emit(
                if is_string {
                    Opcode::StrArrayGet2D
                } else {
                    Opcode::ArrayGet2D
                },
                slot,
            );
        } else {
            self.emit(
                if is_string {
                    Opcode::StrArrayGet1D
                } else {
                    Opcode::ArrayGet1D
                },
                slot,
            );
        }
        Ok(())
    }

    fn compile_operator(&mut self, node: &Node) -> Result<(), CompileError> {
        if node.children.len() >= 2 {
            self.compile_expr(&node.children[0])?;
            self.compile_expr(&node.children[1])?;
            let opcode = match node.token {
                TokenKind::Plus => Opcode::Add,
                TokenKind::Minus => Opcode::Sub,
                TokenKind::Star => Opcode::Mul,
                TokenKind::Slash => Opcode::Div,
                TokenKind::Caret => Opcode::Pow,
                TokenKind::Eq => Opcode::Eq,
                TokenKind::NotEq => Opcode::Ne,
                TokenKind::Less => Opcode::Lt,
                TokenKind::LessEq => Opcode::Le,
                TokenKind::Greater => Opcode::Gt,
                TokenKind::GreaterEq => Opcode::Ge,
                TokenKind::And => Opcode::And,
                TokenKind::Or => Opcode::Or,
                _ => return Ok(()),
            };
            self.emit0(opcode);
        } else if node.children.len() == 1 {
            self.compile_expr(&node.children[0])?;
            match node.token {
                TokenKind::Minus => self.emit0(Opcode::Neg),
                TokenKind::Not => self.emit0(Opcode::Not),
                _ => {}
            }
        }
        Ok(())
    }

    fn compile_function(&mut self, node: &Node) -> Result<(), CompileError> {
        for child in &node.children {
            self.compile_expr(child)?;
        }
        let opcode = match node.token {
            TokenKind::Sin => Opcode::FuncSin,
            TokenKind::Cos => Opcode::FuncCos,
            TokenKind::Atn => Opcode::FuncAtn,
            TokenKind::ExpFn => Opcode::FuncExp,
            TokenKind::Log => Opcode::FuncLog,
            TokenKind::Clog => Opcode::FuncClog,
            TokenKind::Sqr => Opcode::FuncSqr,
            TokenKind::Abs => Opcode::FuncAbs,
            TokenKind::Int => Opcode::FuncInt,
            TokenKind::Rnd => Opcode::FuncRnd,
            TokenKind::Sgn => Opcode::FuncSgn,
            TokenKind::Peek => Opcode::FuncPeek,
            TokenKind::LeftFn => Opcode::StrLeft,
            TokenKind::RightFn => Opcode::StrRight,
            // MID$ selects the two- or three-argument form by arity.
            TokenKind::MidFn => {
                if node.children.len() == 2 {
                    Opcode::StrMid2
                } else {
                    Opcode::StrMid
                }
            }
            TokenKind::Len => Opcode::StrLen,
            TokenKind::ChrFn => Opcode::StrChr,
            TokenKind::Asc => Opcode::StrAsc,
            TokenKind::StrFn => Opcode::StrStr,
            TokenKind::Val => Opcode::StrVal,
            TokenKind::Tab => Opcode::TabFunc,
            // Hardware queries with no machine behind them read as 0.
            TokenKind::Fre
            | TokenKind::Paddle
            | TokenKind::Stick
            | TokenKind::Ptrig
            | TokenKind::Strig
            | TokenKind::Adr => {
                self.emit0(Opcode::Pop);
                let index = self.intern_const(0.0);
                self.emit(Opcode::PushConst, index);
                return Ok(());
            }
            _ => return Ok(()),
        };
        self.emit0(opcode);
        Ok(())
    }

    // =========================================================================
    // DATA POOLS
    // =========================================================================

    pub(crate) fn push_data_numeric(&mut self, value: f64) {
        let index = self.data_numeric.len() as u32;
        self.data_numeric.push(value);
        self.data_entries.push(DataEntry {
            kind: DataKind::Numeric,
            index,
        });
    }

    pub(crate) fn push_data_string(&mut self, text: &str) {
        let index = self.data_strings.len() as u32;
        self.data_strings.push(text.to_string());
        self.data_entries.push(DataEntry {
            kind: DataKind::String,
            index,
        });
    }

    pub(crate) fn push_data_null(&mut self) {
        self.data_entries.push(DataEntry {
            kind: DataKind::Null,
            index: 0,
        });
    }

    // =========================================================================
    // FINALIZATION
    // =========================================================================

    fn finish(self) -> CompiledProgram {
        let var_table = self
            .vars
            .into_iter()
            .enumerate()
            .map(|(slot, (name, info))| VarInfo {
                name,
                slot: slot as u16,
                ty: info.ty,
                dim1: info.dim1,
                dim2: info.dim2,
            })
            .collect();

        CompiledProgram {
            code: self.code,
            const_pool: self.consts.into_values().collect(),
            string_pool: self.strings.into_keys().collect(),
            var_table,
            line_map: self.line_map,
            data_numeric: self.data_numeric,
            data_strings: self.data_strings,
            data_entries: self.data_entries,
        }
    }
}

fn class_index(ty: VarType) -> u8 {
    match ty {
        VarType::Numeric => 0,
        VarType::String => 1,
        VarType::Array1D | VarType::Array2D => 2,
    }
}

/// Decompose a DIM list item into `(name, is_2d, dim1, dim2)`.
///
/// The item's rule shape is `[variable, '(', dim1, tail, ')']` where a
/// non-empty tail holds the second dimension.
fn dim_item_shape(item: &Node) -> Option<(&str, bool, Option<u16>, Option<u16>)> {
    if item.children.len() < 5 {
        return None;
    }
    let var = find_variable_node(&item.children[0])?;
    let dim1 = unwrap_expr(&item.children[2]);
    let dim2 = item.children.get(3).and_then(|tail| tail.children.get(1));

    let const_dim = |node: &Node| {
        let node = unwrap_expr(node);
        (node.kind == NodeKind::Constant && node.token == TokenKind::Number)
            .then_some(node.value as u16)
    };

    Some((
        var.text(),
        dim2.is_some(),
        const_dim(dim1),
        dim2.and_then(|n| const_dim(n)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use abc_util::Handler;

    pub(crate) fn compile_source(source: &str) -> CompiledProgram {
        let handler = Handler::new();
        let program = {
            let mut parser = abc_par::Parser::new(source, &handler);
            parser.parse_program()
        };
        assert!(
            !handler.has_errors(),
            "parse errors: {:?}",
            handler
                .diagnostics()
                .iter()
                .map(|d| d.message.clone())
                .collect::<Vec<_>>()
        );
        compile(&program).expect("compilation should succeed")
    }

    fn opcodes(program: &CompiledProgram) -> Vec<Opcode> {
        program
            .code
            .iter()
            .map(|i| i.opcode().expect("valid opcode"))
            .collect()
    }

    // =========================================================================
    // EXPRESSION LOWERING
    // =========================================================================

    #[test]
    fn test_hello_lowering() {
        let program = compile_source("10 PRINT \"HELLO\"\n");
        assert_eq!(
            opcodes(&program),
            vec![Opcode::StrPush, Opcode::PrintStr, Opcode::PrintNewline]
        );
        assert_eq!(program.string_pool, vec!["HELLO".to_string()]);
    }

    #[test]
    fn test_arithmetic_is_postorder() {
        let program = compile_source("10 A = 2 + 3 * 4\n");
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::PushConst,
                Opcode::PushConst,
                Opcode::PushConst,
                Opcode::Mul,
                Opcode::Add,
                Opcode::PopVar,
            ]
        );
    }

    #[test]
    fn test_const_pool_interning() {
        let program = compile_source("10 A = 5 + 5 + 5\n");
        assert_eq!(program.const_pool, vec![5.0]);
        let first = program.code[0];
        let second = program.code[1];
        assert_eq!(first.operand, second.operand);
    }

    #[test]
    fn test_string_pool_interning() {
        let program = compile_source("10 PRINT \"X\" : PRINT \"X\" : PRINT \"Y\"\n");
        assert_eq!(
            program.string_pool,
            vec!["X".to_string(), "Y".to_string()]
        );
    }

    #[test]
    fn test_unary_minus_lowering() {
        let program = compile_source("10 A = -B\n");
        assert_eq!(
            opcodes(&program),
            vec![Opcode::PushVar, Opcode::Neg, Opcode::PopVar]
        );
    }

    #[test]
    fn test_string_variable_assignment() {
        let program = compile_source("10 A$ = \"HI\"\n");
        assert_eq!(
            opcodes(&program),
            vec![Opcode::StrPush, Opcode::StrPopVar]
        );
    }

    #[test]
    fn test_array_access_lowering() {
        let program = compile_source("10 A(3) = A(2) + 1\n");
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::PushConst,    // subscript 3
                Opcode::PushConst,    // subscript 2
                Opcode::ArrayGet1D,   // read A(2)
                Opcode::PushConst,    // 1
                Opcode::Add,
                Opcode::ArraySet1D,
            ]
        );
    }

    #[test]
    fn test_mid_selects_opcode_by_arity() {
        let program = compile_source("10 A$ = MID$(B$,2)\n20 C$ = MID$(B$,2,3)\n");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::StrMid2));
        assert!(ops.contains(&Opcode::StrMid));
    }

    // =========================================================================
    // VARIABLES
    // =========================================================================

    #[test]
    fn test_slots_in_discovery_order() {
        let program = compile_source("10 A = 1 : B$ = \"X\" : C = A\n");
        let names: Vec<&str> = program.var_table.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B$", "C"]);
        for (i, var) in program.var_table.iter().enumerate() {
            assert_eq!(var.slot as usize, i);
        }
    }

    #[test]
    fn test_dim_records_array_type_and_dims() {
        let program = compile_source("10 DIM A(10), B(3,4)\n");
        let a = &program.var_table[program.find_variable("A").unwrap() as usize];
        assert_eq!(a.ty, VarType::Array1D);
        assert_eq!(a.dim1, 10);
        let b = &program.var_table[program.find_variable("B").unwrap() as usize];
        assert_eq!(b.ty, VarType::Array2D);
        assert_eq!((b.dim1, b.dim2), (3, 4));
    }

    #[test]
    fn test_numeric_variable_limit() {
        let mut source = String::new();
        for i in 0..129 {
            source.push_str(&format!("{} V{} = 1\n", (i + 1) * 10, i));
        }
        let handler = Handler::new();
        let program = {
            let mut parser = abc_par::Parser::new(&source, &handler);
            parser.parse_program()
        };
        let err = compile(&program).unwrap_err();
        assert!(matches!(err, CompileError::TooManyVariables { .. }));
        assert!(err.to_string().contains("numeric variables"));
    }

    // =========================================================================
    // LINE MAP AND CONTROL FLOW
    // =========================================================================

    #[test]
    fn test_line_map_one_entry_per_line() {
        let program = compile_source("10 A=1 : B=2\n20 C=3\n");
        let lines: Vec<u16> = program.line_map.iter().map(|m| m.line).collect();
        assert_eq!(lines, vec![10, 20]);
        assert!(program
            .line_map
            .windows(2)
            .all(|w| w[0].line < w[1].line));
    }

    #[test]
    fn test_backward_jump_resolves_immediately() {
        let program = compile_source("10 A=1\n20 GOTO 10\n");
        let jump = program
            .code
            .iter()
            .find(|i| i.opcode() == Some(Opcode::Jump))
            .unwrap();
        assert_eq!(jump.operand, 0);
    }

    #[test]
    fn test_forward_jump_fixed_up() {
        let program = compile_source("10 GOTO 30\n20 A=1\n30 END\n");
        let jump = program.code[0];
        assert_eq!(jump.opcode(), Some(Opcode::Jump));
        assert_eq!(u32::from(jump.operand), program.find_line(30).unwrap());
        assert_ne!(jump.operand, 0xFFFF);
    }

    #[test]
    fn test_computed_goto_uses_runtime_lookup() {
        let program = compile_source("10 GOTO 10+N\n");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::JumpLine));
    }

    #[test]
    fn test_gosub_forward_reference() {
        let program = compile_source("10 GOSUB 100\n20 END\n100 RETURN\n");
        let gosub = program.code[0];
        assert_eq!(gosub.opcode(), Some(Opcode::Gosub));
        assert_eq!(u32::from(gosub.operand), program.find_line(100).unwrap());
    }

    #[test]
    fn test_if_then_patches_past_body() {
        let program = compile_source("10 IF A THEN PRINT 1\n20 END\n");
        let jump_at = opcodes(&program)
            .iter()
            .position(|&op| op == Opcode::JumpIfFalse)
            .unwrap();
        let target = program.code[jump_at].operand as u32;
        assert_eq!(target, program.find_line(20).unwrap());
    }

    #[test]
    fn test_if_else_emits_skip_jump() {
        let program = compile_source("10 IF A THEN PRINT 1 ELSE PRINT 2\n");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::JumpIfFalse));
        assert!(ops.contains(&Opcode::Jump));
    }

    #[test]
    fn test_on_goto_layout() {
        let program = compile_source("10 ON X GOTO 20,30\n20 END\n30 END\n");
        let on_at = opcodes(&program)
            .iter()
            .position(|&op| op == Opcode::OnGoto)
            .unwrap();
        let count = program.code[on_at].operand;
        assert_eq!(count, 2);
        // The table entries are NOP-carried PCs right after the ON.
        let t1 = program.code[on_at + 1];
        let t2 = program.code[on_at + 2];
        assert_eq!(t1.opcode(), Some(Opcode::Nop));
        assert_eq!(u32::from(t1.operand), program.find_line(20).unwrap());
        assert_eq!(u32::from(t2.operand), program.find_line(30).unwrap());
    }

    #[test]
    fn test_undefined_forward_line_is_error() {
        // Bypass the parser's own GOTO validation by computing TRAP's
        // target through a constant: the fixup pass must still reject.
        let handler = Handler::new();
        let program = {
            let mut parser = abc_par::Parser::new("10 TRAP 500\n20 END\n", &handler);
            parser.parse_program()
        };
        let err = compile(&program).unwrap_err();
        assert!(matches!(err, CompileError::UndefinedLine(500)));
    }

    // =========================================================================
    // STATEMENT LOWERING
    // =========================================================================

    #[test]
    fn test_for_with_default_step() {
        let program = compile_source("10 FOR I=1 TO 3\n20 NEXT I\n");
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::PushConst, // start
                Opcode::PushConst, // limit
                Opcode::PushConst, // implicit step 1
                Opcode::ForInit,
                Opcode::ForNext,
            ]
        );
        assert!(program.const_pool.contains(&1.0));
    }

    #[test]
    fn test_for_with_explicit_step() {
        let program = compile_source("10 FOR I=10 TO 0 STEP -2\n20 NEXT I\n");
        let ops = opcodes(&program);
        // -2 lowers as 2 then NEG before FOR_INIT.
        assert_eq!(
            ops,
            vec![
                Opcode::PushConst,
                Opcode::PushConst,
                Opcode::PushConst,
                Opcode::Neg,
                Opcode::ForInit,
                Opcode::ForNext,
            ]
        );
    }

    #[test]
    fn test_bare_next_uses_sentinel() {
        let program = compile_source("10 FOR I=1 TO 3\n20 NEXT\n");
        let next = program
            .code
            .iter()
            .find(|i| i.opcode() == Some(Opcode::ForNext))
            .unwrap();
        assert_eq!(next.operand, 0xFFFF);
    }

    #[test]
    fn test_next_variable_list_order() {
        let program = compile_source("10 FOR I=1 TO 2\n20 FOR J=1 TO 2\n30 NEXT J,I\n");
        let nexts: Vec<u16> = program
            .code
            .iter()
            .filter(|i| i.opcode() == Some(Opcode::ForNext))
            .map(|i| i.operand)
            .collect();
        let j = program.find_variable("J").unwrap();
        let i = program.find_variable("I").unwrap();
        assert_eq!(nexts, vec![j, i]);
    }

    #[test]
    fn test_data_entries_with_null_and_sign() {
        let program = compile_source("10 DATA 1,\"A\",,-3\n");
        assert_eq!(program.data_entries.len(), 4);
        assert_eq!(program.data_entries[0].kind, DataKind::Numeric);
        assert_eq!(program.data_entries[1].kind, DataKind::String);
        assert_eq!(program.data_entries[2].kind, DataKind::Null);
        assert_eq!(program.data_entries[3].kind, DataKind::Numeric);
        assert_eq!(program.data_numeric, vec![1.0, -3.0]);
        assert_eq!(program.data_strings, vec!["A".to_string()]);
    }

    #[test]
    fn test_data_of_only_commas_is_all_nulls() {
        let program = compile_source("10 DATA ,,\n");
        assert_eq!(program.data_entries.len(), 3);
        assert!(program
            .data_entries
            .iter()
            .all(|e| e.kind == DataKind::Null));
    }

    #[test]
    fn test_data_emits_no_code() {
        let program = compile_source("10 DATA 1,2,3\n");
        assert!(program.code.is_empty());
        assert_eq!(program.line_map.len(), 1);
    }

    #[test]
    fn test_read_dispatches_on_type() {
        let program = compile_source("10 READ A,B$\n");
        assert_eq!(
            opcodes(&program),
            vec![Opcode::DataReadNum, Opcode::DataReadStr]
        );
    }

    #[test]
    fn test_print_separator_handling() {
        let program = compile_source("10 PRINT 1,2;\n");
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::PushConst,
                Opcode::PrintNum,
                Opcode::PrintTab,
                Opcode::PushConst,
                Opcode::PrintNum,
                // Trailing semicolon suppresses the newline.
            ]
        );
    }

    #[test]
    fn test_print_classifies_string_expressions() {
        let program = compile_source("10 PRINT CHR$(65)\n");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::PrintStr));
        assert!(!ops.contains(&Opcode::PrintNum));
    }

    #[test]
    fn test_print_tab_positions_without_printing() {
        let program = compile_source("10 PRINT TAB(10);\"X\"\n");
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::PushConst,
                Opcode::TabFunc,
                Opcode::StrPush,
                Opcode::PrintStr,
                Opcode::PrintNewline,
            ]
        );
    }

    #[test]
    fn test_print_channel_prefix() {
        let program = compile_source("10 PRINT #2, \"X\"\n");
        let ops = opcodes(&program);
        assert_eq!(ops[0], Opcode::PushConst);
        assert_eq!(ops[1], Opcode::SetPrintChannel);
    }

    #[test]
    fn test_input_with_prompt() {
        let program = compile_source("10 INPUT \"NAME\";N$\n");
        assert_eq!(
            opcodes(&program),
            vec![Opcode::InputPrompt, Opcode::InputStr]
        );
    }

    #[test]
    fn test_trap_lowering() {
        let program = compile_source("10 TRAP 100\n100 END\n");
        let trap = program.code[0];
        assert_eq!(trap.opcode(), Some(Opcode::Trap));
        assert_eq!(u32::from(trap.operand), program.find_line(100).unwrap());
    }

    #[test]
    fn test_trap_sentinel_disables() {
        let program = compile_source("10 TRAP 40000\n");
        assert_eq!(opcodes(&program), vec![Opcode::TrapDisable]);
    }

    #[test]
    fn test_poke_lowering() {
        let program = compile_source("10 POKE 1000, 255\n");
        assert_eq!(
            opcodes(&program),
            vec![Opcode::PushConst, Opcode::PushConst, Opcode::Poke]
        );
    }

    #[test]
    fn test_open_pushes_in_documented_order() {
        let program = compile_source("10 OPEN #1,4,0,\"F.DAT\"\n");
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::PushConst, // channel
                Opcode::PushConst, // mode
                Opcode::PushConst, // aux
                Opcode::StrPush,   // filename
                Opcode::Open,
            ]
        );
    }

    #[test]
    fn test_get_stores_into_variable() {
        let program = compile_source("10 GET #1,A\n");
        assert_eq!(
            opcodes(&program),
            vec![Opcode::PushConst, Opcode::Get, Opcode::PopVar]
        );
    }

    #[test]
    fn test_graphics_statements_emit_nothing() {
        let program = compile_source("10 GRAPHICS 0 : SOUND 0,121,10,8 : CLS\n20 END\n");
        assert_eq!(opcodes(&program), vec![Opcode::End]);
    }

    #[test]
    fn test_recompile_is_deterministic() {
        let source = "10 FOR I=1 TO 3\n20 PRINT I\n30 NEXT I\n40 END\n";
        assert_eq!(compile_source(source), compile_source(source));
    }

    #[test]
    fn test_randomize_requires_argument() {
        let handler = Handler::new();
        let program = {
            let mut parser = abc_par::Parser::new("10 RANDOMIZE\n", &handler);
            parser.parse_program()
        };
        let err = compile(&program).unwrap_err();
        assert!(matches!(err, CompileError::RandomizeWithoutArgument));
    }
}
