//! The virtual machine.
//!
//! `Vm` executes a borrowed [`CompiledProgram`] and never mutates it.
//! The fetch loop advances the PC before dispatch, so jump opcodes
//! simply assign it and everything else falls through.
//!
//! Errors propagate as `Result` out of [`Vm::step`]; the run loop
//! routes them through the one-shot TRAP, or prints the classic
//! `ERROR - <message>` line and halts when no trap is armed.
//!
//! Channel 0 output goes through an owned writer (stdout by default)
//! and INPUT reads through an owned reader, so whole programs can be
//! driven in-process.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, Read, Seek, SeekFrom, Write};

use abc_byt::{CompiledProgram, Opcode, VarType};

use crate::channels::{status, ChannelSet, SECTOR_SIZE};
use crate::error::RuntimeError;
use crate::number::{format_number, parse_number};
use crate::printer::PrintState;
use crate::rng::Lcg;

/// Size of the PEEK/POKE address space.
const MEMORY_SIZE: usize = 65_536;

/// Active FOR loop record.
#[derive(Clone, Copy, Debug)]
struct ForFrame {
    var_slot: u16,
    limit: f64,
    step: f64,
    loop_start: usize,
}

#[derive(Debug)]
enum ArrayData {
    Empty,
    Num(Vec<f64>),
    Str(Vec<String>),
}

#[derive(Debug)]
struct ArraySlot {
    is_string: bool,
    dim1: usize,
    dim2: usize,
    data: ArrayData,
}

#[derive(Default)]
struct InputBuffer {
    line: String,
    cursor: usize,
    available: bool,
}

/// The machine. One instance executes one program.
pub struct Vm<'p> {
    program: &'p CompiledProgram,
    pc: usize,
    running: bool,

    stack: Vec<f64>,
    str_stack: Vec<String>,
    call_stack: Vec<usize>,
    for_stack: Vec<ForFrame>,

    num_vars: Vec<f64>,
    str_vars: Vec<String>,
    arrays: Vec<ArraySlot>,

    channels: ChannelSet,
    trap_target: Option<usize>,
    data_pointer: usize,
    print: PrintState,
    deg_mode: bool,
    rng: Lcg,
    input: InputBuffer,
    /// Simulated 64 KiB address space for PEEK/POKE.
    memory: Vec<u8>,

    stdout: Box<dyn Write + 'p>,
    stdin: Box<dyn BufRead + 'p>,
}

impl<'p> Vm<'p> {
    /// A VM wired to the process's stdin/stdout.
    pub fn new(program: &'p CompiledProgram) -> Self {
        Self::with_io(
            program,
            std::io::stdout(),
            std::io::BufReader::new(std::io::stdin()),
        )
    }

    /// A VM with caller-supplied I/O, for embedding and tests.
    pub fn with_io<W, R>(program: &'p CompiledProgram, output: W, input: R) -> Self
    where
        W: Write + 'p,
        R: BufRead + 'p,
    {
        let var_count = program.var_table.len();
        let arrays = program
            .var_table
            .iter()
            .map(|var| ArraySlot {
                is_string: var.ty == VarType::String || var.name.ends_with('$'),
                dim1: 0,
                dim2: 0,
                data: ArrayData::Empty,
            })
            .collect();

        Self {
            program,
            pc: 0,
            running: true,
            stack: Vec::with_capacity(64),
            str_stack: Vec::with_capacity(16),
            call_stack: Vec::with_capacity(16),
            for_stack: Vec::with_capacity(8),
            num_vars: vec![0.0; var_count],
            str_vars: vec![String::new(); var_count],
            arrays,
            channels: ChannelSet::new(),
            trap_target: None,
            data_pointer: 0,
            print: PrintState::new(),
            deg_mode: false,
            rng: Lcg::new(),
            input: InputBuffer::default(),
            memory: vec![0u8; MEMORY_SIZE],
            stdout: Box::new(output),
            stdin: Box::new(input),
        }
    }

    /// Execute until END/STOP, fall-through, or an untrapped error.
    pub fn run(&mut self) {
        while self.running && self.pc < self.program.code.len() {
            if let Err(err) = self.step() {
                self.handle_error(err);
            }
        }
        self.channels.close_all();
        let _ = self.stdout.flush();
    }

    fn handle_error(&mut self, err: RuntimeError) {
        if let Some(target) = self.trap_target.take() {
            // One-shot redirection: stacks cleared, trap disarmed.
            self.stack.clear();
            self.str_stack.clear();
            self.pc = target;
        } else {
            eprintln!("ERROR - {err}");
            self.running = false;
        }
    }

    /// Value of a numeric variable, for tests and tooling.
    pub fn variable(&self, name: &str) -> Option<f64> {
        let slot = self.program.find_variable(name)?;
        self.num_vars.get(slot as usize).copied()
    }

    /// Value of a string variable, for tests and tooling.
    pub fn string_variable(&self, name: &str) -> Option<&str> {
        let slot = self.program.find_variable(name)?;
        self.str_vars.get(slot as usize).map(String::as_str)
    }

    // =========================================================================
    // STACKS AND VARIABLE ACCESS
    // =========================================================================

    fn pop(&mut self) -> Result<f64, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn str_pop(&mut self) -> Result<String, RuntimeError> {
        self.str_stack
            .pop()
            .ok_or(RuntimeError::StringStackUnderflow)
    }

    fn num_var(&self, slot: u16) -> Result<f64, RuntimeError> {
        self.num_vars
            .get(slot as usize)
            .copied()
            .ok_or(RuntimeError::InvalidOperand)
    }

    fn set_num_var(&mut self, slot: u16, value: f64) -> Result<(), RuntimeError> {
        *self
            .num_vars
            .get_mut(slot as usize)
            .ok_or(RuntimeError::InvalidOperand)? = value;
        Ok(())
    }

    fn set_str_var(&mut self, slot: u16, value: String) -> Result<(), RuntimeError> {
        *self
            .str_vars
            .get_mut(slot as usize)
            .ok_or(RuntimeError::InvalidOperand)? = value;
        Ok(())
    }

    fn const_at(&self, index: u16) -> Result<f64, RuntimeError> {
        self.program
            .const_pool
            .get(index as usize)
            .copied()
            .ok_or(RuntimeError::InvalidOperand)
    }

    fn string_at(&self, index: u16) -> Result<&str, RuntimeError> {
        self.program
            .string_pool
            .get(index as usize)
            .map(String::as_str)
            .ok_or(RuntimeError::InvalidOperand)
    }

    fn jump_to(&mut self, target: usize) -> Result<(), RuntimeError> {
        if target > self.program.code.len() {
            return Err(RuntimeError::InvalidOperand);
        }
        self.pc = target;
        Ok(())
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    /// Route text to the current print channel, falling back to the
    /// standard output when the channel has no open file.
    fn write_text(&mut self, text: &str) -> Result<(), RuntimeError> {
        let channel = self.print.channel as usize;
        if channel >= 1 {
            if let Some(file) = self.channels.open_file(channel) {
                file.write_all(text.as_bytes())?;
                self.print.advance(text);
                return Ok(());
            }
            eprintln!("WARNING: File channel {channel} not open, using stdout");
            self.print.channel = 0;
        }
        self.stdout.write_all(text.as_bytes())?;
        self.print.advance(text);
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn binary(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.stack.push(f(a, b));
        Ok(())
    }

    /// Comparisons are polymorphic: when both sides are on the string
    /// stack the comparison is lexicographic, otherwise numeric.
    fn compare(
        &mut self,
        num: impl FnOnce(f64, f64) -> bool,
        text: impl FnOnce(&str, &str) -> bool,
    ) -> Result<(), RuntimeError> {
        let result = if self.str_stack.len() >= 2 {
            let b = self.str_pop()?;
            let a = self.str_pop()?;
            text(&a, &b)
        } else {
            let b = self.pop()?;
            let a = self.pop()?;
            num(a, b)
        };
        self.stack.push(if result { 1.0 } else { 0.0 });
        Ok(())
    }

    fn trig_arg(&self, x: f64) -> f64 {
        if self.deg_mode {
            x.to_radians()
        } else {
            x
        }
    }

    fn unary_math(&mut self, f: impl FnOnce(f64) -> f64) -> Result<(), RuntimeError> {
        let x = self.pop()?;
        self.stack.push(f(x));
        Ok(())
    }

    /// PC just past the FOR_NEXT that closes the loop starting here,
    /// used when a FOR is done before its first iteration.
    fn find_matching_next(&self, from: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = from;
        while i < self.program.code.len() {
            match self.program.code[i].opcode() {
                Some(Opcode::ForInit) => depth += 1,
                Some(Opcode::ForNext) => {
                    if depth == 0 {
                        return Some(i + 1);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn find_line(&self, value: f64) -> Result<usize, RuntimeError> {
        let line = value as i64;
        if !(0..=32767).contains(&line) {
            return Err(RuntimeError::UndefinedStatement);
        }
        self.program
            .find_line(line as u16)
            .map(|pc| pc as usize)
            .ok_or(RuntimeError::UndefinedStatement)
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    fn step(&mut self) -> Result<(), RuntimeError> {
        let inst = *self
            .program
            .code
            .get(self.pc)
            .ok_or(RuntimeError::InvalidOperand)?;
        self.pc += 1;
        let opcode = Opcode::from_u8(inst.opcode)
            .ok_or(RuntimeError::UnknownOpcode(inst.opcode))?;
        let operand = inst.operand;

        match opcode {
            // -----------------------------------------------------------------
            // Stack and variables
            // -----------------------------------------------------------------
            Opcode::PushConst => {
                let value = self.const_at(operand)?;
                self.stack.push(value);
            }
            Opcode::PushVar => {
                let value = self.num_var(operand)?;
                self.stack.push(value);
            }
            Opcode::PopVar => {
                let value = self.pop()?;
                self.set_num_var(operand, value)?;
            }
            Opcode::StrPush => {
                let text = self.string_at(operand)?.to_string();
                self.str_stack.push(text);
            }
            Opcode::StrPushVar => {
                let text = self
                    .str_vars
                    .get(operand as usize)
                    .cloned()
                    .ok_or(RuntimeError::InvalidOperand)?;
                self.str_stack.push(text);
            }
            Opcode::StrPopVar => {
                let text = self.str_pop()?;
                self.set_str_var(operand, text)?;
            }
            Opcode::Dup => {
                if let Some(&top) = self.stack.last() {
                    self.stack.push(top);
                }
            }
            Opcode::Pop => {
                self.pop()?;
            }

            // -----------------------------------------------------------------
            // Arithmetic
            // -----------------------------------------------------------------
            Opcode::Add => self.binary(|a, b| a + b)?,
            Opcode::Sub => self.binary(|a, b| a - b)?,
            Opcode::Mul => self.binary(|a, b| a * b)?,
            Opcode::Div => {
                let b = self.pop()?;
                let a = self.pop()?;
                if b == 0.0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                self.stack.push(a / b);
            }
            Opcode::Mod => self.binary(|a, b| a % b)?,
            Opcode::Pow => self.binary(f64::powf)?,
            Opcode::Neg => {
                let a = self.pop()?;
                self.stack.push(-a);
            }

            // -----------------------------------------------------------------
            // Comparison and logic
            // -----------------------------------------------------------------
            Opcode::Eq => self.compare(|a, b| a == b, |a, b| a == b)?,
            Opcode::Ne => self.compare(|a, b| a != b, |a, b| a != b)?,
            Opcode::Lt => self.compare(|a, b| a < b, |a, b| a < b)?,
            Opcode::Le => self.compare(|a, b| a <= b, |a, b| a <= b)?,
            Opcode::Gt => self.compare(|a, b| a > b, |a, b| a > b)?,
            Opcode::Ge => self.compare(|a, b| a >= b, |a, b| a >= b)?,
            Opcode::And => {
                self.binary(|a, b| if a != 0.0 && b != 0.0 { 1.0 } else { 0.0 })?
            }
            Opcode::Or => {
                self.binary(|a, b| if a != 0.0 || b != 0.0 { 1.0 } else { 0.0 })?
            }
            Opcode::Not => {
                let a = self.pop()?;
                self.stack.push(if a == 0.0 { 1.0 } else { 0.0 });
            }

            // -----------------------------------------------------------------
            // Strings
            // -----------------------------------------------------------------
            Opcode::StrConcat => {
                let b = self.str_pop()?;
                let mut a = self.str_pop()?;
                a.push_str(&b);
                self.str_stack.push(a);
            }
            Opcode::StrLen => {
                let s = self.str_pop()?;
                self.stack.push(s.chars().count() as f64);
            }
            Opcode::StrVal => {
                let s = self.str_pop()?;
                self.stack.push(parse_number(&s));
            }
            Opcode::StrStr => {
                let value = self.pop()?;
                self.str_stack.push(format_number(value));
            }
            Opcode::StrChr => {
                let code = self.pop()?;
                let byte = (code as i64 & 0xFF) as u8;
                self.str_stack.push((byte as char).to_string());
            }
            Opcode::StrAsc => {
                let s = self.str_pop()?;
                let code = s.as_bytes().first().copied().unwrap_or(0);
                self.stack.push(f64::from(code));
            }
            Opcode::StrLeft => {
                let count = self.pop()? as i64;
                let s = self.str_pop()?;
                let count = count.max(0) as usize;
                self.str_stack.push(s.chars().take(count).collect());
            }
            Opcode::StrRight => {
                let count = self.pop()? as i64;
                let s = self.str_pop()?;
                let len = s.chars().count();
                let count = (count.max(0) as usize).min(len);
                self.str_stack.push(s.chars().skip(len - count).collect());
            }
            Opcode::StrMid => {
                let count = self.pop()? as i64;
                let start = self.pop()? as i64;
                let s = self.str_pop()?;
                self.str_stack.push(mid(&s, start, Some(count)));
            }
            Opcode::StrMid2 => {
                let start = self.pop()? as i64;
                let s = self.str_pop()?;
                self.str_stack.push(mid(&s, start, None));
            }

            // -----------------------------------------------------------------
            // Arrays
            // -----------------------------------------------------------------
            Opcode::Dim1D => {
                let size = self.pop()? as i64 + 1; // DIM A(10) holds 0..=10
                if size < 1 {
                    return Err(RuntimeError::ArrayBounds);
                }
                self.allocate_array(operand, size as usize, 0)?;
            }
            Opcode::Dim2D => {
                let cols = self.pop()? as i64 + 1;
                let rows = self.pop()? as i64 + 1;
                if rows < 1 || cols < 1 {
                    return Err(RuntimeError::ArrayBounds);
                }
                self.allocate_array(operand, rows as usize, cols as usize)?;
            }
            Opcode::ArrayGet1D | Opcode::StrArrayGet1D => {
                let index = self.pop()?;
                let offset = self.array_offset(operand, index, None)?;
                self.array_read(operand, offset)?;
            }
            Opcode::ArrayGet2D | Opcode::StrArrayGet2D => {
                let col = self.pop()?;
                let row = self.pop()?;
                let offset = self.array_offset(operand, row, Some(col))?;
                self.array_read(operand, offset)?;
            }
            Opcode::ArraySet1D => {
                let value = self.pop()?;
                let index = self.pop()?;
                let offset = self.array_offset(operand, index, None)?;
                self.array_write_num(operand, offset, value)?;
            }
            Opcode::ArraySet2D => {
                let value = self.pop()?;
                let col = self.pop()?;
                let row = self.pop()?;
                let offset = self.array_offset(operand, row, Some(col))?;
                self.array_write_num(operand, offset, value)?;
            }
            Opcode::StrArraySet1D => {
                let value = self.str_pop()?;
                let index = self.pop()?;
                let offset = self.array_offset(operand, index, None)?;
                self.array_write_str(operand, offset, value)?;
            }
            Opcode::StrArraySet2D => {
                let value = self.str_pop()?;
                let col = self.pop()?;
                let row = self.pop()?;
                let offset = self.array_offset(operand, row, Some(col))?;
                self.array_write_str(operand, offset, value)?;
            }

            // -----------------------------------------------------------------
            // Control flow
            // -----------------------------------------------------------------
            Opcode::Jump => self.jump_to(operand as usize)?,
            Opcode::JumpIfFalse => {
                let cond = self.pop()?;
                if cond == 0.0 {
                    self.jump_to(operand as usize)?;
                }
            }
            Opcode::JumpIfTrue => {
                let cond = self.pop()?;
                if cond != 0.0 {
                    self.jump_to(operand as usize)?;
                }
            }
            Opcode::JumpLine => {
                let line = self.pop()?;
                let target = self.find_line(line)?;
                self.pc = target;
            }
            Opcode::Gosub => {
                self.call_stack.push(self.pc);
                self.jump_to(operand as usize)?;
            }
            Opcode::GosubLine => {
                let line = self.pop()?;
                let target = self.find_line(line)?;
                self.call_stack.push(self.pc);
                self.pc = target;
            }
            Opcode::Return => {
                let target = self
                    .call_stack
                    .pop()
                    .ok_or(RuntimeError::ReturnWithoutGosub)?;
                self.pc = target;
            }
            Opcode::OnGoto | Opcode::OnGosub => {
                let index = self.pop()? as i64;
                let count = operand as usize;
                let base = self.pc;
                if index >= 1 && index as usize <= count {
                    let slot = base + index as usize - 1;
                    let target = self
                        .program
                        .code
                        .get(slot)
                        .ok_or(RuntimeError::InvalidOperand)?
                        .operand;
                    if opcode == Opcode::OnGosub {
                        self.call_stack.push(base + count);
                    }
                    self.jump_to(target as usize)?;
                } else {
                    // 1-based index out of range falls through past
                    // the jump table.
                    self.pc = base + count;
                }
            }
            Opcode::ForInit => {
                let step = self.pop()?;
                let limit = self.pop()?;
                let start = self.pop()?;
                self.set_num_var(operand, start)?;

                let done =
                    (step > 0.0 && start > limit) || (step < 0.0 && start < limit);
                if done {
                    // Zero-trip loop: the body never runs and the
                    // induction variable keeps its start value.
                    if let Some(after) = self.find_matching_next(self.pc) {
                        self.pc = after;
                        return Ok(());
                    }
                }
                self.for_stack.push(ForFrame {
                    var_slot: operand,
                    limit,
                    step,
                    loop_start: self.pc,
                });
            }
            Opcode::ForNext => {
                let Some(frame) = self.for_stack.last().copied() else {
                    return Err(RuntimeError::NextWithoutFor);
                };
                // 0xFFFF is the bare-NEXT sentinel: any loop matches.
                let slot = if operand != 0xFFFF {
                    if frame.var_slot != operand {
                        return Err(RuntimeError::NextMismatch {
                            expected: self.program.var_name(frame.var_slot).to_string(),
                            found: self.program.var_name(operand).to_string(),
                        });
                    }
                    operand
                } else {
                    frame.var_slot
                };

                let value = self.num_var(slot)? + frame.step;
                self.set_num_var(slot, value)?;
                let done = if frame.step > 0.0 {
                    value > frame.limit
                } else {
                    value < frame.limit
                };
                if done {
                    self.for_stack.pop();
                } else {
                    self.pc = frame.loop_start;
                }
            }

            // -----------------------------------------------------------------
            // Printing
            // -----------------------------------------------------------------
            Opcode::PrintNum => {
                let value = self.pop()?;
                let text = format_number(value);
                if !self.print.after_tab {
                    self.write_text(" ")?;
                }
                self.write_text(&text)?;
                let next = self.program.code.get(self.pc).and_then(|i| i.opcode());
                let suppress_trailing = matches!(
                    next,
                    Some(Opcode::PrintNewline | Opcode::PrintTab | Opcode::PrintNosep)
                );
                if !suppress_trailing {
                    self.write_text(" ")?;
                }
                // A following number is "after tab": adjacent numbers
                // share one space.
                self.print.after_tab = true;
                self.print.needs_newline = true;
            }
            Opcode::PrintStr => {
                let text = self.str_pop()?;
                self.write_text(&text)?;
                self.print.after_tab = false;
                self.print.needs_newline = true;
            }
            Opcode::PrintNewline => {
                self.write_text("\n")?;
                self.stdout.flush()?;
                self.print.newline();
            }
            Opcode::PrintSpace => {
                self.write_text(" ")?;
                self.print.after_tab = false;
            }
            Opcode::PrintTab => {
                self.write_text(" ")?;
                self.print.after_tab = true;
            }
            Opcode::TabFunc => {
                let target = self.pop()? as i64;
                let mut target = target.max(1) as usize;
                if target > self.print.width {
                    target %= self.print.width;
                    if target == 0 {
                        target = self.print.width;
                    }
                }
                if self.print.column >= target {
                    self.write_text("\n")?;
                    self.print.column = 1;
                }
                while self.print.column < target {
                    self.write_text(" ")?;
                }
                self.print.after_tab = true;
            }
            Opcode::PrintNosep => {
                self.print.after_tab = true;
            }
            Opcode::SetPrintChannel => {
                let channel = self.pop()? as i64;
                if (0..=7).contains(&channel) {
                    self.print.channel = channel as u8;
                } else {
                    eprintln!("WARNING: Invalid print channel {channel}, using stdout");
                    self.print.channel = 0;
                }
            }

            // -----------------------------------------------------------------
            // Input
            // -----------------------------------------------------------------
            Opcode::InputPrompt => {
                let prompt = self.string_at(operand)?.to_string();
                self.stdout.write_all(prompt.as_bytes())?;
                self.stdout.flush()?;
            }
            Opcode::InputNum => loop {
                let value = self.next_input_value()?;
                if value.is_empty() && !self.input.available {
                    self.set_num_var(operand, 0.0)?;
                    break;
                }
                if is_valid_numeric(&value) {
                    self.set_num_var(operand, parse_number(&value))?;
                    break;
                }
                self.stdout.write_all(b"ERROR - 18\n")?;
                self.input.available = false;
            },
            Opcode::InputStr => {
                let value = self.next_input_value()?;
                self.set_str_var(operand, value)?;
            }

            // -----------------------------------------------------------------
            // File channels
            // -----------------------------------------------------------------
            Opcode::Open => self.op_open()?,
            Opcode::Close => {
                let channel = self.pop()? as i64;
                if (1..=7).contains(&channel) {
                    let chan = self.channels.get_mut(channel)?;
                    if chan.file.take().is_some() {
                        chan.status = status::OK;
                    }
                    if i64::from(self.print.channel) == channel {
                        self.print.channel = 0;
                    }
                }
            }
            Opcode::Get => {
                let channel = self.pop()? as i64;
                let chan = self.channels.get_mut(channel)?;
                let Some(file) = chan.file.as_mut() else {
                    return Err(RuntimeError::ChannelNotOpen);
                };
                let mut byte = [0u8; 1];
                let read = file.read(&mut byte)?;
                if read == 0 {
                    chan.status = status::END_OF_FILE;
                    self.stack.push(0.0);
                } else {
                    chan.status = status::OK;
                    chan.position += 1;
                    self.stack.push(f64::from(byte[0]));
                }
            }
            Opcode::Put => {
                let value = self.pop()?;
                let channel = self.pop()? as i64;
                let chan = self.channels.get_mut(channel)?;
                let Some(file) = chan.file.as_mut() else {
                    return Err(RuntimeError::ChannelNotOpen);
                };
                let byte = [(value as i64 & 0xFF) as u8];
                match file.write_all(&byte) {
                    Ok(()) => {
                        chan.status = status::OK;
                        chan.position += 1;
                    }
                    Err(_) => chan.status = status::IO_ERROR,
                }
            }
            Opcode::Note => {
                let channel = self.pop()? as i64;
                let chan = self.channels.get_mut(channel)?;
                let Some(file) = chan.file.as_mut() else {
                    return Err(RuntimeError::ChannelNotOpen);
                };
                let position = file.stream_position()?;
                chan.position = position;
                self.stack.push((position / SECTOR_SIZE) as f64);
                self.stack.push((position % SECTOR_SIZE) as f64);
            }
            Opcode::Point => {
                let byte = self.pop()? as i64;
                let sector = self.pop()? as i64;
                let channel = self.pop()? as i64;
                let chan = self.channels.get_mut(channel)?;
                let Some(file) = chan.file.as_mut() else {
                    return Err(RuntimeError::ChannelNotOpen);
                };
                let position = sector.max(0) as u64 * SECTOR_SIZE + byte.max(0) as u64;
                match file.seek(SeekFrom::Start(position)) {
                    Ok(_) => {
                        chan.status = status::OK;
                        chan.position = position;
                    }
                    Err(_) => chan.status = status::IO_ERROR,
                }
            }
            Opcode::Status => {
                let channel = self.pop()? as i64;
                self.stack.push(f64::from(self.channels.status_of(channel)));
            }
            Opcode::Xio => self.op_xio()?,

            // -----------------------------------------------------------------
            // DATA
            // -----------------------------------------------------------------
            Opcode::DataReadNum => {
                let value = self.next_data_entry()?.0;
                self.set_num_var(operand, value)?;
            }
            Opcode::DataReadStr => {
                let text = self.next_data_entry()?.1;
                self.set_str_var(operand, text)?;
            }
            Opcode::Restore | Opcode::RestoreLine => {
                if opcode == Opcode::RestoreLine {
                    self.pop()?;
                }
                self.data_pointer = 0;
            }

            // -----------------------------------------------------------------
            // Math functions
            // -----------------------------------------------------------------
            Opcode::FuncSin => {
                let x = self.pop()?;
                self.stack.push(self.trig_arg(x).sin());
            }
            Opcode::FuncCos => {
                let x = self.pop()?;
                self.stack.push(self.trig_arg(x).cos());
            }
            Opcode::FuncTan => {
                let x = self.pop()?;
                self.stack.push(self.trig_arg(x).tan());
            }
            Opcode::FuncAtn => {
                let x = self.pop()?;
                let result = x.atan();
                self.stack
                    .push(if self.deg_mode { result.to_degrees() } else { result });
            }
            Opcode::FuncExp => self.unary_math(f64::exp)?,
            Opcode::FuncLog => {
                let x = self.pop()?;
                if x <= 0.0 {
                    return Err(RuntimeError::LogOfNegative);
                }
                self.stack.push(x.ln());
            }
            Opcode::FuncClog => {
                let x = self.pop()?;
                if x <= 0.0 {
                    return Err(RuntimeError::LogOfNegative);
                }
                self.stack.push(x.log10());
            }
            Opcode::FuncSqr => {
                let x = self.pop()?;
                if x < 0.0 {
                    return Err(RuntimeError::SqrtOfNegative);
                }
                self.stack.push(x.sqrt());
            }
            Opcode::FuncAbs => self.unary_math(f64::abs)?,
            Opcode::FuncInt => self.unary_math(f64::floor)?,
            Opcode::FuncSgn => {
                let x = self.pop()?;
                self.stack.push(if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                });
            }
            Opcode::FuncRnd => {
                let x = self.pop()?;
                let result = if x < 0.0 {
                    // Negative argument reseeds and draws once.
                    self.rng.reseed((x.abs() * 1_000_000.0) as u32);
                    self.rng.next()
                } else if x == 0.0 {
                    self.rng.last()
                } else {
                    self.rng.next()
                };
                self.stack.push(result);
            }
            Opcode::FuncPeek => {
                let address = self.pop()? as i64;
                let byte = usize::try_from(address)
                    .ok()
                    .and_then(|a| self.memory.get(a).copied())
                    .ok_or(RuntimeError::IllegalPeekAddress)?;
                self.stack.push(f64::from(byte));
            }
            Opcode::Poke => {
                let value = self.pop()?;
                let address = self.pop()? as i64;
                let cell = usize::try_from(address)
                    .ok()
                    .and_then(|a| self.memory.get_mut(a))
                    .ok_or(RuntimeError::IllegalPokeAddress)?;
                // POKE keeps only the low byte.
                *cell = (value as i64 & 0xFF) as u8;
            }

            // -----------------------------------------------------------------
            // System
            // -----------------------------------------------------------------
            Opcode::Trap => {
                self.trap_target = Some(operand as usize);
            }
            Opcode::TrapDisable => {
                self.trap_target = None;
            }
            Opcode::Deg => self.deg_mode = true,
            Opcode::Rad => self.deg_mode = false,
            Opcode::Randomize => {
                let seed = self.pop()?;
                self.rng.reseed(seed.abs() as u32);
                // Prime the cache so RND(0) has a value.
                self.rng.next();
            }
            Opcode::Clr => {
                self.num_vars.fill(0.0);
                for text in &mut self.str_vars {
                    text.clear();
                }
                for array in &mut self.arrays {
                    array.data = ArrayData::Empty;
                    array.dim1 = 0;
                    array.dim2 = 0;
                }
            }
            Opcode::PopGosub => {
                self.call_stack.pop();
            }
            Opcode::Nop => {}
            Opcode::End | Opcode::Stop | Opcode::Halt => self.running = false,
        }

        Ok(())
    }

    // =========================================================================
    // ARRAYS
    // =========================================================================

    fn array_slot_mut(&mut self, slot: u16) -> Result<&mut ArraySlot, RuntimeError> {
        self.arrays
            .get_mut(slot as usize)
            .ok_or(RuntimeError::InvalidOperand)
    }

    fn allocate_array(
        &mut self,
        slot: u16,
        dim1: usize,
        dim2: usize,
    ) -> Result<(), RuntimeError> {
        let array = self.array_slot_mut(slot)?;
        let total = dim1 * dim2.max(1);
        array.dim1 = dim1;
        array.dim2 = dim2;
        array.data = if array.is_string {
            ArrayData::Str(vec![String::new(); total])
        } else {
            ArrayData::Num(vec![0.0; total])
        };
        Ok(())
    }

    /// Bounds-checked flat offset, auto-dimensioning an untouched
    /// array to 0..10 per dimension.
    fn array_offset(
        &mut self,
        slot: u16,
        row: f64,
        col: Option<f64>,
    ) -> Result<usize, RuntimeError> {
        {
            let array = self.array_slot_mut(slot)?;
            if matches!(array.data, ArrayData::Empty) {
                let (d1, d2) = if col.is_some() { (11, 11) } else { (11, 0) };
                let is_string = array.is_string;
                array.dim1 = d1;
                array.dim2 = d2;
                array.data = if is_string {
                    ArrayData::Str(vec![String::new(); d1 * d2.max(1)])
                } else {
                    ArrayData::Num(vec![0.0; d1 * d2.max(1)])
                };
            }
        }
        let array = self.array_slot_mut(slot)?;
        let row = row as i64;
        if row < 0 || (row as usize) >= array.dim1 {
            return Err(RuntimeError::ArrayBounds);
        }
        match col {
            Some(col) => {
                let col = col as i64;
                if col < 0 || (col as usize) >= array.dim2.max(1) {
                    return Err(RuntimeError::ArrayBounds);
                }
                Ok(row as usize * array.dim2.max(1) + col as usize)
            }
            None => Ok(row as usize),
        }
    }

    fn array_read(&mut self, slot: u16, offset: usize) -> Result<(), RuntimeError> {
        let array = self.array_slot_mut(slot)?;
        match &array.data {
            ArrayData::Num(values) => {
                let value = *values.get(offset).ok_or(RuntimeError::ArrayBounds)?;
                self.stack.push(value);
            }
            ArrayData::Str(values) => {
                let value = values.get(offset).ok_or(RuntimeError::ArrayBounds)?.clone();
                self.str_stack.push(value);
            }
            ArrayData::Empty => return Err(RuntimeError::ArrayBounds),
        }
        Ok(())
    }

    fn array_write_num(
        &mut self,
        slot: u16,
        offset: usize,
        value: f64,
    ) -> Result<(), RuntimeError> {
        let array = self.array_slot_mut(slot)?;
        match &mut array.data {
            ArrayData::Num(values) => {
                *values.get_mut(offset).ok_or(RuntimeError::ArrayBounds)? = value;
                Ok(())
            }
            _ => Err(RuntimeError::InvalidOperand),
        }
    }

    fn array_write_str(
        &mut self,
        slot: u16,
        offset: usize,
        value: String,
    ) -> Result<(), RuntimeError> {
        let array = self.array_slot_mut(slot)?;
        match &mut array.data {
            ArrayData::Str(values) => {
                *values.get_mut(offset).ok_or(RuntimeError::ArrayBounds)? = value;
                Ok(())
            }
            _ => Err(RuntimeError::InvalidOperand),
        }
    }

    // =========================================================================
    // DATA
    // =========================================================================

    /// Consume one DATA entry, returning both conversions; the caller
    /// picks by target type. Strings parse as numbers (non-numeric
    /// reads as 0), numbers format as text, nulls read as 0 / "".
    fn next_data_entry(&mut self) -> Result<(f64, String), RuntimeError> {
        let entry = *self
            .program
            .data_entries
            .get(self.data_pointer)
            .ok_or(RuntimeError::OutOfData)?;
        self.data_pointer += 1;

        match entry.kind {
            abc_byt::DataKind::Numeric => {
                let value = *self
                    .program
                    .data_numeric
                    .get(entry.index as usize)
                    .ok_or(RuntimeError::InvalidOperand)?;
                Ok((value, format_number(value)))
            }
            abc_byt::DataKind::String => {
                let text = self
                    .program
                    .data_strings
                    .get(entry.index as usize)
                    .ok_or(RuntimeError::InvalidOperand)?;
                Ok((parse_number(text), text.clone()))
            }
            abc_byt::DataKind::Null => Ok((0.0, String::new())),
        }
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    /// Next comma-separated value from the INPUT line buffer, reading
    /// and echoing a fresh line when the buffer is spent. Quoted
    /// values keep embedded commas.
    fn next_input_value(&mut self) -> Result<String, RuntimeError> {
        if !self.input.available {
            self.stdout.write_all(b"? ")?;
            self.stdout.flush()?;

            let mut line = String::new();
            let read = self.stdin.read_line(&mut line)?;
            if read == 0 {
                return Ok(String::new());
            }
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            // Echo, so piped transcripts read like a session.
            self.stdout.write_all(line.as_bytes())?;
            self.stdout.write_all(b"\n")?;

            self.input.line = line;
            self.input.cursor = 0;
            self.input.available = true;
        }

        let bytes = self.input.line.as_bytes().to_vec();
        let mut i = self.input.cursor;
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
        if i >= bytes.len() {
            self.input.available = false;
            self.input.cursor = i;
            return Ok(String::new());
        }

        let value;
        if bytes[i] == b'"' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            value = self.input.line.get(start..i).unwrap_or("").to_string();
            if i < bytes.len() {
                i += 1; // closing quote
                if i < bytes.len() && bytes[i] == b',' {
                    i += 1;
                } else if i >= bytes.len() {
                    self.input.available = false;
                }
            } else {
                self.input.available = false;
            }
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b',' {
                i += 1;
            }
            let mut end = i;
            while end > start && (bytes[end - 1] == b' ' || bytes[end - 1] == b'\t') {
                end -= 1;
            }
            value = self.input.line.get(start..end).unwrap_or("").to_string();
            if i < bytes.len() {
                i += 1; // comma
            } else {
                self.input.available = false;
            }
        }
        self.input.cursor = i;
        Ok(value)
    }

    // =========================================================================
    // FILE CHANNEL STATEMENTS
    // =========================================================================

    /// OPEN pops filename, aux, mode, channel. Modes: 4 read, 8
    /// write, 12 read/update (created when missing); anything else
    /// reads. Failure records status 170 without raising.
    fn op_open(&mut self) -> Result<(), RuntimeError> {
        let filename = self.str_pop()?;
        let _aux = self.pop()?;
        let mode = self.pop()? as i64;
        let channel = self.pop()? as i64;

        let chan = self.channels.get_mut(channel)?;
        chan.file = None;

        let file = match mode {
            8 => File::create(&filename),
            12 => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&filename),
            _ => File::open(&filename),
        };

        match file {
            Ok(file) => {
                chan.file = Some(file);
                chan.status = status::OK;
                chan.position = 0;
            }
            Err(_) => chan.status = status::NOT_FOUND,
        }
        Ok(())
    }

    /// XIO pops device, aux2, aux1, channel, command. Commands: 3
    /// open-read, 8 open-write, 12 close, 34 delete.
    fn op_xio(&mut self) -> Result<(), RuntimeError> {
        let device = self.str_pop()?;
        let _aux2 = self.pop()?;
        let _aux1 = self.pop()?;
        let channel = self.pop()? as i64;
        let command = self.pop()? as i64;

        self.channels.get_mut(channel)?;

        match command {
            3 | 8 => {
                let file = if command == 3 {
                    File::open(&device)
                } else {
                    File::create(&device)
                };
                let chan = self.channels.get_mut(channel)?;
                match file {
                    Ok(file) => {
                        chan.file = Some(file);
                        chan.status = status::OK;
                        chan.position = 0;
                    }
                    Err(_) => return Err(RuntimeError::CannotOpenFile(device)),
                }
            }
            12 => {
                self.channels.get_mut(channel)?.file = None;
            }
            34 => {
                if std::fs::remove_file(&device).is_err() {
                    return Err(RuntimeError::CannotDeleteFile(device));
                }
                writeln!(self.stdout, "File '{device}' deleted")?;
            }
            other => return Err(RuntimeError::UnsupportedXio(other as u8)),
        }
        Ok(())
    }
}

/// 1-based MID$; `count` of `None` takes the rest of the string.
fn mid(s: &str, start: i64, count: Option<i64>) -> String {
    let skip = (start - 1).max(0) as usize;
    let rest = s.chars().skip(skip);
    match count {
        Some(count) => rest.take(count.max(0) as usize).collect(),
        None => rest.collect(),
    }
}

/// Validation for INPUT into a numeric variable: digits, at most one
/// decimal point, an exponent only after a digit, blanks allowed.
fn is_valid_numeric(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut has_digit = false;
    let mut has_point = false;
    let mut has_exp = false;

    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    if i >= bytes.len() {
        return false;
    }
    if bytes[i] == b'+' || bytes[i] == b'-' {
        i += 1;
    }
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => {
                has_digit = true;
                i += 1;
            }
            b'.' if !has_point && !has_exp => {
                has_point = true;
                i += 1;
            }
            b'e' | b'E' if !has_exp && has_digit => {
                has_exp = true;
                i += 1;
                if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                    i += 1;
                }
                if i >= bytes.len() || !bytes[i].is_ascii_digit() {
                    return false;
                }
            }
            b' ' | b'\t' => i += 1,
            _ => return false,
        }
    }
    has_digit
}
