//! Statement lowering.
//!
//! Each routine reads the child layout its grammar rule produces:
//! matched terminals appear as operator nodes, sub-rules as wrapper
//! nodes, and expressions as Pratt results, all in rule order. The
//! index comments below name the rule positions being picked out.

use abc_byt::Opcode;
use abc_lex::TokenKind;

use crate::{
    find_string_constant, find_variable_node, static_type, unwrap_expr, Codegen, CompileError,
    ValueKind,
};
use abc_par::{Node, NodeKind};

impl Codegen {
    pub(crate) fn compile_statement(&mut self, stmt: &Node) -> Result<(), CompileError> {
        use TokenKind as K;
        match stmt.token {
            K::Ident | K::Let => self.stmt_let(stmt),
            K::Print | K::Question => self.stmt_print(stmt),
            K::Input => self.stmt_input(stmt),
            K::If => self.stmt_if(stmt),
            K::Goto => self.stmt_jump(stmt, false),
            K::Gosub => self.stmt_jump(stmt, true),
            K::On => self.stmt_on(stmt),
            K::For => self.stmt_for(stmt),
            K::Next => self.stmt_next(stmt),
            K::Dim => self.stmt_dim(stmt),
            K::Data => self.stmt_data(stmt),
            K::Read => self.stmt_read(stmt),
            K::Restore => self.stmt_restore(stmt),
            K::Trap => self.stmt_trap(stmt),
            K::Randomize => self.stmt_randomize(stmt),
            K::Poke => self.stmt_poke(stmt),
            K::Open => self.stmt_open(stmt),
            K::Close => self.stmt_close(stmt),
            K::Put => self.stmt_put(stmt),
            K::Get => self.stmt_get(stmt),
            K::Note => self.stmt_note(stmt),
            K::Point => self.stmt_point(stmt),
            K::Status => self.stmt_status(stmt),
            K::Xio => self.stmt_xio(stmt),
            K::Return => {
                self.emit0(Opcode::Return);
                Ok(())
            }
            K::End => {
                self.emit0(Opcode::End);
                Ok(())
            }
            K::Stop => {
                self.emit0(Opcode::Stop);
                Ok(())
            }
            K::Clr => {
                self.emit0(Opcode::Clr);
                Ok(())
            }
            K::Deg => {
                self.emit0(Opcode::Deg);
                Ok(())
            }
            K::Rad => {
                self.emit0(Opcode::Rad);
                Ok(())
            }
            K::Pop => {
                self.emit0(Opcode::PopGosub);
                Ok(())
            }
            // Accepted syntactically; no runtime counterpart.
            _ => Ok(()),
        }
    }

    // =========================================================================
    // ASSIGNMENT
    // =========================================================================

    /// LET and implied LET. Rule layout: `[target, '=', value, eos]`,
    /// where `target` wraps `[variable, subscript-group]`.
    fn stmt_let(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 3 {
            return Ok(());
        }
        let target = &stmt.children[0];
        let value = &stmt.children[2];

        if target.kind == NodeKind::Expression && target.children.len() == 2 {
            let var_node = unwrap_expr(&target.children[0]);
            let group = &target.children[1];
            // Subscript group: [ '(', sub1, tail, ')' ].
            if var_node.kind == NodeKind::Variable && group.children.len() >= 4 {
                let sub1 = &group.children[1];
                let sub2 = group
                    .children
                    .get(2)
                    .and_then(|tail| tail.children.get(1));
                let is_string = var_node.is_string_name();
                let slot = self.variable_slot(var_node)?;

                self.compile_expr(sub1)?;
                if let Some(sub2) = sub2 {
                    self.compile_expr(sub2)?;
                }
                self.compile_expr(value)?;

                let opcode = match (sub2.is_some(), is_string) {
                    (false, false) => Opcode::ArraySet1D,
                    (false, true) => Opcode::StrArraySet1D,
                    (true, false) => Opcode::ArraySet2D,
                    (true, true) => Opcode::StrArraySet2D,
                };
                self.emit(opcode, slot);
                return Ok(());
            }
        }

        let var_node = unwrap_expr(target);
        if var_node.kind != NodeKind::Variable {
            return Ok(());
        }
        let slot = self.variable_slot(var_node)?;
        self.compile_expr(value)?;
        self.emit(
            if var_node.is_string_name() {
                Opcode::StrPopVar
            } else {
                Opcode::PopVar
            },
            slot,
        );
        Ok(())
    }

    // =========================================================================
    // PRINT / INPUT
    // =========================================================================

    /// PRINT children come straight from the parser in source order:
    /// an optional `#`+channel pair, then expressions and separators.
    fn stmt_print(&mut self, stmt: &Node) -> Result<(), CompileError> {
        let mut items = stmt.children.as_slice();
        if items
            .first()
            .map_or(false, |n| n.kind == NodeKind::Operator && n.token == TokenKind::Hash)
        {
            self.compile_expr(&items[1])?;
            self.emit0(Opcode::SetPrintChannel);
            items = &items[2..];
        }

        let mut trailing_separator = false;
        for child in items {
            if child.kind == NodeKind::Operator && child.token == TokenKind::Semicolon {
                // Suppresses the newline; spacing is the formatter's
                // job, no opcode.
                trailing_separator = true;
            } else if child.kind == NodeKind::Operator && child.token == TokenKind::Comma {
                self.emit0(Opcode::PrintTab);
                trailing_separator = true;
            } else if child.kind == NodeKind::FunctionCall && child.token == TokenKind::Tab {
                // TAB is a positioner here, not a printable value.
                self.compile_expr(child)?;
                trailing_separator = true;
            } else {
                self.compile_expr(child)?;
                match static_type(child) {
                    ValueKind::Str => self.emit0(Opcode::PrintStr),
                    ValueKind::Numeric => self.emit0(Opcode::PrintNum),
                }
                trailing_separator = false;
            }
        }

        if !trailing_separator {
            self.emit0(Opcode::PrintNewline);
        }
        Ok(())
    }

    /// INPUT rule layout: `[channel-group, prompt-group, read-group]`.
    ///
    /// A leading string variable parses into the prompt group (the
    /// prompt rule accepts any `<STR>`), so targets are collected from
    /// both the prompt and read groups; only a string constant
    /// becomes an actual prompt.
    fn stmt_input(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if let Some(prompt) = stmt.children.get(1).and_then(|n| find_string_constant(n)) {
            let index = self.intern_string(prompt.text());
            self.emit(Opcode::InputPrompt, index);
        }
        for group in stmt.children.iter().skip(1) {
            self.input_targets(group)?;
        }
        Ok(())
    }

    fn input_targets(&mut self, node: &Node) -> Result<(), CompileError> {
        if node.kind == NodeKind::Variable {
            let slot = self.variable_slot(node)?;
            self.emit(
                if node.is_string_name() {
                    Opcode::InputStr
                } else {
                    Opcode::InputNum
                },
                slot,
            );
            return Ok(());
        }
        for child in &node.children {
            self.input_targets(child)?;
        }
        Ok(())
    }

    /// Walk a READ variable list (`<NSVRL>`) and emit one read per
    /// target, chosen by variable type.
    fn read_targets(&mut self, list: &Node) -> Result<(), CompileError> {
        let mut current = Some(list);
        while let Some(node) = current {
            let Some(nsvar) = node.children.first() else {
                break;
            };
            if let Some(var_node) = find_variable_node(nsvar) {
                let slot = self.variable_slot(var_node)?;
                self.emit(
                    if var_node.is_string_name() {
                        Opcode::DataReadStr
                    } else {
                        Opcode::DataReadNum
                    },
                    slot,
                );
            }
            // Tail: [',', next-list] or empty.
            current = node.children.get(1).and_then(|tail| tail.children.get(1));
        }
        Ok(())
    }

    // =========================================================================
    // CONTROL FLOW
    // =========================================================================

    /// IF layout: `[cond, THEN?, body, else-group, eos]`.
    fn stmt_if(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 3 {
            return Ok(());
        }
        let cond = &stmt.children[0];
        let mut idx = 1;
        if stmt
            .children
            .get(idx)
            .map_or(false, |n| n.kind == NodeKind::Operator && n.token == TokenKind::Then)
        {
            idx += 1;
        }
        let Some(body) = stmt.children.get(idx) else {
            return Ok(());
        };
        let else_group = stmt
            .children
            .get(idx + 1)
            .filter(|n| !n.children.is_empty());

        self.compile_expr(cond)?;
        let jump_false_at = self.pc();
        self.emit(Opcode::JumpIfFalse, 0);

        self.compile_branch(body)?;

        if let Some(else_group) = else_group {
            let skip_else_at = self.pc();
            self.emit(Opcode::Jump, 0);
            self.patch_here(jump_false_at);
            // Else group: [ELSE, action].
            if let Some(action) = else_group.children.get(1) {
                self.compile_branch(action)?;
            }
            self.patch_here(skip_else_at);
        } else {
            self.patch_here(jump_false_at);
        }
        Ok(())
    }

    /// An IF consequent or ELSE action: a bare line number is a GOTO,
    /// anything else is a run of statements.
    fn compile_branch(&mut self, node: &Node) -> Result<(), CompileError> {
        let leaf = unwrap_expr(node);
        if leaf.kind == NodeKind::Constant && leaf.token == TokenKind::Number {
            self.emit_line_target(Opcode::Jump, leaf.value as u16);
            return Ok(());
        }
        self.compile_branch_statements(node)
    }

    fn compile_branch_statements(&mut self, node: &Node) -> Result<(), CompileError> {
        if node.kind == NodeKind::Statement {
            return self.compile_statement(node);
        }
        for child in &node.children {
            self.compile_branch_statements(child)?;
        }
        Ok(())
    }

    fn stmt_jump(&mut self, stmt: &Node, gosub: bool) -> Result<(), CompileError> {
        let Some(target) = stmt.children.first() else {
            return Ok(());
        };
        let leaf = unwrap_expr(target);
        if leaf.kind == NodeKind::Constant && leaf.token == TokenKind::Number {
            self.emit_line_target(
                if gosub { Opcode::Gosub } else { Opcode::Jump },
                leaf.value as u16,
            );
        } else {
            // Computed target: runtime line-map search.
            self.compile_expr(target)?;
            self.emit0(if gosub {
                Opcode::GosubLine
            } else {
                Opcode::JumpLine
            });
        }
        Ok(())
    }

    /// ON layout: `[index-expr, goto/gosub-group, target-list, eos]`.
    /// The instruction carries the target count; the targets follow as
    /// raw-operand slots.
    fn stmt_on(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 3 {
            return Ok(());
        }
        let is_gosub = unwrap_expr(&stmt.children[1]).token == TokenKind::Gosub;

        let mut targets = Vec::new();
        collect_on_targets(&stmt.children[2], &mut targets);
        let lines: Vec<u16> = targets
            .iter()
            .filter_map(|node| {
                let leaf = unwrap_expr(node);
                (leaf.kind == NodeKind::Constant).then_some(leaf.value as u16)
            })
            .collect();
        if lines.is_empty() {
            return Ok(());
        }

        self.compile_expr(&stmt.children[0])?;
        self.emit(
            if is_gosub {
                Opcode::OnGosub
            } else {
                Opcode::OnGoto
            },
            lines.len() as u16,
        );
        for line in lines {
            self.emit_raw_line_target(line);
        }
        Ok(())
    }

    /// FOR layout: `[var, '=', start, TO, limit, step-group, eos]`.
    fn stmt_for(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 6 {
            return Ok(());
        }
        let Some(var_node) = find_variable_node(&stmt.children[0]) else {
            return Ok(());
        };
        let slot = self.variable_slot(var_node)?;

        self.compile_expr(&stmt.children[2])?;
        self.compile_expr(&stmt.children[4])?;

        // Step group: [STEP, expr] when present, empty otherwise.
        let step_group = &stmt.children[5];
        if step_group.children.len() >= 2 {
            self.compile_expr(&step_group.children[1])?;
        } else {
            let index = self.intern_const(1.0);
            self.emit(Opcode::PushConst, index);
        }

        self.emit(Opcode::ForInit, slot);
        Ok(())
    }

    fn stmt_next(&mut self, stmt: &Node) -> Result<(), CompileError> {
        let mut vars = Vec::new();
        if let Some(list) = stmt.children.first() {
            collect_variables(list, &mut vars);
        }
        if vars.is_empty() {
            // Bare NEXT closes the innermost loop.
            self.emit(Opcode::ForNext, 0xFFFF);
            return Ok(());
        }
        for var_node in vars {
            let slot = self.variable_slot(var_node)?;
            self.emit(Opcode::ForNext, slot);
        }
        Ok(())
    }

    // =========================================================================
    // DIM / DATA / READ / RESTORE
    // =========================================================================

    /// DIM layout: a list of `[var, '(', dim1, tail, ')']` items.
    fn stmt_dim(&mut self, stmt: &Node) -> Result<(), CompileError> {
        let mut list = stmt.children.first();
        while let Some(node) = list {
            let Some(item) = node.children.first() else {
                break;
            };
            self.dim_item(item)?;
            list = node.children.get(1).and_then(|tail| tail.children.get(1));
        }
        Ok(())
    }

    fn dim_item(&mut self, item: &Node) -> Result<(), CompileError> {
        if item.children.len() < 5 {
            return Ok(());
        }
        let Some(var_node) = find_variable_node(&item.children[0]) else {
            return Ok(());
        };
        let dim1 = &item.children[2];
        let dim2 = item.children.get(3).and_then(|tail| tail.children.get(1));

        // Discovery already registered the array; this fetches the slot.
        let slot = self.add_array(var_node.text(), dim2.is_some(), None, None)?;

        self.compile_expr(dim1)?;
        if let Some(dim2) = dim2 {
            self.compile_expr(dim2)?;
            self.emit(Opcode::Dim2D, slot);
        } else {
            self.emit(Opcode::Dim1D, slot);
        }
        Ok(())
    }

    /// DATA contributes pool entries only; no code.
    fn stmt_data(&mut self, stmt: &Node) -> Result<(), CompileError> {
        let Some(list) = stmt.children.first() else {
            return Ok(());
        };
        if let Some(value) = list.children.first() {
            self.data_value(value);
        }
        let mut tail = list.children.get(1);
        while let Some(node) = tail {
            if node.children.is_empty() {
                break;
            }
            // Tail: [',', value, next-tail].
            if let Some(value) = node.children.get(1) {
                self.data_value(value);
            }
            tail = node.children.get(2);
        }
        Ok(())
    }

    fn data_value(&mut self, value: &Node) {
        if value.children.is_empty() {
            self.push_data_null();
            return;
        }
        if value.children.len() == 2 {
            // Signed numeric: [sign, number] folds into one value.
            let sign = if value.children[0].token == TokenKind::Minus {
                -1.0
            } else {
                1.0
            };
            self.push_data_numeric(sign * value.children[1].value);
            return;
        }
        let node = &value.children[0];
        match (node.kind, node.token) {
            (NodeKind::Constant, TokenKind::Number) => self.push_data_numeric(node.value),
            (NodeKind::Constant, TokenKind::String) => self.push_data_string(node.text()),
            // Bare identifiers in DATA store as strings.
            (NodeKind::Variable, _) => self.push_data_string(node.text()),
            _ => self.push_data_null(),
        }
    }

    fn stmt_read(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if let Some(list) = stmt.children.first() {
            self.read_targets(list)?;
        }
        Ok(())
    }

    fn stmt_restore(&mut self, stmt: &Node) -> Result<(), CompileError> {
        match stmt.children.first() {
            Some(first) if !first.is_empty_expr() => {
                self.compile_expr(first)?;
                self.emit0(Opcode::RestoreLine);
            }
            _ => self.emit(Opcode::Restore, 0),
        }
        Ok(())
    }

    // =========================================================================
    // SYSTEM
    // =========================================================================

    fn stmt_trap(&mut self, stmt: &Node) -> Result<(), CompileError> {
        let Some(first) = stmt.children.first() else {
            return Ok(());
        };
        if first.is_empty_expr() {
            self.emit0(Opcode::TrapDisable);
            return Ok(());
        }
        let leaf = unwrap_expr(first);
        if leaf.kind == NodeKind::Constant && leaf.token == TokenKind::Number {
            let line = leaf.value as i64;
            if (0..=32767).contains(&line) {
                self.emit_line_target(Opcode::Trap, line as u16);
            } else {
                // Out-of-range target is the classic disable idiom
                // (TRAP 40000).
                self.emit0(Opcode::TrapDisable);
            }
        }
        Ok(())
    }

    fn stmt_randomize(&mut self, stmt: &Node) -> Result<(), CompileError> {
        match stmt.children.first() {
            Some(first) if !first.is_empty_expr() => {
                self.compile_expr(first)?;
                self.emit0(Opcode::Randomize);
                Ok(())
            }
            _ => Err(CompileError::RandomizeWithoutArgument),
        }
    }

    fn stmt_poke(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 3 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[0])?;
        self.compile_expr(&stmt.children[2])?;
        self.emit0(Opcode::Poke);
        Ok(())
    }

    // =========================================================================
    // FILE I/O
    // =========================================================================

    /// OPEN layout: `['#', channel, ',', mode, ',', aux, ',', name, eos]`.
    /// Push order is channel, mode, aux, filename; the VM pops in
    /// reverse.
    fn stmt_open(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 8 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[1])?;
        self.compile_expr(&stmt.children[3])?;
        self.compile_expr(&stmt.children[5])?;
        self.compile_expr(&stmt.children[7])?;
        self.emit0(Opcode::Open);
        Ok(())
    }

    fn stmt_close(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() >= 2 {
            self.compile_expr(&stmt.children[1])?;
        } else {
            // Bare CLOSE: channel 0 is a no-op at runtime.
            let index = self.intern_const(0.0);
            self.emit(Opcode::PushConst, index);
        }
        self.emit0(Opcode::Close);
        Ok(())
    }

    fn stmt_put(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 4 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[1])?;
        self.compile_expr(&stmt.children[3])?;
        self.emit0(Opcode::Put);
        Ok(())
    }

    fn stmt_get(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 4 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[1])?;
        self.emit0(Opcode::Get);
        if let Some(var_node) = find_variable_node(&stmt.children[3]) {
            let slot = self.variable_slot(var_node)?;
            self.emit(Opcode::PopVar, slot);
        }
        Ok(())
    }

    /// NOTE pushes sector then byte; pop order is therefore byte
    /// first.
    fn stmt_note(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 6 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[1])?;
        self.emit0(Opcode::Note);
        let sector = find_variable_node(&stmt.children[3]);
        let byte = find_variable_node(&stmt.children[5]);
        if let (Some(sector), Some(byte)) = (sector, byte) {
            let sector_slot = self.variable_slot(sector)?;
            let byte_slot = self.variable_slot(byte)?;
            self.emit(Opcode::PopVar, byte_slot);
            self.emit(Opcode::PopVar, sector_slot);
        }
        Ok(())
    }

    fn stmt_point(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 6 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[1])?;
        self.compile_expr(&stmt.children[3])?;
        self.compile_expr(&stmt.children[5])?;
        self.emit0(Opcode::Point);
        Ok(())
    }

    fn stmt_status(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 4 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[1])?;
        self.emit0(Opcode::Status);
        if let Some(var_node) = find_variable_node(&stmt.children[3]) {
            let slot = self.variable_slot(var_node)?;
            self.emit(Opcode::PopVar, slot);
        }
        Ok(())
    }

    /// XIO layout: `[cmd, ',', '#', channel, ',', aux1, ',', aux2,
    /// ',', device, eos]`.
    fn stmt_xio(&mut self, stmt: &Node) -> Result<(), CompileError> {
        if stmt.children.len() < 10 {
            return Ok(());
        }
        self.compile_expr(&stmt.children[0])?;
        self.compile_expr(&stmt.children[3])?;
        self.compile_expr(&stmt.children[5])?;
        self.compile_expr(&stmt.children[7])?;
        self.compile_expr(&stmt.children[9])?;
        self.emit0(Opcode::Xio);
        Ok(())
    }
}

/// Collect ON target expressions from the nested `<EXPL>` chain.
fn collect_on_targets<'n>(expl: &'n Node, out: &mut Vec<&'n Node>) {
    if let Some(first) = expl.children.first() {
        out.push(first);
    }
    if let Some(tail) = expl.children.get(1) {
        if let Some(next) = tail.children.get(1) {
            collect_on_targets(next, out);
        }
    }
}

/// Collect variable nodes left-to-right (NEXT variable lists).
fn collect_variables<'n>(node: &'n Node, out: &mut Vec<&'n Node>) {
    if node.kind == NodeKind::Variable {
        out.push(node);
        return;
    }
    for child in &node.children {
        collect_variables(child, out);
    }
}
