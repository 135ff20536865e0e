//! Bytecode compiler: transforms AST into bytecode.
//!
//! Each function body compiles in its own `CompilationScope`, which tracks
//! the emitted instruction stream, the last two emitted instructions (for
//! the trailing-pop and if-arm peepholes), and the back-patch lists for
//! `break`/`continue` jumps of each enclosing loop.

use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::bytecode::chunk::Bytecode;
use crate::bytecode::instruction::{make, Instructions, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::error::CompileError;
use crate::object::{CompiledFunction, Value, BUILTINS};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Placeholder operand for jumps that are patched later.
const PLACEHOLDER: usize = 9999;

/// Opcode + offset of an emitted instruction.
#[derive(Debug, Clone, Copy, Default)]
struct EmittedInstruction {
    opcode: Option<OpCode>,
    position: usize,
}

/// Emission state for one function body.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: EmittedInstruction,
    previous_instruction: EmittedInstruction,
    /// One list of pending break-jump offsets per enclosing loop.
    break_stack: Vec<Vec<usize>>,
    /// One list of pending continue-jump offsets per enclosing loop.
    continue_stack: Vec<Vec<usize>>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (i, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(i, builtin.name);
        }

        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Resume compilation with state carried over from a previous run; the
    /// REPL uses this to keep bindings and constants across inputs.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Compile a program into bytecode.
    pub fn compile(&mut self, program: &Program) -> CompileResult<Bytecode> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }

        Ok(Bytecode::new(
            self.scopes[self.scope_index].instructions.clone(),
            self.constants.clone(),
        ))
    }

    /// Hand back the symbol table and constant pool for a later
    /// `new_with_state`.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    // ===== Statements =====

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
            }

            StmtKind::Let { name, value } => {
                // `let` defines (or redefines) in the current table without
                // recursing outward; a Function-scope self-name is replaced
                // by a fresh binding
                let symbol = match self.symbol_table.resolve_current(name) {
                    Some(symbol) if symbol.scope != SymbolScope::Function => symbol,
                    _ => self.symbol_table.define(name.clone()),
                };

                match value {
                    Some(expr) => self.compile_expression(expr)?,
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                }
                self.emit_store(&symbol);
            }

            StmtKind::Assign { name, value } => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::NotDeclared(name.clone()))?;

                self.compile_expression(value)?;

                match symbol.scope {
                    SymbolScope::Global | SymbolScope::Local => self.emit_store(&symbol),
                    SymbolScope::Free => {
                        return Err(CompileError::AssignToCaptured(name.clone()))
                    }
                    SymbolScope::Builtin => return Err(CompileError::AssignToBuiltin),
                    SymbolScope::Function => {
                        return Err(CompileError::NotDeclared(name.clone()))
                    }
                }
            }

            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.compile_expression(expr)?,
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                }
                self.emit(OpCode::ReturnValue, &[]);
            }

            StmtKind::For { condition, body } => self.compile_for(condition.as_ref(), body)?,

            StmtKind::Break => {
                let jump = self.emit(OpCode::Jump, &[PLACEHOLDER]);
                self.scope_mut()
                    .break_stack
                    .last_mut()
                    .ok_or(CompileError::BreakOutsideLoop)?
                    .push(jump);
            }

            StmtKind::Continue => {
                let jump = self.emit(OpCode::Jump, &[PLACEHOLDER]);
                self.scope_mut()
                    .continue_stack
                    .last_mut()
                    .ok_or(CompileError::ContinueOutsideLoop)?
                    .push(jump);
            }
        }

        Ok(())
    }

    fn compile_for(&mut self, condition: Option<&Expr>, body: &[Stmt]) -> CompileResult<()> {
        let scope = self.scope_mut();
        scope.break_stack.push(Vec::new());
        scope.continue_stack.push(Vec::new());

        let loop_start = self.current_offset();

        let exit_jump = match condition {
            Some(condition) => {
                self.compile_expression(condition)?;
                Some(self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]))
            }
            None => None,
        };

        self.compile_block(body)?;
        self.emit(OpCode::Jump, &[loop_start]);

        let after_loop = self.current_offset();
        if let Some(exit_jump) = exit_jump {
            self.change_operand(exit_jump, after_loop);
        }

        let scope = self.scope_mut();
        let breaks = scope.break_stack.pop().unwrap_or_default();
        let continues = scope.continue_stack.pop().unwrap_or_default();
        for position in breaks {
            self.change_operand(position, after_loop);
        }
        for position in continues {
            self.change_operand(position, loop_start);
        }

        Ok(())
    }

    /// Compile a statement block. An empty block still has to be
    /// stack-neutral, so it lowers to a null push that is immediately
    /// popped; the if-expression peephole strips the pop when the block is
    /// an if-arm.
    fn compile_block(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        if statements.is_empty() {
            self.emit(OpCode::Null, &[]);
            self.emit(OpCode::Pop, &[]);
            return Ok(());
        }

        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    // ===== Expressions =====

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                let idx = self.add_constant(Value::Integer(*n));
                self.emit(OpCode::Constant, &[idx]);
            }

            ExprKind::StringLiteral(s) => {
                let idx = self.add_constant(Value::string(s.clone()));
                self.emit(OpCode::Constant, &[idx]);
            }

            ExprKind::BoolLiteral(true) => {
                self.emit(OpCode::True, &[]);
            }
            ExprKind::BoolLiteral(false) => {
                self.emit(OpCode::False, &[]);
            }

            ExprKind::Null => {
                self.emit(OpCode::Null, &[]);
            }

            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
            }

            ExprKind::Builtin(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UnknownBuiltin(name.clone()))?;
                self.load_symbol(&symbol);
            }

            ExprKind::Prefix { operator, rhs } => {
                self.compile_expression(rhs)?;
                match operator {
                    UnaryOp::Bang => self.emit(OpCode::Bang, &[]),
                    UnaryOp::Minus => self.emit(OpCode::Minus, &[]),
                };
            }

            ExprKind::Infix { operator, lhs, rhs } => {
                // `>` and `>=` reuse the less-than opcodes with swapped
                // operands, so the VM only knows one comparison direction
                if matches!(operator, BinaryOp::Greater | BinaryOp::GreaterEq) {
                    self.compile_expression(rhs)?;
                    self.compile_expression(lhs)?;
                } else {
                    self.compile_expression(lhs)?;
                    self.compile_expression(rhs)?;
                }

                match operator {
                    BinaryOp::Add => self.emit(OpCode::Add, &[]),
                    BinaryOp::Sub => self.emit(OpCode::Sub, &[]),
                    BinaryOp::Mul => self.emit(OpCode::Mul, &[]),
                    BinaryOp::Div => self.emit(OpCode::Div, &[]),
                    BinaryOp::Eq => self.emit(OpCode::Eq, &[]),
                    BinaryOp::NotEq => self.emit(OpCode::NotEq, &[]),
                    BinaryOp::Less | BinaryOp::Greater => self.emit(OpCode::LessThan, &[]),
                    BinaryOp::LessEq | BinaryOp::GreaterEq => {
                        self.emit(OpCode::LessThanEq, &[])
                    }
                };
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_deref())?,

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }

            ExprKind::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Hash, &[pairs.len()]);
            }

            ExprKind::Index { container, index } => {
                self.compile_expression(container)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
            }

            ExprKind::Function {
                parameters,
                body,
                name,
            } => self.compile_function_literal(parameters, body, name)?,

            ExprKind::Call { callee, arguments } => {
                // builtin calls use the array-argument convention because
                // they can be variadic; see push for an example
                if let ExprKind::Builtin(name) = &callee.kind {
                    return self.compile_builtin_call(name, arguments);
                }

                self.compile_expression(callee)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }
        }

        Ok(())
    }

    /// Lower an if-expression so exactly one value is always left on the
    /// stack: a consequence's trailing pop is stripped, an arm that did not
    /// push gets a null, and a missing alternative becomes null.
    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &[Stmt],
        alternative: Option<&[Stmt]>,
    ) -> CompileResult<()> {
        self.compile_expression(condition)?;

        let jump_not_truthy = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(OpCode::Pop) {
            self.remove_last_pop();
        }
        if !self.last_instruction_is_push() {
            self.emit(OpCode::Null, &[]);
        }

        let jump = self.emit(OpCode::Jump, &[PLACEHOLDER]);
        let after_consequence = self.current_offset();
        self.change_operand(jump_not_truthy, after_consequence);

        match alternative {
            None => {
                self.emit(OpCode::Null, &[]);
            }
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }
                if !self.last_instruction_is_push() {
                    self.emit(OpCode::Null, &[]);
                }
            }
        }

        let after_alternative = self.current_offset();
        self.change_operand(jump, after_alternative);

        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        parameters: &[String],
        body: &[Stmt],
        name: &str,
    ) -> CompileResult<()> {
        self.enter_scope();

        if !name.is_empty() {
            self.symbol_table.define_function_name(name);
        }
        for parameter in parameters {
            self.symbol_table.define(parameter.clone());
        }

        self.compile_block(body)?;

        // the implicit value of the final expression becomes the return
        // value; bodies that end without one return null
        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) {
            self.emit(OpCode::Return, &[]);
        }

        let free_symbols = std::mem::take(&mut self.symbol_table.free_symbols);
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        // materialize each captured value on the enclosing stack, using the
        // load the *outer* scope needs for it
        let num_free = free_symbols.len();
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let func = CompiledFunction::new(instructions, num_locals, parameters.len());
        let idx = self.add_constant(Value::CompiledFunction(Rc::new(func)));
        self.emit(OpCode::Closure, &[idx, num_free]);

        Ok(())
    }

    fn compile_builtin_call(&mut self, name: &str, arguments: &[Expr]) -> CompileResult<()> {
        let symbol = self
            .symbol_table
            .resolve(name)
            .ok_or_else(|| CompileError::UnknownBuiltin(name.to_string()))?;
        self.load_symbol(&symbol);

        // 1. put all args on the stack
        // 2. squash them into a single array arg
        // 3. call the builtin with that one array argument
        for argument in arguments {
            self.compile_expression(argument)?;
        }
        self.emit(OpCode::Array, &[arguments.len()]);
        self.emit(OpCode::Call, &[1]);
        Ok(())
    }

    // ===== Symbols =====

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
    }

    fn emit_store(&mut self, symbol: &Symbol) {
        if symbol.scope == SymbolScope::Global {
            self.emit(OpCode::SetGlobal, &[symbol.index]);
        } else {
            self.emit(OpCode::SetLocal, &[symbol.index]);
        }
    }

    // ===== Emission =====

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, op: OpCode, position: usize) {
        let scope = self.scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = EmittedInstruction {
            opcode: Some(op),
            position,
        };
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.scopes[self.scope_index].last_instruction.opcode == Some(op)
    }

    /// Whether the last emitted instruction leaves a value on the stack.
    fn last_instruction_is_push(&self) -> bool {
        !matches!(
            self.scopes[self.scope_index].last_instruction.opcode,
            Some(OpCode::Pop)
                | Some(OpCode::Jump)
                | Some(OpCode::JumpNotTruthy)
                | Some(OpCode::SetGlobal)
                | Some(OpCode::SetLocal)
        )
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope_mut();
        scope
            .instructions
            .truncate(scope.last_instruction.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = self.scopes[self.scope_index].last_instruction.position;
        self.replace_instruction(position, &make(OpCode::ReturnValue, &[]));
        self.scope_mut().last_instruction.opcode = Some(OpCode::ReturnValue);
    }

    fn replace_instruction(&mut self, position: usize, instruction: &[u8]) {
        let scope = self.scope_mut();
        scope.instructions[position..position + instruction.len()]
            .copy_from_slice(instruction);
    }

    /// Rewrite the operand of the jump emitted at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::from_u8(self.scopes[self.scope_index].instructions[position])
            .expect("patching a non-instruction offset");
        self.replace_instruction(position, &make(op, &[operand]));
    }

    fn current_offset(&self) -> usize {
        self.scopes[self.scope_index].instructions.len()
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        &mut self.scopes[self.scope_index]
    }

    // ===== Scopes =====

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;

        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leaving the root scope");
        self.scope_index -= 1;

        let inner = std::mem::take(&mut self.symbol_table);
        self.symbol_table = inner
            .outer
            .map(|outer| *outer)
            .expect("function scope had no enclosing table");

        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
