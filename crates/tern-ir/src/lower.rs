//! Lowering AST → IR
//!
//! Converts the resolved AST to per-function control-flow graphs. Every
//! reachable function is lowered exactly once, fully, before the next one
//! starts.

use crate::instruction::{BinaryOp, CompareOp, Instruction, Value};
use crate::module::{Function, Module};
use crate::types::{ClassLayout, IrType};
use std::collections::{HashMap, VecDeque};
use tern_ast::*;
use tern_error::{CompileError, InternalError, Result};
use tracing::{debug, trace};

/// Name of the synthetic function running global initializers
pub const GLOBAL_INIT: &str = "__init__";

/// Builder configuration
#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// Top-level function the program starts at
    pub entry: String,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            entry: "main".to_string(),
        }
    }
}

/// Per-compilation lowering context
pub struct LoweringContext<'p> {
    program: &'p Program,
    /// Module being built
    pub module: Module,
    /// Counter for block names
    label_counter: u32,
    /// Lowered source types
    types: HashMap<Type, IrType>,
    /// IR names of functions already scheduled
    declared: HashMap<FunctionRef, String>,
    /// Functions scheduled but not yet lowered
    pending: VecDeque<FunctionRef>,
}

impl<'p> LoweringContext<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            module: Module::new(),
            label_counter: 0,
            types: HashMap::new(),
            declared: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Generates a unique suffix shared by the blocks of one construct
    fn new_label_id(&mut self) -> u32 {
        let id = self.label_counter;
        self.label_counter += 1;
        id
    }

    /// Lowers a source type, registering class layouts on first sight
    pub fn ir_type(&mut self, ty: &Type) -> Result<IrType> {
        if let Some(lowered) = self.types.get(ty) {
            return Ok(lowered.clone());
        }
        let lowered = match ty {
            Type::Int => IrType::I32,
            Type::Bool => IrType::I1,
            Type::String | Type::Null => IrType::string(),
            Type::Void => IrType::Void,
            Type::Unknown => return Err(InternalError::UnknownType.into()),
            Type::Array(base) => IrType::ptr(self.ir_type(base)?),
            Type::Class(name) => {
                let lowered = IrType::class_ptr(name.clone());
                // recorded first so self-referencing fields terminate
                self.types.insert(ty.clone(), lowered.clone());
                self.register_layout(name)?;
                return Ok(lowered);
            }
        };
        self.types.insert(ty.clone(), lowered.clone());
        Ok(lowered)
    }

    fn register_layout(&mut self, class: &str) -> Result<()> {
        if self.module.classes.contains_key(class) {
            return Ok(());
        }
        let program = self.program;
        let decl = program
            .class(class)
            .ok_or_else(|| InternalError::MissingLayout {
                class: class.to_string(),
            })?;

        let mut layout = ClassLayout::new(class);
        for field in &decl.fields {
            let ty = self.ir_type(&field.ty)?;
            layout.add_field(field.id, field.name.clone(), ty);
        }
        self.module.classes.insert(class.to_string(), layout);
        Ok(())
    }

    /// IR name of a function, scheduling it for lowering on first reference
    pub fn declare(&mut self, function: &FunctionRef) -> Result<String> {
        if let FunctionRef::Builtin(builtin) = function {
            self.module.declare_external(*builtin);
            return Ok(builtin.symbol().to_string());
        }
        if let Some(name) = self.declared.get(function) {
            return Ok(name.clone());
        }
        if self.program.function(function).is_none() {
            return Err(InternalError::MissingDeclaration {
                function: function.to_string(),
            }
            .into());
        }

        let name = match function {
            FunctionRef::Top { name } if name == "main" => name.clone(),
            FunctionRef::Top { name } => format!("__toplevel__.{}", name),
            FunctionRef::Member { class, name } => format!("{}.{}", class, name),
            FunctionRef::Builtin(builtin) => builtin.symbol().to_string(),
        };
        trace!(function = %function, ir_name = %name, "scheduled");
        self.declared.insert(function.clone(), name.clone());
        self.pending.push_back(function.clone());
        Ok(name)
    }

    /// IR name given by an earlier [`declare`](Self::declare)
    pub fn declared_name(&self, function: &FunctionRef) -> Result<String> {
        self.declared.get(function).cloned().ok_or_else(|| {
            InternalError::MissingDeclaration {
                function: function.to_string(),
            }
            .into()
        })
    }
}

/// Converts a resolved program to an IR module, starting from the entry
/// function. Only functions reachable from it are lowered.
pub fn lower(program: &Program, options: &LowerOptions) -> Result<Module> {
    let mut ctx = LoweringContext::new(program);

    for global in &program.globals {
        let ty = ctx.ir_type(&global.variable.ty)?;
        ctx.module.add_global(global.variable.name.clone(), ty);
    }

    let entry = FunctionRef::top(options.entry.clone());
    let entry_name = ctx.declare(&entry)?;

    let has_initializers = program.globals.iter().any(|g| g.init.is_some());
    if has_initializers {
        let init = lower_global_initializers(&mut ctx, program)?;
        ctx.module.add_function(init);
    }

    while let Some(reference) = ctx.pending.pop_front() {
        let decl = program
            .function(&reference)
            .ok_or_else(|| InternalError::MissingDeclaration {
                function: reference.to_string(),
            })?;
        let name = ctx.declared_name(&reference)?;
        let call_init = has_initializers && name == entry_name;

        let func = FunctionLowerer::new(&mut ctx, name)
            .lower_function(decl, call_init)?;
        debug!(function = %func.name, blocks = func.blocks.len(), "lowered function");
        ctx.module.add_function(func);
    }

    Ok(ctx.module)
}

fn lower_global_initializers(ctx: &mut LoweringContext<'_>, program: &Program) -> Result<Function> {
    let mut lowerer = FunctionLowerer::new(ctx, GLOBAL_INIT.to_string());
    lowerer.func.return_type = IrType::Void;
    for global in &program.globals {
        let Some(init) = &global.init else {
            continue;
        };
        let ty = lowerer.ctx.ir_type(&global.variable.ty)?;
        let value = lowerer.lower_expr(init)?;
        let value = lowerer.rvalue(value);
        lowerer.func.emit(Instruction::Store {
            ty,
            value,
            ptr: Value::global(global.variable.name.clone()),
        });
    }
    let func = lowerer.finish()?;
    debug!(function = %func.name, blocks = func.blocks.len(), "lowered global initializers");
    Ok(func)
}

/// Value produced while lowering an expression
#[derive(Debug, Clone)]
struct Operand {
    ty: IrType,
    /// `value` is the address of a `ty` and must be loaded to be read
    addressable: bool,
    value: Value,
}

impl Operand {
    fn direct(ty: IrType, value: Value) -> Self {
        Self {
            ty,
            addressable: false,
            value,
        }
    }

    fn place(ty: IrType, address: Value) -> Self {
        Self {
            ty,
            addressable: true,
            value: address,
        }
    }

    fn void() -> Self {
        Self::direct(IrType::Void, Value::Void)
    }
}

/// Continue and break blocks of a loop being lowered
#[derive(Debug, Clone)]
struct LoopTarget {
    continue_label: String,
    break_label: String,
}

struct FunctionLowerer<'c, 'p> {
    ctx: &'c mut LoweringContext<'p>,
    func: Function,
    /// Stack slot of every parameter and local
    locals: HashMap<VarId, (IrType, Value)>,
    /// Registered by loop identity for the duration of the loop body
    loop_targets: HashMap<LoopId, LoopTarget>,
    /// Receiver of a member function
    this: Option<Operand>,
}

impl<'c, 'p> FunctionLowerer<'c, 'p> {
    fn new(ctx: &'c mut LoweringContext<'p>, name: String) -> Self {
        Self {
            ctx,
            func: Function::new(name, IrType::Void),
            locals: HashMap::new(),
            loop_targets: HashMap::new(),
            this: None,
        }
    }

    fn new_temp(&mut self) -> u32 {
        self.func.new_temp()
    }

    fn emit(&mut self, inst: Instruction) {
        self.func.emit(inst);
    }

    fn open_block(&mut self, label: &str) {
        self.func.new_block(label);
    }

    fn jump(&mut self, target: &str) {
        self.emit(Instruction::Jump {
            target: target.to_string(),
        });
    }

    fn branch(&mut self, condition: Value, then_label: &str, else_label: &str) {
        self.emit(Instruction::Branch {
            condition,
            then_label: then_label.to_string(),
            else_label: else_label.to_string(),
        });
    }

    /// Reads an operand, loading it if it is a memory location
    fn rvalue(&mut self, operand: Operand) -> Value {
        if !operand.addressable {
            return operand.value;
        }
        let dest = self.new_temp();
        self.emit(Instruction::Load {
            dest,
            ty: operand.ty,
            ptr: operand.value,
        });
        Value::Temp(dest)
    }

    /// Lowers an expression and reads its value
    fn load_expr(&mut self, expr: &Expr) -> Result<(IrType, Value)> {
        let operand = self.lower_expr(expr)?;
        let ty = operand.ty.clone();
        Ok((ty, self.rvalue(operand)))
    }

    fn alloca(&mut self, ty: IrType) -> Value {
        let dest = self.new_temp();
        self.emit(Instruction::Alloca { dest, ty });
        Value::Temp(dest)
    }

    fn lower_function(mut self, decl: &FunctionDecl, call_init: bool) -> Result<Function> {
        self.func.return_type = self.ctx.ir_type(&decl.return_type)?;

        for param in &decl.params {
            let ty = self.ctx.ir_type(&param.ty)?;
            self.func.add_param(param.name.clone(), ty);
        }
        if let Some(class) = &decl.class {
            let ty = self.ctx.ir_type(&Type::class(class.clone()))?;
            self.func.add_param("this", ty.clone());
            self.this = Some(Operand::direct(ty, Value::Param(decl.params.len())));
        }

        // every parameter gets a slot, in declaration order
        for (index, param) in decl.params.iter().enumerate() {
            let ty = self.ctx.ir_type(&param.ty)?;
            let slot = self.alloca(ty.clone());
            self.emit(Instruction::Store {
                ty: ty.clone(),
                value: Value::Param(index),
                ptr: slot.clone(),
            });
            self.locals.insert(param.id, (ty, slot));
        }

        if call_init {
            self.emit(Instruction::Call {
                dest: None,
                ret: IrType::Void,
                function: GLOBAL_INIT.to_string(),
                args: vec![],
            });
        }

        for stmt in &decl.body {
            self.lower_stmt(stmt)?;
        }

        self.finish()
    }

    /// Closes the fall-through path, drops unreachable blocks and checks
    /// the termination invariant
    fn finish(mut self) -> Result<Function> {
        let open = self
            .func
            .current_block()
            .is_some_and(|block| !block.is_terminated());
        if open {
            let ty = self.func.return_type.clone();
            let value = match &ty {
                IrType::Void => Value::Void,
                IrType::Ptr(_) => Value::Null,
                _ => Value::Const(0),
            };
            self.emit(Instruction::Return { ty, value });
        }

        self.func.verify()?;
        let pruned = self.func.prune_unreachable();
        if pruned > 0 {
            trace!(function = %self.func.name, pruned, "pruned unreachable blocks");
        }
        Ok(self.func)
    }

    /// Converts statement
    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Empty => {}

            Stmt::Block(stmts) => {
                for s in stmts {
                    self.lower_stmt(s)?;
                }
            }

            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
            }

            Stmt::VarDecl(inits) => {
                for init in inits {
                    let ty = self.ctx.ir_type(&init.variable.ty)?;
                    let slot = self.alloca(ty.clone());
                    self.locals.insert(init.variable.id, (ty.clone(), slot.clone()));
                    if let Some(expr) = &init.init {
                        let (_, value) = self.load_expr(expr)?;
                        self.emit(Instruction::Store {
                            ty,
                            value,
                            ptr: slot,
                        });
                    }
                }
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let id = self.ctx.new_label_id();
                let then_label = format!("then.{}", id);
                let else_label = format!("else.{}", id);
                let end_label = format!("end.{}", id);

                let (_, cond) = self.load_expr(condition)?;
                let false_target = if else_branch.is_some() {
                    &else_label
                } else {
                    &end_label
                };
                self.branch(cond, &then_label, false_target);

                self.open_block(&then_label);
                self.lower_stmt(then_branch)?;
                self.jump(&end_label);

                if let Some(else_branch) = else_branch {
                    self.open_block(&else_label);
                    self.lower_stmt(else_branch)?;
                    self.jump(&end_label);
                }

                self.open_block(&end_label);
            }

            Stmt::While {
                id: loop_id,
                condition,
                body,
                ..
            } => {
                let id = self.ctx.new_label_id();
                let cond_label = format!("condition.{}", id);
                let body_label = format!("body.{}", id);
                let end_label = format!("end.{}", id);

                self.jump(&cond_label);

                self.open_block(&cond_label);
                let (_, cond) = self.load_expr(condition)?;
                self.branch(cond, &body_label, &end_label);

                self.open_block(&body_label);
                self.with_loop(*loop_id, &cond_label, &end_label, |this| this.lower_stmt(body))?;
                self.jump(&cond_label);

                self.open_block(&end_label);
            }

            Stmt::For {
                id: loop_id,
                init,
                condition,
                step,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.lower_stmt(init)?;
                }

                let id = self.ctx.new_label_id();
                let cond_label = format!("condition.{}", id);
                let body_label = format!("body.{}", id);
                let step_label = format!("step.{}", id);
                let end_label = format!("end.{}", id);

                self.jump(&cond_label);

                self.open_block(&cond_label);
                match condition {
                    Some(condition) => {
                        let (_, cond) = self.load_expr(condition)?;
                        self.branch(cond, &body_label, &end_label);
                    }
                    None => self.jump(&body_label),
                }

                self.open_block(&body_label);
                self.with_loop(*loop_id, &step_label, &end_label, |this| this.lower_stmt(body))?;
                self.jump(&step_label);

                self.open_block(&step_label);
                if let Some(step) = step {
                    self.lower_expr(step)?;
                }
                self.jump(&cond_label);

                self.open_block(&end_label);
            }

            Stmt::Break { target, .. } => {
                let label = self.loop_target(*target)?.break_label.clone();
                self.jump(&label);
            }

            Stmt::Continue { target, .. } => {
                let label = self.loop_target(*target)?.continue_label.clone();
                self.jump(&label);
            }

            Stmt::Return { value, .. } => {
                let inst = match value {
                    Some(expr) => {
                        let (ty, value) = self.load_expr(expr)?;
                        Instruction::Return { ty, value }
                    }
                    None => Instruction::Return {
                        ty: IrType::Void,
                        value: Value::Void,
                    },
                };
                self.emit(inst);
            }
        }
        Ok(())
    }

    /// Lowers a loop body with the loop's targets registered
    fn with_loop(
        &mut self,
        id: LoopId,
        continue_label: &str,
        break_label: &str,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.loop_targets.insert(
            id,
            LoopTarget {
                continue_label: continue_label.to_string(),
                break_label: break_label.to_string(),
            },
        );
        let result = body(self);
        self.loop_targets.remove(&id);
        result
    }

    fn loop_target(&self, id: LoopId) -> Result<&LoopTarget> {
        self.loop_targets
            .get(&id)
            .ok_or_else(|| InternalError::MissingLoopTarget { loop_id: id.0 }.into())
    }

    fn receiver(&self) -> Result<Operand> {
        self.this.clone().ok_or_else(|| {
            InternalError::UnresolvedReceiver {
                function: self.func.name.clone(),
            }
            .into()
        })
    }

    /// Address of a field of the object `object` points at
    fn member_address(&mut self, object: Value, object_ty: &IrType, field: &Variable) -> Result<Operand> {
        let class = object_ty
            .class_name()
            .ok_or_else(|| InternalError::Unresolved {
                construct: format!("member access `{}` on `{}`", field.name, object_ty),
            })?
            .to_string();
        let layout = self
            .ctx
            .module
            .layout(&class)
            .ok_or_else(|| InternalError::MissingLayout {
                class: class.clone(),
            })?;
        let index = layout
            .field_index(field.id)
            .ok_or_else(|| InternalError::MissingLayoutIndex {
                class: class.clone(),
                field: field.name.clone(),
            })?;
        let ty = layout.fields[index].ty.clone();

        let dest = self.new_temp();
        self.emit(Instruction::MemberAddr {
            dest,
            class,
            ptr: object,
            index,
            ty: ty.clone(),
        });
        Ok(Operand::place(ty, Value::Temp(dest)))
    }

    fn call(&mut self, function: &FunctionRef, args: Vec<(IrType, Value)>, result: &Type) -> Result<Operand> {
        let name = self.ctx.declare(function)?;
        let ret = self.ctx.ir_type(result)?;
        let dest = if ret.is_void() {
            None
        } else {
            Some(self.new_temp())
        };
        self.emit(Instruction::Call {
            dest,
            ret: ret.clone(),
            function: name,
            args,
        });
        Ok(match dest {
            Some(dest) => Operand::direct(ret, Value::Temp(dest)),
            None => Operand::void(),
        })
    }

    fn lower_args(&mut self, args: &[Expr]) -> Result<Vec<(IrType, Value)>> {
        args.iter().map(|arg| self.load_expr(arg)).collect()
    }

    /// Converts expression
    fn lower_expr(&mut self, expr: &Expr) -> Result<Operand> {
        match &expr.kind {
            ExprKind::IntLit(n) => Ok(Operand::direct(IrType::I32, Value::Const(*n))),

            ExprKind::BoolLit(b) => Ok(Operand::direct(IrType::I1, Value::Const(i32::from(*b)))),

            ExprKind::Null => Ok(Operand::direct(IrType::string(), Value::Null)),

            ExprKind::StringLit(text) => {
                let global = self.ctx.module.intern_literal(text);
                let dest = self.new_temp();
                // payload starts after the 4-byte length header
                self.emit(Instruction::ElementAddr {
                    dest,
                    ty: IrType::I8,
                    base: Value::Global(global),
                    index: Value::Const(4),
                });
                Ok(Operand::direct(IrType::string(), Value::Temp(dest)))
            }

            ExprKind::This => self.receiver(),

            ExprKind::Ident(variable) => match &variable.kind {
                VarKind::Parameter | VarKind::Local => {
                    let (ty, slot) = self.locals.get(&variable.id).cloned().ok_or_else(|| {
                        InternalError::Unresolved {
                            construct: format!("variable `{}`", variable.name),
                        }
                    })?;
                    Ok(Operand::place(ty, slot))
                }
                VarKind::Global => {
                    let ty = self.ctx.ir_type(&variable.ty)?;
                    Ok(Operand::place(ty, Value::global(variable.name.clone())))
                }
                VarKind::Field { .. } => {
                    let this = self.receiver()?;
                    self.member_address(this.value, &this.ty, variable)
                }
            },

            ExprKind::Member { object, field } => {
                let (object_ty, object) = self.load_expr(object)?;
                self.member_address(object, &object_ty, field)
            }

            ExprKind::Call { function, args } => {
                let mut args = self.lower_args(args)?;
                if function.is_member() {
                    let this = self.receiver()?;
                    args.push((this.ty, this.value));
                }
                self.call(function, args, &expr.ty)
            }

            ExprKind::MethodCall {
                receiver,
                function,
                args,
            } => {
                let receiver = self.load_expr(receiver)?;
                let mut args = self.lower_args(args)?;
                args.push(receiver);
                self.call(function, args, &expr.ty)
            }

            ExprKind::NewObject { class, constructor } => {
                let ty = self.ctx.ir_type(&Type::class(class.clone()))?;
                let slots = self
                    .ctx
                    .module
                    .layout(class)
                    .map(ClassLayout::slot_count)
                    .ok_or_else(|| InternalError::MissingLayout {
                        class: class.clone(),
                    })?;

                self.ctx.module.declare_external(Builtin::Malloc);
                let dest = self.new_temp();
                self.emit(Instruction::Call {
                    dest: Some(dest),
                    ret: ty.clone(),
                    function: Builtin::Malloc.symbol().to_string(),
                    args: vec![(IrType::I32, Value::Const(slots as i32))],
                });
                let object = Value::Temp(dest);

                if *constructor != FunctionRef::Builtin(Builtin::DefaultConstructor) {
                    self.call(constructor, vec![(ty.clone(), object.clone())], &Type::Void)?;
                }
                Ok(Operand::direct(ty, object))
            }

            ExprKind::NewArray { .. } => Err(CompileError::unsupported(format!(
                "dynamic array allocation `new {}`",
                expr.ty
            ))),

            ExprKind::Index { base, index } => {
                let (_, base) = self.load_expr(base)?;
                let (_, index) = self.load_expr(index)?;
                let ty = self.ctx.ir_type(&expr.ty)?;
                let dest = self.new_temp();
                self.emit(Instruction::ElementAddr {
                    dest,
                    ty: ty.clone(),
                    base,
                    index,
                });
                Ok(Operand::place(ty, Value::Temp(dest)))
            }

            ExprKind::Prefix { op, operand } => self.lower_prefix(*op, operand),

            ExprKind::Suffix { op, operand } => {
                let place = self.lower_place(operand, "suffix operator")?;
                let before = self.rvalue(place.clone());
                let op = match op {
                    SuffixOp::Inc => BinaryOp::Add,
                    SuffixOp::Dec => BinaryOp::Sub,
                };
                self.update_in_place(&place, op, before.clone());
                Ok(Operand::direct(IrType::I32, before))
            }

            ExprKind::Binary {
                op,
                operation,
                lhs,
                rhs,
            } => {
                let operation = operation.ok_or_else(|| InternalError::NoLowering {
                    operation: format!("`{}` on `{}` and `{}`", op, lhs.ty, rhs.ty),
                })?;
                self.lower_binary(operation, lhs, rhs)
            }

            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => self.lower_ternary(condition, then_branch, else_branch, &expr.ty),
        }
    }

    /// Lowers an expression that must denote a memory location
    fn lower_place(&mut self, expr: &Expr, context: &str) -> Result<Operand> {
        let operand = self.lower_expr(expr)?;
        if !operand.addressable {
            return Err(InternalError::Unresolved {
                construct: format!("{} applied to a non-lvalue", context),
            }
            .into());
        }
        Ok(operand)
    }

    /// `*place = current op 1`, returning the stored value
    fn update_in_place(&mut self, place: &Operand, op: BinaryOp, current: Value) -> Value {
        let dest = self.new_temp();
        self.emit(Instruction::Binary {
            dest,
            op,
            ty: IrType::I32,
            lhs: current,
            rhs: Value::Const(1),
        });
        self.emit(Instruction::Store {
            ty: IrType::I32,
            value: Value::Temp(dest),
            ptr: place.value.clone(),
        });
        Value::Temp(dest)
    }

    fn lower_prefix(&mut self, op: PrefixOp, operand: &Expr) -> Result<Operand> {
        match op {
            PrefixOp::Inc | PrefixOp::Dec => {
                let place = self.lower_place(operand, "prefix operator")?;
                let current = self.rvalue(place.clone());
                let op = if op == PrefixOp::Inc {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                self.update_in_place(&place, op, current);
                // the updated location itself, so `++x` stays assignable
                Ok(place)
            }
            PrefixOp::Not => {
                let (_, value) = self.load_expr(operand)?;
                let dest = self.new_temp();
                self.emit(Instruction::Compare {
                    dest,
                    op: CompareOp::Eq,
                    ty: IrType::I1,
                    lhs: value,
                    rhs: Value::Const(0),
                });
                Ok(Operand::direct(IrType::I1, Value::Temp(dest)))
            }
            PrefixOp::BitNot => {
                let (_, value) = self.load_expr(operand)?;
                Ok(self.int_binary(BinaryOp::Xor, value, Value::Const(-1)))
            }
            PrefixOp::Plus => {
                let (ty, value) = self.load_expr(operand)?;
                Ok(Operand::direct(ty, value))
            }
            PrefixOp::Neg => {
                let (_, value) = self.load_expr(operand)?;
                Ok(self.int_binary(BinaryOp::Sub, Value::Const(0), value))
            }
        }
    }

    fn int_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Operand {
        let dest = self.new_temp();
        self.emit(Instruction::Binary {
            dest,
            op,
            ty: IrType::I32,
            lhs,
            rhs,
        });
        Operand::direct(IrType::I32, Value::Temp(dest))
    }

    fn compare(&mut self, op: CompareOp, ty: IrType, lhs: Value, rhs: Value) -> Operand {
        let dest = self.new_temp();
        self.emit(Instruction::Compare {
            dest,
            op,
            ty,
            lhs,
            rhs,
        });
        Operand::direct(IrType::I1, Value::Temp(dest))
    }

    fn string_concat(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        let s = IrType::string();
        let result = self.call(
            &FunctionRef::Builtin(Builtin::StringConcatenate),
            vec![(s.clone(), lhs), (s, rhs)],
            &Type::String,
        )?;
        Ok(result.value)
    }

    /// Runtime string comparison; the byte it returns is normalized to i1
    fn string_compare(&mut self, cmp: Comparison, lhs: Value, rhs: Value) -> Result<Operand> {
        let builtin = match cmp {
            Comparison::Eq => Builtin::StringEqual,
            Comparison::Neq => Builtin::StringNeq,
            Comparison::Less => Builtin::StringLess,
            Comparison::Leq => Builtin::StringLeq,
            Comparison::Greater => Builtin::StringGreater,
            Comparison::Geq => Builtin::StringGeq,
        };
        self.ctx.module.declare_external(builtin);
        let s = IrType::string();
        let byte = self.new_temp();
        self.emit(Instruction::Call {
            dest: Some(byte),
            ret: IrType::I8,
            function: builtin.symbol().to_string(),
            args: vec![(s.clone(), lhs), (s, rhs)],
        });
        Ok(self.compare(CompareOp::Ne, IrType::I8, Value::Temp(byte), Value::Const(0)))
    }

    fn store(&mut self, place: &Operand, value: Value) -> Operand {
        self.emit(Instruction::Store {
            ty: place.ty.clone(),
            value,
            ptr: place.value.clone(),
        });
        Operand::void()
    }

    fn lower_binary(&mut self, operation: Operation, lhs: &Expr, rhs: &Expr) -> Result<Operand> {
        match operation {
            Operation::LogicAnd | Operation::LogicOr => {
                return self.lower_short_circuit(operation == Operation::LogicAnd, lhs, rhs);
            }
            Operation::Assign(_) => {
                let place = self.lower_place(lhs, "assignment")?;
                let (_, value) = self.load_expr(rhs)?;
                return Ok(self.store(&place, value));
            }
            Operation::IntCompound(op) => {
                let place = self.lower_place(lhs, "compound assignment")?;
                let current = self.rvalue(place.clone());
                let (_, value) = self.load_expr(rhs)?;
                let result = self.int_binary(arith_op(op), current, value);
                return Ok(self.store(&place, result.value));
            }
            Operation::StringCompound => {
                let place = self.lower_place(lhs, "compound assignment")?;
                let current = self.rvalue(place.clone());
                let (_, value) = self.load_expr(rhs)?;
                let result = self.string_concat(current, value)?;
                return Ok(self.store(&place, result));
            }
            _ => {}
        }

        let (lhs_ty, l) = self.load_expr(lhs)?;
        let (_, r) = self.load_expr(rhs)?;

        Ok(match operation {
            Operation::Int(op) => self.int_binary(arith_op(op), l, r),
            Operation::IntCompare(cmp) => self.compare(compare_op(cmp), IrType::I32, l, r),
            Operation::BoolCompare(cmp) => self.compare(compare_op(cmp), IrType::I1, l, r),
            Operation::PointerCompare(cmp) => self.compare(compare_op(cmp), lhs_ty, l, r),
            Operation::StringConcat => {
                let value = self.string_concat(l, r)?;
                Operand::direct(IrType::string(), value)
            }
            Operation::StringCompare(cmp) => self.string_compare(cmp, l, r)?,
            Operation::LogicAnd
            | Operation::LogicOr
            | Operation::Assign(_)
            | Operation::IntCompound(_)
            | Operation::StringCompound => {
                return Err(InternalError::NoLowering {
                    operation: operation.to_string(),
                }
                .into())
            }
        })
    }

    /// `a && b` / `a || b`: the right operand is only evaluated when the
    /// left one does not decide the result. The result lives in a bool slot.
    fn lower_short_circuit(&mut self, is_and: bool, lhs: &Expr, rhs: &Expr) -> Result<Operand> {
        let id = self.ctx.new_label_id();
        let rhs_label = format!("rhs.{}", id);
        let end_label = format!("merge.{}", id);

        let slot = self.alloca(IrType::I1);
        let (_, left) = self.load_expr(lhs)?;
        self.emit(Instruction::Store {
            ty: IrType::I1,
            value: left.clone(),
            ptr: slot.clone(),
        });
        if is_and {
            self.branch(left, &rhs_label, &end_label);
        } else {
            self.branch(left, &end_label, &rhs_label);
        }

        self.open_block(&rhs_label);
        let (_, right) = self.load_expr(rhs)?;
        self.emit(Instruction::Store {
            ty: IrType::I1,
            value: right,
            ptr: slot.clone(),
        });
        self.jump(&end_label);

        self.open_block(&end_label);
        Ok(Operand::place(IrType::I1, slot))
    }

    /// Diamond with a two-way phi. Both arms are always materialized.
    fn lower_ternary(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
        result: &Type,
    ) -> Result<Operand> {
        let id = self.ctx.new_label_id();
        let then_label = format!("then.{}", id);
        let else_label = format!("else.{}", id);
        let end_label = format!("end.{}", id);

        let (_, cond) = self.load_expr(condition)?;
        self.branch(cond, &then_label, &else_label);

        self.open_block(&then_label);
        let (_, then_value) = self.load_expr(then_branch)?;
        // nested diamonds may have moved the arm's exit block
        let then_exit = self.func.current_label().to_string();
        self.jump(&end_label);

        self.open_block(&else_label);
        let (_, else_value) = self.load_expr(else_branch)?;
        let else_exit = self.func.current_label().to_string();
        self.jump(&end_label);

        self.open_block(&end_label);
        let ty = self.ctx.ir_type(result)?;
        if ty.is_void() {
            return Ok(Operand::void());
        }
        let dest = self.new_temp();
        self.emit(Instruction::Phi {
            dest,
            ty: ty.clone(),
            incoming: vec![(then_value, then_exit), (else_value, else_exit)],
        });
        Ok(Operand::direct(ty, Value::Temp(dest)))
    }
}

fn arith_op(op: ArithOp) -> BinaryOp {
    match op {
        ArithOp::Add => BinaryOp::Add,
        ArithOp::Sub => BinaryOp::Sub,
        ArithOp::Mul => BinaryOp::Mul,
        ArithOp::Div => BinaryOp::SDiv,
        ArithOp::Rem => BinaryOp::SRem,
        ArithOp::And => BinaryOp::And,
        ArithOp::Or => BinaryOp::Or,
        ArithOp::Xor => BinaryOp::Xor,
        ArithOp::Shl => BinaryOp::Shl,
        ArithOp::Shr => BinaryOp::AShr,
        ArithOp::UShr => BinaryOp::LShr,
    }
}

fn compare_op(cmp: Comparison) -> CompareOp {
    match cmp {
        Comparison::Eq => CompareOp::Eq,
        Comparison::Neq => CompareOp::Ne,
        Comparison::Less => CompareOp::Slt,
        Comparison::Leq => CompareOp::Sle,
        Comparison::Greater => CompareOp::Sgt,
        Comparison::Geq => CompareOp::Sge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tern_ast::BinaryOp;
    use tern_error::Span;

    fn var(id: u32, name: &str, ty: Type, kind: VarKind) -> Variable {
        Variable {
            id: VarId(id),
            name: name.to_string(),
            ty,
            kind,
        }
    }

    fn int(n: i32) -> Expr {
        Expr::new(ExprKind::IntLit(n), Type::Int)
    }

    fn ident(v: &Variable) -> Expr {
        Expr::new(ExprKind::Ident(v.clone()), v.ty.clone())
    }

    fn binary(op: BinaryOp, operation: Operation, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op,
                operation: Some(operation),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        )
    }

    fn ret(value: Option<Expr>) -> Stmt {
        Stmt::Return {
            value,
            span: Span::default(),
        }
    }

    fn function(name: &str, params: Vec<Variable>, return_type: Type, body: Vec<Stmt>) -> FunctionDecl {
        FunctionDecl {
            name: name.to_string(),
            class: None,
            params,
            return_type,
            body,
            span: Span::default(),
        }
    }

    fn program(functions: Vec<FunctionDecl>) -> Program {
        Program {
            functions,
            ..Default::default()
        }
    }

    fn lower_entry(program: &Program, entry: &str) -> Result<Module> {
        lower(
            program,
            &LowerOptions {
                entry: entry.to_string(),
            },
        )
    }

    fn labels(func: &Function) -> Vec<&str> {
        func.blocks.iter().map(|b| b.label.as_str()).collect()
    }

    #[test]
    fn test_lower_simple_function() {
        // int f(int a) { int b = a + 1; return b; }
        let a = var(0, "a", Type::Int, VarKind::Parameter);
        let b = var(1, "b", Type::Int, VarKind::Local);
        let add = binary(
            BinaryOp::Add,
            Operation::Int(ArithOp::Add),
            ident(&a),
            int(1),
            Type::Int,
        );
        let f = function(
            "f",
            vec![a],
            Type::Int,
            vec![
                Stmt::VarDecl(vec![VarInit {
                    variable: b.clone(),
                    init: Some(add),
                }]),
                ret(Some(ident(&b))),
            ],
        );

        let module = lower_entry(&program(vec![f]), "f").unwrap();
        let func = module.get_function("__toplevel__.f").unwrap();
        assert_eq!(
            func.to_string(),
            "define i32 @__toplevel__.f(i32 %arg0 ; a) {\n\
             entry:\n\
             \x20 %t0 = alloca i32\n\
             \x20 store i32 %arg0, %t0\n\
             \x20 %t1 = alloca i32\n\
             \x20 %t2 = load i32, %t0\n\
             \x20 %t3 = add i32 %t2, 1\n\
             \x20 store i32 %t3, %t1\n\
             \x20 %t4 = load i32, %t1\n\
             \x20 ret i32 %t4\n\
             }\n"
        );
    }

    #[test]
    fn test_if_lowers_the_else_arm() {
        let x = var(0, "x", Type::Int, VarKind::Global);
        let assign = |n| {
            Stmt::Expr(binary(
                BinaryOp::Assign,
                Operation::Assign(AssignKind::Int),
                ident(&x),
                int(n),
                Type::Void,
            ))
        };
        let main = function(
            "main",
            vec![],
            Type::Int,
            vec![Stmt::If {
                condition: Expr::new(ExprKind::BoolLit(false), Type::Bool),
                then_branch: Box::new(assign(1)),
                else_branch: Some(Box::new(assign(2))),
                span: Span::default(),
            }],
        );
        let mut prog = program(vec![main]);
        prog.globals.push(GlobalDecl {
            variable: x.clone(),
            init: None,
        });

        let module = lower_entry(&prog, "main").unwrap();
        let func = module.get_function("main").unwrap();
        assert_eq!(labels(func), vec!["entry", "then.0", "else.0", "end.0"]);

        let stored = |label: &str| {
            func.get_block(label)
                .unwrap()
                .instructions
                .iter()
                .find_map(|i| match i {
                    Instruction::Store { value, .. } => Some(value.clone()),
                    _ => None,
                })
        };
        assert_eq!(stored("then.0"), Some(Value::Const(1)));
        assert_eq!(stored("else.0"), Some(Value::Const(2)));
        // implicit `return 0` of main
        assert_eq!(
            func.get_block("end.0").unwrap().terminator(),
            Some(&Instruction::Return {
                ty: IrType::I32,
                value: Value::Const(0)
            })
        );
    }

    #[test]
    fn test_if_without_else_branches_to_end() {
        let main = function(
            "main",
            vec![],
            Type::Void,
            vec![Stmt::If {
                condition: Expr::new(ExprKind::BoolLit(true), Type::Bool),
                then_branch: Box::new(Stmt::Empty),
                else_branch: None,
                span: Span::default(),
            }],
        );
        let module = lower_entry(&program(vec![main]), "main").unwrap();
        let func = module.get_function("main").unwrap();
        assert_eq!(labels(func), vec!["entry", "then.0", "end.0"]);
        assert_eq!(
            func.blocks[0].successors(),
            vec!["then.0", "end.0"]
        );
    }

    #[test]
    fn test_code_after_return_is_dropped() {
        let main = function(
            "main",
            vec![],
            Type::Int,
            vec![
                Stmt::If {
                    condition: Expr::new(ExprKind::BoolLit(true), Type::Bool),
                    then_branch: Box::new(ret(Some(int(1)))),
                    else_branch: Some(Box::new(ret(Some(int(2))))),
                    span: Span::default(),
                },
                ret(Some(int(3))),
            ],
        );
        let module = lower_entry(&program(vec![main]), "main").unwrap();
        let func = module.get_function("main").unwrap();

        // `end.0` has no incoming edge and is pruned
        assert_eq!(labels(func), vec!["entry", "then.0", "else.0"]);
        for block in &func.blocks {
            assert_eq!(block.instructions.iter().filter(|i| i.is_terminator()).count(), 1);
        }
    }

    #[test]
    fn test_ternary_keeps_both_arms_and_a_phi() {
        let ternary = Expr::new(
            ExprKind::Ternary {
                condition: Box::new(Expr::new(ExprKind::BoolLit(true), Type::Bool)),
                then_branch: Box::new(int(1)),
                else_branch: Box::new(int(2)),
            },
            Type::Int,
        );
        let main = function("main", vec![], Type::Int, vec![ret(Some(ternary))]);
        let module = lower_entry(&program(vec![main]), "main").unwrap();
        let func = module.get_function("main").unwrap();

        assert_eq!(labels(func), vec!["entry", "then.0", "else.0", "end.0"]);
        assert_eq!(
            func.get_block("end.0").unwrap().instructions[0],
            Instruction::Phi {
                dest: 0,
                ty: IrType::I32,
                incoming: vec![
                    (Value::Const(1), "then.0".to_string()),
                    (Value::Const(2), "else.0".to_string()),
                ],
            }
        );
    }

    #[test]
    fn test_unknown_type_is_internal_error() {
        let x = var(0, "x", Type::Unknown, VarKind::Local);
        let main = function(
            "main",
            vec![],
            Type::Void,
            vec![Stmt::VarDecl(vec![VarInit {
                variable: x,
                init: None,
            }])],
        );
        let err = lower_entry(&program(vec![main]), "main").unwrap_err();
        assert_eq!(err, CompileError::Internal(InternalError::UnknownType));
    }

    #[test]
    fn test_dynamic_array_is_unsupported() {
        let new_array = Expr::new(
            ExprKind::NewArray {
                element: Type::Int,
                dimensions: vec![int(4)],
            },
            Type::array_of(Type::Int),
        );
        let main = function("main", vec![], Type::Void, vec![Stmt::Expr(new_array)]);
        let err = lower_entry(&program(vec![main]), "main").unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }));
    }

    #[test]
    fn test_break_without_registered_loop() {
        let main = function(
            "main",
            vec![],
            Type::Void,
            vec![Stmt::Break {
                target: LoopId(9),
                span: Span::default(),
            }],
        );
        let err = lower_entry(&program(vec![main]), "main").unwrap_err();
        assert_eq!(
            err,
            CompileError::Internal(InternalError::MissingLoopTarget { loop_id: 9 })
        );
    }

    #[test]
    fn test_missing_entry() {
        let err = lower_entry(&program(vec![]), "main").unwrap_err();
        assert!(matches!(
            err,
            CompileError::Internal(InternalError::MissingDeclaration { .. })
        ));
    }

    #[test]
    fn test_declared_name_requires_declaration() {
        let prog = program(vec![function("helper", vec![], Type::Void, vec![])]);
        let mut ctx = LoweringContext::new(&prog);
        let helper = FunctionRef::top("helper");

        assert!(matches!(
            ctx.declared_name(&helper),
            Err(CompileError::Internal(InternalError::MissingDeclaration { .. }))
        ));
        assert_eq!(ctx.declare(&helper).unwrap(), "__toplevel__.helper");
        assert_eq!(ctx.declared_name(&helper).unwrap(), "__toplevel__.helper");
    }

    #[test]
    fn test_missing_binary_operation() {
        let expr = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                operation: None,
                lhs: Box::new(int(1)),
                rhs: Box::new(int(2)),
            },
            Type::Int,
        );
        let main = function("main", vec![], Type::Void, vec![Stmt::Expr(expr)]);
        let err = lower_entry(&program(vec![main]), "main").unwrap_err();
        assert!(matches!(
            err,
            CompileError::Internal(InternalError::NoLowering { .. })
        ));
    }

    #[test]
    fn test_recursive_function_lowered_once() {
        let n = var(0, "n", Type::Int, VarKind::Parameter);
        let call = Expr::new(
            ExprKind::Call {
                function: FunctionRef::top("loop_forever"),
                args: vec![ident(&n)],
            },
            Type::Int,
        );
        let recursive = function("loop_forever", vec![n], Type::Int, vec![ret(Some(call))]);
        let main_call = Expr::new(
            ExprKind::Call {
                function: FunctionRef::top("loop_forever"),
                args: vec![int(3)],
            },
            Type::Int,
        );
        let unused = function("unused", vec![], Type::Void, vec![]);
        let main = function("main", vec![], Type::Int, vec![ret(Some(main_call))]);

        let module = lower_entry(&program(vec![main, recursive, unused]), "main").unwrap();
        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["main", "__toplevel__.loop_forever"]);
    }

    #[test]
    fn test_self_referencing_class_layout() {
        let next = var(
            1,
            "next",
            Type::class("Node"),
            VarKind::Field {
                class: "Node".to_string(),
            },
        );
        let node = ClassDecl {
            name: "Node".to_string(),
            fields: vec![
                var(0, "value", Type::Int, VarKind::Field { class: "Node".to_string() }),
                next,
            ],
            methods: vec![],
            constructor: None,
            span: Span::default(),
        };
        let new_node = Expr::new(
            ExprKind::NewObject {
                class: "Node".to_string(),
                constructor: FunctionRef::Builtin(Builtin::DefaultConstructor),
            },
            Type::class("Node"),
        );
        let main = function("main", vec![], Type::Void, vec![Stmt::Expr(new_node)]);
        let mut prog = program(vec![main]);
        prog.classes.push(node);

        let module = lower_entry(&prog, "main").unwrap();
        assert_eq!(
            module.layout("Node").unwrap().to_string(),
            "%Node = type { i32, %Node* }"
        );

        let entry = &module.get_function("main").unwrap().blocks[0];
        assert_eq!(
            entry.instructions[0],
            Instruction::Call {
                dest: Some(0),
                ret: IrType::class_ptr("Node"),
                function: "__malloc__".to_string(),
                args: vec![(IrType::I32, Value::Const(2))],
            }
        );
        // the default constructor is never called
        assert_eq!(entry.instructions.len(), 2);
    }
}
