//! AST-to-IR lowering (component D).
//!
//! The translator dispatches on AST node kind to a handler. Each handler
//! emits its instructions directly onto the current function's running
//! code list (in place of threading a separate per-node list that the
//! caller splices in): because handlers are always invoked in the exact
//! order their operands should be evaluated, appending straight to the
//! function's `InterCode` already preserves left-to-right evaluation
//! order, without needing a second data structure to merge afterwards.

use crate::common::{Id, Line};
use crate::error::{Diagnostics, SemanticError, SemanticWarning};
use crate::front::ast::*;
use crate::front::bool::{is_boolean_expr, lower_bool_as_value, lower_if, lower_while};
use crate::middle::{ArrayCopy, Instruction, Module, UnOp, ValueRef};
use crate::types::Type;

/// Evaluate a constant integer expression, the only kind MiniC accepts
/// for array dimensions and global initializers. Returns `None` if the
/// expression is not a compile-time constant.
fn const_eval(e: &Expr) -> Option<i32> {
    match e {
        Expr::IntLit(v) => Some(*v),
        Expr::Neg(inner) => const_eval(inner).map(|v| -v),
        Expr::Binary { op, lhs, rhs } if !op.is_logical() && !op.is_relational() => {
            let l = const_eval(lhs)?;
            let r = const_eval(rhs)?;
            Some(match op {
                BOp::Add => l.wrapping_add(r),
                BOp::Sub => l.wrapping_sub(r),
                BOp::Mul => l.wrapping_mul(r),
                BOp::Div if r != 0 => l / r,
                BOp::Mod if r != 0 => l % r,
                _ => return None,
            })
        }
        _ => None,
    }
}

fn base_to_type(b: BaseType) -> Type {
    match b {
        BaseType::Int => Type::Int32,
        BaseType::Void => Type::Void,
    }
}

/// Resolve a declarator's dimension expressions into concrete sizes,
/// reporting a [`SemanticError::NonConstantArrayDimension`] for any
/// dimension that is not a compile-time constant (recorded as size 0 so
/// lowering can keep going).
fn resolve_dims(diags: &mut Diagnostics, line: Line, dims: &[Expr]) -> Vec<usize> {
    dims.iter()
        .map(|e| match const_eval(e) {
            Some(v) if v >= 0 => v as usize,
            _ => {
                diags.error(SemanticError::NonConstantArrayDimension { line });
                0
            }
        })
        .collect()
}

fn declarator_type(diags: &mut Diagnostics, base: BaseType, decl: &Declarator) -> Type {
    let elem = base_to_type(base);
    if decl.dims.is_empty() {
        elem
    } else {
        Type::array_of(elem, resolve_dims(diags, decl.line, &decl.dims))
    }
}

fn param_type(diags: &mut Diagnostics, base: BaseType, param: &Param) -> Type {
    let elem = base_to_type(base);
    if param.dims.is_empty() {
        return elem;
    }
    let dims = param
        .dims
        .iter()
        .map(|d| match d {
            None => 0,
            Some(e) => match const_eval(e) {
                Some(v) if v >= 0 => v as usize,
                _ => {
                    diags.error(SemanticError::NonConstantArrayDimension { line: param.line });
                    0
                }
            },
        })
        .collect();
    Type::array_of(elem, dims)
}

/// Entry point: lower a whole parsed program into a [`Module`].
pub fn lower(program: &Program) -> (Module, Diagnostics) {
    let mut module = Module::new();
    let mut diags = Diagnostics::new();
    for item in &program.items {
        match item {
            Item::VarDecl(vd) => lower_global_decl(&mut module, &mut diags, vd),
            Item::FuncDef(fd) => lower_func_def(&mut module, &mut diags, fd),
        }
    }
    (module, diags)
}

fn lower_global_decl(module: &mut Module, diags: &mut Diagnostics, vd: &VarDecl) {
    for decl in &vd.declarators {
        let ty = declarator_type(diags, vd.base_type, decl);
        let value = module.new_var_value(ty, Some(decl.name));
        if let Some(init) = &decl.init {
            if let ValueRef::Global(gid) = value {
                match const_eval(init) {
                    Some(v) => module.globals[gid.0 as usize].init = Some(v),
                    None => diags.warn(SemanticWarning::AssignTypeMismatch {
                        line: decl.line,
                        name: decl.name.to_string(),
                    }),
                }
            }
        }
    }
}

fn lower_func_def(module: &mut Module, diags: &mut Diagnostics, fd: &FuncDef) {
    if module.current_function().is_some() {
        diags.error(SemanticError::NestedFunctionDefinition { line: fd.line });
        return;
    }
    let ret_type = base_to_type(fd.ret_type);
    if module.new_function(fd.name, ret_type.clone()).is_none() {
        diags.error(SemanticError::DuplicateFunction {
            line: fd.line,
            name: fd.name.to_string(),
        });
        return;
    }

    module.with_scope(|module| {
        module.push_inst(Instruction::Entry);

        if !ret_type.is_void() {
            let ret_value = module.new_var_value(ret_type.clone(), None);
            if let ValueRef::Local(id) = ret_value {
                module.set_ret_slot(id);
            }
            if *fd.name == "main" {
                let zero = ValueRef::Const(module.new_const_int(0));
                module.push_inst(Instruction::Move {
                    dst: ret_value,
                    src: zero,
                    array_copy: None,
                });
            }
        }

        for (index, param) in fd.params.iter().enumerate() {
            let ty = param_type(diags, param.base_type, param);
            let formal = module.new_formal_param(ty.clone(), param.name, index as u32);
            let bound = if ty.is_array() {
                module.new_array_param_local(ty.clone(), param.name)
            } else {
                module.new_var_value(ty.clone(), Some(param.name))
            };
            let array_copy: ArrayCopy = if ty.is_array() {
                Some(ty.dimensions().to_vec())
            } else {
                None
            };
            module.push_inst(Instruction::Move {
                dst: bound,
                src: ValueRef::Local(formal),
                array_copy,
            });
        }

        lower_block(module, diags, &fd.body, false);

        let exit_label = module.exit_label();
        module.push_inst(Instruction::Label(exit_label));
        let ret_slot = module.ret_slot().map(ValueRef::Local);
        module.push_inst(Instruction::Exit(ret_slot));
    });

    module.finish_function();
}

fn lower_block(module: &mut Module, diags: &mut Diagnostics, block: &Block, enter_scope: bool) {
    if enter_scope {
        module.with_scope(|module| {
            for stmt in &block.stmts {
                lower_stmt(module, diags, stmt);
            }
        });
    } else {
        for stmt in &block.stmts {
            lower_stmt(module, diags, stmt);
        }
    }
}

pub fn lower_stmt(module: &mut Module, diags: &mut Diagnostics, stmt: &Stmt) {
    match stmt {
        Stmt::Block(b) => lower_block(module, diags, b, true),
        Stmt::VarDecl(vd) => lower_local_decl(module, diags, vd),
        Stmt::Expr(e) => {
            lower_expr_value(module, diags, e);
        }
        Stmt::Assign { target, value, line } => lower_assign(module, diags, target, value, *line),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => lower_if(module, diags, cond, then_branch, else_branch.as_deref()),
        Stmt::While { cond, body } => lower_while(module, diags, cond, body),
        Stmt::Break(line) => match module.break_label() {
            Some(label) => {
                module.push_inst(Instruction::Goto(label));
            }
            None => diags.error(SemanticError::BreakOutsideLoop { line: *line }),
        },
        Stmt::Continue(line) => match module.continue_label() {
            Some(label) => {
                module.push_inst(Instruction::Goto(label));
            }
            None => diags.error(SemanticError::ContinueOutsideLoop { line: *line }),
        },
        Stmt::Return { value, line } => lower_return(module, diags, value.as_ref(), *line),
        Stmt::Empty => {}
    }
}

fn lower_local_decl(module: &mut Module, diags: &mut Diagnostics, vd: &VarDecl) {
    for decl in &vd.declarators {
        let ty = declarator_type(diags, vd.base_type, decl);
        let var = module.new_var_value(ty, Some(decl.name));
        if let Some(init) = &decl.init {
            let value = lower_expr_value(module, diags, init);
            module.push_inst(Instruction::Move {
                dst: var,
                src: value,
                array_copy: None,
            });
        }
    }
}

fn lower_return(module: &mut Module, diags: &mut Diagnostics, value: Option<&Expr>, line: Line) {
    let func_name = module.current_function().unwrap().name.to_string();
    let declared_void = module.current_function().unwrap().return_type.is_void();
    match (value, declared_void) {
        (Some(expr), _) => {
            if declared_void {
                diags.warn(SemanticWarning::ReturnTypeMismatch { line, func: func_name });
            }
            let v = lower_expr_value(module, diags, expr);
            if let Some(ret_id) = module.ret_slot() {
                module.push_inst(Instruction::Move {
                    dst: ValueRef::Local(ret_id),
                    src: v,
                    array_copy: None,
                });
            }
        }
        (None, false) => {
            diags.warn(SemanticWarning::ReturnTypeMismatch { line, func: func_name });
        }
        (None, true) => {}
    }
    let exit = module.exit_label();
    module.push_inst(Instruction::Goto(exit));
}

fn lower_assign(module: &mut Module, diags: &mut Diagnostics, target: &Expr, value: &Expr, line: Line) {
    let rhs = lower_expr_value(module, diags, value);
    match target {
        Expr::Var(name, var_line) => {
            let dst = resolve_var(module, diags, *name, *var_line);
            module.push_inst(Instruction::Move {
                dst,
                src: rhs,
                array_copy: None,
            });
        }
        Expr::Index { base, indices, line: idx_line } => {
            let (ptr, _) = lower_array_access(module, diags, base, indices, *idx_line, AccessRole::AssignTarget);
            module.push_inst(Instruction::Move {
                dst: ptr,
                src: rhs,
                array_copy: None,
            });
        }
        _ => diags.error(SemanticError::Internal(format!(
            "line {line}: assignment target is not an lvalue"
        ))),
    }
}

fn resolve_var(module: &mut Module, diags: &mut Diagnostics, name: Id, line: Line) -> ValueRef {
    match module.find_var_value(name) {
        Some(v) => v,
        None => {
            diags.error(SemanticError::UndefinedVariable {
                line,
                name: name.to_string(),
            });
            ValueRef::Const(module.new_const_int(0))
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AccessRole {
    AssignTarget,
    CallArg,
    Value,
}

/// Lower an array access (`base[i_0]...[i_{k-1}]`) per §4.D: compute the
/// row-major byte offset, add it to the base address, and either yield
/// the address (assignment target / partial-indexing call argument) or
/// dereference it to a scalar (ordinary value context).
///
/// Returns the resulting value together with its MiniC type -- an array
/// type with the remaining dimensions for a partially-indexed call
/// argument, or a plain `Int32` once fully dereferenced.
fn lower_array_access(
    module: &mut Module,
    diags: &mut Diagnostics,
    base: &Expr,
    indices: &[Expr],
    line: Line,
    role: AccessRole,
) -> (ValueRef, Type) {
    let Expr::Var(name, var_line) = base else {
        diags.error(SemanticError::Internal(format!(
            "line {line}: array access base is not a simple name"
        )));
        return (ValueRef::Const(module.new_const_int(0)), Type::Int32);
    };
    let base_val = resolve_var(module, diags, *name, *var_line);
    let array_ty = module.value_type(base_val);
    if !array_ty.is_array() {
        diags.error(SemanticError::Internal(format!(
            "line {line}: '{name}' is not an array"
        )));
        return (ValueRef::Const(module.new_const_int(0)), Type::Int32);
    }
    let dims = array_ty.dimensions().to_vec();
    let elem = array_ty.element_type().clone();

    let mut offset: Option<ValueRef> = None;
    for (j, index_expr) in indices.iter().enumerate() {
        let idx_val = lower_expr_value(module, diags, index_expr);
        let multiplier = array_ty.dimension_multiplier(j);
        let term = if multiplier == 1 {
            idx_val
        } else {
            let mult_const = ValueRef::Const(module.new_const_int(multiplier as i32));
            ValueRef::Inst(module.push_inst(Instruction::Binary {
                op: crate::middle::BinOp::Mul,
                lhs: idx_val,
                rhs: mult_const,
            }))
        };
        offset = Some(match offset {
            None => term,
            Some(acc) => ValueRef::Inst(module.push_inst(Instruction::Binary {
                op: crate::middle::BinOp::Add,
                lhs: acc,
                rhs: term,
            })),
        });
    }

    let pointer = match offset {
        None => base_val,
        Some(elem_offset) => {
            let four = ValueRef::Const(module.new_const_int(4));
            let byte_offset = ValueRef::Inst(module.push_inst(Instruction::Binary {
                op: crate::middle::BinOp::Mul,
                lhs: elem_offset,
                rhs: four,
            }));
            ValueRef::Inst(module.push_inst(Instruction::Binary {
                op: crate::middle::BinOp::Add,
                lhs: base_val,
                rhs: byte_offset,
            }))
        }
    };

    let k = indices.len();
    let n = dims.len();
    match role {
        AccessRole::AssignTarget => (pointer, elem),
        AccessRole::CallArg if k < n => (pointer, Type::array_of(elem, dims[k..].to_vec())),
        AccessRole::CallArg => (pointer, elem),
        AccessRole::Value => {
            let loaded = module.push_inst(Instruction::Unary {
                op: UnOp::Deref,
                operand: pointer,
            });
            (ValueRef::Inst(loaded), elem)
        }
    }
}

fn lower_call(module: &mut Module, diags: &mut Diagnostics, name: Id, args: &[Expr], line: Line) -> ValueRef {
    let (param_types, ret_type) = match module.find_function(name) {
        Some(f) => {
            let expected = f.params.len();
            if expected != args.len() {
                diags.error(SemanticError::ArityMismatch {
                    line,
                    name: name.to_string(),
                    expected,
                    got: args.len(),
                });
            }
            let types: Vec<Type> = f.params.iter().map(|id| f.local(*id).ty.clone()).collect();
            (types, f.return_type.clone())
        }
        None => {
            diags.error(SemanticError::UndefinedFunction {
                line,
                name: name.to_string(),
            });
            (vec![], Type::Int32)
        }
    };

    let mut arg_values = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let expects_array = param_types.get(i).map(|t| t.is_array()).unwrap_or(false);
        let value = if expects_array {
            match arg {
                Expr::Var(_, vline) => lower_array_access(module, diags, arg, &[], *vline, AccessRole::CallArg).0,
                Expr::Index {
                    base,
                    indices,
                    line: idx_line,
                } => lower_array_access(module, diags, base, indices, *idx_line, AccessRole::CallArg).0,
                _ => lower_expr_value(module, diags, arg),
            }
        } else {
            lower_expr_value(module, diags, arg)
        };
        arg_values.push(value);
    }

    module.note_call_args(arg_values.len());
    let call = module.push_inst(Instruction::FuncCall {
        callee: name,
        args: arg_values,
        ret_type,
    });
    ValueRef::Inst(call)
}

/// Evaluate an expression for its value, the `D`-side counterpart to the
/// label-mode `lower_cond`. Boolean-shaped expressions are routed
/// through [`lower_bool_as_value`] so they still short-circuit even when
/// used as plain r-values.
pub fn lower_expr_value(module: &mut Module, diags: &mut Diagnostics, expr: &Expr) -> ValueRef {
    if is_boolean_expr(expr) {
        return lower_bool_as_value(module, diags, expr);
    }
    match expr {
        Expr::IntLit(v) => ValueRef::Const(module.new_const_int(*v)),
        // A bare array name decays to its address here too -- the
        // instruction selector is what tells address-only arrays and
        // pointer-holding locals apart, lowering just passes the value on.
        Expr::Var(name, line) => resolve_var(module, diags, *name, *line),
        Expr::Index { base, indices, line } => {
            lower_array_access(module, diags, base, indices, *line, AccessRole::Value).0
        }
        Expr::Call { name, args, line } => lower_call(module, diags, *name, args, *line),
        Expr::Neg(inner) => {
            let v = lower_expr_value(module, diags, inner);
            ValueRef::Inst(module.push_inst(Instruction::Unary { op: UnOp::Neg, operand: v }))
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = lower_expr_value(module, diags, lhs);
            let r = lower_expr_value(module, diags, rhs);
            let bop = match op {
                BOp::Add => crate::middle::BinOp::Add,
                BOp::Sub => crate::middle::BinOp::Sub,
                BOp::Mul => crate::middle::BinOp::Mul,
                BOp::Div => crate::middle::BinOp::Div,
                BOp::Mod => crate::middle::BinOp::Mod,
                _ => unreachable!("logical/relational ops are routed through lower_bool_as_value"),
            };
            ValueRef::Inst(module.push_inst(Instruction::Binary { op: bop, lhs: l, rhs: r }))
        }
        Expr::Not(_) => unreachable!("routed through lower_bool_as_value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;
    use crate::front::parse::parse;
    use crate::middle::Instruction as I;

    fn lower_src(src: &str) -> (Module, Diagnostics) {
        let ast = parse(src).unwrap();
        lower(&ast)
    }

    #[test]
    fn main_without_return_gets_implicit_zero() {
        let (module, diags) = lower_src("int main() { int x = 1; }");
        assert!(!diags.has_errors());
        let main = module.find_function(intern("main")).unwrap();
        // The very first instruction after Entry must move 0 into the
        // return slot -- the implicit main-returns-zero rule.
        assert!(matches!(main.code[0].inst, I::Entry));
        let mut found_zero_move = false;
        for entry in &main.code {
            if let I::Move { src: ValueRef::Const(c), .. } = &entry.inst {
                if module.const_value(*c) == 0 {
                    found_zero_move = true;
                    break;
                }
            }
        }
        assert!(found_zero_move);
    }

    #[test]
    fn exit_is_unique_and_every_return_goes_through_it() {
        let (module, _diags) = lower_src(
            "int f(int n) { if (n <= 1) return n; return f(n-1) + f(n-2); }",
        );
        let f = module.find_function(intern("f")).unwrap();
        let exit_count = f.code.iter().filter(|e| matches!(e.inst, I::Exit(_))).count();
        assert_eq!(exit_count, 1);
        let goto_exit_count = f
            .code
            .iter()
            .filter(|e| matches!(&e.inst, I::Goto(l) if *l == f.exit_label))
            .count();
        // Two explicit returns.
        assert_eq!(goto_exit_count, 2);
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let (_module, diags) = lower_src("int main() { break; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn array_index_offset_matches_row_major_formula() {
        // a[1][2] in a 2x3 array: offset = (1*3 + 2) * 4 = 20 bytes, so the
        // address computation must use a row multiplier of 3 and an
        // element-size multiplier of 4 somewhere among its Binary::Mul
        // operands.
        let (module, diags) = lower_src("int main() { int a[2][3]; a[1][2] = 7; return a[1][2]; }");
        assert!(!diags.has_errors());
        let main = module.find_function(intern("main")).unwrap();
        let mul_consts: Vec<i32> = main
            .code
            .iter()
            .filter_map(|e| match &e.inst {
                I::Binary { op: crate::middle::BinOp::Mul, lhs, rhs } => [*lhs, *rhs]
                    .into_iter()
                    .find_map(|v| match v {
                        ValueRef::Const(c) => Some(module.const_value(c)),
                        _ => None,
                    }),
                _ => None,
            })
            .collect();
        assert!(mul_consts.contains(&3));
        assert!(mul_consts.contains(&4));
    }
}
