//! Short-circuit boolean / control-flow translation (component E).
//!
//! `lower_cond` is the label-mode translator: rather than materializing a
//! 0/1 value, it threads an inherited `(true_label, false_label)` pair
//! through `&&`, `||`, `!` and relational operators, emitting branches
//! directly. It is entered whenever an expression appears in a boolean
//! context: the condition of `if`/`while`, or an operand of `&&`/`||`/`!`.
//!
//! When a boolean expression must produce an ordinary value (e.g. `!x`
//! used as an r-value), [`lower_bool_as_value`] synthesizes fresh
//! true/false/end labels, runs the label-mode translator, and writes 1 or
//! 0 on the corresponding path.

use crate::common::Id;
use crate::error::Diagnostics;
use crate::front::ast::*;
use crate::front::lower::lower_expr_value;
use crate::middle::{BinOp, Instruction, Module, ValueRef};
use crate::types::Type;

fn relational_to_cmp(op: BOp) -> BinOp {
    match op {
        BOp::Eq => BinOp::CmpEq,
        BOp::Ne => BinOp::CmpNe,
        BOp::Lt => BinOp::CmpLt,
        BOp::Le => BinOp::CmpLe,
        BOp::Gt => BinOp::CmpGt,
        BOp::Ge => BinOp::CmpGe,
        _ => unreachable!("relational_to_cmp called on non-relational op"),
    }
}

/// Is this expression naturally boolean-valued -- i.e. does it need
/// [`lower_bool_as_value`] rather than direct arithmetic evaluation when
/// it appears as a plain r-value?
pub fn is_boolean_expr(e: &Expr) -> bool {
    matches!(e, Expr::Not(_))
        || matches!(e, Expr::Binary { op, .. } if op.is_logical() || op.is_relational())
}

/// The label-mode translator (component E's core table).
pub fn lower_cond(module: &mut Module, diags: &mut Diagnostics, expr: &Expr, true_label: Id, false_label: Id) {
    match expr {
        Expr::Binary { op: BOp::And, lhs, rhs } => {
            let r = module.fresh_label("and");
            lower_cond(module, diags, lhs, r, false_label);
            module.push_inst(Instruction::Label(r));
            lower_cond(module, diags, rhs, true_label, false_label);
        }
        Expr::Binary { op: BOp::Or, lhs, rhs } => {
            let r = module.fresh_label("or");
            lower_cond(module, diags, lhs, true_label, r);
            module.push_inst(Instruction::Label(r));
            lower_cond(module, diags, rhs, true_label, false_label);
        }
        Expr::Not(inner) => lower_cond(module, diags, inner, false_label, true_label),
        Expr::Binary { op, lhs, rhs } if op.is_relational() => {
            let lv = lower_expr_value(module, diags, lhs);
            let rv = lower_expr_value(module, diags, rhs);
            let cmp = module.push_inst(Instruction::Binary {
                op: relational_to_cmp(*op),
                lhs: lv,
                rhs: rv,
            });
            module.push_inst(Instruction::CondGoto {
                cond: ValueRef::Inst(cmp),
                true_label,
                false_label,
            });
        }
        _ => {
            // Fall back: lower as a value, then rewrite into `v != 0`.
            let v = lower_expr_value(module, diags, expr);
            let zero = ValueRef::Const(module.new_const_int(0));
            let cmp = module.push_inst(Instruction::Binary {
                op: BinOp::CmpNe,
                lhs: v,
                rhs: zero,
            });
            module.push_inst(Instruction::CondGoto {
                cond: ValueRef::Inst(cmp),
                true_label,
                false_label,
            });
        }
    }
}

/// Materialize a boolean expression as an ordinary 0/1 integer value.
pub fn lower_bool_as_value(module: &mut Module, diags: &mut Diagnostics, expr: &Expr) -> ValueRef {
    let true_label = module.fresh_label("true");
    let false_label = module.fresh_label("false");
    let end_label = module.fresh_label("end");

    let result = module.new_var_value(Type::Int32, None);

    lower_cond(module, diags, expr, true_label, false_label);

    module.push_inst(Instruction::Label(true_label));
    let one = ValueRef::Const(module.new_const_int(1));
    module.push_inst(Instruction::Move {
        dst: result,
        src: one,
        array_copy: None,
    });
    module.push_inst(Instruction::Goto(end_label));

    module.push_inst(Instruction::Label(false_label));
    let zero = ValueRef::Const(module.new_const_int(0));
    module.push_inst(Instruction::Move {
        dst: result,
        src: zero,
        array_copy: None,
    });

    module.push_inst(Instruction::Label(end_label));
    result
}

/// `if (cond) then_branch [else else_branch]`.
pub fn lower_if(
    module: &mut Module,
    diags: &mut Diagnostics,
    cond: &Expr,
    then_branch: &Stmt,
    else_branch: Option<&Stmt>,
) {
    use crate::front::lower::lower_stmt;

    let then_label = module.fresh_label("then");
    let end_label = module.fresh_label("endif");
    let else_label = if else_branch.is_some() {
        module.fresh_label("else")
    } else {
        end_label
    };

    lower_cond(module, diags, cond, then_label, else_label);

    module.push_inst(Instruction::Label(then_label));
    lower_stmt(module, diags, then_branch);

    if let Some(else_branch) = else_branch {
        module.push_inst(Instruction::Goto(end_label));
        module.push_inst(Instruction::Label(else_label));
        lower_stmt(module, diags, else_branch);
    }

    module.push_inst(Instruction::Label(end_label));
}

/// `while (cond) body`, with `break`/`continue` label threading.
pub fn lower_while(module: &mut Module, diags: &mut Diagnostics, cond: &Expr, body: &Stmt) {
    use crate::front::lower::lower_stmt;

    let entry_label = module.fresh_label("whilecond");
    let body_label = module.fresh_label("whilebody");
    let exit_label = module.fresh_label("whileend");

    module.push_loop_labels(exit_label, entry_label);

    module.push_inst(Instruction::Label(entry_label));
    lower_cond(module, diags, cond, body_label, exit_label);

    module.push_inst(Instruction::Label(body_label));
    lower_stmt(module, diags, body);
    module.push_inst(Instruction::Goto(entry_label));

    module.push_inst(Instruction::Label(exit_label));
    module.pop_loop_labels();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;
    use crate::front::parse::parse;
    use crate::front::lower::lower;
    use crate::middle::Instruction as I;

    fn ir_for(src: &str) -> (Module, Diagnostics) {
        let ast = parse(src).unwrap();
        lower(&ast)
    }

    /// `a && b` must lower so that `b`'s evaluation is reachable only
    /// through the branch taken when `a` is true: the label emitted
    /// between `a` and `b` is not a fallthrough from an unconditional
    /// predecessor, it is the true target of `a`'s conditional branch.
    #[test]
    fn and_short_circuits_structurally() {
        let (module, diags) = ir_for(
            "int g(int x) { return x; } int main() { int a = 0; if (a == 0 && g(1/a) > 0) return 1; return 0; }",
        );
        assert!(!diags.has_errors());
        let main = module.find_function(intern("main")).unwrap();
        // There must be at least one CondGoto before any call to g, and
        // the call must be textually reachable only via a label target
        // (never immediately after the first CondGoto without a Label).
        let mut seen_first_branch = false;
        for (i, entry) in main.code.iter().enumerate() {
            if let I::CondGoto { .. } = entry.inst {
                seen_first_branch = true;
                // the next instruction must be a Label -- we never fall
                // through past a branch into unconditional code.
                assert!(matches!(main.code[i + 1].inst, I::Label(_)));
            }
        }
        assert!(seen_first_branch);
    }

    #[test]
    fn or_emits_two_branch_points() {
        let (module, diags) = ir_for("int main() { int a = 1; if (a == 0 || a == 1) return 1; return 0; }");
        assert!(!diags.has_errors());
        let main = module.find_function(intern("main")).unwrap();
        let branch_count = main
            .code
            .iter()
            .filter(|e| matches!(e.inst, I::CondGoto { .. }))
            .count();
        assert_eq!(branch_count, 2);
    }
}
