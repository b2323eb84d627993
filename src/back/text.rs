//! Text emitters (component H): the linear-IR printer and the ARM32
//! assembler text writer.

use crate::back::arm::{AsmInst, Register};
use crate::middle::{BinOp, Function, Instruction, LocalKind, Module, UnOp, ValueRef};
use std::fmt::Write as _;

fn value_name(module: &Module, func: &Function, v: ValueRef) -> String {
    match v {
        ValueRef::Const(c) => module.const_value(c).to_string(),
        ValueRef::Global(g) => format!("@{}", module.global(g).name),
        ValueRef::Local(l) => match func.local(l).name() {
            Some(name) => format!("%{name}"),
            None => format!("%anon{}", l.0),
        },
        ValueRef::Inst(i) => format!("%t{}", i.0),
    }
}

fn binop_mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "sdiv",
        BinOp::Mod => "mod",
        BinOp::CmpEq => "icmp_eq",
        BinOp::CmpNe => "icmp_ne",
        BinOp::CmpLt => "icmp_lt",
        BinOp::CmpLe => "icmp_le",
        BinOp::CmpGt => "icmp_gt",
        BinOp::CmpGe => "icmp_ge",
    }
}

/// Render the module's linear IR in the stable textual form used by
/// `-i` output and emitted as comments alongside the assembly.
pub fn print_ir(module: &Module) -> String {
    let mut out = String::new();
    for g in &module.globals {
        match g.init {
            Some(v) => writeln!(out, "declare {} {} = {v}", g.ty, g.name).unwrap(),
            None => writeln!(out, "declare {} {}", g.ty, g.name).unwrap(),
        }
    }
    if !module.globals.is_empty() {
        writeln!(out).unwrap();
    }

    for func in &module.functions {
        let params: Vec<String> = func
            .params
            .iter()
            .map(|id| match &func.local(*id).kind {
                LocalKind::FormalParam { name, .. } => format!("{} %{name}", func.local(*id).ty),
                _ => unreachable!("Function::params only holds FormalParam locals"),
            })
            .collect();
        writeln!(out, "define {} {}({}) {{", func.return_type, func.name, params.join(", ")).unwrap();
        for (idx, entry) in func.code.iter().enumerate() {
            let id = crate::middle::InstId(idx as u32);
            print_inst(&mut out, module, func, id, &entry.inst);
        }
        writeln!(out, "}}").unwrap();
        writeln!(out).unwrap();
    }
    out
}

fn print_inst(out: &mut String, module: &Module, func: &Function, id: crate::middle::InstId, inst: &Instruction) {
    let name = |v: ValueRef| value_name(module, func, v);
    let result = format!("%t{}", id.0);
    match inst {
        Instruction::Entry => writeln!(out, "  entry:").unwrap(),
        Instruction::Exit(v) => match v {
            Some(v) => writeln!(out, "  exit {}", name(*v)).unwrap(),
            None => writeln!(out, "  exit").unwrap(),
        },
        Instruction::Label(l) => writeln!(out, "{l}:").unwrap(),
        Instruction::Goto(l) => writeln!(out, "  br label {l}").unwrap(),
        Instruction::CondGoto { cond, true_label, false_label } => {
            writeln!(out, "  bc {}, label {true_label}, label {false_label}", name(*cond)).unwrap();
        }
        Instruction::Binary { op, lhs, rhs } => {
            writeln!(out, "  {result} = {} {}, {}", binop_mnemonic(*op), name(*lhs), name(*rhs)).unwrap();
        }
        Instruction::Unary { op: UnOp::Neg, operand } => {
            writeln!(out, "  {result} = neg {}", name(*operand)).unwrap();
        }
        Instruction::Unary { op: UnOp::Deref, operand } => {
            writeln!(out, "  {result} = *{}", name(*operand)).unwrap();
        }
        Instruction::Move { dst, src, .. } => {
            writeln!(out, "  {} = {}", name(*dst), name(*src)).unwrap();
        }
        Instruction::FuncCall { callee, args, .. } => {
            let args: Vec<String> = args.iter().map(|a| name(*a)).collect();
            writeln!(out, "  {result} = call {callee}({})", args.join(", ")).unwrap();
        }
        Instruction::Arg(v) => writeln!(out, "  arg {}", name(*v)).unwrap(),
    }
}

fn join_regs(regs: &[Register]) -> String {
    regs.iter().map(|r| r.name()).collect::<Vec<_>>().join(", ")
}

fn arith_mnemonic(op: crate::back::arm::ArithOp) -> &'static str {
    use crate::back::arm::ArithOp::*;
    match op {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        Sdiv => "sdiv",
    }
}

/// Render the selected ARM32 instructions for the whole module as
/// assembler text: a `.data`/`.bss` section for globals, then `.text`
/// with one label per function.
pub fn emit_asm(module: &Module, functions: &[(crate::common::Id, Vec<AsmInst>)]) -> String {
    let mut out = String::new();
    writeln!(out, "    .syntax unified").unwrap();

    let (initialized, uninitialized): (Vec<_>, Vec<_>) =
        module.globals.iter().partition(|g| g.init.is_some());

    if !initialized.is_empty() {
        writeln!(out, "    .data").unwrap();
        for g in initialized {
            writeln!(out, "{}:", g.name).unwrap();
            writeln!(out, "    .word {}", g.init.unwrap()).unwrap();
        }
    }
    if !uninitialized.is_empty() {
        writeln!(out, "    .bss").unwrap();
        for g in uninitialized {
            writeln!(out, "{}:", g.name).unwrap();
            writeln!(out, "    .space {}", g.ty.size_bytes().max(4)).unwrap();
        }
    }

    writeln!(out, "    .text").unwrap();
    for (name, _) in functions {
        writeln!(out, "    .global {name}").unwrap();
    }
    for (name, instrs) in functions {
        writeln!(out, "{name}:").unwrap();
        for inst in instrs {
            match inst {
                AsmInst::Label(l) => writeln!(out, "{l}:").unwrap(),
                other => writeln!(out, "    {}", render_inst(other)).unwrap(),
            }
        }
    }
    out
}

fn render_inst(inst: &AsmInst) -> String {
    use AsmInst::*;
    match inst {
        Push(regs) => format!("push {{{}}}", join_regs(regs)),
        Pop(regs) => format!("pop {{{}}}", join_regs(regs)),
        Mov { dst, src } => format!("mov {dst}, {src}"),
        MovImm { dst, imm } => format!("mov {dst}, #{imm}"),
        MovCondImm { cond, dst, imm } => format!("mov{} {dst}, #{imm}", cond.mnemonic()),
        Arith { op, dst, lhs, rhs } => format!("{} {dst}, {lhs}, {rhs}", arith_mnemonic(*op)),
        Rsb { dst, src } => format!("rsb {dst}, {src}, #0"),
        Ldr { dst, addr } => format!("ldr {dst}, [{}, #{}]", addr.base, addr.offset),
        Str { src, addr } => format!("str {src}, [{}, #{}]", addr.base, addr.offset),
        LdrConst { dst, value } => format!("ldr {dst}, ={value}"),
        LdrSymbol { dst, symbol } => format!("ldr {dst}, ={symbol}"),
        Cmp { lhs, rhs } => format!("cmp {lhs}, {rhs}"),
        B { label } => format!("b {label}"),
        Bcond { cond, label } => format!("b{} {label}", cond.mnemonic()),
        Bl { callee } => format!("bl {callee}"),
        Bx { reg } => format!("bx {reg}"),
        Label(l) => format!("{l}:"),
        Comment(s) => format!("@ {s}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::arm::select_module;
    use crate::back::frame::assign_frames;
    use crate::front::lower::lower;
    use crate::front::parse::parse;

    #[test]
    fn ir_printer_names_every_function_and_its_entry_block() {
        let ast = parse("int main() { return 1; }").unwrap();
        let (module, _diags) = lower(&ast);
        let text = print_ir(&module);
        assert!(text.contains("define int main() {"));
        assert!(text.contains("entry:"));
        assert!(text.contains("exit"));
    }

    #[test]
    fn asm_output_contains_a_global_label_and_a_return() {
        let ast = parse("int main() { return 1; }").unwrap();
        let (mut module, _diags) = lower(&ast);
        assign_frames(&mut module);
        let funcs = select_module(&module);
        let asm = emit_asm(&module, &funcs);
        assert!(asm.contains("main:"));
        assert!(asm.contains("bx lr"));
    }
}
