//! ARM32 instruction selector (component G).
//!
//! Dispatch by IR opcode, one [`Instruction`] at a time. Every operand
//! that isn't already a literal is spilled in memory (see
//! [`crate::back::frame`]), so each handler follows the same shape:
//! load operands into the scratch pool, do the op, store the result
//! back. No operand is ever assumed to still be in a register from a
//! previous instruction.

use crate::common::Id;
use crate::middle::{BinOp, Function, Instruction as Ir, LocalKind, Location, Module, PhysReg, UnOp, ValueRef};

/// An ARM32 general-purpose or special register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    Fp,
    Sp,
    Lr,
}

impl Register {
    pub fn to_phys(self) -> PhysReg {
        PhysReg(match self {
            Register::R0 => 0,
            Register::R1 => 1,
            Register::R2 => 2,
            Register::R3 => 3,
            Register::R4 => 4,
            Register::R5 => 5,
            Register::R6 => 6,
            Register::Fp => 11,
            Register::Sp => 13,
            Register::Lr => 14,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::R0 => "r0",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::R5 => "r5",
            Register::R6 => "r6",
            Register::Fp => "fp",
            Register::Sp => "sp",
            Register::Lr => "lr",
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The first four integer arguments, per the ABI.
pub const ARG_REGISTERS: [Register; 4] = [Register::R0, Register::R1, Register::R2, Register::R3];

/// The scratch registers the selector is allowed to clobber within a
/// single instruction's lowering. Always protected across calls (see
/// [`crate::back::frame`]), so the selector never worries about a value
/// surviving through a callee.
pub const SCRATCH_POOL: [Register; 3] = [Register::R4, Register::R5, Register::R6];

/// An ARM32 condition code; also used directly as the `cmp_*` IR suffix.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    fn from_cmp(op: BinOp) -> Cond {
        match op {
            BinOp::CmpEq => Cond::Eq,
            BinOp::CmpNe => Cond::Ne,
            BinOp::CmpLt => Cond::Lt,
            BinOp::CmpLe => Cond::Le,
            BinOp::CmpGt => Cond::Gt,
            BinOp::CmpGe => Cond::Ge,
            _ => unreachable!("from_cmp called on a non-comparison BinOp"),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Le => "le",
            Cond::Gt => "gt",
            Cond::Ge => "ge",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Sdiv,
}

impl ArithOp {
    fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Sdiv => "sdiv",
        }
    }
}

/// An addressing mode: every memory access in this back end is a
/// register-plus-immediate offset.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Addr {
    pub base: Register,
    pub offset: i32,
}

/// One selected ARM32 instruction. [`crate::back::text`] renders these
/// to assembler syntax.
#[derive(Clone, Debug)]
pub enum AsmInst {
    Push(Vec<Register>),
    Pop(Vec<Register>),
    Mov { dst: Register, src: Register },
    MovImm { dst: Register, imm: i32 },
    MovCondImm { cond: Cond, dst: Register, imm: i32 },
    Arith { op: ArithOp, dst: Register, lhs: Register, rhs: Register },
    /// `rsb dst, src, #0` -- ARM32's two-operand negate idiom.
    Rsb { dst: Register, src: Register },
    Ldr { dst: Register, addr: Addr },
    Str { src: Register, addr: Addr },
    /// `ldr rd, =imm`, the literal-pool pseudo-op; sidesteps ARM32's
    /// rotated-immediate encoding limits.
    LdrConst { dst: Register, value: i32 },
    /// `ldr rd, =symbol`, for taking a global's address.
    LdrSymbol { dst: Register, symbol: Id },
    Cmp { lhs: Register, rhs: Register },
    B { label: Id },
    Bcond { cond: Cond, label: Id },
    Bl { callee: Id },
    Bx { reg: Register },
    Label(Id),
    Comment(String),
}

struct Selector<'a> {
    module: &'a Module,
    func: &'a Function,
    out: Vec<AsmInst>,
}

/// Select ARM32 instructions for every function in the module. Returns
/// `(function name, instructions)` pairs in declaration order.
pub fn select_module(module: &Module) -> Vec<(Id, Vec<AsmInst>)> {
    module
        .functions
        .iter()
        .map(|f| (f.name, select_function(module, f)))
        .collect()
}

fn select_function(module: &Module, func: &Function) -> Vec<AsmInst> {
    let mut sel = Selector { module, func, out: vec![] };
    for entry in &func.code {
        sel.select(&entry.inst, entry.location);
    }
    sel.out
}

impl<'a> Selector<'a> {
    fn emit(&mut self, inst: AsmInst) {
        self.out.push(inst);
    }

    fn addr_of(&self, loc: Location) -> Addr {
        match loc {
            Location::Memory { base, offset } => Addr { base: phys_to_register(base), offset },
            Location::Register(r) => Addr { base: phys_to_register(r), offset: 0 },
        }
    }

    fn local_location(&self, id: crate::middle::LocalId) -> Location {
        self.func
            .local(id)
            .location
            .expect("frame layout must run before instruction selection")
    }

    fn inst_location(&self, id: crate::middle::InstId) -> Location {
        self.func
            .inst(id)
            .location
            .expect("frame layout must run before instruction selection")
    }

    /// Materialize a value into `scratch`, emitting whatever load is
    /// needed. An address-only array value loads its own frame address
    /// rather than the word stored there.
    fn load_value(&mut self, v: ValueRef, scratch: Register) {
        match v {
            ValueRef::Const(c) => {
                self.emit(AsmInst::LdrConst { dst: scratch, value: self.module.const_value(c) });
            }
            ValueRef::Global(g) => {
                self.emit(AsmInst::LdrSymbol { dst: scratch, symbol: self.module.global(g).name });
                if !self.module.global(g).ty.is_array() {
                    self.emit(AsmInst::Ldr { dst: scratch, addr: Addr { base: scratch, offset: 0 } });
                }
            }
            ValueRef::Local(l) => {
                let addr = self.addr_of(self.local_location(l));
                if crate::middle::module::is_address_only_array(self.module, self.func, v) {
                    self.emit(AsmInst::Mov { dst: scratch, src: addr.base });
                    if addr.offset != 0 {
                        let tmp = next_scratch(scratch);
                        self.emit(AsmInst::LdrConst { dst: tmp, value: addr.offset });
                        self.emit(AsmInst::Arith { op: ArithOp::Add, dst: scratch, lhs: scratch, rhs: tmp });
                    }
                } else {
                    self.emit(AsmInst::Ldr { dst: scratch, addr });
                }
            }
            ValueRef::Inst(i) => {
                let addr = self.addr_of(self.inst_location(i));
                self.emit(AsmInst::Ldr { dst: scratch, addr });
            }
        }
    }

    fn store_result(&mut self, loc: Location, src: Register) {
        let addr = self.addr_of(loc);
        self.emit(AsmInst::Str { src, addr });
    }

    fn select(&mut self, inst: &Ir, result_loc: Option<Location>) {
        match inst {
            Ir::Entry => self.select_entry(),
            Ir::Exit(v) => self.select_exit(*v),
            Ir::Label(l) => self.emit(AsmInst::Label(*l)),
            Ir::Goto(l) => self.emit(AsmInst::B { label: *l }),
            Ir::CondGoto { cond, true_label, false_label } => {
                self.load_value(*cond, Register::R4);
                self.emit(AsmInst::MovImm { dst: Register::R5, imm: 0 });
                self.emit(AsmInst::Cmp { lhs: Register::R4, rhs: Register::R5 });
                self.emit(AsmInst::Bcond { cond: Cond::Ne, label: *true_label });
                self.emit(AsmInst::B { label: *false_label });
            }
            Ir::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.load_value(*lhs, Register::R4);
                self.load_value(*rhs, Register::R5);
                self.emit(AsmInst::Cmp { lhs: Register::R4, rhs: Register::R5 });
                self.emit(AsmInst::MovImm { dst: Register::R6, imm: 0 });
                self.emit(AsmInst::MovCondImm { cond: Cond::from_cmp(*op), dst: Register::R6, imm: 1 });
                self.store_result(result_loc.unwrap(), Register::R6);
            }
            Ir::Binary { op: BinOp::Mod, lhs, rhs } => {
                self.load_value(*lhs, Register::R4);
                self.load_value(*rhs, Register::R5);
                self.emit(AsmInst::Arith { op: ArithOp::Sdiv, dst: Register::R6, lhs: Register::R4, rhs: Register::R5 });
                self.emit(AsmInst::Arith { op: ArithOp::Mul, dst: Register::R6, lhs: Register::R6, rhs: Register::R5 });
                self.emit(AsmInst::Arith { op: ArithOp::Sub, dst: Register::R4, lhs: Register::R4, rhs: Register::R6 });
                self.store_result(result_loc.unwrap(), Register::R4);
            }
            Ir::Binary { op, lhs, rhs } => {
                self.load_value(*lhs, Register::R4);
                self.load_value(*rhs, Register::R5);
                let arith = match op {
                    BinOp::Add => ArithOp::Add,
                    BinOp::Sub => ArithOp::Sub,
                    BinOp::Mul => ArithOp::Mul,
                    BinOp::Div => ArithOp::Sdiv,
                    _ => unreachable!("comparisons and mod handled above"),
                };
                self.emit(AsmInst::Arith { op: arith, dst: Register::R4, lhs: Register::R4, rhs: Register::R5 });
                self.store_result(result_loc.unwrap(), Register::R4);
            }
            Ir::Unary { op: UnOp::Neg, operand } => {
                self.load_value(*operand, Register::R4);
                self.emit(AsmInst::Rsb { dst: Register::R4, src: Register::R4 });
                self.store_result(result_loc.unwrap(), Register::R4);
            }
            Ir::Unary { op: UnOp::Deref, operand } => {
                self.load_value(*operand, Register::R4);
                self.emit(AsmInst::Ldr { dst: Register::R4, addr: Addr { base: Register::R4, offset: 0 } });
                self.store_result(result_loc.unwrap(), Register::R4);
            }
            Ir::Move { dst, src, .. } => {
                self.load_value(*src, Register::R4);
                match dst {
                    ValueRef::Local(l) => self.store_result(self.local_location(*l), Register::R4),
                    // An `Inst`-valued Move target is always the pointer
                    // an array-index lowering produced for an assignment
                    // target (§4.D): store *through* it rather than into
                    // its own spill slot, which only holds the address.
                    ValueRef::Inst(i) => {
                        self.load_value(ValueRef::Inst(*i), Register::R5);
                        self.emit(AsmInst::Str { src: Register::R4, addr: Addr { base: Register::R5, offset: 0 } });
                    }
                    _ => unreachable!("assignment target is always a local or indexed address"),
                }
            }
            Ir::FuncCall { callee, args, ret_type } => {
                self.select_call(*callee, args, result_loc, ret_type.is_void());
            }
            Ir::Arg(_) => {}
        }
    }

    fn select_entry(&mut self) {
        self.emit(AsmInst::Push(vec![Register::Fp, Register::Lr]));
        self.emit(AsmInst::Mov { dst: Register::Fp, src: Register::Sp });
        if !self.func.protected_registers.is_empty() {
            self.emit(AsmInst::Push(SCRATCH_POOL.to_vec()));
        }
        if self.func.frame_size > 0 {
            self.emit(AsmInst::LdrConst { dst: Register::R4, value: self.func.frame_size });
            self.emit(AsmInst::Arith { op: ArithOp::Sub, dst: Register::Sp, lhs: Register::Sp, rhs: Register::R4 });
        }
        // Spill the incoming register arguments (first four) into their
        // frame slots so every later reference to a formal parameter is
        // a plain memory load, never a special case on its ABI register.
        for param in &self.func.params {
            if let LocalKind::FormalParam { index, .. } = self.func.local(*param).kind {
                if index < 4 {
                    let addr = self.addr_of(self.local_location(*param));
                    self.emit(AsmInst::Str { src: ARG_REGISTERS[index as usize], addr });
                }
            }
        }
    }

    fn select_exit(&mut self, ret: Option<ValueRef>) {
        if let Some(v) = ret {
            self.load_value(v, Register::R0);
        }
        if self.func.frame_size > 0 {
            self.emit(AsmInst::LdrConst { dst: Register::R4, value: self.func.frame_size });
            self.emit(AsmInst::Arith { op: ArithOp::Add, dst: Register::Sp, lhs: Register::Sp, rhs: Register::R4 });
        }
        if !self.func.protected_registers.is_empty() {
            self.emit(AsmInst::Pop(SCRATCH_POOL.to_vec()));
        }
        self.emit(AsmInst::Pop(vec![Register::Fp, Register::Lr]));
        self.emit(AsmInst::Bx { reg: Register::Lr });
    }

    fn select_call(&mut self, callee: Id, args: &[ValueRef], result_loc: Option<Location>, is_void: bool) {
        let (reg_args, overflow_args) = args.split_at(args.len().min(4));
        for (i, arg) in reg_args.iter().enumerate() {
            self.load_value(*arg, ARG_REGISTERS[i]);
        }
        for (i, arg) in overflow_args.iter().enumerate() {
            self.load_value(*arg, Register::R4);
            self.emit(AsmInst::Str { src: Register::R4, addr: Addr { base: Register::Sp, offset: 4 * i as i32 } });
        }
        self.emit(AsmInst::Bl { callee });
        if !is_void {
            self.store_result(result_loc.unwrap(), Register::R0);
        }
    }
}

fn phys_to_register(p: PhysReg) -> Register {
    match p.id() {
        0 => Register::R0,
        1 => Register::R1,
        2 => Register::R2,
        3 => Register::R3,
        4 => Register::R4,
        5 => Register::R5,
        6 => Register::R6,
        11 => Register::Fp,
        13 => Register::Sp,
        14 => Register::Lr,
        n => unreachable!("unexpected physical register encoding {n}"),
    }
}

fn next_scratch(r: Register) -> Register {
    match r {
        Register::R4 => Register::R5,
        Register::R5 => Register::R6,
        _ => Register::R4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::frame::assign_frames;
    use crate::common::intern;
    use crate::front::lower::lower;
    use crate::front::parse::parse;

    fn build(src: &str) -> Module {
        let ast = parse(src).unwrap();
        let (mut module, diags) = lower(&ast);
        assert!(!diags.has_errors());
        assign_frames(&mut module);
        module
    }

    #[test]
    fn every_function_prologue_saves_fp_and_lr() {
        let module = build("int main() { return 1; }");
        let asm = select_module(&module);
        let (_name, instrs) = &asm[0];
        assert!(matches!(&instrs[0], AsmInst::Push(regs) if regs == &[Register::Fp, Register::Lr]));
        assert!(matches!(instrs.last().unwrap(), AsmInst::Bx { reg: Register::Lr }));
    }

    #[test]
    fn array_element_assignment_stores_through_the_computed_pointer() {
        let module = build("int main() { int a[2][3]; a[1][2] = 7; return a[1][2]; }");
        let asm = select_module(&module);
        let (_name, instrs) = &asm[0];
        // The store that writes 7 must address through a register that
        // was just loaded from the pointer's own spill slot, i.e. an Ldr
        // immediately followed by a Str using that same register as the
        // base with offset 0 -- never a Str straight into the pointer
        // instruction's own frame slot.
        let found = instrs.windows(2).any(|w| match (&w[0], &w[1]) {
            (AsmInst::Ldr { dst: ldr_dst, .. }, AsmInst::Str { addr, .. }) => {
                addr.base == *ldr_dst && addr.offset == 0
            }
            _ => false,
        });
        assert!(found, "expected an indirect store through a freshly-loaded pointer");
    }

    #[test]
    fn call_marshals_first_four_args_into_r0_through_r3() {
        let module = build("int f(int a, int b, int c, int d) { return a; } int main() { return f(1,2,3,4); }");
        let asm = select_module(&module);
        let (_name, main_instrs) = asm.iter().find(|(n, _)| *n == intern("main")).unwrap();
        let loads: Vec<&AsmInst> = main_instrs
            .iter()
            .filter(|i| matches!(i, AsmInst::LdrConst { dst, .. } if matches!(dst, Register::R0 | Register::R1 | Register::R2 | Register::R3)))
            .collect();
        assert_eq!(loads.len(), 4);
        assert!(main_instrs.iter().any(|i| matches!(i, AsmInst::Bl { .. })));
    }
}
