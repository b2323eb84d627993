//! The value & def-use graph (component B).
//!
//! A [`Value`] is anything with a type that can appear as an instruction
//! operand: a constant, a global, a local, a formal parameter, a
//! synthesized stack slot, or the result of another instruction. Rather
//! than a deep class hierarchy with two-way raw pointers, each kind lives
//! in its own small arena (see [`crate::middle::module`]) and operands
//! reference each other through the [`ValueRef`] tagged id -- a single
//! owning container (the arena) plus non-owning identifiers standing in
//! for the "pointer back to the def" half of a def-use edge.

use crate::common::Id;
use crate::types::Type;
use derive_more::Display;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
        #[display("{_0}")]
        pub struct $name(pub u32);
    };
}

id_type!(ConstId);
id_type!(GlobalId);
id_type!(LocalId);
id_type!(InstId);

/// A reference to any value in the graph. Cheap to copy, totally ordered
/// so it can key a `BTreeMap` for deterministic iteration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ValueRef {
    Const(ConstId),
    Global(GlobalId),
    Local(LocalId),
    Inst(InstId),
}

impl From<ConstId> for ValueRef {
    fn from(id: ConstId) -> Self {
        ValueRef::Const(id)
    }
}
impl From<GlobalId> for ValueRef {
    fn from(id: GlobalId) -> Self {
        ValueRef::Global(id)
    }
}
impl From<LocalId> for ValueRef {
    fn from(id: LocalId) -> Self {
        ValueRef::Local(id)
    }
}
impl From<InstId> for ValueRef {
    fn from(id: InstId) -> Self {
        ValueRef::Inst(id)
    }
}

/// A physical ARM32 register, identified by its encoding (0-15). Kept
/// decoupled from the back end's mnemonic table so the middle end can
/// record register assignments without depending on `back`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PhysReg(pub u8);

/// Where a value lives once register assignment has run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Location {
    Register(PhysReg),
    /// An address `base + offset`, e.g. `[fp, #-12]`.
    Memory { base: PhysReg, offset: i32 },
}

/// A single incoming def-use edge: `user` has `value` as its `slot`'th
/// operand. Removing a use means removing the matching entry from the
/// def's `uses` list; see [`crate::middle::module::Function::replace_operand`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Use {
    pub user: InstId,
    pub slot: u8,
}

/// A non-instruction value: a global, a constant, a local variable, a
/// formal parameter, or a synthesized spill/overflow-argument slot.
///
/// `Instruction` is deliberately not a [`NonInstValue`] variant -- most
/// instructions also define a result, and giving results their own arena
/// slot (`Function::code`) lets the same id serve both as "the i'th
/// instruction" and "the value it produces".
#[derive(Debug)]
pub struct GlobalVar {
    pub name: Id,
    pub ty: Type,
    /// `None` means BSS (zero-initialized); `Some` is a folded constant
    /// initializer, valid only for scalar globals.
    pub init: Option<i32>,
}

#[derive(Debug)]
pub enum LocalKind {
    /// A named or anonymous stack-resident local, introduced by a
    /// declaration or as the synthesized copy-destination of a formal
    /// parameter.
    ///
    /// `holds_array_pointer` distinguishes the two ways an array-typed
    /// local can denote "its own address": a plain declared array (e.g.
    /// `int a[2][3];`) owns its storage, so its address *is* its frame
    /// slot (`fp + offset`) and must never be loaded as a scalar. The
    /// local bound to an array formal parameter instead *holds* a
    /// pointer value that was copied in at entry, so getting its base
    /// address means loading the word from its slot like any scalar.
    Variable {
        name: Option<Id>,
        scope_level: u32,
        holds_array_pointer: bool,
    },
    /// The ABI-visible incoming argument itself (as opposed to the local
    /// variable it is copied into at entry).
    FormalParam { name: Id, index: u32 },
    /// A synthesized stack slot used to stage an overflow (5th+) call
    /// argument, e.g. `MemVariable(sp, 0)`.
    MemVariable { base: PhysReg, offset: i32 },
}

#[derive(Debug)]
pub struct LocalSlot {
    pub ty: Type,
    pub kind: LocalKind,
    pub is_array: bool,
    pub dimensions: Vec<usize>,
    pub uses: Vec<Use>,
    pub location: Option<Location>,
}

impl LocalSlot {
    pub fn add_use(&mut self, u: Use) {
        self.uses.push(u);
    }

    pub fn remove_use(&mut self, u: Use) {
        if let Some(pos) = self.uses.iter().position(|x| *x == u) {
            self.uses.remove(pos);
        }
    }

    pub fn name(&self) -> Option<Id> {
        match &self.kind {
            LocalKind::Variable { name, .. } => *name,
            LocalKind::FormalParam { name, .. } => Some(*name),
            LocalKind::MemVariable { .. } => None,
        }
    }
}

/// A binary arithmetic or comparison operator.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum BinOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("sdiv")]
    Div,
    #[display("mod")]
    Mod,
    #[display("icmp_eq")]
    CmpEq,
    #[display("icmp_ne")]
    CmpNe,
    #[display("icmp_lt")]
    CmpLt,
    #[display("icmp_le")]
    CmpLe,
    #[display("icmp_gt")]
    CmpGt,
    #[display("icmp_ge")]
    CmpGe,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::CmpEq | BinOp::CmpNe | BinOp::CmpLt | BinOp::CmpLe | BinOp::CmpGt | BinOp::CmpGe
        )
    }

    /// The comparison that must hold between the two operands for this
    /// relational op's *true* branch to be taken.
    pub fn negate(self) -> BinOp {
        match self {
            BinOp::CmpEq => BinOp::CmpNe,
            BinOp::CmpNe => BinOp::CmpEq,
            BinOp::CmpLt => BinOp::CmpGe,
            BinOp::CmpLe => BinOp::CmpGt,
            BinOp::CmpGt => BinOp::CmpLe,
            BinOp::CmpGe => BinOp::CmpLt,
            op => op,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum UnOp {
    #[display("neg")]
    Neg,
    #[display("deref")]
    Deref,
}

impl PhysReg {
    pub fn id(self) -> u8 {
        self.0
    }
}

/// The array-copy metadata carried by a `Move` that binds an array formal
/// parameter: the move transfers an address, not a scalar, and records the
/// remaining (possibly partially-indexed) dimension vector so the callee
/// knows the sub-array's shape.
pub type ArrayCopy = Option<Vec<usize>>;

/// One linear IR instruction. Most variants define a result -- the
/// `InstId` naming this instruction is also that result's `ValueRef`.
#[derive(Debug)]
pub enum Instruction {
    Entry,
    Exit(Option<ValueRef>),
    Label(Id),
    Goto(Id),
    CondGoto {
        cond: ValueRef,
        true_label: Id,
        false_label: Id,
    },
    Binary {
        op: BinOp,
        lhs: ValueRef,
        rhs: ValueRef,
    },
    Unary {
        op: UnOp,
        operand: ValueRef,
    },
    Move {
        dst: ValueRef,
        src: ValueRef,
        array_copy: ArrayCopy,
    },
    FuncCall {
        callee: Id,
        args: Vec<ValueRef>,
        ret_type: Type,
    },
    /// Optional argument marker. Not emitted by lowering (arguments are
    /// read directly off `FuncCall::args`); present only so a selector
    /// that wants one can use it. See the open question in the design
    /// notes -- dead in this implementation, as in the source it was
    /// ported from.
    Arg(ValueRef),
}

impl Instruction {
    /// Does this instruction variant define a result value? If so, its
    /// `InstId` is also a valid `ValueRef::Inst` operand elsewhere.
    pub fn defines_result(&self) -> bool {
        matches!(
            self,
            Instruction::Binary { .. }
                | Instruction::Unary { .. }
                | Instruction::FuncCall { .. }
        )
    }

    /// Does this instruction have an observable side effect, such that it
    /// must not be removed even with zero uses?
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Instruction::Entry
                | Instruction::Exit(_)
                | Instruction::Label(_)
                | Instruction::Goto(_)
                | Instruction::CondGoto { .. }
                | Instruction::Move { .. }
                | Instruction::FuncCall { .. }
        )
    }

    /// The operands this instruction reads, in evaluation order.
    pub fn operands(&self) -> Vec<ValueRef> {
        match self {
            Instruction::Entry | Instruction::Label(_) | Instruction::Goto(_) => vec![],
            Instruction::Exit(v) => v.iter().copied().collect(),
            Instruction::CondGoto { cond, .. } => vec![*cond],
            Instruction::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::Unary { operand, .. } => vec![*operand],
            Instruction::Move { dst, src, .. } => vec![*dst, *src],
            Instruction::FuncCall { args, .. } => args.clone(),
            Instruction::Arg(v) => vec![*v],
        }
    }
}

#[derive(Debug)]
pub struct InstEntry {
    pub inst: Instruction,
    /// Uses of the result this instruction defines, if any.
    pub uses: Vec<Use>,
    pub location: Option<Location>,
}

impl InstEntry {
    pub fn new(inst: Instruction) -> Self {
        InstEntry {
            inst,
            uses: vec![],
            location: None,
        }
    }

    pub fn add_use(&mut self, u: Use) {
        self.uses.push(u);
    }

    pub fn remove_use(&mut self, u: Use) {
        if let Some(pos) = self.uses.iter().position(|x| *x == u) {
            self.uses.remove(pos);
        }
    }

    pub fn is_dead(&self) -> bool {
        self.uses.is_empty() && !self.inst.has_side_effects()
    }
}
