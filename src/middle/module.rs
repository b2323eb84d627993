//! Module & Function (component C): symbol table, scope stack, constant
//! pool, and the per-function linear IR container.

use crate::common::{Id, Map};
use crate::middle::value::*;
use crate::types::Type;

/// A LIFO scope: names introduced here shadow the same name in any outer
/// scope, and become unresolvable once the scope is left.
#[derive(Debug, Default)]
struct Scope {
    vars: Map<Id, ValueRef>,
}

/// One MiniC function: its ABI-visible parameters, its linear IR, and the
/// bookkeeping the lowering and back end thread through it.
#[derive(Debug)]
pub struct Function {
    pub name: Id,
    pub return_type: Type,
    /// Present unless `return_type` is `Void`.
    pub ret_slot: Option<LocalId>,
    pub params: Vec<LocalId>,
    pub locals: Vec<LocalSlot>,
    pub code: Vec<InstEntry>,
    pub exit_label: Id,

    /// `(break_target, continue_target)` pairs, pushed on loop entry and
    /// popped on loop exit, in LIFO order matching lexical nesting.
    loop_labels: Vec<(Id, Id)>,

    label_counter: u32,
    anon_counter: u32,

    /// The largest number of stack-passed (5th+) arguments any call site
    /// in this function makes, used to size the outgoing-argument area.
    pub max_outgoing_args: usize,

    /// Callee-saved registers this function must push/pop, decided during
    /// register assignment.
    pub protected_registers: Vec<PhysReg>,

    /// Byte size of the local-variable area below the frame pointer,
    /// filled in by frame layout.
    pub frame_size: i32,
}

impl Function {
    fn new(name: Id, return_type: Type) -> Self {
        Function {
            name,
            return_type,
            ret_slot: None,
            params: vec![],
            locals: vec![],
            code: vec![],
            exit_label: crate::common::intern(format!(".L.exit.{name}")),
            loop_labels: vec![],
            label_counter: 0,
            anon_counter: 0,
            max_outgoing_args: 0,
            protected_registers: vec![],
            frame_size: 0,
        }
    }

    pub fn local(&self, id: LocalId) -> &LocalSlot {
        &self.locals[id.0 as usize]
    }

    pub fn local_mut(&mut self, id: LocalId) -> &mut LocalSlot {
        &mut self.locals[id.0 as usize]
    }

    pub fn inst(&self, id: InstId) -> &InstEntry {
        &self.code[id.0 as usize]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut InstEntry {
        &mut self.code[id.0 as usize]
    }

    /// Append an instruction to the end of the IR and wire up the
    /// def-use edges for every operand it reads.
    pub fn push(&mut self, inst: Instruction) -> InstId {
        let id = InstId(self.code.len() as u32);
        let operands = inst.operands();
        self.code.push(InstEntry::new(inst));
        for (slot, operand) in operands.into_iter().enumerate() {
            self.add_use(operand, Use { user: id, slot: slot as u8 });
        }
        id
    }

    pub fn add_use(&mut self, value: ValueRef, u: Use) {
        match value {
            ValueRef::Local(l) => self.local_mut(l).add_use(u),
            ValueRef::Inst(i) => self.inst_mut(i).add_use(u),
            // Constants and globals are addressed by literal/name at emit
            // time rather than scheduled, so tracking their uses is not
            // needed for anything this back end does.
            ValueRef::Const(_) | ValueRef::Global(_) => {}
        }
    }

    pub fn remove_use(&mut self, value: ValueRef, u: Use) {
        match value {
            ValueRef::Local(l) => self.local_mut(l).remove_use(u),
            ValueRef::Inst(i) => self.inst_mut(i).remove_use(u),
            ValueRef::Const(_) | ValueRef::Global(_) => {}
        }
    }

    /// Replace every occurrence of `old` with `new` among `inst`'s
    /// operands, atomically moving the def-use edge from `old` to `new`.
    /// Used by the instruction selector when it rewrites an operand to a
    /// freshly-allocated scratch register's value.
    pub fn replace_operand(&mut self, inst: InstId, old: ValueRef, new: ValueRef) {
        let operands = self.inst(inst).inst.operands();
        for (slot, op) in operands.into_iter().enumerate() {
            if op == old {
                self.remove_use(old, Use { user: inst, slot: slot as u8 });
                self.add_use(new, Use { user: inst, slot: slot as u8 });
            }
        }
        replace_operand_in_place(&mut self.inst_mut(inst).inst, old, new);
    }

    pub fn fresh_label(&mut self, hint: &str) -> Id {
        let n = self.label_counter;
        self.label_counter += 1;
        crate::common::intern(format!(".L{hint}{n}"))
    }

    pub fn fresh_anon_name(&mut self) -> Id {
        let n = self.anon_counter;
        self.anon_counter += 1;
        crate::common::intern(format!("%t{n}"))
    }

    pub fn push_loop_labels(&mut self, break_label: Id, continue_label: Id) {
        self.loop_labels.push((break_label, continue_label));
    }

    pub fn pop_loop_labels(&mut self) {
        self.loop_labels.pop();
    }

    pub fn break_label(&self) -> Option<Id> {
        self.loop_labels.last().map(|(b, _)| *b)
    }

    pub fn continue_label(&self) -> Option<Id> {
        self.loop_labels.last().map(|(_, c)| *c)
    }

    pub fn note_call_args(&mut self, argc: usize) {
        let overflow = argc.saturating_sub(4);
        self.max_outgoing_args = self.max_outgoing_args.max(overflow);
    }
}

/// Owns every global, the interned constant pool, and every function.
#[derive(Debug, Default)]
pub struct Module {
    pub globals: Vec<GlobalVar>,
    global_names: Map<Id, GlobalId>,

    constants: Vec<i32>,
    const_index: Map<i32, ConstId>,

    pub functions: Vec<Function>,
    function_names: Map<Id, usize>,

    scopes: Vec<Scope>,
    current_function: Option<usize>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn current_function(&self) -> Option<&Function> {
        self.current_function.map(|i| &self.functions[i])
    }

    pub fn current_function_mut(&mut self) -> Option<&mut Function> {
        self.current_function.map(move |i| &mut self.functions[i])
    }

    pub fn const_value(&self, id: ConstId) -> i32 {
        self.constants[id.0 as usize]
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVar {
        &self.globals[id.0 as usize]
    }

    /// Intern an integer constant, returning the existing id if this
    /// value has already been pooled.
    pub fn new_const_int(&mut self, value: i32) -> ConstId {
        if let Some(id) = self.const_index.get(&value) {
            return *id;
        }
        let id = ConstId(self.constants.len() as u32);
        self.constants.push(value);
        self.const_index.insert(value, id);
        id
    }

    /// Register a new function. Fails (returns `None`) if the name is
    /// already taken.
    pub fn new_function(&mut self, name: Id, return_type: Type) -> Option<usize> {
        if self.function_names.contains_key(&name) {
            return None;
        }
        let idx = self.functions.len();
        self.functions.push(Function::new(name, return_type));
        self.function_names.insert(name, idx);
        self.current_function = Some(idx);
        Some(idx)
    }

    pub fn finish_function(&mut self) {
        self.current_function = None;
    }

    pub fn find_function(&self, name: Id) -> Option<&Function> {
        self.function_names.get(&name).map(|&i| &self.functions[i])
    }

    /// Run `f` with a fresh scope pushed on top of the stack, popping it
    /// unconditionally once `f` returns -- a scoped-acquisition idiom so a
    /// semantic error that short-circuits `f` via `?` still leaves the
    /// scope cleanly rather than leaking it onto outer lookups.
    pub fn with_scope<R>(&mut self, f: impl FnOnce(&mut Module) -> R) -> R {
        self.scopes.push(Scope::default());
        let result = f(self);
        self.scopes.pop();
        result
    }

    pub fn scope_depth(&self) -> u32 {
        self.scopes.len() as u32
    }

    /// Create a new variable, named or anonymous. Inside a function body
    /// this is a [`LocalKind::Variable`] bound in the innermost scope;
    /// at module scope (no current function) it is a [`GlobalVar`].
    pub fn new_var_value(&mut self, ty: Type, name: Option<Id>) -> ValueRef {
        if let Some(fidx) = self.current_function {
            let level = self.scope_depth();
            let is_array = ty.is_array();
            let dims = ty.dimensions().to_vec();
            let func = &mut self.functions[fidx];
            let id = LocalId(func.locals.len() as u32);
            func.locals.push(LocalSlot {
                ty,
                kind: LocalKind::Variable {
                    name,
                    scope_level: level,
                    holds_array_pointer: false,
                },
                is_array,
                dimensions: dims,
                uses: vec![],
                location: None,
            });
            if let Some(name) = name {
                if let Some(scope) = self.scopes.last_mut() {
                    scope.vars.insert(name, ValueRef::Local(id));
                }
            }
            ValueRef::Local(id)
        } else {
            let name = name.unwrap_or_else(|| crate::common::intern(format!("%g{}", self.globals.len())));
            let id = GlobalId(self.globals.len() as u32);
            self.globals.push(GlobalVar { name, ty, init: None });
            self.global_names.insert(name, id);
            ValueRef::Global(id)
        }
    }

    /// Add a formal parameter to the currently-registered function,
    /// creating both the ABI-visible [`LocalKind::FormalParam`] and
    /// returning its id so the lowering can also create the bound local
    /// variable it is copied into.
    pub fn new_formal_param(&mut self, ty: Type, name: Id, index: u32) -> LocalId {
        let fidx = self.current_function.expect("formal param outside function");
        let func = &mut self.functions[fidx];
        let is_array = ty.is_array();
        let dims = ty.dimensions().to_vec();
        let id = LocalId(func.locals.len() as u32);
        func.locals.push(LocalSlot {
            ty,
            kind: LocalKind::FormalParam { name, index },
            is_array,
            dimensions: dims,
            uses: vec![],
            location: None,
        });
        func.params.push(id);
        id
    }

    /// Create the local variable that an array formal parameter is
    /// copied into at entry. Unlike a plain declared array, this local's
    /// own slot *holds* the base-address pointer rather than *being* the
    /// array's storage; see [`LocalKind::Variable::holds_array_pointer`].
    pub fn new_array_param_local(&mut self, ty: Type, name: Id) -> ValueRef {
        let level = self.scope_depth();
        let is_array = ty.is_array();
        let dims = ty.dimensions().to_vec();
        let fidx = self.current_function.expect("array param local outside function");
        let func = &mut self.functions[fidx];
        let id = LocalId(func.locals.len() as u32);
        func.locals.push(LocalSlot {
            ty,
            kind: LocalKind::Variable {
                name: Some(name),
                scope_level: level,
                holds_array_pointer: true,
            },
            is_array,
            dimensions: dims,
            uses: vec![],
            location: None,
        });
        self.bind_name(name, ValueRef::Local(id));
        ValueRef::Local(id)
    }

    pub fn new_mem_variable(&mut self, base: PhysReg, offset: i32) -> LocalId {
        let fidx = self.current_function.expect("mem variable outside function");
        let func = &mut self.functions[fidx];
        let id = LocalId(func.locals.len() as u32);
        func.locals.push(LocalSlot {
            ty: Type::Int32,
            kind: LocalKind::MemVariable { base, offset },
            is_array: false,
            dimensions: vec![],
            uses: vec![],
            location: Some(Location::Memory { base, offset }),
        });
        id
    }

    fn current_idx(&self) -> usize {
        self.current_function.expect("operation requires an active function")
    }

    /// Append an instruction to the currently-active function's code.
    pub fn push_inst(&mut self, inst: Instruction) -> InstId {
        let fidx = self.current_idx();
        self.functions[fidx].push(inst)
    }

    pub fn fresh_label(&mut self, hint: &str) -> Id {
        let fidx = self.current_idx();
        self.functions[fidx].fresh_label(hint)
    }

    pub fn exit_label(&self) -> Id {
        self.functions[self.current_idx()].exit_label
    }

    pub fn ret_slot(&self) -> Option<LocalId> {
        self.functions[self.current_idx()].ret_slot
    }

    pub fn set_ret_slot(&mut self, id: LocalId) {
        let fidx = self.current_idx();
        self.functions[fidx].ret_slot = Some(id);
    }

    pub fn push_loop_labels(&mut self, break_label: Id, continue_label: Id) {
        let fidx = self.current_idx();
        self.functions[fidx].push_loop_labels(break_label, continue_label);
    }

    pub fn pop_loop_labels(&mut self) {
        let fidx = self.current_idx();
        self.functions[fidx].pop_loop_labels();
    }

    pub fn break_label(&self) -> Option<Id> {
        self.functions[self.current_idx()].break_label()
    }

    pub fn continue_label(&self) -> Option<Id> {
        self.functions[self.current_idx()].continue_label()
    }

    pub fn note_call_args(&mut self, argc: usize) {
        let fidx = self.current_idx();
        self.functions[fidx].note_call_args(argc);
    }

    pub fn bind_name(&mut self, name: Id, value: ValueRef) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(name, value);
        }
    }

    /// Search inner-to-outer scopes, then fall back to globals.
    pub fn find_var_value(&self, name: Id) -> Option<ValueRef> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.vars.get(&name) {
                return Some(*v);
            }
        }
        self.global_names.get(&name).map(|&id| ValueRef::Global(id))
    }

    /// The type of any value reference, used by the lowering to check
    /// operand types.
    pub fn value_type(&self, v: ValueRef) -> Type {
        match v {
            ValueRef::Const(_) => Type::Int32,
            ValueRef::Global(g) => self.global(g).ty.clone(),
            ValueRef::Local(l) => {
                let fidx = self.current_function.expect("local outside function");
                self.functions[fidx].local(l).ty.clone()
            }
            ValueRef::Inst(i) => {
                let fidx = self.current_function.expect("inst outside function");
                match &self.functions[fidx].inst(i).inst {
                    Instruction::Binary { op, .. } if op.is_comparison() => Type::Bool,
                    Instruction::Binary { .. } => Type::Int32,
                    Instruction::Unary { op: UnOp::Deref, .. } => Type::Int32,
                    Instruction::Unary { op: UnOp::Neg, .. } => Type::Int32,
                    Instruction::FuncCall { ret_type, .. } => ret_type.clone(),
                    _ => Type::Void,
                }
            }
        }
    }
}

/// Whether `v`'s "value" is its own address -- true for a plain declared
/// array (a local or global that owns its storage), false for everything
/// else, including the local bound to an array formal parameter (which
/// holds a pointer that must be loaded like a scalar). The instruction
/// selector consults this when materializing an operand: an
/// address-only array is never loaded, only addressed.
pub fn is_address_only_array(module: &Module, func: &Function, v: ValueRef) -> bool {
    match v {
        ValueRef::Global(g) => module.global(g).ty.is_array(),
        ValueRef::Local(l) => {
            let slot = func.local(l);
            slot.is_array
                && !matches!(
                    slot.kind,
                    LocalKind::Variable {
                        holds_array_pointer: true,
                        ..
                    }
                )
        }
        _ => false,
    }
}

fn replace_operand_in_place(inst: &mut Instruction, old: ValueRef, new: ValueRef) {
    let swap = |v: &mut ValueRef| {
        if *v == old {
            *v = new;
        }
    };
    match inst {
        Instruction::Exit(Some(v)) => swap(v),
        Instruction::CondGoto { cond, .. } => swap(cond),
        Instruction::Binary { lhs, rhs, .. } => {
            swap(lhs);
            swap(rhs);
        }
        Instruction::Unary { operand, .. } => swap(operand),
        Instruction::Move { dst, src, .. } => {
            swap(dst);
            swap(src);
        }
        Instruction::FuncCall { args, .. } => {
            for a in args.iter_mut() {
                swap(a);
            }
        }
        Instruction::Arg(v) => swap(v),
        Instruction::Entry
        | Instruction::Exit(None)
        | Instruction::Label(_)
        | Instruction::Goto(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_shadowing_and_unresolve_after_leave() {
        let mut m = Module::new();
        m.new_function(crate::common::intern("main"), Type::Int32);
        let x_name = crate::common::intern("x");
        m.with_scope(|m| {
            let outer_x = m.new_var_value(Type::Int32, Some(x_name));
            assert_eq!(m.find_var_value(x_name), Some(outer_x));
            m.with_scope(|m| {
                let inner_x = m.new_var_value(Type::Int32, Some(x_name));
                assert_eq!(m.find_var_value(x_name), Some(inner_x));
                assert_ne!(inner_x, outer_x);
            });
            // inner scope popped: shadowing local is gone
            assert_eq!(m.find_var_value(x_name), Some(outer_x));
        });
    }

    #[test]
    fn globals_live_outside_any_function() {
        let mut m = Module::new();
        let name = crate::common::intern("g");
        let v = m.new_var_value(Type::Int32, Some(name));
        assert!(matches!(v, ValueRef::Global(_)));
        assert_eq!(m.find_var_value(name), Some(v));
    }

    #[test]
    fn duplicate_function_registration_fails() {
        let mut m = Module::new();
        let name = crate::common::intern("f");
        assert!(m.new_function(name, Type::Void).is_some());
        assert!(m.new_function(name, Type::Void).is_none());
    }
}
