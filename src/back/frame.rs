//! Frame layout & simple register assignment (component F).
//!
//! Every live-across-instructions value stays in memory; the selector
//! only ever holds a value in a register for the span of a single
//! instruction (see [`super::arm::ScratchPool`]). That means "register
//! assignment" here is limited to fixing the small, fixed set of
//! scratch registers the selector is allowed to clobber, and the real
//! work of this module is assigning every local a stack offset.
//!
//! # Frame shape, fp-relative, high to low addresses
//!
//! ```text
//!   [fp+8 .. ]          overflow incoming args (5th+), caller-pushed
//!   [fp+4]              saved lr
//!   [fp+0]              saved fp             <- fp
//!   [fp-4 .. fp-12]      saved r4, r5, r6 (the scratch pool)
//!   [fp-16 .. fp-X]      locals (formal-param copies, variables, arrays)
//!   [sp+0 .. ]          outgoing overflow args for calls this function makes
//! ```
//!
//! `frame_size` is the amount subtracted from `sp` after the scratch
//! pool is pushed -- i.e. the combined size of the local area and the
//! outgoing-argument area, rounded up to 8 bytes to keep `sp` aligned
//! per AAPCS at every call site.

use crate::back::arm::SCRATCH_POOL;
use crate::middle::{LocalKind, Module};

/// Bytes reserved below `fp` for the always-pushed scratch pool.
pub const SAVED_SCRATCH_BYTES: i32 = 12;

/// The fp-relative offset of the first incoming overflow argument
/// (5th+), i.e. past the saved fp/lr pair.
pub const FIRST_OVERFLOW_ARG_OFFSET: i32 = 8;

/// Assign a stack offset to every local in every function, and fix the
/// callee-saved register set each function's prologue must protect.
pub fn assign_frames(module: &mut Module) {
    for fidx in 0..module.functions.len() {
        assign_function_frame(module, fidx);
    }
}

fn assign_function_frame(module: &mut Module, fidx: usize) {
    let func = &mut module.functions[fidx];
    func.protected_registers = SCRATCH_POOL.iter().map(|r| r.to_phys()).collect();

    let mut cursor = SAVED_SCRATCH_BYTES;
    for local in func.locals.iter_mut() {
        let location = match &local.kind {
            LocalKind::FormalParam { index, .. } if *index >= 4 => {
                let offset = FIRST_OVERFLOW_ARG_OFFSET + 4 * (*index as i32 - 4);
                crate::middle::Location::Memory {
                    base: super::arm::Register::Fp.to_phys(),
                    offset,
                }
            }
            // Register-passed formal params (index < 4) still get a
            // frame slot: the prologue copies r0-r3 into it immediately
            // so the rest of the selector never special-cases "value
            // still live in an argument register".
            LocalKind::FormalParam { .. } | LocalKind::Variable { .. } => {
                let size = (local.ty.size_bytes().max(4)) as i32;
                cursor += size;
                crate::middle::Location::Memory {
                    base: super::arm::Register::Fp.to_phys(),
                    offset: -cursor,
                }
            }
            LocalKind::MemVariable { base, offset } => {
                crate::middle::Location::Memory { base: *base, offset: *offset }
            }
        };
        local.location = Some(location);
    }

    // Every instruction that defines a result is just as memory-resident
    // as a named local: the selector materializes it into a scratch
    // register for the span of one instruction and spills it right back.
    for idx in 0..func.code.len() {
        if func.code[idx].inst.defines_result() {
            cursor += 4;
            func.code[idx].location = Some(crate::middle::Location::Memory {
                base: super::arm::Register::Fp.to_phys(),
                offset: -cursor,
            });
        }
    }

    let locals_area = cursor - SAVED_SCRATCH_BYTES;
    let outgoing_area = (func.max_outgoing_args * 4) as i32;
    let raw = SAVED_SCRATCH_BYTES + locals_area + outgoing_area;
    let padded = (raw + 7) & !7;
    func.frame_size = padded - SAVED_SCRATCH_BYTES;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;
    use crate::types::Type;

    #[test]
    fn locals_get_distinct_negative_offsets_below_the_scratch_pool() {
        let mut m = Module::new();
        m.new_function(intern("f"), Type::Void);
        m.with_scope(|m| {
            m.new_var_value(Type::Int32, Some(intern("a")));
            m.new_var_value(Type::Int32, Some(intern("b")));
        });
        m.finish_function();
        assign_frames(&mut m);
        let f = m.find_function(intern("f")).unwrap();
        let offsets: Vec<i32> = f
            .locals
            .iter()
            .map(|l| match l.location {
                Some(crate::middle::Location::Memory { offset, .. }) => offset,
                _ => panic!("expected a memory location"),
            })
            .collect();
        assert_eq!(offsets, vec![-16, -20]);
    }

    #[test]
    fn frame_size_is_eight_byte_aligned() {
        let mut m = Module::new();
        m.new_function(intern("f"), Type::Void);
        m.with_scope(|m| {
            m.new_var_value(Type::Int32, Some(intern("a")));
        });
        m.current_function_mut().unwrap().max_outgoing_args = 1;
        m.finish_function();
        assign_frames(&mut m);
        let f = m.find_function(intern("f")).unwrap();
        assert_eq!((f.frame_size + SAVED_SCRATCH_BYTES) % 8, 0);
    }
}
