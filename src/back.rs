//! The back end: frame layout, ARM32 instruction selection, and text
//! emission.

pub mod arm;
pub mod frame;
pub mod text;

pub use arm::select_module;
pub use frame::assign_frames;
pub use text::{emit_asm, print_ir};
