//! Backend of a small compiler targeting MMIX: canonicalization, basic block layout,
//! instruction selection and graph coloring register allocation.

pub mod asm;
pub mod canon;
pub mod chunks;
pub mod compiler;
pub mod config;
pub mod demos;
pub mod error;
pub mod frame;
pub mod imcgen;
pub mod instr_sel;
pub mod ir;
pub mod names;
pub mod regalloc;
