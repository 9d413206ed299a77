//! Graph coloring register allocation with spilling.

use crate::{asm::Code, error::Result, names::NameGen};

pub mod color_graph;
pub mod interferences;
pub mod live_sets;
mod regalloc;
pub mod spill;

pub use interferences::Interferences;
pub use live_sets::LiveSets;
pub use regalloc::{AllocationOutcome, RegAlloc};

/// Allocates `num_regs` registers for `code` in place.
pub fn allocate(names: &NameGen, code: &mut Code, num_regs: usize) -> Result<()> {
    RegAlloc::new(names, num_regs).allocate_registers(code)
}
