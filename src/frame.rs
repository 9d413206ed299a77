//! Activation records
//!
//! Layout, growing downwards from the frame pointer:
//!
//! ```text
//!  FP + 8*i            argument i (argument 0 is the static link, later the return value)
//!  FP - locs_size      locals
//!  FP - locs_size - 8  caller's frame pointer
//!  FP - locs_size - 16 return address
//!  ...                 spill slots, one word each
//!  SP + 8*i            outgoing arguments
//! ```

use std::collections::BTreeMap;

use crate::names::{Lbl, NameGen, Tmp};

/// Bytes per machine word.
pub const WORD: i64 = 8;

/// Reserved registers. `$251` holds the heap pointer, which this backend never touches.
pub const SP_REG: usize = 252;
pub const FP_REG: usize = 253;

/// Saved frame pointer and return address.
const BOOKKEEPING_SIZE: i64 = 2 * WORD;

#[derive(Debug, Clone)]
pub struct Frame {
    pub lbl: Lbl,
    /// Static nesting level. Top-level functions live at depth 1.
    pub depth: usize,
    pub locs_size: i64,
    pub args_size: i64,
    /// Holds the function's result when control reaches the exit label.
    pub rv: Tmp,
    /// Stands for the frame pointer register; it is never allocated.
    pub fp: Tmp,
}

impl Frame {
    pub fn new(names: &NameGen, lbl: Lbl, depth: usize, locs_size: i64, args_size: i64) -> Self {
        Self {
            lbl,
            depth,
            locs_size,
            args_size,
            rv: names.fresh_tmp(),
            fp: names.fresh_tmp(),
        }
    }

    /// Total frame size once `spill_size` bytes of spill slots have been reserved.
    pub fn size(&self, spill_size: i64) -> i64 {
        self.locs_size + BOOKKEEPING_SIZE + spill_size + self.args_size
    }

    /// How far below the frame pointer the given spill slot lives.
    pub fn spill_slot_distance(&self, slot: usize) -> i64 {
        self.locs_size + BOOKKEEPING_SIZE + (slot as i64 + 1) * WORD
    }

    /// Parameter `idx` of this function. Index 0 is the static link.
    pub fn param(&self, idx: usize) -> Access {
        Access::Rel {
            offset: idx as i64 * WORD,
            depth: self.depth,
        }
    }

    /// The `idx`-th word-sized local of this function.
    pub fn local(&self, idx: usize) -> Access {
        Access::Rel {
            offset: -(idx as i64 + 1) * WORD,
            depth: self.depth,
        }
    }
}

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// A global, addressed by its label.
    Abs(Lbl),
    /// Relative to the frame pointer of the function declared at `depth`.
    Rel { offset: i64, depth: usize },
}

/// Variable name to access, as computed by frame layout.
pub type Accesses = BTreeMap<String, Access>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spill_slots_sit_below_bookkeeping() {
        let names = NameGen::new();
        let frame = Frame::new(&names, "f".into(), 1, 24, 16);
        assert_eq!(frame.spill_slot_distance(0), 24 + 16 + 8);
        assert_eq!(frame.spill_slot_distance(2), 24 + 16 + 24);
        assert_eq!(frame.size(16), 24 + 16 + 16 + 16);
        assert_ne!(frame.rv, frame.fp);
    }

    #[test]
    fn accesses() {
        let names = NameGen::new();
        let frame = Frame::new(&names, "f".into(), 2, 16, 0);
        assert_eq!(frame.param(1), Access::Rel { offset: 8, depth: 2 });
        assert_eq!(frame.local(0), Access::Rel { offset: -8, depth: 2 });
    }
}
