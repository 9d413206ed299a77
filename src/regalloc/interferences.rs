use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use super::live_sets::LiveSets;
use crate::{asm::AsmInstr, names::Tmp};

/// Which temporaries must not share a register.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Interferences {
    graph: BTreeMap<Tmp, BTreeSet<Tmp>>,
}

impl Interferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Temporaries that are live together anywhere interfere:
    /// - every pair in the same live-in set,
    /// - every pair in the same live-out set,
    /// - every definition with everything live after it, and with the other definitions of the
    ///   same instruction. A definition that is never read is in no live set, yet still
    ///   overwrites its register.
    pub fn compute(instrs: &[AsmInstr], live_sets: &LiveSets) -> Self {
        let mut interferences = Self::new();
        interferences.ensure_all_tmps_registered(instrs, live_sets);

        for (id, instr) in instrs.iter().enumerate() {
            interferences.record_clique(live_sets.live_in(id));
            interferences.record_clique(live_sets.live_out(id));
            for &def in instr.defs() {
                for &live_out in live_sets.live_out(id) {
                    interferences.record_interference(def, live_out);
                }
                for &other in instr.defs() {
                    interferences.record_interference(def, other);
                }
            }
        }
        interferences
    }

    /// We don't want to forget about orphan nodes. A temporary that is defined but never read
    /// has no neighbors, yet it still needs a register.
    fn ensure_all_tmps_registered(&mut self, instrs: &[AsmInstr], live_sets: &LiveSets) {
        for (id, instr) in instrs.iter().enumerate() {
            let mentioned = instr
                .uses()
                .iter()
                .chain(instr.defs())
                .chain(live_sets.live_in(id))
                .chain(live_sets.live_out(id));
            for tmp in mentioned {
                self.graph.entry(*tmp).or_default();
            }
        }
    }

    fn record_clique(&mut self, tmps: &BTreeSet<Tmp>) {
        for &a in tmps {
            for &b in tmps.range(a..).skip(1) {
                self.record_interference(a, b);
            }
        }
    }

    pub fn record_interference(&mut self, a: Tmp, b: Tmp) {
        if a == b {
            return;
        }
        self.graph.entry(a).or_default().insert(b);
        self.graph.entry(b).or_default().insert(a);
    }

    pub fn take_graph(self) -> BTreeMap<Tmp, BTreeSet<Tmp>> {
        self.graph
    }
}

impl fmt::Debug for Interferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strict graph {{")?;
        for (tmp, neighbors) in &self.graph {
            write!(f, "    {tmp:?} -- {{")?;
            for n in neighbors {
                write!(f, " {n:?}")?;
            }
            writeln!(f, " }}")?;
        }
        writeln!(f, "}}")
    }
}
