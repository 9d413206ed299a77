use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use super::{
    color_graph::{ColorGraph, live_range_spans},
    interferences::Interferences,
    live_sets::LiveSets,
    spill::{SpillSlots, rewrite_with_spill},
};
use crate::{
    asm::Code,
    error::{BackendError, Result},
    frame::FP_REG,
    names::{NameGen, Tmp},
};

/// What one round of build, simplify and select produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    Colored(BTreeMap<Tmp, usize>),
    /// Select found no free register for this temporary.
    Spilled(Tmp),
}

/// Register Allocator
pub struct RegAlloc<'a> {
    names: &'a NameGen,
    num_regs: usize,
    slots: SpillSlots,
    /// Temporaries introduced by spill rewriting. Spilling one of these again would never end.
    spill_tmps: BTreeSet<Tmp>,
}

impl<'a> RegAlloc<'a> {
    pub fn new(names: &'a NameGen, num_regs: usize) -> Self {
        Self {
            names,
            num_regs,
            slots: SpillSlots::default(),
            spill_tmps: BTreeSet::new(),
        }
    }

    /// Colors `code` with at most `num_regs` registers, rewriting it with spills until it fits.
    /// On success `code.regs` holds a register for every temporary and `code.temp_size` the
    /// bytes of spill slots used.
    pub fn allocate_registers(&mut self, code: &mut Code) -> Result<()> {
        let precolored = BTreeMap::from([(code.frame.fp, FP_REG)]);
        let mut attempts = 0;

        loop {
            attempts += 1;
            if attempts > self.names.tmps_created() {
                return Err(self.non_convergence(code, "too many allocation attempts".into()));
            }
            debug!("allocation attempt {attempts} for {:?}", code.frame.lbl);

            let mut color_graph = self.build_phase(code, &precolored);
            trace!("COLOR GRAPH:\n{color_graph:?}");
            let spans = live_range_spans(&code.instrs);
            let mut stack = self.simplify_phase(&mut color_graph, &spans);

            match self.select_phase(&mut color_graph, &mut stack) {
                AllocationOutcome::Colored(regs) => {
                    code.regs = regs;
                    code.temp_size = self.slots.size();
                    debug!(
                        "colored {:?} after {attempts} attempts, {} bytes of spill slots",
                        code.frame.lbl, code.temp_size
                    );
                    return Ok(());
                }
                AllocationOutcome::Spilled(tmp) if self.spill_tmps.contains(&tmp) => {
                    return Err(self.non_convergence(
                        code,
                        format!("{tmp:?} was introduced by spilling and needs spilling again"),
                    ));
                }
                AllocationOutcome::Spilled(tmp) => {
                    debug!("spilling {tmp:?} in {:?}", code.frame.lbl);
                    rewrite_with_spill(
                        self.names,
                        code,
                        tmp,
                        &mut self.slots,
                        &mut self.spill_tmps,
                    )?;
                }
            }
        }
    }

    fn non_convergence(&self, code: &Code, reason: String) -> BackendError {
        BackendError::NonConvergence {
            function: code.frame.lbl.render(),
            reason,
        }
    }

    fn build_phase(&self, code: &Code, precolored: &BTreeMap<Tmp, usize>) -> ColorGraph {
        let live_sets = LiveSets::compute(code);
        trace!("LIVE SETS:\n{}", live_sets.display(&code.instrs));
        let interferences = Interferences::compute(&code.instrs, &live_sets);
        ColorGraph::new(interferences, self.num_regs, precolored)
    }

    fn simplify_phase(
        &self,
        color_graph: &mut ColorGraph,
        spans: &BTreeMap<Tmp, usize>,
    ) -> Vec<Tmp> {
        let mut stack = Vec::new();

        loop {
            // First remove all easy nodes and save them to the stack.
            while let Some(tmp) = color_graph.take_some_insig_node() {
                trace!(">> simplify: {tmp:?}");
                stack.push(tmp);
            }

            // Then remove a node that may need spilling, and see if that freed up more easy
            // nodes.
            match color_graph.choose_node_to_spill(spans, &self.spill_tmps) {
                Some(tmp) => {
                    trace!(">> simplify (potentially spill): {tmp:?}");
                    stack.push(tmp);
                }
                None => return stack,
            }
        }
    }

    fn select_phase(&self, color_graph: &mut ColorGraph, stack: &mut Vec<Tmp>) -> AllocationOutcome {
        while let Some(tmp) = stack.pop() {
            match color_graph.select_once(tmp) {
                Some(reg) => trace!("  {tmp:?} -> ${reg}"),
                None => {
                    trace!("  * no register left for {tmp:?}");
                    return AllocationOutcome::Spilled(tmp);
                }
            }
        }
        AllocationOutcome::Colored(color_graph.assignments())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{asm::AsmInstr, frame::Frame, names::Lbl};

    fn code_with(names: &NameGen, instrs: Vec<AsmInstr>) -> Code {
        let frame = Frame::new(names, "f".into(), 1, 0, 0);
        let entry = frame.lbl;
        Code::new(frame, instrs, entry, Lbl::from("f_exit"))
    }

    /// Every pair of temporaries live at the same point sits in different registers.
    fn assert_no_conflicts(code: &Code) {
        let live_sets = LiveSets::compute(code);
        for id in 0..code.instrs.len() {
            for set in [live_sets.live_in(id), live_sets.live_out(id)] {
                let regs: BTreeSet<usize> = set.iter().map(|tmp| code.regs[tmp]).collect();
                assert_eq!(regs.len(), set.len(), "conflict at {:?}", code.instrs[id]);
            }
        }
    }

    #[test]
    fn pressure_of_three_spills_once_with_two_registers() {
        let names = NameGen::new();
        let [a, b, c, d, e] = std::array::from_fn(|_| names.fresh_tmp());
        let mut code = code_with(
            &names,
            vec![
                AsmInstr::oper("SETL `d0,1", [], [a]),
                AsmInstr::oper("SETL `d0,2", [], [b]),
                AsmInstr::oper("SETL `d0,3", [], [c]),
                AsmInstr::oper("ADD `d0,`s0,`s1", [b, c], [d]),
                AsmInstr::oper("ADD `d0,`s0,`s1", [a, d], [e]),
            ],
        );

        RegAlloc::new(&names, 2).allocate_registers(&mut code).unwrap();

        assert_eq!(code.temp_size, 8);
        let count = |op: &str| {
            code.instrs
                .iter()
                .filter(|instr| format!("{instr:?}").starts_with(op))
                .count()
        };
        assert_eq!(count("STO"), 1);
        assert_eq!(count("LDO"), 1);
        assert_eq!(code.regs[&code.frame.fp], FP_REG);
        assert!(
            code.regs
                .iter()
                .filter(|(tmp, _)| **tmp != code.frame.fp)
                .all(|(_, reg)| *reg < 2)
        );
        assert_no_conflicts(&code);
    }

    #[test]
    fn enough_registers_means_no_spill() {
        let names = NameGen::new();
        let [a, b, c] = std::array::from_fn(|_| names.fresh_tmp());
        let instrs = vec![
            AsmInstr::oper("SETL `d0,1", [], [a]),
            AsmInstr::oper("SETL `d0,2", [], [b]),
            AsmInstr::oper("ADD `d0,`s0,`s1", [a, b], [c]),
        ];
        let mut code = code_with(&names, instrs.clone());

        RegAlloc::new(&names, 8).allocate_registers(&mut code).unwrap();

        assert_eq!(code.instrs, instrs);
        assert_eq!(code.temp_size, 0);
        assert_ne!(code.regs[&a], code.regs[&b]);
        assert_no_conflicts(&code);
    }

    #[test]
    fn one_register_cannot_hold_two_operands() {
        let names = NameGen::new();
        let [b, c, d] = std::array::from_fn(|_| names.fresh_tmp());
        let mut code = code_with(
            &names,
            vec![
                AsmInstr::oper("SETL `d0,2", [], [b]),
                AsmInstr::oper("SETL `d0,3", [], [c]),
                AsmInstr::oper("ADD `d0,`s0,`s1", [b, c], [d]),
            ],
        );

        let err = RegAlloc::new(&names, 1)
            .allocate_registers(&mut code)
            .unwrap_err();
        assert!(matches!(err, BackendError::NonConvergence { .. }), "{err}");
    }
}
