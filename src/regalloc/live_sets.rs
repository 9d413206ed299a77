use std::{
    collections::{BTreeSet, HashMap},
    fmt::{self, Display},
};

use log::trace;
use smallvec::SmallVec;

use crate::{
    asm::{AsmInstr, Code},
    names::{Lbl, Tmp},
};

/// Per-instruction live-in and live-out sets, indexed like `Code::instrs`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LiveSets {
    live_ins: Vec<BTreeSet<Tmp>>,
    live_outs: Vec<BTreeSet<Tmp>>,
}

/// Finds the instruction defining a label, remembering earlier answers.
struct LabelCache<'a> {
    instrs: &'a [AsmInstr],
    found: HashMap<Lbl, Option<usize>>,
}

impl<'a> LabelCache<'a> {
    fn new(instrs: &'a [AsmInstr]) -> Self {
        Self {
            instrs,
            found: HashMap::new(),
        }
    }

    fn lookup(&mut self, lbl: Lbl) -> Option<usize> {
        let instrs = self.instrs;
        *self
            .found
            .entry(lbl)
            .or_insert_with(|| instrs.iter().position(|instr| instr.label() == Some(lbl)))
    }
}

/// Where control may go after each instruction.
pub struct Successors {
    succs: Vec<SmallVec<[usize; 2]>>,
    /// Whether the instruction may leave the function through its exit label.
    exits: Vec<bool>,
}

impl Successors {
    /// Fallthrough to the next instruction plus every jump target defined in this function.
    /// Jumps to labels elsewhere (calls) contribute nothing; a jump to the exit label is recorded
    /// separately.
    pub fn new(code: &Code) -> Self {
        let n = code.instrs.len();
        let mut cache = LabelCache::new(&code.instrs);
        let mut succs = Vec::with_capacity(n);
        let mut exits = Vec::with_capacity(n);
        for (id, instr) in code.instrs.iter().enumerate() {
            let mut here = SmallVec::new();
            if instr.falls_through() && id + 1 < n {
                here.push(id + 1);
            }
            for &lbl in instr.jumps() {
                if let Some(target) = cache.lookup(lbl) {
                    if !here.contains(&target) {
                        here.push(target);
                    }
                }
            }
            succs.push(here);
            exits.push(instr.jumps().contains(&code.exit));
        }
        Self { succs, exits }
    }

    pub fn of(&self, id: usize) -> &[usize] {
        &self.succs[id]
    }

    pub fn exits(&self, id: usize) -> bool {
        self.exits[id]
    }
}

impl LiveSets {
    /// Iterates the dataflow equations backwards until nothing changes. The frame's return
    /// value is live wherever control leaves through the exit label.
    pub fn compute(code: &Code) -> Self {
        let n = code.instrs.len();
        let succs = Successors::new(code);
        let mut live_sets = Self {
            live_ins: vec![BTreeSet::new(); n],
            live_outs: vec![BTreeSet::new(); n],
        };

        let mut passes = 0;
        let mut recompute = false;
        loop {
            passes += 1;
            for id in (0..n).rev() {
                live_sets.compute_live_outs(id, code, &succs, &mut recompute);
                live_sets.compute_live_ins(id, &code.instrs[id], &mut recompute);
            }

            if !recompute {
                break;
            } else {
                recompute = false;
            }
        }
        trace!("liveness of {:?} settled after {passes} passes", code.frame.lbl);
        live_sets
    }

    /// `LiveOuts[I] = union(LiveIn[s] for s in Succ[I])`
    fn compute_live_outs(
        &mut self,
        id: usize,
        code: &Code,
        succs: &Successors,
        recompute: &mut bool,
    ) {
        let mut live_outs = std::mem::take(&mut self.live_outs[id]);
        let old_len = live_outs.len();
        for &succ in succs.of(id) {
            live_outs.extend(self.live_ins[succ].iter().copied());
        }
        if succs.exits(id) {
            live_outs.insert(code.frame.rv);
        }
        if live_outs.len() != old_len {
            *recompute = true;
        }
        self.live_outs[id] = live_outs;
    }

    /// `LiveIns[I] = Uses[I]  U  (LiveOuts[I] - Defs[I])`
    fn compute_live_ins(&mut self, id: usize, instr: &AsmInstr, recompute: &mut bool) {
        let live_ins = &mut self.live_ins[id];
        let old_len = live_ins.len();
        live_ins.extend(instr.uses().iter().copied());
        for live_out in self.live_outs[id].iter().copied() {
            if !instr.defs().contains(&live_out) {
                live_ins.insert(live_out);
            }
        }
        if live_ins.len() != old_len {
            *recompute = true;
        }
    }

    pub fn len(&self) -> usize {
        self.live_ins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_ins.is_empty()
    }

    pub fn live_in(&self, id: usize) -> &BTreeSet<Tmp> {
        &self.live_ins[id]
    }

    pub fn live_out(&self, id: usize) -> &BTreeSet<Tmp> {
        &self.live_outs[id]
    }

    pub fn display<'a>(&'a self, instrs: &'a [AsmInstr]) -> impl Display + 'a {
        DisplayLiveSets {
            live_sets: self,
            instrs,
        }
    }
}

struct DisplayLiveSets<'a> {
    live_sets: &'a LiveSets,
    instrs: &'a [AsmInstr],
}

impl Display for DisplayLiveSets<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instrs.iter().enumerate() {
            write!(f, "|  {:<24} ", format!("{instr:?}"))?;
            write!(f, "{{")?;
            for live_in in self.live_sets.live_in(i) {
                write!(f, " {live_in:?}")?;
            }
            write!(f, " }} -> ")?;
            write!(f, "{{")?;
            for live_out in self.live_sets.live_out(i) {
                write!(f, " {live_out:?}")?;
            }
            writeln!(f, " }}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::{frame::Frame, names::NameGen};

    /// Checks both dataflow equations at every instruction.
    fn assert_fixpoint(code: &Code, live: &LiveSets) {
        let succs = Successors::new(code);
        for (id, instr) in code.instrs.iter().enumerate() {
            let mut expected_in: BTreeSet<Tmp> = live
                .live_out(id)
                .iter()
                .copied()
                .filter(|tmp| !instr.defs().contains(tmp))
                .collect();
            expected_in.extend(instr.uses().iter().copied());
            assert_eq!(live.live_in(id), &expected_in, "in[{id}]");

            let mut expected_out: BTreeSet<Tmp> = succs
                .of(id)
                .iter()
                .flat_map(|&succ| live.live_in(succ).iter().copied())
                .collect();
            if succs.exits(id) {
                expected_out.insert(code.frame.rv);
            }
            assert_eq!(live.live_out(id), &expected_out, "out[{id}]");
        }
    }

    fn counting_loop() -> Code {
        let names = NameGen::new();
        let frame = Frame::new(&names, "f".into(), 1, 0, 0);
        let rv = frame.rv;
        let [a, b] = [names.fresh_tmp(), names.fresh_tmp()];
        let top = Lbl::from("top");
        let exit = Lbl::from("f_exit");
        let instrs = vec![
            AsmInstr::Label(frame.lbl),
            AsmInstr::oper("SETL `d0,0", [], [a]),
            AsmInstr::Label(top),
            AsmInstr::oper("ADD `d0,`s0,`s1", [a, b], [a]),
            AsmInstr::branch("BNZ `s0,top", [a], top),
            AsmInstr::mov(rv, a),
            AsmInstr::jump(exit),
        ];
        Code::new(frame.clone(), instrs, frame.lbl, exit)
    }

    #[test]
    fn loop_keeps_values_alive() {
        let code = counting_loop();
        let live = LiveSets::compute(&code);
        assert_fixpoint(&code, &live);
        assert_snapshot!(live.display(&code.instrs), @r"
        |  f:                       { T3 } -> { T3 }
        |  SETL T2,0                { T3 } -> { T2 T3 }
        |  top:                     { T2 T3 } -> { T2 T3 }
        |  ADD T2,T2,T3             { T2 T3 } -> { T2 T3 }
        |  BNZ T2,top               { T2 T3 } -> { T2 T3 }
        |  SET T0,T2                { T2 } -> { T0 }
        |  JMP f_exit               { T0 } -> { T0 }
        ");
    }

    #[test]
    fn analysis_is_idempotent() {
        let code = counting_loop();
        assert_eq!(LiveSets::compute(&code), LiveSets::compute(&code));
    }

    #[test]
    fn calls_do_not_jump_within_function() {
        let names = NameGen::new();
        let frame = Frame::new(&names, "g".into(), 1, 0, 0);
        let x = names.fresh_tmp();
        let exit = Lbl::from("g_exit");
        let instrs = vec![
            AsmInstr::oper("SETL `d0,1", [], [x]),
            AsmInstr::branch("PUSHJ $8,_putInt", [], Lbl::from("_putInt")),
            AsmInstr::mov(frame.rv, x),
            AsmInstr::jump(exit),
        ];
        let code = Code::new(frame.clone(), instrs, frame.lbl, exit);
        let live = LiveSets::compute(&code);
        assert_fixpoint(&code, &live);
        assert_eq!(live.live_out(1), &BTreeSet::from([x]));
        assert!(live.live_in(0).is_empty());
    }
}
