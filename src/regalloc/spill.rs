use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::{
    asm::{AsmInstr, Code},
    error::{BackendError, Result},
    frame::{Frame, WORD},
    instr_sel::mmix::const_to_asm,
    names::{NameGen, Tmp},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(pub usize);

/// Stack slots handed out to spilled temporaries of one function.
#[derive(Debug, Default)]
pub struct SpillSlots {
    slots: BTreeMap<Tmp, SlotId>,
}

impl SpillSlots {
    pub fn get_or_alloc_slot(&mut self, tmp: Tmp) -> SlotId {
        let next = SlotId(self.slots.len());
        *self.slots.entry(tmp).or_insert(next)
    }

    /// Bytes of stack the slots occupy.
    pub fn size(&self) -> i64 {
        self.slots.len() as i64 * WORD
    }
}

/// Computes the address of `slot` into a fresh temporary: `FP - distance`.
fn emit_slot_addr(
    names: &NameGen,
    frame: &Frame,
    slot: SlotId,
    out: &mut Vec<AsmInstr>,
) -> Tmp {
    let addr = names.fresh_tmp();
    const_to_asm(frame.spill_slot_distance(slot.0), addr, out);
    out.push(AsmInstr::oper("SUB `d0,`s0,`s1", [frame.fp, addr], [addr]));
    addr
}

fn emit_stack_load(names: &NameGen, frame: &Frame, dst: Tmp, slot: SlotId, out: &mut Vec<AsmInstr>) {
    let addr = emit_slot_addr(names, frame, slot, out);
    out.push(AsmInstr::oper("LDO `d0,`s0,0", [addr], [dst]));
}

fn emit_stack_store(names: &NameGen, frame: &Frame, slot: SlotId, src: Tmp, out: &mut Vec<AsmInstr>) {
    let addr = emit_slot_addr(names, frame, slot, out);
    out.push(AsmInstr::oper("STO `s0,`s1,0", [src, addr], []));
}

/// Moves `to_spill` into its stack slot. Every instruction touching it gets a fresh value
/// temporary, loaded from the slot before a use and stored back after a definition. Every
/// temporary created here is recorded in `spill_tmps`.
///
/// The frame's return value has to be in its register when control leaves the function, so
/// when it is spilled it is reloaded before each jump to the exit label.
pub fn rewrite_with_spill(
    names: &NameGen,
    code: &mut Code,
    to_spill: Tmp,
    slots: &mut SpillSlots,
    spill_tmps: &mut BTreeSet<Tmp>,
) -> Result<()> {
    let slot = slots.get_or_alloc_slot(to_spill);
    let old_len = code.instrs.len();
    let created_before = names.tmps_created();
    let mut new_instrs = Vec::with_capacity(old_len + 8);

    for mut instr in std::mem::take(&mut code.instrs) {
        let uses = instr.uses().contains(&to_spill);
        let defs = instr.defs().contains(&to_spill);
        let exits = to_spill == code.frame.rv && instr.jumps().contains(&code.exit);

        if exits {
            emit_stack_load(names, &code.frame, to_spill, slot, &mut new_instrs);
        }
        if !uses && !defs {
            new_instrs.push(instr);
            continue;
        }

        let value = names.fresh_tmp();
        if uses {
            emit_stack_load(names, &code.frame, value, slot, &mut new_instrs);
            instr.replace_use_occurrances(to_spill, value);
        }
        if defs {
            instr.replace_def_occurrances(to_spill, value);
        }
        trace!("++ rewrite instr:\t{instr:?}");
        new_instrs.push(instr);
        if defs {
            emit_stack_store(names, &code.frame, slot, value, &mut new_instrs);
        }
    }

    spill_tmps.extend((created_before..names.tmps_created()).map(Tmp));
    if to_spill == code.frame.rv {
        spill_tmps.insert(to_spill);
    }
    code.instrs = new_instrs;
    code.temp_size = slots.size();

    if code.instrs.len() <= old_len {
        return Err(BackendError::NonConvergence {
            function: code.frame.lbl.render(),
            reason: format!("spilling {to_spill:?} did not add any instructions"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Lbl;

    fn code_with(names: &NameGen, instrs: impl FnOnce(&Frame) -> Vec<AsmInstr>) -> Code {
        let frame = Frame::new(names, "f".into(), 1, 8, 0);
        let instrs = instrs(&frame);
        Code::new(frame.clone(), instrs, frame.lbl, Lbl::from("f_exit"))
    }

    #[test]
    fn use_and_def_go_through_one_value_tmp() {
        let names = NameGen::new();
        let x = Tmp(100);
        let mut code = code_with(&names, |_| {
            vec![
                AsmInstr::oper("SETL `d0,1", [], [x]),
                AsmInstr::oper("INCML `d0,1", [x], [x]),
            ]
        });
        let mut slots = SpillSlots::default();
        let mut spill_tmps = BTreeSet::new();
        rewrite_with_spill(&names, &mut code, x, &mut slots, &mut spill_tmps).unwrap();

        insta::assert_debug_snapshot!(code.instrs, @r"
        [
            SETL T2,1,
            SETL T3,32,
            SUB T3,T1,T3,
            STO T2,T3,0,
            SETL T5,32,
            SUB T5,T1,T5,
            LDO T4,T5,0,
            INCML T4,1,
            SETL T6,32,
            SUB T6,T1,T6,
            STO T4,T6,0,
        ]
        ");
        assert_eq!(code.temp_size, 8);
        assert_eq!(spill_tmps, (2..7).map(Tmp).collect());
    }

    #[test]
    fn spilled_result_is_reloaded_before_exit() {
        let names = NameGen::new();
        let mut code = code_with(&names, |frame| {
            vec![
                AsmInstr::oper("SETL `d0,1", [], [frame.rv]),
                AsmInstr::jump(Lbl::from("f_exit")),
            ]
        });
        let rv = code.frame.rv;
        let mut slots = SpillSlots::default();
        let mut spill_tmps = BTreeSet::new();
        rewrite_with_spill(&names, &mut code, rv, &mut slots, &mut spill_tmps).unwrap();

        let last_two = &code.instrs[code.instrs.len() - 2..];
        assert_eq!(last_two[0].defs(), &[rv]);
        assert_eq!(last_two[1], AsmInstr::jump(Lbl::from("f_exit")));
        assert!(spill_tmps.contains(&rv));
    }

    #[test]
    fn spilling_absent_tmp_does_not_converge() {
        let names = NameGen::new();
        let mut code = code_with(&names, |_| vec![AsmInstr::oper("SETL `d0,1", [], [Tmp(50)])]);
        let err = rewrite_with_spill(
            &names,
            &mut code,
            Tmp(99),
            &mut SpillSlots::default(),
            &mut BTreeSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::NonConvergence { .. }));
    }
}
