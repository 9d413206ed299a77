use crate::{
    asm::{AsmInstr, Code},
    canon,
    chunks::CodeChunk,
    names::{NameGen, Tmp},
};

pub mod mmix;

/// Something that can perform instruction selection.
pub trait Select {
    type Instruction: Clone;

    /// `next` is the statement that will follow `stmt`, if any.
    fn stmt_to_asm(&mut self, stmt: &canon::Stmt, next: Option<&canon::Stmt>);

    /// Computes `rhs`, landing the result in `opt_dst` when one is given.
    fn rhs_to_asm(&mut self, rhs: &canon::Rhs, opt_dst: impl Into<Option<Tmp>>) -> Tmp;

    fn render(self) -> Vec<Self::Instruction>;
}

/// Selects instructions for one function's (linearized) canonical statements.
pub fn select_code(names: &NameGen, chunk: &CodeChunk, num_regs: usize) -> Code {
    let mut sel = mmix::MmixSel::new(names, num_regs);
    for (i, stmt) in chunk.stmts.iter().enumerate() {
        sel.stmt_to_asm(stmt, chunk.stmts.get(i + 1));
    }
    let instrs: Vec<AsmInstr> = sel.render();
    Code::new(chunk.frame.clone(), instrs, chunk.entry, chunk.exit)
}
