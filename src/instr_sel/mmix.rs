//! Instruction selection for MMIX.

use crate::{
    asm::AsmInstr,
    canon::{Atom, Rhs, Stmt},
    frame::{SP_REG, WORD},
    ir::{Binop, Unop},
    names::{Lbl, NameGen, Tmp},
};

use super::Select;

/// Loads `value` into `dst` sixteen bits at a time. Only the lowest field is always set;
/// higher fields are added when non-zero. Negative values are loaded by magnitude and negated.
pub fn const_to_asm(value: i64, dst: Tmp, out: &mut Vec<AsmInstr>) {
    let magnitude = value.unsigned_abs();
    let field = |shift: u32| (magnitude >> shift) & 0xffff;

    out.push(AsmInstr::oper(format!("SETL `d0,{}", field(0)), [], [dst]));
    for (opcode, shift) in [("INCML", 16), ("INCMH", 32), ("INCH", 48)] {
        if field(shift) != 0 {
            out.push(AsmInstr::oper(
                format!("{opcode} `d0,{}", field(shift)),
                [dst],
                [dst],
            ));
        }
    }
    if value < 0 {
        out.push(AsmInstr::oper("NEG `d0,0,`s0", [dst], [dst]));
    }
}

/// Conditional sets that turn the sign of a comparison result into 0 or 1. The first sets 1
/// when the relation holds, the second sets 0 otherwise.
fn cond_sets(op: Binop) -> (&'static str, &'static str) {
    match op {
        Binop::Eq => ("CSZ", "CSNZ"),
        Binop::Ne => ("CSNZ", "CSZ"),
        Binop::Lt => ("CSN", "CSNN"),
        Binop::Ge => ("CSNN", "CSN"),
        Binop::Gt => ("CSP", "CSNP"),
        Binop::Le => ("CSNP", "CSP"),
        other => unreachable!("{other:?} is not a relation"),
    }
}

pub struct MmixSel<'a> {
    names: &'a NameGen,
    /// Registers below this survive a `PUSHJ`.
    num_regs: usize,
    out: Vec<AsmInstr>,
}

impl<'a> MmixSel<'a> {
    pub fn new(names: &'a NameGen, num_regs: usize) -> Self {
        Self {
            names,
            num_regs,
            out: Vec::new(),
        }
    }

    pub fn emit(&mut self, instr: AsmInstr) {
        self.out.push(instr);
    }

    fn mk_dst(&self, dst: Option<Tmp>) -> Tmp {
        dst.unwrap_or_else(|| self.names.fresh_tmp())
    }

    fn atom_to_asm(&mut self, atom: Atom, dst: Option<Tmp>) -> Tmp {
        match atom {
            Atom::Tmp(tmp) => match dst {
                Some(dst) if dst != tmp => {
                    self.emit(AsmInstr::mov(dst, tmp));
                    dst
                }
                _ => tmp,
            },
            Atom::Const(value) => {
                let dst = self.mk_dst(dst);
                const_to_asm(value, dst, &mut self.out);
                dst
            }
            Atom::Name(lbl) => {
                let dst = self.mk_dst(dst);
                self.emit(AsmInstr::oper(format!("LDA `d0,{lbl}"), [], [dst]));
                dst
            }
        }
    }

    /// Produces a register holding the address `addr` denotes. Never loads through it.
    fn addr_to_asm(&mut self, addr: Atom) -> Tmp {
        match addr {
            Atom::Tmp(base) => base,
            Atom::Name(_) | Atom::Const(_) => self.atom_to_asm(addr, None),
        }
    }

    fn binop_to_asm(&mut self, op: Binop, x: Atom, y: Atom, dst: Option<Tmp>) -> Tmp {
        let x = self.atom_to_asm(x, None);
        let y = self.atom_to_asm(y, None);
        let dst = self.mk_dst(dst);
        let arith = |opcode: &str| AsmInstr::oper(format!("{opcode} `d0,`s0,`s1"), [x, y], [dst]);
        match op {
            Binop::Add => self.emit(arith("ADD")),
            Binop::Sub => self.emit(arith("SUB")),
            Binop::Mul => self.emit(arith("MUL")),
            Binop::Div => self.emit(arith("DIV")),
            Binop::And => self.emit(arith("AND")),
            Binop::Or => self.emit(arith("OR")),
            Binop::Xor => self.emit(arith("XOR")),
            Binop::Mod => {
                let quotient = self.names.fresh_tmp();
                self.emit(AsmInstr::oper("DIV `d0,`s0,`s1", [x, y], [quotient]));
                self.emit(AsmInstr::oper("GET `d0,rR", [], [dst]));
            }
            Binop::Eq | Binop::Ne | Binop::Lt | Binop::Gt | Binop::Le | Binop::Ge => {
                let cmp = self.names.fresh_tmp();
                self.emit(AsmInstr::oper("CMP `d0,`s0,`s1", [x, y], [cmp]));
                let (when_true, when_false) = cond_sets(op);
                self.emit(AsmInstr::oper(format!("{when_true} `d0,`s0,1"), [cmp], [dst]));
                // Also reads `dst`: it only writes when the first one did not.
                self.emit(AsmInstr::oper(
                    format!("{when_false} `d0,`s0,0"),
                    [cmp, dst],
                    [dst],
                ));
            }
        }
        dst
    }

    fn unop_to_asm(&mut self, op: Unop, x: Atom, dst: Option<Tmp>) -> Tmp {
        let x = self.atom_to_asm(x, None);
        let dst = self.mk_dst(dst);
        match op {
            Unop::Neg => self.emit(AsmInstr::oper("NEG `d0,0,`s0", [x], [dst])),
            Unop::Not => self.emit(AsmInstr::oper("XOR `d0,`s0,1", [x], [dst])),
        }
        dst
    }

    /// Arguments go to successive words above the stack pointer; the callee leaves its result
    /// in the first one.
    fn call_to_asm(&mut self, fun: Lbl, args: &[Tmp], dst: Option<Tmp>) -> Option<Tmp> {
        for (i, arg) in args.iter().enumerate() {
            self.emit(AsmInstr::oper(
                format!("STO `s0,${SP_REG},{}", i as i64 * WORD),
                [*arg],
                [],
            ));
        }
        self.emit(AsmInstr::branch(
            format!("PUSHJ ${},{fun}", self.num_regs),
            [],
            fun,
        ));
        let dst = dst?;
        self.emit(AsmInstr::oper(format!("LDO `d0,${SP_REG},0"), [], [dst]));
        Some(dst)
    }
}

impl Select for MmixSel<'_> {
    type Instruction = AsmInstr;

    fn stmt_to_asm(&mut self, stmt: &Stmt, next: Option<&Stmt>) {
        match stmt {
            Stmt::Lbl(lbl) => self.emit(AsmInstr::Label(*lbl)),
            Stmt::Jmp(lbl) => self.emit(AsmInstr::jump(*lbl)),
            Stmt::Br {
                cond,
                if_true,
                if_false,
            } => {
                self.emit(AsmInstr::branch(format!("BNZ `s0,{if_true}"), [*cond], *if_true));
                if next != Some(&Stmt::Lbl(*if_false)) {
                    self.emit(AsmInstr::jump(*if_false));
                }
            }
            Stmt::Move(dst, rhs) => {
                self.rhs_to_asm(rhs, *dst);
            }
            Stmt::Store { addr, src } => {
                let src = self.atom_to_asm(*src, None);
                let base = self.addr_to_asm(*addr);
                self.emit(AsmInstr::oper("STO `s0,`s1,0", [src, base], []));
            }
            Stmt::Call(fun, args) => {
                self.call_to_asm(*fun, args, None);
            }
        }
    }

    fn rhs_to_asm(&mut self, rhs: &Rhs, opt_dst: impl Into<Option<Tmp>>) -> Tmp {
        let dst = opt_dst.into();
        match rhs {
            Rhs::Atom(atom) => self.atom_to_asm(*atom, dst),
            Rhs::Binop(op, x, y) => self.binop_to_asm(*op, *x, *y, dst),
            Rhs::Unop(op, x) => self.unop_to_asm(*op, *x, dst),
            Rhs::Load(addr) => {
                let base = self.addr_to_asm(*addr);
                let dst = self.mk_dst(dst);
                self.emit(AsmInstr::oper("LDO `d0,`s0,0", [base], [dst]));
                dst
            }
            Rhs::Call(fun, args) => {
                let dst = self.mk_dst(dst);
                self.call_to_asm(*fun, args, Some(dst));
                dst
            }
        }
    }

    fn render(self) -> Vec<AsmInstr> {
        self.out
    }
}
