//! Target instructions before and after register allocation.

use std::{collections::BTreeMap, fmt};

use smallvec::SmallVec;

use crate::{
    frame::Frame,
    names::{Lbl, Tmp},
};

/// An abstract machine instruction.
///
/// Operands appear in templates as `` `s0 ``, `` `s1 `` (uses) and `` `d0 `` (defs) and are
/// substituted when rendering.
#[derive(Clone, PartialEq, Eq)]
pub enum AsmInstr {
    Oper {
        template: String,
        uses: SmallVec<[Tmp; 2]>,
        defs: SmallVec<[Tmp; 1]>,
        jumps: SmallVec<[Lbl; 1]>,
        /// `false` only for unconditional jumps.
        falls_through: bool,
    },
    /// A register to register copy.
    Move { template: String, dst: Tmp, src: Tmp },
    Label(Lbl),
}

impl AsmInstr {
    pub fn oper(
        template: impl Into<String>,
        uses: impl IntoIterator<Item = Tmp>,
        defs: impl IntoIterator<Item = Tmp>,
    ) -> Self {
        Self::Oper {
            template: template.into(),
            uses: uses.into_iter().collect(),
            defs: defs.into_iter().collect(),
            jumps: SmallVec::new(),
            falls_through: true,
        }
    }

    /// An instruction that may also continue at `target`.
    pub fn branch(template: impl Into<String>, uses: impl IntoIterator<Item = Tmp>, target: Lbl) -> Self {
        Self::Oper {
            template: template.into(),
            uses: uses.into_iter().collect(),
            defs: SmallVec::new(),
            jumps: SmallVec::from_elem(target, 1),
            falls_through: true,
        }
    }

    pub fn jump(target: Lbl) -> Self {
        Self::Oper {
            template: format!("JMP {target}"),
            uses: SmallVec::new(),
            defs: SmallVec::new(),
            jumps: SmallVec::from_elem(target, 1),
            falls_through: false,
        }
    }

    pub fn mov(dst: Tmp, src: Tmp) -> Self {
        Self::Move {
            template: "SET `d0,`s0".into(),
            dst,
            src,
        }
    }

    pub fn uses(&self) -> &[Tmp] {
        match self {
            Self::Oper { uses, .. } => uses,
            Self::Move { src, .. } => std::slice::from_ref(src),
            Self::Label(_) => &[],
        }
    }

    pub fn defs(&self) -> &[Tmp] {
        match self {
            Self::Oper { defs, .. } => defs,
            Self::Move { dst, .. } => std::slice::from_ref(dst),
            Self::Label(_) => &[],
        }
    }

    pub fn jumps(&self) -> &[Lbl] {
        match self {
            Self::Oper { jumps, .. } => jumps,
            Self::Move { .. } | Self::Label(_) => &[],
        }
    }

    pub fn falls_through(&self) -> bool {
        match self {
            Self::Oper { falls_through, .. } => *falls_through,
            Self::Move { .. } | Self::Label(_) => true,
        }
    }

    pub fn label(&self) -> Option<Lbl> {
        match self {
            Self::Label(lbl) => Some(*lbl),
            _ => None,
        }
    }

    pub fn replace_use_occurrances(&mut self, old: Tmp, new: Tmp) {
        match self {
            Self::Oper { uses, .. } => uses.iter_mut().filter(|t| **t == old).for_each(|t| *t = new),
            Self::Move { src, .. } if *src == old => *src = new,
            _ => {}
        }
    }

    pub fn replace_def_occurrances(&mut self, old: Tmp, new: Tmp) {
        match self {
            Self::Oper { defs, .. } => defs.iter_mut().filter(|t| **t == old).for_each(|t| *t = new),
            Self::Move { dst, .. } if *dst == old => *dst = new,
            _ => {}
        }
    }

    /// Substitutes operands into the template. Temporaries missing from `regs` print by name.
    pub fn render(&self, regs: &BTreeMap<Tmp, usize>) -> String {
        let template = match self {
            Self::Oper { template, .. } | Self::Move { template, .. } => template,
            Self::Label(lbl) => return format!("{lbl}"),
        };
        let stg = |tmp: Tmp| match regs.get(&tmp) {
            Some(reg) => format!("${reg}"),
            None => format!("{tmp:?}"),
        };

        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '`' {
                out.push(c);
                continue;
            }
            let kind = chars.next();
            let idx = chars.next().and_then(|d| d.to_digit(10)).map(|d| d as usize);
            let tmp = match (kind, idx) {
                (Some('s'), Some(idx)) => self.uses().get(idx),
                (Some('d'), Some(idx)) => self.defs().get(idx),
                _ => None,
            };
            match tmp {
                Some(tmp) => out.push_str(&stg(*tmp)),
                None => panic!("bad operand reference in template {template:?}"),
            }
        }
        out
    }
}

impl fmt::Debug for AsmInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(lbl) => write!(f, "{lbl:?}:"),
            instr => write!(f, "{}", instr.render(&BTreeMap::new())),
        }
    }
}

/// A function's instructions, register assignment and spill area.
#[derive(Debug, Clone)]
pub struct Code {
    pub frame: Frame,
    pub instrs: Vec<AsmInstr>,
    pub entry: Lbl,
    pub exit: Lbl,
    /// Filled in by the register allocator.
    pub regs: BTreeMap<Tmp, usize>,
    /// Bytes of spill slots the allocator needed.
    pub temp_size: i64,
}

impl Code {
    pub fn new(frame: Frame, instrs: Vec<AsmInstr>, entry: Lbl, exit: Lbl) -> Self {
        Self {
            frame,
            instrs,
            entry,
            exit,
            regs: BTreeMap::new(),
            temp_size: 0,
        }
    }

    pub fn frame_size(&self) -> i64 {
        self.frame.size(self.temp_size)
    }

    /// Assembly-style listing: labels flush left, instructions indented.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for instr in &self.instrs {
            match instr {
                AsmInstr::Label(lbl) => out.push_str(&format!("{lbl}\n")),
                instr => out.push_str(&format!("    {}\n", instr.render(&self.regs))),
            }
        }
        out
    }
}
