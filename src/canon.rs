//! Canonicalize IR
//!
//! Canonical statements never nest effectful expressions: every call, load and arithmetic
//! result is named by a temporary before anything else reads it.

use derive_more::{Debug, From};
use smallvec::{SmallVec, smallvec};

use crate::{
    ir::{Binop, Unop},
    names::{Lbl, Tmp},
};

pub mod basic_blocks;
pub mod flatten;
mod impls;

pub use flatten::{Canonicalizer, canonicalize, canonicalize_function};

/// An operand that needs no evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From)]
pub enum Atom {
    #[debug("{_0}")]
    Const(i64),
    #[debug("{_0:?}")]
    Tmp(Tmp),
    #[debug(":{_0:?}")]
    Name(Lbl),
}

/// The right-hand side of a canonical move. At most one operation, applied to atoms.
#[derive(Clone, PartialEq, Eq, From)]
pub enum Rhs {
    #[from]
    Atom(Atom),
    Binop(Binop, Atom, Atom),
    Unop(Unop, Atom),
    Load(Atom),
    Call(Lbl, Vec<Tmp>),
}

#[derive(Clone, PartialEq, Eq)]
pub enum Stmt {
    Lbl(Lbl),
    Jmp(Lbl),
    Br { cond: Tmp, if_true: Lbl, if_false: Lbl },
    Move(Tmp, Rhs),
    Store { addr: Atom, src: Atom },
    /// A call whose result is discarded.
    Call(Lbl, Vec<Tmp>),
}

impl Stmt {
    /// The temporary this statement assigns, if any.
    pub fn def(&self) -> Option<Tmp> {
        match self {
            Stmt::Move(dst, _) => Some(*dst),
            _ => None,
        }
    }

    /// Labels control may continue at, other than falling through.
    pub fn jump_targets(&self) -> SmallVec<[Lbl; 2]> {
        match self {
            Stmt::Jmp(lbl) => smallvec![*lbl],
            Stmt::Br { if_true, if_false, .. } => smallvec![*if_true, *if_false],
            _ => SmallVec::new(),
        }
    }

    pub fn is_ctrl_tx(&self) -> bool {
        matches!(self, Stmt::Jmp(_) | Stmt::Br { .. })
    }

    /// Rewrites every label this statement jumps to.
    pub fn retarget(&mut self, mut f: impl FnMut(Lbl) -> Lbl) {
        match self {
            Stmt::Jmp(lbl) => *lbl = f(*lbl),
            Stmt::Br { if_true, if_false, .. } => {
                *if_true = f(*if_true);
                *if_false = f(*if_false);
            }
            _ => {}
        }
    }
}
