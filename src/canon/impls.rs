use super::{Rhs, Stmt};
use crate::names::{Lbl, Tmp};
use std::fmt::{Debug, Formatter, Result};

fn write_call(f: &mut Formatter<'_>, fun: &Lbl, args: &[Tmp]) -> Result {
    write!(f, "{fun:?}(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg:?}")?;
    }
    write!(f, ")")
}

impl Debug for Rhs {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Rhs::Atom(atom) => write!(f, "{atom:?}"),
            Rhs::Binop(op, x, y) => write!(f, "{x:?} {op} {y:?}"),
            Rhs::Unop(op, x) => write!(f, "{op}{x:?}"),
            Rhs::Load(addr) => write!(f, "M[{addr:?}]"),
            Rhs::Call(fun, args) => write_call(f, fun, args),
        }
    }
}

impl Debug for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Stmt::Lbl(lbl) => write!(f, "{lbl:?}:"),
            Stmt::Jmp(lbl) => write!(f, "jmp {lbl:?}"),
            Stmt::Br {
                cond,
                if_true,
                if_false,
            } => write!(f, "if {cond:?} then {if_true:?} else {if_false:?}"),
            Stmt::Move(dst, rhs) => write!(f, "{dst:?} <- {rhs:?}"),
            Stmt::Store { addr, src } => write!(f, "M[{addr:?}] <- {src:?}"),
            Stmt::Call(fun, args) => {
                write!(f, "_ <- ")?;
                write_call(f, fun, args)
            }
        }
    }
}
