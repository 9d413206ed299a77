use super::{Expr, Stmt};
use std::fmt::{Debug, Formatter, Result};

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::Const(x) => write!(f, "{x}"),
            Self::Tmp(tmp) => write!(f, "{tmp:?}"),
            Self::Name(lbl) => write!(f, ":{lbl:?}"),
            Self::Mem(addr) => write!(f, "M[{addr:?}]"),
            Self::Binop(op, x, y) => write!(f, "({x:?} {op} {y:?})"),
            Self::Unop(op, x) => write!(f, "({op}{x:?})"),
            Self::Call(fun, args) => {
                write!(f, "{fun:?}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg:?}")?;
                }
                write!(f, ")")
            }
            Self::Seq(stmt, result) => write!(f, "{{ {stmt:?}; {result:?} }}"),
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
            Stmt::Move(dst, src) => write!(f, "{dst:?} <- {src:?}"),
            Stmt::Expr(expr) => write!(f, "_ <- {expr:?}"),
            Stmt::Seq(stmts) => {
                for (i, stmt) in stmts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{stmt:?}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ir::{Binop, Expr, Stmt},
        names::{Lbl, Tmp},
    };

    #[test]
    fn debug_rendering() {
        let stmt = Stmt::mov(
            Expr::mem(Tmp(0)),
            Expr::binop(Binop::Add, Expr::Call(Lbl::from("f"), vec![1.into()]), Tmp(1)),
        );
        assert_eq!(format!("{stmt:?}"), "M[T0] <- (f(1) + T1)");
    }
}
