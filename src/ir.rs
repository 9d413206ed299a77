//! Intermediate Representation
//!
//! Tree-shaped code handed to the backend, one statement tree per function.

use derive_more::{Display, From};

use crate::names::{Lbl, Tmp};

mod impls;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Binop {
    #[display("|")]
    Or,
    #[display("&")]
    And,
    #[display("^")]
    Xor,
    #[display("==")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("<=")]
    Le,
    #[display(">=")]
    Ge,
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Mod,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Unop {
    #[display("-")]
    Neg,
    #[display("!")]
    Not,
}

/// AKA "RVal"
#[derive(Clone, PartialEq, From)]
pub enum Expr {
    #[from]
    Const(i64),
    #[from]
    Tmp(Tmp),
    /// The address a label stands for.
    #[from]
    Name(Lbl),
    /// Reads the word at the given address.
    Mem(Box<Expr>),
    Binop(Binop, Box<Expr>, Box<Expr>),
    Unop(Unop, Box<Expr>),
    Call(Lbl, Vec<Expr>),
    /// Run the statement, then produce the value of the expression.
    Seq(Box<Stmt>, Box<Expr>),
}

impl Expr {
    pub fn mem(addr: impl Into<Expr>) -> Self {
        Self::Mem(Box::new(addr.into()))
    }

    pub fn binop(op: Binop, x: impl Into<Expr>, y: impl Into<Expr>) -> Self {
        Self::Binop(op, Box::new(x.into()), Box::new(y.into()))
    }

    pub fn unop(op: Unop, x: impl Into<Expr>) -> Self {
        Self::Unop(op, Box::new(x.into()))
    }

    pub fn seq(stmt: Stmt, result: impl Into<Expr>) -> Self {
        Self::Seq(Box::new(stmt), Box::new(result.into()))
    }
}

#[derive(Clone, PartialEq, From)]
pub enum Stmt {
    #[from]
    Lbl(Lbl),
    Jmp(Lbl),
    Br {
        cond: Expr,
        if_true: Lbl,
        if_false: Lbl,
    },
    /// The destination is either a `Tmp` or a `Mem`.
    Move(Expr, Expr),
    /// Evaluate for side effects only.
    #[from]
    Expr(Expr),
    #[from]
    Seq(Vec<Stmt>),
}

impl Stmt {
    pub fn mov(dst: impl Into<Expr>, src: impl Into<Expr>) -> Self {
        Self::Move(dst.into(), src.into())
    }

    pub fn br(cond: impl Into<Expr>, if_true: Lbl, if_false: Lbl) -> Self {
        Self::Br {
            cond: cond.into(),
            if_true,
            if_false,
        }
    }
}
