//! Builds IR trees for one function from operands whose names have already been resolved to
//! frame accesses.
//!
//! [`ImcGen::addr`] and [`ImcGen::value`] call each other: a read is the memory at an address,
//! and an address may need values (array indices, dereferenced pointers).

use derive_more::From;
use log::trace;

use crate::{
    chunks::{Ctx, Function},
    error::{BackendError, Result},
    frame::{Access, Accesses, Frame, WORD},
    ir::{Binop, Expr, Stmt, Unop},
    names::Lbl,
};

/// Something that denotes a memory location.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Var(String),
    Index {
        array: Box<Place>,
        index: Box<Operand>,
        elem_size: i64,
    },
    Field {
        record: Box<Place>,
        offset: i64,
    },
    /// The location a pointer value points to.
    Deref(Box<Operand>),
}

impl Place {
    pub fn var(name: &str) -> Self {
        Self::Var(name.to_owned())
    }

    pub fn index(self, index: impl Into<Operand>, elem_size: i64) -> Self {
        Self::Index {
            array: Box::new(self),
            index: Box::new(index.into()),
            elem_size,
        }
    }

    pub fn field(self, offset: i64) -> Self {
        Self::Field {
            record: Box::new(self),
            offset,
        }
    }

    pub fn deref(ptr: impl Into<Operand>) -> Self {
        Self::Deref(Box::new(ptr.into()))
    }
}

#[derive(Debug, Clone, PartialEq, From)]
pub enum Operand {
    #[from]
    Int(i64),
    Str(String),
    /// Reads the place.
    #[from]
    Place(Place),
    AddrOf(Place),
    Binop(Binop, Box<Operand>, Box<Operand>),
    Unop(Unop, Box<Operand>),
    Call {
        fun: Lbl,
        /// Nesting depth the callee was declared at.
        callee_depth: usize,
        args: Vec<Operand>,
    },
}

impl Operand {
    pub fn var(name: &str) -> Self {
        Self::Place(Place::var(name))
    }

    pub fn str(text: &str) -> Self {
        Self::Str(text.to_owned())
    }

    pub fn binop(op: Binop, x: impl Into<Operand>, y: impl Into<Operand>) -> Self {
        Self::Binop(op, Box::new(x.into()), Box::new(y.into()))
    }

    pub fn unop(op: Unop, x: impl Into<Operand>) -> Self {
        Self::Unop(op, Box::new(x.into()))
    }

    pub fn call(fun: impl Into<Lbl>, callee_depth: usize, args: Vec<Operand>) -> Self {
        Self::Call {
            fun: fun.into(),
            callee_depth,
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Assign(Place, Operand),
    /// Evaluates for side effects.
    Eval(Operand),
    If {
        cond: Operand,
        then: Vec<Command>,
        els: Vec<Command>,
    },
    While {
        cond: Operand,
        body: Vec<Command>,
    },
}

pub struct ImcGen<'a> {
    ctx: &'a mut Ctx,
    frame: &'a Frame,
    accesses: &'a Accesses,
}

impl<'a> ImcGen<'a> {
    pub fn new(ctx: &'a mut Ctx, frame: &'a Frame, accesses: &'a Accesses) -> Self {
        Self {
            ctx,
            frame,
            accesses,
        }
    }

    /// The frame pointer of the function declared at `depth`, reached by following static links.
    fn frame_pointer(&self, depth: usize) -> Result<Expr> {
        let Some(hops) = self.frame.depth.checked_sub(depth) else {
            return Err(BackendError::MalformedIr(format!(
                "{:?} at depth {} cannot see a frame at depth {depth}",
                self.frame.lbl, self.frame.depth
            )));
        };
        let mut fp = Expr::Tmp(self.frame.fp);
        for _ in 0..hops {
            fp = Expr::mem(fp);
        }
        Ok(fp)
    }

    pub fn addr(&mut self, place: &Place) -> Result<Expr> {
        match place {
            Place::Var(name) => match self.accesses.get(name) {
                None => Err(BackendError::MissingAccess(name.clone())),
                Some(Access::Abs(lbl)) => Ok(Expr::Name(*lbl)),
                Some(&Access::Rel { offset, depth }) => {
                    let fp = self.frame_pointer(depth)?;
                    Ok(Expr::binop(Binop::Add, fp, offset))
                }
            },
            Place::Index {
                array,
                index,
                elem_size,
            } => {
                let base = self.addr(array)?;
                let index = self.value(index)?;
                Ok(Expr::binop(
                    Binop::Add,
                    base,
                    Expr::binop(Binop::Mul, index, *elem_size),
                ))
            }
            Place::Field { record, offset } => {
                let base = self.addr(record)?;
                Ok(Expr::binop(Binop::Add, base, *offset))
            }
            Place::Deref(ptr) => self.value(ptr),
        }
    }

    pub fn value(&mut self, operand: &Operand) -> Result<Expr> {
        match operand {
            Operand::Int(x) => Ok(Expr::Const(*x)),
            Operand::Str(text) => Ok(Expr::Name(self.ctx.intern_str(text))),
            Operand::Place(place) => Ok(Expr::mem(self.addr(place)?)),
            Operand::AddrOf(place) => self.addr(place),
            Operand::Binop(op, x, y) => Ok(Expr::binop(*op, self.value(x)?, self.value(y)?)),
            Operand::Unop(op, x) => Ok(Expr::unop(*op, self.value(x)?)),
            Operand::Call {
                fun,
                callee_depth,
                args,
            } => {
                // The callee's static link is the frame of the function it was declared in.
                let static_link = self.frame_pointer(callee_depth.saturating_sub(1))?;
                let mut ir_args = Vec::with_capacity(args.len() + 1);
                ir_args.push(static_link);
                for arg in args {
                    ir_args.push(self.value(arg)?);
                }
                Ok(Expr::Call(*fun, ir_args))
            }
        }
    }

    fn commands(&mut self, cmds: &[Command]) -> Result<Vec<Stmt>> {
        cmds.iter().map(|cmd| self.command(cmd)).collect()
    }

    pub fn command(&mut self, cmd: &Command) -> Result<Stmt> {
        match cmd {
            Command::Assign(place, src) => {
                let dst = Expr::mem(self.addr(place)?);
                Ok(Stmt::mov(dst, self.value(src)?))
            }
            Command::Eval(operand) => Ok(Stmt::Expr(self.value(operand)?)),
            Command::If { cond, then, els } => {
                let cond = self.value(cond)?;
                let names = &self.ctx.names;
                let (then_lbl, else_lbl, end) =
                    (names.fresh_lbl(), names.fresh_lbl(), names.fresh_lbl());

                let stmts = std::iter::empty()
                    .chain([Stmt::br(cond, then_lbl, else_lbl)])
                    .chain([Stmt::Lbl(then_lbl)])
                    .chain(self.commands(then)?)
                    .chain([Stmt::Jmp(end)])
                    .chain([Stmt::Lbl(else_lbl)])
                    .chain(self.commands(els)?)
                    .chain([Stmt::Jmp(end), Stmt::Lbl(end)]);
                Ok(Stmt::Seq(stmts.collect()))
            }
            Command::While { cond, body } => {
                let cond = self.value(cond)?;
                let names = &self.ctx.names;
                let (cond_lbl, body_lbl, end) =
                    (names.fresh_lbl(), names.fresh_lbl(), names.fresh_lbl());

                let stmts = std::iter::empty()
                    .chain([Stmt::Lbl(cond_lbl)])
                    .chain([Stmt::br(cond, body_lbl, end)])
                    .chain([Stmt::Lbl(body_lbl)])
                    .chain(self.commands(body)?)
                    .chain([Stmt::Jmp(cond_lbl), Stmt::Lbl(end)]);
                Ok(Stmt::Seq(stmts.collect()))
            }
        }
    }

    /// Lowers a whole function: run the commands, then leave `result` in the frame's return
    /// value temporary.
    pub fn function(mut self, body: &[Command], result: &Operand) -> Result<Function> {
        let stmts = self.commands(body)?;
        let result = self.value(result)?;
        trace!("lowered {:?}", self.frame.lbl);
        Ok(Function {
            frame: self.frame.clone(),
            body: Stmt::mov(self.frame.rv, Expr::seq(Stmt::Seq(stmts), result)),
        })
    }
}

/// Accesses for word-sized locals of `frame`, in declaration order.
pub fn locals_of(frame: &Frame, names: &[&str]) -> Accesses {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.to_string(), frame.local(idx)))
        .collect()
}

/// The size in bytes `n` word-sized locals occupy.
pub fn words(n: usize) -> i64 {
    n as i64 * WORD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameGen;

    fn frame(names: &NameGen, depth: usize) -> Frame {
        Frame::new(names, "f".into(), depth, 16, 16)
    }

    #[test]
    fn outer_variables_follow_static_links() {
        let mut ctx = Ctx::new();
        let frame = frame(&ctx.names, 3);
        let accesses = Accesses::from([
            ("x".to_owned(), Access::Rel { offset: -8, depth: 1 }),
            ("g".to_owned(), Access::Abs("g".into())),
        ]);
        let mut imc = ImcGen::new(&mut ctx, &frame, &accesses);

        let x = imc.value(&Operand::var("x")).unwrap();
        assert_eq!(format!("{x:?}"), "M[(M[M[T1]] + -8)]");
        let g = imc.addr(&Place::var("g").index(2i64, 8)).unwrap();
        assert_eq!(format!("{g:?}"), "(:g + (2 * 8))");
    }

    #[test]
    fn calls_pass_static_link_first() {
        let mut ctx = Ctx::new();
        let frame = frame(&ctx.names, 2);
        let accesses = Accesses::new();
        let mut imc = ImcGen::new(&mut ctx, &frame, &accesses);

        let nested = imc.value(&Operand::call("inner", 3, vec![1i64.into()])).unwrap();
        assert_eq!(format!("{nested:?}"), "inner(T1, 1)");
        let sibling = imc.value(&Operand::call("g", 2, vec![])).unwrap();
        assert_eq!(format!("{sibling:?}"), "g(M[T1])");
        let top = imc.value(&Operand::call("_putInt", 1, vec![])).unwrap();
        assert_eq!(format!("{top:?}"), "_putInt(M[M[T1]])");
    }

    #[test]
    fn unknown_variable_is_reported() {
        let mut ctx = Ctx::new();
        let frame = frame(&ctx.names, 1);
        let accesses = Accesses::new();
        let err = ImcGen::new(&mut ctx, &frame, &accesses)
            .value(&Operand::var("nope"))
            .unwrap_err();
        assert_eq!(err, BackendError::MissingAccess("nope".into()));
    }

    #[test]
    fn strings_become_data() {
        let mut ctx = Ctx::new();
        let frame = frame(&ctx.names, 1);
        let accesses = Accesses::new();
        let mut imc = ImcGen::new(&mut ctx, &frame, &accesses);
        let a = imc.value(&Operand::str("hi")).unwrap();
        let b = imc.value(&Operand::str("hi")).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.data().len(), 1);
        assert_eq!(ctx.data()[0].size, 24);
    }

    #[test]
    fn while_loop_shape() {
        let mut ctx = Ctx::new();
        let frame = frame(&ctx.names, 1);
        let accesses = locals_of(&frame, &["i"]);
        let body = [Command::While {
            cond: Operand::binop(Binop::Lt, Operand::var("i"), 10i64),
            body: vec![Command::Assign(
                Place::var("i"),
                Operand::binop(Binop::Add, Operand::var("i"), 1i64),
            )],
        }];
        let function = ImcGen::new(&mut ctx, &frame, &accesses)
            .function(&body, &Operand::var("i"))
            .unwrap();

        insta::assert_debug_snapshot!(function.body, @"T0 <- { L0:; if (M[(T1 + -8)] < 10) then L1 else L2; L1:; M[(T1 + -8)] <- (M[(T1 + -8)] + 1); jmp L0; L2:; M[(T1 + -8)] }");
    }
}
