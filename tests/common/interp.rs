//! A reference interpreter for IR and canonical statements.
//!
//! Used to check that canonicalization and block layout preserve what a program does: the
//! sequence of stores and calls it performs and the values it leaves behind.

use std::collections::BTreeMap;

use thiserror::Error;

use prevc::{
    canon::{self, Atom, Rhs},
    ir::{self, Binop, Expr, Unop},
    names::{Lbl, Tmp},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("`{0}` cannot be executed without a statement list to jump in")]
    Jump(Lbl),

    #[error("a move into something other than a temporary or memory")]
    BadMove,

    #[error("gave up after {0} steps")]
    OutOfFuel(usize),
}

pub type Result<T, E = InterpError> = std::result::Result<T, E>;

/// Something observable a program did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Store { addr: i64, value: i64 },
    Call { fun: Lbl, args: Vec<i64> },
}

/// Calls are not executed. Each one is recorded and answers with a fresh number, so the order of
/// calls is visible in the values computed from them.
#[derive(Debug, Default)]
pub struct Machine {
    pub tmps: BTreeMap<Tmp, i64>,
    pub mem: BTreeMap<i64, i64>,
    pub effects: Vec<Effect>,
    /// Addresses handed out to labels used as values.
    label_addrs: BTreeMap<Lbl, i64>,
}

const LABEL_BASE: i64 = 0x2000_0000;
const CALL_RESULT_BASE: i64 = 1000;

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tmp(&self, tmp: Tmp) -> i64 {
        self.tmps.get(&tmp).copied().unwrap_or(0)
    }

    fn label_addr(&mut self, lbl: Lbl) -> i64 {
        let next = LABEL_BASE + self.label_addrs.len() as i64 * 0x1000;
        *self.label_addrs.entry(lbl).or_insert(next)
    }

    fn load(&self, addr: i64) -> i64 {
        self.mem.get(&addr).copied().unwrap_or(0)
    }

    fn store(&mut self, addr: i64, value: i64) {
        self.mem.insert(addr, value);
        self.effects.push(Effect::Store { addr, value });
    }

    fn call(&mut self, fun: Lbl, args: Vec<i64>) -> i64 {
        self.effects.push(Effect::Call { fun, args });
        CALL_RESULT_BASE + self.effects.len() as i64
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> Result<i64> {
        match expr {
            Expr::Const(x) => Ok(*x),
            Expr::Tmp(tmp) => Ok(self.tmp(*tmp)),
            Expr::Name(lbl) => Ok(self.label_addr(*lbl)),
            Expr::Mem(addr) => {
                let addr = self.eval_expr(addr)?;
                Ok(self.load(addr))
            }
            Expr::Binop(op, x, y) => {
                let x = self.eval_expr(x)?;
                let y = self.eval_expr(y)?;
                binop(*op, x, y)
            }
            Expr::Unop(op, x) => Ok(unop(*op, self.eval_expr(x)?)),
            Expr::Call(fun, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.call(*fun, args))
            }
            Expr::Seq(stmt, result) => {
                self.exec_stmt(stmt)?;
                self.eval_expr(result)
            }
        }
    }

    /// Runs straight-line IR. Labels are no-ops, jumps are an error.
    pub fn exec_stmt(&mut self, stmt: &ir::Stmt) -> Result<()> {
        match stmt {
            ir::Stmt::Lbl(_) => Ok(()),
            ir::Stmt::Jmp(lbl) | ir::Stmt::Br { if_true: lbl, .. } => Err(InterpError::Jump(*lbl)),
            ir::Stmt::Move(Expr::Tmp(dst), src) => {
                let value = self.eval_expr(src)?;
                self.tmps.insert(*dst, value);
                Ok(())
            }
            // The source is evaluated before the address.
            ir::Stmt::Move(Expr::Mem(addr), src) => {
                let value = self.eval_expr(src)?;
                let addr = self.eval_expr(addr)?;
                self.store(addr, value);
                Ok(())
            }
            ir::Stmt::Move(..) => Err(InterpError::BadMove),
            ir::Stmt::Expr(expr) => self.eval_expr(expr).map(drop),
            ir::Stmt::Seq(stmts) => stmts.iter().try_for_each(|stmt| self.exec_stmt(stmt)),
        }
    }

    fn atom(&mut self, atom: Atom) -> i64 {
        match atom {
            Atom::Const(x) => x,
            Atom::Tmp(tmp) => self.tmp(tmp),
            Atom::Name(lbl) => self.label_addr(lbl),
        }
    }

    fn rhs(&mut self, rhs: &Rhs) -> Result<i64> {
        match rhs {
            Rhs::Atom(atom) => Ok(self.atom(*atom)),
            Rhs::Binop(op, x, y) => {
                let (x, y) = (self.atom(*x), self.atom(*y));
                binop(*op, x, y)
            }
            Rhs::Unop(op, x) => Ok(unop(*op, self.atom(*x))),
            Rhs::Load(addr) => {
                let addr = self.atom(*addr);
                Ok(self.load(addr))
            }
            Rhs::Call(fun, args) => {
                let args = args.iter().map(|arg| self.tmp(*arg)).collect();
                Ok(self.call(*fun, args))
            }
        }
    }

    /// Runs a canonical statement list until control falls off its end or jumps to a label the
    /// list does not define (such as the function's exit label). Returns that label, if any.
    pub fn run(&mut self, stmts: &[canon::Stmt], fuel: usize) -> Result<Option<Lbl>> {
        let positions: BTreeMap<Lbl, usize> = stmts
            .iter()
            .enumerate()
            .filter_map(|(pos, stmt)| match stmt {
                canon::Stmt::Lbl(lbl) => Some((*lbl, pos)),
                _ => None,
            })
            .collect();

        let mut pc = 0;
        let mut steps = 0;
        while let Some(stmt) = stmts.get(pc) {
            steps += 1;
            if steps > fuel {
                return Err(InterpError::OutOfFuel(fuel));
            }
            let target = match stmt {
                canon::Stmt::Lbl(_) => None,
                canon::Stmt::Jmp(lbl) => Some(*lbl),
                canon::Stmt::Br {
                    cond,
                    if_true,
                    if_false,
                } => Some(if self.tmp(*cond) != 0 {
                    *if_true
                } else {
                    *if_false
                }),
                canon::Stmt::Move(dst, rhs) => {
                    let value = self.rhs(rhs)?;
                    self.tmps.insert(*dst, value);
                    None
                }
                canon::Stmt::Store { addr, src } => {
                    let value = self.atom(*src);
                    let addr = self.atom(*addr);
                    self.store(addr, value);
                    None
                }
                canon::Stmt::Call(fun, args) => {
                    let args = args.iter().map(|arg| self.tmp(*arg)).collect();
                    self.call(*fun, args);
                    None
                }
            };
            pc = match target {
                None => pc + 1,
                Some(lbl) => match positions.get(&lbl) {
                    Some(pos) => *pos,
                    None => return Ok(Some(lbl)),
                },
            };
        }
        Ok(None)
    }
}

fn binop(op: Binop, x: i64, y: i64) -> Result<i64> {
    Ok(match op {
        Binop::Or => x | y,
        Binop::And => x & y,
        Binop::Xor => x ^ y,
        Binop::Eq => (x == y) as i64,
        Binop::Ne => (x != y) as i64,
        Binop::Lt => (x < y) as i64,
        Binop::Gt => (x > y) as i64,
        Binop::Le => (x <= y) as i64,
        Binop::Ge => (x >= y) as i64,
        Binop::Add => x.wrapping_add(y),
        Binop::Sub => x.wrapping_sub(y),
        Binop::Mul => x.wrapping_mul(y),
        Binop::Div | Binop::Mod if y == 0 => return Err(InterpError::DivisionByZero),
        Binop::Div => x.wrapping_div(y),
        Binop::Mod => x.wrapping_rem(y),
    })
}

fn unop(op: Unop, x: i64) -> i64 {
    match op {
        Unop::Neg => x.wrapping_neg(),
        Unop::Not => x ^ 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_answer_in_order() {
        let mut m = Machine::new();
        let expr = Expr::binop(
            Binop::Sub,
            Expr::Call("f".into(), vec![]),
            Expr::Call("g".into(), vec![7i64.into()]),
        );
        assert_eq!(m.eval_expr(&expr), Ok(-1));
        assert_eq!(
            m.effects,
            vec![
                Effect::Call { fun: "f".into(), args: vec![] },
                Effect::Call { fun: "g".into(), args: vec![7] },
            ]
        );
    }

    #[test]
    fn stores_evaluate_source_first() {
        let mut m = Machine::new();
        let stmt = ir::Stmt::mov(
            Expr::mem(Expr::Call("addr".into(), vec![])),
            Expr::Call("value".into(), vec![]),
        );
        m.exec_stmt(&stmt).unwrap();
        assert_eq!(m.effects[2], Effect::Store { addr: 1002, value: 1001 });
    }

    #[test]
    fn runs_loops_until_exit() {
        let (i, c) = (Tmp(0), Tmp(1));
        let (top, exit) = (Lbl::Fresh(0), Lbl::from("exit"));
        let stmts = vec![
            canon::Stmt::Move(i, Rhs::Atom(Atom::Const(0))),
            canon::Stmt::Lbl(top),
            canon::Stmt::Move(i, Rhs::Binop(Binop::Add, Atom::Tmp(i), Atom::Const(1))),
            canon::Stmt::Move(c, Rhs::Binop(Binop::Lt, Atom::Tmp(i), Atom::Const(5))),
            canon::Stmt::Br { cond: c, if_true: top, if_false: exit },
        ];
        let mut m = Machine::new();
        assert_eq!(m.run(&stmts, 100), Ok(Some(exit)));
        assert_eq!(m.tmp(i), 5);

        let mut m = Machine::new();
        assert_eq!(m.run(&stmts, 5), Err(InterpError::OutOfFuel(5)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut m = Machine::new();
        let expr = Expr::binop(Binop::Mod, 1i64, 0i64);
        assert_eq!(m.eval_expr(&expr), Err(InterpError::DivisionByZero));
    }
}
