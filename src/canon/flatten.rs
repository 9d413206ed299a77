use std::collections::BTreeSet;

use log::trace;

use super::{Atom, Rhs, Stmt};
use crate::{
    chunks::{CodeChunk, Function},
    error::{BackendError, Result},
    ir,
    names::{NameGen, Tmp},
};

/// Rewrites IR trees into canonical statements.
///
/// Operands are evaluated strictly left to right. A compound operand is always named by a fresh
/// temporary; an operand that is already a temporary is copied only when a later sibling
/// reassigns that temporary before the operation executes.
pub struct Canonicalizer<'a> {
    names: &'a NameGen,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(names: &'a NameGen) -> Self {
        Self { names }
    }

    pub fn stmt(&self, stmt: ir::Stmt, out: &mut Vec<Stmt>) -> Result<()> {
        match stmt {
            ir::Stmt::Lbl(lbl) => out.push(Stmt::Lbl(lbl)),
            ir::Stmt::Jmp(lbl) => out.push(Stmt::Jmp(lbl)),
            ir::Stmt::Br {
                cond,
                if_true,
                if_false,
            } => {
                let cond = self.expr(cond, out)?;
                let cond = self.name_atom(cond, out);
                // Only the positive branch stays conditional. The negative one becomes a plain
                // jump behind a fresh label so the block builder can place it freely.
                let neg = self.names.fresh_lbl();
                out.push(Stmt::Br {
                    cond,
                    if_true,
                    if_false: neg,
                });
                out.push(Stmt::Lbl(neg));
                out.push(Stmt::Jmp(if_false));
            }
            ir::Stmt::Move(ir::Expr::Tmp(dst), src) => {
                let rhs = self.rhs(src, out)?;
                out.push(Stmt::Move(dst, rhs));
            }
            ir::Stmt::Move(ir::Expr::Mem(addr), src) => {
                // The value is computed before the address it is stored to.
                let [src, addr] = self.operands([src, *addr], out)?;
                out.push(Stmt::Store { addr, src });
            }
            ir::Stmt::Move(dst, _) => {
                return Err(BackendError::MalformedIr(format!(
                    "cannot assign to `{dst:?}`"
                )));
            }
            ir::Stmt::Expr(expr) => {
                // Pure leftovers are dropped; their effects already landed in `out`.
                if let Rhs::Call(fun, args) = self.rhs(expr, out)? {
                    out.push(Stmt::Call(fun, args));
                }
            }
            ir::Stmt::Seq(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt, out)?;
                }
            }
        }
        Ok(())
    }

    /// Emits the effects of `expr` into `out` and returns an atom holding its value.
    pub fn expr(&self, expr: ir::Expr, out: &mut Vec<Stmt>) -> Result<Atom> {
        match self.rhs(expr, out)? {
            Rhs::Atom(atom) => Ok(atom),
            rhs => {
                let tmp = self.names.fresh_tmp();
                trace!("materialize {rhs:?} into {tmp:?}");
                out.push(Stmt::Move(tmp, rhs));
                Ok(Atom::Tmp(tmp))
            }
        }
    }

    /// Like [`Canonicalizer::expr`] but leaves the outermost operation unnamed so the caller
    /// can assign it directly.
    fn rhs(&self, expr: ir::Expr, out: &mut Vec<Stmt>) -> Result<Rhs> {
        Ok(match expr {
            ir::Expr::Const(x) => Atom::Const(x).into(),
            ir::Expr::Tmp(tmp) => Atom::Tmp(tmp).into(),
            ir::Expr::Name(lbl) => Atom::Name(lbl).into(),
            ir::Expr::Mem(addr) => Rhs::Load(self.expr(*addr, out)?),
            ir::Expr::Binop(op, x, y) => {
                let [x, y] = self.operands([*x, *y], out)?;
                Rhs::Binop(op, x, y)
            }
            ir::Expr::Unop(op, x) => Rhs::Unop(op, self.expr(*x, out)?),
            ir::Expr::Call(fun, args) => {
                let atoms = self.operands(args, out)?;
                let args = atoms
                    .into_iter()
                    .map(|atom| self.name_atom(atom, out))
                    .collect();
                Rhs::Call(fun, args)
            }
            ir::Expr::Seq(stmt, result) => {
                self.stmt(*stmt, out)?;
                self.rhs(*result, out)?
            }
        })
    }

    /// Evaluates sibling operands in order.
    fn operands<C>(&self, exprs: C, out: &mut Vec<Stmt>) -> Result<C::Output>
    where
        C: Operands,
    {
        let mut parts = Vec::new();
        for expr in exprs.into_exprs() {
            let mut buf = Vec::new();
            let atom = self.expr(expr, &mut buf)?;
            parts.push((buf, atom));
        }

        let mut defined_later = BTreeSet::<Tmp>::new();
        for (buf, atom) in parts.iter_mut().rev() {
            if let Atom::Tmp(tmp) = *atom {
                if defined_later.contains(&tmp) {
                    let copy = self.names.fresh_tmp();
                    buf.push(Stmt::Move(copy, Atom::Tmp(tmp).into()));
                    *atom = Atom::Tmp(copy);
                }
            }
            defined_later.extend(buf.iter().filter_map(Stmt::def));
        }

        let mut atoms = Vec::with_capacity(parts.len());
        for (buf, atom) in parts {
            out.extend(buf);
            atoms.push(atom);
        }
        Ok(C::from_atoms(atoms))
    }

    fn name_atom(&self, atom: Atom, out: &mut Vec<Stmt>) -> Tmp {
        match atom {
            Atom::Tmp(tmp) => tmp,
            atom => {
                let tmp = self.names.fresh_tmp();
                out.push(Stmt::Move(tmp, atom.into()));
                tmp
            }
        }
    }
}

/// A fixed-size array or a `Vec` of sibling expressions.
trait Operands {
    type Output;
    fn into_exprs(self) -> Vec<ir::Expr>;
    fn from_atoms(atoms: Vec<Atom>) -> Self::Output;
}

impl<const N: usize> Operands for [ir::Expr; N] {
    type Output = [Atom; N];

    fn into_exprs(self) -> Vec<ir::Expr> {
        self.into()
    }

    fn from_atoms(atoms: Vec<Atom>) -> [Atom; N] {
        match atoms.try_into() {
            Ok(atoms) => atoms,
            Err(atoms) => unreachable!("expected {N} operands, got {}", atoms.len()),
        }
    }
}

impl Operands for Vec<ir::Expr> {
    type Output = Vec<Atom>;

    fn into_exprs(self) -> Vec<ir::Expr> {
        self
    }

    fn from_atoms(atoms: Vec<Atom>) -> Vec<Atom> {
        atoms
    }
}

pub fn canonicalize(names: &NameGen, stmt: ir::Stmt) -> Result<Vec<Stmt>> {
    let mut out = Vec::new();
    Canonicalizer::new(names).stmt(stmt, &mut out)?;
    Ok(out)
}

/// Canonicalizes a function body and brackets it with a fresh entry label and a final jump to a
/// fresh exit label. The frame's own label stays reserved for callers and the prologue.
pub fn canonicalize_function(names: &NameGen, function: Function) -> Result<CodeChunk> {
    let Function { frame, body } = function;
    let entry = names.fresh_lbl();
    let exit = names.fresh_lbl();
    let mut stmts = vec![Stmt::Lbl(entry)];
    Canonicalizer::new(names).stmt(body, &mut stmts)?;
    stmts.push(Stmt::Jmp(exit));
    Ok(CodeChunk {
        frame,
        stmts,
        entry,
        exit,
    })
}
