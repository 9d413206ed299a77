//! Small programs for the binary to compile, built with [`crate::imcgen`] as a front-end would.

use clap::ValueEnum;

use crate::{
    chunks::{Ctx, Function},
    error::Result,
    frame::{Accesses, Frame, WORD},
    imcgen::{Command, ImcGen, Operand, Place, locals_of, words},
    ir::Binop,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Recursive factorial, printed with `_putInt`.
    Fact,
    /// Fills a global array with squares and sums it.
    SumArray,
    /// A nested function reading its parent's parameter and local.
    StaticLink,
    /// One expression keeping many values alive at once.
    Pressure,
    /// Prints a string literal.
    Hello,
}

impl Demo {
    pub fn build(self, ctx: &mut Ctx) -> Result<Vec<Function>> {
        match self {
            Demo::Fact => fact(ctx),
            Demo::SumArray => sum_array(ctx),
            Demo::StaticLink => static_link(ctx),
            Demo::Pressure => pressure(ctx),
            Demo::Hello => hello(ctx),
        }
    }
}

fn var(name: &str) -> Operand {
    Operand::var(name)
}

fn bin(op: Binop, x: impl Into<Operand>, y: impl Into<Operand>) -> Operand {
    Operand::binop(op, x, y)
}

fn assign(name: &str, value: impl Into<Operand>) -> Command {
    Command::Assign(Place::var(name), value.into())
}

/// Outgoing argument area for calls with at most `n` arguments plus the static link.
fn args_size(n: usize) -> i64 {
    words(n + 1)
}

fn main_calling(ctx: &mut Ctx, body: Vec<Command>, max_args: usize) -> Result<Function> {
    let frame = Frame::new(&ctx.names, "main".into(), 1, 0, args_size(max_args));
    let accesses = Accesses::new();
    ImcGen::new(ctx, &frame, &accesses).function(&body, &Operand::Int(0))
}

fn fact(ctx: &mut Ctx) -> Result<Vec<Function>> {
    let frame = Frame::new(&ctx.names, "fact".into(), 1, words(1), args_size(1));
    let mut accesses = locals_of(&frame, &["r"]);
    accesses.insert("n".into(), frame.param(1));

    let body = [Command::If {
        cond: bin(Binop::Le, var("n"), 1i64),
        then: vec![assign("r", 1i64)],
        els: vec![assign(
            "r",
            bin(
                Binop::Mul,
                var("n"),
                Operand::call("fact", 1, vec![bin(Binop::Sub, var("n"), 1i64)]),
            ),
        )],
    }];
    let fact = ImcGen::new(ctx, &frame, &accesses).function(&body, &var("r"))?;

    let print = Operand::call("_putInt", 1, vec![Operand::call("fact", 1, vec![5i64.into()])]);
    let main = main_calling(ctx, vec![Command::Eval(print)], 1)?;
    Ok(vec![fact, main])
}

fn sum_array(ctx: &mut Ctx) -> Result<Vec<Function>> {
    const LEN: i64 = 10;
    let xs = ctx.alloc_global("xs", LEN * WORD);

    let frame = Frame::new(&ctx.names, "sum".into(), 1, words(2), 0);
    let mut accesses = locals_of(&frame, &["i", "s"]);
    accesses.insert("xs".into(), xs);

    let elem = || Place::var("xs").index(var("i"), WORD);
    let count_up = |body: Command| Command::While {
        cond: bin(Binop::Lt, var("i"), LEN),
        body: vec![body, assign("i", bin(Binop::Add, var("i"), 1i64))],
    };
    let body = [
        assign("i", 0i64),
        count_up(Command::Assign(elem(), bin(Binop::Mul, var("i"), var("i")))),
        assign("s", 0i64),
        assign("i", 0i64),
        count_up(assign("s", bin(Binop::Add, var("s"), elem()))),
    ];
    let sum = ImcGen::new(ctx, &frame, &accesses).function(&body, &var("s"))?;

    let print = Operand::call("_putInt", 1, vec![Operand::call("sum", 1, vec![])]);
    let main = main_calling(ctx, vec![Command::Eval(print)], 1)?;
    Ok(vec![sum, main])
}

fn static_link(ctx: &mut Ctx) -> Result<Vec<Function>> {
    let outer_frame = Frame::new(&ctx.names, "outer".into(), 1, words(1), args_size(1));
    let mut outer_accesses = locals_of(&outer_frame, &["y"]);
    outer_accesses.insert("x".into(), outer_frame.param(1));

    let inner_frame = Frame::new(&ctx.names, "inner".into(), 2, 0, 0);
    let mut inner_accesses = outer_accesses.clone();
    inner_accesses.insert("z".into(), inner_frame.param(1));

    let sum = bin(Binop::Add, bin(Binop::Add, var("x"), var("y")), var("z"));
    let inner = ImcGen::new(ctx, &inner_frame, &inner_accesses).function(&[], &sum)?;

    let body = [assign("y", bin(Binop::Mul, var("x"), 2i64))];
    let call_inner = Operand::call("inner", 2, vec![3i64.into()]);
    let outer = ImcGen::new(ctx, &outer_frame, &outer_accesses).function(&body, &call_inner)?;

    let print = Operand::call("_putInt", 1, vec![Operand::call("outer", 1, vec![4i64.into()])]);
    let main = main_calling(ctx, vec![Command::Eval(print)], 1)?;
    Ok(vec![inner, outer, main])
}

fn pressure(ctx: &mut Ctx) -> Result<Vec<Function>> {
    const NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];
    let frame = Frame::new(&ctx.names, "pressure".into(), 1, words(NAMES.len()), 0);
    let accesses = locals_of(&frame, &NAMES);

    let mut body = Vec::new();
    for (i, name) in NAMES.iter().enumerate() {
        body.push(assign(name, i as i64 + 1));
    }
    // ((a+b)*(c+d)) - ((e+f)*(g+h)) + (a*h) - (b/c)
    let pair = |op, x: &str, y: &str| bin(op, var(x), var(y));
    let result = bin(
        Binop::Sub,
        bin(
            Binop::Add,
            bin(
                Binop::Sub,
                bin(Binop::Mul, pair(Binop::Add, "a", "b"), pair(Binop::Add, "c", "d")),
                bin(Binop::Mul, pair(Binop::Add, "e", "f"), pair(Binop::Add, "g", "h")),
            ),
            pair(Binop::Mul, "a", "h"),
        ),
        pair(Binop::Div, "b", "c"),
    );
    let pressure = ImcGen::new(ctx, &frame, &accesses).function(&body, &result)?;
    Ok(vec![pressure])
}

fn hello(ctx: &mut Ctx) -> Result<Vec<Function>> {
    let body = vec![
        Command::Eval(Operand::call("_putString", 1, vec![Operand::str("hello, world")])),
        Command::Eval(Operand::call("_putChar", 1, vec![10i64.into()])),
    ];
    Ok(vec![main_calling(ctx, body, 1)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::Compiler, config::Config};

    #[test]
    fn every_demo_compiles_with_few_registers() {
        for demo in Demo::value_variants() {
            for num_regs in [2, 3, 8] {
                let mut ctx = Ctx::new();
                let functions = demo.build(&mut ctx).unwrap();
                let config = Config {
                    num_regs,
                    ..Config::default()
                };
                let program = Compiler::new(&config).unwrap().compile(ctx, functions).unwrap();
                for code in &program.codes {
                    assert!(code.regs.values().all(|reg| *reg < num_regs || *reg == 253));
                }
            }
        }
    }

    #[test]
    fn hello_interns_its_string() {
        let mut ctx = Ctx::new();
        Demo::Hello.build(&mut ctx).unwrap();
        assert_eq!(ctx.data().len(), 1);
        assert_eq!(ctx.data()[0].init.as_deref(), Some("\"hello, world\""));
    }
}
