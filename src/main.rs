use std::process::ExitCode;

use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};

use prevc::{
    chunks::{Ctx, Function},
    compiler::Compiler,
    error::Result,
};

use cli_args::{CliArgs, Stage};

mod cli_args;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn run(args: &CliArgs) -> Result<()> {
    let compiler = Compiler::new(&args.config())?;
    let mut ctx = Ctx::new();
    let functions: Vec<Function> = args.program.build(&mut ctx)?;

    if args.emit == Stage::Alloc {
        print!("{}", compiler.compile(ctx, functions)?);
        return Ok(());
    }

    let names = &ctx.names;
    for function in functions {
        let lbl = function.frame.lbl;
        if args.emit == Stage::Ir {
            println!("{lbl}:\n    {:?}", function.body);
            continue;
        }
        let mut chunk = compiler.canonicalize(names, function)?;
        if args.emit == Stage::Blocks || args.emit == Stage::Asm {
            chunk = compiler.linearize(names, chunk);
        }
        if args.emit == Stage::Asm {
            print!("{}", compiler.select(names, &chunk).listing());
            continue;
        }
        for stmt in &chunk.stmts {
            println!("{stmt:?}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
