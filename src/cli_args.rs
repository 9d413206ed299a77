use clap::{Parser, ValueEnum};

use prevc::{config::Config, demos::Demo};

/// How far down the pipeline to go before printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// IR trees as built from the demo program.
    Ir,
    /// Canonical statements.
    Canon,
    /// Canonical statements after basic block layout.
    Blocks,
    /// Instructions before register allocation.
    Asm,
    /// The finished program.
    Alloc,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about=None)]
pub struct CliArgs {
    /// The demo program to compile.
    #[arg(short, long, default_value = "fact")]
    pub program: Demo,

    /// The number of registers available to the allocator.
    #[arg(short = 'k', long, default_value_t = Config::default().num_regs)]
    pub num_regs: usize,

    /// Print the program as it looks after this stage.
    #[arg(short, long, default_value = "alloc")]
    pub emit: Stage,

    /// Compile functions in parallel.
    #[arg(long)]
    pub parallel: bool,

    /// Log more. Repeat for even more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    pub fn config(&self) -> Config {
        Config {
            num_regs: self.num_regs,
            parallel: self.parallel,
        }
    }
}
