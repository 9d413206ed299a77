//! The backend pipeline: canonicalize, lay out basic blocks, select instructions, allocate
//! registers.

use std::fmt;

use log::debug;
use rayon::prelude::*;

use crate::{
    asm::Code,
    canon::{self, basic_blocks},
    chunks::{CodeChunk, Ctx, DataChunk, Function},
    config::Config,
    error::Result,
    instr_sel::select_code,
    names::NameGen,
    regalloc,
};

/// The backend's output.
#[derive(Debug, Clone)]
pub struct Program {
    pub data: Vec<DataChunk>,
    pub codes: Vec<Code>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in &self.data {
            match &chunk.init {
                Some(init) => writeln!(f, "{}\tBYTE {init},0", chunk.lbl)?,
                None => writeln!(f, "{}\tOCTA 0\t% {} bytes", chunk.lbl, chunk.size)?,
            }
        }
        for code in &self.codes {
            writeln!(f)?;
            writeln!(
                f,
                "% {}: frame {} bytes, {} of them spill slots",
                code.frame.lbl,
                code.frame_size(),
                code.temp_size
            )?;
            write!(f, "{}", code.listing())?;
        }
        Ok(())
    }
}

pub struct Compiler {
    config: Config,
}

impl Compiler {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn canonicalize(&self, names: &NameGen, function: Function) -> Result<CodeChunk> {
        canon::canonicalize_function(names, function)
    }

    pub fn linearize(&self, names: &NameGen, chunk: CodeChunk) -> CodeChunk {
        basic_blocks::linearize(names, chunk)
    }

    pub fn select(&self, names: &NameGen, chunk: &CodeChunk) -> Code {
        select_code(names, chunk, self.config.num_regs)
    }

    pub fn allocate(&self, names: &NameGen, code: &mut Code) -> Result<()> {
        regalloc::allocate(names, code, self.config.num_regs)
    }

    fn compile_function(&self, names: &NameGen, function: Function) -> Result<Code> {
        let lbl = function.frame.lbl;
        debug!("compiling {lbl:?}");
        let chunk = self.canonicalize(names, function)?;
        let chunk = self.linearize(names, chunk);
        let mut code = self.select(names, &chunk);
        self.allocate(names, &mut code)?;
        debug!("{lbl:?}: {} instructions", code.instrs.len());
        Ok(code)
    }

    /// Compiles every function, keeping their order. Stops at the first error.
    pub fn compile(&self, ctx: Ctx, functions: Vec<Function>) -> Result<Program> {
        let codes = if self.config.parallel {
            functions
                .into_par_iter()
                .map(|function| self.compile_function(&ctx.names, function))
                .collect::<Result<Vec<_>>>()?
        } else {
            functions
                .into_iter()
                .map(|function| self.compile_function(&ctx.names, function))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(Program {
            data: ctx.into_data(),
            codes,
        })
    }
}
