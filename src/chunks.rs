//! Units of output and the per-compilation context that owns them.

use std::collections::BTreeMap;

use crate::{
    canon,
    frame::{Access, Frame, WORD},
    ir,
    names::{Lbl, NameGen},
};

/// A piece of the data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk {
    pub lbl: Lbl,
    /// Size in bytes.
    pub size: i64,
    /// Literal initializer, already quoted for the assembler.
    pub init: Option<String>,
}

/// One function as handed over by the IR generator.
#[derive(Debug, Clone)]
pub struct Function {
    pub frame: Frame,
    pub body: ir::Stmt,
}

/// One function's canonical statement stream.
#[derive(Debug, Clone)]
pub struct CodeChunk {
    pub frame: Frame,
    pub stmts: Vec<canon::Stmt>,
    pub entry: Lbl,
    pub exit: Lbl,
}

/// Everything that used to be process-wide state: name generation, the data segment and the
/// string literal table.
#[derive(Debug, Default)]
pub struct Ctx {
    pub names: NameGen,
    data: Vec<DataChunk>,
    strings: BTreeMap<String, Lbl>,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label of the data chunk holding `text`. Equal literals share a chunk.
    pub fn intern_str(&mut self, text: &str) -> Lbl {
        if let Some(lbl) = self.strings.get(text) {
            return *lbl;
        }
        let lbl = self.names.fresh_lbl();
        self.data.push(DataChunk {
            lbl,
            // One word per character plus the terminator.
            size: (text.chars().count() as i64 + 1) * WORD,
            init: Some(format!("{text:?}")),
        });
        self.strings.insert(text.to_owned(), lbl);
        lbl
    }

    /// Reserves a zero-initialized global of `size` bytes.
    pub fn alloc_global(&mut self, name: &str, size: i64) -> Access {
        let lbl = Lbl::named(name);
        self.data.push(DataChunk {
            lbl,
            size,
            init: None,
        });
        Access::Abs(lbl)
    }

    pub fn data(&self) -> &[DataChunk] {
        &self.data
    }

    pub fn into_data(self) -> Vec<DataChunk> {
        self.data
    }
}
