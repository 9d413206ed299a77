use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use internment::Intern;

/// A symbolic jump target or data address.
///
/// `Named` labels are chosen by upstream phases (function entries, globals, runtime intrinsics
/// like `_putInt`). `Fresh` labels are minted by a [`NameGen`] and are unique within it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lbl {
    Named(Intern<String>),
    Fresh(usize),
}

impl Lbl {
    pub fn named(name: impl AsRef<str>) -> Self {
        Self::Named(Intern::new(name.as_ref().to_owned()))
    }

    pub fn render(&self) -> String {
        match self {
            Lbl::Named(name) => name.to_string(),
            Lbl::Fresh(id) => format!("L{id}"),
        }
    }
}

impl From<&str> for Lbl {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl fmt::Debug for Lbl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl fmt::Display for Lbl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// A virtual register.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tmp(pub usize);

impl fmt::Debug for Tmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl fmt::Display for Tmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Source of fresh temporaries and labels for one compilation.
///
/// Counters are atomic so that functions can be compiled on several threads while sharing a
/// single generator.
#[derive(Debug, Default)]
pub struct NameGen {
    tmp_id: AtomicUsize,
    lbl_id: AtomicUsize,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_tmp(&self) -> Tmp {
        Tmp(self.tmp_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn fresh_lbl(&self) -> Lbl {
        Lbl::Fresh(self.lbl_id.fetch_add(1, Ordering::SeqCst))
    }

    /// How many temporaries have been handed out so far.
    pub fn tmps_created(&self) -> usize {
        self.tmp_id.load(Ordering::SeqCst)
    }
}
