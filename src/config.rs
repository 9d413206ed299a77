use crate::error::{BackendError, Result};

/// Highest register index the allocator may hand out is `num_regs - 1`; `$251` and above hold
/// the heap, stack and frame pointers.
pub const MAX_REGS: usize = 251;

#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the register palette (`K`).
    pub num_regs: usize,

    /// Run selection and allocation of independent functions on the rayon thread pool.
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_regs: 8,
            parallel: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Two registers is the most any single instruction reads.
        if self.num_regs < 2 || self.num_regs > MAX_REGS {
            return Err(BackendError::Config(format!(
                "number of registers must be between 2 and {MAX_REGS}, got {}",
                self.num_regs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn palette_bounds() {
        let cfg = |num_regs| Config { num_regs, parallel: false };
        assert!(cfg(1).validate().is_err());
        assert!(cfg(2).validate().is_ok());
        assert!(cfg(MAX_REGS).validate().is_ok());
        assert!(matches!(cfg(MAX_REGS + 1).validate(), Err(BackendError::Config(_))));
    }
}
