use crate::bdd::MAX_STORAGE_BITS;
use crate::error::{Error, Result};

/// Which part of the caller's heap flows into a callee.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum HeapFilter {
    /// Only cells reachable from the arguments or from globals.
    #[default]
    Reachable,
    /// The whole heap at the call site.
    Full,
}

/// Tunables of the analysis.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Initial size (`2^bits` nodes) of the BDD unique table; it grows on demand.
    pub storage_bits: usize,
    /// How many rounds of the uninitialized-load repair may run before giving up.
    pub max_repair_rounds: usize,
    pub heap_filter: HeapFilter,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            storage_bits: 16,
            max_repair_rounds: 2,
            heap_filter: HeapFilter::Reachable,
        }
    }
}

impl AnalysisConfig {
    pub fn with_storage_bits(mut self, bits: usize) -> Self {
        self.storage_bits = bits;
        self
    }

    pub fn with_max_repair_rounds(mut self, rounds: usize) -> Self {
        self.max_repair_rounds = rounds;
        self
    }

    pub fn with_heap_filter(mut self, filter: HeapFilter) -> Self {
        self.heap_filter = filter;
        self
    }

    /// Reject settings the BDD kernel cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.storage_bits > MAX_STORAGE_BITS {
            return Err(Error::InvalidConfig(format!(
                "storage_bits is {}, at most {} is supported",
                self.storage_bits, MAX_STORAGE_BITS
            )));
        }
        Ok(())
    }
}
