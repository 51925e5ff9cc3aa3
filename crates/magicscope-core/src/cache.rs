use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::analyzer::Analyzer;
use crate::engine::Backend;
use crate::error::Result;
use crate::flags::{FlagToken, Mask};
use crate::options::AnalyzerOptions;

/// Keeps one open analyzer per flag mask and option set, so repeated
/// callers with the same configuration share a session.
pub struct AnalyzerCache<B: Backend + Clone> {
    backend: B,
    entries: HashMap<(Mask, AnalyzerOptions), Analyzer<B>>,
}

impl<B: Backend + Clone> AnalyzerCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
        }
    }

    /// Cached analyzer for this configuration, opening one if none is
    /// cached or the cached one has been closed.
    pub fn get(&mut self, flags: &[FlagToken], options: AnalyzerOptions) -> Result<&mut Analyzer<B>> {
        let mask = self.backend.codec().resolve(flags)?;
        let key = (mask, options.clone());

        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_closed() {
                    debug!(mask, "reopening closed cached analyzer");
                    slot.insert(Analyzer::open(self.backend.clone(), &[FlagToken::Bits(mask)], options)?);
                }
                Ok(slot.into_mut())
            }
            Entry::Vacant(slot) => {
                let analyzer = Analyzer::open(self.backend.clone(), &[FlagToken::Bits(mask)], options)?;
                Ok(slot.insert(analyzer))
            }
        }
    }

    /// Close and forget every cached analyzer.
    pub fn clear(&mut self) {
        for (_, mut analyzer) in self.entries.drain() {
            analyzer.close();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
