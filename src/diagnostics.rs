//! Side channel for non-aborting per-child parse errors.
//!
//! Grounded on `original_source/src/CustomHierarchy.cpp`'s catch-and-log
//! loop over child groups during hierarchy parsing (`spec.md` §7:
//! "Errors encountered while reading a child during hierarchy parse are
//! caught locally, the offending child is removed from the in-memory map,
//! and a diagnostic is written to a side channel — parsing of siblings
//! continues").

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
}

/// Accumulates diagnostics for a single parse pass; surfaced to the
/// caller of `Series::open`/the stateful iterator's `next` rather than
/// aborting the read.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<String>, err: &Error) {
        let path = path.into();
        tracing::warn!(path = %path, error = %err, "child failed to parse, skipping and continuing siblings");
        self.entries.push(Diagnostic {
            path,
            message: err.to_string(),
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_a_diagnostic_does_not_abort_the_pass() {
        let mut diag = Diagnostics::new();
        diag.record("/data/0/particles/broken", &Error::internal("bad schema"));
        assert_eq!(diag.entries().len(), 1);
        assert_eq!(diag.entries()[0].path, "/data/0/particles/broken");
    }
}
