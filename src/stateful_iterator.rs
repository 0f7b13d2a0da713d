//! Streaming-aware cursor over a `Series`'s iterations (`spec.md` §4.8).
//!
//! Two access styles coexist. Random-access code just walks
//! `Series::iteration_indices_sorted()` directly with ordinary container
//! iterators. This module is the other one: a single current-iteration
//! cursor that understands step advance, per-step iteration announcements,
//! and closed-iteration skipping, for backends that can only be consumed
//! step by step. Modeled as the explicit state enum `spec.md` §9 Design
//! Notes calls for (`{End, InIteration, BetweenSteps, Failed}`) rather than
//! the original's nested `std::optional`s, with a bounded retry loop
//! standing in for what the original expressed as recursion.

use std::collections::{HashSet, VecDeque};

use crate::config::ParsePreference;
use crate::error::Result;
use crate::series::Series;
use crate::task::AdvanceStatus;

/// Cursor state. `Failed` is reached only if the backend itself errors
/// while pulling a step; a caller sees that as `next()` returning
/// `Some(Err(_))` once, after which the cursor is `End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    InIteration(u64),
    BetweenSteps,
    End,
}

/// Caps consecutive skip-and-retry attempts within one [`SeriesIterator::next`]
/// call, bounding what `spec.md` §9 describes as the original's unbounded
/// recursion over failed opens / duplicate announcements.
const MAX_SKIP_RETRIES: usize = 10_000;

/// A borrowed handle to the iteration the cursor currently sits on. Dropping
/// it without calling [`StreamingIteration::close`] leaves the iteration
/// open; the next call to [`SeriesIterator::next`] closes it implicitly
/// before advancing, matching `spec.md` §4.8 step 2 ("close the current
/// iteration").
pub struct StreamingIteration<'s> {
    pub index: u64,
    series: &'s mut Series,
}

impl<'s> StreamingIteration<'s> {
    pub fn series(&self) -> &Series {
        self.series
    }

    pub fn series_mut(&mut self) -> &mut Series {
        self.series
    }

    /// Close this iteration now rather than waiting for the next `next()`
    /// call to do it implicitly.
    pub fn close(self, flush: bool) -> Result<()> {
        self.series.close_iteration(self.index, flush)
    }
}

/// Stateful cursor over a `Series` opened in streaming mode. See the module
/// docs and `spec.md` §4.8 for the `next` algorithm.
pub struct SeriesIterator<'s> {
    series: &'s mut Series,
    /// Every iteration index ever yielded, so a later step re-announcing it
    /// is discarded rather than reopened (`spec.md` §8 scenario 4).
    ignore_seen: HashSet<u64>,
    /// Iterations announced for the step currently being drained.
    step_queue: VecDeque<u64>,
    state: State,
    parse_preference: ParsePreference,
    /// Used only for the `PartialEq` contract of `spec.md` §4.8 ("both
    /// reference the same series"); never dereferenced.
    series_identity: usize,
}

impl<'s> SeriesIterator<'s> {
    pub fn new(series: &'s mut Series) -> Self {
        let parse_preference = series.config().parse_preference();
        let series_identity = series as *const Series as usize;
        SeriesIterator {
            series,
            ignore_seen: HashSet::new(),
            step_queue: VecDeque::new(),
            state: State::NotStarted,
            parse_preference,
            series_identity,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.state, State::End)
    }

    fn close_current(&mut self) {
        if let State::InIteration(idx) = self.state {
            if let Err(e) = self.series.close_iteration(idx, true) {
                tracing::warn!(iteration = idx, error = %e, "failed to close iteration while advancing");
            }
        }
    }

    /// `spec.md` §4.8 step 2: request `begin_step`, then fold whatever the
    /// backend announces (or, lacking that, the next not-yet-seen iteration
    /// in ascending index order) into `step_queue`. Returns `Ok(false)` once
    /// the stream is over.
    fn pull_next_step(&mut self) -> Result<bool> {
        let status = self.series.begin_step()?;
        if matches!(status, AdvanceStatus::Over) {
            return Ok(false);
        }
        match self.series.announced_iterations() {
            Some(list) => {
                for idx in list {
                    if self.ignore_seen.contains(&idx) {
                        tracing::warn!(iteration = idx, "duplicate iteration index across steps, discarding");
                    } else {
                        self.step_queue.push_back(idx);
                    }
                }
            }
            None => {
                let fallback = self
                    .series
                    .iteration_indices_sorted()
                    .into_iter()
                    .find(|i| !self.ignore_seen.contains(i));
                match fallback {
                    Some(idx) => self.step_queue.push_back(idx),
                    None => return Ok(false),
                }
            }
        }
        Ok(true)
    }

    /// Advance the cursor, yielding the next not-yet-seen iteration or
    /// `None` once the stream (or, for a random-access backend, the
    /// discovered iteration set) is exhausted. `spec.md` §4.8:
    ///
    /// 1. If the current step still has unconsumed iterations, advance to
    ///    the next one and open it; a failed open is logged and skipped.
    /// 2. Otherwise close the current iteration and `begin_step`.
    /// 3. On `Over`, become the end iterator.
    /// 4. Already-seen iteration indices are skipped with a warning.
    pub fn next(&mut self) -> Option<Result<StreamingIteration<'_>>> {
        if self.is_end() {
            return None;
        }
        for _ in 0..MAX_SKIP_RETRIES {
            if let Some(idx) = self.step_queue.pop_front() {
                if self.ignore_seen.contains(&idx) {
                    continue;
                }
                if matches!(self.parse_preference, ParsePreference::PerStep) {
                    if let Err(e) = self.series.reparse_iteration(idx) {
                        tracing::warn!(iteration = idx, error = %e, "failed to reparse iteration, skipping");
                        continue;
                    }
                }
                match self.series.open_iteration(idx) {
                    Ok(()) => {
                        self.ignore_seen.insert(idx);
                        self.state = State::InIteration(idx);
                        return Some(Ok(StreamingIteration {
                            index: idx,
                            series: &mut *self.series,
                        }));
                    }
                    Err(e) => {
                        tracing::warn!(iteration = idx, error = %e, "failed to open iteration, skipping");
                        continue;
                    }
                }
            }

            self.close_current();
            self.state = State::BetweenSteps;
            match self.pull_next_step() {
                Ok(true) => continue,
                Ok(false) => {
                    self.state = State::End;
                    return None;
                }
                Err(e) => {
                    self.state = State::End;
                    return Some(Err(e));
                }
            }
        }
        // Exhausted the retry budget without finding an openable iteration
        // or a terminating `Over`; treat the stream as over rather than
        // looping forever.
        self.state = State::End;
        None
    }
}

impl PartialEq for SeriesIterator<'_> {
    /// `spec.md` §4.8: "two stateful iterators compare equal iff both are
    /// end, or both reference the same series and the same current
    /// iteration index." Relative ordering is deliberately not defined, and
    /// post-increment/decrement have no Rust equivalent to support.
    fn eq(&self, other: &Self) -> bool {
        match (self.state, other.state) {
            (State::End, State::End) => true,
            (State::InIteration(a), State::InIteration(b)) => {
                self.series_identity == other.series_identity && a == b
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{IterationEncoding, Series};

    fn prepared_series(indices: &[u64]) -> Series {
        let mut series = Series::create(":memory:", IterationEncoding::GroupBased, "").unwrap();
        for &i in indices {
            series.iteration(i).unwrap();
        }
        series.flush().unwrap();
        series
    }

    #[test]
    fn random_access_backend_yields_every_discovered_iteration_once() {
        let mut series = prepared_series(&[0, 1, 2]);
        let mut it = SeriesIterator::new(&mut series);
        let mut seen = Vec::new();
        while let Some(next) = it.next() {
            let cursor = next.unwrap();
            seen.push(cursor.index);
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(it.is_end());
    }

    #[test]
    fn end_iterators_compare_equal_regardless_of_series() {
        let mut s1 = prepared_series(&[0]);
        let mut s2 = prepared_series(&[0]);
        let mut it1 = SeriesIterator::new(&mut s1);
        let mut it2 = SeriesIterator::new(&mut s2);
        while it1.next().is_some() {}
        while it2.next().is_some() {}
        assert_eq!(it1, it2);
    }

    #[test]
    fn empty_series_ends_immediately() {
        let mut series = prepared_series(&[]);
        let mut it = SeriesIterator::new(&mut series);
        assert!(it.next().is_none());
        assert!(it.is_end());
    }

    #[test]
    fn closing_a_yielded_iteration_is_reflected_on_the_series() {
        let mut series = prepared_series(&[0]);
        {
            let mut it = SeriesIterator::new(&mut series);
            let cursor = it.next().unwrap().unwrap();
            cursor.close(true).unwrap();
        }
        assert!(series.get_iteration(0).unwrap().is_closed());
    }
}
