//! Shared machinery for passes that delete byte ranges from a test case.
//!
//! A `RangeFinder` describes *which* ranges are candidates for deletion
//! (whole lines, comments, `#include` directives, ...); `RangePass` wraps a
//! finder into a full `Pass` that enumerates deletions with the usual
//! binary search: all ranges at once, then halves, quarters, and so on down
//! to individual ranges.

use error;
use pass::{BinaryState, Pass, PassResult, PassState};
use process::ProcessEventNotifier;
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::Read;
use std::ops::Range;
use std::path;

/// Finds the byte ranges a `RangePass` should try deleting.
pub trait RangeFinder: fmt::Debug + Send + Sync {
    /// This pass's identity, e.g. `CommentsPass`.
    fn name(&self) -> Cow<str>;

    /// All candidate ranges in the given contents, in any order. Ranges may
    /// overlap; overlapping ranges are pruned before enumeration.
    fn ranges(&self, contents: &str) -> Vec<Range<usize>>;
}

/// The enumeration state of a `RangePass`: the pruned ranges of the current
/// seed and a binary-search position over them.
#[derive(Clone, Debug)]
pub struct RangeState {
    ranges: Vec<Range<usize>>,
    binary: BinaryState,
}

/// A pass that deletes chunks of the ranges reported by its `RangeFinder`.
#[derive(Clone, Debug)]
pub struct RangePass<R: RangeFinder> {
    finder: R,
}

impl<R: RangeFinder> RangePass<R> {
    /// Wrap the given finder into a pass.
    pub fn new(finder: R) -> RangePass<R> {
        RangePass { finder: finder }
    }

    fn downcast<'a>(&self, state: &'a PassState) -> &'a RangeState {
        state
            .downcast_ref::<RangeState>()
            .expect("the engine only hands a pass its own states")
    }

    fn scan(&self, test_case: &path::Path) -> error::Result<Option<Vec<Range<usize>>>> {
        let contents = match read_utf8(test_case)? {
            Some(c) => c,
            // Not text we can interpret; leave the test case to other
            // passes.
            None => return Ok(None),
        };

        let mut ranges = self.finder.ranges(&contents);
        ranges.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        ranges.dedup();

        // Prune overlaps so that deleting any subset of the surviving
        // ranges is well defined.
        let mut pruned: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            debug_assert!(range.start < range.end);
            if pruned.last().map_or(true, |prev| prev.end <= range.start) {
                pruned.push(range);
            }
        }

        Ok(Some(pruned))
    }
}

impl<R: RangeFinder> Pass for RangePass<R> {
    fn name(&self) -> Cow<str> {
        self.finder.name()
    }

    fn new(&self, test_case: &path::Path) -> error::Result<Option<PassState>> {
        let ranges = match self.scan(test_case)? {
            Some(r) => r,
            None => return Ok(None),
        };
        Ok(BinaryState::create(ranges.len()).map(|binary| {
            Box::new(RangeState {
                ranges: ranges,
                binary: binary,
            }) as PassState
        }))
    }

    fn advance(
        &self,
        _test_case: &path::Path,
        state: &PassState,
    ) -> error::Result<Option<PassState>> {
        let state = self.downcast(state);
        Ok(state.binary.advance().map(|binary| {
            Box::new(RangeState {
                ranges: state.ranges.clone(),
                binary: binary,
            }) as PassState
        }))
    }

    fn advance_on_success(
        &self,
        test_case: &path::Path,
        state: &PassState,
    ) -> error::Result<Option<PassState>> {
        // The accepted variant is on disk now; rescan it so that subsequent
        // candidates delete ranges that actually exist.
        let ranges = match self.scan(test_case)? {
            Some(r) => r,
            None => return Ok(None),
        };
        let state = self.downcast(state);
        Ok(state.binary.advance_on_success(ranges.len()).map(|binary| {
            Box::new(RangeState {
                ranges: ranges,
                binary: binary,
            }) as PassState
        }))
    }

    fn clone_state(&self, state: &PassState) -> PassState {
        Box::new(self.downcast(state).clone())
    }

    fn transform(
        &self,
        test_case: &path::Path,
        state: PassState,
        _notifier: &ProcessEventNotifier,
    ) -> error::Result<(PassResult, PassState)> {
        let result = {
            let state = self.downcast(&state);
            let contents = match read_utf8(test_case)? {
                Some(c) => c,
                None => return Ok((PassResult::Invalid, state_box(state.clone()))),
            };

            let begin = state.binary.index();
            let end = ::std::cmp::min(state.binary.end(), state.ranges.len());
            if begin >= end {
                PassResult::Invalid
            } else {
                let mut reduced = contents.clone();
                // Delete back to front so earlier offsets stay valid.
                for range in state.ranges[begin..end].iter().rev() {
                    if range.end <= reduced.len() {
                        reduced.drain(range.start..range.end);
                    }
                }

                if reduced == contents {
                    PassResult::Invalid
                } else {
                    write_file(test_case, &reduced)?;
                    PassResult::Ok
                }
            }
        };
        Ok((result, state))
    }

    fn describe_state(&self, state: &PassState) -> String {
        let state = self.downcast(state);
        state.binary.to_string()
    }
}

fn state_box(state: RangeState) -> PassState {
    Box::new(state)
}

/// Read a file as UTF-8, or `None` if it is not valid UTF-8.
pub fn read_utf8(path: &path::Path) -> error::Result<Option<String>> {
    let mut bytes = Vec::new();
    fs::File::open(path)?.read_to_end(&mut bytes)?;
    Ok(String::from_utf8(bytes).ok())
}

/// Overwrite a file with the given contents.
pub fn write_file(path: &path::Path, contents: &str) -> error::Result<()> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use process::ProcessEventNotifier;
    use test_utils::{read_file, write_file as write_test_file, ScratchDir};

    /// Treats every line as a deletable range.
    #[derive(Clone, Debug)]
    struct EveryLine;

    impl RangeFinder for EveryLine {
        fn name(&self) -> Cow<str> {
            Cow::from("EveryLine")
        }

        fn ranges(&self, contents: &str) -> Vec<Range<usize>> {
            let mut ranges = Vec::new();
            let mut start = 0;
            for (i, b) in contents.bytes().enumerate() {
                if b == b'\n' {
                    ranges.push(start..i + 1);
                    start = i + 1;
                }
            }
            if start < contents.len() {
                ranges.push(start..contents.len());
            }
            ranges
        }
    }

    #[test]
    fn first_candidate_deletes_everything() {
        let _scratch = ScratchDir::new("ranges_first_candidate");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "one\ntwo\nthree\n");

        let pass = RangePass::new(EveryLine);
        let state = pass.new(tc).unwrap().expect("three lines to enumerate");

        let (result, _state) = pass.transform(tc, state, &ProcessEventNotifier::none())
            .unwrap();
        assert_eq!(result, PassResult::Ok);
        assert_eq!(read_file(tc), "");
    }

    #[test]
    fn advancing_narrows_to_single_ranges() {
        let _scratch = ScratchDir::new("ranges_narrow");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "one\ntwo\n");

        let pass = RangePass::new(EveryLine);
        let mut state = pass.new(tc).unwrap().unwrap();

        // Skip the whole-file candidate and the first single-line one.
        state = pass.advance(tc, &state).unwrap().unwrap();
        state = pass.advance(tc, &state).unwrap().unwrap();

        let (result, _state) = pass.transform(tc, state, &ProcessEventNotifier::none())
            .unwrap();
        assert_eq!(result, PassResult::Ok);
        assert_eq!(read_file(tc), "one\n");
    }

    #[test]
    fn enumeration_is_finite() {
        let _scratch = ScratchDir::new("ranges_finite");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "a\nb\nc\nd\ne\n");

        let pass = RangePass::new(EveryLine);
        let mut state = pass.new(tc).unwrap().unwrap();
        let mut steps = 0;
        while let Some(next) = pass.advance(tc, &state).unwrap() {
            state = next;
            steps += 1;
            assert!(steps <= 10, "5 instances must exhaust within 2N steps");
        }
    }

    #[test]
    fn empty_file_has_nothing_to_do() {
        let _scratch = ScratchDir::new("ranges_empty");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "");

        let pass = RangePass::new(EveryLine);
        assert!(pass.new(tc).unwrap().is_none());
    }

    #[test]
    fn advance_on_success_rescans_the_new_seed() {
        let _scratch = ScratchDir::new("ranges_rescan");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "one\ntwo\nthree\nfour\n");

        let pass = RangePass::new(EveryLine);
        let state = pass.new(tc).unwrap().unwrap();

        // Pretend chunk [0, 4) was accepted and the file shrank to one line.
        write_test_file(tc, "four\n");
        let state = pass.advance_on_success(tc, &state)
            .unwrap()
            .expect("one instance remains");
        let described = pass.describe_state(&state);
        assert!(described.contains("of 1 instances"), "got: {}", described);
    }
}
