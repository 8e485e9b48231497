//! Blanket removal of lines that are almost always noise: blank lines, and
//! then lines starting with `#`.

use error;
use pass::{Pass, PassResult, PassState};
use process::ProcessEventNotifier;
use super::ranges::{read_utf8, write_file};
use std::borrow::Cow;
use std::path;

/// The two kinds of lines this pass strips, in the order it tries them.
const PATTERNS: &'static [fn(&str) -> bool] = &[is_blank, is_hash];

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_hash(line: &str) -> bool {
    line.starts_with('#')
}

/// A pass with exactly two candidates: "drop all blank lines" and "drop all
/// `#` lines". The state is just an index into the pattern list.
#[derive(Clone, Copy, Debug)]
pub struct BlankPass;

impl BlankPass {
    fn downcast(state: &PassState) -> usize {
        *state
            .downcast_ref::<usize>()
            .expect("the engine only hands a pass its own states")
    }
}

impl Pass for BlankPass {
    fn name(&self) -> Cow<str> {
        Cow::from("BlankPass")
    }

    fn new(&self, _test_case: &path::Path) -> error::Result<Option<PassState>> {
        Ok(Some(Box::new(0usize)))
    }

    fn advance(
        &self,
        _test_case: &path::Path,
        state: &PassState,
    ) -> error::Result<Option<PassState>> {
        let next = Self::downcast(state) + 1;
        if next >= PATTERNS.len() {
            Ok(None)
        } else {
            Ok(Some(Box::new(next)))
        }
    }

    fn advance_on_success(
        &self,
        _test_case: &path::Path,
        state: &PassState,
    ) -> error::Result<Option<PassState>> {
        // Retrying the same pattern is harmless: it has no matches left, so
        // the next transform moves on to the following pattern by itself.
        Ok(Some(Box::new(Self::downcast(state))))
    }

    fn clone_state(&self, state: &PassState) -> PassState {
        Box::new(Self::downcast(state))
    }

    fn transform(
        &self,
        test_case: &path::Path,
        state: PassState,
        _notifier: &ProcessEventNotifier,
    ) -> error::Result<(PassResult, PassState)> {
        let mut index = Self::downcast(&state);
        let contents = match read_utf8(test_case)? {
            Some(c) => c,
            None => return Ok((PassResult::Stop, state)),
        };

        while index < PATTERNS.len() {
            let pattern = PATTERNS[index];
            let mut kept = String::with_capacity(contents.len());
            let mut matched = false;
            for line in split_lines(&contents) {
                if pattern(line) {
                    matched = true;
                } else {
                    kept.push_str(line);
                }
            }

            if matched {
                write_file(test_case, &kept)?;
                return Ok((PassResult::Ok, Box::new(index)));
            }
            index += 1;
        }

        Ok((PassResult::Stop, Box::new(index)))
    }

    fn describe_state(&self, state: &PassState) -> String {
        format!("pattern {} of {}", Self::downcast(state), PATTERNS.len())
    }
}

/// Split into lines, keeping the newline on each line.
fn split_lines(contents: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in contents.bytes().enumerate() {
        if b == b'\n' {
            lines.push(&contents[start..i + 1]);
            start = i + 1;
        }
    }
    if start < contents.len() {
        lines.push(&contents[start..]);
    }
    lines
}
