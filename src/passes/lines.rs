//! Deleting chunks of whole lines, the workhorse of most reductions.

use super::ranges::{RangeFinder, RangePass};
use std::borrow::Cow;
use std::ops::Range;

/// Every line of the test case is one deletable instance. The binary search
/// in `RangePass` then deletes the whole file first, then halves, and so on
/// down to individual lines.
#[derive(Clone, Debug)]
pub struct LinesFinder;

impl RangeFinder for LinesFinder {
    fn name(&self) -> Cow<str> {
        Cow::from("LinesPass")
    }

    fn ranges(&self, contents: &str) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start_of_line = 0;
        for (i, b) in contents.bytes().enumerate() {
            if b == b'\n' {
                ranges.push(start_of_line..i + 1);
                start_of_line = i + 1;
            }
        }
        // A trailing line without a newline still counts.
        if start_of_line < contents.len() {
            ranges.push(start_of_line..contents.len());
        }
        ranges
    }
}

/// Construct the line-deletion pass.
pub fn lines_pass() -> RangePass<LinesFinder> {
    RangePass::new(LinesFinder)
}
