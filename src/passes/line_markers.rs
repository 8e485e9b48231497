//! Deleting preprocessor line markers (`# 42 "foo.h"`), which preprocessed
//! sources are full of.

use super::ranges::{RangeFinder, RangePass};
use regex::Regex;
use std::borrow::Cow;
use std::ops::Range;

lazy_static! {
    static ref LINE_MARKER: Regex = Regex::new(r"(?m)^\s*#\s*[0-9][^\n]*\n?").unwrap();
}

/// Every line marker is one deletable instance.
#[derive(Clone, Debug)]
pub struct LineMarkersFinder;

impl RangeFinder for LineMarkersFinder {
    fn name(&self) -> Cow<str> {
        Cow::from("LineMarkersPass")
    }

    fn ranges(&self, contents: &str) -> Vec<Range<usize>> {
        LINE_MARKER
            .find_iter(contents)
            .map(|m| m.start()..m.end())
            .collect()
    }
}

/// Construct the line-marker-removal pass.
pub fn line_markers_pass() -> RangePass<LineMarkersFinder> {
    RangePass::new(LineMarkersFinder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_line_markers() {
        let contents = "# 1 \"t.c\"\nint x;\n# 12 \"u.h\" 2\n";
        let ranges = LineMarkersFinder.ranges(contents);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&contents[ranges[0].clone()], "# 1 \"t.c\"\n");
    }

    #[test]
    fn plain_directives_are_left_alone() {
        let ranges = LineMarkersFinder.ranges("#define X 1\n#include <a.h>\n");
        assert!(ranges.is_empty());
    }
}
