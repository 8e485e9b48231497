//! Deleting `/* ... */` and `// ...` comments, one comment per candidate.

use regex::Regex;
use super::subst::{Substitution, SubstitutionFinder, SubstitutionPass};
use std::borrow::Cow;

lazy_static! {
    // The classic lookahead-free block comment matcher.
    static ref BLOCK: Regex = Regex::new(r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/").unwrap();
    static ref LINE: Regex = Regex::new(r"//[^\n]*").unwrap();
}

/// Every comment is one candidate. Deletions are tried one at a time, and
/// the test case is rescanned after each accepted one, so overlapping
/// matches (a `//` inside a block comment, say) never stack up.
#[derive(Clone, Debug)]
pub struct CommentsFinder;

impl SubstitutionFinder for CommentsFinder {
    fn name(&self) -> Cow<str> {
        Cow::from("CommentsPass")
    }

    fn substitutions(&self, contents: &str) -> Vec<Substitution> {
        let mut subs = Vec::new();
        for m in BLOCK.find_iter(contents) {
            subs.push(Substitution {
                span: m.start()..m.end(),
                replacement: String::new(),
            });
        }
        for m in LINE.find_iter(contents) {
            subs.push(Substitution {
                span: m.start()..m.end(),
                replacement: String::new(),
            });
        }
        subs
    }
}

/// Construct the comment-removal pass.
pub fn comments_pass() -> SubstitutionPass<CommentsFinder> {
    SubstitutionPass::new(CommentsFinder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pass::{Pass, PassResult};
    use process::ProcessEventNotifier;
    use std::path;
    use test_utils::{read_file, write_file, ScratchDir};

    #[test]
    fn finds_block_and_line_comments() {
        let contents = "int x; /* gone */ int y; // tail\nint z;\n";
        let subs = CommentsFinder.substitutions(contents);
        assert_eq!(subs.len(), 2);
        assert_eq!(&contents[subs[0].span.clone()], "/* gone */");
        assert_eq!(&contents[subs[1].span.clone()], "// tail");
    }

    #[test]
    fn multiline_block_comments_match() {
        let contents = "/* a\n * b\n */int x;\n";
        let subs = CommentsFinder.substitutions(contents);
        assert_eq!(subs.len(), 1);
        assert_eq!(&contents[subs[0].span.clone()], "/* a\n * b\n */");
    }

    #[test]
    fn one_comment_is_removed_per_candidate() {
        let _scratch = ScratchDir::new("comments_one_at_a_time");
        let tc = path::Path::new("t.c");
        write_file(tc, "/* one */ int x; // two\n");

        let pass = comments_pass();
        let state = pass.new(tc).unwrap().unwrap();
        let (result, _) = pass.transform(tc, state, &ProcessEventNotifier::none())
            .unwrap();

        assert_eq!(result, PassResult::Ok);
        assert_eq!(read_file(tc), " int x; // two\n");
    }

    #[test]
    fn advancing_reaches_the_next_comment() {
        let _scratch = ScratchDir::new("comments_advance");
        let tc = path::Path::new("t.c");
        write_file(tc, "/* one */ int x; // two\n");

        let pass = comments_pass();
        let state = pass.new(tc).unwrap().unwrap();
        let state = pass.advance(tc, &state).unwrap().unwrap();

        let (result, _) = pass.transform(tc, state, &ProcessEventNotifier::none())
            .unwrap();
        assert_eq!(result, PassResult::Ok);
        assert_eq!(read_file(tc), "/* one */ int x; \n");
    }

    #[test]
    fn no_comments_means_nothing_to_do() {
        let _scratch = ScratchDir::new("comments_none");
        let tc = path::Path::new("t.c");
        write_file(tc, "int x;\n");

        assert!(comments_pass().new(tc).unwrap().is_none());
    }
}
