//! Deleting `#include` directives, one directive per candidate.

use regex::Regex;
use super::subst::{Substitution, SubstitutionFinder, SubstitutionPass};
use std::borrow::Cow;

lazy_static! {
    static ref INCLUDE: Regex = Regex::new(r"(?m)^\s*#\s*include[^\n]*\n?").unwrap();
}

/// Every `#include` line is one candidate, tried one at a time from the
/// top of the file.
#[derive(Clone, Debug)]
pub struct IncludesFinder;

impl SubstitutionFinder for IncludesFinder {
    fn name(&self) -> Cow<str> {
        Cow::from("IncludesPass")
    }

    fn substitutions(&self, contents: &str) -> Vec<Substitution> {
        INCLUDE
            .find_iter(contents)
            .map(|m| {
                Substitution {
                    span: m.start()..m.end(),
                    replacement: String::new(),
                }
            })
            .collect()
    }
}

/// Construct the include-removal pass.
pub fn includes_pass() -> SubstitutionPass<IncludesFinder> {
    SubstitutionPass::new(IncludesFinder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pass::{Pass, PassResult};
    use process::ProcessEventNotifier;
    use std::path;
    use test_utils::{read_file, write_file, ScratchDir};

    #[test]
    fn finds_includes_and_only_includes() {
        let contents = "#include <a.h>\nint x;\n  # include \"b.h\"\n";
        let subs = IncludesFinder.substitutions(contents);
        assert_eq!(subs.len(), 2);
        assert_eq!(&contents[subs[0].span.clone()], "#include <a.h>\n");
        assert_eq!(&contents[subs[1].span.clone()], "  # include \"b.h\"\n");
    }

    #[test]
    fn one_directive_is_removed_per_candidate() {
        let _scratch = ScratchDir::new("includes_one_at_a_time");
        let tc = path::Path::new("t.c");
        write_file(tc, "#include <a.h>\n#include <b.h>\nint x;\n");

        let pass = includes_pass();
        let state = pass.new(tc).unwrap().unwrap();
        let (result, _) = pass.transform(tc, state, &ProcessEventNotifier::none())
            .unwrap();

        assert_eq!(result, PassResult::Ok);
        assert_eq!(read_file(tc), "#include <b.h>\nint x;\n");
    }
}
