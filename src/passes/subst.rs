//! Shared machinery for passes that enumerate single splice-in
//! substitutions, one candidate per match.
//!
//! Unlike the binary-search range passes, these try exactly one modification
//! per candidate, and rescan the test case from scratch after every accepted
//! variant, because a substitution invalidates the positions of everything
//! behind it.

use error;
use pass::{Pass, PassResult, PassState};
use process::ProcessEventNotifier;
use super::ranges::{read_utf8, write_file};
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;
use std::path;

/// One candidate modification: splice `replacement` over `span`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substitution {
    /// The byte range to replace.
    pub span: Range<usize>,
    /// What to put there instead. Empty means plain deletion.
    pub replacement: String,
}

/// Finds the substitutions a `SubstitutionPass` should try.
pub trait SubstitutionFinder: fmt::Debug + Send + Sync {
    /// This pass's identity, e.g. `IntsPass::a`.
    fn name(&self) -> Cow<str>;

    /// All candidate substitutions in the given contents.
    fn substitutions(&self, contents: &str) -> Vec<Substitution>;
}

/// The enumeration state: the substitutions of the current seed and a cursor
/// over them.
#[derive(Clone, Debug)]
pub struct SubstitutionState {
    substitutions: Vec<Substitution>,
    index: usize,
}

/// A pass that tries the substitutions reported by its finder, one at a
/// time.
#[derive(Clone, Debug)]
pub struct SubstitutionPass<F: SubstitutionFinder> {
    finder: F,
}

impl<F: SubstitutionFinder> SubstitutionPass<F> {
    /// Wrap the given finder into a pass.
    pub fn new(finder: F) -> SubstitutionPass<F> {
        SubstitutionPass { finder: finder }
    }

    fn downcast<'a>(&self, state: &'a PassState) -> &'a SubstitutionState {
        state
            .downcast_ref::<SubstitutionState>()
            .expect("the engine only hands a pass its own states")
    }
}

impl<F: SubstitutionFinder> Pass for SubstitutionPass<F> {
    fn name(&self) -> Cow<str> {
        self.finder.name()
    }

    fn new(&self, test_case: &path::Path) -> error::Result<Option<PassState>> {
        let contents = match read_utf8(test_case)? {
            Some(c) => c,
            None => return Ok(None),
        };
        let substitutions = self.finder.substitutions(&contents);
        if substitutions.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(SubstitutionState {
            substitutions: substitutions,
            index: 0,
        })))
    }

    fn advance(
        &self,
        _test_case: &path::Path,
        state: &PassState,
    ) -> error::Result<Option<PassState>> {
        let state = self.downcast(state);
        let index = state.index + 1;
        if index >= state.substitutions.len() {
            return Ok(None);
        }
        Ok(Some(Box::new(SubstitutionState {
            substitutions: state.substitutions.clone(),
            index: index,
        })))
    }

    fn advance_on_success(
        &self,
        test_case: &path::Path,
        _state: &PassState,
    ) -> error::Result<Option<PassState>> {
        // Positions are stale after a splice; start over against the new
        // seed.
        self.new(test_case)
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
                None => return Ok((PassResult::Invalid, state_ref(state))),
            };

            match state.substitutions.get(state.index) {
                None => PassResult::Invalid,
                Some(sub) if sub.span.end > contents.len() => PassResult::Invalid,
                Some(sub) => {
                    let mut reduced = String::with_capacity(contents.len());
                    reduced.push_str(&contents[..sub.span.start]);
                    reduced.push_str(&sub.replacement);
                    reduced.push_str(&contents[sub.span.end..]);

                    if reduced == contents {
                        PassResult::Invalid
                    } else {
                        write_file(test_case, &reduced)?;
                        PassResult::Ok
                    }
                }
            }
        };
        Ok((result, state))
    }

    fn describe_state(&self, state: &PassState) -> String {
        let state = self.downcast(state);
        format!(
            "substitution {} of {}",
            state.index,
            state.substitutions.len()
        )
    }
}

fn state_ref(state: &SubstitutionState) -> PassState {
    Box::new(state.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use process::ProcessEventNotifier;
    use test_utils::{read_file, write_file as write_test_file, ScratchDir};

    #[derive(Clone, Debug)]
    struct ReplaceAs;

    impl SubstitutionFinder for ReplaceAs {
        fn name(&self) -> Cow<str> {
            Cow::from("ReplaceAs")
        }

        fn substitutions(&self, contents: &str) -> Vec<Substitution> {
            contents
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'a')
                .map(|(i, _)| Substitution {
                    span: i..i + 1,
                    replacement: String::new(),
                })
                .collect()
        }
    }

    #[test]
    fn each_candidate_applies_one_substitution() {
        let _scratch = ScratchDir::new("subst_one_at_a_time");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "xaya\n");

        let pass = SubstitutionPass::new(ReplaceAs);
        let state = pass.new(tc).unwrap().unwrap();
        let state = pass.advance(tc, &state).unwrap().unwrap();

        let (result, _) = pass.transform(tc, state, &ProcessEventNotifier::none())
            .unwrap();
        assert_eq!(result, PassResult::Ok);
        assert_eq!(read_file(tc), "xay\n");
    }

    #[test]
    fn enumeration_is_bounded_by_the_match_count() {
        let _scratch = ScratchDir::new("subst_bounded");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "aaa\n");

        let pass = SubstitutionPass::new(ReplaceAs);
        let mut state = pass.new(tc).unwrap().unwrap();
        let mut steps = 1;
        while let Some(next) = pass.advance(tc, &state).unwrap() {
            state = next;
            steps += 1;
        }
        assert_eq!(steps, 3);
    }

    #[test]
    fn nothing_to_do_without_matches() {
        let _scratch = ScratchDir::new("subst_nothing");
        let tc = path::Path::new("t.txt");
        write_test_file(tc, "xyz\n");

        assert!(SubstitutionPass::new(ReplaceAs).new(tc).unwrap().is_none());
    }
}
