//! Deleting balanced-delimiter groups, or their contents.

use error;
use super::subst::{Substitution, SubstitutionFinder, SubstitutionPass};
use std::borrow::Cow;

/// Which delimiter pair to target, and whether to delete the whole group or
/// just its interior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Config {
    open: u8,
    close: u8,
    inside_only: bool,
}

/// Finds balanced groups with a plain delimiter stack; the pass argument
/// picks the delimiters and the deletion shape.
#[derive(Clone, Debug)]
pub struct BalancedFinder {
    arg: String,
    config: Config,
}

impl BalancedFinder {
    /// Construct the finder for the given argument.
    pub fn from_arg(arg: &str) -> error::Result<BalancedFinder> {
        let config = match arg {
            "curly" => Config {
                open: b'{',
                close: b'}',
                inside_only: false,
            },
            "curly-inside" => Config {
                open: b'{',
                close: b'}',
                inside_only: true,
            },
            "parens" => Config {
                open: b'(',
                close: b')',
                inside_only: false,
            },
            "parens-inside" => Config {
                open: b'(',
                close: b')',
                inside_only: true,
            },
            "square" => Config {
                open: b'[',
                close: b']',
                inside_only: false,
            },
            "angles" => Config {
                open: b'<',
                close: b'>',
                inside_only: false,
            },
            _ => {
                return Err(error::Error::UnknownPassArgument(
                    "BalancedPass".into(),
                    arg.into(),
                ))
            }
        };
        Ok(BalancedFinder {
            arg: arg.to_string(),
            config: config,
        })
    }
}

impl SubstitutionFinder for BalancedFinder {
    fn name(&self) -> Cow<str> {
        Cow::from(format!("BalancedPass::{}", self.arg))
    }

    fn substitutions(&self, contents: &str) -> Vec<Substitution> {
        let mut spans = Vec::new();
        let mut stack = Vec::new();

        for (i, b) in contents.bytes().enumerate() {
            if b == self.config.open {
                stack.push(i);
            } else if b == self.config.close {
                // A close without an open is just unbalanced input; skip it.
                if let Some(start) = stack.pop() {
                    if self.config.inside_only {
                        if start + 1 < i {
                            spans.push(start + 1..i);
                        }
                    } else {
                        spans.push(start..i + 1);
                    }
                }
            }
        }

        // Outermost groups first: deleting a big group subsumes all the
        // groups nested within it.
        spans.sort_by(|a, b| {
            (b.end - b.start).cmp(&(a.end - a.start)).then(
                a.start.cmp(
                    &b.start,
                ),
            )
        });

        spans
            .into_iter()
            .map(|span| {
                Substitution {
                    span: span,
                    replacement: String::new(),
                }
            })
            .collect()
    }
}

/// Construct the balanced-delimiter pass for the given argument.
pub fn balanced_pass(arg: &str) -> error::Result<SubstitutionPass<BalancedFinder>> {
    Ok(SubstitutionPass::new(BalancedFinder::from_arg(arg)?))
}
