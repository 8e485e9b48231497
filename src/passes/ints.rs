//! Shrinking integer literals: dropping digits, prefixes and suffixes, and
//! converting hex to decimal.

use error;
use regex::{Captures, Regex};
use super::subst::{Substitution, SubstitutionFinder, SubstitutionPass};
use std::borrow::Cow;

// Literals are only touched when delimited by punctuation or whitespace, so
// we never nibble at identifiers.
const BORDER: &'static str = r"(?:[*,:;{}\[\]()]|\s)";

/// Which shrinking strategy to apply; selected by the pass argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    /// `a`: delete the leading digit.
    DeleteDigit,
    /// `b`: delete the `0`/`0x` prefix.
    DeletePrefix,
    /// `c`: delete the `U`/`L` suffix.
    DeleteSuffix,
    /// `d`: rewrite hex literals in decimal.
    HexToDec,
}

/// The integer-literal-shrinking pass; the argument (`a`-`d`) selects the
/// strategy.
#[derive(Clone, Debug)]
pub struct IntsFinder {
    arg: String,
    strategy: Strategy,
    regex: Regex,
}

impl IntsFinder {
    /// Construct the finder for the given argument.
    pub fn from_arg(arg: &str) -> error::Result<IntsFinder> {
        let (strategy, pattern) = match arg {
            "a" => (
                Strategy::DeleteDigit,
                format!(
                    r"(?P<pref>{b}[+-]?(?:0|(?:0[xX]))?)[0-9a-fA-F](?P<numpart>[0-9a-fA-F]+)(?P<suf>[ULul]*{b})",
                    b = BORDER
                ),
            ),
            "b" => (
                Strategy::DeletePrefix,
                format!(
                    r"(?P<del>{b})(?P<pref>[+-]?(?:0|(?:0[xX])))(?P<numpart>[0-9a-fA-F]+)(?P<suf>[ULul]*{b})",
                    b = BORDER
                ),
            ),
            "c" => (
                Strategy::DeleteSuffix,
                format!(
                    r"(?P<pref>{b}[+-]?(?:0|(?:0[xX]))?)(?P<numpart>[0-9a-fA-F]+)[ULul]+(?P<del>{b})",
                    b = BORDER
                ),
            ),
            "d" => (
                Strategy::HexToDec,
                format!(
                    r"(?P<pref>{b})(?P<numpart>0[Xx][0-9a-fA-F]+)(?P<suf>[ULul]*{b})",
                    b = BORDER
                ),
            ),
            _ => {
                return Err(error::Error::UnknownPassArgument(
                    "IntsPass".into(),
                    arg.into(),
                ))
            }
        };

        Ok(IntsFinder {
            arg: arg.to_string(),
            strategy: strategy,
            regex: Regex::new(&pattern).expect("the literal patterns are well formed"),
        })
    }

    fn replacement(&self, caps: &Captures) -> Option<String> {
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        match self.strategy {
            Strategy::DeleteDigit => Some(format!(
                "{}{}{}",
                group("pref")?,
                group("numpart")?,
                group("suf")?
            )),
            Strategy::DeletePrefix => Some(format!(
                "{}{}{}",
                group("del")?,
                group("numpart")?,
                group("suf")?
            )),
            Strategy::DeleteSuffix => Some(format!(
                "{}{}{}",
                group("pref")?,
                group("numpart")?,
                group("del")?
            )),
            Strategy::HexToDec => {
                let numpart = group("numpart")?;
                let value = u64::from_str_radix(&numpart[2..], 16).ok()?;
                Some(format!("{}{}{}", group("pref")?, value, group("suf")?))
            }
        }
    }
}

impl SubstitutionFinder for IntsFinder {
    fn name(&self) -> Cow<str> {
        Cow::from(format!("IntsPass::{}", self.arg))
    }

    fn substitutions(&self, contents: &str) -> Vec<Substitution> {
        let mut subs: Vec<Substitution> = self.regex
            .captures_iter(contents)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let replacement = self.replacement(&caps)?;
                Some(Substitution {
                    span: whole.start()..whole.end(),
                    replacement: replacement,
                })
            })
            .collect();

        // Candidates are enumerated back to front.
        subs.reverse();
        subs
    }
}

/// Construct the integer-shrinking pass for the given argument.
pub fn ints_pass(arg: &str) -> error::Result<SubstitutionPass<IntsFinder>> {
    Ok(SubstitutionPass::new(IntsFinder::from_arg(arg)?))
}
