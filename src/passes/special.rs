//! Replacing a few specific constructs that commonly pin down otherwise
//! reducible C/C++ test cases.

use error;
use regex::{Captures, Regex};
use super::subst::{Substitution, SubstitutionFinder, SubstitutionPass};
use std::borrow::Cow;
use std::ops::Range;

lazy_static! {
    static ref TRANSPARENT_CRC: Regex =
        Regex::new(r"transparent_crc\s*\((?P<list>[^)]*)\)").unwrap();
    static ref EXTERN_C: Regex = Regex::new(r#"extern "C""#).unwrap();
    static ref EXTERN_CXX: Regex = Regex::new(r#"extern "C\+\+""#).unwrap();
}

/// Which of the special replacements to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Replacement {
    /// `transparent_crc(x, ...)` becomes a plain printf of `x`.
    CrcToPrintf,
    /// `extern "C"` disappears.
    ExternC,
    /// `extern "C++"` disappears.
    ExternCxx,
}

/// A pass wrapping one of the special replacements; the argument (`a`, `b`,
/// or `c`) selects which.
#[derive(Clone, Debug)]
pub struct SpecialFinder {
    arg: String,
    replacement: Replacement,
}

impl SpecialFinder {
    /// Construct the finder for the given argument.
    pub fn from_arg(arg: &str) -> error::Result<SpecialFinder> {
        let replacement = match arg {
            "a" => Replacement::CrcToPrintf,
            "b" => Replacement::ExternC,
            "c" => Replacement::ExternCxx,
            _ => {
                return Err(error::Error::UnknownPassArgument(
                    "SpecialPass".into(),
                    arg.into(),
                ))
            }
        };
        Ok(SpecialFinder {
            arg: arg.to_string(),
            replacement: replacement,
        })
    }
}

fn crc_to_printf(caps: &Captures) -> String {
    let list = caps.name("list").map(|m| m.as_str()).unwrap_or("");
    let first = list.split(',').next().unwrap_or("").trim();
    format!("printf(\"%d\\n\", (int){})", first)
}

fn matches(regex: &Regex, contents: &str) -> Vec<Range<usize>> {
    regex
        .find_iter(contents)
        .map(|m| m.start()..m.end())
        .collect()
}

impl SubstitutionFinder for SpecialFinder {
    fn name(&self) -> Cow<str> {
        Cow::from(format!("SpecialPass::{}", self.arg))
    }

    fn substitutions(&self, contents: &str) -> Vec<Substitution> {
        let mut subs: Vec<Substitution> = match self.replacement {
            Replacement::CrcToPrintf => TRANSPARENT_CRC
                .captures_iter(contents)
                .filter_map(|caps| {
                    caps.get(0).map(|whole| {
                        Substitution {
                            span: whole.start()..whole.end(),
                            replacement: crc_to_printf(&caps),
                        }
                    })
                })
                .collect(),
            Replacement::ExternC => matches(&EXTERN_C, contents)
                .into_iter()
                .map(|span| {
                    Substitution {
                        span: span,
                        replacement: String::new(),
                    }
                })
                .collect(),
            Replacement::ExternCxx => matches(&EXTERN_CXX, contents)
                .into_iter()
                .map(|span| {
                    Substitution {
                        span: span,
                        replacement: String::new(),
                    }
                })
                .collect(),
        };

        // Candidates are enumerated back to front.
        subs.reverse();
        subs
    }
}

/// Construct the special-replacement pass for the given argument.
pub fn special_pass(arg: &str) -> error::Result<SubstitutionPass<SpecialFinder>> {
    Ok(SubstitutionPass::new(SpecialFinder::from_arg(arg)?))
}
