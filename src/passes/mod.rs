//! Concrete implementations of `cvise::pass::Pass`, and the registry that
//! maps pass-group names onto them.

pub mod balanced;
pub mod blank;
pub mod comments;
pub mod includes;
pub mod ints;
pub mod line_markers;
pub mod lines;
pub mod ranges;
pub mod special;
pub mod subst;

use error;
use pass::Pass;
use std::sync::Arc;

/// The names `instantiate` recognizes, in a stable order.
pub const KNOWN_PASSES: &'static [&'static str] = &[
    "balanced",
    "blank",
    "comments",
    "includes",
    "ints",
    "line-markers",
    "lines",
    "special",
];

/// Instantiate the pass with the given registry name and optional argument.
///
/// Unknown names and unknown arguments are configuration-time errors; a
/// pass group that names a pass we cannot build is rejected before any
/// reduction starts.
pub fn instantiate(name: &str, arg: Option<&str>) -> error::Result<Arc<Pass>> {
    match name {
        "balanced" => {
            let arg = require_arg(name, arg)?;
            Ok(Arc::new(balanced::balanced_pass(arg)?))
        }
        "blank" => Ok(Arc::new(blank::BlankPass)),
        "comments" => Ok(Arc::new(comments::comments_pass())),
        "includes" => Ok(Arc::new(includes::includes_pass())),
        "ints" => {
            let arg = require_arg(name, arg)?;
            Ok(Arc::new(ints::ints_pass(arg)?))
        }
        "line-markers" => Ok(Arc::new(line_markers::line_markers_pass())),
        "lines" => Ok(Arc::new(lines::lines_pass())),
        "special" => {
            let arg = require_arg(name, arg)?;
            Ok(Arc::new(special::special_pass(arg)?))
        }
        _ => Err(error::Error::UnknownPass(name.to_string())),
    }
}

fn require_arg<'a>(name: &str, arg: Option<&'a str>) -> error::Result<&'a str> {
    arg.ok_or_else(|| {
        error::Error::UnknownPassArgument(name.to_string(), "<missing>".to_string())
    })
}
