//! Loading and filtering pass groups.
//!
//! A pass group is a JSON document with three arrays of pass descriptions:
//! `first` (run once, up front), `main` (looped until a whole sweep stops
//! shrinking the test cases), and `last` (run once, at the end).

use error;
use pass::Pass;
use passes;
use serde_json;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path;
use std::sync::Arc;

/// The pass group `cvise` runs when none is given on the command line.
pub const DEFAULT_PASS_GROUP: &'static str = r#"{
    "first": [
        {"pass": "includes", "c": true},
        {"pass": "line-markers", "c": true},
        {"pass": "blank"}
    ],
    "main": [
        {"pass": "lines"},
        {"pass": "comments", "c": true},
        {"pass": "balanced", "arg": "curly-inside", "c": true},
        {"pass": "balanced", "arg": "curly", "c": true},
        {"pass": "balanced", "arg": "parens-inside"},
        {"pass": "balanced", "arg": "parens"},
        {"pass": "balanced", "arg": "square", "include": ["slow"]},
        {"pass": "balanced", "arg": "angles", "include": ["slow"], "c": true},
        {"pass": "special", "arg": "a", "c": true},
        {"pass": "special", "arg": "b", "c": true},
        {"pass": "special", "arg": "c", "c": true},
        {"pass": "ints", "arg": "a"},
        {"pass": "ints", "arg": "b"},
        {"pass": "ints", "arg": "c"},
        {"pass": "ints", "arg": "d"}
    ],
    "last": [
        {"pass": "blank"},
        {"pass": "lines"}
    ]
}"#;

/// Options a pass description can be gated on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassOption {
    /// Extra, slower passes enabled by `--sllooww`.
    Slow,
    /// Passes that only make sense on Windows.
    Windows,
}

impl PassOption {
    fn from_str(s: &str) -> error::Result<PassOption> {
        match s {
            "slow" => Ok(PassOption::Slow),
            "windows" => Ok(PassOption::Windows),
            _ => Err(error::Error::PassOption(s.to_string())),
        }
    }
}

/// One pass description inside a pass-group file.
#[derive(Clone, Debug, Deserialize)]
struct PassEntry {
    pass: String,
    arg: Option<String>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    c: Option<bool>,
    renaming: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
struct PassGroupFile {
    first: Option<Vec<PassEntry>>,
    main: Option<Vec<PassEntry>>,
    last: Option<Vec<PassEntry>>,
}

/// The knobs that decide which entries of a pass-group file survive
/// filtering.
#[derive(Clone, Debug, Default)]
pub struct PassFilter {
    /// Enabled pass options (`slow`, `windows`).
    pub options: HashSet<PassOption>,
    /// Skip passes marked `"c": true`; for reducing languages other than
    /// C/C++.
    pub not_c: bool,
    /// Keep passes marked `"renaming": true`, which are otherwise skipped.
    pub renaming: bool,
    /// Pass identities to drop from the schedule.
    pub remove_passes: HashSet<String>,
}

impl PassFilter {
    fn keep(&self, entry: &PassEntry) -> error::Result<bool> {
        if let Some(ref include) = entry.include {
            let mut any = false;
            for opt in include {
                any |= self.options.contains(&PassOption::from_str(opt)?);
            }
            if !any {
                return Ok(false);
            }
        }

        if let Some(ref exclude) = entry.exclude {
            for opt in exclude {
                if self.options.contains(&PassOption::from_str(opt)?) {
                    return Ok(false);
                }
            }
        }

        if self.not_c && entry.c == Some(true) {
            return Ok(false);
        }
        if !self.renaming && entry.renaming == Some(true) {
            return Ok(false);
        }

        Ok(true)
    }
}

/// A fully instantiated pass schedule.
#[derive(Clone, Debug)]
pub struct PassGroup {
    /// Passes run once before the main loop.
    pub first: Vec<Arc<Pass>>,
    /// Passes looped until a sweep stops shrinking the test cases.
    pub main: Vec<Arc<Pass>>,
    /// Passes run once after the main loop.
    pub last: Vec<Arc<Pass>>,
}

impl PassGroup {
    /// Every pass in schedule order.
    pub fn all(&self) -> Vec<Arc<Pass>> {
        let mut all = self.first.clone();
        all.extend(self.main.clone());
        all.extend(self.last.clone());
        all
    }
}

impl fmt::Display for PassGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "INITIAL PASSES")?;
        for p in &self.first {
            writeln!(f, "    {}", p.name())?;
        }
        writeln!(f, "MAIN PASSES")?;
        for p in &self.main {
            writeln!(f, "    {}", p.name())?;
        }
        writeln!(f, "CLEANUP PASSES")?;
        for p in &self.last {
            writeln!(f, "    {}", p.name())?;
        }
        Ok(())
    }
}

/// Parse and instantiate a pass group from JSON text.
pub fn parse_pass_group(json: &str, filter: &PassFilter) -> error::Result<PassGroup> {
    let file: PassGroupFile = serde_json::from_str(json)?;

    let first = file.first.ok_or(error::Error::MissingPassCategory("first"))?;
    let main = file.main.ok_or(error::Error::MissingPassCategory("main"))?;
    let last = file.last.ok_or(error::Error::MissingPassCategory("last"))?;

    Ok(PassGroup {
        first: instantiate_entries(first, filter)?,
        main: instantiate_entries(main, filter)?,
        last: instantiate_entries(last, filter)?,
    })
}

/// Read and instantiate a pass group from a JSON file.
pub fn load_pass_group_file(
    path: &path::Path,
    filter: &PassFilter,
) -> error::Result<PassGroup> {
    let mut json = String::new();
    fs::File::open(path)?.read_to_string(&mut json)?;
    parse_pass_group(&json, filter)
}

fn instantiate_entries(
    entries: Vec<PassEntry>,
    filter: &PassFilter,
) -> error::Result<Vec<Arc<Pass>>> {
    let mut instantiated = Vec::with_capacity(entries.len());
    for entry in entries {
        if !filter.keep(&entry)? {
            continue;
        }
        let pass = passes::instantiate(
            &entry.pass,
            entry.arg.as_ref().map(|s| s.as_str()),
        )?;
        if filter.remove_passes.contains(pass.name().as_ref()) {
            continue;
        }
        instantiated.push(pass);
    }
    Ok(instantiated)
}
