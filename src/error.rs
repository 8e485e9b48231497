//! Custom errors and results.

use serde_json;
use std::any::Any;
use std::error;
use std::fmt;
use std::io;
use std::path;

/// The kinds of errors that can happen when running `cvise`.
#[derive(Debug)]
pub enum Error {
    /// An IO error.
    Io(io::Error),

    /// A malformed pass-group configuration file.
    Json(serde_json::Error),

    /// A panicked thread's failure value.
    Thread(Box<Any + Send + 'static>),

    /// A test case that is missing, or cannot be read or written.
    InvalidTestCase(path::PathBuf, &'static str),

    /// Test case paths must be relative to the working directory.
    AbsolutePathTestCase(path::PathBuf),

    /// The interestingness test is not an executable file.
    InvalidInterestingnessTest(path::PathBuf),

    /// The interestingness test does not exit with zero on the unreduced
    /// input.
    InsaneTestCase(Vec<path::PathBuf>, path::PathBuf),

    /// Every file being reduced is empty.
    ZeroSize(Vec<path::PathBuf>),

    /// A pass name that is not in the registry.
    UnknownPass(String),

    /// A pass/argument combination that the pass does not recognize.
    UnknownPassArgument(String, String),

    /// An unrecognized pass option in a pass-group file.
    PassOption(String),

    /// A pass-group file without one of the required categories.
    MissingPassCategory(&'static str),

    /// A policy violation by a pass, escalated to a fatal error because
    /// `--die-on-pass-bug` is set.
    PassBug {
        /// The identity of the misbehaving pass.
        pass: String,
        /// What the pass did wrong.
        problem: String,
        /// The pass's state at the time of the violation.
        state: String,
        /// Where the workspace dump was written.
        crash_dir: path::PathBuf,
    },

    /// An error that occurred when attempting to backup an original test case.
    TestCaseBackupFailure(io::Error),

    /// The reduction was interrupted from the outside (SIGINT).
    Interrupted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> ::std::result::Result<(), fmt::Error> {
        match *self {
            Error::Io(ref e) => fmt::Display::fmt(e, f),
            Error::Json(ref e) => write!(f, "Not a valid pass group: {}", e),
            Error::Thread(ref e) => write!(f, "Thread panicked: {:?}", e),
            Error::InvalidTestCase(ref path, ref action) => write!(
                f,
                "The specified test case '{}' cannot be {}!",
                path.display(),
                action
            ),
            Error::AbsolutePathTestCase(ref path) => write!(
                f,
                "Test case path cannot be absolute: '{}'!",
                path.display()
            ),
            Error::InvalidInterestingnessTest(ref path) => write!(
                f,
                "The specified interestingness test '{}' cannot be executed!",
                path.display()
            ),
            Error::InsaneTestCase(ref test_cases, ref test) => {
                let test_cases: Vec<_> =
                    test_cases.iter().map(|t| t.display().to_string()).collect();
                write!(
                    f,
                    "The interestingness test does not return zero on the initial \
                     test case. Running these commands:

  DIR=`mktemp -d`
  cp {test_cases} $DIR
  cd $DIR
  {test}
  echo $?

should result in '0' being echoed to the terminal. Ensure that the test \
script takes no arguments and is hard-coded to refer to the same file names \
that are being reduced.",
                    test_cases = test_cases.join(" "),
                    test = test.display()
                )
            }
            Error::ZeroSize(ref test_cases) => {
                let what = if test_cases.len() == 1 {
                    "The file being reduced has"
                } else {
                    "All files being reduced have"
                };
                write!(
                    f,
                    "{} reached zero size; our work here is done. If you did not \
                     want a zero size file, you must help out by making sure that \
                     your interestingness test does not find files like this to \
                     be interesting.",
                    what
                )
            }
            Error::UnknownPass(ref name) => write!(f, "Unknown pass '{}'!", name),
            Error::UnknownPassArgument(ref pass, ref arg) => write!(
                f,
                "The argument '{}' is not valid for pass '{}'!",
                arg, pass
            ),
            Error::PassOption(ref opt) => write!(f, "Unknown pass option '{}'!", opt),
            Error::MissingPassCategory(category) => {
                write!(f, "The pass group is missing the '{}' category!", category)
            }
            Error::PassBug {
                ref pass,
                ref problem,
                ref state,
                ref crash_dir,
            } => write!(
                f,
                "{} has encountered a bug: {} (state: {}). Please consider \
                 tarring up {} and filing an issue so we can try to fix it.",
                pass,
                problem,
                state,
                crash_dir.display()
            ),
            Error::TestCaseBackupFailure(ref e) => {
                write!(f, "Could not backup initial test case: {}", e)
            }
            Error::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::Io(ref e) => error::Error::description(e),
            Error::Json(_) => "Not a valid pass group",
            Error::Thread(_) => "A panicked thread",
            Error::InvalidTestCase(..) => "Invalid test case",
            Error::AbsolutePathTestCase(_) => "Absolute test case path",
            Error::InvalidInterestingnessTest(_) => "Invalid interestingness test",
            Error::InsaneTestCase(..) => "Interestingness test fails on the initial input",
            Error::ZeroSize(_) => "Zero-sized test cases",
            Error::UnknownPass(_) => "Unknown pass",
            Error::UnknownPassArgument(..) => "Unknown pass argument",
            Error::PassOption(_) => "Unknown pass option",
            Error::MissingPassCategory(_) => "Missing pass category",
            Error::PassBug { .. } => "Pass bug",
            Error::TestCaseBackupFailure(_) => "Could not backup initial test case",
            Error::Interrupted => "Interrupted",
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<Box<Any + Send + 'static>> for Error {
    fn from(e: Box<Any + Send + 'static>) -> Self {
        Error::Thread(e)
    }
}

/// A `Result` whose `Err` variant is `cvise::error::Error`.
pub type Result<T> = ::std::result::Result<T, Error>;
