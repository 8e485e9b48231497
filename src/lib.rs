//! A generic and parallel test case reducer.
//!
//! Given a test case (a file or a directory tree) and a user-supplied
//! *interestingness test* (an executable that exits with zero iff a
//! candidate still exhibits the property of interest), `cvise` drives a
//! schedule of reduction passes that propose ever smaller variants,
//! evaluates the candidates concurrently, and keeps the leftmost variant
//! the interestingness test accepts, until no pass can shrink the test
//! case any further.

#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

extern crate blake2;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate is_executable;
extern crate lru_cache;
extern crate num_cpus;
extern crate regex;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate tempdir;

#[cfg(unix)]
extern crate libc;

pub mod cache;
pub mod config;
pub mod driver;
pub mod engine;
pub mod environment;
pub mod error;
pub mod keys;
pub mod pass;
pub mod passes;
pub mod process;
pub mod stats;

#[cfg(test)]
mod test_utils;
