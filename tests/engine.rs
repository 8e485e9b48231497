//! End-to-end reductions against real interestingness scripts.

extern crate cvise;
#[macro_use]
extern crate lazy_static;
extern crate tempdir;

use cvise::config::{parse_pass_group, PassFilter, DEFAULT_PASS_GROUP};
use cvise::driver::Reduction;
use cvise::engine::{Options, TestManager, MAX_CRASH_DIRS};
use cvise::error::{Error, Result};
use cvise::pass::{Pass, PassResult, PassState};
use cvise::passes;
use cvise::process::ProcessEventNotifier;
use std::borrow::Cow;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

lazy_static! {
    static ref CWD: Mutex<()> = Mutex::new(());
}

/// Every test reduces files addressed relative to the working directory,
/// so tests take turns owning it.
struct Scratch {
    _guard: MutexGuard<'static, ()>,
    previous: PathBuf,
    dir: tempdir::TempDir,
}

impl Scratch {
    fn new(name: &str) -> Scratch {
        let guard = match CWD.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = env::current_dir().unwrap();
        let dir = tempdir::TempDir::new(name).unwrap();
        env::set_current_dir(dir.path()).unwrap();
        Scratch {
            _guard: guard,
            previous: previous,
            dir: dir,
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.previous);
    }
}

fn write_file(path: &str, contents: &str) {
    let mut file = fs::File::create(path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
}

fn read_file(path: &str) -> String {
    let mut contents = String::new();
    fs::File::open(path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}

fn write_script(name: &str, body: &str) -> PathBuf {
    let path = env::current_dir().unwrap().join(name);
    {
        let mut file = fs::File::create(&path).unwrap();
        writeln!(&mut file, "#!/bin/sh\n{}", body).unwrap();
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }
    path
}

fn quiet_options(script: PathBuf) -> Options {
    let mut options = Options::new(script);
    options.skip_key_off = true;
    options
}

fn manager(script: PathBuf, test_cases: &[&str]) -> TestManager {
    let test_cases = test_cases.iter().map(|tc| PathBuf::from(*tc)).collect();
    TestManager::new(quiet_options(script), test_cases).unwrap()
}

fn lines_pass() -> Arc<Pass> {
    passes::instantiate("lines", None).unwrap()
}

fn count_cvise_temp_dirs() -> usize {
    fs::read_dir(env::temp_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map_or(false, |name| name.starts_with("cvise-"))
        })
        .count()
}

#[test]
fn trivial_accept_reduces_to_nothing() {
    let _scratch = Scratch::new("trivial_accept");
    write_file("t.txt", "abc\n");
    let script = write_script("always.sh", "exit 0");

    let mut manager = manager(script, &["t.txt"]);
    manager.run_pass(&lines_pass()).unwrap();

    assert_eq!(read_file("t.txt"), "");

    // Reaching zero bytes is the best possible outcome, not an error;
    // later passes simply find nothing left to do.
    manager.run_pass(&lines_pass()).unwrap();
    assert_eq!(read_file("t.txt"), "");
}

#[test]
fn an_empty_input_is_fatal() {
    let _scratch = Scratch::new("empty_input");
    write_file("t.txt", "");
    let script = write_script("always.sh", "exit 0");

    let passes = parse_pass_group(DEFAULT_PASS_GROUP, &PassFilter::default()).unwrap();
    let manager = manager(script, &["t.txt"]);
    let mut reduction = Reduction::new(manager, false, false);

    match reduction.reduce(&passes) {
        Err(Error::ZeroSize(_)) => {}
        other => panic!("expected ZeroSize, got {:?}", other),
    }
}

#[test]
fn the_predicate_keeps_what_it_needs() {
    let _scratch = Scratch::new("predicate_keeps");
    write_file("t.txt", "foo\nbar\nbaz\nquux\nfred\n");
    let script = write_script("has-bar.sh", "grep bar t.txt > /dev/null");

    let mut manager = manager(script.clone(), &["t.txt"]);
    manager.run_pass(&lines_pass()).unwrap();

    let reduced = read_file("t.txt");
    assert_eq!(reduced, "bar\n");

    // Predicate preservation: the accepted result is still interesting.
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(script.display().to_string())
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn leftmost_wins_regardless_of_parallelism() {
    let seed = "one\ntwo\nthree\nfour\nKEEP\nfive\nsix\nseven\n";

    let reduce_with = |workers: usize| -> String {
        let _scratch = Scratch::new("leftmost_wins");
        write_file("t.txt", seed);
        // Completion order is perturbed by a size-dependent sleep; the
        // accepted output must not be.
        let script = write_script(
            "jitter.sh",
            "grep KEEP t.txt > /dev/null || exit 1\n\
             sleep 0.0$(( $(wc -c < t.txt) % 3 ))\n\
             exit 0",
        );

        let mut options = quiet_options(script);
        options.parallel_tests = workers;
        let mut manager = TestManager::new(options, vec![PathBuf::from("t.txt")]).unwrap();
        manager.run_pass(&lines_pass()).unwrap();
        read_file("t.txt")
    };

    let sequential = reduce_with(1);
    let parallel = reduce_with(4);
    assert_eq!(sequential, "KEEP\n");
    assert_eq!(sequential, parallel);
}

/// A pass that always claims success without touching the file.
#[derive(Debug)]
struct UnchangedOutputPass;

impl Pass for UnchangedOutputPass {
    fn name(&self) -> Cow<str> {
        Cow::from("UnchangedOutputPass")
    }

    fn new(&self, _test_case: &Path) -> Result<Option<PassState>> {
        Ok(Some(Box::new(0usize)))
    }

    fn advance(&self, _test_case: &Path, state: &PassState) -> Result<Option<PassState>> {
        let counter = *state.downcast_ref::<usize>().unwrap();
        Ok(Some(Box::new(counter + 1)))
    }

    fn advance_on_success(
        &self,
        _test_case: &Path,
        state: &PassState,
    ) -> Result<Option<PassState>> {
        let counter = *state.downcast_ref::<usize>().unwrap();
        Ok(Some(Box::new(counter)))
    }

    fn clone_state(&self, state: &PassState) -> PassState {
        Box::new(*state.downcast_ref::<usize>().unwrap())
    }

    fn transform(
        &self,
        _test_case: &Path,
        state: PassState,
        _notifier: &ProcessEventNotifier,
    ) -> Result<(PassResult, PassState)> {
        Ok((PassResult::Ok, state))
    }
}

#[test]
fn a_stuck_pass_dumps_workspaces_and_is_abandoned() {
    let scratch = Scratch::new("stuck_pass");
    write_file("t.txt", "stubborn\n");
    let script = write_script("always.sh", "exit 0");

    let mut manager = manager(script, &["t.txt"]);
    let pass: Arc<Pass> = Arc::new(UnchangedOutputPass);

    // The engine must survive the pass, not crash on it.
    manager.run_pass(&pass).unwrap();

    assert_eq!(read_file("t.txt"), "stubborn\n");

    let bug_dirs: Vec<_> = fs::read_dir(scratch.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map_or(false, |name| name.starts_with("cvise_bug_"))
        })
        .collect();
    assert!(!bug_dirs.is_empty(), "expected workspace dumps");
    assert!(bug_dirs.len() <= MAX_CRASH_DIRS + 1, "dumps must be bounded");

    for dir in bug_dirs {
        let info = dir.path().join("PASS_BUG_INFO.TXT");
        assert!(info.is_file(), "missing {}", info.display());
        let mut contents = String::new();
        fs::File::open(info)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("UnchangedOutputPass"));
        assert!(contents.contains("pass failed to modify the variant"));
    }
}

#[test]
fn timeouts_are_counted_and_the_pass_gives_up() {
    let scratch = Scratch::new("timeouts");
    write_file("t.txt", "a\nb\n");
    let script = write_script("slow.sh", "sleep 30");

    let mut options = quiet_options(script);
    options.timeout = 1;
    options.parallel_tests = 2;
    let mut manager = TestManager::new(options, vec![PathBuf::from("t.txt")]).unwrap();

    let started = Instant::now();
    manager.run_pass(&lines_pass()).unwrap();

    // Nothing was accepted, and we did not wait out the full sleeps.
    assert_eq!(read_file("t.txt"), "a\nb\n");
    assert!(started.elapsed() < Duration::from_secs(20));

    let extra_dirs = fs::read_dir(scratch.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map_or(false, |name| name.starts_with("cvise_extra_"))
        })
        .count();
    assert!(extra_dirs > 0, "timed-out workspaces should be preserved");
}

#[test]
fn identical_test_cases_share_one_enumeration() {
    let _scratch = Scratch::new("cache_identical");
    let seed = "foo\nbar\n";
    write_file("a.c", seed);
    write_file("b.c", seed);
    let script = write_script(
        "both.sh",
        "grep bar a.c > /dev/null && grep bar b.c > /dev/null",
    );

    let mut manager = manager(script, &["a.c", "b.c"]);
    manager.run_pass(&lines_pass()).unwrap();

    assert_eq!(read_file("a.c"), "bar\n");
    assert_eq!(
        read_file("b.c"),
        "bar\n",
        "the second, identical test case should be reduced from the cache"
    );
}

#[test]
fn a_cached_pass_runs_no_predicates() {
    let _scratch = Scratch::new("cache_no_workers");
    write_file("t.txt", "bar\n");
    let script = write_script(
        "counting.sh",
        "echo x >> predicate-runs\ngrep bar t.txt > /dev/null",
    );

    let mut manager = manager(script, &["t.txt"]);

    // First run actually enumerates candidates (and rejects them all).
    manager.run_pass(&lines_pass()).unwrap();
    let runs_after_first = read_file("predicate-runs").lines().count();
    assert!(runs_after_first > 0);

    // The file is unchanged, so the second run is a pure cache replay.
    manager.run_pass(&lines_pass()).unwrap();
    let runs_after_second = read_file("predicate-runs").lines().count();
    assert_eq!(runs_after_first, runs_after_second);
}

#[test]
fn an_insane_predicate_stops_everything_up_front() {
    let _scratch = Scratch::new("insane_predicate");
    write_file("t.txt", "untouchable\n");
    let script = write_script("never.sh", "exit 1");

    let passes = parse_pass_group(DEFAULT_PASS_GROUP, &PassFilter::default()).unwrap();
    let manager = manager(script, &["t.txt"]);
    let mut reduction = Reduction::new(manager, false, false);

    match reduction.reduce(&passes) {
        Err(Error::InsaneTestCase(..)) => {}
        other => panic!("expected InsaneTestCase, got {:?}", other),
    }

    assert_eq!(read_file("t.txt"), "untouchable\n");
    assert!(
        !Path::new("t.txt.orig").exists(),
        "no backup is made before the sanity check passes"
    );
}

#[test]
fn a_full_reduction_through_the_driver() {
    let _scratch = Scratch::new("full_reduction");
    write_file(
        "t.c",
        "/* prelude */\n\
         #include <stdio.h>\n\
         \n\
         int unused = 0x10;\n\
         int interesting_marker = 1;\n\
         int also_unused = 2;\n",
    );
    let script = write_script("marker.sh", "grep interesting_marker t.c > /dev/null");

    let passes = parse_pass_group(DEFAULT_PASS_GROUP, &PassFilter::default()).unwrap();
    let manager = manager(script, &["t.c"]);
    let mut reduction = Reduction::new(manager, false, false);
    reduction.reduce(&passes).unwrap();

    let reduced = read_file("t.c");
    assert!(reduced.contains("interesting_marker"));
    assert!(!reduced.contains("#include"));
    assert!(!reduced.contains("prelude"));
    assert!(!reduced.contains("unused"));

    // The original input survives as a backup.
    assert_eq!(
        read_file("t.c.orig"),
        "/* prelude */\n\
         #include <stdio.h>\n\
         \n\
         int unused = 0x10;\n\
         int interesting_marker = 1;\n\
         int also_unused = 2;\n"
    );
}

#[test]
fn temporary_directories_are_cleaned_up() {
    let _scratch = Scratch::new("cleanup");
    write_file("t.txt", "foo\nbar\n");
    let script = write_script("has-bar.sh", "grep bar t.txt > /dev/null");

    let before = count_cvise_temp_dirs();
    let mut manager = manager(script, &["t.txt"]);
    manager.run_pass(&lines_pass()).unwrap();
    let after = count_cvise_temp_dirs();

    assert!(
        after <= before,
        "no cvise-* directory may outlive the engine ({} -> {})",
        before,
        after
    );
}

#[test]
fn multiple_test_cases_are_reduced_biggest_first() {
    let _scratch = Scratch::new("multiple_test_cases");
    write_file("big.txt", "one\ntwo\nbar\nthree\nfour\nfive\nsix\n");
    write_file("small.txt", "bar\nextra\n");
    let script = write_script(
        "both.sh",
        "grep bar big.txt > /dev/null && grep bar small.txt > /dev/null",
    );

    let mut manager = manager(script, &["small.txt", "big.txt"]);
    manager.run_pass(&lines_pass()).unwrap();

    assert_eq!(read_file("big.txt"), "bar\n");
    assert_eq!(read_file("small.txt"), "bar\n");
}
