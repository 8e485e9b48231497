//! An isolated workspace in which one candidate variant is materialized,
//! transformed, and judged.

use error;
use pass::{Pass, PassResult, PassState};
use process::{ProcessEventNotifier, RunOutcome};
use std::fmt;
use std::fs;
use std::io;
use std::path;
use std::process;
use std::time;

/// A freshly created temporary directory holding a full copy of the
/// test-case set, the state for one candidate job, and, after the job ran,
/// the transform's result and the interestingness test's exit code.
///
/// The environment owns its directory until the engine releases it. Nothing
/// in here ever touches files outside the directory; the engine alone
/// mutates the real test cases.
pub struct TestEnvironment {
    state: Option<PassState>,
    order: usize,
    test_script: path::PathBuf,
    folder: path::PathBuf,
    test_case: path::PathBuf,
    all_test_cases: Vec<path::PathBuf>,
    base_size: u64,
    result: Option<PassResult>,
    exit_code: Option<i32>,
    timed_out: bool,
}

impl fmt::Debug for TestEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TestEnvironment")
            .field("order", &self.order)
            .field("folder", &self.folder)
            .field("test_case", &self.test_case)
            .field("base_size", &self.base_size)
            .field("result", &self.result)
            .field("exit_code", &self.exit_code)
            .field("timed_out", &self.timed_out)
            .finish()
    }
}

impl TestEnvironment {
    /// Materialize a new test environment inside `folder`: copy every test
    /// case into it, preserving the relative layout.
    ///
    /// `test_case` is the primary test case whose byte-size delta this
    /// candidate is judged by. `state` is `None` only for sanity-check
    /// environments, which run no transform.
    pub fn new<P>(
        state: Option<PassState>,
        order: usize,
        test_script: P,
        folder: P,
        test_case: P,
        all_test_cases: &[path::PathBuf],
    ) -> error::Result<TestEnvironment>
    where
        P: Into<path::PathBuf>,
    {
        let test_case = test_case.into();
        let folder = folder.into();

        let base_size = size_on_disk(&test_case)?;

        for tc in all_test_cases {
            if let Some(parent) = tc.parent() {
                fs::create_dir_all(folder.join(parent))?;
            }
            copy_recursively(tc, &folder.join(tc))?;
        }

        Ok(TestEnvironment {
            state: state,
            order: order,
            test_script: test_script.into(),
            folder: folder,
            test_case: test_case,
            all_test_cases: all_test_cases.to_vec(),
            base_size: base_size,
            result: None,
            exit_code: None,
            timed_out: false,
        })
    }

    /// This candidate job's order number within its batch.
    pub fn order(&self) -> usize {
        self.order
    }

    /// The state this candidate was generated from, possibly refined by the
    /// transform.
    pub fn state(&self) -> Option<&PassState> {
        self.state.as_ref()
    }

    /// The directory this environment owns.
    pub fn folder(&self) -> &path::Path {
        &self.folder
    }

    /// The private copy of the primary test case.
    pub fn test_case_path(&self) -> path::PathBuf {
        self.folder.join(&self.test_case)
    }

    /// What the transform reported, if it ran.
    pub fn result(&self) -> Option<PassResult> {
        self.result
    }

    /// The interestingness test's exit code, if it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Did this candidate blow through its wall-clock deadline?
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// By how many bytes did the transform shrink the primary test case?
    pub fn size_improvement(&self) -> i64 {
        let now = size_on_disk(&self.test_case_path()).unwrap_or(0);
        self.base_size as i64 - now as i64
    }

    /// A candidate succeeded iff the transform produced it and the
    /// interestingness test exited with zero.
    pub fn success(&self) -> bool {
        self.result == Some(PassResult::Ok) && self.exit_code == Some(0)
    }

    /// Copy this environment's test cases and the interestingness test into
    /// `dst`, for crash dumps and saved variants.
    pub fn dump(&self, dst: &path::Path) -> io::Result<()> {
        for tc in &self.all_test_cases {
            let file_name = tc.file_name().unwrap_or(tc.as_os_str());
            copy_recursively(&self.folder.join(tc), &dst.join(file_name))?;
        }
        let script_name = self.test_script
            .file_name()
            .map(path::PathBuf::from)
            .unwrap_or_else(|| path::PathBuf::from("interestingness-test"));
        fs::copy(&self.test_script, dst.join(script_name))?;
        Ok(())
    }

    /// Run this candidate job: transform the private copy in place, then run
    /// the interestingness test over it.
    ///
    /// Never fails; failures are recorded in the environment so that the
    /// engine can inspect them in completion order.
    pub fn run(
        mut self,
        pass: &Pass,
        notifier: &ProcessEventNotifier,
        deadline: Option<time::Instant>,
    ) -> TestEnvironment {
        let state = self.state
            .take()
            .expect("only sanity environments lack a state, and those never run()");

        match pass.transform(&self.test_case_path(), state, notifier) {
            Ok((result, state)) => {
                self.state = Some(state);
                self.result = Some(result);
                if result != PassResult::Ok {
                    return self;
                }
            }
            Err(e) => {
                // Track it like a transform that reported failure itself;
                // the engine turns this into a pass bug.
                debug!("transform failed with an error: {}", e);
                self.result = Some(PassResult::Error);
                return self;
            }
        }

        match self.run_test(false, notifier, deadline) {
            Ok(RunOutcome::Finished { code, .. }) => {
                self.exit_code = Some(code);
            }
            Ok(RunOutcome::TimedOut) => {
                self.timed_out = true;
            }
            Ok(RunOutcome::Cancelled) => {}
            Err(e) => {
                // This can happen when temporary files are cleaned up under
                // a cancelled candidate's feet.
                debug!("interestingness test failed to run: {}", e);
            }
        }

        self
    }

    /// Execute the interestingness test with this environment's root as the
    /// working directory, reporting the child's lifetime on the pid queue.
    pub fn run_test(
        &self,
        verbose: bool,
        notifier: &ProcessEventNotifier,
        deadline: Option<time::Instant>,
    ) -> io::Result<RunOutcome> {
        let mut cmd = process::Command::new("sh");
        cmd.arg("-c")
            .arg(self.test_script.as_os_str())
            .current_dir(&self.folder);

        let outcome = notifier.run_process(cmd, deadline)?;

        if verbose {
            if let RunOutcome::Finished {
                ref stdout,
                ref stderr,
                code,
            } = outcome
            {
                if code != 0 {
                    debug!("stdout:\n{}", stdout);
                    debug!("stderr:\n{}", stderr);
                }
            }
        }

        Ok(outcome)
    }
}

/// The size in bytes of a file, or of every file under a directory tree.
pub fn size_on_disk(path: &path::Path) -> io::Result<u64> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += size_on_disk(&entry?.path())?;
    }
    Ok(total)
}

/// Copy a file, or a whole directory tree, from `src` to `dst`.
pub fn copy_recursively(src: &path::Path, dst: &path::Path) -> io::Result<()> {
    if !fs::metadata(src)?.is_dir() {
        fs::copy(src, dst)?;
        return Ok(());
    }

    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        copy_recursively(&entry.path(), &dst.join(entry.file_name()))?;
    }
    Ok(())
}

/// Replace `dst` with `src`.
///
/// For files this stages a copy next to `dst` and renames it over, which is
/// atomic on POSIX file systems; an interrupted reduction never leaves a
/// half-written test case behind. Directory test cases are swapped
/// non-atomically.
pub fn replace_test_case(src: &path::Path, dst: &path::Path) -> io::Result<()> {
    if fs::metadata(src)?.is_dir() {
        if dst.exists() {
            fs::remove_dir_all(dst)?;
        }
        return copy_recursively(src, dst);
    }

    let staged = stage_name(dst);
    fs::copy(src, &staged)?;
    fs::rename(&staged, dst)?;
    Ok(())
}

fn stage_name(dst: &path::Path) -> path::PathBuf {
    let mut file_name = dst.file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    file_name.push(".cvise-staged");
    dst.with_file_name(file_name)
}

/// Do the two files have identical contents?
pub fn files_equal(a: &path::Path, b: &path::Path) -> io::Result<bool> {
    use std::io::Read;

    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.is_dir() || meta_b.is_dir() {
        // Directory candidates are compared shallowly by total size; the
        // passes that support directories delete whole files.
        return Ok(size_on_disk(a)? == size_on_disk(b)?);
    }
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut contents_a = Vec::with_capacity(meta_a.len() as usize);
    let mut contents_b = Vec::with_capacity(meta_b.len() as usize);
    fs::File::open(a)?.read_to_end(&mut contents_a)?;
    fs::File::open(b)?.read_to_end(&mut contents_b)?;
    Ok(contents_a == contents_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pass::PassResult;
    use std::path::PathBuf;
    use tempdir::TempDir;
    use test_utils::{read_file, write_file, ScratchDir};

    #[test]
    fn materialize_copies_the_whole_test_case_set() {
        let _scratch = ScratchDir::new("materialize_copies");

        write_file(path::Path::new("a.c"), "int main() {}\n");
        write_file(path::Path::new("sub/b.c"), "int x;\n");

        let folder = TempDir::new("cvise-test").unwrap();
        let all = vec![PathBuf::from("a.c"), PathBuf::from("sub/b.c")];
        let env_ = TestEnvironment::new(
            None,
            0,
            PathBuf::from("/bin/true"),
            folder.path().to_path_buf(),
            PathBuf::from("a.c"),
            &all,
        ).unwrap();

        assert!(folder.path().join("a.c").is_file());
        assert!(folder.path().join("sub/b.c").is_file());
        assert_eq!(env_.size_improvement(), 0);
    }

    #[test]
    fn success_requires_ok_and_exit_zero() {
        let _scratch = ScratchDir::new("success_requires");
        write_file(path::Path::new("t.txt"), "hello\n");

        let folder = TempDir::new("cvise-test").unwrap();
        let all = vec![PathBuf::from("t.txt")];
        let mut env_ = TestEnvironment::new(
            None,
            1,
            PathBuf::from("/bin/true"),
            folder.path().to_path_buf(),
            PathBuf::from("t.txt"),
            &all,
        ).unwrap();

        assert!(!env_.success());
        env_.result = Some(PassResult::Ok);
        env_.exit_code = Some(1);
        assert!(!env_.success());
        env_.exit_code = Some(0);
        assert!(env_.success());
    }

    #[test]
    fn replace_test_case_swaps_contents() {
        let scratch = TempDir::new("replace_swaps").unwrap();
        let src = scratch.path().join("candidate");
        let dst = scratch.path().join("original");
        write_file(&src, "small\n");
        write_file(&dst, "much much bigger\n");

        replace_test_case(&src, &dst).unwrap();
        assert_eq!(read_file(&dst), "small\n");
    }

    #[test]
    fn files_equal_spots_differences() {
        let scratch = TempDir::new("files_equal").unwrap();
        let a = scratch.path().join("a");
        let b = scratch.path().join("b");
        write_file(&a, "same\n");
        write_file(&b, "same\n");
        assert!(files_equal(&a, &b).unwrap());

        write_file(&b, "diff\n");
        assert!(!files_equal(&a, &b).unwrap());
    }
}
