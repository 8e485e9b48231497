//! The parallel reduction engine.
//!
//! For one pass and one test case, the engine materializes candidate
//! variants from the pass's state space, evaluates them concurrently on a
//! pool of workers, and accepts the *leftmost* successful candidate: jobs
//! are numbered in enumeration order, completions are always processed
//! front-to-back, and a later success never wins while an earlier job is
//! still in flight. Given a deterministic pass and predicate, the reduction
//! is therefore independent of the worker count and of scheduling jitter.

use cache::{self, Cache};
use environment::{self, TestEnvironment};
use error;
use keys::KeyLogger;
use pass::{Pass, PassResult};
use pass::PassState;
use process::{kill_process_tree, ProcessEvent, ProcessEventKind, ProcessEventNotifier,
              RunOutcome};
use stats::PassStatistic;
use std::collections::{HashSet, VecDeque};
use std::env;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time;
use tempdir::TempDir;

/// Failed attempts after which a pass is declared stuck and abandoned.
pub const GIVEUP_CONSTANT: usize = 50000;

/// Timed-out candidates after which a pass is abandoned for a test case.
pub const MAX_TIMEOUTS: usize = 20;

/// At most this many `cvise_bug_*` workspace dumps are created per run.
pub const MAX_CRASH_DIRS: usize = 10;

/// At most this many `cvise_extra_*` saved variants are created per run.
pub const MAX_EXTRA_DIRS: usize = 25000;

/// If a pass grows the test case to this multiple of its starting size, the
/// rest of the pass is skipped.
pub const MAX_PASS_INCREASE_THRESHOLD: u64 = 3;

const TEMP_PREFIX: &'static str = "cvise-";
const BUG_DIR_PREFIX: &'static str = "cvise_bug_";
const EXTRA_DIR_PREFIX: &'static str = "cvise_extra_";

/// Everything the engine needs to know that isn't the test cases
/// themselves.
#[derive(Clone, Debug)]
pub struct Options {
    /// The interestingness test executable.
    pub test_script: path::PathBuf,
    /// Wall-clock timeout per candidate job, in seconds.
    pub timeout: u64,
    /// Keep temporary directories around instead of cleaning them up.
    pub save_temps: bool,
    /// How many candidate evaluations run concurrently.
    pub parallel_tests: usize,
    /// Disable the per-pass result cache.
    pub no_cache: bool,
    /// Disable the interactive `s`/`d` keys.
    pub skip_key_off: bool,
    /// Don't report pass bugs.
    pub silent_pass_bug: bool,
    /// Escalate pass bugs to fatal errors.
    pub die_on_pass_bug: bool,
    /// Print a unified diff of every accepted variant.
    pub print_diff: bool,
    /// Ignore candidates that shrink the test case by more than this many
    /// bytes in one step.
    pub max_improvement: Option<u64>,
    /// Never declare a pass stuck.
    pub no_give_up: bool,
    /// An exit code that makes the engine save (but not accept) a variant.
    pub also_interesting: Option<i32>,
    /// Skip passes until the one with this identity comes up.
    pub start_with_pass: Option<String>,
    /// Skip the rest of a pass after this many accepted transformations.
    pub skip_after_n_transforms: Option<usize>,
    /// Stop working on a test case once it has shrunk by this fraction of
    /// its original size.
    pub stopping_threshold: f64,
}

impl Options {
    /// Construct options with the defaults the CLI advertises.
    pub fn new<P: Into<path::PathBuf>>(test_script: P) -> Options {
        Options {
            test_script: test_script.into(),
            timeout: 300,
            save_temps: false,
            parallel_tests: default_parallelism(),
            no_cache: false,
            skip_key_off: false,
            silent_pass_bug: false,
            die_on_pass_bug: false,
            print_diff: false,
            max_improvement: None,
            no_give_up: false,
            also_interesting: None,
            start_with_pass: None,
            skip_after_n_transforms: None,
            stopping_threshold: 1.0,
        }
    }
}

/// One worker per physical core; hyperthreads mostly fight over the same
/// compiler-bound workloads.
pub fn default_parallelism() -> usize {
    ::std::cmp::max(1, ::num_cpus::get_physical())
}

/// How checking one completed candidate turned out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PassCheckingOutcome {
    /// The candidate is the winner for this batch.
    Accept,
    /// Not interesting; keep searching.
    Ignore,
    /// Stop the batch (pass exhausted, pass bug, or too many timeouts).
    QuitLoop,
}

/// A candidate job in the engine's FIFO.
struct Job {
    order: usize,
    folder: path::PathBuf,
    env: Option<TestEnvironment>,
    outcome: Option<PassCheckingOutcome>,
}

enum WorkerMessage {
    Run {
        order: usize,
        env: TestEnvironment,
        pass: Arc<Pass>,
        deadline: Option<time::Instant>,
    },
    Shutdown,
}

struct WorkerReply {
    worker: usize,
    order: usize,
    env: TestEnvironment,
}

/// A fixed-size pool of worker threads, one batch at a time.
///
/// Workers do not share memory with the engine beyond the channels: jobs go
/// out over per-worker senders, finished environments come back over one
/// shared reply channel, and subprocess pids flow over the process-event
/// queue.
struct WorkerPool {
    senders: Vec<mpsc::Sender<WorkerMessage>>,
    replies: mpsc::Receiver<WorkerReply>,
    handles: Vec<thread::JoinHandle<()>>,
    idle: Vec<usize>,
    stopping: Arc<AtomicBool>,
}

impl WorkerPool {
    fn spawn(
        count: usize,
        events: mpsc::Sender<ProcessEvent>,
    ) -> error::Result<WorkerPool> {
        let (reply_sender, reply_receiver) = mpsc::channel();
        let stopping = Arc::new(AtomicBool::new(false));

        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let (sender, receiver) = mpsc::channel();
            let replies = reply_sender.clone();
            let notifier =
                ProcessEventNotifier::new(events.clone(), Some(stopping.clone()));
            let handle = thread::Builder::new()
                .name(format!("cvise-worker-{}", id))
                .spawn(move || worker_loop(id, receiver, replies, notifier))?;
            senders.push(sender);
            handles.push(handle);
        }

        Ok(WorkerPool {
            senders: senders,
            replies: reply_receiver,
            handles: handles,
            idle: (0..count).collect(),
            stopping: stopping,
        })
    }

    fn dispatch(
        &mut self,
        order: usize,
        env: TestEnvironment,
        pass: Arc<Pass>,
        deadline: Option<time::Instant>,
    ) -> error::Result<()> {
        let worker = self.idle
            .pop()
            .expect("the engine never schedules more jobs than workers");
        self.senders[worker]
            .send(WorkerMessage::Run {
                order: order,
                env: env,
                pass: pass,
                deadline: deadline,
            })
            .map_err(|_| {
                error::Error::Thread(Box::new("a worker thread died unexpectedly"))
            })
    }

    /// Ask every worker to wind down. In-flight subprocess waits notice the
    /// stopping flag and kill their children.
    fn begin_shutdown(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        for sender in &self.senders {
            let _ = sender.send(WorkerMessage::Shutdown);
        }
    }

    fn join(self) -> error::Result<()> {
        for handle in self.handles {
            handle.join()?;
        }
        Ok(())
    }
}

fn worker_loop(
    me: usize,
    incoming: mpsc::Receiver<WorkerMessage>,
    replies: mpsc::Sender<WorkerReply>,
    notifier: ProcessEventNotifier,
) {
    for msg in incoming {
        match msg {
            WorkerMessage::Run {
                order,
                env,
                pass,
                deadline,
            } => {
                let env = env.run(&*pass, &notifier, deadline);
                if replies
                    .send(WorkerReply {
                        worker: me,
                        order: order,
                        env: env,
                    })
                    .is_err()
                {
                    return;
                }
            }
            WorkerMessage::Shutdown => return,
        }
    }
}

/// Drives passes over test cases: owns the worker pool, the temporary
/// directories, the per-pass cache, and the statistics.
pub struct TestManager {
    opts: Options,
    test_cases: Vec<path::PathBuf>,
    #[cfg(unix)]
    test_case_modes: Vec<(path::PathBuf, u32)>,
    orig_total_size: u64,
    cache: Cache,
    stats: PassStatistic,
    interrupted: Arc<AtomicBool>,
    events_sender: mpsc::Sender<ProcessEvent>,
    events_receiver: mpsc::Receiver<ProcessEvent>,
    pwd: path::PathBuf,
    start_with_pass: Option<String>,
    print_diff: bool,

    // Transient, per-pass state.
    root: Option<path::PathBuf>,
    current_test_case: path::PathBuf,
    state: Option<PassState>,
    jobs: VecDeque<Job>,
    used_folders: Vec<path::PathBuf>,
    timeout_count: usize,
    giveup_reported: bool,
    skip: bool,
}

impl fmt::Debug for TestManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TestManager")
            .field("test_cases", &self.test_cases)
            .field("root", &self.root)
            .field("current_test_case", &self.current_test_case)
            .field("in_flight", &self.jobs.len())
            .finish()
    }
}

impl TestManager {
    /// Validate the test cases and the interestingness test, and construct
    /// the engine.
    pub fn new(opts: Options, test_cases: Vec<path::PathBuf>) -> error::Result<TestManager> {
        use is_executable::IsExecutable;

        let pwd = env::current_dir()?;

        let mut opts = opts;
        if opts.test_script.is_relative() {
            opts.test_script = pwd.join(&opts.test_script);
        }
        if !opts.test_script.is_file() || !opts.test_script.is_executable() {
            return Err(error::Error::InvalidInterestingnessTest(
                opts.test_script.clone(),
            ));
        }

        let mut unique = Vec::new();
        for test_case in test_cases {
            if test_case.is_absolute() {
                return Err(error::Error::AbsolutePathTestCase(test_case));
            }
            check_usable(&test_case)?;
            if !unique.contains(&test_case) {
                unique.push(test_case);
            }
        }

        #[cfg(unix)]
        let modes = {
            use std::os::unix::fs::PermissionsExt;
            let mut modes = Vec::with_capacity(unique.len());
            for test_case in &unique {
                modes.push((
                    test_case.clone(),
                    fs::metadata(test_case)?.permissions().mode(),
                ));
            }
            modes
        };

        let orig_total_size = total_size(&unique)?;
        let start_with_pass = opts.start_with_pass.clone();
        let print_diff = opts.print_diff;

        let (events_sender, events_receiver) = mpsc::channel();

        Ok(TestManager {
            opts: opts,
            test_cases: unique,
            #[cfg(unix)]
            test_case_modes: modes,
            orig_total_size: orig_total_size,
            cache: Cache::new(),
            stats: PassStatistic::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
            events_sender: events_sender,
            events_receiver: events_receiver,
            pwd: pwd,
            start_with_pass: start_with_pass,
            print_diff: print_diff,
            root: None,
            current_test_case: path::PathBuf::new(),
            state: None,
            jobs: VecDeque::new(),
            used_folders: Vec::new(),
            timeout_count: 0,
            giveup_reported: false,
            skip: false,
        })
    }

    /// The flag a SIGINT handler should set to make the engine tear down
    /// and bail out at the next opportunity.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// The configured number of parallel candidate evaluations.
    pub fn parallel_tests(&self) -> usize {
        self.opts.parallel_tests
    }

    /// The test cases being reduced.
    pub fn test_cases(&self) -> &[path::PathBuf] {
        &self.test_cases
    }

    /// The per-pass statistics accumulated so far.
    pub fn statistics(&self) -> &PassStatistic {
        &self.stats
    }

    /// The combined byte size of every test case.
    pub fn total_file_size(&self) -> error::Result<u64> {
        total_size(&self.test_cases)
    }

    /// Copy every test case to `<name>.orig`, skipping backups that already
    /// exist.
    pub fn backup_test_cases(&self) -> error::Result<()> {
        for test_case in &self.test_cases {
            let mut name = test_case.as_os_str().to_os_string();
            name.push(".orig");
            let backup = path::PathBuf::from(name);
            if !backup.exists() {
                debug!(
                    "backing up {} to {}",
                    test_case.display(),
                    backup.display()
                );
                fs::copy(test_case, &backup)
                    .map_err(error::Error::TestCaseBackupFailure)?;
            }
        }
        Ok(())
    }

    /// Copy the unreduced test cases into a scratch directory and run the
    /// interestingness test there. Zero means sane; everything else is
    /// fatal, because a predicate that rejects the unreduced input can
    /// never accept anything.
    pub fn check_sanity(&mut self, verbose: bool) -> error::Result<()> {
        debug!("perform sanity check...");
        let first = match self.test_cases.first() {
            Some(tc) => tc.clone(),
            None => return Ok(()),
        };

        let folder = TempDir::new(&format!("{}sanity", TEMP_PREFIX))?
            .into_path();
        debug!("sanity check tmpdir = {}", folder.display());

        let env = TestEnvironment::new(
            None,
            0,
            self.opts.test_script.clone(),
            folder.clone(),
            first,
            &self.test_cases,
        )?;

        let notifier = ProcessEventNotifier::new(self.events_sender.clone(), None);
        let outcome = env.run_test(verbose, &notifier, None)?;
        self.kill_pid_queue();

        let sane = match outcome {
            RunOutcome::Finished { code, .. } => code == 0,
            _ => false,
        };

        if sane {
            rmfolder(&folder);
            debug!("sanity check successful");
            Ok(())
        } else {
            if !self.opts.save_temps {
                rmfolder(&folder);
            }
            Err(error::Error::InsaneTestCase(
                self.test_cases.clone(),
                self.opts.test_script.clone(),
            ))
        }
    }

    /// Run one pass over every test case, biggest first.
    pub fn run_pass(&mut self, pass: &Arc<Pass>) -> error::Result<()> {
        if let Some(start_with) = self.start_with_pass.clone() {
            if start_with == pass.name().as_ref() {
                self.start_with_pass = None;
            } else {
                debug!("skipping {} to get to {}", pass.name(), start_with);
                return Ok(());
            }
        }

        info!("===< {} >===", pass.name());

        self.create_root(pass)?;
        let pass_name = pass.name().into_owned();
        self.stats.start(&pass_name);

        let result = self.run_pass_on_test_cases(pass);

        self.restore_modes();
        self.stats.stop(&pass_name);
        self.remove_root();

        if result.is_ok() && self.interrupted.load(Ordering::SeqCst) {
            info!("Exiting now ...");
            return Err(error::Error::Interrupted);
        }

        result
    }

    fn run_pass_on_test_cases(&mut self, pass: &Arc<Pass>) -> error::Result<()> {
        let pass_name = pass.name().into_owned();
        let mut keys = if self.opts.skip_key_off {
            None
        } else {
            Some(KeyLogger::new())
        };

        for test_case in self.sorted_test_cases()? {
            self.current_test_case = test_case.clone();
            let starting_size = environment::size_on_disk(&test_case)?;
            if starting_size == 0 {
                continue;
            }

            // The pass is a pure function of the file's bytes, so if we
            // have seen this exact pre-image before, replay the post-image
            // and skip the whole enumeration.
            let mut pre_image = None;
            if !self.opts.no_cache && test_case.is_file() {
                let fp = cache::fingerprint(&slurp(&test_case)?);
                if let Some(post_image) = self.cache.lookup(&pass_name, &fp) {
                    write_bytes(&test_case, &post_image)?;
                    info!("cache hit for {}", test_case.display());
                    continue;
                }
                pre_image = Some(fp);
            }

            self.state = pass.new(&test_case)?;
            self.skip = false;
            let mut success_count = 0;

            while self.state.is_some() && !self.skip {
                if let Some(ref mut keys) = keys {
                    match keys.pressed_key() {
                        Some('s') => {
                            self.skip = true;
                            info!("****** skipping the rest of this pass ******");
                        }
                        Some('d') => {
                            info!("****** toggle print diff ******");
                            self.print_diff = !self.print_diff;
                        }
                        _ => {}
                    }
                }
                if self.skip {
                    break;
                }

                let success_env = self.run_parallel_tests(pass)?;
                self.kill_pid_queue();

                let succeeded = success_env.is_some();
                if let Some(env) = success_env {
                    self.process_result(pass, env)?;
                    success_count += 1;
                }

                // A pass that keeps inflating the test case is doing the
                // opposite of its job; cut it off.
                let size_now = environment::size_on_disk(&self.current_test_case)?;
                if size_now >= MAX_PASS_INCREASE_THRESHOLD * starting_size {
                    info!(
                        "skipping the rest of the pass (huge file increase, {}00%)",
                        MAX_PASS_INCREASE_THRESHOLD
                    );
                    self.release_folders();
                    break;
                }

                self.release_folders();

                if !succeeded {
                    break;
                }

                let total = self.total_file_size()?;
                let floor = (1.0 - self.opts.stopping_threshold) *
                    self.orig_total_size as f64;
                if (total as f64) <= floor {
                    info!("skipping the rest of the pass (stopping threshold reached)");
                    break;
                }

                let budget_reached = self.opts
                    .skip_after_n_transforms
                    .map_or(false, |n| success_count >= n) ||
                    pass.max_transforms().map_or(false, |n| success_count >= n);
                if budget_reached {
                    info!(
                        "skipping after {} successful transformations",
                        success_count
                    );
                    break;
                }

                if self.interrupted.load(Ordering::SeqCst) {
                    return Err(error::Error::Interrupted);
                }
            }

            self.state = None;
            self.release_folders();

            if let Some(fp) = pre_image {
                if test_case.is_file() {
                    let post_image = slurp(&test_case)?;
                    self.cache.insert(&pass_name, fp, post_image);
                }
            }
        }

        Ok(())
    }

    /// Evaluate candidates for the current state in parallel until a winner
    /// emerges or the pass gives out. Returns the winning environment, if
    /// any.
    fn run_parallel_tests(
        &mut self,
        pass: &Arc<Pass>,
    ) -> error::Result<Option<TestEnvironment>> {
        assert!(self.jobs.is_empty());

        self.timeout_count = 0;
        self.giveup_reported = false;

        let mut pool = WorkerPool::spawn(
            self.opts.parallel_tests,
            self.events_sender.clone(),
        )?;

        let result = self.parallel_loop(pass, &mut pool);

        pool.begin_shutdown();
        self.kill_pid_queue();
        let joined = pool.join();

        // Anything left in the FIFO (error paths) is abandoned.
        while let Some(job) = self.jobs.pop_front() {
            self.release_job(job);
        }

        joined?;
        result
    }

    fn parallel_loop(
        &mut self,
        pass: &Arc<Pass>,
        pool: &mut WorkerPool,
    ) -> error::Result<Option<TestEnvironment>> {
        let mut order = 1;
        loop {
            self.check_interrupted()?;

            let must_wait = self.jobs.len() >= self.opts.parallel_tests;
            self.poll_replies(pool, must_wait)?;

            if self.process_done_jobs(pass)? {
                return self.wait_for_first_success(pass, pool);
            }

            // There is room in the FIFO and the pass still has a state;
            // schedule the next candidate.
            let root = self.root
                .clone()
                .expect("run_pass always creates the pass root first");
            let folder = TempDir::new_in(&root, TEMP_PREFIX)?.into_path();
            let state = {
                let current = self.state
                    .as_ref()
                    .expect("the scheduling loop only runs with a live state");
                pass.clone_state(current)
            };
            let env = TestEnvironment::new(
                Some(state),
                order,
                self.opts.test_script.clone(),
                folder.clone(),
                self.current_test_case.clone(),
                &self.test_cases,
            )?;
            let deadline = time::Instant::now() +
                time::Duration::from_secs(self.opts.timeout);
            pool.dispatch(order, env, pass.clone(), Some(deadline))?;
            self.jobs.push_back(Job {
                order: order,
                folder: folder,
                env: None,
                outcome: None,
            });
            self.stats.add_executed(pass.name().as_ref());
            order += 1;

            let next = {
                let current = self.state.as_ref().unwrap();
                pass.advance(&self.current_test_case, current)?
            };
            match next {
                Some(state) => self.state = Some(state),
                None => {
                    // Enumeration drained; whatever is in flight decides.
                    self.state = None;
                    return self.wait_for_first_success(pass, pool);
                }
            }
        }
    }

    /// Pull finished environments off the reply channel and attach them to
    /// their FIFO entries. With `block`, waits until at least one new reply
    /// arrives.
    fn poll_replies(&mut self, pool: &mut WorkerPool, block: bool) -> error::Result<()> {
        let mut got_one = false;
        loop {
            while let Ok(reply) = pool.replies.try_recv() {
                self.attach_reply(pool, reply);
                got_one = true;
            }
            if !block || got_one {
                return Ok(());
            }

            self.check_interrupted()?;
            match pool.replies
                .recv_timeout(time::Duration::from_millis(100)) {
                Ok(reply) => {
                    self.attach_reply(pool, reply);
                    got_one = true;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(error::Error::Thread(
                        Box::new("every worker thread died"),
                    ));
                }
            }
        }
    }

    fn attach_reply(&mut self, pool: &mut WorkerPool, reply: WorkerReply) {
        pool.idle.push(reply.worker);
        match self.jobs.iter_mut().find(|job| job.order == reply.order) {
            Some(job) => job.env = Some(reply.env),
            // The job was cancelled while the worker was finishing up.
            None => debug!("dropping reply for cancelled candidate {}", reply.order),
        }
    }

    /// Walk the FIFO left to right, judging every completed candidate.
    /// Returns true when the batch should stop scheduling and pick its
    /// winner.
    fn process_done_jobs(&mut self, pass: &Arc<Pass>) -> error::Result<bool> {
        let mut quit = false;
        let mut kept = VecDeque::with_capacity(self.jobs.len());

        let jobs = ::std::mem::replace(&mut self.jobs, VecDeque::new());
        for mut job in jobs {
            if quit {
                // Everything behind the decision point is cancelled.
                self.release_job(job);
                continue;
            }

            let done = job.env.is_some();
            if !done {
                kept.push_back(job);
                continue;
            }

            if job.env.as_ref().map_or(false, |env| env.timed_out()) {
                warn!("Test timed out.");
                self.timeout_count += 1;
                self.save_extra_dir(&job.folder)?;
                if self.timeout_count >= MAX_TIMEOUTS {
                    warn!("Maximum number of timeouts were reached: {}", MAX_TIMEOUTS);
                    quit = true;
                }
                continue;
            }

            let outcome = self.check_pass_result(pass, job.env.as_ref().unwrap())?;
            match outcome {
                PassCheckingOutcome::Accept => {
                    job.outcome = Some(PassCheckingOutcome::Accept);
                    kept.push_back(job);
                    quit = true;
                }
                PassCheckingOutcome::Ignore => {
                    self.release_job(job);
                }
                PassCheckingOutcome::QuitLoop => {
                    self.release_job(job);
                    quit = true;
                }
            }
        }

        self.jobs = kept;
        Ok(quit)
    }

    /// Resolve the batch: wait for candidates in FIFO order and return the
    /// leftmost success. Everything after the winner is cancelled.
    fn wait_for_first_success(
        &mut self,
        pass: &Arc<Pass>,
        pool: &mut WorkerPool,
    ) -> error::Result<Option<TestEnvironment>> {
        loop {
            let front_done = match self.jobs.front() {
                None => return Ok(None),
                Some(job) => job.env.is_some(),
            };
            if !front_done {
                self.poll_replies(pool, true)?;
                continue;
            }

            let mut job = self.jobs
                .pop_front()
                .expect("checked non-empty just above");

            if job.env.as_ref().map_or(false, |env| env.timed_out()) {
                self.release_job(job);
                continue;
            }

            let outcome = match job.outcome {
                Some(outcome) => outcome,
                None => self.check_pass_result(pass, job.env.as_ref().unwrap())?,
            };

            if outcome == PassCheckingOutcome::Accept {
                let env = job.env.take().expect("done jobs carry an environment");
                self.used_folders.push(job.folder);

                // A winner makes every later candidate moot.
                while let Some(rest) = self.jobs.pop_front() {
                    self.release_job(rest);
                }
                return Ok(Some(env));
            }

            self.release_job(job);
        }
    }

    fn check_pass_result(
        &mut self,
        pass: &Arc<Pass>,
        env: &TestEnvironment,
    ) -> error::Result<PassCheckingOutcome> {
        if env.success() {
            if let Some(cap) = self.opts.max_improvement {
                if env.size_improvement() > cap as i64 {
                    debug!("Too large improvement: {} B", env.size_improvement());
                    return Ok(PassCheckingOutcome::Ignore);
                }
            }

            // An "accepted" variant that is byte-identical to its input
            // means the pass lied about transforming it.
            if environment::files_equal(&self.current_test_case, &env.test_case_path())? {
                if !self.opts.silent_pass_bug {
                    if !self.report_pass_bug(pass, env, "pass failed to modify the variant")? {
                        return Ok(PassCheckingOutcome::QuitLoop);
                    }
                }
                return Ok(PassCheckingOutcome::Ignore);
            }

            return Ok(PassCheckingOutcome::Accept);
        }

        self.stats.add_failure(pass.name().as_ref());

        match env.result() {
            Some(PassResult::Ok) => {
                // The transform worked but the predicate said no.
                if let Some(also_interesting) = self.opts.also_interesting {
                    if env.exit_code() == Some(also_interesting) {
                        self.save_extra_dir(&env.test_case_path())?;
                    }
                }
            }
            Some(PassResult::Stop) => return Ok(PassCheckingOutcome::QuitLoop),
            Some(PassResult::Error) => {
                if !self.opts.silent_pass_bug {
                    self.report_pass_bug(pass, env, "pass error")?;
                    return Ok(PassCheckingOutcome::QuitLoop);
                }
            }
            _ => {}
        }

        if !self.opts.no_give_up && env.order() > GIVEUP_CONSTANT {
            if !self.giveup_reported {
                self.report_pass_bug(pass, env, "pass got stuck")?;
                self.giveup_reported = true;
            }
            return Ok(PassCheckingOutcome::QuitLoop);
        }

        Ok(PassCheckingOutcome::Ignore)
    }

    /// Accept the winning candidate: replace the on-disk test case, advance
    /// the pass state, and report progress.
    fn process_result(
        &mut self,
        pass: &Arc<Pass>,
        env: TestEnvironment,
    ) -> error::Result<()> {
        if self.print_diff && self.current_test_case.is_file() {
            self.log_diff(&env.test_case_path());
        }

        environment::replace_test_case(&env.test_case_path(), &self.current_test_case)?;

        {
            let state = env.state()
                .expect("a winning candidate always carries its state");
            self.state = pass.advance_on_success(&self.current_test_case, state)?;
        }
        self.stats.add_success(pass.name().as_ref());

        let total = self.total_file_size()?;
        let pct = 100.0 - total as f64 * 100.0 / self.orig_total_size as f64;
        let mut notes = vec![
            format!("{:.1}%", pct),
            format!("{} bytes", total),
        ];
        let lines = self.total_line_count()?;
        if lines > 0 {
            notes.push(format!("{} lines", lines));
        }
        if self.test_cases.len() > 1 {
            notes.push(self.current_test_case.display().to_string());
        }
        info!("({})", notes.join(", "));

        Ok(())
    }

    fn log_diff(&self, candidate: &path::Path) {
        let output = process::Command::new("diff")
            .arg("-u")
            .arg(&self.current_test_case)
            .arg(candidate)
            .stdin(process::Stdio::null())
            .output();
        match output {
            Ok(output) => info!("{}", String::from_utf8_lossy(&output.stdout)),
            Err(e) => debug!("could not produce a diff: {}", e),
        }
    }

    /// Drain the pid-event queue and forcefully terminate every process
    /// that started but has not finished, including its descendants.
    pub fn kill_pid_queue(&mut self) {
        let mut active = HashSet::new();
        while let Ok(event) = self.events_receiver.try_recv() {
            match event.kind {
                ProcessEventKind::Started => {
                    active.insert(event.pid);
                }
                ProcessEventKind::Finished => {
                    active.remove(&event.pid);
                }
            }
        }
        for pid in active {
            kill_process_tree(pid);
        }
    }

    /// Dump the misbehaving pass's workspace under `cvise_bug_<NN>/` along
    /// with a description of what went wrong. Returns false once the crash
    /// dir budget is exhausted.
    fn report_pass_bug(
        &mut self,
        pass: &Arc<Pass>,
        env: &TestEnvironment,
        problem: &str,
    ) -> error::Result<bool> {
        if !self.opts.die_on_pass_bug {
            warn!(
                "{} has encountered a non fatal bug: {}",
                pass.name(),
                problem
            );
        }

        let crash_dir = match get_extra_dir(&self.pwd, BUG_DIR_PREFIX, MAX_CRASH_DIRS) {
            Some(dir) => dir,
            None => return Ok(false),
        };

        fs::create_dir(&crash_dir)?;
        env.dump(&crash_dir)?;

        let state_desc = env.state()
            .map(|s| pass.describe_state(s))
            .unwrap_or_else(|| "<none>".to_string());

        {
            use std::io::Write;
            let mut info = fs::File::create(crash_dir.join("PASS_BUG_INFO.TXT"))?;
            writeln!(info, "Package: {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
            writeln!(info, "System: {} {}", env::consts::OS, env::consts::ARCH)?;
            writeln!(info, "Pass: {}", pass.name())?;
            writeln!(info, "State: {}", state_desc)?;
            writeln!(info, "Problem: {}", problem)?;
        }

        if self.opts.die_on_pass_bug {
            Err(error::Error::PassBug {
                pass: pass.name().into_owned(),
                problem: problem.to_string(),
                state: state_desc,
                crash_dir: crash_dir,
            })
        } else {
            debug!(
                "Please consider tarring up {} and filing an issue so we can fix the bug.",
                crash_dir.display()
            );
            Ok(true)
        }
    }

    /// Move a notable candidate (or its whole folder) into a fresh
    /// `cvise_extra_*` directory for the user to look at later.
    fn save_extra_dir(&mut self, src: &path::Path) -> error::Result<()> {
        let extra_dir = match get_extra_dir(&self.pwd, EXTRA_DIR_PREFIX, MAX_EXTRA_DIRS) {
            Some(dir) => dir,
            // Enough clutter already.
            None => return Ok(()),
        };
        fs::create_dir(&extra_dir)?;
        let file_name = src.file_name().unwrap_or(src.as_os_str());
        move_into(src, &extra_dir.join(file_name))?;
        info!(
            "Created extra directory {} for you to look at later",
            extra_dir.display()
        );
        Ok(())
    }

    fn create_root(&mut self, pass: &Arc<Pass>) -> error::Result<()> {
        let pass_name = pass.name().replace("::", "-");
        let root = TempDir::new(&format!("{}{}", TEMP_PREFIX, pass_name))?
            .into_path();
        debug!("Creating pass root folder: {}", root.display());
        self.root = Some(root);
        Ok(())
    }

    fn remove_root(&mut self) {
        if let Some(root) = self.root.take() {
            if !self.opts.save_temps {
                rmfolder(&root);
            }
        }
    }

    fn release_job(&mut self, job: Job) {
        drop(job.env);
        if !self.opts.save_temps {
            rmfolder(&job.folder);
        }
    }

    fn release_folders(&mut self) {
        let folders = ::std::mem::replace(&mut self.used_folders, Vec::new());
        for folder in folders {
            if !self.opts.save_temps {
                rmfolder(&folder);
            }
        }
    }

    #[cfg(unix)]
    fn restore_modes(&self) {
        use std::os::unix::fs::PermissionsExt;
        for &(ref test_case, mode) in &self.test_case_modes {
            let _ = fs::set_permissions(test_case, fs::Permissions::from_mode(mode));
        }
    }

    #[cfg(not(unix))]
    fn restore_modes(&self) {}

    fn check_interrupted(&self) -> error::Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            Err(error::Error::Interrupted)
        } else {
            Ok(())
        }
    }

    fn sorted_test_cases(&self) -> error::Result<Vec<path::PathBuf>> {
        let mut with_sizes = Vec::with_capacity(self.test_cases.len());
        for test_case in &self.test_cases {
            with_sizes.push((environment::size_on_disk(test_case)?, test_case.clone()));
        }
        // Biggest first: the biggest test case has the most to gain.
        with_sizes.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(with_sizes.into_iter().map(|(_, tc)| tc).collect())
    }

    fn total_line_count(&self) -> error::Result<u64> {
        let mut lines = 0;
        for test_case in &self.test_cases {
            if !test_case.is_file() {
                continue;
            }
            let mut contents = Vec::new();
            fs::File::open(test_case)?.read_to_end(&mut contents)?;
            if let Ok(text) = String::from_utf8(contents) {
                lines += text.lines().filter(|l| !l.trim().is_empty()).count() as u64;
            }
        }
        Ok(lines)
    }
}

fn check_usable(test_case: &path::Path) -> error::Result<()> {
    if !test_case.exists() {
        return Err(error::Error::InvalidTestCase(
            test_case.to_path_buf(),
            "accessed",
        ));
    }

    let metadata = fs::metadata(test_case)?;
    if metadata.is_file() {
        if fs::File::open(test_case).is_err() {
            return Err(error::Error::InvalidTestCase(
                test_case.to_path_buf(),
                "read",
            ));
        }
        if fs::OpenOptions::new().append(true).open(test_case).is_err() {
            return Err(error::Error::InvalidTestCase(
                test_case.to_path_buf(),
                "written",
            ));
        }
    } else if fs::read_dir(test_case).is_err() {
        return Err(error::Error::InvalidTestCase(
            test_case.to_path_buf(),
            "read",
        ));
    }

    Ok(())
}

fn total_size(test_cases: &[path::PathBuf]) -> error::Result<u64> {
    let mut total = 0;
    for test_case in test_cases {
        total += environment::size_on_disk(test_case)?;
    }
    Ok(total)
}

fn slurp(path: &path::Path) -> error::Result<Vec<u8>> {
    let mut contents = Vec::new();
    fs::File::open(path)?.read_to_end(&mut contents)?;
    Ok(contents)
}

fn write_bytes(path: &path::Path, bytes: &[u8]) -> error::Result<()> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    Ok(())
}

/// Remove a temporary directory tree, tolerating races with its contents.
fn rmfolder(folder: &path::Path) {
    debug_assert!(
        folder.to_string_lossy().contains("cvise"),
        "refusing to remove a non-cvise directory"
    );
    let _ = fs::remove_dir_all(folder);
}

fn move_into(src: &path::Path, dst: &path::Path) -> error::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    // Rename fails across file systems; fall back to copy and delete.
    environment::copy_recursively(src, dst)?;
    if fs::metadata(src)?.is_dir() {
        fs::remove_dir_all(src)?;
    } else {
        fs::remove_file(src)?;
    }
    Ok(())
}

/// The first unused `<prefix><NN>` directory under `base`, zero-padded to
/// the width of `max_number`, or `None` once they are all taken.
fn get_extra_dir(
    base: &path::Path,
    prefix: &str,
    max_number: usize,
) -> Option<path::PathBuf> {
    let width = max_number.to_string().len();
    for i in 0..max_number + 1 {
        let dir = base.join(format!("{}{:0width$}", prefix, i, width = width));
        if !dir.exists() {
            return Some(dir);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::ScratchDir;

    #[test]
    fn options_have_sane_defaults() {
        let opts = Options::new("/bin/true");
        assert_eq!(opts.timeout, 300);
        assert!(opts.parallel_tests >= 1);
        assert!(!opts.save_temps);
        assert_eq!(opts.stopping_threshold, 1.0);
    }

    #[test]
    fn extra_dirs_are_numbered_and_bounded() {
        let scratch = ScratchDir::new("extra_dirs");

        let first = get_extra_dir(scratch.path(), "cvise_bug_", MAX_CRASH_DIRS).unwrap();
        assert_eq!(
            first.file_name().unwrap().to_str().unwrap(),
            "cvise_bug_00"
        );

        for i in 0..MAX_CRASH_DIRS + 1 {
            let dir = scratch.path().join(format!("cvise_bug_{:02}", i));
            fs::create_dir(dir).unwrap();
        }
        assert!(get_extra_dir(scratch.path(), "cvise_bug_", MAX_CRASH_DIRS).is_none());
    }

    #[test]
    fn extra_dir_width_matches_the_budget() {
        let scratch = ScratchDir::new("extra_dir_width");
        let dir = get_extra_dir(scratch.path(), "cvise_extra_", MAX_EXTRA_DIRS).unwrap();
        assert_eq!(
            dir.file_name().unwrap().to_str().unwrap(),
            "cvise_extra_00000"
        );
    }

    #[test]
    fn absolute_test_cases_are_rejected() {
        let _scratch = ScratchDir::new("absolute_rejected");
        ::test_utils::write_file(path::Path::new("t.txt"), "x\n");
        let script = ::test_utils::write_script("true.sh", "exit 0");

        let opts = Options::new(script);
        let absolute = env::current_dir().unwrap().join("t.txt");
        match TestManager::new(opts, vec![absolute]) {
            Err(error::Error::AbsolutePathTestCase(_)) => {}
            other => panic!("expected AbsolutePathTestCase, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_test_cases_are_rejected() {
        let _scratch = ScratchDir::new("missing_rejected");
        let script = ::test_utils::write_script("true.sh", "exit 0");

        let opts = Options::new(script);
        match TestManager::new(opts, vec![path::PathBuf::from("nope.c")]) {
            Err(error::Error::InvalidTestCase(..)) => {}
            other => panic!("expected InvalidTestCase, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn non_executable_predicates_are_rejected() {
        let _scratch = ScratchDir::new("predicate_rejected");
        ::test_utils::write_file(path::Path::new("t.txt"), "x\n");
        ::test_utils::write_file(path::Path::new("not-a-script"), "exit 0\n");

        let opts = Options::new("not-a-script");
        match TestManager::new(opts, vec![path::PathBuf::from("t.txt")]) {
            Err(error::Error::InvalidInterestingnessTest(_)) => {}
            other => {
                panic!(
                    "expected InvalidInterestingnessTest, got {:?}",
                    other.map(|_| ())
                )
            }
        }
    }
}
