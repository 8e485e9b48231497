//! The `cvise` executable.

#![deny(missing_docs)]

extern crate clap;
extern crate ctrlc;
extern crate cvise;
#[macro_use]
extern crate log;

use cvise::{config, driver, engine, error};
use std::fs;
use std::io::{self, Write};
use std::path;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time;

fn main() {
    if let Err(e) = try_main() {
        let stderr = io::stderr();
        let mut stderr = stderr.lock();
        let _ = writeln!(&mut stderr, "Error: {}", e);
        process::exit(1);
    }
}

/// Prefixes every record with the time elapsed since startup, the way
/// long-running reductions are usually eyeballed, and writes to stderr or
/// to a log file.
struct DeltaLogger {
    start: time::Instant,
    level: log::LevelFilter,
    sink: Mutex<Box<Write + Send>>,
}

impl log::Log for DeltaLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.start.elapsed().as_secs();
        let level = match record.level() {
            log::Level::Error => "ERROR",
            log::Level::Warn => "WARNING",
            log::Level::Info => "INFO",
            log::Level::Debug | log::Level::Trace => "DEBUG",
        };
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(
                sink,
                "{}:{:02}:{:02} {} {}",
                elapsed / 3600,
                elapsed % 3600 / 60,
                elapsed % 60,
                level,
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

fn install_logger(level: log::LevelFilter, log_file: Option<&str>) -> error::Result<()> {
    let sink: Box<Write + Send> = match log_file {
        Some(path) => Box::new(fs::OpenOptions::new().create(true).append(true).open(path)?),
        None => Box::new(io::stderr()),
    };

    let logger = DeltaLogger {
        start: time::Instant::now(),
        level: level,
        sink: Mutex::new(sink),
    };

    log::set_max_level(level);
    log::set_boxed_logger(Box::new(logger))
        .map_err(|_| error::Error::Thread(Box::new("logger already installed")))
}

fn parse_args() -> clap::ArgMatches<'static> {
    clap::App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .after_help(
            "available shortcuts:\n  \
             s - skip execution of the current pass\n  \
             d - toggle the --print-diff option",
        )
        .arg(
            clap::Arg::with_name("interestingness_test")
                .help("Executable to check interestingness of test cases.")
                .required_unless("list-passes")
        )
        .arg(
            clap::Arg::with_name("test_case")
                .multiple(true)
                .help("The test cases to reduce, in place.")
                .required_unless("list-passes")
        )
        .arg(
            clap::Arg::with_name("n")
                .short("n")
                .long("n")
                .takes_value(true)
                .value_name("NUM")
                .validator(|a| {
                    let num = a.parse::<usize>().map_err(|e| format!("{}", e))?;
                    if num > 0 {
                        Ok(())
                    } else {
                        Err("NUM must be a number greater than 0".into())
                    }
                })
                .help(
                    "Number of parallel interestingness tests. Defaults to the \
                     number of physical cores."
                )
        )
        .arg(
            clap::Arg::with_name("timeout")
                .long("timeout")
                .takes_value(true)
                .value_name("SECONDS")
                .validator(validate_number)
                .help("Interestingness test timeout in seconds. Defaults to 300.")
        )
        .arg(
            clap::Arg::with_name("save-temps")
                .long("save-temps")
                .help("Don't delete /tmp/cvise-xxxxxx directories on termination.")
        )
        .arg(
            clap::Arg::with_name("tidy")
                .long("tidy")
                .help("Do not make a backup copy of each file to reduce as file.orig.")
        )
        .arg(
            clap::Arg::with_name("no-cache")
                .long("no-cache")
                .help("Don't cache behavior of passes.")
        )
        .arg(
            clap::Arg::with_name("skip-initial-passes")
                .long("skip-initial-passes")
                .help("Skip initial passes (useful if the input is already partially reduced).")
        )
        .arg(
            clap::Arg::with_name("no-give-up")
                .long("no-give-up")
                .help("Don't give up on a pass that hasn't made progress for a long time.")
        )
        .arg(
            clap::Arg::with_name("max-improvement")
                .long("max-improvement")
                .takes_value(true)
                .value_name("BYTES")
                .validator(validate_number)
                .help(
                    "Largest improvement in file size from a single transformation \
                     that should be accepted (useful only to slow the reduction down)."
                )
        )
        .arg(
            clap::Arg::with_name("also-interesting")
                .long("also-interesting")
                .takes_value(true)
                .value_name("EXIT_CODE")
                .validator(|a| {
                    a.parse::<i32>().map(|_| ()).map_err(|e| format!("{}", e))
                })
                .help(
                    "A process exit code (somewhere in the range 64-113 would be \
                     usual) that, when returned by the interestingness test, will \
                     cause a copy of the variant to be saved."
                )
        )
        .arg(
            clap::Arg::with_name("skip-after-n-transforms")
                .long("skip-after-n-transforms")
                .takes_value(true)
                .value_name("N")
                .validator(validate_number)
                .help("Skip each pass after N successful transformations.")
        )
        .arg(
            clap::Arg::with_name("stopping-threshold")
                .long("stopping-threshold")
                .takes_value(true)
                .value_name("FRACTION")
                .validator(|a| {
                    let num = a.parse::<f64>().map_err(|e| format!("{}", e))?;
                    if num >= 0.0 && num <= 1.0 {
                        Ok(())
                    } else {
                        Err("FRACTION must be between 0.0 and 1.0".into())
                    }
                })
                .help(
                    "Stop reducing a test case once it has been reduced by this \
                     fraction of its original size."
                )
        )
        .arg(
            clap::Arg::with_name("pass-group")
                .long("pass-group")
                .takes_value(true)
                .value_name("NAME")
                .possible_values(&["all"])
                .conflicts_with("pass-group-file")
                .help("Set of passes used during the reduction.")
        )
        .arg(
            clap::Arg::with_name("pass-group-file")
                .long("pass-group-file")
                .takes_value(true)
                .value_name("FILE")
                .help("JSON file defining a custom pass group.")
        )
        .arg(
            clap::Arg::with_name("remove-pass")
                .long("remove-pass")
                .takes_value(true)
                .value_name("PASSES")
                .help(
                    "Remove all instances of the specified passes from the \
                     schedule (comma-separated)."
                )
        )
        .arg(
            clap::Arg::with_name("start-with-pass")
                .long("start-with-pass")
                .takes_value(true)
                .value_name("PASS")
                .help("Start with the specified pass.")
        )
        .arg(
            clap::Arg::with_name("list-passes")
                .long("list-passes")
                .help("Print all available passes and exit.")
        )
        .arg(
            clap::Arg::with_name("print-diff")
                .long("print-diff")
                .help("Show changes made by transformations, for debugging.")
        )
        .arg(
            clap::Arg::with_name("die-on-pass-bug")
                .long("die-on-pass-bug")
                .help("Terminate if a pass encounters an otherwise non-fatal problem.")
        )
        .arg(
            clap::Arg::with_name("shaddap")
                .long("shaddap")
                .help("Suppress output about non-fatal internal errors.")
        )
        .arg(
            clap::Arg::with_name("skip-key-off")
                .long("skip-key-off")
                .help("Disable skipping the rest of the current pass when 's' is pressed.")
        )
        .arg(
            clap::Arg::with_name("sllooww")
                .long("sllooww")
                .help("Try harder to reduce, but perhaps take a long time to do so.")
        )
        .arg(
            clap::Arg::with_name("not-c")
                .long("not-c")
                .help(
                    "Don't run passes that are specific to C and C++; use this \
                     mode for reducing other languages."
                )
        )
        .arg(
            clap::Arg::with_name("renaming")
                .long("renaming")
                .help("Enable all renaming passes (disabled by default).")
        )
        .arg(
            clap::Arg::with_name("debug")
                .long("debug")
                .help("Print debug information (alias for --log-level=DEBUG).")
        )
        .arg(
            clap::Arg::with_name("log-level")
                .long("log-level")
                .takes_value(true)
                .possible_values(&["INFO", "DEBUG", "WARNING", "ERROR"])
                .help("Define the verbosity of the logged events.")
        )
        .arg(
            clap::Arg::with_name("log-file")
                .long("log-file")
                .takes_value(true)
                .value_name("FILE")
                .help("Log events into FILE instead of stderr, appending.")
        )
        .get_matches()
}

fn validate_number(a: String) -> Result<(), String> {
    a.parse::<u64>().map(|_| ()).map_err(|e| format!("{}", e))
}

fn try_main() -> error::Result<()> {
    let args = parse_args();

    let level = if args.is_present("debug") {
        log::LevelFilter::Debug
    } else {
        match args.value_of("log-level") {
            Some("DEBUG") => log::LevelFilter::Debug,
            Some("WARNING") => log::LevelFilter::Warn,
            Some("ERROR") => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        }
    };
    install_logger(level, args.value_of("log-file"))?;

    let mut filter = config::PassFilter::default();
    if args.is_present("sllooww") {
        filter.options.insert(config::PassOption::Slow);
    }
    if cfg!(windows) {
        filter.options.insert(config::PassOption::Windows);
    }
    filter.not_c = args.is_present("not-c");
    filter.renaming = args.is_present("renaming");
    if let Some(removed) = args.value_of("remove-pass") {
        for name in removed.split(',') {
            filter.remove_passes.insert(name.trim().to_string());
        }
    }

    let passes = match args.value_of("pass-group-file") {
        Some(path) => config::load_pass_group_file(path::Path::new(path), &filter)?,
        None => config::parse_pass_group(config::DEFAULT_PASS_GROUP, &filter)?,
    };

    if args.is_present("list-passes") {
        println!("Available passes:");
        print!("{}", passes);
        return Ok(());
    }

    let test_script = args.value_of("interestingness_test")
        .expect("clap enforces the interestingness test unless --list-passes");
    let test_cases: Vec<path::PathBuf> = args.values_of("test_case")
        .expect("clap enforces at least one test case unless --list-passes")
        .map(path::PathBuf::from)
        .collect();

    let mut options = engine::Options::new(test_script);
    if let Some(n) = args.value_of("n") {
        options.parallel_tests = n.parse().expect("validated by clap");
    }
    if let Some(timeout) = args.value_of("timeout") {
        options.timeout = timeout.parse().expect("validated by clap");
    }
    options.save_temps = args.is_present("save-temps");
    options.no_cache = args.is_present("no-cache");
    options.skip_key_off = args.is_present("skip-key-off");
    options.silent_pass_bug = args.is_present("shaddap");
    options.die_on_pass_bug = args.is_present("die-on-pass-bug");
    options.print_diff = args.is_present("print-diff");
    options.no_give_up = args.is_present("no-give-up");
    if let Some(max) = args.value_of("max-improvement") {
        options.max_improvement = Some(max.parse().expect("validated by clap"));
    }
    if let Some(code) = args.value_of("also-interesting") {
        options.also_interesting = Some(code.parse().expect("validated by clap"));
    }
    if let Some(n) = args.value_of("skip-after-n-transforms") {
        options.skip_after_n_transforms = Some(n.parse().expect("validated by clap"));
    }
    if let Some(threshold) = args.value_of("stopping-threshold") {
        options.stopping_threshold = threshold.parse().expect("validated by clap");
    }
    if let Some(start_with) = args.value_of("start-with-pass") {
        let known = passes.all().iter().any(
            |p| p.name().as_ref() == start_with,
        );
        if !known {
            error!(
                "Cannot find pass called '{}'. Use --list-passes for the list of \
                 available passes.",
                start_with
            );
            process::exit(1);
        }
        options.start_with_pass = Some(start_with.to_string());
    }

    let manager = engine::TestManager::new(options, test_cases)?;

    let interrupted = manager.interrupt_flag();
    // Failing to install the handler only costs us graceful shutdown.
    let _ = ctrlc::set_handler(move || { interrupted.store(true, Ordering::SeqCst); });

    let mut reduction = driver::Reduction::new(
        manager,
        args.is_present("tidy"),
        args.is_present("skip-initial-passes"),
    );
    reduction.reduce(&passes)
}
