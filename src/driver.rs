//! Composing passes into a whole reduction: sanity check and backups up
//! front, the initial passes once, the main passes until a full sweep stops
//! making progress, and the cleanup passes last.

use config::PassGroup;
use engine::TestManager;
use error;
use pass::Pass;
use std::sync::Arc;

/// The top-level reduction driver.
#[derive(Debug)]
pub struct Reduction {
    manager: TestManager,
    tidy: bool,
    skip_initial: bool,
}

impl Reduction {
    /// Wrap an engine into a driver.
    ///
    /// With `tidy`, no `.orig` backups are made. With `skip_initial`, the
    /// `first` pass category is not run; useful when the input has been
    /// partially reduced already.
    pub fn new(manager: TestManager, tidy: bool, skip_initial: bool) -> Reduction {
        Reduction {
            manager: manager,
            tidy: tidy,
            skip_initial: skip_initial,
        }
    }

    /// A borrow of the underlying engine.
    pub fn manager(&self) -> &TestManager {
        &self.manager
    }

    /// Run the whole reduction with the given pass schedule.
    pub fn reduce(&mut self, passes: &PassGroup) -> error::Result<()> {
        // An input with nothing in it leaves the passes nothing to do;
        // reaching zero bytes *during* reduction, on the other hand, is the
        // best possible outcome.
        if self.manager.total_file_size()? == 0 {
            return Err(error::Error::ZeroSize(
                self.manager.test_cases().to_vec(),
            ));
        }

        check_prerequisites(passes);

        self.manager.check_sanity(true)?;

        info!(
            "running {} interestingness test{} in parallel",
            self.manager.parallel_tests(),
            if self.manager.parallel_tests() == 1 {
                ""
            } else {
                "s"
            }
        );

        if !self.tidy {
            self.manager.backup_test_cases()?;
        }

        if !self.skip_initial {
            info!("INITIAL PASSES");
            self.run_additional_passes(&passes.first)?;
        }

        info!("MAIN PASSES");
        self.run_main_passes(&passes.main)?;

        info!("CLEANUP PASSES");
        self.run_additional_passes(&passes.last)?;

        info!("===================== done ====================");
        self.manager.statistics().log_summary();
        Ok(())
    }

    /// Run a one-shot pass category in declared order, skipping passes
    /// whose prerequisites are missing.
    fn run_additional_passes(&mut self, passes: &[Arc<Pass>]) -> error::Result<()> {
        for pass in passes {
            if !pass.check_prerequisites() {
                error!("Skipping pass {}", pass.name());
            } else {
                self.manager.run_pass(pass)?;
            }
        }
        Ok(())
    }

    /// Loop the main passes until a whole sweep fails to shrink the
    /// test-case set.
    fn run_main_passes(&mut self, passes: &[Arc<Pass>]) -> error::Result<()> {
        loop {
            let size_before = self.manager.total_file_size()?;

            for pass in passes {
                if !pass.check_prerequisites() {
                    error!("Skipping pass {}", pass.name());
                } else {
                    self.manager.run_pass(pass)?;
                }
            }

            let size_now = self.manager.total_file_size()?;
            info!(
                "Termination check: size was {}; now {}",
                size_before, size_now
            );
            if size_now >= size_before {
                return Ok(());
            }
        }
    }
}

/// Log (but tolerate) missing prerequisites before the reduction starts, so
/// the user learns up front which passes will be skipped.
fn check_prerequisites(passes: &PassGroup) {
    for pass in passes.all() {
        if !pass.check_prerequisites() {
            error!("Prereqs not found for pass {}", pass.name());
        }
    }
}
