//! The interface every reduction pass implements, and the binary-search
//! state most of them drive their enumeration with.

use error;
use process::ProcessEventNotifier;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::path;

/// The state a pass threads through its enumeration of candidates.
///
/// Only the pass that created a state ever looks inside it; the engine's job
/// is just to hand states back to the pass's methods, snapshot them when it
/// fans candidate jobs out to workers, and replace them when the pass
/// advances. `None` in an `Option<PassState>` always means "this pass has no
/// more transformations to offer for this test case".
///
/// Normally we would use an associated `Self::State` type instead of
/// `Box<Any + Send>`. However, the `Pass` trait needs to be object safe so
/// that pass groups can mix heterogeneous passes, which precludes associated
/// types. The engine only ever calls a pass with state that the very same
/// pass created, so it is always OK for a pass to downcast and `unwrap`
/// these boxes.
pub type PassState = Box<Any + Send>;

/// What a single invocation of `Pass::transform` produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassResult {
    /// The transform wrote a candidate variant in place.
    Ok,

    /// Nothing applicable at this state; the engine skips the candidate and
    /// keeps advancing.
    Invalid,

    /// The pass is exhausted for this test case.
    Stop,

    /// The transform malfunctioned. The engine reports a pass bug and
    /// abandons the pass on this test case.
    Error,
}

/// A reduction pass enumerates candidate transformations of a test case
/// through an opaque, advanceable state.
///
/// Example strategies that are implemented as different passes:
///
/// * Removing chunks of lines, halving the chunk size as candidates fail
/// * Removing comments, preprocessor directives, or blank lines
/// * Deleting the contents of balanced `{...}`/`(...)` groups
/// * Shrinking integer literals digit by digit
///
/// The contract with the engine:
///
/// * `new` and `advance_on_success` are only called while the on-disk test
///   case is the currently accepted variant.
/// * `transform` produces its candidate **in place** at the path it is
///   given, which is always a private copy in a fresh temporary directory.
/// * `transform` may call out to subprocesses, but must start them through
///   the supplied `ProcessEventNotifier` so that the engine can terminate
///   them when the candidate is cancelled or times out.
/// * A transform that returns `Ok` must actually have changed the file;
///   returning `Ok` with unmodified output is a pass bug. The engine
///   tolerates and reports it rather than crashing.
pub trait Pass: fmt::Debug + Send + Sync {
    /// Get this pass's stable identity, e.g. `LinesPass` or `IntsPass::a`.
    ///
    /// Used as the cache key and as the pass's name in statistics and logs,
    /// so it must be unique across the pass group.
    fn name(&self) -> Cow<str>;

    /// Do the external tools this pass relies on exist?
    ///
    /// A `false` answer is not fatal; the pass is skipped with a warning.
    fn check_prerequisites(&self) -> bool {
        true
    }

    /// Initialize enumeration over the given test case.
    ///
    /// Returns `None` when the pass has nothing to do at all, e.g. a
    /// comment-removal pass looking at a file without comments.
    fn new(&self, test_case: &path::Path) -> error::Result<Option<PassState>>;

    /// Move to the next candidate after a failed or skipped attempt.
    ///
    /// `None` terminates enumeration for this test case.
    fn advance(
        &self,
        test_case: &path::Path,
        state: &PassState,
    ) -> error::Result<Option<PassState>>;

    /// Move to the next candidate after the engine accepted the previous
    /// one. The test case on disk has already been replaced with the
    /// accepted variant.
    fn advance_on_success(
        &self,
        test_case: &path::Path,
        state: &PassState,
    ) -> error::Result<Option<PassState>>;

    /// Clone a state previously returned by this pass.
    ///
    /// The engine snapshots the base state for every candidate job it
    /// creates, because jobs diverge and complete out of order.
    fn clone_state(&self, state: &PassState) -> PassState;

    /// Produce a candidate in place at `test_case`, which is a private copy
    /// of the current test case.
    ///
    /// The returned state may be a refinement of the state that was passed
    /// in; the engine hands it to `advance_on_success` if this candidate
    /// wins.
    fn transform(
        &self,
        test_case: &path::Path,
        state: PassState,
        notifier: &ProcessEventNotifier,
    ) -> error::Result<(PassResult, PassState)>;

    /// Render the given state for pass-bug reports and debug logs.
    fn describe_state(&self, _state: &PassState) -> String {
        "<opaque state>".into()
    }

    /// An optional cap on the number of accepted transformations per test
    /// case, for passes that stop being productive after a few wins.
    fn max_transforms(&self) -> Option<usize> {
        None
    }
}

/// The state shared by passes that enumerate N independent instances and
/// shrink by deleting progressively smaller chunks of them.
///
/// The half-open range `[index, min(index + chunk, instances))` designates
/// the instances targeted by the current candidate. The chunk starts out
/// covering every instance, so the first candidate is the most aggressive
/// deletion possible; every time the index wraps around, the chunk halves,
/// until single-instance candidates have all been tried. Deleting large
/// blocks first converges fast on compressible inputs, and the halving gives
/// the familiar delta-debugging `O(log n)` expected depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryState {
    instances: usize,
    chunk: usize,
    index: usize,
}

impl fmt::Display for BinaryState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BinaryState: {}-{} of {} instances",
            self.index,
            self.end(),
            self.instances
        )
    }
}

impl BinaryState {
    /// Begin enumerating over `instances` instances. Returns `None` when
    /// there is nothing to enumerate.
    pub fn create(instances: usize) -> Option<BinaryState> {
        if instances == 0 {
            return None;
        }
        Some(BinaryState {
            instances: instances,
            chunk: instances,
            index: 0,
        })
    }

    /// The total number of instances being enumerated.
    pub fn instances(&self) -> usize {
        self.instances
    }

    /// The left edge of the current chunk.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The current chunk size.
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// The exclusive right edge of the range targeted by the current
    /// candidate.
    pub fn end(&self) -> usize {
        ::std::cmp::min(self.index + self.chunk, self.instances)
    }

    /// Slide to the next chunk; on wraparound, halve the chunk and start
    /// over from the left. Once the chunk underflows, enumeration is over.
    pub fn advance(mut self) -> Option<BinaryState> {
        self.index += self.chunk;
        if self.index >= self.instances {
            self.chunk /= 2;
            if self.chunk < 1 {
                return None;
            }
            debug!("granularity reduced to {}", self.chunk);
            self.index = 0;
        }
        Some(self)
    }

    /// The previous candidate was accepted, leaving `instances` instances
    /// behind. Keep the current position when it is still in range,
    /// otherwise advance.
    pub fn advance_on_success(mut self, instances: usize) -> Option<BinaryState> {
        if instances == 0 {
            return None;
        }
        self.instances = instances;
        if self.index >= self.instances {
            self.advance()
        } else {
            Some(self)
        }
    }
}
