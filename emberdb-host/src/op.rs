//! # AsyncOp
//!
//! Every asynchronous call is an op with two phases:
//!
//! 1. [`AsyncOp::execute`] runs on a worker thread. It may block on engine
//!    I/O and must only touch the op's own payload and the engine.
//! 2. [`AsyncOp::complete`] runs afterwards on the host thread, where it may
//!    create host objects (handles). Its result goes to the user callback.
//!
//! The op value owns everything the call needs: engine handles, pinned
//! buffers, decoded options. It is dropped only after the callback has
//! returned, so nothing it references is released while the call is in
//! flight.

use tokio::sync::mpsc::UnboundedSender;

use crate::error::Error;
use crate::host::HostLoop;

/// Identifies one submitted op.
pub(crate) type OpId = u64;

/// A host callback. Results are delivered exactly once.
pub type Callback<T> = Box<dyn FnOnce(Result<T, Error>)>;

pub(crate) trait AsyncOp: Send + 'static {
    /// What the callback receives on success.
    type Output: 'static;

    /// Name used in logs.
    const NAME: &'static str;

    /// The worker phase.
    fn execute(&mut self);

    /// The host phase. Runs strictly after [`AsyncOp::execute`].
    fn complete(&mut self, host: &HostLoop) -> Result<Self::Output, Error>;
}

/// Posts the op's id to the completion queue when dropped, once the op has
/// been handed back. A panicking worker phase is caught and the op still
/// comes back, so its pins are released on the host thread after the
/// callback has seen `Internal`.
pub(crate) struct ReadySignal {
    pub(crate) id: OpId,
    pub(crate) tx: UnboundedSender<OpId>,
}

impl Drop for ReadySignal {
    fn drop(&mut self) {
        // The receiver lives as long as the host loop; a send error means
        // the loop is gone and nobody is waiting for this op.
        let _ = self.tx.send(self.id);
    }
}
