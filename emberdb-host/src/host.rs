//! The single-threaded host loop.
//!
//! A [`HostLoop`] owns a worker pool and a completion queue. Async calls
//! return as soon as their op is submitted; [`HostLoop::run`] then waits for
//! completions and fires callbacks on the calling thread, one at a time, in
//! the order the ops finish.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, debug_span, error, warn};

use crate::config::HostConfig;
use crate::error::Error;
use crate::op::{AsyncOp, Callback, OpId, ReadySignal};

type Completion = Box<dyn FnOnce(&HostLoop)>;

/// Receives the payload of a panic raised by a host callback.
pub type FatalHandler = Rc<dyn Fn(Box<dyn Any + Send>)>;

struct HostInner {
    runtime: Runtime,
    completions_tx: UnboundedSender<OpId>,
    completions_rx: RefCell<UnboundedReceiver<OpId>>,
    in_flight: RefCell<HashMap<OpId, Completion>>,
    next_id: Cell<OpId>,
    running: Cell<bool>,
    fatal_handler: RefCell<Option<FatalHandler>>,
}

/// The host event loop. Cheap to clone; clones share one loop.
///
/// A `HostLoop` and every handle created through it belong to the thread
/// that created the loop.
#[derive(Clone)]
pub struct HostLoop {
    inner: Rc<HostInner>,
}

impl std::fmt::Debug for HostLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLoop")
            .field("pending", &self.pending())
            .finish()
    }
}

pub(crate) fn create_runtime(config: &HostConfig) -> Result<Runtime, Error> {
    config.validate()?;
    let mut builder = RuntimeBuilder::new_multi_thread();
    builder
        .worker_threads(1)
        .max_blocking_threads(config.worker_threads)
        .thread_name(config.thread_name.clone());
    if let Some(size) = config.thread_stack_size {
        builder.thread_stack_size(size);
    }
    builder
        .build()
        .map_err(|e| Error::internal(format!("failed to create worker pool: {e}")))
}

impl HostLoop {
    /// Starts a loop with a worker pool sized by `config`.
    ///
    /// ## Errors
    /// - `BadArgument` if the configuration is invalid.
    /// - `Internal` if the worker pool cannot be started.
    pub fn new(config: &HostConfig) -> Result<Self, Error> {
        let runtime = create_runtime(config)?;
        let (completions_tx, completions_rx) = unbounded_channel();
        debug!(
            "host loop started [worker_threads={}, thread_name={}]",
            config.worker_threads, config.thread_name
        );
        Ok(Self {
            inner: Rc::new(HostInner {
                runtime,
                completions_tx,
                completions_rx: RefCell::new(completions_rx),
                in_flight: RefCell::new(HashMap::new()),
                next_id: Cell::new(0),
                running: Cell::new(false),
                fatal_handler: RefCell::new(None),
            }),
        })
    }

    /// Number of submitted ops whose callback has not run yet.
    pub fn pending(&self) -> usize {
        self.inner.in_flight.borrow().len()
    }

    /// Replaces the handler for panics raised by callbacks. Without one, the
    /// panic is logged and resumed out of [`HostLoop::run`].
    pub fn set_fatal_handler(&self, handler: impl Fn(Box<dyn Any + Send>) + 'static) {
        *self.inner.fatal_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Runs until no op is pending, including ops submitted by callbacks.
    pub fn run(&self) {
        if self.inner.running.get() {
            warn!("HostLoop::run called from a callback; ignoring");
            return;
        }
        while self.run_once() {}
    }

    /// Waits for the next completion and runs it. Returns `false` without
    /// waiting when nothing is pending.
    pub fn run_once(&self) -> bool {
        if self.inner.running.get() {
            warn!("HostLoop::run_once called from a callback; ignoring");
            return false;
        }
        if self.pending() == 0 {
            return false;
        }

        let Some(id) = self.inner.completions_rx.borrow_mut().blocking_recv() else {
            // The loop holds a sender, so the queue never closes.
            return false;
        };
        let Some(completion) = self.inner.in_flight.borrow_mut().remove(&id) else {
            warn!("completion for unknown op [id={}]", id);
            return true;
        };

        self.inner.running.set(true);
        let _reset = ResetRunning(&self.inner.running);
        completion(self);
        true
    }

    fn next_id(&self) -> OpId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        id
    }

    /// Runs `f`, routing a panic to the fatal handler.
    fn invoke(&self, f: impl FnOnce()) {
        let Err(panic) = catch_unwind(AssertUnwindSafe(f)) else {
            return;
        };
        let handler = self.inner.fatal_handler.borrow().clone();
        match handler {
            Some(handler) => handler(panic),
            None => {
                error!("host callback panicked");
                resume_unwind(panic)
            }
        }
    }

    /// Submits `op`. Its worker phase starts right away; its host phase and
    /// `callback` run from [`HostLoop::run`].
    pub(crate) fn submit<O: AsyncOp>(&self, mut op: O, callback: Option<Callback<O::Output>>) {
        let id = self.next_id();
        let (result_tx, mut result_rx) = oneshot::channel::<(O, bool)>();
        let signal = ReadySignal {
            id,
            tx: self.inner.completions_tx.clone(),
        };
        let span = debug_span!("async_op", op = O::NAME, id);

        let completion: Completion = Box::new(move |host: &HostLoop| {
            let mut op = match result_rx.try_recv() {
                Ok((op, true)) => op,
                outcome => {
                    error!("worker phase panicked [op={}, id={}]", O::NAME, id);
                    if let Some(callback) = callback {
                        let err = Error::internal(format!("{} worker phase panicked", O::NAME));
                        host.invoke(move || callback(Err(err)));
                    }
                    // The op and everything it pins outlive the callback.
                    drop(outcome);
                    return;
                }
            };
            let result = op.complete(host);
            debug!("op completed [op={}, id={}, ok={}]", O::NAME, id, result.is_ok());
            if let Some(callback) = callback {
                host.invoke(move || callback(result));
            }
            drop(op);
        });
        self.inner.in_flight.borrow_mut().insert(id, completion);

        self.inner.runtime.spawn_blocking(move || {
            let _signal = signal;
            let _enter = span.enter();
            let executed = catch_unwind(AssertUnwindSafe(|| op.execute())).is_ok();
            let _ = result_tx.send((op, executed));
        });
    }
}

struct ResetRunning<'a>(&'a Cell<bool>);

impl Drop for ResetRunning<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
