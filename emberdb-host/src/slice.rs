//! Moving bytes between host buffers and the engine.
//!
//! Host buffers are immutable, reference-counted [`Bytes`], so viewing one
//! as an engine slice is a reference-count bump, never a copy. The view
//! stays valid for as long as its [`PinnedBuffer`] is alive; ops keep their
//! pins until the callback has returned.

use bytes::Bytes;

use crate::error::Error;
use crate::value::Value;

/// A host buffer held alive for the duration of an op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinnedBuffer {
    bytes: Bytes,
}

impl PinnedBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// The pinned buffer itself, shared rather than copied.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Views `value` as an engine slice. `name` identifies the argument in the
/// error when `value` is not a buffer.
pub fn view(value: &Value, name: &str) -> Result<PinnedBuffer, Error> {
    match value {
        Value::Buffer(bytes) => Ok(PinnedBuffer {
            bytes: bytes.clone(),
        }),
        other => Err(Error::bad_argument(format!(
            "{name} must be a buffer, got {}",
            other.type_name()
        ))),
    }
}

/// Copies engine-owned bytes into a fresh host buffer.
pub fn materialize(bytes: &[u8]) -> Bytes {
    Bytes::copy_from_slice(bytes)
}

/// The pins owned by one op, released together when the op is dropped.
#[derive(Debug, Default)]
pub struct PinSet {
    pins: Vec<PinnedBuffer>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `value` and returns the pinned view.
    pub fn pin(&mut self, value: &Value, name: &str) -> Result<PinnedBuffer, Error> {
        let pinned = view(value, name)?;
        self.pins.push(pinned.clone());
        Ok(pinned)
    }

    /// Every pin, in the order they were taken.
    pub fn as_slice(&self) -> &[PinnedBuffer] {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
