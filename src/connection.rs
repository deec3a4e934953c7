//! Connection role and lifecycle state.
//!
//! Grounded on the teacher's `WSConnection`, generalized from a struct that
//! owned the socket halves directly into a small piece of shared state two
//! tasks (`transport.rs`'s read task and write task) coordinate through via
//! an `Arc`, since picows-style endpoints run those halves concurrently
//! rather than polling one `Stream`.

use std::sync::atomic::{AtomicU8, Ordering};

/// Which side of the handshake this endpoint played. Controls masking
/// direction in `codec.rs` and who initiates the TCP half-close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The four states spec.md's connection lifecycle names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnState::Connecting,
            1 => ConnState::Open,
            2 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnState::Connecting => 0,
            ConnState::Open => 1,
            ConnState::Closing => 2,
            ConnState::Closed => 3,
        }
    }
}

/// Lock-free state shared between a connection's read task, write task,
/// and the handle returned to the application.
pub struct ConnectionState {
    state: AtomicU8,
}

impl ConnectionState {
    pub fn new() -> Self {
        ConnectionState {
            state: AtomicU8::new(ConnState::Connecting.as_u8()),
        }
    }

    pub fn get(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// CONNECTING -> OPEN, once the handshake completes.
    pub fn mark_open(&self) {
        self.state
            .store(ConnState::Open.as_u8(), Ordering::Release);
    }

    /// OPEN -> CLOSING. Returns `true` if this call performed the
    /// transition (i.e. the caller is the first to initiate close);
    /// `false` if the connection was already closing or closed.
    pub fn begin_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ConnState::Open.as_u8(),
                ConnState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Unconditionally moves to CLOSED, from whatever state preceded it
    /// (a handshake failure can jump straight from CONNECTING).
    pub fn mark_closed(&self) {
        self.state
            .store(ConnState::Closed.as_u8(), Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.get() == ConnState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.get() == ConnState::Closed
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
