//! The application-facing callback surface.
//!
//! Grounded on spec.md §4.5/§9 directly — the teacher exposes a
//! `futures::Stream` of `Message`s instead of a push-based listener, so
//! there's no teacher precedent to generalize here. A trait with default
//! no-op bodies is the static-typed rendition spec.md §9 asks for ("A
//! static-typed implementation uses a trait/interface with default methods").

use crate::frame::WSFrame;
use crate::transport::WSTransport;

/// Capability set an application implements to observe one connection's
/// lifecycle. Every method has a no-op default; implement only the ones
/// you care about.
pub trait WSListener: Send {
    /// Called exactly once, when the connection transitions CONNECTING -> OPEN.
    fn on_ws_connected(&mut self, _transport: &WSTransport) {}

    /// Called once per frame, in wire order. `frame.payload` borrows from
    /// the decoder's internal buffer and is only valid for the duration of
    /// this call — clone or copy out anything you need to retain.
    fn on_ws_frame(&mut self, _transport: &WSTransport, _frame: &WSFrame) {}

    /// Fired at most once per backpressure cycle, when buffered outbound
    /// bytes cross the configured high watermark.
    fn pause_writing(&mut self) {}

    /// Fired at most once per backpressure cycle, after `pause_writing`,
    /// when buffered outbound bytes drain below the low watermark.
    fn resume_writing(&mut self) {}

    /// Called exactly once, when the connection reaches CLOSED. No further
    /// callbacks follow.
    fn on_ws_disconnected(&mut self, _transport: &WSTransport) {}
}

/// What a server's connection factory decides for an incoming upgrade
/// request, per spec.md §4.2.
pub enum FactoryOutcome<L> {
    /// Accept the connection and dispatch to this listener.
    Accept(L),
    /// No route matches this request; respond `404 Not Found`.
    NotFound,
    /// The factory failed; respond `500 Internal Server Error` with `reason`
    /// logged but not echoed to the peer.
    Error(String),
}
