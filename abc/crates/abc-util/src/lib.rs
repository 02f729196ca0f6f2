//! abc-util - Shared infrastructure for the ABC toolchain.
//!
//! This crate sits below every compiler phase and provides the two
//! things they all need: source positions ([`Span`]) and diagnostic
//! collection ([`Handler`], [`Diagnostic`]).
//!
//! Diagnostics are collected rather than printed eagerly so the parser
//! can keep recovering after an error; the driver renders the whole
//! list once parsing is finished.

mod diagnostic;
mod span;

pub use diagnostic::{Diagnostic, Handler, Level};
pub use span::Span;
