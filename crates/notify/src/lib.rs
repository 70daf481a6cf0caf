//! Outbound call delivery for escalations.
//!
//! This crate provides:
//! - `CallTransport` trait for the single physical call line
//! - `ModemTransport`, an AT-command implementation over any async byte stream
//! - `CallDialer`, the per-recipient dial/hold/hangup state machine

pub mod dialer;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod modem;
pub mod transport;

pub use dialer::{CallAttempt, CallDialer, CallOutcome, CallState, DialTimings};
pub use modem::ModemTransport;
pub use transport::{CallTransport, TransportCommand, TransportError};
