//! Bluetooth LE central for remote layout accessories.
//!
//! Layout accessories (points, signals, and similar field devices) are driven
//! by small BLE peripherals. Each peripheral exposes one instance of the
//! accessory service per accessory it controls. This crate implements the
//! central side: it records peripherals seen while scanning, connects to one
//! of them, discovers its accessory services, subscribes to state
//! notifications, and exposes a command/state API for every accessory.
//!
//! All link-level work is delegated to a [`host::Transport`]. Requests are
//! non-blocking and their completions are fed back to the [`Central`] as
//! [`host::Event`]s, one at a time, from a single event-processing task (see
//! [`runtime`]).

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::exit)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::try_err)]

pub use {
    accessory::{AccId, Accessory, Command, PointState},
    central::{Central, ConnState},
    config::Config,
    peer::{PeerIdx, PeerRecord},
};

pub mod accessory;
pub mod att;
pub mod central;
pub mod config;
pub mod gap;
pub mod gatt;
pub mod hci;
pub mod host;
pub mod le;
pub mod peer;
pub mod report;
pub mod runtime;

/// Error type returned by the accessory central.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Host(#[from] host::Error),
    #[error("request failed: {0}")]
    Att(#[from] att::ErrorCode),
    #[error("operation not permitted in {0} state")]
    InvalidState(ConnState),
    #[error("another connection is pending or active")]
    Busy,
    #[error("no connection")]
    NotConnected,
    #[error("unknown peer")]
    UnknownPeer,
    #[error("unknown accessory {0:?}")]
    UnknownAccessory(AccId),
    #[error("accessory {0:?} is unavailable")]
    Unavailable(AccId),
    #[error("invalid command code {0:#04X}")]
    InvalidCommand(u8),
    #[error("characteristic not discovered")]
    NoCharacteristic,
    #[error("notification configuration descriptor not found")]
    NoDescriptor,
    #[error("event loop closed")]
    Closed,
}

/// Common result type.
pub type Result<T> = std::result::Result<T, Error>;
