//! Link-level collaborator interface.
//!
//! A [`Transport`] issues non-blocking radio and GATT client requests. Each
//! accepted request completes later with one or more [`Event`]s, which are
//! delivered to the [`Central`](crate::Central) in order.

use std::fmt::Debug;

use smallvec::SmallVec;

use crate::att::{ErrorCode, Handle, HandleRange};
use crate::gatt::{DiscoveredChar, DiscoveredDesc, DiscoveredService};
use crate::hci::{ConnHandle, ConnParams, DisconnectReason, Role, ScanParams, Status};
use crate::le::Addr;

#[cfg(test)]
pub(crate) mod mock;

/// Request-issue errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("transport busy")]
    Busy,
    #[error("invalid request parameters")]
    InvalidParameters,
    #[error("unknown connection")]
    NotConnected,
    #[error("controller error: {0}")]
    Hci(#[from] Status),
}

/// Common host result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Attribute value carried by read completions and notifications.
pub type Value = SmallVec<[u8; 20]>;

/// Outbound requests. Every method returns as soon as the request is queued;
/// an `Err` means the request was not issued and no completion will follow.
pub trait Transport: Debug + Send {
    /// Creates a connection to `peer`. Completes with
    /// [`Event::ConnectionComplete`].
    fn connect(&mut self, peer: Addr, p: &ConnParams) -> Result<()>;

    /// Terminates connection `conn`. Completes with
    /// [`Event::DisconnectionComplete`].
    fn disconnect(&mut self, conn: ConnHandle, reason: DisconnectReason) -> Result<()>;

    /// Starts scanning for advertisements. Reports arrive as
    /// [`Event::AdvReport`] until [`Event::ScanTimeout`].
    fn scan(&mut self, p: &ScanParams) -> Result<()>;

    /// Discovers all primary services and their characteristics. Each
    /// [`Event::ServiceDiscovered`] is followed by the
    /// [`Event::CharDiscovered`] events of that service. Completes with
    /// [`Event::ServiceDiscoveryTerminated`].
    fn discover_services(&mut self, conn: ConnHandle) -> Result<()>;

    /// Discovers descriptors within `range`, reporting each one as
    /// [`Event::DescriptorDiscovered`]. Completes with
    /// [`Event::DescriptorDiscoveryTerminated`].
    fn discover_descriptors(&mut self, conn: ConnHandle, range: HandleRange) -> Result<()>;

    /// Reads attribute `h`. Completes with [`Event::ReadComplete`].
    fn read(&mut self, conn: ConnHandle, h: Handle) -> Result<()>;

    /// Writes `v` to attribute `h`. Completes with [`Event::WriteComplete`].
    fn write(&mut self, conn: ConnHandle, h: Handle, v: &[u8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    #[inline]
    fn connect(&mut self, peer: Addr, p: &ConnParams) -> Result<()> {
        (**self).connect(peer, p)
    }

    #[inline]
    fn disconnect(&mut self, conn: ConnHandle, reason: DisconnectReason) -> Result<()> {
        (**self).disconnect(conn, reason)
    }

    #[inline]
    fn scan(&mut self, p: &ScanParams) -> Result<()> {
        (**self).scan(p)
    }

    #[inline]
    fn discover_services(&mut self, conn: ConnHandle) -> Result<()> {
        (**self).discover_services(conn)
    }

    #[inline]
    fn discover_descriptors(&mut self, conn: ConnHandle, range: HandleRange) -> Result<()> {
        (**self).discover_descriptors(conn, range)
    }

    #[inline]
    fn read(&mut self, conn: ConnHandle, h: Handle) -> Result<()> {
        (**self).read(conn, h)
    }

    #[inline]
    fn write(&mut self, conn: ConnHandle, h: Handle, v: &[u8]) -> Result<()> {
        (**self).write(conn, h, v)
    }
}

/// Inbound events and request completions.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// Advertising or scan response data received while scanning.
    AdvReport { addr: Addr, data: Vec<u8> },
    /// Scan duration expired.
    ScanTimeout,
    /// Connection request completed, successfully or not.
    ConnectionComplete {
        status: Status,
        conn: ConnHandle,
        role: Role,
        peer: Addr,
    },
    /// Connection terminated by either side or lost.
    DisconnectionComplete { conn: ConnHandle, reason: Status },
    ServiceDiscovered {
        conn: ConnHandle,
        service: DiscoveredService,
    },
    CharDiscovered { conn: ConnHandle, chr: DiscoveredChar },
    ServiceDiscoveryTerminated { conn: ConnHandle },
    DescriptorDiscovered { conn: ConnHandle, desc: DiscoveredDesc },
    DescriptorDiscoveryTerminated { conn: ConnHandle },
    ReadComplete {
        conn: ConnHandle,
        handle: Handle,
        result: std::result::Result<Value, ErrorCode>,
    },
    WriteComplete {
        conn: ConnHandle,
        handle: Handle,
        result: std::result::Result<(), ErrorCode>,
    },
    /// Handle value notification.
    Notification {
        conn: ConnHandle,
        handle: Handle,
        value: Value,
    },
}

impl Event {
    /// Returns the connection that the event refers to.
    #[must_use]
    pub fn conn(&self) -> Option<ConnHandle> {
        use Event::*;
        match *self {
            AdvReport { .. } | ScanTimeout => None,
            ConnectionComplete { conn, .. }
            | DisconnectionComplete { conn, .. }
            | ServiceDiscovered { conn, .. }
            | CharDiscovered { conn, .. }
            | ServiceDiscoveryTerminated { conn }
            | DescriptorDiscovered { conn, .. }
            | DescriptorDiscoveryTerminated { conn }
            | ReadComplete { conn, .. }
            | WriteComplete { conn, .. }
            | Notification { conn, .. } => Some(conn),
        }
    }
}
