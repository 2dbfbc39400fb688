//! Event registry.
//!
//! Objects that announce domain events register themselves once as a
//! [`Source`]. Published [`Report`]s are delivered to every subscriber in
//! publication order.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::accessory::AccId;

/// Registered object role.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum Role {
    /// The BLE central itself.
    Central,
    /// A remote accessory.
    Accessory,
}

/// Registered event source.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Source {
    Central,
    Accessory(AccId),
}

impl Source {
    /// Returns the role of the source.
    #[inline]
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::Central => Role::Central,
            Self::Accessory(_) => Role::Accessory,
        }
    }
}

/// Event kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum Kind {
    /// Discovery scan started.
    ScanStarted,
    /// Discovery scan finished.
    ScanDone,
    /// New peer recorded. Payload is the peer index.
    PeerFound,
    /// Link established. Payload is the connection handle.
    Connected,
    /// Link terminated. Payload is the HCI reason code.
    Disconnected,
    /// All accessories on the connection were initialized.
    ServicesAvailable,
    /// Accessory identity was read for the first time.
    Discovered,
    /// Accessory state notification. Payload is the new state.
    StateChanged,
}

/// Published event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct Report {
    pub source: Source,
    pub kind: Kind,
    pub payload: u32,
}

impl Report {
    #[inline]
    #[must_use]
    pub const fn new(source: Source, kind: Kind, payload: u32) -> Self {
        Self {
            source,
            kind,
            payload,
        }
    }
}

/// Registry of event sources and report subscribers.
#[derive(Debug, Default)]
pub struct Registry {
    sources: Vec<Source>,
    subs: Vec<mpsc::UnboundedSender<Report>>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sources: Vec::new(),
            subs: Vec::new(),
        }
    }

    /// Registers an event source. Registering the same source twice has no
    /// effect.
    pub fn register(&mut self, src: Source) {
        if !self.sources.contains(&src) {
            trace!("Registered {src:?}");
            self.sources.push(src);
        }
    }

    /// Calls `f` for each registered source of the specified role in
    /// registration order.
    pub fn for_each_of_role(&self, role: Role, f: impl FnMut(Source)) {
        (self.sources.iter().copied())
            .filter(|s| s.role() == role)
            .for_each(f);
    }

    /// Returns a new report receiver.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Report> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs.push(tx);
        rx
    }

    /// Publishes an event from a registered source. Closed subscribers are
    /// dropped.
    pub fn publish(&mut self, src: Source, kind: Kind, payload: impl Into<u32>) {
        if !self.sources.contains(&src) {
            warn!("Report {kind} from unregistered {src:?}");
            return;
        }
        let r = Report::new(src, kind, payload.into());
        trace!("{r:?}");
        self.subs.retain(|tx| tx.send(r).is_ok());
    }
}
