//! Peer registry.
//!
//! Peers are recorded from advertising reports that list the accessory
//! service. Records are never removed. Once the table is full, new peers are
//! ignored.

use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut};

use tracing::{debug, trace};

use crate::accessory::AccId;
use crate::central::ConnState;
use crate::le::Addr;

/// Peer table index.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct PeerIdx(pub(crate) usize);

impl PeerIdx {
    /// Returns the table index.
    #[inline(always)]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl Display for PeerIdx {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<PeerIdx> for u32 {
    #[inline]
    fn from(i: PeerIdx) -> Self {
        Self::try_from(i.0).unwrap_or(Self::MAX)
    }
}

/// Known peer.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PeerRecord {
    /// Most recently advertised address.
    pub addr: Addr,
    /// Advertised local name.
    pub name: String,
    /// Connection state.
    pub state: ConnState,
    /// Whether service discovery was completed on a previous connection.
    pub discovered: bool,
    /// Accessories discovered on this peer, in discovery order.
    pub accessories: Vec<AccId>,
}

impl PeerRecord {
    fn new(addr: Addr, name: String) -> Self {
        Self {
            addr,
            name,
            state: ConnState::Connectable,
            discovered: false,
            accessories: Vec::new(),
        }
    }
}

/// Bounded table of known peers.
#[derive(Debug)]
pub struct Peers {
    recs: Vec<PeerRecord>,
    cap: usize,
}

impl Peers {
    /// Creates a peer table with capacity for `cap` peers.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            recs: Vec::with_capacity(cap),
            cap,
        }
    }

    /// Records an advertisement. Returns the index of a newly created
    /// record, or `None` if the report was ignored: the service does not
    /// match, the name is already known, or the table is full.
    pub fn record_advertisement(
        &mut self,
        addr: Addr,
        name: &str,
        service_match: bool,
    ) -> Option<PeerIdx> {
        if !service_match {
            return None;
        }
        if let Some(i) = self.index_of(name) {
            let r = &mut self.recs[i.0];
            if r.addr != addr && !r.state.is_linked() {
                debug!("Peer {i} {name:?} address changed to {addr:?}");
                r.addr = addr;
            }
            return None;
        }
        if self.recs.len() >= self.cap {
            trace!("Peer table full, ignoring {name:?}");
            return None;
        }
        let i = PeerIdx(self.recs.len());
        self.recs.push(PeerRecord::new(addr, name.to_owned()));
        Some(i)
    }

    /// Returns the index of the peer named `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<PeerIdx> {
        (self.recs.iter().position(|r| r.name == name)).map(PeerIdx)
    }

    /// Returns the number of known peers.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.recs.len()
    }

    /// Returns the table capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.cap
    }

    /// Returns the peer record at index `i`.
    #[inline]
    #[must_use]
    pub fn get(&self, i: PeerIdx) -> Option<&PeerRecord> {
        self.recs.get(i.0)
    }

    /// Validates table position `i`.
    #[inline]
    #[must_use]
    pub fn idx(&self, i: usize) -> Option<PeerIdx> {
        (i < self.recs.len()).then_some(PeerIdx(i))
    }

    /// Returns the advertised name of peer `i`.
    #[inline]
    #[must_use]
    pub fn name(&self, i: PeerIdx) -> Option<&str> {
        self.get(i).map(|r| r.name.as_str())
    }

    /// Returns all records in table order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (PeerIdx, &PeerRecord)> {
        (self.recs.iter().enumerate()).map(|(i, r)| (PeerIdx(i), r))
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, i: PeerIdx) -> Option<&mut PeerRecord> {
        self.recs.get_mut(i.0)
    }
}

impl Index<PeerIdx> for Peers {
    type Output = PeerRecord;

    #[inline]
    fn index(&self, i: PeerIdx) -> &Self::Output {
        &self.recs[i.0]
    }
}

impl IndexMut<PeerIdx> for Peers {
    #[inline]
    fn index_mut(&mut self, i: PeerIdx) -> &mut Self::Output {
        &mut self.recs[i.0]
    }
}
