//! Remote accessories.
//!
//! Every accessory service instance found on a peer becomes one
//! [`Accessory`]. Accessories are kept in an append-only arena owned by the
//! [`Central`](crate::Central) and are addressed by [`AccId`]. An accessory
//! combines the discovered GATT layout of its service ([`Session`]) with the
//! application-facing state: identity, last reported state, and last issued
//! command.

use std::fmt::{Display, Formatter};

pub use session::*;

use crate::peer::PeerIdx;

mod controller;
mod session;


/// Accessory arena index.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct AccId(pub(crate) usize);

impl AccId {
    /// Returns the arena index.
    #[inline(always)]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl Display for AccId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "acc#{}", self.0)
    }
}

/// Reported accessory state. This is the single byte carried by the state
/// characteristic, plus a local `Unavailable` value used while there is no
/// live connection to the accessory.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::FromPrimitive,
    num_enum::IntoPrimitive,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum PointState {
    /// Position not known.
    #[num_enum(default)]
    Unknown = 0x00,
    Normal = 0x01,
    Reverse = 0x02,
    /// Movement in progress.
    Moving = 0x03,
    /// No live connection.
    Unavailable = 0xFF,
}

impl PointState {
    /// Decodes a state characteristic value. `Unavailable` is never reported
    /// by the peer and decodes as `Unknown`, as do empty values.
    #[must_use]
    pub fn from_wire(v: &[u8]) -> Self {
        match v.first().copied().map(Self::from) {
            Some(Self::Unavailable) | None => Self::Unknown,
            Some(s) => s,
        }
    }

    /// Returns whether the accessory is reachable.
    #[inline]
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// Accessory command code written to the command characteristic.
#[allow(clippy::exhaustive_enums)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    strum::Display,
)]
#[repr(u8)]
pub enum Command {
    Normal = 0x01,
    Reverse = 0x02,
}

/// Remote accessory.
#[derive(Clone, Debug)]
pub struct Accessory {
    id: AccId,
    owner: Option<PeerIdx>,
    session: Session,
    identity: String,
    state: PointState,
    command: Option<Command>,
}

impl Accessory {
    fn new(id: AccId, owner: PeerIdx, session: Session) -> Self {
        Self {
            id,
            owner: Some(owner),
            session,
            identity: String::new(),
            state: PointState::Unavailable,
            command: None,
        }
    }

    /// Returns the arena index of the accessory.
    #[inline(always)]
    #[must_use]
    pub const fn id(&self) -> AccId {
        self.id
    }

    /// Returns the peer that hosts the accessory or `None` if the accessory
    /// was abandoned by an interrupted discovery.
    #[inline(always)]
    #[must_use]
    pub const fn owner(&self) -> Option<PeerIdx> {
        self.owner
    }

    /// Returns the discovered GATT layout.
    #[inline(always)]
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[inline(always)]
    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Detaches the accessory from its peer.
    pub(crate) fn detach(&mut self) {
        self.owner = None;
        self.session.detach();
    }
}

/// Append-only accessory arena.
#[derive(Debug, Default)]
pub struct Accessories(Vec<Accessory>);

impl Accessories {
    /// Creates an empty arena.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds an accessory hosted by peer `owner`.
    pub(crate) fn push(&mut self, owner: PeerIdx, session: Session) -> AccId {
        let id = AccId(self.0.len());
        self.0.push(Accessory::new(id, owner, session));
        id
    }

    /// Returns the accessory with index `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: AccId) -> Option<&Accessory> {
        self.0.get(id.0)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: AccId) -> Option<&mut Accessory> {
        self.0.get_mut(id.0)
    }

    /// Returns the first accessory with the specified identity.
    #[must_use]
    pub fn find(&self, identity: &str) -> Option<AccId> {
        (self.0.iter())
            .find(|a| a.owner.is_some() && a.identity == identity)
            .map(Accessory::id)
    }

    /// Returns the number of accessories ever discovered.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no accessories were discovered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns all accessories in discovery order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Accessory> {
        self.0.iter()
    }
}
