use tracing::{debug, trace, warn};

use pointlink_const::AccessoryChar;

use crate::att::Handle;
use crate::gatt::{CharProps, Cccd, DiscoveredChar, DiscoveredDesc, DiscoveredService};
use crate::hci::ConnHandle;
use crate::host::Transport;
use crate::{Error, Result};

use super::Command;

/// Characteristic role used for completion dispatch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CharRole {
    Identity,
    State,
    Command,
    /// Client Characteristic Configuration descriptor of the state
    /// characteristic.
    StateCccd,
}

/// Initialization path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum InitPath {
    /// First connection: identity, descriptors, state, subscription.
    First,
    /// Reconnection: state and subscription only. Descriptors are discovered
    /// again if the configuration descriptor was never found.
    Reconnect,
}

/// Outstanding initialization request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Await {
    Identity,
    Descriptors,
    State,
    Subscribe,
}

/// Discovered layout of one accessory service instance and its
/// initialization progress.
#[derive(Clone, Debug)]
pub struct Session {
    conn: Option<ConnHandle>,
    service: DiscoveredService,
    identity: Option<DiscoveredChar>,
    state: Option<DiscoveredChar>,
    command: Option<DiscoveredChar>,
    cccd: Option<Handle>,
    pending: Option<Await>,
}

impl Session {
    /// Creates a session for a service discovered on connection `conn`.
    #[must_use]
    pub const fn new(conn: ConnHandle, service: DiscoveredService) -> Self {
        Self {
            conn: Some(conn),
            service,
            identity: None,
            state: None,
            command: None,
            cccd: None,
            pending: None,
        }
    }

    /// Returns the service record.
    #[inline(always)]
    #[must_use]
    pub const fn service(&self) -> &DiscoveredService {
        &self.service
    }

    /// Returns the current connection handle.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> Option<ConnHandle> {
        self.conn
    }

    /// Returns the outstanding initialization request.
    #[inline(always)]
    #[must_use]
    pub const fn pending(&self) -> Option<Await> {
        self.pending
    }

    /// Returns the value handle of characteristic `c`.
    #[must_use]
    pub fn value_handle(&self, c: AccessoryChar) -> Option<Handle> {
        match c {
            AccessoryChar::Identity => self.identity,
            AccessoryChar::State => self.state,
            AccessoryChar::Command => self.command,
        }
        .map(|c| c.value)
    }

    /// Returns the state characteristic's configuration descriptor handle.
    #[inline(always)]
    #[must_use]
    pub const fn cccd(&self) -> Option<Handle> {
        self.cccd
    }

    /// Saves a characteristic of this service if it has one of the accessory
    /// roles. Returns the role or `None` if the characteristic was ignored.
    pub fn save_characteristic(&mut self, c: &DiscoveredChar) -> Option<AccessoryChar> {
        let Some(role) = AccessoryChar::from_uuid(c.uuid) else {
            trace!("Ignoring characteristic {} at {}", c.uuid, c.value);
            return None;
        };
        let (slot, want) = match role {
            AccessoryChar::Identity => (&mut self.identity, CharProps::READ),
            AccessoryChar::State => (&mut self.state, CharProps::READ | CharProps::NOTIFY),
            AccessoryChar::Command => (&mut self.command, CharProps::WRITE),
        };
        if !c.props.contains(want) {
            warn!("{role:?} characteristic at {} lacks {want:?}", c.value);
        }
        *slot = Some(*c);
        Some(role)
    }

    /// Issues the first initialization request for `path`. On success, the
    /// session waits for the matching completion.
    pub fn init_characteristics<T: Transport>(
        &mut self,
        t: &mut T,
        conn: ConnHandle,
        path: InitPath,
    ) -> Result<()> {
        self.conn = Some(conn);
        self.pending = None;
        match path {
            InitPath::First => {
                let h = self.identity.ok_or(Error::NoCharacteristic)?.value;
                t.read(conn, h)?;
                self.pending = Some(Await::Identity);
                Ok(())
            }
            InitPath::Reconnect if self.cccd.is_none() => {
                debug!("State CCCD unknown, rediscovering descriptors");
                self.discover_state_descriptor(t)
            }
            InitPath::Reconnect => self.read_state(t),
        }
    }

    /// Starts discovery of the state characteristic's descriptors. The
    /// previously found configuration descriptor is forgotten.
    pub fn discover_state_descriptor<T: Transport>(&mut self, t: &mut T) -> Result<()> {
        let conn = self.conn.ok_or(Error::NotConnected)?;
        self.cccd = None;
        let state = self.state.ok_or(Error::NoCharacteristic)?;
        let range = state.descriptors().ok_or(Error::NoDescriptor)?;
        t.discover_descriptors(conn, range)?;
        self.pending = Some(Await::Descriptors);
        Ok(())
    }

    /// Records a discovered descriptor. Returns whether it is the state
    /// characteristic's configuration descriptor.
    pub fn on_descriptor(&mut self, d: &DiscoveredDesc) -> bool {
        if self.pending != Some(Await::Descriptors) || !d.is_cccd() {
            return false;
        }
        debug!("State CCCD at {}", d.handle);
        self.cccd = Some(d.handle);
        true
    }

    /// Handles descriptor discovery termination by reading the current state.
    /// Returns [`Error::NoDescriptor`] if the configuration descriptor was
    /// not found.
    pub fn on_descriptors_done<T: Transport>(&mut self, t: &mut T) -> Result<()> {
        self.pending = None;
        if self.cccd.is_none() {
            return Err(Error::NoDescriptor);
        }
        self.read_state(t)
    }

    /// Reads the state characteristic.
    pub fn read_state<T: Transport>(&mut self, t: &mut T) -> Result<()> {
        let conn = self.conn.ok_or(Error::NotConnected)?;
        let h = self.state.ok_or(Error::NoCharacteristic)?.value;
        t.read(conn, h)?;
        self.pending = Some(Await::State);
        Ok(())
    }

    /// Enables state notifications. Fails without a request if the
    /// configuration descriptor is unknown.
    pub fn write_subscription<T: Transport>(&mut self, t: &mut T) -> Result<()> {
        let conn = self.conn.ok_or(Error::NotConnected)?;
        let h = self.cccd.ok_or(Error::NoDescriptor)?;
        t.write(conn, h, &Cccd::NOTIFY.to_bytes())?;
        self.pending = Some(Await::Subscribe);
        Ok(())
    }

    /// Writes a command value.
    pub(super) fn write_command<T: Transport>(&mut self, t: &mut T, cmd: Command) -> Result<()> {
        let conn = self.conn.ok_or(Error::NotConnected)?;
        let h = self.command.ok_or(Error::NoCharacteristic)?.value;
        t.write(conn, h, &[u8::from(cmd)])?;
        Ok(())
    }

    /// Returns the outstanding request that completion for handle `h`
    /// resolves, if any.
    #[must_use]
    pub fn expects(&self, h: Handle) -> Option<Await> {
        let want = match self.pending? {
            Await::Identity => self.value_handle(AccessoryChar::Identity),
            Await::State => self.value_handle(AccessoryChar::State),
            Await::Subscribe => self.cccd,
            Await::Descriptors => None,
        };
        (want == Some(h)).then_some(self.pending?)
    }

    /// Clears the outstanding request.
    #[inline]
    pub fn complete(&mut self) -> Option<Await> {
        self.pending.take()
    }

    /// Returns whether a write completion for handle `h` on connection `conn`
    /// belongs to this accessory.
    #[must_use]
    pub fn claims_write(&self, conn: ConnHandle, h: Handle) -> bool {
        self.conn == Some(conn)
            && (self.cccd == Some(h)
                || [self.command, self.identity, self.state]
                    .into_iter()
                    .flatten()
                    .any(|c| c.value == h))
    }

    /// Returns whether a notification for handle `h` on connection `conn`
    /// belongs to this accessory.
    #[must_use]
    pub fn claims_notification(&self, conn: ConnHandle, h: Handle) -> bool {
        self.conn == Some(conn) && self.value_handle(AccessoryChar::State) == Some(h)
    }

    /// Returns all known handles and their roles.
    pub fn handles(&self) -> impl Iterator<Item = (Handle, CharRole)> + '_ {
        [
            (self.identity.map(|c| c.value), CharRole::Identity),
            (self.state.map(|c| c.value), CharRole::State),
            (self.command.map(|c| c.value), CharRole::Command),
            (self.cccd, CharRole::StateCccd),
        ]
        .into_iter()
        .filter_map(|(h, r)| Some((h?, r)))
    }

    /// Forgets the connection and any outstanding request. Discovered
    /// handles are retained.
    pub(crate) fn detach(&mut self) {
        self.conn = None;
        self.pending = None;
    }
}
