//! Connection lifecycle and accessory initialization.
//!
//! [`Central`] owns the single client connection. Peers are discovered by
//! scanning, and one of them is connected on request. On the first connection
//! to a peer, all services are discovered and every accessory service
//! instance becomes an [`Accessory`]. Accessories are then initialized one at
//! a time, with at most one outstanding request on the link:
//!
//! * first connection: identity read, descriptor discovery, state read,
//!   notification subscription;
//! * reconnection: state read, notification subscription. An accessory whose
//!   first initialization was interrupted resumes with the steps it is
//!   missing.
//!
//! An accessory whose initialization fails is left unavailable and the next
//! one is started. When all accessories are done, each one reports
//! [`Kind::Connected`] and the peer becomes [`ConnState::Connected`].

use std::collections::HashMap;

use smallvec::SmallVec;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use pointlink_const::{Characteristic, Service, ACCESSORY_SERVICE};

use crate::accessory::{AccId, Accessories, Accessory, Await, CharRole, InitPath, Session};
use crate::att::{ErrorCode, Handle};
use crate::config::Config;
use crate::gap::AdvReport;
use crate::gatt::{DiscoveredChar, DiscoveredDesc, DiscoveredService};
use crate::hci::{ConnHandle, DisconnectReason, Role, Status};
use crate::host::{Event, Transport, Value};
use crate::le::Addr;
use crate::peer::{PeerIdx, Peers};
use crate::report::{self, Kind, Registry, Report, Source};
use crate::{Error, PointState, Result};

#[cfg(test)]
mod tests;

/// Peer connection state.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum ConnState {
    /// Address unknown.
    #[default]
    Initial,
    /// Address known, never connected.
    Connectable,
    /// Connected for the first time, waiting for the first accessory service.
    Connecting,
    /// Service discovery in progress.
    ServiceDiscovery,
    /// First-time accessory initialization.
    Init,
    /// Accessory initialization after reconnection.
    ReconnectInit,
    /// All accessories initialized.
    Connected,
    /// Local disconnect requested.
    Disconnecting,
    /// Not connected. Discovered accessories are retained.
    Disconnected,
    /// The last connection attempt or disconnect request failed.
    Error,
}

impl ConnState {
    /// Returns whether a connection may be requested in this state.
    #[inline]
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Connectable | Self::Disconnected | Self::Error)
    }

    /// Returns whether the state implies a live link.
    #[inline]
    #[must_use]
    pub const fn is_linked(self) -> bool {
        use ConnState::*;
        matches!(
            self,
            Connecting | ServiceDiscovery | Init | ReconnectInit | Connected | Disconnecting
        )
    }
}

/// Service whose characteristics are currently being reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Current {
    None,
    GenericAccess,
    Accessory(AccId),
}

/// Connection progress.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Discovery {
        current: Current,
        dev_name: Option<Handle>,
    },
    DeviceName(Handle),
    Init {
        pos: usize,
        path: InitPath,
    },
    Ready,
    Disconnecting,
}

/// Live connection.
#[derive(Debug)]
struct Link {
    conn: ConnHandle,
    peer: PeerIdx,
    /// Accessories hosted by the peer, in discovery order.
    accs: Vec<AccId>,
    phase: Phase,
    /// Handle dispatch table for this connection.
    handles: HashMap<Handle, (AccId, CharRole)>,
}

impl Link {
    fn new(conn: ConnHandle, peer: PeerIdx, accs: Vec<AccId>, phase: Phase) -> Self {
        Self {
            conn,
            peer,
            accs,
            phase,
            handles: HashMap::new(),
        }
    }

    /// Rebuilds the handle dispatch table.
    fn index(&mut self, accs: &Accessories) {
        self.handles.clear();
        for &id in &self.accs {
            if let Some(a) = accs.get(id) {
                (self.handles).extend(a.session().handles().map(|(h, r)| (h, (id, r))));
            }
        }
    }

    /// Returns the accessory being initialized.
    fn current(&self) -> Option<(usize, AccId)> {
        match self.phase {
            Phase::Init { pos, .. } => self.accs.get(pos).map(|&id| (pos, id)),
            _ => None,
        }
    }
}

/// Accessory central. This is the process-wide context that owns the peer
/// table, the accessory arena, the event registry, and the transport.
#[derive(Debug)]
pub struct Central<T> {
    cfg: Config,
    t: T,
    peers: Peers,
    accs: Accessories,
    reg: Registry,
    /// Peer with an outstanding connection request.
    pending: Option<PeerIdx>,
    link: Option<Link>,
}

impl<T: Transport> Central<T> {
    /// Creates a new central using transport `t`.
    #[must_use]
    pub fn new(cfg: Config, t: T) -> Self {
        let mut reg = Registry::new();
        reg.register(Source::Central);
        Self {
            peers: Peers::new(cfg.max_peers),
            cfg,
            t,
            accs: Accessories::new(),
            reg,
            pending: None,
            link: None,
        }
    }

    /// Returns a new event receiver.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Report> {
        self.reg.subscribe()
    }

    /// Returns the configuration.
    #[inline(always)]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the peer table.
    #[inline(always)]
    #[must_use]
    pub const fn peers(&self) -> &Peers {
        &self.peers
    }

    /// Returns the accessory arena.
    #[inline(always)]
    #[must_use]
    pub const fn accessories(&self) -> &Accessories {
        &self.accs
    }

    /// Returns accessory `id`.
    #[inline]
    #[must_use]
    pub fn accessory(&self, id: AccId) -> Option<&Accessory> {
        self.accs.get(id)
    }

    /// Returns the transport.
    #[inline(always)]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.t
    }

    /// Returns the connection state of peer `i`.
    #[inline]
    #[must_use]
    pub fn conn_state(&self, i: PeerIdx) -> Option<ConnState> {
        self.peers.get(i).map(|r| r.state)
    }

    /// Returns the peer and handle of the current connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<(PeerIdx, ConnHandle)> {
        self.link.as_ref().map(|l| (l.peer, l.conn))
    }

    /// Returns the accessory with the specified identity.
    #[inline]
    #[must_use]
    pub fn find_accessory(&self, identity: &str) -> Option<AccId> {
        self.accs.find(identity)
    }

    /// Returns the last reported state of accessory `id`.
    pub fn state(&self, id: AccId) -> Result<PointState> {
        Ok(self.accs.get(id).ok_or(Error::UnknownAccessory(id))?.state())
    }

    /// Returns the identity of accessory `id`.
    pub fn identity(&self, id: AccId) -> Result<&str> {
        Ok(self.accs.get(id).ok_or(Error::UnknownAccessory(id))?.identity())
    }

    /// Starts a discovery scan.
    pub fn start_scan(&mut self) -> Result<()> {
        self.t.scan(&self.cfg.scan).map_err(|e| {
            warn!("Failed to start scan: {e}");
            e
        })?;
        debug!("Scan started");
        self.reg.publish(Source::Central, Kind::ScanStarted, 0_u8);
        Ok(())
    }

    /// Requests a connection to peer `i`. The request is only permitted in
    /// [`ConnState::Connectable`], [`ConnState::Disconnected`], or
    /// [`ConnState::Error`] states and while no other connection is pending
    /// or live. The peer state is unchanged until the connection completes.
    pub fn connect(&mut self, i: PeerIdx) -> Result<()> {
        let rec = self.peers.get(i).ok_or(Error::UnknownPeer)?;
        if !rec.state.can_connect() {
            warn!("Connect to {i} {:?} rejected in {} state", rec.name, rec.state);
            return Err(Error::InvalidState(rec.state));
        }
        if self.pending.is_some() || self.link.is_some() {
            warn!("Connect to {i} {:?} rejected: busy", rec.name);
            return Err(Error::Busy);
        }
        if let Err(e) = self.t.connect(rec.addr, &self.cfg.conn) {
            warn!("Connect to {i} {:?} failed: {e}", rec.name);
            return Err(e.into());
        }
        info!("Connecting to {i} {:?} at {}", rec.name, rec.addr.raw());
        self.pending = Some(i);
        Ok(())
    }

    /// Requests a connection to the peer at table position `i`.
    pub fn connect_by_index(&mut self, i: usize) -> Result<()> {
        let i = self.peers.idx(i).ok_or(Error::UnknownPeer)?;
        self.connect(i)
    }

    /// Requests a connection to the peer named `name`.
    pub fn connect_by_name(&mut self, name: &str) -> Result<()> {
        let i = self.peers.index_of(name).ok_or(Error::UnknownPeer)?;
        self.connect(i)
    }

    /// Requests termination of the current connection. Initialization stops
    /// immediately. If the request cannot be issued, the connection is
    /// abandoned, its accessories become unavailable, and the peer enters
    /// [`ConnState::Error`].
    pub fn disconnect(&mut self) -> Result<()> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        let (conn, peer) = (link.conn, link.peer);
        if link.phase == Phase::Disconnecting {
            return Err(Error::InvalidState(self.peers[peer].state));
        }
        let reason = DisconnectReason::RemoteUserTerminatedConnection;
        if let Err(e) = self.t.disconnect(conn, reason) {
            warn!("Disconnect from {peer} {:?} failed: {e}", self.peers[peer].name);
            self.drop_link();
            self.peers[peer].state = ConnState::Error;
            return Err(e.into());
        }
        info!("Disconnecting from {peer} {:?}", self.peers[peer].name);
        link.phase = Phase::Disconnecting;
        self.peers[peer].state = ConnState::Disconnecting;
        Ok(())
    }

    /// Requests a new position for accessory `id`.
    pub fn set_command(&mut self, id: AccId, cmd: u8) -> Result<()> {
        let a = self.accs.get_mut(id).ok_or(Error::UnknownAccessory(id))?;
        a.set_command(&mut self.t, cmd)
    }

    /// Processes a transport event.
    pub fn handle_event(&mut self, e: Event) {
        trace!("{e:?}");
        match e {
            Event::AdvReport { addr, data } => self.on_adv_report(addr, &data),
            Event::ScanTimeout => {
                debug!("Scan done");
                self.reg.publish(Source::Central, Kind::ScanDone, 0_u8);
            }
            Event::ConnectionComplete {
                status,
                conn,
                role,
                peer,
            } => self.on_connect(status, conn, role, peer),
            Event::DisconnectionComplete { conn, reason } => self.on_disconnect(conn, reason),
            Event::ServiceDiscovered { conn, service } if self.is_link(conn) => {
                self.on_service(&service);
            }
            Event::CharDiscovered { conn, chr } if self.is_link(conn) => self.on_char(&chr),
            Event::ServiceDiscoveryTerminated { conn } if self.is_link(conn) => {
                self.on_discovery_done();
            }
            Event::DescriptorDiscovered { conn, desc } if self.is_link(conn) => {
                self.on_descriptor(&desc);
            }
            Event::DescriptorDiscoveryTerminated { conn } if self.is_link(conn) => {
                self.on_descriptors_done();
            }
            Event::ReadComplete {
                conn,
                handle,
                result,
            } if self.is_link(conn) => self.on_read(handle, result),
            Event::WriteComplete {
                conn,
                handle,
                result,
            } if self.is_link(conn) => self.on_write(handle, result),
            Event::Notification {
                conn,
                handle,
                value,
            } if self.is_link(conn) => self.on_notification(handle, &value),
            e => debug!("Ignoring event for another connection: {e:?}"),
        }
    }

    /// Returns whether `conn` is the current connection.
    fn is_link(&self, conn: ConnHandle) -> bool {
        self.link.as_ref().map_or(false, |l| l.conn == conn)
    }

    fn on_adv_report(&mut self, addr: Addr, data: &[u8]) {
        let r = AdvReport::parse(addr, data);
        let name = r.display_name();
        let found = r.service_match(ACCESSORY_SERVICE);
        if let Some(i) = self.peers.record_advertisement(addr, &name, found) {
            info!("Found peer {i} {name:?} at {}", addr.raw());
            self.reg.publish(Source::Central, Kind::PeerFound, i);
        }
    }

    fn on_connect(&mut self, status: Status, conn: ConnHandle, role: Role, addr: Addr) {
        let Some(i) = self.pending.take() else {
            debug!("Ignoring unrequested connection {conn} from {addr:?}");
            return;
        };
        let rec = &mut self.peers[i];
        if !status.is_ok() || role != Role::Central {
            warn!("Connection to {i} {:?} failed: {status} ({role:?})", rec.name);
            rec.state = ConnState::Error;
            return;
        }
        info!("Connected to {i} {:?} as {conn}", rec.name);
        self.reg.publish(Source::Central, Kind::Connected, u16::from(conn));
        if rec.discovered {
            debug!("{i} was discovered before, skipping service discovery");
            rec.state = ConnState::ReconnectInit;
            let phase = Phase::Init {
                pos: 0,
                path: InitPath::Reconnect,
            };
            let mut link = Link::new(conn, i, rec.accessories.clone(), phase);
            link.index(&self.accs);
            self.link = Some(link);
            self.init_from(0);
            return;
        }
        rec.state = ConnState::Connecting;
        let phase = Phase::Discovery {
            current: Current::None,
            dev_name: None,
        };
        self.link = Some(Link::new(conn, i, Vec::new(), phase));
        if let Err(e) = self.t.discover_services(conn) {
            warn!("Service discovery on {conn} failed: {e}");
            rec.state = ConnState::Error;
            let reason = DisconnectReason::RemoteUserTerminatedConnection;
            match self.t.disconnect(conn, reason) {
                Ok(()) => self.set_phase(Phase::Disconnecting),
                Err(e) => {
                    warn!("Disconnect from {conn} failed: {e}");
                    self.drop_link();
                }
            }
        }
    }

    fn on_service(&mut self, svc: &DiscoveredService) {
        let Some(link) = self.link.as_mut() else { return };
        let Phase::Discovery { ref mut current, .. } = link.phase else {
            return trace!("Ignoring service outside of discovery");
        };
        *current = if svc.uuid == ACCESSORY_SERVICE {
            let id = self.accs.push(link.peer, Session::new(link.conn, *svc));
            self.reg.register(Source::Accessory(id));
            link.accs.push(id);
            let rec = &mut self.peers[link.peer];
            if rec.state == ConnState::Connecting {
                rec.state = ConnState::ServiceDiscovery;
            }
            debug!("Found accessory service {id} at {:?}", svc.range);
            Current::Accessory(id)
        } else if svc.uuid == Service::GenericAccess {
            Current::GenericAccess
        } else {
            trace!("Ignoring service {}", svc.uuid);
            Current::None
        };
    }

    fn on_char(&mut self, c: &DiscoveredChar) {
        let Some(link) = self.link.as_mut() else { return };
        let Phase::Discovery {
            current,
            ref mut dev_name,
        } = link.phase
        else {
            return;
        };
        match current {
            Current::Accessory(id) => {
                if let Some(a) = self.accs.get_mut(id) {
                    a.session_mut().save_characteristic(c);
                }
            }
            Current::GenericAccess if c.uuid == Characteristic::DeviceName => {
                *dev_name = Some(c.value);
            }
            _ => {}
        }
    }

    fn on_discovery_done(&mut self) {
        let Some(link) = self.link.as_mut() else { return };
        let Phase::Discovery { dev_name, .. } = link.phase else {
            return;
        };
        let rec = &mut self.peers[link.peer];
        info!("{} {:?}: {} accessory service(s) found", link.peer, rec.name, link.accs.len());
        rec.discovered = true;
        rec.accessories.extend_from_slice(&link.accs);
        rec.state = ConnState::Init;
        link.index(&self.accs);
        if let Some(h) = dev_name {
            match self.t.read(link.conn, h) {
                Ok(()) => return link.phase = Phase::DeviceName(h),
                Err(e) => warn!("Device name read failed: {e}"),
            }
        }
        self.start_init(InitPath::First);
    }

    fn on_read(&mut self, h: Handle, r: std::result::Result<Value, ErrorCode>) {
        let Some(link) = self.link.as_ref() else { return };
        if link.phase == Phase::DeviceName(h) {
            match r {
                Ok(v) => debug!("Device name: {:?}", String::from_utf8_lossy(&v)),
                Err(e) => warn!("Device name read failed: {e}"),
            }
            return self.start_init(InitPath::First);
        }
        let Some((_, id)) = link.current() else {
            return trace!("Ignoring read of {h}");
        };
        let Some(a) = self.accs.get_mut(id) else { return };
        let step = a.session().expects(h);
        let v = match (step, r) {
            (None, _) => return trace!("Ignoring read of {h}"),
            (Some(_), Err(e)) => return self.init_failed(Error::Att(e)),
            (Some(_), Ok(v)) => v,
        };
        a.session_mut().complete();
        let next = match step {
            Some(Await::Identity) => {
                let ident = a.set_identity(&v, self.cfg.max_id_len);
                info!("{id} identity: {ident:?}");
                self.reg.publish(Source::Accessory(id), Kind::Discovered, 0_u8);
                a.session_mut().discover_state_descriptor(&mut self.t)
            }
            Some(Await::State) => {
                a.on_initial_read(&v);
                a.session_mut().write_subscription(&mut self.t)
            }
            _ => Ok(()),
        };
        if let Err(e) = next {
            self.init_failed(e);
        }
    }

    fn on_descriptor(&mut self, d: &DiscoveredDesc) {
        let Some((_, id)) = self.link.as_ref().and_then(Link::current) else {
            return;
        };
        if let Some(a) = self.accs.get_mut(id) {
            a.session_mut().on_descriptor(d);
        }
    }

    fn on_descriptors_done(&mut self) {
        let Some(link) = self.link.as_mut() else { return };
        let Some((_, id)) = link.current() else { return };
        let Some(a) = self.accs.get_mut(id) else { return };
        if a.session().pending() != Some(Await::Descriptors) {
            return;
        }
        let r = a.session_mut().on_descriptors_done(&mut self.t);
        link.index(&self.accs);
        if let Err(e) = r {
            self.init_failed(e);
        }
    }

    fn on_write(&mut self, h: Handle, r: std::result::Result<(), ErrorCode>) {
        let Some(link) = self.link.as_ref() else { return };
        let Some(&(id, role)) = link.handles.get(&h) else {
            return debug!("Write completion for unknown {h}");
        };
        let Some(a) = self.accs.get_mut(id) else { return };
        if !a.session().claims_write(link.conn, h) {
            return warn!("{id} does not claim write of {h}");
        }
        if link.current().map(|(_, cur)| cur) == Some(id)
            && a.session().expects(h) == Some(Await::Subscribe)
        {
            a.session_mut().complete();
            return match r {
                Ok(()) => {
                    debug!("{id} subscribed");
                    self.init_next();
                }
                Err(e) => self.init_failed(Error::Att(e)),
            };
        }
        match r {
            Ok(()) => debug!("{id} {role:?} write acknowledged"),
            Err(e) => warn!("{id} {role:?} write failed: {e}"),
        }
    }

    fn on_notification(&mut self, h: Handle, v: &[u8]) {
        let Some(link) = self.link.as_ref() else { return };
        match link.handles.get(&h) {
            Some(&(id, CharRole::State)) => {
                let Some(a) = self.accs.get_mut(id) else { return };
                if a.session().claims_notification(link.conn, h) {
                    a.on_notified(&mut self.reg, v);
                }
            }
            _ => debug!("Ignoring notification for {h}"),
        }
    }

    fn on_disconnect(&mut self, conn: ConnHandle, reason: Status) {
        if !self.is_link(conn) {
            return debug!("Ignoring disconnection of {conn}");
        }
        let Some(link) = self.drop_link() else { return };
        let rec = &mut self.peers[link.peer];
        info!("Disconnected from {} {:?}: {reason}", link.peer, rec.name);
        rec.state = ConnState::Disconnected;
        let reason = u8::from(reason);
        self.publish_link(&link.accs, Kind::Disconnected, reason);
        self.reg.publish(Source::Central, Kind::Disconnected, reason);
    }

    /// Abandons the current connection and makes its accessories
    /// unavailable. Accessories found by an unfinished service discovery are
    /// detached from the peer, which keeps the peer undiscovered.
    fn drop_link(&mut self) -> Option<Link> {
        let link = self.link.take()?;
        let aborted = !self.peers[link.peer].discovered;
        if aborted && !link.accs.is_empty() {
            debug!("Discovery interrupted, {} accessory service(s) dropped", link.accs.len());
        }
        for &id in &link.accs {
            if let Some(a) = self.accs.get_mut(id) {
                a.set_unavailable();
                if aborted {
                    a.detach();
                } else {
                    a.session_mut().detach();
                }
            }
        }
        Some(link)
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(link) = self.link.as_mut() {
            link.phase = phase;
        }
    }

    /// Starts initialization of the first accessory.
    fn start_init(&mut self, path: InitPath) {
        if let Some(link) = self.link.as_mut() {
            link.phase = Phase::Init { pos: 0, path };
            self.init_from(0);
        }
    }

    /// Marks the accessory being initialized as unavailable and starts the
    /// next one.
    fn init_failed(&mut self, e: Error) {
        let Some((pos, id)) = self.link.as_ref().and_then(Link::current) else {
            return;
        };
        warn!("{id} initialization failed: {e}");
        if let Some(a) = self.accs.get_mut(id) {
            a.set_unavailable();
            a.session_mut().complete();
        }
        self.init_from(pos + 1);
    }

    /// Starts the next accessory.
    fn init_next(&mut self) {
        if let Some((pos, _)) = self.link.as_ref().and_then(Link::current) {
            self.init_from(pos + 1);
        }
    }

    /// Starts initialization of the first accessory at or after `pos` that
    /// accepts the request. Finishes the connection when there are none.
    fn init_from(&mut self, mut pos: usize) {
        let Some(link) = self.link.as_mut() else { return };
        let Phase::Init { path, .. } = link.phase else {
            return;
        };
        while let Some(&id) = link.accs.get(pos) {
            link.phase = Phase::Init { pos, path };
            let Some(a) = self.accs.get_mut(id) else {
                pos += 1;
                continue;
            };
            // Identity is read on reconnection if the first attempt never got it
            let p = match path {
                InitPath::Reconnect if a.identity().is_empty() => InitPath::First,
                p => p,
            };
            match a.session_mut().init_characteristics(&mut self.t, link.conn, p) {
                Ok(()) => return trace!("{id} initialization started ({p:?})"),
                Err(e) => {
                    warn!("{id} initialization skipped: {e}");
                    a.set_unavailable();
                }
            }
            pos += 1;
        }
        link.phase = Phase::Ready;
        let (conn, peer) = (link.conn, link.peer);
        let accs = link.accs.clone();
        let rec = &mut self.peers[peer];
        rec.state = ConnState::Connected;
        info!("{peer} {:?} connected with {} accessories", rec.name, accs.len());
        self.publish_link(&accs, Kind::Connected, u16::from(conn));
        self.reg.publish(Source::Central, Kind::ServicesAvailable, 0_u8);
    }

    /// Publishes an event from every registered accessory in `accs`.
    fn publish_link(&mut self, accs: &[AccId], kind: Kind, payload: impl Into<u32>) {
        let payload = payload.into();
        let mut srcs = SmallVec::<[Source; 8]>::new();
        self.reg.for_each_of_role(report::Role::Accessory, |s| {
            if matches!(s, Source::Accessory(id) if accs.contains(&id)) {
                srcs.push(s);
            }
        });
        for s in srcs {
            self.reg.publish(s, kind, payload);
        }
    }
}
