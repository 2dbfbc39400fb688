use matches::assert_matches;

use pointlink_const::{AccessoryChar, Characteristic, Descriptor, Service};

use crate::att::HandleRange;
use crate::gap::ResponseDataMut;
use crate::gatt::CharProps;
use crate::host::mock::{MockTransport, Req};
use crate::host::Error as HostError;
use crate::le::RawAddr;

use super::*;

type Rx = mpsc::UnboundedReceiver<Report>;

const NAME_HANDLE: u16 = 0x03;

fn h(v: u16) -> Handle {
    Handle::new(v).unwrap()
}

fn conn(v: u16) -> ConnHandle {
    ConnHandle::new(v).unwrap()
}

fn addr(v: u8) -> Addr {
    Addr::Random(RawAddr::from([v, 0x02, 0x03, 0x04, 0x05, 0xC0]))
}

fn central() -> (Central<MockTransport>, Rx) {
    let mut c = Central::new(Config::default(), MockTransport::default());
    let rx = c.subscribe();
    (c, rx)
}

fn reports(rx: &mut Rx) -> Vec<(Source, Kind, u32)> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|r| (r.source, r.kind, r.payload))
        .collect()
}

fn adv(name: &str, a: Addr, svc: bool) -> Event {
    let mut d = ResponseDataMut::new();
    if svc {
        d.service_class(true, &[ACCESSORY_SERVICE]);
    }
    d.local_name(true, name);
    Event::AdvReport {
        addr: a,
        data: d.get().to_vec(),
    }
}

fn connected(c: ConnHandle) -> Event {
    Event::ConnectionComplete {
        status: Status::Success,
        conn: c,
        role: Role::Central,
        peer: addr(1),
    }
}

fn disconnected(c: ConnHandle) -> Event {
    Event::DisconnectionComplete {
        conn: c,
        reason: Status::RemoteUserTerminatedConnection,
    }
}

fn read(c: ConnHandle, v: u16, val: &[u8]) -> Event {
    Event::ReadComplete {
        conn: c,
        handle: h(v),
        result: Ok(Value::from_slice(val)),
    }
}

fn written(c: ConnHandle, v: u16) -> Event {
    Event::WriteComplete {
        conn: c,
        handle: h(v),
        result: Ok(()),
    }
}

/// Descriptor discovery events reporting the state CCCD at `cccd`.
fn descriptors(c: ConnHandle, cccd: u16) -> [Event; 2] {
    [
        Event::DescriptorDiscovered {
            conn: c,
            desc: DiscoveredDesc::new(h(cccd), Descriptor::ClientCharacteristicConfiguration.into()),
        },
        Event::DescriptorDiscoveryTerminated { conn: c },
    ]
}

/// Handles of the accessory service starting at `base`.
struct Layout {
    identity: u16,
    state: u16,
    cccd: u16,
    command: u16,
}

impl Layout {
    const fn at(base: u16) -> Self {
        Self {
            identity: base + 2,
            state: base + 4,
            cccd: base + 5,
            command: base + 8,
        }
    }
}

/// Service discovery events for a peer with a GAP service and one accessory
/// service at each of `bases`.
fn discovery(c: ConnHandle, bases: &[u16]) -> Vec<Event> {
    let range = |a, b| HandleRange::new(h(a), h(b)).unwrap();
    let chr = |v, end, props, uuid| Event::CharDiscovered {
        conn: c,
        chr: DiscoveredChar::new(h(v), h(end), props, uuid),
    };
    let mut evs = vec![
        Event::ServiceDiscovered {
            conn: c,
            service: DiscoveredService::new(range(0x01, 0x05), Service::GenericAccess.into()),
        },
        chr(NAME_HANDLE, NAME_HANDLE, CharProps::READ, Characteristic::DeviceName.into()),
    ];
    for &b in bases {
        let l = Layout::at(b);
        evs.extend([
            Event::ServiceDiscovered {
                conn: c,
                service: DiscoveredService::new(range(b, b + 8), ACCESSORY_SERVICE),
            },
            chr(l.identity, l.identity, CharProps::READ, AccessoryChar::Identity.uuid()),
            chr(
                l.state,
                l.state + 2,
                CharProps::READ | CharProps::NOTIFY,
                AccessoryChar::State.uuid(),
            ),
            chr(l.command, l.command, CharProps::WRITE, AccessoryChar::Command.uuid()),
        ]);
    }
    evs.push(Event::ServiceDiscoveryTerminated { conn: c });
    evs
}

fn feed(c: &mut Central<MockTransport>, evs: impl IntoIterator<Item = Event>) {
    evs.into_iter().for_each(|e| c.handle_event(e));
}

/// Runs first-time initialization of the accessory at `base`, stopping
/// before the subscription write completes.
fn init_first(c: &mut Central<MockTransport>, cn: ConnHandle, base: u16, id: &[u8], state: u8) {
    let l = Layout::at(base);
    assert_eq!(c.transport_mut().take(), [Req::Read(cn, h(l.identity))]);
    c.handle_event(read(cn, l.identity, id));
    let range = HandleRange::new(h(l.cccd), h(l.state + 2)).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::DiscoverDescriptors(cn, range)]);
    feed(c, descriptors(cn, l.cccd));
    assert_eq!(c.transport_mut().take(), [Req::Read(cn, h(l.state))]);
    c.handle_event(read(cn, l.state, &[state]));
    assert_eq!(c.transport_mut().take(), [Req::Write(cn, h(l.cccd), vec![0x01, 0x00])]);
}

/// Connects peer Pt1 hosting accessory P001 at 0x10.
fn connect_pt1() -> (Central<MockTransport>, Rx, ConnHandle) {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect_by_name("Pt1").unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    feed(&mut c, discovery(cn, &[0x10]));
    assert_eq!(c.transport_mut().take()[2..], [Req::Read(cn, h(NAME_HANDLE))]);
    c.handle_event(read(cn, NAME_HANDLE, b"Pt1"));
    init_first(&mut c, cn, 0x10, b"P001", 0x01);
    c.handle_event(written(cn, 0x15));
    reports(&mut rx);
    (c, rx, cn)
}

#[test]
fn scan() {
    let (mut c, mut rx) = central();
    c.start_scan().unwrap();
    assert_eq!(c.transport_mut().take(), [Req::Scan]);
    c.handle_event(adv("Other", addr(9), false));
    c.handle_event(adv("Pt1", addr(1), true));
    c.handle_event(adv("Pt1", addr(1), true));
    c.handle_event(Event::ScanTimeout);
    assert_eq!(
        reports(&mut rx),
        [
            (Source::Central, Kind::ScanStarted, 0),
            (Source::Central, Kind::PeerFound, 0),
            (Source::Central, Kind::ScanDone, 0),
        ]
    );
    assert_eq!(c.peers().count(), 1);
    assert_eq!(c.peers().name(PeerIdx(0)), Some("Pt1"));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connectable));

    c.transport_mut().fail_next(HostError::Busy);
    assert_matches!(c.start_scan(), Err(Error::Host(HostError::Busy)));
    assert!(reports(&mut rx).is_empty());
}

#[test]
fn first_connection() {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    let pt1 = c.peers().index_of("Pt1").unwrap();
    c.connect_by_index(0).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::Connect(addr(1))]);
    assert_eq!(c.conn_state(pt1), Some(ConnState::Connectable));

    let cn = conn(0x40);
    c.handle_event(connected(cn));
    assert_eq!(c.conn_state(pt1), Some(ConnState::Connecting));
    assert_eq!(c.connection(), Some((pt1, cn)));
    assert_eq!(c.transport_mut().take(), [Req::DiscoverServices(cn)]);

    let mut evs = discovery(cn, &[0x10]).into_iter();
    feed(&mut c, evs.by_ref().take(3));
    assert_eq!(c.conn_state(pt1), Some(ConnState::ServiceDiscovery));
    feed(&mut c, evs);
    assert_eq!(c.conn_state(pt1), Some(ConnState::Init));
    assert_eq!(c.transport_mut().take(), [Req::Read(cn, h(NAME_HANDLE))]);
    assert_eq!(c.accessories().len(), 1);

    c.handle_event(read(cn, NAME_HANDLE, b"Pt1"));
    init_first(&mut c, cn, 0x10, b"P001", 0x01);
    assert_eq!(c.conn_state(pt1), Some(ConnState::Init));
    c.handle_event(written(cn, 0x15));
    assert_eq!(c.conn_state(pt1), Some(ConnState::Connected));

    let id = c.find_accessory("P001").unwrap();
    assert_eq!(c.identity(id).unwrap(), "P001");
    assert_eq!(c.state(id).unwrap(), PointState::Normal);
    assert_eq!(c.accessory(id).unwrap().owner(), Some(pt1));
    let rec = c.peers().get(pt1).unwrap();
    assert!(rec.discovered);
    assert_eq!(rec.accessories, [id]);
    assert_eq!(
        reports(&mut rx),
        [
            (Source::Central, Kind::PeerFound, 0),
            (Source::Central, Kind::Connected, 0x40),
            (Source::Accessory(id), Kind::Discovered, 0),
            (Source::Accessory(id), Kind::Connected, 0x40),
            (Source::Central, Kind::ServicesAvailable, 0),
        ]
    );
    assert!(c.transport_mut().take().is_empty());
}

#[test]
fn command_and_notification() {
    let (mut c, mut rx, cn) = connect_pt1();
    let id = c.find_accessory("P001").unwrap();

    c.set_command(id, 0x02).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::Write(cn, h(0x18), vec![0x02])]);
    assert_eq!(c.accessory(id).unwrap().command(), Some(crate::Command::Reverse));
    c.handle_event(written(cn, 0x18));
    assert!(reports(&mut rx).is_empty());

    let notify = |v, val: &[u8]| Event::Notification {
        conn: cn,
        handle: h(v),
        value: Value::from_slice(val),
    };
    c.handle_event(notify(0x14, &[0x03]));
    c.handle_event(notify(0x14, &[0x02]));
    c.handle_event(notify(0x18, &[0x01]));
    c.handle_event(Event::Notification {
        conn: conn(0x41),
        handle: h(0x14),
        value: Value::from_slice(&[0x01]),
    });
    assert_eq!(
        reports(&mut rx),
        [
            (Source::Accessory(id), Kind::StateChanged, 3),
            (Source::Accessory(id), Kind::StateChanged, 2),
        ]
    );
    assert_eq!(c.state(id).unwrap(), PointState::Reverse);

    assert_matches!(c.set_command(id, 0x07), Err(Error::InvalidCommand(0x07)));
    assert_matches!(c.set_command(AccId(5), 0x01), Err(Error::UnknownAccessory(_)));
    assert!(c.transport_mut().take().is_empty());
}

#[test]
fn reconnection() {
    let (mut c, mut rx, cn) = connect_pt1();
    let pt1 = PeerIdx(0);
    let id = c.find_accessory("P001").unwrap();

    c.handle_event(disconnected(cn));
    assert_eq!(c.conn_state(pt1), Some(ConnState::Disconnected));
    assert_eq!(c.connection(), None);
    assert_eq!(c.state(id).unwrap(), PointState::Unavailable);
    assert_eq!(
        reports(&mut rx),
        [
            (Source::Accessory(id), Kind::Disconnected, 0x13),
            (Source::Central, Kind::Disconnected, 0x13),
        ]
    );
    assert_matches!(c.set_command(id, 0x01), Err(Error::Unavailable(_)));
    assert!(c.transport_mut().take().is_empty());

    c.connect(pt1).unwrap();
    let cn = conn(0x41);
    c.transport_mut().take();
    c.handle_event(connected(cn));
    assert_eq!(c.conn_state(pt1), Some(ConnState::ReconnectInit));
    assert_eq!(c.transport_mut().take(), [Req::Read(cn, h(0x14))]);
    c.handle_event(read(cn, 0x14, &[0x02]));
    assert_eq!(c.transport_mut().take(), [Req::Write(cn, h(0x15), vec![0x01, 0x00])]);
    c.handle_event(written(cn, 0x15));
    assert_eq!(c.conn_state(pt1), Some(ConnState::Connected));
    assert_eq!(c.state(id).unwrap(), PointState::Reverse);
    assert_eq!(c.identity(id).unwrap(), "P001");
    assert_eq!(c.accessories().len(), 1);
    assert_eq!(
        reports(&mut rx),
        [
            (Source::Central, Kind::Connected, 0x41),
            (Source::Accessory(id), Kind::Connected, 0x41),
            (Source::Central, Kind::ServicesAvailable, 0),
        ]
    );

    c.set_command(id, 0x01).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::Write(cn, h(0x18), vec![0x01])]);
}

#[test]
fn disconnect_during_init() {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect_by_name("Pt1").unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    feed(&mut c, discovery(cn, &[0x10]));
    c.handle_event(read(cn, NAME_HANDLE, b"Pt1"));
    c.transport_mut().take();
    c.handle_event(read(cn, 0x12, b"P001"));
    let id = c.find_accessory("P001").unwrap();
    let range = HandleRange::new(h(0x15), h(0x16)).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::DiscoverDescriptors(cn, range)]);
    reports(&mut rx);

    c.handle_event(disconnected(cn));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Disconnected));
    assert_eq!(c.state(id).unwrap(), PointState::Unavailable);
    assert_eq!(
        reports(&mut rx),
        [
            (Source::Accessory(id), Kind::Disconnected, 0x13),
            (Source::Central, Kind::Disconnected, 0x13),
        ]
    );

    // Late completions are ignored
    c.handle_event(Event::DescriptorDiscoveryTerminated { conn: cn });
    assert!(c.transport_mut().take().is_empty());
}

#[test]
fn disconnect_during_discovery() {
    let (mut c, _rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect_by_name("Pt1").unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    let evs = discovery(cn, &[0x10]);
    feed(&mut c, evs.iter().take(4).cloned());
    assert_eq!(c.accessories().len(), 1);
    c.handle_event(disconnected(cn));

    let rec = c.peers().get(PeerIdx(0)).unwrap();
    assert!(!rec.discovered);
    assert!(rec.accessories.is_empty());
    let a = c.accessories().iter().next().unwrap();
    assert_eq!(a.owner(), None);
    assert_eq!(a.state(), PointState::Unavailable);

    c.transport_mut().take();
    c.connect(PeerIdx(0)).unwrap();
    let cn = conn(0x41);
    c.handle_event(connected(cn));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connecting));
    assert_eq!(c.transport_mut().take()[1..], [Req::DiscoverServices(cn)]);
}

#[test]
fn local_disconnect() {
    let (mut c, mut rx) = central();
    assert_matches!(c.disconnect(), Err(Error::NotConnected));

    let (mut c2, _, cn) = connect_pt1();
    c2.disconnect().unwrap();
    assert_eq!(
        c2.transport_mut().take(),
        [Req::Disconnect(cn, DisconnectReason::RemoteUserTerminatedConnection)]
    );
    assert_eq!(c2.conn_state(PeerIdx(0)), Some(ConnState::Disconnecting));
    assert_matches!(c2.disconnect(), Err(Error::InvalidState(ConnState::Disconnecting)));
    assert_matches!(c2.connect(PeerIdx(0)), Err(Error::InvalidState(_)));
    c2.handle_event(disconnected(cn));
    assert_eq!(c2.conn_state(PeerIdx(0)), Some(ConnState::Disconnected));

    // Request failure
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    c.handle_event(connected(conn(0x40)));
    c.transport_mut().fail_next(HostError::Busy);
    assert_matches!(c.disconnect(), Err(Error::Host(HostError::Busy)));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Error));
    assert_eq!(c.connection(), None);
    assert!(reports(&mut rx).iter().all(|r| r.1 != Kind::Disconnected));
}

#[test]
fn failed_disconnect_abandons_link() {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    feed(&mut c, discovery(cn, &[0x10]));
    c.handle_event(read(cn, NAME_HANDLE, b"Pt1"));
    assert_eq!(c.transport_mut().take()[3..], [Req::Read(cn, h(0x12))]);
    reports(&mut rx);

    c.transport_mut().fail_next(HostError::Busy);
    assert_matches!(c.disconnect(), Err(Error::Host(HostError::Busy)));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Error));
    assert_eq!(c.connection(), None);
    assert_eq!(c.state(AccId(0)).unwrap(), PointState::Unavailable);

    // Completions from the abandoned link do not resume initialization
    c.handle_event(read(cn, 0x12, b"P001"));
    c.handle_event(disconnected(cn));
    assert_eq!(c.identity(AccId(0)).unwrap(), "");
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Error));
    assert!(c.transport_mut().take().is_empty());
    assert!(reports(&mut rx).is_empty());

    // The identity was never read, so it is read on reconnection
    c.connect(PeerIdx(0)).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::Connect(addr(1))]);
    let cn = conn(0x41);
    c.handle_event(connected(cn));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::ReconnectInit));
    init_first(&mut c, cn, 0x10, b"P001", 0x01);
    c.handle_event(written(cn, 0x15));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connected));
    assert_eq!(c.find_accessory("P001"), Some(AccId(0)));
    assert_eq!(c.accessories().len(), 1);
}

#[test]
fn failed_service_discovery() {
    // Discovery and the following disconnect both fail
    let (mut c, _rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    c.transport_mut().fail_next(HostError::Busy);
    c.transport_mut().fail_next(HostError::Busy);
    c.handle_event(connected(conn(0x40)));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Error));
    assert_eq!(c.connection(), None);
    c.connect(PeerIdx(0)).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::Connect(addr(1)), Req::Connect(addr(1))]);

    // Only discovery fails
    let (mut c, _rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    c.transport_mut().fail_next(HostError::Busy);
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Error));
    assert_eq!(
        c.transport_mut().take()[1..],
        [Req::Disconnect(cn, DisconnectReason::RemoteUserTerminatedConnection)]
    );
    assert_matches!(c.connect(PeerIdx(0)), Err(Error::Busy));
    c.handle_event(disconnected(cn));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Disconnected));
    c.connect(PeerIdx(0)).unwrap();
}

/// Drops the first connection to Pt1 after `done` of the first-time
/// initialization completions for the accessory at 0x10 were received.
fn interrupted_init(done: usize) -> (Central<MockTransport>, Rx) {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect_by_name("Pt1").unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    feed(&mut c, discovery(cn, &[0x10]));
    c.handle_event(read(cn, NAME_HANDLE, b"Pt1"));
    let [desc, term] = descriptors(cn, 0x15);
    let steps = [read(cn, 0x12, b"P001"), desc, term];
    feed(&mut c, steps.into_iter().take(done));
    c.handle_event(disconnected(cn));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Disconnected));
    c.transport_mut().take();
    reports(&mut rx);
    (c, rx)
}

#[test]
fn reconnect_after_interrupted_init() {
    let l = Layout::at(0x10);
    let range = HandleRange::new(h(l.cccd), h(l.state + 2)).unwrap();
    let (cn, id) = (conn(0x41), AccId(0));
    for done in [0, 1, 3] {
        let (mut c, mut rx) = interrupted_init(done);
        assert_eq!(c.state(id).unwrap(), PointState::Unavailable);
        c.connect(PeerIdx(0)).unwrap();
        c.transport_mut().take();
        c.handle_event(connected(cn));
        assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::ReconnectInit));
        if done == 0 {
            assert_eq!(c.transport_mut().take(), [Req::Read(cn, h(l.identity))]);
            c.handle_event(read(cn, l.identity, b"P001"));
        }
        if done < 3 {
            assert_eq!(c.transport_mut().take(), [Req::DiscoverDescriptors(cn, range)]);
            feed(&mut c, descriptors(cn, l.cccd));
        }
        assert_eq!(c.transport_mut().take(), [Req::Read(cn, h(l.state))]);
        c.handle_event(read(cn, l.state, &[0x02]));
        assert_eq!(c.transport_mut().take(), [Req::Write(cn, h(l.cccd), vec![0x01, 0x00])]);
        c.handle_event(written(cn, l.cccd));

        assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connected), "{done}");
        assert_eq!(c.state(id).unwrap(), PointState::Reverse);
        assert_eq!(c.find_accessory("P001"), Some(id));
        let r = reports(&mut rx);
        assert_eq!(
            r[r.len() - 2..],
            [
                (Source::Accessory(id), Kind::Connected, 0x41),
                (Source::Central, Kind::ServicesAvailable, 0),
            ]
        );
    }
}

#[test]
fn connect_rejected() {
    let (mut c, _rx) = central();
    assert_matches!(c.connect_by_name("Pt1"), Err(Error::UnknownPeer));
    assert_matches!(c.connect_by_index(0), Err(Error::UnknownPeer));
    c.handle_event(adv("Pt1", addr(1), true));
    c.handle_event(adv("Pt2", addr(2), true));

    c.transport_mut().fail_next(HostError::Busy);
    assert_matches!(c.connect(PeerIdx(0)), Err(Error::Host(HostError::Busy)));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connectable));

    c.connect(PeerIdx(0)).unwrap();
    assert_matches!(c.connect(PeerIdx(1)), Err(Error::Busy));
    assert_eq!(c.transport_mut().take(), [Req::Connect(addr(1))]);

    let (mut c, _rx, _) = connect_pt1();
    assert_matches!(c.connect(PeerIdx(0)), Err(Error::InvalidState(ConnState::Connected)));
}

#[test]
fn connect_failed() {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    c.handle_event(Event::ConnectionComplete {
        status: Status::ConnectionFailedToBeEstablished,
        conn: conn(0x40),
        role: Role::Central,
        peer: addr(1),
    });
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Error));
    assert_eq!(c.connection(), None);
    assert_eq!(reports(&mut rx), [(Source::Central, Kind::PeerFound, 0)]);

    // Unrequested connections are ignored
    c.handle_event(connected(conn(0x41)));
    assert_eq!(c.connection(), None);

    c.transport_mut().take();
    c.connect(PeerIdx(0)).unwrap();
    assert_eq!(c.transport_mut().take(), [Req::Connect(addr(1))]);
}

#[test]
fn failed_accessory_is_skipped() {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    feed(&mut c, discovery(cn, &[0x10, 0x20]));
    c.handle_event(read(cn, NAME_HANDLE, b"Pt1"));
    c.transport_mut().take();

    c.handle_event(Event::ReadComplete {
        conn: cn,
        handle: h(0x12),
        result: Err(ErrorCode::ReadNotPermitted),
    });
    init_first(&mut c, cn, 0x20, b"P002", 0x02);
    c.handle_event(written(cn, 0x25));
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connected));

    let (a, b) = (AccId(0), AccId(1));
    assert_eq!(c.state(a).unwrap(), PointState::Unavailable);
    assert_eq!(c.state(b).unwrap(), PointState::Reverse);
    assert_eq!(c.identity(b).unwrap(), "P002");
    assert_eq!(
        reports(&mut rx)[2..],
        [
            (Source::Accessory(b), Kind::Discovered, 0),
            (Source::Accessory(a), Kind::Connected, 0x40),
            (Source::Accessory(b), Kind::Connected, 0x40),
            (Source::Central, Kind::ServicesAvailable, 0),
        ]
    );
}

#[test]
fn missing_cccd() {
    let (mut c, _rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    feed(&mut c, discovery(cn, &[0x10]));
    c.handle_event(read(cn, NAME_HANDLE, b"Pt1"));
    c.handle_event(read(cn, 0x12, b"P001"));
    c.transport_mut().take();
    c.handle_event(Event::DescriptorDiscoveryTerminated { conn: cn });
    assert!(c.transport_mut().take().is_empty());
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connected));
    assert_eq!(c.state(AccId(0)).unwrap(), PointState::Unavailable);
}

#[test]
fn no_accessories() {
    let (mut c, mut rx) = central();
    c.handle_event(adv("Pt1", addr(1), true));
    c.connect(PeerIdx(0)).unwrap();
    let cn = conn(0x40);
    c.handle_event(connected(cn));
    let mut evs = discovery(cn, &[]);
    evs.remove(1);
    feed(&mut c, evs);
    assert_eq!(c.conn_state(PeerIdx(0)), Some(ConnState::Connected));
    assert_eq!(c.transport_mut().take(), [Req::Connect(addr(1)), Req::DiscoverServices(cn)]);
    assert_eq!(
        reports(&mut rx).last(),
        Some(&(Source::Central, Kind::ServicesAvailable, 0))
    );
}

#[test]
fn connection_state() {
    use ConnState::*;
    for s in [Connectable, Disconnected, Error] {
        assert!(s.can_connect());
        assert!(!s.is_linked());
    }
    for s in [Connecting, ServiceDiscovery, Init, ReconnectInit, Connected, Disconnecting] {
        assert!(!s.can_connect());
        assert!(s.is_linked());
    }
    assert!(!Initial.can_connect());
    assert_eq!(ReconnectInit.to_string(), "ReconnectInit");
}
