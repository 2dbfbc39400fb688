//! Drives the accessory central against simulated point-motor peripherals.
//!
//! ```text
//! RUST_LOG=debug cargo run --example simulate -- --peers 2 --points 3
//! ```

#![allow(unused_crate_dependencies)]
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use pointlink::att::{ErrorCode, Handle, HandleRange};
use pointlink::gap::ResponseDataMut;
use pointlink::gatt::{CharProps, DiscoveredChar, DiscoveredDesc, DiscoveredService};
use pointlink::hci::{ConnHandle, ConnParams, DisconnectReason, Role, ScanParams, Status};
use pointlink::host::{self, Event, Transport, Value};
use pointlink::le::{Addr, RawAddr};
use pointlink::report::{Kind, Report, Source};
use pointlink::runtime::{EventLoop, Handle as App};
use pointlink::*;
use pointlink_const::{AccessoryChar, Characteristic, Descriptor, Service, ACCESSORY_SERVICE};

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated peripherals.
    #[arg(long, default_value_t = 2)]
    peers: u8,

    /// Number of points per peripheral.
    #[arg(long, default_value_t = 2)]
    points: u8,

    /// Read commands from stdin after the scripted run.
    #[arg(short, long)]
    interactive: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let cfg = match args.config {
        Some(ref p) => {
            let f = std::fs::File::open(p).with_context(|| format!("failed to open {p:?}"))?;
            serde_json::from_reader(f).with_context(|| format!("invalid config {p:?}"))?
        }
        None => Config::default(),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let sim = Sim::new(tx, args.peers, args.points);
    let (event_loop, app) = EventLoop::spawn(Central::new(cfg, sim), rx);
    let mut reports = app.subscribe().await?;
    let printer = tokio::spawn(async move {
        while let Some(r) = reports.recv().await {
            print_report(&r);
        }
    });

    let r = run(&app, &args).await;
    drop(app);
    event_loop.await?;
    printer.abort();
    r
}

/// Scripted session: scan, connect, throw every point, disconnect, and
/// reconnect.
async fn run(app: &App, args: &Args) -> Result<()> {
    app.scan().await?;
    settle().await;
    let peers = app.peers().await?;
    let Some(first) = peers.first() else {
        bail!("no peers found");
    };
    info!("Connecting to {:?}", first.name);
    app.connect_by_name(first.name.as_str()).await?;
    settle().await;

    let peers = app.peers().await?;
    for &id in &peers[0].accessories {
        let ident = app.identity(id).await?;
        info!("{ident}: {}", app.state(id).await?);
        app.set_command(id, Command::Reverse.into()).await?;
    }
    tokio::time::sleep(Sim::THROW_TIME * 2).await;

    app.disconnect().await?;
    settle().await;
    app.connect_by_index(0).await?;
    settle().await;
    for &id in &peers[0].accessories {
        println!("{} = {}", app.identity(id).await?, app.state(id).await?);
    }
    if args.interactive {
        interact(app).await?;
    }
    Ok(())
}

/// Processes stdin commands until EOF or Ctrl-C.
async fn interact(app: &App) -> Result<()> {
    println!("Commands: scan | peers | connect <name> | disconnect | set <id> <1|2> | state <id>");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let ln: String = tokio::select! {
            ln = lines.next_line() => match ln? {
                Some(ln) => ln,
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        if let Err(e) = exec(app, ln.split_whitespace().collect()).await {
            eprintln!("{e}");
        }
    }
}

async fn exec(app: &App, cmd: Vec<&str>) -> Result<()> {
    match cmd[..] {
        ["scan"] => app.scan().await?,
        ["peers"] => {
            for p in app.peers().await? {
                println!("{} {:?} {} {:?}", p.idx, p.name, p.state, p.accessories);
            }
        }
        ["connect", name] => app.connect_by_name(name).await?,
        ["disconnect"] => app.disconnect().await?,
        ["set", ident, cmd] => app.set_command(find(app, ident).await?, cmd.parse()?).await?,
        ["state", ident] => println!("{}", app.state(find(app, ident).await?).await?),
        [] => {}
        _ => bail!("unknown command"),
    }
    Ok(())
}

async fn find(app: &App, ident: &str) -> Result<AccId> {
    (app.find_accessory(ident).await?).with_context(|| format!("unknown accessory {ident:?}"))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn print_report(r: &Report) {
    match (r.source, r.kind) {
        (Source::Accessory(id), Kind::StateChanged) => {
            let s = PointState::from_wire(&[u8::try_from(r.payload).unwrap_or(0)]);
            println!("{id} {}: {s}", r.kind);
        }
        (src, kind) => println!("{src:?} {kind}: {:#X}", r.payload),
    }
}

/// Simulated point motor.
#[derive(Clone, Debug)]
struct Point {
    identity: String,
    state: PointState,
    notify: bool,
}

/// Simulated peripheral hosting one accessory service per point.
#[derive(Debug)]
struct Peripheral {
    name: String,
    addr: Addr,
    points: Vec<Point>,
}

impl Peripheral {
    const NAME: u16 = 0x03;

    /// Returns the first handle of accessory service `i`.
    const fn base(i: usize) -> u16 {
        0x10 * (i as u16 + 1)
    }

    /// Maps a handle to a point and characteristic.
    fn lookup(&self, h: Handle) -> Option<(usize, u16)> {
        let v = u16::from(h);
        let i = usize::from(v / 0x10).checked_sub(1)?;
        (i < self.points.len()).then_some((i, v % 0x10))
    }
}

/// Transport that answers requests on behalf of simulated peripherals.
#[derive(Debug)]
struct Sim {
    tx: mpsc::UnboundedSender<Event>,
    peers: Vec<Peripheral>,
    link: Option<(usize, ConnHandle)>,
    next_conn: u16,
}

impl Sim {
    const THROW_TIME: Duration = Duration::from_millis(300);

    fn new(tx: mpsc::UnboundedSender<Event>, peers: u8, points: u8) -> Self {
        let peers = (1..=peers)
            .map(|p| Peripheral {
                name: format!("Pt{p}"),
                addr: Addr::Random(RawAddr::from([p, 0x00, 0x5E, 0xA1, 0x1D, 0xC0])),
                points: (1..=points)
                    .map(|i| Point {
                        identity: format!("P{p}{i:02}"),
                        state: PointState::Normal,
                        notify: false,
                    })
                    .collect(),
            })
            .collect();
        Self {
            tx,
            peers,
            link: None,
            next_conn: 0x40,
        }
    }

    fn send(&self, e: Event) {
        if self.tx.send(e).is_err() {
            debug!("Event loop closed");
        }
    }

    fn peer(&self, conn: ConnHandle) -> host::Result<&Peripheral> {
        match self.link {
            Some((i, c)) if c == conn => Ok(&self.peers[i]),
            _ => Err(host::Error::NotConnected),
        }
    }

    fn peer_mut(&mut self, conn: ConnHandle) -> host::Result<&mut Peripheral> {
        match self.link {
            Some((i, c)) if c == conn => Ok(&mut self.peers[i]),
            _ => Err(host::Error::NotConnected),
        }
    }
}

fn h(v: u16) -> Handle {
    Handle::new(v).unwrap_or(Handle::MIN)
}

impl Transport for Sim {
    fn connect(&mut self, peer: Addr, p: &ConnParams) -> host::Result<()> {
        p.ticks().ok_or(host::Error::InvalidParameters)?;
        if self.link.is_some() {
            return Err(host::Error::Busy);
        }
        let status = match self.peers.iter().position(|p| p.addr == peer) {
            Some(i) => {
                let conn = ConnHandle::new(self.next_conn).ok_or(host::Error::Busy)?;
                self.next_conn += 1;
                self.link = Some((i, conn));
                self.send(Event::ConnectionComplete {
                    status: Status::Success,
                    conn,
                    role: Role::Central,
                    peer,
                });
                return Ok(());
            }
            None => Status::ConnectionFailedToBeEstablished,
        };
        self.send(Event::ConnectionComplete {
            status,
            conn: ConnHandle::new(0x0EFF).ok_or(host::Error::Busy)?,
            role: Role::Central,
            peer,
        });
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: DisconnectReason) -> host::Result<()> {
        let p = self.peer_mut(conn)?;
        p.points.iter_mut().for_each(|pt| pt.notify = false);
        self.link = None;
        self.send(Event::DisconnectionComplete {
            conn,
            reason: reason.into(),
        });
        Ok(())
    }

    fn scan(&mut self, p: &ScanParams) -> host::Result<()> {
        p.ticks().ok_or(host::Error::InvalidParameters)?;
        for p in &self.peers {
            let mut d = ResponseDataMut::new();
            d.service_class(true, &[ACCESSORY_SERVICE]).local_name(true, &p.name);
            self.send(Event::AdvReport {
                addr: p.addr,
                data: d.get().to_vec(),
            });
        }
        let tx = self.tx.clone();
        let d = p.duration;
        tokio::spawn(async move {
            tokio::time::sleep(d.min(Duration::from_millis(50))).await;
            let _ = tx.send(Event::ScanTimeout);
        });
        Ok(())
    }

    fn discover_services(&mut self, conn: ConnHandle) -> host::Result<()> {
        let p = self.peer(conn)?;
        let range = |a, b| HandleRange::new(h(a), h(b)).ok_or(host::Error::InvalidParameters);
        let chr = |v: u16, end: u16, props, uuid| Event::CharDiscovered {
            conn,
            chr: DiscoveredChar::new(h(v), h(end), props, uuid),
        };
        let mut evs = vec![
            Event::ServiceDiscovered {
                conn,
                service: DiscoveredService::new(range(0x01, 0x05)?, Service::GenericAccess.into()),
            },
            chr(
                Peripheral::NAME,
                Peripheral::NAME,
                CharProps::READ,
                Characteristic::DeviceName.into(),
            ),
        ];
        for i in 0..p.points.len() {
            let b = Peripheral::base(i);
            evs.extend([
                Event::ServiceDiscovered {
                    conn,
                    service: DiscoveredService::new(range(b, b + 8)?, ACCESSORY_SERVICE),
                },
                chr(b + 2, b + 2, CharProps::READ, AccessoryChar::Identity.uuid()),
                chr(
                    b + 4,
                    b + 6,
                    CharProps::READ | CharProps::NOTIFY,
                    AccessoryChar::State.uuid(),
                ),
                chr(b + 8, b + 8, CharProps::WRITE, AccessoryChar::Command.uuid()),
            ]);
        }
        evs.push(Event::ServiceDiscoveryTerminated { conn });
        evs.into_iter().for_each(|e| self.send(e));
        Ok(())
    }

    fn discover_descriptors(&mut self, conn: ConnHandle, range: HandleRange) -> host::Result<()> {
        let p = self.peer(conn)?;
        if let Some((_, 5)) = p.lookup(range.start()) {
            self.send(Event::DescriptorDiscovered {
                conn,
                desc: DiscoveredDesc::new(
                    range.start(),
                    Descriptor::ClientCharacteristicConfiguration.into(),
                ),
            });
        }
        self.send(Event::DescriptorDiscoveryTerminated { conn });
        Ok(())
    }

    fn read(&mut self, conn: ConnHandle, handle: Handle) -> host::Result<()> {
        let p = self.peer(conn)?;
        let result = if u16::from(handle) == Peripheral::NAME {
            Ok(Value::from_slice(p.name.as_bytes()))
        } else {
            match p.lookup(handle) {
                Some((i, 2)) => Ok(Value::from_slice(p.points[i].identity.as_bytes())),
                Some((i, 4)) => Ok(Value::from_slice(&[p.points[i].state.into()])),
                _ => Err(ErrorCode::ReadNotPermitted),
            }
        };
        self.send(Event::ReadComplete {
            conn,
            handle,
            result,
        });
        Ok(())
    }

    fn write(&mut self, conn: ConnHandle, handle: Handle, v: &[u8]) -> host::Result<()> {
        let tx = self.tx.clone();
        let p = self.peer_mut(conn)?;
        let (result, throw) = match (p.lookup(handle), v) {
            (Some((i, 5)), [cfg, 0]) => {
                p.points[i].notify = *cfg & 1 != 0;
                (Ok(()), None)
            }
            (Some((i, 8)), &[c]) => match Command::try_from(c) {
                Ok(c) => {
                    let pt = &mut p.points[i];
                    pt.state = match c {
                        Command::Normal => PointState::Normal,
                        Command::Reverse => PointState::Reverse,
                    };
                    (Ok(()), pt.notify.then_some((i, pt.state)))
                }
                Err(_) => (Err(ErrorCode::ValueNotAllowed), None),
            },
            _ => (Err(ErrorCode::WriteNotPermitted), None),
        };
        self.send(Event::WriteComplete {
            conn,
            handle,
            result,
        });
        if let Some((i, end)) = throw {
            let state = h(Peripheral::base(i) + 4);
            let notify = move |s: PointState| Event::Notification {
                conn,
                handle: state,
                value: Value::from_slice(&[s.into()]),
            };
            self.send(notify(PointState::Moving));
            tokio::spawn(async move {
                tokio::time::sleep(Sim::THROW_TIME).await;
                if tx.send(notify(end)).is_err() {
                    warn!("Event loop closed before throw completed");
                }
            });
        }
        Ok(())
    }
}
