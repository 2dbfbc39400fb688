//! Event-processing task.
//!
//! The [`Central`] is owned by a single task that receives transport events
//! and application requests. Transport completions and application calls are
//! therefore never processed concurrently. The application talks to the task
//! through a cloneable [`Handle`].

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::host::{Event, Transport};
use crate::report::Report;
use crate::{AccId, Central, ConnState, Error, PeerIdx, PointState, Result};

/// Maximum number of queued application requests.
const REQ_QUEUE: usize = 16;

type Reply<R> = oneshot::Sender<R>;

/// Connection target.
#[derive(Clone, Debug)]
enum Target {
    Index(usize),
    Name(String),
}

/// Application request.
#[derive(Debug)]
enum Req {
    Scan(Reply<Result<()>>),
    Connect(Target, Reply<Result<()>>),
    Disconnect(Reply<Result<()>>),
    SetCommand(AccId, u8, Reply<Result<()>>),
    State(AccId, Reply<Result<PointState>>),
    Identity(AccId, Reply<Result<String>>),
    Find(String, Reply<Option<AccId>>),
    Peers(Reply<Vec<PeerInfo>>),
    Subscribe(Reply<mpsc::UnboundedReceiver<Report>>),
}

impl Req {
    /// Executes the request.
    fn exec<T: Transport>(self, c: &mut Central<T>) {
        trace!("{self:?}");
        match self {
            Self::Scan(tx) => reply(tx, c.start_scan()),
            Self::Connect(Target::Index(i), tx) => reply(tx, c.connect_by_index(i)),
            Self::Connect(Target::Name(n), tx) => reply(tx, c.connect_by_name(&n)),
            Self::Disconnect(tx) => reply(tx, c.disconnect()),
            Self::SetCommand(id, cmd, tx) => reply(tx, c.set_command(id, cmd)),
            Self::State(id, tx) => reply(tx, c.state(id)),
            Self::Identity(id, tx) => reply(tx, c.identity(id).map(str::to_owned)),
            Self::Find(s, tx) => reply(tx, c.find_accessory(&s)),
            Self::Peers(tx) => reply(tx, peer_info(c)),
            Self::Subscribe(tx) => reply(tx, c.subscribe()),
        }
    }
}

/// Sends a request result. A closed channel means that the caller is no
/// longer interested in it.
fn reply<R>(tx: Reply<R>, r: R) {
    if tx.send(r).is_err() {
        trace!("Request canceled");
    }
}

/// Peer summary returned by [`Handle::peers`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PeerInfo {
    pub idx: PeerIdx,
    pub name: String,
    pub state: ConnState,
    /// Accessories discovered on the peer.
    pub accessories: Vec<AccId>,
}

fn peer_info<T: Transport>(c: &Central<T>) -> Vec<PeerInfo> {
    (c.peers().iter())
        .map(|(idx, r)| PeerInfo {
            idx,
            name: r.name.clone(),
            state: r.state,
            accessories: r.accessories.clone(),
        })
        .collect()
}

/// Application interface to the event-processing task.
#[derive(Clone, Debug)]
pub struct Handle {
    tx: mpsc::Sender<Req>,
}

impl Handle {
    /// Starts a discovery scan.
    pub async fn scan(&self) -> Result<()> {
        self.call(Req::Scan).await?
    }

    /// Connects to the peer at table position `i`.
    pub async fn connect_by_index(&self, i: usize) -> Result<()> {
        self.call(|tx| Req::Connect(Target::Index(i), tx)).await?
    }

    /// Connects to the peer named `name`.
    pub async fn connect_by_name(&self, name: impl Into<String>) -> Result<()> {
        let t = Target::Name(name.into());
        self.call(|tx| Req::Connect(t, tx)).await?
    }

    /// Terminates the current connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.call(Req::Disconnect).await?
    }

    /// Requests a new accessory position.
    pub async fn set_command(&self, id: AccId, cmd: u8) -> Result<()> {
        self.call(|tx| Req::SetCommand(id, cmd, tx)).await?
    }

    /// Returns the last reported accessory state.
    pub async fn state(&self, id: AccId) -> Result<PointState> {
        self.call(|tx| Req::State(id, tx)).await?
    }

    /// Returns the accessory identity.
    pub async fn identity(&self, id: AccId) -> Result<String> {
        self.call(|tx| Req::Identity(id, tx)).await?
    }

    /// Returns the accessory with the specified identity.
    pub async fn find_accessory(&self, identity: impl Into<String>) -> Result<Option<AccId>> {
        let s = identity.into();
        self.call(|tx| Req::Find(s, tx)).await
    }

    /// Returns all known peers.
    pub async fn peers(&self) -> Result<Vec<PeerInfo>> {
        self.call(Req::Peers).await
    }

    /// Returns a new event receiver.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Report>> {
        self.call(Req::Subscribe).await
    }

    async fn call<R>(&self, f: impl FnOnce(Reply<R>) -> Req) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(f(tx)).await.map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }
}

/// Future that processes transport events and application requests. The
/// task is canceled when this future is dropped, and resolves to the
/// [`Central`] when it terminates.
#[derive(Debug)]
pub struct EventLoop<T> {
    h: tokio::task::JoinHandle<Central<T>>,
    c: CancellationToken,
    _g: DropGuard,
}

impl<T: Transport + 'static> EventLoop<T> {
    /// Spawns the event-processing task. The task terminates when the event
    /// stream ends, when all [`Handle`]s are dropped, or on cancellation.
    #[must_use]
    pub fn spawn(c: Central<T>, events: mpsc::UnboundedReceiver<Event>) -> (Self, Handle) {
        let (tx, rx) = mpsc::channel(REQ_QUEUE);
        let ct = CancellationToken::new();
        let this = Self {
            h: tokio::spawn(Self::run(c, events, rx, ct.clone())),
            c: ct.clone(),
            _g: ct.drop_guard(),
        };
        (this, Handle { tx })
    }

    /// Stops event processing and returns the central.
    pub async fn stop(self) -> Result<Central<T>> {
        self.c.cancel();
        self.await
    }

    async fn run(
        mut c: Central<T>,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut reqs: mpsc::Receiver<Req>,
        ct: CancellationToken,
    ) -> Central<T> {
        debug!("Event loop started");
        loop {
            tokio::select! {
                biased;
                _ = ct.cancelled() => {
                    debug!("Event loop terminating");
                    break;
                }
                e = events.recv() => match e {
                    Some(e) => c.handle_event(e),
                    None => {
                        debug!("Transport event stream closed");
                        break;
                    }
                },
                r = reqs.recv() => match r {
                    Some(r) => r.exec(&mut c),
                    None => {
                        debug!("All handles dropped");
                        break;
                    }
                },
            }
        }
        c
    }
}

impl<T> Future for EventLoop<T> {
    type Output = Result<Central<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(ready!(Pin::new(&mut self.h).poll(cx)).map_err(|_| Error::Closed))
    }
}
