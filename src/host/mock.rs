use std::collections::VecDeque;

use crate::att::{Handle, HandleRange};
use crate::hci::{ConnHandle, ConnParams, DisconnectReason, ScanParams};
use crate::host::{Error, Result, Transport};
use crate::le::Addr;

/// Transport request recorded by [`MockTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Req {
    Connect(Addr),
    Disconnect(ConnHandle, DisconnectReason),
    Scan,
    DiscoverServices(ConnHandle),
    DiscoverDescriptors(ConnHandle, HandleRange),
    Read(ConnHandle, Handle),
    Write(ConnHandle, Handle, Vec<u8>),
}

/// Transport that records requests instead of executing them.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    reqs: Vec<Req>,
    fail: VecDeque<Error>,
}

impl MockTransport {
    /// Makes the next request that is not already set to fail return `e`.
    pub fn fail_next(&mut self, e: Error) {
        self.fail.push_back(e);
    }

    /// Returns and clears all recorded requests.
    pub fn take(&mut self) -> Vec<Req> {
        std::mem::take(&mut self.reqs)
    }

    fn push(&mut self, r: Req) -> Result<()> {
        if let Some(e) = self.fail.pop_front() {
            return Err(e);
        }
        self.reqs.push(r);
        Ok(())
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, peer: Addr, p: &ConnParams) -> Result<()> {
        p.ticks().ok_or(Error::InvalidParameters)?;
        self.push(Req::Connect(peer))
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: DisconnectReason) -> Result<()> {
        self.push(Req::Disconnect(conn, reason))
    }

    fn scan(&mut self, p: &ScanParams) -> Result<()> {
        p.ticks().ok_or(Error::InvalidParameters)?;
        self.push(Req::Scan)
    }

    fn discover_services(&mut self, conn: ConnHandle) -> Result<()> {
        self.push(Req::DiscoverServices(conn))
    }

    fn discover_descriptors(&mut self, conn: ConnHandle, range: HandleRange) -> Result<()> {
        self.push(Req::DiscoverDescriptors(conn, range))
    }

    fn read(&mut self, conn: ConnHandle, h: Handle) -> Result<()> {
        self.push(Req::Read(conn, h))
    }

    fn write(&mut self, conn: ConnHandle, h: Handle, v: &[u8]) -> Result<()> {
        self.push(Req::Write(conn, h, v.to_vec()))
    }
}
