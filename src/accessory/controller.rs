use tracing::{debug, info, warn};

use crate::host::Transport;
use crate::report::{Kind, Registry, Source};
use crate::{Error, Result};

use super::{Accessory, Command, PointState};

impl Accessory {
    /// Returns the accessory identity. The identity is empty until the first
    /// connection reads it.
    #[inline(always)]
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the last reported state.
    #[inline(always)]
    #[must_use]
    pub const fn state(&self) -> PointState {
        self.state
    }

    /// Returns the last issued command.
    #[inline(always)]
    #[must_use]
    pub const fn command(&self) -> Option<Command> {
        self.command
    }

    /// Requests a new position. The request is rejected without any side
    /// effect while the accessory is unavailable or if `cmd` is not a valid
    /// command code. Write completion is reported asynchronously.
    pub fn set_command<T: Transport>(&mut self, t: &mut T, cmd: u8) -> Result<()> {
        if !self.state.is_available() {
            warn!("Command {cmd:#04X} for unavailable {}", self.id);
            return Err(Error::Unavailable(self.id));
        }
        let Ok(c) = Command::try_from(cmd) else {
            warn!("Invalid command {cmd:#04X} for {}", self.id);
            return Err(Error::InvalidCommand(cmd));
        };
        self.command = Some(c);
        debug!("{} {:?} command: {c}", self.id, self.identity);
        self.session.write_command(t, c)
    }

    /// Handles a state notification.
    pub fn on_notified(&mut self, reg: &mut Registry, v: &[u8]) -> PointState {
        self.state = PointState::from_wire(v);
        info!("{} {:?} state: {}", self.id, self.identity, self.state);
        reg.publish(Source::Accessory(self.id), Kind::StateChanged, u8::from(self.state));
        self.state
    }

    /// Handles the state read during initialization. The first observation
    /// is not reported as a change.
    pub fn on_initial_read(&mut self, v: &[u8]) -> PointState {
        self.state = PointState::from_wire(v);
        debug!("{} {:?} initial state: {}", self.id, self.identity, self.state);
        self.state
    }

    /// Sets the identity from its wire value, keeping at most `max_len` bytes
    /// on a character boundary.
    pub fn set_identity(&mut self, v: &[u8], max_len: usize) -> &str {
        let s = String::from_utf8_lossy(v);
        let mut n = s.len().min(max_len);
        while !s.is_char_boundary(n) {
            n -= 1;
        }
        if n < s.len() {
            debug!("Identity {s:?} truncated to {n} bytes");
        }
        self.identity = s[..n].to_owned();
        &self.identity
    }

    /// Marks the accessory as unreachable.
    #[inline]
    pub fn set_unavailable(&mut self) {
        self.state = PointState::Unavailable;
    }
}
