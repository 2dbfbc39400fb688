//! Central configuration.

use serde::{Deserialize, Serialize};

use crate::hci::{ConnParams, ScanParams};

/// Central configuration. Missing fields take their default values when
/// deserialized.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// Peer table capacity.
    pub max_peers: usize,
    /// Maximum accessory identity length in bytes.
    pub max_id_len: usize,
    /// Connection procedure parameters.
    pub conn: ConnParams,
    /// Discovery scan parameters.
    pub scan: ScanParams,
}

impl Config {
    /// Default peer table capacity.
    pub const MAX_PEERS: usize = 5;
    /// Default accessory identity length limit.
    pub const MAX_ID_LEN: usize = 10;

    /// Sets the peer table capacity.
    #[inline]
    #[must_use]
    pub const fn max_peers(mut self, n: usize) -> Self {
        self.max_peers = n;
        self
    }

    /// Sets the identity length limit.
    #[inline]
    #[must_use]
    pub const fn max_id_len(mut self, n: usize) -> Self {
        self.max_id_len = n;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_peers: Self::MAX_PEERS,
            max_id_len: Self::MAX_ID_LEN,
            conn: ConnParams::default(),
            scan: ScanParams::default(),
        }
    }
}
