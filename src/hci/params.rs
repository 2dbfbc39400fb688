use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::*;

/// Connection procedure parameters ([Vol 4] Part E, Section 7.8.66).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ConnParams {
    /// PHY used while scanning for the peer's connectable advertisements.
    pub phy: Phy,
    /// Scan interval of the initiator.
    pub scan_interval: Duration,
    /// Scan window of the initiator.
    pub scan_window: Duration,
    /// Minimum connection interval.
    pub conn_interval_min: Duration,
    /// Maximum connection interval.
    pub conn_interval_max: Duration,
    /// Peripheral latency in connection events.
    pub max_latency: u16,
    /// Link supervision timeout.
    pub supervision_timeout: Duration,
    /// Whether the initiator uses a random own address.
    pub own_addr_random: bool,
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            phy: Phy::Le1M,
            scan_interval: Duration::from_millis(500),
            scan_window: Duration::from_millis(250),
            conn_interval_min: Duration::from_millis(100),
            conn_interval_max: Duration::from_millis(200),
            max_latency: 0,
            supervision_timeout: Duration::from_secs(1),
            own_addr_random: true,
        }
    }
}

impl ConnParams {
    /// Converts the parameters into controller units. Returns `None` if any
    /// value is out of range or the scan window exceeds the scan interval.
    #[must_use]
    pub fn ticks(&self) -> Option<ConnTicks> {
        let t = ConnTicks {
            scan_interval: ticks_625us(self.scan_interval)?,
            scan_window: ticks_625us(self.scan_window)?,
            conn_interval_min: ticks_1250us(self.conn_interval_min)?,
            conn_interval_max: ticks_1250us(self.conn_interval_max)?,
            max_latency: self.max_latency,
            supervision_timeout: ticks_10ms(self.supervision_timeout)?,
        };
        let valid = (0x0004..=0x4000).contains(&t.scan_interval)
            && (0x0004..=t.scan_interval).contains(&t.scan_window)
            && (0x0006..=0x0C80).contains(&t.conn_interval_min)
            && (t.conn_interval_min..=0x0C80).contains(&t.conn_interval_max)
            && t.max_latency <= 0x01F3
            && (0x000A..=0x0C80).contains(&t.supervision_timeout);
        valid.then_some(t)
    }
}

/// [`ConnParams`] in controller units.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct ConnTicks {
    /// Scan interval in 0.625ms units.
    pub scan_interval: u16,
    /// Scan window in 0.625ms units.
    pub scan_window: u16,
    /// Minimum connection interval in 1.25ms units.
    pub conn_interval_min: u16,
    /// Maximum connection interval in 1.25ms units.
    pub conn_interval_max: u16,
    pub max_latency: u16,
    /// Supervision timeout in 10ms units.
    pub supervision_timeout: u16,
}

/// Discovery scan parameters ([Vol 4] Part E, Sections 7.8.64 and 7.8.65).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ScanParams {
    pub interval: Duration,
    pub window: Duration,
    /// Active scanning (scan requests are sent).
    pub active: bool,
    /// Scan duration. Zero scans until disabled.
    pub duration: Duration,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            interval: Duration::from_micros(62_500),
            window: Duration::from_micros(62_500),
            active: false,
            duration: Duration::from_secs(10),
        }
    }
}

impl ScanParams {
    /// Converts the parameters into controller units. Returns `None` if any
    /// value is out of range or the window exceeds the interval.
    #[must_use]
    pub fn ticks(&self) -> Option<ScanTicks> {
        let t = ScanTicks {
            interval: ticks_625us(self.interval)?,
            window: ticks_625us(self.window)?,
            active: self.active,
            duration: ticks_10ms(self.duration)?,
        };
        ((0x0004..=u16::MAX).contains(&t.interval) && (0x0004..=t.interval).contains(&t.window))
            .then_some(t)
    }
}

/// [`ScanParams`] in controller units.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct ScanTicks {
    /// Scan interval in 0.625ms units.
    pub interval: u16,
    /// Scan window in 0.625ms units.
    pub window: u16,
    pub active: bool,
    /// Scan duration in 10ms units.
    pub duration: u16,
}

/// Reasons accepted by the HCI_Disconnect command ([Vol 4] Part E,
/// Section 7.1.6).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum DisconnectReason {
    AuthenticationFailure = 0x05,
    RemoteUserTerminatedConnection = 0x13,
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14,
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15,
    UnsupportedRemoteFeature = 0x1A,
    UnacceptableConnectionParameters = 0x3B,
}

impl From<DisconnectReason> for Status {
    #[inline]
    fn from(r: DisconnectReason) -> Self {
        Self::from(u8::from(r))
    }
}
