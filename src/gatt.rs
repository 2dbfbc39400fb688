//! Generic Attribute Profile client records ([Vol 3] Part G).
//!
//! Discovery procedures are executed by the [`Transport`](crate::host::Transport).
//! These types describe what the transport reports back: services in handle
//! order, followed by each service's characteristics, and the descriptors
//! found within a requested handle range.

use bitflags::bitflags;

use pointlink_const::{Descriptor, Uuid};

use crate::att::{Handle, HandleRange};

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct CharProps: u8 {
        /// Permits broadcasts of the Characteristic Value using Server
        /// Characteristic Configuration Descriptor.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permit writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment. If set, the Client Characteristic Configuration
        /// Descriptor shall exist.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXTENDED_PROPERTIES = 0x80;
    }
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    /// ([Vol 3] Part G, Section 3.3.3.3).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Cccd: u16 {
        /// The Characteristic Value shall be notified.
        const NOTIFY = 1 << 0;
        /// The Characteristic Value shall be indicated.
        const INDICATE = 1 << 1;
    }
}

impl Cccd {
    /// Returns the descriptor value in wire format.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.bits().to_le_bytes()
    }
}

/// Primary service reported by service discovery.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct DiscoveredService {
    /// Service declaration and group end handles.
    pub range: HandleRange,
    pub uuid: Uuid,
}

impl DiscoveredService {
    #[inline]
    #[must_use]
    pub const fn new(range: HandleRange, uuid: Uuid) -> Self {
        Self { range, uuid }
    }
}

/// Characteristic reported by service discovery. Characteristics always
/// follow the service that contains them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct DiscoveredChar {
    /// Characteristic value handle.
    pub value: Handle,
    /// Last handle of the characteristic definition. Descriptors, if any, are
    /// located in `value + 1..=end`.
    pub end: Handle,
    pub props: CharProps,
    pub uuid: Uuid,
}

impl DiscoveredChar {
    #[inline]
    #[must_use]
    pub const fn new(value: Handle, end: Handle, props: CharProps, uuid: Uuid) -> Self {
        Self {
            value,
            end,
            props,
            uuid,
        }
    }

    /// Returns the handle range that may contain the characteristic's
    /// descriptors.
    #[inline]
    #[must_use]
    pub fn descriptors(&self) -> Option<HandleRange> {
        HandleRange::after(self.value, self.end)
    }
}

/// Descriptor reported by descriptor discovery.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct DiscoveredDesc {
    pub handle: Handle,
    pub uuid: Uuid,
}

impl DiscoveredDesc {
    #[inline]
    #[must_use]
    pub const fn new(handle: Handle, uuid: Uuid) -> Self {
        Self { handle, uuid }
    }

    /// Returns whether this is a Client Characteristic Configuration
    /// descriptor.
    #[inline]
    #[must_use]
    pub fn is_cccd(&self) -> bool {
        self.uuid == Descriptor::ClientCharacteristicConfiguration
    }
}
