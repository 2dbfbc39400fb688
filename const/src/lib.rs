//! Bluetooth assigned numbers and layout accessory UUIDs.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::exit)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub use uuid::*;

mod uuid;

/// GATT services ([Assigned Numbers] Section 3.4).
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Service {
    GenericAccess = 0x1800,
    GenericAttribute = 0x1801,
    DeviceInformation = 0x180A,
    Battery = 0x180F,
}

/// GATT characteristics ([Assigned Numbers] Section 3.8).
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Characteristic {
    DeviceName = 0x2A00,
    Appearance = 0x2A01,
    PeripheralPreferredConnectionParameters = 0x2A04,
    ServiceChanged = 0x2A05,
    BatteryLevel = 0x2A19,
}

/// GATT characteristic descriptors ([Assigned Numbers] Section 3.7).
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Descriptor {
    CharacteristicExtendedProperties = 0x2900,
    CharacteristicUserDescription = 0x2901,
    ClientCharacteristicConfiguration = 0x2902,
    ServerCharacteristicConfiguration = 0x2903,
    CharacteristicPresentationFormat = 0x2904,
}

macro_rules! sig_uuid {
    ($($t:ident),+) => {$(
        impl From<$t> for Uuid16 {
            #[inline]
            fn from(v: $t) -> Self {
                crate::uuid::uuid16(v as u16)
            }
        }

        impl From<$t> for Uuid {
            #[inline]
            fn from(v: $t) -> Self {
                Uuid16::from(v).as_uuid()
            }
        }

        impl PartialEq<$t> for Uuid {
            #[inline]
            fn eq(&self, rhs: &$t) -> bool {
                *self == Self::from(*rhs)
            }
        }
    )+};
}

sig_uuid!(Service, Characteristic, Descriptor);

/// Primary service exposed by every layout accessory. One physical peripheral
/// hosts one instance of this service per accessory it drives.
pub const ACCESSORY_SERVICE: Uuid = uuid128(0x875E6EF1_7E3F_4E57_86E1_9A921002B8E9);

/// Accessory characteristic roles. Each accessory service instance carries
/// exactly one characteristic of each role.
#[cfg_attr(test, derive(enum_iterator::Sequence))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AccessoryChar {
    /// Accessory identity string (read, UTF-8, at most 10 bytes).
    Identity,
    /// Current accessory state (read and notify, 1 byte).
    State,
    /// Requested accessory position (read and write, 1 byte).
    Command,
}

impl AccessoryChar {
    /// Returns the characteristic value UUID.
    #[inline]
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        match self {
            Self::Identity => uuid128(0x8DBE4BF8_B166_4D52_BD7E_56CD5EB6C246),
            Self::State => uuid128(0x068A007D_9F09_49F0_907C_2D54178147B8),
            Self::Command => uuid128(0x3D59437D_265E_4698_9B4F_3852E8ED2B33),
        }
    }

    /// Classifies a characteristic UUID. Returns [`None`] for UUIDs that do
    /// not belong to the accessory service.
    #[must_use]
    pub fn from_uuid(u: Uuid) -> Option<Self> {
        [Self::Identity, Self::State, Self::Command]
            .into_iter()
            .find(|c| c.uuid() == u)
    }
}

const fn uuid128(v: u128) -> Uuid {
    match Uuid::new(v) {
        Some(u) => u,
        None => panic!("zero UUID"),
    }
}
