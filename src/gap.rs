//! Advertising and scan response data ([Vol 3] Part C, Section 11 and
//! [Core Specification Supplement] Part A, Section 1).

use smallvec::SmallVec;
use structbuf::{Pack, Packer, StructBuf, Unpacker};
use tracing::trace;

use pointlink_const::Uuid;

use crate::le::Addr;

/// Response data types ([Assigned Numbers] Section 2.3).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ResponseDataType {
    Flags = 0x01,
    IncompleteServiceClass16 = 0x02,
    CompleteServiceClass16 = 0x03,
    IncompleteServiceClass32 = 0x04,
    CompleteServiceClass32 = 0x05,
    IncompleteServiceClass128 = 0x06,
    CompleteServiceClass128 = 0x07,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    TxPower = 0x0A,
    Appearance = 0x19,
    ManufacturerData = 0xFF,
}

/// Iterator over the length-type-value fields of response data. Iteration
/// stops at the first zero-length or truncated field.
#[derive(Clone, Debug)]
pub struct ResponseData<'a>(Unpacker<'a>);

impl<'a> ResponseData<'a> {
    /// Creates a field iterator over raw response data.
    #[inline]
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self(Unpacker::new(data))
    }
}

impl<'a> Iterator for ResponseData<'a> {
    /// Raw field type and data.
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }
        let n = usize::from(self.0.u8());
        if n == 0 {
            self.0 = Unpacker::default();
            return None;
        }
        let Some(mut f) = self.0.skip(n) else {
            self.0 = Unpacker::default();
            return None;
        };
        let typ = f.u8();
        f.is_ok().then(|| (typ, f.into_inner()))
    }
}

/// Parsed advertising report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct AdvReport {
    /// Advertiser address.
    pub addr: Addr,
    /// Complete local name, or the shortened one if the complete name is not
    /// present.
    pub name: Option<String>,
    /// 128-bit service class UUIDs.
    pub services: SmallVec<[Uuid; 2]>,
}

impl AdvReport {
    /// Parses advertising or scan response data received from `addr`.
    /// Malformed fields are ignored.
    #[must_use]
    pub fn parse(addr: Addr, data: &[u8]) -> Self {
        use ResponseDataType::*;
        let mut r = Self {
            addr,
            ..Self::default()
        };
        let mut short = None;
        for (typ, v) in ResponseData::new(data) {
            match ResponseDataType::try_from(typ) {
                Ok(IncompleteServiceClass128 | CompleteServiceClass128) => {
                    let uuids = v.chunks_exact(Uuid::BYTES);
                    (r.services).extend(uuids.filter_map(|u| Uuid::try_from(u).ok()));
                }
                Ok(CompleteLocalName) => r.name = Some(String::from_utf8_lossy(v).into_owned()),
                Ok(ShortLocalName) => short = Some(String::from_utf8_lossy(v).into_owned()),
                _ => trace!("Ignoring AD type {typ:#04X} from {addr:?}"),
            }
        }
        if r.name.is_none() {
            r.name = short;
        }
        r
    }

    /// Returns whether the advertiser lists service `u`.
    #[inline]
    #[must_use]
    pub fn service_match(&self, u: Uuid) -> bool {
        self.services.contains(&u)
    }

    /// Returns the display name of the advertiser, which is the advertised
    /// local name or the address when no name was advertised.
    #[must_use]
    pub fn display_name(&self) -> String {
        (self.name.clone()).unwrap_or_else(|| self.addr.raw().to_string())
    }
}

/// Response data builder.
#[derive(Clone, Debug)]
pub struct ResponseDataMut(StructBuf);

impl ResponseDataMut {
    /// Maximum response data length ([Vol 6] Part B, Section 2.3.4).
    const MAX: usize = 254;

    /// Creates a new response data buffer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(StructBuf::new(Self::MAX))
    }

    /// Returns the encoded response data.
    #[inline]
    #[must_use]
    pub fn get(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Appends service class UUIDs (\[CSS\] Part A, Section 1.1). Each UUID is
    /// encoded in the optimal format.
    pub fn service_class<T: Copy + Into<Uuid>>(
        &mut self,
        complete: bool,
        uuids: &[T],
    ) -> &mut Self {
        let typ = u8::from(ResponseDataType::IncompleteServiceClass16) + u8::from(complete);
        self.maybe_put(complete, typ, |b| {
            (uuids.iter().filter_map(|&u| u.into().as_u16())).for_each(|v| {
                b.u16(v);
            });
        });
        self.maybe_put(complete, typ + 2, |b| {
            (uuids.iter().filter_map(|&u| u.into().as_u32())).for_each(|v| {
                b.u32(v);
            });
        });
        self.maybe_put(complete, typ + 4, |b| {
            (uuids.iter().filter_map(|&u| u.into().as_u128())).for_each(|v| {
                b.u128(v);
            });
        })
    }

    /// Appends either shortened or complete local device name
    /// (\[CSS\] Part A, Section 1.2).
    pub fn local_name<T: AsRef<str>>(&mut self, complete: bool, v: T) -> &mut Self {
        let typ = u8::from(ResponseDataType::ShortLocalName) + u8::from(complete);
        self.maybe_put(true, typ, |b| {
            b.put(v.as_ref().as_bytes());
        })
    }

    /// Appends a length-type-data field to the buffer, calling `f` to provide
    /// the data. If the data is empty and `keep_empty` is `false`, or the
    /// field does not fit, then nothing gets appended.
    fn maybe_put(&mut self, keep_empty: bool, typ: u8, f: impl Fn(&mut Packer)) -> &mut Self {
        let i = self.0.len();
        f(self.0.append().put([0, typ]));
        match u8::try_from(self.0.len().wrapping_sub(i + 1)) {
            Ok(n) if keep_empty || n >= 2 => self.0[i] = n,
            _ => {
                self.0.truncate(i);
            }
        }
        self
    }
}

impl Default for ResponseDataMut {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
