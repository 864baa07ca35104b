//! Shared identifiers for virtual desktops and the windows placed on them.
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// Stable identifier of a virtual desktop.
///
/// The layout matches the Windows `GUID` structure so the value can cross the
/// C ABI by value. Identifiers survive desktop reordering and shell restarts;
/// the ordinal position of a desktop does not.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DesktopId {
    /// First 32 bits.
    data1: u32,
    /// Next 16 bits.
    data2: u16,
    /// Next 16 bits.
    data3: u16,
    /// Final 64 bits, in byte order.
    data4: [u8; 8],
}

impl DesktopId {
    /// The all-zero identifier, returned across the C ABI when no desktop matches.
    pub const NIL: Self = Self::from_fields(0, 0, 0, [0; 8]);

    /// Construct an identifier from its GUID fields.
    #[must_use]
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Construct an identifier from a 128-bit value laid out as written in the
    /// canonical text form.
    #[must_use]
    pub const fn from_u128(v: u128) -> Self {
        let tail = (v as u64).to_be_bytes();
        Self {
            data1: (v >> 96) as u32,
            data2: (v >> 80) as u16,
            data3: (v >> 64) as u16,
            data4: tail,
        }
    }

    /// The identifier as a single 128-bit value (inverse of [`Self::from_u128`]).
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// GUID fields `(data1, data2, data3, data4)`.
    #[must_use]
    pub const fn fields(&self) -> (u32, u16, u16, [u8; 8]) {
        (self.data1, self.data2, self.data3, self.data4)
    }

    /// True for the all-zero identifier.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        self.as_u128() == 0
    }
}

impl Display for DesktopId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

/// Error returned when parsing a [`DesktopId`] from text fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseDesktopIdError {
    /// The rejected input.
    input: String,
}

impl Display for ParseDesktopIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid desktop id: {:?}", self.input)
    }
}

impl StdError for ParseDesktopIdError {}

impl FromStr for DesktopId {
    type Err = ParseDesktopIdError;

    /// Accepts `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, optionally wrapped in braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDesktopIdError {
            input: s.to_string(),
        };
        let trimmed = s
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(s);
        let groups: Vec<&str> = trimmed.split('-').collect();
        let widths = [8, 4, 4, 4, 12];
        if groups.len() != widths.len()
            || groups
                .iter()
                .zip(widths)
                .any(|(g, w)| g.len() != w || !g.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(err());
        }
        let hex: String = groups.concat();
        u128::from_str_radix(&hex, 16)
            .map(Self::from_u128)
            .map_err(|_| err())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DesktopId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for DesktopId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Handle of a top-level window as issued by the windowing system.
///
/// The handle is a non-owning token: it is never dereferenced, and a window
/// may disappear at any moment. Every operation validates it lazily against
/// the shell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowHandle(isize);

impl WindowHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Wrap a raw handle value.
    #[must_use]
    pub const fn new(raw: isize) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    #[must_use]
    pub const fn raw(self) -> isize {
        self.0
    }

    /// True for the null handle.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl Display for WindowHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<isize> for WindowHandle {
    fn from(value: isize) -> Self {
        Self::new(value)
    }
}

impl From<WindowHandle> for isize {
    fn from(value: WindowHandle) -> Self {
        value.raw()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn text_form_matches_guid_layout() {
        let id = DesktopId::from_fields(
            0xC5E0CDCA,
            0x7B6E,
            0x41B2,
            [0x9F, 0xC4, 0xD9, 0x39, 0x75, 0xCC, 0x46, 0x7B],
        );
        assert_eq!(id.to_string(), "c5e0cdca-7b6e-41b2-9fc4-d93975cc467b");
        assert_eq!(id.as_u128(), 0xc5e0cdca_7b6e_41b2_9fc4_d93975cc467b);
    }

    #[test]
    fn parse_accepts_braces_and_rejects_garbage() {
        let id: DesktopId = "{C5E0CDCA-7B6E-41B2-9FC4-D93975CC467B}".parse().unwrap();
        assert_eq!(id.as_u128(), 0xc5e0cdca_7b6e_41b2_9fc4_d93975cc467b);
        assert!("c5e0cdca7b6e41b29fc4d93975cc467b".parse::<DesktopId>().is_err());
        assert!("zzzzzzzz-7b6e-41b2-9fc4-d93975cc467b".parse::<DesktopId>().is_err());
        assert!("".parse::<DesktopId>().is_err());
    }

    #[test]
    fn nil_is_default() {
        assert!(DesktopId::default().is_nil());
        assert!(!DesktopId::from_u128(1).is_nil());
        assert!(WindowHandle::default().is_null());
    }

    proptest! {
        #[test]
        fn text_form_parses_back(v in any::<u128>()) {
            let id = DesktopId::from_u128(v);
            let parsed: DesktopId = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
            prop_assert_eq!(parsed.as_u128(), v);
        }
    }
}
