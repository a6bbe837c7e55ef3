use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::error::TIDError;

/// Flag bits carried by a TID
pub const FLAG_MC: u8 = 0x01;

/// TID (time identifier) uniquely identifies an event of the experiment.
///
/// The `timestamp` is the run epoch (typically the unix time of the run start) and `lower`
/// is the monotonically increasing sequence number within it. The flags mark, for example,
/// events generated by Monte-Carlo simulation. TIDs order by timestamp, then lower, then flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TID {
    pub timestamp: u32,
    pub lower: u32,
    pub flags: u8,
}

impl TID {
    pub fn new(timestamp: u32, lower: u32) -> Self {
        Self {
            timestamp,
            lower,
            flags: 0,
        }
    }

    /// Construct a TID marked as Monte-Carlo
    pub fn new_mc(timestamp: u32, lower: u32) -> Self {
        Self {
            timestamp,
            lower,
            flags: FLAG_MC,
        }
    }

    /// The largest TID with the given flags. Used as the stop of open ranges.
    pub fn max_with_flags(flags: u8) -> Self {
        Self {
            timestamp: u32::MAX,
            lower: u32::MAX,
            flags,
        }
    }

    pub fn is_mc(&self) -> bool {
        self.flags & FLAG_MC != 0
    }

    /// True if this TID is the open end marker
    pub fn is_open_end(&self) -> bool {
        self.timestamp == u32::MAX && self.lower == u32::MAX
    }

    /// The position of the TID on the event axis, ignoring the flags
    pub fn ordinal(&self) -> u64 {
        ((self.timestamp as u64) << 32) | (self.lower as u64)
    }

    fn from_ordinal(ordinal: u64, flags: u8) -> Self {
        Self {
            timestamp: (ordinal >> 32) as u32,
            lower: ordinal as u32,
            flags,
        }
    }

    /// The next TID on the event axis. Saturates at the maximum.
    pub fn next(&self) -> Self {
        Self::from_ordinal(self.ordinal().saturating_add(1), self.flags)
    }

    /// The previous TID on the event axis. Saturates at zero.
    pub fn prev(&self) -> Self {
        Self::from_ordinal(self.ordinal().saturating_sub(1), self.flags)
    }

    /// Encoding used for folder names. Fixed width hex, so string order is numeric order.
    pub fn to_folder_string(&self) -> String {
        format!("{:08x}-{:08x}-{:02x}", self.timestamp, self.lower, self.flags)
    }
}

impl FromStr for TID {
    type Err = TIDError;

    /// Inverse of [`TID::to_folder_string`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries: Vec<&str> = s.split('-').collect();
        if entries.len() != 3 || entries[0].len() != 8 || entries[1].len() != 8 || entries[2].len() != 2 {
            return Err(TIDError::BadFormat(s.to_string()));
        }
        Ok(Self {
            timestamp: u32::from_str_radix(entries[0], 16)?,
            lower: u32::from_str_radix(entries[1], 16)?,
            flags: u8::from_str_radix(entries[2], 16)?,
        })
    }
}

impl Display for TID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{}", self.timestamp, self.lower)?;
        if self.is_mc() {
            write!(f, ",MC")?;
        }
        write!(f, ")")
    }
}
