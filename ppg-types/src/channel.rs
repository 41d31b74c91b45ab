//! Channel identity: physical sensors 0-3, virtual sampler outputs 4-7.

use std::fmt;

/// A channel in 0..=7. Physical sensors occupy 0..=3; the sampler's virtual
/// playback channels occupy 4..=7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u8);

/// Physical sensor channels.
pub const PHYSICAL_CHANNELS: u8 = 4;
/// Total channels including virtual sampler outputs.
pub const TOTAL_CHANNELS: u8 = 8;

impl ChannelId {
    /// Construct a channel id, rejecting anything outside 0..=7.
    pub fn new(raw: u8) -> Option<Self> {
        if raw < TOTAL_CHANNELS {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn is_physical(self) -> bool {
        self.0 < PHYSICAL_CHANNELS
    }

    pub fn is_virtual(self) -> bool {
        !self.is_physical()
    }

    /// Sample bank index for this channel: `ch mod 4`.
    ///
    /// Virtual channel 4 therefore shares a bank with physical channel 0.
    /// That collision is acknowledged and kept deliberately rather than
    /// worked around.
    pub fn bank(self) -> u8 {
        self.0 % PHYSICAL_CHANNELS
    }

    pub fn all_physical() -> impl Iterator<Item = ChannelId> {
        (0..PHYSICAL_CHANNELS).map(Self)
    }

    pub fn all() -> impl Iterator<Item = ChannelId> {
        (0..TOTAL_CHANNELS).map(Self)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = ChannelRangeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(ChannelRangeError(raw))
    }
}

/// A channel id outside 0..=7 was supplied.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRangeError(pub u8);

impl fmt::Display for ChannelRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel id {} out of range 0..=7", self.0)
    }
}

impl std::error::Error for ChannelRangeError {}
