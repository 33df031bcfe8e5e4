//! Status LED actuator

use core::fmt;

/// One channel of the RGB status LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedChannel {
    Red,
    Green,
    Blue,
}

impl LedChannel {
    pub const ALL: [LedChannel; 3] = [LedChannel::Red, LedChannel::Green, LedChannel::Blue];

    pub const fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }
}

impl fmt::Display for LedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        })
    }
}

/// Hardware (or simulated) LED driver
pub trait Indicator {
    fn set_all(&mut self, on: bool);
    fn toggle(&mut self, channel: LedChannel);
}

/// An actuator command decoded from the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCommand {
    AllOn,
    AllOff,
    Toggle(LedChannel),
}

impl LedCommand {
    /// `1` all on, `0` all off, `r`/`g`/`b` toggle one channel
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(Self::AllOn),
            b'0' => Some(Self::AllOff),
            b'r' => Some(Self::Toggle(LedChannel::Red)),
            b'g' => Some(Self::Toggle(LedChannel::Green)),
            b'b' => Some(Self::Toggle(LedChannel::Blue)),
            _ => None,
        }
    }

    /// Decode the first byte of `payload`, `None` when empty or unknown
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        payload.first().copied().and_then(Self::from_byte)
    }

    pub fn apply<I: Indicator + ?Sized>(self, indicator: &mut I) {
        match self {
            Self::AllOn => indicator.set_all(true),
            Self::AllOff => indicator.set_all(false),
            Self::Toggle(channel) => indicator.toggle(channel),
        }
    }
}

/// In-memory LED state, usable directly as an [`Indicator`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedState {
    channels: [bool; 3],
}

impl LedState {
    pub const fn new() -> Self {
        Self {
            channels: [false; 3],
        }
    }

    pub const fn is_on(&self, channel: LedChannel) -> bool {
        self.channels[channel.index()]
    }
}

impl Indicator for LedState {
    fn set_all(&mut self, on: bool) {
        self.channels = [on; 3];
    }

    fn toggle(&mut self, channel: LedChannel) {
        let slot = &mut self.channels[channel.index()];
        *slot = !*slot;
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, channel) in LedChannel::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let state = if self.is_on(*channel) { "on" } else { "off" };
            write!(f, "{}={}", channel, state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload() {
        assert_eq!(LedCommand::from_payload(b"1"), Some(LedCommand::AllOn));
        assert_eq!(LedCommand::from_payload(b"0"), Some(LedCommand::AllOff));
        assert_eq!(
            LedCommand::from_payload(b"green"),
            Some(LedCommand::Toggle(LedChannel::Green))
        );
        assert_eq!(LedCommand::from_payload(b""), None);
        assert_eq!(LedCommand::from_payload(b"x"), None);
    }

    #[test]
    fn test_apply() {
        let mut leds = LedState::new();
        LedCommand::AllOn.apply(&mut leds);
        assert!(LedChannel::ALL.iter().all(|c| leds.is_on(*c)));

        LedCommand::Toggle(LedChannel::Blue).apply(&mut leds);
        assert!(!leds.is_on(LedChannel::Blue));
        assert!(leds.is_on(LedChannel::Red));

        LedCommand::AllOff.apply(&mut leds);
        assert_eq!(leds, LedState::new());
    }
}
