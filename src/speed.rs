use core::fmt;

/// A bus clock frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hertz(pub u32);

impl Hertz {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self(100_000);
    /// Fast mode (400 kHz)
    pub const FAST: Self = Self(400_000);
    /// Fast mode plus (1 MHz)
    pub const FAST_PLUS: Self = Self(1_000_000);

    pub const fn hz(hz: u32) -> Self {
        Self(hz)
    }

    pub const fn khz(khz: u32) -> Self {
        Self(khz * 1_000)
    }

    pub const fn to_hz(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Hertz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "0 Hz"),
            hz if hz % 1_000_000 == 0 => write!(f, "{} MHz", hz / 1_000_000),
            hz if hz % 1_000 == 0 => write!(f, "{} kHz", hz / 1_000),
            hz => write!(f, "{} Hz", hz),
        }
    }
}
