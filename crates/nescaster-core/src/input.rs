use bitflags::bitflags;

bitflags! {
    /// Button state for one NES standard controller, in shift-register order.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Buttons: u8 {
        const A = 0x01;
        const B = 0x02;
        const SELECT = 0x04;
        const START = 0x08;
        const UP = 0x10;
        const DOWN = 0x20;
        const LEFT = 0x40;
        const RIGHT = 0x80;
    }
}

impl Buttons {
    /// Builds a button set from a raw mask. Every bit is a defined button, so
    /// nothing is dropped.
    #[inline]
    pub const fn from_mask(mask: u8) -> Self {
        Self::from_bits_retain(mask)
    }

    #[inline]
    pub const fn mask(self) -> u8 {
        self.bits()
    }
}

impl From<u8> for Buttons {
    fn from(mask: u8) -> Self {
        Self::from_mask(mask)
    }
}

/// Controller port on the front of the console.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Port {
    One,
    Two,
}

impl Port {
    pub const ALL: [Port; 2] = [Port::One, Port::Two];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Port::One => 0,
            Port::Two => 1,
        }
    }
}
