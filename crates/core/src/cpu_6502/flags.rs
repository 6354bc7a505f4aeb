//! Processor status register (P): NV-BDIZC.

use serde::{Deserialize, Serialize};

pub const CARRY: u8 = 0b0000_0001;
pub const ZERO: u8 = 0b0000_0010;
pub const INTERRUPT_DISABLE: u8 = 0b0000_0100;
pub const DECIMAL: u8 = 0b0000_1000;
pub const BREAK: u8 = 0b0001_0000;
pub const UNUSED: u8 = 0b0010_0000;
pub const OVERFLOW: u8 = 0b0100_0000;
pub const NEGATIVE: u8 = 0b1000_0000;

/// Status flags held as independent booleans.
///
/// Break and unused are stored like the others; the stack instructions decide
/// whether they survive a round trip through memory (see [`Flags::load_byte`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub negative: bool,
    pub overflow: bool,
    pub unused: bool,
    pub brk: bool,
    pub decimal: bool,
    pub interrupt_disable: bool,
    pub zero: bool,
    pub carry: bool,
}

impl Flags {
    /// Pack into the status byte layout.
    pub fn to_byte(self) -> u8 {
        let mut p = 0;
        for (set, bit) in [
            (self.negative, NEGATIVE),
            (self.overflow, OVERFLOW),
            (self.unused, UNUSED),
            (self.brk, BREAK),
            (self.decimal, DECIMAL),
            (self.interrupt_disable, INTERRUPT_DISABLE),
            (self.zero, ZERO),
            (self.carry, CARRY),
        ] {
            if set {
                p |= bit;
            }
        }
        p
    }

    /// Unpack a status byte. With `ignore_break_unused` the break and unused
    /// flags keep their current values.
    pub fn load_byte(&mut self, p: u8, ignore_break_unused: bool) {
        self.negative = p & NEGATIVE != 0;
        self.overflow = p & OVERFLOW != 0;
        if !ignore_break_unused {
            self.unused = p & UNUSED != 0;
            self.brk = p & BREAK != 0;
        }
        self.decimal = p & DECIMAL != 0;
        self.interrupt_disable = p & INTERRUPT_DISABLE != 0;
        self.zero = p & ZERO != 0;
        self.carry = p & CARRY != 0;
    }

    pub fn from_byte(p: u8) -> Self {
        let mut flags = Self::default();
        flags.load_byte(p, false);
        flags
    }

    /// Set zero and negative from a result byte.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.zero = value == 0;
        self.negative = value & 0x80 != 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIX: u8 = !(BREAK | UNUSED);

    #[test]
    fn round_trip_is_identity_for_every_byte() {
        for p in 0..=255u8 {
            let flags = Flags::from_byte(p);
            assert_eq!(flags.to_byte(), p);

            let mut reloaded = Flags::default();
            reloaded.load_byte(flags.to_byte(), true);
            assert_eq!(reloaded.to_byte() & SIX, p & SIX, "byte {:#04X}", p);
        }
    }

    #[test]
    fn ignore_keeps_break_and_unused() {
        let mut flags = Flags {
            brk: true,
            unused: false,
            ..Flags::default()
        };
        flags.load_byte(UNUSED | CARRY, true);
        assert!(flags.brk);
        assert!(!flags.unused);
        assert!(flags.carry);

        flags.load_byte(UNUSED | CARRY, false);
        assert!(!flags.brk);
        assert!(flags.unused);
    }

    #[test]
    fn bit_positions() {
        let flags = Flags {
            negative: true,
            carry: true,
            ..Flags::default()
        };
        assert_eq!(flags.to_byte(), 0x81);
        assert_eq!(
            Flags {
                interrupt_disable: true,
                decimal: true,
                ..Flags::default()
            }
            .to_byte(),
            0x0C
        );
    }

    #[test]
    fn set_zn() {
        let mut flags = Flags::default();
        flags.set_zn(0);
        assert!(flags.zero && !flags.negative);
        flags.set_zn(0x80);
        assert!(!flags.zero && flags.negative);
        flags.set_zn(0x7F);
        assert!(!flags.zero && !flags.negative);
    }
}
