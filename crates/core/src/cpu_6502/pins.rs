//! CPU bus interface over signal lines.

use crate::board::{Board, BoardError, ADDRESS_BUS, CLK2_LINE, DATA_BUS, RW_LINE};
use crate::signal::{Bus, Level, Line};

use super::Memory6502;

/// Drives the address/data buses and the RW and CLK2 lines for every access.
///
/// Each access raises CLK2 once the buses are valid; devices react inside that
/// call, so a read returns whatever the selected chip put on the data bus.
#[derive(Debug, Clone)]
pub struct PinBus {
    address: Bus,
    data: Bus,
    rw: Line,
    clk2: Line,
}

impl PinBus {
    pub fn new(address: Bus, data: Bus, rw: Line, clk2: Line) -> Self {
        Self {
            address,
            data,
            rw,
            clk2,
        }
    }

    pub fn from_board(board: &Board) -> Result<Self, BoardError> {
        Ok(Self::new(
            board.bus(ADDRESS_BUS)?,
            board.bus(DATA_BUS)?,
            board.line(RW_LINE)?,
            board.line(CLK2_LINE)?,
        ))
    }
}

impl Memory6502 for PinBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.address.write(u64::from(addr));
        self.rw.set_state(Level::High);
        self.clk2.set_state(Level::High);
        self.data.read() as u8
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.address.write(u64::from(addr));
        self.data.write(u64::from(val));
        self.rw.set_state(Level::Low);
        self.clk2.set_state(Level::High);
    }

    fn end_cycle(&mut self) {
        self.clk2.set_state(Level::Low);
    }
}
