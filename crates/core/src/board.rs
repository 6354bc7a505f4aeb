//! Named wiring and the device list of one machine.

use std::collections::HashMap;

use thiserror::Error;

use crate::devices::{Component, Device};
use crate::signal::{Bus, Line};

pub const ADDRESS_BUS: &str = "address";
pub const DATA_BUS: &str = "data";
pub const RW_LINE: &str = "RW";
pub const NMI_LINE: &str = "NMI";
pub const IRQ_LINE: &str = "IRQ";
pub const RESET_LINE: &str = "RESET";
pub const CLK2_LINE: &str = "CLK2";
pub const RAM_CS_LINE: &str = "RAM_CS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("no bus named {0:?} on the board")]
    MissingBus(String),

    #[error("no line named {0:?} on the board")]
    MissingLine(String),
}

/// Registry of named buses and lines plus the devices wired to them.
#[derive(Debug, Default)]
pub struct Board {
    buses: HashMap<String, Bus>,
    lines: HashMap<String, Line>,
    devices: Vec<Device>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// A board carrying the buses and lines a 6502 connects to.
    pub fn with_cpu_wiring() -> Self {
        Self::new()
            .add_bus(ADDRESS_BUS, Bus::new(16))
            .add_bus(DATA_BUS, Bus::new(8))
            .add_line(RW_LINE, Line::new())
            .add_line(NMI_LINE, Line::new())
            .add_line(IRQ_LINE, Line::new())
            .add_line(RESET_LINE, Line::new())
            .add_line(CLK2_LINE, Line::new())
    }

    /// Add or replace a bus.
    pub fn add_bus(mut self, name: impl Into<String>, bus: Bus) -> Self {
        self.buses.insert(name.into(), bus);
        self
    }

    /// Add or replace a line.
    pub fn add_line(mut self, name: impl Into<String>, line: Line) -> Self {
        self.lines.insert(name.into(), line);
        self
    }

    pub fn bus(&self, name: &str) -> Result<Bus, BoardError> {
        self.buses
            .get(name)
            .cloned()
            .ok_or_else(|| BoardError::MissingBus(name.to_string()))
    }

    pub fn line(&self, name: &str) -> Result<Line, BoardError> {
        self.lines
            .get(name)
            .cloned()
            .ok_or_else(|| BoardError::MissingLine(name.to_string()))
    }

    /// Line names in sorted order.
    pub fn line_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.lines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn add_device(&mut self, device: impl Into<Device>) {
        self.devices.push(device.into());
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Install every device, in the order added.
    pub fn install_devices(&self) {
        for device in &self.devices {
            device.install();
        }
    }

    /// Power up every device, in the order added.
    pub fn power_up(&self) {
        for device in &self.devices {
            device.power_up();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::StaticRam;
    use crate::signal::Level;

    #[test]
    fn lookup_by_name() {
        let board = Board::with_cpu_wiring();
        assert_eq!(board.bus(ADDRESS_BUS).unwrap().width(), 16);
        assert_eq!(board.bus(DATA_BUS).unwrap().width(), 8);
        assert!(board.line(CLK2_LINE).is_ok());
        assert_eq!(
            board.line("PLA_TO_DOS_OE").unwrap_err(),
            BoardError::MissingLine("PLA_TO_DOS_OE".into())
        );
        assert_eq!(
            board.bus("io").unwrap_err(),
            BoardError::MissingBus("io".into())
        );
    }

    #[test]
    fn lookups_return_shared_handles() {
        let board = Board::with_cpu_wiring();
        let a = board.line(RW_LINE).unwrap();
        let b = board.line(RW_LINE).unwrap();
        assert!(a.same_wire(&b));
        a.set_state(Level::High);
        assert!(b.is_high());
    }

    #[test]
    fn install_then_power_up_devices() {
        let board = Board::with_cpu_wiring().add_line(RAM_CS_LINE, Line::new());
        let ram = StaticRam::new(
            8,
            board.bus(ADDRESS_BUS).unwrap(),
            board.bus(DATA_BUS).unwrap(),
            board.line(RW_LINE).unwrap(),
            board.line(RAM_CS_LINE).unwrap(),
        )
        .unwrap();
        ram.poke(0x10, 0xFF);

        let mut board = board;
        board.add_device(ram.clone());
        board.install_devices();
        board.power_up();
        assert_eq!(ram.peek(0x10), 0);
        assert_eq!(board.devices().len(), 1);

        let data = board.bus(DATA_BUS).unwrap();
        board.bus(ADDRESS_BUS).unwrap().write(0x10);
        data.write(0x99);
        board.line(RW_LINE).unwrap().set_state(Level::Low);
        board.line(RAM_CS_LINE).unwrap().set_state(Level::Low);
        assert_eq!(ram.peek(0x10), 0x99);
    }

    #[test]
    fn line_names_are_sorted() {
        let board = Board::with_cpu_wiring();
        assert_eq!(
            board.line_names(),
            vec![CLK2_LINE, IRQ_LINE, NMI_LINE, RESET_LINE, RW_LINE]
        );
    }
}
