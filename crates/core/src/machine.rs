//! Standard machine assembly: 64 KiB RAM, mapped ROMs, address decoder, CPU.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::board::{
    Board, BoardError, ADDRESS_BUS, CLK2_LINE, DATA_BUS, IRQ_LINE, NMI_LINE, RAM_CS_LINE,
    RESET_LINE, RW_LINE,
};
use crate::cpu_6502::pins::PinBus;
use crate::cpu_6502::{Cpu6502, CpuError, Memory6502, RunOutcome};
use crate::devices::{
    load_image, AddressDecoder, DeviceError, LoadReport, Rom, StaticRam, MAX_ADDRESS_LINES,
};
use crate::logging::{log, LogCategory, LogLevel};
use crate::scheduler::{CycleBudget, RunControl, Scheduler, SchedulerConfig};
use crate::signal::{Level, Line};

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Cpu(#[from] CpuError),

    #[error("ROM {name} at {base:#06X} ({len} bytes) does not fit the address space")]
    RomOutOfRange { name: String, base: u16, len: usize },

    #[error("failed to start scheduler threads: {0}")]
    Scheduler(#[source] io::Error),
}

/// One ROM chip in a machine description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomConfig {
    pub name: String,
    pub path: PathBuf,
    /// First bus address of the ROM window
    pub base: u16,
    /// Chip size as a power of two
    pub address_lines: u32,
}

/// Machine description as read from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub scheduler: SchedulerConfig,
    pub roms: Vec<RomConfig>,
}

#[derive(Debug, Clone)]
struct RomSlot {
    name: String,
    image: Vec<u8>,
    base: u16,
    address_lines: u32,
}

/// Collects ROM images and wires a [`Machine`].
#[derive(Debug, Default)]
pub struct MachineBuilder {
    roms: Vec<RomSlot>,
    budget: Option<Arc<CycleBudget>>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `image` at `base`. The image is fitted to `2^address_lines` bytes.
    pub fn rom(
        mut self,
        name: impl Into<String>,
        image: Vec<u8>,
        base: u16,
        address_lines: u32,
    ) -> Self {
        self.roms.push(RomSlot {
            name: name.into(),
            image,
            base,
            address_lines,
        });
        self
    }

    /// Load a ROM image from disk.
    pub fn rom_file(self, config: &RomConfig) -> Result<Self, MachineError> {
        if config.address_lines == 0 || config.address_lines > MAX_ADDRESS_LINES {
            return Err(DeviceError::InvalidAddressLines(config.address_lines).into());
        }
        let image = load_image(&config.path, 1usize << config.address_lines)?;
        if let LoadReport::ImageSizeMismatch { expected, actual } = image.report {
            log(LogCategory::Devices, LogLevel::Warn, || {
                format!(
                    "Machine: ROM {} is {} bytes, chip holds {}",
                    config.name, actual, expected
                )
            });
        }
        Ok(self.rom(
            config.name.clone(),
            image.bytes,
            config.base,
            config.address_lines,
        ))
    }

    /// Share an existing budget instead of creating one.
    pub fn budget(mut self, budget: Arc<CycleBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn from_config(config: &MachineConfig) -> Result<Self, MachineError> {
        config
            .roms
            .iter()
            .try_fold(Self::new(), |builder, rom| builder.rom_file(rom))
    }

    pub fn build(self) -> Result<Machine, MachineError> {
        let mut board = Board::with_cpu_wiring().add_line(RAM_CS_LINE, Line::new());
        let mut oe_lines = Vec::with_capacity(self.roms.len());
        for slot in &self.roms {
            let oe = Line::new();
            board = board.add_line(format!("{}_OE", slot.name.to_uppercase()), oe.clone());
            oe_lines.push(oe);
        }

        let address = board.bus(ADDRESS_BUS)?;
        let data = board.bus(DATA_BUS)?;
        let rw = board.line(RW_LINE)?;

        let ram = StaticRam::new(
            MAX_ADDRESS_LINES,
            address.clone(),
            data.clone(),
            rw.clone(),
            board.line(RAM_CS_LINE)?,
        )?;
        board.add_device(ram.clone());

        let mut decoder = AddressDecoder::new(
            address.clone(),
            rw,
            board.line(CLK2_LINE)?,
            board.line(RAM_CS_LINE)?,
        );
        for (slot, oe) in self.roms.into_iter().zip(oe_lines) {
            let rom = Rom::new(
                slot.name,
                slot.image,
                slot.address_lines,
                address.clone(),
                data.clone(),
                oe.clone(),
            )?;
            if slot.base as usize + rom.capacity() > 0x1_0000 {
                return Err(MachineError::RomOutOfRange {
                    name: rom.name().to_string(),
                    base: slot.base,
                    len: rom.capacity(),
                });
            }
            log(LogCategory::Devices, LogLevel::Info, || {
                format!(
                    "Machine: ROM {} mapped at {:#06X}-{:#06X}",
                    rom.name(),
                    slot.base,
                    slot.base as usize + rom.capacity() - 1
                )
            });
            decoder.map_rom(slot.base, rom.capacity(), oe);
            board.add_device(rom);
        }
        board.add_device(decoder);

        let budget = self.budget.unwrap_or_default();
        let cpu = Cpu6502::with_budget(PinBus::from_board(&board)?, budget.clone());

        let nmi = board.line(NMI_LINE)?;
        let irq = board.line(IRQ_LINE)?;
        let reset = board.line(RESET_LINE)?;

        board.install_devices();
        cpu.attach_interrupt_lines(&nmi, &irq, &reset);
        // Interrupt inputs are active low and idle high.
        for line in [&nmi, &irq, &reset] {
            line.set_state(Level::High);
        }
        board.power_up();

        let mut machine = Machine {
            board,
            cpu,
            ram,
            budget,
        };
        machine.cpu.power_up();
        machine.cpu.memory.end_cycle();
        Ok(machine)
    }
}

/// An assembled, powered-up machine.
pub struct Machine {
    board: Board,
    cpu: Cpu6502<PinBus>,
    ram: StaticRam,
    budget: Arc<CycleBudget>,
}

impl Machine {
    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn cpu(&self) -> &Cpu6502<PinBus> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu6502<PinBus> {
        &mut self.cpu
    }

    pub fn ram(&self) -> &StaticRam {
        &self.ram
    }

    pub fn budget(&self) -> &Arc<CycleBudget> {
        &self.budget
    }

    /// A control handle for [`run`](Self::run); clones may be sent to other threads.
    pub fn control(&self) -> RunControl {
        RunControl::new(self.budget.clone())
    }

    /// Drive `name` low then high again, as an external source pulsing an
    /// active-low input would.
    pub fn pulse_line(&self, name: &str) -> Result<(), BoardError> {
        let line = self.board.line(name)?;
        line.set_state(Level::Low);
        line.set_state(Level::High);
        Ok(())
    }

    /// Start the pacing threads and run until `control` is stopped.
    pub fn run(
        &mut self,
        config: SchedulerConfig,
        control: &RunControl,
    ) -> Result<RunOutcome, MachineError> {
        let mut scheduler =
            Scheduler::start(config, self.budget.clone()).map_err(MachineError::Scheduler)?;
        let outcome = self.cpu.run_loop(control);
        scheduler.shutdown();
        Ok(outcome?)
    }

    /// Execute one instruction without pacing.
    pub fn step(&mut self) -> Result<u32, MachineError> {
        let cycles = self.cpu.cycle()?;
        self.cpu.memory.end_cycle();
        Ok(cycles)
    }

    pub fn debug_state(&self) -> Value {
        json!({
            "cpu": self.cpu.registers(),
            "budget": {
                "credit": self.budget.credit(),
                "grants": self.budget.grants(),
            },
            "lines": self
                .board
                .line_names()
                .into_iter()
                .filter_map(|name| {
                    self.board
                        .line(name)
                        .ok()
                        .map(|line| (name.to_string(), json!(line.is_high())))
                })
                .collect::<serde_json::Map<String, Value>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 8 KiB image at 0xE000 with `program` at its start and the reset
    /// vector pointing there.
    fn kernal(program: &[u8]) -> Vec<u8> {
        let mut image = vec![0xEA; 0x2000];
        image[..program.len()].copy_from_slice(program);
        image[0x1FFC] = 0x00;
        image[0x1FFD] = 0xE0;
        image
    }

    #[test]
    fn boots_from_rom_reset_vector() {
        let machine = Machine::builder()
            .rom("kernal", kernal(&[]), 0xE000, 13)
            .build()
            .unwrap();
        assert_eq!(machine.cpu().pc, 0xE000);
        assert_eq!(machine.cpu().sp, 0xFD);
        assert!(machine.board().line("KERNAL_OE").is_ok());
    }

    #[test]
    fn program_writes_reach_ram() {
        // LDA #$42; STA $0200; LDA $0200; STA $E000
        let program = [0xA9, 0x42, 0x8D, 0x00, 0x02, 0xAD, 0x00, 0x02, 0x8D, 0x00, 0xE0];
        let mut machine = Machine::builder()
            .rom("kernal", kernal(&program), 0xE000, 13)
            .build()
            .unwrap();
        for _ in 0..4 {
            machine.step().unwrap();
        }
        assert_eq!(machine.ram().peek(0x0200), 0x42);
        assert_eq!(machine.cpu().a, 0x42);
        // Writes into the ROM window land in RAM underneath.
        assert_eq!(machine.ram().peek(0xE000), 0x42);
        assert!(machine.board().line(CLK2_LINE).unwrap().is_low());
    }

    #[test]
    fn rom_outside_address_space_is_rejected() {
        let err = Machine::builder()
            .rom("cart", vec![0; 0x2000], 0xF000, 13)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, MachineError::RomOutOfRange { base: 0xF000, .. }));
    }

    #[test]
    fn nmi_line_pulse_is_serviced() {
        let mut image = kernal(&[0xEA, 0xEA]);
        // NMI vector -> 0xE100
        image[0x1FFA] = 0x00;
        image[0x1FFB] = 0xE1;
        let mut machine = Machine::builder()
            .rom("kernal", image, 0xE000, 13)
            .build()
            .unwrap();

        machine.step().unwrap();
        machine.pulse_line(NMI_LINE).unwrap();
        assert_eq!(machine.step().unwrap(), 7);
        assert_eq!(machine.cpu().pc, 0xE100);
        assert_eq!(machine.ram().peek(0x01FD), 0xE0);
        assert_eq!(machine.ram().peek(0x01FC), 0x01);
    }

    #[test]
    fn config_reads_from_json() {
        let config: MachineConfig = serde_json::from_str(
            r#"{
                "scheduler": {"target_hz": 1000000, "report_interval_secs": null},
                "roms": [{"name": "kernal", "path": "kernal.rom", "base": 57344, "address_lines": 13}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.target_hz, 1_000_000);
        assert_eq!(config.scheduler.ticks_per_second, 477);
        assert_eq!(config.scheduler.report_interval_secs, None);
        assert_eq!(config.roms[0].base, 0xE000);
    }

    #[test]
    fn missing_rom_file_fails_to_build() {
        let config = MachineConfig {
            roms: vec![RomConfig {
                name: "kernal".into(),
                path: "/no/such/kernal.rom".into(),
                base: 0xE000,
                address_lines: 13,
            }],
            ..Default::default()
        };
        let err = MachineBuilder::from_config(&config).err().unwrap();
        assert!(matches!(
            err,
            MachineError::Device(DeviceError::ImageLoad { .. })
        ));
    }

    #[test]
    fn debug_state_reports_registers_and_lines() {
        let machine = Machine::builder()
            .rom("kernal", kernal(&[]), 0xE000, 13)
            .build()
            .unwrap();
        let state = machine.debug_state();
        assert_eq!(state["cpu"]["pc"], 0xE000);
        assert_eq!(state["lines"]["NMI"], true);
        assert_eq!(state["lines"]["RAM_CS"], true);
    }
}
