//! Bus-attached chips: ROM, static RAM and the address decoder.
//!
//! Devices never get called by the CPU directly. `install` registers listeners
//! on their select lines; the CPU drives the address/data buses and pulses the
//! clock, the decoder pulls one select line low, and the selected chip answers
//! on the data bus inside that same call.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::logging::{log, LogCategory, LogLevel};
use crate::signal::{Bus, Level, Line};

/// Widest chip the 16-bit address bus can select.
pub const MAX_ADDRESS_LINES: u32 = 16;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot load image {}: {source}", .path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} address lines is outside 1..=16")]
    InvalidAddressLines(u32),
}

/// Something that plugs into the board.
pub trait Component {
    /// Register line listeners.
    fn install(&self);

    /// Bring the chip to its power-on state.
    fn power_up(&self);
}

/// Outcome of fitting an image to a chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReport {
    Exact,
    /// The image was truncated or zero-padded to the chip capacity.
    ImageSizeMismatch { expected: usize, actual: usize },
}

/// Image bytes sized to a chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomImage {
    pub bytes: Vec<u8>,
    pub report: LoadReport,
}

impl RomImage {
    /// Truncate or zero-pad `bytes` to `capacity`.
    pub fn fit(mut bytes: Vec<u8>, capacity: usize) -> Self {
        let actual = bytes.len();
        let report = if actual == capacity {
            LoadReport::Exact
        } else {
            log(LogCategory::Devices, LogLevel::Warn, || {
                format!(
                    "Devices: image size {} differs from chip size {}",
                    actual, capacity
                )
            });
            bytes.resize(capacity, 0);
            LoadReport::ImageSizeMismatch {
                expected: capacity,
                actual,
            }
        };
        Self { bytes, report }
    }
}

/// Read an image file and fit it to `capacity` bytes.
pub fn load_image(path: &Path, capacity: usize) -> Result<RomImage, DeviceError> {
    let bytes = fs::read(path).map_err(|source| DeviceError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;
    log(LogCategory::Devices, LogLevel::Info, || {
        format!("Devices: loaded {} ({} bytes)", path.display(), bytes.len())
    });
    Ok(RomImage::fit(bytes, capacity))
}

fn capacity_for(address_lines: u32) -> Result<usize, DeviceError> {
    if address_lines == 0 || address_lines > MAX_ADDRESS_LINES {
        return Err(DeviceError::InvalidAddressLines(address_lines));
    }
    Ok(1usize << address_lines)
}

/// Read-only memory answering while its output-enable line is low.
#[derive(Debug, Clone)]
pub struct Rom {
    name: String,
    storage: Rc<[u8]>,
    address: Bus,
    data: Bus,
    oe: Line,
}

impl Rom {
    pub fn new(
        name: impl Into<String>,
        image: Vec<u8>,
        address_lines: u32,
        address: Bus,
        data: Bus,
        oe: Line,
    ) -> Result<Self, DeviceError> {
        let capacity = capacity_for(address_lines)?;
        let RomImage { bytes, .. } = RomImage::fit(image, capacity);
        Ok(Self {
            name: name.into(),
            storage: bytes.into(),
            address,
            data,
            oe,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn oe(&self) -> &Line {
        &self.oe
    }

    /// Byte seen at bus address `addr`. Only the chip's own address lines
    /// are decoded, so the contents mirror across the bus.
    pub fn read(&self, addr: u16) -> u8 {
        self.storage[addr as usize & (self.storage.len() - 1)]
    }
}

impl Component for Rom {
    fn install(&self) {
        let rom = self.clone();
        self.oe.register_listener(Level::Low, move || {
            let value = rom.read(rom.address.read() as u16);
            rom.data.write(u64::from(value));
        });
        log(LogCategory::Devices, LogLevel::Debug, || {
            format!("Devices: ROM {} installed ({} bytes)", self.name, self.capacity())
        });
    }

    fn power_up(&self) {}
}

/// Static RAM: reads or writes depending on RW while chip-select is low.
#[derive(Debug, Clone)]
pub struct StaticRam {
    storage: Rc<RefCell<Vec<u8>>>,
    address: Bus,
    data: Bus,
    rw: Line,
    cs: Line,
}

impl StaticRam {
    pub fn new(
        address_lines: u32,
        address: Bus,
        data: Bus,
        rw: Line,
        cs: Line,
    ) -> Result<Self, DeviceError> {
        let capacity = capacity_for(address_lines)?;
        Ok(Self {
            storage: Rc::new(RefCell::new(vec![0; capacity])),
            address,
            data,
            rw,
            cs,
        })
    }

    pub fn capacity(&self) -> usize {
        self.storage.borrow().len()
    }

    pub fn cs(&self) -> &Line {
        &self.cs
    }

    pub fn peek(&self, addr: u16) -> u8 {
        let storage = self.storage.borrow();
        storage[addr as usize & (storage.len() - 1)]
    }

    pub fn poke(&self, addr: u16, value: u8) {
        let mut storage = self.storage.borrow_mut();
        let mask = storage.len() - 1;
        storage[addr as usize & mask] = value;
    }

    /// Copy of the whole contents.
    pub fn dump(&self) -> Vec<u8> {
        self.storage.borrow().clone()
    }

    fn operate(&self) {
        let addr = self.address.read() as u16;
        if self.rw.is_high() {
            self.data.write(u64::from(self.peek(addr)));
        } else {
            self.poke(addr, self.data.read() as u8);
        }
    }
}

impl Component for StaticRam {
    fn install(&self) {
        let ram = self.clone();
        self.cs.register_listener(Level::Low, move || ram.operate());
        log(LogCategory::Devices, LogLevel::Debug, || {
            format!("Devices: RAM installed ({} bytes)", self.capacity())
        });
    }

    fn power_up(&self) {
        self.storage.borrow_mut().fill(0);
    }
}

/// Address window routed to a ROM output-enable line.
#[derive(Debug, Clone)]
pub struct RomWindow {
    pub base: u16,
    pub len: usize,
    pub select: Line,
}

impl RomWindow {
    pub fn contains(&self, addr: u16) -> bool {
        let offset = addr.wrapping_sub(self.base) as usize;
        addr >= self.base && offset < self.len
    }
}

/// Chip-select logic clocked by CLK2.
///
/// On every rising clock the decoder selects one chip for the address on the
/// bus: a read inside a ROM window enables that ROM, anything else selects
/// RAM (writes to ROM windows land in the RAM underneath). All select lines
/// are released high again before the clock edge returns.
#[derive(Debug, Clone)]
pub struct AddressDecoder {
    address: Bus,
    rw: Line,
    clk2: Line,
    ram_select: Line,
    windows: Vec<RomWindow>,
}

impl AddressDecoder {
    pub fn new(address: Bus, rw: Line, clk2: Line, ram_select: Line) -> Self {
        Self {
            address,
            rw,
            clk2,
            ram_select,
            windows: Vec::new(),
        }
    }

    /// Route reads of `base..base+len` to `select`. Earlier windows win on overlap.
    pub fn map_rom(&mut self, base: u16, len: usize, select: Line) {
        self.windows.push(RomWindow { base, len, select });
    }

    pub fn windows(&self) -> &[RomWindow] {
        &self.windows
    }

    fn select(&self) {
        let addr = self.address.read() as u16;
        if self.rw.is_high() {
            if let Some(window) = self.windows.iter().find(|w| w.contains(addr)) {
                window.select.set_state(Level::Low);
                return;
            }
        }
        self.ram_select.set_state(Level::Low);
    }

    fn release(&self) {
        self.ram_select.set_state(Level::High);
        for window in &self.windows {
            window.select.set_state(Level::High);
        }
    }
}

impl Component for AddressDecoder {
    fn install(&self) {
        let decoder = self.clone();
        self.clk2.register_listener(Level::High, move || decoder.select());
        let decoder = self.clone();
        self.clk2
            .register_listener(Level::High, move || decoder.release());
    }

    fn power_up(&self) {
        self.release();
    }
}

/// The chips a board can carry.
#[derive(Debug, Clone)]
pub enum Device {
    Rom(Rom),
    Ram(StaticRam),
    Decoder(AddressDecoder),
}

impl Component for Device {
    fn install(&self) {
        match self {
            Device::Rom(rom) => rom.install(),
            Device::Ram(ram) => ram.install(),
            Device::Decoder(decoder) => decoder.install(),
        }
    }

    fn power_up(&self) {
        match self {
            Device::Rom(rom) => rom.power_up(),
            Device::Ram(ram) => ram.power_up(),
            Device::Decoder(decoder) => decoder.power_up(),
        }
    }
}

impl From<Rom> for Device {
    fn from(rom: Rom) -> Self {
        Device::Rom(rom)
    }
}

impl From<StaticRam> for Device {
    fn from(ram: StaticRam) -> Self {
        Device::Ram(ram)
    }
}

impl From<AddressDecoder> for Device {
    fn from(decoder: AddressDecoder) -> Self {
        Device::Decoder(decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wiring {
        address: Bus,
        data: Bus,
        rw: Line,
        clk2: Line,
    }

    fn wiring() -> Wiring {
        Wiring {
            address: Bus::new(16),
            data: Bus::new(8),
            rw: Line::new(),
            clk2: Line::new(),
        }
    }

    #[test]
    fn fit_pads_and_truncates() {
        let short = RomImage::fit(vec![1, 2], 4);
        assert_eq!(short.bytes, vec![1, 2, 0, 0]);
        assert_eq!(
            short.report,
            LoadReport::ImageSizeMismatch {
                expected: 4,
                actual: 2
            }
        );

        let long = RomImage::fit(vec![1, 2, 3, 4, 5], 4);
        assert_eq!(long.bytes, vec![1, 2, 3, 4]);

        let exact = RomImage::fit(vec![9; 4], 4);
        assert_eq!(exact.report, LoadReport::Exact);
    }

    #[test]
    fn missing_image_is_an_error() {
        let err = load_image(Path::new("/definitely/not/here.rom"), 16).unwrap_err();
        assert!(matches!(err, DeviceError::ImageLoad { .. }));
        assert!(err.to_string().contains("here.rom"));
    }

    #[test]
    fn load_image_reads_file() {
        let path = std::env::temp_dir().join(format!("retro_core_rom_{}.bin", std::process::id()));
        fs::write(&path, [0xAA, 0xBB]).unwrap();
        let image = load_image(&path, 4).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(image.bytes, vec![0xAA, 0xBB, 0, 0]);
    }

    #[test]
    fn address_lines_are_validated() {
        let w = wiring();
        assert!(matches!(
            StaticRam::new(17, w.address.clone(), w.data.clone(), w.rw.clone(), Line::new()),
            Err(DeviceError::InvalidAddressLines(17))
        ));
        assert!(Rom::new("x", vec![], 0, w.address, w.data, Line::new()).is_err());
    }

    #[test]
    fn rom_answers_on_output_enable_and_masks_address() {
        let w = wiring();
        let oe = Line::new();
        let rom = Rom::new("kernal", vec![0x11, 0x22, 0x33, 0x44], 2, w.address.clone(), w.data.clone(), oe.clone())
            .unwrap();
        rom.install();

        w.address.write(0xE002);
        oe.set_state(Level::Low);
        assert_eq!(w.data.read(), 0x33);

        // Releasing the line does not drive the bus.
        w.data.write(0);
        oe.set_state(Level::High);
        assert_eq!(w.data.read(), 0);
    }

    #[test]
    fn ram_reads_and_writes_through_chip_select() {
        let w = wiring();
        let cs = Line::new();
        let ram = StaticRam::new(16, w.address.clone(), w.data.clone(), w.rw.clone(), cs.clone()).unwrap();
        ram.install();

        w.address.write(0x1234);
        w.data.write(0x5A);
        w.rw.set_state(Level::Low);
        cs.set_state(Level::Low);
        assert_eq!(ram.peek(0x1234), 0x5A);

        w.data.write(0);
        w.rw.set_state(Level::High);
        cs.set_state(Level::Low);
        assert_eq!(w.data.read(), 0x5A);

        ram.power_up();
        assert!(ram.dump().iter().all(|&b| b == 0));
    }

    #[test]
    fn decoder_routes_reads_to_rom_and_writes_to_ram() {
        let w = wiring();
        let ram_cs = Line::new();
        let rom_oe = Line::new();
        let ram = StaticRam::new(16, w.address.clone(), w.data.clone(), w.rw.clone(), ram_cs.clone()).unwrap();
        let rom = Rom::new("basic", vec![0xEE; 0x100], 8, w.address.clone(), w.data.clone(), rom_oe.clone())
            .unwrap();
        let mut decoder = AddressDecoder::new(w.address.clone(), w.rw.clone(), w.clk2.clone(), ram_cs.clone());
        decoder.map_rom(0xFF00, rom.capacity(), rom_oe.clone());

        let devices: Vec<Device> = vec![ram.clone().into(), rom.into(), decoder.into()];
        for device in &devices {
            device.install();
        }
        for device in &devices {
            device.power_up();
        }
        assert!(ram_cs.is_high() && rom_oe.is_high());

        // Read inside the ROM window
        w.address.write(0xFF10);
        w.rw.set_state(Level::High);
        w.clk2.set_state(Level::High);
        assert_eq!(w.data.read(), 0xEE);
        assert!(ram_cs.is_high() && rom_oe.is_high());

        // Write to the same address goes to RAM
        w.data.write(0x42);
        w.rw.set_state(Level::Low);
        w.clk2.set_state(Level::High);
        assert_eq!(ram.peek(0xFF10), 0x42);

        // Read outside the window comes from RAM
        ram.poke(0x0200, 0x07);
        w.address.write(0x0200);
        w.rw.set_state(Level::High);
        w.clk2.set_state(Level::High);
        assert_eq!(w.data.read(), 0x07);
    }

    #[test]
    fn window_bounds() {
        let window = RomWindow {
            base: 0xE000,
            len: 0x2000,
            select: Line::new(),
        };
        assert!(window.contains(0xE000));
        assert!(window.contains(0xFFFF));
        assert!(!window.contains(0xDFFF));

        let low = RomWindow {
            base: 0x1000,
            len: 0x800,
            select: Line::new(),
        };
        assert!(!low.contains(0x1800));
        assert!(!low.contains(0x0FFF));
    }
}
