//! Bus-level MOS 6502 emulation core.
//!
//! The CPU talks to the rest of the machine only through [`signal`] lines and
//! buses. Devices listen on those lines and answer synchronously, and the
//! [`scheduler`] paces execution to a target clock rate.

pub mod board;
pub mod cpu_6502;
pub mod devices;
pub mod logging;
pub mod machine;
pub mod scheduler;
pub mod signal;

pub use board::{Board, BoardError};
pub use cpu_6502::{Cpu6502, CpuError, Memory6502, RunOutcome};
pub use devices::{Component, Device, DeviceError};
pub use machine::{Machine, MachineBuilder, MachineConfig, MachineError, RomConfig};
pub use scheduler::{CycleBudget, RunControl, Scheduler, SchedulerConfig};
pub use signal::{Bus, Level, Line};
