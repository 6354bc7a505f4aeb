//! MOS 6502 execution core.
//!
//! The core executes one whole instruction per [`Cpu6502::cycle`] call and
//! charges its published cycle cost to a shared [`CycleBudget`]. All memory
//! traffic goes through the [`Memory6502`] trait; [`pins::PinBus`] implements
//! it on top of signal lines and buses so devices see every access.
//!
//! Decoding uses the static [`table::INSTRUCTION_TABLE`]. Instructions that
//! share an execution routine (compares, branches, loads, stores, ...) pick
//! their register or condition from the descriptor's mnemonic.

mod flags;
pub mod pins;
pub mod table;

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::logging::{log, LogCategory, LogLevel};
use crate::scheduler::{CycleBudget, RunControl};
use crate::signal::{Level, Line};

pub use flags::Flags;
pub use table::{decode, AddressingMode, Handler, Instruction, Mnemonic, INSTRUCTION_TABLE};

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Stack pointer after power-up. The reset sequence performs three dummy
/// pushes without writing, leaving SP at 0xFF - 2.
pub const POWER_UP_SP: u8 = 0xFD;

/// Cost of the reset sequence.
pub const RESET_CYCLES: u32 = 7;

const STACK_BASE: u16 = 0x0100;

/// Memory interface for the 6502.
pub trait Memory6502 {
    /// Read a byte. Takes `&mut self` because a read may have side effects on
    /// the devices behind it.
    fn read(&mut self, addr: u16) -> u8;

    fn write(&mut self, addr: u16, val: u8);

    /// Called once after every executed cycle.
    fn end_cycle(&mut self) {}
}

/// Fatal execution errors. Each one stops the run loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("unimplemented opcode {opcode:#04X} at {pc:#06X}")]
    UnimplementedOpcode { opcode: u8, pc: u16 },

    #[error("{mnemonic} does not support {mode:?} addressing")]
    InvalidAddressingMode {
        mnemonic: Mnemonic,
        mode: AddressingMode,
    },

    #[error("{mnemonic} requested an operand in implied mode")]
    ImpliedOperandRequested { mnemonic: Mnemonic },

    #[error("{handler:?} routine cannot execute {mnemonic}")]
    UnexpectedMnemonic { mnemonic: Mnemonic, handler: Handler },
}

/// Hardware interrupt kinds serviced through the BRK sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Interrupt {
    Nmi,
    Irq,
}

/// Pending interrupt requests.
///
/// Clones share state, so a clone can be captured by line listeners while the
/// CPU consumes requests.
#[derive(Debug, Clone, Default)]
pub struct InterruptLatch {
    nmi: Rc<Cell<bool>>,
    irq: Rc<Cell<bool>>,
    reset: Rc<Cell<bool>>,
}

impl InterruptLatch {
    pub fn request_nmi(&self) {
        self.nmi.set(true);
    }

    pub fn request_irq(&self) {
        self.irq.set(true);
    }

    pub fn request_reset(&self) {
        self.reset.set(true);
    }

    pub fn nmi_pending(&self) -> bool {
        self.nmi.get()
    }

    pub fn irq_pending(&self) -> bool {
        self.irq.get()
    }

    pub fn reset_pending(&self) -> bool {
        self.reset.get()
    }

    pub fn clear(&self, interrupt: Interrupt) {
        match interrupt {
            Interrupt::Nmi => self.nmi.set(false),
            Interrupt::Irq => self.irq.set(false),
        }
    }

    pub fn clear_all(&self) {
        self.nmi.set(false);
        self.irq.set(false);
        self.reset.set(false);
    }
}

/// Register snapshot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub p: u8,
    pub flags: Flags,
    pub address_latch: u16,
    pub cycles: u64,
}

/// Why [`Cpu6502::run_loop`] returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped { cycles: u64 },
}

/// Resolved operand location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Accumulator,
    Memory(u16),
}

/// MOS 6502 CPU state and execution engine.
pub struct Cpu6502<M: Memory6502> {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer (page 1)
    pub sp: u8,
    pub pc: u16,
    pub flags: Flags,
    /// Last address put on the bus by an operand access
    pub address_latch: u16,
    /// Total cycles charged since construction
    pub cycles: u64,
    pub memory: M,
    interrupts: InterruptLatch,
    budget: Arc<CycleBudget>,
    /// Interrupt being serviced by the current forced BRK
    servicing: Option<Interrupt>,
    extra_cycles: u32,
}

impl<M: Memory6502> Cpu6502<M> {
    /// Create a CPU with its own private budget.
    pub fn new(memory: M) -> Self {
        Self::with_budget(memory, Arc::new(CycleBudget::new()))
    }

    pub fn with_budget(memory: M, budget: Arc<CycleBudget>) -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: POWER_UP_SP,
            pc: 0,
            flags: Flags::default(),
            address_latch: 0,
            cycles: 0,
            memory,
            interrupts: InterruptLatch::default(),
            budget,
            servicing: None,
            extra_cycles: 0,
        }
    }

    pub fn budget(&self) -> &Arc<CycleBudget> {
        &self.budget
    }

    pub fn interrupts(&self) -> &InterruptLatch {
        &self.interrupts
    }

    /// Latch NMI, IRQ and RESET requests whenever the lines are driven low.
    pub fn attach_interrupt_lines(&self, nmi: &Line, irq: &Line, reset: &Line) {
        let latch = self.interrupts.clone();
        nmi.register_listener(Level::Low, move || latch.request_nmi());
        let latch = self.interrupts.clone();
        irq.register_listener(Level::Low, move || latch.request_irq());
        let latch = self.interrupts.clone();
        reset.register_listener(Level::Low, move || latch.request_reset());
    }

    pub fn request_nmi(&self) {
        self.interrupts.request_nmi();
    }

    pub fn request_irq(&self) {
        self.interrupts.request_irq();
    }

    pub fn request_reset(&self) {
        self.interrupts.request_reset();
    }

    /// Power-up / reset sequence.
    pub fn power_up(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.flags.load_byte(0, false);
        self.interrupts.clear_all();
        self.servicing = None;
        self.sp = POWER_UP_SP;
        self.pc = self.read_word(RESET_VECTOR);
        log(LogCategory::Cpu, LogLevel::Info, || {
            format!("CPU: reset vector -> {:#06X}", self.pc)
        });
    }

    pub fn registers(&self) -> Registers {
        Registers {
            a: self.a,
            x: self.x,
            y: self.y,
            sp: self.sp,
            pc: self.pc,
            p: self.flags.to_byte(),
            flags: self.flags,
            address_latch: self.address_latch,
            cycles: self.cycles,
        }
    }

    /// Run instructions while credit allows until `control` is stopped.
    pub fn run_loop(&mut self, control: &RunControl) -> Result<RunOutcome, CpuError> {
        let budget = self.budget.clone();
        let start = self.cycles;
        while budget.acquire(control) {
            if let Err(e) = self.cycle() {
                log(LogCategory::Cpu, LogLevel::Error, || format!("CPU: {}", e));
                return Err(e);
            }
            self.memory.end_cycle();
        }
        Ok(RunOutcome::Stopped {
            cycles: self.cycles - start,
        })
    }

    /// Execute one instruction (or service one interrupt) and charge its cost.
    ///
    /// Returns the cycles charged. On error nothing is charged and the program
    /// counter is left at the failing instruction.
    pub fn cycle(&mut self) -> Result<u32, CpuError> {
        if self.interrupts.reset_pending() {
            self.power_up();
            self.charge(RESET_CYCLES);
            return Ok(RESET_CYCLES);
        }

        let start_pc = self.pc;
        self.servicing = if self.interrupts.nmi_pending() {
            Some(Interrupt::Nmi)
        } else if self.interrupts.irq_pending() {
            Some(Interrupt::Irq)
        } else {
            None
        };

        let instruction = match self.servicing {
            Some(interrupt) => {
                log(LogCategory::Interrupts, LogLevel::Debug, || {
                    format!("CPU: servicing {:?} at {:#06X}", interrupt, start_pc)
                });
                decode(0x00)
            }
            None => {
                let opcode = self.fetch_byte();
                decode(opcode)
            }
        };

        log(LogCategory::Cpu, LogLevel::Trace, || {
            format!(
                "{:04X}  {:02X} {:<4} {:?}  A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
                start_pc,
                instruction.opcode,
                instruction.mnemonic,
                instruction.mode,
                self.a,
                self.x,
                self.y,
                self.flags.to_byte(),
                self.sp
            )
        });

        self.extra_cycles = 0;
        if let Err(e) = self.execute(instruction, start_pc) {
            self.pc = start_pc;
            self.servicing = None;
            return Err(e);
        }
        self.servicing = None;

        let cycles = u32::from(instruction.cycles) + self.extra_cycles;
        self.charge(cycles);
        Ok(cycles)
    }

    #[inline]
    fn charge(&mut self, cycles: u32) {
        self.budget.charge(cycles);
        self.cycles = self.cycles.wrapping_add(u64::from(cycles));
    }

    fn execute(&mut self, ins: &'static Instruction, start_pc: u16) -> Result<(), CpuError> {
        match ins.handler {
            Handler::Adc => self.adc(ins),
            Handler::Sbc => self.sbc(ins),
            Handler::Logic => self.logic(ins),
            Handler::Bit => self.bit(ins),
            Handler::Compare => self.compare(ins),
            Handler::Load => self.load(ins),
            Handler::Store => self.store(ins),
            Handler::Shift => self.shift(ins),
            Handler::StepMemory => self.step_memory(ins),
            Handler::StepIndex => self.step_index(ins),
            Handler::Transfer => self.transfer(ins),
            Handler::Flag => self.flag(ins),
            Handler::Branch => self.branch(ins),
            Handler::Brk => {
                self.brk();
                Ok(())
            }
            Handler::Jmp => self.jmp(ins),
            Handler::Jsr => self.jsr(ins),
            Handler::Rti => {
                self.rti();
                Ok(())
            }
            Handler::Rts => {
                self.rts();
                Ok(())
            }
            Handler::Pha => {
                self.push(self.a);
                Ok(())
            }
            Handler::Php => {
                let p = self.flags.to_byte() | flags::BREAK | flags::UNUSED;
                self.push(p);
                Ok(())
            }
            Handler::Pla => {
                self.a = self.pop();
                self.flags.set_zn(self.a);
                Ok(())
            }
            Handler::Plp => {
                let p = self.pop();
                self.flags.load_byte(p, true);
                Ok(())
            }
            Handler::Nop => Ok(()),
            Handler::Unimplemented => {
                log(LogCategory::Cpu, LogLevel::Warn, || {
                    format!(
                        "CPU: unimplemented opcode {:#04X} at {:#06X}",
                        ins.opcode, start_pc
                    )
                });
                Err(CpuError::UnimplementedOpcode {
                    opcode: ins.opcode,
                    pc: start_pc,
                })
            }
        }
    }

    // ---- bus access -------------------------------------------------------

    #[inline]
    fn read(&mut self, addr: u16) -> u8 {
        self.address_latch = addr;
        self.memory.read(addr)
    }

    #[inline]
    fn write(&mut self, addr: u16, val: u8) {
        self.address_latch = addr;
        self.memory.write(addr, val);
    }

    fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Read a pointer from page 0; the high byte wraps within the page.
    fn read_zero_page_word(&mut self, zp: u8) -> u16 {
        let lo = self.read(zp as u16) as u16;
        let hi = self.read(zp.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn fetch_byte(&mut self) -> u8 {
        let v = self.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte() as u16;
        let hi = self.fetch_byte() as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, v: u8) {
        self.write(STACK_BASE | self.sp as u16, v);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.read(STACK_BASE | self.sp as u16)
    }

    fn push_word(&mut self, v: u16) {
        self.push((v >> 8) as u8);
        self.push(v as u8);
    }

    fn pop_word(&mut self) -> u16 {
        let lo = self.pop() as u16;
        let hi = self.pop() as u16;
        (hi << 8) | lo
    }

    // ---- operand resolution ----------------------------------------------

    fn page_cross_penalty(&mut self, ins: &Instruction, base: u16, addr: u16) {
        if ins.page_cross && (base & 0xFF00) != (addr & 0xFF00) {
            self.extra_cycles += 1;
        }
    }

    /// Resolve the operand location for `ins`, consuming operand bytes.
    fn operand(&mut self, ins: &Instruction) -> Result<Operand, CpuError> {
        let addr = match ins.mode {
            AddressingMode::Implied => {
                return Err(CpuError::ImpliedOperandRequested {
                    mnemonic: ins.mnemonic,
                })
            }
            AddressingMode::Accumulator => return Ok(Operand::Accumulator),
            AddressingMode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                addr
            }
            AddressingMode::Absolute => self.fetch_word(),
            AddressingMode::Indirect => {
                let ptr = self.fetch_word();
                self.read_word(ptr)
            }
            AddressingMode::AbsoluteX => {
                let base = self.fetch_word();
                let addr = base.wrapping_add(self.x as u16);
                self.page_cross_penalty(ins, base, addr);
                addr
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_word();
                let addr = base.wrapping_add(self.y as u16);
                self.page_cross_penalty(ins, base, addr);
                addr
            }
            AddressingMode::IndexedIndirect => {
                let zp = self.fetch_byte().wrapping_add(self.x);
                self.read_zero_page_word(zp)
            }
            AddressingMode::IndirectIndexed => {
                let zp = self.fetch_byte();
                let base = self.read_zero_page_word(zp);
                let addr = base.wrapping_add(self.y as u16);
                self.page_cross_penalty(ins, base, addr);
                addr
            }
            AddressingMode::ZeroPage => self.fetch_byte() as u16,
            AddressingMode::ZeroPageX => self.fetch_byte().wrapping_add(self.x) as u16,
            AddressingMode::ZeroPageY => self.fetch_byte().wrapping_add(self.y) as u16,
            AddressingMode::Relative => {
                let offset = self.fetch_byte() as i8;
                self.pc.wrapping_add(offset as i16 as u16)
            }
        };
        Ok(Operand::Memory(addr))
    }

    fn read_operand(&mut self, ins: &Instruction) -> Result<u8, CpuError> {
        Ok(match self.operand(ins)? {
            Operand::Accumulator => self.a,
            Operand::Memory(addr) => self.read(addr),
        })
    }

    /// Second half of a read-modify-write: store to A or back to the latched address.
    fn write_back(&mut self, operand: Operand, v: u8) {
        match operand {
            Operand::Accumulator => self.a = v,
            Operand::Memory(_) => self.write(self.address_latch, v),
        }
    }

    fn unexpected(ins: &Instruction) -> CpuError {
        CpuError::UnexpectedMnemonic {
            mnemonic: ins.mnemonic,
            handler: ins.handler,
        }
    }

    // ---- arithmetic -------------------------------------------------------

    fn adc(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let m = self.read_operand(ins)? as i32;
        let a = self.a as i32;
        let result = if self.flags.decimal {
            // Digit reconstruction in base 10; ignores carry-in and leaves V alone.
            let temp = 10 * (a & 0xF0) + (a & 0x0F) + 10 * (m & 0xF0) + (m & 0x0F);
            ((temp / 10) << 4) + temp % 10
        } else {
            let temp = a + m + self.flags.carry as i32;
            self.flags.overflow = (!(a ^ m) & (a ^ temp) & 0x80) != 0;
            temp
        };
        self.flags.carry = result > 0xFF;
        self.a = (result & 0xFF) as u8;
        self.flags.set_zn(self.a);
        Ok(())
    }

    fn sbc(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let m = self.read_operand(ins)? as i32;
        let a = self.a as i32;
        let result = if self.flags.decimal {
            let temp = 10 * (a & 0xF0) + (a & 0x0F) - (10 * (m & 0xF0) + (m & 0x0F));
            ((temp / 10) << 4) + temp % 10
        } else {
            a - m - (!self.flags.carry) as i32
        };
        self.flags.overflow = ((a ^ result) & 0x80) != 0 && ((a ^ m) & 0x80) != 0;
        self.flags.carry = result >= 0;
        self.a = (result & 0xFF) as u8;
        self.flags.set_zn(self.a);
        Ok(())
    }

    fn logic(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let m = self.read_operand(ins)?;
        self.a = match ins.mnemonic {
            Mnemonic::AND => self.a & m,
            Mnemonic::ORA => self.a | m,
            Mnemonic::EOR => self.a ^ m,
            _ => return Err(Self::unexpected(ins)),
        };
        self.flags.set_zn(self.a);
        Ok(())
    }

    fn bit(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let m = self.read_operand(ins)?;
        self.flags.zero = self.a & m == 0;
        self.flags.negative = m & 0x80 != 0;
        self.flags.overflow = m & 0x40 != 0;
        Ok(())
    }

    fn compare(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let register = match ins.mnemonic {
            Mnemonic::CMP => self.a,
            Mnemonic::CPX => self.x,
            Mnemonic::CPY => self.y,
            _ => return Err(Self::unexpected(ins)),
        };
        if matches!(
            ins.mode,
            AddressingMode::Accumulator | AddressingMode::Relative | AddressingMode::Indirect
        ) {
            return Err(CpuError::InvalidAddressingMode {
                mnemonic: ins.mnemonic,
                mode: ins.mode,
            });
        }
        let m = self.read_operand(ins)?;
        self.flags.carry = register >= m;
        self.flags.set_zn(register.wrapping_sub(m));
        Ok(())
    }

    // ---- loads, stores, transfers ----------------------------------------

    fn load(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        if !matches!(ins.mnemonic, Mnemonic::LDA | Mnemonic::LDX | Mnemonic::LDY) {
            return Err(Self::unexpected(ins));
        }
        let m = self.read_operand(ins)?;
        match ins.mnemonic {
            Mnemonic::LDA => self.a = m,
            Mnemonic::LDX => self.x = m,
            _ => self.y = m,
        }
        self.flags.set_zn(m);
        Ok(())
    }

    fn store(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let value = match ins.mnemonic {
            Mnemonic::STA => self.a,
            Mnemonic::STX => self.x,
            Mnemonic::STY => self.y,
            _ => return Err(Self::unexpected(ins)),
        };
        if matches!(
            ins.mode,
            AddressingMode::Immediate | AddressingMode::Accumulator | AddressingMode::Relative
        ) {
            return Err(CpuError::InvalidAddressingMode {
                mnemonic: ins.mnemonic,
                mode: ins.mode,
            });
        }
        // Stores put the address on the bus without a read cycle.
        if let Operand::Memory(addr) = self.operand(ins)? {
            self.write(addr, value);
        }
        Ok(())
    }

    fn transfer(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        match ins.mnemonic {
            Mnemonic::TAX => {
                self.x = self.a;
                self.flags.set_zn(self.x);
            }
            Mnemonic::TAY => {
                self.y = self.a;
                self.flags.set_zn(self.y);
            }
            Mnemonic::TSX => {
                self.x = self.sp;
                self.flags.set_zn(self.x);
            }
            Mnemonic::TXA => {
                self.a = self.x;
                self.flags.set_zn(self.a);
            }
            Mnemonic::TXS => self.sp = self.x,
            Mnemonic::TYA => {
                self.a = self.y;
                self.flags.set_zn(self.a);
            }
            _ => return Err(Self::unexpected(ins)),
        }
        Ok(())
    }

    // ---- read-modify-write -----------------------------------------------

    fn shift(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        if !matches!(
            ins.mnemonic,
            Mnemonic::ASL | Mnemonic::LSR | Mnemonic::ROL | Mnemonic::ROR
        ) {
            return Err(Self::unexpected(ins));
        }
        let operand = self.operand(ins)?;
        let v = match operand {
            Operand::Accumulator => self.a,
            Operand::Memory(addr) => self.read(addr),
        };
        let carry_in = self.flags.carry as u8;
        let (result, carry_out) = match ins.mnemonic {
            Mnemonic::ASL => (v << 1, v & 0x80 != 0),
            Mnemonic::LSR => (v >> 1, v & 0x01 != 0),
            Mnemonic::ROL => ((v << 1) | carry_in, v & 0x80 != 0),
            _ => ((v >> 1) | (carry_in << 7), v & 0x01 != 0),
        };
        self.write_back(operand, result);
        self.flags.carry = carry_out;
        self.flags.set_zn(result);
        Ok(())
    }

    fn step_memory(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let delta: u8 = match ins.mnemonic {
            Mnemonic::INC => 1,
            Mnemonic::DEC => 0xFF,
            _ => return Err(Self::unexpected(ins)),
        };
        let operand = self.operand(ins)?;
        let v = match operand {
            Operand::Accumulator => self.a,
            Operand::Memory(addr) => self.read(addr),
        };
        let result = v.wrapping_add(delta);
        self.write_back(operand, result);
        self.flags.set_zn(result);
        Ok(())
    }

    fn step_index(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let result = match ins.mnemonic {
            Mnemonic::INX => {
                self.x = self.x.wrapping_add(1);
                self.x
            }
            Mnemonic::INY => {
                self.y = self.y.wrapping_add(1);
                self.y
            }
            Mnemonic::DEX => {
                self.x = self.x.wrapping_sub(1);
                self.x
            }
            Mnemonic::DEY => {
                self.y = self.y.wrapping_sub(1);
                self.y
            }
            _ => return Err(Self::unexpected(ins)),
        };
        self.flags.set_zn(result);
        Ok(())
    }

    // ---- flags and control flow ------------------------------------------

    fn flag(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        match ins.mnemonic {
            Mnemonic::CLC => self.flags.carry = false,
            Mnemonic::CLD => self.flags.decimal = false,
            Mnemonic::CLI => self.flags.interrupt_disable = false,
            Mnemonic::CLV => self.flags.overflow = false,
            Mnemonic::SEC => self.flags.carry = true,
            Mnemonic::SED => self.flags.decimal = true,
            Mnemonic::SEI => self.flags.interrupt_disable = true,
            _ => return Err(Self::unexpected(ins)),
        }
        Ok(())
    }

    fn branch(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        let taken = match ins.mnemonic {
            Mnemonic::BCC => !self.flags.carry,
            Mnemonic::BCS => self.flags.carry,
            Mnemonic::BEQ => self.flags.zero,
            Mnemonic::BNE => !self.flags.zero,
            Mnemonic::BMI => self.flags.negative,
            Mnemonic::BPL => !self.flags.negative,
            Mnemonic::BVC => !self.flags.overflow,
            Mnemonic::BVS => self.flags.overflow,
            _ => return Err(Self::unexpected(ins)),
        };
        let target = match self.operand(ins)? {
            Operand::Memory(target) => target,
            Operand::Accumulator => {
                return Err(CpuError::InvalidAddressingMode {
                    mnemonic: ins.mnemonic,
                    mode: ins.mode,
                })
            }
        };
        if taken {
            self.page_cross_penalty(ins, self.pc, target);
            self.pc = target;
        }
        Ok(())
    }

    fn jmp(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        match ins.mode {
            AddressingMode::Absolute | AddressingMode::Indirect => {}
            mode => {
                return Err(CpuError::InvalidAddressingMode {
                    mnemonic: ins.mnemonic,
                    mode,
                })
            }
        }
        if let Operand::Memory(target) = self.operand(ins)? {
            self.pc = target;
        }
        Ok(())
    }

    fn jsr(&mut self, ins: &Instruction) -> Result<(), CpuError> {
        if ins.mode != AddressingMode::Absolute {
            return Err(CpuError::InvalidAddressingMode {
                mnemonic: ins.mnemonic,
                mode: ins.mode,
            });
        }
        let target = self.fetch_word();
        self.push_word(self.pc.wrapping_sub(1));
        self.pc = target;
        Ok(())
    }

    fn rts(&mut self) {
        self.pc = self.pop_word().wrapping_add(1);
    }

    fn rti(&mut self) {
        let p = self.pop();
        self.flags.load_byte(p, true);
        self.pc = self.pop_word();
    }

    /// Software BRK and the hardware interrupt sequence.
    fn brk(&mut self) {
        let servicing = self.servicing;
        if servicing.is_none() {
            // Skip the break mark byte.
            self.pc = self.pc.wrapping_add(1);
        }
        self.push_word(self.pc);

        let mut pushed = self.flags;
        pushed.unused = true;
        pushed.brk = servicing.is_none();
        self.push(pushed.to_byte());
        self.flags.interrupt_disable = true;

        let vector = match servicing {
            Some(Interrupt::Nmi) => NMI_VECTOR,
            _ => IRQ_VECTOR,
        };
        self.pc = self.read_word(vector);

        if let Some(interrupt) = servicing {
            self.interrupts.clear(interrupt);
        }
    }
}

/// Flat 64 KiB memory used by tests and benchmarks.
#[derive(Debug)]
pub struct ArrayMemory {
    pub data: Box<[u8; 0x10000]>,
}

impl ArrayMemory {
    pub fn new() -> Self {
        Self {
            data: Box::new([0; 0x10000]),
        }
    }

    /// Copy `program` to `origin` and point the reset vector at it.
    pub fn load_program(&mut self, origin: u16, program: &[u8]) {
        let start = origin as usize;
        let end = (start + program.len()).min(self.data.len());
        self.data[start..end].copy_from_slice(&program[..end - start]);
        self.set_vector(RESET_VECTOR, origin);
    }

    pub fn set_vector(&mut self, vector: u16, target: u16) {
        self.data[vector as usize] = target as u8;
        self.data[vector.wrapping_add(1) as usize] = (target >> 8) as u8;
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory6502 for ArrayMemory {
    fn read(&mut self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.data[addr as usize] = val;
    }
}
