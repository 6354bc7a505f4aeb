//! Opcode descriptor table.
//!
//! All 256 slots are populated at compile time. Slots without a documented
//! NMOS instruction hold an `XXX` descriptor bound to
//! [`Handler::Unimplemented`], so decoding never yields a missing entry.
//!
//! Cycle counts, lengths and page-cross flags follow the published
//! instruction reference (<https://www.masswerk.at/6502/6502_instruction_set.html>).
//! The page-cross flag marks the `*` entries: one extra cycle when an indexed
//! or relative address lands on a different page.

#![allow(clippy::upper_case_acronyms)]

use std::fmt;

use serde::Serialize;

/// Instruction mnemonics. `XXX` marks an unimplemented opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mnemonic {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
    XXX,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How an instruction derives its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddressingMode {
    /// No operand
    Implied,
    /// Operates on A
    Accumulator,
    /// `#nn`
    Immediate,
    /// `nnnn`
    Absolute,
    /// `(nnnn)`, JMP only
    Indirect,
    /// `nnnn,X`
    AbsoluteX,
    /// `nnnn,Y`
    AbsoluteY,
    /// `(nn,X)`
    IndexedIndirect,
    /// `(nn),Y`
    IndirectIndexed,
    /// `nn`
    ZeroPage,
    /// `nn,X`, wraps within page 0
    ZeroPageX,
    /// `nn,Y`, wraps within page 0
    ZeroPageY,
    /// Signed offset from PC, branches only
    Relative,
}

/// Execution routine bound to a descriptor.
///
/// Several mnemonics share one routine and are told apart at run time by the
/// descriptor's mnemonic (all compares, all branches, loads, stores, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Handler {
    Adc,
    Sbc,
    /// AND, ORA, EOR
    Logic,
    Bit,
    /// CMP, CPX, CPY
    Compare,
    /// LDA, LDX, LDY
    Load,
    /// STA, STX, STY
    Store,
    /// ASL, LSR, ROL, ROR
    Shift,
    /// INC, DEC
    StepMemory,
    /// INX, INY, DEX, DEY
    StepIndex,
    /// TAX, TAY, TSX, TXA, TXS, TYA
    Transfer,
    /// CLC, CLD, CLI, CLV, SEC, SED, SEI
    Flag,
    /// BCC, BCS, BEQ, BMI, BNE, BPL, BVC, BVS
    Branch,
    Brk,
    Jmp,
    Jsr,
    Rti,
    Rts,
    Pha,
    Php,
    Pla,
    Plp,
    Nop,
    Unimplemented,
}

impl Mnemonic {
    /// Routine executing this mnemonic.
    pub const fn handler(self) -> Handler {
        use Mnemonic::*;
        match self {
            ADC => Handler::Adc,
            SBC => Handler::Sbc,
            AND | ORA | EOR => Handler::Logic,
            BIT => Handler::Bit,
            CMP | CPX | CPY => Handler::Compare,
            LDA | LDX | LDY => Handler::Load,
            STA | STX | STY => Handler::Store,
            ASL | LSR | ROL | ROR => Handler::Shift,
            INC | DEC => Handler::StepMemory,
            INX | INY | DEX | DEY => Handler::StepIndex,
            TAX | TAY | TSX | TXA | TXS | TYA => Handler::Transfer,
            CLC | CLD | CLI | CLV | SEC | SED | SEI => Handler::Flag,
            BCC | BCS | BEQ | BMI | BNE | BPL | BVC | BVS => Handler::Branch,
            BRK => Handler::Brk,
            JMP => Handler::Jmp,
            JSR => Handler::Jsr,
            RTI => Handler::Rti,
            RTS => Handler::Rts,
            PHA => Handler::Pha,
            PHP => Handler::Php,
            PLA => Handler::Pla,
            PLP => Handler::Plp,
            NOP => Handler::Nop,
            XXX => Handler::Unimplemented,
        }
    }
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// Length in bytes, opcode included
    pub length: u8,
    /// Base cycle cost
    pub cycles: u8,
    /// One extra cycle when the effective address crosses a page
    pub page_cross: bool,
    pub handler: Handler,
}

impl Instruction {
    pub const fn unimplemented(opcode: u8) -> Self {
        Self {
            opcode,
            mnemonic: Mnemonic::XXX,
            mode: AddressingMode::Implied,
            length: 1,
            cycles: 0,
            page_cross: false,
            handler: Handler::Unimplemented,
        }
    }

    pub fn is_implemented(&self) -> bool {
        self.handler != Handler::Unimplemented
    }
}

use AddressingMode::{
    Absolute as ABS, AbsoluteX as ABX, AbsoluteY as ABY, Accumulator as ACC,
    Immediate as IMM, Implied as IMP, IndexedIndirect as INX_, Indirect as IND,
    IndirectIndexed as INY_, Relative as REL, ZeroPage as ZP, ZeroPageX as ZPX,
    ZeroPageY as ZPY,
};
use Mnemonic::*;

/// (opcode, mnemonic, mode, length, cycles, page-cross extra cycle)
type Row = (u8, Mnemonic, AddressingMode, u8, u8, bool);

#[rustfmt::skip]
const DOCUMENTED: [Row; 151] = [
    (0x69, ADC, IMM, 2, 2, false), (0x65, ADC, ZP, 2, 3, false), (0x75, ADC, ZPX, 2, 4, false),
    (0x6D, ADC, ABS, 3, 4, false), (0x7D, ADC, ABX, 3, 4, true), (0x79, ADC, ABY, 3, 4, true),
    (0x61, ADC, INX_, 2, 6, false), (0x71, ADC, INY_, 2, 5, true),

    (0x29, AND, IMM, 2, 2, false), (0x25, AND, ZP, 2, 3, false), (0x35, AND, ZPX, 2, 4, false),
    (0x2D, AND, ABS, 3, 4, false), (0x3D, AND, ABX, 3, 4, true), (0x39, AND, ABY, 3, 4, true),
    (0x21, AND, INX_, 2, 6, false), (0x31, AND, INY_, 2, 5, true),

    (0x0A, ASL, ACC, 1, 2, false), (0x06, ASL, ZP, 2, 5, false), (0x16, ASL, ZPX, 2, 6, false),
    (0x0E, ASL, ABS, 3, 6, false), (0x1E, ASL, ABX, 3, 7, false),

    (0x90, BCC, REL, 2, 2, true), (0xB0, BCS, REL, 2, 2, true), (0xF0, BEQ, REL, 2, 2, true),
    (0x30, BMI, REL, 2, 2, true), (0xD0, BNE, REL, 2, 2, true), (0x10, BPL, REL, 2, 2, true),
    (0x50, BVC, REL, 2, 2, true), (0x70, BVS, REL, 2, 2, true),

    (0x24, BIT, ZP, 2, 3, false), (0x2C, BIT, ABS, 3, 4, false),

    (0x00, BRK, IMP, 1, 7, false),

    (0x18, CLC, IMP, 1, 2, false), (0xD8, CLD, IMP, 1, 2, false), (0x58, CLI, IMP, 1, 2, false),
    (0xB8, CLV, IMP, 1, 2, false),

    (0xC9, CMP, IMM, 2, 2, false), (0xC5, CMP, ZP, 2, 3, false), (0xD5, CMP, ZPX, 2, 4, false),
    (0xCD, CMP, ABS, 3, 4, false), (0xDD, CMP, ABX, 3, 4, true), (0xD9, CMP, ABY, 3, 4, true),
    (0xC1, CMP, INX_, 2, 6, false), (0xD1, CMP, INY_, 2, 5, true),

    (0xE0, CPX, IMM, 2, 2, false), (0xE4, CPX, ZP, 2, 3, false), (0xEC, CPX, ABS, 3, 4, false),
    (0xC0, CPY, IMM, 2, 2, false), (0xC4, CPY, ZP, 2, 3, false), (0xCC, CPY, ABS, 3, 4, false),

    (0xC6, DEC, ZP, 2, 5, false), (0xD6, DEC, ZPX, 2, 6, false), (0xCE, DEC, ABS, 3, 6, false),
    (0xDE, DEC, ABX, 3, 7, false),

    (0xCA, DEX, IMP, 1, 2, false), (0x88, DEY, IMP, 1, 2, false),

    (0x49, EOR, IMM, 2, 2, false), (0x45, EOR, ZP, 2, 3, false), (0x55, EOR, ZPX, 2, 4, false),
    (0x4D, EOR, ABS, 3, 4, false), (0x5D, EOR, ABX, 3, 4, true), (0x59, EOR, ABY, 3, 4, true),
    (0x41, EOR, INX_, 2, 6, false), (0x51, EOR, INY_, 2, 5, true),

    (0xE6, INC, ZP, 2, 5, false), (0xF6, INC, ZPX, 2, 6, false), (0xEE, INC, ABS, 3, 6, false),
    (0xFE, INC, ABX, 3, 7, false),

    (0xE8, INX, IMP, 1, 2, false), (0xC8, INY, IMP, 1, 2, false),

    (0x4C, JMP, ABS, 3, 3, false), (0x6C, JMP, IND, 3, 5, false),
    (0x20, JSR, ABS, 3, 6, false),

    (0xA9, LDA, IMM, 2, 2, false), (0xA5, LDA, ZP, 2, 3, false), (0xB5, LDA, ZPX, 2, 4, false),
    (0xAD, LDA, ABS, 3, 4, false), (0xBD, LDA, ABX, 3, 4, true), (0xB9, LDA, ABY, 3, 4, true),
    (0xA1, LDA, INX_, 2, 6, false), (0xB1, LDA, INY_, 2, 5, true),

    (0xA2, LDX, IMM, 2, 2, false), (0xA6, LDX, ZP, 2, 3, false), (0xB6, LDX, ZPY, 2, 4, false),
    (0xAE, LDX, ABS, 3, 4, false), (0xBE, LDX, ABY, 3, 4, true),

    (0xA0, LDY, IMM, 2, 2, false), (0xA4, LDY, ZP, 2, 3, false), (0xB4, LDY, ZPX, 2, 4, false),
    (0xAC, LDY, ABS, 3, 4, false), (0xBC, LDY, ABX, 3, 4, true),

    (0x4A, LSR, ACC, 1, 2, false), (0x46, LSR, ZP, 2, 5, false), (0x56, LSR, ZPX, 2, 6, false),
    (0x4E, LSR, ABS, 3, 6, false), (0x5E, LSR, ABX, 3, 7, false),

    (0xEA, NOP, IMP, 1, 2, false),

    (0x09, ORA, IMM, 2, 2, false), (0x05, ORA, ZP, 2, 3, false), (0x15, ORA, ZPX, 2, 4, false),
    (0x0D, ORA, ABS, 3, 4, false), (0x1D, ORA, ABX, 3, 4, true), (0x19, ORA, ABY, 3, 4, true),
    (0x01, ORA, INX_, 2, 6, false), (0x11, ORA, INY_, 2, 5, true),

    (0x48, PHA, IMP, 1, 3, false), (0x08, PHP, IMP, 1, 3, false),
    (0x68, PLA, IMP, 1, 4, false), (0x28, PLP, IMP, 1, 4, false),

    (0x2A, ROL, ACC, 1, 2, false), (0x26, ROL, ZP, 2, 5, false), (0x36, ROL, ZPX, 2, 6, false),
    (0x2E, ROL, ABS, 3, 6, false), (0x3E, ROL, ABX, 3, 7, false),

    (0x6A, ROR, ACC, 1, 2, false), (0x66, ROR, ZP, 2, 5, false), (0x76, ROR, ZPX, 2, 6, false),
    (0x6E, ROR, ABS, 3, 6, false), (0x7E, ROR, ABX, 3, 7, false),

    (0x40, RTI, IMP, 1, 6, false), (0x60, RTS, IMP, 1, 6, false),

    (0xE9, SBC, IMM, 2, 2, false), (0xE5, SBC, ZP, 2, 3, false), (0xF5, SBC, ZPX, 2, 4, false),
    (0xED, SBC, ABS, 3, 4, false), (0xFD, SBC, ABX, 3, 4, true), (0xF9, SBC, ABY, 3, 4, true),
    (0xE1, SBC, INX_, 2, 6, false), (0xF1, SBC, INY_, 2, 5, true),

    (0x38, SEC, IMP, 1, 2, false), (0xF8, SED, IMP, 1, 2, false), (0x78, SEI, IMP, 1, 2, false),

    (0x85, STA, ZP, 2, 3, false), (0x95, STA, ZPX, 2, 4, false), (0x8D, STA, ABS, 3, 4, false),
    (0x9D, STA, ABX, 3, 5, false), (0x99, STA, ABY, 3, 5, false), (0x81, STA, INX_, 2, 6, false),
    (0x91, STA, INY_, 2, 6, false),

    (0x86, STX, ZP, 2, 3, false), (0x96, STX, ZPY, 2, 4, false), (0x8E, STX, ABS, 3, 4, false),
    (0x84, STY, ZP, 2, 3, false), (0x94, STY, ZPX, 2, 4, false), (0x8C, STY, ABS, 3, 4, false),

    (0xAA, TAX, IMP, 1, 2, false), (0xA8, TAY, IMP, 1, 2, false), (0xBA, TSX, IMP, 1, 2, false),
    (0x8A, TXA, IMP, 1, 2, false), (0x9A, TXS, IMP, 1, 2, false), (0x98, TYA, IMP, 1, 2, false),
];

const fn build_table() -> [Instruction; 256] {
    let mut table = [Instruction::unimplemented(0); 256];
    let mut i = 0;
    while i < 256 {
        table[i] = Instruction::unimplemented(i as u8);
        i += 1;
    }

    let mut row = 0;
    while row < DOCUMENTED.len() {
        let (opcode, mnemonic, mode, length, cycles, page_cross) = DOCUMENTED[row];
        table[opcode as usize] = Instruction {
            opcode,
            mnemonic,
            mode,
            length,
            cycles,
            page_cross,
            handler: mnemonic.handler(),
        };
        row += 1;
    }
    table
}

/// Descriptor for every opcode, indexed by opcode byte.
pub static INSTRUCTION_TABLE: [Instruction; 256] = build_table();

/// Descriptor for `opcode`.
#[inline]
pub fn decode(opcode: u8) -> &'static Instruction {
    &INSTRUCTION_TABLE[opcode as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_total_and_indexed_by_opcode() {
        for (i, ins) in INSTRUCTION_TABLE.iter().enumerate() {
            assert_eq!(ins.opcode as usize, i);
        }
    }

    #[test]
    fn documented_set_has_151_distinct_opcodes() {
        let implemented = INSTRUCTION_TABLE
            .iter()
            .filter(|i| i.is_implemented())
            .count();
        assert_eq!(implemented, 151);
    }

    #[test]
    fn unimplemented_slots_fail_explicitly() {
        for opcode in [0x02u8, 0x03, 0x1A, 0x80, 0xFF] {
            let ins = decode(opcode);
            assert_eq!(ins.mnemonic, Mnemonic::XXX);
            assert_eq!(ins.handler, Handler::Unimplemented);
        }
    }

    #[test]
    fn length_matches_addressing_mode() {
        for ins in INSTRUCTION_TABLE.iter().filter(|i| i.is_implemented()) {
            let expected = match ins.mode {
                AddressingMode::Implied | AddressingMode::Accumulator => 1,
                AddressingMode::Absolute
                | AddressingMode::AbsoluteX
                | AddressingMode::AbsoluteY
                | AddressingMode::Indirect => 3,
                _ => 2,
            };
            assert_eq!(ins.length, expected, "{:#04X} {}", ins.opcode, ins.mnemonic);
        }
    }

    #[test]
    fn shared_handlers() {
        assert_eq!(decode(0xC9).handler, Handler::Compare);
        assert_eq!(decode(0xE0).handler, Handler::Compare);
        assert_eq!(decode(0xC0).handler, Handler::Compare);
        assert_eq!(decode(0xF0).handler, Handler::Branch);
        assert_eq!(decode(0x90).handler, Handler::Branch);
    }

    #[test]
    fn page_cross_only_on_reads_and_branches() {
        assert!(decode(0xBD).page_cross); // LDA abs,X
        assert!(decode(0xB1).page_cross); // LDA (zp),Y
        assert!(!decode(0x9D).page_cross); // STA abs,X
        assert!(!decode(0x1E).page_cross); // ASL abs,X
        assert!(decode(0xD0).page_cross); // BNE
    }

    #[test]
    fn published_costs() {
        let brk = decode(0x00);
        assert_eq!((brk.mnemonic, brk.cycles, brk.length), (Mnemonic::BRK, 7, 1));
        let jmp_ind = decode(0x6C);
        assert_eq!((jmp_ind.mode, jmp_ind.cycles), (AddressingMode::Indirect, 5));
        let sta_iny = decode(0x91);
        assert_eq!((sta_iny.cycles, sta_iny.page_cross), (6, false));
    }
}
