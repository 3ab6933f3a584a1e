//! The 256-entry 6502 opcode dispatch table.
//!
//! Every byte value is mapped to an [`OpcodeInfo`]: a mnemonic, an
//! addressing mode, a base cycle count, and whether that base count can grow
//! by one for a page-crossing read. Bytes with no official 6502 instruction
//! are tagged [`Mnemonic::Unofficial`]; [`crate::cpu::Cpu`] traps on them
//! rather than emulating illegal-opcode behavior (out of scope, see the
//! crate's top-level docs).

use crate::addressing::AddressingMode;

/// The instruction a byte decodes to.
///
/// Only the 56 documented 6502 mnemonics are represented; anything else is
/// [`Mnemonic::Unofficial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    /// Not an official 6502 opcode; the dispatcher traps when it is fetched.
    Unofficial,
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Adc => "ADC", Self::And => "AND", Self::Asl => "ASL", Self::Bcc => "BCC",
            Self::Bcs => "BCS", Self::Beq => "BEQ", Self::Bit => "BIT", Self::Bmi => "BMI",
            Self::Bne => "BNE", Self::Bpl => "BPL", Self::Brk => "BRK", Self::Bvc => "BVC",
            Self::Bvs => "BVS", Self::Clc => "CLC", Self::Cld => "CLD", Self::Cli => "CLI",
            Self::Clv => "CLV", Self::Cmp => "CMP", Self::Cpx => "CPX", Self::Cpy => "CPY",
            Self::Dec => "DEC", Self::Dex => "DEX", Self::Dey => "DEY", Self::Eor => "EOR",
            Self::Inc => "INC", Self::Inx => "INX", Self::Iny => "INY", Self::Jmp => "JMP",
            Self::Jsr => "JSR", Self::Lda => "LDA", Self::Ldx => "LDX", Self::Ldy => "LDY",
            Self::Lsr => "LSR", Self::Nop => "NOP", Self::Ora => "ORA", Self::Pha => "PHA",
            Self::Php => "PHP", Self::Pla => "PLA", Self::Plp => "PLP", Self::Rol => "ROL",
            Self::Ror => "ROR", Self::Rti => "RTI", Self::Rts => "RTS", Self::Sbc => "SBC",
            Self::Sec => "SEC", Self::Sed => "SED", Self::Sei => "SEI", Self::Sta => "STA",
            Self::Stx => "STX", Self::Sty => "STY", Self::Tax => "TAX", Self::Tay => "TAY",
            Self::Tsx => "TSX", Self::Txa => "TXA", Self::Txs => "TXS", Self::Tya => "TYA",
            Self::Unofficial => "JAM",
        };
        f.write_str(name)
    }
}

/// One row of the opcode dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// The instruction this byte decodes to.
    pub mnemonic: Mnemonic,
    /// How the operand bytes are interpreted.
    pub mode: AddressingMode,
    /// Base cycle cost, before any page-crossing or branch-taken penalty.
    pub cycles: u8,
    /// Whether a page crossing while computing the effective address adds
    /// one more cycle. Always `false` for store and read-modify-write
    /// instructions, which already charge the worst case in `cycles`.
    pub page_cross_penalty: bool,
}

const fn op(
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
    page_cross_penalty: bool,
) -> OpcodeInfo {
    OpcodeInfo { mnemonic, mode, cycles, page_cross_penalty }
}

const fn unofficial() -> OpcodeInfo {
    op(Mnemonic::Unofficial, AddressingMode::Implied, 2, false)
}

use AddressingMode::{
    Absolute as ABS, AbsoluteX as ABX, AbsoluteY as ABY, Accumulator as ACC, Immediate as IMM,
    Implied as IMP, IndexedIndirectX as IDX, Indirect as IND, IndirectIndexedY as IDY,
    Relative as REL, ZeroPage as ZP0, ZeroPageX as ZPX, ZeroPageY as ZPY,
};
use Mnemonic::{
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc, Cld, Cli, Clv, Cmp, Cpx,
    Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla,
    Plp, Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
};

/// The full opcode → (mnemonic, mode, cycles) dispatch table.
#[rustfmt::skip]
pub static OPCODE_TABLE: [OpcodeInfo; 256] = [
    // 0x00-0x0F
    op(Brk, IMP, 7, false), op(Ora, IDX, 6, false), unofficial(), unofficial(),
    unofficial(), op(Ora, ZP0, 3, false), op(Asl, ZP0, 5, false), unofficial(),
    op(Php, IMP, 3, false), op(Ora, IMM, 2, false), op(Asl, ACC, 2, false), unofficial(),
    unofficial(), op(Ora, ABS, 4, false), op(Asl, ABS, 6, false), unofficial(),
    // 0x10-0x1F
    op(Bpl, REL, 2, false), op(Ora, IDY, 5, true), unofficial(), unofficial(),
    unofficial(), op(Ora, ZPX, 4, false), op(Asl, ZPX, 6, false), unofficial(),
    op(Clc, IMP, 2, false), op(Ora, ABY, 4, true), unofficial(), unofficial(),
    unofficial(), op(Ora, ABX, 4, true), op(Asl, ABX, 7, false), unofficial(),
    // 0x20-0x2F
    op(Jsr, ABS, 6, false), op(And, IDX, 6, false), unofficial(), unofficial(),
    op(Bit, ZP0, 3, false), op(And, ZP0, 3, false), op(Rol, ZP0, 5, false), unofficial(),
    op(Plp, IMP, 4, false), op(And, IMM, 2, false), op(Rol, ACC, 2, false), unofficial(),
    op(Bit, ABS, 4, false), op(And, ABS, 4, false), op(Rol, ABS, 6, false), unofficial(),
    // 0x30-0x3F
    op(Bmi, REL, 2, false), op(And, IDY, 5, true), unofficial(), unofficial(),
    unofficial(), op(And, ZPX, 4, false), op(Rol, ZPX, 6, false), unofficial(),
    op(Sec, IMP, 2, false), op(And, ABY, 4, true), unofficial(), unofficial(),
    unofficial(), op(And, ABX, 4, true), op(Rol, ABX, 7, false), unofficial(),
    // 0x40-0x4F
    op(Rti, IMP, 6, false), op(Eor, IDX, 6, false), unofficial(), unofficial(),
    unofficial(), op(Eor, ZP0, 3, false), op(Lsr, ZP0, 5, false), unofficial(),
    op(Pha, IMP, 3, false), op(Eor, IMM, 2, false), op(Lsr, ACC, 2, false), unofficial(),
    op(Jmp, ABS, 3, false), op(Eor, ABS, 4, false), op(Lsr, ABS, 6, false), unofficial(),
    // 0x50-0x5F
    op(Bvc, REL, 2, false), op(Eor, IDY, 5, true), unofficial(), unofficial(),
    unofficial(), op(Eor, ZPX, 4, false), op(Lsr, ZPX, 6, false), unofficial(),
    op(Cli, IMP, 2, false), op(Eor, ABY, 4, true), unofficial(), unofficial(),
    unofficial(), op(Eor, ABX, 4, true), op(Lsr, ABX, 7, false), unofficial(),
    // 0x60-0x6F
    op(Rts, IMP, 6, false), op(Adc, IDX, 6, false), unofficial(), unofficial(),
    unofficial(), op(Adc, ZP0, 3, false), op(Ror, ZP0, 5, false), unofficial(),
    op(Pla, IMP, 4, false), op(Adc, IMM, 2, false), op(Ror, ACC, 2, false), unofficial(),
    op(Jmp, IND, 5, false), op(Adc, ABS, 4, false), op(Ror, ABS, 6, false), unofficial(),
    // 0x70-0x7F
    op(Bvs, REL, 2, false), op(Adc, IDY, 5, true), unofficial(), unofficial(),
    unofficial(), op(Adc, ZPX, 4, false), op(Ror, ZPX, 6, false), unofficial(),
    op(Sei, IMP, 2, false), op(Adc, ABY, 4, true), unofficial(), unofficial(),
    unofficial(), op(Adc, ABX, 4, true), op(Ror, ABX, 7, false), unofficial(),
    // 0x80-0x8F
    unofficial(), op(Sta, IDX, 6, false), unofficial(), unofficial(),
    op(Sty, ZP0, 3, false), op(Sta, ZP0, 3, false), op(Stx, ZP0, 3, false), unofficial(),
    op(Dey, IMP, 2, false), unofficial(), op(Txa, IMP, 2, false), unofficial(),
    op(Sty, ABS, 4, false), op(Sta, ABS, 4, false), op(Stx, ABS, 4, false), unofficial(),
    // 0x90-0x9F
    op(Bcc, REL, 2, false), op(Sta, IDY, 6, false), unofficial(), unofficial(),
    op(Sty, ZPX, 4, false), op(Sta, ZPX, 4, false), op(Stx, ZPY, 4, false), unofficial(),
    op(Tya, IMP, 2, false), op(Sta, ABY, 5, false), op(Txs, IMP, 2, false), unofficial(),
    unofficial(), op(Sta, ABX, 5, false), unofficial(), unofficial(),
    // 0xA0-0xAF
    op(Ldy, IMM, 2, false), op(Lda, IDX, 6, false), op(Ldx, IMM, 2, false), unofficial(),
    op(Ldy, ZP0, 3, false), op(Lda, ZP0, 3, false), op(Ldx, ZP0, 3, false), unofficial(),
    op(Tay, IMP, 2, false), op(Lda, IMM, 2, false), op(Tax, IMP, 2, false), unofficial(),
    op(Ldy, ABS, 4, false), op(Lda, ABS, 4, false), op(Ldx, ABS, 4, false), unofficial(),
    // 0xB0-0xBF
    op(Bcs, REL, 2, false), op(Lda, IDY, 5, true), unofficial(), unofficial(),
    op(Ldy, ZPX, 4, false), op(Lda, ZPX, 4, false), op(Ldx, ZPY, 4, false), unofficial(),
    op(Clv, IMP, 2, false), op(Lda, ABY, 4, true), op(Tsx, IMP, 2, false), unofficial(),
    op(Ldy, ABX, 4, true), op(Lda, ABX, 4, true), op(Ldx, ABY, 4, true), unofficial(),
    // 0xC0-0xCF
    op(Cpy, IMM, 2, false), op(Cmp, IDX, 6, false), unofficial(), unofficial(),
    op(Cpy, ZP0, 3, false), op(Cmp, ZP0, 3, false), op(Dec, ZP0, 5, false), unofficial(),
    op(Iny, IMP, 2, false), op(Cmp, IMM, 2, false), op(Dex, IMP, 2, false), unofficial(),
    op(Cpy, ABS, 4, false), op(Cmp, ABS, 4, false), op(Dec, ABS, 6, false), unofficial(),
    // 0xD0-0xDF
    op(Bne, REL, 2, false), op(Cmp, IDY, 5, true), unofficial(), unofficial(),
    unofficial(), op(Cmp, ZPX, 4, false), op(Dec, ZPX, 6, false), unofficial(),
    op(Cld, IMP, 2, false), op(Cmp, ABY, 4, true), unofficial(), unofficial(),
    unofficial(), op(Cmp, ABX, 4, true), op(Dec, ABX, 7, false), unofficial(),
    // 0xE0-0xEF
    op(Cpx, IMM, 2, false), op(Sbc, IDX, 6, false), unofficial(), unofficial(),
    op(Cpx, ZP0, 3, false), op(Sbc, ZP0, 3, false), op(Inc, ZP0, 5, false), unofficial(),
    op(Inx, IMP, 2, false), op(Sbc, IMM, 2, false), op(Nop, IMP, 2, false), unofficial(),
    op(Cpx, ABS, 4, false), op(Sbc, ABS, 4, false), op(Inc, ABS, 6, false), unofficial(),
    // 0xF0-0xFF
    op(Beq, REL, 2, false), op(Sbc, IDY, 5, true), unofficial(), unofficial(),
    unofficial(), op(Sbc, ZPX, 4, false), op(Inc, ZPX, 6, false), unofficial(),
    op(Sed, IMP, 2, false), op(Sbc, ABY, 4, true), unofficial(), unofficial(),
    unofficial(), op(Sbc, ABX, 4, true), op(Inc, ABX, 7, false), unofficial(),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lda_variants() {
        assert_eq!(OPCODE_TABLE[0xA9].mnemonic, Lda);
        assert_eq!(OPCODE_TABLE[0xA9].mode, IMM);
        assert_eq!(OPCODE_TABLE[0xAD].mode, ABS);
    }

    #[test]
    fn jmp_variants() {
        assert_eq!(OPCODE_TABLE[0x4C].mnemonic, Jmp);
        assert_eq!(OPCODE_TABLE[0x4C].mode, ABS);
        assert_eq!(OPCODE_TABLE[0x6C].mode, IND);
    }

    #[test]
    fn unofficial_opcodes_are_tagged() {
        assert_eq!(OPCODE_TABLE[0x02].mnemonic, Mnemonic::Unofficial);
        assert_eq!(OPCODE_TABLE[0xFF].mnemonic, Mnemonic::Unofficial);
    }

    #[test]
    fn brk_and_rti_timing() {
        assert_eq!(OPCODE_TABLE[0x00].cycles, 7);
        assert_eq!(OPCODE_TABLE[0x40].cycles, 6);
    }

    #[test]
    fn store_instructions_never_flag_page_cross_penalty() {
        assert!(!OPCODE_TABLE[0x9D].page_cross_penalty); // STA abs,X
        assert!(!OPCODE_TABLE[0x91].page_cross_penalty); // STA (zp),Y
    }

    #[test]
    fn official_opcode_count() {
        let official = OPCODE_TABLE
            .iter()
            .filter(|o| o.mnemonic != Mnemonic::Unofficial)
            .count();
        assert_eq!(official, 151);
    }
}
