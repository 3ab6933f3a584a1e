//! 6502 CPU core implementation.
//!
//! This module contains the main CPU structure with all registers, a
//! cycle-by-cycle execution state machine, and interrupt handling. Every
//! `tick()` call advances the CPU by exactly one clock cycle, which is what
//! lets the caller keep CPU/PPU/APU perfectly interleaved.
//!
//! Opcodes with no official 6502 meaning are not emulated: the CPU jams on
//! them, matching the "illegal opcodes trap" behavior this emulator targets.

use crate::addressing::AddressingMode;
use crate::bus::Bus;
use crate::opcodes::{Mnemonic, OPCODE_TABLE};
use crate::status::Status;

/// Cycle-by-cycle execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CpuState {
    #[default]
    FetchOpcode,
    FetchOperandLo,
    FetchOperandHi,
    ResolveAddress,
    ReadData,
    WriteData,
    RmwRead,
    RmwDummyWrite,
    RmwWrite,
    Execute,
    FetchIndirectLo,
    FetchIndirectHi,
    AddIndex,
    PushHi,
    PushLo,
    PushStatus,
    PopLo,
    PopHi,
    PopStatus,
    InternalCycle,
    BranchTaken,
    BranchPageCross,
    InterruptPushPcHi,
    InterruptPushPcLo,
    InterruptPushStatus,
    InterruptFetchVectorLo,
    InterruptFetchVectorHi,
}

/// How an instruction interacts with its operand, derived from its mnemonic
/// and addressing mode at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum InstructionType {
    #[default]
    Implied,
    Accumulator,
    Read,
    Write,
    ReadModifyWrite,
    Push,
    Pull,
    JumpAbsolute,
    JumpSubroutine,
    ReturnSubroutine,
    ReturnInterrupt,
    Break,
    /// Byte decodes to no official instruction; CPU halts.
    Jam,
}

fn instruction_type_for(mnemonic: Mnemonic, mode: AddressingMode) -> InstructionType {
    use Mnemonic::{
        Adc, And, Asl, Bit, Brk, Cmp, Cpx, Cpy, Dec, Eor, Inc, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop,
        Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti, Rts, Sbc, Sta, Stx, Sty, Unofficial,
    };
    match mnemonic {
        Unofficial => InstructionType::Jam,
        Sta | Stx | Sty => InstructionType::Write,
        Asl | Lsr | Rol | Ror if mode == AddressingMode::Accumulator => {
            InstructionType::Accumulator
        }
        Asl | Lsr | Rol | Ror | Inc | Dec => InstructionType::ReadModifyWrite,
        Lda | Ldx | Ldy | Adc | Sbc | And | Ora | Eor | Cmp | Cpx | Cpy | Bit => {
            InstructionType::Read
        }
        Nop if mode != AddressingMode::Implied => InstructionType::Read,
        Jmp if mode == AddressingMode::Absolute => InstructionType::JumpAbsolute,
        Jmp => InstructionType::JumpAbsolute, // Indirect JMP also resolves PC directly.
        Jsr => InstructionType::JumpSubroutine,
        Rts => InstructionType::ReturnSubroutine,
        Rti => InstructionType::ReturnInterrupt,
        Brk => InstructionType::Break,
        Pha | Php => InstructionType::Push,
        Pla | Plp => InstructionType::Pull,
        _ => InstructionType::Implied,
    }
}

/// NES 6502 CPU.
///
/// Cycle-accurate implementation of the MOS 6502 as used in the NES. All
/// timing follows the NESdev Wiki specifications.
#[derive(Debug)]
pub struct Cpu {
    /// Accumulator register.
    pub a: u8,
    /// X index register.
    pub x: u8,
    /// Y index register.
    pub y: u8,
    /// Program counter.
    pub pc: u16,
    /// Stack pointer (points into $0100-$01FF).
    pub sp: u8,
    /// Status flags.
    pub status: Status,
    /// Total cycles executed.
    pub cycles: u64,
    /// Remaining stall cycles (OAM/DMC DMA).
    pub stall: u16,
    nmi_pending: bool,
    irq_pending: bool,
    /// I flag sampled at the start of the previous instruction; IRQ polling
    /// reads this instead of the live flag to model the one-instruction
    /// delay after CLI/SEI/PLP/RTI.
    prev_irq_inhibit: bool,
    /// Suppresses the NMI check for one instruction after BRK completes, so
    /// the first instruction of the handler always runs before a pending
    /// NMI can hijack it again.
    suppress_nmi_next: bool,
    /// Set when an unofficial opcode is fetched; the CPU stops advancing.
    jammed: bool,

    state: CpuState,
    current_opcode: u8,
    instr_type: InstructionType,
    current_mode: AddressingMode,
    operand_lo: u8,
    operand_hi: u8,
    effective_addr: u16,
    base_addr: u16,
    temp_value: u8,
    branch_offset: i8,
    page_crossed: bool,
}

impl Cpu {
    /// Create a new CPU in power-on state.
    ///
    /// A/X/Y start at zero, SP at `$FD`, and P at `$24` (I and U set). `pc`
    /// is left at zero until [`Cpu::reset`] loads the RESET vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0xFD,
            status: Status::new(),
            cycles: 0,
            stall: 0,
            nmi_pending: false,
            irq_pending: false,
            prev_irq_inhibit: true,
            suppress_nmi_next: false,
            jammed: false,
            state: CpuState::FetchOpcode,
            current_opcode: 0,
            instr_type: InstructionType::Implied,
            current_mode: AddressingMode::Implied,
            operand_lo: 0,
            operand_hi: 0,
            effective_addr: 0,
            base_addr: 0,
            temp_value: 0,
            branch_offset: 0,
            page_crossed: false,
        }
    }

    /// Reset the CPU: SP drops by 3 (no writes), I is set, PC loads from
    /// the RESET vector (`$FFFC`-`$FFFD`). Costs 7 cycles.
    pub fn reset(&mut self, bus: &mut impl Bus) {
        self.sp = self.sp.wrapping_sub(3);
        self.status.insert(Status::I);
        self.pc = u16::from(bus.read(0xFFFC)) | (u16::from(bus.read(0xFFFD)) << 8);
        self.cycles += 7;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.prev_irq_inhibit = true;
        self.suppress_nmi_next = false;
        self.jammed = false;
        self.state = CpuState::FetchOpcode;
    }

    /// Advance the CPU by exactly one clock cycle.
    ///
    /// Returns `true` when this cycle completed an instruction (the CPU is
    /// ready to fetch the next opcode).
    pub fn tick(&mut self, bus: &mut impl Bus) -> bool {
        if self.stall > 0 {
            self.stall -= 1;
            self.cycles += 1;
            return false;
        }

        if self.jammed {
            self.cycles += 1;
            return false;
        }

        self.cycles += 1;

        match self.state {
            CpuState::FetchOpcode => self.tick_fetch_opcode(bus),
            CpuState::FetchOperandLo => self.tick_fetch_operand_lo(bus),
            CpuState::FetchOperandHi => self.tick_fetch_operand_hi(bus),
            CpuState::ResolveAddress => self.tick_resolve_address(bus),
            CpuState::ReadData => self.tick_read_data(bus),
            CpuState::WriteData => self.tick_write_data(bus),
            CpuState::RmwRead => self.tick_rmw_read(bus),
            CpuState::RmwDummyWrite => self.tick_rmw_dummy_write(bus),
            CpuState::RmwWrite => self.tick_rmw_write(bus),
            CpuState::Execute => self.tick_execute(bus),
            CpuState::FetchIndirectLo => self.tick_fetch_indirect_lo(bus),
            CpuState::FetchIndirectHi => self.tick_fetch_indirect_hi(bus),
            CpuState::AddIndex => self.tick_add_index(bus),
            CpuState::PushHi => self.tick_push_hi(bus),
            CpuState::PushLo => self.tick_push_lo(bus),
            CpuState::PushStatus => self.tick_push_status(bus),
            CpuState::PopLo => self.tick_pop_lo(bus),
            CpuState::PopHi => self.tick_pop_hi(bus),
            CpuState::PopStatus => self.tick_pop_status(bus),
            CpuState::InternalCycle => self.tick_internal_cycle(bus),
            CpuState::BranchTaken => self.tick_branch_taken(bus),
            CpuState::BranchPageCross => self.tick_branch_page_cross(bus),
            CpuState::InterruptPushPcHi => self.tick_interrupt_push_pc_hi(bus),
            CpuState::InterruptPushPcLo => self.tick_interrupt_push_pc_lo(bus),
            CpuState::InterruptPushStatus => self.tick_interrupt_push_status(bus),
            CpuState::InterruptFetchVectorLo => self.tick_interrupt_fetch_vector_lo(bus),
            CpuState::InterruptFetchVectorHi => self.tick_interrupt_fetch_vector_hi(bus),
        }
    }

    /// Run instructions until one completes, returning the cycles spent.
    /// Convenience wrapper over [`Cpu::tick`] for callers that don't need
    /// cycle-by-cycle bus access (e.g. tests, the nestest tracer).
    pub fn step(&mut self, bus: &mut impl Bus) -> u8 {
        let start = self.cycles;
        loop {
            if self.tick(bus) {
                break;
            }
        }
        (self.cycles - start) as u8
    }

    /// Trigger NMI. Edge-triggered: call once per high-to-low transition.
    pub fn trigger_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Set the IRQ line state. Level-triggered: fires every instruction
    /// while asserted and I=0.
    pub fn set_irq(&mut self, active: bool) {
        self.irq_pending = active;
    }

    /// Whether an IRQ is currently asserted on the line.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    /// Total cycles executed since power-on.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether the CPU has halted on an unofficial opcode.
    #[must_use]
    pub fn is_jammed(&self) -> bool {
        self.jammed
    }

    /// Whether the current cycle is the first of a new instruction (i.e.
    /// the next `tick()` will fetch an opcode). Used by callers that need
    /// to know when it's safe to inspect registers mid-instruction.
    #[must_use]
    pub fn at_instruction_boundary(&self) -> bool {
        self.state == CpuState::FetchOpcode
    }

    /// The accumulator.
    #[must_use]
    pub fn a(&self) -> u8 {
        self.a
    }

    /// The X index register.
    #[must_use]
    pub fn x(&self) -> u8 {
        self.x
    }

    /// The Y index register.
    #[must_use]
    pub fn y(&self) -> u8 {
        self.y
    }

    /// The program counter.
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// The stack pointer.
    #[must_use]
    pub fn sp(&self) -> u8 {
        self.sp
    }

    /// The status register.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    fn tick_fetch_opcode(&mut self, bus: &mut impl Bus) -> bool {
        let current_irq_inhibit = self.status.contains(Status::I);

        if self.nmi_pending && !self.suppress_nmi_next {
            self.nmi_pending = false;
            self.prev_irq_inhibit = current_irq_inhibit;
            let _ = bus.read(self.pc);
            self.state = CpuState::InterruptPushPcHi;
            self.effective_addr = 0xFFFA;
            return false;
        }

        if self.suppress_nmi_next {
            self.suppress_nmi_next = false;
        }

        if self.irq_pending && !self.prev_irq_inhibit {
            self.prev_irq_inhibit = current_irq_inhibit;
            let _ = bus.read(self.pc);
            self.state = CpuState::InterruptPushPcHi;
            self.effective_addr = 0xFFFE;
            return false;
        }

        self.prev_irq_inhibit = current_irq_inhibit;

        self.current_opcode = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        let info = &OPCODE_TABLE[self.current_opcode as usize];
        self.current_mode = info.mode;
        self.instr_type = instruction_type_for(info.mnemonic, info.mode);

        self.operand_lo = 0;
        self.operand_hi = 0;
        self.effective_addr = 0;
        self.base_addr = 0;
        self.temp_value = 0;
        self.branch_offset = 0;
        self.page_crossed = false;

        if self.instr_type == InstructionType::Jam {
            self.jammed = true;
            return true;
        }

        self.state = self.next_state_after_fetch();

        matches!(
            self.instr_type,
            InstructionType::Implied | InstructionType::Accumulator
        ) && self.state == CpuState::Execute
    }

    fn next_state_after_fetch(&self) -> CpuState {
        match self.current_mode {
            AddressingMode::Implied | AddressingMode::Accumulator => CpuState::Execute,
            _ => CpuState::FetchOperandLo,
        }
    }

    fn tick_fetch_operand_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_lo = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        match self.current_mode {
            AddressingMode::Immediate => {
                self.effective_addr = self.pc.wrapping_sub(1);
                self.temp_value = self.operand_lo;
                self.state = self.next_state_for_instruction_type();
            }
            AddressingMode::ZeroPage => {
                self.effective_addr = u16::from(self.operand_lo);
                self.state = self.next_state_for_instruction_type();
            }
            AddressingMode::ZeroPageX | AddressingMode::ZeroPageY => {
                self.base_addr = u16::from(self.operand_lo);
                self.state = CpuState::AddIndex;
            }
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => {
                self.state = CpuState::FetchOperandHi;
            }
            AddressingMode::IndexedIndirectX => {
                self.base_addr = u16::from(self.operand_lo);
                self.state = CpuState::AddIndex;
            }
            AddressingMode::IndirectIndexedY => {
                self.base_addr = u16::from(self.operand_lo);
                self.state = CpuState::FetchIndirectLo;
            }
            AddressingMode::Relative => {
                self.branch_offset = self.operand_lo as i8;
                if self.check_branch_condition() {
                    self.state = CpuState::BranchTaken;
                } else {
                    self.state = CpuState::FetchOpcode;
                    return true;
                }
            }
        }
        false
    }

    fn tick_fetch_operand_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_hi = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        let addr = u16::from_le_bytes([self.operand_lo, self.operand_hi]);

        match self.current_mode {
            AddressingMode::Absolute => {
                self.effective_addr = addr;
                match self.instr_type {
                    InstructionType::JumpAbsolute => {
                        self.pc = self.effective_addr;
                        self.state = CpuState::FetchOpcode;
                        return true;
                    }
                    InstructionType::JumpSubroutine => {
                        self.state = CpuState::InternalCycle;
                    }
                    _ => {
                        self.state = self.next_state_for_instruction_type();
                    }
                }
            }
            AddressingMode::AbsoluteX => self.resolve_indexed(addr, self.x),
            AddressingMode::AbsoluteY => self.resolve_indexed(addr, self.y),
            AddressingMode::Indirect => {
                self.base_addr = addr;
                self.state = CpuState::FetchIndirectLo;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    /// Shared logic for absolute,X and absolute,Y: compute the indexed
    /// address, flag a page crossing, and decide whether a dummy read is
    /// needed before the real access (writes/RMW always take it).
    fn resolve_indexed(&mut self, base: u16, index: u8) {
        self.base_addr = base;
        let indexed = base.wrapping_add(u16::from(index));
        self.effective_addr = indexed;
        self.page_crossed = (base & 0xFF00) != (indexed & 0xFF00);

        match self.instr_type {
            InstructionType::Write | InstructionType::ReadModifyWrite => {
                self.state = CpuState::ResolveAddress;
            }
            _ => {
                if self.page_crossed {
                    self.state = CpuState::ResolveAddress;
                } else {
                    self.state = self.next_state_for_instruction_type();
                }
            }
        }
    }

    fn tick_resolve_address(&mut self, bus: &mut impl Bus) -> bool {
        let incorrect_addr = (self.base_addr & 0xFF00) | (self.effective_addr & 0x00FF);
        let _ = bus.read(incorrect_addr);
        self.state = self.next_state_for_instruction_type();
        false
    }

    fn tick_read_data(&mut self, bus: &mut impl Bus) -> bool {
        self.temp_value = bus.read(self.effective_addr);
        self.state = CpuState::Execute;
        false
    }

    fn tick_write_data(&mut self, bus: &mut impl Bus) -> bool {
        let value = self.execute_write_instruction();
        bus.write(self.effective_addr, value);
        self.state = CpuState::FetchOpcode;
        true
    }

    fn tick_rmw_read(&mut self, bus: &mut impl Bus) -> bool {
        self.temp_value = bus.read(self.effective_addr);
        self.state = CpuState::RmwDummyWrite;
        false
    }

    fn tick_rmw_dummy_write(&mut self, bus: &mut impl Bus) -> bool {
        bus.write(self.effective_addr, self.temp_value);
        self.state = CpuState::RmwWrite;
        false
    }

    fn tick_rmw_write(&mut self, bus: &mut impl Bus) -> bool {
        let result = self.execute_rmw_instruction();
        bus.write(self.effective_addr, result);
        self.state = CpuState::FetchOpcode;
        true
    }

    fn tick_execute(&mut self, bus: &mut impl Bus) -> bool {
        match self.instr_type {
            InstructionType::Implied => {
                let _ = bus.read(self.pc);
                self.execute_implied_instruction();
            }
            InstructionType::Accumulator => {
                let _ = bus.read(self.pc);
                self.execute_accumulator_instruction();
            }
            InstructionType::Read => {
                self.execute_read_instruction();
            }
            _ => {}
        }
        self.state = CpuState::FetchOpcode;
        true
    }

    fn tick_fetch_indirect_lo(&mut self, bus: &mut impl Bus) -> bool {
        match self.current_mode {
            AddressingMode::IndirectIndexedY | AddressingMode::Indirect => {
                self.operand_lo = bus.read(self.base_addr);
                self.state = CpuState::FetchIndirectHi;
            }
            AddressingMode::IndexedIndirectX => {
                let ptr = self.effective_addr as u8;
                self.operand_lo = bus.read(u16::from(ptr));
                self.state = CpuState::FetchIndirectHi;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_fetch_indirect_hi(&mut self, bus: &mut impl Bus) -> bool {
        match self.current_mode {
            AddressingMode::IndirectIndexedY => {
                let ptr_hi = self.base_addr.wrapping_add(1) as u8;
                self.operand_hi = bus.read(u16::from(ptr_hi));

                let ptr_addr = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.resolve_indexed(ptr_addr, self.y);
            }
            AddressingMode::Indirect => {
                // Infamous JMP (indirect) page-wrap bug: the high byte is
                // fetched from the same page as the low byte, never the next.
                let ptr_lo = self.base_addr as u8;
                let ptr_hi_addr = (self.base_addr & 0xFF00) | u16::from(ptr_lo.wrapping_add(1));
                self.operand_hi = bus.read(ptr_hi_addr);

                self.effective_addr = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.pc = self.effective_addr;
                self.state = CpuState::FetchOpcode;
                return true;
            }
            AddressingMode::IndexedIndirectX => {
                let ptr = (self.effective_addr as u8).wrapping_add(1);
                self.operand_hi = bus.read(u16::from(ptr));
                self.effective_addr = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.state = self.next_state_for_instruction_type();
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_add_index(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(self.base_addr);

        match self.current_mode {
            AddressingMode::ZeroPageX => {
                self.effective_addr = u16::from((self.base_addr as u8).wrapping_add(self.x));
                self.state = self.next_state_for_instruction_type();
            }
            AddressingMode::ZeroPageY => {
                self.effective_addr = u16::from((self.base_addr as u8).wrapping_add(self.y));
                self.state = self.next_state_for_instruction_type();
            }
            AddressingMode::IndexedIndirectX => {
                self.effective_addr = u16::from((self.base_addr as u8).wrapping_add(self.x));
                self.state = CpuState::FetchIndirectLo;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_push_hi(&mut self, bus: &mut impl Bus) -> bool {
        let value = (self.pc >> 8) as u8;
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
        self.state = CpuState::PushLo;
        false
    }

    fn tick_push_lo(&mut self, bus: &mut impl Bus) -> bool {
        let value = (self.pc & 0xFF) as u8;
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);

        match self.instr_type {
            InstructionType::JumpSubroutine => {
                self.pc = self.effective_addr;
                self.state = CpuState::FetchOpcode;
                return true;
            }
            InstructionType::Break => {
                self.state = CpuState::PushStatus;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_push_status(&mut self, bus: &mut impl Bus) -> bool {
        match self.instr_type {
            InstructionType::Push => {
                let value = self.status.to_stack_byte(true);
                bus.write(0x0100 | u16::from(self.sp), value);
                self.sp = self.sp.wrapping_sub(1);
                self.state = CpuState::FetchOpcode;
                return true;
            }
            InstructionType::Break => {
                // NMI hijacks a pending BRK: the pushed status still has B=1
                // so software can tell BRK and a hijacking NMI apart.
                let nmi_hijack = self.nmi_pending;
                if nmi_hijack {
                    self.nmi_pending = false;
                }

                let value = self.status.to_stack_byte(true);
                bus.write(0x0100 | u16::from(self.sp), value);
                self.sp = self.sp.wrapping_sub(1);
                self.status.insert(Status::I);

                self.suppress_nmi_next = true;
                self.effective_addr = if nmi_hijack { 0xFFFA } else { 0xFFFE };
                self.state = CpuState::InterruptFetchVectorLo;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_pop_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.sp = self.sp.wrapping_add(1);
        let _ = bus.read(0x0100 | u16::from(self.sp));

        match self.instr_type {
            InstructionType::Pull => {
                self.state = CpuState::Execute;
            }
            InstructionType::ReturnSubroutine => {
                self.operand_lo = bus.read(0x0100 | u16::from(self.sp));
                self.state = CpuState::PopHi;
            }
            InstructionType::ReturnInterrupt => {
                self.state = CpuState::PopStatus;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_pop_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.sp = self.sp.wrapping_add(1);
        self.operand_hi = bus.read(0x0100 | u16::from(self.sp));

        match self.instr_type {
            InstructionType::ReturnSubroutine => {
                self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.state = CpuState::InternalCycle;
            }
            InstructionType::ReturnInterrupt => {
                self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
                self.state = CpuState::FetchOpcode;
                return true;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_pop_status(&mut self, bus: &mut impl Bus) -> bool {
        let value = bus.read(0x0100 | u16::from(self.sp));
        self.status = Status::from_stack_byte(value);

        if self.status.contains(Status::I) {
            self.prev_irq_inhibit = true;
        }

        self.sp = self.sp.wrapping_add(1);
        self.operand_lo = bus.read(0x0100 | u16::from(self.sp));
        self.state = CpuState::PopHi;
        false
    }

    fn tick_internal_cycle(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(0x0100 | u16::from(self.sp));

        match self.instr_type {
            InstructionType::JumpSubroutine => {
                self.state = CpuState::PushHi;
            }
            InstructionType::ReturnSubroutine => {
                self.pc = self.pc.wrapping_add(1);
                self.state = CpuState::FetchOpcode;
                return true;
            }
            InstructionType::Push => {
                if self.current_opcode == 0x48 {
                    // PHA
                    bus.write(0x0100 | u16::from(self.sp), self.a);
                    self.sp = self.sp.wrapping_sub(1);
                } else {
                    // PHP
                    self.state = CpuState::PushStatus;
                    return false;
                }
                self.state = CpuState::FetchOpcode;
                return true;
            }
            InstructionType::Pull => {
                self.sp = self.sp.wrapping_add(1);
                self.temp_value = bus.read(0x0100 | u16::from(self.sp));
                if self.current_opcode == 0x68 {
                    // PLA
                    self.a = self.temp_value;
                    self.set_zn(self.a);
                } else {
                    // PLP
                    self.status = Status::from_stack_byte(self.temp_value);
                }
                self.state = CpuState::FetchOpcode;
                return true;
            }
            _ => {
                self.state = CpuState::FetchOpcode;
            }
        }
        false
    }

    fn tick_branch_taken(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(self.pc);

        let old_pc = self.pc;
        self.pc = self.pc.wrapping_add(self.branch_offset as u16);

        if (old_pc & 0xFF00) == (self.pc & 0xFF00) {
            self.state = CpuState::FetchOpcode;
            true
        } else {
            self.state = CpuState::BranchPageCross;
            false
        }
    }

    fn tick_branch_page_cross(&mut self, bus: &mut impl Bus) -> bool {
        let _ = bus.read(
            (self.pc & 0x00FF) | (self.pc.wrapping_sub(self.branch_offset as u16) & 0xFF00),
        );
        self.state = CpuState::FetchOpcode;
        true
    }

    fn tick_interrupt_push_pc_hi(&mut self, bus: &mut impl Bus) -> bool {
        let value = (self.pc >> 8) as u8;
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
        self.state = CpuState::InterruptPushPcLo;
        false
    }

    fn tick_interrupt_push_pc_lo(&mut self, bus: &mut impl Bus) -> bool {
        let value = (self.pc & 0xFF) as u8;
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
        self.state = CpuState::InterruptPushStatus;
        false
    }

    fn tick_interrupt_push_status(&mut self, bus: &mut impl Bus) -> bool {
        let value = self.status.to_stack_byte(false);
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
        self.status.insert(Status::I);
        self.state = CpuState::InterruptFetchVectorLo;
        false
    }

    fn tick_interrupt_fetch_vector_lo(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_lo = bus.read(self.effective_addr);
        self.state = CpuState::InterruptFetchVectorHi;
        false
    }

    fn tick_interrupt_fetch_vector_hi(&mut self, bus: &mut impl Bus) -> bool {
        self.operand_hi = bus.read(self.effective_addr.wrapping_add(1));
        self.pc = u16::from_le_bytes([self.operand_lo, self.operand_hi]);
        self.state = CpuState::FetchOpcode;
        true
    }

    fn next_state_for_instruction_type(&self) -> CpuState {
        match self.instr_type {
            InstructionType::Read => CpuState::ReadData,
            InstructionType::Write => CpuState::WriteData,
            InstructionType::ReadModifyWrite => CpuState::RmwRead,
            InstructionType::Implied | InstructionType::Accumulator => CpuState::Execute,
            InstructionType::Push | InstructionType::Pull => CpuState::InternalCycle,
            _ => CpuState::Execute,
        }
    }

    fn check_branch_condition(&self) -> bool {
        match self.current_opcode {
            0x10 => !self.status.contains(Status::N), // BPL
            0x30 => self.status.contains(Status::N),  // BMI
            0x50 => !self.status.contains(Status::V),  // BVC
            0x70 => self.status.contains(Status::V),   // BVS
            0x90 => !self.status.contains(Status::C),  // BCC
            0xB0 => self.status.contains(Status::C),   // BCS
            0xD0 => !self.status.contains(Status::Z),  // BNE
            0xF0 => self.status.contains(Status::Z),   // BEQ
            _ => false,
        }
    }

    fn execute_implied_instruction(&mut self) {
        match self.current_opcode {
            0xAA => {
                self.x = self.a;
                self.set_zn(self.x);
            } // TAX
            0xA8 => {
                self.y = self.a;
                self.set_zn(self.y);
            } // TAY
            0x8A => {
                self.a = self.x;
                self.set_zn(self.a);
            } // TXA
            0x98 => {
                self.a = self.y;
                self.set_zn(self.a);
            } // TYA
            0xBA => {
                self.x = self.sp;
                self.set_zn(self.x);
            } // TSX
            0x9A => {
                self.sp = self.x;
            } // TXS
            0xE8 => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
            } // INX
            0xC8 => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
            } // INY
            0xCA => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
            } // DEX
            0x88 => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
            } // DEY
            0x18 => {
                self.status.remove(Status::C);
            } // CLC
            0x38 => {
                self.status.insert(Status::C);
            } // SEC
            0x58 => {
                self.status.remove(Status::I);
            } // CLI
            0x78 => {
                self.status.insert(Status::I);
            } // SEI
            0xB8 => {
                self.status.remove(Status::V);
            } // CLV
            0xD8 => {
                self.status.remove(Status::D);
            } // CLD
            0xF8 => {
                self.status.insert(Status::D);
            } // SED
            0xEA => {} // NOP
            _ => {}
        }
    }

    fn execute_accumulator_instruction(&mut self) {
        match self.current_opcode {
            0x0A => {
                // ASL A
                let carry = (self.a & 0x80) != 0;
                self.a <<= 1;
                self.status.set(Status::C, carry);
                self.set_zn(self.a);
            }
            0x4A => {
                // LSR A
                let carry = (self.a & 0x01) != 0;
                self.a >>= 1;
                self.status.set(Status::C, carry);
                self.set_zn(self.a);
            }
            0x2A => {
                // ROL A
                let old_carry = self.status.contains(Status::C);
                let new_carry = (self.a & 0x80) != 0;
                self.a = (self.a << 1) | u8::from(old_carry);
                self.status.set(Status::C, new_carry);
                self.set_zn(self.a);
            }
            0x6A => {
                // ROR A
                let old_carry = self.status.contains(Status::C);
                let new_carry = (self.a & 0x01) != 0;
                self.a = (self.a >> 1) | (u8::from(old_carry) << 7);
                self.status.set(Status::C, new_carry);
                self.set_zn(self.a);
            }
            _ => {}
        }
    }

    fn execute_read_instruction(&mut self) {
        let value = self.temp_value;
        match self.current_opcode {
            // LDA
            0xA9 | 0xA5 | 0xB5 | 0xAD | 0xBD | 0xB9 | 0xA1 | 0xB1 => {
                self.a = value;
                self.set_zn(self.a);
            }
            // LDX
            0xA2 | 0xA6 | 0xB6 | 0xAE | 0xBE => {
                self.x = value;
                self.set_zn(self.x);
            }
            // LDY
            0xA0 | 0xA4 | 0xB4 | 0xAC | 0xBC => {
                self.y = value;
                self.set_zn(self.y);
            }
            // ADC
            0x69 | 0x65 | 0x75 | 0x6D | 0x7D | 0x79 | 0x61 | 0x71 => {
                self.do_adc(value);
            }
            // SBC
            0xE9 | 0xE5 | 0xF5 | 0xED | 0xFD | 0xF9 | 0xE1 | 0xF1 => {
                self.do_sbc(value);
            }
            // AND
            0x29 | 0x25 | 0x35 | 0x2D | 0x3D | 0x39 | 0x21 | 0x31 => {
                self.a &= value;
                self.set_zn(self.a);
            }
            // ORA
            0x09 | 0x05 | 0x15 | 0x0D | 0x1D | 0x19 | 0x01 | 0x11 => {
                self.a |= value;
                self.set_zn(self.a);
            }
            // EOR
            0x49 | 0x45 | 0x55 | 0x4D | 0x5D | 0x59 | 0x41 | 0x51 => {
                self.a ^= value;
                self.set_zn(self.a);
            }
            // CMP
            0xC9 | 0xC5 | 0xD5 | 0xCD | 0xDD | 0xD9 | 0xC1 | 0xD1 => {
                self.do_compare(self.a, value);
            }
            // CPX
            0xE0 | 0xE4 | 0xEC => {
                self.do_compare(self.x, value);
            }
            // CPY
            0xC0 | 0xC4 | 0xCC => {
                self.do_compare(self.y, value);
            }
            // BIT
            0x24 | 0x2C => {
                self.status.set(Status::Z, (self.a & value) == 0);
                self.status.set(Status::V, (value & 0x40) != 0);
                self.status.set(Status::N, (value & 0x80) != 0);
            }
            // NOP with an operand read: discard the value
            _ => {}
        }
    }

    fn execute_write_instruction(&self) -> u8 {
        match self.current_opcode {
            0x85 | 0x95 | 0x8D | 0x9D | 0x99 | 0x81 | 0x91 => self.a, // STA
            0x86 | 0x96 | 0x8E => self.x,                            // STX
            0x84 | 0x94 | 0x8C => self.y,                            // STY
            _ => 0,
        }
    }

    fn execute_rmw_instruction(&mut self) -> u8 {
        let value = self.temp_value;
        match self.current_opcode {
            // ASL
            0x06 | 0x16 | 0x0E | 0x1E => {
                let carry = (value & 0x80) != 0;
                let result = value << 1;
                self.status.set(Status::C, carry);
                self.set_zn(result);
                result
            }
            // LSR
            0x46 | 0x56 | 0x4E | 0x5E => {
                let carry = (value & 0x01) != 0;
                let result = value >> 1;
                self.status.set(Status::C, carry);
                self.set_zn(result);
                result
            }
            // ROL
            0x26 | 0x36 | 0x2E | 0x3E => {
                let old_carry = self.status.contains(Status::C);
                let new_carry = (value & 0x80) != 0;
                let result = (value << 1) | u8::from(old_carry);
                self.status.set(Status::C, new_carry);
                self.set_zn(result);
                result
            }
            // ROR
            0x66 | 0x76 | 0x6E | 0x7E => {
                let old_carry = self.status.contains(Status::C);
                let new_carry = (value & 0x01) != 0;
                let result = (value >> 1) | (u8::from(old_carry) << 7);
                self.status.set(Status::C, new_carry);
                self.set_zn(result);
                result
            }
            // INC
            0xE6 | 0xF6 | 0xEE | 0xFE => {
                let result = value.wrapping_add(1);
                self.set_zn(result);
                result
            }
            // DEC
            0xC6 | 0xD6 | 0xCE | 0xDE => {
                let result = value.wrapping_sub(1);
                self.set_zn(result);
                result
            }
            _ => value,
        }
    }

    fn do_adc(&mut self, value: u8) {
        let carry = u16::from(self.status.contains(Status::C));
        let sum = u16::from(self.a) + u16::from(value) + carry;
        let result = sum as u8;

        self.status.set(Status::C, sum > 0xFF);
        self.status.set(
            Status::V,
            (!(self.a ^ value) & (self.a ^ result) & 0x80) != 0,
        );
        self.a = result;
        self.set_zn(self.a);
    }

    fn do_sbc(&mut self, value: u8) {
        self.do_adc(!value);
    }

    fn do_compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.status.set(Status::C, register >= value);
        self.set_zn(result);
    }

    /// Push a byte onto the stack.
    pub(crate) fn push(&mut self, bus: &mut impl Bus, value: u8) {
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
    }

    /// Pop a byte from the stack.
    pub(crate) fn pop(&mut self, bus: &mut impl Bus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | u16::from(self.sp))
    }

    /// Push a 16-bit value onto the stack, high byte first.
    pub(crate) fn push_u16(&mut self, bus: &mut impl Bus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, (value & 0xFF) as u8);
    }

    /// Pop a 16-bit value from the stack, low byte first.
    pub(crate) fn pop_u16(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.pop(bus);
        let hi = self.pop(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn set_zn(&mut self, value: u8) {
        self.status.set_zn(value);
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestBus {
        memory: [u8; 0x10000],
    }

    impl TestBus {
        fn new() -> Self {
            Self { memory: [0; 0x10000] }
        }
    }

    impl Bus for TestBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.memory[addr as usize]
        }

        fn write(&mut self, addr: u16, value: u8) {
            self.memory[addr as usize] = value;
        }
    }

    #[test]
    fn new_cpu_has_power_on_state() {
        let cpu = Cpu::new();
        assert_eq!(cpu.a, 0);
        assert_eq!(cpu.x, 0);
        assert_eq!(cpu.y, 0);
        assert_eq!(cpu.sp, 0xFD);
        assert!(cpu.status.contains(Status::I));
    }

    #[test]
    fn reset_loads_vector_and_costs_seven_cycles() {
        let mut cpu = Cpu::new();
        let mut bus = TestBus::new();
        bus.write(0xFFFC, 0x00);
        bus.write(0xFFFD, 0x80);

        cpu.reset(&mut bus);

        assert_eq!(cpu.pc, 0x8000);
        assert!(cpu.status.contains(Status::I));
        assert_eq!(cpu.cycles, 7);
    }

    #[test]
    fn stack_push_pop_roundtrip() {
        let mut cpu = Cpu::new();
        let mut bus = TestBus::new();
        cpu.sp = 0xFF;

        cpu.push(&mut bus, 0x42);
        assert_eq!(cpu.sp, 0xFE);
        assert_eq!(bus.read(0x01FF), 0x42);

        let value = cpu.pop(&mut bus);
        assert_eq!(value, 0x42);
        assert_eq!(cpu.sp, 0xFF);

        cpu.push_u16(&mut bus, 0x1234);
        let value = cpu.pop_u16(&mut bus);
        assert_eq!(value, 0x1234);
        assert_eq!(cpu.sp, 0xFF);
    }

    #[test]
    fn lda_immediate_sets_accumulator_and_flags() {
        let mut cpu = Cpu::new();
        let mut bus = TestBus::new();
        bus.write(0xFFFC, 0x00);
        bus.write(0xFFFD, 0x80);
        cpu.reset(&mut bus);

        bus.write(0x8000, 0xA9); // LDA #$00
        bus.write(0x8001, 0x00);
        cpu.step(&mut bus);

        assert_eq!(cpu.a, 0x00);
        assert!(cpu.status.contains(Status::Z));
        assert!(!cpu.status.contains(Status::N));
    }

    #[test]
    fn jam_on_unofficial_opcode_halts_cpu() {
        let mut cpu = Cpu::new();
        let mut bus = TestBus::new();
        bus.write(0xFFFC, 0x00);
        bus.write(0xFFFD, 0x80);
        cpu.reset(&mut bus);

        bus.write(0x8000, 0x02); // JAM
        cpu.step(&mut bus);

        assert!(cpu.is_jammed());
        let cycles_before = cpu.cycles;
        cpu.step(&mut bus);
        assert_eq!(cpu.cycles, cycles_before + 1);
    }

    #[test]
    fn branch_not_taken_advances_past_offset_byte() {
        let mut cpu = Cpu::new();
        let mut bus = TestBus::new();
        bus.write(0xFFFC, 0x00);
        bus.write(0xFFFD, 0x80);
        cpu.reset(&mut bus);

        bus.write(0x8000, 0xF0); // BEQ +5 (Z is clear after reset, so not taken)
        bus.write(0x8001, 0x05);
        cpu.step(&mut bus);

        assert_eq!(cpu.pc, 0x8002);
    }

    #[test]
    fn nmi_vectors_through_fffa() {
        let mut cpu = Cpu::new();
        let mut bus = TestBus::new();
        bus.write(0xFFFC, 0x00);
        bus.write(0xFFFD, 0x80);
        bus.write(0xFFFA, 0x00);
        bus.write(0xFFFB, 0x90);
        cpu.reset(&mut bus);
        bus.write(0x8000, 0xEA); // NOP

        cpu.trigger_nmi();
        cpu.step(&mut bus);

        assert_eq!(cpu.pc, 0x9000);
    }
}
