// DMC (Delta Modulation Channel) register and length-counter model.
//
// Per this project's documented scope, the DMC's sample-playback/DMA-fetch
// path is not implemented: registers are fully decoded and the channel's
// enable/length semantics feed the $4015 status bit correctly, but the
// channel always contributes 0 to the mixer and never asserts its IRQ line.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// DMC channel register/length-counter model.
///
/// Sample playback (DMA fetch, output shifter, IRQ-on-completion) is a
/// deliberate non-goal; see the crate's top-level documentation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[allow(dead_code)] // register fields kept for completeness; playback path is a non-goal
pub struct Dmc {
    irq_enabled: bool,
    loop_enabled: bool,
    rate_index: u8,
    sample_address: u8,
    sample_length: u8,
    bytes_remaining: u16,
    enabled: bool,
}

impl Dmc {
    /// Create a new DMC channel model.
    #[must_use]
    pub fn new() -> Self {
        Self {
            irq_enabled: false,
            loop_enabled: false,
            rate_index: 0,
            sample_address: 0,
            sample_length: 0,
            bytes_remaining: 0,
            enabled: false,
        }
    }

    /// $4010: IL-- RRRR (IRQ enable, loop, rate index). Stored but otherwise inert.
    pub fn write_ctrl(&mut self, value: u8) {
        self.irq_enabled = (value & 0x80) != 0;
        self.loop_enabled = (value & 0x40) != 0;
        self.rate_index = value & 0x0F;
    }

    /// $4011: direct load. Stored but never fed to the mixer.
    pub fn write_direct_load(&mut self, _value: u8) {}

    /// $4012: sample address ($C000 + A*$40). Stored but unused (no DMA fetch).
    pub fn write_sample_address(&mut self, value: u8) {
        self.sample_address = value;
    }

    /// $4013: sample length (L*$10 + 1 bytes). Stored but unused (no DMA fetch).
    pub fn write_sample_length(&mut self, value: u8) {
        self.sample_length = value;
    }

    /// Set channel enable state (from $4015). Honors length-counter semantics
    /// for the status register without performing any sample playback.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            if self.bytes_remaining == 0 {
                self.bytes_remaining = (u16::from(self.sample_length) << 4) | 1;
            }
        } else {
            self.bytes_remaining = 0;
        }
    }

    /// No-op: sample playback is not implemented.
    pub fn clock_timer(&mut self) {}

    /// Always 0: the DMC never contributes to the mixer.
    #[must_use]
    pub fn output(&self) -> u8 {
        0
    }

    /// Never pending: the DMC IRQ line is never asserted.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        false
    }

    /// No-op: the DMC IRQ line is never asserted, so there is nothing to clear.
    pub fn clear_irq(&mut self) {}

    /// `$4015` status bit: true while the length counter has bytes remaining.
    #[must_use]
    pub fn active(&self) -> bool {
        self.bytes_remaining > 0
    }

    /// Always false: no sample data is ever fetched.
    #[must_use]
    pub fn needs_sample(&self) -> bool {
        false
    }

    /// Address the channel would fetch from, were sample playback implemented.
    #[must_use]
    pub fn sample_addr(&self) -> u16 {
        0xC000 | (u16::from(self.sample_address) << 6)
    }

    /// No-op: no sample buffer exists to fill.
    pub fn fill_sample_buffer(&mut self, _sample: u8) {}

    /// Bytes remaining in the (unfetched) sample.
    #[must_use]
    pub fn bytes_remaining(&self) -> u16 {
        self.bytes_remaining
    }
}

impl Default for Dmc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmc_new() {
        let dmc = Dmc::new();
        assert!(!dmc.enabled);
        assert_eq!(dmc.bytes_remaining, 0);
        assert!(!dmc.active());
    }

    #[test]
    fn test_ctrl_register_stored() {
        let mut dmc = Dmc::new();
        dmc.write_ctrl(0xCF); // IRQ + loop + rate 15
        assert!(dmc.irq_enabled);
        assert!(dmc.loop_enabled);
        assert_eq!(dmc.rate_index, 0x0F);
    }

    #[test]
    fn test_enable_sets_length_from_register() {
        let mut dmc = Dmc::new();
        dmc.write_sample_length(0x01); // 17 bytes
        dmc.set_enabled(true);
        assert_eq!(dmc.bytes_remaining, 17);
        assert!(dmc.active());
    }

    #[test]
    fn test_disable_clears_length() {
        let mut dmc = Dmc::new();
        dmc.write_sample_length(0x01);
        dmc.set_enabled(true);
        dmc.set_enabled(false);
        assert_eq!(dmc.bytes_remaining, 0);
        assert!(!dmc.active());
    }

    #[test]
    fn test_output_always_zero() {
        let mut dmc = Dmc::new();
        dmc.write_direct_load(0x7F);
        dmc.set_enabled(true);
        assert_eq!(dmc.output(), 0);
    }

    #[test]
    fn test_irq_never_asserted() {
        let mut dmc = Dmc::new();
        dmc.write_ctrl(0x80); // IRQ enable
        dmc.write_sample_length(0x00);
        dmc.set_enabled(true);
        dmc.clock_timer();
        assert!(!dmc.irq_pending());
    }

    #[test]
    fn test_sample_addr_calculation() {
        let mut dmc = Dmc::new();
        dmc.write_sample_address(0x01);
        assert_eq!(dmc.sample_addr(), 0xC040);
    }

    #[test]
    fn test_needs_sample_always_false() {
        let mut dmc = Dmc::new();
        dmc.write_sample_length(0xFF);
        dmc.set_enabled(true);
        assert!(!dmc.needs_sample());
    }
}
