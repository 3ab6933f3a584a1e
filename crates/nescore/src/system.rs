//! Host-facing system scheduler.
//!
//! This module is the single entry point a host embeds: it owns a
//! [`Console`] (once a ROM is loaded), advances it in host-millisecond
//! budgets, and routes audio/controller I/O through host-supplied
//! callbacks. The core itself never touches a clock, a file, or a thread;
//! every external effect flows through [`System::sys_run`]'s callbacks or
//! the controller-poll hook registered with [`System::set_controller_poll`].

use crate::console::{Console, timing};
use nescore_cart::{Rom, RomError, create_mapper};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// NES hardware region. Determines the CPU/APU clock rate and the number
/// of PPU scanlines per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    /// NTSC (60 Hz, 262 scanlines/frame).
    #[default]
    Ntsc,
    /// PAL (50 Hz, 312 scanlines/frame).
    Pal,
    /// Dendy clone: PAL-clocked but keeps NTSC VBlank-scanline arithmetic
    /// everywhere the region tag isn't consulted directly.
    Dendy,
}

impl Region {
    /// CPU/APU clock rate in Hz for this region.
    #[must_use]
    pub fn cpu_clock_hz(self) -> u32 {
        match self {
            Self::Ntsc => timing::CPU_CLOCK_NTSC,
            Self::Pal | Self::Dendy => timing::CPU_CLOCK_PAL,
        }
    }

    /// PPU scanlines per frame for this region.
    #[must_use]
    pub fn scanlines_per_frame(self) -> u16 {
        match self {
            Self::Ntsc => 262,
            Self::Pal | Self::Dendy => 312,
        }
    }
}

/// Per-system configuration, immutable for the system's lifetime.
///
/// Generalizes the reference crate's free `timing` constants into a struct
/// so region is a per-instance attribute rather than a compile-time choice.
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    /// Hardware region (determines clock rate and scanline count).
    pub region: Region,
    /// Host audio sample rate in Hz.
    pub sample_rate: u32,
    /// Audio ring-buffer capacity, in samples.
    pub audio_buffer_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let sample_rate = 44_100;
        Self {
            region: Region::Ntsc,
            sample_rate,
            // One frame's worth of samples at 60 Hz.
            audio_buffer_capacity: (sample_rate / 60) as usize,
        }
    }
}

/// Outcome of loading a ROM via [`System::sys_rom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomStatus {
    /// ROM parsed and a mapper was created; the system is ready to run.
    Ok,
    /// No ROM bytes were supplied.
    Missing,
    /// The ROM bytes failed to parse (bad magic, truncated PRG/CHR, ...).
    Damaged,
    /// The ROM parsed but named a mapper this crate doesn't implement.
    UnknownMapper(u16),
}

/// System-level failures that aren't represented by [`RomStatus`] itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// `sys_rom` encountered a mapper number with no implementation.
    #[error("unsupported mapper {0}")]
    UnsupportedMapper(u16),
    /// An entry point that requires a loaded ROM was called before
    /// `sys_rom` succeeded.
    #[error("no ROM loaded")]
    NoRomLoaded,
}

/// Owns the emulated console and drives it in host-millisecond budgets.
///
/// Single-threaded and cooperatively stepped: there is no internal
/// suspension, no background thread, and no I/O performed by the core
/// itself. All external effects flow through the callbacks passed to
/// [`System::sys_run`] and the hook registered with
/// [`System::set_controller_poll`].
pub struct System {
    config: SystemConfig,
    console: Option<Console>,
    running: bool,
    /// Host-millisecond time budget accumulated but not yet consumed.
    clock_ms: f64,
    controller_poll: Option<Box<dyn FnMut(&mut u8)>>,
}

impl System {
    /// Create a new system with the given configuration. No ROM is loaded
    /// yet; call [`System::sys_rom`] before [`System::sys_start`].
    #[must_use]
    pub fn sys_init(config: SystemConfig) -> Self {
        Self {
            config,
            console: None,
            running: false,
            clock_ms: 0.0,
            controller_poll: None,
        }
    }

    /// Register (or replace) the controller-poll hook, invoked once per
    /// produced video frame. The callback ORs pressed-button bits into the
    /// bitmap it's given; multiple input sources compose by chaining
    /// callbacks on the host side before installing one here.
    pub fn set_controller_poll(&mut self, poll: impl FnMut(&mut u8) + 'static) {
        self.controller_poll = Some(Box::new(poll));
    }

    /// Parse and load a ROM, replacing any previously loaded one. The
    /// system is left paused (not running) after a successful load.
    pub fn sys_rom(&mut self, rom_bytes: &[u8]) -> RomStatus {
        if rom_bytes.is_empty() {
            return RomStatus::Missing;
        }

        let rom = match Rom::load(rom_bytes) {
            Ok(rom) => rom,
            Err(err) => {
                log::error!("sys_rom: {err}");
                return RomStatus::Damaged;
            }
        };

        let mapper = match create_mapper(&rom) {
            Ok(mapper) => mapper,
            Err(RomError::UnsupportedFormat(_)) => {
                let mapper_number = rom.header.mapper_number;
                log::error!("sys_rom: {}", CoreError::UnsupportedMapper(mapper_number));
                return RomStatus::UnknownMapper(mapper_number);
            }
            Err(err) => {
                log::error!("sys_rom: {err}");
                return RomStatus::Damaged;
            }
        };

        self.console = Console::with_mapper_full(
            mapper,
            self.config.sample_rate,
            self.config.audio_buffer_capacity,
        )
        .ok();
        self.running = false;
        self.clock_ms = 0.0;
        RomStatus::Ok
    }

    /// Start (or resume) emulation.
    pub fn sys_start(&mut self) {
        self.running = true;
        if let Some(console) = &mut self.console {
            console.resume();
        }
    }

    /// Pause emulation without resetting state.
    pub fn sys_pause(&mut self) {
        self.running = false;
        if let Some(console) = &mut self.console {
            console.pause();
        }
    }

    /// Stop emulation: clears the running flag and resets the console
    /// (CPU + bus), issuing an internal RESET interrupt. There are no
    /// in-flight operations to cancel.
    pub fn sys_stop(&mut self) {
        self.running = false;
        self.clock_ms = 0.0;
        if let Some(console) = &mut self.console {
            console.reset();
            console.pause();
        }
    }

    /// Execute a single CPU instruction (plus its PPU/APU companion
    /// steps). Returns the number of CPU cycles consumed, or 0 if the
    /// system isn't running or has no ROM loaded.
    pub fn sys_step(&mut self) -> u8 {
        if !self.running {
            return 0;
        }
        let Some(console) = &mut self.console else {
            log::error!("sys_step: {}", CoreError::NoRomLoaded);
            return 0;
        };

        let frame_before = console.frame_count();
        let cycles = console.step();
        if console.cpu().is_jammed() {
            self.running = false;
        }
        if console.frame_count() != frame_before {
            Self::poll_frame_edge(&mut self.controller_poll, console);
        }
        cycles
    }

    /// Run emulation for `ms` milliseconds of host time (or until the CPU
    /// traps on an unmapped opcode). Draining of the audio buffer happens
    /// after every CPU step via `enqueue_audio`; `get_queue_size` is an
    /// optional throttling hook the core itself never consults.
    ///
    /// Returns `true` iff the run stopped early because of a CPU trap.
    pub fn sys_run<Ctx>(
        &mut self,
        ms: f64,
        ctx: &mut Ctx,
        mut enqueue_audio: impl FnMut(&mut Ctx, &[f32]),
        mut get_queue_size: impl FnMut(&mut Ctx) -> usize,
    ) -> bool {
        if !self.running {
            return false;
        }
        let Some(console) = &mut self.console else {
            log::error!("sys_run: {}", CoreError::NoRomLoaded);
            return false;
        };

        let cycles_per_ms = f64::from(self.config.region.cpu_clock_hz()) / 1000.0;
        self.clock_ms += ms;
        let mut trapped = false;

        while self.clock_ms > 0.0 {
            if console.cpu().is_jammed() {
                trapped = true;
                self.running = false;
                break;
            }

            let _ = get_queue_size(ctx);

            let frame_before = console.frame_count();
            let cycles = console.step();
            self.clock_ms -= f64::from(cycles) / cycles_per_ms;

            if console.frame_count() != frame_before {
                Self::poll_frame_edge(&mut self.controller_poll, console);
            }

            let audio = console.take_audio();
            if !audio.is_empty() {
                enqueue_audio(ctx, &audio);
            }
        }

        trapped
    }

    /// Tear down the system. Present for host-API symmetry with
    /// `sys_init`; a no-op beyond `Drop`.
    pub fn sys_deinit(self) {}

    /// Read access to the loaded console, if any (for framebuffer access,
    /// debugging, or save-state support).
    #[must_use]
    pub fn console(&self) -> Option<&Console> {
        self.console.as_ref()
    }

    /// Whether the system is currently running (started and not paused or
    /// trapped).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The system's configuration.
    #[must_use]
    pub fn config(&self) -> SystemConfig {
        self.config
    }

    /// Poll the controller-poll hook for one frame-flip edge, clearing and
    /// refilling controller 1's pressed-button bitmap, then soft-resetting
    /// if every bit came back set.
    fn poll_frame_edge(poll: &mut Option<Box<dyn FnMut(&mut u8)>>, console: &mut Console) {
        let Some(poll) = poll else { return };
        let mut bits = 0u8;
        poll(&mut bits);
        console.set_controller_1(bits);
        if bits == 0xFF {
            console.reset();
        }
    }
}
