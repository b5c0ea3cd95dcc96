//! PIO-backed implementation of the core `FaultEngine` trait.
//!
//! State machine allocation:
//! - glitch block (PIO0): SM0 pulse generator, SM1 trigger (edge or UART
//!   matcher, loaded per arming), SM2 fire strobe / FireSignal parking.
//! - clock block (PIO1): SM0 clock generator with boost.
//!
//! The trigger program slot is the only dynamically managed instruction
//! memory: it is acquired during arm and released during disarm, so the
//! block can never accumulate stale programs.

#![cfg(target_os = "none")]

pub mod pads;
pub mod programs;

use crowbar_core::clock::{BoostWords, ClockTimings};
use crowbar_core::engine::{FaultEngine, GlitchError};
use crowbar_core::params::{Edge, PulseWords, TriggerSource};
use crowbar_core::pins::PIN_ASSIGNMENTS;
use crowbar_core::target::TARGET_UART_BAUD;
use crowbar_core::timing::uart_trigger_divider_bits;

use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::gpio::{Level, Output, Pull};
use embassy_rp::pac;
use embassy_rp::peripherals::{PIO0, PIO1};
use embassy_rp::pio::program::{
    Instruction, InstructionOperands, JmpCondition, MovDestination, MovOperation, MovSource,
    SideSet,
};
use embassy_rp::pio::{
    Common, Config, Direction, IrqFlags, LoadedProgram, Pin, Pio, ShiftConfig, ShiftDirection,
    StateMachine,
};
use embassy_rp::Peri;
use embassy_time::{block_for, Duration};
use fixed::types::extra::U8;
use fixed::FixedU32;

use programs::{DONE_IRQ, FIRE_IRQ};

/// Pins the glitch engine owns on the glitch PIO block.
pub struct EnginePins {
    pub glitch_out: Peri<'static, embassy_rp::peripherals::PIN_2>,
    pub glitch_out_inv: Peri<'static, embassy_rp::peripherals::PIN_11>,
    pub trigger_in: Peri<'static, embassy_rp::peripherals::PIN_3>,
    pub fire: Peri<'static, embassy_rp::peripherals::PIN_12>,
    pub armed: Peri<'static, embassy_rp::peripherals::PIN_9>,
    pub clock_out: Peri<'static, embassy_rp::peripherals::PIN_6>,
}

/// Encodes a bare instruction for `exec_instr` (no delay, no side-set).
fn plain(operands: InstructionOperands) -> u16 {
    Instruction {
        operands,
        delay: 0,
        side_set: None,
    }
    .encode(SideSet::new(false, 0, false))
}

fn jmp_to(address: u8) -> InstructionOperands {
    InstructionOperands::JMP {
        condition: JmpCondition::Always,
        address,
    }
}

/// The `FaultEngine` realisation on the two PIO blocks.
pub struct PioFaultEngine {
    common: Common<'static, PIO0>,
    irq_flags: IrqFlags<'static, PIO0>,
    sm_pulse: StateMachine<'static, PIO0, 0>,
    sm_trigger: StateMachine<'static, PIO0, 1>,
    sm_strobe: StateMachine<'static, PIO0, 2>,
    pulse_program: LoadedProgram<'static, PIO0>,
    strobe_program: LoadedProgram<'static, PIO0>,
    trigger_slot: Option<LoadedProgram<'static, PIO0>>,
    out_pin: Pin<'static, PIO0>,
    inv_pin: Pin<'static, PIO0>,
    fire_pin: Pin<'static, PIO0>,
    trigger_pin: Pin<'static, PIO0>,
    armed_pin: Output<'static>,
    clock: ClockGenerator,
}

impl PioFaultEngine {
    pub fn new(glitch_pio: Pio<'static, PIO0>, clock_pio: Pio<'static, PIO1>, pins: EnginePins) -> Self {
        let Pio {
            mut common,
            irq_flags,
            mut sm0,
            mut sm1,
            mut sm2,
            ..
        } = glitch_pio;

        let out_pin = common.make_pio_pin(pins.glitch_out);
        let inv_pin = common.make_pio_pin(pins.glitch_out_inv);
        let fire_pin = common.make_pio_pin(pins.fire);
        let mut trigger_pin = common.make_pio_pin(pins.trigger_in);
        trigger_pin.set_pull(Pull::Up);

        // The mirrored output inverts at the pad, not in the program.
        pads::invert_output(PIN_ASSIGNMENTS.glitch_out_inv);

        let pulse_program = common.load_program(&programs::pulse_generator());
        let strobe_program = common.load_program(&programs::fire_strobe());

        let mut cfg = Config::default();
        cfg.use_program(&pulse_program, &[&inv_pin]);
        cfg.set_set_pins(&[&out_pin]);
        cfg.clock_divider = FixedU32::<U8>::from_num(1);
        sm0.set_config(&cfg);
        sm0.set_pin_dirs(Direction::Out, &[&out_pin, &inv_pin]);
        sm0.set_pins(Level::Low, &[&out_pin, &inv_pin]);

        let mut cfg = Config::default();
        cfg.use_program(&strobe_program, &[]);
        cfg.set_set_pins(&[&fire_pin]);
        cfg.clock_divider = FixedU32::<U8>::from_num(1);
        sm2.set_config(&cfg);
        sm2.set_pin_dirs(Direction::Out, &[&fire_pin]);
        sm2.set_pins(Level::Low, &[&fire_pin]);

        // Trigger SM1 is configured per arming, once its program is known.
        sm1.set_enable(false);

        let armed_pin = Output::new(pins.armed, Level::Low);
        let clock = ClockGenerator::new(clock_pio, pins.clock_out);

        Self {
            common,
            irq_flags,
            sm_pulse: sm0,
            sm_trigger: sm1,
            sm_strobe: sm2,
            pulse_program,
            strobe_program,
            trigger_slot: None,
            out_pin,
            inv_pin,
            fire_pin,
            trigger_pin,
            armed_pin,
            clock,
        }
    }

    fn park_glitch_outputs(&mut self) {
        let pins = [&self.out_pin, &self.inv_pin];
        self.sm_pulse.set_pins(Level::Low, &pins);
    }
}

impl FaultEngine for PioFaultEngine {
    fn clear_fire_signal(&mut self) {
        // Parked through the strobe SM, which always maps FireSignal; the
        // trigger programs only ever drive it high.
        let pins = [&self.fire_pin];
        self.sm_strobe.set_pins(Level::Low, &pins);
    }

    fn drive_armed_signal(&mut self, armed: bool) {
        self.armed_pin
            .set_level(if armed { Level::High } else { Level::Low });
    }

    fn remove_trigger(&mut self) {
        self.sm_trigger.set_enable(false);
        self.sm_trigger.clear_fifos();
        if let Some(program) = self.trigger_slot.take() {
            self.common.free_instr(program.used_memory);
        }
    }

    fn install_trigger(&mut self, trigger: TriggerSource) -> Result<(), GlitchError> {
        let program = match trigger {
            TriggerSource::None => return Ok(()),
            TriggerSource::GpioEdge(Edge::Rising) => programs::edge_trigger_rising(),
            TriggerSource::GpioEdge(Edge::Falling) => programs::edge_trigger_falling(),
            TriggerSource::UartByte(_) => programs::uart_matcher(),
        };

        let loaded = match self.common.try_load_program(&program) {
            Ok(loaded) => loaded,
            Err(_) => {
                defmt::warn!("glitch: trigger program does not fit");
                return Err(GlitchError::NoRoom);
            }
        };

        let mut cfg = Config::default();
        cfg.use_program(&loaded, &[]);
        cfg.set_set_pins(&[&self.fire_pin]);
        cfg.clock_divider = FixedU32::<U8>::from_num(1);

        match trigger {
            TriggerSource::GpioEdge(_) => {
                cfg.set_in_pins(&[&self.trigger_pin]);
                cfg.set_jmp_pin(&self.trigger_pin);
                self.sm_trigger.set_config(&cfg);
            }
            TriggerSource::UartByte(_) => {
                cfg.shift_in = ShiftConfig {
                    threshold: 32,
                    direction: ShiftDirection::Right,
                    auto_fill: false,
                };
                cfg.clock_divider = FixedU32::<U8>::from_bits(uart_trigger_divider_bits(
                    clk_sys_freq(),
                    TARGET_UART_BAUD,
                ));
                self.sm_trigger.set_config(&cfg);
                // Snoop the pad the hardware UART owns.
                pads::share_pad_input(PIN_ASSIGNMENTS.target_rx);
                pads::route_in_base(pac::PIO0, 1, PIN_ASSIGNMENTS.target_rx);
            }
            TriggerSource::None => unreachable!(),
        }

        self.sm_trigger.set_pin_dirs(Direction::Out, &[&self.fire_pin]);
        self.sm_trigger.clear_fifos();
        self.sm_trigger.restart();
        unsafe {
            self.sm_trigger.exec_instr(plain(jmp_to(loaded.origin)));
        }

        if let TriggerSource::UartByte(byte) = trigger {
            // Compare word: the decoded frame lands in ISR[31:24].
            self.sm_trigger.tx().try_push((byte as u32) << 24);
        }

        self.trigger_slot = Some(loaded);
        Ok(())
    }

    fn clear_fire_irq(&mut self) {
        self.irq_flags.clear(FIRE_IRQ);
    }

    fn prime_pulse(&mut self, words: &PulseWords) {
        self.sm_pulse.set_enable(false);
        self.sm_pulse.clear_fifos();
        self.irq_flags.clear(DONE_IRQ);
        self.sm_pulse.restart();
        unsafe {
            self.sm_pulse
                .exec_instr(plain(jmp_to(self.pulse_program.origin)));
        }
        for word in words.as_fifo() {
            self.sm_pulse.tx().try_push(word);
        }
        // Blocks on FIRE-IRQ with pause and count already pulled.
        self.sm_pulse.set_enable(true);
    }

    fn enable_trigger(&mut self) {
        if self.trigger_slot.is_some() {
            self.sm_trigger.set_enable(true);
        }
    }

    fn load_boost(&mut self, words: BoostWords) {
        self.clock.load_boost(words);
    }

    fn drain_boost(&mut self) {
        self.clock.drain_boost();
    }

    fn halt_pulse_train(&mut self) {
        self.sm_pulse.set_enable(false);
        self.sm_trigger.set_enable(false);
        self.sm_strobe.set_enable(false);
        self.sm_pulse.clear_fifos();
        self.sm_trigger.clear_fifos();
        self.irq_flags.clear(FIRE_IRQ);
        self.irq_flags.clear(DONE_IRQ);
        self.park_glitch_outputs();
    }

    fn strobe_fire(&mut self) {
        self.sm_strobe.restart();
        unsafe {
            self.sm_strobe
                .exec_instr(plain(jmp_to(self.strobe_program.origin)));
        }
        self.sm_strobe.set_enable(true);
        // One strobe pass takes a handful of PIO cycles; a microsecond
        // leaves margin before the helper is torn down.
        block_for(Duration::from_micros(1));
        self.sm_strobe.set_enable(false);
    }

    fn pulse_completed(&mut self) -> bool {
        self.irq_flags.check(DONE_IRQ) || self.sm_pulse.tx().empty()
    }

    fn clock_enable(&mut self, timings: &ClockTimings) -> Result<(), GlitchError> {
        self.clock.enable(timings)
    }

    fn clock_disable(&mut self) {
        self.clock.disable();
    }
}

/// Clock generator on the second PIO block.
struct ClockGenerator {
    sm: StateMachine<'static, PIO1, 0>,
    program: LoadedProgram<'static, PIO1>,
    pin: Pin<'static, PIO1>,
}

impl ClockGenerator {
    fn new(pio: Pio<'static, PIO1>, pin: Peri<'static, embassy_rp::peripherals::PIN_6>) -> Self {
        let Pio {
            mut common, sm0, ..
        } = pio;

        let pin = common.make_pio_pin(pin);
        let program = common.load_program(&programs::clock_generator());

        Self {
            sm: sm0,
            program,
            pin,
        }
    }

    fn enable(&mut self, timings: &ClockTimings) -> Result<(), GlitchError> {
        self.sm.set_enable(false);
        self.sm.clear_fifos();

        let mut cfg = Config::default();
        cfg.use_program(&self.program, &[]);
        cfg.set_set_pins(&[&self.pin]);
        // `mov pins, !pins` toggles through the OUT mapping while reading
        // the pad back through the IN mapping.
        cfg.set_out_pins(&[&self.pin]);
        cfg.set_in_pins(&[&self.pin]);
        cfg.clock_divider = FixedU32::<U8>::from_num(1);
        self.sm.set_config(&cfg);
        self.sm.set_pin_dirs(Direction::Out, &[&self.pin]);
        self.sm.set_pins(Level::Low, &[&self.pin]);

        // FireSignal lives on the glitch block; share its pad and route the
        // branch condition at it.
        pads::share_pad_input(PIN_ASSIGNMENTS.fire);
        pads::route_jmp_pin(pac::PIO1, 0, PIN_ASSIGNMENTS.fire);

        self.sm.restart();
        unsafe {
            self.sm.exec_instr(plain(jmp_to(self.program.origin)));
        }
        self.seed_register(MovDestination::Y, timings.baseline_word);
        self.seed_register(MovDestination::ISR, timings.boost_word);

        self.sm.set_enable(true);
        defmt::info!(
            "clock: enabled, half period {} cycles",
            timings.half_period
        );
        Ok(())
    }

    /// Seeds a scratch register through the FIFO with executed pull/mov
    /// instructions, before the state machine starts running.
    fn seed_register(&mut self, destination: MovDestination, value: u32) {
        self.sm.tx().try_push(value);
        unsafe {
            self.sm.exec_instr(plain(InstructionOperands::PULL {
                if_empty: false,
                block: false,
            }));
            self.sm.exec_instr(plain(InstructionOperands::MOV {
                destination,
                op: MovOperation::None,
                source: MovSource::OSR,
            }));
        }
    }

    fn disable(&mut self) {
        self.sm.set_enable(false);
        self.sm.clear_fifos();
        let pins = [&self.pin];
        self.sm.set_pins(Level::Low, &pins);
        defmt::info!("clock: disabled");
    }

    fn load_boost(&mut self, words: BoostWords) {
        self.sm.tx().try_push(words.half_periods);
        self.sm.tx().try_push(words.restore);
    }

    fn drain_boost(&mut self) {
        self.sm.clear_fifos();
    }
}
