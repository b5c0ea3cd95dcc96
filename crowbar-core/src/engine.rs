//! Arm/disarm lifecycle authority.
//!
//! `GlitchController` owns every PIO resource through the [`FaultEngine`]
//! trait and is the only code allowed to sequence them. The trait keeps the
//! lifecycle host-testable: the firmware implements it on the real PIO
//! blocks, tests implement it with a recording mock.

use core::fmt;

use crate::clock::{self, BoostWords, ClockConfig, ClockError, ClockTimings};
use crate::params::{GlitchParams, ParamError, ParamField, PulseWords, TriggerSource};
use crate::timing::SYSTEM_CLOCK_HZ;

/// Process-wide arming state.
///
/// `Fired` is transient: the completion poll that observes it collapses it
/// to `Disarmed` in the same call, after bumping the fired counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ArmState {
    #[default]
    Disarmed,
    Armed,
    Fired,
}

/// Errors surfaced by controller operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GlitchError {
    /// Arm requested while already armed.
    AlreadyArmed,
    /// Manual fire requires the armed state.
    NotArmed,
    /// Parameter or trigger write attempted while armed.
    ArmedLockout,
    /// Manual fire is only valid with `TRIGGER NONE`.
    TriggerSelected,
    /// PIO instruction memory cannot fit the requested trigger program.
    NoRoom,
    /// Parameter out of range.
    Param(ParamError),
    /// Clock generator configuration failure.
    Clock(ClockError),
}

impl From<ParamError> for GlitchError {
    fn from(err: ParamError) -> Self {
        GlitchError::Param(err)
    }
}

impl From<ClockError> for GlitchError {
    fn from(err: ClockError) -> Self {
        GlitchError::Clock(err)
    }
}

impl fmt::Display for GlitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlitchError::AlreadyArmed => write!(f, "already armed"),
            GlitchError::NotArmed => write!(f, "not armed"),
            GlitchError::ArmedLockout => write!(f, "disarm before changing configuration"),
            GlitchError::TriggerSelected => write!(f, "manual fire requires TRIGGER NONE"),
            GlitchError::NoRoom => write!(f, "no room in PIO instruction memory"),
            GlitchError::Param(ParamError::MustBePositive(field)) => {
                write!(f, "{} must be at least 1", field.name())
            }
            GlitchError::Clock(ClockError::NoFrequency) => {
                write!(f, "set a clock frequency before enabling")
            }
            GlitchError::Clock(ClockError::TooFast { max_hz }) => {
                write!(f, "clock frequency exceeds {} Hz", max_hz)
            }
        }
    }
}

/// Hardware operations the controller sequences.
///
/// Call-order contracts (enforced by the controller, checked in tests):
/// the pulse engine is primed and enabled before the trigger state machine,
/// and any pending FIRE-IRQ is cleared in between. `remove_trigger`,
/// `halt_pulse_train`, and `clock_disable` must be safe to call when
/// nothing is resident.
pub trait FaultEngine {
    /// Drives FireSignal low (the trigger raises it, the controller clears).
    fn clear_fire_signal(&mut self);

    /// Drives ArmedSignal; high exactly while the controller is armed.
    fn drive_armed_signal(&mut self, armed: bool);

    /// Disables the trigger state machine, clears its FIFO, and releases
    /// its program slot.
    fn remove_trigger(&mut self);

    /// Loads and configures the trigger program for `trigger`, leaving its
    /// state machine disabled. Fails with [`GlitchError::NoRoom`] when the
    /// instruction memory cannot fit it.
    fn install_trigger(&mut self, trigger: TriggerSource) -> Result<(), GlitchError>;

    /// Clears a pending FIRE-IRQ flag.
    fn clear_fire_irq(&mut self);

    /// Restarts the pulse state machine, preloads the four FIFO words, and
    /// enables it; it then blocks on FIRE-IRQ.
    fn prime_pulse(&mut self, words: &PulseWords);

    /// Enables the trigger state machine installed earlier. No-op when no
    /// trigger program is resident.
    fn enable_trigger(&mut self);

    /// Pushes the boost count and baseline-restore words into the clock
    /// generator FIFO.
    fn load_boost(&mut self, words: BoostWords);

    /// Drains unconsumed boost words so a cancelled arm cannot leave stale
    /// values behind.
    fn drain_boost(&mut self);

    /// Disables the pulse and trigger state machines and clears their FIFOs
    /// and IRQ flags. Outputs must end up low even mid-pulse.
    fn halt_pulse_train(&mut self);

    /// Raises FireSignal and FIRE-IRQ from the spare state machine (manual
    /// fire), then tears the helper down.
    fn strobe_fire(&mut self);

    /// Reports whether the pulse engine finished its train: the completion
    /// IRQ, with FIFO-drain as the redundant check.
    fn pulse_completed(&mut self) -> bool;

    /// Starts the clock generator with the given delay words.
    fn clock_enable(&mut self, timings: &ClockTimings) -> Result<(), GlitchError>;

    /// Stops the clock generator and parks its pin low.
    fn clock_disable(&mut self);
}

/// Snapshot of everything `STATUS` reports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub armed: bool,
    pub fired: u32,
    pub params: GlitchParams,
    pub clock: ClockConfig,
}

/// The lifecycle authority over the glitch hardware.
pub struct GlitchController<E: FaultEngine> {
    engine: E,
    params: GlitchParams,
    clock: ClockConfig,
    state: ArmState,
    fired: u32,
    /// A manual strobe was issued; the pulse train may still be rendering.
    manual_pending: bool,
}

impl<E: FaultEngine> GlitchController<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            params: GlitchParams::default(),
            clock: ClockConfig::default(),
            state: ArmState::Disarmed,
            fired: 0,
            manual_pending: false,
        }
    }

    pub fn params(&self) -> &GlitchParams {
        &self.params
    }

    /// Access to the hardware driver, for firmware-side plumbing and tests.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn state(&self) -> ArmState {
        self.state
    }

    /// Monotonic count of completed firings since boot. Pure; completion
    /// detection happens in [`tick`](Self::tick).
    pub fn fired_count(&self) -> u32 {
        self.fired
    }

    pub fn clock(&self) -> ClockConfig {
        self.clock
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            armed: self.state == ArmState::Armed,
            fired: self.fired,
            params: self.params,
            clock: self.clock,
        }
    }

    /// Writes a glitch parameter. Rejected while armed so an in-flight
    /// glitch is never disturbed.
    pub fn set_param(&mut self, field: ParamField, value: u32) -> Result<(), GlitchError> {
        if self.state == ArmState::Armed {
            return Err(GlitchError::ArmedLockout);
        }
        self.params.set(field, value)?;
        Ok(())
    }

    /// Selects the trigger for the next arming.
    pub fn set_trigger(&mut self, trigger: TriggerSource) -> Result<(), GlitchError> {
        if self.state == ArmState::Armed {
            return Err(GlitchError::ArmedLockout);
        }
        self.params.trigger = trigger;
        Ok(())
    }

    /// Arms the glitch hardware for one shot.
    ///
    /// The step order matters: the pulse engine must be blocked on FIRE-IRQ
    /// before the trigger state machine can raise it.
    pub fn arm(&mut self) -> Result<(), GlitchError> {
        if self.state == ArmState::Armed {
            return Err(GlitchError::AlreadyArmed);
        }

        self.engine.clear_fire_signal();
        self.engine.remove_trigger();
        if self.params.trigger.needs_program() {
            self.engine.install_trigger(self.params.trigger)?;
        }
        self.engine.clear_fire_irq();
        self.engine.prime_pulse(&self.params.pulse_words());
        self.engine.enable_trigger();

        if self.clock.enabled {
            let timings = clock::timings(SYSTEM_CLOCK_HZ, self.clock.frequency_hz)?;
            self.engine.load_boost(timings.boost_words(self.params.count));
        }

        self.engine.drive_armed_signal(true);
        self.state = ArmState::Armed;
        Ok(())
    }

    /// Disarms. Idempotent; cancels a pending trigger wait and truncates an
    /// in-flight pulse train without leaving outputs high.
    pub fn disarm(&mut self) {
        self.engine.drive_armed_signal(false);
        self.engine.halt_pulse_train();
        if self.clock.enabled {
            self.engine.drain_boost();
        }
        self.engine.clear_fire_signal();
        self.manual_pending = false;
        self.state = ArmState::Disarmed;
    }

    /// Manual fire. Requires the armed state and `TRIGGER NONE`.
    ///
    /// The strobe only starts the pulse train; teardown waits until the
    /// engine reports completion, so long trains are never truncated.
    pub fn fire(&mut self) -> Result<(), GlitchError> {
        if self.state != ArmState::Armed {
            return Err(GlitchError::NotArmed);
        }
        if self.params.trigger.needs_program() {
            return Err(GlitchError::TriggerSelected);
        }

        self.engine.strobe_fire();
        self.manual_pending = true;
        self.try_finish();
        Ok(())
    }

    /// Completion poll, called from the main loop. When an accepted trigger
    /// (hardware or manual strobe) has rendered its pulse train, counts the
    /// glitch and auto-disarms.
    pub fn tick(&mut self) {
        if self.state != ArmState::Armed {
            return;
        }
        if !self.params.trigger.needs_program() && !self.manual_pending {
            return;
        }
        self.try_finish();
    }

    fn try_finish(&mut self) {
        if self.engine.pulse_completed() {
            self.state = ArmState::Fired;
            self.finish_fired();
        }
    }

    /// Disarms and restores boot defaults.
    pub fn reset(&mut self) {
        self.disarm();
        self.params = GlitchParams::default();
        self.fired = 0;
    }

    /// Applies `CLOCK` updates: an optional new frequency and an optional
    /// enable/disable, in that order. Changing the frequency of a running
    /// clock restarts it.
    pub fn set_clock(
        &mut self,
        frequency_hz: Option<u32>,
        enable: Option<bool>,
    ) -> Result<(), GlitchError> {
        if let Some(freq) = frequency_hz {
            let was_enabled = self.clock.enabled;
            if was_enabled {
                self.engine.clock_disable();
                self.clock.enabled = false;
            }
            self.clock.frequency_hz = freq;
            if was_enabled {
                self.enable_clock()?;
            }
        }

        match enable {
            Some(true) => {
                if !self.clock.enabled {
                    self.enable_clock()?;
                }
            }
            Some(false) => {
                if self.clock.enabled {
                    self.engine.clock_disable();
                    self.clock.enabled = false;
                }
            }
            None => {}
        }
        Ok(())
    }

    fn enable_clock(&mut self) -> Result<(), GlitchError> {
        let timings = clock::timings(SYSTEM_CLOCK_HZ, self.clock.frequency_hz)?;
        self.engine.clock_enable(&timings)?;
        self.clock.enabled = true;
        Ok(())
    }

    fn finish_fired(&mut self) {
        debug_assert_eq!(self.state, ArmState::Fired);
        self.fired = self.fired.wrapping_add(1);
        self.manual_pending = false;
        self.engine.drive_armed_signal(false);
        self.engine.halt_pulse_train();
        self.engine.clear_fire_signal();
        self.state = ArmState::Disarmed;
    }
}
