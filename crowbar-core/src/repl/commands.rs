//! Command dispatcher.
//!
//! Glues the parsed grammar to the glitch controller and the target port.
//! Stays `no_std` friendly so the firmware and the host test suites share
//! the same implementation.

use core::fmt::Write;

use heapless::String;

use super::grammar::{self, Command, TargetCommand};
use super::respond::{ReplySink, Responder, MAX_REPLY_LINE};
use super::status;
use crate::engine::{FaultEngine, GlitchController};
use crate::params::{Edge, TriggerSource};
use crate::target::{PowerAction, TargetPort};

type Message = String<MAX_REPLY_LINE>;

/// Executes command lines against the controller and target port.
pub struct CommandExecutor<E: FaultEngine, T: TargetPort> {
    controller: GlitchController<E>,
    target: T,
    responder: Responder,
}

impl<E: FaultEngine, T: TargetPort> CommandExecutor<E, T> {
    pub fn new(controller: GlitchController<E>, target: T) -> Self {
        Self {
            controller,
            target,
            responder: Responder::new(),
        }
    }

    pub fn controller(&self) -> &GlitchController<E> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut GlitchController<E> {
        &mut self.controller
    }

    /// Completion poll, forwarded from the main loop.
    pub fn tick(&mut self) {
        self.controller.tick();
    }

    /// Parses and executes one command line.
    pub fn execute(&mut self, line: &str, sink: &mut impl ReplySink) {
        self.responder.received(sink);

        let command = match grammar::parse(line) {
            Ok(command) => command,
            Err(err) => {
                let mut message = Message::new();
                let _ = write!(message, "{err}");
                self.responder.fail(sink, message.as_str());
                return;
            }
        };

        self.dispatch(command, sink);
    }

    fn dispatch(&mut self, command: Command, sink: &mut impl ReplySink) {
        match command {
            Command::Set { field, value } => {
                match self.controller.set_param(field, value) {
                    Ok(()) => {
                        let mut detail = Message::new();
                        let _ = write!(detail, "{} set to ", field.name());
                        if field.is_duration() {
                            status::format_cycles(&mut detail, value);
                        } else {
                            let _ = write!(detail, "{}", value);
                        }
                        self.responder.ok(sink, detail.as_str());
                    }
                    Err(err) => self.fail(sink, &err),
                }
            }
            Command::Get { field } => {
                let value = self.controller.params().get(field);
                status::render_get(field, value, |text| self.responder.reply(sink, text));
                self.succeed_quietly(sink);
            }
            Command::Trigger(source) => match self.controller.set_trigger(source) {
                Ok(()) => {
                    let mut detail = Message::new();
                    match source {
                        TriggerSource::None => {
                            let _ = detail.push_str("trigger disabled");
                        }
                        TriggerSource::GpioEdge(edge) => {
                            let _ = write!(
                                detail,
                                "GPIO trigger, {} edge",
                                match edge {
                                    Edge::Rising => "RISING",
                                    Edge::Falling => "FALLING",
                                }
                            );
                        }
                        TriggerSource::UartByte(byte) => {
                            let _ = write!(detail, "UART trigger on byte 0x{:02X}", byte);
                        }
                    }
                    self.responder.ok(sink, detail.as_str());
                }
                Err(err) => self.fail(sink, &err),
            },
            Command::Arm(true) => match self.controller.arm() {
                Ok(()) => self.responder.ok(sink, "armed"),
                Err(err) => self.fail(sink, &err),
            },
            Command::Arm(false) => {
                self.controller.disarm();
                self.responder.ok(sink, "disarmed");
            }
            Command::Glitch => match self.controller.fire() {
                Ok(()) => self.responder.ok(sink, "glitch executed"),
                Err(err) => self.fail(sink, &err),
            },
            Command::Status => {
                // The poll runs first so a finished hardware trigger is
                // reflected in the snapshot.
                self.controller.tick();
                let snapshot = self.controller.status();
                status::render_status(&snapshot, |text| self.responder.reply(sink, text));
                self.succeed_quietly(sink);
            }
            Command::Reset => {
                self.controller.reset();
                self.responder.ok(sink, "reset to defaults");
            }
            Command::Clock {
                frequency_hz: None,
                enable: None,
            } => {
                let clock = self.controller.clock();
                status::render_clock(clock.frequency_hz, clock.enabled, |text| {
                    self.responder.reply(sink, text)
                });
                self.succeed_quietly(sink);
            }
            Command::Clock {
                frequency_hz,
                enable,
            } => match self.controller.set_clock(frequency_hz, enable) {
                Ok(()) => {
                    let clock = self.controller.clock();
                    let mut detail = Message::new();
                    let _ = write!(
                        detail,
                        "clock {} Hz ({})",
                        clock.frequency_hz,
                        if clock.enabled { "ON" } else { "OFF" }
                    );
                    self.responder.ok(sink, detail.as_str());
                }
                Err(err) => self.fail(sink, &err),
            },
            Command::Api(enabled) => {
                // Confirm in the mode that is being entered.
                self.responder.set_api_mode(enabled);
                self.responder
                    .ok(sink, if enabled { "API mode on" } else { "API mode off" });
            }
            Command::LastError => {
                let mut message = Message::new();
                let _ = write!(message, "last error: {}", self.responder.last_error());
                self.responder.reply(sink, message.as_str());
                self.succeed_quietly(sink);
            }
            Command::Help => {
                status::render_help(|text| self.responder.reply(sink, text));
                self.succeed_quietly(sink);
            }
            Command::Version => {
                status::render_version(|text| self.responder.reply(sink, text));
                self.succeed_quietly(sink);
            }
            Command::Pins => {
                status::render_pins(|text| self.responder.reply(sink, text));
                self.succeed_quietly(sink);
            }
            Command::Target(target) => self.dispatch_target(target, sink),
            Command::Reboot { bootloader } => {
                self.responder.ok(
                    sink,
                    if bootloader {
                        "rebooting into bootloader"
                    } else {
                        "rebooting"
                    },
                );
                self.target.reboot(bootloader);
            }
        }
    }

    fn dispatch_target(&mut self, command: TargetCommand, sink: &mut impl ReplySink) {
        match command {
            TargetCommand::Send(bytes) => match self.target.send(&bytes) {
                Ok(()) => {
                    let mut detail = Message::new();
                    let _ = write!(detail, "sent {} bytes", bytes.len());
                    self.responder.ok(sink, detail.as_str());
                }
                Err(_) => self.responder.fail(sink, "target UART unavailable"),
            },
            TargetCommand::Response => {
                let response = self.target.take_response();
                crate::target::render_response_hex(&response, |text| {
                    self.responder.reply(sink, text)
                });
                self.succeed_quietly(sink);
            }
            TargetCommand::Reset(request) => {
                let config = request.resolve();
                self.target.pulse_reset(&config);
                let mut detail = Message::new();
                let _ = write!(
                    detail,
                    "target reset pulsed (GP{}, {} ms, active-{})",
                    config.pin,
                    config.period_ms,
                    if config.active_high { "high" } else { "low" }
                );
                self.responder.ok(sink, detail.as_str());
            }
            TargetCommand::Power(action) => {
                self.target.set_power(action);
                self.responder.ok(
                    sink,
                    match action {
                        PowerAction::On => "target power on",
                        PowerAction::Off => "target power off",
                        PowerAction::Cycle => "target power cycled",
                    },
                );
            }
        }
    }

    fn fail(&mut self, sink: &mut impl ReplySink, err: &impl core::fmt::Display) {
        let mut message = Message::new();
        let _ = write!(message, "{err}");
        self.responder.fail(sink, message.as_str());
    }

    /// Queries succeed silently in human mode (the reply is the output) but
    /// still need their `+` in API mode.
    fn succeed_quietly(&mut self, sink: &mut impl ReplySink) {
        if self.responder.api_mode() {
            self.responder.ok(sink, "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockTimings;
    use crate::engine::{ArmState, GlitchError};
    use crate::params::PulseWords;
    use crate::target::{ResetConfig, TargetError, RESPONSE_CAPACITY};
    use std::string::{String as StdString, ToString};
    use std::vec::Vec as StdVec;

    #[derive(Default)]
    struct BenchEngine {
        install_fails: bool,
        completed: bool,
    }

    impl FaultEngine for BenchEngine {
        fn clear_fire_signal(&mut self) {}
        fn drive_armed_signal(&mut self, _armed: bool) {}
        fn remove_trigger(&mut self) {}

        fn install_trigger(&mut self, _trigger: TriggerSource) -> Result<(), GlitchError> {
            if self.install_fails {
                Err(GlitchError::NoRoom)
            } else {
                Ok(())
            }
        }

        fn clear_fire_irq(&mut self) {}
        fn prime_pulse(&mut self, _words: &PulseWords) {}
        fn enable_trigger(&mut self) {}
        fn load_boost(&mut self, _words: crate::clock::BoostWords) {}
        fn drain_boost(&mut self) {}
        fn halt_pulse_train(&mut self) {}
        fn strobe_fire(&mut self) {}

        fn pulse_completed(&mut self) -> bool {
            self.completed
        }

        fn clock_enable(&mut self, _timings: &ClockTimings) -> Result<(), GlitchError> {
            Ok(())
        }

        fn clock_disable(&mut self) {}
    }

    #[derive(Default)]
    struct BenchTarget {
        sent: StdVec<u8>,
        response: StdVec<u8>,
        resets: StdVec<ResetConfig>,
        power: StdVec<PowerAction>,
        reboots: StdVec<bool>,
        uart_down: bool,
    }

    impl TargetPort for BenchTarget {
        fn send(&mut self, bytes: &[u8]) -> Result<(), TargetError> {
            if self.uart_down {
                return Err(TargetError::UartUnavailable);
            }
            self.sent.extend_from_slice(bytes);
            Ok(())
        }

        fn take_response(&mut self) -> heapless::Vec<u8, RESPONSE_CAPACITY> {
            let mut out = heapless::Vec::new();
            let _ = out.extend_from_slice(&self.response);
            self.response.clear();
            out
        }

        fn pulse_reset(&mut self, config: &ResetConfig) {
            self.resets.push(*config);
        }

        fn set_power(&mut self, action: PowerAction) {
            self.power.push(action);
        }

        fn reboot(&mut self, bootloader: bool) {
            self.reboots.push(bootloader);
        }
    }

    #[derive(Default)]
    struct Sink {
        lines: StdVec<StdString>,
        acks: StdVec<u8>,
    }

    impl ReplySink for Sink {
        fn line(&mut self, text: &str) {
            self.lines.push(text.to_string());
        }

        fn ack(&mut self, byte: u8) {
            self.acks.push(byte);
        }
    }

    fn executor() -> CommandExecutor<BenchEngine, BenchTarget> {
        CommandExecutor::new(
            GlitchController::new(BenchEngine::default()),
            BenchTarget::default(),
        )
    }

    fn run(executor: &mut CommandExecutor<BenchEngine, BenchTarget>, line: &str) -> Sink {
        let mut sink = Sink::default();
        executor.execute(line, &mut sink);
        sink
    }

    #[test]
    fn manual_fire_scenario_counts_one_glitch() {
        let mut exec = executor();
        for line in [
            "SET PAUSE 0",
            "SET WIDTH 150",
            "SET GAP 0",
            "SET COUNT 1",
            "TRIGGER NONE",
            "ARM ON",
        ] {
            let sink = run(&mut exec, line);
            assert!(
                sink.lines.iter().all(|l| l.starts_with("OK:")),
                "{line} -> {:?}",
                sink.lines
            );
        }

        // A one-pulse train has long finished by the time the strobe helper
        // is torn down.
        exec.controller_mut().engine_mut().completed = true;
        let sink = run(&mut exec, "GLITCH");
        assert_eq!(sink.lines, ["OK: glitch executed"]);
        assert_eq!(exec.controller().fired_count(), 1);
        assert_eq!(exec.controller().state(), ArmState::Disarmed);
    }

    #[test]
    fn set_while_armed_reports_state_error() {
        let mut exec = executor();
        run(&mut exec, "ARM ON");
        let sink = run(&mut exec, "SET WIDTH 500");
        assert_eq!(sink.lines, ["ERROR: disarm before changing configuration"]);

        let sink = run(&mut exec, "ERROR");
        assert_eq!(
            sink.lines,
            ["last error: disarm before changing configuration"]
        );
    }

    #[test]
    fn double_arm_reports_already_armed() {
        let mut exec = executor();
        run(&mut exec, "ARM ON");
        let sink = run(&mut exec, "ARM ON");
        assert_eq!(sink.lines, ["ERROR: already armed"]);
    }

    #[test]
    fn get_replies_with_conversion() {
        let mut exec = executor();
        run(&mut exec, "SET WIDTH 150");
        let sink = run(&mut exec, "GET WIDTH");
        assert_eq!(sink.lines, ["150 cycles (1.00 us)"]);
    }

    #[test]
    fn api_mode_uses_single_byte_acks() {
        let mut exec = executor();
        let sink = run(&mut exec, "API ON");
        // The mode switch itself is already acknowledged in API style.
        assert_eq!(sink.acks, [b'+']);
        assert!(sink.lines.is_empty());

        let sink = run(&mut exec, "SET WIDTH 200");
        assert_eq!(sink.acks, [b'.', b'+']);
        assert!(sink.lines.is_empty());

        let sink = run(&mut exec, "GLITCH");
        assert_eq!(sink.acks, [b'.', b'!']);

        // Query output still flows.
        let sink = run(&mut exec, "GET WIDTH");
        assert_eq!(sink.acks, [b'.', b'+']);
        assert_eq!(sink.lines, ["200 cycles (1.33 us)"]);

        let sink = run(&mut exec, "API OFF");
        assert_eq!(sink.acks, [b'.']);
        assert_eq!(sink.lines, ["OK: API mode off"]);
    }

    #[test]
    fn parse_errors_surface_and_are_retained() {
        let mut exec = executor();
        let sink = run(&mut exec, "G");
        assert_eq!(sink.lines.len(), 1);
        assert!(sink.lines[0].starts_with("ERROR: ambiguous 'G'"));

        let sink = run(&mut exec, "ERROR");
        assert!(sink.lines[0].starts_with("last error: ambiguous 'G'"));
    }

    #[test]
    fn no_room_keeps_state_disarmed() {
        let mut exec = executor();
        run(&mut exec, "TRIGGER UART 0D");
        // Make the engine refuse the program load.
        exec.controller_mut().engine_mut().install_fails = true;
        let sink = run(&mut exec, "ARM ON");
        assert_eq!(sink.lines, ["ERROR: no room in PIO instruction memory"]);
        assert_eq!(exec.controller().state(), ArmState::Disarmed);
    }

    #[test]
    fn target_send_and_response_round_trip() {
        let mut exec = executor();
        let sink = run(&mut exec, "TARGET SEND \"R 0 4\"");
        assert_eq!(sink.lines, ["OK: sent 6 bytes"]);
        assert_eq!(exec.target.sent, b"R 0 4\r");

        exec.target.response = b"\r\n0\r\n".to_vec();
        let sink = run(&mut exec, "TARGET RESPONSE");
        assert_eq!(sink.lines, ["0D 0A 30 0D 0A"]);

        let sink = run(&mut exec, "TARGET RESPONSE");
        assert_eq!(sink.lines, ["(no response)"]);
    }

    #[test]
    fn target_reset_pulses_with_resolved_options() {
        let mut exec = executor();
        let sink = run(&mut exec, "TARGET RESET PIN 7 PERIOD 100 HIGH");
        assert!(sink.lines[0].starts_with("OK: target reset pulsed (GP7, 100 ms, active-high"));
        assert_eq!(exec.target.resets.len(), 1);
        let config = exec.target.resets[0];
        assert_eq!(config.pin, 7);
        assert_eq!(config.period_ms, 100);
        assert!(config.active_high);

        // Options never persist between invocations.
        run(&mut exec, "TARGET RESET");
        let config = exec.target.resets[1];
        assert_eq!(config.pin, 15);
        assert_eq!(config.period_ms, 300);
        assert!(!config.active_high);
    }

    #[test]
    fn target_power_and_reboot_dispatch() {
        let mut exec = executor();
        run(&mut exec, "TARGET POWER CYCLE");
        assert_eq!(exec.target.power, [PowerAction::Cycle]);

        run(&mut exec, "REBOOT BL");
        assert_eq!(exec.target.reboots, [true]);
    }

    #[test]
    fn uart_failure_is_reported() {
        let mut exec = executor();
        exec.target.uart_down = true;
        let sink = run(&mut exec, "TARGET SEND 00");
        assert_eq!(sink.lines, ["ERROR: target UART unavailable"]);
    }

}
