//! Derived printer state
//!
//! Tracks what the host can infer about the printer from the commands it
//! sends and the telemetry it receives: the protocol line number, XYZE
//! position, positioning mode, the active tool, temperatures and fan power.

use super::response::extract;
use printhost_core::{logmask, Position};

/// Heater state of one extruder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtruderTemp {
    /// Last reported temperature in °C.
    pub current: f32,
    /// Last commanded target in °C.
    pub target: f32,
}

/// Host-side model of the printer, fed from both directions of the wire.
#[derive(Debug, Clone)]
pub struct PrinterState {
    last_line_number: u16,
    /// Current XYZE, in the firmware's coordinate space.
    pub position: Position,
    /// True after G91 (relative positioning).
    pub relative_mode: bool,
    /// Tool selected by the last `T` command.
    pub active_extruder: usize,
    /// Heater state per extruder.
    pub extruders: Vec<ExtruderTemp>,
    /// Heated bed state.
    pub bed: ExtruderTemp,
    /// Last commanded feedrate in mm/min.
    pub feedrate: f32,
    /// Part cooling fan PWM, 0-255.
    pub fan_pwm: u8,
}

impl PrinterState {
    pub fn new(extruder_count: usize) -> Self {
        Self {
            last_line_number: 0,
            position: Position::default(),
            relative_mode: false,
            active_extruder: 0,
            extruders: vec![ExtruderTemp::default(); extruder_count.max(1)],
            bed: ExtruderTemp::default(),
            feedrate: 0.0,
            fan_pwm: 0,
        }
    }

    /// The line number of the most recently numbered command.
    pub fn last_line_number(&self) -> u16 {
        self.last_line_number
    }

    /// Advance the line counter and return the number to assign, wrapping
    /// at 2^16.
    pub fn increase_last_line(&mut self) -> u16 {
        self.last_line_number = self.last_line_number.wrapping_add(1);
        self.last_line_number
    }

    /// Roll the counter back after a send attempt was refused, so the
    /// number is not lost.
    pub fn decrease_last_line(&mut self) {
        self.last_line_number = self.last_line_number.wrapping_sub(1);
    }

    /// Forget everything volatile. Called when the firmware reboots.
    pub fn reset(&mut self) {
        let extruder_count = self.extruders.len();
        *self = PrinterState::new(extruder_count);
    }

    /// Update the model from an outgoing command.
    pub fn analyze(&mut self, gcode: &crate::gcode::GCode) {
        if let Some(t) = gcode.t() {
            if t >= 0 {
                self.active_extruder = (t as usize).min(self.extruders.len() - 1);
            }
        }
        match gcode.g() {
            Some(0) | Some(1) => {
                self.apply_move(gcode);
            }
            Some(28) => {
                // Homing zeroes the named axes, or all of them.
                let any = gcode.has('X') || gcode.has('Y') || gcode.has('Z');
                if !any || gcode.has('X') {
                    self.position.x = 0.0;
                }
                if !any || gcode.has('Y') {
                    self.position.y = 0.0;
                }
                if !any || gcode.has('Z') {
                    self.position.z = 0.0;
                }
            }
            Some(90) => self.relative_mode = false,
            Some(91) => self.relative_mode = true,
            Some(92) => {
                if let Some(x) = gcode.value('X') {
                    self.position.x = x as f32;
                }
                if let Some(y) = gcode.value('Y') {
                    self.position.y = y as f32;
                }
                if let Some(z) = gcode.value('Z') {
                    self.position.z = z as f32;
                }
                if let Some(e) = gcode.value('E') {
                    self.position.e = e as f32;
                }
            }
            _ => {}
        }
        match gcode.m() {
            Some(104) | Some(109) => {
                if let Some(s) = gcode.value('S') {
                    let index = gcode
                        .value('T')
                        .map(|t| t as usize)
                        .unwrap_or(self.active_extruder)
                        .min(self.extruders.len() - 1);
                    self.extruders[index].target = s as f32;
                }
            }
            Some(140) | Some(190) => {
                if let Some(s) = gcode.value('S') {
                    self.bed.target = s as f32;
                }
            }
            Some(106) => {
                self.fan_pwm = gcode.value('S').unwrap_or(255.0).clamp(0.0, 255.0) as u8;
            }
            Some(107) => self.fan_pwm = 0,
            Some(110) => {
                if let Some(n) = gcode.n() {
                    self.last_line_number = n;
                }
            }
            _ => {}
        }
    }

    fn apply_move(&mut self, gcode: &crate::gcode::GCode) {
        let axes: [(char, fn(&mut Position) -> &mut f32); 4] = [
            ('X', |p| &mut p.x),
            ('Y', |p| &mut p.y),
            ('Z', |p| &mut p.z),
            ('E', |p| &mut p.e),
        ];
        for (letter, axis) in axes {
            if let Some(value) = gcode.value(letter) {
                let slot = axis(&mut self.position);
                if self.relative_mode {
                    *slot += value as f32;
                } else {
                    *slot = value as f32;
                }
            }
        }
        if let Some(f) = gcode.value('F') {
            self.feedrate = f as f32;
        }
    }

    /// Update the model from a firmware reply line, setting the Response
    /// mask bit when telemetry was found.
    pub fn analyze_response(&mut self, line: &str, log_type: &mut u8) {
        let mut found = false;
        if let Some(value) = extract(line, "T:").and_then(|v| v.parse::<f32>().ok()) {
            self.extruders[self.active_extruder].current = value;
            found = true;
        }
        if let Some(value) = extract(line, "B:").and_then(|v| v.parse::<f32>().ok()) {
            self.bed.current = value;
            found = true;
        }
        let coords: [(&str, fn(&mut Position) -> &mut f32); 4] = [
            ("X:", |p| &mut p.x),
            ("Y:", |p| &mut p.y),
            ("Z:", |p| &mut p.z),
            ("E:", |p| &mut p.e),
        ];
        for (ident, axis) in coords {
            if let Some(value) = extract(line, ident).and_then(|v| v.parse::<f32>().ok()) {
                *axis(&mut self.position) = value;
                found = true;
            }
        }
        if found {
            *log_type |= logmask::RESPONSE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::GCode;

    #[test]
    fn line_numbers_wrap_at_16_bits() {
        let mut state = PrinterState::new(1);
        assert_eq!(state.increase_last_line(), 1);
        assert_eq!(state.increase_last_line(), 2);
        state.decrease_last_line();
        assert_eq!(state.last_line_number(), 1);

        let mut state = PrinterState::new(1);
        for _ in 0..65_535 {
            state.increase_last_line();
        }
        assert_eq!(state.last_line_number(), 65_535);
        assert_eq!(state.increase_last_line(), 0);
        assert_eq!(state.increase_last_line(), 1);
    }

    #[test]
    fn absolute_and_relative_moves() {
        let mut state = PrinterState::new(1);
        state.analyze(&GCode::parse("G1 X10 Y20 F3000"));
        assert_eq!(state.position.x, 10.0);
        assert_eq!(state.position.y, 20.0);
        assert_eq!(state.feedrate, 3000.0);

        state.analyze(&GCode::parse("G91"));
        state.analyze(&GCode::parse("G1 X5 Z1"));
        assert_eq!(state.position.x, 15.0);
        assert_eq!(state.position.z, 1.0);

        state.analyze(&GCode::parse("G90"));
        state.analyze(&GCode::parse("G1 X2"));
        assert_eq!(state.position.x, 2.0);
    }

    #[test]
    fn g92_sets_logical_position() {
        let mut state = PrinterState::new(1);
        state.analyze(&GCode::parse("G1 E95.2"));
        state.analyze(&GCode::parse("G92 E0"));
        assert_eq!(state.position.e, 0.0);
    }

    #[test]
    fn homing_zeroes_axes() {
        let mut state = PrinterState::new(1);
        state.analyze(&GCode::parse("G1 X50 Y60 Z7"));
        state.analyze(&GCode::parse("G28 X0"));
        assert_eq!(state.position.x, 0.0);
        assert_eq!(state.position.y, 60.0);
        state.analyze(&GCode::parse("G28"));
        assert_eq!(state.position.y, 0.0);
        assert_eq!(state.position.z, 0.0);
    }

    #[test]
    fn tool_change_and_heater_targets() {
        let mut state = PrinterState::new(2);
        state.analyze(&GCode::parse("T1"));
        assert_eq!(state.active_extruder, 1);
        state.analyze(&GCode::parse("M104 S210"));
        assert_eq!(state.extruders[1].target, 210.0);
        state.analyze(&GCode::parse("M104 S190 T0"));
        assert_eq!(state.extruders[0].target, 190.0);
        state.analyze(&GCode::parse("M140 S60"));
        assert_eq!(state.bed.target, 60.0);
    }

    #[test]
    fn fan_commands() {
        let mut state = PrinterState::new(1);
        state.analyze(&GCode::parse("M106 S128"));
        assert_eq!(state.fan_pwm, 128);
        state.analyze(&GCode::parse("M106"));
        assert_eq!(state.fan_pwm, 255);
        state.analyze(&GCode::parse("M107"));
        assert_eq!(state.fan_pwm, 0);
    }

    #[test]
    fn m110_resets_line_counter() {
        let mut state = PrinterState::new(1);
        state.increase_last_line();
        state.increase_last_line();
        let mut gc = GCode::parse("M110");
        gc.set_n(0);
        state.analyze(&gc);
        assert_eq!(state.last_line_number(), 0);
    }

    #[test]
    fn telemetry_extraction_sets_response_bit() {
        let mut state = PrinterState::new(1);
        let mut mask = logmask::INFO;
        state.analyze_response("ok T:210.4 B:60.1", &mut mask);
        assert_eq!(state.extruders[0].current, 210.4);
        assert_eq!(state.bed.current, 60.1);
        assert_ne!(mask & logmask::RESPONSE, 0);

        let mut mask = logmask::INFO;
        state.analyze_response("echo:busy processing", &mut mask);
        assert_eq!(mask, logmask::INFO);
    }

    #[test]
    fn position_report_updates_coordinates() {
        let mut state = PrinterState::new(1);
        let mut mask = 0;
        state.analyze_response("X:10.00 Y:20.00 Z:0.30 E:12.50", &mut mask);
        assert_eq!(state.position.x, 10.0);
        assert_eq!(state.position.z, 0.3);
        assert_eq!(state.position.e, 12.5);
    }

    #[test]
    fn reset_clears_volatile_state() {
        let mut state = PrinterState::new(2);
        state.increase_last_line();
        state.analyze(&GCode::parse("G1 X10"));
        state.analyze(&GCode::parse("M104 S200"));
        state.reset();
        assert_eq!(state.last_line_number(), 0);
        assert_eq!(state.position.x, 0.0);
        assert_eq!(state.extruders[0].target, 0.0);
        assert_eq!(state.extruders.len(), 2);
    }
}
