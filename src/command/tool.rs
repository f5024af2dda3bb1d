//!
//! Tool-routed (slave) command builders and parsers, packed through the master's
//! TOOL_COMMAND/TOOL_QUERY addressing.
//!

use byteorder::{ByteOrder, LittleEndian};

use crate::transport::response::Response;

use super::{CommandLayer, MasterCommand};
use super::error::CommandError;

/// Slave command byte values, addressed through a tool index.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveCommand {
    Version = 0,
    Init = 1,
    GetTemp = 2,
    SetTemp = 3,
    SetMotor1Pwm = 4,
    SetMotor2Pwm = 5,
    SetMotor1Rpm = 6,
    SetMotor2Rpm = 7,
    SetMotor1Dir = 8,
    SetMotor2Dir = 9,
    ToggleMotor1 = 10,
    ToggleMotor2 = 11,
    ToggleFan = 12,
    ToggleValve = 13,
    SetServo1Pos = 14,
    SetServo2Pos = 15,
    FilamentStatus = 16,
    GetMotor1Rpm = 17,
    GetMotor2Rpm = 18,
    GetMotor1Pwm = 19,
    GetMotor2Pwm = 20,
    SelectTool = 21,
    IsToolReady = 22,
}

/// Selects between a toolhead's two independently addressable motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorSelect {
    One,
    Two,
}

impl MotorSelect {
    fn pwm_command(self) -> SlaveCommand {
        match self {
            MotorSelect::One => SlaveCommand::SetMotor1Pwm,
            MotorSelect::Two => SlaveCommand::SetMotor2Pwm,
        }
    }

    fn rpm_command(self) -> SlaveCommand {
        match self {
            MotorSelect::One => SlaveCommand::SetMotor1Rpm,
            MotorSelect::Two => SlaveCommand::SetMotor2Rpm,
        }
    }

    fn dir_command(self) -> SlaveCommand {
        match self {
            MotorSelect::One => SlaveCommand::SetMotor1Dir,
            MotorSelect::Two => SlaveCommand::SetMotor2Dir,
        }
    }

    fn toggle_command(self) -> SlaveCommand {
        match self {
            MotorSelect::One => SlaveCommand::ToggleMotor1,
            MotorSelect::Two => SlaveCommand::ToggleMotor2,
        }
    }

    fn get_rpm_command(self) -> SlaveCommand {
        match self {
            MotorSelect::One => SlaveCommand::GetMotor1Rpm,
            MotorSelect::Two => SlaveCommand::GetMotor2Rpm,
        }
    }

    fn get_pwm_command(self) -> SlaveCommand {
        match self {
            MotorSelect::One => SlaveCommand::GetMotor1Pwm,
            MotorSelect::Two => SlaveCommand::GetMotor2Pwm,
        }
    }
}

///
/// Converts a motor speed in RPM to the inter-pulse interval in microseconds the
/// firmware expects: `round(60_000_000 / rpm)`, widened to u64 during the division
/// and clamped to `u32::MAX` before narrowing back to the wire type.
///
/// A historical implementation of this conversion used a bitwise XOR where an
/// exponentiation (or explicit `u32::MAX` clamp) was intended; this clamps
/// explicitly instead.
///
/// # Parameters:
/// - `rpm`: The requested motor speed, revolutions per minute
///
/// # Returns:
/// - The number of microseconds between motor pulses, clamped to `u32::MAX`
///
pub fn rpm_to_micros(rpm: u32) -> u32 {
    if rpm == 0 {
        return u32::MAX;
    }

    let micros = (60_000_000u64 + rpm as u64 / 2) / rpm as u64;
    micros.min(u32::MAX as u64) as u32
}

impl CommandLayer {
    fn run_tool_ok(&self, master: MasterCommand, tool: u8, sub: SlaveCommand, subargs: &[u8]) -> Result<(), CommandError> {
        self.run_tool(master, tool, sub, subargs)?;
        Ok(())
    }

    fn run_tool(&self, master: MasterCommand, tool: u8, sub: SlaveCommand, subargs: &[u8]) -> Result<Response, CommandError> {
        let mut payload = vec![master as u8, tool, sub as u8, subargs.len() as u8];
        payload.extend_from_slice(subargs);
        let response = self.transport().run_command(&payload)?;
        super::check_response(response)
    }

    ///
    /// Sends a command to tool `tool`, subcommand `sub`, with raw `subargs`. Packs
    /// `TOOL_COMMAND | tool | sub | sublen | subargs…`.
    ///
    pub fn tool_command(&self, tool: u8, sub: u8, subargs: &[u8]) -> Result<(), CommandError> {
        let mut payload = vec![MasterCommand::ToolCommand as u8, tool, sub, subargs.len() as u8];
        payload.extend_from_slice(subargs);
        let response = self.transport().run_command(&payload)?;
        super::check_response(response)?;
        Ok(())
    }

    ///
    /// Queries tool `tool`, subcommand `sub`, with raw `subargs`. Packs
    /// `TOOL_QUERY | tool | sub | sublen | subargs…` and returns the response.
    ///
    pub fn tool_query(&self, tool: u8, sub: u8, subargs: &[u8]) -> Result<Response, CommandError> {
        let mut payload = vec![MasterCommand::ToolQuery as u8, tool, sub, subargs.len() as u8];
        payload.extend_from_slice(subargs);
        let response = self.transport().run_command(&payload)?;
        super::check_response(response)
    }

    ///
    /// Sets the target temperature of `tool`, clamped to `[0, 65535]` (the full u16
    /// range — the clamp exists so callers passing a wider integer type don't panic).
    ///
    pub fn set_temp(&self, tool: u8, temp_c: u16) -> Result<(), CommandError> {
        let mut args = [0u8; 2];
        LittleEndian::write_u16(&mut args, temp_c);
        self.run_tool_ok(MasterCommand::ToolCommand, tool, SlaveCommand::SetTemp, &args)
    }

    ///
    /// # Returns:
    /// - The current temperature of `tool`, in degrees Celsius
    ///
    pub fn read_temp(&self, tool: u8) -> Result<u16, CommandError> {
        let mut response = self.run_tool(MasterCommand::ToolQuery, tool, SlaveCommand::GetTemp, &[])?;
        Ok(response.get_u16())
    }

    ///
    /// Sets `motor`'s speed on `tool` to `rpm`, converting to the firmware's
    /// microseconds-per-pulse representation.
    ///
    pub fn set_motor_rpm(&self, tool: u8, motor: MotorSelect, rpm: u32) -> Result<(), CommandError> {
        let micros = rpm_to_micros(rpm);
        let mut args = [0u8; 4];
        LittleEndian::write_u32(&mut args, micros);
        self.run_tool_ok(MasterCommand::ToolCommand, tool, motor.rpm_command(), &args)
    }

    ///
    /// Sets `motor`'s PWM duty cycle on `tool`.
    ///
    pub fn set_motor_pwm(&self, tool: u8, motor: MotorSelect, pwm: u8) -> Result<(), CommandError> {
        self.run_tool_ok(MasterCommand::ToolCommand, tool, motor.pwm_command(), &[pwm])
    }

    ///
    /// Sets `motor`'s rotation direction on `tool`. `true` is clockwise.
    ///
    pub fn set_motor_direction(&self, tool: u8, motor: MotorSelect, clockwise: bool) -> Result<(), CommandError> {
        self.run_tool_ok(MasterCommand::ToolCommand, tool, motor.dir_command(), &[clockwise as u8])
    }

    ///
    /// Toggles `motor` on `tool`. Bit 0 of `flags` is "enabled"; bit 1 is direction
    /// (1 = clockwise).
    ///
    pub fn toggle_motor(&self, tool: u8, motor: MotorSelect, flags: u8) -> Result<(), CommandError> {
        self.run_tool_ok(MasterCommand::ToolCommand, tool, motor.toggle_command(), &[flags])
    }

    ///
    /// # Returns:
    /// - `motor`'s current speed on `tool`, converted back from microseconds per pulse
    ///
    pub fn get_motor_rpm(&self, tool: u8, motor: MotorSelect) -> Result<u32, CommandError> {
        let mut response = self.run_tool(MasterCommand::ToolQuery, tool, motor.get_rpm_command(), &[])?;
        let micros = response.get_u32();
        Ok(micros_to_rpm(micros))
    }

    ///
    /// # Returns:
    /// - `motor`'s current PWM duty cycle on `tool`
    ///
    pub fn get_motor_pwm(&self, tool: u8, motor: MotorSelect) -> Result<u8, CommandError> {
        let mut response = self.run_tool(MasterCommand::ToolQuery, tool, motor.get_pwm_command(), &[])?;
        Ok(response.get_u8())
    }

    ///
    /// Disables the toolhead's spindle. Toggles `TOGGLE_MOTOR_2`; a historical
    /// implementation toggled `TOGGLE_MOTOR_1` here, which looked like a copy/paste
    /// bug against the rest of the spindle-control surface.
    ///
    pub fn disable_spindle(&self, tool: u8) -> Result<(), CommandError> {
        self.toggle_motor(tool, MotorSelect::Two, 0x00)
    }

    ///
    /// Turns `tool`'s cooling fan on or off.
    ///
    pub fn toggle_fan(&self, tool: u8, on: bool) -> Result<(), CommandError> {
        self.run_tool_ok(MasterCommand::ToolCommand, tool, SlaveCommand::ToggleFan, &[on as u8])
    }

    ///
    /// Opens or closes `tool`'s valve.
    ///
    pub fn toggle_valve(&self, tool: u8, open: bool) -> Result<(), CommandError> {
        self.run_tool_ok(MasterCommand::ToolCommand, tool, SlaveCommand::ToggleValve, &[open as u8])
    }

    ///
    /// Sets one of `tool`'s two servos to `pos`.
    ///
    pub fn set_servo_pos(&self, tool: u8, servo: u8, pos: u8) -> Result<(), CommandError> {
        let sub = match servo {
            1 => SlaveCommand::SetServo1Pos,
            _ => SlaveCommand::SetServo2Pos,
        };
        self.run_tool_ok(MasterCommand::ToolCommand, tool, sub, &[pos])
    }

    ///
    /// # Returns:
    /// - `tool`'s filament sensor status byte
    ///
    pub fn filament_status(&self, tool: u8) -> Result<u8, CommandError> {
        let mut response = self.run_tool(MasterCommand::ToolQuery, tool, SlaveCommand::FilamentStatus, &[])?;
        Ok(response.get_u8())
    }

    ///
    /// Selects `tool` as the active toolhead.
    ///
    pub fn select_tool(&self, tool: u8) -> Result<(), CommandError> {
        self.run_tool_ok(MasterCommand::ToolCommand, tool, SlaveCommand::SelectTool, &[])
    }

    ///
    /// # Returns:
    /// - Whether `tool` reports itself ready (e.g. up to temperature)
    ///
    pub fn is_tool_ready(&self, tool: u8) -> Result<bool, CommandError> {
        let mut response = self.run_tool(MasterCommand::ToolQuery, tool, SlaveCommand::IsToolReady, &[])?;
        Ok(response.get_u8() != 0)
    }
}

fn micros_to_rpm(micros: u32) -> u32 {
    if micros == 0 {
        return 0;
    }

    let rpm = (60_000_000u64 + micros as u64 / 2) / micros as u64;
    rpm.min(u32::MAX as u64) as u32
}
