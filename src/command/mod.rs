//!
//! Typed master-command builders and parsers, and the `CommandLayer` surface the
//! motion/tool subsystems drive.
//!

pub mod error;
pub mod tool;

use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{ByteOrder, LittleEndian};

use crate::transport::response::{Response, ResponseCode};
use crate::transport::Transport;

use error::CommandError;

///
/// Checks a response's code before a caller trusts its payload. `Ok` passes the
/// response through; `Unsupported` and anything else (CRC_MISMATCH, QUERY_OVERFLOW)
/// become errors instead of being parsed as if they carried an OK-shaped payload.
/// BufferOverflow/GenericError/Unknown never reach here — `Transport::run_command`
/// already resolves those to a retry or a `TransportError`.
///
fn check_response(response: Response) -> Result<Response, CommandError> {
    match response.code() {
        ResponseCode::Ok => Ok(response),
        ResponseCode::Unsupported => Err(CommandError::Unsupported),
        other => Err(CommandError::UnexpectedResponse { code: other }),
    }
}

/// Master command byte values, addressed directly to the motion controller.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterCommand {
    Version = 0,
    Init = 1,
    GetBufferSize = 2,
    ClearBuffer = 3,
    GetPosition = 4,
    GetRange = 5,
    SetRange = 6,
    Abort = 7,
    Pause = 8,
    Probe = 9,
    ToolQuery = 10,
    IsFinished = 11,
    QueuePointAbs = 129,
    SetPosition = 130,
    FindAxesMinimum = 131,
    FindAxesMaximum = 132,
    Delay = 133,
    ChangeTool = 134,
    WaitForTool = 135,
    ToolCommand = 136,
    EnableAxes = 137,
}

/// Axis bitmap used by `enable_axes`/`find_axes_minimum`/`find_axes_maximum`.
pub mod axis {
    pub const X: u8 = 0x01;
    pub const Y: u8 = 0x02;
    pub const Z: u8 = 0x04;
    /// Set alongside the axis bits to request "enable" rather than "disable".
    pub const ENABLE: u8 = 0x80;
}

/// Default homing timeout, in seconds, used by `find_axes_minimum`/`find_axes_maximum`.
pub const DEFAULT_HOMING_TIMEOUT_S: u16 = 300;

///
/// Typed command builders/parsers sitting on top of a `Transport`. Tracks a small
/// amount of host-side state: pause parity, and whether the one-time `is_finished`
/// UNSUPPORTED notice has already been logged.
///
/// # Fields:
/// - `transport`: The underlying request/response transport
/// - `paused`: Host's best guess at device pause state, since PAUSE toggles
/// - `is_finished_unsupported_logged`: Guards the one-time UNSUPPORTED warning for `is_finished`
///
pub struct CommandLayer {
    transport: Transport,
    paused: AtomicBool,
    is_finished_unsupported_logged: AtomicBool,
}

impl CommandLayer {
    ///
    /// Wraps a `Transport`, ready to issue typed commands.
    ///
    pub fn new(transport: Transport) -> CommandLayer {
        CommandLayer { transport, paused: AtomicBool::new(false), is_finished_unsupported_logged: AtomicBool::new(false) }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn run_ok(&self, payload: &[u8]) -> Result<(), CommandError> {
        let response = self.transport.run_command(payload)?;
        check_response(response)?;
        Ok(())
    }

    ///
    /// Queues an absolute linear move to `(sx, sy, sz)` in steps, pacing the dominant
    /// axis with an inter-step delay of `dda_micros` microseconds.
    ///
    pub fn queue_absolute_point(&self, sx: i32, sy: i32, sz: i32, dda_micros: u32) -> Result<(), CommandError> {
        let mut payload = vec![MasterCommand::QueuePointAbs as u8];
        let mut args = [0u8; 16];
        LittleEndian::write_i32(&mut args[0..4], sx);
        LittleEndian::write_i32(&mut args[4..8], sy);
        LittleEndian::write_i32(&mut args[8..12], sz);
        LittleEndian::write_i32(&mut args[12..16], dda_micros as i32);
        payload.extend_from_slice(&args);

        self.run_ok(&payload)
    }

    ///
    /// Overwrites the master's current step position without moving the motors.
    ///
    pub fn set_position(&self, sx: i32, sy: i32, sz: i32) -> Result<(), CommandError> {
        let mut payload = vec![MasterCommand::SetPosition as u8];
        let mut args = [0u8; 12];
        LittleEndian::write_i32(&mut args[0..4], sx);
        LittleEndian::write_i32(&mut args[4..8], sy);
        LittleEndian::write_i32(&mut args[8..12], sz);
        payload.extend_from_slice(&args);

        self.run_ok(&payload)
    }

    ///
    /// Homes the axes named in `flags` (bit0=X, bit1=Y, bit2=Z) towards their minimum,
    /// stepping at `micros` microseconds per step, giving up after `timeout_s` seconds.
    ///
    pub fn find_axes_minimum(&self, flags: u8, micros: u32, timeout_s: u16) -> Result<(), CommandError> {
        self.find_axes(MasterCommand::FindAxesMinimum, flags, micros, timeout_s)
    }

    ///
    /// As `find_axes_minimum`, but homes towards the maximum.
    ///
    pub fn find_axes_maximum(&self, flags: u8, micros: u32, timeout_s: u16) -> Result<(), CommandError> {
        self.find_axes(MasterCommand::FindAxesMaximum, flags, micros, timeout_s)
    }

    fn find_axes(&self, command: MasterCommand, flags: u8, micros: u32, timeout_s: u16) -> Result<(), CommandError> {
        let mut payload = vec![command as u8, flags];
        let mut args = [0u8; 6];
        LittleEndian::write_u32(&mut args[0..4], micros);
        LittleEndian::write_u16(&mut args[4..6], timeout_s);
        payload.extend_from_slice(&args);

        self.run_ok(&payload)
    }

    ///
    /// Pauses the motion queue for `ms` milliseconds without blocking the host.
    ///
    pub fn delay(&self, ms: u32) -> Result<(), CommandError> {
        let mut payload = vec![MasterCommand::Delay as u8, 0, 0, 0, 0];
        LittleEndian::write_u32(&mut payload[1..5], ms);
        self.run_ok(&payload)
    }

    ///
    /// Enables or disables the axes named in `mask`. Bit 7 set means "enable"; bits
    /// 0..2 select X/Y/Z. `0x87` enables X/Y/Z, `0x07` disables them.
    ///
    pub fn enable_axes(&self, mask: u8) -> Result<(), CommandError> {
        self.run_ok(&[MasterCommand::EnableAxes as u8, mask])
    }

    fn toggle_pause(&self) -> Result<(), CommandError> {
        self.run_ok(&[MasterCommand::Pause as u8])
    }

    ///
    /// Pauses the motion queue. PAUSE is a toggle on the device; if the host already
    /// believes it is paused, this call would actually resume the device, so it is
    /// logged loudly rather than silently sent.
    ///
    pub fn pause(&self) -> Result<(), CommandError> {
        if self.paused.swap(true, Ordering::SeqCst) {
            log::warn!("pause() called while host already believes the device is paused; PAUSE will resume it instead");
        }
        self.toggle_pause()
    }

    ///
    /// Resumes the motion queue. See `pause` for the toggle-parity caveat.
    ///
    pub fn unpause(&self) -> Result<(), CommandError> {
        if !self.paused.swap(false, Ordering::SeqCst) {
            log::warn!("unpause() called while host already believes the device is running; PAUSE will pause it instead");
        }
        self.toggle_pause()
    }

    ///
    /// Switches the active tool to `idx`.
    ///
    pub fn change_tool(&self, idx: u8) -> Result<(), CommandError> {
        self.run_ok(&[MasterCommand::ChangeTool as u8, idx])
    }

    ///
    /// Blocks the master's command queue until tool `idx` reports ready, pinging it
    /// every `ping_ms` milliseconds, giving up after `timeout_s` seconds.
    ///
    pub fn wait_for_tool(&self, idx: u8, ping_ms: u16, timeout_s: u16) -> Result<(), CommandError> {
        let mut payload = vec![MasterCommand::WaitForTool as u8, idx, 0, 0, 0, 0];
        LittleEndian::write_u16(&mut payload[2..4], ping_ms);
        LittleEndian::write_u16(&mut payload[4..6], timeout_s);
        self.run_ok(&payload)
    }

    ///
    /// Reports whether the motion queue has drained. Devices that don't implement
    /// IS_FINISHED reply UNSUPPORTED; this is swallowed as `true` and logged once.
    ///
    pub fn is_finished(&self) -> Result<bool, CommandError> {
        let response = self.transport.run_command(&[MasterCommand::IsFinished as u8])?;

        match response.code() {
            ResponseCode::Unsupported => {
                if !self.is_finished_unsupported_logged.swap(true, Ordering::SeqCst) {
                    log::warn!("device does not support IS_FINISHED; assuming finished from now on");
                }
                Ok(true)
            }
            ResponseCode::Ok => {
                let mut response = response;
                Ok(response.get_u8() != 0)
            }
            other => Err(CommandError::UnexpectedResponse { code: other }),
        }
    }

    ///
    /// Immediately aborts the motion queue and any in-progress move.
    ///
    pub fn abort(&self) -> Result<(), CommandError> {
        self.run_ok(&[MasterCommand::Abort as u8])
    }

    ///
    /// Probes towards the configured probe axis, returning the step position where
    /// the probe triggered.
    ///
    pub fn probe(&self) -> Result<(i32, i32, i32), CommandError> {
        let response = self.transport.run_command(&[MasterCommand::Probe as u8])?;
        let mut response = check_response(response)?;
        Ok((response.get_i32(), response.get_i32(), response.get_i32()))
    }

    ///
    /// # Returns:
    /// - The current `(x, y, z)` step position reported by the master
    ///
    pub fn get_position(&self) -> Result<(i32, i32, i32), CommandError> {
        let response = self.transport.run_command(&[MasterCommand::GetPosition as u8])?;
        let mut response = check_response(response)?;
        Ok((response.get_i32(), response.get_i32(), response.get_i32()))
    }

    ///
    /// # Returns:
    /// - The `(min, max)` travel range configured for `axis`, in steps
    ///
    pub fn get_range(&self, axis: u8) -> Result<(i32, i32), CommandError> {
        let response = self.transport.run_command(&[MasterCommand::GetRange as u8, axis])?;
        let mut response = check_response(response)?;
        Ok((response.get_i32(), response.get_i32()))
    }

    ///
    /// Sets the `(min, max)` travel range for `axis`, in steps.
    ///
    pub fn set_range(&self, axis: u8, min: i32, max: i32) -> Result<(), CommandError> {
        let mut payload = vec![MasterCommand::SetRange as u8, axis, 0, 0, 0, 0, 0, 0, 0, 0];
        LittleEndian::write_i32(&mut payload[2..6], min);
        LittleEndian::write_i32(&mut payload[6..10], max);
        self.run_ok(&payload)
    }

    ///
    /// # Returns:
    /// - The number of free slots in the master's move queue
    ///
    pub fn get_buffer_size(&self) -> Result<u32, CommandError> {
        let response = self.transport.run_command(&[MasterCommand::GetBufferSize as u8])?;
        let mut response = check_response(response)?;
        Ok(response.get_u32())
    }

    ///
    /// Discards any queued but not yet executed moves.
    ///
    pub fn clear_buffer(&self) -> Result<(), CommandError> {
        self.run_ok(&[MasterCommand::ClearBuffer as u8])
    }

    ///
    /// Sends the VERSION request with the given host protocol version.
    ///
    /// # Returns:
    /// - `Some(version_code)` if the device replied OK with a non-zero version
    /// - `None` if the device replied but reported version 0 (not yet booted)
    ///
    pub fn version(&self, host_protocol_version: u16) -> Result<Option<u16>, CommandError> {
        let mut payload = vec![MasterCommand::Version as u8, 0, 0];
        LittleEndian::write_u16(&mut payload[1..3], host_protocol_version);

        let response = self.transport.run_command(&payload)?;
        let mut response = check_response(response)?;
        let version_code = response.get_u16();

        Ok(if version_code == 0 { None } else { Some(version_code) })
    }

    ///
    /// Sends the INIT request, completing the startup handshake.
    ///
    pub fn init(&self) -> Result<(), CommandError> {
        self.run_ok(&[MasterCommand::Init as u8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::link::mock::MockPort;
    use crate::link::SerialLink;

    fn layer_with(mock: MockPort) -> CommandLayer {
        let link = SerialLink::from_port(Box::new(mock));
        link.set_timeout(500);
        CommandLayer::new(Transport::new(link, 25))
    }

    #[test]
    fn delay_encodes_little_endian_ms() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x81]).unwrap());
        let layer = layer_with(mock.clone());

        layer.delay(1000).unwrap();
        assert_eq!(mock.writes(), vec![codec::encode(&[133, 0xE8, 0x03, 0x00, 0x00]).unwrap()]);
    }

    #[test]
    fn enable_axes_xyz_matches_scenario() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x81]).unwrap());
        let layer = layer_with(mock.clone());

        layer.enable_axes(0x87).unwrap();
        assert_eq!(mock.writes(), vec![codec::encode(&[137, 0x87]).unwrap()]);
    }

    #[test]
    fn is_finished_swallows_unsupported_as_true_and_logs_once() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x85, 0x00]).unwrap());
        mock.push_inbound(&codec::encode(&[0x85, 0x00]).unwrap());
        let layer = layer_with(mock);

        assert_eq!(layer.is_finished().unwrap(), true);
        assert_eq!(layer.is_finished().unwrap(), true);
        assert!(layer.is_finished_unsupported_logged.load(Ordering::SeqCst));
    }

    #[test]
    fn pause_then_pause_again_warns_but_still_sends_toggle() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x81]).unwrap());
        mock.push_inbound(&codec::encode(&[0x81]).unwrap());
        let layer = layer_with(mock.clone());

        layer.pause().unwrap();
        layer.pause().unwrap();
        assert_eq!(mock.writes().len(), 2);
        assert!(mock.writes().iter().all(|w| *w == codec::encode(&[8]).unwrap()));
    }

    #[test]
    fn version_zero_means_not_booted() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x81, 0x00, 0x00]).unwrap());
        let layer = layer_with(mock);

        assert_eq!(layer.version(100).unwrap(), None);
    }

    #[test]
    fn version_scenario_from_spec() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x81, 0x65, 0x00]).unwrap());
        let layer = layer_with(mock.clone());

        let version_code = layer.version(100).unwrap().unwrap();
        assert_eq!(version_code, 101);
        assert_eq!(mock.writes(), vec![vec![0xD5, 0x03, 0x00, 0x64, 0x00, 0xCB]]);
    }

    #[test]
    fn get_position_returns_unsupported_instead_of_panicking_on_short_payload() {
        let mock = MockPort::new();
        // UNSUPPORTED carries no position payload at all; the old code would have
        // tried to read three i32s out of an empty buffer and panicked.
        mock.push_inbound(&codec::encode(&[0x85]).unwrap());
        let layer = layer_with(mock);

        let err = layer.get_position().unwrap_err();
        assert!(matches!(err, CommandError::Unsupported));
    }

    #[test]
    fn get_range_returns_unexpected_response_on_device_crc_mismatch_instead_of_panicking() {
        let mock = MockPort::new();
        // a device-reported CRC_MISMATCH is not required to carry an OK-shaped payload.
        mock.push_inbound(&codec::encode(&[0x83]).unwrap());
        let layer = layer_with(mock);

        let err = layer.get_range(axis::X).unwrap_err();
        assert!(matches!(err, CommandError::UnexpectedResponse { code: ResponseCode::CrcMismatch }));
    }
}
