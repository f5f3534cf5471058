//! # robotiq-rtu
//!
//! `robotiq-rtu` is a synchronous driver for Robotiq two-finger grippers
//! (2F-85, 2F-140, Hand-E) connected over a USB/RS485 adapter speaking
//! Modbus RTU.
//!
//! The driver covers the full control cycle of the gripper:
//! - port auto-detection among all serial ports visible to the platform,
//! - reset / activation with a bounded wait,
//! - position commands with object-detection short-circuit,
//! - millimetre positioning through a two-point linear calibration,
//! - decoding of the status registers into named fields with
//!   human-readable descriptions for diagnostics.
//!
//! All calls block the current thread. Each register exchange is bounded by
//! [`RESPONSE_TIMEOUT`] and each activation or motion wait by the
//! configurable action timeout (default [`ACTION_TIMEOUT`]). There is no
//! background poller and no cancellation besides the timeout expiring; a
//! gripper instance must not be shared between threads without external
//! serialization.
//!
//! ## Example
//! ```no_run
//! use robotiq_rtu::{RobotiqError, RobotiqGripper};
//!
//! fn main() -> Result<(), RobotiqError> {
//!     // Probe every serial port and keep the one that answers like a
//!     // gripper. Pass an explicit path with `from_path` to skip probing.
//!     let mut gripper = RobotiqGripper::auto()?;
//!
//!     // Clear any previous activation, then run the activation routine.
//!     // The gripper fully opens and closes during activation, keep it clear.
//!     gripper.reset_activate()?;
//!
//!     // Close at full speed and force; returns where the fingers stopped
//!     // and whether they stopped on an object.
//!     let (position, object_detected) = gripper.close(255, 255)?;
//!     println!("stopped at {position}/255, object: {object_detected}");
//!
//!     // Teach the tick<->mm mapping: fingers touch at 0 mm, fully open
//!     // is 36 mm. The gripper runs a full open/close cycle.
//!     gripper.calibrate(0.0, 36.0)?;
//!     gripper.go_to_mm(10.0, 255, 255)?;
//!     println!("opening: {:.1} mm", gripper.get_position_mm()?);
//!
//!     Ok(())
//! }
//! ```

use num::FromPrimitive;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_modbus::client::sync::{self as sync_client, Reader, Writer};
use tokio_modbus::prelude::Slave;
use tokio_serial::{DataBits, Parity, StopBits};
use tracing::debug;

/// Flag for `rACT` and `gACT`
static FLAG_ACT: u8 = 1 << 0;
/// Flag for `rGTO` and `gGTO`
static FLAG_GTO: u8 = 1 << 3;

/// Baud rate used by every Robotiq RS485 gripper.
pub const BAUD_RATE: u32 = 115_200;
/// Serial line data bits.
pub const DATA_BITS: DataBits = DataBits::Eight;
/// Serial line parity.
pub const PARITY: Parity = Parity::None;
/// Serial line stop bits.
pub const STOP_BITS: StopBits = StopBits::One;
/// Bound on a single register read/write exchange.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);
/// Default bound on a complete activation or motion.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// First register of the 3-word command block.
pub const COMMAND_REGISTER: u16 = 1000;
/// First register of the 3-word status block.
pub const STATUS_REGISTER: u16 = 2000;
/// Both blocks are exchanged as 3 consecutive 16-bit words.
pub const BLOCK_WORDS: u16 = 3;

/// Target position written while probing a candidate port during
/// auto-detection. A genuine gripper echoes it back in the status block.
pub const PROBE_POSITION: u8 = 100;

/// The gripper's activation status (`gSTA`).
#[repr(u8)]
#[derive(Debug, Clone, FromPrimitive, PartialEq, Serialize, Deserialize)]
pub enum ActivationStatus {
    /// Gripper is in reset state. See the fault status if the gripper is activated.
    InReset,
    /// Activation in progress.
    InProgress,
    /// Not used.
    NotUsed,
    /// Activation is completed.
    Completed,
}

/// Object detection status (`gOBJ`), a built-in feature that provides
/// information on possible object pick-up. Ignore if `gGTO == 0`.
#[repr(u8)]
#[derive(Debug, Clone, FromPrimitive, PartialEq, Serialize, Deserialize)]
pub enum ObjDetectStatus {
    /// Fingers are in motion towards the requested position. No object detected.
    InMotion,
    /// Fingers have stopped due to a contact while opening before the
    /// requested position. Object detected opening.
    DetectedOpen,
    /// Fingers have stopped due to a contact while closing before the
    /// requested position. Object detected closing.
    DetectedClose,
    /// Fingers are at the requested position. No object detected or the
    /// object has been lost / dropped.
    NoObject,
}

impl ObjDetectStatus {
    pub fn detected_obj(&self) -> bool {
        matches!(
            self,
            ObjDetectStatus::DetectedOpen | ObjDetectStatus::DetectedClose
        )
    }
}

/// Fault status (`gFLT`), general error messages useful for troubleshooting.
/// A fault LED (red) is present on the gripper chassis; it can be blue, red
/// or both, solid or blinking.
#[repr(u8)]
#[derive(Debug, Clone, FromPrimitive, PartialEq, Error, Serialize, Deserialize)]
pub enum GripperFault {
    /// No fault (solid blue LED)
    NoFault = 0x00,

    /// Action delayed; the activation (re-activation) must be completed prior to the action
    ActionDelay = 0x05,
    /// The activation bit must be set prior to the action
    NotActivated = 0x07,

    /// Maximum operating temperature exceeded, wait for cool-down
    OverHeated = 0x08,
    /// No communication during at least 1 second
    NoComm = 0x09,

    /// Under minimum operating voltage
    UnderVoltage = 0x0A,
    /// Automatic release in progress
    Releasing = 0x0B,
    /// Internal fault; contact support@robotiq.com
    InternalFault = 0x0C,
    /// Activation fault, verify that no interference or other error occurred
    ActivationFault = 0x0D,
    /// Overcurrent triggered
    OverCurrent = 0x0E,
    /// Automatic release completed
    AutomaticReleaseCompleted = 0x0F,
}

impl GripperFault {
    /// For major faults (LED blinking red/blue) a reset is required
    /// (rising edge on the activation bit `rACT`).
    pub fn reset_required(&self) -> bool {
        self.clone() as u8 >= 0x0A
    }
}

impl std::fmt::Display for GripperFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The named fields of the status block, in register order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusField {
    ObjectDetection,
    GripperState,
    GoToEcho,
    ActivationEcho,
    ControllerFault,
    Fault,
    PositionRequestEcho,
    Position,
    Current,
}

impl StatusField {
    pub const ALL: [StatusField; 9] = [
        StatusField::ObjectDetection,
        StatusField::GripperState,
        StatusField::GoToEcho,
        StatusField::ActivationEcho,
        StatusField::ControllerFault,
        StatusField::Fault,
        StatusField::PositionRequestEcho,
        StatusField::Position,
        StatusField::Current,
    ];

    /// The register mnemonic used in the Robotiq manuals.
    pub fn register_name(self) -> &'static str {
        match self {
            StatusField::ObjectDetection => "gOBJ",
            StatusField::GripperState => "gSTA",
            StatusField::GoToEcho => "gGTO",
            StatusField::ActivationEcho => "gACT",
            StatusField::ControllerFault => "kFLT",
            StatusField::Fault => "gFLT",
            StatusField::PositionRequestEcho => "gPR",
            StatusField::Position => "gPO",
            StatusField::Current => "gCU",
        }
    }
}

/// Human-readable description of one status field value, as printed in the
/// Robotiq register documentation. Accepts any `u8`; values with no specific
/// narrative get a generic text. Diagnostic only, not used by control logic.
pub fn describe_register(field: StatusField, value: u8) -> String {
    match field {
        StatusField::ObjectDetection => match value {
            0 => "Fingers are in motion towards requested position. No object detected.".into(),
            1 => "Fingers have stopped due to a contact while opening before requested position. Object detected opening.".into(),
            2 => "Fingers have stopped due to a contact while closing before requested position. Object detected closing.".into(),
            3 => "Fingers are at requested position. No object detected or object has been lost / dropped.".into(),
            v => format!("Unknown object detection status {v}."),
        },
        StatusField::GripperState => match value {
            0 => "Gripper is in reset (or automatic release) state. See fault status if gripper is activated.".into(),
            1 => "Activation in progress.".into(),
            2 => "Not used.".into(),
            3 => "Activation is completed.".into(),
            v => format!("Unknown gripper state {v}."),
        },
        StatusField::GoToEcho => match value {
            0 => "Stopped (or performing activation / automatic release).".into(),
            1 => "Go to position request.".into(),
            v => format!("Unknown go to status {v}."),
        },
        StatusField::ActivationEcho => match value {
            0 => "Gripper reset.".into(),
            1 => "Gripper activation.".into(),
            v => format!("Unknown activation status {v}."),
        },
        StatusField::ControllerFault => {
            format!("Optional controller fault code {value}; see the controller manual.")
        }
        StatusField::Fault => match value {
            0 => "No fault (LED is blue).".into(),
            5 => "Priority fault (LED is blue). Action delayed, activation (reactivation) must be completed prior to performing the action.".into(),
            7 => "Priority fault (LED is blue). The activation bit must be set prior to action.".into(),
            8 => "Minor fault (LED continuous red). Maximum operating temperature exceeded, wait for cool-down.".into(),
            9 => "Minor fault (LED continuous red). No communication during at least 1 second.".into(),
            10 => "Major fault (LED blinking red/blue), reset required. Under minimum operating voltage.".into(),
            11 => "Major fault (LED blinking red/blue), reset required. Automatic release in progress.".into(),
            12 => "Major fault (LED blinking red/blue), reset required. Internal fault; contact support@robotiq.com.".into(),
            13 => "Major fault (LED blinking red/blue), reset required. Activation fault, verify that no interference or other error occurred.".into(),
            14 => "Major fault (LED blinking red/blue), reset required. Overcurrent triggered.".into(),
            15 => "Major fault (LED blinking red/blue), reset required. Automatic release completed.".into(),
            v => format!("Reserved fault code {v}."),
        },
        StatusField::PositionRequestEcho => {
            format!("Echo of the requested position for the gripper: {value}/255.")
        }
        StatusField::Position => {
            format!("Actual position of the gripper obtained via the encoders: {value}/255.")
        }
        StatusField::Current => {
            format!(
                "The current is read instantaneously from the motor drive, approximate current: {} mA.",
                u32::from(value) * 10
            )
        }
    }
}

/// Robot input / status of the gripper.
///
/// Decoded from the 3 words read at register [`STATUS_REGISTER`]. Every field
/// is derived solely from the most recent read; nothing persists across reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GripperStatus {
    /// Activation status, echo of the `rACT` bit (activation bit).
    pub act: bool,
    /// Action status, echo of the `rGTO` bit (go to bit).
    pub gto: bool,
    /// Gripper status, the current state of the activation sequence.
    pub sta: ActivationStatus,
    /// Object detection status. Ignore if `gto == false`.
    pub obj: ObjDetectStatus,
    /// Fault status, general error messages useful for troubleshooting.
    /// Reserved codes decode as [`GripperFault::NoFault`]; `fault_code`
    /// keeps the nibble as sent.
    pub fault: GripperFault,
    /// Raw `gFLT` nibble as sent by the device, between `0x0` and `0xF`.
    pub fault_code: u8,
    /// Optional controller fault nibble (`kFLT`), the upper 4 bits of the
    /// fault byte. See the optional controller manual.
    pub k_flt: u8,
    /// Echo of the requested position, between `0x00` and `0xFF`.
    pub pos_req: u8,
    /// Actual position obtained via the encoders, between `0x00` (fully open)
    /// and `0xFF` (fully closed).
    pub pos: u8,
    /// Instantaneous motor drive current, between `0x00` and `0xFF`.
    /// Approximate current equivalent is `10 * current` in mA.
    pub current: u8,
}

impl GripperStatus {
    /// Decode the 3-word status block.
    ///
    /// Word 0 packs the gripper status byte in its high byte; word 1 carries
    /// the fault byte (high) and the position request echo (low); word 2
    /// carries the position (high) and the motor current (low).
    pub fn from_words(words: [u16; 3]) -> Self {
        let [status, _reserved] = words[0].to_be_bytes();
        let [fault_byte, pos_req] = words[1].to_be_bytes();
        let [pos, current] = words[2].to_be_bytes();

        let act = status & FLAG_ACT != 0;
        let gto = status & FLAG_GTO != 0;
        // 2-bit fields, from_u8 cannot fail after masking.
        let sta = ActivationStatus::from_u8((status >> 4) & 0b11).unwrap();
        let obj = ObjDetectStatus::from_u8((status >> 6) & 0b11).unwrap();
        let k_flt = (fault_byte >> 4) & 0x0F;
        let fault_code = fault_byte & 0x0F;
        // Codes 1-4 and 6 are not assigned by the device.
        let fault = GripperFault::from_u8(fault_code).unwrap_or(GripperFault::NoFault);

        GripperStatus {
            act,
            gto,
            sta,
            obj,
            fault,
            fault_code,
            k_flt,
            pos_req,
            pos,
            current,
        }
    }

    /// Approximate motor current in mA (`10 * current`).
    pub fn current_ma(&self) -> u32 {
        u32::from(self.current) * 10
    }

    /// The raw register value behind one named field.
    pub fn raw(&self, field: StatusField) -> u8 {
        match field {
            StatusField::ObjectDetection => self.obj.clone() as u8,
            StatusField::GripperState => self.sta.clone() as u8,
            StatusField::GoToEcho => self.gto as u8,
            StatusField::ActivationEcho => self.act as u8,
            StatusField::ControllerFault => self.k_flt,
            StatusField::Fault => self.fault_code,
            StatusField::PositionRequestEcho => self.pos_req,
            StatusField::Position => self.pos,
            StatusField::Current => self.current,
        }
    }

    /// Every field with its raw value and its documented description,
    /// in register order.
    pub fn describe(&self) -> Vec<(StatusField, u8, String)> {
        StatusField::ALL
            .iter()
            .map(|&field| {
                let value = self.raw(field);
                (field, value, describe_register(field, value))
            })
            .collect()
    }
}

impl From<[u16; 3]> for GripperStatus {
    fn from(words: [u16; 3]) -> Self {
        GripperStatus::from_words(words)
    }
}

/// Robot output / functionalities.
///
/// Written as 3 words to register [`COMMAND_REGISTER`].
///
/// ## Reset
/// A command with `act = false` (the default) resets the gripper and clears
/// any fault.
///
/// ## Activation
/// A command with `act = true` starts the activation routine; the gripper
/// fully opens and closes. `act` must remain `true` in all following
/// commands, otherwise the gripper resets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GripperCommand {
    /// `rACT`, the activation bit. Must be set before any other action and
    /// stay set afterwards; clearing it resets the gripper and clears faults.
    /// The device acts on the rising edge of this bit.
    pub act: bool,
    /// `rGTO`, the go to bit. Engages motion towards `pos_req` with the
    /// configured speed and force. The only motions performed without it are
    /// the activation routines.
    pub gto: bool,
    /// `rPR`, the target position for the fingers. `0x00` is the fully
    /// opened mechanical stop, `0xFF` the fully closed one, quasi-linear
    /// in between regardless of the fingertips installed.
    pub pos_req: u8,
    /// `rSP`, closing/opening speed from `0x00` (minimum) to `0xFF` (maximum).
    /// Setting a speed does not initiate a motion.
    pub speed: u8,
    /// `rFR`, final gripping force from `0x00` (minimum) to `0xFF` (maximum).
    /// The force fixes the maximum motor current; exceeding it stops the
    /// fingers and raises an object detection notification.
    pub force: u8,
}

impl GripperCommand {
    /// Create a new default (all-zero, reset) command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the activation bit `rACT`.
    pub fn act(mut self, b: bool) -> Self {
        self.act = b;
        self
    }
    /// Set the go to bit `rGTO`.
    pub fn gto(mut self, b: bool) -> Self {
        self.gto = b;
        self
    }
    /// Set the target position `rPR`, `0x00` open to `0xFF` closed.
    pub fn pos_req(mut self, b: u8) -> Self {
        self.pos_req = b;
        self
    }
    /// Set the speed `rSP`.
    pub fn speed(mut self, b: u8) -> Self {
        self.speed = b;
        self
    }
    /// Set the force `rFR`.
    pub fn force(mut self, b: u8) -> Self {
        self.force = b;
        self
    }

    /// Pack the command into the 3-word register block. The unused action
    /// bits of the high byte of word 0 stay zero.
    pub fn to_array(&self) -> [u16; 3] {
        let mut req = 0;

        if self.act {
            req |= FLAG_ACT;
        }
        if self.gto {
            req |= FLAG_GTO;
        }

        [
            u16::from_be_bytes([req, 0]),
            u16::from_be_bytes([0, self.pos_req]),
            u16::from_be_bytes([self.speed, self.force]),
        ]
    }
}

/// The narrow transport capability the driver needs: a raw 16-bit register
/// exchange. Implemented by [`RtuTransport`] for real hardware and by
/// scripted fakes in tests.
pub trait RegisterIo {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, RobotiqError>;
    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), RobotiqError>;
}

/// Modbus RTU register transport over a serial port, using the synchronous
/// tokio-modbus client. Dropping it closes the port.
pub struct RtuTransport {
    ctx: sync_client::Context,
}

impl RtuTransport {
    /// Open `path` with the fixed gripper line parameters
    /// (115200 baud, 8 data bits, no parity, 1 stop bit) and attach the
    /// Modbus slave, bounding every exchange by [`RESPONSE_TIMEOUT`].
    pub fn open(path: &str, slave_id: u8) -> Result<Self, RobotiqError> {
        let builder = tokio_serial::new(path, BAUD_RATE)
            .data_bits(DATA_BITS)
            .parity(PARITY)
            .stop_bits(STOP_BITS);

        let ctx = sync_client::rtu::connect_slave_with_timeout(
            &builder,
            Slave(slave_id),
            Some(RESPONSE_TIMEOUT),
        )?;

        Ok(Self { ctx })
    }
}

impl RegisterIo for RtuTransport {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, RobotiqError> {
        Ok(self.ctx.read_holding_registers(address, count)??)
    }

    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), RobotiqError> {
        Ok(self.ctx.write_multiple_registers(address, words)??)
    }
}

/// One probe exchange against an already-open candidate transport: request
/// position [`PROBE_POSITION`] and check whether the status block echoes it.
fn probe(io: &mut impl RegisterIo) -> Result<bool, RobotiqError> {
    io.write_registers(COMMAND_REGISTER, &[0, u16::from(PROBE_POSITION), 0])?;
    let words = io.read_registers(STATUS_REGISTER, BLOCK_WORDS)?;
    Ok(words.get(1).map(|w| w & 0x00FF) == Some(u16::from(PROBE_POSITION)))
}

/// Walk `candidates` in order, probing each through `connect`. The first
/// candidate whose echo matches wins; its probe session is dropped before the
/// name is returned. Every failure only disqualifies that candidate.
fn detect_among<T, F>(
    candidates: impl IntoIterator<Item = String>,
    mut connect: F,
) -> Result<String, RobotiqError>
where
    T: RegisterIo,
    F: FnMut(&str) -> Result<T, RobotiqError>,
{
    for name in candidates {
        match connect(&name).and_then(|mut io| probe(&mut io)) {
            Ok(true) => {
                debug!(port = %name, "gripper echoed the probe position");
                return Ok(name);
            }
            Ok(false) => debug!(port = %name, "candidate did not echo the probe position"),
            Err(err) => debug!(port = %name, error = %err, "skipping candidate"),
        }
    }
    Err(RobotiqError::NoDeviceFound)
}

/// Find the serial port hosting the gripper.
///
/// Enumerates the platform's serial ports in reported order and probes each
/// with a short-lived connection. Returns the name of the first port whose
/// status block echoes the probe, or [`RobotiqError::NoDeviceFound`] once all
/// candidates are exhausted.
///
/// ## Warning
/// Probing is not a passive read: it writes a go-to command, so a connected
/// gripper that is activated will move towards position [`PROBE_POSITION`].
pub fn detect_gripper_port(slave_id: u8) -> Result<String, RobotiqError> {
    let ports = tokio_serial::available_ports()?;
    detect_among(ports.into_iter().map(|p| p.port_name), |path| {
        RtuTransport::open(path, slave_id)
    })
}

/// Two-point linear mapping between encoder ticks and finger opening in mm.
///
/// Ticks grow towards closing while millimetres grow towards opening, so the
/// slope is normally negative. Serializable, so a mapping derived once by
/// [`RobotiqGripper::calibrate`] can be stored and restored across runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Finger opening in mm when fully open.
    pub open_mm: f64,
    /// Finger opening in mm when fully closed.
    pub close_mm: f64,
    /// Encoder position measured at full open.
    pub open_ticks: u8,
    /// Encoder position measured at full close.
    pub close_ticks: u8,
    a: f64,
    b: f64,
}

impl Calibration {
    /// Solve `mm = a * ticks + b` through the two reference points.
    /// Fails with [`RobotiqError::CalibrationDegenerate`] when both points
    /// share the same tick value.
    pub fn from_reference_points(
        open_ticks: u8,
        open_mm: f64,
        close_ticks: u8,
        close_mm: f64,
    ) -> Result<Self, RobotiqError> {
        if close_ticks == open_ticks {
            return Err(RobotiqError::CalibrationDegenerate);
        }
        let span = f64::from(close_ticks) - f64::from(open_ticks);
        let a = (close_mm - open_mm) / span;
        let b = (open_mm * f64::from(close_ticks) - f64::from(open_ticks) * close_mm) / span;
        Ok(Self {
            open_mm,
            close_mm,
            open_ticks,
            close_ticks,
            a,
            b,
        })
    }

    /// Convert an encoder position to a finger opening in mm.
    pub fn ticks_to_mm(&self, ticks: u8) -> f64 {
        self.a * f64::from(ticks) + self.b
    }

    /// Convert a finger opening in mm to a fractional encoder position.
    pub fn mm_to_ticks(&self, mm: f64) -> f64 {
        (mm - self.b) / self.a
    }
}

/// Driver for a Robotiq two-finger gripper over Modbus RTU.
///
/// Owns its transport exclusively for its whole lifetime; every operation is
/// blocking and bounded by the action timeout.
pub struct RobotiqGripper<T = RtuTransport> {
    io: T,
    action_timeout: Duration,
    calibration: Option<Calibration>,
}

impl RobotiqGripper<RtuTransport> {
    /// The default Modbus slave id of Robotiq grippers.
    pub const DEFAULT_SLAVE_ID: u8 = 9;

    /// Connect to the gripper on `path` with an explicit slave id.
    pub fn from_path_slave_id(path: &str, slave_id: u8) -> Result<Self, RobotiqError> {
        Ok(Self::new(RtuTransport::open(path, slave_id)?))
    }

    /// Connect to the gripper on `path` with the default slave id.
    pub fn from_path(path: &str) -> Result<Self, RobotiqError> {
        Self::from_path_slave_id(path, Self::DEFAULT_SLAVE_ID)
    }

    /// Auto-detect the gripper port with an explicit slave id, then connect.
    /// Fails with [`RobotiqError::NoDeviceFound`] when no port answers like a
    /// gripper. See [`detect_gripper_port`] for the probe side effect.
    pub fn auto_slave_id(slave_id: u8) -> Result<Self, RobotiqError> {
        let port = detect_gripper_port(slave_id)?;
        Self::from_path_slave_id(&port, slave_id)
    }

    /// Auto-detect the gripper port with the default slave id, then connect.
    pub fn auto() -> Result<Self, RobotiqError> {
        Self::auto_slave_id(Self::DEFAULT_SLAVE_ID)
    }
}

impl<T: RegisterIo> RobotiqGripper<T> {
    /// Wrap an already-open register transport.
    pub fn new(io: T) -> Self {
        Self {
            io,
            action_timeout: ACTION_TIMEOUT,
            calibration: None,
        }
    }

    /// Bound on a complete activation or motion, [`ACTION_TIMEOUT`] unless
    /// overridden.
    pub fn action_timeout(&self) -> Duration {
        self.action_timeout
    }

    /// Override the activation/motion timeout.
    pub fn set_action_timeout(&mut self, timeout: Duration) {
        self.action_timeout = timeout;
    }

    /// Write a raw [`GripperCommand`] to the command block.
    pub fn write(&mut self, cmd: GripperCommand) -> Result<(), RobotiqError> {
        self.io.write_registers(COMMAND_REGISTER, &cmd.to_array())
    }

    /// Read and decode the status block.
    pub fn read_status(&mut self) -> Result<GripperStatus, RobotiqError> {
        let words = self.io.read_registers(STATUS_REGISTER, BLOCK_WORDS)?;
        let block: [u16; 3] = words
            .as_slice()
            .try_into()
            .map_err(|_| RobotiqError::ShortRead(words.len()))?;
        Ok(GripperStatus::from_words(block))
    }

    /// Reset the gripper (clear a previous activation and any fault) with a
    /// single all-zero command write. Does not wait.
    pub fn reset(&mut self) -> Result<(), RobotiqError> {
        self.write(GripperCommand::new())
    }

    /// Activate the gripper and wait for the routine to complete.
    ///
    /// ## Warning
    /// The gripper fully opens and closes during activation. Do not place an
    /// object inside the fingers.
    pub fn activate(&mut self) -> Result<(), RobotiqError> {
        self.write(GripperCommand::new().act(true))?;

        let started = Instant::now();
        while started.elapsed() < self.action_timeout {
            let status = self.read_status()?;
            if status.fault != GripperFault::NoFault {
                return Err(status.fault.into());
            }
            if status.sta == ActivationStatus::Completed {
                debug!(elapsed = ?started.elapsed(), "activation completed");
                return Ok(());
            }
        }
        Err(RobotiqError::ActivationTimeout(self.action_timeout))
    }

    /// Reset then activate. The gripper will open and close.
    pub fn reset_activate(&mut self) -> Result<(), RobotiqError> {
        self.reset()?;
        self.activate()
    }

    /// Move the fingers to `position` (0 open, 255 closed) with the given
    /// speed and force, and wait for the motion to settle.
    ///
    /// Returns the final encoder position and whether the fingers stopped on
    /// an object before reaching the requested position.
    ///
    /// Fails with [`RobotiqError::InvalidPosition`] before transmitting
    /// anything when `position` exceeds 255, with
    /// [`RobotiqError::NotActivated`] when the gripper is not activated, and
    /// with [`RobotiqError::MotionTimeout`] when neither stop condition is
    /// met within the action timeout.
    pub fn go_to(
        &mut self,
        position: u16,
        speed: u8,
        force: u8,
    ) -> Result<(u8, bool), RobotiqError> {
        if position > u16::from(u8::MAX) {
            return Err(RobotiqError::InvalidPosition(i32::from(position)));
        }
        if !self.is_activated()? {
            return Err(RobotiqError::NotActivated);
        }

        let cmd = GripperCommand::new()
            .act(true)
            .gto(true)
            .pos_req(position as u8)
            .speed(speed)
            .force(force);
        self.write(cmd)?;

        let started = Instant::now();
        while started.elapsed() < self.action_timeout {
            let status = self.read_status()?;
            if status.fault != GripperFault::NoFault {
                return Err(status.fault.into());
            }
            match status.obj {
                ObjDetectStatus::InMotion => {}
                obj => {
                    let object_detected = obj.detected_obj();
                    debug!(
                        position = status.pos,
                        object_detected, "motion settled"
                    );
                    return Ok((status.pos, object_detected));
                }
            }
        }
        Err(RobotiqError::MotionTimeout(self.action_timeout))
    }

    /// Fully close the gripper. See [`Self::go_to`].
    pub fn close(&mut self, speed: u8, force: u8) -> Result<(u8, bool), RobotiqError> {
        self.go_to(255, speed, force)
    }

    /// Fully open the gripper. See [`Self::go_to`].
    // `open` deliberately forwards (force, speed), unlike `close`. The swap
    // is long-standing wire behaviour, kept until the intended order is
    // confirmed against the device.
    pub fn open(&mut self, speed: u8, force: u8) -> Result<(u8, bool), RobotiqError> {
        self.go_to(0, force, speed)
    }

    /// One status read, returning the encoder position.
    pub fn get_position(&mut self) -> Result<u8, RobotiqError> {
        Ok(self.read_status()?.pos)
    }

    /// One status read, returning whether activation is completed.
    pub fn is_activated(&mut self) -> Result<bool, RobotiqError> {
        Ok(self.read_status()?.sta == ActivationStatus::Completed)
    }

    /// Teach the tick/mm mapping from the physical finger travel.
    ///
    /// Drives a full open, reads the tick position, drives a full close and
    /// reads again, then solves the linear map through both reference points.
    /// `close_mm` and `open_mm` are the measured finger openings at the two
    /// mechanical stops.
    pub fn calibrate(&mut self, close_mm: f64, open_mm: f64) -> Result<Calibration, RobotiqError> {
        self.open(255, 255)?;
        let open_ticks = self.get_position()?;

        self.close(255, 255)?;
        let close_ticks = self.get_position()?;

        let calibration =
            Calibration::from_reference_points(open_ticks, open_mm, close_ticks, close_mm)?;
        debug!(?calibration, "calibration derived");
        self.calibration = Some(calibration);
        Ok(calibration)
    }

    /// The active tick/mm mapping, if any.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Reuse a previously derived mapping without re-running the physical
    /// open/close cycle.
    pub fn restore_calibration(&mut self, calibration: Calibration) {
        self.calibration = Some(calibration);
    }

    /// Whether a tick/mm mapping is available.
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Move to a finger opening expressed in mm. Requires a calibration;
    /// `position_mm` must not exceed the calibrated full opening. The target
    /// is rounded to the nearest tick.
    pub fn go_to_mm(
        &mut self,
        position_mm: f64,
        speed: u8,
        force: u8,
    ) -> Result<(u8, bool), RobotiqError> {
        let calibration = self.calibration.ok_or(RobotiqError::NotCalibrated)?;
        if position_mm > calibration.open_mm {
            return Err(RobotiqError::OutOfCalibratedRange {
                requested_mm: position_mm,
                max_mm: calibration.open_mm,
            });
        }

        let ticks = calibration.mm_to_ticks(position_mm).round();
        if !(0.0..=255.0).contains(&ticks) {
            return Err(RobotiqError::InvalidPosition(ticks as i32));
        }
        self.go_to(ticks as u16, speed, force)
    }

    /// One status read, returning the finger opening in mm.
    /// Requires a calibration.
    pub fn get_position_mm(&mut self) -> Result<f64, RobotiqError> {
        let calibration = self.calibration.ok_or(RobotiqError::NotCalibrated)?;
        let position = self.get_position()?;
        Ok(calibration.ticks_to_mm(position))
    }

    /// Read the status block and describe every field. Diagnostic helper,
    /// see [`describe_register`].
    pub fn describe_current_status(
        &mut self,
    ) -> Result<Vec<(StatusField, u8, String)>, RobotiqError> {
        Ok(self.read_status()?.describe())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RobotiqError {
    #[error("serial communication error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("modbus transport error: {0}")]
    Modbus(#[from] tokio_modbus::Error),
    #[error("modbus exception: {0}")]
    ModbusException(#[from] tokio_modbus::Exception),
    #[error("device returned {0} status registers, expected 3")]
    ShortRead(usize),
    #[error("no gripper detected on any serial port")]
    NoDeviceFound,
    #[error("activation did not complete within {0:?}")]
    ActivationTimeout(Duration),
    #[error("gripper reached neither the requested position nor an object within {0:?}")]
    MotionTimeout(Duration),
    #[error("gripper must be activated before requesting a motion")]
    NotActivated,
    #[error("requested position {0} is outside 0..=255")]
    InvalidPosition(i32),
    #[error("gripper must be calibrated before using mm positioning")]
    NotCalibrated,
    #[error("requested opening {requested_mm} mm exceeds the calibrated maximum {max_mm} mm")]
    OutOfCalibratedRange { requested_mm: f64, max_mm: f64 },
    #[error("calibration is degenerate, open and close share the same tick position")]
    CalibrationDegenerate,
    #[error("gripper fault")]
    GripperFault(#[from] GripperFault),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted status transport: each read pops the next frame, the last
    /// frame repeats once the script runs out. Records every write.
    struct FakeIo {
        frames: VecDeque<[u16; 3]>,
        fallback: [u16; 3],
        writes: Vec<(u16, Vec<u16>)>,
    }

    impl FakeIo {
        fn with_frames(frames: Vec<[u16; 3]>) -> Self {
            let fallback = *frames.last().expect("at least one frame");
            Self {
                frames: frames.into(),
                fallback,
                writes: Vec::new(),
            }
        }
    }

    impl RegisterIo for FakeIo {
        fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, RobotiqError> {
            assert_eq!(address, STATUS_REGISTER);
            assert_eq!(count, BLOCK_WORDS);
            Ok(self.frames.pop_front().unwrap_or(self.fallback).to_vec())
        }

        fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), RobotiqError> {
            self.writes.push((address, words.to_vec()));
            Ok(())
        }
    }

    /// Candidate port fake for discovery: echoes the requested position back
    /// through the status block only when `is_gripper` is set.
    struct ProbeFake {
        is_gripper: bool,
        pos_req: u16,
    }

    impl ProbeFake {
        fn new(is_gripper: bool) -> Self {
            Self {
                is_gripper,
                pos_req: 0,
            }
        }
    }

    impl RegisterIo for ProbeFake {
        fn read_registers(&mut self, _address: u16, _count: u16) -> Result<Vec<u16>, RobotiqError> {
            if self.is_gripper {
                Ok(vec![0, self.pos_req, 0])
            } else {
                Ok(vec![0, 0, 0])
            }
        }

        fn write_registers(&mut self, _address: u16, words: &[u16]) -> Result<(), RobotiqError> {
            self.pos_req = words[1];
            Ok(())
        }
    }

    fn status_frame(obj: u8, sta: u8, gto: bool, act: bool, fault: u8, pos: u8) -> [u16; 3] {
        let status = (obj << 6) | (sta << 4) | ((gto as u8) << 3) | (act as u8);
        [
            u16::from_be_bytes([status, 0]),
            u16::from_be_bytes([fault, 0]),
            u16::from_be_bytes([pos, 0]),
        ]
    }

    fn activated_idle() -> [u16; 3] {
        status_frame(0, 3, false, true, 0, 0)
    }

    fn gripper_with(frames: Vec<[u16; 3]>) -> RobotiqGripper<FakeIo> {
        let mut gripper = RobotiqGripper::new(FakeIo::with_frames(frames));
        gripper.set_action_timeout(Duration::from_millis(50));
        gripper
    }

    #[test]
    fn decode_status_byte_layout() {
        // Status byte 0b00111000: gSTA=3, gGTO=1, gACT=0, gOBJ=0.
        let status = GripperStatus::from_words([0x3800, 0x0000, 0x0000]);
        assert_eq!(status.sta, ActivationStatus::Completed);
        assert!(status.gto);
        assert!(!status.act);
        assert_eq!(status.obj, ObjDetectStatus::InMotion);
    }

    #[test]
    fn decode_status_full_frame() {
        // obj=3, sta=0, gto=1, act=1 / kFLT=0, gFLT=11 / gPR=100 / gPO=127, gCU=10
        let status = GripperStatus::from_words([0xC900, 0x0B64, 0x7F0A]);
        assert_eq!(status.obj, ObjDetectStatus::NoObject);
        assert_eq!(status.sta, ActivationStatus::InReset);
        assert!(status.gto);
        assert!(status.act);
        assert_eq!(status.k_flt, 0);
        assert_eq!(status.fault, GripperFault::Releasing);
        assert_eq!(status.fault_code, 11);
        assert_eq!(status.pos_req, 100);
        assert_eq!(status.pos, 127);
        assert_eq!(status.current, 10);
        assert_eq!(status.current_ma(), 100);
    }

    #[test]
    fn reserved_fault_codes_keep_raw_nibble() {
        // gFLT=3 is not an assigned code: the typed field falls back to
        // NoFault, the raw nibble and the diagnostics keep what was sent.
        let status = GripperStatus::from_words([0x0000, 0x0300, 0x0000]);
        assert_eq!(status.fault, GripperFault::NoFault);
        assert_eq!(status.fault_code, 3);
        assert_eq!(status.raw(StatusField::Fault), 3);

        let described = status.describe();
        assert_eq!(described[5].0, StatusField::Fault);
        assert_eq!(described[5].1, 3);
        assert!(described[5].2.contains("Reserved fault code 3"));
    }

    #[test]
    fn decode_controller_fault_nibble() {
        // Fault byte 0xA5: kFLT=10, gFLT=5.
        let status = GripperStatus::from_words([0x0000, 0xA500, 0x0000]);
        assert_eq!(status.k_flt, 10);
        assert_eq!(status.fault, GripperFault::ActionDelay);
    }

    #[test]
    fn decode_is_pure() {
        let words = [0x3800, 0x0B64, 0x7F0A];
        assert_eq!(
            GripperStatus::from_words(words),
            GripperStatus::from_words(words)
        );
    }

    #[test]
    fn encode_command_bit_layout() {
        let cmd = GripperCommand::new()
            .act(true)
            .gto(true)
            .pos_req(100)
            .speed(0xAA)
            .force(0x55);
        assert_eq!(cmd.to_array(), [0x0900, 0x0064, 0xAA55]);

        assert_eq!(GripperCommand::new().to_array(), [0, 0, 0]);
        assert_eq!(GripperCommand::new().act(true).to_array(), [0x0100, 0, 0]);
    }

    #[test]
    fn command_echo_round_trip() {
        // A command echoed back by the device decodes to the same bits.
        let cmd = GripperCommand::new().act(true).gto(true).pos_req(42);
        let [word0, word1, _] = cmd.to_array();
        // The action bits sit in the high byte of word 0 on both sides, and
        // the position request comes back in the low byte of word 1.
        let status = GripperStatus::from_words([word0, word1, 0]);
        assert_eq!(status.act, cmd.act);
        assert_eq!(status.gto, cmd.gto);
        assert_eq!(status.pos_req, cmd.pos_req);
    }

    #[test]
    fn describe_enumerated_values() {
        assert!(describe_register(StatusField::Fault, 0).contains("No fault"));
        assert!(describe_register(StatusField::Fault, 14).contains("Overcurrent"));
        assert!(describe_register(StatusField::Fault, 3).contains("Reserved fault code 3"));
        assert!(describe_register(StatusField::GoToEcho, 2).contains("Unknown"));
        assert_eq!(
            describe_register(StatusField::Position, 57),
            "Actual position of the gripper obtained via the encoders: 57/255."
        );
        assert!(describe_register(StatusField::Current, 20).contains("200 mA"));
    }

    #[test]
    fn describe_covers_every_field() {
        let status = GripperStatus::from_words([0x3800, 0x0064, 0x7F0A]);
        let described = status.describe();
        assert_eq!(described.len(), StatusField::ALL.len());
        let (field, value, text) = &described[0];
        assert_eq!(*field, StatusField::ObjectDetection);
        assert_eq!(*value, 0);
        assert!(text.contains("in motion"));
        assert_eq!(described[8].1, 10);
    }

    #[test]
    fn activation_completes() {
        let mut gripper = gripper_with(vec![
            status_frame(0, 0, false, true, 0, 0),
            status_frame(0, 1, false, true, 0, 0),
            status_frame(0, 3, false, true, 0, 0),
        ]);
        gripper.activate().unwrap();
        assert_eq!(
            gripper.io.writes,
            vec![(COMMAND_REGISTER, vec![0x0100, 0, 0])]
        );
    }

    #[test]
    fn activation_times_out() {
        let mut gripper = gripper_with(vec![status_frame(0, 1, false, true, 0, 0)]);
        let err = gripper.activate().unwrap_err();
        assert!(matches!(err, RobotiqError::ActivationTimeout(_)));
    }

    #[test]
    fn activation_surfaces_device_fault() {
        let mut gripper = gripper_with(vec![status_frame(0, 0, false, true, 0x0D, 0)]);
        let err = gripper.activate().unwrap_err();
        assert!(matches!(
            err,
            RobotiqError::GripperFault(GripperFault::ActivationFault)
        ));
    }

    #[test]
    fn reset_writes_all_zero_block_without_polling() {
        let mut gripper = gripper_with(vec![activated_idle()]);
        gripper.reset().unwrap();
        assert_eq!(gripper.io.writes, vec![(COMMAND_REGISTER, vec![0, 0, 0])]);
        assert_eq!(gripper.io.frames.len(), 1, "reset must not read status");
    }

    /// Transport answering every status read with too few words.
    struct TruncatedIo;

    impl RegisterIo for TruncatedIo {
        fn read_registers(&mut self, _address: u16, _count: u16) -> Result<Vec<u16>, RobotiqError> {
            Ok(vec![0, 0])
        }

        fn write_registers(&mut self, _address: u16, _words: &[u16]) -> Result<(), RobotiqError> {
            Ok(())
        }
    }

    #[test]
    fn short_status_response_is_rejected() {
        let mut gripper = RobotiqGripper::new(TruncatedIo);
        let err = gripper.read_status().unwrap_err();
        assert!(matches!(err, RobotiqError::ShortRead(2)));
    }

    #[test]
    fn go_to_rejects_out_of_range_position_without_transmitting() {
        let mut gripper = gripper_with(vec![activated_idle()]);
        let err = gripper.go_to(256, 255, 255).unwrap_err();
        assert!(matches!(err, RobotiqError::InvalidPosition(256)));
        assert!(gripper.io.writes.is_empty());
    }

    #[test]
    fn go_to_requires_activation() {
        let mut gripper = gripper_with(vec![status_frame(0, 0, false, false, 0, 0)]);
        let err = gripper.go_to(10, 255, 255).unwrap_err();
        assert!(matches!(err, RobotiqError::NotActivated));
        assert!(gripper.io.writes.is_empty());
    }

    #[test]
    fn go_to_reaches_position() {
        let mut gripper = gripper_with(vec![
            activated_idle(),
            status_frame(0, 3, true, true, 0, 40),
            status_frame(3, 3, true, true, 0, 100),
        ]);
        let (position, object_detected) = gripper.go_to(100, 0xAA, 0x55).unwrap();
        assert_eq!(position, 100);
        assert!(!object_detected);
        assert_eq!(
            gripper.io.writes,
            vec![(COMMAND_REGISTER, vec![0x0900, 100, 0xAA55])]
        );
    }

    #[test]
    fn go_to_stops_on_object() {
        let mut gripper = gripper_with(vec![
            activated_idle(),
            status_frame(0, 3, true, true, 0, 120),
            status_frame(2, 3, true, true, 0, 143),
        ]);
        let (position, object_detected) = gripper.close(255, 255).unwrap();
        assert_eq!(position, 143);
        assert!(object_detected);
    }

    #[test]
    fn go_to_times_out_in_motion() {
        let mut gripper = gripper_with(vec![
            activated_idle(),
            status_frame(0, 3, true, true, 0, 10),
        ]);
        let err = gripper.go_to(200, 255, 255).unwrap_err();
        assert!(matches!(err, RobotiqError::MotionTimeout(_)));
    }

    #[test]
    fn go_to_surfaces_device_fault() {
        let mut gripper = gripper_with(vec![
            activated_idle(),
            status_frame(0, 3, true, true, 0x0E, 0),
        ]);
        let err = gripper.go_to(200, 255, 255).unwrap_err();
        assert!(matches!(
            err,
            RobotiqError::GripperFault(GripperFault::OverCurrent)
        ));
    }

    #[test]
    fn open_swaps_speed_and_force() {
        let mut gripper = gripper_with(vec![
            activated_idle(),
            status_frame(3, 3, true, true, 0, 0),
        ]);
        gripper.open(0x11, 0x22).unwrap();
        // rSP gets the force argument, rFR the speed argument.
        assert_eq!(gripper.io.writes[0].1[2], 0x2211);
    }

    #[test]
    fn probe_matches_on_echo() {
        let mut fake = ProbeFake::new(true);
        assert!(probe(&mut fake).unwrap());
        assert_eq!(fake.pos_req, u16::from(PROBE_POSITION));

        let mut fake = ProbeFake::new(false);
        assert!(!probe(&mut fake).unwrap());
    }

    #[test]
    fn discovery_returns_first_echoing_port() {
        let candidates = vec![
            "/dev/ttyUSB0".to_string(),
            "/dev/ttyUSB1".to_string(),
            "/dev/ttyUSB2".to_string(),
        ];
        let port = detect_among(candidates, |name| match name {
            // A port that cannot even be opened only disqualifies itself.
            "/dev/ttyUSB0" => {
                Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied).into())
            }
            "/dev/ttyUSB1" => Ok(ProbeFake::new(false)),
            _ => Ok(ProbeFake::new(true)),
        })
        .unwrap();
        assert_eq!(port, "/dev/ttyUSB2");
    }

    #[test]
    fn discovery_exhaustion_is_no_device_found() {
        let candidates = vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()];
        let err = detect_among(candidates, |_| Ok(ProbeFake::new(false))).unwrap_err();
        assert!(matches!(err, RobotiqError::NoDeviceFound));
    }

    #[test]
    fn calibration_reference_fixture() {
        let cal = Calibration::from_reference_points(3, 36.0, 228, 0.0).unwrap();
        assert!((cal.a - (-0.16)).abs() < 1e-9);
        assert!((cal.b - 36.48).abs() < 1e-9);
        assert!(cal.ticks_to_mm(228).abs() < 1e-9);
        assert!((cal.ticks_to_mm(3) - 36.0).abs() < 1e-9);
    }

    #[test]
    fn calibration_round_trips_within_a_tick() {
        let cal = Calibration::from_reference_points(3, 36.0, 228, 0.0).unwrap();
        for mm in [0.0, 5.5, 17.3, 36.0] {
            let ticks = cal.mm_to_ticks(mm);
            let back = cal.ticks_to_mm(ticks.round() as u8);
            assert!((back - mm).abs() <= cal.a.abs(), "mm={mm} back={back}");
        }
    }

    #[test]
    fn calibration_rejects_equal_tick_positions() {
        let err = Calibration::from_reference_points(100, 36.0, 100, 0.0).unwrap_err();
        assert!(matches!(err, RobotiqError::CalibrationDegenerate));
    }

    #[test]
    fn calibrate_drives_open_then_close() {
        let mut gripper = gripper_with(vec![
            // full open: activation check, settle at 3 ticks, position read
            activated_idle(),
            status_frame(3, 3, true, true, 0, 3),
            status_frame(3, 3, true, true, 0, 3),
            // full close: activation check, settle at 228 ticks, position read
            activated_idle(),
            status_frame(3, 3, true, true, 0, 228),
            status_frame(3, 3, true, true, 0, 228),
        ]);
        let cal = gripper.calibrate(0.0, 36.0).unwrap();
        assert_eq!(cal.open_ticks, 3);
        assert_eq!(cal.close_ticks, 228);
        assert!(gripper.is_calibrated());
        // open to 0, then close to 255
        assert_eq!(gripper.io.writes[0].1[1], 0);
        assert_eq!(gripper.io.writes[1].1[1], 255);
    }

    #[test]
    fn go_to_mm_requires_calibration() {
        let mut gripper = gripper_with(vec![activated_idle()]);
        let err = gripper.go_to_mm(10.0, 255, 255).unwrap_err();
        assert!(matches!(err, RobotiqError::NotCalibrated));
        assert!(gripper.io.writes.is_empty());

        let err = gripper.get_position_mm().unwrap_err();
        assert!(matches!(err, RobotiqError::NotCalibrated));
    }

    #[test]
    fn go_to_mm_rejects_openings_beyond_calibration() {
        let mut gripper = gripper_with(vec![activated_idle()]);
        let cal = Calibration::from_reference_points(3, 36.0, 228, 0.0).unwrap();
        gripper.restore_calibration(cal);

        let err = gripper.go_to_mm(40.0, 255, 255).unwrap_err();
        assert!(matches!(err, RobotiqError::OutOfCalibratedRange { .. }));
        assert!(gripper.io.writes.is_empty());
    }

    #[test]
    fn go_to_mm_revalidates_tick_range() {
        let mut gripper = gripper_with(vec![activated_idle()]);
        let cal = Calibration::from_reference_points(3, 36.0, 228, 0.0).unwrap();
        gripper.restore_calibration(cal);

        // -5 mm sits below the calibrated closed stop and maps past the
        // encoder range (259 ticks), which no command word can carry.
        let err = gripper.go_to_mm(-5.0, 255, 255).unwrap_err();
        assert!(matches!(err, RobotiqError::InvalidPosition(259)));
        assert!(gripper.io.writes.is_empty());
    }

    #[test]
    fn go_to_mm_converts_and_delegates() {
        let cal = Calibration::from_reference_points(3, 36.0, 228, 0.0).unwrap();
        let expected_ticks = cal.mm_to_ticks(10.0).round() as u16;

        let mut gripper = gripper_with(vec![
            activated_idle(),
            status_frame(3, 3, true, true, 0, expected_ticks as u8),
        ]);
        gripper.restore_calibration(cal);
        gripper.go_to_mm(10.0, 255, 255).unwrap();
        assert_eq!(gripper.io.writes[0].1[1], expected_ticks);
    }

    #[test]
    fn position_mm_uses_calibration() {
        let cal = Calibration::from_reference_points(3, 36.0, 228, 0.0).unwrap();
        let mut gripper = gripper_with(vec![status_frame(3, 3, false, true, 0, 228)]);
        gripper.restore_calibration(cal);
        assert!(gripper.get_position_mm().unwrap().abs() < 1e-9);
    }

    #[test]
    fn status_serde_round_trip() {
        let status = GripperStatus::from_words([0xC900, 0x0B64, 0x7F0A]);
        let json = serde_json::to_string(&status).unwrap();
        let back: GripperStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn object_detection_flags_contacts() {
        assert!(ObjDetectStatus::DetectedOpen.detected_obj());
        assert!(ObjDetectStatus::DetectedClose.detected_obj());
        assert!(!ObjDetectStatus::InMotion.detected_obj());
        assert!(!ObjDetectStatus::NoObject.detected_obj());
    }

    #[test]
    fn major_faults_require_reset() {
        assert!(!GripperFault::NoFault.reset_required());
        assert!(!GripperFault::NoComm.reset_required());
        assert!(GripperFault::UnderVoltage.reset_required());
        assert!(GripperFault::AutomaticReleaseCompleted.reset_required());
    }
}
