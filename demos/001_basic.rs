use robotiq_rtu::*;

fn main() -> Result<(), RobotiqError> {
    // Log discovery and motion progress; RUST_LOG=debug shows every probe.
    tracing_subscriber::fmt::init();

    // Probe every serial port and keep the first one that answers like a
    // gripper. Use RobotiqGripper::from_path("COM17") / "/dev/ttyUSB0" to
    // skip probing when the port is known.
    let mut gripper = RobotiqGripper::auto()?;

    // Reset and activation; the gripper fully opens and closes, keep it clear.
    gripper.reset_activate()?;
    println!("activated: {}", gripper.is_activated()?);

    // Basic motion: close on whatever is between the fingers, then release.
    let (position, object_detected) = gripper.close(255, 255)?;
    println!("close stopped at {position}/255, object detected: {object_detected}");
    gripper.open(255, 255)?;

    // A slow, gentle partial close.
    let (position, object_detected) = gripper.go_to(0x80, 0x10, 0x10)?;
    println!("go_to stopped at {position}/255, object detected: {object_detected}");

    // Millimetre positioning: teach the mapping once (fingers touch at 0 mm,
    // fully open is 36 mm on a stock 2F-85), then command openings in mm.
    let calibration = gripper.calibrate(0.0, 36.0)?;
    println!("calibration: {}", serde_json::to_string(&calibration).unwrap());
    gripper.go_to_mm(10.0, 255, 255)?;
    println!("opening: {:.1} mm", gripper.get_position_mm()?);

    // Diagnostics: every status field with its documented description.
    for (field, value, description) in gripper.describe_current_status()? {
        println!("{} = {} : {}", field.register_name(), value, description);
    }

    Ok(())
}
