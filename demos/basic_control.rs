// Basic control: connect, move channel 1 forward and back
//
// WARNING: this moves motor 1 by 100 steps and then returns it.
//
// Usage: cargo run --example basic_control -- [product_id]
// Example: cargo run --example basic_control -- 0x4000

use picomotor_usb::config::parse_usb_id;
use picomotor_usb::{Controller, ControllerConfig};

const MOTOR: u8 = 1;
const STEPS: i64 = 100;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let mut config = ControllerConfig::default();
    if let Some(arg) = std::env::args().nth(1) {
        config.product_id = Some(parse_usb_id(&arg)?);
    }

    println!("Connecting to Newport 8742 controller...");
    let mut controller = match Controller::connect(&config) {
        Ok(controller) => controller,
        Err(e) => {
            println!("Connection failed: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  1. Check USB connection");
            println!("  2. Verify vendor/product IDs match your device (picomotor list)");
            println!("  3. Check USB permissions (Windows: install a WinUSB driver)");
            return Err(e.into());
        }
    };

    let position = controller.get_position(MOTOR)?;
    println!();
    println!("Motor {} current position: {}", MOTOR, position);

    println!("Moving motor {} by {} steps...", MOTOR, STEPS);
    controller.move_relative(MOTOR, STEPS)?;
    println!("Motor {} new position: {}", MOTOR, controller.get_position(MOTOR)?);

    println!("Moving back...");
    controller.move_relative(MOTOR, -STEPS)?;
    println!("Motor {} final position: {}", MOTOR, controller.get_position(MOTOR)?);

    println!();
    println!("Done!");
    Ok(())
}
