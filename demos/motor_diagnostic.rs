// Motor diagnostic: READ-ONLY check of the controller and its motors
//
// This tool only sends queries (VE?, QM?, TP?, VA?, AC?). It never sets a
// parameter and never starts a motion, so it is safe to run first.
//
// Usage: cargo run --example motor_diagnostic -- [product_id]
// Example: cargo run --example motor_diagnostic -- 0x4000

use picomotor_usb::config::{parse_usb_id, CHANNELS, KNOWN_PRODUCT_IDS, NEWPORT_VENDOR_ID};
use picomotor_usb::discovery::{self, NusbBackend};
use picomotor_usb::motor::protocol::{mnemonic, Command, ControllerInfo, MotorType, QUERY};
use picomotor_usb::motor::{CommandExecutor, UsbTransport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::DEBUG.into()),
        )
        .init();

    // Product id from args, otherwise scan every known one
    let product_ids = match std::env::args().nth(1) {
        Some(arg) => vec![parse_usb_id(&arg)?],
        None => KNOWN_PRODUCT_IDS.to_vec(),
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          Picomotor 8742 Diagnostic (READ-ONLY)               ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  This tool only QUERIES the controller - no writes, no moves ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    println!("Step 1: Scanning USB bus...");
    let devices = discovery::enumerate(&NusbBackend, NEWPORT_VENDOR_ID, &product_ids)?;
    let Some(device) = devices.first() else {
        print!("{}", discovery::format_device_list(&devices, NEWPORT_VENDOR_ID));
        return Ok(());
    };
    println!(
        "  ✓ Found VID={:#06x} PID={:#06x} on bus {} address {}",
        device.vendor_id, device.product_id, device.bus, device.address
    );
    println!();

    println!("Step 2: Opening controller...");
    let transport = match UsbTransport::open(device.vendor_id, device.product_id) {
        Ok(transport) => {
            println!("  ✓ Interface claimed");
            transport
        }
        Err(e) => {
            println!("  ✗ Failed to open controller: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check udev rules / USB permissions");
            println!("  - Close other programs talking to the controller");
            println!("  - On Windows, install a WinUSB driver for the device");
            return Err(e.into());
        }
    };
    let mut executor = CommandExecutor::new(transport);
    println!();

    println!("Step 3: Controller identity...");
    let version = Command::new(None, mnemonic::VERSION, Some(QUERY.to_string()));
    match executor.query(&version) {
        Ok(reply) => {
            let info = ControllerInfo::parse(&reply);
            println!("  Model:    {}", info.model);
            println!("  Firmware: {}", info.firmware);
        }
        Err(e) => println!("  ERROR - {}", e),
    }
    println!();

    println!("Step 4: Reading channels...");
    println!();
    let mut empty = 0;
    for channel in CHANNELS {
        println!("  === Channel {} ===", channel);

        match executor.query_int(&Command::query(channel, mnemonic::MOTOR_TYPE)) {
            Ok(code) => match MotorType::from_code(code) {
                Some(motor) => {
                    if !motor.is_connected() {
                        empty += 1;
                    }
                    println!("    Motor Type:   {} ({})", code, motor);
                }
                None => println!("    Motor Type:   {} (unrecognized)", code),
            },
            Err(e) => println!("    Motor Type:   ERROR - {}", e),
        }

        for (label, mnemonic) in [
            ("Position:    ", mnemonic::POSITION),
            ("Velocity:    ", mnemonic::VELOCITY),
            ("Acceleration:", mnemonic::ACCELERATION),
        ] {
            match executor.query_int(&Command::query(channel, mnemonic)) {
                Ok(value) => println!("    {} {}", label, value),
                Err(e) => println!("    {} ERROR - {}", label, e),
            }
        }
        println!();
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    Diagnostic Complete                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    if empty > 0 {
        println!("⚠ {} channel(s) report no motor connected.", empty);
        println!("  The controller only detects motors at power-up; power-cycle it");
        println!("  after plugging motors in.");
        println!();
    }
    println!("Next step: Run 'cargo run --example basic_control' to make a small move");

    Ok(())
}
