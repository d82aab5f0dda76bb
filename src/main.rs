use clap::Parser;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use picomotor_usb::cli::{self, Cli};

fn main() {
    // Setup logging (set RUST_LOG=debug or trace to see replies and frames)
    // Logs go to stderr so console output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli::run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
