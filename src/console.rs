// Interactive command console
//
// Reads one raw controller command per line, executes it and prints the reply.
// Command-level failures are reported and the loop continues; a broken link
// to the controller ends it.

use std::io::{BufRead, Write};

use tracing::{info, warn};

use crate::config::{ControllerConfig, CHANNELS};
use crate::error::{Error, Result, TransportError};
use crate::motor::driver::Controller;
use crate::motor::transport::Transport;
use crate::motor::waiter::Clock;

pub const PROMPT: &str = ">> ";

const INTRO: &str = "\
Picomotor Command Line
---------------------------

Enter a valid command, 'help' for a list of builtins, or 'quit' to exit.

Common Commands:
    xMV[+-]: .....Indefinitely move motor 'x' in + or - direction
         ST: .....Stop all motor movement
      xPRnn: .....Move motor 'x' 'nn' steps
      xTP?:  .....Query position of motor 'x'
";

const HELP: &str = "\
Builtins:
    help         Show this text
    status       Show the position of every channel
    quit, exit   Stop all motors and leave

Anything else is sent to the controller as a raw command, e.g. 1PR100 or 2VA?
";

/// Run the console until `quit`, end of input, or a transport failure
///
/// All motors are stopped before a normal exit.
pub fn run<T, C, R, W>(
    controller: &mut Controller<T, C>,
    config: &ControllerConfig,
    mut input: R,
    output: &mut W,
) -> Result<()>
where
    T: Transport,
    C: Clock,
    R: BufRead,
    W: Write,
{
    writeln!(output, "{INTRO}")?;

    let mut line = String::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            // EOF (Ctrl-D)
            writeln!(output)?;
            break;
        }

        match line.trim() {
            "" => {}
            "help" => write!(output, "{HELP}")?,
            "status" => print_status(controller, config, output)?,
            "quit" | "exit" => break,
            command => match controller.execute(command) {
                Ok(Some(reply)) => writeln!(output, "{reply}")?,
                Ok(None) => {}
                Err(e) if is_recoverable(&e) => {
                    warn!("Command {:?} failed: {}", command, e);
                    writeln!(output, "Error: {e}")?;
                }
                Err(e) => return Err(e),
            },
        }
    }

    info!("Leaving console");
    controller.stop_motion(None)
}

/// Errors that only affect the command just entered
fn is_recoverable(error: &Error) -> bool {
    matches!(
        error,
        Error::MalformedCommand { .. }
            | Error::MotionTimeout { .. }
            | Error::InvalidReply { .. }
            | Error::InvalidChannel(_)
            | Error::Transport(TransportError::Timeout(_))
    )
}

fn print_status<T: Transport, C: Clock, W: Write>(
    controller: &mut Controller<T, C>,
    config: &ControllerConfig,
    output: &mut W,
) -> Result<()> {
    for channel in CHANNELS {
        let label = config.channel_label(channel);
        match controller.get_position(channel) {
            Ok(position) => writeln!(output, "  {channel} {label:<16} {position:>10}")?,
            Err(e) if is_recoverable(&e) => {
                writeln!(output, "  {channel} {label:<16} error: {e}")?
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
