use std::{env, error::Error};

use splitflap::core::{is_timeout, FrameError};
use splitflap::serial::{open_port, READ_TIMEOUT};
use splitflap_testing::{Emulator, VirtualSplitflap};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: emulator <serial_port> <module_count>");
        println!();
        println!("serial_port should be a port name like /dev/ttyUSB0 or COM3");
        println!("Acts as a display on the given port so a host can be tested without hardware");
        return Ok(());
    }

    let port = open_port(&args[1], READ_TIMEOUT)?;
    let module_count = args[2].parse::<usize>()?;
    println!("Emulating a display with {} modules on {}", module_count, args[1]);

    // Requests from the host are answered by the virtual display.
    let mut emulator = Emulator::new(port, VirtualSplitflap::new(module_count));
    loop {
        match emulator.process_frame() {
            Ok(()) => {}
            Err(FrameError::Io { ref source }) if is_timeout(source) => continue,
            Err(e) if e.is_io() => return Err(e.into()),
            Err(e) => log::warn!("{}", e),
        }
    }
}
