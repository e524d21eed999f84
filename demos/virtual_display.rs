use std::{error::Error, thread, time::Duration};

use splitflap::{Alphabet, Config, ForceMovement, Splitflap};
use splitflap_testing::{VirtualSplitflap, VirtualTransport};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // Connect to a virtual display for testing purposes.
    // To control a real display you would use Splitflap::open instead.
    let transport = VirtualTransport::new(VirtualSplitflap::new(12));
    let link = transport.link();

    // Leave the module count unset so it's learned from the display.
    let alphabet = Alphabet::new(" ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.,'")?;
    let config = Config::new(alphabet.clone());
    let mut display = Splitflap::new(transport, &config);
    display.start()?;
    while display.status().module_count == 0 {
        thread::sleep(Duration::from_millis(10));
    }

    let _ = display.set_text("HELLO WORLD")?;
    let _ = display.set_text_with_movement("HELLO WORLD", ForceMovement::OnlyNonBlank)?;
    while display.status().queued > 0 {
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(100));
    display.shutdown();

    // For testing purposes, print what the virtual display ended up showing.
    let device = link.device();
    let text: String = device
        .flap_indexes()
        .iter()
        .map(|&index| alphabet.char_at(index).unwrap_or('?'))
        .collect();
    println!("Display shows {:?}", text);
    println!("Rotations per module: {:?}", device.rotations());
    println!("Requests received: {}", device.received().len());

    Ok(())
}
