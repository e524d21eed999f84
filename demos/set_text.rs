use std::{env, error::Error, thread, time::Duration};

use splitflap::{Config, ForceMovement, Splitflap};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: set_text <text> [force_movement]");
        println!();
        println!("force_movement should be none, only_non_blank or all (default none)");
        println!("ALPHABET_ORDER must be set to the flap characters in order");
        println!("SPLITFLAP_MODULE_COUNT, SPLITFLAP_SERIAL_PORT, SPLITFLAP_RETRY_MS and");
        println!("SPLITFLAP_FAILURE_POLICY are optional");
        return Ok(());
    }

    let force = match args.get(2) {
        Some(mode) => mode.parse::<ForceMovement>()?,
        None => ForceMovement::None,
    };

    let config = Config::from_env()?;
    let mut display = Splitflap::open(&config)?;
    display.start()?;

    // Without a configured count, wait for the display to report how many modules it has.
    while display.status().module_count == 0 {
        if !display.status().inbound_alive {
            return Err("display stopped responding before reporting its modules".into());
        }
        thread::sleep(Duration::from_millis(50));
    }

    let nonce = display.set_text_with_movement(&args[1], force)?;
    println!("Sent {:?} as nonce {:08X}", args[1], nonce);

    // Give the update time to be acknowledged (or retried) before shutting down.
    while display.status().queued > 0 {
        thread::sleep(Duration::from_millis(50));
    }
    thread::sleep(config.retry_timeout * 2);
    display.shutdown();

    if let Some(state) = display.device_state() {
        for (i, module) in state.modules.iter().enumerate() {
            println!("Module {}: {:?} at flap {}", i, module.condition, module.flap_index);
        }
    }
    Ok(())
}
