use std::thread;
use std::time::{Duration, Instant};

use splitflap::core::{DeviceMessage, HostMessage, ModuleError};
use splitflap::{Alphabet, Config, ForceMovement, SessionError, Splitflap};
use splitflap_testing::{VirtualSplitflap, VirtualTransport};

mod mock_transport;
use crate::mock_transport::wait_until;

fn config(module_count: usize) -> Config {
    let mut config = Config::new(Alphabet::new(" ABCDEFGHIJKLMNOPQRSTUVWXYZ").unwrap());
    config.module_count = module_count;
    config.retry_timeout = Duration::from_millis(50);
    config
}

#[test]
fn learns_module_count_from_display() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = VirtualTransport::new(VirtualSplitflap::new(6));
    let link = transport.link();
    let mut display = Splitflap::new(transport, &config(0));

    assert!(matches!(
        display.set_text("TOO SOON").unwrap_err(),
        SessionError::Module {
            source: ModuleError::UnknownModuleCount
        }
    ));

    display.start().unwrap();
    wait_until("module count", || display.status().module_count == 6);

    assert!(matches!(link.device().received()[0].1, HostMessage::RequestState));
    assert_eq!(Some(6), display.device_state().map(|state| state.module_count()));

    let _ = display.set_text("HELLO").unwrap();
    wait_until("text shown", || link.device().flap_indexes() == vec![8, 5, 12, 12, 15, 0]);
    display.shutdown();
}

#[test]
fn text_padded_or_rejected() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(4));
    let link = transport.link();
    let mut display = Splitflap::new(transport, &config(4));
    display.start().unwrap();

    let _ = display.set_text("HI").unwrap();
    wait_until("short text", || link.device().flap_indexes() == vec![8, 9, 0, 0]);

    let _ = display.set_text("WXYZ").unwrap();
    wait_until("full text", || link.device().flap_indexes() == vec![23, 24, 25, 26]);

    assert!(matches!(
        display.set_text("WXYZ AND MORE").unwrap_err(),
        SessionError::Module {
            source: ModuleError::TooManyPositions { max: 4, actual: 13 }
        }
    ));

    // Characters outside the alphabet show the first flap.
    let _ = display.set_text("a?B!").unwrap();
    wait_until("unknown characters", || link.device().flap_indexes() == vec![0, 0, 2, 0]);
    display.shutdown();
}

#[test]
fn forced_movement() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(3));
    let link = transport.link();
    let mut display = Splitflap::new(transport, &config(3));
    display.start().unwrap();

    let nonce = display.set_text("AB").unwrap();
    wait_until("text", || link.device().received_nonces().contains(&nonce));
    assert_eq!(&[1, 1, 0], link.device().rotations());

    // Same text doesn't move anything unless forced.
    let nonce = display.set_text("AB").unwrap();
    wait_until("same text", || link.device().received_nonces().contains(&nonce));
    assert_eq!(&[1, 1, 0], link.device().rotations());

    let nonce = display.set_text_with_movement("AB", ForceMovement::All).unwrap();
    wait_until("forced", || link.device().received_nonces().contains(&nonce));
    assert_eq!(&[2, 2, 1], link.device().rotations());

    let nonce = display.set_text_with_movement("A", ForceMovement::OnlyNonBlank).unwrap();
    wait_until("forced non-blank", || link.device().received_nonces().contains(&nonce));
    assert_eq!(&[3, 3, 1], link.device().rotations());
    display.shutdown();
}

#[test]
fn positions() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(3));
    let link = transport.link();
    let mut display = Splitflap::new(transport, &config(3));
    display.start().unwrap();

    let _ = display.set_positions(&[5, 6], None).unwrap();
    wait_until("positions", || link.device().flap_indexes() == vec![5, 6, 0]);

    assert!(matches!(
        display.set_positions(&[1, 2, 3, 4], None).unwrap_err(),
        SessionError::Module {
            source: ModuleError::TooManyPositions { max: 3, actual: 4 }
        }
    ));
    assert!(matches!(
        display.set_positions(&[1, 2], Some(&[true][..])).unwrap_err(),
        SessionError::Module {
            source: ModuleError::ForceMovementMismatch { .. }
        }
    ));
    display.shutdown();
}

#[test]
fn survives_noise_and_logs() {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = VirtualTransport::new(VirtualSplitflap::new(2));
    let link = transport.link();
    let mut display = Splitflap::new(transport, &config(2));
    display.start().unwrap();

    link.inject(&[0x13, 0x37, 0x00, 0xFF]);
    link.send(&DeviceMessage::Log("Homing complete".to_string()));
    let mut corrupt = DeviceMessage::Log("bit flip".to_string()).to_frame().to_bytes();
    corrupt[2] ^= 0x40;
    link.inject(&corrupt);

    let _ = display.set_text("OK").unwrap();
    wait_until("text after noise", || link.device().flap_indexes() == vec![15, 11]);
    assert!(display.status().inbound_alive);
    display.shutdown();
}

#[test]
fn long_noise_does_not_stall_acks() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(2));
    let link = transport.link();
    let mut config = config(2);
    config.retry_timeout = Duration::from_secs(2);
    let mut display = Splitflap::new(transport, &config);
    display.start().unwrap();
    wait_until("state request", || display.device_state().is_some());

    link.inject(&[0xFF, 0x00].repeat(6 * 1024));
    let first = display.set_text("NO").unwrap();
    let second = display.set_text("ON").unwrap();
    wait_until("both updates", || link.device().received_nonces().contains(&second));
    display.shutdown();

    // The first ack got through the noise in time, so nothing was retried.
    let received = link.device().received_nonces();
    assert_eq!(1, received.iter().filter(|&&n| n == first).count());
    assert_eq!(vec![15, 14], link.device().flap_indexes());
}

#[test]
fn dropped_ack_retried() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(1));
    let link = transport.link();
    let mut display = Splitflap::new(transport, &config(1));
    display.start().unwrap();
    wait_until("state request", || display.device_state().is_some());

    link.device().drop_acks(1);
    let nonce = display.set_text("Q").unwrap();
    let next = display.set_text("R").unwrap();
    wait_until("second update", || link.device().received_nonces().contains(&next));
    display.shutdown();

    let received = link.device().received_nonces();
    assert_eq!(2, received.iter().filter(|&&n| n == nonce).count());
    assert_eq!(1, received.iter().filter(|&&n| n == next).count());
}

#[test]
fn disconnect_stops_inbound() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(1));
    let link = transport.link();
    let mut display = Splitflap::new(transport, &config(1));
    display.start().unwrap();
    assert!(display.status().running);

    link.disconnect();
    wait_until("inbound stopped", || !display.status().inbound_alive);
    assert!(display.status().running);

    // Updates are still accepted; they just go unacknowledged.
    let _ = display.set_text("X").unwrap();
    display.shutdown();
    assert!(!display.status().running);
}

#[test]
fn shutdown_interrupts_delivery() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(2));
    let link = transport.link();
    link.device().set_silent(true);

    let mut config = config(2);
    config.retry_timeout = Duration::from_secs(30);
    let mut display = Splitflap::new(transport, &config);
    display.start().unwrap();
    let _ = display.set_text("AA").unwrap();
    wait_until("first write", || !link.device().received().is_empty());

    let start = Instant::now();
    display.shutdown();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(matches!(display.set_text("BB").unwrap_err(), SessionError::Stopped));
    assert!(matches!(display.start().unwrap_err(), SessionError::Stopped));
}

#[test]
fn drop_stops_workers() {
    let transport = VirtualTransport::new(VirtualSplitflap::new(1));
    let link = transport.link();
    {
        let mut display = Splitflap::new(transport, &config(1));
        display.start().unwrap();
        wait_until("state request", || display.device_state().is_some());
    }

    let count = link.device().received().len();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(count, link.device().received().len());
}
