use log::{debug, info, warn};

use splitflap_core::{DeviceMessage, DeviceState, Frame, HostMessage, Module, ModuleStatus, Nonce};

/// Mock implementation of split-flap display firmware.
///
/// Acknowledges every request by nonce, applies module configurations, and reports its state
/// after each request, the way the real firmware does. Modules arrive at their targets instantly.
///
/// While most likely not a 100% accurate implementation of the firmware, it is sufficient
/// for exercising a host end to end. A few faults can be switched on to see how the host copes.
///
/// Messages and responses are logged using the [`log`] crate for debugging purposes.
///
/// # Examples
///
/// ```
/// use splitflap_core::{DeviceMessage, HostMessage, Nonce};
/// use splitflap_testing::VirtualSplitflap;
///
/// let mut display = VirtualSplitflap::new(6);
/// let responses = display.process_message(Nonce(4), &HostMessage::RequestState);
///
/// assert_eq!(DeviceMessage::Ack(Nonce(4)), responses[0]);
/// assert!(matches!(responses[1], DeviceMessage::StateReport(ref state) if state.module_count() == 6));
/// ```
///
/// [`log`]: https://crates.io/crates/log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualSplitflap {
    modules: Vec<ModuleStatus>,
    config: Vec<Module>,
    rotations: Vec<u32>,
    received: Vec<(Nonce, HostMessage)>,
    acks_to_drop: usize,
    silent: bool,
}

impl VirtualSplitflap {
    /// Creates a new `VirtualSplitflap` with the specified number of modules, all showing flap 0.
    pub fn new(module_count: usize) -> Self {
        VirtualSplitflap {
            modules: vec![ModuleStatus::default(); module_count],
            config: vec![Module::default(); module_count],
            rotations: vec![0; module_count],
            received: vec![],
            acks_to_drop: 0,
            silent: false,
        }
    }

    /// Returns the number of modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Returns the flap each module currently shows.
    ///
    /// # Examples
    ///
    /// ```
    /// # use splitflap_core::{HostMessage, Module, Nonce};
    /// # use splitflap_testing::VirtualSplitflap;
    /// #
    /// let mut display = VirtualSplitflap::new(2);
    /// let target = Module { target_flap_index: 9, ..Module::default() };
    /// let _ = display.process_message(Nonce(0), &HostMessage::Configure(vec![target; 2]));
    /// assert_eq!(vec![9, 9], display.flap_indexes());
    /// ```
    pub fn flap_indexes(&self) -> Vec<u32> {
        self.modules.iter().map(|module| module.flap_index).collect()
    }

    /// Returns how many times each module has started rotating.
    ///
    /// A module rotates when its target or movement nonce changes.
    pub fn rotations(&self) -> &[u32] {
        &self.rotations
    }

    /// Returns the last configuration applied to each module.
    pub fn config(&self) -> &[Module] {
        &self.config
    }

    /// Returns every request received so far, including unacknowledged ones.
    pub fn received(&self) -> &[(Nonce, HostMessage)] {
        &self.received
    }

    /// Returns the nonces of every request received so far, in order.
    pub fn received_nonces(&self) -> Vec<Nonce> {
        self.received.iter().map(|&(nonce, _)| nonce).collect()
    }

    /// Returns what the firmware would report in a state report.
    pub fn state(&self) -> DeviceState {
        DeviceState {
            modules: self.modules.clone(),
            sensor_test: false,
        }
    }

    /// Withholds acknowledgments for the next `count` requests. Other responses are still sent.
    pub fn drop_acks(&mut self, count: usize) {
        self.acks_to_drop = count;
    }

    /// When silent, requests are still recorded and applied but nothing is ever sent back.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Handles a request, updating our state accordingly, and returns the responses in send order.
    pub fn process_message(&mut self, nonce: Nonce, message: &HostMessage) -> Vec<DeviceMessage> {
        debug!("Vsplitflap received [Nonce {:08X}] {}", nonce, message);
        self.received.push((nonce, message.clone()));

        if let HostMessage::Configure(ref modules) = *message {
            self.configure(modules);
        }

        let mut responses = Vec::with_capacity(2);
        if self.silent {
            return responses;
        }

        if self.acks_to_drop > 0 {
            self.acks_to_drop -= 1;
            info!("Vsplitflap withholding ack for nonce {:08X}", nonce);
        } else {
            responses.push(DeviceMessage::Ack(nonce));
        }
        responses.push(DeviceMessage::StateReport(self.state()));
        responses
    }

    /// Decodes a frame and handles the request it carries.
    ///
    /// Frames that don't hold a valid request are logged and ignored, as the firmware does.
    pub fn process_frame(&mut self, frame: &Frame<'_>) -> Vec<DeviceMessage> {
        match HostMessage::from_payload(frame.payload()) {
            Ok((nonce, message)) => self.process_message(nonce, &message),
            Err(e) => {
                warn!("Vsplitflap ignoring undecodable frame {}: {}", frame, e);
                vec![]
            }
        }
    }

    /// Applies a module configuration.
    fn configure(&mut self, modules: &[Module]) {
        if modules.len() != self.modules.len() {
            warn!(
                "Vsplitflap has {} modules but received configuration for {}",
                self.modules.len(),
                modules.len()
            );
        }

        let slots = self.modules.iter_mut().zip(&mut self.config).zip(&mut self.rotations);
        for (((status, current), rotations), &requested) in slots.zip(modules) {
            if requested.target_flap_index != current.target_flap_index
                || requested.movement_nonce != current.movement_nonce
            {
                *rotations += 1;
            }
            status.flap_index = requested.target_flap_index;
            *current = requested;
        }
    }
}
