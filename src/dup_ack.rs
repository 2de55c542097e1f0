/// Detects triple duplicate ACKs. Equivalent to, and replaces, a 3-slot
/// circular buffer of recent ACK numbers (see §9): all that matters is the
/// most recently seen non-advancing ackno and how many times in a row it has
/// repeated.
#[derive(Debug, Default)]
pub struct DupAckDetector {
    last_value: Option<u32>,
    count: u32,
}

impl DupAckDetector {
    pub fn new() -> Self {
        DupAckDetector {
            last_value: None,
            count: 0,
        }
    }

    /// A new cumulative ACK arrived; any in-progress duplicate run is stale.
    pub fn reset(&mut self) {
        self.last_value = None;
        self.count = 0;
    }

    /// Record a non-advancing ACK for `ackno`. Returns true exactly when this
    /// call is the third consecutive duplicate for the same value, at which
    /// point the internal count restarts so a further run of three can fire
    /// fast retransmit again if the sender is still stuck at this `send_base`.
    pub fn observe(&mut self, ackno: u32) -> bool {
        if self.last_value == Some(ackno) {
            self.count += 1;
        } else {
            self.last_value = Some(ackno);
            self.count = 1;
        }

        if self.count == 3 {
            self.count = 0;
            true
        } else {
            false
        }
    }
}
