use std::time::Duration;

pub const RTO_MIN_MS: u64 = 100;
pub const RTO_MAX_MS: u64 = 6000;
pub const INITIAL_RTO_MS: u64 = 3000;

const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;
const K: f64 = 4.0;

/// Jacobson/Karels smoothed-RTT estimator with exponential backoff on
/// consecutive timeouts and Karn's rule (the caller never feeds it a sample
/// measured against a retransmitted segment).
#[derive(Debug, Clone)]
pub struct RtoEstimator {
    srtt_ms: Option<f64>,
    rttvar_ms: Option<f64>,
    rto_ms: u64,
    consecutive_timeouts: u32,
}

impl RtoEstimator {
    pub fn new() -> Self {
        RtoEstimator {
            srtt_ms: None,
            rttvar_ms: None,
            rto_ms: INITIAL_RTO_MS,
            consecutive_timeouts: 0,
        }
    }

    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.rto_ms)
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Feed a fresh RTT sample. Must not be called for a retransmitted segment.
    pub fn on_sample(&mut self, rtt: Duration) {
        let r = rtt.as_secs_f64() * 1000.0;

        match (self.srtt_ms, self.rttvar_ms) {
            (None, _) | (_, None) => {
                self.srtt_ms = Some(r);
                self.rttvar_ms = Some(r / 2.0);
            }
            (Some(srtt), Some(rttvar)) => {
                let rttvar = (1.0 - BETA) * rttvar + BETA * (srtt - r).abs();
                let srtt = (1.0 - ALPHA) * srtt + ALPHA * r;
                self.srtt_ms = Some(srtt);
                self.rttvar_ms = Some(rttvar);
            }
        }

        let srtt = self.srtt_ms.unwrap();
        let rttvar = self.rttvar_ms.unwrap();
        let rto = srtt + K * rttvar;

        self.rto_ms = (rto as u64).clamp(RTO_MIN_MS, RTO_MAX_MS);
        self.consecutive_timeouts = 0;
    }

    /// A retransmission timer fired before any RTT sample could be taken.
    pub fn on_timeout(&mut self) {
        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts > 1 {
            self.rto_ms = (self.rto_ms * 2).min(RTO_MAX_MS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_the_initial_rto() {
        let rto = RtoEstimator::new();
        assert_eq!(rto.rto(), Duration::from_millis(INITIAL_RTO_MS));
    }

    #[test]
    fn first_sample_sets_srtt_and_halves_it_for_rttvar() {
        let mut rto = RtoEstimator::new();
        rto.on_sample(Duration::from_millis(200));
        // rto = srtt + K * rttvar = 200 + 4*100 = 600
        assert_eq!(rto.rto(), Duration::from_millis(600));
        assert_eq!(rto.consecutive_timeouts(), 0);
    }

    #[test]
    fn clamps_to_rto_min() {
        let mut rto = RtoEstimator::new();
        rto.on_sample(Duration::from_millis(1));
        assert_eq!(rto.rto(), Duration::from_millis(RTO_MIN_MS));
    }

    #[test]
    fn clamps_to_rto_max() {
        let mut rto = RtoEstimator::new();
        rto.on_sample(Duration::from_millis(100_000));
        assert_eq!(rto.rto(), Duration::from_millis(RTO_MAX_MS));
    }

    #[test]
    fn backoff_doubles_on_second_consecutive_timeout_only() {
        let mut rto = RtoEstimator::new();
        let base = rto.rto();
        rto.on_timeout();
        assert_eq!(rto.rto(), base, "first timeout does not back off");
        rto.on_timeout();
        assert_eq!(rto.rto(), base * 2);
        rto.on_timeout();
        assert_eq!(rto.rto(), base * 4);
    }

    #[test]
    fn a_sample_resets_the_consecutive_timeout_count() {
        let mut rto = RtoEstimator::new();
        rto.on_timeout();
        rto.on_timeout();
        assert_eq!(rto.consecutive_timeouts(), 2);
        rto.on_sample(Duration::from_millis(50));
        assert_eq!(rto.consecutive_timeouts(), 0);
    }
}
