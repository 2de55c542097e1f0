use std::collections::HashMap;
use std::time::Instant;

/// Bounded mapping from seqno to (send_time, retransmitted), used only for RTT
/// sampling. Capacity is fixed at `MAX_TIMESTAMPS`; once full, the oldest entry
/// (by insertion order, not by seqno) is evicted to make room. Losing a handful
/// of RTT samples under sustained load is acceptable — see §7, Exhaustion.
pub const MAX_TIMESTAMPS: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub send_time: Instant,
    pub retransmitted: bool,
}

pub struct TimestampTable {
    slots: Vec<Option<u32>>,
    by_seqno: HashMap<u32, (usize, Sample)>,
    next_slot: usize,
}

impl TimestampTable {
    pub fn new() -> Self {
        TimestampTable {
            slots: vec![None; MAX_TIMESTAMPS],
            by_seqno: HashMap::new(),
            next_slot: 0,
        }
    }

    pub fn record(&mut self, seqno: u32, retransmitted: bool, now: Instant) {
        let sample = Sample {
            send_time: now,
            retransmitted,
        };

        if let Some((slot, existing)) = self.by_seqno.get_mut(&seqno) {
            *existing = sample;
            let _ = slot;
            return;
        }

        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) % MAX_TIMESTAMPS;

        if let Some(evicted_seqno) = self.slots[slot].take() {
            self.by_seqno.remove(&evicted_seqno);
        }

        self.slots[slot] = Some(seqno);
        self.by_seqno.insert(seqno, (slot, sample));
    }

    pub fn get(&self, seqno: u32) -> Option<Sample> {
        self.by_seqno.get(&seqno).map(|(_, s)| *s)
    }
}
