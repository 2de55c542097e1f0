use crate::packet::{Packet, PAYLOAD_MAX};

/// Fixed-capacity ring of owned, sent-but-unacknowledged DATA packets,
/// indexed by `(seqno / PAYLOAD_MAX) mod CAP`. Capacity must exceed the
/// maximum number of in-flight segments (`CAP >= MAX_WINDOW`) so that no two
/// live segments can ever alias to the same slot. The FIN packet is tracked
/// separately by the sender and never stored here (its seqno is not a byte
/// offset — see `Packet::fin`).
pub struct RetransmitBuffer {
    cap: usize,
    slots: Vec<Option<Packet>>,
}

impl RetransmitBuffer {
    pub fn new(cap: usize) -> Self {
        RetransmitBuffer {
            cap,
            slots: vec![None; cap],
        }
    }

    fn slot(&self, seqno: u32) -> usize {
        (seqno / PAYLOAD_MAX as u32) as usize % self.cap
    }

    /// Store `pkt`, displacing whatever occupied that slot. Callers must only
    /// ever displace a slot whose prior occupant has already been fully
    /// acknowledged and released.
    pub fn store(&mut self, pkt: Packet) {
        let slot = self.slot(pkt.seqno);
        self.slots[slot] = Some(pkt);
    }

    pub fn get(&self, seqno: u32) -> Option<&Packet> {
        self.slots[self.slot(seqno)]
            .as_ref()
            .filter(|pkt| pkt.seqno == seqno)
    }

    /// Free the slot holding `seqno`, if its occupant still matches.
    pub fn release(&mut self, seqno: u32) {
        let slot = self.slot(seqno);
        if matches!(&self.slots[slot], Some(pkt) if pkt.seqno == seqno) {
            self.slots[slot] = None;
        }
    }
}
