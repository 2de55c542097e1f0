use std::fs::File;
use std::io::{BufReader, Read};
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::congestion::CongestionController;
use crate::config::Config;
use crate::csvlog::CwndLog;
use crate::dup_ack::DupAckDetector;
use crate::packet::{wrapping_le, wrapping_lt, Flag, Packet, MAX_WINDOW, PAYLOAD_MAX};
use crate::ring::RetransmitBuffer;
use crate::rto::RtoEstimator;
use crate::timestamps::TimestampTable;
use crate::Error;

/// The sender loop and the three state machines it coordinates (send window,
/// RTO estimator, congestion controller) plus the single retransmission
/// timer they share.
///
/// Concurrency note (§5): the spec describes a main loop that masks an
/// asynchronous timer signal around every state-touching critical section,
/// unmasking only while blocked in receive. This implementation gets that
/// discipline for free from a single thread of control: the retransmission
/// "timer" is simply the deadline `recv_one` blocks against, so a timeout and
/// an incoming ACK are mutually exclusive outcomes of the same blocking call
/// rather than a signal racing the main loop.
pub struct Sender {
    socket: UdpSocket,
    file: Option<BufReader<File>>,

    send_base: u32,
    next_seqno: u32,

    ring: RetransmitBuffer,
    timestamps: TimestampTable,
    rto: RtoEstimator,
    cc: CongestionController,
    dup_ack: DupAckDetector,

    eof_read: bool,
    eof_sent: bool,
    eof_acked: bool,
    fin_packet: Option<Packet>,

    timer_deadline: Option<Instant>,
    cwnd_log: CwndLog,
}

impl Sender {
    pub fn new(config: Config) -> Result<Self, Error> {
        let file = File::open(&config.file_path).map_err(|source| Error::InputFile {
            path: config.file_path.display().to_string(),
            source,
        })?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(config.peer)?;

        let cwnd_log = match config.cwnd_log {
            Some(path) => CwndLog::open(&path),
            None => CwndLog::disabled(),
        };

        Ok(Sender {
            socket,
            file: Some(BufReader::new(file)),
            send_base: 0,
            next_seqno: 0,
            ring: RetransmitBuffer::new(MAX_WINDOW as usize),
            timestamps: TimestampTable::new(),
            rto: RtoEstimator::new(),
            cc: CongestionController::new(),
            dup_ack: DupAckDetector::new(),
            eof_read: false,
            eof_sent: false,
            eof_acked: false,
            fin_packet: None,
            timer_deadline: None,
            cwnd_log,
        })
    }

    /// Drive the transfer to completion. Returns `Ok(())` once the FIN has
    /// been acknowledged.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            if self.eof_acked {
                info!("FIN acknowledged, transfer complete");
                return Ok(());
            }

            self.fill()?;
            self.dispatch_fin()?;
            self.recv_one()?;
        }
    }

    fn admits_more(&self) -> bool {
        self.next_seqno
            < self
                .send_base
                .wrapping_add(self.cc.cwnd() * PAYLOAD_MAX as u32)
    }

    /// §4.5 step 2: read and transmit as many new DATA segments as the
    /// congestion window currently admits.
    fn fill(&mut self) -> Result<(), Error> {
        while !self.eof_read && self.admits_more() {
            let mut buf = vec![0u8; PAYLOAD_MAX];
            let n = self
                .file
                .as_mut()
                .expect("file handle closed only once at EOF")
                .read(&mut buf)?;

            if n == 0 {
                self.eof_read = true;
                self.fin_packet = Some(Packet::fin());
                self.file = None;
                debug!("end of file reached at next_seqno={}", self.next_seqno);
                break;
            }

            buf.truncate(n);
            let seqno = self.next_seqno;
            let first_in_flight = seqno == self.send_base;

            let pkt = Packet::data(seqno, buf);
            self.ring.store(pkt.clone());
            self.timestamps.record(seqno, false, Instant::now());
            self.send_packet(&pkt)?;

            self.next_seqno = self.next_seqno.wrapping_add(n as u32);

            if first_in_flight {
                self.arm_timer();
            }
        }
        Ok(())
    }

    /// §4.5 step 3: once every byte has been read and acked, send the FIN.
    fn dispatch_fin(&mut self) -> Result<(), Error> {
        if self.eof_read && !self.eof_sent && self.send_base == self.next_seqno {
            let fin = self.fin_packet.clone().expect("fin built when eof_read set");
            self.send_packet(&fin)?;
            self.eof_sent = true;
            self.arm_timer();
            info!("FIN sent at offset {}", self.next_seqno);
        }
        Ok(())
    }

    /// §4.5 step 4-5: block for one ACK (or the timer), then classify it.
    fn recv_one(&mut self) -> Result<(), Error> {
        let timeout = match self.timer_deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .max(Duration::from_millis(1)),
            None => Duration::from_secs(1),
        };
        self.socket.set_read_timeout(Some(timeout))?;

        let mut buf = [0u8; crate::packet::MSS];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                let pkt = match Packet::decode(&buf[..n]) {
                    Ok(pkt) => pkt,
                    Err(e) => {
                        warn!("dropping malformed datagram: {e}");
                        return Ok(());
                    }
                };
                self.handle_ack(pkt)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                if self.timer_deadline.is_some() {
                    self.handle_timeout()
                } else {
                    Ok(())
                }
            }
            Err(e) => {
                // Transport transient: receive failed without delivering data.
                warn!("transient receive error, continuing: {e}");
                Ok(())
            }
        }
    }

    fn handle_ack(&mut self, pkt: Packet) -> Result<(), Error> {
        if pkt.flags != Flag::Ack && pkt.flags != Flag::Fin {
            return Ok(());
        }

        let ackno = pkt.ackno;

        if self.eof_sent && pkt.flags == Flag::Fin && wrapping_le(self.next_seqno, ackno) {
            self.eof_acked = true;
            self.disarm_timer();
            info!("received FIN-ACK");
            return Ok(());
        }

        if wrapping_lt(self.next_seqno, ackno) {
            warn!(
                "protocol anomaly: ackno {ackno} outside [0, {}]",
                self.next_seqno
            );
            return Ok(());
        }

        if wrapping_lt(self.send_base, ackno) {
            self.handle_new_ack(ackno);
        } else if ackno == self.send_base {
            self.handle_possible_duplicate(ackno)?;
        }
        // ackno < send_base: stale ACK, ignored (monotone cumulative ACK).

        Ok(())
    }

    fn handle_new_ack(&mut self, ackno: u32) {
        let mut cursor = self.send_base;
        let mut last_retired = None;

        while wrapping_lt(cursor, ackno) {
            let Some(pkt) = self.ring.get(cursor) else {
                // §7 protocol anomaly: log and continue, but do not advance
                // state — every segment from `cursor` to `ackno` is left
                // in flight rather than treated as acknowledged.
                warn!(
                    "protocol anomaly: missing ring slot for seqno {cursor}, \
                     not advancing send_base past {}",
                    self.send_base
                );
                return;
            };
            let seg_end = cursor.wrapping_add(pkt.data_size());
            if !wrapping_le(seg_end, ackno) {
                break; // this segment is only partially covered by ackno; send_base still jumps to ackno below
            }

            self.ring.release(cursor);
            self.cc.on_new_ack();
            last_retired = Some(cursor);
            cursor = seg_end;
        }

        self.dup_ack.reset();

        if let Some(seqno) = last_retired {
            if let Some(sample) = self.timestamps.get(seqno) {
                if !sample.retransmitted {
                    self.rto.on_sample(sample.send_time.elapsed());
                }
            }
        }

        self.send_base = ackno;

        if self.send_base != self.next_seqno {
            self.arm_timer();
        } else {
            self.disarm_timer();
        }

        self.cwnd_log.log(self.cc.observed_cwnd(), self.cc.ssthresh());
        debug!(
            "new ack={ackno} send_base={} cwnd={} state={:?}",
            self.send_base,
            self.cc.cwnd(),
            self.cc.state()
        );
    }

    fn handle_possible_duplicate(&mut self, ackno: u32) -> Result<(), Error> {
        if !self.dup_ack.observe(ackno) {
            return Ok(());
        }

        info!("triple duplicate ACK at send_base={ackno}, fast retransmit");
        self.cc.on_triple_dup_ack();

        if let Some(pkt) = self.ring.get(self.send_base).cloned() {
            self.timestamps
                .record(self.send_base, true, Instant::now());
            self.send_packet(&pkt)?;
        } else {
            warn!(
                "protocol anomaly: no ring slot to fast-retransmit at send_base={}",
                self.send_base
            );
        }

        self.cwnd_log.log(self.cc.observed_cwnd(), self.cc.ssthresh());
        Ok(())
    }

    /// §4.6: the retransmission timer fired.
    fn handle_timeout(&mut self) -> Result<(), Error> {
        warn!(
            "timeout at send_base={}, consecutive_timeouts={}",
            self.send_base,
            self.rto.consecutive_timeouts() + 1
        );
        self.rto.on_timeout();
        self.cc.on_timeout();

        if self.eof_sent && !self.eof_acked {
            let fin = self.fin_packet.clone().expect("fin built once eof_sent");
            self.send_packet(&fin)?;
        } else if let Some(pkt) = self.ring.get(self.send_base).cloned() {
            self.timestamps
                .record(self.send_base, true, Instant::now());
            self.send_packet(&pkt)?;
        } else {
            warn!(
                "protocol anomaly: no ring slot to retransmit at send_base={}",
                self.send_base
            );
        }

        self.arm_timer();
        self.cwnd_log.log(self.cc.observed_cwnd(), self.cc.ssthresh());
        Ok(())
    }

    fn arm_timer(&mut self) {
        self.timer_deadline = Some(Instant::now() + self.rto.rto());
    }

    fn disarm_timer(&mut self) {
        self.timer_deadline = None;
    }

    fn send_packet(&self, pkt: &Packet) -> Result<(), Error> {
        let encoded = pkt.encode();
        self.socket.send(&encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::CongestionState;

    /// A `Sender` wired to a socket connected to itself, so `send_packet`
    /// succeeds without a live peer. Tests drive the handler methods
    /// directly rather than going through `run`'s blocking receive loop.
    fn new_test_sender() -> Sender {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        socket.connect(addr).unwrap();

        Sender {
            socket,
            file: None,
            send_base: 0,
            next_seqno: 0,
            ring: RetransmitBuffer::new(MAX_WINDOW as usize),
            timestamps: TimestampTable::new(),
            rto: RtoEstimator::new(),
            cc: CongestionController::new(),
            dup_ack: DupAckDetector::new(),
            eof_read: false,
            eof_sent: false,
            eof_acked: false,
            fin_packet: None,
            timer_deadline: None,
            cwnd_log: CwndLog::disabled(),
        }
    }

    /// Place an in-flight DATA segment in the window without going through `fill`.
    fn push_segment(sender: &mut Sender, seqno: u32, payload: Vec<u8>) {
        let pkt = Packet::data(seqno, payload);
        let end = seqno.wrapping_add(pkt.data_size());
        sender.ring.store(pkt);
        sender.timestamps.record(seqno, false, Instant::now());
        if wrapping_lt(sender.next_seqno, end) {
            sender.next_seqno = end;
        }
    }

    fn ack(sender: &mut Sender, ackno: u32) {
        sender
            .handle_ack(Packet {
                seqno: 0,
                ackno,
                flags: Flag::Ack,
                payload: Vec::new(),
            })
            .unwrap();
    }

    // S1: lossless fast path — a cumulative ACK for everything in flight
    // retires every segment and slides send_base all the way to it.
    #[test]
    fn lossless_ack_retires_every_covered_segment_and_slides_send_base() {
        let mut sender = new_test_sender();
        push_segment(&mut sender, 0, vec![0u8; 100]);
        push_segment(&mut sender, 100, vec![0u8; 100]);
        push_segment(&mut sender, 200, vec![0u8; 100]);

        ack(&mut sender, 300);

        assert_eq!(sender.send_base, 300);
        assert_eq!(sender.ring.get(0), None);
        assert_eq!(sender.ring.get(100), None);
        assert_eq!(sender.ring.get(200), None);
        assert_eq!(sender.cc.cwnd(), 4); // slow start: 1 + one per retired segment
        assert!(sender.timer_deadline.is_none()); // send_base caught up to next_seqno
    }

    // S2: a single lost segment surfaces as three duplicate ACKs at the same
    // send_base; the third one fires fast retransmit without sliding the window.
    #[test]
    fn triple_duplicate_ack_fast_retransmits_without_advancing_send_base() {
        let mut sender = new_test_sender();
        push_segment(&mut sender, 0, vec![0u8; 100]);
        push_segment(&mut sender, 100, vec![0u8; 100]);
        let cwnd_before = sender.cc.cwnd();

        ack(&mut sender, 0);
        ack(&mut sender, 0);
        assert_eq!(sender.cc.cwnd(), cwnd_before, "no collapse before the third duplicate");

        ack(&mut sender, 0);

        assert_eq!(sender.send_base, 0, "duplicate ACKs never advance send_base");
        assert_eq!(sender.cc.state(), CongestionState::SlowStart);
        assert_eq!(sender.cc.ssthresh(), (cwnd_before / 2).max(2));
        assert!(sender.ring.get(0).is_some(), "segment stays in the ring for retransmit");
    }

    // S3: a retransmission timeout collapses congestion state and backs off
    // RTO on the second consecutive timeout, exactly like `RtoEstimator` alone.
    #[test]
    fn timeout_collapses_congestion_state_and_backs_off_after_the_second_timeout() {
        let mut sender = new_test_sender();
        push_segment(&mut sender, 0, vec![0u8; 100]);
        sender.arm_timer();
        let rto_before = sender.rto.rto();

        sender.handle_timeout().unwrap();
        assert_eq!(sender.rto.rto(), rto_before, "first timeout does not back off");
        assert_eq!(sender.cc.cwnd(), 1);

        sender.handle_timeout().unwrap();
        assert_eq!(sender.rto.rto(), rto_before * 2);
        assert!(sender.timer_deadline.is_some(), "timer is re-armed after firing");
    }

    // S4: ACKs arriving out of order are still cumulative — a stale,
    // reordered ACK below the current send_base is a no-op, not a regression.
    #[test]
    fn reordered_stale_ack_is_ignored_after_a_later_cumulative_ack() {
        let mut sender = new_test_sender();
        push_segment(&mut sender, 0, vec![0u8; 100]);
        push_segment(&mut sender, 100, vec![0u8; 100]);
        push_segment(&mut sender, 200, vec![0u8; 100]);

        ack(&mut sender, 200);
        assert_eq!(sender.send_base, 200);

        ack(&mut sender, 100); // reordered: arrives late, already covered
        assert_eq!(sender.send_base, 200, "a stale ACK must not move send_base backwards");

        ack(&mut sender, 300);
        assert_eq!(sender.send_base, 300);
    }

    // S6: a final segment shorter than PAYLOAD_MAX retires like any other.
    #[test]
    fn short_final_segment_retires_like_a_full_size_segment() {
        let mut sender = new_test_sender();
        sender.send_base = 500;
        push_segment(&mut sender, 500, vec![0u8; 37]);

        ack(&mut sender, 537);

        assert_eq!(sender.send_base, 537);
        assert_eq!(sender.ring.get(500), None);
    }

    // S5: a duplicated FIN-ACK (network retransmitting the same ACK) must be
    // idempotent rather than re-running completion bookkeeping oddly.
    #[test]
    fn duplicate_fin_ack_is_idempotent() {
        let mut sender = new_test_sender();
        sender.next_seqno = 1000;
        sender.send_base = 1000;
        sender.eof_read = true;
        sender.eof_sent = true;
        sender.fin_packet = Some(Packet::fin());
        sender.arm_timer();

        let fin_ack = Packet {
            seqno: 0,
            ackno: 1000,
            flags: Flag::Fin,
            payload: Vec::new(),
        };

        sender.handle_ack(fin_ack.clone()).unwrap();
        assert!(sender.eof_acked);
        assert!(sender.timer_deadline.is_none());

        sender.handle_ack(fin_ack).unwrap();
        assert!(sender.eof_acked);
    }

    // Regression: a missing ring slot between send_base and an incoming
    // cumulative ACK is a protocol anomaly. §7 requires logging and
    // continuing without advancing state, rather than silently treating
    // the unaccounted-for segments as acknowledged.
    #[test]
    fn missing_ring_slot_anomaly_does_not_advance_send_base() {
        let mut sender = new_test_sender();
        push_segment(&mut sender, 0, vec![0u8; 100]);
        // seqno 100 is never pushed: simulates a ring slot lost to a bug
        // elsewhere, rather than a segment that was never sent.
        sender.next_seqno = 200;
        let cwnd_before = sender.cc.cwnd();

        ack(&mut sender, 200);

        assert_eq!(
            sender.send_base, 0,
            "send_base must not advance past the gap at seqno 100"
        );
        assert_eq!(
            sender.cc.cwnd(),
            cwnd_before + 1,
            "the one segment retired before the gap still counts"
        );
        assert_eq!(sender.ring.get(0), None, "the segment before the gap was released");
    }

    // The partial-ACK-inside-a-segment case is distinct from the anomaly
    // above: send_base still jumps to ackno even though the in-progress
    // segment is not fully covered (DESIGN.md Open Question #4).
    #[test]
    fn partial_ack_inside_a_segment_still_advances_send_base_to_ackno() {
        let mut sender = new_test_sender();
        push_segment(&mut sender, 0, vec![0u8; 100]);

        ack(&mut sender, 50);

        assert_eq!(sender.send_base, 50);
        assert_eq!(sender.cc.cwnd(), 1, "the partially-acked segment is not retired");
        assert!(sender.ring.get(0).is_some(), "the segment stays in the ring");
    }
}
