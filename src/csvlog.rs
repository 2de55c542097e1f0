use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Optional, non-critical append-only log of CWND/SSTHRESH changes, one row
/// per observable change: `<unix_seconds.microseconds>, <cwnd>, <ssthresh>`.
/// A write failure is logged and swallowed rather than aborting the transfer.
pub struct CwndLog {
    writer: Option<csv::Writer<std::fs::File>>,
}

impl CwndLog {
    pub fn open(path: &str) -> Self {
        let writer = match csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
        {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("could not open {path} for CWND logging: {e}");
                None
            }
        };
        CwndLog { writer }
    }

    pub fn disabled() -> Self {
        CwndLog { writer: None }
    }

    pub fn log(&mut self, cwnd: f64, ssthresh: u32) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let timestamp = now.as_secs_f64();

        let record = (
            format!("{timestamp:.6}"),
            format!("{cwnd:.2}"),
            ssthresh.to_string(),
        );

        if let Err(e) = writer.serialize(record) {
            warn!("failed to write CWND log row: {e}");
            return;
        }
        if let Err(e) = writer.flush() {
            warn!("failed to flush CWND log: {e}");
        }
    }
}
