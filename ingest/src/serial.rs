//! Serial transport: raw byte stream from the sensor UART.

use crate::link::{
    LinkCounters, LinkError, LinkSink, LinkStats, LinkThreads, SharedSink, Transport, JOIN_TIMEOUT,
};
use sensor_models::{decode_frame, FrameAssembler};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout; bounds how long a stop request can go unnoticed
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 256_000,
            read_timeout: Duration::from_millis(50),
        }
    }
}

pub struct SerialLink {
    config: SerialConfig,
    counters: Arc<LinkCounters>,
    threads: Option<LinkThreads>,
}

impl SerialLink {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            counters: Arc::new(LinkCounters::default()),
            threads: None,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Transport for SerialLink {
    fn start(&mut self, sink: LinkSink) -> Result<(), LinkError> {
        if self.threads.is_some() {
            debug!("serial link already running");
            return Ok(());
        }
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(self.config.read_timeout)
            .open()
            .map_err(|source| LinkError::SerialOpen {
                port: self.config.port.clone(),
                source,
            })?;

        let mut threads = LinkThreads::new(sink);
        let running = Arc::clone(&threads.running);
        let shared = threads.sink.clone();
        let counters = Arc::clone(&self.counters);
        threads.spawn("serial-recv", move || {
            read_loop(port, &running, &shared, &counters)
        })?;

        info!(port = %self.config.port, baud = self.config.baud_rate, "serial link started");
        self.threads = Some(threads);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(threads) = self.threads.take() else {
            return;
        };
        threads.shutdown(JOIN_TIMEOUT);
        info!(stats = ?self.counters.snapshot(), "serial link stopped");
    }

    fn is_running(&self) -> bool {
        self.threads.is_some()
    }

    fn stats(&self) -> LinkStats {
        self.counters.snapshot()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read, reassemble and deliver frames until stopped, the stream ends or the
/// sink is closed.
pub(crate) fn read_loop<R: Read>(
    mut reader: R,
    running: &AtomicBool,
    sink: &SharedSink,
    counters: &LinkCounters,
) {
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 512];

    while running.load(Ordering::Relaxed) {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                debug!("serial stream ended");
                break;
            }
            Ok(n) => n,
            Err(e) if is_transient(&e) => continue,
            Err(e) => {
                warn!(error = %e, "serial read failed, link stopping");
                break;
            }
        };

        assembler.push(&buf[..n]);
        while let Some(frame) = assembler.next_frame() {
            match decode_frame(&frame) {
                Ok(batch) => {
                    counters.frame_received();
                    if !sink.frame(Instant::now()) {
                        return;
                    }
                    if batch.is_empty() {
                        continue;
                    }
                    if !sink.deliver(batch) {
                        return;
                    }
                    counters.delivered();
                }
                Err(e) => {
                    counters.malformed();
                    trace!(error = %e, "undecodable frame dropped");
                }
            }
        }
    }
    debug!(discarded = assembler.discarded(), "serial read loop finished");
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
