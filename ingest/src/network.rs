//! MQTT transport: each publish carries one frame as ASCII hex.
//!
//! Reception and dispatch run on separate threads joined by a bounded
//! drop-oldest queue, so a slow consumer never stalls the MQTT event loop.
//! Frame ticks bypass the queue and are reported from the receive thread.

use crate::link::{
    BatchQueue, LinkCounters, LinkError, LinkSink, LinkStats, LinkThreads, SharedSink, Transport,
    JOIN_TIMEOUT,
};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS, RecvTimeoutError};
use sensor_models::decode_hex_payload;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Pause between reconnection attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Batches buffered between reception and dispatch
    pub queue_depth: usize,
    /// Granularity at which the threads notice a stop request
    pub poll_interval: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1883,
            topic: "PondEyes/raw".into(),
            client_id: format!("radartrack-{}", std::process::id()),
            keep_alive: Duration::from_secs(60),
            queue_depth: 64,
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct MqttLink {
    config: MqttConfig,
    counters: Arc<LinkCounters>,
    client: Option<Client>,
    threads: Option<LinkThreads>,
}

impl MqttLink {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            counters: Arc::new(LinkCounters::default()),
            client: None,
            threads: None,
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    fn spawn_threads(
        &self,
        threads: &mut LinkThreads,
        client: Client,
        connection: Connection,
    ) -> Result<(), LinkError> {
        let queue = BatchQueue::new(self.config.queue_depth);

        let recv = Receiver {
            client,
            topic: self.config.topic.clone(),
            poll: self.config.poll_interval,
            running: Arc::clone(&threads.running),
            sink: threads.sink.clone(),
            queue: queue.clone(),
            counters: Arc::clone(&self.counters),
        };
        threads.spawn("mqtt-recv", move || recv.run(connection))?;

        let running = Arc::clone(&threads.running);
        let sink = threads.sink.clone();
        let counters = Arc::clone(&self.counters);
        let poll = self.config.poll_interval;
        threads.spawn("mqtt-dispatch", move || {
            dispatch_loop(&queue, &sink, &running, &counters, poll)
        })
    }
}

impl Transport for MqttLink {
    fn start(&mut self, sink: LinkSink) -> Result<(), LinkError> {
        if self.threads.is_some() {
            debug!("mqtt link already running");
            return Ok(());
        }
        let mut opts = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        opts.set_keep_alive(self.config.keep_alive);
        let (client, connection) = Client::new(opts, 10);

        let mut threads = LinkThreads::new(sink);
        if let Err(e) = self.spawn_threads(&mut threads, client.clone(), connection) {
            threads.shutdown(JOIN_TIMEOUT);
            return Err(e);
        }
        info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.topic,
            "mqtt link started"
        );
        self.client = Some(client);
        self.threads = Some(threads);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(threads) = self.threads.take() else {
            return;
        };
        if let Some(client) = self.client.take() {
            if let Err(e) = client.try_disconnect() {
                debug!(error = %e, "mqtt disconnect request failed");
            }
        }
        threads.shutdown(JOIN_TIMEOUT);
        info!(stats = ?self.counters.snapshot(), "mqtt link stopped");
    }

    fn is_running(&self) -> bool {
        self.threads.is_some()
    }

    fn stats(&self) -> LinkStats {
        self.counters.snapshot()
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

struct Receiver {
    client: Client,
    topic: String,
    poll: Duration,
    running: Arc<AtomicBool>,
    sink: SharedSink,
    queue: BatchQueue,
    counters: Arc<LinkCounters>,
}

impl Receiver {
    fn run(self, mut connection: Connection) {
        while self.running.load(Ordering::Relaxed) {
            match connection.recv_timeout(self.poll) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    info!(topic = %self.topic, "mqtt connected, subscribing");
                    if let Err(e) = self.client.try_subscribe(self.topic.as_str(), QoS::AtMostOnce) {
                        warn!(error = %e, "mqtt subscribe request failed");
                    }
                }
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    handle_payload(&publish.payload, &self.sink, &self.queue, &self.counters);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    if !self.running.load(Ordering::Relaxed) {
                        break;
                    }
                    warn!(error = %e, "mqtt connection error, retrying");
                    sleep_while_running(&self.running, RECONNECT_DELAY, self.poll);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("mqtt receive loop finished");
    }
}

/// Decode one publish payload, tick the sink and queue its batch. Malformed
/// payloads are counted and dropped; frames without targets are not queued.
fn handle_payload(
    payload: &[u8],
    sink: &SharedSink,
    queue: &BatchQueue,
    counters: &LinkCounters,
) {
    match decode_hex_payload(payload) {
        Ok(batch) => {
            counters.frame_received();
            sink.frame(Instant::now());
            if batch.is_empty() {
                return;
            }
            let dropped = queue.push(batch);
            if dropped > 0 {
                counters.dropped(dropped);
                debug!(dropped, "dispatch queue full, oldest batches discarded");
            }
        }
        Err(e) => {
            counters.malformed();
            trace!(error = %e, "malformed payload dropped");
        }
    }
}

fn dispatch_loop(
    queue: &BatchQueue,
    sink: &SharedSink,
    running: &AtomicBool,
    counters: &LinkCounters,
    poll: Duration,
) {
    while running.load(Ordering::Relaxed) {
        let Some(batch) = queue.pop_timeout(poll) else {
            continue;
        };
        if !sink.deliver(batch) {
            break;
        }
        counters.delivered();
    }
    debug!("mqtt dispatch loop finished");
}

fn sleep_while_running(running: &AtomicBool, total: Duration, step: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        thread::sleep(step.min(Duration::from_millis(20)));
    }
}
