//! Device bridge: owns one open transport, runs the inbound read loop, and
//! forwards commands to the bound protocol driver.
//!
//! Lifecycle is `Idle → Listening → Disposed`. The reader is a dedicated
//! thread looping on a blocking `transfer_in`; disposal clears the liveness
//! flag and closes the transport, and the loop exits at its next wake-up
//! without delivering anything further.

use crate::config::GridConfig;
use crate::device::DeviceFamily;
use crate::error::{Error, Result};
use crate::event::{Command, GridEvent, InboundEvent};
use crate::protocol::{Driver, GridProtocol, Outbound};
use crate::transport::{Direction, GridTransport, OutTransfer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Delay step after a non-ok inbound transfer; grows with each repeat.
const STATUS_BACKOFF: Duration = Duration::from_millis(10);
/// Cap on backoff steps, so a stuck endpoint is polled every 100ms.
const MAX_BACKOFF_STEPS: u32 = 10;

/// Sleep before the next read after `failures` non-ok transfers in a row.
fn status_backoff(failures: u32) -> Duration {
    STATUS_BACKOFF * failures.min(MAX_BACKOFF_STEPS)
}

/// Receiver for events decoded by the read loop.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: GridEvent);
}

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Listening,
    Disposed,
}

/// Everything the reader thread needs, moved into it at `listen`.
struct Reader {
    transport: Arc<dyn GridTransport>,
    driver: Driver,
    sink: Arc<dyn EventSink>,
    live: Arc<AtomicBool>,
    endpoint: u8,
    read_length: usize,
}

impl Reader {
    fn run(self) {
        debug!(endpoint = self.endpoint, "grid reader started");

        let mut failures = 0u32;
        while self.live.load(Ordering::Acquire) {
            match self.transport.transfer_in(self.endpoint, self.read_length) {
                Ok(transfer) => {
                    if !self.live.load(Ordering::Acquire) {
                        break;
                    }
                    if !transfer.status.is_ok() {
                        failures += 1;
                        if failures == 1 {
                            warn!(status = %transfer.status, "transfer in status not ok");
                        } else {
                            debug!(status = %transfer.status, failures, "transfer in still failing");
                        }
                        std::thread::sleep(status_backoff(failures));
                        continue;
                    }
                    if failures > 0 {
                        debug!(failures, "transfer in recovered");
                        failures = 0;
                    }
                    if transfer.data.is_empty() {
                        continue;
                    }
                    trace!(bytes = format_args!("{:02X?}", transfer.data), "grid RX");

                    let decoded = self.driver.decode(&transfer.data);
                    if decoded.consumed < transfer.data.len() {
                        trace!(
                            consumed = decoded.consumed,
                            len = transfer.data.len(),
                            "undecoded tail dropped"
                        );
                    }
                    for event in decoded.events {
                        if !self.live.load(Ordering::Acquire) {
                            break;
                        }
                        self.sink.deliver(GridEvent::Input(event));
                    }
                }
                Err(e) => {
                    // Only the side that flips the flag reports; a disposal
                    // racing with the failure stays silent.
                    if self.live.swap(false, Ordering::AcqRel) {
                        warn!(error = %e, "listen error");
                        if let Err(close_err) = self.transport.close() {
                            debug!(error = %close_err, "close after read failure");
                        }
                        self.sink.deliver(GridEvent::Error {
                            message: e.to_string(),
                        });
                    }
                    break;
                }
            }
        }

        debug!("grid reader exiting");
    }
}

fn resolve_endpoint(transport: &dyn GridTransport, direction: Direction, fallback: u8) -> u8 {
    match transport.endpoint(direction) {
        Some(ep) => ep,
        None => {
            warn!(
                ?direction,
                fallback, "endpoint descriptor lookup failed, using default"
            );
            fallback
        }
    }
}

/// One open device bound to one protocol driver.
pub struct DeviceBridge {
    transport: Arc<dyn GridTransport>,
    driver: Driver,
    endpoint_in: u8,
    endpoint_out: u8,
    read_length: usize,
    live: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
}

impl DeviceBridge {
    /// Bind an already opened and claimed transport to a driver.
    pub fn new(transport: Arc<dyn GridTransport>, driver: Driver, config: &GridConfig) -> Self {
        let endpoint_in = resolve_endpoint(transport.as_ref(), Direction::In, config.endpoint_in);
        let endpoint_out =
            resolve_endpoint(transport.as_ref(), Direction::Out, config.endpoint_out);
        Self {
            transport,
            driver,
            endpoint_in,
            endpoint_out,
            read_length: config.read_length,
            live: Arc::new(AtomicBool::new(true)),
            listener: None,
        }
    }

    pub fn family(&self) -> DeviceFamily {
        self.driver.family()
    }

    pub fn endpoints(&self) -> (u8, u8) {
        (self.endpoint_in, self.endpoint_out)
    }

    pub fn state(&self) -> BridgeState {
        if !self.live.load(Ordering::Acquire) {
            BridgeState::Disposed
        } else if self.listener.is_some() {
            BridgeState::Listening
        } else {
            BridgeState::Idle
        }
    }

    /// Start the read loop. Calling it again while listening is a no-op.
    pub fn listen(&mut self, sink: Arc<dyn EventSink>) -> Result<()> {
        match self.state() {
            BridgeState::Listening => return Ok(()),
            BridgeState::Disposed => return Err(Error::Disconnected),
            BridgeState::Idle => {}
        }

        let reader = Reader {
            transport: Arc::clone(&self.transport),
            driver: self.driver.clone(),
            sink,
            live: Arc::clone(&self.live),
            endpoint: self.endpoint_in,
            read_length: self.read_length,
        };
        let handle = std::thread::Builder::new()
            .name(format!("gridlink-{}-reader", self.driver.family()))
            .spawn(move || reader.run())
            .map_err(|e| Error::Transport(format!("spawn reader: {e}")))?;
        self.listener = Some(handle);
        Ok(())
    }

    /// Write raw bytes to the outbound endpoint.
    ///
    /// A non-ok status or a short write is an error for this call only.
    pub fn write(&self, data: &[u8]) -> Result<OutTransfer> {
        if !self.live.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }
        trace!(
            endpoint = self.endpoint_out,
            bytes = format_args!("{:02X?}", data),
            "grid TX"
        );

        let result = self.transport.transfer_out(self.endpoint_out, data)?;
        if !result.status.is_ok() {
            return Err(Error::WriteStatus {
                status: result.status.to_string(),
            });
        }
        if result.bytes_written != data.len() {
            return Err(Error::MissingBytes {
                written: result.bytes_written,
                expected: data.len(),
            });
        }
        Ok(result)
    }

    /// Encode a command with the bound driver and write it.
    ///
    /// Returns the event to publish when the driver answers locally instead
    /// of going to the wire.
    pub fn send(&self, command: &Command) -> Result<Option<InboundEvent>> {
        match self.driver.encode(command) {
            Outbound::Wire(msg) => {
                trace!(command = ?msg.origin.kind(), degraded = msg.degraded.is_some(), "encoded");
                self.write(&msg.bytes)?;
                Ok(None)
            }
            Outbound::Synthesized(event) => Ok(Some(event)),
            Outbound::Unsupported(what) => {
                debug!(what, family = %self.driver.family(), "command not sent");
                Ok(None)
            }
        }
    }

    /// Stop listening and close the transport. Idempotent.
    pub fn dispose(&mut self) {
        if self.live.swap(false, Ordering::AcqRel) {
            debug!(family = %self.driver.family(), "disposing device bridge");
            if let Err(e) = self.transport.close() {
                warn!(error = %e, "close failed during dispose");
            }
        }
    }

    /// Wait for the reader thread to exit.
    ///
    /// Returns immediately when called from the reader thread itself or when
    /// no reader was started. The transport must unblock a pending
    /// `transfer_in` once closed, or this waits for the next transfer.
    pub fn join(&mut self) {
        let Some(handle) = self.listener.take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("grid reader thread panicked");
        }
    }
}

impl Drop for DeviceBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}
