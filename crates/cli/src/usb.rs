//! nusb-backed implementation of the core transport trait.

use futures_lite::future::block_on;
use gridlink_core::device::SUPPORTED_VENDORS;
use gridlink_core::error::{Error, Result};
use gridlink_core::transport::{Direction, GridTransport, InTransfer, OutTransfer, TransferStatus};
use nusb::transfer::{EndpointType, Queue, RequestBuffer, TransferError};
use nusb::{Device, DeviceInfo, Interface};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, trace};

const DIR_IN: u8 = 0x80;

/// Longest a single inbound wait lasts before checking for `close`.
const READ_POLL: Duration = Duration::from_millis(100);

/// Supported grids currently attached to the host.
pub fn list_grids() -> Result<Vec<DeviceInfo>> {
    let devices = nusb::list_devices().map_err(|e| Error::Transport(format!("enumerate: {e}")))?;
    Ok(devices
        .filter(|d| SUPPORTED_VENDORS.contains(&d.vendor_id()))
        .collect())
}

fn map_status(err: TransferError) -> Result<TransferStatus> {
    match err {
        TransferError::Disconnected => Err(Error::Disconnected),
        TransferError::Stall => Ok(TransferStatus::Stall),
        TransferError::Cancelled => Ok(TransferStatus::Other("cancelled".into())),
        other => Ok(TransferStatus::Other(other.to_string())),
    }
}

#[derive(Default)]
struct Handles {
    device: Option<Device>,
    interface: Option<Interface>,
}

/// Inbound transfers stay queued across polls, so a timeout loses no data.
struct InQueue {
    endpoint: u8,
    queue: Queue<RequestBuffer>,
}

/// One grid opened through nusb.
pub struct NusbTransport {
    info: DeviceInfo,
    serial: String,
    handles: Mutex<Handles>,
    reads: Mutex<Option<InQueue>>,
    runtime: Runtime,
}

impl NusbTransport {
    pub fn new(info: DeviceInfo) -> Result<Self> {
        let serial = info.serial_number().unwrap_or_default().to_string();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| Error::Transport(format!("timer runtime: {e}")))?;
        Ok(Self {
            info,
            serial,
            handles: Mutex::new(Handles::default()),
            reads: Mutex::new(None),
            runtime,
        })
    }

    /// Pick a grid by serial number, or the first one found.
    pub fn find(serial: Option<&str>) -> Result<Self> {
        let info = list_grids()?
            .into_iter()
            .find(|d| serial.map_or(true, |s| d.serial_number() == Some(s)))
            .ok_or_else(|| {
                Error::DeviceNotFound(match serial {
                    Some(s) => format!("no grid with serial {s}"),
                    None => "no supported grid attached".into(),
                })
            })?;
        Self::new(info)
    }

    fn handles(&self) -> MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reads(&self) -> MutexGuard<'_, Option<InQueue>> {
        self.reads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.handles().interface.is_none()
    }

    fn interface(&self) -> Result<Interface> {
        self.handles()
            .interface
            .clone()
            .ok_or_else(|| Error::Transport("interface not claimed".into()))
    }
}

impl GridTransport for NusbTransport {
    fn serial_number(&self) -> &str {
        &self.serial
    }

    fn vendor_id(&self) -> u16 {
        self.info.vendor_id()
    }

    fn open(&self) -> Result<()> {
        let device = self
            .info
            .open()
            .map_err(|e| Error::Transport(format!("open {}: {e}", self.serial)))?;
        self.handles().device = Some(device);
        Ok(())
    }

    fn claim_interface(&self, interface: u8) -> Result<()> {
        let mut handles = self.handles();
        let device = handles
            .device
            .as_ref()
            .ok_or_else(|| Error::Transport("device not open".into()))?;
        let claimed = device
            .detach_and_claim_interface(interface)
            .map_err(|e| Error::Transport(format!("claim interface {interface}: {e}")))?;
        debug!(interface, serial = %self.serial, "interface claimed");
        handles.interface = Some(claimed);
        Ok(())
    }

    fn endpoint(&self, direction: Direction) -> Option<u8> {
        let handles = self.handles();
        let number = handles.interface.as_ref()?.interface_number();
        let config = handles.device.as_ref()?.active_configuration().ok()?;
        let want = match direction {
            Direction::In => nusb::transfer::Direction::In,
            Direction::Out => nusb::transfer::Direction::Out,
        };
        let found = config
            .interface_alt_settings()
            .filter(|alt| alt.interface_number() == number)
            .flat_map(|alt| {
                alt.endpoints()
                    .map(|ep| (ep.transfer_type(), ep.direction(), ep.address()))
                    .collect::<Vec<_>>()
            })
            .find(|&(ty, dir, _)| ty == EndpointType::Bulk && dir == want)
            .map(|(_, _, address)| address & 0x0F);
        found
    }

    fn transfer_in(&self, endpoint: u8, max_length: usize) -> Result<InTransfer> {
        let mut reads = self.reads();
        if self.is_closed() {
            drop_queue(&mut reads);
            return Err(Error::Disconnected);
        }
        if reads.as_ref().map(|r| r.endpoint) != Some(endpoint) {
            let queue = self.interface()?.bulk_in_queue(DIR_IN | endpoint);
            *reads = Some(InQueue { endpoint, queue });
        }
        let Some(InQueue { queue, .. }) = reads.as_mut() else {
            return Err(Error::Disconnected);
        };
        if queue.pending() == 0 {
            queue.submit(RequestBuffer::new(max_length));
        }

        let waited = self
            .runtime
            .block_on(async { tokio::time::timeout(READ_POLL, queue.next_complete()).await });
        let Ok(completion) = waited else {
            if self.is_closed() {
                drop_queue(&mut reads);
                return Err(Error::Disconnected);
            }
            // Nothing yet; an empty ok read lets the caller re-check liveness.
            return Ok(InTransfer {
                status: TransferStatus::Ok,
                data: Vec::new(),
            });
        };

        let status = match completion.status {
            Ok(()) => TransferStatus::Ok,
            Err(e) => map_status(e)?,
        };
        trace!(len = completion.data.len(), %status, "bulk in");
        Ok(InTransfer {
            status,
            data: completion.data,
        })
    }

    fn transfer_out(&self, endpoint: u8, data: &[u8]) -> Result<OutTransfer> {
        let interface = self.interface()?;
        let completion = block_on(interface.bulk_out(endpoint, data.to_vec()));
        let status = match completion.status {
            Ok(()) => TransferStatus::Ok,
            Err(e) => map_status(e)?,
        };
        Ok(OutTransfer {
            status,
            bytes_written: completion.data.actual_length(),
        })
    }

    fn close(&self) -> Result<()> {
        {
            let mut handles = self.handles();
            handles.interface = None;
            handles.device = None;
        }
        // A reader mid-wait holds the queue; it drops it at its next poll.
        if let Ok(mut reads) = self.reads.try_lock() {
            drop_queue(&mut reads);
        }
        debug!(serial = %self.serial, "device closed");
        Ok(())
    }
}

/// Cancel pending inbound transfers and release the queue's interface handle.
fn drop_queue(reads: &mut Option<InQueue>) {
    if let Some(mut r) = reads.take() {
        r.queue.cancel_all();
    }
}
