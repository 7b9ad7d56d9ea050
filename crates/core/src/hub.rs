//! Command/event hub: the single object callers and observers talk to.
//!
//! Commands go out through [`GridHub::command`] (or the per-command helpers)
//! to whichever device is bound; decoded device events come back through the
//! bridge's read loop. Both are published to observers registered with
//! [`GridHub::on`], in registration order.
//!
//! The hub holds no protocol knowledge. It does own one piece of state, the
//! last known grid size, which only grid-size reports write.

use crate::bridge::{BridgeState, DeviceBridge, EventSink};
use crate::config::GridConfig;
use crate::device::{interface_for_vendor, DeviceFamily, DeviceIdentity};
use crate::error::Result;
use crate::event::{Command, EventKind, GridEvent, GridSize, InboundEvent, MapState};
use crate::protocol::Driver;
use crate::transport::GridTransport;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tracing::{debug, info, warn};

/// Handle returned by [`GridHub::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&GridEvent) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    kind: EventKind,
    observer: Observer,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

struct HubInner {
    config: GridConfig,
    registry: Mutex<Registry>,
    size: RwLock<GridSize>,
    device: Mutex<Option<DeviceBridge>>,
    bound: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HubInner {
    fn is_registered(&self, id: SubscriptionId) -> bool {
        lock(&self.registry).entries.iter().any(|e| e.id == id)
    }

    /// Drop a bound bridge whose read loop has already ended.
    fn release_dead_device(&self) {
        let mut device = lock(&self.device);
        if device
            .as_ref()
            .is_some_and(|b| b.state() == BridgeState::Disposed)
        {
            self.bound.store(false, Ordering::Release);
            if let Some(bridge) = device.take() {
                info!(family = %bridge.family(), "grid lost");
            }
        }
    }

    fn update_size(&self, x: u8, y: u8) {
        let size = GridSize::new(x, y);
        if !size.is_valid() {
            warn!(%size, "ignoring empty grid size report");
            return;
        }
        *self.size.write().unwrap_or_else(PoisonError::into_inner) = size;
        debug!(%size, "grid size updated");
    }

    /// Publish one event. Returns how many observers completed normally.
    fn emit(&self, event: &GridEvent) -> usize {
        match event {
            GridEvent::Input(InboundEvent::GridSize { x, y }) => self.update_size(*x, *y),
            GridEvent::Error { .. } => self.release_dead_device(),
            _ => {}
        }

        let kind = event.kind();
        let targets: Vec<(SubscriptionId, Observer)> = lock(&self.registry)
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| (e.id, Arc::clone(&e.observer)))
            .collect();

        if targets.is_empty() && !self.bound.load(Ordering::Acquire) {
            warn!(?kind, "there is no device connected. try calling connect() first");
        }

        let mut delivered = 0;
        for (id, observer) in targets {
            // Observers removed by an earlier observer in this pass are skipped.
            if !self.is_registered(id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| observer(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(?kind, subscription = id.0, "observer panicked"),
            }
        }
        delivered
    }
}

/// Weak link from a bridge's read loop back into the hub.
struct HubSink(Weak<HubInner>);

impl EventSink for HubSink {
    fn deliver(&self, event: GridEvent) {
        if let Some(inner) = self.0.upgrade() {
            inner.emit(&event);
        }
    }
}

/// Typed publish/subscribe point for one grid.
///
/// Cloning is cheap; clones share observers, size, and the bound device.
#[derive(Clone)]
pub struct GridHub {
    inner: Arc<HubInner>,
}

impl Default for GridHub {
    fn default() -> Self {
        Self::new()
    }
}

impl GridHub {
    pub fn new() -> Self {
        Self::from_config(GridConfig::default())
    }

    /// Create a hub with a validated configuration.
    pub fn with_config(config: GridConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: GridConfig) -> Self {
        let size = config.default_size;
        Self {
            inner: Arc::new(HubInner {
                config,
                registry: Mutex::new(Registry::default()),
                size: RwLock::new(size),
                device: Mutex::new(None),
                bound: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of the last known grid size.
    pub fn size(&self) -> GridSize {
        *self.inner.size.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for one event kind.
    pub fn on<F>(&self, kind: EventKind, observer: F) -> SubscriptionId
    where
        F: Fn(&GridEvent) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.inner.registry);
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.entries.push(Entry {
            id,
            kind,
            observer: Arc::new(observer),
        });
        id
    }

    /// Remove one observer. Returns whether it was registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut registry = lock(&self.inner.registry);
        let before = registry.entries.len();
        registry.entries.retain(|e| e.id != id);
        registry.entries.len() != before
    }

    /// Remove every observer of one kind. Returns how many were removed.
    pub fn off_kind(&self, kind: EventKind) -> usize {
        let mut registry = lock(&self.inner.registry);
        let before = registry.entries.len();
        registry.entries.retain(|e| e.kind != kind);
        before - registry.entries.len()
    }

    pub fn off_all(&self) {
        lock(&self.inner.registry).entries.clear();
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.inner.registry).entries.len()
    }

    /// Publish an event to observers, in registration order.
    ///
    /// Grid-size reports update [`GridHub::size`] before any observer runs.
    /// A panicking observer is logged and skipped; the rest still run.
    pub fn emit(&self, event: GridEvent) -> usize {
        self.inner.emit(&event)
    }

    /// Bind a device, replacing any current one.
    ///
    /// The current device is released before the new one is opened, so a
    /// failed connect leaves the hub with no device.
    ///
    /// Fails with `UnsupportedDevice` before anything is opened when the
    /// serial number matches no known family.
    pub fn connect(&self, transport: Arc<dyn GridTransport>) -> Result<DeviceFamily> {
        let identity = DeviceIdentity::classify(transport.serial_number())?;

        // The old handle must release its claim before a new one is taken.
        self.disconnect();

        transport.open()?;
        let interface = interface_for_vendor(transport.vendor_id());
        if let Err(e) = transport.claim_interface(interface) {
            if let Err(close_err) = transport.close() {
                debug!(error = %close_err, "close after failed claim");
            }
            return Err(e);
        }

        let mut bridge = DeviceBridge::new(
            transport,
            Driver::for_identity(&identity),
            &self.inner.config,
        );
        let sink: Arc<dyn EventSink> = Arc::new(HubSink(Arc::downgrade(&self.inner)));
        bridge.listen(sink)?;

        info!(serial = %identity.serial, family = %identity.family, "grid connected");
        *lock(&self.inner.device) = Some(bridge);
        self.inner.bound.store(true, Ordering::Release);
        Ok(identity.family)
    }

    /// Dispose the bound device, if any. Observers stay registered.
    pub fn disconnect(&self) {
        let bridge = lock(&self.inner.device).take();
        self.inner.bound.store(false, Ordering::Release);
        if let Some(mut bridge) = bridge {
            bridge.dispose();
            info!(family = %bridge.family(), "grid disconnected");
        }
    }

    /// Disconnect and drop every observer.
    pub fn dispose(&self) {
        self.disconnect();
        self.off_all();
    }

    /// Whether a bound device is still listening.
    pub fn is_connected(&self) -> bool {
        lock(&self.inner.device)
            .as_ref()
            .is_some_and(|b| b.state() == BridgeState::Listening)
    }

    pub fn family(&self) -> Option<DeviceFamily> {
        lock(&self.inner.device).as_ref().map(DeviceBridge::family)
    }

    /// Publish a command to observers, then send it to the bound device.
    ///
    /// Without a device the command is only published. A transport failure
    /// is returned to the caller and leaves the hub usable.
    pub fn command(&self, command: Command) -> Result<()> {
        self.inner.emit(&GridEvent::Command(command.clone()));

        let synthesized = match lock(&self.inner.device).as_ref() {
            Some(bridge) => bridge.send(&command)?,
            None => None,
        };
        if let Some(event) = synthesized {
            self.inner.emit(&GridEvent::Input(event));
        }
        Ok(())
    }

    pub fn query(&self) -> Result<()> {
        self.command(Command::Query)
    }

    pub fn get_id(&self) -> Result<()> {
        self.command(Command::GetId)
    }

    pub fn get_grid_size(&self) -> Result<()> {
        self.command(Command::GetGridSize)
    }

    pub fn led(&self, x: u8, y: u8, on: bool) -> Result<()> {
        self.command(Command::Led { x, y, on })
    }

    pub fn led_all(&self, on: bool) -> Result<()> {
        self.command(Command::LedAll { on })
    }

    pub fn led_row(&self, x: u8, y: u8, state: &[bool]) -> Result<()> {
        self.command(Command::LedRow {
            x,
            y,
            state: state.to_vec(),
        })
    }

    pub fn led_col(&self, x: u8, y: u8, state: &[bool]) -> Result<()> {
        self.command(Command::LedCol {
            x,
            y,
            state: state.to_vec(),
        })
    }

    pub fn led_map(&self, x: u8, y: u8, state: impl Into<MapState>) -> Result<()> {
        self.command(Command::LedMap {
            x,
            y,
            state: state.into(),
        })
    }

    pub fn intensity(&self, value: i32) -> Result<()> {
        self.command(Command::Intensity { value })
    }

    pub fn level(&self, x: u8, y: u8, level: i32) -> Result<()> {
        self.command(Command::Level { x, y, level })
    }

    pub fn level_all(&self, level: i32) -> Result<()> {
        self.command(Command::LevelAll { level })
    }

    pub fn level_row(&self, x: u8, y: u8, levels: &[i32]) -> Result<()> {
        self.command(Command::LevelRow {
            x,
            y,
            levels: levels.to_vec(),
        })
    }

    pub fn level_col(&self, x: u8, y: u8, levels: &[i32]) -> Result<()> {
        self.command(Command::LevelCol {
            x,
            y,
            levels: levels.to_vec(),
        })
    }

    pub fn level_map(&self, x: u8, y: u8, levels: &[i32]) -> Result<()> {
        self.command(Command::LevelMap {
            x,
            y,
            levels: levels.to_vec(),
        })
    }
}
