//! Printer manager: discovery, the connection state machine, and job submission.
//!
//! All platform callbacks are drained by one dispatcher task, and caller
//! operations that change the connection (`connect`, `disconnect`, starting
//! a scan) are serialized by an operation lock. Shared state lives behind
//! short-lived `parking_lot` locks that are never held across an await.
//!
//! ## Connecting
//!
//! ```text
//! connect(id)
//!   ├─ unknown id ──► Scanning(id) ──(10s)──► Failed(DeviceNotFound)
//!   ├─ printer-like ─► ConnectingClassic ──ok──► Ready
//!   │                        └─ error / 15s ─┐
//!   └─ otherwise ────────────────────────────┴► ConnectingBLE ── error / 15s ──► Failed(ConnectionTimeout)
//!                                                     └─ link up ─► DiscoveringCapabilities ─► Ready
//! ```

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{select_write_endpoint, BluetoothBackend, PlatformEvent};
use crate::ble::BtleplugBackend;
use crate::config::ManagerConfig;
use crate::connection::{Connection, ConnectionState, FailureReason, TransportKind};
use crate::device::{normalize_identifier, Device, ScanSession};
use crate::error::{Error, Result};
use crate::events::{CallbackHandle, ConnectionStatus, EventBus, PrinterEvent};
use crate::protocol::{render_image, render_qr, PaperWidth, PrintJob, TextStyle};
use crate::transmit;

/// How a scan session ended.
#[derive(Debug, Clone)]
enum ScanEnd {
    Running,
    Finished(Vec<Device>),
    Failed(i32),
}

/// Bookkeeping for the caller-visible scan session.
#[derive(Default)]
struct ScanControl {
    /// Bumped on every start and stop so late timers can tell they are stale.
    epoch: u64,
    active: bool,
    timer: Option<JoinHandle<()>>,
    done: Option<watch::Sender<ScanEnd>>,
}

/// Stops a lookup scan even if `connect` is cancelled mid-lookup.
struct LookupScan {
    backend: Arc<dyn BluetoothBackend>,
    active: bool,
}

impl LookupScan {
    async fn start(backend: Arc<dyn BluetoothBackend>) -> Result<Self> {
        backend.start_scan().await?;
        Ok(Self {
            backend,
            active: true,
        })
    }

    async fn stop(mut self) {
        self.active = false;
        if let Err(e) = self.backend.stop_scan().await {
            warn!("Error stopping lookup scan: {}", e);
        }
    }
}

/// The connection attempt in flight, so the dispatcher can fail it when
/// its link drops before the connection is installed.
struct Attempt {
    target: String,
    link_down: watch::Sender<bool>,
}

impl Drop for LookupScan {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let backend = self.backend.clone();
            handle.spawn(async move {
                if let Err(e) = backend.stop_scan().await {
                    warn!("Error stopping abandoned lookup scan: {}", e);
                }
            });
        }
    }
}

struct Inner {
    backend: Arc<dyn BluetoothBackend>,
    config: ManagerConfig,
    events: EventBus,
    state: RwLock<ConnectionState>,
    session: RwLock<ScanSession>,
    scan: Mutex<ScanControl>,
    /// Every device seen since startup, used to resolve `connect` targets.
    known: RwLock<HashMap<String, Device>>,
    /// Bumped whenever `known` changes.
    seen_tx: watch::Sender<u64>,
    connection: RwLock<Option<Arc<Connection>>>,
    attempt: Mutex<Option<Attempt>>,
    /// Serializes connect, disconnect, and scan start.
    op_lock: tokio::sync::Mutex<()>,
    /// Held while a torn-down transport is being released.
    release_lock: tokio::sync::Mutex<()>,
    /// Bumped by `disconnect` to abort an in-flight `connect`.
    cancel_tx: watch::Sender<u64>,
    adapter_powered: AtomicBool,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Update the state and emit an event if it changed.
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state.clone());

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
            self.events.emit(PrinterEvent::StateChanged(new_state));
        }
    }

    fn known_device(&self, id: &str) -> Option<Device> {
        self.known.read().get(id).cloned()
    }

    fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection.read().clone()
    }

    fn ready_connection(&self) -> Result<Arc<Connection>> {
        let connection = self.current_connection().ok_or(Error::NotConnected)?;
        if connection.is_lost() || !connection.has_write_endpoint() {
            return Err(Error::NotConnected);
        }
        Ok(connection)
    }

    async fn dispatch(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<PlatformEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.handle_platform_event(event).await;
        }
        debug!("Platform event dispatcher ended");
    }

    async fn handle_platform_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::StateUpdate { powered } => {
                let was_powered = self.adapter_powered.swap(powered, Ordering::SeqCst);
                if was_powered != powered {
                    info!("Bluetooth adapter powered {}", if powered { "on" } else { "off" });
                }
                if !powered {
                    self.finish_scan(None, false, None).await;
                    self.teardown(None).await;
                }
            }
            PlatformEvent::DeviceDiscovered(device) => self.record_device(device),
            PlatformEvent::ScanFailed { code } => {
                if self.finish_scan(None, false, Some(code)).await {
                    error!("Scan failed with code {}", code);
                }
            }
            PlatformEvent::Connected { id } => {
                debug!("Link up: {}", id);
            }
            PlatformEvent::Disconnected { id } => {
                let id = normalize_identifier(&id);
                if self.mark_link_down(&id) {
                    warn!("Link to {} dropped while connecting", id);
                } else if self.teardown(Some(&id)).await {
                    info!("Printer {} disconnected remotely", id);
                } else {
                    debug!("Ignoring disconnect from {}", id);
                }
            }
        }
    }

    /// Flag the in-flight attempt to `id` as failed if its GATT link is up
    /// but the connection is not installed yet.
    fn mark_link_down(&self, id: &str) -> bool {
        let attempt = self.attempt.lock();
        let Some(attempt) = attempt.as_ref().filter(|a| a.target == id) else {
            return false;
        };
        if !matches!(
            self.state(),
            ConnectionState::ConnectingBle | ConnectionState::DiscoveringCapabilities
        ) {
            return false;
        }
        attempt.link_down.send_replace(true);
        true
    }

    /// Install the connection and go `Ready`, unless its link dropped
    /// during the attempt.
    ///
    /// Checked under the attempt lock, so a disconnect either flags the
    /// attempt or finds the installed connection. The slot stays locked
    /// until `Ready` is published, so a teardown always lands after it.
    fn install(&self, connection: Connection) -> std::result::Result<(), Connection> {
        let mut attempt = self.attempt.lock();
        if attempt.take().is_some_and(|a| *a.link_down.borrow()) {
            return Err(connection);
        }
        let id = connection.device().id.clone();
        let mut slot = self.connection.write();
        *slot = Some(Arc::new(connection));
        self.set_state(ConnectionState::Ready);
        self.events
            .emit_connection(ConnectionStatus::Connected, &id, None);
        Ok(())
    }

    fn is_current_scan(&self, epoch: u64) -> bool {
        let scan = self.scan.lock();
        scan.active && scan.epoch == epoch
    }

    /// Remember a device and surface it to the active scan session.
    fn record_device(&self, device: Device) {
        self.known
            .write()
            .entry(device.id.clone())
            .and_modify(|known| known.merge(&device))
            .or_insert_with(|| device.clone());
        self.seen_tx.send_modify(|n| *n = n.wrapping_add(1));

        let found = {
            let scan = self.scan.lock();
            if !scan.active {
                return;
            }
            let mut session = self.session.write();
            if !session.record(device.clone()) {
                return;
            }
            session.get(&device.id).cloned().unwrap_or(device)
        };

        info!("Found device {}", found);
        self.events.emit(PrinterEvent::DeviceFound(found));
    }

    async fn begin_scan(self: &Arc<Self>) -> Result<watch::Receiver<ScanEnd>> {
        let _op = self.op_lock.try_lock().map_err(|_| Error::Busy { operation: "scan" })?;

        // A new scan replaces the running one.
        if self.finish_scan(None, false, None).await {
            debug!("Previous scan stopped for a new session");
        }

        if !self.backend.has_permissions().await {
            return Err(Error::PermissionDenied);
        }
        if !self.backend.is_enabled().await {
            return Err(Error::BluetoothDisabled);
        }

        let (done_tx, done_rx) = watch::channel(ScanEnd::Running);
        let epoch = {
            let mut scan = self.scan.lock();
            scan.epoch += 1;
            scan.active = true;
            scan.done = Some(done_tx);
            *self.session.write() = ScanSession::new(self.config.scan_timeout);
            scan.epoch
        };

        if !self.state().is_ready() {
            self.set_state(ConnectionState::Scanning { target: None });
        }
        info!("Starting scan (timeout {:?})", self.config.scan_timeout);

        match self.backend.bonded_devices().await {
            Ok(bonded) => {
                for device in bonded.into_iter().filter(Device::matches_printer_name) {
                    self.record_device(device);
                }
            }
            Err(e) => warn!("Could not list bonded devices: {}", e),
        }

        if !self.is_current_scan(epoch) {
            debug!("Scan stopped before the radio started");
            return Ok(done_rx);
        }

        if let Err(e) = self.backend.start_scan().await {
            error!("Failed to start scan: {}", e);
            let e = match e {
                Error::PermissionDenied | Error::ScanFailed { .. } => e,
                _ => Error::ScanFailed { code: -1 },
            };
            let code = match e {
                Error::ScanFailed { code } => code,
                _ => -1,
            };
            self.finish_scan(Some(epoch), false, Some(code)).await;
            return Err(e);
        }

        let weak = Arc::downgrade(self);
        let timeout = self.config.scan_timeout;
        let stale = {
            let mut scan = self.scan.lock();
            if scan.active && scan.epoch == epoch {
                scan.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(inner) = weak.upgrade() {
                        if inner.finish_scan(Some(epoch), true, None).await {
                            info!("Scan finished after {:?}", timeout);
                        }
                    }
                }));
                false
            } else {
                true
            }
        };

        // Stopped while the radio was starting; the stop already went out.
        if stale {
            debug!("Scan stopped while starting, stopping the radio again");
            if let Err(e) = self.backend.stop_scan().await {
                warn!("Error stopping scan: {}", e);
            }
        }

        Ok(done_rx)
    }

    /// End the active scan. With `epoch` set, only that session is ended.
    ///
    /// Returns `false` when there was nothing to end, which makes late
    /// timers and repeated stops no-ops.
    async fn finish_scan(&self, epoch: Option<u64>, from_timer: bool, failure: Option<i32>) -> bool {
        let done = {
            let mut scan = self.scan.lock();
            if !scan.active || epoch.is_some_and(|e| e != scan.epoch) {
                return false;
            }
            scan.active = false;
            scan.epoch += 1;
            if let Some(timer) = scan.timer.take() {
                // The timer must not abort itself before stopping the radio.
                if !from_timer {
                    timer.abort();
                }
            }
            scan.done.take()
        };

        if let Err(e) = self.backend.stop_scan().await {
            warn!("Error stopping scan: {}", e);
        }

        let devices = self.session.read().devices();
        debug!("Scan session ended with {} device(s)", devices.len());

        let was_scanning = matches!(self.state(), ConnectionState::Scanning { target: None });
        if was_scanning {
            self.set_state(ConnectionState::Idle);
        }

        if let Some(done) = done {
            done.send_replace(match failure {
                Some(code) => ScanEnd::Failed(code),
                None => ScanEnd::Finished(devices),
            });
        }
        true
    }

    /// Resolve `id` against known and bonded devices, scanning if needed.
    async fn resolve_device(&self, id: &str) -> Result<Device> {
        if let Some(device) = self.known_device(id) {
            return Ok(device);
        }

        match self.backend.bonded_devices().await {
            Ok(bonded) => bonded.into_iter().for_each(|d| self.record_device(d)),
            Err(e) => debug!("Could not list bonded devices: {}", e),
        }
        if let Some(device) = self.known_device(id) {
            return Ok(device);
        }

        self.set_state(ConnectionState::Scanning {
            target: Some(id.to_string()),
        });
        info!(
            "{} not known, scanning for up to {:?}",
            id, self.config.lookup_timeout
        );

        let mut seen = self.seen_tx.subscribe();
        let lookup = LookupScan::start(self.backend.clone())
            .await
            .map_err(|e| match e {
                Error::PermissionDenied => e,
                other => Error::ConnectionFailed {
                    reason: format!("scan for {} failed: {}", id, other),
                },
            })?;

        let found = tokio::time::timeout(self.config.lookup_timeout, async {
            loop {
                if let Some(device) = self.known_device(id) {
                    return Some(device);
                }
                if seen.changed().await.is_err() {
                    return None;
                }
            }
        })
        .await;

        lookup.stop().await;

        match found {
            Ok(Some(device)) => {
                info!("Found {} during lookup", device);
                Ok(device)
            }
            _ => Err(Error::DeviceNotFound {
                identifier: id.to_string(),
            }),
        }
    }

    /// Walk the transport ladder: Classic for printer-like devices, then BLE.
    async fn establish(&self, id: &str) -> Result<Connection> {
        if !self.backend.has_permissions().await {
            return Err(Error::PermissionDenied);
        }
        if !self.backend.is_enabled().await {
            return Err(Error::BluetoothDisabled);
        }

        // Wait for a transport that is still being released.
        drop(self.release_lock.lock().await);

        let device = self.resolve_device(id).await?;
        let timeout = self.config.connect_timeout;

        if device.is_printer_like() {
            self.set_state(ConnectionState::ConnectingClassic);
            info!("Opening serial-profile socket to {}", device);

            let attempt = tokio::time::timeout(
                timeout,
                self.backend.open_serial(&device, self.config.rfcomm_channel),
            )
            .await;

            match attempt {
                Ok(Ok(stream)) => return Ok(Connection::classic(device, stream)),
                Ok(Err(Error::PermissionDenied)) => return Err(Error::PermissionDenied),
                Ok(Err(e)) => warn!(
                    "Classic connection to {} failed: {}; falling back to BLE",
                    device.id, e
                ),
                Err(_) => warn!(
                    "Classic connection to {} timed out after {:?}; falling back to BLE",
                    device.id, timeout
                ),
            }
        } else {
            debug!("{} does not look like a serial printer, using BLE", device);
        }

        self.set_state(ConnectionState::ConnectingBle);
        info!("Establishing GATT link to {}", device);

        let link = match tokio::time::timeout(timeout, self.backend.connect_gatt(&device)).await {
            Ok(Ok(link)) => link,
            Ok(Err(Error::PermissionDenied)) => return Err(Error::PermissionDenied),
            Ok(Err(e)) => {
                warn!("GATT link to {} failed: {}", device.id, e);
                return Err(Error::ConnectionTimeout);
            }
            Err(_) => {
                warn!("GATT link to {} timed out after {:?}", device.id, timeout);
                return Err(Error::ConnectionTimeout);
            }
        };

        self.set_state(ConnectionState::DiscoveringCapabilities);

        let endpoint = match tokio::time::timeout(timeout, link.discover_characteristics()).await {
            Ok(Ok(characteristics)) => {
                let endpoint = select_write_endpoint(&characteristics);
                match &endpoint {
                    Some(c) => info!(
                        "Writing to characteristic {} (service {}) on {}",
                        c.uuid, c.service, device.id
                    ),
                    None => warn!(
                        "No writable characteristic among {} on {}",
                        characteristics.len(),
                        device.id
                    ),
                }
                endpoint
            }
            Ok(Err(e)) => {
                warn!("Capability discovery on {} failed: {}", device.id, e);
                None
            }
            Err(_) => {
                warn!("Capability discovery on {} timed out", device.id);
                None
            }
        };

        Ok(Connection::ble(device, link, endpoint, self.config.chunk_size))
    }

    /// Tear down the active connection, optionally only if it belongs to `only`.
    ///
    /// Returns `true` if a connection was torn down.
    async fn teardown(&self, only: Option<&str>) -> bool {
        let _release = self.release_lock.lock().await;

        let connection = {
            let mut slot = self.connection.write();
            let selected = slot
                .as_ref()
                .is_some_and(|c| only.map_or(true, |id| c.device().id == id));
            if selected {
                slot.take()
            } else {
                None
            }
        };
        let Some(connection) = connection else {
            return false;
        };

        connection.close().await;
        self.set_state(ConnectionState::Disconnected);
        self.events
            .emit_connection(ConnectionStatus::Disconnected, &connection.device().id, None);
        true
    }
}

/// Central manager for a single thermal printer connection.
pub struct PrinterManager {
    inner: Arc<Inner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PrinterManager {
    /// Create a manager on the first system Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(ManagerConfig::default()).await
    }

    /// Create a manager on the first system adapter with custom settings.
    pub async fn with_config(config: ManagerConfig) -> Result<Self> {
        let backend = BtleplugBackend::new().await?;
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// Create a manager over any [`BluetoothBackend`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_backend(backend: Arc<dyn BluetoothBackend>, config: ManagerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        backend.attach(events_tx);

        let (seen_tx, _) = watch::channel(0);
        let (cancel_tx, _) = watch::channel(0);

        let inner = Arc::new(Inner {
            backend,
            events: EventBus::new(config.event_capacity),
            session: RwLock::new(ScanSession::new(config.scan_timeout)),
            config,
            state: RwLock::new(ConnectionState::Idle),
            scan: Mutex::new(ScanControl::default()),
            known: RwLock::new(HashMap::new()),
            seen_tx,
            connection: RwLock::new(None),
            attempt: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
            release_lock: tokio::sync::Mutex::new(()),
            cancel_tx,
            adapter_powered: AtomicBool::new(true),
        });

        let dispatcher = tokio::spawn(Inner::dispatch(Arc::downgrade(&inner), events_rx));

        Self {
            inner,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Current state of the connection state machine.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    // === Radio ===

    /// Whether the Bluetooth radio is on.
    pub async fn is_bluetooth_enabled(&self) -> bool {
        self.inner.backend.is_enabled().await
    }

    /// Ask the platform for scan/connect permissions.
    pub async fn request_permissions(&self) -> bool {
        let granted = self.inner.backend.request_permissions().await;
        info!("Bluetooth permissions {}", if granted { "granted" } else { "denied" });
        granted
    }

    // === Discovery ===

    /// Start a scan session that stops on its own after the scan timeout.
    ///
    /// Clears previously found devices. Bonded devices whose name looks like
    /// a printer are reported immediately. Starting a scan while one is
    /// running ends the old session first.
    pub async fn start_scan(&self) -> Result<()> {
        self.inner.begin_scan().await.map(|_| ())
    }

    /// Run a full scan session and return what was found.
    ///
    /// Resolves when the session ends: on timeout, on [`stop_scan`],
    /// when superseded by another scan, or when `connect` cancels it.
    ///
    /// [`stop_scan`]: Self::stop_scan
    pub async fn scan_devices(&self) -> Result<Vec<Device>> {
        let mut done = self.inner.begin_scan().await?;

        let end = done
            .wait_for(|end| !matches!(end, ScanEnd::Running))
            .await
            .map(|end| end.clone())
            .map_err(|_| Error::Internal("scan ended without a result".to_string()))?;

        match end {
            ScanEnd::Finished(devices) => Ok(devices),
            ScanEnd::Failed(code) => Err(Error::ScanFailed { code }),
            ScanEnd::Running => Err(Error::Internal("scan still running".to_string())),
        }
    }

    /// Stop the running scan and return the devices found so far.
    ///
    /// Safe to call repeatedly; later calls return the same list.
    pub async fn stop_scan(&self) -> Vec<Device> {
        if self.inner.finish_scan(None, false, None).await {
            info!("Scan stopped");
        }
        self.inner.session.read().devices()
    }

    /// Whether a caller scan session is running.
    pub fn is_scanning(&self) -> bool {
        self.inner.scan.lock().active
    }

    /// Devices found in the current or most recent scan session.
    pub fn discovered_devices(&self) -> Vec<Device> {
        self.inner.session.read().devices()
    }

    // === Connection ===

    /// Connect to the printer with identifier `id`.
    ///
    /// Resolves immediately if already connected to `id`; tears down a
    /// connection to any other printer first. Cancels a running scan.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`], [`Error::BluetoothDisabled`],
    /// [`Error::DeviceNotFound`], [`Error::ConnectionTimeout`], or
    /// [`Error::ConnectionFailed`] (including cancellation by
    /// [`disconnect`](Self::disconnect)). [`Error::Busy`] if another
    /// connection change is in progress.
    pub async fn connect(&self, id: &str) -> Result<()> {
        let id = normalize_identifier(id);
        let _op = self.inner.op_lock.try_lock().map_err(|_| Error::Busy {
            operation: "connect",
        })?;
        let mut cancel = self.inner.cancel_tx.subscribe();

        if self.inner.finish_scan(None, false, None).await {
            debug!("Scan cancelled by connect");
        }

        if let Some(current) = self.inner.current_connection() {
            if current.device().id == id && !current.is_lost() && self.inner.state().is_ready() {
                debug!("Already connected to {}", id);
                return Ok(());
            }
            info!(
                "Disconnecting {} before connecting to {}",
                current.device().id,
                id
            );
            self.inner.teardown(None).await;
        }

        let (link_tx, mut link_down) = watch::channel(false);
        *self.inner.attempt.lock() = Some(Attempt {
            target: id.clone(),
            link_down: link_tx,
        });

        info!("Connecting to {}", id);
        self.inner
            .events
            .emit_connection(ConnectionStatus::Connecting, &id, None);

        let result = tokio::select! {
            biased;
            _ = cancel.changed() => {
                info!("Connection attempt to {} cancelled", id);
                self.inner.attempt.lock().take();
                self.inner.set_state(ConnectionState::Disconnected);
                self.inner.events.emit_connection(ConnectionStatus::Disconnected, &id, None);
                return Err(Error::ConnectionFailed {
                    reason: "cancelled by disconnect".to_string(),
                });
            }
            _ = async {
                if link_down.wait_for(|down| *down).await.is_err() {
                    std::future::pending::<()>().await;
                }
            } => Err(Error::ConnectionTimeout),
            result = self.inner.establish(&id) => result,
        };

        let result = match result {
            Ok(connection) => {
                let kind = connection.kind();
                let writable = connection.has_write_endpoint();
                match self.inner.install(connection) {
                    Ok(()) => Ok((kind, writable)),
                    Err(dead) => {
                        dead.close().await;
                        Err(Error::ConnectionTimeout)
                    }
                }
            }
            Err(e) => {
                self.inner.attempt.lock().take();
                Err(e)
            }
        };

        match result {
            Ok((kind, writable)) => {
                info!(
                    "Connected to {} over {}{}",
                    id,
                    kind,
                    if writable { "" } else { " (no write endpoint)" }
                );
                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", id, e);
                self.inner
                    .set_state(ConnectionState::Failed(FailureReason::from(&e)));
                self.inner
                    .events
                    .emit_connection(ConnectionStatus::Error, &id, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Disconnect from the printer, aborting any connection attempt.
    ///
    /// An in-flight job fails with [`Error::ConnectionLost`].
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.cancel_tx.send_modify(|n| *n = n.wrapping_add(1));
        let _op = self.inner.op_lock.lock().await;

        if self.inner.teardown(None).await {
            info!("Disconnected");
        } else {
            debug!("Disconnect requested with no active connection");
        }
        Ok(())
    }

    /// Whether a printer is connected and ready.
    pub fn is_connected(&self) -> bool {
        self.inner.state().is_ready()
            && self
                .inner
                .current_connection()
                .is_some_and(|c| !c.is_lost())
    }

    /// The connected printer, if any.
    pub fn connected_device(&self) -> Option<Device> {
        self.inner
            .current_connection()
            .map(|c| c.device().clone())
    }

    /// Transport of the active connection, if any.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.inner.current_connection().map(|c| c.kind())
    }

    // === Printing ===

    /// Send raw bytes to the printer.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`], [`Error::WriteError`],
    /// [`Error::ConnectionLost`], or [`Error::Busy`] if another payload is
    /// still in flight.
    pub async fn write_data(&self, data: impl Into<Bytes>) -> Result<()> {
        let connection = self.inner.ready_connection()?;
        transmit::deliver(&connection, data.into()).await
    }

    /// Send a composed job.
    pub async fn print_job(&self, job: PrintJob) -> Result<()> {
        self.write_data(job.build()).await
    }

    /// Print a line of styled text.
    pub async fn print_text(&self, text: &str, style: TextStyle) -> Result<()> {
        self.print_job(PrintJob::new().styled_text(text, style)).await
    }

    /// Print a left/right pair laid out for `paper_width_mm` paper.
    pub async fn print_two_columns(
        &self,
        left: &str,
        right: &str,
        paper_width_mm: u32,
    ) -> Result<()> {
        let paper = PaperWidth::from_mm(paper_width_mm);
        self.print_job(PrintJob::new().two_columns(left, right, paper))
            .await
    }

    /// Cut the paper.
    pub async fn cut_paper(&self) -> Result<()> {
        self.print_job(PrintJob::new().cut()).await
    }

    /// Print `content` as a centered QR code.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] or [`Error::QrGeneration`], plus the
    /// transmission errors of [`write_data`](Self::write_data).
    pub async fn print_qr_code(&self, content: &str, paper_width_mm: u32) -> Result<()> {
        let connection = self.inner.ready_connection()?;
        let paper = PaperWidth::from_mm(paper_width_mm);

        let bitmap = render_qr(content, paper)?;
        let job = PrintJob::new()
            .centered_raster(&bitmap)
            .map_err(|e| Error::QrGeneration {
                reason: e.to_string(),
            })?;

        transmit::deliver(&connection, job.build()).await
    }

    /// Print a base64-encoded image scaled to the paper width.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] or [`Error::InvalidImage`], plus the
    /// transmission errors of [`write_data`](Self::write_data).
    pub async fn print_image(&self, base64: &str, paper_width_mm: u32) -> Result<()> {
        let connection = self.inner.ready_connection()?;
        let paper = PaperWidth::from_mm(paper_width_mm);

        let encoded = base64.to_owned();
        let bitmap = tokio::task::spawn_blocking(move || render_image(&encoded, paper))
            .await
            .map_err(|e| Error::Internal(format!("image task failed: {}", e)))??;
        let job = PrintJob::new().centered_raster(&bitmap)?;

        transmit::deliver(&connection, job.build()).await
    }

    // === Events ===

    /// Subscribe to all manager events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PrinterEvent> {
        self.inner.events.subscribe()
    }

    /// Register a callback for newly found devices.
    pub fn on_device_found<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Device) + Send + Sync + 'static,
    {
        self.inner.events.on(
            |event| match event {
                PrinterEvent::DeviceFound(device) => Some(device),
                _ => None,
            },
            callback,
        )
    }

    /// Register a callback for connection status changes.
    pub fn on_connection_change<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ConnectionStatus, String, Option<String>) + Send + Sync + 'static,
    {
        self.inner.events.on(
            |event| match event {
                PrinterEvent::ConnectionChanged {
                    status,
                    device_id,
                    error,
                } => Some((status, device_id, error)),
                _ => None,
            },
            move |(status, device_id, error)| callback(status, device_id, error),
        )
    }

    /// Stop scanning, disconnect, and stop processing platform events.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down printer manager");

        self.inner.finish_scan(None, false, None).await;
        self.disconnect().await?;

        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }

        Ok(())
    }
}

impl Drop for PrinterManager {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        if let Some(timer) = self.inner.scan.lock().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_control_default_inactive() {
        let control = ScanControl::default();
        assert!(!control.active);
        assert_eq!(control.epoch, 0);
        assert!(control.timer.is_none());
    }

    #[test]
    fn test_scan_end_clone() {
        let end = ScanEnd::Finished(vec![Device::new("AA", None)]);
        match end.clone() {
            ScanEnd::Finished(devices) => assert_eq!(devices.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
