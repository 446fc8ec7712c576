//! Scripted Bluetooth backend for driving the manager without a radio.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use uuid::Uuid;

use thermal_printer_ble::{
    BluetoothBackend, CharacteristicProperties, Device, Error, GattCharacteristic, GattLink,
    PlatformEvent, PlatformEventSender, Result, SerialStream,
};

/// Class of Device for an imaging/printer device.
pub const PRINTER_CLASS: u32 = 0x0680;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thermal_printer_ble=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// How `open_serial` behaves.
#[derive(Debug, Clone, Copy)]
pub enum ClassicBehavior {
    Succeed,
    FailAfter(Duration),
    Hang,
    PermissionDenied,
}

/// How `connect_gatt` behaves.
#[derive(Debug, Clone, Copy)]
pub enum GattBehavior {
    Succeed,
    Fail,
    Hang,
}

/// Byte sink that records everything written to it.
#[derive(Clone, Default)]
pub struct RecordingStream {
    pub written: Arc<Mutex<Vec<u8>>>,
    pub shut_down: Arc<AtomicBool>,
}

impl AsyncWrite for RecordingStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.written.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shut_down.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// GATT link that records each chunk written.
pub struct FakeLink {
    pub characteristics: Vec<GattCharacteristic>,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub write_delay: Mutex<Option<Duration>>,
    pub discover_delay: Mutex<Option<Duration>>,
    pub disconnected: AtomicBool,
}

impl FakeLink {
    pub fn new(characteristics: Vec<GattCharacteristic>) -> Self {
        Self {
            characteristics,
            writes: Mutex::new(Vec::new()),
            write_delay: Mutex::new(None),
            discover_delay: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn received(&self) -> Vec<u8> {
        self.writes.lock().concat()
    }
}

#[async_trait]
impl GattLink for FakeLink {
    async fn discover_characteristics(&self) -> Result<Vec<GattCharacteristic>> {
        let delay = *self.discover_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.characteristics.clone())
    }

    async fn write(&self, _characteristic: &GattCharacteristic, data: &[u8]) -> Result<()> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.writes.lock().push(data.to_vec());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn characteristic(n: u128, write: bool, write_without_response: bool) -> GattCharacteristic {
    GattCharacteristic {
        service: Uuid::from_u128(0x18f0),
        uuid: Uuid::from_u128(n),
        properties: CharacteristicProperties {
            write,
            write_without_response,
        },
    }
}

/// A backend whose behaviour is set up by each test.
pub struct FakeBackend {
    events: Mutex<Option<PlatformEventSender>>,
    pub enabled: AtomicBool,
    pub permitted: AtomicBool,
    pub bonded: Mutex<Vec<Device>>,
    pub advertised: Mutex<Vec<Device>>,
    pub classic: Mutex<ClassicBehavior>,
    pub gatt: Mutex<GattBehavior>,
    pub serial: RecordingStream,
    pub link: Arc<FakeLink>,
    pub scan_starts: AtomicUsize,
    pub scan_stops: AtomicUsize,
    pub scan_start_delay: Mutex<Option<Duration>>,
    pub scan_stop_delay: Mutex<Option<Duration>>,
    /// Whether the radio was last told to scan.
    pub radio_scanning: AtomicBool,
    pub serial_opens: AtomicUsize,
    pub gatt_connects: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Self::with_link(FakeLink::new(vec![
            characteristic(0x2af0, false, false),
            characteristic(0x2af1, true, true),
        ]))
    }

    pub fn with_link(link: FakeLink) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(None),
            enabled: AtomicBool::new(true),
            permitted: AtomicBool::new(true),
            bonded: Mutex::new(Vec::new()),
            advertised: Mutex::new(Vec::new()),
            classic: Mutex::new(ClassicBehavior::Succeed),
            gatt: Mutex::new(GattBehavior::Succeed),
            serial: RecordingStream::default(),
            link: Arc::new(link),
            scan_starts: AtomicUsize::new(0),
            scan_stops: AtomicUsize::new(0),
            scan_start_delay: Mutex::new(None),
            scan_stop_delay: Mutex::new(None),
            radio_scanning: AtomicBool::new(false),
            serial_opens: AtomicUsize::new(0),
            gatt_connects: AtomicUsize::new(0),
        })
    }

    /// Push an unsolicited platform event.
    pub fn emit(&self, event: PlatformEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn set_classic(&self, behavior: ClassicBehavior) {
        *self.classic.lock() = behavior;
    }

    pub fn set_gatt(&self, behavior: GattBehavior) {
        *self.gatt.lock() = behavior;
    }

    pub fn starts(&self) -> usize {
        self.scan_starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.scan_stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BluetoothBackend for FakeBackend {
    fn attach(&self, events: PlatformEventSender) {
        *self.events.lock() = Some(events);
    }

    async fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn has_permissions(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    async fn request_permissions(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>> {
        Ok(self.bonded.lock().clone())
    }

    async fn start_scan(&self) -> Result<()> {
        self.scan_starts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.scan_start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.radio_scanning.store(true, Ordering::SeqCst);
        let advertised = self.advertised.lock().clone();
        for device in advertised {
            self.emit(PlatformEvent::DeviceDiscovered(device));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scan_stops.fetch_add(1, Ordering::SeqCst);
        let delay = *self.scan_stop_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.radio_scanning.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn open_serial(&self, _device: &Device, _channel: u8) -> Result<SerialStream> {
        self.serial_opens.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.classic.lock();
        match behavior {
            ClassicBehavior::Succeed => Ok(Box::new(self.serial.clone())),
            ClassicBehavior::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(Error::ConnectionFailed {
                    reason: "socket refused".to_string(),
                })
            }
            ClassicBehavior::Hang => std::future::pending().await,
            ClassicBehavior::PermissionDenied => Err(Error::PermissionDenied),
        }
    }

    async fn connect_gatt(&self, _device: &Device) -> Result<Arc<dyn GattLink>> {
        self.gatt_connects.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.gatt.lock();
        match behavior {
            GattBehavior::Succeed => Ok(self.link.clone() as Arc<dyn GattLink>),
            GattBehavior::Fail => Err(Error::ConnectionFailed {
                reason: "GATT 133".to_string(),
            }),
            GattBehavior::Hang => std::future::pending().await,
        }
    }
}

/// A bonded device with a printer Class of Device.
pub fn classic_printer(id: &str) -> Device {
    Device::new(id, Some("POS-58 Printer".to_string())).with_class(PRINTER_CLASS)
}

/// An advertised BLE-only device.
pub fn ble_printer(id: &str, rssi: i16) -> Device {
    Device::new(id, Some("MPT-II".to_string())).with_rssi(rssi)
}
