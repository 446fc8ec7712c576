//! Discovered printers and the per-scan device registry.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Substrings (lowercase) that mark a bonded device as a likely printer.
pub const PRINTER_NAME_KEYWORDS: [&str; 4] = ["printer", "pos", "thermal", "receipt"];

/// Major device class "Imaging" in a Class of Device value.
const COD_MAJOR_IMAGING: u32 = 0x06;

/// Minor class bit for "Printer" under the Imaging major class.
const COD_MINOR_PRINTER: u32 = 0x80;

/// Pairing state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BondState {
    /// Not paired.
    None,
    /// Pairing in progress.
    Bonding,
    /// Paired.
    Bonded,
}

/// A Bluetooth device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    /// Platform identifier (MAC address on Linux/Windows, UUID on macOS).
    pub id: String,
    /// Advertised or cached name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Pairing state, when the platform exposes it.
    pub bond_state: Option<BondState>,
    /// Raw Class of Device (Classic only).
    pub class_of_device: Option<u32>,
}

impl Device {
    /// Create a device with only an identifier and optional name.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: normalize_identifier(&id.into()),
            name,
            rssi: None,
            bond_state: None,
            class_of_device: None,
        }
    }

    /// Set the signal strength.
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Set the bond state.
    pub fn with_bond_state(mut self, state: BondState) -> Self {
        self.bond_state = Some(state);
        self
    }

    /// Set the Class of Device.
    pub fn with_class(mut self, class_of_device: u32) -> Self {
        self.class_of_device = Some(class_of_device);
        self
    }

    /// Name for display, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether the device is paired with this host.
    pub fn is_bonded(&self) -> bool {
        self.bond_state == Some(BondState::Bonded)
    }

    /// Whether the device name matches the bonded-printer keywords.
    pub fn matches_printer_name(&self) -> bool {
        self.name.as_deref().is_some_and(matches_printer_name)
    }

    /// Whether the device looks like a serial-profile printer.
    ///
    /// Used to pick the first transport: printer-like devices try Classic
    /// first, everything else goes straight to BLE.
    pub fn is_printer_like(&self) -> bool {
        if self.class_of_device.is_some_and(is_printer_class) {
            return true;
        }
        self.name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains("printer"))
    }

    /// Merge newer advertisement data into this entry.
    pub(crate) fn merge(&mut self, newer: &Device) {
        if newer.name.is_some() {
            self.name = newer.name.clone();
        }
        if newer.rssi.is_some() {
            self.rssi = newer.rssi;
        }
        if newer.bond_state.is_some() {
            self.bond_state = newer.bond_state;
        }
        if newer.class_of_device.is_some() {
            self.class_of_device = newer.class_of_device;
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}

/// Canonical form of a device identifier used for deduplication.
pub fn normalize_identifier(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

/// Check a name against [`PRINTER_NAME_KEYWORDS`], case-insensitively.
pub fn matches_printer_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    PRINTER_NAME_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Check whether a Class of Device value describes a printer.
pub fn is_printer_class(class_of_device: u32) -> bool {
    let major = (class_of_device >> 8) & 0x1F;
    let minor = class_of_device & 0xFC;
    major == COD_MAJOR_IMAGING && minor & COD_MINOR_PRINTER != 0
}

/// Devices accumulated during one scan.
#[derive(Debug, Clone)]
pub struct ScanSession {
    devices: HashMap<String, Device>,
    started_at: DateTime<Utc>,
    deadline: Instant,
}

impl ScanSession {
    /// Start an empty session that expires after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            devices: HashMap::new(),
            started_at: Utc::now(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Record a device. Returns `true` only the first time an identifier is seen.
    pub fn record(&mut self, device: Device) -> bool {
        match self.devices.get_mut(&device.id) {
            Some(existing) => {
                existing.merge(&device);
                false
            }
            None => {
                self.devices.insert(device.id.clone(), device);
                true
            }
        }
    }

    /// Look up a device by identifier.
    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(&normalize_identifier(id))
    }

    /// Number of distinct devices seen.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether nothing has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Wall-clock time the session started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Instant after which the session is considered expired.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Devices sorted by signal strength, strongest first.
    pub fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<_> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| {
            b.rssi
                .unwrap_or(i16::MIN)
                .cmp(&a.rssi.unwrap_or(i16::MIN))
                .then_with(|| a.id.cmp(&b.id))
        });
        devices
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SCAN_TIMEOUT)
    }
}
