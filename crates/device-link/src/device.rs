//! Device identity as reported by the local print daemon.

use std::fmt;

/// How the daemon reaches a device.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionKind {
    /// TCP/IP printer.
    Network,
    /// USB-attached printer.
    Usb,
    /// Bluetooth (SPP) printer.
    Bluetooth,
    /// Printer reached through an OS print driver.
    Driver,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Network => write!(f, "network"),
            ConnectionKind::Usb => write!(f, "usb"),
            ConnectionKind::Bluetooth => write!(f, "bluetooth"),
            ConnectionKind::Driver => write!(f, "driver"),
        }
    }
}

/// An addressable device. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Device {
    uid: String,
    name: String,
    connection: ConnectionKind,
    #[cfg_attr(feature = "serde", serde(default = "default_device_type"))]
    device_type: String,
    #[cfg_attr(feature = "serde", serde(default))]
    version: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    manufacturer: String,
    #[cfg_attr(feature = "serde", serde(default))]
    provider: String,
}

fn default_device_type() -> String {
    "printer".to_string()
}

impl Device {
    /// Create a printer device. The display name defaults to the uid.
    pub fn new(uid: impl Into<String>, connection: ConnectionKind) -> Self {
        let uid = uid.into();
        Self {
            name: uid.clone(),
            uid,
            connection,
            device_type: default_device_type(),
            version: 0,
            manufacturer: String::new(),
            provider: String::new(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the daemon protocol version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the manufacturer string.
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    /// Set the daemon provider identifier.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Unique id. For network printers this is the printer address.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Friendly display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the device is connected.
    pub fn connection(&self) -> ConnectionKind {
        self.connection
    }

    /// Device type reported by the daemon (normally `"printer"`).
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Daemon protocol version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Manufacturer string.
    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    /// Daemon provider identifier.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Number of empty reads tolerated before any data has arrived.
    ///
    /// Bluetooth links are slow to start answering, so they get one retry.
    pub fn read_retries(&self) -> i32 {
        if self.connection == ConnectionKind::Bluetooth {
            1
        } else {
            0
        }
    }
}
