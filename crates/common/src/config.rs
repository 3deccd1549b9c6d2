//! Printer identification and connection parameters

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default USB vendor ID (Seiko Epson)
pub const DEFAULT_VENDOR_ID: u16 = 0x04b8;
/// Default USB product ID (TM series receipt printer)
pub const DEFAULT_PRODUCT_ID: u16 = 0x0202;
/// Default bulk OUT endpoint number
pub const DEFAULT_ENDPOINT: u8 = 1;
/// Default interface number
pub const DEFAULT_INTERFACE: u8 = 0;
/// Default bulk transfer timeout in milliseconds
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 5000;

/// Immutable printer parameters
///
/// Every field can be omitted in a configuration file and falls back to the
/// documented default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// USB vendor ID of the printer
    #[serde(default = "PrinterConfig::default_vendor_id")]
    pub vendor_id: u16,
    /// USB product ID of the printer
    #[serde(default = "PrinterConfig::default_product_id")]
    pub product_id: u16,
    /// Number of the bulk OUT endpoint print data is written to
    #[serde(default = "PrinterConfig::default_endpoint")]
    pub endpoint: u8,
    /// Interface claimed on the printer
    #[serde(default = "PrinterConfig::default_interface")]
    pub interface: u8,
    /// Bulk transfer timeout in milliseconds (0 = wait forever)
    #[serde(default = "PrinterConfig::default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            endpoint: DEFAULT_ENDPOINT,
            interface: DEFAULT_INTERFACE,
            transfer_timeout_ms: DEFAULT_TRANSFER_TIMEOUT_MS,
        }
    }
}

impl PrinterConfig {
    fn default_vendor_id() -> u16 {
        DEFAULT_VENDOR_ID
    }

    fn default_product_id() -> u16 {
        DEFAULT_PRODUCT_ID
    }

    fn default_endpoint() -> u8 {
        DEFAULT_ENDPOINT
    }

    fn default_interface() -> u8 {
        DEFAULT_INTERFACE
    }

    fn default_transfer_timeout_ms() -> u64 {
        DEFAULT_TRANSFER_TIMEOUT_MS
    }

    /// Printer config for the given identifiers, other fields defaulted
    pub fn new(vendor_id: u16, product_id: u16, endpoint: u8) -> Self {
        Self {
            vendor_id,
            product_id,
            endpoint,
            ..Self::default()
        }
    }

    /// Bulk transfer timeout
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    /// Apply call-site overrides, producing the target of one connect call
    pub fn resolve(&self, options: &ConnectOptions) -> Target {
        Target {
            vendor_id: options.vendor_id.unwrap_or(self.vendor_id),
            product_id: options.product_id.unwrap_or(self.product_id),
            interface: self.interface,
            endpoint: options.endpoint.unwrap_or(self.endpoint),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::Result<()> {
        // Endpoint 0 is the control endpoint, numbers above 15 do not exist
        if self.endpoint == 0 || self.endpoint > 0x0f {
            return Err(crate::Error::Config(format!(
                "Invalid bulk OUT endpoint number: {}",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// Optional per-call overrides for `connect`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub endpoint: Option<u8>,
}

impl ConnectOptions {
    pub fn vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn product_id(mut self, product_id: u16) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn endpoint(mut self, endpoint: u8) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

/// Fully resolved connection target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    pub endpoint: u8,
}
