//! Bulk transfer of print data

use crate::interface::ClaimedInterface;
use crate::usb::UsbHandle;
use common::{PrinterError, UsbError};
use std::time::Duration;
use tracing::{debug, warn};

/// Write `data` to bulk OUT endpoint number `endpoint` of the claimed interface
///
/// The whole buffer goes out in one bulk write. A device accepting fewer
/// bytes than offered is reported as `ShortWrite`; nothing is retried.
/// Returns the number of bytes written.
pub fn transfer<H: UsbHandle>(
    claimed: &ClaimedInterface<H>,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, PrinterError> {
    let address = claimed.bulk_out_endpoint(endpoint).ok_or_else(|| {
        warn!(
            "Interface {} has no bulk OUT endpoint {}",
            claimed.interface(),
            endpoint
        );
        PrinterError::Transfer {
            endpoint,
            source: UsbError::NotFound,
        }
    })?;

    if data.is_empty() {
        debug!("Empty print data, nothing to transfer");
        return Ok(0);
    }

    debug!(
        "Bulk transfer: endpoint={:#04x}, data_len={}, timeout={}ms",
        address,
        data.len(),
        timeout.as_millis()
    );

    let written = claimed
        .handle()
        .write_bulk(address, data, timeout)
        .map_err(|source| {
            warn!("Bulk transfer to endpoint {:#04x} failed: {}", address, source);
            PrinterError::Transfer {
                endpoint: address,
                source,
            }
        })?;

    if written != data.len() {
        warn!(
            "Short bulk write on endpoint {:#04x}: {} of {} bytes",
            address,
            written,
            data.len()
        );
        return Err(PrinterError::ShortWrite {
            written,
            expected: data.len(),
        });
    }

    debug!("Bulk transfer succeeded: {} bytes", written);
    Ok(written)
}
