// Controller discovery
//
// Scans the USB bus for Newport vendor/product id pairs and collects the
// location and string descriptors of every match. A failure to read one
// string descriptor (missing permission, no such descriptor) leaves that
// field empty instead of dropping the device.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identity of one attached controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Bus position and ids of an enumerated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbLocation {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringField {
    Serial,
    Manufacturer,
    Product,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// No USB backend at all; enumeration cannot proceed
    #[error("no USB backend: {0}")]
    NoBackend(String),

    #[error("USB error: {0}")]
    Usb(String),
}

/// Platform USB enumeration
pub trait UsbBackend {
    type Device;

    /// All attached devices matching vendor and product id, in platform order
    fn find_all(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> std::result::Result<Vec<Self::Device>, ScanError>;

    fn location(&self, device: &Self::Device) -> UsbLocation;

    fn read_string(
        &self,
        device: &Self::Device,
        field: StringField,
    ) -> std::result::Result<Option<String>, ScanError>;
}

/// Enumerate controllers for every candidate product id
///
/// A USB error on one product id is logged and the scan moves on to the next
/// id. A missing backend aborts the whole scan.
pub fn enumerate<B: UsbBackend>(
    backend: &B,
    vendor_id: u16,
    product_ids: &[u16],
) -> Result<Vec<DeviceDescriptor>> {
    let mut devices = Vec::new();

    for &product_id in product_ids {
        let found = match backend.find_all(vendor_id, product_id) {
            Ok(found) => found,
            Err(ScanError::NoBackend(reason)) => {
                return Err(Error::NoUsbBackend(reason));
            }
            Err(e) => {
                warn!("USB error scanning for PID {:#06x}: {}", product_id, e);
                continue;
            }
        };

        for device in &found {
            let location = backend.location(device);
            let descriptor = DeviceDescriptor {
                vendor_id: location.vendor_id,
                product_id: location.product_id,
                bus: location.bus,
                address: location.address,
                serial: read_optional(backend, device, StringField::Serial),
                manufacturer: read_optional(backend, device, StringField::Manufacturer),
                product: read_optional(backend, device, StringField::Product),
            };
            debug!("Found controller {:?}", descriptor);
            devices.push(descriptor);
        }
    }

    Ok(devices)
}

/// First controller found, if any
pub fn find_first<B: UsbBackend>(
    backend: &B,
    vendor_id: u16,
    product_ids: &[u16],
) -> Result<Option<DeviceDescriptor>> {
    Ok(enumerate(backend, vendor_id, product_ids)?.into_iter().next())
}

fn read_optional<B: UsbBackend>(backend: &B, device: &B::Device, field: StringField) -> Option<String> {
    match backend.read_string(device, field) {
        Ok(value) => value,
        Err(e) => {
            debug!("Could not read {:?} string descriptor: {}", field, e);
            None
        }
    }
}

/// Enumeration through `nusb`
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbBackend;

impl UsbBackend for NusbBackend {
    type Device = nusb::DeviceInfo;

    fn find_all(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> std::result::Result<Vec<Self::Device>, ScanError> {
        let devices = nusb::list_devices().map_err(|e| match e.kind() {
            std::io::ErrorKind::Unsupported | std::io::ErrorKind::NotFound => {
                ScanError::NoBackend(e.to_string())
            }
            _ => ScanError::Usb(e.to_string()),
        })?;

        Ok(devices
            .filter(|dev| dev.vendor_id() == vendor_id && dev.product_id() == product_id)
            .collect())
    }

    fn location(&self, device: &Self::Device) -> UsbLocation {
        UsbLocation {
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
            bus: device.bus_number(),
            address: device.device_address(),
        }
    }

    fn read_string(
        &self,
        device: &Self::Device,
        field: StringField,
    ) -> std::result::Result<Option<String>, ScanError> {
        // nusb caches the strings the OS already read; absent ones stay None
        let value = match field {
            StringField::Serial => device.serial_number(),
            StringField::Manufacturer => device.manufacturer_string(),
            StringField::Product => device.product_string(),
        };
        Ok(value.map(str::to_string))
    }
}

/// Human-readable listing with troubleshooting hints when nothing is found
pub fn format_device_list(devices: &[DeviceDescriptor], vendor_id: u16) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    if devices.is_empty() {
        out.push_str("No Newport 8742 controllers found.\n\n");
        out.push_str("Troubleshooting:\n");
        out.push_str("  1. Check USB connection\n");
        out.push_str("  2. Ensure controller is powered on\n");
        out.push_str("  3. Check udev rules / USB permissions (Windows: install a WinUSB driver)\n");
        let _ = writeln!(out, "  4. Looking for Vendor ID: {vendor_id:#06x}");
        return out;
    }

    let _ = writeln!(out, "Found {} controller(s):\n", devices.len());
    for (i, dev) in devices.iter().enumerate() {
        let _ = writeln!(
            out,
            "  [{}] VID={:#06x} PID={:#06x}",
            i + 1,
            dev.vendor_id,
            dev.product_id
        );
        let _ = writeln!(out, "      Bus {}, Address {}", dev.bus, dev.address);
        if let Some(manufacturer) = &dev.manufacturer {
            let _ = writeln!(out, "      Manufacturer: {manufacturer}");
        }
        if let Some(product) = &dev.product {
            let _ = writeln!(out, "      Product: {product}");
        }
        if let Some(serial) = &dev.serial {
            let _ = writeln!(out, "      Serial: {serial}");
        }
        out.push('\n');
    }
    out
}
