// USB transport for the 8742 controller
//
// The controller exposes one vendor interface with a single OUT endpoint
// (commands) and a single IN endpoint (replies).

use std::future::Future;
use std::pin::pin;
use std::thread;
use std::time::Duration;

use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::{self, Either};
use nusb::transfer::{Direction, EndpointType, RequestBuffer};
use tracing::{debug, info};

use crate::config::READ_TIMEOUT;
use crate::error::{Error, Result, TransportError};

/// Byte-level link to the controller
pub trait Transport {
    /// Send one encoded frame
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError>;

    /// Read up to `max_len` bytes of reply
    fn read(&mut self, max_len: usize) -> std::result::Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    address: u8,
    kind: EndpointType,
}

/// Exclusively owned, claimed USB interface of one controller
///
/// The interface is released when the transport is dropped.
pub struct UsbTransport {
    interface: nusb::Interface,
    ep_out: Endpoint,
    ep_in: Endpoint,
}

impl UsbTransport {
    /// Open the first attached device matching vendor and product id
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self> {
        let device_info = nusb::list_devices()
            .map_err(|e| Error::NoUsbBackend(e.to_string()))?
            .find(|dev| dev.vendor_id() == vendor_id && dev.product_id() == product_id)
            .ok_or_else(|| Error::DeviceNotFound {
                vendor_id,
                product_ids: vec![product_id],
            })?;

        Self::open_device(&device_info)
    }

    /// Open an already enumerated device
    pub fn open_device(device_info: &nusb::DeviceInfo) -> Result<Self> {
        info!(
            "Opening controller {:04x}:{:04x} on bus {} address {}",
            device_info.vendor_id(),
            device_info.product_id(),
            device_info.bus_number(),
            device_info.device_address()
        );
        let device = device_info.open().map_err(TransportError::from)?;

        let config = device
            .active_configuration()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        // Interface 0, alternate setting 0
        let alt_setting = config
            .interface_alt_settings()
            .find(|alt| alt.interface_number() == 0 && alt.alternate_setting() == 0)
            .ok_or_else(|| TransportError::Configuration("no interface 0".into()))?;

        let mut ep_out = None;
        let mut ep_in = None;
        for endpoint in alt_setting.endpoints() {
            let slot = match endpoint.direction() {
                Direction::Out => &mut ep_out,
                Direction::In => &mut ep_in,
            };
            if slot.is_none() {
                *slot = Some(Endpoint {
                    address: endpoint.address(),
                    kind: endpoint.transfer_type(),
                });
            }
        }
        let ep_out = ep_out.ok_or(Error::EndpointBinding { direction: "OUT" })?;
        let ep_in = ep_in.ok_or(Error::EndpointBinding { direction: "IN" })?;
        debug!(
            "Bound endpoints OUT=0x{:02x} IN=0x{:02x}",
            ep_out.address, ep_in.address
        );

        let interface = device.claim_interface(0).map_err(TransportError::from)?;

        Ok(Self {
            interface,
            ep_out,
            ep_in,
        })
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        let data = bytes.to_vec();
        let completion = match self.ep_out.kind {
            EndpointType::Interrupt => {
                block_on(self.interface.interrupt_out(self.ep_out.address, data))
            }
            _ => block_on(self.interface.bulk_out(self.ep_out.address, data)),
        };
        completion.into_result()?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> std::result::Result<Vec<u8>, TransportError> {
        let buffer = RequestBuffer::new(max_len);
        let transfer = match self.ep_in.kind {
            EndpointType::Interrupt => self.interface.interrupt_in(self.ep_in.address, buffer),
            _ => self.interface.bulk_in(self.ep_in.address, buffer),
        };
        // Dropping the transfer future cancels the pending request
        let completion =
            with_timeout(transfer, READ_TIMEOUT).ok_or(TransportError::Timeout(READ_TIMEOUT))?;
        Ok(completion.into_result()?)
    }
}

/// Block on `future` for at most `timeout`
///
/// Returns `None` if the timer fires first; the future is dropped unfinished.
fn with_timeout<F: Future>(future: F, timeout: Duration) -> Option<F::Output> {
    let (expired, timer) = oneshot::channel::<()>();
    thread::spawn(move || {
        thread::sleep(timeout);
        // The receiver is gone once the future has won the race
        let _ = expired.send(());
    });

    match block_on(future::select(pin!(future), timer)) {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}
