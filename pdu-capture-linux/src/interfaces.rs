//! Network interface enumeration and capture privilege check.

use std::ffi::{CStr, CString};
use std::io;

use pdu_capture_core::models::error::{CaptureError, DeviceError};

use crate::af_packet::packet_socket;

/// A network interface known to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub index: u32,
    pub name: String,
}

/// List interfaces in kernel index order.
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, CaptureError> {
    let head = unsafe { libc::if_nameindex() };
    if head.is_null() {
        let err = io::Error::last_os_error();
        return Err(DeviceError::Io(format!("if_nameindex failed: {err}")).into());
    }

    let mut interfaces = Vec::new();
    let mut cursor = head;
    // SAFETY: the array returned by if_nameindex ends with a zeroed entry and
    // stays valid until if_freenameindex.
    unsafe {
        while (*cursor).if_index != 0 && !(*cursor).if_name.is_null() {
            interfaces.push(InterfaceInfo {
                index: (*cursor).if_index,
                name: CStr::from_ptr((*cursor).if_name)
                    .to_string_lossy()
                    .into_owned(),
            });
            cursor = cursor.add(1);
        }
        libc::if_freenameindex(head);
    }

    interfaces.sort_by_key(|i| i.index);
    Ok(interfaces)
}

/// Kernel index of `name`, if such an interface exists.
pub fn interface_index(name: &str) -> Option<u32> {
    let name = CString::new(name).ok()?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    (index != 0).then_some(index)
}

/// Whether this process may open raw packet sockets.
///
/// Probes by opening and immediately closing an `AF_PACKET` socket, which
/// succeeds only with `CAP_NET_RAW`.
pub fn has_capture_privilege() -> bool {
    match packet_socket() {
        Ok(_) => true,
        Err(e) => {
            log::debug!("Raw packet socket unavailable: {}", e);
            false
        }
    }
}
