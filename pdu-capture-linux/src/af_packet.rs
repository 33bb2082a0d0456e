//! Live capture through an `AF_PACKET` raw socket.
//!
//! Binds a blocking `SOCK_RAW` socket to one interface and receives whole
//! link-layer frames. Frames longer than the snapshot length are truncated,
//! but the PDU keeps the length seen on the wire.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use chrono::Utc;
use log::{debug, warn};

use pdu_capture_core::models::config::CaptureConfiguration;
use pdu_capture_core::models::error::{CaptureError, DeviceError};
use pdu_capture_core::models::pdu::{LinkType, Pdu};
use pdu_capture_core::processing::dissect;
use pdu_capture_core::traits::packet_source::PacketSource;

/// `ARPHRD_*` hardware types that map onto a capture link type.
const ARPHRD_ETHER: u16 = 1;
const ARPHRD_LOOPBACK: u16 = 772;
const ARPHRD_NONE: u16 = 0xfffe;

/// Link type of frames read from an interface with hardware type `hatype`.
///
/// Loopback frames carry a zeroed Ethernet header; tunnels without a link
/// header deliver bare IP packets.
pub fn link_type_for(hatype: u16) -> LinkType {
    match hatype {
        ARPHRD_ETHER | ARPHRD_LOOPBACK => LinkType::Ethernet,
        ARPHRD_NONE => LinkType::Raw,
        other => LinkType::Other(u32::from(other)),
    }
}

/// Map the last OS error from opening or configuring the socket.
fn device_error(interface: &str, err: io::Error) -> DeviceError {
    match err.raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => {
            DeviceError::PermissionDenied(format!("{interface}: {err}"))
        }
        Some(libc::ENODEV) | Some(libc::ENXIO) => DeviceError::NotFound(interface.to_string()),
        _ => DeviceError::Io(format!("{interface}: {err}")),
    }
}

/// Open an unbound `AF_PACKET` socket receiving every protocol.
pub(crate) fn packet_socket() -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW | libc::SOCK_CLOEXEC,
            i32::from((libc::ETH_P_ALL as u16).to_be()),
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `fd` is a freshly created descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn interface_request(interface: &str) -> Result<libc::ifreq, DeviceError> {
    let name = CString::new(interface).map_err(|_| DeviceError::NotFound(interface.to_string()))?;
    let bytes = name.as_bytes_with_nul();

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    if bytes.len() > ifr.ifr_name.len() {
        return Err(DeviceError::NotFound(interface.to_string()));
    }
    for (dst, src) in ifr.ifr_name.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    Ok(ifr)
}

fn interface_ifindex(fd: RawFd, interface: &str) -> Result<i32, DeviceError> {
    let mut ifr = interface_request(interface)?;
    let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
    if ret < 0 {
        return Err(DeviceError::NotFound(interface.to_string()));
    }
    Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
}

fn interface_hatype(fd: RawFd, interface: &str) -> Result<u16, DeviceError> {
    let mut ifr = interface_request(interface)?;
    let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut ifr) };
    if ret < 0 {
        return Err(device_error(interface, io::Error::last_os_error()));
    }
    Ok(unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_family })
}

fn set_promiscuous(fd: RawFd, ifindex: i32, enable: bool) -> io::Result<()> {
    let mreq = libc::packet_mreq {
        mr_ifindex: ifindex,
        mr_type: libc::PACKET_MR_PROMISC as u16,
        mr_alen: 0,
        mr_address: [0; 8],
    };
    let optname = if enable {
        libc::PACKET_ADD_MEMBERSHIP
    } else {
        libc::PACKET_DROP_MEMBERSHIP
    };
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            optname,
            &mreq as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Live capture from one network interface.
///
/// Never signals end of source on its own; reads block until a frame
/// arrives. Only `close` ends it.
pub struct LiveSource {
    fd: Option<OwnedFd>,
    interface: String,
    ifindex: i32,
    link_type: LinkType,
    promiscuous: bool,
    config: CaptureConfiguration,
    buf: Vec<u8>,
    frames: u64,
}

impl LiveSource {
    /// Open `interface` for capture.
    ///
    /// Fails with `DeviceError::PermissionDenied` without `CAP_NET_RAW` and
    /// with `DeviceError::NotFound` for an unknown interface name.
    pub fn open(interface: &str, config: &CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let fd = packet_socket().map_err(|e| device_error(interface, e))?;
        let raw = fd.as_raw_fd();
        let ifindex = interface_ifindex(raw, interface)?;
        let link_type = link_type_for(interface_hatype(raw, interface)?);

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: (libc::ETH_P_ALL as u16).to_be(),
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        let ret = unsafe {
            libc::bind(
                raw,
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(device_error(interface, io::Error::last_os_error()).into());
        }

        if config.promiscuous {
            set_promiscuous(raw, ifindex, true).map_err(|e| device_error(interface, e))?;
        }

        debug!(
            "Opened live capture on {} (ifindex {}, link type {}, snaplen {}, promiscuous {})",
            interface,
            ifindex,
            link_type.name(),
            config.snaplen,
            config.promiscuous
        );

        Ok(Self {
            fd: Some(fd),
            interface: interface.to_string(),
            ifindex,
            link_type,
            promiscuous: config.promiscuous,
            config: config.clone(),
            buf: vec![0; config.snaplen as usize],
            frames: 0,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Frames received so far, including filtered ones.
    pub fn frames_received(&self) -> u64 {
        self.frames
    }
}

impl PacketSource for LiveSource {
    fn next_pdu(&mut self) -> Result<Option<Pdu>, CaptureError> {
        loop {
            let Some(fd) = self.fd.as_ref() else {
                return Ok(None);
            };
            // MSG_TRUNC makes recv report the full frame length even when
            // only `buf.len()` bytes are copied.
            let n = unsafe {
                libc::recv(
                    fd.as_raw_fd(),
                    self.buf.as_mut_ptr() as *mut libc::c_void,
                    self.buf.len(),
                    libc::MSG_TRUNC,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(DeviceError::Io(format!("{}: {}", self.interface, err)).into());
            }

            let timestamp_us = Utc::now().timestamp_micros();
            let wire_len = n as usize;
            let data = &self.buf[..wire_len.min(self.buf.len())];
            self.frames += 1;

            if !self.config.accepts(data) {
                continue;
            }
            return Ok(Some(dissect::decode_frame(
                self.link_type,
                timestamp_us,
                u32::try_from(wire_len).unwrap_or(u32::MAX),
                data,
            )));
        }
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn snaplen(&self) -> u32 {
        self.config.snaplen
    }

    fn describe(&self) -> String {
        self.interface.clone()
    }

    fn close(&mut self) {
        let Some(fd) = self.fd.take() else {
            return;
        };
        if self.promiscuous {
            if let Err(e) = set_promiscuous(fd.as_raw_fd(), self.ifindex, false) {
                warn!("Failed to leave promiscuous mode on {}: {}", self.interface, e);
            }
        }
        drop(fd);
        debug!(
            "Closed live capture on {} after {} frames",
            self.interface, self.frames
        );
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        self.close();
    }
}
