use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

use crate::models::error::CaptureError;
use crate::models::pdu::{LinkType, Pdu};
use crate::traits::packet_source::PacketSource;

/// A bounded source that yields a fixed PDU sequence.
///
/// Used to replay pre-built PDUs and as the fake behind session tests. An
/// optional one-shot failure can be injected before the PDU at a given
/// position; the PDU itself is still delivered on the following read.
pub struct ScriptedSource {
    pdus: VecDeque<Pdu>,
    link_type: LinkType,
    failure: Option<(usize, CaptureError)>,
    yielded: usize,
    closed: bool,
}

impl ScriptedSource {
    pub fn new(pdus: impl IntoIterator<Item = Pdu>) -> Self {
        Self {
            pdus: pdus.into_iter().collect(),
            link_type: LinkType::Ethernet,
            failure: None,
            yielded: 0,
            closed: false,
        }
    }

    pub fn with_link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }

    /// Fail once when the PDU at position `at` (zero-based) is requested.
    pub fn with_failure(mut self, at: usize, error: CaptureError) -> Self {
        self.failure = Some((at, error));
        self
    }

    pub fn remaining(&self) -> usize {
        self.pdus.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PacketSource for ScriptedSource {
    fn next_pdu(&mut self) -> Result<Option<Pdu>, CaptureError> {
        if self.closed {
            return Ok(None);
        }
        if matches!(self.failure, Some((at, _)) if at == self.yielded) {
            if let Some((_, error)) = self.failure.take() {
                return Err(error);
            }
        }
        let next = self.pdus.pop_front();
        if next.is_some() {
            self.yielded += 1;
        }
        Ok(next)
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn snaplen(&self) -> u32 {
        65535
    }

    fn describe(&self) -> String {
        format!("scripted ({} pdus)", self.yielded + self.pdus.len())
    }

    fn close(&mut self) {
        self.closed = true;
        self.pdus.clear();
    }
}

/// An unbounded source fed through a channel.
///
/// `next_pdu` blocks until a PDU arrives, behaving like a live interface. The
/// source ends when every sender has been dropped.
pub struct ChannelSource {
    rx: Option<Receiver<Pdu>>,
    name: String,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Pdu>, name: impl Into<String>) -> Self {
        Self {
            rx: Some(rx),
            name: name.into(),
        }
    }
}

impl PacketSource for ChannelSource {
    fn next_pdu(&mut self) -> Result<Option<Pdu>, CaptureError> {
        Ok(self.rx.as_ref().and_then(|rx| rx.recv().ok()))
    }

    fn link_type(&self) -> LinkType {
        LinkType::Ethernet
    }

    fn snaplen(&self) -> u32 {
        65535
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) {
        self.rx = None;
    }
}
