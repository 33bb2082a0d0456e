use crate::models::error::CaptureError;
use crate::models::pdu::{LinkType, Pdu};

/// Uniform pull interface over live capture and capture-file replay.
///
/// Implemented by:
/// - `FileSource` (pcap / pcapng replay)
/// - `ScriptedSource` (pre-built PDU sequences)
/// - `LiveSource` (Linux `AF_PACKET`, in `pdu-capture-linux`)
pub trait PacketSource: Send {
    /// Produce the next PDU in arrival or file order.
    ///
    /// Blocks on live interfaces until a frame arrives. Returns `Ok(None)` once
    /// a bounded source is exhausted; live sources only stop after `close`.
    fn next_pdu(&mut self) -> Result<Option<Pdu>, CaptureError>;

    /// Link type of the frames this source produces.
    fn link_type(&self) -> LinkType;

    /// Maximum captured bytes per frame.
    fn snaplen(&self) -> u32;

    /// Interface name or file path, for diagnostics.
    fn describe(&self) -> String;

    /// Release the underlying handle. Further reads return end of source.
    fn close(&mut self);
}
