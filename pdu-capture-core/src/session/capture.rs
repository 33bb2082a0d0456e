use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::encoding::encoder::Encoder;
use crate::models::error::CaptureError;
use crate::models::fill_result::{CaptureStats, FillReport, SessionInfo};
use crate::models::pdu::Pdu;
use crate::models::state::CaptureState;
use crate::processing::buffer_writer::BufferWriter;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::packet_source::PacketSource;

/// Session status shared between the owner of a session and callers that
/// only need to observe it or request admission.
pub(crate) struct SessionState {
    pub(crate) state: CaptureState,
    pub(crate) close_requested: bool,
    pub(crate) stats: CaptureStats,
    pub(crate) delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            close_requested: false,
            stats: CaptureStats::default(),
            delegate: None,
        }
    }
}

/// Move `Idle` to `Filling`, or refuse.
///
/// A close request wins over an in-flight fill, so callers see
/// `SessionClosed` as soon as close has been asked for.
pub(crate) fn admit(shared: &Arc<Mutex<SessionState>>) -> Result<(), CaptureError> {
    let delegate = {
        let mut s = shared.lock();
        if s.close_requested || s.state.is_closed() {
            return Err(CaptureError::SessionClosed);
        }
        if s.state.is_filling() {
            return Err(CaptureError::FillInProgress);
        }
        s.state = CaptureState::Filling;
        s.delegate.clone()
    };
    if let Some(d) = delegate {
        d.on_state_changed(&CaptureState::Filling);
    }
    Ok(())
}

/// Drives one packet source into caller buffers.
///
/// ```text
/// [pending PDU] ─┐
///                ├→ [Encoder] → [BufferWriter] → caller buffer
/// [PacketSource]─┘        ↘ (does not fit) → pending PDU
/// ```
///
/// At most one PDU is held back between fills. It is always the first one
/// written by the next fill, so the concatenation of all filled buffers is
/// the in-order encoding of every PDU the source produced.
pub struct CaptureSession {
    source: Box<dyn PacketSource>,
    encoder: Encoder,
    pending: Option<Pdu>,
    exhausted: bool,
    shared: Arc<Mutex<SessionState>>,
    info: SessionInfo,
}

impl CaptureSession {
    pub fn new(source: Box<dyn PacketSource>) -> Self {
        Self::with_encoder(source, Encoder::new())
    }

    pub fn with_encoder(source: Box<dyn PacketSource>, encoder: Encoder) -> Self {
        let info = SessionInfo {
            id: Uuid::new_v4(),
            source: source.describe(),
            link_type: source.link_type(),
            snaplen: source.snaplen(),
            opened_at: chrono::Utc::now().to_rfc3339(),
        };
        debug!(
            "Opened capture session {} on {} ({})",
            info.id,
            info.source,
            info.link_type.name()
        );
        Self {
            source,
            encoder,
            pending: None,
            exhausted: false,
            shared: Arc::new(Mutex::new(SessionState::new())),
            info,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.shared.lock().delegate = Some(delegate);
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.lock().stats
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Whether a PDU is held back from the previous fill.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Fill `buffer` with as many whole encoded PDUs as fit.
    ///
    /// Returns `FillInProgress` or `SessionClosed` if the fill is refused.
    /// Errors raised by the source or encoder during the fill are reported in
    /// the returned `FillReport` together with the PDUs already written.
    pub fn fill_buffer(&mut self, buffer: &mut [u8]) -> Result<FillReport, CaptureError> {
        admit(&self.shared)?;
        Ok(self.fill_admitted(buffer))
    }

    /// Release the source and drop any pending PDU. Idempotent.
    pub fn close(&mut self) {
        if self.state().is_closed() {
            return;
        }
        self.source.close();
        if self.pending.take().is_some() {
            debug!("Session {} closed with a pending PDU", self.info.id);
        }
        self.set_state(CaptureState::Closed);
        debug!("Closed capture session {}", self.info.id);
    }

    pub(crate) fn shared(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.shared)
    }

    /// Run the fill loop. The caller must have admitted the fill.
    pub(crate) fn fill_admitted(&mut self, buffer: &mut [u8]) -> FillReport {
        let mut writer = BufferWriter::new(buffer);
        let mut report = FillReport::default();
        let mut deferred = false;

        loop {
            let pdu = match self.pending.take() {
                Some(pdu) => pdu,
                None => {
                    if self.exhausted {
                        report.exhausted = true;
                        break;
                    }
                    if writer.is_full() {
                        break;
                    }
                    match self.source.next_pdu() {
                        Ok(Some(pdu)) => pdu,
                        Ok(None) => {
                            self.exhausted = true;
                            report.exhausted = true;
                            break;
                        }
                        Err(e) => {
                            report.error = Some(e);
                            break;
                        }
                    }
                }
            };

            let bytes = match self.encoder.encode(&pdu) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        "Session {}: dropping {} PDU that failed to encode: {}",
                        self.info.id,
                        pdu.pdu_type(),
                        e
                    );
                    report.error = Some(e.into());
                    break;
                }
            };

            if writer.try_write(bytes) {
                report.pdu_count += 1;
                continue;
            }

            let needed = bytes.len();
            if needed > writer.capacity() {
                warn!(
                    "Session {}: next record needs {} bytes but the buffer holds {}",
                    self.info.id,
                    needed,
                    writer.capacity()
                );
            } else {
                trace!(
                    "Session {}: deferring {}-byte record, {} bytes left",
                    self.info.id,
                    needed,
                    writer.remaining()
                );
            }
            self.pending = Some(pdu);
            deferred = true;
            break;
        }

        report.bytes_written = writer.offset();
        self.finish_fill(&report, deferred);
        report
    }

    fn finish_fill(&mut self, report: &FillReport, deferred: bool) {
        let close_requested = {
            let mut s = self.shared.lock();
            s.stats.fills += 1;
            s.stats.pdus_written += report.pdu_count as u64;
            s.stats.bytes_written += report.bytes_written as u64;
            if deferred {
                s.stats.deferrals += 1;
            }
            if report.error.is_some() {
                s.stats.fill_errors += 1;
            }
            s.close_requested
        };

        debug!(
            "Session {}: wrote {} PDUs ({} bytes), exhausted={}, error={:?}",
            self.info.id, report.pdu_count, report.bytes_written, report.exhausted, report.error
        );

        if close_requested {
            self.close();
        } else {
            self.set_state(CaptureState::Idle);
        }
    }

    fn set_state(&self, new_state: CaptureState) {
        let delegate = {
            let mut s = self.shared.lock();
            s.state = new_state;
            s.delegate.clone()
        };
        if let Some(d) = delegate {
            d.on_state_changed(&new_state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::{DeviceError, EncodingError};
    use crate::models::pdu::{Layer, PduType, Value};
    use crate::source::scripted::ScriptedSource;

    /// Raw PDU whose encoding is `4 + payload_len` bytes for small timestamps.
    fn raw_pdu(ts: i64, payload_len: usize) -> Pdu {
        Pdu::new(ts, payload_len as u32, Layer::raw(&vec![ts as u8; payload_len]))
    }

    fn session(pdus: Vec<Pdu>) -> CaptureSession {
        CaptureSession::new(Box::new(ScriptedSource::new(pdus)))
    }

    fn encode_all(pdus: &[Pdu]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        pdus.iter()
            .flat_map(|p| encoder.encode_to_vec(p).unwrap())
            .collect()
    }

    #[test]
    fn three_ten_byte_records_across_two_fills() {
        let pdus = vec![raw_pdu(1, 6), raw_pdu(2, 6), raw_pdu(3, 6)];
        let mut encoder = Encoder::new();
        for pdu in &pdus {
            assert_eq!(encoder.encode(pdu).unwrap().len(), 10);
        }
        let mut session = session(pdus.clone());

        let mut first = [0u8; 25];
        let report = session.fill_buffer(&mut first).unwrap();
        assert_eq!(report.pdu_count, 2);
        assert_eq!(report.bytes_written, 20);
        assert!(!report.exhausted);
        assert!(report.error.is_none());
        assert!(session.has_pending());
        assert_eq!(&first[..20], &encode_all(&pdus[..2])[..]);

        let mut second = [0u8; 15];
        let report = session.fill_buffer(&mut second).unwrap();
        assert_eq!(report.pdu_count, 1);
        assert_eq!(report.bytes_written, 10);
        assert!(report.exhausted);
        assert!(!session.has_pending());
        assert_eq!(&second[..10], &encode_all(&pdus[2..])[..]);
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn order_and_completeness_for_any_buffer_size() {
        let pdus: Vec<Pdu> = (0..20).map(|i| raw_pdu(i, (i as usize * 7) % 13)).collect();
        let expected = encode_all(&pdus);

        for size in [16, 17, 23, 40, 64, 1000] {
            let mut session = session(pdus.clone());
            let mut collected = Vec::new();
            let mut total = 0;
            loop {
                let mut buf = vec![0u8; size];
                let report = session.fill_buffer(&mut buf).unwrap();
                assert!(report.error.is_none());
                collected.extend_from_slice(&buf[..report.bytes_written]);
                total += report.pdu_count;
                if report.exhausted {
                    break;
                }
                assert!(report.pdu_count > 0, "no progress with buffer size {size}");
            }
            assert_eq!(total, pdus.len());
            assert_eq!(collected, expected, "buffer size {size}");
        }
    }

    #[test]
    fn order_and_completeness_when_buffer_size_changes_between_fills() {
        let pdus: Vec<Pdu> = (0..20).map(|i| raw_pdu(i, (i as usize * 7) % 13)).collect();
        let expected = encode_all(&pdus);

        for sizes in [&[11, 40, 16, 1000][..], &[17, 12, 29, 5, 64][..]] {
            let mut session = session(pdus.clone());
            let mut collected = Vec::new();
            let mut total = 0;
            let mut exhausted = false;
            for &size in sizes.iter().cycle().take(200) {
                let mut buf = vec![0u8; size];
                let report = session.fill_buffer(&mut buf).unwrap();
                assert!(report.error.is_none());
                collected.extend_from_slice(&buf[..report.bytes_written]);
                total += report.pdu_count;
                if report.exhausted {
                    exhausted = true;
                    break;
                }
            }
            assert!(exhausted, "sizes {sizes:?} never drained the source");
            assert_eq!(total, pdus.len());
            assert_eq!(collected, expected, "sizes {sizes:?}");
        }
    }

    #[test]
    fn deferred_pdu_is_written_first_next_time() {
        let pdus = vec![raw_pdu(1, 2), raw_pdu(2, 20), raw_pdu(3, 2)];
        let mut session = session(pdus.clone());

        let mut buf = [0u8; 12];
        let report = session.fill_buffer(&mut buf).unwrap();
        assert_eq!(report.pdu_count, 1);

        let mut buf = [0u8; 64];
        let report = session.fill_buffer(&mut buf).unwrap();
        assert_eq!(report.pdu_count, 2);
        assert_eq!(&buf[..report.bytes_written], &encode_all(&pdus[1..])[..]);
    }

    #[test]
    fn oversized_record_stays_pending_without_error() {
        let mut session = session(vec![raw_pdu(1, 50), raw_pdu(2, 1)]);

        for _ in 0..3 {
            let mut buf = [0u8; 16];
            let report = session.fill_buffer(&mut buf).unwrap();
            assert_eq!(report.pdu_count, 0);
            assert_eq!(report.bytes_written, 0);
            assert!(!report.exhausted);
            assert!(report.error.is_none());
            assert!(session.has_pending());
        }

        let mut buf = [0u8; 128];
        let report = session.fill_buffer(&mut buf).unwrap();
        assert_eq!(report.pdu_count, 2);
        assert!(report.exhausted);
        assert_eq!(session.stats().deferrals, 3);
    }

    #[test]
    fn exhausted_source_keeps_reporting_exhausted() {
        let mut session = session(vec![raw_pdu(1, 1)]);
        let mut buf = [0u8; 64];
        assert_eq!(session.fill_buffer(&mut buf).unwrap().into_result(), Ok((1, true)));
        for _ in 0..2 {
            assert_eq!(session.fill_buffer(&mut buf).unwrap().into_result(), Ok((0, true)));
        }
    }

    #[test]
    fn source_error_keeps_partial_progress_and_allows_retry() {
        let error = CaptureError::Device(DeviceError::Io("read timed out".into()));
        let pdus = vec![raw_pdu(1, 1), raw_pdu(2, 1), raw_pdu(3, 1)];
        let source = ScriptedSource::new(pdus.clone()).with_failure(1, error.clone());
        let mut session = CaptureSession::new(Box::new(source));

        let mut buf = [0u8; 64];
        let report = session.fill_buffer(&mut buf).unwrap();
        assert_eq!(report.pdu_count, 1);
        assert_eq!(report.error, Some(error));
        assert_eq!(&buf[..report.bytes_written], &encode_all(&pdus[..1])[..]);
        assert_eq!(session.state(), CaptureState::Idle);

        let report = session.fill_buffer(&mut buf).unwrap();
        assert_eq!(report.pdu_count, 2);
        assert!(report.exhausted);
        assert_eq!(&buf[..report.bytes_written], &encode_all(&pdus[1..])[..]);
        assert_eq!(session.stats().fill_errors, 1);
    }

    #[test]
    fn encoding_error_is_reported_with_count() {
        let bad = Pdu::new(0, 0, Layer::new(PduType::Udp, vec![Value::Int(1)]));
        let mut session = session(vec![raw_pdu(1, 1), bad, raw_pdu(2, 1)]);

        let mut buf = [0u8; 64];
        let report = session.fill_buffer(&mut buf).unwrap();
        assert_eq!(report.pdu_count, 1);
        assert!(matches!(
            report.error,
            Some(CaptureError::Encoding(EncodingError::FieldCount { .. }))
        ));

        let report = session.fill_buffer(&mut buf).unwrap();
        assert_eq!(report.into_result(), Ok((1, true)));
    }

    #[test]
    fn closed_session_refuses_fills() {
        let mut session = session(vec![raw_pdu(1, 1)]);
        session.close();
        session.close();
        assert_eq!(session.state(), CaptureState::Closed);

        let mut buf = [0u8; 64];
        assert_eq!(session.fill_buffer(&mut buf), Err(CaptureError::SessionClosed));
    }

    #[test]
    fn admission_refuses_overlapping_fill() {
        let session = session(vec![]);
        let shared = session.shared();
        admit(&shared).unwrap();
        assert_eq!(admit(&shared), Err(CaptureError::FillInProgress));

        shared.lock().close_requested = true;
        assert_eq!(admit(&shared), Err(CaptureError::SessionClosed));
    }

    #[test]
    fn info_describes_source() {
        let session = session(vec![]);
        let info = session.info();
        assert!(info.source.starts_with("scripted"));
        assert!(chrono::DateTime::parse_from_rfc3339(&info.opened_at).is_ok());
    }
}
