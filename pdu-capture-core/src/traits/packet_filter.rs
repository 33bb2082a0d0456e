/// A compiled capture filter.
///
/// Filter compilation lives outside this crate; sources only ask whether a
/// raw link-layer frame should be kept.
pub trait PacketFilter: Send + Sync {
    fn matches(&self, frame: &[u8]) -> bool;
}

impl<F> PacketFilter for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn matches(&self, frame: &[u8]) -> bool {
        self(frame)
    }
}
