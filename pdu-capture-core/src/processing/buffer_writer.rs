/// All-or-nothing writer over a caller-provided byte region.
///
/// Owns no memory. A write either lands completely at the current offset or
/// leaves the buffer and offset untouched, so a record can never be split
/// across two fills.
#[derive(Debug)]
pub struct BufferWriter<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Copy `bytes` at the current offset if they fit entirely.
    ///
    /// Returns `false` without writing anything otherwise.
    pub fn try_write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        let end = self.offset + bytes.len();
        self.buffer[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
        true
    }

    /// Bytes written so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The total capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// The written prefix of the buffer.
    pub fn written(&self) -> &[u8] {
        &self.buffer[..self.offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_writes_advance_offset() {
        let mut buf = [0u8; 8];
        let mut writer = BufferWriter::new(&mut buf);

        assert!(writer.try_write(&[1, 2, 3]));
        assert!(writer.try_write(&[4, 5]));
        assert_eq!(writer.offset(), 5);
        assert_eq!(writer.remaining(), 3);
        assert_eq!(writer.written(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn oversized_write_is_a_no_op() {
        let mut buf = [0u8; 4];
        let mut writer = BufferWriter::new(&mut buf);

        assert!(writer.try_write(&[9, 9]));
        assert!(!writer.try_write(&[1, 2, 3]));
        assert_eq!(writer.offset(), 2);
        drop(writer);
        assert_eq!(buf, [9, 9, 0, 0]);
    }

    #[test]
    fn exact_fit_fills_buffer() {
        let mut buf = [0u8; 3];
        let mut writer = BufferWriter::new(&mut buf);

        assert!(writer.try_write(&[7, 7, 7]));
        assert!(writer.is_full());
        assert!(!writer.try_write(&[1]));
        assert!(writer.try_write(&[]));
    }

    #[test]
    fn zero_capacity_rejects_everything_but_empty() {
        let mut buf: [u8; 0] = [];
        let mut writer = BufferWriter::new(&mut buf);

        assert_eq!(writer.capacity(), 0);
        assert!(writer.is_full());
        assert!(!writer.try_write(&[0]));
        assert!(writer.try_write(&[]));
    }
}
