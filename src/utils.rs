use std::io;

/// Returns the next `len` bytes of `bytes` and advances `offset`.
///
/// Returns `None` instead of panicking when the slice is too short.
pub(crate) fn slice_and_increment<'a>(
    offset: &mut usize,
    len: usize,
    bytes: &'a [u8],
) -> Option<&'a [u8]> {
    let end = offset.checked_add(len)?;
    let slice = bytes.get(*offset..end)?;
    *offset = end;
    Some(slice)
}

/// Fills `buf` as far as the reader allows, returning the number of bytes read.
///
/// Unlike `read_exact` a short read is not an error, which lets callers treat a
/// truncated tail as the end of a stream.
pub(crate) fn read_fully<R: io::Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// A byte range within a shared buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    offset: usize,
    length: usize,
}
impl Span {
    #[must_use]
    pub fn new(offset: usize, length: usize) -> Self {
        Span { offset, length }
    }

    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.length
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_slice_and_increment() {
        let bytes = b"abcdef";
        let mut offset = 0;
        assert_eq!(slice_and_increment(&mut offset, 2, bytes), Some(&b"ab"[..]));
        assert_eq!(slice_and_increment(&mut offset, 3, bytes), Some(&b"cde"[..]));
        assert_eq!(offset, 5);
        assert_eq!(slice_and_increment(&mut offset, 2, bytes), None);
        assert_eq!(offset, 5);
    }

    #[test]
    fn test_read_fully_short() {
        let mut input: &[u8] = b"xyz";
        let mut buf = [0u8; 8];
        assert_eq!(read_fully(&mut input, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"xyz");
    }

    #[test]
    fn test_span_range() {
        let span = Span::new(4, 3);
        assert_eq!(span.range(), 4..7);
        assert_eq!(span.len(), 3);
        assert!(!span.is_empty());
    }
}
