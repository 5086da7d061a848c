//! Body-capturing writer.
//!
//! [`BodyWriter`] sits in front of a real output sink and keeps a copy of
//! every byte the sink accepts. The copy is bookkeeping only: whatever the
//! real sink returns (a count, a short write, an error) goes back to the
//! caller untouched.

use std::fmt;
use std::io;

/// Tees writes into an in-memory duplicate.
pub struct BodyWriter<W> {
    inner: W,
    dup: Vec<u8>,
}

impl<W: io::Write> BodyWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, dup: Vec::new() }
    }

    /// Text write. Same bytes, same bookkeeping as [`io::Write::write`].
    pub fn write_str(&mut self, s: &str) -> io::Result<usize> {
        io::Write::write(self, s.as_bytes())
    }

    /// Every byte the real sink has accepted so far.
    pub fn captured(&self) -> &[u8] { &self.dup }

    pub fn get_ref(&self) -> &W { &self.inner }
    pub fn get_mut(&mut self) -> &mut W { &mut self.inner }

    /// Splits into the real sink and the captured duplicate.
    pub fn into_parts(self) -> (W, Vec<u8>) {
        (self.inner, self.dup)
    }
}

impl<W: io::Write> io::Write for BodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // A sink reporting more than it was given is lying; keep what we have.
        self.dup.extend_from_slice(buf.get(..n).unwrap_or(buf));
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W> fmt::Debug for BodyWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyWriter")
            .field("captured", &self.dup.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Accepts at most `room` bytes per call, then fails once `budget` runs out.
    struct Flaky {
        out: Vec<u8>,
        room: usize,
        budget: usize,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            let n = buf.len().min(self.room).min(self.budget);
            self.out.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    #[test]
    fn bytes_and_text_writes_capture_identically() {
        let mut w = BodyWriter::new(Vec::new());
        w.write_all(b"hello ").unwrap();
        w.write_str("world").unwrap();
        let (real, dup) = w.into_parts();
        assert_eq!(real, b"hello world");
        assert_eq!(dup, real);
    }

    #[test]
    fn short_writes_are_not_double_counted() {
        let mut w = BodyWriter::new(Flaky { out: Vec::new(), room: 3, budget: usize::MAX });
        w.write_all(b"abcdefgh").unwrap();
        assert_eq!(w.captured(), b"abcdefgh");
        assert_eq!(w.get_ref().out, b"abcdefgh");
    }

    #[test]
    fn real_sink_error_passes_through_unchanged() {
        let mut w = BodyWriter::new(Flaky { out: Vec::new(), room: 64, budget: 4 });
        assert_eq!(w.write(b"abcdef").unwrap(), 4);
        let err = w.write(b"ef").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(w.captured(), b"abcd");
    }
}
