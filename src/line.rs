//! Physical line reading with legacy-encoding fallback
//!
//! WMAP files predate UTF-8 adoption; label lines written by Chinese MapGIS
//! installations are commonly GBK. Each line is validated as UTF-8 first
//! (SIMD path) and decoded through the configured fallback encoding
//! otherwise. The reader also counts consumed lines so a layer can rewind
//! to its first record without re-sniffing the header.

use std::io::{self, BufRead, Seek, SeekFrom};

use encoding_rs::Encoding;

/// Default fallback encoding for non-UTF-8 content.
pub fn default_encoding() -> &'static Encoding {
    encoding_rs::GBK
}

/// Buffered, forward-only line reader over one open stream handle.
pub struct LineReader<R> {
    inner: R,
    encoding: &'static Encoding,
    lines_read: u64,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_encoding(inner, default_encoding())
    }

    pub fn with_encoding(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            lines_read: 0,
        }
    }

    /// Reads one physical line, stripping the terminator (`\n` or `\r\n`).
    ///
    /// Returns `None` only at end of stream; an empty line decodes to
    /// `Some(String::new())`.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(self.decode(&buf)))
    }

    /// Number of physical lines consumed since the start of the stream
    /// (or the last rewind).
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match simdutf8::basic::from_utf8(bytes) {
            Ok(s) => s.to_owned(),
            Err(_) => {
                let (decoded, _, _) = self.encoding.decode(bytes);
                decoded.into_owned()
            }
        }
    }
}

impl<R: BufRead + Seek> LineReader<R> {
    /// Seeks back to the very start of the stream and resets the counter.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.lines_read = 0;
        Ok(())
    }
}
