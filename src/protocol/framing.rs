//! C9: wire framing & I/O (spec §4.9) — buffered line reader, length-
//! prefixed blob reader, best-effort retried writes, and a trait-object
//! seam for the `STLS` TLS upgrade.
//!
//! Grounded on `original_source/webcit/sockets.c`'s line/blob read loop,
//! reworked as a generic reader over anything `Read + Write` so the same
//! code drives TCP, Unix-domain, and (after `STLS`) TLS streams.

use std::io::{self, Read, Write};

/// Maximum line length accepted by the buffered reader, guarding against
/// unbounded memory growth from a misbehaving peer.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// Anything the session can read/write bytes through — a plain socket, or
/// (after `STLS`) a TLS-wrapped one. `Box<dyn ReadWrite>` lets the
/// session swap the underlying transport without changing its own code.
pub trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

pub struct Framing {
    stream: Box<dyn ReadWrite>,
    buf: Vec<u8>,
    /// Offset of the first unconsumed byte within `buf`.
    pos: usize,
}

impl Framing {
    pub fn new(stream: Box<dyn ReadWrite>) -> Self {
        Framing {
            stream,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Swap the underlying transport, e.g. after a successful `STLS`
    /// handshake. Any buffered plaintext read ahead of the upgrade is
    /// preserved (there should be none across a well-behaved STLS, but we
    /// don't assume it).
    pub fn swap_transport(&mut self, stream: Box<dyn ReadWrite>) {
        self.stream = stream;
    }

    /// Read one line, stripping a trailing `\r\n` or `\n`. Returns `Ok(None)`
    /// on clean peer close.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(nl) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
                let end = self.pos + nl;
                let mut line = self.buf[self.pos..end].to_vec();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.pos = end + 1;
                self.compact();
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.buf.len() - self.pos >= MAX_LINE_LEN {
                return Err(io::Error::other("line too long"));
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read lines until a bare `000` terminator (a "listing", spec §4.6).
    pub fn read_listing(&mut self) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        loop {
            match self.read_line()? {
                Some(line) if line == "000" => break,
                Some(line) => out.push(line),
                None => break,
            }
        }
        Ok(out)
    }

    /// Read exactly `n` bytes — used by 6xx binary follow-ups and blob
    /// uploads (spec §4.9).
    pub fn read_exact_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let available = self.buf.len() - self.pos;
            if available > 0 {
                let take = available.min(n - out.len());
                out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
                self.pos += take;
                continue;
            }
            let mut chunk = vec![0u8; (n - out.len()).min(64 * 1024)];
            let got = self.stream.read(&mut chunk)?;
            if got == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed mid-blob"));
            }
            out.extend_from_slice(&chunk[..got]);
        }
        self.compact();
        Ok(out)
    }

    /// Read bytes until peer close (7xx: binary follow-up with no length).
    pub fn read_until_close(&mut self) -> io::Result<Vec<u8>> {
        let mut out = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();
        self.compact();
        let mut chunk = [0u8; 64 * 1024];
        loop {
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    fn compact(&mut self) {
        if self.pos > 0 && self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
    }

    /// Write one line (with trailing `\r\n`), retrying on short writes
    /// (spec §4.9: "best-effort with retry on short-write").
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write_all_retrying(line.as_bytes())?;
        self.write_all_retrying(b"\r\n")
    }

    pub fn write_lines(&mut self, lines: &[String]) -> io::Result<()> {
        for l in lines {
            self.write_line(l)?;
        }
        Ok(())
    }

    /// Write a listing followed by its `000` terminator.
    pub fn write_listing(&mut self, lines: &[String]) -> io::Result<()> {
        self.write_lines(lines)?;
        self.write_line("000")
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all_retrying(data)
    }

    fn write_all_retrying(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            match self.stream.write(data) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")),
                Ok(n) => data = &data[n..],
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct DuplexMock {
        read: Cursor<Vec<u8>>,
        pub written: Vec<u8>,
    }

    impl Read for DuplexMock {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.read.read(buf)
        }
    }
    impl Write for DuplexMock {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn framing_with(input: &[u8]) -> Framing {
        Framing::new(Box::new(DuplexMock {
            read: Cursor::new(input.to_vec()),
            written: Vec::new(),
        }))
    }

    #[test]
    fn reads_crlf_and_lf_lines() {
        let mut f = framing_with(b"one\r\ntwo\nthree\n");
        assert_eq!(f.read_line().unwrap(), Some("one".to_string()));
        assert_eq!(f.read_line().unwrap(), Some("two".to_string()));
        assert_eq!(f.read_line().unwrap(), Some("three".to_string()));
    }

    #[test]
    fn listing_stops_at_terminator() {
        let mut f = framing_with(b"alpha\nbeta\n000\nnotread\n");
        let listing = f.read_listing().unwrap();
        assert_eq!(listing, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(f.read_line().unwrap(), Some("notread".to_string()));
    }

    #[test]
    fn reads_exact_blob_length() {
        let mut f = framing_with(b"HELLOWORLDtrailing");
        let blob = f.read_exact_bytes(10).unwrap();
        assert_eq!(blob, b"HELLOWORLD");
        assert_eq!(f.read_line().unwrap(), Some("trailing".to_string()));
    }

    #[test]
    fn overlong_line_is_rejected() {
        let huge = vec![b'x'; MAX_LINE_LEN + 10];
        let mut f = framing_with(&huge);
        assert!(f.read_line().is_err());
    }
}
