use std::io::{self, BufRead};

/// Decodes a chunked transfer encoded stream one chunk at a time.
///
/// Each chunk is returned whole so the caller can hand it to a streaming
/// sink without re-buffering. The trailing CRLF of every chunk and the
/// final CRLF after the terminating zero-size chunk are validated; a
/// mismatch is an `InvalidData` error rather than a silent trim.
pub(crate) struct ChunkReader<R> {
    source: R,

    // set once the terminating zero-size chunk has been consumed
    done: bool,
}

impl<R: BufRead> ChunkReader<R> {
    pub fn new(source: R) -> ChunkReader<R> {
        ChunkReader {
            source,
            done: false,
        }
    }

    /// Returns the next decoded chunk, or `None` once the terminating
    /// chunk and its final CRLF have been consumed.
    pub fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let size = self.read_size_line()?;

        if size == 0 {
            self.expect_crlf()?;
            self.done = true;
            return Ok(None);
        }

        let mut chunk = vec![0; size + 2];
        self.source.read_exact(&mut chunk)?;

        if &chunk[size..] != b"\r\n" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "chunk data is not followed by CRLF",
            ));
        }

        chunk.truncate(size);
        Ok(Some(chunk))
    }

    /// Reads the `hex-size[;extensions] CRLF` line introducing a chunk.
    fn read_size_line(&mut self) -> io::Result<usize> {
        let mut line = Vec::new();
        self.source.read_until(b'\n', &mut line)?;

        if line.pop() != Some(b'\n') || line.pop() != Some(b'\r') {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunk size line is not CRLF terminated",
            ));
        }

        let line = std::str::from_utf8(&line)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk size is not ASCII"))?;

        // chunk extensions are allowed but carry nothing we use
        let size = match line.splitn(2, ';').next() {
            Some(digits) => digits.trim(),
            None => "",
        };

        usize::from_str_radix(size, 16)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size"))
    }

    fn expect_crlf(&mut self) -> io::Result<()> {
        let mut end = [0; 2];
        self.source.read_exact(&mut end)?;

        if &end != b"\r\n" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "terminating chunk is not followed by CRLF",
            ));
        }

        Ok(())
    }
}
