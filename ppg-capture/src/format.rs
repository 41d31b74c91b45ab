//! Reader/writer for the capture binary format: a small, explicit writer
//! paired with a reader that tolerates a short final record.

use std::fmt;
use std::io::{self, Read, Write};

/// 4-byte magic identifying a capture file/stream.
pub const MAGIC: [u8; 4] = *b"PPGL";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 8;
pub const RECORD_LEN: usize = 24;

#[derive(Debug)]
pub enum CaptureError {
    Io(io::Error),
    BadMagic,
    UnsupportedVersion(u8),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Io(e) => write!(f, "I/O error: {e}"),
            CaptureError::BadMagic => write!(f, "not a capture stream (bad magic)"),
            CaptureError::UnsupportedVersion(v) => write!(f, "unsupported capture version {v}"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<io::Error> for CaptureError {
    fn from(e: io::Error) -> Self {
        CaptureError::Io(e)
    }
}

/// One decoded record: a bundle timestamp plus five sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRecord {
    pub ts_ms: i32,
    pub samples: [i32; 5],
}

/// Writes capture records to any `Write` sink, emitting the header on the
/// first write.
pub struct CaptureWriter<W: Write> {
    sink: W,
    channel: u8,
    header_written: bool,
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(sink: W, channel: u8) -> Self {
        Self {
            sink,
            channel,
            header_written: false,
        }
    }

    fn write_header(&mut self) -> Result<(), CaptureError> {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&MAGIC);
        header[4] = FORMAT_VERSION;
        header[5] = self.channel;
        // bytes 6..8 reserved, already zero
        self.sink.write_all(&header)?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_record(&mut self, record: CaptureRecord) -> Result<(), CaptureError> {
        if !self.header_written {
            self.write_header()?;
        }
        let mut buf = [0u8; RECORD_LEN];
        buf[0..4].copy_from_slice(&record.ts_ms.to_le_bytes());
        for (i, s) in record.samples.iter().enumerate() {
            let off = 4 + i * 4;
            buf[off..off + 4].copy_from_slice(&s.to_le_bytes());
        }
        self.sink.write_all(&buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.sink.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Reads capture records from any `Read` source, stopping cleanly on a
/// short final read (partial trailing record, or no trailing bytes at all).
pub struct CaptureReader<R: Read> {
    source: R,
    pub channel: u8,
}

impl<R: Read> CaptureReader<R> {
    /// Parse the 8-byte header and return a reader positioned at the first
    /// record.
    pub fn open(mut source: R) -> Result<Self, CaptureError> {
        let mut header = [0u8; HEADER_LEN];
        source.read_exact(&mut header)?;
        if header[0..4] != MAGIC {
            return Err(CaptureError::BadMagic);
        }
        let version = header[4];
        if version != FORMAT_VERSION {
            return Err(CaptureError::UnsupportedVersion(version));
        }
        let channel = header[5];
        Ok(Self { source, channel })
    }

    /// Read the next record. Returns `Ok(None)` on a clean end-of-stream;
    /// a short (partial) trailing record is also treated as end-of-stream,
    /// not an error.
    pub fn read_record(&mut self) -> Result<Option<CaptureRecord>, CaptureError> {
        let mut buf = [0u8; RECORD_LEN];
        let mut filled = 0;
        loop {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => {
                    return if filled == 0 {
                        Ok(None)
                    } else {
                        Ok(None) // short trailing record: treat as end
                    }
                }
                Ok(n) => {
                    filled += n;
                    if filled == RECORD_LEN {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let ts_ms = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let mut samples = [0i32; 5];
        for (i, s) in samples.iter_mut().enumerate() {
            let off = 4 + i * 4;
            *s = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        Ok(Some(CaptureRecord { ts_ms, samples }))
    }

    /// Drain all remaining records.
    pub fn read_all(&mut self) -> Result<Vec<CaptureRecord>, CaptureError> {
        let mut out = Vec::new();
        while let Some(r) = self.read_record()? {
            out.push(r);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_records_byte_identical() {
        let records = vec![
            CaptureRecord {
                ts_ms: 1000,
                samples: [10, 20, 30, 40, 50],
            },
            CaptureRecord {
                ts_ms: 1020,
                samples: [11, 21, 31, 41, 51],
            },
        ];

        let mut buf = Vec::new();
        {
            let mut writer = CaptureWriter::new(&mut buf, 2);
            for r in &records {
                writer.write_record(*r).unwrap();
            }
            writer.flush().unwrap();
        }

        let mut reader = CaptureReader::open(Cursor::new(buf)).unwrap();
        assert_eq!(reader.channel, 2);
        let read_back = reader.read_all().unwrap();
        assert_eq!(read_back, records);
    }

    #[test]
    fn short_trailing_record_ends_stream_without_error() {
        let mut buf = Vec::new();
        {
            let mut writer = CaptureWriter::new(&mut buf, 0);
            writer
                .write_record(CaptureRecord {
                    ts_ms: 1,
                    samples: [1, 2, 3, 4, 5],
                })
                .unwrap();
        }
        // Truncate to simulate a torn write.
        buf.truncate(buf.len() - 3);

        let mut reader = CaptureReader::open(Cursor::new(buf)).unwrap();
        let records = reader.read_all().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; HEADER_LEN];
        let err = CaptureReader::open(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, CaptureError::BadMagic));
    }
}
