//! Binary capture/replay format for the raw PPG stream.
//!
//! Little-endian. Header: magic `PPGL` (4 bytes) + version=1 (1 byte) +
//! channel id (1 byte) + reserved 0 (2 bytes) = 8 bytes. Record: ts_ms
//! (i32) + s0..s4 (i32 each) = 24 bytes. Records follow the header
//! concatenated; a file/stream ends on short read.

pub mod format;

pub use format::{CaptureError, CaptureReader, CaptureRecord, CaptureWriter, HEADER_LEN, MAGIC, RECORD_LEN};
