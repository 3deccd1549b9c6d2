//! Print jobs
//!
//! A print job is anything that can produce the raw, printer-ready bytes to
//! send. Encoding (ESC/POS or otherwise) happens before the job reaches the
//! printer; the session never looks inside the buffer.

use bytes::Bytes;
use std::io::{self, Read};
use std::path::Path;

/// Producer of printer-ready data
pub trait PrintJob {
    /// The bytes to write to the printer
    fn print_data(&self) -> Bytes;
}

impl PrintJob for Bytes {
    fn print_data(&self) -> Bytes {
        self.clone()
    }
}

impl PrintJob for Vec<u8> {
    fn print_data(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl PrintJob for [u8] {
    fn print_data(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> PrintJob for [u8; N] {
    fn print_data(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<T: PrintJob + ?Sized> PrintJob for &T {
    fn print_data(&self) -> Bytes {
        (**self).print_data()
    }
}

/// Pre-encoded print data loaded from a file or stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawJob {
    data: Bytes,
}

impl RawJob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Read the whole stream into a job
    pub fn from_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::read(path).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PrintJob for RawJob {
    fn print_data(&self) -> Bytes {
        self.data.clone()
    }
}
