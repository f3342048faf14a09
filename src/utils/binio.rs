//! Simple binary data serialization.
//!
//! The traits [`Compose`] and [`Parse`] are implemented by types that know
//! how to serialize themselves to and from a network-byte-order wire
//! format. The RTR PDU codec in [`crate::pdu`] builds directly on top of
//! these.

use std::{error, fmt, io, slice};
use bytes::Bytes;


//------------ Compose + Parse -----------------------------------------------

pub trait Compose<W> {
    fn compose(&self, target: &mut W) -> Result<(), io::Error>;
}

pub trait Parse<R>
where Self: Sized {
    fn parse(source: &mut R) -> Result<Self, ParseError>;
}


//------------ u8 ------------------------------------------------------------

impl<W: io::Write> Compose<W> for u8 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(slice::from_ref(self))
    }
}

impl<R: io::Read> Parse<R> for u8 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u8;
        source.read_exact(slice::from_mut(&mut res))?;
        Ok(res)
    }
}


//------------ u16 -----------------------------------------------------------

impl<W: io::Write> Compose<W> for u16 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(&self.to_be_bytes())
    }
}

impl<R: io::Read> Parse<R> for u16 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u16.to_ne_bytes();
        source.read_exact(&mut res)?;
        Ok(u16::from_be_bytes(res))
    }
}


//------------ u32 -----------------------------------------------------------

impl<W: io::Write> Compose<W> for u32 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(&self.to_be_bytes())
    }
}

impl<R: io::Read> Parse<R> for u32 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u32.to_ne_bytes();
        source.read_exact(&mut res)?;
        Ok(u32::from_be_bytes(res))
    }
}


//------------ u64 -----------------------------------------------------------

impl<W: io::Write> Compose<W> for u64 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(&self.to_be_bytes())
    }
}

impl<R: io::Read> Parse<R> for u64 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u64.to_ne_bytes();
        source.read_exact(&mut res)?;
        Ok(u64::from_be_bytes(res))
    }
}


//------------ u128 -----------------------------------------------------------

impl<W: io::Write> Compose<W> for u128 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(&self.to_be_bytes())
    }
}

impl<R: io::Read> Parse<R> for u128 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u128.to_ne_bytes();
        source.read_exact(&mut res)?;
        Ok(u128::from_be_bytes(res))
    }
}


//------------ Bytes ---------------------------------------------------------
//
// Encoded as a u32 for the length and then that many bytes. If the length
// doesn’t fit in a u32, the encoder produces an error.

impl<W: io::Write> Compose<W> for Bytes {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        u32::try_from(self.len())
        .map_err(|_| ParseError::format("excessively large data"))?
        .compose(target)?;
        target.write_all(self.as_ref())
    }
}

impl<R: io::Read> Parse<R> for Bytes {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let len = usize::try_from(u32::parse(source)?).map_err(|_| {
            ParseError::format("data block too large for this system")
        })?;
        let mut bits = vec![0u8; len];
        source.read_exact(&mut bits)?;
        Ok(bits.into())
    }
}


//------------ ParseError ----------------------------------------------------

#[derive(Debug)]
pub struct ParseError {
    err: io::Error,
    is_fatal: bool,
}

impl ParseError {
    /// Creates an error for bad formatting.
    pub fn format(
        err: impl Into<Box<dyn error::Error + Send + Sync>>
    ) -> Self {
        ParseError {
            err: io::Error::new(io::ErrorKind::Other, err),
            is_fatal: false,
        }
    }

    /// Returns whether parsing failed fatally.
    ///
    /// Any error other than bad formatting or early EOF is considered fatal.
    pub fn is_fatal(&self) -> bool {
        self.is_fatal
    }

    /// Returns whether the error was an unexpected EOF.
    pub fn is_eof(&self) -> bool {
        self.err.kind() == io::ErrorKind::UnexpectedEof
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        ParseError {
            is_fatal: err.kind() != io::ErrorKind::UnexpectedEof,
            err
        }
    }
}

impl From<ParseError> for io::Error {
    fn from(err: ParseError) -> Self {
        err.err
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.err.fmt(f)
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn test_write_read<T>(t: T)
    where T: Compose<Vec<u8>> + for<'a> Parse<&'a [u8]> + Eq + std::fmt::Debug
    {
        let mut encoded = Vec::new();
        t.compose(&mut encoded).unwrap();
        let mut slice = encoded.as_slice();
        let decoded = T::parse(&mut slice).unwrap();
        assert!(slice.is_empty());
        assert_eq!(t, decoded)
    }

    #[test]
    fn write_read_u8() {
        test_write_read(0u8);
        test_write_read(127u8);
        test_write_read(255u8);
    }

    #[test]
    fn write_read_u16() {
        test_write_read(0u16);
        test_write_read(12345u16);
        test_write_read(0xFFFFu16);
    }

    #[test]
    fn write_read_u32() {
        test_write_read(0u32);
        test_write_read(127u32);
        test_write_read(0xFFFF_FFFFu32);
    }

    #[test]
    fn write_read_u64() {
        test_write_read(0u64);
        test_write_read(127u64);
        test_write_read(0xFFFF_FFFF_FFFF_FFFFu64);
    }

    #[test]
    fn write_read_u128() {
        test_write_read(0u128);
        test_write_read(0xFFFF_FFFF_FFFF_FFFF_FFFF_FFFF_FFFF_FFFFu128);
    }

    #[test]
    fn write_read_bytes() {
        test_write_read(Bytes::new());
        test_write_read(Bytes::copy_from_slice(b"bla"));
    }
}
