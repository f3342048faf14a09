//! RTR PDUs: the wire codec.
//!
//! This module contains the type that represents every protocol data unit
//! of RPKI-to-Router in its decoded form, plus the logic to read and write
//! the binary wire representation. See RFC 6810 (version 0), RFC 8210
//! (version 1) and draft-ietf-sidrops-rtr-rpki-rov (version 2, adds ASPA).
//!
//! Every PDU starts with the same 8-byte header:
//!
//! ```text
//! version (u8) | type (u8) | session_id/error_code/reserved (u16) | length (u32)
//! ```
//!
//! `length` always covers the header itself, so it is never smaller than
//! 8. [`Pdu::read`] enforces that plus an upper bound of 65535 bytes, a
//! generous cap that is still small enough to reject obviously malformed
//! input without allocating unbounded buffers.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use bytes::Bytes;
use crate::error::RtrError;
use crate::serial::Serial;
use crate::utils::binio::{Compose, Parse, ParseError};

/// The maximum length, in bytes, of a single PDU on the wire.
pub const MAX_PDU_LEN: u32 = 65535;

/// The length, in bytes, of the common PDU header.
pub const HEADER_LEN: u32 = 8;

/// The length, in octets, of a Router Key's Subject Key Identifier.
pub const SKI_LEN: usize = 20;


//------------ Pdu -------------------------------------------------------

/// A single, decoded protocol data unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pdu {
    SerialNotify {
        version: u8,
        session_id: u16,
        serial: Serial,
    },
    SerialQuery {
        version: u8,
        session_id: u16,
        serial: Serial,
    },
    ResetQuery {
        version: u8,
    },
    CacheResponse {
        version: u8,
        session_id: u16,
    },
    Ipv4Prefix {
        version: u8,
        flags: u8,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv4Addr,
        asn: u32,
    },
    Ipv6Prefix {
        version: u8,
        flags: u8,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv6Addr,
        asn: u32,
    },
    EndOfData {
        version: u8,
        session_id: u16,
        serial: Serial,
        /// `None` on version 0, which has no per-cache timer parameters.
        intervals: Option<Intervals>,
    },
    CacheReset {
        version: u8,
    },
    RouterKey {
        version: u8,
        flags: u8,
        ski: [u8; SKI_LEN],
        asn: u32,
        spki: Bytes,
    },
    ErrorReport {
        version: u8,
        error_code: ErrorCode,
        encapsulated_pdu: Bytes,
        error_text: String,
    },
    Aspa {
        version: u8,
        flags: u8,
        afi_flags: u8,
        customer_asn: u32,
        provider_asns: Vec<u32>,
    },
}

/// The refresh/retry/expire timer parameters carried by version 1+
/// End-of-Data PDUs.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq,
    serde::Serialize, serde::Deserialize,
)]
pub struct Intervals {
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
}

/// The RFC 1982 default timer parameters a version 0 session is assumed to
/// use, since v0 never transmits them.
pub const V0_REFRESH: u32 = 3600;
pub const V0_RETRY: u32 = 600;
pub const V0_EXPIRE: u32 = 3600;

impl Pdu {
    pub const TYPE_SERIAL_NOTIFY: u8 = 0;
    pub const TYPE_SERIAL_QUERY: u8 = 1;
    pub const TYPE_RESET_QUERY: u8 = 2;
    pub const TYPE_CACHE_RESPONSE: u8 = 3;
    pub const TYPE_IPV4_PREFIX: u8 = 4;
    pub const TYPE_IPV6_PREFIX: u8 = 6;
    pub const TYPE_END_OF_DATA: u8 = 7;
    pub const TYPE_CACHE_RESET: u8 = 8;
    pub const TYPE_ROUTER_KEY: u8 = 9;
    pub const TYPE_ERROR_REPORT: u8 = 10;
    pub const TYPE_ASPA: u8 = 11;

    /// The protocol version this PDU claims to speak.
    pub fn version(&self) -> u8 {
        match *self {
            Pdu::SerialNotify { version, .. }
            | Pdu::SerialQuery { version, .. }
            | Pdu::ResetQuery { version }
            | Pdu::CacheResponse { version, .. }
            | Pdu::Ipv4Prefix { version, .. }
            | Pdu::Ipv6Prefix { version, .. }
            | Pdu::EndOfData { version, .. }
            | Pdu::CacheReset { version }
            | Pdu::RouterKey { version, .. }
            | Pdu::ErrorReport { version, .. }
            | Pdu::Aspa { version, .. } => version,
        }
    }

    /// The wire PDU type tag.
    pub fn pdu_type(&self) -> u8 {
        match self {
            Pdu::SerialNotify { .. } => Self::TYPE_SERIAL_NOTIFY,
            Pdu::SerialQuery { .. } => Self::TYPE_SERIAL_QUERY,
            Pdu::ResetQuery { .. } => Self::TYPE_RESET_QUERY,
            Pdu::CacheResponse { .. } => Self::TYPE_CACHE_RESPONSE,
            Pdu::Ipv4Prefix { .. } => Self::TYPE_IPV4_PREFIX,
            Pdu::Ipv6Prefix { .. } => Self::TYPE_IPV6_PREFIX,
            Pdu::EndOfData { .. } => Self::TYPE_END_OF_DATA,
            Pdu::CacheReset { .. } => Self::TYPE_CACHE_RESET,
            Pdu::RouterKey { .. } => Self::TYPE_ROUTER_KEY,
            Pdu::ErrorReport { .. } => Self::TYPE_ERROR_REPORT,
            Pdu::Aspa { .. } => Self::TYPE_ASPA,
        }
    }

    /// Whether this is one of the payload-bearing PDU types that a
    /// [`crate::changeset::Changeset`] can accumulate.
    pub fn is_payload(&self) -> bool {
        matches!(
            self,
            Pdu::Ipv4Prefix { .. }
            | Pdu::Ipv6Prefix { .. }
            | Pdu::RouterKey { .. }
            | Pdu::Aspa { .. }
        )
    }

    /// The announce/withdraw flag of a payload-bearing PDU.
    ///
    /// Returns `None` for PDU types that don't carry a flags byte.
    pub fn is_announce(&self) -> Option<bool> {
        let flags = match self {
            Pdu::Ipv4Prefix { flags, .. }
            | Pdu::Ipv6Prefix { flags, .. }
            | Pdu::RouterKey { flags, .. }
            | Pdu::Aspa { flags, .. } => *flags,
            _ => return None,
        };
        Some(flags & 1 == 1)
    }

    /// Writes the wire representation of this PDU to `target`.
    pub fn write<W: io::Write>(&self, target: &mut W) -> Result<(), io::Error> {
        match self {
            Pdu::SerialNotify { version, session_id, serial } => {
                Header::new(*version, Self::TYPE_SERIAL_NOTIFY, *session_id, 12)
                    .compose(target)?;
                serial.compose(target)
            }
            Pdu::SerialQuery { version, session_id, serial } => {
                Header::new(*version, Self::TYPE_SERIAL_QUERY, *session_id, 12)
                    .compose(target)?;
                serial.compose(target)
            }
            Pdu::ResetQuery { version } => {
                Header::new(*version, Self::TYPE_RESET_QUERY, 0, 8)
                    .compose(target)
            }
            Pdu::CacheResponse { version, session_id } => {
                Header::new(*version, Self::TYPE_CACHE_RESPONSE, *session_id, 8)
                    .compose(target)
            }
            Pdu::Ipv4Prefix { version, flags, prefix_len, max_len, prefix, asn } => {
                Header::new(*version, Self::TYPE_IPV4_PREFIX, 0, 20)
                    .compose(target)?;
                flags.compose(target)?;
                0u8.compose(target)?;
                prefix_len.compose(target)?;
                max_len.compose(target)?;
                u32::from(*prefix).compose(target)?;
                asn.compose(target)
            }
            Pdu::Ipv6Prefix { version, flags, prefix_len, max_len, prefix, asn } => {
                Header::new(*version, Self::TYPE_IPV6_PREFIX, 0, 32)
                    .compose(target)?;
                flags.compose(target)?;
                0u8.compose(target)?;
                prefix_len.compose(target)?;
                max_len.compose(target)?;
                u128::from(*prefix).compose(target)?;
                asn.compose(target)
            }
            Pdu::EndOfData { version, session_id, serial, intervals } => {
                match intervals {
                    None => {
                        Header::new(
                            *version, Self::TYPE_END_OF_DATA, *session_id, 12
                        ).compose(target)?;
                        serial.compose(target)
                    }
                    Some(iv) => {
                        Header::new(
                            *version, Self::TYPE_END_OF_DATA, *session_id, 24
                        ).compose(target)?;
                        serial.compose(target)?;
                        iv.refresh.compose(target)?;
                        iv.retry.compose(target)?;
                        iv.expire.compose(target)
                    }
                }
            }
            Pdu::CacheReset { version } => {
                Header::new(*version, Self::TYPE_CACHE_RESET, 0, 8)
                    .compose(target)
            }
            Pdu::RouterKey { version, flags, ski, asn, spki } => {
                let len = HEADER_LEN + 2 + SKI_LEN as u32 + 4 + spki.len() as u32;
                Header::new(*version, Self::TYPE_ROUTER_KEY, 0, len)
                    .compose(target)?;
                flags.compose(target)?;
                0u8.compose(target)?;
                target.write_all(ski)?;
                asn.compose(target)?;
                target.write_all(spki)
            }
            Pdu::ErrorReport { version, error_code, encapsulated_pdu, error_text } => {
                let text = error_text.as_bytes();
                let len = HEADER_LEN + 4 + encapsulated_pdu.len() as u32
                    + 4 + text.len() as u32;
                Header::new(
                    *version, Self::TYPE_ERROR_REPORT, error_code.to_u16(), len
                ).compose(target)?;
                (encapsulated_pdu.len() as u32).compose(target)?;
                target.write_all(encapsulated_pdu)?;
                (text.len() as u32).compose(target)?;
                target.write_all(text)
            }
            Pdu::Aspa { version, flags, afi_flags, customer_asn, provider_asns } => {
                let len = HEADER_LEN + 4 + 4 + 4 * provider_asns.len() as u32;
                Header::new(*version, Self::TYPE_ASPA, 0, len)
                    .compose(target)?;
                flags.compose(target)?;
                afi_flags.compose(target)?;
                0u16.compose(target)?;
                customer_asn.compose(target)?;
                for asn in provider_asns {
                    asn.compose(target)?;
                }
                Ok(())
            }
        }
    }

    /// Encodes this PDU into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec is infallible");
        buf.into()
    }

    /// Reads one PDU from `source`.
    ///
    /// Reads exactly the 8-byte header first, validates `length`, then
    /// reads and dispatches the body. Unknown PDU types and structural
    /// errors (wrong length for the declared type, non-UTF8 error text,
    /// etc.) produce [`RtrError::Malformed`].
    pub fn read<R: io::Read>(source: &mut R) -> Result<Self, RtrError> {
        let header = Header::parse(source)?;
        if header.length < HEADER_LEN {
            return Err(RtrError::Malformed(format!(
                "PDU length {} shorter than header", header.length
            )));
        }
        if header.length > MAX_PDU_LEN {
            return Err(RtrError::Malformed(format!(
                "PDU length {} exceeds maximum of {}",
                header.length, MAX_PDU_LEN
            )));
        }
        let mut body = vec![0u8; (header.length - HEADER_LEN) as usize];
        source.read_exact(&mut body)?;
        let mut body = body.as_slice();
        Self::parse_body(&header, &mut body)
    }

    fn parse_body(header: &Header, body: &mut &[u8]) -> Result<Self, RtrError> {
        let version = header.version;
        match header.pdu_type {
            Self::TYPE_SERIAL_NOTIFY => {
                Self::expect_len(header, 12)?;
                Ok(Pdu::SerialNotify {
                    version,
                    session_id: header.field2,
                    serial: Serial::parse(body)?,
                })
            }
            Self::TYPE_SERIAL_QUERY => {
                Self::expect_len(header, 12)?;
                Ok(Pdu::SerialQuery {
                    version,
                    session_id: header.field2,
                    serial: Serial::parse(body)?,
                })
            }
            Self::TYPE_RESET_QUERY => {
                Self::expect_len(header, 8)?;
                Ok(Pdu::ResetQuery { version })
            }
            Self::TYPE_CACHE_RESPONSE => {
                Self::expect_len(header, 8)?;
                Ok(Pdu::CacheResponse { version, session_id: header.field2 })
            }
            Self::TYPE_IPV4_PREFIX => {
                Self::expect_len(header, 20)?;
                let flags = u8::parse(body)?;
                let _zero = u8::parse(body)?;
                let prefix_len = u8::parse(body)?;
                let max_len = u8::parse(body)?;
                let prefix = Ipv4Addr::from(u32::parse(body)?);
                let asn = u32::parse(body)?;
                if prefix_len > max_len || max_len > 32 {
                    return Err(RtrError::Malformed(format!(
                        "invalid IPv4 prefix/max length {}/{}",
                        prefix_len, max_len
                    )));
                }
                Ok(Pdu::Ipv4Prefix {
                    version, flags, prefix_len, max_len, prefix, asn
                })
            }
            Self::TYPE_IPV6_PREFIX => {
                Self::expect_len(header, 32)?;
                let flags = u8::parse(body)?;
                let _zero = u8::parse(body)?;
                let prefix_len = u8::parse(body)?;
                let max_len = u8::parse(body)?;
                let prefix = Ipv6Addr::from(u128::parse(body)?);
                let asn = u32::parse(body)?;
                if prefix_len > max_len || max_len > 128 {
                    return Err(RtrError::Malformed(format!(
                        "invalid IPv6 prefix/max length {}/{}",
                        prefix_len, max_len
                    )));
                }
                Ok(Pdu::Ipv6Prefix {
                    version, flags, prefix_len, max_len, prefix, asn
                })
            }
            Self::TYPE_END_OF_DATA => {
                let serial = Serial::parse(body)?;
                let intervals = if version == 0 {
                    Self::expect_len(header, 12)?;
                    None
                } else {
                    Self::expect_len(header, 24)?;
                    Some(Intervals {
                        refresh: u32::parse(body)?,
                        retry: u32::parse(body)?,
                        expire: u32::parse(body)?,
                    })
                };
                Ok(Pdu::EndOfData {
                    version, session_id: header.field2, serial, intervals
                })
            }
            Self::TYPE_CACHE_RESET => {
                Self::expect_len(header, 8)?;
                Ok(Pdu::CacheReset { version })
            }
            Self::TYPE_ROUTER_KEY => {
                if header.length < HEADER_LEN + 2 + SKI_LEN as u32 + 4 {
                    return Err(RtrError::Malformed(
                        "router key PDU too short".into()
                    ));
                }
                let flags = u8::parse(body)?;
                let _zero = u8::parse(body)?;
                let mut ski = [0u8; SKI_LEN];
                io::Read::read_exact(body, &mut ski)?;
                let asn = u32::parse(body)?;
                let spki = Bytes::copy_from_slice(*body);
                Ok(Pdu::RouterKey { version, flags, ski, asn, spki })
            }
            Self::TYPE_ERROR_REPORT => {
                let error_code = ErrorCode::from_u16(header.field2);
                let pdu_len = u32::parse(body)? as usize;
                if pdu_len > body.len() {
                    return Err(RtrError::Malformed(
                        "error report encapsulated PDU length overruns body"
                            .into()
                    ));
                }
                let (pdu_bytes, rest) = body.split_at(pdu_len);
                let encapsulated_pdu = Bytes::copy_from_slice(pdu_bytes);
                *body = rest;
                let text_len = u32::parse(body)? as usize;
                if text_len != body.len() {
                    return Err(RtrError::Malformed(
                        "error report text length does not match remaining body"
                            .into()
                    ));
                }
                let error_text = String::from_utf8(body.to_vec()).map_err(|_| {
                    RtrError::Malformed("error text is not valid UTF-8".into())
                })?;
                Ok(Pdu::ErrorReport {
                    version, error_code, encapsulated_pdu, error_text
                })
            }
            Self::TYPE_ASPA => {
                if header.length < HEADER_LEN + 8 {
                    return Err(RtrError::Malformed("ASPA PDU too short".into()));
                }
                if (header.length - HEADER_LEN - 8) % 4 != 0 {
                    return Err(RtrError::Malformed(
                        "ASPA provider list is not a multiple of 4 bytes"
                            .into()
                    ));
                }
                let flags = u8::parse(body)?;
                let afi_flags = u8::parse(body)?;
                let _reserved = u16::parse(body)?;
                let customer_asn = u32::parse(body)?;
                let n = (header.length - HEADER_LEN - 8) / 4;
                let mut provider_asns = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    provider_asns.push(u32::parse(body)?);
                }
                let announce = flags & 1 == 1;
                if announce && provider_asns.is_empty() {
                    return Err(RtrError::Malformed(
                        "ASPA announce with an empty provider list".into()
                    ));
                }
                if !announce && !provider_asns.is_empty() {
                    return Err(RtrError::Malformed(
                        "ASPA withdraw with a non-empty provider list".into()
                    ));
                }
                Ok(Pdu::Aspa {
                    version, flags, afi_flags, customer_asn, provider_asns
                })
            }
            other => Err(RtrError::Malformed(format!(
                "unknown PDU type {}", other
            ))),
        }
    }

    fn expect_len(header: &Header, expected: u32) -> Result<(), RtrError> {
        if header.length != expected {
            Err(RtrError::Malformed(format!(
                "PDU type {} expects length {}, got {}",
                header.pdu_type, expected, header.length
            )))
        } else {
            Ok(())
        }
    }
}


//------------ ErrorCode --------------------------------------------------

/// The RTR `ErrorReport` error code.
///
/// The registry has more codes than we assign names to; unrecognised
/// values round-trip through [`ErrorCode::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    CorruptData,
    InternalError,
    NoDataAvailable,
    UnsupportedPduType,
    UnsupportedProtocolVersion,
    UnexpectedProtocolVersion,
    Other(u16),
}

impl ErrorCode {
    pub fn to_u16(self) -> u16 {
        match self {
            ErrorCode::CorruptData => 0,
            ErrorCode::InternalError => 1,
            ErrorCode::NoDataAvailable => 2,
            ErrorCode::UnsupportedPduType => 3,
            ErrorCode::UnsupportedProtocolVersion => 4,
            ErrorCode::UnexpectedProtocolVersion => 8,
            ErrorCode::Other(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => ErrorCode::CorruptData,
            1 => ErrorCode::InternalError,
            2 => ErrorCode::NoDataAvailable,
            3 => ErrorCode::UnsupportedPduType,
            4 => ErrorCode::UnsupportedProtocolVersion,
            8 => ErrorCode::UnexpectedProtocolVersion,
            other => ErrorCode::Other(other),
        }
    }

    /// Whether this error should be treated as fatal to the session
    /// rather than transient (see §7).
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorCode::NoDataAvailable)
    }
}


//------------ Header ------------------------------------------------------

/// The common 8-byte PDU header.
#[derive(Clone, Copy, Debug, Default)]
struct Header {
    version: u8,
    pdu_type: u8,
    /// Session ID, error code, or reserved, depending on `pdu_type`.
    field2: u16,
    length: u32,
}

impl Header {
    fn new(version: u8, pdu_type: u8, field2: u16, length: u32) -> Self {
        Header { version, pdu_type, field2, length }
    }
}

impl<W: io::Write> Compose<W> for Header {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        self.version.compose(target)?;
        self.pdu_type.compose(target)?;
        self.field2.compose(target)?;
        self.length.compose(target)
    }
}

impl<R: io::Read> Parse<R> for Header {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        Ok(Header {
            version: u8::parse(source)?,
            pdu_type: u8::parse(source)?,
            field2: u16::parse(source)?,
            length: u32::parse(source)?,
        })
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(pdu: Pdu) {
        let bytes = pdu.to_bytes();
        let mut slice = bytes.as_ref();
        let decoded = Pdu::read(&mut slice).unwrap();
        assert!(slice.is_empty());
        assert_eq!(pdu, decoded);
    }

    #[test]
    fn roundtrip_reset_query() {
        roundtrip(Pdu::ResetQuery { version: 1 });
    }

    #[test]
    fn roundtrip_serial_query() {
        roundtrip(Pdu::SerialQuery {
            version: 1, session_id: 42, serial: Serial(7),
        });
    }

    #[test]
    fn roundtrip_cache_response() {
        roundtrip(Pdu::CacheResponse { version: 2, session_id: 1000 });
    }

    #[test]
    fn roundtrip_ipv4_prefix() {
        roundtrip(Pdu::Ipv4Prefix {
            version: 1,
            flags: 1,
            prefix_len: 24,
            max_len: 32,
            prefix: Ipv4Addr::new(1, 0, 0, 0),
            asn: 4608,
        });
    }

    #[test]
    fn roundtrip_ipv6_prefix() {
        roundtrip(Pdu::Ipv6Prefix {
            version: 1,
            flags: 0,
            prefix_len: 32,
            max_len: 48,
            prefix: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0),
            asn: 1,
        });
    }

    #[test]
    fn roundtrip_end_of_data_v0() {
        roundtrip(Pdu::EndOfData {
            version: 0, session_id: 1, serial: Serial(9), intervals: None,
        });
    }

    #[test]
    fn roundtrip_end_of_data_v1() {
        roundtrip(Pdu::EndOfData {
            version: 1,
            session_id: 1,
            serial: Serial(9),
            intervals: Some(Intervals { refresh: 3600, retry: 600, expire: 7200 }),
        });
    }

    #[test]
    fn roundtrip_cache_reset() {
        roundtrip(Pdu::CacheReset { version: 1 });
    }

    #[test]
    fn roundtrip_router_key() {
        roundtrip(Pdu::RouterKey {
            version: 1,
            flags: 1,
            ski: [7u8; SKI_LEN],
            asn: 64512,
            spki: Bytes::copy_from_slice(b"fake-der-bytes"),
        });
    }

    #[test]
    fn roundtrip_error_report() {
        roundtrip(Pdu::ErrorReport {
            version: 1,
            error_code: ErrorCode::CorruptData,
            encapsulated_pdu: Bytes::copy_from_slice(&[1, 2, 3]),
            error_text: "oops".into(),
        });
    }

    #[test]
    fn roundtrip_aspa_announce() {
        roundtrip(Pdu::Aspa {
            version: 2,
            flags: 1,
            afi_flags: 3,
            customer_asn: 4708,
            provider_asns: vec![10, 20, 30],
        });
    }

    #[test]
    fn roundtrip_aspa_withdraw() {
        roundtrip(Pdu::Aspa {
            version: 2,
            flags: 0,
            afi_flags: 3,
            customer_asn: 4708,
            provider_asns: vec![],
        });
    }

    #[test]
    fn rejects_length_below_header() {
        let mut buf = Vec::new();
        Header::new(1, Pdu::TYPE_RESET_QUERY, 0, 4).compose(&mut buf).unwrap();
        let mut slice = buf.as_slice();
        assert!(Pdu::read(&mut slice).is_err());
    }

    #[test]
    fn rejects_oversized_length() {
        let mut buf = Vec::new();
        Header::new(1, Pdu::TYPE_RESET_QUERY, 0, MAX_PDU_LEN + 1)
            .compose(&mut buf).unwrap();
        let mut slice = buf.as_slice();
        assert!(Pdu::read(&mut slice).is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        let mut buf = Vec::new();
        Header::new(1, 200, 0, 8).compose(&mut buf).unwrap();
        let mut slice = buf.as_slice();
        assert!(Pdu::read(&mut slice).is_err());
    }

    #[test]
    fn rejects_aspa_announce_without_providers() {
        let mut buf = Vec::new();
        Header::new(2, Pdu::TYPE_ASPA, 0, HEADER_LEN + 8)
            .compose(&mut buf).unwrap();
        1u8.compose(&mut buf).unwrap(); // flags: announce
        0u8.compose(&mut buf).unwrap();
        0u16.compose(&mut buf).unwrap();
        4708u32.compose(&mut buf).unwrap();
        let mut slice = buf.as_slice();
        assert!(Pdu::read(&mut slice).is_err());
    }
}
