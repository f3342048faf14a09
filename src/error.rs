//! Error types used across the crate.
//!
//! [`RtrError`] is the error type shared by the codec, the session engine
//! and the state/changeset machinery. [`ExitError`] is used at the CLI
//! boundary to pick a process exit status.

use std::{fmt, io};
use log::error;
use crate::pdu::ErrorCode;


//------------ RtrError -------------------------------------------------------

/// Something went wrong while speaking RTR to a cache or a router.
#[derive(Debug)]
pub enum RtrError {
    /// A transport-level error talking to the peer.
    Io(io::Error),

    /// The byte stream did not form a valid PDU.
    Malformed(String),

    /// A PDU arrived that violated the protocol state machine.
    ///
    /// Carries the error code that should be reported back to the peer
    /// for this particular violation, since different violations map to
    /// different codes in the registry (§7).
    ProtocolViolation(ErrorCode, String),

    /// The peer reported it has no data available (error code 2).
    ///
    /// This is transient: the caller should treat it like any other
    /// failed attempt and retry later.
    NoData,

    /// Version negotiation with the peer did not converge on a version
    /// both sides support.
    UnsupportedVersion,

    /// A withdraw referenced an entry that isn't present in the state.
    WithdrawNotFound,

    /// Merging two states found a conflicting Router Key entry.
    MergeConflict,
}

impl RtrError {
    /// The error code to report to the peer, if any.
    ///
    /// `Io` errors never produce a report: by the time we notice them the
    /// socket is probably unusable anyway.
    pub fn report_code(&self) -> Option<ErrorCode> {
        match self {
            RtrError::Io(_) => None,
            RtrError::Malformed(_) => Some(ErrorCode::CorruptData),
            RtrError::ProtocolViolation(code, _) => Some(*code),
            RtrError::NoData => None,
            // By the time negotiation has exhausted its one retry, the
            // peer has already closed on us; there's nothing to report to.
            RtrError::UnsupportedVersion => None,
            RtrError::WithdrawNotFound => None,
            RtrError::MergeConflict => None,
        }
    }
}

impl fmt::Display for RtrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RtrError::Io(err) => write!(f, "transport error: {}", err),
            RtrError::Malformed(msg) => write!(f, "malformed PDU: {}", msg),
            RtrError::ProtocolViolation(code, msg) => {
                write!(f, "protocol violation ({:?}): {}", code, msg)
            }
            RtrError::NoData => write!(f, "cache has no data available"),
            RtrError::UnsupportedVersion => {
                write!(f, "no protocol version in common with peer")
            }
            RtrError::WithdrawNotFound => {
                write!(f, "withdraw referenced an entry that isn't present")
            }
            RtrError::MergeConflict => {
                write!(f, "conflicting router key entries during merge")
            }
        }
    }
}

impl std::error::Error for RtrError { }

impl From<io::Error> for RtrError {
    fn from(err: io::Error) -> Self {
        RtrError::Io(err)
    }
}

impl From<crate::utils::binio::ParseError> for RtrError {
    fn from(err: crate::utils::binio::ParseError) -> Self {
        if err.is_eof() {
            RtrError::Io(err.into())
        } else {
            RtrError::Malformed(err.to_string())
        }
    }
}


//------------ Failed ---------------------------------------------------------

/// An operation has failed to complete.
///
/// Used for operations that have already logged diagnostic information and
/// for which the caller can't do anything but give up.
#[derive(Clone, Copy, Debug)]
pub struct Failed;

impl From<RtrError> for Failed {
    fn from(err: RtrError) -> Failed {
        error!("{}", err);
        Failed
    }
}


//------------ ExitError -------------------------------------------------------

/// An error happened that should lead to terminating the program.
#[derive(Clone, Copy, Debug)]
pub enum ExitError {
    /// Something has happened.
    ///
    /// This should be exit status 1.
    Generic,

    /// An operation against one or more clients failed.
    ///
    /// This should be exit status 2.
    OperationFailed,
}

impl From<Failed> for ExitError {
    fn from(_: Failed) -> ExitError {
        ExitError::Generic
    }
}
