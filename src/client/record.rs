//! Per-cache client state, persisted across invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::pdu::Intervals;
use crate::serial::Serial;
use crate::state::State;

/// Everything the session engine needs to remember about one cache
/// between runs: how to reach it, which protocol version it last spoke,
/// its accumulated payload set, and the timestamps the timer policy
/// gates on.
///
/// This is [`crate::persist`]'s unit of persistence: one file per
/// `ClientRecord`.
#[derive(Clone, Debug)]
pub struct ClientRecord {
    pub server: String,
    pub port: u16,
    pub supported_versions: Vec<u8>,
    pub current_version: u8,
    pub state: Option<State>,
    pub eod: Option<EndOfDataInfo>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl ClientRecord {
    /// Creates a freshly initialised record: no state, no history, at
    /// the client's highest supported version.
    ///
    /// # Panics
    ///
    /// Panics if `supported_versions` is empty.
    pub fn new(server: String, port: u16, supported_versions: Vec<u8>) -> Self {
        let current_version = *supported_versions.iter().max()
            .expect("a client record needs at least one supported version");
        ClientRecord {
            server, port, supported_versions, current_version,
            state: None, eod: None, last_run: None, last_failure: None,
        }
    }

    /// The version to open the next episode at: the client's maximum
    /// supported version unless a previous episode already negotiated
    /// something lower.
    pub fn query_version(&self) -> u8 {
        self.current_version
    }

    /// `expire_interval` in force for this record: the negotiated
    /// value from the last `EndOfData`, or the fixed version-0 default
    /// if we've never gotten that far or we're pinned at v0.
    pub fn expire_interval(&self) -> std::time::Duration {
        let secs = self.eod.as_ref()
            .and_then(|eod| eod.intervals)
            .map(|iv| iv.expire)
            .unwrap_or(crate::pdu::V0_EXPIRE);
        std::time::Duration::from_secs(secs as u64)
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        let secs = self.eod.as_ref()
            .and_then(|eod| eod.intervals)
            .map(|iv| iv.refresh)
            .unwrap_or(crate::pdu::V0_REFRESH);
        std::time::Duration::from_secs(secs as u64)
    }

    pub fn retry_interval(&self) -> std::time::Duration {
        let secs = self.eod.as_ref()
            .and_then(|eod| eod.intervals)
            .map(|iv| iv.retry)
            .unwrap_or(crate::pdu::V0_RETRY);
        std::time::Duration::from_secs(secs as u64)
    }

    /// Discards all cached payload state, forcing the next refresh to
    /// run a full Reset episode.
    ///
    /// Used both for the mid-stream `CacheReset` escalation (§4.4) and
    /// for expiry (§4.4 timer policy).
    pub fn clear(&mut self) {
        self.state = None;
        self.eod = None;
        self.last_run = None;
        self.last_failure = None;
    }
}

/// The content of the last successful `EndOfData` PDU, independent of
/// the session ID carried in its header (that lives on [`State`]).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EndOfDataInfo {
    pub serial: Serial,
    pub intervals: Option<Intervals>,
}
