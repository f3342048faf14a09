//! The client session state machine (§4.4): version negotiation, the
//! Reset/Serial episode itself, and the timer and escalation policy that
//! decides when to run one.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use bytes::Bytes;
use chrono::Duration as ChronoDuration;
use crate::changeset::Changeset;
use crate::clock::Clock;
use crate::error::RtrError;
use crate::pdu::{ErrorCode, Pdu};
use crate::serial::Serial;
use crate::state::State;
use super::connector::Connector;
use super::record::{ClientRecord, EndOfDataInfo};

/// What a completed refresh attempt actually did, for callers that want to
/// log or report on it (the orchestrator, the `refresh` CLI subcommand).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The timer policy decided nothing needed to happen yet.
    Skipped,
    /// An episode ran and the record was brought up to date.
    Ran,
}

/// Raised at a suspension point once cancellation has been requested.
fn cancelled() -> RtrError {
    RtrError::Io(io::Error::new(io::ErrorKind::Interrupted, "cancelled"))
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), RtrError> {
    if cancel.load(Ordering::Relaxed) {
        Err(cancelled())
    } else {
        Ok(())
    }
}

/// Which kind of episode is being run, and the continuity data a Serial
/// episode must check the cache's response against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EpisodeKind {
    Reset,
    Serial { session_id: u16, serial: Serial },
}

impl EpisodeKind {
    fn query(self, version: u8) -> Pdu {
        match self {
            EpisodeKind::Reset => Pdu::ResetQuery { version },
            EpisodeKind::Serial { session_id, serial } => {
                Pdu::SerialQuery { version, session_id, serial }
            }
        }
    }
}

/// The result of one attempt at one protocol version over one connection.
enum AttemptOutcome {
    /// The episode ran to completion and the record's state was updated.
    Applied,
    /// The cache doesn't support this version; retry at `.0` if possible.
    Downgrade(u8),
    /// The cache sent `CacheReset`, or the changeset conflicted with the
    /// state it's meant to extend. The caller must discard any local
    /// continuity data and retry as a fresh Reset episode.
    NeedsReset,
}

/// Performs a full Reset episode unconditionally: opens a connection,
/// negotiates a version if needed, and replaces the record's state and
/// timers with what the cache returns.
pub fn reset<C: Connector>(
    record: &mut ClientRecord,
    connector: &C,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<(), RtrError> {
    run(record, connector, clock, cancel)
}

/// Runs a refresh, subject to the timer policy in §4.4, unless `force` is
/// set, in which case it runs regardless of `refresh_interval`.
///
/// A Serial episode is attempted if the record already has state; a Reset
/// episode runs otherwise. Expiry is checked first: if the record's last
/// success is older than `expire_interval`, its state is discarded before
/// deciding which kind of episode to run, which forces a Reset.
pub fn refresh<C: Connector>(
    record: &mut ClientRecord,
    connector: &C,
    clock: &dyn Clock,
    cancel: &AtomicBool,
    force: bool,
) -> Result<RefreshOutcome, RtrError> {
    maybe_expire(record, clock);

    if !force && !due(record, clock) {
        return Ok(RefreshOutcome::Skipped);
    }

    run(record, connector, clock, cancel)?;
    Ok(RefreshOutcome::Ran)
}

/// Whether enough time has passed since the last attempt to run another
/// one: `refresh_interval` after a success, `retry_interval` after a
/// failure, or immediately if neither has ever happened.
fn due(record: &ClientRecord, clock: &dyn Clock) -> bool {
    let now = clock.now();
    if let Some(last_failure) = record.last_failure {
        if record.last_run.map_or(true, |run| last_failure > run) {
            let retry = ChronoDuration::from_std(record.retry_interval())
                .unwrap_or(ChronoDuration::zero());
            return now >= last_failure + retry;
        }
    }
    match record.last_run {
        None => true,
        Some(last_run) => {
            let refresh = ChronoDuration::from_std(record.refresh_interval())
                .unwrap_or(ChronoDuration::zero());
            now >= last_run + refresh
        }
    }
}

/// Forces a Reset on the next episode if the record has been stale for
/// longer than `expire_interval`, per the v0 fixed 3600s/7200s defaults or
/// the negotiated intervals from the last `EndOfData`.
fn maybe_expire(record: &mut ClientRecord, clock: &dyn Clock) {
    let anchor = match (record.last_run, record.last_failure) {
        (None, None) => return,
        (Some(run), None) => run,
        (None, Some(failure)) => failure,
        (Some(run), Some(failure)) => run.max(failure),
    };
    let expire = ChronoDuration::from_std(record.expire_interval())
        .unwrap_or(ChronoDuration::zero());
    if clock.now() >= anchor + expire {
        record.clear();
    }
}

/// Runs one Reset-or-Serial episode, including version negotiation and the
/// single automatic escalation to a Reset episode on `CacheReset` or a
/// `WithdrawNotFound` inconsistency. Updates `last_run`/`last_failure` on
/// the way out, regardless of outcome.
fn run<C: Connector>(
    record: &mut ClientRecord,
    connector: &C,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<(), RtrError> {
    let kind = match &record.state {
        Some(state) => EpisodeKind::Serial {
            session_id: state.session_id(),
            serial: state.serial_number(),
        },
        None => EpisodeKind::Reset,
    };
    let result = run_negotiated(record, connector, kind, clock, cancel)
        .and_then(|outcome| match outcome {
            AttemptOutcome::Applied => Ok(()),
            AttemptOutcome::NeedsReset => {
                record.clear();
                match run_negotiated(
                    record, connector, EpisodeKind::Reset, clock, cancel,
                )? {
                    AttemptOutcome::Applied => Ok(()),
                    AttemptOutcome::NeedsReset => Err(RtrError::ProtocolViolation(
                        ErrorCode::CorruptData,
                        "cache reset its own Reset episode".into(),
                    )),
                    AttemptOutcome::Downgrade(_) => unreachable!(
                        "run_negotiated resolves Downgrade internally"
                    ),
                }
            }
            AttemptOutcome::Downgrade(_) => {
                unreachable!("run_negotiated resolves Downgrade internally")
            }
        });

    match &result {
        Ok(()) => {
            record.last_failure = None;
        }
        Err(_) => {
            record.last_failure = Some(clock.now());
        }
    }
    result
}

/// Runs one episode at `record.query_version()`, retrying once at a lower
/// version if the cache asks for it, then reports the outcome as either
/// `Applied` or `NeedsReset` — `Downgrade` never escapes this function.
fn run_negotiated<C: Connector>(
    record: &mut ClientRecord,
    connector: &C,
    kind: EpisodeKind,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<AttemptOutcome, RtrError> {
    let mut version = record.query_version();
    let mut retried = false;
    loop {
        check_cancel(cancel)?;
        let mut transport = connector.connect(&record.server, record.port)?;
        match attempt(record, &mut transport, version, kind, clock, cancel)? {
            AttemptOutcome::Downgrade(peer_version) if !retried
                && record.supported_versions.contains(&peer_version) =>
            {
                retried = true;
                version = peer_version;
                continue;
            }
            AttemptOutcome::Downgrade(_) => return Err(RtrError::UnsupportedVersion),
            other => {
                record.current_version = version;
                return Ok(other);
            }
        }
    }
}

/// One query/response exchange over an already-connected transport, at a
/// single, fixed protocol version. Reports any non-`Io` failure back to
/// the peer before returning it, per §7.
fn attempt<T: io::Read + io::Write>(
    record: &mut ClientRecord,
    transport: &mut T,
    version: u8,
    kind: EpisodeKind,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<AttemptOutcome, RtrError> {
    let result = attempt_inner(record, transport, version, kind, clock, cancel);
    if let Err(ref err) = result {
        if let Some(code) = err.report_code() {
            let _ = Pdu::ErrorReport {
                version,
                error_code: code,
                encapsulated_pdu: Bytes::new(),
                error_text: err.to_string(),
            }.write(transport);
        }
    }
    result
}

fn attempt_inner<T: io::Read + io::Write>(
    record: &mut ClientRecord,
    transport: &mut T,
    version: u8,
    kind: EpisodeKind,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<AttemptOutcome, RtrError> {
    kind.query(version).write(transport)?;

    loop {
        check_cancel(cancel)?;
        let pdu = Pdu::read(transport)?;
        // A code-4 Error Report answers at the server's own (lower) max
        // version, not the version we queried at, so it's exempt from the
        // version-equality check below: that's the whole point of it.
        if let Pdu::ErrorReport { error_code: ErrorCode::UnsupportedProtocolVersion, .. } = pdu {
            return Ok(AttemptOutcome::Downgrade(pdu.version()));
        }
        if pdu.version() != version {
            return Err(RtrError::ProtocolViolation(
                ErrorCode::UnexpectedProtocolVersion,
                format!(
                    "cache replied with version {} to a version {} query",
                    pdu.version(), version,
                ),
            ));
        }
        match pdu {
            Pdu::ErrorReport { error_code: ErrorCode::NoDataAvailable, .. } => {
                return Err(RtrError::NoData);
            }
            Pdu::ErrorReport { error_code, error_text, .. } => {
                return Err(RtrError::ProtocolViolation(
                    error_code,
                    format!("cache reported an error: {}", error_text),
                ));
            }
            Pdu::CacheResponse { session_id, .. } => {
                return receive_deltas(
                    record, transport, version, session_id, kind, clock, cancel,
                );
            }
            Pdu::CacheReset { .. } if kind == EpisodeKind::Reset => {
                return Err(RtrError::ProtocolViolation(
                    ErrorCode::CorruptData,
                    "cache reset its own Reset episode".into(),
                ));
            }
            Pdu::CacheReset { .. } => return Ok(AttemptOutcome::NeedsReset),
            other => {
                return Err(RtrError::ProtocolViolation(
                    ErrorCode::CorruptData,
                    format!(
                        "unexpected PDU type {} before CacheResponse",
                        other.pdu_type(),
                    ),
                ));
            }
        }
    }
}

/// Accumulates announce/withdraw PDUs into a [`Changeset`] until
/// `EndOfData` closes the episode, then applies it atomically.
fn receive_deltas<T: io::Read + io::Write>(
    record: &mut ClientRecord,
    transport: &mut T,
    version: u8,
    session_id: u16,
    kind: EpisodeKind,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<AttemptOutcome, RtrError> {
    if let EpisodeKind::Serial { session_id: expected, .. } = kind {
        if expected != session_id {
            return Err(RtrError::ProtocolViolation(
                ErrorCode::CorruptData,
                "cache response carries a different session id".into(),
            ));
        }
    }

    let mut base = match kind {
        EpisodeKind::Reset => State::empty(session_id),
        EpisodeKind::Serial { .. } => record.state.clone().expect(
            "a Serial episode requires an existing state to extend"
        ),
    };
    let mut changeset = Changeset::new();

    loop {
        check_cancel(cancel)?;
        let pdu = Pdu::read(transport)?;
        if pdu.version() != version {
            return Err(RtrError::ProtocolViolation(
                ErrorCode::UnexpectedProtocolVersion,
                format!(
                    "cache sent version {} mid-episode, expected {}",
                    pdu.version(), version,
                ),
            ));
        }
        match pdu {
            Pdu::SerialNotify { .. } => continue,
            Pdu::CacheReset { .. } => return Ok(AttemptOutcome::NeedsReset),
            Pdu::EndOfData { session_id: eod_session, serial, intervals, .. } => {
                if eod_session != session_id {
                    return Err(RtrError::ProtocolViolation(
                        ErrorCode::CorruptData,
                        "end-of-data carries a different session id than \
                         the cache response that opened the episode".into(),
                    ));
                }
                match base.apply(&changeset) {
                    Ok(()) => {}
                    Err(RtrError::WithdrawNotFound) => return Ok(AttemptOutcome::NeedsReset),
                    Err(err) => return Err(err),
                }
                base.advance(session_id, serial);
                record.state = Some(base);
                record.eod = Some(EndOfDataInfo { serial, intervals });
                record.last_run = Some(clock.now());
                return Ok(AttemptOutcome::Applied);
            }
            pdu if changeset.can_add(&pdu) => changeset.add(pdu),
            other => {
                return Err(RtrError::ProtocolViolation(
                    ErrorCode::CorruptData,
                    format!(
                        "unexpected PDU type {} mid-episode", other.pdu_type(),
                    ),
                ));
            }
        }
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::io::{Cursor, Read, Write};
    use std::net::Ipv4Addr;
    use crate::clock::FixedClock;
    use chrono::Utc;

    /// An in-memory duplex: reads from a scripted byte string, writes into
    /// a buffer the test can inspect afterwards.
    struct ScriptedTransport {
        input: Cursor<Vec<u8>>,
        pub output: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<u8>) -> Self {
            ScriptedTransport { input: Cursor::new(script), output: Vec::new() }
        }
    }

    impl Read for ScriptedTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    /// Connects by handing out pre-scripted transports in order, one per
    /// call, so a test can script a whole version-downgrade retry.
    struct ScriptedConnector {
        scripts: RefCell<std::vec::IntoIter<Vec<u8>>>,
        transports: RefCell<Vec<Vec<u8>>>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Vec<u8>>) -> Self {
            ScriptedConnector {
                scripts: RefCell::new(scripts.into_iter()),
                transports: RefCell::new(Vec::new()),
            }
        }
    }

    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        fn connect(&self, _server: &str, _port: u16) -> io::Result<ScriptedTransport> {
            let script = self.scripts.borrow_mut().next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::Other, "no more scripted connections")
            })?;
            Ok(ScriptedTransport::new(script))
        }
    }

    fn script_of(pdus: &[Pdu]) -> Vec<u8> {
        let mut out = Vec::new();
        for pdu in pdus {
            pdu.write(&mut out).unwrap();
        }
        out
    }

    fn announce(asn: u32, octet: u8) -> Pdu {
        Pdu::Ipv4Prefix {
            version: 1, flags: 1, prefix_len: 24, max_len: 24,
            prefix: Ipv4Addr::new(octet, 0, 0, 0), asn,
        }
    }

    #[test]
    fn reset_applies_full_changeset() {
        let connector = ScriptedConnector::new(vec![script_of(&[
            Pdu::CacheResponse { version: 1, session_id: 7 },
            announce(4608, 1),
            announce(4609, 2),
            Pdu::EndOfData {
                version: 1, session_id: 7, serial: Serial(5), intervals: None,
            },
        ])]);
        let mut record = ClientRecord::new("cache".into(), 323, vec![1]);
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        reset(&mut record, &connector, &clock, &cancel).unwrap();

        let state = record.state.as_ref().unwrap();
        assert_eq!(state.session_id(), 7);
        assert_eq!(state.serial_number(), Serial(5));
        assert_eq!(state.vrp_len(), 2);
        assert!(record.last_failure.is_none());
    }

    #[test]
    fn version_downgrade_retries_once_at_servers_version() {
        let connector = ScriptedConnector::new(vec![
            script_of(&[Pdu::ErrorReport {
                version: 1,
                error_code: ErrorCode::UnsupportedProtocolVersion,
                encapsulated_pdu: Bytes::new(),
                error_text: "use version 1".into(),
            }]),
            script_of(&[
                Pdu::CacheResponse { version: 1, session_id: 3 },
                Pdu::EndOfData {
                    version: 1, session_id: 3, serial: Serial(1), intervals: None,
                },
            ]),
        ]);
        let mut record = ClientRecord::new("cache".into(), 323, vec![1, 2]);
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        reset(&mut record, &connector, &clock, &cancel).unwrap();

        assert_eq!(record.current_version, 1);
    }

    #[test]
    fn cache_reset_mid_serial_escalates_to_a_fresh_reset_episode() {
        let mut seed = State::empty(9);
        seed.apply(&{
            let mut set = Changeset::new();
            set.add(announce(1, 1));
            set
        }).unwrap();

        let connector = ScriptedConnector::new(vec![
            script_of(&[Pdu::CacheReset { version: 1 }]),
            script_of(&[
                Pdu::CacheResponse { version: 1, session_id: 9 },
                announce(2, 2),
                Pdu::EndOfData {
                    version: 1, session_id: 9, serial: Serial(2), intervals: None,
                },
            ]),
        ]);
        let mut record = ClientRecord::new("cache".into(), 323, vec![1]);
        record.state = Some(seed);
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        refresh(&mut record, &connector, &clock, &cancel, true).unwrap();

        let state = record.state.as_ref().unwrap();
        assert_eq!(state.serial_number(), Serial(2));
        assert_eq!(state.vrp_len(), 1);
    }

    #[test]
    fn refresh_is_skipped_before_the_refresh_interval_elapses() {
        let connector = ScriptedConnector::new(Vec::new());
        let mut record = ClientRecord::new("cache".into(), 323, vec![1]);
        record.last_run = Some(Utc::now());
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        let outcome = refresh(&mut record, &connector, &clock, &cancel, false).unwrap();
        assert_eq!(outcome, RefreshOutcome::Skipped);
    }

    #[test]
    fn forced_refresh_ignores_the_timer() {
        let connector = ScriptedConnector::new(vec![script_of(&[
            Pdu::CacheResponse { version: 1, session_id: 1 },
            Pdu::EndOfData {
                version: 1, session_id: 1, serial: Serial(1), intervals: None,
            },
        ])]);
        let mut record = ClientRecord::new("cache".into(), 323, vec![1]);
        record.last_run = Some(Utc::now());
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        let outcome = refresh(&mut record, &connector, &clock, &cancel, true).unwrap();
        assert_eq!(outcome, RefreshOutcome::Ran);
    }

    #[test]
    fn failed_episode_records_last_failure_and_leaves_state_untouched() {
        let connector = ScriptedConnector::new(vec![Vec::new()]);
        let mut record = ClientRecord::new("cache".into(), 323, vec![1]);
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        let err = reset(&mut record, &connector, &clock, &cancel).unwrap_err();
        assert!(matches!(err, RtrError::Io(_)));
        assert!(record.state.is_none());
        assert!(record.last_failure.is_some());
    }

    #[test]
    fn session_mismatch_on_cache_response_is_a_protocol_violation() {
        let seed = State::empty(9);
        let connector = ScriptedConnector::new(vec![script_of(&[
            Pdu::CacheResponse { version: 1, session_id: 42 },
        ])]);
        let mut record = ClientRecord::new("cache".into(), 323, vec![1]);
        record.state = Some(seed);
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        let err = refresh(&mut record, &connector, &clock, &cancel, true).unwrap_err();
        assert!(matches!(err, RtrError::ProtocolViolation(ErrorCode::CorruptData, _)));
    }
}
