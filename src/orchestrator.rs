//! Fans the client session engine out across every configured cache (§4.5).
//!
//! The orchestrator owns one [`ClientRecord`] per configured cache and
//! drives each independently: a failure talking to one cache never blocks
//! or poisons the others, and there is no cross-record locking beyond what
//! [`refresh_all`] needs to join its worker threads.

use std::sync::atomic::AtomicBool;
use std::thread;
use crate::client::connector::Connector;
use crate::client::record::ClientRecord;
use crate::client::session::{self, RefreshOutcome};
use crate::clock::Clock;
use crate::error::RtrError;
use crate::state::State;

/// The outcome of a refresh attempt against one cache, identified by its
/// position in [`Orchestrator::records`].
pub struct RefreshResult {
    pub index: usize,
    pub server: String,
    pub outcome: Result<RefreshOutcome, RtrError>,
}

/// Owns the set of caches a client talks to and runs episodes against
/// them, independently of one another.
pub struct Orchestrator {
    records: Vec<ClientRecord>,
}

impl Orchestrator {
    /// Builds an orchestrator from a freshly initialised set of records,
    /// one per configured cache.
    pub fn init(records: Vec<ClientRecord>) -> Self {
        Orchestrator { records }
    }

    pub fn records(&self) -> &[ClientRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [ClientRecord] {
        &mut self.records
    }

    fn find(&mut self, server: &str) -> Option<&mut ClientRecord> {
        self.records.iter_mut().find(|r| r.server == server)
    }

    /// Runs a Reset episode against a single cache by name, unconditionally.
    pub fn reset<C: Connector>(
        &mut self,
        server: &str,
        connector: &C,
        clock: &dyn Clock,
        cancel: &AtomicBool,
    ) -> Result<(), RtrError> {
        let record = self.find(server).ok_or_else(|| {
            RtrError::Malformed(format!("no configured cache named {}", server))
        })?;
        session::reset(record, connector, clock, cancel)
    }

    /// Runs a timer-gated refresh against a single cache by name.
    pub fn refresh<C: Connector>(
        &mut self,
        server: &str,
        connector: &C,
        clock: &dyn Clock,
        cancel: &AtomicBool,
        force: bool,
    ) -> Result<RefreshOutcome, RtrError> {
        let record = self.find(server).ok_or_else(|| {
            RtrError::Malformed(format!("no configured cache named {}", server))
        })?;
        session::refresh(record, connector, clock, cancel, force)
    }

    /// Runs a timer-gated refresh against every configured cache,
    /// sequentially, in record order. One cache's failure does not stop
    /// the others from being attempted.
    pub fn refresh_all<C: Connector>(
        &mut self,
        connector: &C,
        clock: &dyn Clock,
        cancel: &AtomicBool,
        force: bool,
    ) -> Vec<RefreshResult> {
        let mut results = Vec::with_capacity(self.records.len());
        for (index, record) in self.records.iter_mut().enumerate() {
            let outcome = session::refresh(record, connector, clock, cancel, force);
            results.push(RefreshResult {
                index, server: record.server.clone(), outcome,
            });
        }
        results
    }

    /// The states of all caches that have completed at least one
    /// successful episode, folded into one via [`State::merge`].
    ///
    /// Returns `None` if no cache has any state yet.
    pub fn merged_state(&self) -> Result<Option<State>, RtrError> {
        let mut iter = self.records.iter().filter_map(|r| r.state.as_ref());
        let first = match iter.next() {
            Some(state) => state.clone(),
            None => return Ok(None),
        };
        iter.try_fold(first, |acc, state| acc.merge(state)).map(Some)
    }
}

/// Runs [`Orchestrator::refresh_all`] with each cache's refresh on its own
/// OS thread, for deployments with enough caches that sequential refresh
/// would make the refresh interval impractical to honour.
///
/// `C` must be shareable across threads since every worker calls
/// [`Connector::connect`] on it concurrently; [`crate::client::TcpConnector`]
/// has no per-connection state and satisfies this trivially.
pub fn refresh_all_threaded<C>(
    records: &mut [ClientRecord],
    connector: &C,
    clock: &(dyn Clock + Sync),
    cancel: &AtomicBool,
    force: bool,
) -> Vec<RefreshResult>
where
    C: Connector + Sync,
    C::Transport: Send,
{
    thread::scope(|scope| {
        let handles: Vec<_> = records.iter_mut().enumerate().map(|(index, record)| {
            let server = record.server.clone();
            scope.spawn(move || {
                let outcome = session::refresh(record, connector, clock, cancel, force);
                RefreshResult { index, server, outcome }
            })
        }).collect();
        handles.into_iter().map(|h| h.join().expect("refresh worker panicked")).collect()
    })
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::io;
    use std::io::{Read, Write};
    use std::sync::atomic::AtomicBool;
    use chrono::Utc;
    use crate::clock::FixedClock;
    use crate::pdu::Pdu;
    use crate::serial::Serial;

    /// An in-memory duplex: reads from a scripted byte string, writes into
    /// a buffer the test can inspect afterwards. A real socket is
    /// full-duplex, so a single shared cursor would let the outbound query
    /// clobber the scripted response.
    struct ScriptedTransport {
        input: io::Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<u8>) -> Self {
            ScriptedTransport { input: io::Cursor::new(script), output: Vec::new() }
        }
    }

    impl io::Read for ScriptedTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl io::Write for ScriptedTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    /// A connector whose caches always answer with an empty Reset episode
    /// for "ok" servers, and refuse to connect for "down" ones.
    struct FakeConnector;

    impl Connector for FakeConnector {
        type Transport = ScriptedTransport;

        fn connect(&self, server: &str, _port: u16) -> io::Result<Self::Transport> {
            if server == "down" {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "down"));
            }
            let mut script = Vec::new();
            Pdu::CacheResponse { version: 1, session_id: 1 }.write(&mut script).unwrap();
            Pdu::EndOfData {
                version: 1, session_id: 1, serial: Serial(1), intervals: None,
            }.write(&mut script).unwrap();
            Ok(ScriptedTransport::new(script))
        }
    }

    fn records() -> Vec<ClientRecord> {
        vec![
            ClientRecord::new("ok-a".into(), 323, vec![1]),
            ClientRecord::new("down".into(), 323, vec![1]),
            ClientRecord::new("ok-b".into(), 323, vec![1]),
        ]
    }

    #[test]
    fn refresh_all_keeps_going_after_one_cache_fails() {
        let mut orchestrator = Orchestrator::init(records());
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);

        let results = orchestrator.refresh_all(&FakeConnector, &clock, &cancel, true);

        assert_eq!(results.len(), 3);
        assert!(results[0].outcome.is_ok());
        assert!(results[1].outcome.is_err());
        assert!(results[2].outcome.is_ok());
        assert!(orchestrator.records()[1].last_failure.is_some());
    }

    #[test]
    fn merged_state_is_none_until_something_has_run() {
        let orchestrator = Orchestrator::init(records());
        assert!(orchestrator.merged_state().unwrap().is_none());
    }

    #[test]
    fn merged_state_folds_every_cache_that_has_run() {
        let mut orchestrator = Orchestrator::init(records());
        let clock = FixedClock(Utc::now());
        let cancel = AtomicBool::new(false);
        orchestrator.refresh_all(&FakeConnector, &clock, &cancel, true);

        let merged = orchestrator.merged_state().unwrap().unwrap();
        assert_eq!(merged.vrp_len(), 0);
    }
}
