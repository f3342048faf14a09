//! The authoritative, Maintainer-curated payload set a reference server
//! publishes (§4.6).
//!
//! A [`Maintainer`] is the server-side mirror of a cache: it holds the
//! current payload [`State`] plus an append-only log of the changesets
//! that produced it, each tagged with the serial number it advanced the
//! state to. [`Maintainer::publish`] is how a test harness (or, in a full
//! deployment, whatever validates ROAs and ASPAs) pushes a new changeset;
//! nothing about serving RTR connections mutates it.

use std::collections::VecDeque;
use crate::changeset::Changeset;
use crate::error::RtrError;
use crate::pdu::Pdu;
use crate::serial::Serial;
use crate::state::State;

/// One published changeset, tagged with the serial it advanced the state
/// to (i.e. the serial a client would quote back to ask for everything
/// from here forward).
#[derive(Clone)]
struct LoggedChangeset {
    serial: Serial,
    changeset: Changeset,
}

/// The authoritative payload set and change history for one cache
/// incarnation.
///
/// `session_id` is fixed for the lifetime of the `Maintainer` — a new one
/// means a new session, which forces every client to Reset.
pub struct Maintainer {
    session_id: u16,
    version: u8,
    serial: Serial,
    state: State,
    log: VecDeque<LoggedChangeset>,
    /// The serial the state was at immediately before the oldest entry
    /// still in `log`. A `SerialQuery` quoting exactly this serial can
    /// still be satisfied by replaying the whole log; anything older has
    /// aged out and needs a `CacheReset`.
    log_base: Serial,
    /// How many entries [`Maintainer::log`] keeps before the oldest ones
    /// age out and force a `CacheReset` for clients that fall too far
    /// behind.
    log_capacity: usize,
}

impl Maintainer {
    /// Creates a maintainer with no published data yet, pinned to
    /// `version` (the protocol version new changesets are assumed to use)
    /// and a session id that should be unique to this process incarnation.
    pub fn new(session_id: u16, version: u8, log_capacity: usize) -> Self {
        Maintainer {
            session_id, version,
            serial: Serial(0),
            state: State::empty(session_id),
            log_base: Serial(0),
            log: VecDeque::new(),
            log_capacity,
        }
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Applies `changeset` to the maintained state and appends it to the
    /// log under a freshly advanced serial number.
    ///
    /// Fails with [`RtrError::WithdrawNotFound`] if the changeset doesn't
    /// cleanly extend the current state (e.g. a withdraw for an entry
    /// that was never announced); the maintainer is left untouched.
    pub fn publish(&mut self, changeset: Changeset) -> Result<Serial, RtrError> {
        let mut next_state = self.state.clone();
        next_state.apply(&changeset)?;
        let next_serial = self.serial.add(1);
        next_state.advance(self.session_id, next_serial);
        self.state = next_state;
        self.serial = next_serial;
        self.log.push_back(LoggedChangeset { serial: next_serial, changeset });
        while self.log.len() > self.log_capacity {
            let evicted = self.log.pop_front().expect("just checked len() > 0");
            self.log_base = evicted.serial;
        }
        Ok(next_serial)
    }

    /// A read-only, cheaply cloneable view of the maintainer, for a
    /// connection handler to work from without holding the maintainer's
    /// lock for the life of the connection (§5).
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session_id: self.session_id,
            version: self.version,
            serial: self.serial,
            state: self.state.clone(),
            log_base: self.log_base,
            log: self.log.clone(),
        }
    }
}

/// A point-in-time, read-only copy of a [`Maintainer`]'s published data.
///
/// Cloning a `Maintainer` is cheap: `Changeset`'s PDUs carry `Bytes`
/// payloads, so copying the log only bumps reference counts.
#[derive(Clone)]
pub struct Snapshot {
    session_id: u16,
    version: u8,
    serial: Serial,
    state: State,
    log_base: Serial,
    log: VecDeque<LoggedChangeset>,
}

impl Snapshot {
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// The full set of current entries, as a changeset of announce PDUs
    /// suitable for answering a `ResetQuery`.
    ///
    /// Router Keys and ASPAs are only emitted at the protocol versions
    /// that define them (v1+ and v2 respectively); a v0 client never sees
    /// them even if the maintainer holds them.
    pub fn full_changeset(&self) -> Changeset {
        let mut changeset = Changeset::new();
        for (key, count) in self.state.vrps() {
            for _ in 0..*count {
                let pdu = match key.address {
                    std::net::IpAddr::V4(prefix) => Pdu::Ipv4Prefix {
                        version: self.version, flags: 1,
                        prefix_len: key.prefix_len, max_len: key.max_len,
                        prefix, asn: key.asn,
                    },
                    std::net::IpAddr::V6(prefix) => Pdu::Ipv6Prefix {
                        version: self.version, flags: 1,
                        prefix_len: key.prefix_len, max_len: key.max_len,
                        prefix, asn: key.asn,
                    },
                };
                changeset.add(pdu);
            }
        }
        if self.version >= 1 {
            for (id, spki) in self.state.router_keys() {
                changeset.add(Pdu::RouterKey {
                    version: self.version, flags: 1,
                    ski: id.ski, asn: id.asn, spki: spki.clone(),
                });
            }
        }
        if self.version >= 2 {
            for (customer_asn, providers) in self.state.aspas() {
                changeset.add(Pdu::Aspa {
                    version: self.version, flags: 1, afi_flags: 0,
                    customer_asn: *customer_asn,
                    provider_asns: providers.clone(),
                });
            }
        }
        changeset
    }

    /// The concatenation of every logged changeset published after
    /// `since`, in publication order, for answering a `SerialQuery`.
    ///
    /// Returns `None` if `since` is older than anything left in the log
    /// (it aged out, or was never valid), meaning the caller must send a
    /// `CacheReset` instead.
    pub fn changes_since(&self, since: Serial) -> Option<Changeset> {
        if since == self.serial {
            return Some(Changeset::new());
        }
        let skip = if since == self.log_base {
            0
        } else {
            self.log.iter().position(|entry| entry.serial == since)? + 1
        };
        let mut merged = Changeset::new();
        for entry in self.log.iter().skip(skip) {
            for pdu in entry.changeset.iter() {
                merged.add(pdu.clone());
            }
        }
        Some(merged)
    }
}


//============ Testing =======================================================
