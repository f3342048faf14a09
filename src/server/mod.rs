//! A minimal reference RTR server (§4.6).
//!
//! This exists to give the client session engine and the wire codec
//! something real to interoperate against in tests, and to double-check
//! that both sides agree on framing and state-machine behaviour. It is not
//! meant to be a production RPKI cache: there is no RRDP/rsync fetching,
//! and the payload set is whatever a [`Maintainer`] was told to publish.

pub mod maintainer;

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use log::{debug, error, info};
use crate::changeset::Changeset;
use crate::error::RtrError;
use crate::pdu::{ErrorCode, Pdu};
use crate::serial::Serial;
use crate::utils::sync::RwLock;
use maintainer::{Maintainer, Snapshot};

/// Timer parameters a reference server advertises in its `EndOfData` PDUs.
#[derive(Clone, Copy, Debug)]
pub struct Timers {
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
}

impl Default for Timers {
    fn default() -> Self {
        Timers {
            refresh: crate::pdu::V0_REFRESH,
            retry: crate::pdu::V0_RETRY,
            expire: crate::pdu::V0_EXPIRE,
        }
    }
}

/// Binds `addr` and serves RTR connections against `maintainer` until the
/// listener is dropped or accept fails.
///
/// One thread per accepted connection (§5); each thread works off a
/// [`Snapshot`] taken at accept time rather than holding the maintainer's
/// lock for the connection's lifetime.
pub fn serve(
    listener: TcpListener,
    maintainer: Arc<RwLock<Maintainer>>,
    timers: Timers,
) -> io::Result<()> {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                error!("failed to accept RTR connection: {}", err);
                continue;
            }
        };
        let snapshot = maintainer.read().snapshot();
        thread::spawn(move || {
            if let Err(err) = stream.set_nodelay(true) {
                error!("failed to set TCP_NODELAY: {}", err);
                return;
            }
            let peer = stream.peer_addr().ok();
            if let Err(err) = handle_connection(stream, &snapshot, timers) {
                debug!("RTR connection from {:?} ended: {}", peer, err);
            }
        });
    }
    Ok(())
}

/// Runs the whole of one connection: every query it sends gets exactly one
/// response episode, until it disconnects or sends something fatal.
fn handle_connection(
    mut stream: TcpStream,
    snapshot: &Snapshot,
    timers: Timers,
) -> Result<(), RtrError> {
    loop {
        let pdu = match Pdu::read(&mut stream) {
            Ok(pdu) => pdu,
            Err(RtrError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(err) => return Err(respond_error(&mut stream, err)),
        };
        let result = match pdu {
            Pdu::ResetQuery { version } => {
                reply_reset(&mut stream, snapshot, version, timers)
            }
            Pdu::SerialQuery { version, session_id, serial } => {
                reply_serial(&mut stream, snapshot, version, session_id, serial, timers)
            }
            other => Err(RtrError::ProtocolViolation(
                ErrorCode::UnsupportedPduType,
                format!("unexpected PDU type {} from client", other.pdu_type()),
            )),
        };
        if let Err(err) = result {
            return Err(respond_error(&mut stream, err));
        }
    }
}

fn respond_error(stream: &mut TcpStream, err: RtrError) -> RtrError {
    if let Some(code) = err.report_code() {
        let _ = Pdu::ErrorReport {
            version: 0,
            error_code: code,
            encapsulated_pdu: bytes::Bytes::new(),
            error_text: err.to_string(),
        }.write(stream);
    }
    err
}

fn reply_reset(
    stream: &mut TcpStream,
    snapshot: &Snapshot,
    version: u8,
    timers: Timers,
) -> Result<(), RtrError> {
    Pdu::CacheResponse { version, session_id: snapshot.session_id() }.write(stream)?;
    for pdu in snapshot.full_changeset() {
        pdu_at_version(pdu, version).write(stream)?;
    }
    end_of_data(stream, version, snapshot.session_id(), snapshot.serial(), timers)
}

fn reply_serial(
    stream: &mut TcpStream,
    snapshot: &Snapshot,
    version: u8,
    session_id: u16,
    serial: Serial,
    timers: Timers,
) -> Result<(), RtrError> {
    if session_id != snapshot.session_id() {
        return cache_reset(stream, version);
    }
    match snapshot.changes_since(serial) {
        Some(changes) => {
            Pdu::CacheResponse { version, session_id }.write(stream)?;
            for pdu in changes {
                pdu_at_version(pdu, version).write(stream)?;
            }
            end_of_data(stream, version, session_id, snapshot.serial(), timers)
        }
        None => cache_reset(stream, version),
    }
}

fn cache_reset(stream: &mut TcpStream, version: u8) -> Result<(), RtrError> {
    Pdu::CacheReset { version }.write(stream)?;
    Ok(())
}

fn end_of_data(
    stream: &mut TcpStream,
    version: u8,
    session_id: u16,
    serial: Serial,
    timers: Timers,
) -> Result<(), RtrError> {
    let intervals = if version == 0 {
        None
    } else {
        Some(crate::pdu::Intervals {
            refresh: timers.refresh, retry: timers.retry, expire: timers.expire,
        })
    };
    Pdu::EndOfData { version, session_id, serial, intervals }.write(stream)?;
    Ok(())
}

/// Re-stamps a changeset PDU read from the maintainer's log with the
/// version a particular client negotiated, in case it differs from the
/// version the maintainer was published at.
fn pdu_at_version(pdu: Pdu, version: u8) -> Pdu {
    match pdu {
        Pdu::Ipv4Prefix { flags, prefix_len, max_len, prefix, asn, .. } => {
            Pdu::Ipv4Prefix { version, flags, prefix_len, max_len, prefix, asn }
        }
        Pdu::Ipv6Prefix { flags, prefix_len, max_len, prefix, asn, .. } => {
            Pdu::Ipv6Prefix { version, flags, prefix_len, max_len, prefix, asn }
        }
        Pdu::RouterKey { flags, ski, asn, spki, .. } => {
            Pdu::RouterKey { version, flags, ski, asn, spki }
        }
        Pdu::Aspa { flags, afi_flags, customer_asn, provider_asns, .. } => {
            Pdu::Aspa { version, flags, afi_flags, customer_asn, provider_asns }
        }
        other => other,
    }
}

/// Picks a session id for a freshly started server: the low 16 bits of
/// the current Unix time, same derivation the upstream RTR reference
/// server has always used, which is fine since its only job is to change
/// across restarts.
pub fn startup_session_id(now: std::time::SystemTime) -> u16 {
    now.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u16)
        .unwrap_or(0)
}

/// Convenience for callers that just want "a maintainer and a listening
/// socket", e.g. `main` for the `serve` CLI command and integration tests
/// that need a live peer to drive a client against.
pub fn bind_and_serve(
    addr: std::net::SocketAddr,
    maintainer: Arc<RwLock<Maintainer>>,
    timers: Timers,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    info!("RTR reference server listening on {}", addr);
    serve(listener, maintainer, timers)
}


//============ Testing =======================================================
