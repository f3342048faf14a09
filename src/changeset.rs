//! The changeset accumulator.
//!
//! A [`Changeset`] is the ordered, type-tagged batch of announce/withdraw
//! PDUs collected over one synchronisation episode. It is applied to a
//! [`crate::state::State`] atomically, in arrival order, once an
//! `EndOfData` PDU closes the episode — never incrementally.

use crate::pdu::Pdu;


//------------ Changeset ---------------------------------------------------

/// An ordered batch of payload PDUs intended to be applied as one unit.
///
/// All PDUs in a changeset share a protocol version; [`Changeset::add`]
/// panics if asked to mix versions, since that can only happen due to a
/// bug in the caller (the session engine never forwards PDUs from more
/// than one negotiated version into the same episode).
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    version: Option<u8>,
    pdus: Vec<Pdu>,
}

impl Changeset {
    /// Creates a new, empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `pdu` is a type this changeset can accumulate.
    ///
    /// Only the four payload-bearing PDU types — IPv4/IPv6 prefixes,
    /// Router Keys and ASPAs — belong in a changeset. Every other PDU
    /// type (queries, responses, notifications, resets, errors) is
    /// protocol control flow that the session engine handles directly.
    pub fn can_add(&self, pdu: &Pdu) -> bool {
        pdu.is_payload()
    }

    /// Appends `pdu` to the end of the changeset.
    ///
    /// # Panics
    ///
    /// Panics if `pdu` is not a payload PDU (check with [`Self::can_add`]
    /// first), or if it carries a different protocol version than PDUs
    /// already in the changeset.
    pub fn add(&mut self, pdu: Pdu) {
        assert!(self.can_add(&pdu), "changeset only accepts payload PDUs");
        match self.version {
            None => self.version = Some(pdu.version()),
            Some(v) => assert_eq!(
                v, pdu.version(),
                "changeset cannot mix protocol versions"
            ),
        }
        self.pdus.push(pdu);
    }

    /// Iterates over the accumulated PDUs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Pdu> {
        self.pdus.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.pdus.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pdus.len()
    }
}

impl IntoIterator for Changeset {
    type Item = Pdu;
    type IntoIter = std::vec::IntoIter<Pdu>;

    fn into_iter(self) -> Self::IntoIter {
        self.pdus.into_iter()
    }
}


//============ Testing =======================================================
