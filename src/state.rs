//! The authoritative per-cache payload set.
//!
//! A [`State`] holds the three mappings a cache publishes — VRPs, Router
//! Keys and ASPAs — plus the session ID and serial number cursor that
//! anchor it to a particular cache incarnation. The only way to mutate a
//! `State` is [`State::apply`], which applies a [`Changeset`] atomically;
//! there is no public way to poke at individual entries.

use std::collections::BTreeMap;
use std::net::IpAddr;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use crate::changeset::Changeset;
use crate::error::RtrError;
use crate::pdu::Pdu;
use crate::serial::Serial;

//------------ VrpKey --------------------------------------------------------

/// The key identifying one VRP entry: `asn -> address -> prefix_length ->
/// max_length`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize
)]
pub struct VrpKey {
    pub asn: u32,
    pub address: IpAddr,
    pub prefix_len: u8,
    pub max_len: u8,
}

/// A Router Key entry's identity: `(asn, subject_key_identifier)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize
)]
pub struct RouterKeyId {
    pub asn: u32,
    pub ski: [u8; crate::pdu::SKI_LEN],
}


//------------ State ---------------------------------------------------------

/// The merged, authoritative payload set for one cache (or the union of
/// several, after [`State::merge`]).
///
/// Counts on VRP entries track duplicates tolerated during merge (RFC
/// 8210 allows the same VRP to legitimately appear more than once across
/// caches); they are never meaningful on their own, only relative to
/// zero.
#[derive(Clone, Debug, Default)]
pub struct State {
    session_id: u16,
    serial_number: Serial,
    vrps: BTreeMap<VrpKey, u32>,
    router_keys: BTreeMap<RouterKeyId, Bytes>,
    aspas: BTreeMap<u32, Vec<u32>>,
}

impl State {
    /// Creates a fresh, empty state for a newly learned session.
    pub fn empty(session_id: u16) -> Self {
        State { session_id, ..Default::default() }
    }

    /// Reconstructs a state from its three mappings plus cursor.
    ///
    /// Used by [`crate::persist`] to rebuild a `State` from its
    /// serialised snapshot form, since `BTreeMap`s with non-string keys
    /// don't round-trip through `serde_json` directly.
    pub fn from_parts(
        session_id: u16,
        serial_number: Serial,
        vrps: impl IntoIterator<Item = (VrpKey, u32)>,
        router_keys: impl IntoIterator<Item = (RouterKeyId, Bytes)>,
        aspas: impl IntoIterator<Item = (u32, Vec<u32>)>,
    ) -> Self {
        State {
            session_id,
            serial_number,
            vrps: vrps.into_iter().collect(),
            router_keys: router_keys.into_iter().collect(),
            aspas: aspas.into_iter().collect(),
        }
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn serial_number(&self) -> Serial {
        self.serial_number
    }

    pub fn vrp_count(&self, key: &VrpKey) -> u32 {
        self.vrps.get(key).copied().unwrap_or(0)
    }

    pub fn vrps(&self) -> impl Iterator<Item = (&VrpKey, &u32)> {
        self.vrps.iter()
    }

    pub fn router_keys(&self) -> impl Iterator<Item = (&RouterKeyId, &Bytes)> {
        self.router_keys.iter()
    }

    pub fn aspas(&self) -> impl Iterator<Item = (&u32, &Vec<u32>)> {
        self.aspas.iter()
    }

    pub fn vrp_len(&self) -> usize {
        self.vrps.len()
    }

    pub fn router_key_len(&self) -> usize {
        self.router_keys.len()
    }

    pub fn aspa_len(&self) -> usize {
        self.aspas.len()
    }

    /// Applies `changeset` to this state, in arrival order, as one
    /// atomic step.
    ///
    /// On any error (a withdraw referencing an entry that isn't there),
    /// the state is left completely untouched: we validate into a clone
    /// first and only swap it in if every PDU in the changeset applied
    /// cleanly. This is what makes partial changesets unobservable (§5).
    pub fn apply(&mut self, changeset: &Changeset) -> Result<(), RtrError> {
        let mut next = self.clone();
        for pdu in changeset.iter() {
            next.apply_one(pdu)?;
        }
        *self = next;
        Ok(())
    }

    fn apply_one(&mut self, pdu: &Pdu) -> Result<(), RtrError> {
        match pdu {
            Pdu::Ipv4Prefix { flags, prefix_len, max_len, prefix, asn, .. } => {
                self.apply_vrp(
                    *flags & 1 == 1,
                    VrpKey {
                        asn: *asn,
                        address: IpAddr::V4(*prefix),
                        prefix_len: *prefix_len,
                        max_len: *max_len,
                    },
                )
            }
            Pdu::Ipv6Prefix { flags, prefix_len, max_len, prefix, asn, .. } => {
                self.apply_vrp(
                    *flags & 1 == 1,
                    VrpKey {
                        asn: *asn,
                        address: IpAddr::V6(*prefix),
                        prefix_len: *prefix_len,
                        max_len: *max_len,
                    },
                )
            }
            Pdu::RouterKey { flags, ski, asn, spki, .. } => {
                let id = RouterKeyId { asn: *asn, ski: *ski };
                if *flags & 1 == 1 {
                    self.router_keys.insert(id, spki.clone());
                    Ok(())
                } else if self.router_keys.remove(&id).is_some() {
                    Ok(())
                } else {
                    Err(RtrError::WithdrawNotFound)
                }
            }
            Pdu::Aspa { flags, customer_asn, provider_asns, .. } => {
                if *flags & 1 == 1 {
                    self.aspas.insert(*customer_asn, provider_asns.clone());
                    Ok(())
                } else if self.aspas.remove(customer_asn).is_some() {
                    Ok(())
                } else {
                    Err(RtrError::WithdrawNotFound)
                }
            }
            other => panic!(
                "changeset contained a non-payload PDU: {:?}", other
            ),
        }
    }

    fn apply_vrp(&mut self, announce: bool, key: VrpKey) -> Result<(), RtrError> {
        if announce {
            *self.vrps.entry(key).or_insert(0) += 1;
            Ok(())
        } else {
            match self.vrps.get_mut(&key) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    Ok(())
                }
                Some(_) => {
                    self.vrps.remove(&key);
                    Ok(())
                }
                None => Err(RtrError::WithdrawNotFound),
            }
        }
    }

    /// Sets the serial number and session ID after a successful
    /// `EndOfData`. Only the session engine calls this, right after a
    /// successful [`State::apply`].
    pub fn advance(&mut self, session_id: u16, serial_number: Serial) {
        self.session_id = session_id;
        self.serial_number = serial_number;
    }

    /// Produces a new state holding the union of `self` and `other`.
    ///
    /// VRPs and ASPAs merge commutatively and associatively (§8,
    /// invariants 3–4); Router Keys merge the same way unless the two
    /// inputs disagree on the SPKI for the same `(asn, ski)`, which is a
    /// [`RtrError::MergeConflict`].
    ///
    /// The merged state's `session_id`/`serial_number` are meaningless —
    /// a merge spans independent caches — and are left at their default.
    pub fn merge(&self, other: &State) -> Result<State, RtrError> {
        let mut vrps = self.vrps.clone();
        for (key, count) in &other.vrps {
            *vrps.entry(*key).or_insert(0) += count;
        }

        let mut router_keys = self.router_keys.clone();
        for (id, spki) in &other.router_keys {
            match router_keys.get(id) {
                Some(existing) if existing != spki => {
                    return Err(RtrError::MergeConflict);
                }
                _ => {
                    router_keys.insert(*id, spki.clone());
                }
            }
        }

        let mut aspas: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for customer_asn in self.aspas.keys().chain(other.aspas.keys()) {
            aspas.entry(*customer_asn).or_insert_with(|| {
                let mut providers: Vec<u32> = self.aspas.get(customer_asn)
                    .into_iter().flatten().copied()
                    .chain(
                        other.aspas.get(customer_asn)
                            .into_iter().flatten().copied()
                    )
                    .collect();
                providers.sort_unstable();
                providers.dedup();
                providers
            });
        }

        Ok(State { session_id: 0, serial_number: Serial(0), vrps, router_keys, aspas })
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    fn announce_v4(asn: u32, a: u8, b: u8, c: u8, d: u8, len: u8, max: u8) -> Pdu {
        Pdu::Ipv4Prefix {
            version: 2, flags: 1, prefix_len: len, max_len: max,
            prefix: Ipv4Addr::new(a, b, c, d), asn,
        }
    }

    fn withdraw_v4(asn: u32, a: u8, b: u8, c: u8, d: u8, len: u8, max: u8) -> Pdu {
        Pdu::Ipv4Prefix {
            version: 2, flags: 0, prefix_len: len, max_len: max,
            prefix: Ipv4Addr::new(a, b, c, d), asn,
        }
    }

    // S1: Reset v2, one prefix.
    #[test]
    fn s1_reset_single_prefix() {
        let mut state = State::empty(1);
        let mut set = Changeset::new();
        set.add(announce_v4(4608, 1, 0, 0, 0, 24, 32));
        state.apply(&set).unwrap();

        let key = VrpKey {
            asn: 4608, address: IpAddr::V4(Ipv4Addr::new(1, 0, 0, 0)),
            prefix_len: 24, max_len: 32,
        };
        assert_eq!(state.vrp_count(&key), 1);
        assert_eq!(state.vrp_len(), 1);
    }

    // S2: Reset v2, ASPAs.
    #[test]
    fn s2_reset_aspas() {
        let mut state = State::empty(1);
        let mut set = Changeset::new();
        set.add(Pdu::Aspa {
            version: 2, flags: 1, afi_flags: 3,
            customer_asn: 4708, provider_asns: vec![10, 20, 30],
        });
        set.add(Pdu::Aspa {
            version: 2, flags: 1, afi_flags: 3,
            customer_asn: 5000, provider_asns: vec![11, 22, 33],
        });
        state.apply(&set).unwrap();

        assert_eq!(state.aspa_len(), 2);
        let providers: Vec<_> = state.aspas().map(|(k, v)| (*k, v.clone())).collect();
        assert!(providers.contains(&(4708, vec![10, 20, 30])));
        assert!(providers.contains(&(5000, vec![11, 22, 33])));
    }

    #[test]
    fn withdraw_then_reannounce_in_one_changeset() {
        let mut state = State::empty(1);
        let mut set = Changeset::new();
        set.add(announce_v4(4608, 1, 0, 0, 0, 24, 32));
        state.apply(&set).unwrap();

        let mut set2 = Changeset::new();
        set2.add(withdraw_v4(4608, 1, 0, 0, 0, 24, 32));
        set2.add(announce_v4(4608, 1, 0, 0, 0, 24, 32));
        state.apply(&set2).unwrap();

        let key = VrpKey {
            asn: 4608, address: IpAddr::V4(Ipv4Addr::new(1, 0, 0, 0)),
            prefix_len: 24, max_len: 32,
        };
        assert_eq!(state.vrp_count(&key), 1);
    }

    #[test]
    fn withdraw_without_matching_announce_fails_and_leaves_state_untouched() {
        let mut state = State::empty(1);
        let mut set = Changeset::new();
        set.add(announce_v4(4608, 1, 0, 0, 0, 24, 32));
        state.apply(&set).unwrap();

        let mut bad = Changeset::new();
        bad.add(announce_v4(9999, 2, 0, 0, 0, 24, 32));
        bad.add(withdraw_v4(1, 3, 0, 0, 0, 24, 32)); // never announced
        let result = state.apply(&bad);
        assert!(result.is_err());
        // The successful first announce in `bad` must not be observable.
        assert_eq!(state.vrp_len(), 1);
    }

    #[test]
    fn router_key_withdraw_requires_presence() {
        let mut state = State::empty(1);
        let mut set = Changeset::new();
        set.add(Pdu::RouterKey {
            version: 1, flags: 0, ski: [1u8; crate::pdu::SKI_LEN],
            asn: 64512, spki: Bytes::new(),
        });
        assert!(state.apply(&set).is_err());
    }

    // S3: two-cache merge of VRPs.
    #[test]
    fn s3_merge_vrps() {
        let mut a = State::empty(1);
        let mut set_a = Changeset::new();
        set_a.add(announce_v4(4608, 1, 0, 0, 0, 24, 32));
        a.apply(&set_a).unwrap();

        let mut b = State::empty(2);
        let mut set_b = Changeset::new();
        set_b.add(announce_v4(2000, 10, 0, 0, 0, 24, 32));
        b.apply(&set_b).unwrap();

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.vrp_len(), 2);
        assert_eq!(merged.vrp_count(&VrpKey {
            asn: 4608, address: IpAddr::V4(Ipv4Addr::new(1, 0, 0, 0)),
            prefix_len: 24, max_len: 32,
        }), 1);
        assert_eq!(merged.vrp_count(&VrpKey {
            asn: 2000, address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)),
            prefix_len: 24, max_len: 32,
        }), 1);
    }

    // S4: two-cache merge of ASPAs.
    #[test]
    fn s4_merge_aspas() {
        let mut a = State::empty(1);
        let mut set_a = Changeset::new();
        set_a.add(Pdu::Aspa {
            version: 2, flags: 1, afi_flags: 0,
            customer_asn: 4708, provider_asns: vec![10, 20, 30],
        });
        a.apply(&set_a).unwrap();

        let mut b = State::empty(2);
        let mut set_b = Changeset::new();
        set_b.add(Pdu::Aspa {
            version: 2, flags: 1, afi_flags: 0,
            customer_asn: 4708, provider_asns: vec![30, 40, 50, 60],
        });
        b.apply(&set_b).unwrap();

        let merged = a.merge(&b).unwrap();
        let providers = merged.aspas().find(|(k, _)| **k == 4708).unwrap().1;
        assert_eq!(providers, &vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = State::empty(1);
        let mut set_a = Changeset::new();
        set_a.add(announce_v4(4608, 1, 0, 0, 0, 24, 32));
        a.apply(&set_a).unwrap();

        let mut b = State::empty(2);
        let mut set_b = Changeset::new();
        set_b.add(announce_v4(2000, 10, 0, 0, 0, 24, 32));
        b.apply(&set_b).unwrap();

        let ab = a.merge(&b).unwrap();
        let ba = b.merge(&a).unwrap();
        assert_eq!(ab.vrps.len(), ba.vrps.len());
        for (key, count) in ab.vrps() {
            assert_eq!(ba.vrp_count(key), *count);
        }
    }

    #[test]
    fn merge_conflict_on_router_key() {
        let mut a = State::empty(1);
        let mut set_a = Changeset::new();
        set_a.add(Pdu::RouterKey {
            version: 1, flags: 1, ski: [1u8; crate::pdu::SKI_LEN],
            asn: 64512, spki: Bytes::copy_from_slice(b"one"),
        });
        a.apply(&set_a).unwrap();

        let mut b = State::empty(2);
        let mut set_b = Changeset::new();
        set_b.add(Pdu::RouterKey {
            version: 1, flags: 1, ski: [1u8; crate::pdu::SKI_LEN],
            asn: 64512, spki: Bytes::copy_from_slice(b"two"),
        });
        b.apply(&set_b).unwrap();

        assert!(a.merge(&b).is_err());
    }
}
