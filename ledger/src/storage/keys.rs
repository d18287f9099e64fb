//! Composite key encoding for sled trees.
//!
//! All composite keys are fixed width and big-endian so that byte order is
//! numeric order.

use uuid::Uuid;

/// Width of a UUID key component.
pub const UUID_LEN: usize = 16;

/// Width of a `participants` key: user ‖ commit sequence ‖ tx id.
pub const PARTICIPANT_KEY_LEN: usize = UUID_LEN + 8 + UUID_LEN;

/// `owner ‖ other`: used for idempotency keys and per-user chat sessions.
pub fn pair_key(owner: &Uuid, other: &Uuid) -> [u8; UUID_LEN * 2] {
    let mut key = [0u8; UUID_LEN * 2];
    key[..UUID_LEN].copy_from_slice(owner.as_bytes());
    key[UUID_LEN..].copy_from_slice(other.as_bytes());
    key
}

/// `user ‖ commit sequence ‖ tx id`: one history entry for one participant.
///
/// The sequence comes from [`LedgerDb::generate_id`](super::LedgerDb::generate_id)
/// and is drawn under the wallet locks, so per user it follows commit order
/// even when two commits share a timestamp.
pub fn participant_key(user: &Uuid, seq: u64, tx_id: &Uuid) -> [u8; PARTICIPANT_KEY_LEN] {
    let mut key = [0u8; PARTICIPANT_KEY_LEN];
    key[..UUID_LEN].copy_from_slice(user.as_bytes());
    key[UUID_LEN..UUID_LEN + 8].copy_from_slice(&seq.to_be_bytes());
    key[UUID_LEN + 8..].copy_from_slice(tx_id.as_bytes());
    key
}

/// Extract the transaction id from a `participants` key.
pub fn participant_tx_id(key: &[u8]) -> Option<Uuid> {
    if key.len() != PARTICIPANT_KEY_LEN {
        return None;
    }
    Uuid::from_slice(&key[UUID_LEN + 8..]).ok()
}

/// `session ‖ seq`: one message within a chat session.
pub fn sequence_key(session: &Uuid, seq: u64) -> [u8; UUID_LEN + 8] {
    let mut key = [0u8; UUID_LEN + 8];
    key[..UUID_LEN].copy_from_slice(session.as_bytes());
    key[UUID_LEN..].copy_from_slice(&seq.to_be_bytes());
    key
}

/// Parse a 16-byte stored value back into a UUID.
pub fn uuid_from_bytes(bytes: &[u8]) -> Option<Uuid> {
    Uuid::from_slice(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_keys_sort_by_sequence_not_tx_id() {
        let user = Uuid::new_v4();
        let a = participant_key(&user, 255, &Uuid::max());
        let b = participant_key(&user, 256, &Uuid::nil());
        assert!(a < b);
    }

    #[test]
    fn participant_key_roundtrips_tx_id() {
        let tx = Uuid::new_v4();
        let key = participant_key(&Uuid::new_v4(), 7, &tx);
        assert_eq!(participant_tx_id(&key), Some(tx));
        assert_eq!(participant_tx_id(&key[1..]), None);
    }

    #[test]
    fn sequence_keys_sort_numerically() {
        let session = Uuid::new_v4();
        assert!(sequence_key(&session, 9) < sequence_key(&session, 10));
        assert!(sequence_key(&session, 255) < sequence_key(&session, 256));
    }

    #[test]
    fn pair_key_starts_with_owner() {
        let owner = Uuid::new_v4();
        let key = pair_key(&owner, &Uuid::new_v4());
        assert_eq!(&key[..UUID_LEN], owner.as_bytes());
    }
}
