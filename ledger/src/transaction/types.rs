//! Transaction records and their direction relative to a participant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::identity::UserId;
use crate::transfer::IdempotencyKey;
use crate::vault::{Amount, WalletNumber};

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which side of a transfer a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money coming in: the user is the receiver.
    Incoming,
    /// Money going out: the user is the sender.
    Outgoing,
}

impl Direction {
    /// Value stored in the `participants` index.
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            Direction::Outgoing => 0,
            Direction::Incoming => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Direction::Outgoing),
            1 => Some(Direction::Incoming),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incoming" => Ok(Direction::Incoming),
            "outgoing" => Ok(Direction::Outgoing),
            other => Err(LedgerError::Validation(format!(
                "unknown transaction direction '{other}', expected 'incoming' or 'outgoing'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// One completed transfer. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub sender: UserId,
    pub receiver: UserId,

    /// Always greater than zero.
    pub amount: Amount,

    /// Receiver's display name at commit time.
    pub receiver_name: String,

    /// Receiver's wallet number at commit time.
    pub receiver_account_number: WalletNumber,

    pub description: Option<String>,
    pub created_at: DateTime<Utc>,

    /// Client key the transfer was committed under, if any.
    pub idempotency_key: Option<IdempotencyKey>,
}

impl Transaction {
    /// Where `user` stands in this transaction, or `None` if they are not
    /// a party to it.
    pub fn direction_for(&self, user: UserId) -> Option<Direction> {
        if self.sender == user {
            Some(Direction::Outgoing)
        } else if self.receiver == user {
            Some(Direction::Incoming)
        } else {
            None
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.direction_for(user).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sender: UserId, receiver: UserId) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            sender,
            receiver,
            amount: Amount::from_minor(3_000),
            receiver_name: "Ama Mensah".into(),
            receiver_account_number: WalletNumber::parse("000042").unwrap(),
            description: None,
            created_at: Utc::now(),
            idempotency_key: None,
        }
    }

    #[test]
    fn direction_depends_on_viewer() {
        let (a, b) = (UserId::new(), UserId::new());
        let tx = sample(a, b);
        assert_eq!(tx.direction_for(a), Some(Direction::Outgoing));
        assert_eq!(tx.direction_for(b), Some(Direction::Incoming));
        assert_eq!(tx.direction_for(UserId::new()), None);
    }

    #[test]
    fn direction_parses_query_values() {
        assert_eq!("incoming".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("Outgoing".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn direction_bytes_are_stable() {
        for d in [Direction::Incoming, Direction::Outgoing] {
            assert_eq!(Direction::from_byte(d.as_byte()), Some(d));
        }
        assert_eq!(Direction::from_byte(9), None);
    }

    #[test]
    fn bincode_preserves_record() {
        let tx = sample(UserId::new(), UserId::new());
        let bytes = bincode::serialize(&tx).unwrap();
        let back: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, tx);
    }
}
