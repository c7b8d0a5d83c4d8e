//! A [`Cursor`] is a reader's observation point in the event log.
use std::fmt;

/// A point in the event stream a reader has consumed through.
///
/// `position` is the canonical ordering key; `occurred_at` and
/// `transaction_id` are carried for diagnostics and are not used for
/// ordering decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    position: i64,
    occurred_at: i64,
    transaction_id: i64,
}

impl Cursor {
    /// The cursor before any event: `position = 0`.
    pub const ZERO: Cursor = Cursor {
        position: 0,
        occurred_at: 0,
        transaction_id: 0,
    };

    pub fn new(position: i64, occurred_at: i64, transaction_id: i64) -> Self {
        Self {
            position,
            occurred_at,
            transaction_id,
        }
    }

    pub fn at_position(position: i64) -> Self {
        Self {
            position,
            occurred_at: 0,
            transaction_id: 0,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn occurred_at(&self) -> i64 {
        self.occurred_at
    }

    pub fn transaction_id(&self) -> i64 {
        self.transaction_id
    }

    pub fn is_zero(&self) -> bool {
        self.position == 0
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cursor@{}", self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cursor_has_position_zero() {
        assert!(Cursor::ZERO.is_zero());
        assert_eq!(Cursor::default(), Cursor::ZERO);
    }

    #[test]
    fn cursors_order_by_position() {
        let a = Cursor::at_position(1);
        let b = Cursor::at_position(2);
        assert!(a < b);
    }
}
