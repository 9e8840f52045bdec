//! Order lifecycle states and the transition table that gates them.

use std::fmt::Display;
use std::str::FromStr;

/// Lifecycle state of an order.
///
/// ```text
/// pending --> paid --> shipped
///    |          |
///    v          v
/// canceled   refunded
/// ```
///
/// `shipped`, `canceled` and `refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Canceled,
    Refunded,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        }
    }

    /// Whether the table allows moving from `self` to `next`.
    /// Self-transitions are not in the table; callers that need
    /// duplicate-notification tolerance treat them as no-ops instead.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Canceled)
                | (Self::Paid, Self::Shipped)
                | (Self::Paid, Self::Refunded)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shipped | Self::Canceled | Self::Refunded)
    }

    /// States in which the order still holds reserved stock. Leaving
    /// these for `canceled` (or deleting the order) returns the
    /// reservation to inventory.
    pub(crate) const fn holds_stock(self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid order status: {0}")]
pub struct InvalidStatusError(pub String);

impl FromStr for OrderStatus {
    type Err = InvalidStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "canceled" => Ok(Self::Canceled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(InvalidStatusError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Canceled,
        OrderStatus::Refunded,
    ];

    #[test]
    fn allowed_transitions_match_table() {
        let allowed = [
            (OrderStatus::Pending, OrderStatus::Paid),
            (OrderStatus::Pending, OrderStatus::Canceled),
            (OrderStatus::Paid, OrderStatus::Shipped),
            (OrderStatus::Paid, OrderStatus::Refunded),
        ];

        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} is terminal");
            }
        }
    }

    #[test]
    fn stock_is_held_until_a_terminal_state() {
        assert!(OrderStatus::Pending.holds_stock());
        assert!(OrderStatus::Paid.holds_stock());
        assert!(!OrderStatus::Shipped.holds_stock());
        assert!(!OrderStatus::Canceled.holds_stock());
        assert!(!OrderStatus::Refunded.holds_stock());
    }

    #[test]
    fn round_trips_through_strings() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        let err = "PENDING_REVIEW".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err, InvalidStatusError("PENDING_REVIEW".to_string()));
    }
}
