//! Order lifecycle rules.
//!
//! ```text
//! pending ──> processing ──> shipped ──> delivered
//!    │             │
//!    └──> cancelled <┘
//! ```

use std::fmt;
use std::str::FromStr;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// States an order in this state may move to.
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Cancelled],
            OrderStatus::Shipped => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            other => Err(ServiceError::ValidationError(format!(
                "Invalid order status: {}",
                other
            ))),
        }
    }
}

/// Validates a requested status change.
pub fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Processing, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Pending, OrderStatus::Shipped, false)]
    #[case(OrderStatus::Pending, OrderStatus::Delivered, false)]
    #[case(OrderStatus::Processing, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Processing, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Processing, OrderStatus::Pending, false)]
    #[case(OrderStatus::Shipped, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Delivered, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Pending, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Cancelled, false)]
    fn transition_table(#[case] from: OrderStatus, #[case] to: OrderStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
        assert_eq!(ensure_transition(from, to).is_ok(), allowed);
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn parses_status_names() {
        assert_eq!("Shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert_eq!("canceled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = ensure_transition(OrderStatus::Delivered, OrderStatus::Cancelled).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid status transition from delivered to cancelled"
        );
    }
}
