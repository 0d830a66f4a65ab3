use crate::orders::{OrderStatus, PaymentStatus};

/// Service for managing order status transitions
///
/// The order status axis moves strictly forward along
/// `pending → confirmed → processing → shipped → delivered`, with two side
/// exits: `cancelled` (only before payment is captured) and `refunded`
/// (only after). The payment axis gates the exits, which is why every check
/// here takes the current payment status.
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Arguments
    /// * `from` - Current order status
    /// * `to` - Desired new status
    /// * `payment` - Current payment status, gating cancel/refund
    ///
    /// # Valid Transitions
    /// - Pending → Confirmed
    /// - Confirmed → Processing
    /// - Processing → Shipped
    /// - Shipped → Delivered
    /// - Pending/Confirmed → Cancelled, only while payment is not captured
    /// - Any chain status → Refunded, only while payment is captured
    /// - Any status → itself (idempotent no-op)
    /// - Cancelled and Refunded are terminal
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus, payment: PaymentStatus) -> bool {
        // Same status is always valid (idempotent)
        if from == to {
            return true;
        }

        match (from, to) {
            // Forward chain, one step at a time
            (OrderStatus::Pending, OrderStatus::Confirmed) => true,
            (OrderStatus::Confirmed, OrderStatus::Processing) => true,
            (OrderStatus::Processing, OrderStatus::Shipped) => true,
            (OrderStatus::Shipped, OrderStatus::Delivered) => true,

            // Cancellation is open only before money moved
            (OrderStatus::Pending | OrderStatus::Confirmed, OrderStatus::Cancelled) => {
                !payment.is_captured()
            }

            // Refund requires a captured payment, from anywhere on the chain
            (_, OrderStatus::Refunded) => {
                from.chain_position().is_some() && payment.is_captured()
            }

            // Terminal states, backward moves, and skips
            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    ///
    /// # Returns
    /// `Ok(to)` if the transition is valid, `Err(message)` otherwise
    pub fn transition(
        from: OrderStatus,
        to: OrderStatus,
        payment: PaymentStatus,
    ) -> Result<OrderStatus, String> {
        if Self::is_valid_transition(from, to, payment) {
            Ok(to)
        } else {
            Err(format!(
                "Invalid status transition from {} to {} (payment {})",
                from, to, payment
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain_steps() {
        let p = PaymentStatus::Pending;
        assert!(StatusMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            p
        ));
        assert!(StatusMachine::is_valid_transition(
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            p
        ));
        assert!(StatusMachine::is_valid_transition(
            OrderStatus::Processing,
            OrderStatus::Shipped,
            p
        ));
        assert!(StatusMachine::is_valid_transition(
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            p
        ));
    }

    #[test]
    fn test_no_skipping_forward() {
        let p = PaymentStatus::Pending;
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Processing,
            p
        ));
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Shipped,
            p
        ));
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Confirmed,
            OrderStatus::Delivered,
            p
        ));
    }

    #[test]
    fn test_no_backward_moves() {
        let p = PaymentStatus::Paid;
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Confirmed,
            OrderStatus::Pending,
            p
        ));
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Shipped,
            OrderStatus::Processing,
            p
        ));
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Delivered,
            OrderStatus::Shipped,
            p
        ));
    }

    #[test]
    fn test_cancel_only_before_payment() {
        assert!(StatusMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            PaymentStatus::Pending
        ));
        assert!(StatusMachine::is_valid_transition(
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            PaymentStatus::Failed
        ));

        // Paid orders cannot be cancelled, only refunded
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            PaymentStatus::Paid
        ));
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            PaymentStatus::Paid
        ));

        // And never from later in the chain, paid or not
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Processing,
            OrderStatus::Cancelled,
            PaymentStatus::Pending
        ));
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
            PaymentStatus::Paid
        ));
    }

    #[test]
    fn test_refund_requires_captured_payment() {
        for from in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(StatusMachine::is_valid_transition(
                from,
                OrderStatus::Refunded,
                PaymentStatus::Paid
            ));
            assert!(StatusMachine::is_valid_transition(
                from,
                OrderStatus::Refunded,
                PaymentStatus::PartiallyRefunded
            ));
            assert!(!StatusMachine::is_valid_transition(
                from,
                OrderStatus::Refunded,
                PaymentStatus::Pending
            ));
        }
    }

    #[test]
    fn test_terminal_states() {
        for to in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(!StatusMachine::is_valid_transition(
                OrderStatus::Cancelled,
                to,
                PaymentStatus::Pending
            ));
            assert!(!StatusMachine::is_valid_transition(
                OrderStatus::Refunded,
                to,
                PaymentStatus::Refunded
            ));
        }
        // A cancelled order was never paid, so it cannot become refunded
        assert!(!StatusMachine::is_valid_transition(
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
            PaymentStatus::Paid
        ));
    }

    #[test]
    fn test_transition_function() {
        let ok = StatusMachine::transition(
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            PaymentStatus::Pending,
        );
        assert_eq!(ok, Ok(OrderStatus::Confirmed));

        let err = StatusMachine::transition(
            OrderStatus::Pending,
            OrderStatus::Shipped,
            PaymentStatus::Pending,
        );
        assert!(err.unwrap_err().contains("Invalid status transition"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn order_status_strategy() -> impl Strategy<Value = OrderStatus> {
        prop_oneof![
            Just(OrderStatus::Pending),
            Just(OrderStatus::Confirmed),
            Just(OrderStatus::Processing),
            Just(OrderStatus::Shipped),
            Just(OrderStatus::Delivered),
            Just(OrderStatus::Cancelled),
            Just(OrderStatus::Refunded),
        ]
    }

    fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
        prop_oneof![
            Just(PaymentStatus::Pending),
            Just(PaymentStatus::Paid),
            Just(PaymentStatus::Failed),
            Just(PaymentStatus::Cancelled),
            Just(PaymentStatus::Refunded),
            Just(PaymentStatus::PartiallyRefunded),
        ]
    }

    /// Property: transitions never move backward along the forward chain
    #[test]
    fn prop_no_backward_transitions() {
        proptest!(|(
            from in order_status_strategy(),
            to in order_status_strategy(),
            payment in payment_status_strategy()
        )| {
            if let (Some(from_pos), Some(to_pos)) = (from.chain_position(), to.chain_position()) {
                if to_pos < from_pos {
                    prop_assert!(
                        !StatusMachine::is_valid_transition(from, to, payment),
                        "backward transition {} -> {} must be rejected",
                        from,
                        to
                    );
                }
            }
        });
    }

    /// Property: same-status transitions are always valid (idempotent)
    #[test]
    fn prop_same_status_is_valid() {
        proptest!(|(status in order_status_strategy(), payment in payment_status_strategy())| {
            prop_assert!(StatusMachine::is_valid_transition(status, status, payment));
        });
    }

    /// Property: cancellation is never valid once payment is captured
    #[test]
    fn prop_no_cancel_after_capture() {
        proptest!(|(from in order_status_strategy())| {
            if from != OrderStatus::Cancelled {
                prop_assert!(!StatusMachine::is_valid_transition(
                    from,
                    OrderStatus::Cancelled,
                    PaymentStatus::Paid
                ));
            }
        });
    }

    /// Property: refund is never valid without a captured payment
    #[test]
    fn prop_no_refund_without_capture() {
        proptest!(|(
            from in order_status_strategy(),
            payment in payment_status_strategy()
        )| {
            if from != OrderStatus::Refunded && !payment.is_captured() {
                prop_assert!(!StatusMachine::is_valid_transition(
                    from,
                    OrderStatus::Refunded,
                    payment
                ));
            }
        });
    }

    /// Property: transition() and is_valid_transition() agree
    #[test]
    fn prop_transition_consistency() {
        proptest!(|(
            from in order_status_strategy(),
            to in order_status_strategy(),
            payment in payment_status_strategy()
        )| {
            let is_valid = StatusMachine::is_valid_transition(from, to, payment);
            let result = StatusMachine::transition(from, to, payment);
            prop_assert_eq!(is_valid, result.is_ok());
        });
    }
}
