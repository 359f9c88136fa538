//! Budget ledger: pure booking enforcement.
//!
//! The ledger never writes shared state. [`attempt_booking`] returns a
//! decision; on approval the caller appends the returned itinerary entry
//! through the reducers, and the balance is re-derived from the itinerary
//! (see [`recompute_remaining`]) so that applying an update twice cannot
//! drift the ledger.

use crate::state::{BookingStatus, ItineraryItem, ItineraryKind};

/// Tolerance for floating-point budget comparisons.
pub const BUDGET_EPSILON: f64 = 1e-6;

/// Outcome of a booking attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum BookingDecision {
    /// Funds available. The entry is the item to append.
    Approved {
        /// Itinerary entry to append.
        entry: ItineraryItem,
        /// Derived balance after this booking.
        new_remaining: f64,
        /// Confirmation text for the transcript.
        message: String,
    },
    /// Funds insufficient. State must be left unchanged; the message tells
    /// the calling node to retry with a cheaper option.
    Declined {
        /// Corrective text for the transcript.
        message: String,
    },
    /// Malformed request (negative or non-finite amounts) — invalid input,
    /// not merely declined.
    Invalid {
        /// What was wrong.
        message: String,
    },
}

impl BookingDecision {
    /// Whether this decision approved the booking.
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Attempt to book `quantity` units of an item at `unit_cost` each against
/// `current_remaining`.
///
/// Pure: reads nothing but its arguments, writes nothing.
pub fn attempt_booking(
    name: &str,
    kind: ItineraryKind,
    unit_cost: f64,
    quantity: u32,
    current_remaining: f64,
) -> BookingDecision {
    if !unit_cost.is_finite() || !current_remaining.is_finite() {
        return BookingDecision::Invalid {
            message: format!("Invalid booking request for {name}: non-finite amount"),
        };
    }
    if unit_cost < 0.0 || current_remaining < 0.0 {
        return BookingDecision::Invalid {
            message: format!(
                "Invalid booking request for {name}: negative amount \
                 (unit cost {unit_cost:.2}, remaining {current_remaining:.2})"
            ),
        };
    }

    let total_cost = unit_cost * f64::from(quantity);
    if total_cost > current_remaining + BUDGET_EPSILON {
        return BookingDecision::Declined {
            message: format!(
                "Transaction declined: {name} costs ${total_cost:.2}, which exceeds \
                 the remaining budget of ${current_remaining:.2}. \
                 Please find a cheaper option."
            ),
        };
    }

    let new_remaining = current_remaining - total_cost;
    BookingDecision::Approved {
        entry: ItineraryItem {
            name: name.to_owned(),
            cost: total_cost,
            kind,
            status: BookingStatus::Confirmed,
        },
        new_remaining,
        message: format!(
            "Booked {name} for ${total_cost:.2}. Remaining budget: ${new_remaining:.2}."
        ),
    }
}

/// Derive the remaining budget from the itinerary.
///
/// This is the only way `remaining_budget` is ever computed.
pub fn recompute_remaining(total_budget: f64, itinerary: &[ItineraryItem]) -> f64 {
    total_budget - itinerary.iter().map(|item| item.cost).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn scenario_a_hotel_then_declined_flight() {
        // total_budget = 1000; hotel rate 300 x 2 nights = 600.
        let decision = attempt_booking("Grand Hotel", ItineraryKind::Hotel, 300.0, 2, 1000.0);
        let (entry, remaining) = assert_matches!(
            decision,
            BookingDecision::Approved { entry, new_remaining, .. } => (entry, new_remaining)
        );
        assert_eq!(entry.cost, 600.0);
        assert_eq!(entry.kind, ItineraryKind::Hotel);
        assert_eq!(entry.status, BookingStatus::Confirmed);
        assert_eq!(remaining, 400.0);

        // Flight at 500 against the 400 balance is declined, balance untouched.
        let decision = attempt_booking("Flight DL123", ItineraryKind::Flight, 500.0, 1, remaining);
        let message = assert_matches!(decision, BookingDecision::Declined { message } => message);
        assert!(message.contains("declined"));
        assert!(message.contains("400.00"));
    }

    #[test]
    fn exact_budget_is_approved() {
        let decision = attempt_booking("Tour", ItineraryKind::Activity, 250.0, 4, 1000.0);
        let remaining = assert_matches!(
            decision,
            BookingDecision::Approved { new_remaining, .. } => new_remaining
        );
        assert!(remaining.abs() < BUDGET_EPSILON);
    }

    #[test]
    fn negative_inputs_are_invalid_not_declined() {
        assert_matches!(
            attempt_booking("x", ItineraryKind::Visit, -1.0, 1, 100.0),
            BookingDecision::Invalid { .. }
        );
        assert_matches!(
            attempt_booking("x", ItineraryKind::Visit, 1.0, 1, -100.0),
            BookingDecision::Invalid { .. }
        );
        assert_matches!(
            attempt_booking("x", ItineraryKind::Visit, f64::NAN, 1, 100.0),
            BookingDecision::Invalid { .. }
        );
    }

    #[test]
    fn zero_quantity_books_nothing_for_free() {
        let decision = attempt_booking("x", ItineraryKind::Visit, 100.0, 0, 50.0);
        let (entry, remaining) = assert_matches!(
            decision,
            BookingDecision::Approved { entry, new_remaining, .. } => (entry, new_remaining)
        );
        assert_eq!(entry.cost, 0.0);
        assert_eq!(remaining, 50.0);
    }

    #[test]
    fn recompute_matches_sum() {
        let items = vec![
            ItineraryItem {
                name: "a".into(),
                cost: 100.0,
                kind: ItineraryKind::Hotel,
                status: BookingStatus::Confirmed,
            },
            ItineraryItem {
                name: "b".into(),
                cost: 250.5,
                kind: ItineraryKind::Flight,
                status: BookingStatus::Confirmed,
            },
        ];
        assert!((recompute_remaining(1000.0, &items) - 649.5).abs() < BUDGET_EPSILON);
        assert_eq!(recompute_remaining(1000.0, &[]), 1000.0);
    }

    proptest! {
        /// Ledger invariant: booking through the ledger, then recomputing
        /// from the accumulated itinerary, always reproduces the balance
        /// (within epsilon), and the balance never goes negative.
        #[test]
        fn invariant_total_minus_remaining_equals_spend(
            budget in 0.0f64..10_000.0,
            requests in proptest::collection::vec((0.0f64..2_000.0, 1u32..4), 0..12),
        ) {
            let mut itinerary = Vec::new();
            let mut remaining = budget;
            for (unit, qty) in requests {
                match attempt_booking("item", ItineraryKind::Activity, unit, qty, remaining) {
                    BookingDecision::Approved { entry, new_remaining, .. } => {
                        itinerary.push(entry);
                        remaining = new_remaining;
                    }
                    BookingDecision::Declined { .. } => {
                        // Decline purity: nothing changed.
                    }
                    BookingDecision::Invalid { .. } => unreachable!("inputs are valid"),
                }
            }
            prop_assert!(remaining >= -BUDGET_EPSILON);
            let recomputed = recompute_remaining(budget, &itinerary);
            prop_assert!((recomputed - remaining).abs() < 1e-3);
        }
    }
}
