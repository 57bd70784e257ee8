//! The posting rule: validate, check sufficiency, compute the new quantity.
//!
//! Callers must hold the product's serialization point (row lock or mutex)
//! from reading `current` until the returned quantity is written.

use stockflow_core::{DomainError, DomainResult, ProductId};

use crate::{MovementReason, MovementType, NewMovement};

/// Reference attached to the movement that books a product's initial stock.
pub const OPENING_BALANCE_REFERENCE: &str = "opening-balance";

/// `+quantity` for inbound, `-quantity` for outbound.
pub fn signed_delta(movement_type: MovementType, quantity: i64) -> i64 {
    match movement_type {
        MovementType::In => quantity,
        MovementType::Out => -quantity,
    }
}

/// Compute the quantity after applying `movement` to `current`.
///
/// Fails with `Validation` on bad input and `InsufficientStock` when an
/// outbound movement exceeds what is on hand. Never returns a negative value.
pub fn plan_posting(current: i64, movement: &NewMovement) -> DomainResult<i64> {
    movement.validate()?;

    if movement.movement_type == MovementType::Out && movement.quantity > current {
        return Err(DomainError::insufficient_stock(current, movement.quantity));
    }

    current
        .checked_add(signed_delta(movement.movement_type, movement.quantity))
        .ok_or_else(|| DomainError::validation("quantity out of range"))
}

/// Inbound adjustment that books a new product's starting stock.
pub fn opening_balance(product_id: ProductId, quantity: i64) -> NewMovement {
    NewMovement {
        product_id,
        quantity,
        movement_type: MovementType::In,
        reason: MovementReason::Adjustment,
        reference: Some(OPENING_BALANCE_REFERENCE.to_string()),
        notes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(quantity: i64) -> NewMovement {
        NewMovement {
            product_id: ProductId::new(),
            quantity,
            movement_type: MovementType::Out,
            reason: MovementReason::Sale,
            reference: None,
            notes: None,
        }
    }

    #[test]
    fn sale_then_oversized_sale() {
        let after = plan_posting(15, &out(5)).unwrap();
        assert_eq!(after, 10);

        let err = plan_posting(after, &out(20)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                available: 10,
                requested: 20
            }
        );
    }

    #[test]
    fn exact_drain_to_zero_is_allowed() {
        assert_eq!(plan_posting(6, &out(6)), Ok(0));
    }

    #[test]
    fn validation_runs_before_sufficiency() {
        let mut m = out(5);
        m.movement_type = MovementType::In;
        assert!(matches!(plan_posting(0, &m), Err(DomainError::Validation(_))));
    }

    #[test]
    fn overflow_is_rejected() {
        let m = opening_balance(ProductId::new(), i64::MAX);
        assert!(plan_posting(1, &m).is_err());
    }

    #[test]
    fn opening_balance_is_inbound_adjustment() {
        let m = opening_balance(ProductId::new(), 15);
        assert_eq!(m.movement_type, MovementType::In);
        assert_eq!(m.reason, MovementReason::Adjustment);
        assert_eq!(m.reference.as_deref(), Some(OPENING_BALANCE_REFERENCE));
        assert_eq!(plan_posting(0, &m), Ok(15));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_movement() -> impl Strategy<Value = (MovementType, i64)> {
            (prop_oneof![Just(MovementType::In), Just(MovementType::Out)], 1i64..50)
        }

        fn reason_for(t: MovementType) -> MovementReason {
            match t {
                MovementType::In => MovementReason::Purchase,
                MovementType::Out => MovementReason::Sale,
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: final quantity equals initial plus the signed sum of
            /// accepted movements, and no intermediate quantity is negative.
            #[test]
            fn ledger_sum_matches_quantity(
                initial in 0i64..100,
                moves in proptest::collection::vec(any_movement(), 0..64)
            ) {
                let mut qty = initial;
                let mut accepted = 0i64;
                for (t, n) in moves {
                    let m = NewMovement {
                        product_id: ProductId::new(),
                        quantity: n,
                        movement_type: t,
                        reason: reason_for(t),
                        reference: None,
                        notes: None,
                    };
                    match plan_posting(qty, &m) {
                        Ok(next) => {
                            accepted += signed_delta(t, n);
                            qty = next;
                        }
                        Err(DomainError::InsufficientStock { available, requested }) => {
                            prop_assert_eq!(available, qty);
                            prop_assert_eq!(requested, n);
                            prop_assert!(requested > available);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {e}"),
                    }
                    prop_assert!(qty >= 0);
                }
                prop_assert_eq!(qty, initial + accepted);
            }

            /// Property: a reason is accepted exactly when it belongs to the
            /// type's allowed set.
            #[test]
            fn reason_type_cross_validation(
                t in prop_oneof![Just(MovementType::In), Just(MovementType::Out)],
                reason in prop_oneof![
                    Just(MovementReason::Purchase),
                    Just(MovementReason::Return),
                    Just(MovementReason::Sale),
                    Just(MovementReason::Damaged),
                    Just(MovementReason::Adjustment),
                    Just(MovementReason::Other),
                ],
            ) {
                let m = NewMovement {
                    product_id: ProductId::new(),
                    quantity: 1,
                    movement_type: t,
                    reason,
                    reference: None,
                    notes: None,
                };
                let expected = MovementReason::allowed_for(t).contains(&reason);
                prop_assert_eq!(plan_posting(1_000, &m).is_ok(), expected);
            }
        }
    }
}
