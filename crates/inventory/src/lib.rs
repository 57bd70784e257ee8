//! Inventory domain module.
//!
//! Stock movements and the posting rule that keeps a product's on-hand
//! quantity equal to the sum of its movements. Pure logic; the transactional
//! write lives in `stockflow-infra`.

pub mod movement;
pub mod posting;

pub use movement::{
    MAX_REFERENCE_LEN, Movement, MovementDetails, MovementReason, MovementType, NewMovement,
};
pub use posting::{OPENING_BALANCE_REFERENCE, opening_balance, plan_posting, signed_delta};
