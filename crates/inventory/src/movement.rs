use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, MovementId, ProductId, UserId};

/// Width of the `reference` column.
pub const MAX_REFERENCE_LEN: usize = 255;

/// Direction of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            other => Err(DomainError::validation(format!(
                "type must be one of: in, out (got '{other}')"
            ))),
        }
    }
}

/// Why stock moved. Each reason is valid for one or both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementReason {
    Purchase,
    Return,
    Sale,
    Damaged,
    Adjustment,
    Other,
}

impl MovementReason {
    pub const INBOUND: [MovementReason; 4] = [
        MovementReason::Purchase,
        MovementReason::Return,
        MovementReason::Adjustment,
        MovementReason::Other,
    ];

    pub const OUTBOUND: [MovementReason; 4] = [
        MovementReason::Sale,
        MovementReason::Damaged,
        MovementReason::Adjustment,
        MovementReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "purchase",
            MovementReason::Return => "return",
            MovementReason::Sale => "sale",
            MovementReason::Damaged => "damaged",
            MovementReason::Adjustment => "adjustment",
            MovementReason::Other => "other",
        }
    }

    pub fn allowed_for(movement_type: MovementType) -> &'static [MovementReason] {
        match movement_type {
            MovementType::In => &Self::INBOUND,
            MovementType::Out => &Self::OUTBOUND,
        }
    }

    pub fn valid_for(&self, movement_type: MovementType) -> bool {
        Self::allowed_for(movement_type).contains(self)
    }
}

impl core::fmt::Display for MovementReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(MovementReason::Purchase),
            "return" => Ok(MovementReason::Return),
            "sale" => Ok(MovementReason::Sale),
            "damaged" => Ok(MovementReason::Damaged),
            "adjustment" => Ok(MovementReason::Adjustment),
            "other" => Ok(MovementReason::Other),
            other => Err(DomainError::validation(format!("unknown reason '{other}'"))),
        }
    }
}

/// A movement request, before it has been posted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub reason: MovementReason,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewMovement {
    /// Preconditions checked before any write.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be a positive integer"));
        }
        if !self.reason.valid_for(self.movement_type) {
            let allowed: Vec<&str> = MovementReason::allowed_for(self.movement_type)
                .iter()
                .map(MovementReason::as_str)
                .collect();
            return Err(DomainError::validation(format!(
                "reason '{}' is not valid for type '{}' (allowed: {})",
                self.reason,
                self.movement_type,
                allowed.join(", ")
            )));
        }
        if let Some(reference) = &self.reference {
            if reference.chars().count() > MAX_REFERENCE_LEN {
                return Err(DomainError::validation(format!(
                    "reference must be at most {MAX_REFERENCE_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    /// Materialize the ledger entry once the write is committed.
    pub fn into_movement(
        self,
        id: MovementId,
        performed_by: UserId,
        performed_at: DateTime<Utc>,
    ) -> Movement {
        Movement {
            id,
            product_id: self.product_id,
            quantity: self.quantity,
            movement_type: self.movement_type,
            reason: self.reason,
            reference: self.reference,
            notes: self.notes,
            performed_by,
            performed_at,
        }
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub product_id: ProductId,
    /// Magnitude only; direction is `movement_type`.
    pub quantity: i64,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub reason: MovementReason,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub performed_by: UserId,
    pub performed_at: DateTime<Utc>,
}

/// A movement joined with display names for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementDetails {
    #[serde(flatten)]
    pub movement: Movement,
    pub product_name: String,
    pub product_sku: String,
    pub performed_by_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(movement_type: MovementType, reason: MovementReason, quantity: i64) -> NewMovement {
        NewMovement {
            product_id: ProductId::new(),
            quantity,
            movement_type,
            reason,
            reference: None,
            notes: None,
        }
    }

    #[test]
    fn sale_is_outbound_only() {
        let err = movement(MovementType::In, MovementReason::Sale, 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("sale")));
        assert!(movement(MovementType::Out, MovementReason::Sale, 1).validate().is_ok());
    }

    #[test]
    fn purchase_and_return_are_inbound_only() {
        for reason in [MovementReason::Purchase, MovementReason::Return] {
            assert!(movement(MovementType::In, reason, 1).validate().is_ok());
            assert!(movement(MovementType::Out, reason, 1).validate().is_err());
        }
    }

    #[test]
    fn adjustment_and_other_go_both_ways() {
        for reason in [MovementReason::Adjustment, MovementReason::Other] {
            assert!(reason.valid_for(MovementType::In));
            assert!(reason.valid_for(MovementType::Out));
        }
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(movement(MovementType::In, MovementReason::Purchase, 0).validate().is_err());
        assert!(movement(MovementType::In, MovementReason::Purchase, -3).validate().is_err());
    }

    #[test]
    fn reference_is_bounded_by_column_width() {
        let mut m = movement(MovementType::In, MovementReason::Purchase, 1);
        m.reference = Some("r".repeat(MAX_REFERENCE_LEN));
        assert!(m.validate().is_ok());

        m.reference = Some("r".repeat(MAX_REFERENCE_LEN + 1));
        assert!(matches!(m.validate(), Err(DomainError::Validation(msg)) if msg.contains("reference")));
    }

    #[test]
    fn wire_names_are_lowercase_and_type_is_renamed() {
        let body = format!(
            r#"{{"product_id":"{}","quantity":5,"type":"out","reason":"damaged"}}"#,
            ProductId::new()
        );
        let m: NewMovement = serde_json::from_str(&body).unwrap();
        assert_eq!(m.movement_type, MovementType::Out);
        assert_eq!(m.reason, MovementReason::Damaged);
        assert_eq!(m.reference, None);
    }

    #[test]
    fn unknown_type_does_not_parse() {
        assert!("sideways".parse::<MovementType>().is_err());
        assert!("theft".parse::<MovementReason>().is_err());
        assert_eq!("return".parse::<MovementReason>().unwrap(), MovementReason::Return);
    }
}
