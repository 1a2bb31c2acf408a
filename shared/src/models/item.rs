//! Item master data and quantity-unit normalization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A stock-keeping item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Unit that outbound demand for this item is expressed in.
    /// `None` means the unit was never configured; wave generation
    /// rejects such items outright.
    pub quantity_type: Option<QuantityType>,
    /// Pieces per case, when the item is handled in cases
    pub pieces_per_case: Option<i64>,
    /// Pieces per carton, when the item is handled in cartons
    pub pieces_per_carton: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unit of measure for a demanded quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityType {
    Case,
    Carton,
    Piece,
}

impl QuantityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantityType::Case => "case",
            QuantityType::Carton => "carton",
            QuantityType::Piece => "piece",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "case" => Some(QuantityType::Case),
            "carton" => Some(QuantityType::Carton),
            "piece" => Some(QuantityType::Piece),
            _ => None,
        }
    }
}

/// Failure to normalize a quantity to pieces
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitConversionError {
    #[error("quantity must be positive")]
    NonPositiveQuantity,
    #[error("item has no packaging factor for unit '{0}'")]
    MissingPackagingFactor(&'static str),
    #[error("packaging factor for unit '{0}' must be positive")]
    InvalidPackagingFactor(&'static str),
}

impl Item {
    /// Normalize a quantity in the given unit to pieces, the smallest
    /// stock unit. All ledger comparisons happen in pieces.
    pub fn to_pieces(&self, quantity: i64, unit: QuantityType) -> Result<i64, UnitConversionError> {
        if quantity <= 0 {
            return Err(UnitConversionError::NonPositiveQuantity);
        }
        let factor = match unit {
            QuantityType::Piece => 1,
            QuantityType::Case => self
                .pieces_per_case
                .ok_or(UnitConversionError::MissingPackagingFactor("case"))?,
            QuantityType::Carton => self
                .pieces_per_carton
                .ok_or(UnitConversionError::MissingPackagingFactor("carton"))?,
        };
        if factor <= 0 {
            return Err(UnitConversionError::InvalidPackagingFactor(unit.as_str()));
        }
        Ok(quantity * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(case: Option<i64>, carton: Option<i64>) -> Item {
        Item {
            id: Uuid::new_v4(),
            code: "ITM-001".to_string(),
            name: "Test item".to_string(),
            quantity_type: Some(QuantityType::Case),
            pieces_per_case: case,
            pieces_per_carton: carton,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_piece_is_identity() {
        let i = item(None, None);
        assert_eq!(i.to_pieces(7, QuantityType::Piece), Ok(7));
    }

    #[test]
    fn test_case_conversion() {
        let i = item(Some(12), None);
        assert_eq!(i.to_pieces(3, QuantityType::Case), Ok(36));
    }

    #[test]
    fn test_carton_conversion() {
        let i = item(None, Some(48));
        assert_eq!(i.to_pieces(2, QuantityType::Carton), Ok(96));
    }

    #[test]
    fn test_missing_factor_is_error() {
        let i = item(None, None);
        assert_eq!(
            i.to_pieces(1, QuantityType::Case),
            Err(UnitConversionError::MissingPackagingFactor("case"))
        );
    }

    #[test]
    fn test_non_positive_quantity_is_error() {
        let i = item(Some(12), None);
        assert_eq!(
            i.to_pieces(0, QuantityType::Piece),
            Err(UnitConversionError::NonPositiveQuantity)
        );
        assert_eq!(
            i.to_pieces(-5, QuantityType::Case),
            Err(UnitConversionError::NonPositiveQuantity)
        );
    }

    #[test]
    fn test_invalid_factor_is_error() {
        let i = item(Some(0), None);
        assert_eq!(
            i.to_pieces(1, QuantityType::Case),
            Err(UnitConversionError::InvalidPackagingFactor("case"))
        );
    }

    #[test]
    fn test_quantity_type_round_trip() {
        for qt in [QuantityType::Case, QuantityType::Carton, QuantityType::Piece] {
            assert_eq!(QuantityType::from_str(qt.as_str()), Some(qt));
        }
        assert_eq!(QuantityType::from_str("pallet"), None);
    }
}
