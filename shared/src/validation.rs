//! Validation utilities for the Warehouse Management Platform

/// Validate a piece/unit quantity is strictly positive
pub fn validate_positive_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a picked quantity (zero is a legal "nothing picked" report)
pub fn validate_picked_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Picked quantity cannot be negative");
    }
    Ok(())
}

/// Validate warehouse code format (2-8 uppercase alphanumeric).
/// Warehouse codes are embedded into wave codes, so they must be short
/// and unambiguous.
pub fn validate_warehouse_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Warehouse code must be at least 2 characters");
    }
    if code.len() > 8 {
        return Err("Warehouse code must be at most 8 characters");
    }
    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err("Warehouse code must be uppercase alphanumeric only");
    }
    Ok(())
}

/// Validate delivery route code format (2-6 uppercase alphanumeric)
pub fn validate_route_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Route code must be at least 2 characters");
    }
    if code.len() > 6 {
        return Err("Route code must be at most 6 characters");
    }
    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err("Route code must be uppercase alphanumeric only");
    }
    Ok(())
}

/// Validate an archival retention window
pub fn validate_retention_days(days: i64) -> Result<(), &'static str> {
    if days <= 0 {
        return Err("Retention days must be positive");
    }
    if days > 3650 {
        return Err("Retention days must be at most 3650");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_quantity() {
        assert!(validate_positive_quantity(1).is_ok());
        assert!(validate_positive_quantity(10_000).is_ok());
        assert!(validate_positive_quantity(0).is_err());
        assert!(validate_positive_quantity(-3).is_err());
    }

    #[test]
    fn test_validate_picked_quantity() {
        assert!(validate_picked_quantity(0).is_ok());
        assert!(validate_picked_quantity(5).is_ok());
        assert!(validate_picked_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_warehouse_code_valid() {
        assert!(validate_warehouse_code("TKO").is_ok());
        assert!(validate_warehouse_code("WH01").is_ok());
        assert!(validate_warehouse_code("AB").is_ok());
    }

    #[test]
    fn test_validate_warehouse_code_invalid() {
        assert!(validate_warehouse_code("A").is_err()); // Too short
        assert!(validate_warehouse_code("ABCDEFGHI").is_err()); // Too long
        assert!(validate_warehouse_code("tko").is_err()); // Lowercase
        assert!(validate_warehouse_code("TK-1").is_err()); // Special char
    }

    #[test]
    fn test_validate_route_code() {
        assert!(validate_route_code("R01").is_ok());
        assert!(validate_route_code("NORTH1").is_ok());
        assert!(validate_route_code("r01").is_err());
        assert!(validate_route_code("R").is_err());
        assert!(validate_route_code("ROUTE01").is_err());
    }

    #[test]
    fn test_validate_retention_days() {
        assert!(validate_retention_days(30).is_ok());
        assert!(validate_retention_days(1).is_ok());
        assert!(validate_retention_days(0).is_err());
        assert!(validate_retention_days(-5).is_err());
        assert!(validate_retention_days(4000).is_err());
    }
}
