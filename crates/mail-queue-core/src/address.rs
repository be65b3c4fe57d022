use crate::ValidationError;

/// Cheap per-recipient check applied while a bulk send is running:
/// an `@` must be present and the part after the last `@` must contain a `.`.
pub fn has_deliverable_shape(address: &str) -> bool {
    match address.rsplit_once('@') {
        Some((_, domain)) => domain.contains('.'),
        None => false,
    }
}

/// Stricter check used at submission time.
pub fn is_plausible_address(address: &str) -> bool {
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    if is_plausible_address(address) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAddress(address.to_string()))
    }
}
