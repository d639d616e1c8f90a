pub mod auth;
pub mod products;
pub mod projects;
pub mod rooms;

use serde::de::{value::StrDeserializer, DeserializeOwned, IntoDeserializer};

use crate::error::{AppError, Result};

/// Trims optional free text; blank input clears the field.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn required_name(name: &str, what: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{what} name is required")));
    }
    Ok(name.to_string())
}

/// Reads a lowercase enum value (status, permission) from request text.
pub(crate) fn parse_field<T>(value: &str, message: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let de: StrDeserializer<'_, serde::de::value::Error> = value.trim().into_deserializer();
    T::deserialize(de).map_err(|_| AppError::Validation(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ProductStatus, SharePermission};

    #[test]
    fn parses_enum_fields() {
        let status: ProductStatus = parse_field(" purchased ", "bad status").unwrap();
        assert_eq!(status, ProductStatus::Purchased);

        let err = parse_field::<SharePermission>("owner", "Permission must be 'read' or 'edit'")
            .unwrap_err();
        assert_eq!(err.to_string(), "Permission must be 'read' or 'edit'");
        assert!(parse_field::<ProductStatus>("Planned", "bad status").is_err());
    }

    #[test]
    fn blank_text_is_cleared() {
        assert_eq!(optional_text(Some("  ".to_string())), None);
        assert_eq!(optional_text(Some(" Ikea ".to_string())).as_deref(), Some("Ikea"));
    }
}
