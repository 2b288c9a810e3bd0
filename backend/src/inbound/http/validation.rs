//! Shared validation helpers for inbound HTTP adapters.

use serde_json::json;

use crate::domain::Error;

/// Error for a required field that was blank.
pub(crate) fn blank_field_error(field: &str) -> Error {
    Error::invalid_request(format!("{field} must not be empty")).with_details(json!({
        "field": field,
        "code": "blank_field",
    }))
}

/// Trim `value`, rejecting it when nothing is left.
pub(crate) fn require_non_blank(value: String, field: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(blank_field_error(field));
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_owned())
    }
}

/// Like [`require_non_blank`] but passes `None` through.
pub(crate) fn optional_non_blank(value: Option<String>, field: &str) -> Result<Option<String>, Error> {
    value.map(|v| require_non_blank(v, field)).transpose()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::domain::ErrorCode;

    #[rstest]
    #[case("Ann", "Ann")]
    #[case("  Ann ", "Ann")]
    fn non_blank_values_are_trimmed(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(
            require_non_blank(raw.to_owned(), "displayName").expect("valid"),
            expected
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_values_name_the_field(#[case] raw: &str) {
        let err = require_non_blank(raw.to_owned(), "displayName").expect_err("blank");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(
            err.details().and_then(|d| d.get("field")),
            Some(&json!("displayName"))
        );
    }

    #[rstest]
    fn absent_optional_values_pass() {
        assert_eq!(optional_non_blank(None, "locale").expect("absent"), None);
    }
}
