use crate::error::{IdentityError, InvalidReason, Result};
use regex::Regex;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub const IDENTIFIER_LEN: usize = 36;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("UUID pattern should compile")
});

/// Check that `candidate` is a syntactically valid 8-4-4-4-12 UUID.
pub fn validate_identifier(candidate: &str) -> Result<()> {
    if candidate.is_empty() {
        return Err(IdentityError::invalid(candidate, InvalidReason::Empty));
    }

    #[cfg(feature = "uuid-syntax-check")]
    if uuid::Uuid::try_parse(candidate).is_err() {
        return Err(IdentityError::invalid(candidate, InvalidReason::Syntax));
    }

    if candidate.len() != IDENTIFIER_LEN {
        return Err(IdentityError::invalid(
            candidate,
            InvalidReason::Length(candidate.len()),
        ));
    }
    if !UUID_PATTERN.is_match(candidate) {
        return Err(IdentityError::invalid(candidate, InvalidReason::Pattern));
    }
    Ok(())
}

/// A validated UUID string.
///
/// The only ways to obtain one are [`Identifier::parse`] and an
/// [`IdentifierSource`], so holding an `Identifier` means the value passed
/// [`validate_identifier`] (or came from a trusted generator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(candidate: &str) -> Result<Self> {
        validate_identifier(candidate)?;
        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets the cache and queues be searched with a plain &str.
impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The UUID generation primitive.
pub trait IdentifierSource {
    fn generate(&mut self) -> Identifier;
}

/// Random (version 4) UUIDs in lowercase hyphenated form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4;

impl IdentifierSource for UuidV4 {
    fn generate(&mut self) -> Identifier {
        Identifier(uuid::Uuid::new_v4().hyphenated().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reason(candidate: &str) -> InvalidReason {
        match validate_identifier(candidate) {
            Err(IdentityError::InvalidIdentifier { reason, .. }) => reason,
            other => panic!("expected InvalidIdentifier for {candidate:?}, got {other:?}"),
        }
    }

    #[test]
    fn accepts_canonical_uuid() {
        validate_identifier("123e4567-e89b-12d3-a456-426614174000").unwrap();
        validate_identifier("123E4567-E89B-12D3-A456-426614174000").unwrap();
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(reason(""), InvalidReason::Empty);
        assert!(validate_identifier("not-a-uuid").is_err());
    }

    #[cfg(feature = "uuid-syntax-check")]
    #[test]
    fn platform_parser_runs_before_length_check() {
        assert_eq!(reason("not-a-uuid"), InvalidReason::Syntax);
        // Accepted by the uuid crate in its simple form, but not 36 characters.
        assert_eq!(
            reason("123e4567e89b12d3a456426614174000"),
            InvalidReason::Length(32)
        );
    }

    #[cfg(not(feature = "uuid-syntax-check"))]
    #[test]
    fn length_checked_before_pattern() {
        assert_eq!(reason("not-a-uuid"), InvalidReason::Length(10));
        assert_eq!(
            reason("123e4567-e89b-12d3-a456-42661417400g"),
            InvalidReason::Pattern
        );
    }

    #[test]
    fn rejects_braced_and_urn_forms() {
        assert!(validate_identifier("{123e4567-e89b-12d3-a456-426614174000}").is_err());
        assert!(validate_identifier("urn:uuid:123e4567-e89b-12d3-a456-426614174000").is_err());
    }

    #[test]
    fn generated_identifiers_validate() {
        let mut source = UuidV4;
        for _ in 0..32 {
            let id = source.generate();
            assert_eq!(id.as_str().len(), IDENTIFIER_LEN);
            validate_identifier(id.as_str()).unwrap();
            assert_eq!(id.as_str(), id.as_str().to_lowercase());
        }
    }

    #[test]
    fn parse_keeps_the_given_spelling() {
        let id: Identifier = "123E4567-E89B-12D3-A456-426614174000".parse().unwrap();
        assert_eq!(id.to_string(), "123E4567-E89B-12D3-A456-426614174000");
    }

    proptest! {
        #[test]
        fn any_hex_hyphen_string_is_valid(
            s in "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}"
        ) {
            prop_assert!(validate_identifier(&s).is_ok());
        }

        #[test]
        fn wrong_length_is_invalid(s in "[0-9a-f-]{0,35}|[0-9a-f-]{37,60}") {
            prop_assert!(validate_identifier(&s).is_err());
        }

        #[test]
        fn non_hex_in_hex_position_is_invalid(
            pos in 0usize..32,
            bad in "[g-zG-Z_ ]",
        ) {
            let mut hex: Vec<char> = "123e4567e89b12d3a456426614174000".chars().collect();
            hex[pos] = bad.chars().next().unwrap();
            let hex: String = hex.into_iter().collect();
            let s = format!("{}-{}-{}-{}-{}", &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32]);
            prop_assert!(validate_identifier(&s).is_err());
        }
    }
}
