//! Ownership tags embedded in subscription descriptions.
//!
//! A subscription belongs to an artifact when its `description` reads
//! `Artifact-ID: <identity>, Sub-ID: <identifier>`. The broker stores the
//! description as free text, so [`OwnershipTag::parse`] is the only place that
//! knows the format.

use std::fmt;

use crate::registry::SubscriptionIdentifier;

const ARTIFACT_PREFIX: &str = "Artifact-ID: ";
const IDENTIFIER_SEPARATOR: &str = ", Sub-ID: ";

/// Who created a subscription and under which identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTag {
    pub identity: String,
    pub identifier: SubscriptionIdentifier,
}

impl OwnershipTag {
    pub fn new(identity: impl Into<String>, identifier: SubscriptionIdentifier) -> Self {
        Self {
            identity: identity.into(),
            identifier,
        }
    }

    /// Parse a description. Returns `None` for anything that is not a complete tag.
    ///
    /// The identifier ends at the first `,`; identifiers containing commas are
    /// therefore truncated.
    pub fn parse(description: &str) -> Option<Self> {
        let rest = description.trim_end().strip_prefix(ARTIFACT_PREFIX)?;
        let (identity, tail) = rest.split_once(IDENTIFIER_SEPARATOR)?;
        let identifier = tail.split(',').next().unwrap_or_default().trim();

        if identity.trim().is_empty() || identifier.is_empty() {
            return None;
        }

        Some(Self::new(identity.trim(), SubscriptionIdentifier::new(identifier)))
    }

    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.identity == identity
    }
}

impl fmt::Display for OwnershipTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{ARTIFACT_PREFIX}{}{IDENTIFIER_SEPARATOR}{}",
            self.identity, self.identifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let tag = OwnershipTag::new("subscriber@localhost", "sub_1a2b3c4d".into());
        assert_eq!(
            tag.to_string(),
            "Artifact-ID: subscriber@localhost, Sub-ID: sub_1a2b3c4d"
        );
        assert_eq!(OwnershipTag::parse(&tag.to_string()), Some(tag));
    }

    #[test]
    fn test_parse_trailing_text() {
        let tag = OwnershipTag::parse("Artifact-ID: a@b, Sub-ID: sub_1, created by hand").unwrap();
        assert_eq!(tag.identity, "a@b");
        assert_eq!(tag.identifier.as_str(), "sub_1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for description in [
            "",
            "Some other subscription",
            "Sub-ID: sub_1",
            "artifact-id: a, Sub-ID: sub_1",
            "Artifact-ID: a",
            "Artifact-ID: a, Sub-ID: ",
            "Artifact-ID: a, Sub-ID: , trailing",
            "Artifact-ID: , Sub-ID: sub_1",
            "Artifact-ID: a,Sub-ID: sub_1",
            " Artifact-ID: a, Sub-ID: sub_1",
            "\tArtifact-ID: a, Sub-ID: sub_1",
        ] {
            assert_eq!(OwnershipTag::parse(description), None, "{description:?}");
        }
    }

    #[test]
    fn test_parse_ignores_trailing_whitespace() {
        let tag = OwnershipTag::parse("Artifact-ID: a@b, Sub-ID: sub_1 \n").unwrap();
        assert_eq!(tag.identifier.as_str(), "sub_1");
    }

    #[test]
    fn test_ownership() {
        let tag = OwnershipTag::parse("Artifact-ID: a@b, Sub-ID: sub_1").unwrap();
        assert!(tag.is_owned_by("a@b"));
        assert!(!tag.is_owned_by("c@d"));
    }
}
