//! Strongly typed UUID identifiers.
//!
//! Each entity gets its own newtype so a prompt id can never be passed where
//! a user id is expected. All wrappers serialize as plain UUIDs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random (v4) identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Borrow the inner UUID for persistence adapters.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(value)?))
            }
        }
    };
}

define_id!(
    /// Identifier of a group member.
    UserId
);
define_id!(
    /// Identifier of a social group.
    GroupId
);
define_id!(
    /// Identifier of one weekly availability prompt.
    PromptId
);
define_id!(
    /// Opaque, unguessable identifier embedded in a signed token (jti claim).
    TokenId
);
define_id!(
    /// Identifier of a group's prompt settings row.
    SettingsId
);
define_id!(
    /// Identifier of a queued background job.
    JobId
);
define_id!(
    /// Identifier of a computed meeting suggestion.
    SuggestionId
);
define_id!(
    /// Identifier of a scheduled event a suggestion was converted into.
    EventId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_unique() {
        assert_ne!(TokenId::random(), TokenId::random());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let id = PromptId::random();
        let parsed: PromptId = id.to_string().parse().expect("uuid string parses");
        assert_eq!(id, parsed);
    }
}
