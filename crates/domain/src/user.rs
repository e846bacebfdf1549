//! Author profile supplied by the user collaborator.

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::ReasonCode;
use crate::value_objects::PricingProfile;

/// What the reservation core needs to know about an order author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub id: UserId,
    pub name: String,
    pub confirmed: bool,
    pub banned: bool,
    #[serde(default)]
    pub pricing: PricingProfile,
}

impl AuthorProfile {
    /// A confirmed, non-banned author on retail pricing.
    pub fn active(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            confirmed: true,
            banned: false,
            pricing: PricingProfile::default(),
        }
    }

    /// Checks that the author may hold stock.
    ///
    /// Returns the reason code of the first failed precondition.
    pub fn ensure_can_reserve(&self) -> Result<(), ReasonCode> {
        if !self.confirmed {
            return Err(ReasonCode::UserNotConfirmed);
        }
        if self.banned {
            return Err(ReasonCode::UserBanned);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_author_can_reserve() {
        let author = AuthorProfile::active(UserId::new(), "Ann");
        assert_eq!(author.ensure_can_reserve(), Ok(()));
    }

    #[test]
    fn test_unconfirmed_and_banned_authors_are_rejected() {
        let mut author = AuthorProfile::active(UserId::new(), "Ann");
        author.confirmed = false;
        assert_eq!(author.ensure_can_reserve(), Err(ReasonCode::UserNotConfirmed));

        author.confirmed = true;
        author.banned = true;
        assert_eq!(author.ensure_can_reserve(), Err(ReasonCode::UserBanned));
    }
}
