//! API key domain entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bearer key issued to a user on login.
///
/// A user owns at most one key row; issuing a new key refreshes the
/// validity of the existing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub key: Uuid,
    /// Owning user
    pub api_user: Uuid,
    pub valid_until: DateTime<Utc>,
}

impl ApiKey {
    /// Fresh key for `user`, valid until `valid_until`.
    pub fn issue(user: Uuid, valid_until: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: Uuid::new_v4(),
            api_user: user,
            valid_until,
        }
    }

    /// Whether the key is past its validity at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_issue_generates_distinct_id_and_key() {
        let user = Uuid::new_v4();
        let key = ApiKey::issue(user, Utc::now());
        assert_eq!(key.api_user, user);
        assert_ne!(key.id, key.key);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let key = ApiKey::issue(Uuid::new_v4(), now);
        assert!(!key.is_expired_at(now));
        assert!(key.is_expired_at(now + Duration::seconds(1)));
        assert!(!key.is_expired_at(now - Duration::hours(1)));
    }
}
