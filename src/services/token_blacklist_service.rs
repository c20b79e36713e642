//! Revoked JWT ids, kept until the token would have expired anyway.
//!
//! In-memory (dashmap). A restart forgets logouts, which only matters for
//! tokens that were still valid at the time.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

#[derive(Clone)]
struct BlacklistEntry {
    expires_at: DateTime<Utc>,
    user_id: Uuid,
    reason: &'static str,
}

#[derive(Clone, Default)]
pub struct TokenBlacklistService {
    blacklist: Arc<DashMap<String, BlacklistEntry>>,
}

impl TokenBlacklistService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries every five minutes.
    pub fn spawn_cleanup(&self) {
        let blacklist = self.blacklist.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                let now = Utc::now();
                blacklist.retain(|_, entry| entry.expires_at > now);
                tracing::debug!("Token blacklist cleanup, {} active entries", blacklist.len());
            }
        });
    }

    pub fn blacklist_token(
        &self,
        jti: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        reason: &'static str,
    ) {
        self.blacklist.insert(
            jti.to_string(),
            BlacklistEntry {
                expires_at,
                user_id,
                reason,
            },
        );
        tracing::info!("Token revoked: user={}, reason={}", user_id, reason);
    }

    pub fn is_blacklisted(&self, jti: &str) -> bool {
        match self.blacklist.get(jti) {
            Some(entry) if entry.expires_at > Utc::now() => {
                tracing::debug!(
                    "Revoked token presented: user={}, reason={}",
                    entry.user_id,
                    entry.reason
                );
                true
            }
            _ => false,
        }
    }

    pub fn active_entries(&self) -> usize {
        let now = Utc::now();
        self.blacklist.iter().filter(|e| e.expires_at > now).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklisted_token_is_rejected() {
        let service = TokenBlacklistService::new();
        service.blacklist_token("jti-1", Uuid::new_v4(), Utc::now() + chrono::Duration::hours(1), "logout");
        assert!(service.is_blacklisted("jti-1"));
        assert!(!service.is_blacklisted("jti-2"));
    }

    #[test]
    fn test_expired_entries_are_ignored() {
        let service = TokenBlacklistService::new();
        let user = Uuid::new_v4();
        service.blacklist_token("old", user, Utc::now() - chrono::Duration::seconds(1), "logout");
        service.blacklist_token("new", user, Utc::now() + chrono::Duration::hours(1), "logout");
        assert!(!service.is_blacklisted("old"));
        assert_eq!(service.active_entries(), 1);
    }
}
