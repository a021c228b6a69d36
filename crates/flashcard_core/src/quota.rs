//! crates/flashcard_core/src/quota.rs
//!
//! The daily sentence budget. Usage is always recomputed from session history,
//! so there is no counter to drift out of sync with the sessions table.
//!
//! The check and the session insert that follows it are not atomic: two
//! concurrent requests from the same user can both pass and together exceed the
//! limit. The limit is best-effort, not a hard cap.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{GenerationError, GenerationResult};
use crate::ports::{DatabaseService, PortResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub daily_limit: u32,
    /// Offset of the quota day from UTC, in minutes. Zero means the UTC calendar day.
    pub utc_offset_minutes: i32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_limit: 100,
            utc_offset_minutes: 0,
        }
    }
}

/// The half-open interval `[start, end)` covering one quota day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QuotaWindow {
    /// The quota day containing `now`, for a day that starts at local midnight
    /// at `utc_offset_minutes` from UTC.
    pub fn containing(now: DateTime<Utc>, utc_offset_minutes: i32) -> Self {
        let offset = Duration::minutes(i64::from(utc_offset_minutes));
        let local_midnight = (now.naive_utc() + offset).date().and_time(NaiveTime::MIN);
        let start = Utc.from_utc_datetime(&(local_midnight - offset));
        Self {
            start,
            end: start + Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub window: QuotaWindow,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Whether `requested` more sentences fit into today's budget.
    pub fn allows(&self, requested: u32) -> bool {
        u64::from(self.used) + u64::from(requested) <= u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaGuard {
    policy: QuotaPolicy,
}

impl QuotaGuard {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self { policy }
    }

    /// Sums today's usage for the user.
    pub async fn status(
        &self,
        db: &dyn DatabaseService,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<QuotaStatus> {
        let window = QuotaWindow::containing(now, self.policy.utc_offset_minutes);
        let used = db
            .sum_input_count_between(user_id, window.start, window.end)
            .await?;
        Ok(QuotaStatus {
            used,
            limit: self.policy.daily_limit,
            window,
        })
    }

    /// Rejects the request when `used + requested` would exceed the daily limit.
    pub async fn check(
        &self,
        db: &dyn DatabaseService,
        user_id: Uuid,
        requested: u32,
        now: DateTime<Utc>,
    ) -> GenerationResult<QuotaStatus> {
        let status = self.status(db, user_id, now).await?;
        if !status.allows(requested) {
            info!(
                user_id = %user_id,
                used = status.used,
                requested,
                limit = status.limit,
                "Daily generation limit reached."
            );
            return Err(GenerationError::QuotaExceeded {
                used: status.used,
                requested,
                limit: status.limit,
            });
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn utc_window_spans_the_calendar_day() {
        let window = QuotaWindow::containing(at("2026-03-14T17:45:00Z"), 0);
        assert_eq!(window.start, at("2026-03-14T00:00:00Z"));
        assert_eq!(window.end, at("2026-03-15T00:00:00Z"));
    }

    #[test]
    fn offset_window_follows_local_midnight() {
        // 23:30 UTC is already the next day at UTC+2.
        let window = QuotaWindow::containing(at("2026-03-14T23:30:00Z"), 120);
        assert_eq!(window.start, at("2026-03-14T22:00:00Z"));
        assert_eq!(window.end, at("2026-03-15T22:00:00Z"));

        let window = QuotaWindow::containing(at("2026-03-14T02:00:00Z"), -300);
        assert_eq!(window.start, at("2026-03-13T05:00:00Z"));
    }

    #[tokio::test]
    async fn exactly_the_limit_is_allowed() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let now = at("2026-03-14T12:00:00Z");
        store.seed_session(user, 30, at("2026-03-14T08:00:00Z")).await;
        store.seed_session(user, 30, at("2026-03-14T09:00:00Z")).await;
        store.seed_session(user, 30, at("2026-03-14T10:00:00Z")).await;

        let guard = QuotaGuard::default();
        let status = guard.check(&store, user, 10, now).await.unwrap();
        assert_eq!(status.used, 90);
        assert_eq!(status.remaining(), 10);

        let err = guard.check(&store, user, 11, now).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::QuotaExceeded { used: 90, requested: 11, limit: 100 }
        ));
    }

    #[tokio::test]
    async fn rejects_ninety_eight_plus_five_without_writing() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let now = at("2026-03-14T12:00:00Z");
        for _ in 0..3 {
            store.seed_session(user, 30, at("2026-03-14T01:00:00Z")).await;
        }
        store.seed_session(user, 8, at("2026-03-14T02:00:00Z")).await;

        let result = QuotaGuard::default().check(&store, user, 5, now).await;
        assert!(matches!(result, Err(GenerationError::QuotaExceeded { used: 98, .. })));
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn ignores_other_days_and_other_users() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        let now = at("2026-03-14T12:00:00Z");
        store.seed_session(user, 30, at("2026-03-13T23:59:59Z")).await;
        store.seed_session(user, 30, at("2026-03-15T00:00:00Z")).await;
        store.seed_session(someone_else, 30, at("2026-03-14T11:00:00Z")).await;
        store.seed_session(user, 5, at("2026-03-14T00:00:00Z")).await;

        let status = QuotaGuard::default().status(&store, user, now).await.unwrap();
        assert_eq!(status.used, 5);
    }

    #[tokio::test]
    async fn respects_a_custom_limit() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let guard = QuotaGuard::new(QuotaPolicy {
            daily_limit: 10,
            utc_offset_minutes: 0,
        });
        let now = at("2026-03-14T12:00:00Z");
        assert!(guard.check(&store, user, 10, now).await.is_ok());
        assert!(guard.check(&store, user, 11, now).await.is_err());
    }
}
