//! Gamification
//!
//! Streaks, badges, XP and the circle leaderboard. Every event is applied
//! best-effort: a gamification failure never breaks the triggering flow.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Profile, UserStats};
use crate::error::EngineError;
use crate::services::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    Login,
    Repayment,
    Vouch,
}

impl GameEvent {
    fn xp(&self) -> u64 {
        match self {
            GameEvent::Repayment => 100,
            GameEvent::Vouch => 50,
            GameEvent::Login => 10,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub streak_days: u32,
    pub new_badges: Vec<&'static str>,
    pub xp_gained: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub circle_id: Uuid,
    pub name: String,
    pub score: i64,
    pub rank: usize,
}

struct Badge {
    key: &'static str,
    earned: fn(&Profile, &UserStats) -> bool,
}

/// Fixed badge catalog; predicates run over rolled-up user stats.
const BADGES: [Badge; 3] = [
    Badge {
        key: "the_anchor",
        earned: |_, stats| stats.successful_vouches >= 5,
    },
    Badge {
        key: "comeback_kid",
        earned: |profile, stats| profile.trust_score > 80 && stats.lowest_trust_score < 30,
    },
    Badge {
        key: "early_believer",
        earned: |_, stats| stats.member_number <= 1000,
    },
];

pub struct GamificationService {
    store: Arc<dyn Store>,
}

impl GamificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn process_event(
        &self,
        user_id: Uuid,
        event: GameEvent,
    ) -> Result<EventOutcome, EngineError> {
        let mut profile = self.store.get_profile(user_id).await?;

        let today = Utc::now().date_naive();
        let streak_days = match profile.metadata.last_active_date {
            Some(last) if last == today => profile.metadata.streak_days,
            Some(last) if last == today - chrono::Duration::days(1) => {
                profile.metadata.streak_days + 1
            }
            _ => 1,
        };
        profile.metadata.streak_days = streak_days;
        profile.metadata.last_active_date = Some(today);

        let stats = self.store.get_user_stats(user_id).await?;
        let new_badges: Vec<&'static str> = BADGES
            .iter()
            .filter(|b| !profile.metadata.badges.iter().any(|have| have == b.key))
            .filter(|b| (b.earned)(&profile, &stats))
            .map(|b| b.key)
            .collect();
        profile
            .metadata
            .badges
            .extend(new_badges.iter().map(|b| b.to_string()));

        let xp_gained = event.xp();
        profile.metadata.xp += xp_gained;

        self.store.update_profile(profile).await?;
        info!(%user_id, streak = streak_days, xp = xp_gained, "gamification event applied");

        Ok(EventOutcome {
            streak_days,
            new_badges,
            xp_gained,
        })
    }

    /// Circle Wars ranking: repayment discipline up, defaults brutally down.
    pub async fn circle_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, EngineError> {
        let circles = self.store.get_all_circles().await?;
        let mut board = Vec::with_capacity(circles.len());
        for circle in circles {
            let stats = self.store.get_circle_stats(circle.id).await?;
            let score = (stats.repayment_rate * 100.0
                + f64::from(stats.vouch_activity) * 10.0
                - f64::from(stats.defaults) * 500.0) as i64;
            board.push(LeaderboardEntry {
                circle_id: circle.id,
                name: circle.name,
                score,
                rank: 0,
            });
        }
        board.sort_by_key(|e| std::cmp::Reverse(e.score));
        for (i, entry) in board.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Circle, Language, ProfileMetadata};
    use crate::services::MemoryStore;
    use chrono::Duration;

    async fn seed(store: &MemoryStore, metadata: ProfileMetadata) -> Uuid {
        let id = Uuid::new_v4();
        store
            .create_profile(Profile {
                id,
                phone: format!("+91{}", &id.simple().to_string()[..10]),
                full_name: "Kiran".into(),
                language: Language::En,
                wallet_address: None,
                trust_score: 40,
                saathi_balance: 0.0,
                is_verified: true,
                created_at: Utc::now(),
                metadata,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_streak_increments_after_yesterday() {
        let store = Arc::new(MemoryStore::new());
        let user = seed(
            &store,
            ProfileMetadata {
                streak_days: 4,
                last_active_date: Some(Utc::now().date_naive() - Duration::days(1)),
                ..ProfileMetadata::default()
            },
        )
        .await;
        let svc = GamificationService::new(store.clone());
        let outcome = svc.process_event(user, GameEvent::Login).await.unwrap();
        assert_eq!(outcome.streak_days, 5);
        assert_eq!(outcome.xp_gained, 10);
    }

    #[tokio::test]
    async fn test_streak_same_day_is_noop_and_gap_resets() {
        let store = Arc::new(MemoryStore::new());
        let svc = GamificationService::new(store.clone());

        let today_user = seed(
            &store,
            ProfileMetadata {
                streak_days: 7,
                last_active_date: Some(Utc::now().date_naive()),
                ..ProfileMetadata::default()
            },
        )
        .await;
        let outcome = svc
            .process_event(today_user, GameEvent::Repayment)
            .await
            .unwrap();
        assert_eq!(outcome.streak_days, 7);
        assert_eq!(outcome.xp_gained, 100);

        let lapsed_user = seed(
            &store,
            ProfileMetadata {
                streak_days: 12,
                last_active_date: Some(Utc::now().date_naive() - Duration::days(5)),
                ..ProfileMetadata::default()
            },
        )
        .await;
        let outcome = svc
            .process_event(lapsed_user, GameEvent::Vouch)
            .await
            .unwrap();
        assert_eq!(outcome.streak_days, 1);
        assert_eq!(outcome.xp_gained, 50);
    }

    #[tokio::test]
    async fn test_early_believer_badge_awarded_once() {
        let store = Arc::new(MemoryStore::new());
        let user = seed(&store, ProfileMetadata::default()).await;
        let svc = GamificationService::new(store.clone());

        let first = svc.process_event(user, GameEvent::Login).await.unwrap();
        assert!(first.new_badges.contains(&"early_believer"));
        let second = svc.process_event(user, GameEvent::Login).await.unwrap();
        assert!(second.new_badges.is_empty());

        let profile = store.get_profile(user).await.unwrap();
        assert!(profile.metadata.badges.contains(&"early_believer".to_string()));
        assert_eq!(profile.metadata.xp, 20);
    }

    #[tokio::test]
    async fn test_leaderboard_ranks_by_score() {
        let store = Arc::new(MemoryStore::new());
        let good = store
            .create_circle(Circle {
                id: Uuid::new_v4(),
                name: "Steady Savers".into(),
                invite_code: "A1".into(),
                member_count: 10,
                max_members: 20,
                emergency_fund: 0.0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let quiet = store
            .create_circle(Circle {
                id: Uuid::new_v4(),
                name: "Quiet Corner".into(),
                invite_code: "B2".into(),
                member_count: 2,
                max_members: 20,
                emergency_fund: 0.0,
                created_at: Utc::now() + Duration::seconds(1),
            })
            .await
            .unwrap();
        // Give the first circle vouch activity so it outranks the second.
        let member = seed(&store, ProfileMetadata::default()).await;
        let backer = seed(&store, ProfileMetadata::default()).await;
        store
            .create_vouch(crate::domain::Vouch {
                id: Uuid::new_v4(),
                voucher_id: backer,
                vouchee_id: member,
                circle_id: good.id,
                vouch_level: crate::domain::VouchLevel::Basic,
                saathi_staked: 20.0,
                status: crate::domain::VouchStatus::Active,
                blockchain_tx_hash: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let svc = GamificationService::new(store);
        let board = svc.circle_leaderboard().await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].circle_id, good.id);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].circle_id, quiet.id);
        assert_eq!(board[1].rank, 2);
        assert!(board[0].score > board[1].score);
    }
}
