use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{blocks, daily_recommendations, matches, notifications, profiles, reports};

// --- Profile ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub nickname: String,
    pub gender: String,
    pub birth_year: i32,
    pub location: String,
    pub interests: serde_json::Value,
    pub bio: Option<String>,
    pub image_urls: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Interest codes stored as a jsonb array of strings. Anything else
    /// in the column is treated as an empty list.
    pub fn interest_codes(&self) -> Vec<String> {
        self.interests
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// --- Match (directed interaction record) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("unknown match status: {s}")),
        }
    }
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn status(&self) -> Option<MatchStatus> {
        self.status.parse().ok()
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = matches)]
pub struct NewMatch {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: String,
}

// --- Block ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = blocks)]
pub struct Block {
    pub id: Uuid,
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = blocks)]
pub struct NewBlock {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
}

// --- Report ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = reports)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub target_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reports)]
pub struct NewReport {
    pub reporter_id: Uuid,
    pub target_id: Uuid,
    pub reason: String,
}

// --- DailyRecommendation (per-user, per-day cache row) ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = daily_recommendations)]
pub struct DailyRecommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub rec_date: NaiveDate,
    pub profile_ids: serde_json::Value,
    pub explanations: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyRecommendation {
    pub fn decoded_ids(&self) -> Vec<Uuid> {
        serde_json::from_value(self.profile_ids.clone()).unwrap_or_default()
    }

    pub fn decoded_explanations(&self) -> std::collections::HashMap<Uuid, String> {
        serde_json::from_value(self.explanations.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = daily_recommendations)]
pub struct NewDailyRecommendation {
    pub user_id: Uuid,
    pub rec_date: NaiveDate,
    pub profile_ids: serde_json::Value,
    pub explanations: serde_json::Value,
}

// --- Notification ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn match_status_round_trips_through_column_text() {
        for status in [
            MatchStatus::Pending,
            MatchStatus::Accepted,
            MatchStatus::Rejected,
            MatchStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MatchStatus>(), Ok(status));
        }
        assert!("MUTUAL".parse::<MatchStatus>().is_err());
    }

    #[test]
    fn interest_codes_tolerates_malformed_column() {
        let mut profile = test_profile();
        profile.interests = serde_json::json!(["H001", "H002"]);
        assert_eq!(profile.interest_codes(), vec!["H001", "H002"]);

        profile.interests = serde_json::json!({"oops": true});
        assert!(profile.interest_codes().is_empty());
    }

    pub(crate) fn test_profile() -> Profile {
        Profile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            nickname: "tester".into(),
            gender: "F".into(),
            birth_year: 1960,
            location: "Seoul Gangnam-gu".into(),
            interests: serde_json::json!([]),
            bio: None,
            image_urls: serde_json::json!([]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
