use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use rand::seq::SliceRandom;
use serde::Serialize;
use uuid::Uuid;

use maum_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{DailyRecommendation, NewDailyRecommendation, Profile};
use crate::schema::{daily_recommendations, profiles};
use crate::services::candidate_pool::{self, RecommendationFilters};
use crate::services::explainer::FALLBACK_EXPLANATION;
use crate::services::{match_service, scoring};
use crate::AppState;

/// Unfiltered requests show a small daily batch; explicit filtering widens
/// the window since the user is searching rather than browsing.
const UNFILTERED_COUNT: usize = 9;
const FILTERED_COUNT: usize = 20;

#[derive(Debug, Serialize)]
pub struct RecommendationItem {
    pub id: Uuid,
    pub nickname: String,
    pub birth_year: i32,
    pub location: String,
    pub interests: Vec<String>,
    pub bio: Option<String>,
    pub image_urls: serde_json::Value,
    pub score: i32,
    pub explanation: String,
}

pub fn batch_size(is_filtering: bool) -> usize {
    if is_filtering { FILTERED_COUNT } else { UNFILTERED_COUNT }
}

/// Reorder loaded profiles to the cached ID order, dropping IDs whose
/// profiles no longer exist.
pub fn order_by_stored(ids: &[Uuid], mut loaded: Vec<Profile>) -> Vec<Profile> {
    let mut by_id: HashMap<Uuid, Profile> = loaded.drain(..).map(|p| (p.user_id, p)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Score-descending, stable on ties so the upstream order is preserved.
pub fn sort_by_score(scored: &mut [(Profile, i32)]) {
    scored.sort_by(|a, b| b.1.cmp(&a.1));
}

/// Ranked recommendations for a user, read-through against today's cached
/// batch when no filters are active.
pub async fn get_recommendations(
    state: &AppState,
    user_id: Uuid,
    filters: &RecommendationFilters,
    today: NaiveDate,
) -> AppResult<Vec<RecommendationItem>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let requester = profiles::table
        .filter(profiles::user_id.eq(user_id))
        .first::<Profile>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;

    let is_filtering = filters.is_filtering();

    let cached = if is_filtering {
        None
    } else {
        daily_recommendations::table
            .filter(daily_recommendations::user_id.eq(user_id))
            .filter(daily_recommendations::rec_date.eq(today))
            .first::<DailyRecommendation>(&mut conn)
            .optional()?
    };

    let (mut candidates, mut explanations, stored_ids) = match cached {
        Some(row) => {
            let ids = row.decoded_ids();
            let loaded = profiles::table
                .filter(profiles::user_id.eq_any(&ids))
                .load::<Profile>(&mut conn)?;
            tracing::debug!(user_id = %user_id, count = ids.len(), "daily recommendation cache hit");
            let ordered = order_by_stored(&ids, loaded);
            (ordered, row.decoded_explanations(), Some(ids))
        }
        None => {
            let mut pool = candidate_pool::build_pool(&mut conn, &requester, filters, today)?;
            // Selection is randomized among eligible matches on purpose;
            // the score only orders what the shuffle picked.
            pool.shuffle(&mut rand::thread_rng());
            pool.truncate(batch_size(is_filtering));
            (pool, HashMap::new(), None)
        }
    };

    // Second-pass safety filter: anything the requester acted on since the
    // batch was cached disappears from the response.
    let candidate_ids: Vec<Uuid> = candidates.iter().map(|p| p.user_id).collect();
    let acted_on = match_service::acted_on_receivers(&mut conn, user_id, &candidate_ids)?;
    if !acted_on.is_empty() {
        candidates.retain(|p| !acted_on.contains(&p.user_id));
    }

    let mut scored: Vec<(Profile, i32)> = candidates
        .into_iter()
        .map(|candidate| {
            let s = scoring::score(&requester, &candidate);
            (candidate, s)
        })
        .collect();
    sort_by_score(&mut scored);

    let unexplained: Vec<Profile> = scored
        .iter()
        .filter(|(p, _)| !explanations.contains_key(&p.user_id))
        .map(|(p, _)| p.clone())
        .collect();

    let fetched = state.explainer.batch_explain(&requester, &unexplained).await;
    let fetched_any = !fetched.is_empty();
    explanations.extend(fetched);
    for (candidate, _) in &scored {
        explanations
            .entry(candidate.user_id)
            .or_insert_with(|| FALLBACK_EXPLANATION.to_string());
    }

    // Cache hits only merge new explanation text; the stored ID list for
    // the day is never rewritten mid-day.
    if !is_filtering {
        match &stored_ids {
            Some(ids) if fetched_any => upsert_daily(&mut conn, user_id, today, ids, &explanations)?,
            Some(_) => {}
            None => {
                let ids: Vec<Uuid> = scored.iter().map(|(p, _)| p.user_id).collect();
                upsert_daily(&mut conn, user_id, today, &ids, &explanations)?;
            }
        }
    }

    Ok(scored
        .into_iter()
        .map(|(candidate, score)| {
            let explanation = explanations
                .get(&candidate.user_id)
                .cloned()
                .unwrap_or_else(|| FALLBACK_EXPLANATION.to_string());
            let interests = candidate.interest_codes();
            RecommendationItem {
                id: candidate.user_id,
                nickname: candidate.nickname,
                birth_year: candidate.birth_year,
                location: candidate.location,
                interests,
                bio: candidate.bio,
                image_urls: candidate.image_urls,
                score,
                explanation,
            }
        })
        .collect())
}

/// Last writer wins on (user_id, rec_date); the row is a cache, safe to
/// overwrite at any time.
fn upsert_daily(
    conn: &mut PgConnection,
    user_id: Uuid,
    today: NaiveDate,
    ids: &[Uuid],
    explanations: &HashMap<Uuid, String>,
) -> AppResult<()> {
    let stored: HashMap<Uuid, String> = ids
        .iter()
        .filter_map(|id| explanations.get(id).map(|text| (*id, text.clone())))
        .collect();

    let row = NewDailyRecommendation {
        user_id,
        rec_date: today,
        profile_ids: serde_json::to_value(ids).map_err(|e| AppError::internal(e.to_string()))?,
        explanations: serde_json::to_value(&stored).map_err(|e| AppError::internal(e.to_string()))?,
    };

    diesel::insert_into(daily_recommendations::table)
        .values(&row)
        .on_conflict((daily_recommendations::user_id, daily_recommendations::rec_date))
        .do_update()
        .set((
            daily_recommendations::profile_ids.eq(&row.profile_ids),
            daily_recommendations::explanations.eq(&row.explanations),
            daily_recommendations::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::test_profile;

    #[test]
    fn batch_is_nine_browsing_twenty_searching() {
        assert_eq!(batch_size(false), 9);
        assert_eq!(batch_size(true), 20);
    }

    #[test]
    fn stored_order_survives_reload() {
        let a = test_profile();
        let b = test_profile();
        let c = test_profile();
        let ids = vec![c.user_id, a.user_id, b.user_id];

        let ordered = order_by_stored(&ids, vec![a.clone(), b.clone(), c.clone()]);
        let got: Vec<Uuid> = ordered.iter().map(|p| p.user_id).collect();
        assert_eq!(got, ids);
    }

    #[test]
    fn vanished_profiles_drop_out_of_stored_order() {
        let a = test_profile();
        let gone = Uuid::new_v4();
        let ids = vec![gone, a.user_id];

        let ordered = order_by_stored(&ids, vec![a.clone()]);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].user_id, a.user_id);
    }

    #[test]
    fn sort_is_descending_and_stable_on_ties() {
        let mut first = test_profile();
        first.nickname = "first".into();
        let mut second = test_profile();
        second.nickname = "second".into();
        let mut top = test_profile();
        top.nickname = "top".into();

        let mut scored = vec![(first, 70), (second, 70), (top, 95)];
        sort_by_score(&mut scored);

        let order: Vec<&str> = scored.iter().map(|(p, _)| p.nickname.as_str()).collect();
        assert_eq!(order, vec!["top", "first", "second"]);
    }
}
