use chrono::{Datelike, NaiveDate};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use maum_shared::errors::AppResult;

use crate::models::Profile;
use crate::schema::{blocks, matches, profiles};

pub const MAX_POOL_SIZE: i64 = 50;

/// Distance tier requested by the client. No geocoordinates are modeled;
/// anything narrower than nationwide falls back to the requester's own
/// administrative region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceTier {
    Nationwide,
    Nearby,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationFilters {
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub location: Option<String>,
    pub distance: Option<DistanceTier>,
    pub interests: Option<Vec<String>>,
}

impl RecommendationFilters {
    /// A nationwide distance tier on its own is the default behavior and
    /// does not count as filtering.
    pub fn is_filtering(&self) -> bool {
        self.age_min.is_some()
            || self.age_max.is_some()
            || self.location.is_some()
            || self.distance == Some(DistanceTier::Nearby)
            || self.interests.as_ref().is_some_and(|codes| !codes.is_empty())
    }

    /// Explicit location wins; a nearby tier without one substitutes the
    /// requester's own region string.
    pub fn effective_location(&self, requester: &Profile) -> Option<String> {
        match (&self.location, self.distance) {
            (Some(loc), _) => Some(loc.clone()),
            (None, Some(DistanceTier::Nearby)) => Some(requester.location.clone()),
            _ => None,
        }
    }
}

/// Age filters are expressed in years lived, the column stores birth years.
/// Older age maps to a smaller birth year, so min/max swap sides.
pub fn birth_year_range(
    age_min: Option<i32>,
    age_max: Option<i32>,
    current_year: i32,
) -> (Option<i32>, Option<i32>) {
    let max_birth_year = age_min.map(|age| current_year - age);
    let min_birth_year = age_max.map(|age| current_year - age);
    (min_birth_year, max_birth_year)
}

/// `%` and `_` are LIKE wildcards; region strings must match literally.
pub fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Everyone the user already has an interaction record with (either
/// direction, any status), unioned with block partners. Blocked users
/// never re-enter the pool even without a prior like or pass.
pub fn excluded_partner_ids(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> QueryResult<Vec<Uuid>> {
    let pairs: Vec<(Uuid, Uuid)> = matches::table
        .filter(matches::sender_id.eq(user_id).or(matches::receiver_id.eq(user_id)))
        .select((matches::sender_id, matches::receiver_id))
        .load(conn)?;

    let block_pairs: Vec<(Uuid, Uuid)> = blocks::table
        .filter(blocks::blocker_id.eq(user_id).or(blocks::blocked_id.eq(user_id)))
        .select((blocks::blocker_id, blocks::blocked_id))
        .load(conn)?;

    let mut partners: Vec<Uuid> = pairs
        .into_iter()
        .chain(block_pairs)
        .map(|(a, b)| if a == user_id { b } else { a })
        .collect();
    partners.sort_unstable();
    partners.dedup();
    Ok(partners)
}

/// Single SQL query for the pool. Every filter, interest overlap
/// included, applies before the row cap so mismatched rows never consume
/// pool slots.
fn pool_query(
    requester: &Profile,
    filters: &RecommendationFilters,
    excluded: Vec<Uuid>,
    current_year: i32,
) -> profiles::BoxedQuery<'static, Pg> {
    let (min_birth_year, max_birth_year) =
        birth_year_range(filters.age_min, filters.age_max, current_year);

    let mut query = profiles::table
        .filter(profiles::user_id.ne(requester.user_id))
        .into_boxed();

    if !excluded.is_empty() {
        query = query.filter(profiles::user_id.ne_all(excluded));
    }
    if let Some(min) = min_birth_year {
        query = query.filter(profiles::birth_year.ge(min));
    }
    if let Some(max) = max_birth_year {
        query = query.filter(profiles::birth_year.le(max));
    }
    if let Some(location) = filters.effective_location(requester) {
        query = query.filter(profiles::location.like(format!("{}%", escape_like(&location))));
    }
    if let Some(wanted) = &filters.interests {
        if !wanted.is_empty() {
            // jsonb ?| : any requested code appears in the candidate's
            // interest array.
            query = query.filter(profiles::interests.has_any_key(wanted.clone()));
        }
    }

    query.limit(MAX_POOL_SIZE)
}

/// Up to [`MAX_POOL_SIZE`] eligible candidates for the requester, with
/// exclusions and filters applied. Read-only.
pub fn build_pool(
    conn: &mut PgConnection,
    requester: &Profile,
    filters: &RecommendationFilters,
    today: NaiveDate,
) -> AppResult<Vec<Profile>> {
    let excluded = excluded_partner_ids(conn, requester.user_id)?;
    let pool = pool_query(requester, filters, excluded, today.year()).load::<Profile>(conn)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::test_profile;

    #[test]
    fn age_bounds_invert_into_birth_years() {
        let (min_by, max_by) = birth_year_range(Some(60), Some(70), 2026);
        assert_eq!(min_by, Some(1956));
        assert_eq!(max_by, Some(1966));
    }

    #[test]
    fn absent_age_bounds_leave_range_open() {
        assert_eq!(birth_year_range(None, None, 2026), (None, None));
        assert_eq!(birth_year_range(Some(65), None, 2026), (None, Some(1961)));
    }

    #[test]
    fn nationwide_alone_is_not_filtering() {
        let filters = RecommendationFilters {
            distance: Some(DistanceTier::Nationwide),
            ..Default::default()
        };
        assert!(!filters.is_filtering());

        let filters = RecommendationFilters {
            distance: Some(DistanceTier::Nearby),
            ..Default::default()
        };
        assert!(filters.is_filtering());
    }

    #[test]
    fn empty_interest_list_is_not_filtering() {
        let filters = RecommendationFilters {
            interests: Some(vec![]),
            ..Default::default()
        };
        assert!(!filters.is_filtering());
    }

    #[test]
    fn nearby_without_location_uses_requester_region() {
        let mut requester = test_profile();
        requester.location = "Seoul Gangnam-gu".into();

        let filters = RecommendationFilters {
            distance: Some(DistanceTier::Nearby),
            ..Default::default()
        };
        assert_eq!(
            filters.effective_location(&requester),
            Some("Seoul Gangnam-gu".to_string())
        );

        let filters = RecommendationFilters {
            location: Some("Busan".into()),
            distance: Some(DistanceTier::Nearby),
            ..Default::default()
        };
        assert_eq!(filters.effective_location(&requester), Some("Busan".to_string()));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("Seoul_Gangnam%"), "Seoul\\_Gangnam\\%");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("Busan"), "Busan");
    }

    #[test]
    fn interest_overlap_is_part_of_the_query() {
        // The overlap filter must apply before the row cap, so it belongs
        // in the SQL, not a post-load pass.
        let requester = test_profile();
        let filters = RecommendationFilters {
            interests: Some(vec!["H001".to_string(), "H002".to_string()]),
            ..Default::default()
        };
        let sql =
            diesel::debug_query::<Pg, _>(&pool_query(&requester, &filters, vec![], 2026))
                .to_string();
        assert!(sql.contains("?|"), "{sql}");
        assert!(sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn location_pattern_is_escaped_in_the_query() {
        let requester = test_profile();
        let filters = RecommendationFilters {
            location: Some("Seoul_50%".to_string()),
            ..Default::default()
        };
        let sql =
            diesel::debug_query::<Pg, _>(&pool_query(&requester, &filters, vec![], 2026))
                .to_string();
        assert!(sql.contains("LIKE"), "{sql}");
        // Binds are Debug-formatted, so each escape backslash shows doubled.
        assert!(sql.contains(r"Seoul\\_50\\%%"), "{sql}");
    }

    #[test]
    fn exclusions_render_into_the_query() {
        let requester = test_profile();
        let partner = Uuid::new_v4();
        let sql = diesel::debug_query::<Pg, _>(&pool_query(
            &requester,
            &RecommendationFilters::default(),
            vec![partner],
            2026,
        ))
        .to_string();
        assert!(sql.contains("!= ALL"), "{sql}");
        assert!(sql.contains(&partner.to_string()), "{sql}");
    }
}
