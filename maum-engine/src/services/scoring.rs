use crate::models::Profile;

// -- Compatibility weights --
// Rule-based on purpose: selection is already randomized upstream, the
// score only orders the picks presented to the user.
const BASE_SCORE: i32 = 50;
const POINTS_PER_SHARED_INTEREST: i32 = 10;
const MAX_INTEREST_POINTS: i32 = 30;
const SAME_LOCATION_POINTS: i32 = 15;
const CLOSE_AGE_POINTS: i32 = 5;
const CLOSE_AGE_YEARS: i32 = 10;
const MAX_SCORE: i32 = 100;

/// Compatibility score between two profiles, in [0, 100].
///
/// Deterministic given its inputs; reads nothing but the two profiles.
pub fn score(requester: &Profile, candidate: &Profile) -> i32 {
    let mut total = BASE_SCORE;

    let requester_interests = requester.interest_codes();
    let shared = candidate
        .interest_codes()
        .iter()
        .filter(|code| requester_interests.contains(code))
        .count() as i32;
    total += (shared * POINTS_PER_SHARED_INTEREST).min(MAX_INTEREST_POINTS);

    if requester.location == candidate.location {
        total += SAME_LOCATION_POINTS;
    }

    if (requester.birth_year - candidate.birth_year).abs() <= CLOSE_AGE_YEARS {
        total += CLOSE_AGE_POINTS;
    }

    total.min(MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::test_profile;

    fn profile(interests: &[&str], location: &str, birth_year: i32) -> Profile {
        let mut p = test_profile();
        p.interests = serde_json::json!(interests);
        p.location = location.to_string();
        p.birth_year = birth_year;
        p
    }

    #[test]
    fn no_overlap_scores_base_only() {
        let a = profile(&["H001"], "Seoul Gangnam-gu", 1960);
        let b = profile(&["H009"], "Busan Haeundae-gu", 1940);
        assert_eq!(score(&a, &b), 50);
    }

    #[test]
    fn two_shared_interests_same_region_close_age_scores_90() {
        let a = profile(&["H001", "H002", "H003"], "Seoul Gangnam-gu", 1960);
        let b = profile(&["H001", "H002"], "Seoul Gangnam-gu", 1958);
        assert_eq!(score(&a, &b), 90);
    }

    #[test]
    fn perfect_overlap_caps_at_exactly_100() {
        let a = profile(&["H001", "H002", "H003"], "Seoul Gangnam-gu", 1960);
        let b = profile(&["H001", "H002", "H003"], "Seoul Gangnam-gu", 1960);
        assert_eq!(score(&a, &b), 100);
    }

    #[test]
    fn interest_points_cap_at_three_shared() {
        let a = profile(&["H001", "H002", "H003", "H004", "H005"], "Seoul", 1960);
        let b = profile(&["H001", "H002", "H003", "H004", "H005"], "Busan", 1930);
        // 50 + 30 (capped), no location or age bonus
        assert_eq!(score(&a, &b), 80);
    }

    #[test]
    fn age_bonus_boundary_is_ten_years() {
        let a = profile(&[], "Seoul", 1960);
        let at_boundary = profile(&[], "Busan", 1970);
        let past_boundary = profile(&[], "Busan", 1971);
        assert_eq!(score(&a, &at_boundary), 55);
        assert_eq!(score(&a, &past_boundary), 50);
    }

    #[test]
    fn score_is_symmetric_for_these_terms() {
        let a = profile(&["H001", "H002"], "Seoul Gangnam-gu", 1955);
        let b = profile(&["H002", "H003"], "Seoul Gangnam-gu", 1962);
        assert_eq!(score(&a, &b), score(&b, &a));
    }
}
