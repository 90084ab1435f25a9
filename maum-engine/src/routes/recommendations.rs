use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use maum_shared::errors::{AppError, AppResult};
use maum_shared::types::auth::AuthUser;
use maum_shared::types::ApiResponse;

use crate::services::candidate_pool::{DistanceTier, RecommendationFilters};
use crate::services::recommendation_service::{self, RecommendationItem};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RecommendationParams {
    #[validate(range(min = 18, max = 120))]
    pub age_min: Option<i32>,
    #[validate(range(min = 18, max = 120))]
    pub age_max: Option<i32>,
    pub location: Option<String>,
    pub distance: Option<DistanceTier>,
    /// Comma-separated interest codes, e.g. `interests=H001,H002`.
    pub interests: Option<String>,
}

impl RecommendationParams {
    fn into_filters(self) -> RecommendationFilters {
        let interests = self.interests.map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        RecommendationFilters {
            age_min: self.age_min,
            age_max: self.age_max,
            location: self.location.filter(|loc| !loc.trim().is_empty()),
            distance: self.distance,
            interests,
        }
    }
}

/// GET /recommendations?age_min=60&age_max=70&location=Seoul&interests=H001,H002
pub async fn get_recommendations(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecommendationParams>,
) -> AppResult<Json<ApiResponse<Vec<RecommendationItem>>>> {
    params
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if let (Some(min), Some(max)) = (params.age_min, params.age_max) {
        if min > max {
            return Err(AppError::Validation("age_min must not exceed age_max".into()));
        }
    }

    let filters = params.into_filters();
    let today = Utc::now().date_naive();

    let items =
        recommendation_service::get_recommendations(&state, user.id, &filters, today).await?;

    Ok(Json(ApiResponse::ok(items)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interests_param_splits_on_commas() {
        let params = RecommendationParams {
            age_min: None,
            age_max: None,
            location: None,
            distance: None,
            interests: Some("H001, H002,,H003".into()),
        };
        let filters = params.into_filters();
        assert_eq!(
            filters.interests,
            Some(vec!["H001".to_string(), "H002".to_string(), "H003".to_string()])
        );
    }

    #[test]
    fn blank_location_is_treated_as_absent() {
        let params = RecommendationParams {
            age_min: None,
            age_max: None,
            location: Some("   ".into()),
            distance: None,
            interests: None,
        };
        let filters = params.into_filters();
        assert_eq!(filters.location, None);
        assert!(!filters.is_filtering());
    }

    #[test]
    fn out_of_range_age_fails_validation() {
        let params = RecommendationParams {
            age_min: Some(10),
            age_max: None,
            location: None,
            distance: None,
            interests: None,
        };
        assert!(params.validate().is_err());
    }
}
