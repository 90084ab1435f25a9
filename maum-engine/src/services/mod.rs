pub mod candidate_pool;
pub mod explainer;
pub mod match_service;
pub mod notification_service;
pub mod recommendation_service;
pub mod scoring;
