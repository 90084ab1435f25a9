use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{NewNotification, Notification};
use crate::schema::notifications;

pub const TYPE_LIKE_RECEIVED: &str = "like_received";
pub const TYPE_MATCH_CREATED: &str = "match_created";

/// Insert a notification row. Runs on the caller's connection so it can
/// join the reciprocal-flip transaction.
pub fn create_notification(
    conn: &mut PgConnection,
    user_id: Uuid,
    notification_type: &str,
    title: &str,
    body: &str,
    data: Option<serde_json::Value>,
) -> QueryResult<Notification> {
    let new_notification = NewNotification {
        user_id,
        notification_type: notification_type.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        data,
    };

    let notification = diesel::insert_into(notifications::table)
        .values(&new_notification)
        .get_result::<Notification>(conn)?;

    tracing::debug!(
        notification_id = %notification.id,
        user_id = %user_id,
        notification_type = %notification_type,
        "notification created"
    );

    Ok(notification)
}

/// Fire-and-forget variant for the non-transactional paths. A failed
/// notification never fails the action that triggered it.
pub fn notify_best_effort(
    conn: &mut PgConnection,
    user_id: Uuid,
    notification_type: &str,
    title: &str,
    body: &str,
    data: Option<serde_json::Value>,
) {
    if let Err(e) = create_notification(conn, user_id, notification_type, title, body, data) {
        tracing::warn!(error = %e, user_id = %user_id, "failed to deliver notification");
    }
}

/// List notifications for a user with pagination, newest first.
pub fn list_notifications(
    conn: &mut PgConnection,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> QueryResult<(Vec<Notification>, i64)> {
    let total: i64 = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .count()
        .get_result(conn)?;

    let items = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order(notifications::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load::<Notification>(conn)?;

    Ok((items, total))
}

/// Mark all unread notifications as read for a user.
pub fn mark_all_read(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<usize> {
    diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(conn)
}
