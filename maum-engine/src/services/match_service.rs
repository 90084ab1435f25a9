use chrono::{DateTime, NaiveDate, Utc};
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Bool;
use serde::Serialize;
use uuid::Uuid;

use maum_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Block, Match, MatchStatus, NewBlock, NewMatch, NewReport, Report};
use crate::schema::{blocks, matches, reports};
use crate::services::notification_service;

#[derive(Debug, Serialize)]
pub struct LikeOutcome {
    pub is_match: bool,
    pub match_id: Option<Uuid>,
    pub message: String,
}

/// Branch taken by a like, decided from the records read up front. Pure,
/// so the whole transition table is testable without a database.
#[derive(Debug)]
pub enum LikeDecision<'a> {
    /// A forward record already exists in some status. Second actions on
    /// the same ordered pair are no-ops, never overwrites. Rows cancelled
    /// by an earlier block land here too: the unique constraint still
    /// covers them, so a fresh like reports the existing record.
    AlreadyInteracted(&'a Match),
    /// The receiver already likes the sender: flip their PENDING row to
    /// ACCEPTED instead of materializing a second row.
    PromoteReverse(&'a Match),
    QuotaExceeded,
    CreatePending,
}

pub fn decide_like<'a>(
    existing_forward: Option<&'a Match>,
    reverse: Option<&'a Match>,
    likes_sent_today: i64,
    daily_limit: i64,
) -> LikeDecision<'a> {
    if let Some(existing) = existing_forward {
        return LikeDecision::AlreadyInteracted(existing);
    }
    if let Some(reverse) = reverse {
        if reverse.status() == Some(MatchStatus::Pending) {
            return LikeDecision::PromoteReverse(reverse);
        }
    }
    if likes_sent_today >= daily_limit {
        return LikeDecision::QuotaExceeded;
    }
    LikeDecision::CreatePending
}

/// [start, end) of the calendar day the quota window covers.
pub fn day_bounds(today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = today.and_hms_opt(0, 0, 0).expect("midnight is a valid time").and_utc();
    (start, start + chrono::Duration::days(1))
}

fn find_forward(conn: &mut PgConnection, sender: Uuid, receiver: Uuid) -> QueryResult<Option<Match>> {
    matches::table
        .filter(matches::sender_id.eq(sender))
        .filter(matches::receiver_id.eq(receiver))
        .first::<Match>(conn)
        .optional()
}

fn count_likes_sent_today(conn: &mut PgConnection, sender: Uuid, today: NaiveDate) -> QueryResult<i64> {
    let (start, end) = day_bounds(today);
    matches::table
        .filter(matches::sender_id.eq(sender))
        .filter(matches::created_at.ge(start))
        .filter(matches::created_at.lt(end))
        .filter(matches::status.eq_any([
            MatchStatus::Pending.as_str(),
            MatchStatus::Accepted.as_str(),
        ]))
        .count()
        .get_result(conn)
}

fn already_interacted_outcome(existing: &Match) -> LikeOutcome {
    LikeOutcome {
        is_match: existing.status() == Some(MatchStatus::Accepted),
        match_id: Some(existing.id),
        message: format!("already interacted ({})", existing.status),
    }
}

/// Like a user. Idempotent per ordered pair; detects reciprocal likes and
/// promotes them to a mutual match; enforces the daily quota.
///
/// The quota count-then-insert is best effort: the unique constraint on
/// (sender_id, receiver_id) is the correctness backstop under races, a
/// quota overshoot by one is acceptable.
pub fn like(
    conn: &mut PgConnection,
    sender: Uuid,
    receiver: Uuid,
    today: NaiveDate,
    daily_limit: i64,
) -> AppResult<LikeOutcome> {
    if sender == receiver {
        return Err(AppError::new(ErrorCode::CannotLikeSelf, "cannot like yourself"));
    }

    let existing_forward = find_forward(conn, sender, receiver)?;

    let reverse_pending = matches::table
        .filter(matches::sender_id.eq(receiver))
        .filter(matches::receiver_id.eq(sender))
        .filter(matches::status.eq(MatchStatus::Pending.as_str()))
        .first::<Match>(conn)
        .optional()?;

    let likes_sent_today = count_likes_sent_today(conn, sender, today)?;

    let decision = decide_like(
        existing_forward.as_ref(),
        reverse_pending.as_ref(),
        likes_sent_today,
        daily_limit,
    );

    match decision {
        LikeDecision::AlreadyInteracted(existing) => {
            tracing::debug!(match_id = %existing.id, "like is a repeat action, returning existing record");
            Ok(already_interacted_outcome(existing))
        }
        LikeDecision::PromoteReverse(reverse) => match promote_to_mutual(conn, reverse)? {
            Some(match_id) => Ok(LikeOutcome {
                is_match: true,
                match_id: Some(match_id),
                message: "it's a match".to_string(),
            }),
            // The reverse row stopped being PENDING between the read and
            // the flip (a concurrent block or leave won). Nothing was
            // committed; report the pair's current record instead.
            None => {
                let current = matches::table.find(reverse.id).first::<Match>(conn)?;
                Ok(already_interacted_outcome(&current))
            }
        },
        LikeDecision::QuotaExceeded => Err(AppError::new(
            ErrorCode::DailyLikeLimitExceeded,
            format!("daily like limit of {daily_limit} reached"),
        )),
        LikeDecision::CreatePending => {
            let inserted = diesel::insert_into(matches::table)
                .values(NewMatch {
                    sender_id: sender,
                    receiver_id: receiver,
                    status: MatchStatus::Pending.as_str().to_string(),
                })
                .get_result::<Match>(conn);

            let record = match inserted {
                Ok(record) => record,
                // Lost a race against an identical request: report the row
                // that won instead of erroring.
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    let existing = find_forward(conn, sender, receiver)?.ok_or_else(|| {
                        AppError::internal("unique violation without a visible forward record")
                    })?;
                    return Ok(already_interacted_outcome(&existing));
                }
                Err(e) => return Err(e.into()),
            };

            notification_service::notify_best_effort(
                conn,
                receiver,
                notification_service::TYPE_LIKE_RECEIVED,
                "Someone likes you",
                "A new like arrived. Check your recommendations!",
                Some(serde_json::json!({ "match_id": record.id })),
            );

            Ok(LikeOutcome {
                is_match: false,
                match_id: Some(record.id),
                message: "like sent".to_string(),
            })
        }
    }
}

type PendingRowFilter = dsl::Filter<
    dsl::Filter<matches::table, dsl::Eq<matches::id, Uuid>>,
    dsl::Eq<matches::status, &'static str>,
>;

/// Update target for the reciprocal flip. The status guard makes the
/// update match nothing if the row stopped being PENDING after it was
/// read, instead of resurrecting a cancelled record.
fn pending_row(id: Uuid) -> PendingRowFilter {
    matches::table
        .filter(matches::id.eq(id))
        .filter(matches::status.eq(MatchStatus::Pending.as_str()))
}

/// Flip the reverse PENDING row to ACCEPTED and write both participants'
/// notifications as one atomic unit. A notification without the flip (or
/// the reverse) must never be observable. Returns `None` when the row
/// changed concurrently; nothing is committed in that case.
fn promote_to_mutual(conn: &mut PgConnection, reverse: &Match) -> AppResult<Option<Uuid>> {
    let flipped = conn.transaction::<Option<Uuid>, DieselError, _>(|conn| {
        let updated = diesel::update(pending_row(reverse.id))
            .set((
                matches::status.eq(MatchStatus::Accepted.as_str()),
                matches::updated_at.eq(Utc::now()),
            ))
            .get_result::<Match>(conn)
            .optional()?;

        let updated = match updated {
            Some(updated) => updated,
            None => return Ok(None),
        };

        let data = serde_json::json!({ "match_id": updated.id });
        for user_id in [updated.sender_id, updated.receiver_id] {
            notification_service::create_notification(
                conn,
                user_id,
                notification_service::TYPE_MATCH_CREATED,
                "It's a match!",
                "You both liked each other. Start a conversation!",
                Some(data.clone()),
            )?;
        }

        Ok(Some(updated.id))
    })?;

    match flipped {
        Some(match_id) => tracing::info!(match_id = %match_id, "mutual match created"),
        None => tracing::debug!(match_id = %reverse.id, "reverse record changed mid-flip"),
    }
    Ok(flipped)
}

/// Pass on a user. Quota-exempt, no reciprocity check; the record only
/// keeps the pair out of future candidate pools. Repeat passes are no-ops.
pub fn pass(conn: &mut PgConnection, sender: Uuid, receiver: Uuid) -> AppResult<()> {
    if sender == receiver {
        return Err(AppError::new(ErrorCode::CannotLikeSelf, "cannot pass on yourself"));
    }

    let inserted = diesel::insert_into(matches::table)
        .values(NewMatch {
            sender_id: sender,
            receiver_id: receiver,
            status: MatchStatus::Rejected.as_str().to_string(),
        })
        .execute(conn);

    match inserted {
        Ok(_) => Ok(()),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Both directions of the unordered (a, b) pair on the matches table.
fn between_pair(a: Uuid, b: Uuid) -> Box<dyn BoxableExpression<matches::table, Pg, SqlType = Bool>> {
    Box::new(
        matches::sender_id.eq(a).and(matches::receiver_id.eq(b))
            .or(matches::sender_id.eq(b).and(matches::receiver_id.eq(a))),
    )
}

/// Block a user: idempotently record the pair, then cancel every match
/// record between the two in either direction.
pub fn block(conn: &mut PgConnection, blocker: Uuid, blocked: Uuid) -> AppResult<()> {
    if blocker == blocked {
        return Err(AppError::new(ErrorCode::CannotBlockSelf, "cannot block yourself"));
    }

    let existing = blocks::table
        .filter(
            blocks::blocker_id.eq(blocker).and(blocks::blocked_id.eq(blocked))
                .or(blocks::blocker_id.eq(blocked).and(blocks::blocked_id.eq(blocker))),
        )
        .first::<Block>(conn)
        .optional()?;

    if existing.is_none() {
        diesel::insert_into(blocks::table)
            .values(NewBlock { blocker_id: blocker, blocked_id: blocked })
            .execute(conn)?;
    }

    let cancelled = diesel::update(matches::table.filter(between_pair(blocker, blocked)))
        .set((
            matches::status.eq(MatchStatus::Cancelled.as_str()),
            matches::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;

    tracing::info!(blocker = %blocker, blocked = %blocked, cancelled, "block applied");
    Ok(())
}

/// What leave does to a record in a given status. REJECTED and CANCELLED
/// are terminal; leaving an already-cancelled match is a no-op rather
/// than an error, a REJECTED row is not a match to leave at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveDecision {
    Cancel,
    AlreadyCancelled,
    Refuse,
}

pub fn decide_leave(status: Option<MatchStatus>) -> LeaveDecision {
    match status {
        Some(MatchStatus::Pending | MatchStatus::Accepted) => LeaveDecision::Cancel,
        Some(MatchStatus::Cancelled) => LeaveDecision::AlreadyCancelled,
        Some(MatchStatus::Rejected) | None => LeaveDecision::Refuse,
    }
}

/// Leave a match. Only a participant may cancel the record, and only a
/// PENDING or ACCEPTED record can be cancelled.
pub fn leave(conn: &mut PgConnection, user: Uuid, match_id: Uuid) -> AppResult<Match> {
    let record = matches::table
        .find(match_id)
        .first::<Match>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::MatchNotFound, "match not found"))?;

    if !record.involves(user) {
        return Err(AppError::new(
            ErrorCode::NotMatchParticipant,
            "only a participant can leave a match",
        ));
    }

    match decide_leave(record.status()) {
        LeaveDecision::AlreadyCancelled => Ok(record),
        LeaveDecision::Refuse => Err(AppError::bad_request("only an active match can be left")),
        LeaveDecision::Cancel => {
            let updated = diesel::update(
                matches::table.filter(matches::id.eq(match_id)).filter(
                    matches::status.eq_any([
                        MatchStatus::Pending.as_str(),
                        MatchStatus::Accepted.as_str(),
                    ]),
                ),
            )
            .set((
                matches::status.eq(MatchStatus::Cancelled.as_str()),
                matches::updated_at.eq(Utc::now()),
            ))
            .get_result::<Match>(conn)
            .optional()?;

            match updated {
                Some(updated) => Ok(updated),
                // A concurrent block got there first; the row is already
                // cancelled, which is what the caller wanted.
                None => Ok(matches::table.find(match_id).first::<Match>(conn)?),
            }
        }
    }
}

/// Append-only audit record. Never transitions any match state.
pub fn report(
    conn: &mut PgConnection,
    reporter: Uuid,
    target: Uuid,
    reason: String,
) -> AppResult<Report> {
    if reporter == target {
        return Err(AppError::new(ErrorCode::CannotReportSelf, "cannot report yourself"));
    }

    let created = diesel::insert_into(reports::table)
        .values(NewReport { reporter_id: reporter, target_id: target, reason })
        .get_result::<Report>(conn)?;

    Ok(created)
}

/// Mutual matches involving the user, newest first.
pub fn list_accepted(
    conn: &mut PgConnection,
    user: Uuid,
    limit: i64,
    offset: i64,
) -> QueryResult<(Vec<Match>, i64)> {
    let involving = matches::sender_id.eq(user).or(matches::receiver_id.eq(user));

    let total: i64 = matches::table
        .filter(involving)
        .filter(matches::status.eq(MatchStatus::Accepted.as_str()))
        .count()
        .get_result(conn)?;

    let items = matches::table
        .filter(involving)
        .filter(matches::status.eq(MatchStatus::Accepted.as_str()))
        .order(matches::updated_at.desc())
        .limit(limit)
        .offset(offset)
        .load::<Match>(conn)?;

    Ok((items, total))
}

/// Pending likes the user has received and not answered yet.
pub fn list_received_pending(
    conn: &mut PgConnection,
    user: Uuid,
    limit: i64,
    offset: i64,
) -> QueryResult<(Vec<Match>, i64)> {
    let total: i64 = matches::table
        .filter(matches::receiver_id.eq(user))
        .filter(matches::status.eq(MatchStatus::Pending.as_str()))
        .count()
        .get_result(conn)?;

    let items = matches::table
        .filter(matches::receiver_id.eq(user))
        .filter(matches::status.eq(MatchStatus::Pending.as_str()))
        .order(matches::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load::<Match>(conn)?;

    Ok((items, total))
}

/// Which of `candidate_ids` the user already acted on as sender. Used by
/// the recommendation path as a second-pass safety filter.
pub fn acted_on_receivers(
    conn: &mut PgConnection,
    sender: Uuid,
    candidate_ids: &[Uuid],
) -> QueryResult<Vec<Uuid>> {
    if candidate_ids.is_empty() {
        return Ok(vec![]);
    }

    matches::table
        .filter(matches::sender_id.eq(sender))
        .filter(matches::receiver_id.eq_any(candidate_ids))
        .select(matches::receiver_id)
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: i64 = 3;

    fn record(status: MatchStatus) -> Match {
        Match {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            status: status.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn repeat_like_is_a_noop_in_every_status() {
        for status in [
            MatchStatus::Pending,
            MatchStatus::Accepted,
            MatchStatus::Rejected,
            MatchStatus::Cancelled,
        ] {
            let existing = record(status);
            let decision = decide_like(Some(&existing), None, 0, LIMIT);
            assert!(
                matches!(decision, LikeDecision::AlreadyInteracted(m) if m.id == existing.id),
                "status {status:?} must report the existing record"
            );
        }
    }

    #[test]
    fn cancelled_forward_record_still_wins_over_reverse_pending() {
        // A pair that was blocked apart keeps its row; a later like reports
        // the existing record rather than creating or promoting anything.
        let cancelled = record(MatchStatus::Cancelled);
        let reverse = record(MatchStatus::Pending);
        let decision = decide_like(Some(&cancelled), Some(&reverse), 0, LIMIT);
        assert!(matches!(decision, LikeDecision::AlreadyInteracted(m) if m.id == cancelled.id));
    }

    #[test]
    fn reverse_pending_promotes_even_at_quota() {
        // Reciprocity wins before the quota is consulted: the flip consumes
        // no new outgoing like.
        let reverse = record(MatchStatus::Pending);
        let decision = decide_like(None, Some(&reverse), LIMIT, LIMIT);
        assert!(matches!(decision, LikeDecision::PromoteReverse(m) if m.id == reverse.id));
    }

    #[test]
    fn non_pending_reverse_does_not_promote() {
        // Their pass or an old cancelled row is not an invitation; the like
        // creates a fresh forward PENDING instead.
        let reverse = record(MatchStatus::Rejected);
        let decision = decide_like(None, Some(&reverse), 0, LIMIT);
        assert!(matches!(decision, LikeDecision::CreatePending));
    }

    #[test]
    fn quota_blocks_the_fourth_like() {
        assert!(matches!(decide_like(None, None, 2, LIMIT), LikeDecision::CreatePending));
        assert!(matches!(decide_like(None, None, 3, LIMIT), LikeDecision::QuotaExceeded));
        assert!(matches!(decide_like(None, None, 4, LIMIT), LikeDecision::QuotaExceeded));
    }

    #[test]
    fn day_bounds_cover_exactly_one_day() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        let (start, end) = day_bounds(today);
        assert_eq!(start.to_rfc3339(), "2026-08-30T00:00:00+00:00");
        assert_eq!(end - start, chrono::Duration::days(1));
    }

    #[test]
    fn mutual_flip_only_targets_a_still_pending_row() {
        // The flip must not resurrect a row a concurrent block or leave
        // just cancelled: the update carries the PENDING guard.
        let reverse = record(MatchStatus::Pending);
        let query = diesel::update(pending_row(reverse.id))
            .set(matches::status.eq(MatchStatus::Accepted.as_str()));
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("WHERE"), "flip update must be filtered: {sql}");
        assert!(sql.contains("PENDING"), "guard value missing from binds: {sql}");
        assert!(sql.contains(&reverse.id.to_string()));
    }

    #[test]
    fn losing_the_flip_race_reports_the_current_record() {
        // When the guarded update matches nothing, the caller re-reads the
        // row and reports it as-is instead of claiming a match.
        let cancelled = record(MatchStatus::Cancelled);
        let outcome = already_interacted_outcome(&cancelled);
        assert!(!outcome.is_match);
        assert_eq!(outcome.match_id, Some(cancelled.id));
        assert!(outcome.message.contains("CANCELLED"));
    }

    #[test]
    fn block_cancel_covers_both_directions_of_the_pair() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let query = diesel::update(matches::table.filter(between_pair(a, b)))
            .set(matches::status.eq(MatchStatus::Cancelled.as_str()));
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        // Each id binds once as sender and once as receiver.
        assert_eq!(sql.matches(&a.to_string()).count(), 2, "{sql}");
        assert_eq!(sql.matches(&b.to_string()).count(), 2, "{sql}");
        assert!(sql.contains(" OR "), "{sql}");
    }

    #[test]
    fn leave_transitions_only_active_records() {
        assert_eq!(decide_leave(Some(MatchStatus::Pending)), LeaveDecision::Cancel);
        assert_eq!(decide_leave(Some(MatchStatus::Accepted)), LeaveDecision::Cancel);
        assert_eq!(decide_leave(Some(MatchStatus::Cancelled)), LeaveDecision::AlreadyCancelled);
        assert_eq!(decide_leave(Some(MatchStatus::Rejected)), LeaveDecision::Refuse);
        assert_eq!(decide_leave(None), LeaveDecision::Refuse);
    }
}
