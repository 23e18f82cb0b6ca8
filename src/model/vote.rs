//! Up and down votes on posts and comments.
//!
//! A user holds at most one vote per post and per comment. Sending the value you already voted is a
//! no-op, sending 0 takes the vote back.

use super::core::{Post, PostWithComments};
use super::util::{FormError, ServiceError};
use anyhow::Ok as AnyOk;
use log::debug;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct VotePayload {
    /// The identifier of the post.
    pub identifier: String,
    pub slug: String,

    /// Set when the vote targets a comment of the post.
    #[oai(skip_serializing_if_is_none)]
    #[serde(default)]
    pub comment_identifier: Option<String>,

    /// 1 for an up vote, -1 for a down vote, 0 to take the vote back.
    pub value: i64,
}

impl VotePayload {
    /// The requested vote, once it is known to be -1, 0 or 1.
    pub fn check(&self) -> Result<i16, FormError> {
        match self.value {
            -1..=1 => Ok(self.value as i16),
            _ => Err(FormError::single("value", "The value must be -1, 0 or 1.")),
        }
    }
}

/// What to do with the stored vote, given the vote in the database and the requested value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    /// Nothing to take back.
    Missing,
    Insert(i16),
    Update(i16),
    Delete,
    Keep,
}

impl VoteAction {
    pub fn decide(existing: Option<i16>, requested: i16) -> VoteAction {
        match (existing, requested) {
            (None, 0) => VoteAction::Missing,
            (None, v) => VoteAction::Insert(v),
            (Some(_), 0) => VoteAction::Delete,
            (Some(old), v) if old == v => VoteAction::Keep,
            (Some(_), v) => VoteAction::Update(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Post(i64),
    Comment(i64),
}

impl VoteTarget {
    fn column(&self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "post_id",
            VoteTarget::Comment(_) => "comment_id",
        }
    }

    fn id(&self) -> i64 {
        match self {
            VoteTarget::Post(id) | VoteTarget::Comment(id) => *id,
        }
    }
}

async fn resolve_target(
    pool: &sqlx::PgPool,
    payload: &VotePayload,
) -> Result<VoteTarget, anyhow::Error> {
    let (post_id, _) = Post::get_id(pool, &payload.identifier, &payload.slug).await?;

    match &payload.comment_identifier {
        None => AnyOk(VoteTarget::Post(post_id)),
        Some(comment_identifier) => {
            let comment = sqlx::query_as::<_, (i64,)>(
                "SELECT id FROM preddit_comment WHERE identifier = $1 AND post_id = $2",
            )
            .bind(comment_identifier)
            .bind(post_id)
            .fetch_optional(pool)
            .await?;

            match comment {
                Some((id,)) => AnyOk(VoteTarget::Comment(id)),
                None => Err(ServiceError::not_found("Comment")),
            }
        }
    }
}

/// Apply a vote and return the post with its comments as the voter now sees them.
pub async fn cast_vote(
    pool: &sqlx::PgPool,
    username: &str,
    payload: &VotePayload,
) -> Result<PostWithComments, anyhow::Error> {
    let requested = payload.check()?;
    let target = resolve_target(pool, payload).await?;

    let mut tx = pool.begin().await?;
    let existing = sqlx::query_as::<_, (i64, i16)>(&format!(
        "SELECT id, value FROM preddit_vote WHERE username = $1 AND {} = $2 FOR UPDATE",
        target.column()
    ))
    .bind(username)
    .bind(target.id())
    .fetch_optional(&mut tx)
    .await?;

    let action = VoteAction::decide(existing.map(|v| v.1), requested);
    debug!("Vote by {} on {:?}: {:?}", username, target, action);

    match (action, existing) {
        (VoteAction::Missing, _) => {
            tx.rollback().await?;
            return Err(ServiceError::not_found("Vote"));
        }
        (VoteAction::Insert(value), _) => {
            sqlx::query(&format!(
                "INSERT INTO preddit_vote (value, username, {}) VALUES ($1, $2, $3)",
                target.column()
            ))
            .bind(value)
            .bind(username)
            .bind(target.id())
            .execute(&mut tx)
            .await?;
        }
        (VoteAction::Update(value), Some((id, _))) => {
            sqlx::query("UPDATE preddit_vote SET value = $1, updated_at = now() WHERE id = $2")
                .bind(value)
                .bind(id)
                .execute(&mut tx)
                .await?;
        }
        (VoteAction::Delete, Some((id, _))) => {
            sqlx::query("DELETE FROM preddit_vote WHERE id = $1")
                .bind(id)
                .execute(&mut tx)
                .await?;
        }
        _ => {}
    }
    tx.commit().await?;

    Post::get_with_comments(pool, &payload.identifier, &payload.slug, Some(username)).await
}

/// Sum of vote values and the given user's own vote. Mirrors the aggregation done in SQL.
pub fn tally(votes: &[(String, i16)], username: Option<&str>) -> (i64, i32) {
    let score = votes.iter().map(|(_, v)| *v as i64).sum();
    let user_vote = match username {
        Some(username) => votes
            .iter()
            .find(|(u, _)| u == username)
            .map_or(0, |(_, v)| *v as i32),
        None => 0,
    };
    (score, user_vote)
}
