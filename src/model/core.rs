//! The database schema for the application. These are the models that will be used to interact with the database.
//!
//! Vote scores, user votes and comment counts are never stored, they are aggregated by the select statements below.

use super::password::{hash_password, verify_password, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use super::util::{
    app_url, field_errors, image_url, make_id, slugify, FieldErrors, FormError, ServiceError,
    COMMENT_IDENTIFIER_LENGTH, DEFAULT_AVATAR_URL, POST_IDENTIFIER_LENGTH,
};
use anyhow::Ok as AnyOk;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use poem_openapi::{Object, Union};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: u64 = 8;
pub const MAX_PAGE_SIZE: u64 = 50;
pub const TOP_SUBS_LIMIT: i64 = 5;
pub const SUB_NAME_MAX_LENGTH: u64 = 64;
pub const TITLE_MAX_LENGTH: u64 = 255;
pub const USERNAME_MIN_LENGTH: u64 = 3;
pub const USERNAME_MAX_LENGTH: u64 = 32;
const PASSWORD_MIN_LENGTH: u64 = MIN_PASSWORD_LENGTH as u64;
const PASSWORD_MAX_LENGTH: u64 = MAX_PASSWORD_LENGTH as u64;

// Random identifiers may collide with an existing (identifier, slug) pair.
const MAX_INSERT_ATTEMPTS: usize = 3;
const UNIQUE_VIOLATION: &str = "23505";

lazy_static! {
    pub static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    pub static ref SUB_NAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(e) => e.code().map_or(false, |c| c == UNIQUE_VIOLATION),
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,

    // Never leaves the server.
    #[serde(skip)]
    #[oai(skip)]
    pub password: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The public part of a user, shown on profile pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct RegisterPayload {
    #[validate(email(message = "The email address is invalid."))]
    pub email: String,

    #[validate(length(
        min = "USERNAME_MIN_LENGTH",
        max = "USERNAME_MAX_LENGTH",
        message = "The username must be between 3 and 32 characters."
    ))]
    #[validate(regex(
        path = "USERNAME_REGEX",
        message = "The username may only contain letters, digits and underscores."
    ))]
    pub username: String,

    #[validate(length(
        min = "PASSWORD_MIN_LENGTH",
        max = "PASSWORD_MAX_LENGTH",
        message = "The password must be between 6 and 512 characters."
    ))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

impl LoginPayload {
    pub fn check_not_empty(&self) -> Result<(), FormError> {
        let mut errors = FieldErrors::new();
        if self.username.trim().is_empty() {
            errors.insert(
                "username".to_string(),
                "The username cannot be empty.".to_string(),
            );
        }
        if self.password.is_empty() {
            errors.insert(
                "password".to_string(),
                "The password cannot be empty.".to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FormError::new(errors))
        }
    }
}

/// Why a login attempt failed.
#[derive(Debug, PartialEq)]
pub enum LoginFailure {
    UnknownUser,
    WrongPassword,
}

impl User {
    pub async fn get_by_username(
        pool: &sqlx::PgPool,
        username: &str,
    ) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM preddit_user WHERE username = $1")
            .bind(username)
            .fetch_optional(pool)
            .await?;

        AnyOk(user)
    }

    pub async fn get_summary(
        pool: &sqlx::PgPool,
        username: &str,
    ) -> Result<UserSummary, anyhow::Error> {
        let summary = sqlx::query_as::<_, UserSummary>(
            "SELECT username, created_at FROM preddit_user WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        match summary {
            Some(summary) => AnyOk(summary),
            None => Err(ServiceError::not_found("User")),
        }
    }

    /// Validate the payload, check that the email and username are free and store the new user.
    pub async fn register(
        pool: &sqlx::PgPool,
        payload: &RegisterPayload,
    ) -> Result<User, anyhow::Error> {
        let mut errors = match payload.validate() {
            Ok(_) => FieldErrors::new(),
            Err(e) => field_errors(&e),
        };

        let email_taken = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM preddit_user WHERE lower(email) = lower($1)",
        )
        .bind(&payload.email)
        .fetch_one(pool)
        .await?;
        if email_taken.0 > 0 {
            errors.insert(
                "email".to_string(),
                "This email address is already in use.".to_string(),
            );
        }

        let username_taken =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM preddit_user WHERE username = $1")
                .bind(&payload.username)
                .fetch_one(pool)
                .await?;
        if username_taken.0 > 0 {
            errors.insert(
                "username".to_string(),
                "This username is already in use.".to_string(),
            );
        }

        if !errors.is_empty() {
            debug!("Registration rejected: {:?}", errors);
            return Err(anyhow::Error::new(FormError::new(errors)));
        }

        let password_hash = hash_password(&payload.password)?;
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO preddit_user (email, username, password) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&payload.email)
        .bind(&payload.username)
        .bind(&password_hash)
        .fetch_one(pool)
        .await;

        match result {
            Ok(user) => {
                info!("New user registered: {}", user.username);
                AnyOk(user)
            }
            // Lost a race with a concurrent registration.
            Err(e) if is_unique_violation(&e) => Err(anyhow::Error::new(FormError::single(
                "username",
                "This username or email address is already in use.",
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn login(
        pool: &sqlx::PgPool,
        payload: &LoginPayload,
    ) -> Result<Result<User, LoginFailure>, anyhow::Error> {
        let user = match User::get_by_username(pool, payload.username.trim()).await? {
            Some(user) => user,
            None => return AnyOk(Err(LoginFailure::UnknownUser)),
        };

        if verify_password(&payload.password, &user.password)? {
            AnyOk(Ok(user))
        } else {
            warn!("Wrong password for user {}", user.username);
            AnyOk(Err(LoginFailure::WrongPassword))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct Sub {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub image_urn: Option<String>,
    pub banner_urn: Option<String>,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[sqlx(default)]
    pub image_url: String,

    #[sqlx(default)]
    #[oai(skip_serializing_if_is_none)]
    pub banner_url: Option<String>,
}

/// A sub together with its posts, as shown on the sub page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct SubDetail {
    #[serde(flatten)]
    #[oai(flatten)]
    pub sub: Sub,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct TopSub {
    pub title: String,
    pub name: String,

    #[serde(skip)]
    #[oai(skip)]
    pub image_urn: Option<String>,

    #[sqlx(default)]
    pub image_url: String,

    pub post_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct CreateSubPayload {
    #[validate(length(
        min = 1,
        max = "SUB_NAME_MAX_LENGTH",
        message = "The name must be between 1 and 64 characters."
    ))]
    #[validate(regex(
        path = "SUB_NAME_REGEX",
        message = "The name may only contain letters, digits and underscores."
    ))]
    pub name: String,

    #[validate(length(
        max = "TITLE_MAX_LENGTH",
        message = "The title must be at most 255 characters."
    ))]
    #[oai(default)]
    #[serde(default)]
    pub title: String,

    #[oai(skip_serializing_if_is_none)]
    pub description: Option<String>,
}

/// Which picture of a sub an upload replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubImageKind {
    Image,
    Banner,
}

impl SubImageKind {
    pub fn parse(kind: &str) -> Option<SubImageKind> {
        match kind {
            "image" => Some(SubImageKind::Image),
            "banner" => Some(SubImageKind::Banner),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            SubImageKind::Image => "image_urn",
            SubImageKind::Banner => "banner_urn",
        }
    }
}

impl Sub {
    /// Fill in the derived image urls.
    pub fn with_urls(mut self, base_url: &str) -> Self {
        self.image_url = image_url(base_url, &self.image_urn)
            .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string());
        self.banner_url = image_url(base_url, &self.banner_urn);
        self
    }

    pub async fn get_by_name(pool: &sqlx::PgPool, name: &str) -> Result<Sub, anyhow::Error> {
        let sub = sqlx::query_as::<_, Sub>("SELECT * FROM preddit_sub WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;

        match sub {
            Some(sub) => AnyOk(sub.with_urls(&app_url())),
            None => Err(ServiceError::not_found("Sub")),
        }
    }

    pub async fn get_detail(
        pool: &sqlx::PgPool,
        name: &str,
        viewer: Option<&str>,
    ) -> Result<SubDetail, anyhow::Error> {
        let sub = Sub::get_by_name(pool, name).await?;
        let posts = Post::get_records_by_sub(pool, &sub.name, viewer).await?;

        AnyOk(SubDetail { sub, posts })
    }

    pub async fn create(
        pool: &sqlx::PgPool,
        owner: &str,
        payload: &CreateSubPayload,
    ) -> Result<Sub, anyhow::Error> {
        let mut errors = match payload.validate() {
            Ok(_) => FieldErrors::new(),
            Err(e) => field_errors(&e),
        };

        let exists = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM preddit_sub WHERE lower(name) = lower($1)",
        )
        .bind(&payload.name)
        .fetch_one(pool)
        .await?;
        if exists.0 > 0 {
            errors.insert("name".to_string(), "This sub already exists.".to_string());
        }

        if !errors.is_empty() {
            return Err(anyhow::Error::new(FormError::new(errors)));
        }

        let title = if payload.title.trim().is_empty() {
            payload.name.clone()
        } else {
            payload.title.trim().to_string()
        };

        let result = sqlx::query_as::<_, Sub>(
            "INSERT INTO preddit_sub (name, title, description, username) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&payload.name)
        .bind(&title)
        .bind(&payload.description)
        .bind(owner)
        .fetch_one(pool)
        .await;

        match result {
            Ok(sub) => {
                info!("Sub {} created by {}", sub.name, owner);
                AnyOk(sub.with_urls(&app_url()))
            }
            Err(e) if is_unique_violation(&e) => Err(anyhow::Error::new(FormError::single(
                "name",
                "This sub already exists.",
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// The subs with the most posts.
    pub async fn get_top_subs(pool: &sqlx::PgPool) -> Result<Vec<TopSub>, anyhow::Error> {
        let sql_str = "
            SELECT s.title, s.name, s.image_urn, COUNT(p.id) AS post_count
            FROM preddit_sub s
            LEFT JOIN preddit_post p ON s.name = p.sub_name
            GROUP BY s.id
            ORDER BY post_count DESC, s.name ASC
            LIMIT $1
        ";
        let records = sqlx::query_as::<_, TopSub>(sql_str)
            .bind(TOP_SUBS_LIMIT)
            .fetch_all(pool)
            .await?;

        let base_url = app_url();
        let records = records
            .into_iter()
            .map(|mut s| {
                s.image_url = image_url(&base_url, &s.image_urn)
                    .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string());
                s
            })
            .collect();

        AnyOk(records)
    }

    /// Fetch a sub, failing unless `username` owns it.
    pub async fn get_owned(
        pool: &sqlx::PgPool,
        name: &str,
        username: &str,
    ) -> Result<Sub, anyhow::Error> {
        let sub = Sub::get_by_name(pool, name).await?;
        if sub.username != username {
            return Err(ServiceError::forbidden("You do not own this sub."));
        }

        AnyOk(sub)
    }

    /// Point the sub at a new image file. Returns the updated sub and the file it used before.
    pub async fn update_image(
        pool: &sqlx::PgPool,
        name: &str,
        kind: SubImageKind,
        urn: &str,
    ) -> Result<(Sub, Option<String>), anyhow::Error> {
        let mut tx = pool.begin().await?;
        let old_urn = sqlx::query_as::<_, (Option<String>,)>(&format!(
            "SELECT {} FROM preddit_sub WHERE name = $1 FOR UPDATE",
            kind.column()
        ))
        .bind(name)
        .fetch_optional(&mut tx)
        .await?;

        let old_urn = match old_urn {
            Some(old_urn) => old_urn.0,
            None => return Err(ServiceError::not_found("Sub")),
        };

        let sub = sqlx::query_as::<_, Sub>(&format!(
            "UPDATE preddit_sub SET {} = $1, updated_at = now() WHERE name = $2 RETURNING *",
            kind.column()
        ))
        .bind(urn)
        .bind(name)
        .fetch_one(&mut tx)
        .await?;
        tx.commit().await?;

        AnyOk((sub.with_urls(&app_url()), old_urn))
    }

    /// Delete an owned sub. Posts, comments and votes go with it through the foreign keys.
    pub async fn delete(
        pool: &sqlx::PgPool,
        name: &str,
        username: &str,
    ) -> Result<Sub, anyhow::Error> {
        let sub = Sub::get_owned(pool, name, username).await?;
        sqlx::query("DELETE FROM preddit_sub WHERE id = $1")
            .bind(sub.id)
            .execute(pool)
            .await?;
        info!("Sub {} deleted by {}", sub.name, username);

        AnyOk(sub)
    }

    /// Every image file name referenced by a sub.
    pub async fn get_all_urns(pool: &sqlx::PgPool) -> Result<Vec<String>, anyhow::Error> {
        let records = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT image_urn, banner_urn FROM preddit_sub",
        )
        .fetch_all(pool)
        .await?;

        let urns = records
            .into_iter()
            .flat_map(|(image, banner)| vec![image, banner])
            .flatten()
            .filter(|urn| !urn.is_empty())
            .collect();

        AnyOk(urns)
    }
}

/// The bits of a sub that are shown next to a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct SubSummary {
    pub name: String,
    pub title: String,
    pub image_url: String,
    #[oai(skip_serializing_if_is_none)]
    pub banner_url: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PostRecord {
    id: i64,
    identifier: String,
    title: String,
    slug: String,
    body: Option<String>,
    sub_name: String,
    username: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sub_title: String,
    sub_image_urn: Option<String>,
    sub_banner_urn: Option<String>,
    comment_count: i64,
    vote_score: i64,
    user_vote: i32,
}

impl PostRecord {
    fn into_post(self, base_url: &str) -> Post {
        let url = format!("/r/{}/{}/{}", self.sub_name, self.identifier, self.slug);
        let sub = SubSummary {
            name: self.sub_name.clone(),
            title: self.sub_title,
            image_url: image_url(base_url, &self.sub_image_urn)
                .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
            banner_url: image_url(base_url, &self.sub_banner_urn),
        };

        Post {
            id: self.id,
            identifier: self.identifier,
            title: self.title,
            slug: self.slug,
            body: self.body,
            sub_name: self.sub_name,
            username: self.username,
            created_at: self.created_at,
            updated_at: self.updated_at,
            url,
            comment_count: self.comment_count,
            vote_score: self.vote_score,
            user_vote: self.user_vote,
            sub,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub identifier: String,
    pub title: String,
    pub slug: String,
    #[oai(skip_serializing_if_is_none)]
    pub body: Option<String>,
    pub sub_name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub comment_count: i64,
    pub vote_score: i64,
    /// The requesting user's vote: -1, 0 or 1.
    pub user_vote: i32,
    pub sub: SubSummary,
}

/// A post with its comments, returned after a vote so the client can refresh both at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct PostWithComments {
    #[serde(flatten)]
    #[oai(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct CreatePostPayload {
    #[validate(length(
        max = "TITLE_MAX_LENGTH",
        message = "The title must be at most 255 characters."
    ))]
    pub title: String,

    #[oai(skip_serializing_if_is_none)]
    pub body: Option<String>,

    /// The name of the sub to post in.
    pub sub: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct UpdatePostPayload {
    #[validate(length(
        max = "TITLE_MAX_LENGTH",
        message = "The title must be at most 255 characters."
    ))]
    pub title: String,

    #[oai(skip_serializing_if_is_none)]
    pub body: Option<String>,
}

fn check_title(title: &str, errors: Result<(), validator::ValidationErrors>) -> Result<(), FormError> {
    let mut errors = match errors {
        Ok(_) => FieldErrors::new(),
        Err(e) => field_errors(&e),
    };
    if title.trim().is_empty() {
        errors.insert("title".to_string(), "The title cannot be empty.".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(FormError::new(errors))
    }
}

impl CreatePostPayload {
    pub fn check(&self) -> Result<(), FormError> {
        check_title(&self.title, self.validate())
    }
}

impl UpdatePostPayload {
    pub fn check(&self) -> Result<(), FormError> {
        check_title(&self.title, self.validate())
    }
}

/// Feed page: `page` is zero based, `count` is clamped to [1, MAX_PAGE_SIZE].
pub fn feed_window(page: Option<u64>, count: Option<u64>) -> (i64, i64) {
    let page = page.unwrap_or(0);
    let count = count.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = i64::try_from(page.saturating_mul(count)).unwrap_or(i64::MAX);
    (count as i64, offset)
}

// $1 is always the viewing user (NULL for anonymous readers).
const POST_SELECT: &str = "
    SELECT p.id, p.identifier, p.title, p.slug, p.body, p.sub_name, p.username, p.created_at, p.updated_at,
           s.title AS sub_title, s.image_urn AS sub_image_urn, s.banner_urn AS sub_banner_urn,
           (SELECT COUNT(*) FROM preddit_comment c WHERE c.post_id = p.id) AS comment_count,
           (SELECT COALESCE(SUM(v.value), 0) FROM preddit_vote v WHERE v.post_id = p.id)::BIGINT AS vote_score,
           COALESCE((SELECT v.value FROM preddit_vote v WHERE v.post_id = p.id AND v.username = $1), 0)::INT AS user_vote
    FROM preddit_post p
    JOIN preddit_sub s ON s.name = p.sub_name
";

impl Post {
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    async fn fetch_records(
        pool: &sqlx::PgPool,
        where_str: &str,
        tail: &str,
        viewer: Option<&str>,
        binds: Vec<String>,
    ) -> Result<Vec<Post>, anyhow::Error> {
        let sql_str = format!("{} WHERE {} {}", POST_SELECT, where_str, tail);
        let mut query = sqlx::query_as::<_, PostRecord>(&sql_str).bind(viewer);
        for value in binds.iter() {
            query = query.bind(value);
        }
        let records = query.fetch_all(pool).await?;

        let base_url = app_url();
        AnyOk(records.into_iter().map(|r| r.into_post(&base_url)).collect())
    }

    /// The front page feed, newest first.
    pub async fn get_records(
        pool: &sqlx::PgPool,
        page: Option<u64>,
        count: Option<u64>,
        viewer: Option<&str>,
    ) -> Result<Vec<Post>, anyhow::Error> {
        let (limit, offset) = feed_window(page, count);
        let tail = format!("ORDER BY p.created_at DESC, p.id DESC LIMIT {} OFFSET {}", limit, offset);
        Post::fetch_records(pool, "1=1", &tail, viewer, vec![]).await
    }

    pub async fn get_records_by_sub(
        pool: &sqlx::PgPool,
        sub_name: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<Post>, anyhow::Error> {
        Post::fetch_records(
            pool,
            "p.sub_name = $2",
            "ORDER BY p.created_at DESC, p.id DESC",
            viewer,
            vec![sub_name.to_string()],
        )
        .await
    }

    pub async fn get_records_by_owner(
        pool: &sqlx::PgPool,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<Post>, anyhow::Error> {
        Post::fetch_records(
            pool,
            "p.username = $2",
            "ORDER BY p.created_at DESC, p.id DESC",
            viewer,
            vec![username.to_string()],
        )
        .await
    }

    pub async fn get(
        pool: &sqlx::PgPool,
        identifier: &str,
        slug: &str,
        viewer: Option<&str>,
    ) -> Result<Post, anyhow::Error> {
        let mut posts = Post::fetch_records(
            pool,
            "p.identifier = $2 AND p.slug = $3",
            "",
            viewer,
            vec![identifier.to_string(), slug.to_string()],
        )
        .await?;

        match posts.pop() {
            Some(post) => AnyOk(post),
            None => Err(ServiceError::not_found("Post")),
        }
    }

    pub async fn get_with_comments(
        pool: &sqlx::PgPool,
        identifier: &str,
        slug: &str,
        viewer: Option<&str>,
    ) -> Result<PostWithComments, anyhow::Error> {
        let post = Post::get(pool, identifier, slug, viewer).await?;
        let comments = Comment::get_records_by_post(pool, post.id, viewer).await?;

        AnyOk(PostWithComments { post, comments })
    }

    /// Resolve a post address to (id, author).
    pub async fn get_id(
        pool: &sqlx::PgPool,
        identifier: &str,
        slug: &str,
    ) -> Result<(i64, String), anyhow::Error> {
        let record = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, username FROM preddit_post WHERE identifier = $1 AND slug = $2",
        )
        .bind(identifier)
        .bind(slug)
        .fetch_optional(pool)
        .await?;

        match record {
            Some(record) => AnyOk(record),
            None => Err(ServiceError::not_found("Post")),
        }
    }

    pub async fn create(
        pool: &sqlx::PgPool,
        username: &str,
        payload: &CreatePostPayload,
    ) -> Result<Post, anyhow::Error> {
        payload.check()?;

        let sub = Sub::get_by_name(pool, &payload.sub).await?;
        let title = payload.title.trim().to_string();
        let slug = slugify(&title);

        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            let identifier = make_id(POST_IDENTIFIER_LENGTH);
            let result = sqlx::query(
                "INSERT INTO preddit_post (identifier, title, slug, body, sub_name, username) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&identifier)
            .bind(&title)
            .bind(&slug)
            .bind(&payload.body)
            .bind(&sub.name)
            .bind(username)
            .execute(pool)
            .await;

            match result {
                Ok(_) => {
                    debug!("Post {}/{} created by {}", identifier, slug, username);
                    return Post::get(pool, &identifier, &slug, Some(username)).await;
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!("Post identifier collision on attempt {}, retrying.", attempt);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow::anyhow!(
            "Failed to allocate a unique post identifier after {} attempts.",
            MAX_INSERT_ATTEMPTS
        ))
    }

    /// Edit the title and body. The slug is kept so existing links keep working.
    pub async fn update(
        pool: &sqlx::PgPool,
        identifier: &str,
        slug: &str,
        username: &str,
        payload: &UpdatePostPayload,
    ) -> Result<Post, anyhow::Error> {
        payload.check()?;

        let (id, author) = Post::get_id(pool, identifier, slug).await?;
        if author != username {
            return Err(ServiceError::forbidden("Only the author can edit this post."));
        }

        sqlx::query(
            "UPDATE preddit_post SET title = $1, body = $2, updated_at = now() WHERE id = $3",
        )
        .bind(payload.title.trim())
        .bind(&payload.body)
        .bind(id)
        .execute(pool)
        .await?;

        Post::get(pool, identifier, slug, Some(username)).await
    }

    /// Delete a post. Allowed for its author and for the owner of its sub.
    pub async fn delete(
        pool: &sqlx::PgPool,
        identifier: &str,
        slug: &str,
        username: &str,
    ) -> Result<(), anyhow::Error> {
        let record = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT p.id, p.username, s.username FROM preddit_post p JOIN preddit_sub s ON s.name = p.sub_name WHERE p.identifier = $1 AND p.slug = $2",
        )
        .bind(identifier)
        .bind(slug)
        .fetch_optional(pool)
        .await?;

        let (id, author, sub_owner) = match record {
            Some(record) => record,
            None => return Err(ServiceError::not_found("Post")),
        };

        if author != username && sub_owner != username {
            return Err(ServiceError::forbidden(
                "You don't have permission to delete this post.",
            ));
        }

        // Comments and votes are removed by ON DELETE CASCADE.
        sqlx::query("DELETE FROM preddit_post WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        info!("Post {}/{} deleted by {}", identifier, slug, username);

        AnyOk(())
    }
}

/// Where a comment was posted, shown in profile listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct PostLink {
    pub identifier: String,
    pub slug: String,
    pub title: String,
    pub sub_name: String,
    pub url: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CommentRecord {
    id: i64,
    identifier: String,
    body: String,
    username: String,
    post_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    post_identifier: String,
    post_slug: String,
    post_title: String,
    post_sub_name: String,
    vote_score: i64,
    user_vote: i32,
}

impl From<CommentRecord> for Comment {
    fn from(r: CommentRecord) -> Self {
        let url = format!("/r/{}/{}/{}", r.post_sub_name, r.post_identifier, r.post_slug);
        Comment {
            id: r.id,
            identifier: r.identifier,
            body: r.body,
            username: r.username,
            post_id: r.post_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            vote_score: r.vote_score,
            user_vote: r.user_vote,
            post: PostLink {
                identifier: r.post_identifier,
                slug: r.post_slug,
                title: r.post_title,
                sub_name: r.post_sub_name,
                url,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub identifier: String,
    pub body: String,
    pub username: String,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vote_score: i64,
    pub user_vote: i32,
    pub post: PostLink,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct CreateCommentPayload {
    pub body: String,
}

// $1 is always the viewing user (NULL for anonymous readers).
const COMMENT_SELECT: &str = "
    SELECT c.id, c.identifier, c.body, c.username, c.post_id, c.created_at, c.updated_at,
           p.identifier AS post_identifier, p.slug AS post_slug, p.title AS post_title, p.sub_name AS post_sub_name,
           (SELECT COALESCE(SUM(v.value), 0) FROM preddit_vote v WHERE v.comment_id = c.id)::BIGINT AS vote_score,
           COALESCE((SELECT v.value FROM preddit_vote v WHERE v.comment_id = c.id AND v.username = $1), 0)::INT AS user_vote
    FROM preddit_comment c
    JOIN preddit_post p ON p.id = c.post_id
";

impl Comment {
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn get_records_by_post(
        pool: &sqlx::PgPool,
        post_id: i64,
        viewer: Option<&str>,
    ) -> Result<Vec<Comment>, anyhow::Error> {
        let sql_str = format!(
            "{} WHERE c.post_id = $2 ORDER BY c.created_at DESC, c.id DESC",
            COMMENT_SELECT
        );
        let records = sqlx::query_as::<_, CommentRecord>(&sql_str)
            .bind(viewer)
            .bind(post_id)
            .fetch_all(pool)
            .await?;

        AnyOk(records.into_iter().map(Comment::from).collect())
    }

    pub async fn get_records_by_owner(
        pool: &sqlx::PgPool,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<Comment>, anyhow::Error> {
        let sql_str = format!(
            "{} WHERE c.username = $2 ORDER BY c.created_at DESC, c.id DESC",
            COMMENT_SELECT
        );
        let records = sqlx::query_as::<_, CommentRecord>(&sql_str)
            .bind(viewer)
            .bind(username)
            .fetch_all(pool)
            .await?;

        AnyOk(records.into_iter().map(Comment::from).collect())
    }

    pub async fn get_by_identifier(
        pool: &sqlx::PgPool,
        identifier: &str,
        viewer: Option<&str>,
    ) -> Result<Comment, anyhow::Error> {
        let sql_str = format!("{} WHERE c.identifier = $2", COMMENT_SELECT);
        let record = sqlx::query_as::<_, CommentRecord>(&sql_str)
            .bind(viewer)
            .bind(identifier)
            .fetch_optional(pool)
            .await?;

        match record {
            Some(record) => AnyOk(Comment::from(record)),
            None => Err(ServiceError::not_found("Comment")),
        }
    }

    pub async fn create(
        pool: &sqlx::PgPool,
        post_identifier: &str,
        slug: &str,
        username: &str,
        payload: &CreateCommentPayload,
    ) -> Result<Comment, anyhow::Error> {
        let body = payload.body.trim();
        if body.is_empty() {
            return Err(anyhow::Error::new(FormError::single(
                "body",
                "The comment cannot be empty.",
            )));
        }

        let (post_id, _) = Post::get_id(pool, post_identifier, slug).await?;

        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            let identifier = make_id(COMMENT_IDENTIFIER_LENGTH);
            let result = sqlx::query(
                "INSERT INTO preddit_comment (identifier, body, username, post_id) VALUES ($1, $2, $3, $4)",
            )
            .bind(&identifier)
            .bind(body)
            .bind(username)
            .bind(post_id)
            .execute(pool)
            .await;

            match result {
                Ok(_) => return Comment::get_by_identifier(pool, &identifier, Some(username)).await,
                Err(e) if is_unique_violation(&e) => {
                    warn!("Comment identifier collision on attempt {}, retrying.", attempt);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow::anyhow!(
            "Failed to allocate a unique comment identifier after {} attempts.",
            MAX_INSERT_ATTEMPTS
        ))
    }

    /// Delete a comment. Allowed for the comment's author and the post's author.
    pub async fn delete(
        pool: &sqlx::PgPool,
        post_identifier: &str,
        slug: &str,
        comment_identifier: &str,
        username: &str,
    ) -> Result<(), anyhow::Error> {
        let (post_id, post_author) = Post::get_id(pool, post_identifier, slug).await?;
        let record = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, username FROM preddit_comment WHERE identifier = $1 AND post_id = $2",
        )
        .bind(comment_identifier)
        .bind(post_id)
        .fetch_optional(pool)
        .await?;

        let (comment_id, comment_author) = match record {
            Some(record) => record,
            None => return Err(ServiceError::not_found("Comment")),
        };

        if comment_author != username && post_author != username {
            return Err(ServiceError::forbidden(
                "You don't have permission to perform this action.",
            ));
        }

        // Votes on the comment are removed by ON DELETE CASCADE.
        sqlx::query("DELETE FROM preddit_comment WHERE id = $1")
            .bind(comment_id)
            .execute(pool)
            .await?;

        AnyOk(())
    }
}

/// One entry of a user's activity feed. Serialized with a `type` field of `Post` or `Comment`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Union)]
#[serde(tag = "type")]
#[oai(discriminator_name = "type")]
pub enum UserActivity {
    Post(Post),
    Comment(Comment),
}

impl UserActivity {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            UserActivity::Post(p) => p.created_at(),
            UserActivity::Comment(c) => c.created_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UserProfile {
    pub user: UserSummary,
    pub user_data: Vec<UserActivity>,
}

/// Merge posts and comments into one list, newest first.
pub fn merge_activity(posts: Vec<Post>, comments: Vec<Comment>) -> Vec<UserActivity> {
    let mut activity: Vec<UserActivity> = posts
        .into_iter()
        .map(UserActivity::Post)
        .chain(comments.into_iter().map(UserActivity::Comment))
        .collect();
    activity.sort_by_key(|a| Reverse(a.created_at()));
    activity
}

impl UserProfile {
    pub async fn get(
        pool: &sqlx::PgPool,
        username: &str,
        viewer: Option<&str>,
    ) -> Result<UserProfile, anyhow::Error> {
        let user = User::get_summary(pool, username).await?;
        let posts = Post::get_records_by_owner(pool, &user.username, viewer).await?;
        let comments = Comment::get_records_by_owner(pool, &user.username, viewer).await?;

        AnyOk(UserProfile {
            user,
            user_data: merge_activity(posts, comments),
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use chrono::TimeZone;

    pub fn fake_post(identifier: &str, ts: i64) -> Post {
        PostRecord {
            id: 1,
            identifier: identifier.to_string(),
            title: "Hello world".to_string(),
            slug: "hello-world".to_string(),
            body: None,
            sub_name: "rust".to_string(),
            username: "ferris".to_string(),
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            updated_at: Utc.timestamp_opt(ts, 0).unwrap(),
            sub_title: "Rust".to_string(),
            sub_image_urn: None,
            sub_banner_urn: Some("banner.png".to_string()),
            comment_count: 2,
            vote_score: 3,
            user_vote: 1,
        }
        .into_post("http://localhost:4000")
    }

    pub fn fake_comment(identifier: &str, ts: i64) -> Comment {
        Comment::from(CommentRecord {
            id: 7,
            identifier: identifier.to_string(),
            body: "Nice post".to_string(),
            username: "ferris".to_string(),
            post_id: 1,
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            updated_at: Utc.timestamp_opt(ts, 0).unwrap(),
            post_identifier: "abcdefg".to_string(),
            post_slug: "hello-world".to_string(),
            post_title: "Hello world".to_string(),
            post_sub_name: "rust".to_string(),
            vote_score: -1,
            user_vote: 0,
        })
    }

    #[test]
    fn test_post_record_into_post() {
        let post = fake_post("abcdefg", 0);
        assert_eq!(post.url, "/r/rust/abcdefg/hello-world");
        assert_eq!(post.sub.image_url, DEFAULT_AVATAR_URL);
        assert_eq!(
            post.sub.banner_url,
            Some("http://localhost:4000/images/banner.png".to_string())
        );
    }

    #[test]
    fn test_comment_links_to_post() {
        let comment = fake_comment("12345678", 0);
        assert_eq!(comment.post.url, "/r/rust/abcdefg/hello-world");
    }

    #[test]
    fn test_merge_activity() {
        let posts = vec![fake_post("aaaaaaa", 100), fake_post("bbbbbbb", 300)];
        let comments = vec![fake_comment("cccccccc", 200)];
        let activity = merge_activity(posts, comments);
        let order: Vec<i64> = activity.iter().map(|a| a.created_at().timestamp()).collect();
        assert_eq!(order, vec![300, 200, 100]);
        match &activity[1] {
            UserActivity::Comment(c) => assert_eq!(c.identifier, "cccccccc"),
            _ => panic!("expected a comment"),
        }
    }

    #[test]
    fn test_activity_json_has_type() {
        let activity = merge_activity(vec![fake_post("aaaaaaa", 1)], vec![]);
        let json = serde_json::to_value(&activity[0]).unwrap();
        assert_eq!(json["type"], "Post");
        assert_eq!(json["voteScore"], 3);
        assert_eq!(json["userVote"], 1);
        assert_eq!(json["sub"]["imageUrl"], DEFAULT_AVATAR_URL);
    }

    #[test]
    fn test_user_password_not_serialized() {
        let user = User {
            id: 1,
            email: "ferris@example.com".to_string(),
            username: "ferris".to_string(),
            password: "$argon2id$secret".to_string(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("createdAt"));
    }

    #[test]
    fn test_feed_window() {
        assert_eq!(feed_window(None, None), (8, 0));
        assert_eq!(feed_window(Some(2), None), (8, 16));
        assert_eq!(feed_window(Some(1), Some(1000)), (50, 50));
        assert_eq!(feed_window(Some(3), Some(0)), (1, 3));
        assert_eq!(feed_window(Some(u64::MAX / 4), Some(8)), (8, i64::MAX));
        assert_eq!(feed_window(Some(u64::MAX), None), (8, i64::MAX));
    }

    #[test]
    fn test_sub_image_kind() {
        assert_eq!(SubImageKind::parse("image"), Some(SubImageKind::Image));
        assert_eq!(SubImageKind::parse("banner"), Some(SubImageKind::Banner));
        assert_eq!(SubImageKind::parse("avatar"), None);
    }

    #[test]
    fn test_sub_with_urls() {
        let sub = Sub {
            id: 1,
            name: "rust".to_string(),
            title: "Rust".to_string(),
            description: None,
            image_urn: Some("logo.png".to_string()),
            banner_urn: None,
            username: "ferris".to_string(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
            image_url: "".to_string(),
            banner_url: None,
        }
        .with_urls("http://localhost:4000");
        assert_eq!(sub.image_url, "http://localhost:4000/images/logo.png");
        assert_eq!(sub.banner_url, None);
    }

    #[test]
    fn test_register_payload_validation() {
        let payload = RegisterPayload {
            email: "not-an-email".to_string(),
            username: "a!".to_string(),
            password: "123".to_string(),
        };
        let errors = field_errors(&payload.validate().unwrap_err());
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.get("email").unwrap(), "The email address is invalid.");

        let payload = RegisterPayload {
            email: "ferris@example.com".to_string(),
            username: "ferris_42".to_string(),
            password: "crab-rave".to_string(),
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_login_payload_not_empty() {
        let payload = LoginPayload {
            username: " ".to_string(),
            password: "".to_string(),
        };
        let err = payload.check_not_empty().unwrap_err();
        assert!(err.errors.contains_key("username"));
        assert!(err.errors.contains_key("password"));
    }

    #[test]
    fn test_create_sub_payload_validation() {
        let payload = CreateSubPayload {
            name: "has space".to_string(),
            title: "".to_string(),
            description: None,
        };
        let errors = field_errors(&payload.validate().unwrap_err());
        assert!(errors.contains_key("name"));

        let payload = CreateSubPayload {
            name: "rust_lang".to_string(),
            title: "".to_string(),
            description: Some("All about Rust".to_string()),
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_post_payload_check() {
        let payload = CreatePostPayload {
            title: "   ".to_string(),
            body: None,
            sub: "rust".to_string(),
        };
        let err = payload.check().unwrap_err();
        assert_eq!(err.errors.get("title").unwrap(), "The title cannot be empty.");

        let payload = UpdatePostPayload {
            title: "x".repeat(256),
            body: None,
        };
        assert!(payload.check().is_err());
    }

    async fn register_user(pool: &sqlx::PgPool, prefix: &str, suffix: &str) -> String {
        let username = format!("{}_{}", prefix, suffix);
        User::register(
            pool,
            &RegisterPayload {
                email: format!("{}@example.com", username),
                username: username.clone(),
                password: "password1".to_string(),
            },
        )
        .await
        .unwrap();
        username
    }

    fn assert_forbidden(err: anyhow::Error) {
        match err.downcast_ref::<ServiceError>() {
            Some(ServiceError::Forbidden { .. }) => (),
            _ => panic!("expected a Forbidden error, got {}", err),
        }
    }

    // Needs a database: DATABASE_URL=... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_permissions_with_db() {
        let pool = crate::setup_test_db().await;
        let suffix = make_id(6).to_lowercase();
        let owner = register_user(&pool, "owner", &suffix).await;
        let author = register_user(&pool, "author", &suffix).await;
        let commenter = register_user(&pool, "commenter", &suffix).await;

        let sub = Sub::create(
            &pool,
            &owner,
            &CreateSubPayload {
                name: format!("perm_{}", suffix),
                title: "Permissions".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

        assert_forbidden(Sub::get_owned(&pool, &sub.name, &author).await.unwrap_err());
        assert_forbidden(Sub::delete(&pool, &sub.name, &author).await.unwrap_err());
        let err = Sub::get_owned(&pool, &format!("missing_{}", suffix), &owner)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Sub not found");

        let new_post = |title: &str| CreatePostPayload {
            title: title.to_string(),
            body: None,
            sub: sub.name.clone(),
        };
        let post = Post::create(&pool, &author, &new_post("First post"))
            .await
            .unwrap();

        // Only the author edits, even the sub owner cannot.
        let edit = UpdatePostPayload {
            title: "Edited title".to_string(),
            body: Some("Edited body".to_string()),
        };
        assert_forbidden(
            Post::update(&pool, &post.identifier, &post.slug, &owner, &edit)
                .await
                .unwrap_err(),
        );
        let edited = Post::update(&pool, &post.identifier, &post.slug, &author, &edit)
            .await
            .unwrap();
        assert_eq!(edited.title, "Edited title");
        assert_eq!(edited.slug, post.slug);

        // Comments go away with their author or the post author, not the sub owner.
        let comment = Comment::create(
            &pool,
            &post.identifier,
            &post.slug,
            &commenter,
            &CreateCommentPayload {
                body: "Nice post".to_string(),
            },
        )
        .await
        .unwrap();
        assert_forbidden(
            Comment::delete(&pool, &post.identifier, &post.slug, &comment.identifier, &owner)
                .await
                .unwrap_err(),
        );
        Comment::delete(&pool, &post.identifier, &post.slug, &comment.identifier, &author)
            .await
            .unwrap();
        let err = Comment::delete(&pool, &post.identifier, &post.slug, &comment.identifier, &author)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Comment not found");

        // Posts go away with their author or the sub owner.
        assert_forbidden(
            Post::delete(&pool, &post.identifier, &post.slug, &commenter)
                .await
                .unwrap_err(),
        );
        Post::delete(&pool, &post.identifier, &post.slug, &owner)
            .await
            .unwrap();
        let other = Post::create(&pool, &author, &new_post("Second post"))
            .await
            .unwrap();
        Post::delete(&pool, &other.identifier, &other.slug, &author)
            .await
            .unwrap();
        let err = Post::delete(&pool, &other.identifier, &other.slug, &author)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Post not found");

        Sub::delete(&pool, &sub.name, &owner).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_top_subs_with_db() {
        let pool = crate::setup_test_db().await;
        let suffix = make_id(6).to_lowercase();
        let owner = register_user(&pool, "top", &suffix).await;

        // Two subs with the same, large post count: the tie is broken by name.
        let mut names = vec![];
        for prefix in ["zz", "aa"] {
            let sub = Sub::create(
                &pool,
                &owner,
                &CreateSubPayload {
                    name: format!("{}_{}", prefix, suffix),
                    title: "".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();
            for i in 0..20 {
                Post::create(
                    &pool,
                    &owner,
                    &CreatePostPayload {
                        title: format!("Post {}", i),
                        body: None,
                        sub: sub.name.clone(),
                    },
                )
                .await
                .unwrap();
            }
            names.push(sub.name);
        }

        let top = Sub::get_top_subs(&pool).await.unwrap();
        assert!(top.len() <= 5);
        for pair in top.windows(2) {
            let ordered = pair[0].post_count > pair[1].post_count
                || (pair[0].post_count == pair[1].post_count && pair[0].name <= pair[1].name);
            assert!(ordered, "{} before {}", pair[0].name, pair[1].name);
        }
        let first = top.iter().position(|s| s.name == names[1]);
        let second = top.iter().position(|s| s.name == names[0]);
        if let (Some(first), Some(second)) = (first, second) {
            assert!(first < second);
        }

        for name in names {
            Sub::delete(&pool, &name, &owner).await.unwrap();
        }
    }
}
