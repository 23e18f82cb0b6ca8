//! This module defines the routes of the API.

use crate::api::auth::{
    create_token, expired_cookie, jwt_secret, token_cookie, CustomSecurityScheme, OptionalUser,
};
use crate::api::schema::{
    AiAnswerResponse, ApiTags, DeleteResponse, LoginResponse, LogoutResponse, RecordResponse,
    UploadImagePayload,
};
use crate::model::core::{
    Comment, CreateCommentPayload, CreatePostPayload, CreateSubPayload, LoginFailure,
    LoginPayload, Post, PostWithComments, RegisterPayload, Sub, SubDetail, SubImageKind, TopSub,
    UpdatePostPayload, User, UserProfile,
};
use crate::model::llm::{answer_for_post, AiPromptPayload, ChatBot};
use crate::model::upload::ImageStore;
use crate::model::util::{FieldErrors, FormError};
use crate::model::vote::{cast_vote, VotePayload};
use log::{debug, info, warn};
use poem::web::Data;
use poem_openapi::{param::Path, param::Query, payload::Json, OpenApi};
use std::sync::Arc;

fn single_error(field: &str, msg: &str) -> FieldErrors {
    FormError::single(field, msg).errors
}

pub struct PredditApi;

#[OpenApi]
impl PredditApi {
    /// Call `/api/auth/register` with an email, a username and a password to create an account.
    #[oai(
        path = "/api/auth/register",
        method = "post",
        tag = "ApiTags::Auth",
        operation_id = "register"
    )]
    async fn register(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        payload: Json<RegisterPayload>,
    ) -> RecordResponse<User> {
        let pool_arc = pool.clone();
        let payload = payload.0;

        match User::register(&pool_arc, &payload).await {
            Ok(user) => RecordResponse::ok(user),
            Err(e) => {
                warn!("Failed to register {}: {}", payload.username, e);
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/auth/login` to get a token. The token is also set as an HttpOnly cookie.
    #[oai(
        path = "/api/auth/login",
        method = "post",
        tag = "ApiTags::Auth",
        operation_id = "login"
    )]
    async fn login(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        payload: Json<LoginPayload>,
    ) -> LoginResponse {
        let pool_arc = pool.clone();
        let payload = payload.0;

        if let Err(e) = payload.check_not_empty() {
            return LoginResponse::BadRequest(Json(e.errors));
        }

        let user = match User::login(&pool_arc, &payload).await {
            Ok(Ok(user)) => user,
            Ok(Err(LoginFailure::UnknownUser)) => {
                return LoginResponse::NotFound(Json(single_error(
                    "username",
                    "Username not found.",
                )))
            }
            Ok(Err(LoginFailure::WrongPassword)) => {
                return LoginResponse::Unauthorized(Json(single_error(
                    "password",
                    "Password is incorrect.",
                )))
            }
            Err(e) => {
                warn!("Failed to log in {}: {}", payload.username, e);
                return LoginResponse::internal_error();
            }
        };

        let secret = match jwt_secret() {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET_KEY is not set, cannot issue tokens.");
                return LoginResponse::internal_error();
            }
        };

        match create_token(&user.username, &secret) {
            Ok(token) => {
                info!("{} logged in.", user.username);
                let cookie = token_cookie(&token);
                LoginResponse::ok(user, token, cookie)
            }
            Err(e) => {
                warn!("Failed to create a token: {}", e);
                LoginResponse::internal_error()
            }
        }
    }

    /// Call `/api/auth/me` to get the logged in user.
    #[oai(
        path = "/api/auth/me",
        method = "get",
        tag = "ApiTags::Auth",
        operation_id = "me"
    )]
    async fn me(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
    ) -> RecordResponse<User> {
        let pool_arc = pool.clone();
        let username = auth.0.username;

        match User::get_by_username(&pool_arc, &username).await {
            Ok(Some(user)) => RecordResponse::ok(user),
            Ok(None) => {
                warn!("The token names {}, who no longer exists.", username);
                RecordResponse::unauthorized()
            }
            Err(e) => RecordResponse::from_error(e),
        }
    }

    /// Call `/api/auth/logout` to drop the token cookie.
    #[oai(
        path = "/api/auth/logout",
        method = "post",
        tag = "ApiTags::Auth",
        operation_id = "logout"
    )]
    async fn logout(&self) -> LogoutResponse {
        LogoutResponse::ok(expired_cookie())
    }

    /// Call `/api/subs/:name` to fetch a sub and its posts.
    #[oai(
        path = "/api/subs/:name",
        method = "get",
        tag = "ApiTags::Subs",
        operation_id = "fetchSub"
    )]
    async fn fetch_sub(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        viewer: OptionalUser,
        name: Path<String>,
    ) -> RecordResponse<SubDetail> {
        let pool_arc = pool.clone();

        match Sub::get_detail(&pool_arc, &name.0, viewer.username()).await {
            Ok(detail) => RecordResponse::ok(detail),
            Err(e) => {
                warn!("Failed to fetch sub {}: {}", name.0, e);
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/subs` with a name, an optional title and description to create a sub.
    #[oai(
        path = "/api/subs",
        method = "post",
        tag = "ApiTags::Subs",
        operation_id = "postSub"
    )]
    async fn post_sub(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        payload: Json<CreateSubPayload>,
    ) -> RecordResponse<Sub> {
        let pool_arc = pool.clone();

        match Sub::create(&pool_arc, &auth.0.username, &payload.0).await {
            Ok(sub) => RecordResponse::ok(sub),
            Err(e) => {
                warn!("Failed to create sub {}: {}", payload.0.name, e);
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/subs/sub/topSubs` to fetch the subs with the most posts.
    #[oai(
        path = "/api/subs/sub/topSubs",
        method = "get",
        tag = "ApiTags::Subs",
        operation_id = "fetchTopSubs"
    )]
    async fn fetch_top_subs(&self, pool: Data<&Arc<sqlx::PgPool>>) -> RecordResponse<Vec<TopSub>> {
        let pool_arc = pool.clone();

        match Sub::get_top_subs(&pool_arc).await {
            Ok(subs) => RecordResponse::ok(subs),
            Err(e) => RecordResponse::from_error(e),
        }
    }

    /// Call `/api/subs/:name/upload` with a multipart form (`type` is image or banner, `file` is a jpeg or png) to replace a picture of the sub.
    #[oai(
        path = "/api/subs/:name/upload",
        method = "post",
        tag = "ApiTags::Subs",
        operation_id = "uploadSubImage"
    )]
    async fn upload_sub_image(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        store: Data<&Arc<ImageStore>>,
        auth: CustomSecurityScheme,
        name: Path<String>,
        payload: UploadImagePayload,
    ) -> RecordResponse<Sub> {
        let pool_arc = pool.clone();
        let name = name.0;

        if let Err(e) = Sub::get_owned(&pool_arc, &name, &auth.0.username).await {
            return RecordResponse::from_error(e);
        }

        let kind = match SubImageKind::parse(&payload.kind) {
            Some(kind) => kind,
            None => {
                return RecordResponse::bad_request(single_error("type", "Invalid type."));
            }
        };

        let file_name = payload.file.file_name().map(|s| s.to_string());
        let content_type = payload.file.content_type().map(|s| s.to_string());
        let content = match payload.file.into_vec().await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read the upload: {}", e);
                return RecordResponse::bad_request(single_error("file", "Failed to read the file."));
            }
        };

        let urn = match store
            .save(&content, file_name.as_deref(), content_type.as_deref())
            .await
        {
            Ok(urn) => urn,
            Err(e) => return RecordResponse::from_error(e),
        };

        match Sub::update_image(&pool_arc, &name, kind, &urn).await {
            Ok((sub, old_urn)) => {
                debug!("Sub {} now uses {}", sub.name, urn);
                store.discard(old_urn).await;
                RecordResponse::ok(sub)
            }
            Err(e) => {
                store.discard(Some(urn)).await;
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/subs/:name` to delete a sub you own, with all of its posts.
    #[oai(
        path = "/api/subs/:name",
        method = "delete",
        tag = "ApiTags::Subs",
        operation_id = "deleteSub"
    )]
    async fn delete_sub(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        store: Data<&Arc<ImageStore>>,
        auth: CustomSecurityScheme,
        name: Path<String>,
    ) -> DeleteResponse {
        let pool_arc = pool.clone();

        match Sub::delete(&pool_arc, &name.0, &auth.0.username).await {
            Ok(sub) => {
                store.discard(sub.image_urn).await;
                store.discard(sub.banner_urn).await;
                DeleteResponse::NoContent
            }
            Err(e) => {
                warn!("Failed to delete sub {}: {}", name.0, e);
                DeleteResponse::from_error(e)
            }
        }
    }

    /// Call `/api/posts` with query params (`page` starts from 0, `count` defaults to 8) to fetch the newest posts.
    #[oai(
        path = "/api/posts",
        method = "get",
        tag = "ApiTags::Posts",
        operation_id = "fetchPosts"
    )]
    async fn fetch_posts(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        viewer: OptionalUser,
        page: Query<Option<u64>>,
        count: Query<Option<u64>>,
    ) -> RecordResponse<Vec<Post>> {
        let pool_arc = pool.clone();

        match Post::get_records(&pool_arc, page.0, count.0, viewer.username()).await {
            Ok(posts) => RecordResponse::ok(posts),
            Err(e) => RecordResponse::from_error(e),
        }
    }

    /// Call `/api/posts` with a title, an optional body and a sub name to create a post.
    #[oai(
        path = "/api/posts",
        method = "post",
        tag = "ApiTags::Posts",
        operation_id = "postPost"
    )]
    async fn post_post(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        payload: Json<CreatePostPayload>,
    ) -> RecordResponse<Post> {
        let pool_arc = pool.clone();

        match Post::create(&pool_arc, &auth.0.username, &payload.0).await {
            Ok(post) => RecordResponse::ok(post),
            Err(e) => {
                warn!("Failed to create a post in {}: {}", payload.0.sub, e);
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/posts/:identifier/:slug` to fetch a post.
    #[oai(
        path = "/api/posts/:identifier/:slug",
        method = "get",
        tag = "ApiTags::Posts",
        operation_id = "fetchPost"
    )]
    async fn fetch_post(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        viewer: OptionalUser,
        identifier: Path<String>,
        slug: Path<String>,
    ) -> RecordResponse<Post> {
        let pool_arc = pool.clone();

        match Post::get(&pool_arc, &identifier.0, &slug.0, viewer.username()).await {
            Ok(post) => RecordResponse::ok(post),
            Err(e) => RecordResponse::from_error(e),
        }
    }

    /// Call `/api/posts/:identifier/:slug` with a new title and body to edit your post.
    #[oai(
        path = "/api/posts/:identifier/:slug",
        method = "put",
        tag = "ApiTags::Posts",
        operation_id = "putPost"
    )]
    async fn put_post(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        identifier: Path<String>,
        slug: Path<String>,
        payload: Json<UpdatePostPayload>,
    ) -> RecordResponse<Post> {
        let pool_arc = pool.clone();

        match Post::update(&pool_arc, &identifier.0, &slug.0, &auth.0.username, &payload.0).await {
            Ok(post) => RecordResponse::ok(post),
            Err(e) => {
                warn!("Failed to update post {}/{}: {}", identifier.0, slug.0, e);
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/posts/:identifier/:slug` to delete a post. Allowed for its author and the owner of its sub.
    #[oai(
        path = "/api/posts/:identifier/:slug",
        method = "delete",
        tag = "ApiTags::Posts",
        operation_id = "deletePost"
    )]
    async fn delete_post(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        identifier: Path<String>,
        slug: Path<String>,
    ) -> DeleteResponse {
        let pool_arc = pool.clone();

        match Post::delete(&pool_arc, &identifier.0, &slug.0, &auth.0.username).await {
            Ok(_) => DeleteResponse::NoContent,
            Err(e) => {
                warn!("Failed to delete post {}/{}: {}", identifier.0, slug.0, e);
                DeleteResponse::from_error(e)
            }
        }
    }

    /// Call `/api/posts/:identifier/:slug/comments` to fetch the comments of a post, newest first.
    #[oai(
        path = "/api/posts/:identifier/:slug/comments",
        method = "get",
        tag = "ApiTags::Posts",
        operation_id = "fetchComments"
    )]
    async fn fetch_comments(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        viewer: OptionalUser,
        identifier: Path<String>,
        slug: Path<String>,
    ) -> RecordResponse<Vec<Comment>> {
        let pool_arc = pool.clone();

        let (post_id, _) = match Post::get_id(&pool_arc, &identifier.0, &slug.0).await {
            Ok(record) => record,
            Err(e) => return RecordResponse::from_error(e),
        };

        match Comment::get_records_by_post(&pool_arc, post_id, viewer.username()).await {
            Ok(comments) => RecordResponse::ok(comments),
            Err(e) => RecordResponse::from_error(e),
        }
    }

    /// Call `/api/posts/:identifier/:slug/comments` with a body to comment on a post.
    #[oai(
        path = "/api/posts/:identifier/:slug/comments",
        method = "post",
        tag = "ApiTags::Posts",
        operation_id = "postComment"
    )]
    async fn post_comment(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        identifier: Path<String>,
        slug: Path<String>,
        payload: Json<CreateCommentPayload>,
    ) -> RecordResponse<Comment> {
        let pool_arc = pool.clone();

        match Comment::create(&pool_arc, &identifier.0, &slug.0, &auth.0.username, &payload.0)
            .await
        {
            Ok(comment) => RecordResponse::ok(comment),
            Err(e) => {
                warn!("Failed to comment on {}/{}: {}", identifier.0, slug.0, e);
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/posts/:identifier/:slug/comments/:comment_identifier` to delete a comment. Allowed for its author and the author of the post.
    #[oai(
        path = "/api/posts/:identifier/:slug/comments/:comment_identifier",
        method = "delete",
        tag = "ApiTags::Posts",
        operation_id = "deleteComment"
    )]
    async fn delete_comment(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        identifier: Path<String>,
        slug: Path<String>,
        comment_identifier: Path<String>,
    ) -> DeleteResponse {
        let pool_arc = pool.clone();

        match Comment::delete(
            &pool_arc,
            &identifier.0,
            &slug.0,
            &comment_identifier.0,
            &auth.0.username,
        )
        .await
        {
            Ok(_) => DeleteResponse::NoContent,
            Err(e) => {
                warn!("Failed to delete comment {}: {}", comment_identifier.0, e);
                DeleteResponse::from_error(e)
            }
        }
    }

    /// Call `/api/users/:username` to fetch a user and everything they posted or commented, newest first.
    #[oai(
        path = "/api/users/:username",
        method = "get",
        tag = "ApiTags::Users",
        operation_id = "fetchUserData"
    )]
    async fn fetch_user_data(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        viewer: OptionalUser,
        username: Path<String>,
    ) -> RecordResponse<UserProfile> {
        let pool_arc = pool.clone();

        match UserProfile::get(&pool_arc, &username.0, viewer.username()).await {
            Ok(profile) => RecordResponse::ok(profile),
            Err(e) => RecordResponse::from_error(e),
        }
    }

    /// Call `/api/votes` with a post address, an optional comment identifier and a value (1, -1, or 0 to take the vote back).
    #[oai(
        path = "/api/votes",
        method = "post",
        tag = "ApiTags::Votes",
        operation_id = "postVote"
    )]
    async fn post_vote(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        payload: Json<VotePayload>,
    ) -> RecordResponse<PostWithComments> {
        let pool_arc = pool.clone();

        match cast_vote(&pool_arc, &auth.0.username, &payload.0).await {
            Ok(post) => RecordResponse::ok(post),
            Err(e) => {
                warn!("Vote by {} failed: {}", auth.0.username, e);
                RecordResponse::from_error(e)
            }
        }
    }

    /// Call `/api/generate-ai-response/:identifier/:slug` with a prompt to get a short explanation from the AI assistant.
    #[oai(
        path = "/api/generate-ai-response/:identifier/:slug",
        method = "post",
        tag = "ApiTags::AiResponse",
        operation_id = "generateAiResponse"
    )]
    async fn generate_ai_response(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        chatbot: Data<&Arc<ChatBot>>,
        identifier: Path<String>,
        slug: Path<String>,
        payload: Json<AiPromptPayload>,
    ) -> AiAnswerResponse {
        let pool_arc = pool.clone();

        match answer_for_post(&pool_arc, &chatbot, &identifier.0, &slug.0, &payload.0.prompt).await
        {
            Ok(answer) => AiAnswerResponse::Ok(Json(answer)),
            Err(e) => {
                warn!("Failed to answer for {}/{}: {}", identifier.0, slug.0, e);
                AiAnswerResponse::from_error(e)
            }
        }
    }
}
