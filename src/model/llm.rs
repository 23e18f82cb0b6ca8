//! Short AI explanations for posts, answered by an OpenAI-compatible chat-completion endpoint.
//!
//! Answers are stored per post and prompt, so asking the same question twice costs one upstream call.

use super::core::Post;
use super::util::ServiceError;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.deepinfra.com/v1/openai";
pub const DEFAULT_MODEL: &str = "google/gemma-2-9b-it";
pub const SYSTEM_PROMPT: &str =
    "You are an AI assistant who helps developers. Please explain it as briefly as possible.";
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct AiPromptPayload {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct AiResponse {
    pub post_id: i64,
    pub prompt_hash: String,
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Hex encoded SHA-256 of the prompt, the cache key next to the post id.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl AiResponse {
    pub async fn fetch(
        pool: &sqlx::PgPool,
        post_id: i64,
        prompt: &str,
    ) -> Result<Option<AiResponse>, anyhow::Error> {
        let sql_str = "SELECT post_id, prompt_hash, prompt, response, created_at FROM preddit_ai_response WHERE post_id = $1 AND prompt_hash = $2";
        let record = sqlx::query_as::<_, AiResponse>(sql_str)
            .bind(post_id)
            .bind(prompt_hash(prompt))
            .fetch_optional(pool)
            .await?;

        Ok(record)
    }

    pub async fn save2db(&self, pool: &sqlx::PgPool) -> Result<(), anyhow::Error> {
        // Two concurrent askers may race here, the first answer wins.
        let sql_str = "INSERT INTO preddit_ai_response (post_id, prompt_hash, prompt, response) VALUES ($1, $2, $3, $4) ON CONFLICT (post_id, prompt_hash) DO NOTHING";
        sqlx::query(sql_str)
            .bind(self.post_id)
            .bind(&self.prompt_hash)
            .bind(&self.prompt)
            .bind(&self.response)
            .execute(pool)
            .await?;

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn parse_answer(body: &str) -> Result<String, anyhow::Error> {
    let resp: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        anyhow::Error::new(ServiceError::Upstream {
            details: format!("unexpected response: {}", e),
        })
    })?;

    match resp.choices.into_iter().next().and_then(|c| c.message.content) {
        Some(content) => Ok(content),
        None => Err(anyhow::Error::new(ServiceError::Upstream {
            details: "no message returned".to_string(),
        })),
    }
}

#[derive(Debug, Clone)]
pub struct ChatBot {
    api_base: String,
    api_key: Option<String>,
    model_name: String,
    client: reqwest::Client,
}

impl ChatBot {
    pub fn new(api_base: &str, api_key: Option<String>, model_name: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build the http client ({}), using the default one.", e);
                reqwest::Client::new()
            });

        ChatBot {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model_name: model_name.to_string(),
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model_name,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        }
    }

    pub async fn answer(&self, prompt: &str) -> Result<String, anyhow::Error> {
        let api_key = match &self.api_key {
            Some(api_key) => api_key,
            None => {
                return Err(anyhow::Error::new(ServiceError::Unavailable {
                    what: "The AI assistant".to_string(),
                }))
            }
        };

        debug!("Asking {} at {}", self.model_name, self.endpoint());
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| {
                anyhow::Error::new(ServiceError::Upstream {
                    details: e.to_string(),
                })
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            anyhow::Error::new(ServiceError::Upstream {
                details: e.to_string(),
            })
        })?;

        if !status.is_success() {
            warn!("The chat completion endpoint returned {}: {}", status, body);
            return Err(anyhow::Error::new(ServiceError::Upstream {
                details: format!("status {}", status),
            }));
        }

        parse_answer(&body)
    }
}

/// Answer a prompt about a post, from the cache when possible.
pub async fn answer_for_post(
    pool: &sqlx::PgPool,
    chatbot: &ChatBot,
    identifier: &str,
    slug: &str,
    prompt: &str,
) -> Result<String, anyhow::Error> {
    if prompt.trim().is_empty() {
        return Err(ServiceError::invalid("prompt", "The prompt cannot be empty."));
    }

    let (post_id, _) = Post::get_id(pool, identifier, slug).await?;
    if let Some(cached) = AiResponse::fetch(pool, post_id, prompt).await? {
        debug!("Cached answer for post {} found.", post_id);
        return Ok(cached.response);
    }

    let response = chatbot.answer(prompt).await?;
    let record = AiResponse {
        post_id,
        prompt_hash: prompt_hash(prompt),
        prompt: prompt.to_string(),
        response,
        created_at: Utc::now(),
    };
    if let Err(e) = record.save2db(pool).await {
        warn!("Failed to cache the answer for post {}: {}", post_id, e);
    } else {
        info!("Cached a new answer for post {}.", post_id);
    }

    Ok(record.response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_hash() {
        assert_eq!(
            prompt_hash("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(prompt_hash("hello").len(), 64);
        assert_ne!(prompt_hash("hello"), prompt_hash("hello "));
    }

    #[test]
    fn test_build_request() {
        let chatbot = ChatBot::new("https://example.com/v1/", Some("key".to_string()), DEFAULT_MODEL);
        assert_eq!(chatbot.endpoint(), "https://example.com/v1/chat/completions");

        let body = serde_json::to_value(chatbot.build_request("What is a lifetime?")).unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What is a lifetime?");
    }

    #[test]
    fn test_parse_answer() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Borrowing."}}]}"#;
        assert_eq!(parse_answer(body).unwrap(), "Borrowing.");

        let err = parse_answer(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::Upstream { .. })
        ));
        assert!(parse_answer("not json").is_err());
    }

    #[tokio::test]
    async fn test_answer_without_key() {
        let chatbot = ChatBot::new(DEFAULT_API_BASE, Some("".to_string()), DEFAULT_MODEL);
        assert!(!chatbot.is_configured());
        let err = chatbot.answer("hi").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::Unavailable { .. })
        ));
    }
}
