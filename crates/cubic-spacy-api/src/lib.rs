//! Bot API boundary for the inline-query transforms.
//!
//! Decodes updates into [`QueryInput`], wraps assembled cards into an
//! `answerInlineQuery` call and delivers it through an [`InlineAnswerer`].

mod client;

use std::time::Duration;

use async_trait::async_trait;
use cubic_spacy_core::{assemble, CardList, QueryInput, RandomSource, ResultCard};
use serde::{Deserialize, Serialize};

pub use client::{BotClient, GetUpdates, SetWebhook, DEFAULT_API_URL};

pub const ALLOWED_UPDATE_INLINE_QUERY: &str = "inline_query";
pub const ARTICLE_RESULT_TYPE: &str = "article";

#[derive(Debug, thiserror::Error)]
pub enum BotApiError {
    #[error("request error: {0}")]
    Request(#[source] reqwest::Error),
    #[error("bot api error {code}: {description}")]
    Api { code: i64, description: String, retry_after: Option<u64> },
    #[error("bot api response has neither a result nor an error")]
    MissingResult,
}

impl BotApiError {
    /// Back-off requested by the platform for rate-limited calls.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after: Some(seconds), .. } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }

    /// Whether the platform rejected the bot token itself.
    ///
    /// The Bot API answers 401 for a revoked or unknown token and 404 for a
    /// malformed one; retrying either cannot succeed.
    #[must_use]
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::Api { code: 401 | 404, .. })
    }
}

impl From<reqwest::Error> for BotApiError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs embed the bot token.
        Self::Request(err.without_url())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    pub query: String,
    #[serde(default)]
    pub offset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_query: Option<InlineQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputTextMessageContent {
    pub message_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineQueryResultArticle {
    #[serde(rename = "type")]
    pub result_type: String,
    pub id: String,
    pub title: String,
    pub input_message_content: InputTextMessageContent,
    pub description: String,
}

impl From<&ResultCard> for InlineQueryResultArticle {
    fn from(card: &ResultCard) -> Self {
        Self {
            result_type: ARTICLE_RESULT_TYPE.to_string(),
            id: card.id.as_str().to_string(),
            title: card.title.clone(),
            input_message_content: InputTextMessageContent {
                message_text: card.message_text.clone(),
            },
            description: card.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerInlineQuery {
    pub inline_query_id: String,
    pub results: Vec<InlineQueryResultArticle>,
    pub cache_time: u32,
}

impl AnswerInlineQuery {
    #[must_use]
    pub fn from_cards(inline_query_id: impl Into<String>, cards: &CardList) -> Self {
        Self {
            inline_query_id: inline_query_id.into(),
            results: cards.iter().map(InlineQueryResultArticle::from).collect(),
            cache_time: cards.cache_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// Envelope of every Bot API response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the envelope into its result or a typed API error.
    ///
    /// # Errors
    /// Returns [`BotApiError::Api`] when `ok` is false and
    /// [`BotApiError::MissingResult`] when an ok response carries no result.
    pub fn into_result(self) -> Result<T, BotApiError> {
        if !self.ok {
            return Err(BotApiError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_else(|| "unknown error".to_string()),
                retry_after: self.parameters.and_then(|parameters| parameters.retry_after),
            });
        }
        self.result.ok_or(BotApiError::MissingResult)
    }
}

/// Delivers an answer to the platform.
#[async_trait]
pub trait InlineAnswerer: Send + Sync {
    async fn answer_inline_query(&self, answer: &AnswerInlineQuery) -> Result<(), BotApiError>;
}

/// Fetches pending updates from the platform.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn get_updates(&self, params: &GetUpdates) -> Result<Vec<Update>, BotApiError>;
}

/// Extract the kernel input from an update, or `None` when it carries no
/// inline query.
#[must_use]
pub fn query_input(update: &Update) -> Option<QueryInput> {
    let inline_query = update.inline_query.as_ref()?;
    Some(QueryInput::new(
        inline_query.id.clone(),
        inline_query.from.first_name.clone(),
        inline_query.query.clone(),
    ))
}

/// Build the `answerInlineQuery` call for an update.
///
/// Updates without an inline query are skipped.
pub fn answer_update<R>(update: &Update, rng: &mut R) -> Option<AnswerInlineQuery>
where
    R: RandomSource + ?Sized,
{
    let Some(inline_query) = update.inline_query.as_ref() else {
        tracing::debug!(update_id = update.update_id, "skipping update without inline query");
        return None;
    };
    tracing::debug!(
        user_id = inline_query.from.id,
        user_first_name = %inline_query.from.first_name,
        username = inline_query.from.username.as_deref().unwrap_or_default(),
        text = %inline_query.query,
        "received inline query"
    );

    let input = query_input(update)?;
    let cards = assemble(&input, rng);
    Some(AnswerInlineQuery::from_cards(input.query_id, &cards))
}

/// Send `answer`, logging failures instead of returning them.
///
/// Returns whether the platform accepted the answer.
pub async fn deliver_answer(answerer: &dyn InlineAnswerer, answer: &AnswerInlineQuery) -> bool {
    match answerer.answer_inline_query(answer).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                inline_query_id = %answer.inline_query_id,
                error = %err,
                "failed to answer inline query"
            );
            false
        }
    }
}
