use std::fmt::{Debug, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{
    AnswerInlineQuery, ApiResponse, BotApiError, InlineAnswerer, Update, UpdateSource, User,
};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
// Added on top of the long-poll timeout so the server answers first.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetWebhook {
    /// An empty URL removes the webhook.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
    pub allowed_updates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    /// Long-poll timeout in seconds.
    pub timeout: u64,
    pub allowed_updates: Vec<String>,
}

/// HTTP client for the Bot API.
#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl Debug for BotClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl BotClient {
    /// Create a client for `token`, talking to `base_url` or the public API.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(token: impl Into<String>, base_url: Option<&str>) -> Result<Self, BotApiError> {
        let http = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        let base_url = base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self { http, base_url, token: token.into() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<P, T>(&self, method: &str, params: &P, timeout: Duration) -> Result<T, BotApiError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        // Error responses still carry a JSON envelope, so the status is not checked.
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await?;
        let envelope = response.json::<ApiResponse<T>>().await?;
        envelope.into_result()
    }

    /// # Errors
    /// Returns an error on transport failure or when the API rejects the token.
    pub async fn get_me(&self) -> Result<User, BotApiError> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT).await
    }

    /// # Errors
    /// Returns an error on transport failure or when the API rejects the call.
    pub async fn set_webhook(&self, params: &SetWebhook) -> Result<bool, BotApiError> {
        self.call("setWebhook", params, REQUEST_TIMEOUT).await
    }

    /// Long-poll for updates. Blocks up to `params.timeout` seconds.
    ///
    /// # Errors
    /// Returns an error on transport failure or when the API rejects the call.
    pub async fn get_updates(&self, params: &GetUpdates) -> Result<Vec<Update>, BotApiError> {
        let timeout = Duration::from_secs(params.timeout) + POLL_GRACE;
        self.call("getUpdates", params, timeout).await
    }
}

#[async_trait]
impl InlineAnswerer for BotClient {
    async fn answer_inline_query(&self, answer: &AnswerInlineQuery) -> Result<(), BotApiError> {
        let _accepted: bool = self.call("answerInlineQuery", answer, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for BotClient {
    async fn get_updates(&self, params: &GetUpdates) -> Result<Vec<Update>, BotApiError> {
        BotClient::get_updates(self, params).await
    }
}
