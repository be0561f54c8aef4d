//! Transaction interpreter backed by an OpenAI-compatible chat API.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Transaction, TransactionInterpreter};

const SYSTEM_PROMPT: &str = "Convert the periodic transaction report details into a json structure. \
Respond with a JSON object holding a \"transactions\" array. Each transaction has the fields \
asset, type (Sale, Purchase or Sale (partial)), date, notification_date, amount, capital_gains \
and optionally owner and details.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PeriodicTransactionReport {
    transactions: Vec<Transaction>,
}

/// Sends filing text to `{base_url}/chat/completions` in JSON mode.
pub struct OpenAiInterpreter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiInterpreter {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    /// Same as [`new`](Self::new), reading the key from `key_env`.
    pub fn from_env(base_url: &str, model: &str, key_env: &str, timeout: Duration) -> Result<Self> {
        let key = std::env::var(key_env).ok().filter(|k| !k.is_empty());
        if key.is_none() {
            tracing::warn!(env = key_env, "no LLM API key set, requests will be unauthenticated");
        }
        Self::new(base_url, model, key, timeout)
    }
}

#[async_trait::async_trait]
impl TransactionInterpreter for OpenAiInterpreter {
    async fn interpret(&self, text: &str) -> Result<Vec<Transaction>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        debug!(%url, model = %self.model, chars = text.len(), "requesting completion");

        let response: ChatResponse = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("POST {}", url))?
            .json()
            .await
            .context("decoding completion response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("completion had no message content"))?;

        parse_transactions(&content).map_err(|e| {
            error!("{:#}", e);
            anyhow!("trouble parsing the model response")
        })
    }
}

/// Parse the model's JSON message into transactions.
fn parse_transactions(content: &str) -> Result<Vec<Transaction>> {
    let report: PeriodicTransactionReport =
        serde_json::from_str(content).context("model response is not a transaction report")?;
    Ok(report.transactions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transactions() {
        let content = r#"{
            "filer": {"name": "Hon. Jane Doe"},
            "transactions": [
                {"id": "1", "asset": "Apple Inc. (AAPL)", "type": "Purchase", "date": "01/02/2024",
                 "notification_date": "01/10/2024", "amount": "$1,001 - $15,000",
                 "capital_gains": false, "owner": "SP"},
                {"asset": "Tesla (TSLA)", "type": "Sale (partial)", "date": "01/03/2024",
                 "notification_date": "01/10/2024", "amount": "$15,001 - $50,000",
                 "capital_gains": true}
            ]
        }"#;
        let txs = parse_transactions(content).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].kind, "Purchase");
        assert_eq!(txs[0].owner.as_deref(), Some("SP"));
        assert!(txs[1].capital_gains);
        assert!(txs[1].details.is_none());
    }

    #[test]
    fn test_parse_rejects_non_report() {
        assert!(parse_transactions("not json").is_err());
        assert!(parse_transactions(r#"{"summary": "none"}"#).is_err());
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "x",
            }],
            response_format: ResponseFormat { kind: "json_object" },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let i = OpenAiInterpreter::new("http://localhost:1234/v1/", "m", None, Duration::from_secs(1)).unwrap();
        assert_eq!(i.base_url, "http://localhost:1234/v1");
    }
}
