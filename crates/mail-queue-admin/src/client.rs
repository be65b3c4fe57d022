use anyhow::{bail, Context};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use uuid::Uuid;

/// Thin wrapper over the mail queue REST API.
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        ApiClient {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        message: &str,
    ) -> anyhow::Result<Value> {
        let body = json!({
            "recipient_email": recipient,
            "subject": subject,
            "message": message,
        });
        let response = self.http.post(self.url("/send-email")).json(&body).send().await?;
        Self::parse(response).await
    }

    pub async fn send_bulk(
        &self,
        recipients: &[String],
        subject: &str,
        message: &str,
    ) -> anyhow::Result<Value> {
        let body = json!({
            "email_list": recipients,
            "subject": subject,
            "message": message,
        });
        let response = self
            .http
            .post(self.url("/send-bulk-emails"))
            .json(&body)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn task_status(&self, task_id: &Uuid) -> anyhow::Result<Value> {
        let response = self
            .http
            .get(self.url(&format!("/task/{}", task_id)))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn queue_status(&self) -> anyhow::Result<Value> {
        let response = self.http.get(self.url("/queue-status")).send().await?;
        Self::parse(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse(response: Response) -> anyhow::Result<Value> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Unexpected response body (HTTP {})", status))?;

        if !status.is_success() {
            bail!("{}", describe_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}

/// One-line description of an API error body
pub fn describe_error(status: u16, body: &Value) -> String {
    let message = body["error"].as_str().unwrap_or("request failed");
    match body.get("queue_length").and_then(Value::as_u64) {
        Some(queue_length) => {
            format!("HTTP {}: {} (queue length {})", status, message, queue_length)
        }
        None => format!("HTTP {}: {}", status, message),
    }
}
