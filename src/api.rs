use crate::error::ApiError;
use crate::types::{
    ExternalSubscription, RenewalReminder, RpcRequest, RpcResponse, SignedIntegersParams,
    SignedIntegersResult, SignedNumbers, VerifySignatureParams, VerifySignatureResult, Winner,
    WinnersNotification,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Verifiable source of draw numbers.
#[allow(async_fn_in_trait)]
pub trait RandomnessSource {
    /// `n` unique integers in `[min, max]` without replacement, with a signature over the result.
    async fn signed_integers(
        &self,
        n: usize,
        min: u8,
        max: u8,
        user_data: Value,
    ) -> Result<SignedNumbers, ApiError>;

    async fn verify_signature(&self, random: Value, signature: &str) -> Result<bool, ApiError>;
}

#[allow(async_fn_in_trait)]
pub trait PaymentProcessor {
    async fn retrieve_subscription(&self, id: &str) -> Result<ExternalSubscription, ApiError>;
}

#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify_winners(
        &self,
        draw_id: i64,
        draw_date: &str,
        winners: &[Winner],
    ) -> Result<(), ApiError>;

    async fn send_renewal_reminder(
        &self,
        user_id: &str,
        next_draw_date: &str,
        lines: usize,
    ) -> Result<(), ApiError>;
}

// random.org

pub struct RandomOrgClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl RandomOrgClient {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn invoke<P, T>(&self, method: &'static str, params: P) -> Result<T, ApiError>
    where
        P: serde::Serialize,
        T: DeserializeOwned,
    {
        let request_body = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;

        let rpc: RpcResponse<T> = response.json().await?;
        if let Some(error) = rpc.error {
            return Err(ApiError::Remote {
                service: "random.org",
                code: error.code,
                message: error.message,
            });
        }
        rpc.result
            .ok_or_else(|| ApiError::Malformed("random.org", format!("{} had no result", method)))
    }
}

impl RandomnessSource for RandomOrgClient {
    async fn signed_integers(
        &self,
        n: usize,
        min: u8,
        max: u8,
        user_data: Value,
    ) -> Result<SignedNumbers, ApiError> {
        let params = SignedIntegersParams {
            api_key: self.api_key.clone(),
            n,
            min,
            max,
            replacement: false,
            user_data,
        };
        let result: SignedIntegersResult = self.invoke("generateSignedIntegers", params).await?;

        let numbers = result
            .random
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ApiError::Malformed("random.org", "missing random.data".to_string()))?
            .iter()
            .map(|v| v.as_i64())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ApiError::Malformed("random.org", "non-integer data".to_string()))?;

        Ok(SignedNumbers {
            numbers,
            random: result.random,
            signature: result.signature,
        })
    }

    async fn verify_signature(&self, random: Value, signature: &str) -> Result<bool, ApiError> {
        let params = VerifySignatureParams {
            random,
            signature: signature.to_string(),
        };
        let result: VerifySignatureResult = self.invoke("verifySignature", params).await?;
        Ok(result.authenticity)
    }
}

// Stripe

pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct StripeSubscription {
    id: String,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    items: Option<StripeList>,
}

#[derive(Deserialize)]
struct StripeList {
    data: Vec<StripeItem>,
}

#[derive(Deserialize)]
struct StripeItem {
    current_period_end: Option<i64>,
}

impl StripeClient {
    pub fn new(base_url: &str, secret_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }
}

impl PaymentProcessor for StripeClient {
    async fn retrieve_subscription(&self, id: &str) -> Result<ExternalSubscription, ApiError> {
        let response = self
            .client
            .get(format!("{}/v1/subscriptions/{}", self.base_url, id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?
            .error_for_status()?;

        let raw: StripeSubscription = response.json().await?;

        // Newer API versions report the period on the subscription items.
        let current_period_end = raw
            .current_period_end
            .or_else(|| {
                raw.items
                    .as_ref()
                    .and_then(|items| items.data.iter().filter_map(|i| i.current_period_end).max())
            })
            .ok_or_else(|| {
                ApiError::Malformed("stripe", format!("{} has no current_period_end", raw.id))
            })?;

        Ok(ExternalSubscription {
            id: raw.id,
            status: raw.status,
            current_period_end,
        })
    }
}

// Notification functions

pub struct HttpNotifier {
    client: reqwest::Client,
    winners_url: String,
    reminder_url: String,
}

impl HttpNotifier {
    pub fn new(winners_url: &str, reminder_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            winners_url: winners_url.to_string(),
            reminder_url: reminder_url.to_string(),
        }
    }
}

impl Notifier for HttpNotifier {
    async fn notify_winners(
        &self,
        draw_id: i64,
        draw_date: &str,
        winners: &[Winner],
    ) -> Result<(), ApiError> {
        let body = WinnersNotification {
            draw_id,
            draw_date,
            winners,
        };
        self.client
            .post(&self.winners_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn send_renewal_reminder(
        &self,
        user_id: &str,
        next_draw_date: &str,
        lines: usize,
    ) -> Result<(), ApiError> {
        let body = RenewalReminder {
            user_id,
            next_draw_date,
            lines,
        };
        self.client
            .post(&self.reminder_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
