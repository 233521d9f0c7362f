use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::error;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    webhook_tolerance_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StripePaymentError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
    pub client_secret: Option<String>,
    pub latest_charge: Option<String>,
    pub last_payment_error: Option<StripePaymentError>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub payment_intent: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentIntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub receipt_email: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Error)]
pub enum WebhookVerificationError {
    #[error("invalid webhook signature: {0}")]
    Signature(String),
    #[error("invalid webhook payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
    decline_code: Option<String>,
}

impl StripeEvent {
    pub fn payment_intent(&self) -> Option<StripePaymentIntent> {
        serde_json::from_value(self.data.object.clone()).ok()
    }

    pub fn charge(&self) -> Option<StripeCharge> {
        serde_json::from_value(self.data.object.clone()).ok()
    }
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        webhook_secret: String,
        timeout: Duration,
        webhook_tolerance_secs: i64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            secret_key,
            webhook_secret,
            webhook_tolerance_secs,
        })
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .or_else(|| resp.headers().get("stripe-request-id"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.as_deref()),
            stripe_error_message = ?details.as_ref().and_then(|d| d.message.as_deref()),
            stripe_decline_code = ?details.as_ref().and_then(|d| d.decline_code.as_deref()),
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    /// Creates a PaymentIntent and returns its id and client secret.
    pub async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<CreatedPaymentIntent> {
        // https://stripe.com/docs/api/payment_intents/create
        let mut body: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount_minor.to_string()),
            ("currency".to_string(), request.currency),
            ("receipt_email".to_string(), request.receipt_email),
            ("description".to_string(), request.description),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];

        for (key, value) in request.metadata {
            body.push((format!("metadata[{}]", key), value));
        }

        let resp = self
            .http
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create payment intent").await?;

        let intent: StripePaymentIntent = resp.json().await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| anyhow::anyhow!("Stripe PaymentIntent client secret is missing"))?;

        Ok(CreatedPaymentIntent {
            id: intent.id,
            client_secret,
        })
    }

    pub async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<StripePaymentIntent> {
        // https://stripe.com/docs/api/payment_intents/retrieve
        let resp = self
            .http
            .get(format!("{STRIPE_API_BASE}/payment_intents/{}", intent_id))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve payment intent").await?;

        let intent: StripePaymentIntent = resp.json().await?;
        Ok(intent)
    }

    pub async fn retrieve_charge(&self, charge_id: &str) -> Result<StripeCharge> {
        // https://stripe.com/docs/api/charges/retrieve
        let resp = self
            .http
            .get(format!("{STRIPE_API_BASE}/charges/{}", charge_id))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve charge").await?;

        let charge: StripeCharge = resp.json().await?;
        Ok(charge)
    }

    /// Verifies the `Stripe-Signature` header against the raw body and parses the event.
    pub fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, WebhookVerificationError> {
        verify_signature_at(
            &self.webhook_secret,
            payload,
            signature_header,
            Utc::now().timestamp(),
            self.webhook_tolerance_secs,
        )?;

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }
}

/// Checks a `t=<unix>,v1=<hex>[,v1=<hex>...]` header. Any matching `v1` entry is enough,
/// which keeps deliveries valid while the endpoint secret is being rolled.
pub fn verify_signature_at(
    webhook_secret: &str,
    payload: &[u8],
    signature_header: &str,
    now_ts: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookVerificationError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = Some(rest);
        } else if let Some(rest) = part.strip_prefix("v1=") {
            signatures.push(rest);
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        WebhookVerificationError::Signature("missing timestamp in stripe-signature".to_string())
    })?;
    if signatures.is_empty() {
        return Err(WebhookVerificationError::Signature(
            "missing v1 in stripe-signature".to_string(),
        ));
    }

    let signed_at: i64 = timestamp.parse().map_err(|_| {
        WebhookVerificationError::Signature("malformed timestamp in stripe-signature".to_string())
    })?;
    if (now_ts - signed_at).abs() > tolerance_secs {
        return Err(WebhookVerificationError::Signature(
            "timestamp outside the tolerance zone".to_string(),
        ));
    }

    let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed_payload.extend_from_slice(timestamp.as_bytes());
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    for signature in signatures {
        let Ok(provided) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
            .map_err(|err| WebhookVerificationError::Signature(err.to_string()))?;
        mac.update(&signed_payload);
        if mac.verify_slice(&provided).is_ok() {
            return Ok(());
        }
    }

    Err(WebhookVerificationError::Signature(
        "no v1 signature matches the payload".to_string(),
    ))
}
