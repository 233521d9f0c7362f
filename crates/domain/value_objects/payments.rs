use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::payments::PaymentEntity;

/// What the client needs to confirm the payment in the browser.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentIntentDto {
    pub client_secret: String,
    pub payment_id: Uuid,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentStatusDto {
    pub payment_id: Uuid,
    pub rental_id: Uuid,
    pub status: String,
    pub amount: f64,
    pub currency: String,
    pub receipt_url: Option<String>,
    pub customer_email: String,
    pub failure_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentEntity> for PaymentStatusDto {
    fn from(value: PaymentEntity) -> Self {
        Self {
            payment_id: value.id,
            rental_id: value.rental_id,
            status: value.status,
            amount: value.amount,
            currency: value.currency,
            receipt_url: value.receipt_url,
            customer_email: value.customer_email,
            failure_message: value.failure_message,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentConfigDto {
    pub publishable_key: String,
}
