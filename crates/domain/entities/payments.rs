use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::payment_statuses::PaymentStatus,
    infra::db::postgres::schema::payments,
};

pub const DEFAULT_CURRENCY: &str = "EUR";

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub rental_id: Uuid,
    pub stripe_payment_intent_id: String,
    pub stripe_charge_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub receipt_url: Option<String>,
    pub customer_email: String,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub rental_id: Uuid,
    pub stripe_payment_intent_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub customer_email: String,
}
