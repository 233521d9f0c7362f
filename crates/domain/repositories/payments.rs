use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payments::{InsertPaymentEntity, PaymentEntity};

#[async_trait]
#[automock]
pub trait PaymentRepository {
    async fn find_by_rental_id(&self, rental_id: Uuid) -> Result<Option<PaymentEntity>>;

    async fn find_by_intent_id(&self, intent_id: String) -> Result<Option<PaymentEntity>>;

    /// Records a pending payment and flags the rental as awaiting payment. Returns
    /// `None`, writing nothing, unless the rental is still unpaid at `payment.amount`.
    async fn create_pending(&self, payment: InsertPaymentEntity) -> Result<Option<PaymentEntity>>;

    /// Points an existing payment at a fresh intent and resets it to pending. A payment
    /// that has already succeeded is left alone and `None` is returned.
    async fn replace_intent(
        &self,
        payment_id: Uuid,
        intent_id: String,
    ) -> Result<Option<PaymentEntity>>;

    /// Payment succeeded and rental paid, in one transaction.
    async fn mark_succeeded(&self, payment_id: Uuid) -> Result<PaymentEntity>;

    /// Never overwrites a succeeded payment. Returns `None` when nothing changed.
    async fn mark_failed(
        &self,
        payment_id: Uuid,
        failure_message: String,
    ) -> Result<Option<PaymentEntity>>;

    async fn attach_charge(
        &self,
        payment_id: Uuid,
        charge_id: String,
        receipt_url: Option<String>,
    ) -> Result<PaymentEntity>;

    /// Backfills the receipt of a payment the processor reports as succeeded;
    /// also settles the payment and its rental.
    async fn record_receipt(
        &self,
        payment_id: Uuid,
        charge_id: String,
        receipt_url: String,
    ) -> Result<PaymentEntity>;
}
