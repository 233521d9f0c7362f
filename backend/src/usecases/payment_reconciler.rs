use std::sync::Arc;

use courtbook::{
    domain::{
        entities::payments::PaymentEntity,
        repositories::payments::PaymentRepository,
        value_objects::{enums::payment_statuses::PaymentStatus, payments::PaymentStatusDto},
    },
    payments::stripe_client::{StripeEvent, WebhookVerificationError},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    payment_intents::{PaymentError, UseCaseResult},
    stripe_gateway::StripeGateway,
};

const DEFAULT_FAILURE_MESSAGE: &str = "Payment failed";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    Signature(#[source] WebhookVerificationError),
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WebhookError::Signature(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Applies processor notifications to stored payments. Every handler is idempotent:
/// a redelivered event finds the state it would write and leaves it alone.
pub struct PaymentReconcileUseCase<Pay, Stripe>
where
    Pay: PaymentRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    payment_repo: Arc<Pay>,
    stripe_client: Arc<Stripe>,
}

impl<Pay, Stripe> PaymentReconcileUseCase<Pay, Stripe>
where
    Pay: PaymentRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(payment_repo: Arc<Pay>, stripe_client: Arc<Stripe>) -> Self {
        Self {
            payment_repo,
            stripe_client,
        }
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), WebhookError> {
        let event = self
            .stripe_client
            .construct_event(payload, signature)
            .map_err(|err| match err {
                WebhookVerificationError::Payload(parse_error) => {
                    WebhookError::InvalidPayload(parse_error.to_string())
                }
                signature_error => WebhookError::Signature(signature_error),
            })?;

        info!(
            event_id = ?event.id,
            event_type = %event.type_,
            "payments: webhook received"
        );

        match event.type_.as_str() {
            "payment_intent.succeeded" => self.on_intent_succeeded(&event).await,
            "payment_intent.payment_failed" => self.on_intent_failed(&event).await,
            "charge.succeeded" => self.on_charge_succeeded(&event).await,
            other => {
                debug!(event_type = %other, "payments: ignoring webhook event");
                Ok(())
            }
        }
    }

    async fn on_intent_succeeded(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let intent = event.payment_intent().ok_or_else(|| {
            WebhookError::InvalidPayload("payment_intent object missing".to_string())
        })?;

        let Some(payment) = self.find_by_intent(&intent.id).await? else {
            info!(intent_id = %intent.id, "payments: no payment for succeeded intent");
            return Ok(());
        };

        if payment.payment_status() == Some(PaymentStatus::Succeeded) {
            debug!(payment_id = %payment.id, "payments: payment already succeeded");
            return Ok(());
        }

        self.payment_repo
            .mark_succeeded(payment.id)
            .await
            .map_err(|err| {
                error!(
                    payment_id = %payment.id,
                    db_error = ?err,
                    "payments: failed to mark payment succeeded"
                );
                WebhookError::Internal(err)
            })?;

        info!(
            payment_id = %payment.id,
            rental_id = %payment.rental_id,
            intent_id = %intent.id,
            "payments: payment succeeded"
        );
        Ok(())
    }

    async fn on_intent_failed(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let intent = event.payment_intent().ok_or_else(|| {
            WebhookError::InvalidPayload("payment_intent object missing".to_string())
        })?;

        let Some(payment) = self.find_by_intent(&intent.id).await? else {
            info!(intent_id = %intent.id, "payments: no payment for failed intent");
            return Ok(());
        };

        let failure_message = intent
            .last_payment_error
            .and_then(|error| error.message)
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());

        let current = payment.payment_status();
        if current == Some(PaymentStatus::Failed)
            && payment.failure_message.as_deref() == Some(failure_message.as_str())
        {
            debug!(payment_id = %payment.id, "payments: failure already recorded");
            return Ok(());
        }
        if let Some(current) = current {
            // A repeated failure may still refresh the message.
            if current != PaymentStatus::Failed && !current.accepts(PaymentStatus::Failed) {
                warn!(
                    payment_id = %payment.id,
                    status = %current,
                    "payments: ignoring failure for a settled payment"
                );
                return Ok(());
            }
        }

        let updated = self
            .payment_repo
            .mark_failed(payment.id, failure_message.clone())
            .await
            .map_err(|err| {
                error!(
                    payment_id = %payment.id,
                    db_error = ?err,
                    "payments: failed to mark payment failed"
                );
                WebhookError::Internal(err)
            })?;

        match updated {
            Some(_) => warn!(
                payment_id = %payment.id,
                rental_id = %payment.rental_id,
                failure_message = %failure_message,
                "payments: payment failed"
            ),
            None => info!(
                payment_id = %payment.id,
                "payments: payment succeeded concurrently; failure ignored"
            ),
        }
        Ok(())
    }

    async fn on_charge_succeeded(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let charge = event
            .charge()
            .ok_or_else(|| WebhookError::InvalidPayload("charge object missing".to_string()))?;

        let Some(intent_id) = charge.payment_intent.as_deref() else {
            info!(charge_id = %charge.id, "payments: charge has no payment intent");
            return Ok(());
        };

        let Some(payment) = self.find_by_intent(intent_id).await? else {
            info!(%intent_id, "payments: no payment for charge");
            return Ok(());
        };

        let same_charge = payment.stripe_charge_id.as_deref() == Some(charge.id.as_str());
        let receipt_known = charge.receipt_url.is_none() || payment.receipt_url == charge.receipt_url;
        if same_charge && receipt_known {
            debug!(payment_id = %payment.id, "payments: charge already attached");
            return Ok(());
        }

        self.payment_repo
            .attach_charge(payment.id, charge.id.clone(), charge.receipt_url.clone())
            .await
            .map_err(|err| {
                error!(
                    payment_id = %payment.id,
                    charge_id = %charge.id,
                    db_error = ?err,
                    "payments: failed to attach charge"
                );
                WebhookError::Internal(err)
            })?;

        info!(
            payment_id = %payment.id,
            charge_id = %charge.id,
            has_receipt = charge.receipt_url.is_some(),
            "payments: charge attached"
        );
        Ok(())
    }

    /// Best-effort receipt backfill. Processor failures are logged and the stored
    /// payment is returned unchanged.
    pub async fn fetch_latest_receipt(
        &self,
        rental_id: Uuid,
    ) -> UseCaseResult<Option<PaymentEntity>> {
        let payment = self
            .payment_repo
            .find_by_rental_id(rental_id)
            .await
            .map_err(|err| {
                error!(%rental_id, db_error = ?err, "payments: failed to load payment");
                PaymentError::Internal(err)
            })?;

        let Some(payment) = payment else {
            return Ok(None);
        };
        if payment.receipt_url.is_some() {
            return Ok(Some(payment));
        }

        let intent = match self
            .stripe_client
            .retrieve_payment_intent(&payment.stripe_payment_intent_id)
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                warn!(
                    %rental_id,
                    intent_id = %payment.stripe_payment_intent_id,
                    stripe_error = ?err,
                    "payments: could not refresh payment intent"
                );
                return Ok(Some(payment));
            }
        };

        let Some(charge_id) = intent.latest_charge.filter(|_| intent.status == "succeeded") else {
            debug!(
                %rental_id,
                intent_status = %intent.status,
                "payments: no settled charge to take a receipt from"
            );
            return Ok(Some(payment));
        };

        let charge = match self.stripe_client.retrieve_charge(&charge_id).await {
            Ok(charge) => charge,
            Err(err) => {
                warn!(
                    %rental_id,
                    %charge_id,
                    stripe_error = ?err,
                    "payments: could not load charge for receipt"
                );
                return Ok(Some(payment));
            }
        };

        let Some(receipt_url) = charge.receipt_url else {
            return Ok(Some(payment));
        };

        let updated = self
            .payment_repo
            .record_receipt(payment.id, charge.id, receipt_url)
            .await
            .map_err(|err| {
                error!(
                    %rental_id,
                    payment_id = %payment.id,
                    db_error = ?err,
                    "payments: failed to backfill receipt"
                );
                PaymentError::Internal(err)
            })?;

        info!(%rental_id, payment_id = %updated.id, "payments: receipt backfilled");
        Ok(Some(updated))
    }

    pub async fn get_payment_status(&self, rental_id: Uuid) -> UseCaseResult<PaymentStatusDto> {
        let payment = self
            .fetch_latest_receipt(rental_id)
            .await?
            .ok_or(PaymentError::NotFound {
                entity: "payment",
                id: rental_id,
            })?;

        Ok(payment.into())
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<PaymentEntity>, WebhookError> {
        self.payment_repo
            .find_by_intent_id(intent_id.to_string())
            .await
            .map_err(|err| {
                error!(%intent_id, db_error = ?err, "payments: failed to load payment by intent");
                WebhookError::Internal(err)
            })
    }
}
