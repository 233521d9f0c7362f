use std::{collections::HashMap, sync::Arc};

use courtbook::{
    domain::{
        entities::payments::{DEFAULT_CURRENCY, InsertPaymentEntity},
        repositories::{payments::PaymentRepository, rentals::RentalRepository},
        value_objects::{
            enums::payment_statuses::PaymentStatus, payments::PaymentIntentDto, pricing,
        },
    },
    payments::stripe_client::{CreatePaymentIntentRequest, CreatedPaymentIntent},
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::stripe_gateway::StripeGateway;

/// Currency code sent to the processor; stored payments keep [`DEFAULT_CURRENCY`].
const PROCESSOR_CURRENCY: &str = "eur";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("rental has no payable amount")]
    InvalidAmount,
    #[error("rental is already paid")]
    AlreadyPaid,
    #[error("payer email is required")]
    MissingEmail,
    #[error("rental is cancelled")]
    RentalCancelled,
    #[error("rental changed while the payment was being created")]
    RentalChanged,
    #[error("payment processor error")]
    PaymentProcessor(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PaymentError::NotFound { .. } => StatusCode::NOT_FOUND,
            PaymentError::InvalidAmount | PaymentError::MissingEmail => StatusCode::BAD_REQUEST,
            PaymentError::AlreadyPaid
            | PaymentError::RentalCancelled
            | PaymentError::RentalChanged => StatusCode::CONFLICT,
            PaymentError::PaymentProcessor(_) => StatusCode::BAD_GATEWAY,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentError>;

pub struct PaymentIntentUseCase<Pay, R, Stripe>
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    payment_repo: Arc<Pay>,
    rental_repo: Arc<R>,
    stripe_client: Arc<Stripe>,
}

impl<Pay, R, Stripe> PaymentIntentUseCase<Pay, R, Stripe>
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(payment_repo: Arc<Pay>, rental_repo: Arc<R>, stripe_client: Arc<Stripe>) -> Self {
        Self {
            payment_repo,
            rental_repo,
            stripe_client,
        }
    }

    pub async fn create_intent(
        &self,
        rental_id: Uuid,
        payer_email: Option<String>,
    ) -> UseCaseResult<PaymentIntentDto> {
        info!(%rental_id, "payments: creating payment intent");

        let rental = self
            .rental_repo
            .find_by_id(rental_id)
            .await
            .map_err(|err| {
                error!(%rental_id, db_error = ?err, "payments: failed to load rental");
                PaymentError::Internal(err)
            })?
            .ok_or(PaymentError::NotFound {
                entity: "rental",
                id: rental_id,
            })?;

        if rental.is_cancelled() {
            return Err(PaymentError::RentalCancelled);
        }

        let total_price = match rental.total_price {
            Some(total) if total > 0.0 => total,
            _ => return Err(PaymentError::InvalidAmount),
        };

        let payer_email = payer_email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty())
            .ok_or(PaymentError::MissingEmail)?;

        let existing = self
            .payment_repo
            .find_by_rental_id(rental_id)
            .await
            .map_err(|err| {
                error!(%rental_id, db_error = ?err, "payments: failed to load payment");
                PaymentError::Internal(err)
            })?;

        let Some(existing) = existing else {
            let intent = self
                .request_intent(rental_id, rental.facility_id, total_price, &payer_email)
                .await?;

            let payment = self
                .payment_repo
                .create_pending(InsertPaymentEntity {
                    rental_id,
                    stripe_payment_intent_id: intent.id.clone(),
                    amount: total_price,
                    currency: DEFAULT_CURRENCY.to_string(),
                    status: PaymentStatus::Pending.to_string(),
                    customer_email: payer_email,
                })
                .await
                .map_err(|err| {
                    error!(
                        %rental_id,
                        intent_id = %intent.id,
                        db_error = ?err,
                        "payments: failed to record pending payment"
                    );
                    PaymentError::Internal(err)
                })?;

            // Rescheduled or paid elsewhere since the read; the new intent is never confirmed.
            let Some(payment) = payment else {
                warn!(
                    %rental_id,
                    intent_id = %intent.id,
                    "payments: rental changed during intent creation"
                );
                return Err(PaymentError::RentalChanged);
            };

            info!(
                %rental_id,
                payment_id = %payment.id,
                intent_id = %intent.id,
                "payments: payment intent created"
            );
            return Ok(PaymentIntentDto {
                client_secret: intent.client_secret,
                payment_id: payment.id,
            });
        };

        if existing.payment_status() == Some(PaymentStatus::Succeeded) {
            info!(%rental_id, payment_id = %existing.id, "payments: rental already paid");
            return Err(PaymentError::AlreadyPaid);
        }

        match self
            .stripe_client
            .retrieve_payment_intent(&existing.stripe_payment_intent_id)
            .await
        {
            Ok(intent) => {
                if let Some(client_secret) = intent.client_secret {
                    info!(
                        %rental_id,
                        payment_id = %existing.id,
                        intent_id = %intent.id,
                        "payments: reusing existing payment intent"
                    );
                    return Ok(PaymentIntentDto {
                        client_secret,
                        payment_id: existing.id,
                    });
                }
                warn!(
                    %rental_id,
                    intent_id = %existing.stripe_payment_intent_id,
                    "payments: existing intent has no client secret; creating a new one"
                );
            }
            Err(err) => {
                warn!(
                    %rental_id,
                    intent_id = %existing.stripe_payment_intent_id,
                    stripe_error = ?err,
                    "payments: existing intent could not be retrieved; creating a new one"
                );
            }
        }

        // The replacement keeps the amount recorded on the original payment.
        let intent = self
            .request_intent(rental_id, rental.facility_id, existing.amount, &payer_email)
            .await?;

        let payment = self
            .payment_repo
            .replace_intent(existing.id, intent.id.clone())
            .await
            .map_err(|err| {
                error!(
                    %rental_id,
                    payment_id = %existing.id,
                    intent_id = %intent.id,
                    db_error = ?err,
                    "payments: failed to replace payment intent"
                );
                PaymentError::Internal(err)
            })?
            .ok_or(PaymentError::AlreadyPaid)?;

        info!(
            %rental_id,
            payment_id = %payment.id,
            intent_id = %intent.id,
            "payments: payment intent replaced"
        );
        Ok(PaymentIntentDto {
            client_secret: intent.client_secret,
            payment_id: payment.id,
        })
    }

    async fn request_intent(
        &self,
        rental_id: Uuid,
        facility_id: Uuid,
        amount: f64,
        payer_email: &str,
    ) -> UseCaseResult<CreatedPaymentIntent> {
        let amount_minor = pricing::to_minor_units(amount);
        if amount_minor <= 0 {
            return Err(PaymentError::InvalidAmount);
        }

        let metadata = HashMap::from([
            ("rental_id".to_string(), rental_id.to_string()),
            ("facility_id".to_string(), facility_id.to_string()),
        ]);

        self.stripe_client
            .create_payment_intent(CreatePaymentIntentRequest {
                amount_minor,
                currency: PROCESSOR_CURRENCY.to_string(),
                receipt_email: payer_email.to_string(),
                description: format!("Rental {rental_id}"),
                metadata,
            })
            .await
            .map_err(|err| {
                error!(
                    %rental_id,
                    amount_minor,
                    stripe_error = ?err,
                    "payments: payment processor rejected intent creation"
                );
                PaymentError::PaymentProcessor(err)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::{
        stripe_gateway::MockStripeGateway,
        test_support::{InMemoryRentals, payment_for, rental_at},
    };
    use anyhow::anyhow;
    use chrono::{Duration, Utc};
    use courtbook::{
        domain::{
            entities::{payments::PaymentEntity, rentals::RentalEntity},
            repositories::{payments::MockPaymentRepository, rentals::MockRentalRepository},
            value_objects::enums::rental_statuses::RentalStatus,
        },
        payments::stripe_client::StripePaymentIntent,
    };
    use mockall::predicate::eq;

    fn upcoming_rental(total_price: Option<f64>) -> RentalEntity {
        let starts_at = Utc::now() + Duration::days(1);
        let mut rental = rental_at(Uuid::new_v4(), starts_at, starts_at + Duration::hours(2));
        rental.total_price = total_price;
        rental
    }

    fn rentals_returning(rental: RentalEntity) -> MockRentalRepository {
        let mut rentals = MockRentalRepository::new();
        let rental_id = rental.id;
        rentals
            .expect_find_by_id()
            .with(eq(rental_id))
            .returning(move |_| {
                let rental = rental.clone();
                Box::pin(async move { Ok(Some(rental)) })
            });
        rentals
    }

    fn payments_returning(existing: Option<PaymentEntity>) -> MockPaymentRepository {
        let mut payments = MockPaymentRepository::new();
        payments.expect_find_by_rental_id().returning(move |_| {
            let existing = existing.clone();
            Box::pin(async move { Ok(existing) })
        });
        payments
    }

    fn intent(id: &str, client_secret: Option<&str>) -> StripePaymentIntent {
        StripePaymentIntent {
            id: id.to_string(),
            status: "requires_payment_method".to_string(),
            client_secret: client_secret.map(str::to_string),
            latest_charge: None,
            last_payment_error: None,
        }
    }

    fn usecase(
        payments: MockPaymentRepository,
        rentals: MockRentalRepository,
        stripe: MockStripeGateway,
    ) -> PaymentIntentUseCase<MockPaymentRepository, MockRentalRepository, MockStripeGateway> {
        PaymentIntentUseCase::new(Arc::new(payments), Arc::new(rentals), Arc::new(stripe))
    }

    fn email() -> Option<String> {
        Some("renter@example.com".to_string())
    }

    #[tokio::test]
    async fn creates_intent_in_minor_units_and_records_pending_payment() {
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;
        let facility_id = rental.facility_id;

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_create_payment_intent()
            .withf(move |request| {
                request.amount_minor == 3000
                    && request.currency == "eur"
                    && request.receipt_email == "renter@example.com"
                    && request.metadata.get("rental_id") == Some(&rental_id.to_string())
                    && request.metadata.get("facility_id") == Some(&facility_id.to_string())
            })
            .times(1)
            .returning(|_| {
                Ok(CreatedPaymentIntent {
                    id: "pi_new".to_string(),
                    client_secret: "pi_new_secret".to_string(),
                })
            });

        let mut payments = payments_returning(None);
        payments
            .expect_create_pending()
            .withf(move |payment| {
                payment.rental_id == rental_id
                    && payment.stripe_payment_intent_id == "pi_new"
                    && payment.amount == 30.0
                    && payment.currency == "EUR"
                    && payment.status == "PENDING"
            })
            .times(1)
            .returning(move |payment| {
                let created = payment_for(
                    payment.rental_id,
                    &payment.stripe_payment_intent_id,
                    PaymentStatus::Pending,
                );
                Box::pin(async move { Ok(Some(created)) })
            });

        let result = usecase(payments, rentals_returning(rental), stripe)
            .create_intent(rental_id, email())
            .await
            .unwrap();

        assert_eq!(result.client_secret, "pi_new_secret");
    }

    #[tokio::test]
    async fn zero_or_missing_amount_is_rejected_before_calling_the_processor() {
        for total in [None, Some(0.0), Some(-5.0)] {
            let rental = upcoming_rental(total);
            let rental_id = rental.id;

            // No expectations on the processor: a call would panic.
            let err = usecase(
                MockPaymentRepository::new(),
                rentals_returning(rental),
                MockStripeGateway::new(),
            )
            .create_intent(rental_id, email())
            .await
            .unwrap_err();

            assert!(matches!(err, PaymentError::InvalidAmount));
            assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn missing_email_is_rejected() {
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;

        let err = usecase(
            MockPaymentRepository::new(),
            rentals_returning(rental),
            MockStripeGateway::new(),
        )
        .create_intent(rental_id, Some("   ".to_string()))
        .await
        .unwrap_err();

        assert!(matches!(err, PaymentError::MissingEmail));
    }

    #[tokio::test]
    async fn unknown_rental_is_not_found() {
        let mut rentals = MockRentalRepository::new();
        rentals
            .expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        let err = usecase(MockPaymentRepository::new(), rentals, MockStripeGateway::new())
            .create_intent(Uuid::new_v4(), email())
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::NotFound { entity: "rental", .. }));
    }

    #[tokio::test]
    async fn cancelled_rental_cannot_be_paid() {
        let mut rental = upcoming_rental(Some(30.0));
        rental.status = RentalStatus::Cancelled.to_string();
        let rental_id = rental.id;

        let err = usecase(
            MockPaymentRepository::new(),
            rentals_returning(rental),
            MockStripeGateway::new(),
        )
        .create_intent(rental_id, email())
        .await
        .unwrap_err();

        assert!(matches!(err, PaymentError::RentalCancelled));
    }

    #[tokio::test]
    async fn succeeded_payment_is_already_paid() {
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;
        let paid = payment_for(rental_id, "pi_paid", PaymentStatus::Succeeded);

        let err = usecase(
            payments_returning(Some(paid)),
            rentals_returning(rental),
            MockStripeGateway::new(),
        )
        .create_intent(rental_id, email())
        .await
        .unwrap_err();

        assert!(matches!(err, PaymentError::AlreadyPaid));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn pending_payment_returns_the_existing_client_secret() {
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;
        let pending = payment_for(rental_id, "pi_existing", PaymentStatus::Pending);
        let payment_id = pending.id;

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_retrieve_payment_intent()
            .withf(|intent_id| intent_id == "pi_existing")
            .times(1)
            .returning(|_| Ok(intent("pi_existing", Some("pi_existing_secret"))));
        stripe.expect_create_payment_intent().never();

        let result = usecase(payments_returning(Some(pending)), rentals_returning(rental), stripe)
            .create_intent(rental_id, email())
            .await
            .unwrap();

        assert_eq!(result.client_secret, "pi_existing_secret");
        assert_eq!(result.payment_id, payment_id);
    }

    #[tokio::test]
    async fn stale_intent_is_replaced_on_the_same_payment() {
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;
        let mut stale = payment_for(rental_id, "pi_stale", PaymentStatus::Failed);
        stale.amount = 45.5;
        let payment_id = stale.id;

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_retrieve_payment_intent()
            .returning(|_| Err(anyhow!("No such payment_intent")));
        stripe
            .expect_create_payment_intent()
            .withf(|request| request.amount_minor == 4550)
            .times(1)
            .returning(|_| {
                Ok(CreatedPaymentIntent {
                    id: "pi_fresh".to_string(),
                    client_secret: "pi_fresh_secret".to_string(),
                })
            });

        let mut payments = payments_returning(Some(stale.clone()));
        payments.expect_create_pending().never();
        payments
            .expect_replace_intent()
            .with(eq(payment_id), eq("pi_fresh".to_string()))
            .times(1)
            .returning(move |_, intent_id| {
                let mut replaced = stale.clone();
                replaced.stripe_payment_intent_id = intent_id;
                replaced.status = PaymentStatus::Pending.to_string();
                Box::pin(async move { Ok(Some(replaced)) })
            });

        let result = usecase(payments, rentals_returning(rental), stripe)
            .create_intent(rental_id, email())
            .await
            .unwrap();

        assert_eq!(result.client_secret, "pi_fresh_secret");
        assert_eq!(result.payment_id, payment_id);
    }

    #[tokio::test]
    async fn payment_that_succeeds_during_replacement_is_already_paid() {
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;
        let stale = payment_for(rental_id, "pi_stale", PaymentStatus::Failed);

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_retrieve_payment_intent()
            .returning(|_| Err(anyhow!("No such payment_intent")));
        stripe.expect_create_payment_intent().returning(|_| {
            Ok(CreatedPaymentIntent {
                id: "pi_fresh".to_string(),
                client_secret: "pi_fresh_secret".to_string(),
            })
        });

        // The webhook marked the payment succeeded between the read and the replace.
        let mut payments = payments_returning(Some(stale));
        payments
            .expect_replace_intent()
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(None) }));

        let err = usecase(payments, rentals_returning(rental), stripe)
            .create_intent(rental_id, email())
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::AlreadyPaid));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn price_change_during_intent_creation_records_nothing() {
        let rentals = InMemoryRentals::default();
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;
        rentals.insert(rental);
        let payments = rentals.payments();

        let mut stripe = MockStripeGateway::new();
        let concurrent = rentals.clone();
        stripe
            .expect_create_payment_intent()
            .times(1)
            .returning(move |request| {
                assert_eq!(request.amount_minor, 3000);
                // An update to a four hour slot commits while the processor call is in flight.
                concurrent.modify(rental_id, |rental| rental.total_price = Some(60.0));
                Ok(CreatedPaymentIntent {
                    id: "pi_stale_amount".to_string(),
                    client_secret: "pi_stale_amount_secret".to_string(),
                })
            });

        let err = PaymentIntentUseCase::new(
            Arc::new(payments.clone()),
            Arc::new(rentals.clone()),
            Arc::new(stripe),
        )
        .create_intent(rental_id, email())
        .await
        .unwrap_err();

        assert!(matches!(err, PaymentError::RentalChanged));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        assert!(payments.snapshot().is_empty());
        assert_eq!(rentals.rental(rental_id).payment_status, "UNPAID");

        // A retry charges the new price.
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_create_payment_intent()
            .withf(|request| request.amount_minor == 6000)
            .times(1)
            .returning(|_| {
                Ok(CreatedPaymentIntent {
                    id: "pi_retry".to_string(),
                    client_secret: "pi_retry_secret".to_string(),
                })
            });

        PaymentIntentUseCase::new(
            Arc::new(payments.clone()),
            Arc::new(rentals.clone()),
            Arc::new(stripe),
        )
        .create_intent(rental_id, email())
        .await
        .unwrap();

        let recorded = payments.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].amount, 60.0);
        assert_eq!(rentals.rental(rental_id).payment_status, "PENDING");
    }

    #[tokio::test]
    async fn processor_failure_is_a_distinct_error_and_nothing_is_recorded() {
        let rental = upcoming_rental(Some(30.0));
        let rental_id = rental.id;

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_create_payment_intent()
            .returning(|_| Err(anyhow!("connection timed out")));

        let mut payments = payments_returning(None);
        payments.expect_create_pending().never();

        let err = usecase(payments, rentals_returning(rental), stripe)
            .create_intent(rental_id, email())
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::PaymentProcessor(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
