use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use courtbook::{
    domain::{
        repositories::{payments::PaymentRepository, rentals::RentalRepository},
        value_objects::payments::PaymentConfigDto,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{payments::PaymentPostgres, rentals::RentalPostgres},
    },
    payments::stripe_client::StripeClient,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::{error_response, log_failure},
    usecases::{
        payment_intents::PaymentIntentUseCase, payment_reconciler::PaymentReconcileUseCase,
        stripe_gateway::StripeGateway,
    },
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub struct PaymentsState<Pay, R, Stripe>
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub intents: PaymentIntentUseCase<Pay, R, Stripe>,
    pub reconciler: PaymentReconcileUseCase<Pay, Stripe>,
    pub publishable_key: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentQuery {
    pub email: Option<String>,
}

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    stripe_client: Arc<StripeClient>,
    publishable_key: String,
) -> Router {
    let payment_repository = Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));
    let rental_repository = Arc::new(RentalPostgres::new(Arc::clone(&db_pool)));

    let state = PaymentsState {
        intents: PaymentIntentUseCase::new(
            Arc::clone(&payment_repository),
            rental_repository,
            Arc::clone(&stripe_client),
        ),
        reconciler: PaymentReconcileUseCase::new(payment_repository, stripe_client),
        publishable_key,
    };

    router(Arc::new(state))
}

pub fn router<Pay, R, Stripe>(state: Arc<PaymentsState<Pay, R, Stripe>>) -> Router
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/create-intent/:rental_id", post(create_intent))
        .route("/status/:rental_id", get(payment_status))
        .route("/config", get(payment_config))
        .route("/webhook", post(stripe_webhook))
        .with_state(state)
}

pub async fn create_intent<Pay, R, Stripe>(
    State(state): State<Arc<PaymentsState<Pay, R, Stripe>>>,
    AuthUser { user_id, email, .. }: AuthUser,
    Path(rental_id): Path<Uuid>,
    Query(query): Query<CreateIntentQuery>,
) -> impl IntoResponse
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    info!(%user_id, %rental_id, "payments: create intent requested");

    let payer_email = query.email.or(email);
    match state.intents.create_intent(rental_id, payer_email).await {
        Ok(intent) => Json(intent).into_response(),
        Err(err) => {
            log_failure("payments: create intent", err.status_code(), &err);
            err.into_response()
        }
    }
}

pub async fn payment_status<Pay, R, Stripe>(
    State(state): State<Arc<PaymentsState<Pay, R, Stripe>>>,
    _auth: AuthUser,
    Path(rental_id): Path<Uuid>,
) -> impl IntoResponse
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    match state.reconciler.get_payment_status(rental_id).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            log_failure("payments: status", err.status_code(), &err);
            err.into_response()
        }
    }
}

pub async fn payment_config<Pay, R, Stripe>(
    State(state): State<Arc<PaymentsState<Pay, R, Stripe>>>,
) -> impl IntoResponse
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    Json(PaymentConfigDto {
        publishable_key: state.publishable_key.clone(),
    })
}

/// Processor callback. Takes the raw body since the signature covers the exact bytes.
pub async fn stripe_webhook<Pay, R, Stripe>(
    State(state): State<Arc<PaymentsState<Pay, R, Stripe>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    Pay: PaymentRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let Some(signature) = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("payments: webhook without signature header");
        return error_response(StatusCode::BAD_REQUEST, "Invalid signature");
    };

    match state.reconciler.handle_stripe_webhook(&body, signature).await {
        Ok(()) => (StatusCode::OK, "Webhook processed").into_response(),
        Err(err) => {
            log_failure("payments: webhook", err.status_code(), &err);
            err.into_response()
        }
    }
}
