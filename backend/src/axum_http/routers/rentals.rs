use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use courtbook::{
    domain::{
        repositories::{catalog::CatalogRepository, rentals::RentalRepository},
        value_objects::{booking_rules::BookingPolicy, rentals::RentalRequestModel},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{catalog::CatalogPostgres, rentals::RentalPostgres},
    },
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::log_failure,
    usecases::{booking_locks::BookingLocks, rentals::RentalUseCase},
};

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    booking_locks: Arc<BookingLocks>,
    policy: BookingPolicy,
) -> Router {
    let rental_repository = RentalPostgres::new(Arc::clone(&db_pool));
    let catalog_repository = CatalogPostgres::new(Arc::clone(&db_pool));
    let rental_usecase = RentalUseCase::new(
        Arc::new(rental_repository),
        Arc::new(catalog_repository),
        booking_locks,
        policy,
    );

    router(Arc::new(rental_usecase))
}

pub fn router<R, C>(rental_usecase: Arc<RentalUseCase<R, C>>) -> Router
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(create_rental).get(list_rentals))
        .route("/:rental_id", get(get_rental).put(update_rental))
        .route("/:rental_id/status", get(get_rental_status))
        .route("/:rental_id/cancel", post(cancel_rental))
        .with_state(rental_usecase)
}

pub async fn create_rental<R, C>(
    State(rental_usecase): State<Arc<RentalUseCase<R, C>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(request): Json<RentalRequestModel>,
) -> impl IntoResponse
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    info!(%user_id, facility_id = %request.facility_id, "rentals: create requested");

    match rental_usecase.create(user_id, request).await {
        Ok(rental) => (StatusCode::CREATED, Json(rental)).into_response(),
        Err(err) => {
            log_failure("rentals: create", err.status_code(), &err);
            err.into_response()
        }
    }
}

pub async fn list_rentals<R, C>(
    State(rental_usecase): State<Arc<RentalUseCase<R, C>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    match rental_usecase.list_for_renter(user_id).await {
        Ok(rentals) => Json(rentals).into_response(),
        Err(err) => {
            log_failure("rentals: list", err.status_code(), &err);
            err.into_response()
        }
    }
}

pub async fn get_rental<R, C>(
    State(rental_usecase): State<Arc<RentalUseCase<R, C>>>,
    AuthUser { user_id, .. }: AuthUser,
    Path(rental_id): Path<Uuid>,
) -> impl IntoResponse
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    match rental_usecase.get(user_id, rental_id).await {
        Ok(rental) => Json(rental).into_response(),
        Err(err) => {
            log_failure("rentals: get", err.status_code(), &err);
            err.into_response()
        }
    }
}

pub async fn get_rental_status<R, C>(
    State(rental_usecase): State<Arc<RentalUseCase<R, C>>>,
    AuthUser { user_id, .. }: AuthUser,
    Path(rental_id): Path<Uuid>,
) -> impl IntoResponse
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    match rental_usecase.get_status(user_id, rental_id).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            log_failure("rentals: get status", err.status_code(), &err);
            err.into_response()
        }
    }
}

pub async fn update_rental<R, C>(
    State(rental_usecase): State<Arc<RentalUseCase<R, C>>>,
    AuthUser { user_id, .. }: AuthUser,
    Path(rental_id): Path<Uuid>,
    Json(request): Json<RentalRequestModel>,
) -> impl IntoResponse
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    info!(%user_id, %rental_id, "rentals: update requested");

    match rental_usecase.update(user_id, rental_id, request).await {
        Ok(rental) => Json(rental).into_response(),
        Err(err) => {
            log_failure("rentals: update", err.status_code(), &err);
            err.into_response()
        }
    }
}

pub async fn cancel_rental<R, C>(
    State(rental_usecase): State<Arc<RentalUseCase<R, C>>>,
    AuthUser { user_id, .. }: AuthUser,
    Path(rental_id): Path<Uuid>,
) -> impl IntoResponse
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    info!(%user_id, %rental_id, "rentals: cancel requested");

    match rental_usecase.cancel(user_id, rental_id).await {
        Ok(rental) => Json(rental).into_response(),
        Err(err) => {
            log_failure("rentals: cancel", err.status_code(), &err);
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{AccessClaims, AuthConfig},
        axum_http::routers::captured_logs::capture_logs,
        usecases::test_support::{InMemoryRentals, facility, rental_at},
    };
    use axum::{
        Extension,
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use courtbook::domain::repositories::catalog::MockCatalogRepository;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 9, 30, 0).unwrap()
    }

    fn bearer(user_id: Uuid) -> String {
        let claims = AccessClaims {
            sub: user_id.to_string(),
            role: "authenticated".to_string(),
            email: Some("renter@example.com".to_string()),
            exp: 9999999999,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        format!("Bearer {token}")
    }

    fn app(rentals: InMemoryRentals, catalog: MockCatalogRepository) -> Router {
        let usecase = RentalUseCase::new(
            Arc::new(rentals),
            Arc::new(catalog),
            Arc::new(BookingLocks::new()),
            BookingPolicy::default(),
        )
        .with_clock(Arc::new(now));

        router(Arc::new(usecase)).layer(Extension(Arc::new(AuthConfig {
            jwt_secret: SECRET.to_string(),
        })))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn requests_without_a_token_are_rejected() {
        let response = app(InMemoryRentals::default(), MockCatalogRepository::new())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_returns_the_confirmed_rental() {
        let court = facility(20.0, None);
        let facility_id = court.id;
        let mut catalog = MockCatalogRepository::new();
        catalog.expect_find_facility().returning(move |_| {
            let court = court.clone();
            Box::pin(async move { Ok(Some(court)) })
        });
        catalog
            .expect_renter_exists()
            .returning(|_| Box::pin(async { Ok(true) }));

        let starts_at = now() + Duration::days(1);
        let body = serde_json::json!({
            "facility_id": facility_id,
            "starts_at": starts_at,
            "ends_at": starts_at + Duration::hours(2),
        });

        let response = app(InMemoryRentals::default(), catalog)
            .oneshot(
                Request::post("/")
                    .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let rental = json_body(response).await;
        assert_eq!(rental["status"], "CONFIRMED");
        assert_eq!(rental["total_price"], 40.0);
    }

    #[tokio::test]
    async fn foreign_rentals_are_reported_as_missing() {
        let rentals = InMemoryRentals::default();
        let starts_at = now() + Duration::days(1);
        let rental = rental_at(Uuid::new_v4(), starts_at, starts_at + Duration::hours(1));
        let rental_id = rental.id;
        rentals.insert(rental);

        let response = app(rentals, MockCatalogRepository::new())
            .oneshot(
                Request::get(format!("/{rental_id}/status"))
                    .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], 404);
    }

    #[tokio::test]
    async fn cancelling_twice_is_a_conflict() {
        let rentals = InMemoryRentals::default();
        let starts_at = now() + Duration::days(1);
        let rental = rental_at(Uuid::new_v4(), starts_at, starts_at + Duration::hours(1));
        let (rental_id, renter_id) = (rental.id, rental.renter_id);
        rentals.insert(rental);
        let app = app(rentals, MockCatalogRepository::new());

        let cancel = || {
            Request::post(format!("/{rental_id}/cancel"))
                .header(header::AUTHORIZATION, bearer(renter_id))
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(cancel()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(json_body(first).await["status"], "CANCELLED");

        let second = app.oneshot(cancel()).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failed_lookup_is_logged_by_the_router() {
        let (logs, _guard) = capture_logs();

        let response = app(InMemoryRentals::default(), MockCatalogRepository::new())
            .oneshot(
                Request::get(format!("/{}", Uuid::new_v4()))
                    .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let warnings = logs.lines_at("WARN");
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("rentals: get rejected"));
    }
}
