use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use shared::*;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::coordinator::{BookingChange, BookingCoordinator, NewBooking};
use crate::error::BookingError;
use crate::reservations::ListFilter;
use crate::store::BookingStore;

pub const TENANT_HEADER: &str = "x-tenant-id";

pub struct AppState<S> {
    pub coordinator: Arc<BookingCoordinator<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<S: BookingStore> AppState<S> {
    pub fn new(coordinator: BookingCoordinator<S>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn reject(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

/// Status codes per error kind. Infrastructure detail stays in the log.
pub fn error_response(err: BookingError) -> ApiError {
    if err.is_infrastructure() {
        error!("Request failed: {:#}", anyhow::Error::from(err));
        return reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "the server encountered a problem and could not process your request",
        );
    }

    let status = match &err {
        BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BookingError::NotFound => StatusCode::NOT_FOUND,
        BookingError::PriceNotAvailable => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::NotAvailable
        | BookingError::RaceDetected { .. }
        | BookingError::EditConflict
        | BookingError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        BookingError::DeadlineExceeded(_) | BookingError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    reject(status, err.surfaced().to_string())
}

/// Tenant the request acts for, taken from the `x-tenant-id` header.
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub TenantId);

#[async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<TenantId>().ok())
            .map(Tenant)
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "missing or invalid tenant"))
    }
}

pub fn create_router<S: BookingStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/quote", get(quote::<S>))
        .route("/v1/availability", get(availability::<S>))
        .route("/v1/inventory", put(allocate_inventory::<S>))
        .route("/v1/rates", post(create_rates::<S>))
        .route(
            "/v1/reservations",
            post(create_reservation::<S>).get(list_reservations::<S>),
        )
        .route(
            "/v1/reservations/:id",
            get(get_reservation::<S>).patch(update_reservation::<S>),
        )
        .route("/v1/reservations/:id/cancel", post(cancel_reservation::<S>))
        .route("/v1/reservations/:id/status", post(transition_status::<S>))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(tower_http::cors::Any)
                        .allow_methods(tower_http::cors::Any)
                        .allow_headers(tower_http::cors::Any),
                ),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn quote<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<QuoteQuery>,
) -> ApiResult<Json<QuoteEnvelope>> {
    let stay = StayRange::parse(&query.start_date, &query.end_date)
        .map_err(|e| error_response(e.into()))?;

    let price_quote = state
        .coordinator
        .quote(tenant_id, query.room_type_id, query.rate_plan_id, stay)
        .await
        .map_err(error_response)?;

    Ok(Json(QuoteEnvelope { price_quote }))
}

pub async fn availability<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityEnvelope>> {
    let stay = StayRange::parse(&query.start_date, &query.end_date)
        .map_err(|e| error_response(e.into()))?;

    let availability = state
        .coordinator
        .get_availability(tenant_id, query.room_type_id, stay)
        .await
        .map_err(error_response)?;

    Ok(Json(AvailabilityEnvelope { availability }))
}

pub async fn allocate_inventory<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Json(request): Json<AllocateInventoryRequest>,
) -> ApiResult<Json<RecordsWritten>> {
    let stay = StayRange::parse(&request.start_date, &request.end_date)
        .map_err(|e| error_response(e.into()))?;

    let records = state
        .coordinator
        .allocate_inventory(tenant_id, request.room_type_id, stay, request.available_units)
        .await
        .map_err(error_response)?;

    Ok(Json(RecordsWritten {
        message: "inventory allocated".to_string(),
        records,
    }))
}

pub async fn create_rates<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Json(request): Json<CreateRatesRequest>,
) -> ApiResult<(StatusCode, Json<RecordsWritten>)> {
    let stay = StayRange::parse(&request.start_date, &request.end_date)
        .map_err(|e| error_response(e.into()))?;

    let records = state
        .coordinator
        .load_rates(
            tenant_id,
            request.room_type_id,
            request.rate_plan_id,
            stay,
            request.price_cents,
        )
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(RecordsWritten {
            message: "rates created successfully".to_string(),
            records,
        }),
    ))
}

pub async fn create_reservation<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Json(request): Json<CreateReservationRequest>,
) -> ApiResult<(StatusCode, Json<ReservationEnvelope>)> {
    let booking = NewBooking::try_from(request).map_err(error_response)?;

    let reservation = state
        .coordinator
        .create_reservation(tenant_id, booking)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(ReservationEnvelope { reservation })))
}

pub async fn list_reservations<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<ListReservationsQuery>,
) -> ApiResult<Json<ReservationListEnvelope>> {
    let from = query
        .start_date
        .as_deref()
        .map(|s| parse_date("start_date", s))
        .transpose()
        .map_err(|e| error_response(e.into()))?;
    let until = query
        .end_date
        .as_deref()
        .map(|s| parse_date("end_date", s))
        .transpose()
        .map_err(|e| error_response(e.into()))?;
    let filter = ListFilter::new(from, until, query.page, query.page_size).map_err(error_response)?;

    let reservations = state
        .coordinator
        .list_reservations(tenant_id, filter)
        .await
        .map_err(error_response)?;

    Ok(Json(ReservationListEnvelope { reservations }))
}

pub async fn get_reservation<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<ReservationId>,
) -> ApiResult<Json<ReservationEnvelope>> {
    let reservation = state
        .coordinator
        .get_reservation(tenant_id, id)
        .await
        .map_err(error_response)?;

    Ok(Json(ReservationEnvelope { reservation }))
}

pub async fn update_reservation<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<ReservationId>,
    Json(request): Json<UpdateReservationRequest>,
) -> ApiResult<Json<ReservationEnvelope>> {
    let change = BookingChange::try_from(request).map_err(error_response)?;

    let reservation = state
        .coordinator
        .update_reservation(tenant_id, id, change)
        .await
        .map_err(error_response)?;

    Ok(Json(ReservationEnvelope { reservation }))
}

pub async fn cancel_reservation<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<ReservationId>,
    request: Option<Json<CancelReservationRequest>>,
) -> ApiResult<Json<ReservationEnvelope>> {
    let request = request.map(|Json(body)| body).unwrap_or_default();

    let reservation = state
        .coordinator
        .cancel_reservation(tenant_id, id, request.version)
        .await
        .map_err(error_response)?;

    Ok(Json(ReservationEnvelope { reservation }))
}

pub async fn transition_status<S: BookingStore>(
    State(state): State<AppState<S>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<ReservationId>,
    Json(request): Json<TransitionStatusRequest>,
) -> ApiResult<Json<ReservationEnvelope>> {
    let reservation = state
        .coordinator
        .transition_status(tenant_id, id, request.status, request.version)
        .await
        .map_err(error_response)?;

    Ok(Json(ReservationEnvelope { reservation }))
}
