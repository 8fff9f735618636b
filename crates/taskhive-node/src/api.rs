use crate::auth::{AuthError, AuthProvider, NewAccount};
use crate::node::TaskhiveNode;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskhive_market::{GenerationQuery, Session};
use taskhive_types::{
    AccountStatus, Credits, LedgerEntry, MarketError, NewTemplate, TaskId, TaskInstance, TaskKind,
    TaskTemplate, Tier, UsdAmount, UserId, UserRecord,
};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// API-boundary error: market and auth failures mapped to status codes,
/// surfaced as JSON bodies.
pub enum ApiError {
    MissingToken,
    Auth(AuthError),
    Market(MarketError),
}

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        Self::Market(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

fn market_status(e: &MarketError) -> StatusCode {
    match e {
        MarketError::UserNotFound(_) | MarketError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        MarketError::Unauthorized | MarketError::AccountSuspended => StatusCode::FORBIDDEN,
        MarketError::VersionConflict { .. } | MarketError::TaskAlreadyHeld(_) => {
            StatusCode::CONFLICT
        }
        MarketError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MarketError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "Missing authentication token".to_string(),
            ),
            ApiError::Auth(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
            ApiError::Market(e) => (market_status(&e), e.to_string()),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Bearer-token extractor resolving to a market session.
pub struct ApiSession(pub Session);

#[async_trait]
impl FromRequestParts<Arc<TaskhiveNode>> for ApiSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        node: &Arc<TaskhiveNode>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::MissingToken)?;

        let session = node
            .session_from_token(token)
            .await
            .ok_or(ApiError::Auth(AuthError::UnknownSession))?;
        Ok(ApiSession(session))
    }
}

pub fn router(node: Arc<TaskhiveNode>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/me", get(me))
        .route("/me/history", get(history))
        .route("/me/tasks", get(tasks))
        .route("/me/payout-profile", post(set_payout_profile))
        .route("/withdraw", post(withdraw))
        .route("/marketplace", get(marketplace))
        .route("/marketplace/:id/reserve", post(reserve))
        .route("/tasks/:id/start", post(start_task))
        .route("/tasks/:id/submit", post(submit_task))
        .route("/admin/users", get(admin_users))
        .route("/admin/credit", post(admin_credit))
        .route("/admin/fund", post(admin_fund))
        .route("/admin/status", post(admin_status))
        .route("/admin/quota", post(admin_quota))
        .route("/admin/tier", post(admin_tier))
        .route("/admin/templates", post(admin_publish))
        .route("/admin/templates/:id", delete(admin_remove_template))
        .route("/admin/generate", post(admin_generate))
        .route("/admin/assign", post(admin_assign))
        .route("/admin/bulk-assign", post(admin_bulk_assign))
        .route("/admin/review/approve", post(admin_approve))
        .route("/admin/review/reject", post(admin_reject))
        .with_state(node)
}

pub fn start_api_server(node: Arc<TaskhiveNode>, host: String, port: u16) -> JoinHandle<()> {
    let app = router(node);
    let addr = format!("{}:{}", host, port);
    info!(addr = %addr, "📡 Starting API server");

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind API server");
        axum::serve(listener, app).await.expect("API server failed");
    })
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
struct RegisterResponse {
    user_id: UserId,
}

async fn register(
    State(node): State<Arc<TaskhiveNode>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let user_id = node
        .register(NewAccount {
            name: req.name,
            email: req.email,
            password: req.password,
        })
        .await?;
    Ok(Json(RegisterResponse { user_id }))
}

#[derive(Serialize, Deserialize)]
struct LoginRequest {
    identifier: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
struct LoginResponse {
    token: String,
    user_id: UserId,
    role: taskhive_types::Role,
}

async fn login(
    State(node): State<Arc<TaskhiveNode>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (token, session) = node.login(&req.identifier, &req.password).await?;
    Ok(Json(LoginResponse {
        token,
        user_id: session.user_id,
        role: session.role,
    }))
}

async fn logout(
    State(node): State<Arc<TaskhiveNode>>,
    headers: axum::http::HeaderMap,
) -> StatusCode {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        node.auth.sign_out(token).await;
    }
    StatusCode::NO_CONTENT
}

async fn me(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(node.engine.get_user(&session.user_id).await?))
}

async fn history(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    Ok(Json(node.engine.ledger.history(&session).await?))
}

async fn tasks(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
) -> Result<Json<Vec<TaskInstance>>, ApiError> {
    Ok(Json(node.engine.lifecycle.tasks(&session).await?))
}

#[derive(Serialize, Deserialize)]
struct PayoutProfileRequest {
    holder_name: String,
    bank_name: String,
    account_number: String,
}

async fn set_payout_profile(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<PayoutProfileRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    let profile = taskhive_types::PayoutProfile {
        holder_name: req.holder_name,
        bank_name: req.bank_name,
        account_number: req.account_number,
    };
    Ok(Json(
        node.engine.ledger.set_payout_profile(&session, profile).await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct WithdrawRequest {
    amount_cents: u64,
}

async fn withdraw(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    let amount = UsdAmount::from_cents(req.amount_cents);
    Ok(Json(node.engine.ledger.withdraw(&session, amount).await?))
}

async fn marketplace(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(_session): ApiSession,
) -> Json<Vec<TaskTemplate>> {
    Json(node.engine.marketplace.templates().await)
}

async fn reserve(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Path(id): Path<String>,
) -> Result<Json<UserRecord>, ApiError> {
    let template_id = TaskId::from_string(id);
    Ok(Json(
        node.engine.lifecycle.reserve_task(&session, &template_id).await?,
    ))
}

async fn start_task(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Path(id): Path<String>,
) -> Result<Json<UserRecord>, ApiError> {
    let task_id = TaskId::from_string(id);
    Ok(Json(
        node.engine.lifecycle.start_task(&session, &task_id).await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct SubmitRequest {
    submission: String,
}

async fn submit_task(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    let task_id = TaskId::from_string(id);
    Ok(Json(
        node.engine
            .lifecycle
            .submit_task(&session, &task_id, &req.submission)
            .await?,
    ))
}

async fn admin_users(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
) -> Result<Json<Vec<UserRecord>>, ApiError> {
    Ok(Json(node.engine.ledger.list_users(&session).await?))
}

#[derive(Serialize, Deserialize)]
struct CreditRequest {
    user_id: UserId,
    credits: u32,
}

async fn admin_credit(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<CreditRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .ledger
            .admin_credit(&session, &req.user_id, Credits::new(req.credits))
            .await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct FundRequest {
    user_id: UserId,
    amount_cents: u64,
}

async fn admin_fund(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<FundRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .ledger
            .admin_fund(&session, &req.user_id, UsdAmount::from_cents(req.amount_cents))
            .await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct StatusRequest {
    user_id: UserId,
    status: AccountStatus,
}

async fn admin_status(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<StatusRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .ledger
            .admin_set_status(&session, &req.user_id, req.status)
            .await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct QuotaRequest {
    user_id: UserId,
    quota: u32,
}

async fn admin_quota(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<QuotaRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .ledger
            .admin_set_quota(&session, &req.user_id, req.quota)
            .await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct TierRequest {
    user_id: UserId,
    tier: Tier,
}

async fn admin_tier(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<TierRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .ledger
            .admin_set_tier(&session, &req.user_id, req.tier)
            .await?,
    ))
}

async fn admin_publish(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(spec): Json<NewTemplate>,
) -> Result<Json<TaskTemplate>, ApiError> {
    Ok(Json(
        node.engine.marketplace.publish_template(&session, spec).await?,
    ))
}

async fn admin_remove_template(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let template_id = TaskId::from_string(id);
    node.engine
        .marketplace
        .remove_template(&session, &template_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Deserialize)]
struct GenerateRequest {
    kind: TaskKind,
    location: Option<String>,
}

async fn admin_generate(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Option<TaskTemplate>>, ApiError> {
    let query = GenerationQuery {
        kind: req.kind,
        location: req.location,
    };
    Ok(Json(
        node.engine.marketplace.generate_template(&session, query).await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct AssignRequest {
    user_id: UserId,
    template_id: TaskId,
}

async fn admin_assign(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<AssignRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .marketplace
            .admin_assign(&session, &req.user_id, &req.template_id)
            .await?,
    ))
}

#[derive(Serialize, Deserialize)]
struct BulkAssignRequest {
    user_id: UserId,
    quantity: usize,
    kind: Option<TaskKind>,
}

#[derive(Serialize, Deserialize)]
struct BulkAssignResponse {
    assigned: Vec<TaskId>,
}

async fn admin_bulk_assign(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<BulkAssignRequest>,
) -> Result<Json<BulkAssignResponse>, ApiError> {
    let assigned = node
        .engine
        .marketplace
        .bulk_assign(&session, &req.user_id, req.quantity, req.kind)
        .await?;
    Ok(Json(BulkAssignResponse { assigned }))
}

#[derive(Serialize, Deserialize)]
struct ReviewRequest {
    user_id: UserId,
    task_id: TaskId,
}

async fn admin_approve(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .lifecycle
            .approve_task(&session, &req.user_id, &req.task_id)
            .await?,
    ))
}

async fn admin_reject(
    State(node): State<Arc<TaskhiveNode>>,
    ApiSession(session): ApiSession,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(
        node.engine
            .lifecycle
            .reject_task(&session, &req.user_id, &req.task_id)
            .await?,
    ))
}
