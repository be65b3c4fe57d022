use crate::dispatcher::DispatchError;
use crate::status::{StatusError, TaskStatusView};
use crate::MailQueue;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mail_queue_core::{EmailJob, TaskId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

/// REST API routes
pub fn create_rest_api(queue: Arc<MailQueue>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/queue-status", get(queue_status))
        .route("/send-email", post(send_email))
        .route("/send-bulk-emails", post(send_bulk_emails))
        .route("/task/:task_id", get(get_task))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(queue)
}

#[derive(Debug, Deserialize)]
struct SendEmailRequest {
    recipient_email: String,
    subject: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BulkEmailRequest {
    email_list: Vec<String>,
    subject: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct SendEmailResponse {
    task_id: TaskId,
    status: &'static str,
    message: String,
    recipient: String,
    subject: String,
}

#[derive(Debug, Serialize)]
struct BulkEmailResponse {
    task_id: TaskId,
    status: &'static str,
    message: String,
    recipient_count: usize,
    subject: String,
}

#[derive(Debug, Serialize)]
struct QueueStatusResponse {
    queue_length: usize,
    message: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn service_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Email Service API is running",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "send_email": "POST /send-email",
            "send_bulk": "POST /send-bulk-emails",
            "check_status": "GET /task/{task_id}",
            "queue_status": "GET /queue-status",
            "health": "GET /health",
            "metrics": "GET /metrics",
        },
    }))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Backlog waiting for a worker
async fn queue_status(State(queue): State<Arc<MailQueue>>) -> Json<QueueStatusResponse> {
    let queue_length = queue.queue_depth().await;
    let busy = queue_length >= queue.config().admission.single_threshold;

    Json(QueueStatusResponse {
        queue_length,
        message: format!("There are {} tasks waiting in the queue", queue_length),
        status: if busy { "busy" } else { "healthy" },
    })
}

/// Send a single email in the background
async fn send_email(
    State(queue): State<Arc<MailQueue>>,
    payload: Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<Json<SendEmailResponse>, ApiError> {
    let Json(req) = payload?;
    let recipient = req.recipient_email.clone();
    let subject = req.subject.clone();

    let task_id = queue
        .dispatcher()
        .submit(EmailJob::SingleEmail {
            recipient: req.recipient_email,
            subject: req.subject,
            body: req.message,
        })
        .await?;

    Ok(Json(SendEmailResponse {
        task_id,
        status: "PENDING",
        message: format!("Email to {} is being sent in background", recipient),
        recipient,
        subject,
    }))
}

/// Send one message to many recipients in the background
async fn send_bulk_emails(
    State(queue): State<Arc<MailQueue>>,
    payload: Result<Json<BulkEmailRequest>, JsonRejection>,
) -> Result<Json<BulkEmailResponse>, ApiError> {
    let Json(req) = payload?;
    let recipient_count = req.email_list.len();
    let subject = req.subject.clone();

    let task_id = queue
        .dispatcher()
        .submit(EmailJob::BulkEmail {
            recipients: req.email_list,
            subject: req.subject,
            body: req.message,
        })
        .await?;

    Ok(Json(BulkEmailResponse {
        task_id,
        status: "PENDING",
        message: format!(
            "Bulk email to {} recipients is being sent in background",
            recipient_count
        ),
        recipient_count,
        subject,
    }))
}

/// Poll a task by id
async fn get_task(
    State(queue): State<Arc<MailQueue>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusView>, ApiError> {
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid task id: {}", task_id)))?;

    let view = queue.status().get(&task_id).await?;
    Ok(Json(view))
}

async fn metrics(State(queue): State<Arc<MailQueue>>) -> Result<Response, ApiError> {
    queue.queue_depth().await;
    let body = queue
        .metrics()
        .encode()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// API error types
#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
    QueueFull { queue_length: usize, message: String },
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(e) => ApiError::BadRequest(e.to_string()),
            DispatchError::Rejected { current_depth } => ApiError::QueueFull {
                queue_length: current_depth,
                message: err.to_string(),
            },
            DispatchError::Infrastructure(_) => {
                error!("Error starting email task: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<StatusError> for ApiError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StatusError::Store(_) => {
                error!("Error fetching task status: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg }))
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::QueueFull {
                queue_length,
                message,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "error": message,
                    "queue_length": queue_length,
                }),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
