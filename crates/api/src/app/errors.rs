use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use billflow_engine::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
        DispatchError::NotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        // Details were logged where the error was constructed; the wire
        // message stays generic.
        DispatchError::Internal => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            err.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
