use core::str::FromStr;

use axum::{
    extract::{Extension, Path, Query},
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use billflow_billing::BillStatus;
use billflow_core::{BillId, CustomerId};
use billflow_engine::ListFilter;

use crate::app::{dto, errors, SharedDispatcher};

pub fn router() -> Router {
    Router::new()
        .route("/bills", post(create_bill).get(list_bills))
        .route("/bills/:bill_id", get(get_bill))
        .route("/bills/:bill_id/items", post(add_line_item))
        .route("/bills/:bill_id/close", post(close_bill))
}

pub async fn create_bill(
    Extension(dispatcher): Extension<SharedDispatcher>,
    body: Result<Json<dto::CreateBillRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
        }
    };

    match dispatcher
        .create_bill(CustomerId::new(body.customer_id), body.currency)
        .await
    {
        Ok(bill) => (StatusCode::OK, Json(bill)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn add_line_item(
    Extension(dispatcher): Extension<SharedDispatcher>,
    Path(bill_id): Path<String>,
    body: Result<Json<dto::AddLineItemRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
        }
    };

    let bill_id = match parse_bill_id(&bill_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match dispatcher
        .add_line_item(
            bill_id,
            CustomerId::new(body.customer_id),
            &body.amount,
            body.currency,
        )
        .await
    {
        Ok(bill) => (StatusCode::OK, Json(bill)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn close_bill(
    Extension(dispatcher): Extension<SharedDispatcher>,
    Path(bill_id): Path<String>,
    body: Result<Json<dto::CloseBillRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
        }
    };

    let bill_id = match parse_bill_id(&bill_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match dispatcher
        .close_bill(bill_id, CustomerId::new(body.customer_id))
        .await
    {
        Ok(bill) => (StatusCode::OK, Json(bill)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_bill(
    Extension(dispatcher): Extension<SharedDispatcher>,
    Path(bill_id): Path<String>,
    Query(query): Query<dto::GetBillQuery>,
) -> axum::response::Response {
    let bill_id = match parse_bill_id(&bill_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match dispatcher
        .get_bill(bill_id, CustomerId::new(query.customer_id))
        .await
    {
        Ok(bill) => (StatusCode::OK, Json(bill)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_bills(
    Extension(dispatcher): Extension<SharedDispatcher>,
    Query(query): Query<dto::ListBillsQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match parse_status(raw) {
            Ok(status) => Some(status),
            Err(resp) => return resp,
        },
    };

    let filter = ListFilter {
        customer_id: query.customer_id.map(CustomerId::new),
        status,
    };

    match dispatcher.list_bills(filter).await {
        Ok(bills) => (StatusCode::OK, Json(json!({ "bills": bills }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// An unparseable bill id can't name any bill; report it the same way as a
/// missing one so malformed and unknown ids are indistinguishable.
fn parse_bill_id(raw: &str) -> Result<BillId, axum::response::Response> {
    BillId::from_str(raw).map_err(|_| {
        errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "requested bill was not found",
        )
    })
}

fn parse_status(raw: &str) -> Result<BillStatus, axum::response::Response> {
    match raw {
        "OPEN" => Ok(BillStatus::Open),
        "CLOSED" => Ok(BillStatus::Closed),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "status must be OPEN or CLOSED",
        )),
    }
}
