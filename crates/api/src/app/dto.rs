use serde::Deserialize;

use billflow_money::Currency;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    pub customer_id: i64,
    pub currency: Currency,
}

#[derive(Debug, Deserialize)]
pub struct AddLineItemRequest {
    pub customer_id: i64,
    pub amount: String,
    pub currency: Currency,
}

#[derive(Debug, Deserialize)]
pub struct CloseBillRequest {
    pub customer_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct GetBillQuery {
    pub customer_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListBillsQuery {
    pub customer_id: Option<i64>,
    pub status: Option<String>,
}
