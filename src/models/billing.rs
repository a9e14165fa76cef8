//! Credits and purchases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    /// Remaining call credits in cents of account currency.
    pub balance_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPurchaseRequest {
    pub amount_cents: i64,
}

/// The payments provider hosts the actual purchase; the backend only
/// hands back a checkout URL to redirect to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}
