//! Provisioned phone numbers and the number marketplace.

use serde::{Deserialize, Serialize};

/// A number already owned by the tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub id: String,
    /// E.164 formatted number, e.g. `+14155550123`.
    pub e164: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub assigned_agent_id: Option<String>,
    #[serde(default)]
    pub monthly_cost_cents: Option<i64>,
}

/// A purchasable number from the telephony provider's inventory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableNumber {
    pub e164: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub monthly_cost_cents: Option<i64>,
}

/// Search filter forwarded to the telephony provider.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberSearchQuery {
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_owned_number() {
        let json = r#"{"id":"pn-1","e164":"+14155550123","country":"US","assignedAgentId":"agent-1"}"#;
        let number: PhoneNumber = serde_json::from_str(json).expect("Failed to parse number");
        assert_eq!(number.e164, "+14155550123");
        assert_eq!(number.assigned_agent_id.as_deref(), Some("agent-1"));
    }

    #[test]
    fn search_query_omits_empty_filters() {
        let query = NumberSearchQuery {
            country: "US".to_string(),
            ..NumberSearchQuery::default()
        };
        let json = serde_json::to_string(&query).expect("Failed to serialize query");
        assert_eq!(json, r#"{"country":"US"}"#);
    }
}
