use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrder {
    pub booking_id: i64,
    pub amount: u32,
    pub currency: String,
}

/// Order handed to the checkout collaborator. `amount` is in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub key: String,
    pub amount: u64,
    pub currency: String,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutFailure {
    #[serde(default)]
    pub description: Option<String>,
}

/// What the checkout page reports back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutResult {
    PaymentSuccess {
        #[serde(rename = "razorpay_order_id")]
        order_id: String,
        #[serde(rename = "razorpay_payment_id")]
        payment_id: String,
        #[serde(rename = "razorpay_signature")]
        signature: String,
    },
    PaymentError {
        #[serde(default)]
        error: Option<CheckoutFailure>,
    },
}

impl CheckoutResult {
    pub fn from_page_message(message: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(message)
    }

    pub fn failure_description(&self) -> Option<String> {
        match self {
            CheckoutResult::PaymentSuccess { .. } => None,
            CheckoutResult::PaymentError { error } => Some(
                error
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| "Payment was unsuccessful".to_string()),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub booking_id: i64,
    pub order_id: String,
    pub payment_id: String,
}
