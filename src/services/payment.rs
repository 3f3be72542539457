use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::errors::{ApiError, PaymentError};
use crate::models::{
    Booking, CheckoutResult, CreateOrder, PaymentOrder, PaymentReceipt, PaymentStatus,
    PaymentVerification, UserIdentity,
};
use crate::services::api::BookingApi;

/// Hosts the payment gateway's checkout for an order and reports how it ended.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn checkout(
        &self,
        order: &PaymentOrder,
        payer: &UserIdentity,
    ) -> anyhow::Result<CheckoutResult>;
}

/// Creates an order for `booking`, runs checkout and verifies the result with
/// the server. The caller refreshes the booking list afterwards.
pub async fn pay_for_booking(
    api: &dyn BookingApi,
    checkout: &dyn CheckoutProvider,
    config: &ClientConfig,
    payer: &UserIdentity,
    booking: &Booking,
) -> Result<PaymentReceipt, PaymentError> {
    if booking.payment_status == PaymentStatus::Paid {
        return Err(PaymentError::AlreadyPaid(booking.id));
    }

    let order = api
        .create_payment_order(&CreateOrder {
            booking_id: booking.id,
            amount: config.booking_price,
            currency: config.booking_currency.clone(),
        })
        .await?;
    tracing::info!(booking_id = booking.id, order_id = %order.order_id, "payment order created");

    let result = checkout
        .checkout(&order, payer)
        .await
        .map_err(|e| PaymentError::Checkout(e.to_string()))?;

    let (order_id, payment_id, signature) = match result {
        CheckoutResult::PaymentSuccess {
            order_id,
            payment_id,
            signature,
        } => (order_id, payment_id, signature),
        failure @ CheckoutResult::PaymentError { .. } => {
            let description = failure.failure_description().unwrap_or_default();
            tracing::warn!(booking_id = booking.id, description = %description, "checkout failed");
            return Err(PaymentError::Checkout(description));
        }
    };

    let verification = PaymentVerification {
        order_id: order_id.clone(),
        payment_id: payment_id.clone(),
        signature,
    };
    match api.verify_payment(&verification).await {
        Ok(()) => {}
        Err(ApiError::Rejected(message)) => return Err(PaymentError::Verification(message)),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(booking_id = booking.id, payment_id = %payment_id, "payment verified");
    Ok(PaymentReceipt {
        booking_id: booking.id,
        order_id,
        payment_id,
    })
}
