//! Submit-and-confirm helper shared by entry, rollback and exit.

use std::time::Duration;

use ratio_spread_core::{Fill, GatewayError, OrderGateway, OrderRequest};
use tracing::{debug, warn};

/// Submits `request` and waits at most `timeout` for its fill.
///
/// An order that does not confirm in time is cancelled. If the cancel fails
/// the order may still be live, so it is checked once more and reported as
/// [`GatewayError::Unconfirmed`] unless that check finds a fill. The fill
/// may carry less than the requested quantity; callers decide what to do
/// with the remainder.
pub(crate) async fn place_and_confirm(
    gateway: &dyn OrderGateway,
    request: &OrderRequest,
    timeout: Duration,
) -> Result<Fill, GatewayError> {
    let order_id = gateway.submit(request).await?;
    debug!(order_id = %order_id, symbol = %request.symbol, side = %request.side, "Order submitted");

    match wait_for_fill(gateway, &order_id, timeout).await {
        Err(GatewayError::Timeout(id)) => match settle(gateway, &id, timeout).await? {
            Some(fill) => Ok(fill),
            None => Err(GatewayError::Timeout(id)),
        },
        result => result,
    }
}

/// Resolves an order whose fill was never confirmed.
///
/// Returns the fill if the order turned out to have filled, `None` once it
/// is confirmed cancelled, and [`GatewayError::Unconfirmed`] while the broker
/// neither confirms a fill nor accepts the cancel.
pub(crate) async fn settle(
    gateway: &dyn OrderGateway,
    order_id: &str,
    timeout: Duration,
) -> Result<Option<Fill>, GatewayError> {
    let cancel = gateway.cancel(order_id).await;
    if let Err(e) = &cancel {
        warn!(order_id, error = %e, "Failed to cancel unconfirmed order, checking for a late fill");
    }

    match wait_for_fill(gateway, order_id, timeout).await {
        Ok(fill) => {
            warn!(order_id, quantity = fill.quantity, "Unconfirmed order filled late");
            Ok(Some(fill))
        }
        Err(_) if cancel.is_ok() => Ok(None),
        Err(_) => Err(GatewayError::Unconfirmed {
            order_id: order_id.to_string(),
            reason: cancel.err().map(|e| e.to_string()).unwrap_or_default(),
        }),
    }
}

async fn wait_for_fill(
    gateway: &dyn OrderGateway,
    order_id: &str,
    timeout: Duration,
) -> Result<Fill, GatewayError> {
    match tokio::time::timeout(timeout, gateway.await_fill(order_id, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(order_id.to_string())),
    }
}
