//! Exchange client facade
//!
//! [`ExchangeClient`] is the port the engine talks to: three operations,
//! each ending in success, [`ExchangeError::Rejected`] or
//! [`ExchangeError::Transient`]. [`ClassifyingExchange`] adapts any raw
//! [`VenueClient`] to it. Neither retries; retry policy belongs to the
//! caller.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

use crate::error::{ExchangeError, VenueError};
use crate::messages::order::{
    CancelAck, CancelRequest, OrderAck, OrderRequest, OrderStatusReport, StatusQuery,
    VenueOrderState,
};

/// Port used by the execution engine
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, request: &CancelRequest) -> Result<CancelAck, ExchangeError>;

    async fn query_order_status(
        &self,
        query: &StatusQuery,
    ) -> Result<OrderStatusReport, ExchangeError>;
}

/// Raw venue protocol client with unclassified errors
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn place(&self, request: &OrderRequest) -> Result<OrderAck, VenueError>;

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelAck, VenueError>;

    async fn query(&self, query: &StatusQuery) -> Result<OrderStatusReport, VenueError>;
}

#[async_trait]
impl<V: VenueClient + ?Sized> VenueClient for Arc<V> {
    async fn place(&self, request: &OrderRequest) -> Result<OrderAck, VenueError> {
        (**self).place(request).await
    }

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelAck, VenueError> {
        (**self).cancel(request).await
    }

    async fn query(&self, query: &StatusQuery) -> Result<OrderStatusReport, VenueError> {
        (**self).query(query).await
    }
}

/// Facade that classifies venue failures into the engine's taxonomy
pub struct ClassifyingExchange<V> {
    venue: V,
}

impl<V: VenueClient> ClassifyingExchange<V> {
    pub fn new(venue: V) -> Self {
        Self { venue }
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    /// A duplicate client order id means an earlier attempt landed.
    /// Recover its ack from the venue instead of surfacing a rejection.
    async fn recover_duplicate(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let query = StatusQuery {
            client_order_id: request.client_order_id.clone(),
            exchange_order_id: None,
            symbol: request.symbol.clone(),
        };
        let report = self.venue.query(&query).await?;

        match (report.state, report.exchange_order_id) {
            (VenueOrderState::Rejected, _) => Err(ExchangeError::rejected(
                report
                    .reject_reason
                    .unwrap_or_else(|| "rejected by venue".to_string()),
            )),
            (_, Some(exchange_order_id)) => Ok(OrderAck {
                client_order_id: request.client_order_id.clone(),
                exchange_order_id,
                accepted_at: Utc::now(),
            }),
            (_, None) => Err(ExchangeError::transient(
                "duplicate order without exchange id",
            )),
        }
    }
}

#[async_trait]
impl<V: VenueClient> ExchangeClient for ClassifyingExchange<V> {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        match self.venue.place(request).await {
            Ok(ack) => Ok(ack),
            Err(VenueError::DuplicateOrder(_)) => {
                debug!(
                    "[EXCHANGE] {} already known to venue, recovering ack",
                    request.client_order_id
                );
                self.recover_duplicate(request).await
            }
            Err(e) => {
                let classified = e.classify();
                warn!(
                    "[EXCHANGE] submit {} failed: {} ({})",
                    request.client_order_id,
                    e,
                    if classified.is_transient() { "transient" } else { "rejected" }
                );
                Err(classified)
            }
        }
    }

    async fn cancel_order(&self, request: &CancelRequest) -> Result<CancelAck, ExchangeError> {
        self.venue.cancel(request).await.map_err(|e| {
            warn!("[EXCHANGE] cancel {} failed: {}", request.client_order_id, e);
            e.classify()
        })
    }

    async fn query_order_status(
        &self,
        query: &StatusQuery,
    ) -> Result<OrderStatusReport, ExchangeError> {
        self.venue.query(query).await.map_err(|e| {
            debug!("[EXCHANGE] query {} failed: {}", query.client_order_id, e);
            e.classify()
        })
    }
}
