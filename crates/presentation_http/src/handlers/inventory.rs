//! Inventory handlers
//!
//! Stock reads and the idempotent update endpoint the order service calls.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use domain::{DomainError, IdempotencyToken, MutationRecord, ProductKey, StockItem, StockMutation};
use infrastructure::IDEMPOTENCY_KEY_HEADER;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{
    error::ApiError,
    handlers::metrics::InventoryUpdateResult,
    middleware::ValidatedJson,
    state::InventoryState,
};

/// Stock listing
#[derive(Debug, Serialize)]
pub struct InventoryList {
    pub count: usize,
    pub products: Vec<StockItem>,
}

/// Single product
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product: StockItem,
}

/// Stock update request
///
/// `quantity` is a positive amount to remove; `quantity_delta` is a signed
/// change and wins when both are present.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateInventoryRequest {
    #[serde(alias = "productId")]
    #[validate(length(min = 1, max = 64))]
    pub product_key: String,
    #[serde(default)]
    pub quantity_delta: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default, alias = "orderId")]
    pub causal_id: Option<String>,
    #[serde(default, alias = "idempotencyKey")]
    #[validate(length(min = 1, max = 255))]
    pub idempotency_token: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl UpdateInventoryRequest {
    /// Build the mutation, taking the token from the header if the body has none
    pub fn into_mutation(self, header_token: Option<&str>) -> Result<StockMutation, DomainError> {
        let product_key = ProductKey::new(self.product_key)?;

        let mut mutation = match (self.quantity_delta, self.quantity) {
            (Some(delta), _) => StockMutation::new(product_key, delta)?,
            (None, Some(quantity)) => StockMutation::decrement(product_key, quantity)?,
            (None, None) => {
                return Err(DomainError::validation(
                    "either quantity_delta or quantity is required",
                ));
            },
        };

        if let Some(causal_id) = self.causal_id {
            mutation = mutation.with_causal_id(causal_id)?;
        }
        if let Some(token) = self.idempotency_token.as_deref().or(header_token) {
            mutation = mutation.with_token(IdempotencyToken::new(token)?);
        }
        if let Some(reason) = self.reason {
            mutation = mutation.with_reason(reason);
        }
        Ok(mutation)
    }
}

/// Stock update response
#[derive(Debug, Serialize)]
pub struct UpdateInventoryResponse {
    pub message: &'static str,
    pub replayed: bool,
    pub update: MutationRecord,
}

/// List all products ordered by name
pub async fn list_products(
    State(state): State<InventoryState>,
) -> Result<Json<InventoryList>, ApiError> {
    let products = state.mutator.list_items().await?;
    Ok(Json(InventoryList {
        count: products.len(),
        products,
    }))
}

/// Get one product
pub async fn get_product(
    State(state): State<InventoryState>,
    Path(product_key): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let key = ProductKey::new(product_key)?;
    let product = state.mutator.get_item(&key).await?;
    Ok(Json(ProductResponse { product }))
}

/// Apply a stock change exactly once per idempotency token
pub async fn update_stock(
    State(state): State<InventoryState>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<UpdateInventoryRequest>,
) -> Result<Json<UpdateInventoryResponse>, ApiError> {
    let header_token = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = match request.into_mutation(header_token) {
        Ok(mutation) => state.mutator.apply_mutation(&mutation).await,
        Err(err) => Err(err.into()),
    };

    match outcome {
        Ok(outcome) => {
            let (result, message) = if outcome.replayed {
                (InventoryUpdateResult::Replayed, "Update already applied")
            } else {
                (InventoryUpdateResult::Applied, "Inventory updated")
            };
            state.metrics.record_inventory_update(result);
            info!(
                product_key = %outcome.record.product_key,
                replayed = outcome.replayed,
                quantity_after = outcome.record.quantity_after,
                "Inventory update handled"
            );
            Ok(Json(UpdateInventoryResponse {
                message,
                replayed: outcome.replayed,
                update: outcome.record,
            }))
        },
        Err(err) => {
            let err = ApiError::from(err);
            let result = match &err {
                ApiError::InsufficientResource { .. } => Some(InventoryUpdateResult::Insufficient),
                ApiError::NotFound(_) => Some(InventoryUpdateResult::NotFound),
                ApiError::BadRequest(_) => Some(InventoryUpdateResult::Rejected),
                _ => None,
            };
            if let Some(result) = result {
                state.metrics.record_inventory_update(result);
            }
            Err(err)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> UpdateInventoryRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn quantity_means_removal() {
        let mutation = request(r#"{"product_key": "SKU-1", "quantity": 3}"#)
            .into_mutation(None)
            .unwrap();
        assert_eq!(mutation.quantity_delta, -3);
    }

    #[test]
    fn accepts_camel_case_aliases() {
        let mutation = request(
            r#"{"productId": "SKU-2", "quantity": 1, "orderId": "order-7", "idempotencyKey": "tok-1"}"#,
        )
        .into_mutation(None)
        .unwrap();

        assert_eq!(mutation.product_key.as_str(), "SKU-2");
        assert_eq!(mutation.causal_id.as_deref(), Some("order-7"));
        assert_eq!(
            mutation.idempotency_token.as_ref().map(IdempotencyToken::as_str),
            Some("tok-1")
        );
    }

    #[test]
    fn delta_wins_over_quantity() {
        let mutation = request(r#"{"product_key": "SKU-1", "quantity_delta": 4, "quantity": 9}"#)
            .into_mutation(None)
            .unwrap();
        assert_eq!(mutation.quantity_delta, 4);
    }

    #[test]
    fn header_token_used_when_body_has_none() {
        let from_header = request(r#"{"product_key": "SKU-1", "quantity": 1}"#)
            .into_mutation(Some("hdr-tok"))
            .unwrap();
        assert_eq!(
            from_header.idempotency_token.map(String::from).as_deref(),
            Some("hdr-tok")
        );

        let from_body = request(r#"{"product_key": "SKU-1", "quantity": 1, "idempotency_token": "body-tok"}"#)
            .into_mutation(Some("hdr-tok"))
            .unwrap();
        assert_eq!(
            from_body.idempotency_token.map(String::from).as_deref(),
            Some("body-tok")
        );
    }

    #[test]
    fn missing_or_zero_amount_is_invalid() {
        assert!(matches!(
            request(r#"{"product_key": "SKU-1"}"#).into_mutation(None),
            Err(DomainError::ValidationError(_))
        ));
        assert!(matches!(
            request(r#"{"product_key": "SKU-1", "quantity_delta": 0}"#).into_mutation(None),
            Err(DomainError::ValidationError(_))
        ));
        assert!(matches!(
            request(r#"{"product_key": "SKU-1", "quantity": -2}"#).into_mutation(None),
            Err(DomainError::ValidationError(_))
        ));
    }
}
