//! Product routes: add and delete-last.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use pvz_core::PickupPointId;

use crate::context::RequestContext;
use crate::error::Result;
use crate::models::Product;
use crate::routes::extract::ApiJson;
use crate::routes::parse_pvz_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddProductRequest {
    #[serde(rename = "type")]
    pub product_type: String,
    #[serde(rename = "pvzId")]
    pub pvz_id: PickupPointId,
}

/// `POST /products`
pub async fn add(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<AddProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state
        .intake()
        .add_product(&ctx, body.pvz_id, &body.product_type)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// `POST /pvz/{pvzId}/delete_last_product`
pub async fn delete_last(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(raw_id): Path<String>,
) -> Result<StatusCode> {
    let pvz_id = parse_pvz_id(&raw_id)?;
    state.intake().remove_last_product(&ctx, pvz_id).await?;
    Ok(StatusCode::OK)
}
