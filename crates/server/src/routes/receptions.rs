//! Reception routes: open and close.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use pvz_core::PickupPointId;

use crate::context::RequestContext;
use crate::error::Result;
use crate::models::Reception;
use crate::routes::extract::ApiJson;
use crate::routes::parse_pvz_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenReceptionRequest {
    #[serde(rename = "pvzId")]
    pub pvz_id: PickupPointId,
}

/// `POST /receptions`
pub async fn open(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<OpenReceptionRequest>,
) -> Result<(StatusCode, Json<Reception>)> {
    let reception = state.intake().open_reception(&ctx, body.pvz_id).await?;
    Ok((StatusCode::CREATED, Json(reception)))
}

/// `POST /pvz/{pvzId}/close_last_reception`
pub async fn close_last(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(raw_id): Path<String>,
) -> Result<Json<Reception>> {
    let pvz_id = parse_pvz_id(&raw_id)?;
    let reception = state.intake().close_reception(&ctx, pvz_id).await?;
    Ok(Json(reception))
}
