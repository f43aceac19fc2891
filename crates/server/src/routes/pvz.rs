//! Pickup point routes: create and list.

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use pvz_core::PickupPointId;

use crate::context::RequestContext;
use crate::error::{AppError, Result};
use crate::models::{PickupPoint, PickupPointWithReceptions};
use crate::routes::extract::{ApiJson, ApiQuery};
use crate::services::intake::IntakeWorkflow;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePvzRequest {
    pub city: String,
    pub id: Option<PickupPointId>,
    pub registration_date: Option<DateTime<Utc>>,
}

/// Raw listing query. Values are parsed in the handler so that every
/// malformed value gets the same JSON error body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// `POST /pvz`
pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<CreatePvzRequest>,
) -> Result<(StatusCode, Json<PickupPoint>)> {
    let pvz = state
        .intake()
        .create_pvz(&ctx, &body.city, body.id, body.registration_date)
        .await?;
    Ok((StatusCode::CREATED, Json(pvz)))
}

/// `GET /pvz`
pub async fn list(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Vec<PickupPointWithReceptions>>> {
    let filter = IntakeWorkflow::list_filter(
        parse_date("startDate", query.start_date.as_deref())?,
        parse_date("endDate", query.end_date.as_deref())?,
        parse_int("page", query.page.as_deref())?,
        parse_int("limit", query.limit.as_deref())?,
    )?;

    let points = state.intake().list_pickup_points(&ctx, &filter).await?;
    Ok(Json(points))
}

fn parse_date(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| AppError::BadRequest(format!("invalid {name}: {e}")))
        })
        .transpose()
}

fn parse_int(name: &str, raw: Option<&str>) -> Result<Option<i64>> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|e| AppError::BadRequest(format!("invalid {name}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_rfc3339() {
        let parsed = parse_date("startDate", Some("2025-04-01T10:00:00+03:00"))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-04-01T07:00:00+00:00");
        assert!(parse_date("startDate", None).unwrap().is_none());
        assert!(parse_date("startDate", Some("yesterday")).is_err());
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("page", Some("3")).unwrap(), Some(3));
        assert!(parse_int("page", Some("three")).is_err());
        assert_eq!(parse_int("page", Some("")).unwrap(), None);
    }
}
