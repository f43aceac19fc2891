//! Pickup point, reception, and product models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pvz_core::{City, PickupPointId, ProductId, ProductType, ReceptionId, ReceptionStatus};

/// A physical pickup point ("PVZ").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupPoint {
    pub id: PickupPointId,
    pub registration_date: DateTime<Utc>,
    pub city: City,
}

/// A goods-intake session at a pickup point.
///
/// At most one reception per pickup point is `Open` at any instant;
/// `closed_at` is set exactly when the status becomes `Closed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reception {
    pub id: ReceptionId,
    #[serde(rename = "dateTime")]
    pub opened_at: DateTime<Utc>,
    #[serde(rename = "pvzId")]
    pub pickup_point_id: PickupPointId,
    pub status: ReceptionStatus,
    #[serde(rename = "closedAt", skip_serializing_if = "Option::is_none", default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Reception {
    /// Start a new open reception for a pickup point.
    #[must_use]
    pub fn open(pickup_point_id: PickupPointId, opened_at: DateTime<Utc>) -> Self {
        Self {
            id: ReceptionId::new_v4(),
            opened_at,
            pickup_point_id,
            status: ReceptionStatus::Open,
            closed_at: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == ReceptionStatus::Open
    }
}

/// An item logged against a reception.
///
/// `seq` is assigned by the store from a monotonic counter and is the only
/// ordering used for LIFO removal; it never leaves the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(rename = "dateTime")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    #[serde(rename = "receptionId")]
    pub reception_id: ReceptionId,
    #[serde(skip)]
    pub seq: i64,
}

/// A reception with its products, oldest product first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceptionWithProducts {
    pub reception: Reception,
    pub products: Vec<Product>,
}

/// A listing entry: one pickup point and its in-window receptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickupPointWithReceptions {
    pub pvz: PickupPoint,
    pub receptions: Vec<ReceptionWithProducts>,
}

/// A validated listing filter.
///
/// Construct through `IntakeWorkflow::list_filter`, which enforces the page
/// and limit bounds and the date-window ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
}

impl ListFilter {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 30;

    /// Number of pickup points to skip. Page zero is treated as page one.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64).saturating_sub(1) * self.limit as u64
    }

    /// Whether any date bound is set.
    #[must_use]
    pub const fn is_windowed(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    /// Whether a reception opened at `at` falls inside the inclusive window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_date.is_none_or(|start| at >= start) && self.end_date.is_none_or(|end| at <= end)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_reception_serializes_wire_names() {
        let opened = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        let reception = Reception::open(PickupPointId::new_v4(), opened);
        let json = serde_json::to_value(&reception).unwrap();

        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["pvzId"], reception.pickup_point_id.to_string());
        assert!(json.get("dateTime").is_some());
        assert!(json.get("closedAt").is_none());
    }

    #[test]
    fn test_product_hides_sequence() {
        let product = Product {
            id: ProductId::new_v4(),
            created_at: Utc::now(),
            product_type: ProductType::Clothes,
            reception_id: ReceptionId::new_v4(),
            seq: 42,
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["type"], "одежда");
        assert!(json.get("seq").is_none());
    }

    #[test]
    fn test_filter_window_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
        let filter = ListFilter {
            start_date: Some(start),
            end_date: Some(end),
            page: 2,
            limit: 10,
        };

        assert!(filter.contains(start));
        assert!(filter.contains(end));
        assert!(!filter.contains(end + chrono::Duration::seconds(1)));
        assert_eq!(filter.offset(), 10);
    }

    #[test]
    fn test_page_zero_offset_does_not_underflow() {
        let filter = ListFilter {
            start_date: None,
            end_date: None,
            page: 0,
            limit: ListFilter::MAX_LIMIT,
        };
        assert_eq!(filter.offset(), 0);

        let last = ListFilter {
            page: u32::MAX,
            ..filter
        };
        assert_eq!(last.offset(), (u64::from(u32::MAX) - 1) * 30);
    }
}
