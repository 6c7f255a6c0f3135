//! Cacheable resource kinds and their sync cadence
//!
//! Each kind carries its own freshness window: catalog data (form metadata,
//! products, categories) changes rarely, account history changes often, and
//! the dashboard is the most volatile surface in the app.

use serde::{Deserialize, Serialize};
use std::fmt;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// The resources the sync layer caches locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Loan application form description
    FormMetadata,
    /// Loan product catalog
    LoanProducts,
    /// Payment category catalog
    PaymentCategories,
    /// The account's loans
    Loans,
    /// The account's payment history
    Payments,
    /// Home screen aggregate figures
    Dashboard,
}

impl ResourceKind {
    /// All kinds, in catalog-then-account order.
    pub fn all() -> [ResourceKind; 6] {
        [
            ResourceKind::FormMetadata,
            ResourceKind::LoanProducts,
            ResourceKind::PaymentCategories,
            ResourceKind::Loans,
            ResourceKind::Payments,
            ResourceKind::Dashboard,
        ]
    }

    /// Stable string form used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::FormMetadata => "form_metadata",
            ResourceKind::LoanProducts => "loan_products",
            ResourceKind::PaymentCategories => "payment_categories",
            ResourceKind::Loans => "loans",
            ResourceKind::Payments => "payments",
            ResourceKind::Dashboard => "dashboard",
        }
    }

    /// Default freshness window in milliseconds.
    pub fn sync_interval_ms(&self) -> i64 {
        match self {
            ResourceKind::FormMetadata => 24 * HOUR_MS,
            ResourceKind::LoanProducts => 12 * HOUR_MS,
            ResourceKind::PaymentCategories => 12 * HOUR_MS,
            ResourceKind::Loans => 15 * MINUTE_MS,
            ResourceKind::Payments => 15 * MINUTE_MS,
            ResourceKind::Dashboard => 5 * MINUTE_MS,
        }
    }

    /// Whether rows of this kind belong to one account rather than the
    /// shared catalog.
    pub fn is_user_scoped(&self) -> bool {
        matches!(
            self,
            ResourceKind::Loans | ResourceKind::Payments | ResourceKind::Dashboard
        )
    }

    /// Cache row key for this kind, scoped per account where the data is
    /// account-specific.
    pub fn cache_key(&self, user_id: Option<&str>) -> String {
        match (self.is_user_scoped(), user_id) {
            (true, Some(user_id)) => format!("{}:{}", self.as_str(), user_id),
            _ => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
