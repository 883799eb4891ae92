//! # Entitlement Policy
//!
//! Expiration, refund and regain checks for entitlements, driven by the
//! per-site `ENTITLEMENT_POLICY` dictionary:
//!
//! ```json
//! {
//!   "ENTITLEMENT_POLICY": {
//!     "expiration_period_days": 450,
//!     "refund_period_days": 60,
//!     "regain_period_days": 14
//!   }
//! }
//! ```
//!
//! Every predicate takes the evaluation instant explicitly. Day counts are
//! the floor of the elapsed time in whole days, so 29 days and 23 hours is
//! 29 days, and a predicate using "more than N days" first holds on day N+1.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entitlement::Entitlement;
use crate::error::PolicyError;
use crate::site::SiteConfiguration;

/// Site configuration key holding the policy thresholds.
pub const ENTITLEMENT_POLICY_KEY: &str = "ENTITLEMENT_POLICY";

const SECONDS_PER_DAY: i64 = 86_400;

/// Day-count thresholds for one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementPolicy {
    pub expiration_period_days: u32,
    pub refund_period_days: u32,
    pub regain_period_days: u32,
}

impl EntitlementPolicy {
    /// Read the thresholds from a policy dictionary.
    pub fn from_dict(dict: &Map<String, Value>) -> Result<Self, PolicyError> {
        Ok(Self {
            expiration_period_days: read_days(dict, "expiration_period_days")?,
            refund_period_days: read_days(dict, "refund_period_days")?,
            regain_period_days: read_days(dict, "regain_period_days")?,
        })
    }

    /// Load the policy from a site's configuration.
    pub fn from_site(configuration: &SiteConfiguration) -> Result<Self, PolicyError> {
        let dict = configuration.get_dict(ENTITLEMENT_POLICY_KEY)?;
        Self::from_dict(&dict)
    }

    /// Render the policy as the dictionary stored in site configuration.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "expiration_period_days": self.expiration_period_days,
            "refund_period_days": self.refund_period_days,
            "regain_period_days": self.regain_period_days,
        })
    }
}

fn read_days(dict: &Map<String, Value>, key: &'static str) -> Result<u32, PolicyError> {
    let value = dict.get(key).ok_or(PolicyError::MissingKey(key))?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| PolicyError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

/// Whole days elapsed from `from` to `to`, rounded toward negative infinity.
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// An unredeemed entitlement expires once more than
/// `expiration_period_days` have passed since it was created.
pub fn is_entitlement_expired(
    entitlement: &Entitlement,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> bool {
    elapsed_days(entitlement.created, now) > i64::from(policy.expiration_period_days)
        && !entitlement.is_redeemed()
}

/// Refund check: more than `refund_period_days` since creation and not yet
/// redeemed.
pub fn is_entitlement_refundable(
    entitlement: &Entitlement,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> bool {
    elapsed_days(entitlement.created, now) > i64::from(policy.refund_period_days)
        && !entitlement.is_redeemed()
}

/// Regain check for a redeemed entitlement.
///
/// `course_start` is the start date of the enrolled course run as resolved
/// by the caller's course catalog. An unredeemed entitlement is never
/// regainable; a redeemed one whose run cannot be resolved is an error.
pub fn is_entitlement_regainable(
    entitlement: &Entitlement,
    policy: &EntitlementPolicy,
    course_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool, PolicyError> {
    let Some(enrollment) = &entitlement.enrollment_course_run else {
        return Ok(false);
    };
    let start =
        course_start.ok_or_else(|| PolicyError::UnknownCourseRun(enrollment.course_id.clone()))?;
    let window = i64::from(policy.regain_period_days);
    Ok(elapsed_days(start, now) > window || elapsed_days(enrollment.created, now) > window)
}

/// The instant at which the entitlement's expiration period ends.
///
/// Despite the name this is a deadline, not a day count.
pub fn get_days_until_expiration(
    entitlement: &Entitlement,
    policy: &EntitlementPolicy,
) -> DateTime<Utc> {
    entitlement.created + Duration::days(i64::from(policy.expiration_period_days))
}

/// All policy checks for one entitlement at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReport {
    pub expired: bool,
    pub refundable: bool,
    pub regainable: bool,
    pub expiration_deadline: DateTime<Utc>,
}

impl PolicyReport {
    /// Evaluate every predicate without modifying the entitlement.
    pub fn evaluate(
        entitlement: &Entitlement,
        policy: &EntitlementPolicy,
        course_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            expired: is_entitlement_expired(entitlement, policy, now),
            refundable: is_entitlement_refundable(entitlement, policy, now),
            regainable: is_entitlement_regainable(entitlement, policy, course_start, now)?,
            expiration_deadline: get_days_until_expiration(entitlement, policy),
        })
    }
}
