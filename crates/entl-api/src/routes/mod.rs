//! # API Route Modules
//!
//! - `entitlements` — course entitlement lifecycle: lazy expiration on read,
//!   partial update, soft revocation with LMS unenrollment, and the
//!   per-entitlement policy report.

pub mod entitlements;
