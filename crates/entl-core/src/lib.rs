//! # entl-core — Foundational Types for Course Entitlements
//!
//! Domain types shared by the entitlement API and the `entl` CLI: the
//! entitlement record and its lifecycle, the per-site `ENTITLEMENT_POLICY`
//! and the predicates evaluated against it, site configuration, course runs,
//! learner schedules, and the JSON dataset format used for bootstrapping.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `entl-*` crates (this is the leaf of the DAG).
//! - No I/O beyond dataset files, no async.
//! - Every policy predicate takes the evaluation instant as an argument;
//!   nothing in this crate reads the clock.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod course;
pub mod dataset;
pub mod entitlement;
pub mod error;
pub mod policy;
pub mod schedule;
pub mod site;

// Re-export primary types for ergonomic imports.
pub use course::{CourseCatalog, CourseRun, SEEDED_ORG_PREFIX};
pub use dataset::{Dataset, SessionRecord};
pub use entitlement::{CourseMode, EnrollmentRef, Entitlement, EntitlementState};
pub use error::{DatasetError, LifecycleError, PolicyError};
pub use policy::{
    elapsed_days, get_days_until_expiration, is_entitlement_expired, is_entitlement_refundable,
    is_entitlement_regainable, EntitlementPolicy, PolicyReport, ENTITLEMENT_POLICY_KEY,
};
pub use schedule::{Schedule, ScheduleConfig};
pub use site::{Site, SiteConfiguration, SiteRegistry};
