//! # Course Entitlements
//!
//! An entitlement is a purchased or granted right to enroll in one run of a
//! course. It is redeemed by attaching a course enrollment, and it ends when
//! `expired_at` is stamped.
//!
//! ## Lifecycle
//!
//! ```text
//! Active (expired_at = None) ──expire / revoke──▶ Expired (expired_at = Some)
//! ```
//!
//! `Expired` is terminal. The only way to change `expired_at` once set is not
//! to: [`Entitlement::mark_expired`] is a no-op on an expired record and
//! [`Entitlement::set_expired_at`] rejects clearing or moving the stamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;

/// Seat type purchased with the entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CourseMode {
    #[serde(rename = "verified")]
    Verified,
    #[serde(rename = "professional")]
    Professional,
    #[serde(rename = "no-id-professional")]
    NoIdProfessional,
}

impl CourseMode {
    /// The canonical slug used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Professional => "professional",
            Self::NoIdProfessional => "no-id-professional",
        }
    }
}

impl std::fmt::Display for CourseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CourseMode {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(Self::Verified),
            "professional" => Ok(Self::Professional),
            "no-id-professional" => Ok(Self::NoIdProfessional),
            other => Err(LifecycleError::UnknownMode(other.to_string())),
        }
    }
}

/// Reference to the course enrollment an entitlement was redeemed into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRef {
    /// Enrollment record identifier.
    pub id: Uuid,
    /// Course run key, e.g. `course-v1:org.3+Demo+2026_T1`.
    pub course_id: String,
    /// When the enrollment was created.
    pub created: DateTime<Utc>,
}

/// Two-state lifecycle of an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementState {
    Active,
    Expired,
}

impl EntitlementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

/// A user's right to redeem a course seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub uuid: Uuid,
    /// Owning user's username.
    pub user: String,
    /// The course (not the run) this entitlement grants a seat in.
    pub course_uuid: Uuid,
    pub mode: CourseMode,
    #[serde(default)]
    pub order_number: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enrollment_course_run: Option<EnrollmentRef>,
    #[serde(default)]
    pub upgrade_deadline: Option<DateTime<Utc>>,
}

impl Entitlement {
    /// Create an active, unredeemed entitlement.
    pub fn new(
        user: impl Into<String>,
        course_uuid: Uuid,
        mode: CourseMode,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            user: user.into(),
            course_uuid,
            mode,
            order_number: None,
            created,
            modified: created,
            expired_at: None,
            enrollment_course_run: None,
            upgrade_deadline: None,
        }
    }

    pub fn state(&self) -> EntitlementState {
        if self.expired_at.is_some() {
            EntitlementState::Expired
        } else {
            EntitlementState::Active
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired_at.is_some()
    }

    pub fn is_redeemed(&self) -> bool {
        self.enrollment_course_run.is_some()
    }

    /// Stamp `expired_at` with `now` if it is unset.
    ///
    /// Returns `true` when the record changed. Calling this on an expired
    /// entitlement leaves the original stamp in place.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> bool {
        if self.expired_at.is_some() {
            return false;
        }
        self.expired_at = Some(now);
        self.modified = now;
        true
    }

    /// Detach the enrollment reference, returning it if one was set.
    pub fn clear_enrollment(&mut self, now: DateTime<Utc>) -> Option<EnrollmentRef> {
        let previous = self.enrollment_course_run.take();
        if previous.is_some() {
            self.modified = now;
        }
        previous
    }

    /// Apply an explicit `expired_at` from an update request.
    ///
    /// Setting a stamp on an active record is allowed; re-sending the current
    /// stamp is a no-op. Clearing or moving an existing stamp is rejected.
    pub fn set_expired_at(
        &mut self,
        value: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, LifecycleError> {
        match (self.expired_at, value) {
            (None, None) => Ok(false),
            (None, Some(at)) => {
                self.expired_at = Some(at);
                self.modified = now;
                Ok(true)
            }
            (Some(current), Some(at)) if current == at => Ok(false),
            (Some(current), Some(_)) => Err(LifecycleError::AlreadyExpired {
                uuid: self.uuid,
                expired_at: current,
            }),
            (Some(current), None) => Err(LifecycleError::ExpirationCleared {
                uuid: self.uuid,
                expired_at: current,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(now: DateTime<Utc>) -> Entitlement {
        Entitlement::new("edx", Uuid::new_v4(), CourseMode::Verified, now - Duration::days(5))
    }

    #[test]
    fn new_entitlement_is_active() {
        let ent = sample(Utc::now());
        assert_eq!(ent.state(), EntitlementState::Active);
        assert!(!ent.is_redeemed());
        assert_eq!(ent.created, ent.modified);
    }

    #[test]
    fn mark_expired_stamps_once() {
        let now = Utc::now();
        let mut ent = sample(now);
        assert!(ent.mark_expired(now));
        assert_eq!(ent.expired_at, Some(now));
        assert_eq!(ent.state(), EntitlementState::Expired);

        let later = now + Duration::hours(3);
        assert!(!ent.mark_expired(later));
        assert_eq!(ent.expired_at, Some(now), "first stamp must survive");
    }

    #[test]
    fn clear_enrollment_returns_previous() {
        let now = Utc::now();
        let mut ent = sample(now);
        let enrollment = EnrollmentRef {
            id: Uuid::new_v4(),
            course_id: "course-v1:org.1+Demo+Run".into(),
            created: now,
        };
        ent.enrollment_course_run = Some(enrollment.clone());
        assert_eq!(ent.clear_enrollment(now), Some(enrollment));
        assert!(ent.clear_enrollment(now).is_none());
    }

    #[test]
    fn set_expired_at_on_active_record() {
        let now = Utc::now();
        let mut ent = sample(now);
        assert_eq!(ent.set_expired_at(None, now), Ok(false));
        assert_eq!(ent.set_expired_at(Some(now), now), Ok(true));
        assert_eq!(ent.set_expired_at(Some(now), now), Ok(false));
    }

    #[test]
    fn set_expired_at_rejects_clearing() {
        let now = Utc::now();
        let mut ent = sample(now);
        ent.mark_expired(now);
        let err = ent.set_expired_at(None, now).unwrap_err();
        assert!(matches!(err, LifecycleError::ExpirationCleared { .. }));
        assert_eq!(ent.expired_at, Some(now));
    }

    #[test]
    fn set_expired_at_rejects_moving() {
        let now = Utc::now();
        let mut ent = sample(now);
        ent.mark_expired(now);
        let err = ent
            .set_expired_at(Some(now + Duration::days(1)), now)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyExpired { .. }));
    }

    #[test]
    fn course_mode_parses_slugs() {
        assert_eq!("verified".parse::<CourseMode>(), Ok(CourseMode::Verified));
        assert_eq!(
            "no-id-professional".parse::<CourseMode>(),
            Ok(CourseMode::NoIdProfessional)
        );
        assert!("audit".parse::<CourseMode>().is_err());
    }

    #[test]
    fn course_mode_serde_uses_slug() {
        let json = serde_json::to_string(&CourseMode::NoIdProfessional).unwrap();
        assert_eq!(json, "\"no-id-professional\"");
    }

    #[test]
    fn entitlement_deserializes_with_optional_fields_absent() {
        let json = serde_json::json!({
            "uuid": "7c3b5a2e-0a4f-4a4b-9a55-8d0c1f2b3c4d",
            "user": "staff",
            "course_uuid": "0e7c2d1a-0c55-4f0e-b1d1-2a2f7c5e9b10",
            "mode": "professional",
            "created": "2026-01-01T00:00:00Z",
            "modified": "2026-01-01T00:00:00Z"
        });
        let ent: Entitlement = serde_json::from_value(json).unwrap();
        assert!(ent.expired_at.is_none());
        assert!(ent.enrollment_course_run.is_none());
        assert!(ent.order_number.is_none());
    }
}
