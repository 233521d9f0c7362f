use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::rentals::RentalEntity;

/// A booking request that broke one of the scheduling rules.
///
/// Rules are evaluated in declaration order and the first failure is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("cannot create a rental in the past")]
    PastBooking,
    #[error("end time must be after start time")]
    InvalidInterval,
    #[error("rental duration must be between {min_minutes} and {max_minutes} minutes")]
    Duration { min_minutes: i64, max_minutes: i64 },
    #[error("rental must start between {min_lead_minutes} minutes and {max_lead_days} days from now")]
    BookingWindow {
        min_lead_minutes: i64,
        max_lead_days: i64,
    },
    #[error("rental time is outside facility operating hours ({opening} - {closing})")]
    OperatingHours {
        opening: NaiveTime,
        closing: NaiveTime,
    },
    #[error("facility already booked for this time slot")]
    SlotConflict { conflicting_rental_id: Option<Uuid> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingHours {
    pub opening: NaiveTime,
    pub closing: NaiveTime,
}

/// Requested `[starts_at, ends_at)` window for a facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCandidate {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Rental being rescheduled; never conflicts with itself.
    pub replacing: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub min_lead: Duration,
    pub max_lead: Duration,
    /// Offset in which facility opening and closing times are expressed.
    pub local_offset: FixedOffset,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            min_duration: Duration::hours(1),
            max_duration: Duration::hours(4),
            min_lead: Duration::hours(1),
            max_lead: Duration::days(30),
            local_offset: Utc.fix(),
        }
    }
}

impl BookingPolicy {
    pub fn with_local_offset(mut self, local_offset: FixedOffset) -> Self {
        self.local_offset = local_offset;
        self
    }

    /// Runs every rule against the candidate. `existing` may contain any rentals of the
    /// same facility; cancelled ones and the rental being replaced are skipped.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        candidate: &SlotCandidate,
        hours: Option<OperatingHours>,
        existing: &[RentalEntity],
    ) -> Result<(), RuleViolation> {
        self.validate_timing(now, candidate.starts_at, candidate.ends_at)?;
        self.validate_operating_hours(candidate.starts_at, candidate.ends_at, hours)?;
        check_conflicts(candidate, existing)
    }

    /// Rules that only depend on the clock, checked before any lookup happens.
    pub fn validate_timing(
        &self,
        now: DateTime<Utc>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<(), RuleViolation> {
        if starts_at < now {
            return Err(RuleViolation::PastBooking);
        }

        if ends_at <= starts_at {
            return Err(RuleViolation::InvalidInterval);
        }

        let duration = ends_at - starts_at;
        if duration < self.min_duration || duration > self.max_duration {
            return Err(RuleViolation::Duration {
                min_minutes: self.min_duration.num_minutes(),
                max_minutes: self.max_duration.num_minutes(),
            });
        }

        if starts_at < now + self.min_lead || starts_at > now + self.max_lead {
            return Err(RuleViolation::BookingWindow {
                min_lead_minutes: self.min_lead.num_minutes(),
                max_lead_days: self.max_lead.num_days(),
            });
        }

        Ok(())
    }

    pub fn validate_operating_hours(
        &self,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        hours: Option<OperatingHours>,
    ) -> Result<(), RuleViolation> {
        let Some(hours) = hours else {
            return Ok(());
        };

        let local_start = starts_at.with_timezone(&self.local_offset).naive_local();
        let local_end = ends_at.with_timezone(&self.local_offset).naive_local();

        // The whole rental has to fit inside a single operating day.
        let within = local_start.date() == local_end.date()
            && local_start.time() >= hours.opening
            && local_end.time() <= hours.closing;

        if !within {
            return Err(RuleViolation::OperatingHours {
                opening: hours.opening,
                closing: hours.closing,
            });
        }

        Ok(())
    }
}

/// Intervals are half-open, so touching endpoints do not overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub fn check_conflicts(
    candidate: &SlotCandidate,
    existing: &[RentalEntity],
) -> Result<(), RuleViolation> {
    let conflict = existing.iter().find(|rental| {
        Some(rental.id) != candidate.replacing
            && !rental.is_cancelled()
            && overlaps(
                rental.starts_at,
                rental.ends_at,
                candidate.starts_at,
                candidate.ends_at,
            )
    });

    match conflict {
        Some(rental) => Err(RuleViolation::SlotConflict {
            conflicting_rental_id: Some(rental.id),
        }),
        None => Ok(()),
    }
}
