use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum SchedulerError {
    /// Apartment, runner, or tenant id does not resolve.
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The apartment has no runner assignment to book against.
    NoRunnerAssigned(Ulid),
    /// Preferred date falls on a weekend.
    InvalidDate(NaiveDate),
    QuotaExceeded {
        apartment_id: Ulid,
        week_start: NaiveDate,
    },
    /// The runner already serves a different zone on that date.
    ZoneConflict {
        date: NaiveDate,
    },
    NoSlotAvailable(NaiveDate),
    /// Boundary validation of caller-supplied data failed.
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    /// Transient store failure; the attempt left no state behind and the
    /// caller may retry.
    Unavailable(String),
    Internal(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::NotFound(id) => write!(f, "not found: {id}"),
            SchedulerError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            SchedulerError::NoRunnerAssigned(id) => {
                write!(f, "no runner assigned to apartment {id}")
            }
            SchedulerError::InvalidDate(date) => {
                write!(f, "cannot schedule visits on weekends: {date}")
            }
            SchedulerError::QuotaExceeded {
                apartment_id,
                week_start,
            } => write!(
                f,
                "weekly visit quota reached for apartment {apartment_id} in week of {week_start}"
            ),
            SchedulerError::ZoneConflict { date } => write!(
                f,
                "runner already has a visit scheduled in a different zone on {date}"
            ),
            SchedulerError::NoSlotAvailable(date) => {
                write!(f, "no available slots on {date}")
            }
            SchedulerError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            SchedulerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            SchedulerError::Unavailable(e) => write!(f, "store unavailable: {e}"),
            SchedulerError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {}
