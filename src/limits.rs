//! Hard caps on external input, plus the booking policy constants.
//! Everything here bounds memory or enforces business policy; none of
//! these are tunable at runtime.

/// Maximum visits per apartment per Monday-to-Sunday week.
pub const MAX_VISITS_PER_WEEK: usize = 30;

/// Maximum concurrent visits sharing one (apartment, date, slot).
pub const SLOT_CAPACITY: usize = 2;

pub const MAX_APARTMENTS: usize = 100_000;
pub const MAX_RUNNERS: usize = 100_000;
pub const MAX_TENANTS: usize = 1_000_000;

/// Caps the assignment list per apartment; bookings only ever use the
/// first entry, the rest exist for administrative bookkeeping.
pub const MAX_RUNNERS_PER_APARTMENT: usize = 16;

pub const MAX_ZONE_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_RANGES_PER_DAY: usize = 16;

/// Widest allowed `list_visits` query, in days.
pub const MAX_LIST_WINDOW_DAYS: i64 = 366;
