// libs/booking-cell/src/services/conflict.rs
//
// Single definition of interval occupancy, consumed identically by slot
// generation and by the reservation path so the two can never disagree.
// Pure over the snapshot: no store access, no ambient clock.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::OccupancySnapshot;

/// Half-open interval overlap: [a_start, a_end) and [b_start, b_end)
/// overlap iff a_start < b_end && b_start < a_end.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// True when any occupancy source overlaps [start, end): an occupying
/// appointment (pending/confirmed), an active slot lock, or a blackout block.
pub fn is_occupied(
    snapshot: &OccupancySnapshot,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    is_occupied_excluding(snapshot, start, end, now, None)
}

/// As `is_occupied`, but ignoring one lock id. The finalize path uses this to
/// check a hold's interval against everything except the hold itself.
pub fn is_occupied_excluding(
    snapshot: &OccupancySnapshot,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    exclude_lock_id: Option<Uuid>,
) -> bool {
    let appointment_conflict = snapshot.appointments.iter().any(|apt| {
        apt.status.is_occupying()
            && intervals_overlap(start, end, apt.start_datetime, apt.end_datetime)
    });

    let lock_conflict = snapshot.locks.iter().any(|lock| {
        exclude_lock_id != Some(lock.id)
            && lock.is_active(now)
            && intervals_overlap(start, end, lock.start_datetime, lock.end_datetime)
    });

    let block_conflict = snapshot.blocks.iter().any(|block| {
        intervals_overlap(start, end, block.start_datetime, block.end_datetime)
    });

    appointment_conflict || lock_conflict || block_conflict
}
