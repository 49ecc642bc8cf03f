// libs/booking-cell/src/services/slots.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{day_of_week, BookingError, TimeSlot};
use crate::services::conflict;
use crate::stores::{OccupancyStore, RuleStore};

pub struct SlotGeneratorService {
    rules: Arc<dyn RuleStore>,
    occupancy: Arc<dyn OccupancyStore>,
}

impl SlotGeneratorService {
    pub fn new(rules: Arc<dyn RuleStore>, occupancy: Arc<dyn OccupancyStore>) -> Self {
        Self { rules, occupancy }
    }

    /// Derive the day's bookable windows for a clinic, in chronological order.
    ///
    /// No active rule for the weekday means the clinic is closed that day and
    /// the list is empty; that is not an error. Candidates starting before
    /// `now` are not emitted at all; candidates intersecting the break window
    /// or reported occupied are emitted with `available = false` so the UI
    /// can render them disabled. A trailing window that would extend past the
    /// rule's end time is dropped.
    pub async fn generate(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, BookingError> {
        debug!("Generating slots for clinic {} on {}", clinic_id, date);

        let rule = match self
            .rules
            .active_rule_for_day(clinic_id, day_of_week(date))
            .await?
        {
            Some(rule) if rule.is_active => rule,
            _ => {
                debug!("Clinic {} is closed on {}", clinic_id, date);
                return Ok(vec![]);
            }
        };

        if rule.slot_duration_minutes <= 0 || rule.slot_duration_minutes + rule.buffer_minutes <= 0
        {
            warn!("Rule {} has a non-positive slot step, emitting no slots", rule.id);
            return Ok(vec![]);
        }

        let window_start = date.and_time(rule.start_time).and_utc();
        let window_end = date.and_time(rule.end_time).and_utc();

        let snapshot = self
            .occupancy
            .occupancy_for_range(clinic_id, window_start, window_end)
            .await?;

        let slot_duration = Duration::minutes(rule.slot_duration_minutes as i64);
        let step = Duration::minutes((rule.slot_duration_minutes + rule.buffer_minutes) as i64);
        let break_window = match (rule.break_start, rule.break_end) {
            (Some(break_start), Some(break_end)) => Some((
                date.and_time(break_start).and_utc(),
                date.and_time(break_end).and_utc(),
            )),
            _ => None,
        };

        let mut slots = Vec::new();
        let mut cursor = window_start;

        while cursor + slot_duration <= window_end {
            let slot_end = cursor + slot_duration;

            // No retroactive slots.
            if cursor >= now {
                let in_break = break_window.map_or(false, |(break_start, break_end)| {
                    conflict::intervals_overlap(cursor, slot_end, break_start, break_end)
                });
                let available =
                    !in_break && !conflict::is_occupied(&snapshot, cursor, slot_end, now);

                slots.push(TimeSlot {
                    start_datetime: cursor,
                    end_datetime: slot_end,
                    display: format!(
                        "{} - {}",
                        cursor.format("%H:%M"),
                        slot_end.format("%H:%M")
                    ),
                    available,
                });
            }

            cursor += step;
        }

        debug!(
            "Generated {} slots for clinic {} on {}",
            slots.len(),
            clinic_id,
            date
        );
        Ok(slots)
    }
}
