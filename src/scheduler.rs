//! Pure selection rule for "what does this station do next".

use crate::protocol::ObservationRequest;

/// Sorts a schedule ascending by start time. The sort is stable, so
/// entries sharing a start time keep their upload order.
pub fn sort_schedule(schedule: &mut [ObservationRequest]) {
    schedule.sort_by_key(|req| req.start_time_millis);
}

/// Returns the first entry whose start time is strictly after `now`,
/// with `current_time_millis` stamped on the returned copy only.
///
/// The schedule must already be sorted ascending by start time. Past-due
/// entries are neither re-offered nor removed; they stay until replaced
/// by a new schedule upload. End times need no check here: start is
/// always <= end, so one comparison is total.
pub fn next_observation(schedule: &[ObservationRequest], now: u64) -> Option<ObservationRequest> {
    schedule
        .iter()
        .find(|req| req.start_time_millis > now)
        .map(|req| {
            let mut next = req.clone();
            next.current_time_millis = Some(now);
            next
        })
}
