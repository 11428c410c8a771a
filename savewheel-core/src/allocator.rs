/*!
Slot rotation policy.

The slot ring is keyed by "lowest free identifier" rather than a write
pointer, so a slot archive removed by hand is reclaimed by the next save.
Once every identifier is taken, the oldest slot by creation time is
overwritten.
*/

use tracing::debug;

use crate::config::MAX_CAPACITY;
use crate::slot::{SlotId, SlotSet};

/// Chooses the slot a new save is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAllocator {
    capacity: usize,
}

impl SlotAllocator {
    /// Create an allocator for rings of `capacity` slots
    ///
    /// The capacity is clamped to `1..=MAX_CAPACITY` so every identifier
    /// the allocator hands out fits a two-digit slot name.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(1, MAX_CAPACITY),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pick the identifier for the next save
    ///
    /// - empty set: `0`
    /// - fewer slots than capacity: the lowest identifier not in use
    /// - full set: the identifier of the oldest slot, which the caller
    ///   overwrites
    pub fn choose_slot(&self, existing: &SlotSet) -> SlotId {
        if existing.is_empty() {
            return SlotId::new(0);
        }

        if existing.len() < self.capacity {
            if let Some(free) = (0..self.capacity)
                .map(|candidate| SlotId::new(candidate as u8))
                .find(|candidate| !existing.contains(*candidate))
            {
                debug!(slot = %free, used = existing.len(), "Reusing lowest free slot");
                return free;
            }
        }

        // Slots are ordered newest first, so the last one is the oldest.
        let oldest = existing
            .slots()
            .last()
            .map(|slot| slot.id)
            .unwrap_or(SlotId::new(0));
        debug!(slot = %oldest, "Slot ring full, evicting oldest slot");
        oldest
    }

    /// True if saving into `existing` would overwrite an archive
    pub fn would_overwrite(&self, existing: &SlotSet) -> bool {
        existing.contains(self.choose_slot(existing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SaveSlot;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rand::seq::SliceRandom;
    use rand::Rng;

    const CAPACITY: usize = 5;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn set_of(slots: &[(u8, i64)]) -> SlotSet {
        let mut set = SlotSet::new(CAPACITY);
        for &(id, minutes) in slots {
            set.insert(SaveSlot::new(SlotId::new(id), at(minutes), format!("save_{id:02}.zip")))
                .unwrap();
        }
        set
    }

    #[test]
    fn test_empty_set_gets_slot_zero() {
        let allocator = SlotAllocator::new(CAPACITY);
        assert_eq!(allocator.choose_slot(&SlotSet::new(CAPACITY)), SlotId::new(0));
    }

    #[test]
    fn test_gap_reclaims_lowest_free() {
        let allocator = SlotAllocator::new(CAPACITY);
        let set = set_of(&[(1, 0), (3, 1)]);
        assert_eq!(allocator.choose_slot(&set), SlotId::new(0));
        assert!(!allocator.would_overwrite(&set));
    }

    #[test]
    fn test_middle_gap_is_filled() {
        let allocator = SlotAllocator::new(CAPACITY);
        let set = set_of(&[(0, 0), (1, 1), (3, 2), (4, 3)]);
        assert_eq!(allocator.choose_slot(&set), SlotId::new(2));
    }

    #[test]
    fn test_full_set_evicts_oldest() {
        let allocator = SlotAllocator::new(CAPACITY);
        let set = set_of(&[(0, 40), (1, 10), (2, 30), (3, 5), (4, 20)]);
        assert_eq!(allocator.choose_slot(&set), SlotId::new(3));
        assert!(allocator.would_overwrite(&set));
    }

    #[test]
    fn test_full_set_tie_evicts_lower_identifier() {
        let allocator = SlotAllocator::new(CAPACITY);
        let set = set_of(&[(0, 10), (1, 10), (2, 0), (3, 0), (4, 10)]);
        assert_eq!(allocator.choose_slot(&set), SlotId::new(2));
    }

    #[test]
    fn test_capacity_one_always_reuses_zero() {
        let allocator = SlotAllocator::new(1);
        let mut set = SlotSet::new(1);
        assert_eq!(allocator.choose_slot(&set), SlotId::new(0));
        set.insert(SaveSlot::new(SlotId::new(0), at(0), "save_00.zip")).unwrap();
        assert_eq!(allocator.choose_slot(&set), SlotId::new(0));
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(SlotAllocator::new(0).capacity(), 1);
        assert_eq!(SlotAllocator::new(1000).capacity(), MAX_CAPACITY);
        assert_eq!(SlotAllocator::new(usize::MAX).capacity(), MAX_CAPACITY);
    }

    #[test]
    fn test_oversized_capacity_never_leaves_the_slot_range() {
        let allocator = SlotAllocator::new(1000);

        let partial = set_of(&[(0, 0), (1, 1)]);
        assert_eq!(allocator.choose_slot(&partial), SlotId::new(2));

        let mut full = SlotSet::new(MAX_CAPACITY);
        for id in 0..MAX_CAPACITY as u8 {
            // Slot 37 is the oldest.
            let minutes = if id == 37 { -1 } else { i64::from(id) };
            full.insert(SaveSlot::new(SlotId::new(id), at(minutes), "archive.zip"))
                .unwrap();
        }
        let chosen = allocator.choose_slot(&full);
        assert_eq!(chosen, SlotId::new(37));
        assert!(chosen.index() < MAX_CAPACITY);
    }

    #[test]
    fn test_five_saves_then_rotation() {
        let allocator = SlotAllocator::new(CAPACITY);
        let mut set = SlotSet::new(CAPACITY);
        let mut chosen = Vec::new();

        for minute in 0..6 {
            let id = allocator.choose_slot(&set);
            chosen.push(id.value());
            set.insert(SaveSlot::new(id, at(minute), "archive.zip")).unwrap();
        }

        assert_eq!(chosen, vec![0, 1, 2, 3, 4, 0]);
        let mut ids: Vec<u8> = set.ids().map(SlotId::value).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_partial_sets_get_smallest_missing_identifier() {
        let allocator = SlotAllocator::new(CAPACITY);
        let mut rng = rand::thread_rng();
        let mut universe: Vec<u8> = (0..CAPACITY as u8).collect();

        for _ in 0..200 {
            universe.shuffle(&mut rng);
            let n = rng.gen_range(0..CAPACITY);
            let slots: Vec<(u8, i64)> = universe[..n]
                .iter()
                .map(|&id| (id, rng.gen_range(0..1_000)))
                .collect();
            let set = set_of(&slots);

            let chosen = allocator.choose_slot(&set);
            let expected = (0..CAPACITY as u8)
                .find(|id| !universe[..n].contains(id))
                .unwrap();
            assert_eq!(chosen.value(), expected, "set {:?}", &universe[..n]);
            assert!(!set.contains(chosen));
        }
    }

    #[test]
    fn test_full_sets_get_earliest_created() {
        let allocator = SlotAllocator::new(CAPACITY);
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let mut minutes: Vec<i64> = (0..CAPACITY as i64).map(|m| m * 7).collect();
            minutes.shuffle(&mut rng);
            let slots: Vec<(u8, i64)> = minutes
                .iter()
                .enumerate()
                .map(|(id, &m)| (id as u8, m))
                .collect();
            let set = set_of(&slots);

            let oldest = slots.iter().min_by_key(|(_, m)| *m).unwrap().0;
            assert_eq!(allocator.choose_slot(&set).value(), oldest);
        }
    }

    #[test]
    fn test_full_rotation_visits_every_identifier_once() {
        let allocator = SlotAllocator::new(CAPACITY);
        let mut rng = rand::thread_rng();
        let mut minutes: Vec<i64> = (0..CAPACITY as i64).collect();
        minutes.shuffle(&mut rng);
        let slots: Vec<(u8, i64)> = minutes
            .iter()
            .enumerate()
            .map(|(id, &m)| (id as u8, m))
            .collect();
        let mut set = set_of(&slots);

        let mut now = 100;
        let mut visited = Vec::new();
        for _ in 0..CAPACITY * 2 {
            let id = allocator.choose_slot(&set);
            visited.push(id.value());
            set.insert(SaveSlot::new(id, at(now), "archive.zip")).unwrap();
            now += 1;
        }

        let (first_round, second_round) = visited.split_at(CAPACITY);
        let mut sorted = first_round.to_vec();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
        assert_eq!(first_round, second_round);
    }
}
