//! Instance assignment for per-object tracks.
//!
//! Greedy nearest-centroid matching between consecutive frames, per label.
//! Only used when tracking mode is `ByInstance`; label-keyed tracking never
//! touches this module.

use crate::detect::Detection;

#[derive(Clone, Debug)]
struct ActiveInstance {
    id: u32,
    label: String,
    center: (i32, i32),
    last_seen: u64,
}

/// Assigns stable instance ids to detections across frames.
#[derive(Clone, Debug)]
pub struct CentroidMatcher {
    max_distance_px: i32,
    max_missing_frames: u64,
    next_id: u32,
    active: Vec<ActiveInstance>,
}

impl CentroidMatcher {
    pub fn new(max_distance_px: i32, max_missing_frames: u64) -> Self {
        Self {
            max_distance_px,
            max_missing_frames,
            next_id: 1,
            active: Vec::new(),
        }
    }

    /// Instance id for each detection, aligned with `detections`.
    pub fn assign(&mut self, frame_index: u64, detections: &[Detection]) -> Vec<u32> {
        self.expire(frame_index);

        let max_sq = i64::from(self.max_distance_px) * i64::from(self.max_distance_px);
        let centers: Vec<(i32, i32)> = detections.iter().map(|d| d.bbox.center()).collect();

        // (distance², detection, instance); ties broken by index for determinism
        let mut pairs: Vec<(i64, usize, usize)> = Vec::new();
        for (det_idx, det) in detections.iter().enumerate() {
            for (inst_idx, inst) in self.active.iter().enumerate() {
                if inst.label != det.label {
                    continue;
                }
                let dist = distance_sq(centers[det_idx], inst.center);
                if dist <= max_sq {
                    pairs.push((dist, det_idx, inst_idx));
                }
            }
        }
        pairs.sort_unstable();

        let mut assigned: Vec<Option<u32>> = vec![None; detections.len()];
        let mut taken = vec![false; self.active.len()];
        for (_, det_idx, inst_idx) in pairs {
            if assigned[det_idx].is_some() || taken[inst_idx] {
                continue;
            }
            taken[inst_idx] = true;
            let inst = &mut self.active[inst_idx];
            inst.center = centers[det_idx];
            inst.last_seen = frame_index;
            assigned[det_idx] = Some(inst.id);
        }

        assigned
            .into_iter()
            .enumerate()
            .map(|(det_idx, id)| match id {
                Some(id) => id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.active.push(ActiveInstance {
                        id,
                        label: detections[det_idx].label.clone(),
                        center: centers[det_idx],
                        last_seen: frame_index,
                    });
                    id
                }
            })
            .collect()
    }

    /// Instances still eligible for matching.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn expire(&mut self, frame_index: u64) {
        let max_missing = self.max_missing_frames;
        self.active
            .retain(|inst| frame_index.saturating_sub(inst.last_seen) <= max_missing);
    }
}

fn distance_sq(a: (i32, i32), b: (i32, i32)) -> i64 {
    let dx = i64::from(a.0) - i64::from(b.0);
    let dy = i64::from(a.1) - i64::from(b.1);
    dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, cx: i32, cy: i32) -> Detection {
        Detection::new(label, BoundingBox::new(cx - 5, cy - 5, cx + 5, cy + 5).unwrap())
    }

    #[test]
    fn keeps_ids_for_nearby_objects() {
        let mut matcher = CentroidMatcher::new(30, 10);
        let first = matcher.assign(1, &[det("person", 100, 100), det("person", 400, 100)]);
        assert_eq!(first, vec![1, 2]);

        // Reported in the opposite order, each still matches its own instance.
        let second = matcher.assign(2, &[det("person", 405, 102), det("person", 98, 101)]);
        assert_eq!(second, vec![2, 1]);
    }

    #[test]
    fn labels_never_share_instances() {
        let mut matcher = CentroidMatcher::new(30, 10);
        matcher.assign(1, &[det("person", 100, 100)]);
        let ids = matcher.assign(2, &[det("backpack", 100, 100)]);
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn far_moves_and_stale_instances_get_new_ids() {
        let mut matcher = CentroidMatcher::new(30, 2);
        matcher.assign(1, &[det("person", 0, 0)]);

        let jumped = matcher.assign(2, &[det("person", 200, 0)]);
        assert_eq!(jumped, vec![2]);

        // Instance 2 last seen at frame 2; by frame 6 it has expired.
        let later = matcher.assign(6, &[det("person", 200, 0)]);
        assert_eq!(later, vec![3]);
        assert_eq!(matcher.active_count(), 1);
    }

    #[test]
    fn opposite_corners_are_far_apart() {
        let corner = |x: i32, y: i32| {
            Detection::new("person", BoundingBox::new(x, y, x + 1, y + 1).unwrap())
        };
        let mut matcher = CentroidMatcher::new(i32::MAX, 10);
        matcher.assign(1, &[corner(i32::MIN, i32::MIN)]);
        let ids = matcher.assign(2, &[corner(i32::MAX - 1, i32::MAX - 1)]);
        assert_eq!(ids, vec![2]);
        assert_eq!(distance_sq((i32::MIN, i32::MIN), (i32::MAX, i32::MAX)), i64::MAX);
    }
}
