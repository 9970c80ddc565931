//! Lane permutation effectors.
//!
//! Every pass is deterministic for a given [`EffectorParam::seed`] and
//! operates on the playable lanes of one player side. Positions are never
//! touched, so derived beat/time values stay valid; callers still
//! re-invalidate the chart afterwards by convention.

use itertools::Itertools;

use crate::rng::{Rng, SplitMix64};

use super::Chart;
use super::note::ChainStatus;
use super::track::MAX_TRACK_COUNT;
use super::tracks::{LANES_PER_PLAYER, NoteData};

/// Role of one lane during effector passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LaneType {
    /// Not part of the layout; left alone.
    #[default]
    Free,
    /// A key lane taking part in shuffles.
    Note,
    /// The scratch lane.
    Sc,
    /// Pinned; never moves.
    Locked,
}

/// Parameters shared by all effectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectorParam {
    /// The player side to operate on, 0 or 1.
    pub player: u8,
    /// Number of lanes in the layout.
    pub lane_count: usize,
    /// Role per lane.
    pub locked_lane: [LaneType; MAX_TRACK_COUNT],
    /// Random seed.
    pub seed: u64,
}

impl Default for EffectorParam {
    fn default() -> Self {
        Self {
            player: 0,
            lane_count: 0,
            locked_lane: [LaneType::Free; MAX_TRACK_COUNT],
            seed: 0,
        }
    }
}

impl EffectorParam {
    fn with_note_lanes(lane_count: usize, note_lanes: usize) -> Self {
        let mut param = Self {
            lane_count,
            ..Self::default()
        };
        for lane in 0..note_lanes.min(MAX_TRACK_COUNT) {
            param.locked_lane[lane] = LaneType::Note;
        }
        param
    }

    /// A 7-key layout without scratch.
    #[must_use]
    pub fn seven_keys() -> Self {
        Self::with_note_lanes(7, 7)
    }

    /// A 9-key (pop'n) layout.
    #[must_use]
    pub fn nine_keys() -> Self {
        Self::with_note_lanes(9, 9)
    }

    /// A BMS single-play layout: 7 keys plus scratch, for `player`.
    #[must_use]
    pub fn bms_single(player: u8) -> Self {
        let mut param = Self::with_note_lanes(8, 7);
        param.player = player;
        param.locked_lane[7] = LaneType::Sc;
        param
    }

    /// The 1P half of a BMS double-play layout.
    #[must_use]
    pub fn bms_double_p1() -> Self {
        let mut param = Self::with_note_lanes(16, 7);
        param.locked_lane[14] = LaneType::Sc;
        param.locked_lane[15] = LaneType::Sc;
        param
    }

    /// The 2P half of a BMS double-play layout.
    #[must_use]
    pub fn bms_double_p2() -> Self {
        let mut param = Self {
            lane_count: 16,
            ..Self::default()
        };
        for lane in 7..14 {
            param.locked_lane[lane] = LaneType::Note;
        }
        param.locked_lane[14] = LaneType::Sc;
        param.locked_lane[15] = LaneType::Sc;
        param
    }

    /// First lane of the player side this parameter addresses.
    #[must_use]
    pub const fn base_lane(&self) -> usize {
        self.player as usize * LANES_PER_PLAYER
    }

    fn note_lanes(&self) -> Vec<usize> {
        (0..self.lane_count.min(MAX_TRACK_COUNT))
            .filter(|&i| self.locked_lane[i] == LaneType::Note)
            .collect()
    }
}

/// A per-layout lane permutation: lane `i` moves to `mapping[i]`.
fn shuffled_mapping(param: &EffectorParam, rng: &mut impl Rng) -> Vec<usize> {
    let mut mapping: Vec<usize> = (0..param.lane_count).collect();
    let note_lanes = param.note_lanes();
    let mut pool = note_lanes.clone();
    for i in (1..pool.len()).rev() {
        let j = rng.generate(0..=i as u64) as usize;
        pool.swap(i, j);
    }
    for (k, &lane) in note_lanes.iter().enumerate() {
        mapping[lane] = pool[k];
    }
    mapping
}

/// Expands a layout-relative mapping into a whole-container permutation
/// offset to the parameter's player side.
fn full_mapping(param: &EffectorParam, mapping: &[usize]) -> Vec<usize> {
    let base = param.base_lane();
    let mut full: Vec<usize> = (0..MAX_TRACK_COUNT).collect();
    for (i, &target) in mapping.iter().enumerate() {
        full[base + i] = base + target;
    }
    full
}

/// Longnote spans of the whole note container, for in-progress checks on
/// data that is being rebuilt.
fn hold_spans(notes: &NoteData) -> Vec<(f64, f64)> {
    let mut spans = Vec::new();
    for track in notes.tracks().tracks() {
        let mut open: Option<f64> = None;
        for e in track.iter() {
            match e.chain() {
                ChainStatus::Start => open = Some(e.measure()),
                ChainStatus::End => {
                    if let Some(start) = open.take() {
                        spans.push((start, e.measure()));
                    }
                }
                ChainStatus::Tap | ChainStatus::Body => {}
            }
        }
        if let Some(start) = open {
            spans.push((start, f64::INFINITY));
        }
    }
    spans
}

fn in_hold(spans: &[(f64, f64)], measure: f64) -> bool {
    spans.iter().any(|&(s, e)| s <= measure && measure <= e)
}

/// RANDOM: one shuffle of the key lanes for the whole chart.
pub fn random(chart: &mut Chart, param: &EffectorParam) {
    let mut rng = SplitMix64::new(param.seed);
    let mapping = shuffled_mapping(param, &mut rng);
    chart.notes.remap_tracks(&full_mapping(param, &mapping));
}

/// S-RANDOM: RANDOM, then R-RANDOM rotating by time, then RANDOM again.
pub fn s_random(chart: &mut Chart, param: &EffectorParam) {
    random(chart, param);
    r_random(chart, param, true);
    random(chart, param);
}

/// H-RANDOM: a fresh shuffle on every measure boundary, except while a
/// longnote is in progress there.
pub fn h_random(chart: &mut Chart, param: &EffectorParam) {
    let mut rng = SplitMix64::new(param.seed);
    let spans = hold_spans(&chart.notes);
    let base = param.base_lane();
    let lane_count = param.lane_count;
    let mut mapping: Vec<usize> = (0..lane_count).collect();
    let mut current_measure = i64::MIN;

    let items = chart.notes.tracks_mut().take_all();
    for (track, element) in items {
        let measure_idx = element.measure().floor() as i64;
        if measure_idx != current_measure {
            current_measure = measure_idx;
            if !in_hold(&spans, element.measure()) {
                mapping = shuffled_mapping(param, &mut rng);
            }
        }
        let target = match track.checked_sub(base) {
            Some(rel) if rel < lane_count => base + mapping[rel],
            _ => track,
        };
        chart.notes.tracks_mut().push_to(target, element);
    }
}

/// Beat-position rows merged over the whole layout.
struct RowGroups {
    items: Vec<(usize, crate::chart::note::NoteElement)>,
}

impl RowGroups {
    /// Splits the sorted item list into row ranges of equal measure.
    fn ranges(&self) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for (_, chunk) in &self.items.iter().chunk_by(|(_, e)| e.measure()) {
            let len = chunk.count();
            ranges.push(start..start + len);
            start += len;
        }
        ranges
    }
}

/// R-RANDOM: rotate the key lanes. The rotation amount per row is
/// `floor(delta0 + measure)`, or `floor(time_msec / 0.072)` with
/// `by_time`; it is frozen while a longnote is in progress.
pub fn r_random(chart: &mut Chart, param: &EffectorParam, by_time: bool) {
    let mut rng = SplitMix64::new(param.seed);
    let delta0 = rng.generate(0..=1023) as f64;
    let note_lanes = param.note_lanes();
    if note_lanes.is_empty() {
        return;
    }
    let mut lane_to_idx = [usize::MAX; MAX_TRACK_COUNT];
    for (idx, &lane) in note_lanes.iter().enumerate() {
        lane_to_idx[lane] = idx;
    }
    let spans = hold_spans(&chart.notes);
    let base = param.base_lane();

    let groups = RowGroups {
        items: chart.notes.tracks_mut().take_all(),
    };
    let ranges = groups.ranges();
    let mut items = groups.items;
    let mut shift: usize = 0;
    for range in ranges {
        let row_measure = items[range.start].1.measure();
        let rotate = !in_hold(&spans, row_measure);
        for (track, element) in &mut items[range.clone()] {
            let Some(rel) = track.checked_sub(base) else {
                continue;
            };
            if rel >= param.lane_count || lane_to_idx[rel] == usize::MAX {
                continue;
            }
            if rotate {
                let raw = if by_time {
                    element.time_msec() / 0.072
                } else {
                    delta0 + element.measure()
                };
                shift = raw.max(0.0).floor() as usize % note_lanes.len();
            }
            let new_idx = (lane_to_idx[rel] + shift + 1) % note_lanes.len();
            *track = base + note_lanes[new_idx];
        }
    }
    for (track, element) in items {
        chart.notes.tracks_mut().push_to(track, element);
    }
}

/// MIRROR: swap the key lanes end to end. An involution on layouts
/// without locked lanes.
pub fn mirror(chart: &mut Chart, param: &EffectorParam) {
    let mut mapping: Vec<usize> = (0..param.lane_count).collect();
    let mut s = 0;
    let mut e = param.lane_count.saturating_sub(1);
    while s < e {
        while s < e && param.locked_lane[s] != LaneType::Note {
            s += 1;
        }
        while s < e && param.locked_lane[e] != LaneType::Note {
            e -= 1;
        }
        if s < e {
            mapping.swap(s, e);
            s += 1;
            e -= 1;
        }
    }
    chart.notes.remap_tracks(&full_mapping(param, &mapping));
}

/// ALL-SC: move plain notes onto the scratch lane wherever it is free,
/// rotating the scan start per row to spread the picks.
pub fn all_sc(chart: &mut Chart, param: &EffectorParam) {
    let Some(sc) = (0..param.lane_count).find(|&i| param.locked_lane[i] == LaneType::Sc) else {
        return;
    };
    let base = param.base_lane();
    let lane_count = param.lane_count;

    let groups = RowGroups {
        items: chart.notes.tracks_mut().take_all(),
    };
    let ranges = groups.ranges();
    let mut items = groups.items;
    let mut scan_start = 0usize;
    for range in ranges {
        let row = &mut items[range];
        let sc_taken = row
            .iter()
            .any(|(track, _)| track.checked_sub(base) == Some(sc));
        if !sc_taken {
            for offset in 0..lane_count {
                let col = (offset + scan_start) % lane_count;
                for (track, element) in row.iter_mut() {
                    if track.checked_sub(base) == Some(col)
                        && element.chain() == ChainStatus::Tap
                    {
                        *track = base + sc;
                    }
                }
            }
        }
        scan_start += 1;
    }
    for (track, element) in items {
        chart.notes.tracks_mut().push_to(track, element);
    }
}

/// FLIP: reverse all lane indices, locked lanes included.
pub fn flip(chart: &mut Chart, param: &EffectorParam) {
    let mapping: Vec<usize> = (0..param.lane_count)
        .map(|i| param.lane_count - 1 - i)
        .collect();
    chart.notes.remap_tracks(&full_mapping(param, &mapping));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::note::{RowPos, TapKind};
    use crate::chart::tracks::tap_element;

    fn chart_with_lanes(lanes: &[usize]) -> Chart {
        let mut chart = Chart::new();
        for (i, &lane) in lanes.iter().enumerate() {
            chart.notes.push_tap(
                lane,
                tap_element(i as u32, RowPos::new(0, 4), TapKind::Normal, 0, 1, true),
            );
        }
        chart
    }

    fn occupied_lanes(chart: &Chart) -> Vec<usize> {
        chart.notes.all_iter().map(|(track, _)| track).collect()
    }

    #[test]
    fn mirror_is_an_involution() {
        let param = EffectorParam::seven_keys();
        let mut chart = chart_with_lanes(&[0, 2, 5, 6]);
        let before = occupied_lanes(&chart);
        mirror(&mut chart, &param);
        assert_eq!(occupied_lanes(&chart), vec![6, 4, 1, 0]);
        mirror(&mut chart, &param);
        assert_eq!(occupied_lanes(&chart), before);
    }

    #[test]
    fn flip_reverses_lanes() {
        let param = EffectorParam::seven_keys();
        let mut chart = chart_with_lanes(&[0, 1, 2]);
        flip(&mut chart, &param);
        assert_eq!(occupied_lanes(&chart), vec![6, 5, 4]);
    }

    #[test]
    fn random_preserves_note_multiset() {
        let mut param = EffectorParam::seven_keys();
        param.seed = 42;
        let mut chart = chart_with_lanes(&[0, 1, 2, 3, 4, 5, 6, 0, 3]);
        let count_before = chart.notes.score_note_count();
        random(&mut chart, &param);
        assert_eq!(chart.notes.score_note_count(), count_before);
        let mut lanes = occupied_lanes(&chart);
        lanes.sort_unstable();
        lanes.dedup();
        // Still confined to the layout.
        assert!(lanes.iter().all(|&l| l < 7));
    }

    #[test]
    fn random_is_deterministic_per_seed() {
        let mut param = EffectorParam::seven_keys();
        param.seed = 7;
        let mut a = chart_with_lanes(&[0, 1, 2, 3]);
        let mut b = chart_with_lanes(&[0, 1, 2, 3]);
        random(&mut a, &param);
        random(&mut b, &param);
        assert_eq!(occupied_lanes(&a), occupied_lanes(&b));
    }

    #[test]
    fn all_sc_moves_taps_to_scratch() {
        let param = EffectorParam::bms_single(0);
        let mut chart = chart_with_lanes(&[2]);
        all_sc(&mut chart, &param);
        assert_eq!(occupied_lanes(&chart), vec![7]);
    }

    #[test]
    fn h_random_keeps_notes_inside_layout() {
        let mut param = EffectorParam::seven_keys();
        param.seed = 3;
        let mut chart = chart_with_lanes(&[0, 1, 2, 3, 4, 5, 6]);
        h_random(&mut chart, &param);
        assert_eq!(chart.notes.score_note_count(), 7);
        assert!(occupied_lanes(&chart).iter().all(|&l| l < 7));
    }
}
