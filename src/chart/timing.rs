//! The segmented tempo/bar model.
//!
//! [`TimingSegmentData`] is derived data: it is wiped and rebuilt from the
//! timing note track by [`TimingSegmentData::invalidate`], and afterwards
//! answers bidirectional conversions between *measure*, *beat* and *time*
//! in milliseconds, accounting for BPM changes, stops, delays, warps,
//! measure length changes and scroll speed.
//!
//! Construction is total: malformed timing input is coerced or ignored
//! with a logged warning, never an error.

use log::warn;

use super::metadata::MetaData;
use super::note::TempoPayload;
use super::tracks::TempoData;

/// Default measure length in beats.
pub const DEFAULT_MEASURE_LENGTH: f64 = 4.0;

/// One homogeneous span of the tempo timeline.
///
/// All fields describe the state from this segment's start position up to
/// the next segment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingSegment {
    /// Start time in milliseconds.
    pub time_msec: f64,
    /// Start position in beats.
    pub beat: f64,
    /// Start position in measures.
    pub measure: f64,
    /// Beats per minute within the segment.
    pub bpm: f64,
    /// Stop duration in milliseconds at the segment start.
    pub stoptime: f64,
    /// Delay duration in milliseconds at the segment start.
    pub delaytime: f64,
    /// Beats skipped instantaneously at the segment start.
    pub warpbeat: f64,
    /// Scroll speed multiplier.
    pub scrollspeed: f64,
    /// Tick rate.
    pub tick: u32,
    /// Whether an attribute of this segment was explicitly set. Only
    /// untouched tails may be overwritten in place while seeking.
    pub is_manipulated: bool,
}

impl Default for TimingSegment {
    fn default() -> Self {
        Self {
            time_msec: 0.0,
            beat: 0.0,
            measure: 0.0,
            bpm: super::metadata::DEFAULT_BPM,
            stoptime: 0.0,
            delaytime: 0.0,
            warpbeat: 0.0,
            scrollspeed: 1.0,
            tick: 1,
            is_manipulated: false,
        }
    }
}

impl TimingSegment {
    /// A copy positioned at `(beat, time)` with stop/delay/warp cleared,
    /// used when a new segment block begins.
    fn copied_to(&self, beat: f64, time_msec: f64, measure: f64) -> Self {
        Self {
            time_msec,
            beat,
            measure,
            stoptime: 0.0,
            delaytime: 0.0,
            warpbeat: 0.0,
            is_manipulated: false,
            ..*self
        }
    }
}

/// One span of the bar (measure length) timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarObject {
    /// Measure index the length applies from.
    pub measure: u32,
    /// Beat position of that measure's start.
    pub beat: f64,
    /// Measure length as a fraction of [`DEFAULT_MEASURE_LENGTH`].
    pub barlength: f64,
}

impl Default for BarObject {
    fn default() -> Self {
        Self {
            measure: 0,
            beat: 0.0,
            barlength: 1.0,
        }
    }
}

fn time_from_beat_in(seg: &TimingSegment, beat: f64) -> f64 {
    let msec_per_beat = 60.0 * 1000.0 / (seg.bpm * seg.scrollspeed);
    let beat_delta = beat - seg.beat - seg.warpbeat;
    if beat_delta < 0.0 {
        seg.time_msec + seg.stoptime
    } else {
        seg.time_msec + seg.stoptime + seg.delaytime + beat_delta * msec_per_beat
    }
}

fn beat_from_time_in(seg: &TimingSegment, time_msec: f64) -> f64 {
    let beat_per_msec = seg.bpm * seg.scrollspeed / 60.0 / 1000.0;
    let time_delta = time_msec - seg.time_msec - (seg.stoptime + seg.delaytime);
    if time_delta <= 0.0 {
        seg.beat
    } else {
        seg.beat + seg.warpbeat + time_delta * beat_per_msec
    }
}

fn beat_from_measure_in(bar: &BarObject, measure: f64, recover: bool) -> f64 {
    let diff = measure - f64::from(bar.measure);
    if recover && diff > 1.0 {
        bar.beat + ((diff - 1.0) + bar.barlength) * DEFAULT_MEASURE_LENGTH
    } else {
        bar.beat + diff * bar.barlength * DEFAULT_MEASURE_LENGTH
    }
}

fn measure_from_beat_in(bar: &BarObject, beat: f64, recover: bool) -> f64 {
    let diff = beat - bar.beat;
    let bar_span = bar.barlength * DEFAULT_MEASURE_LENGTH;
    if recover && diff > bar_span {
        f64::from(bar.measure) + 1.0 + (diff - bar_span) / DEFAULT_MEASURE_LENGTH
    } else {
        f64::from(bar.measure) + diff / bar_span
    }
}

/// The derived tempo/bar timeline of one chart.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingSegmentData {
    segments: Vec<TimingSegment>,
    bars: Vec<BarObject>,
    recover_measure_length: bool,
}

impl Default for TimingSegmentData {
    fn default() -> Self {
        let mut data = Self {
            segments: Vec::new(),
            bars: Vec::new(),
            recover_measure_length: false,
        };
        data.reset();
        data
    }
}

impl TimingSegmentData {
    /// Creates a timeline with the sentinel segment only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every segment, leaving the sentinel.
    pub fn reset(&mut self) {
        self.segments.clear();
        self.bars.clear();
        let mut sentinel = TimingSegment::default();
        // The sentinel is never overwritten in place.
        sentinel.is_manipulated = true;
        self.segments.push(sentinel);
        self.bars.push(BarObject::default());
    }

    /// Whether a measure length change applies to its own measure only
    /// (BMS semantics) instead of all following measures (Stepmania
    /// semantics).
    #[must_use]
    pub const fn measure_length_recover(&self) -> bool {
        self.recover_measure_length
    }

    /// Sets the measure length recover mode. BMS loaders turn this on.
    pub const fn set_measure_length_recover(&mut self, recover: bool) {
        self.recover_measure_length = recover;
    }

    /// The built segments.
    #[must_use]
    pub fn segments(&self) -> &[TimingSegment] {
        &self.segments
    }

    /// The built bar objects.
    #[must_use]
    pub fn bars(&self) -> &[BarObject] {
        &self.bars
    }

    fn tail(&self) -> &TimingSegment {
        self.segments.last().expect("sentinel segment present")
    }

    fn tail_mut(&mut self) -> &mut TimingSegment {
        self.segments.last_mut().expect("sentinel segment present")
    }

    fn tail_bar(&self) -> &BarObject {
        self.bars.last().expect("sentinel bar present")
    }

    /// Rebuilds the timeline from the timing note track.
    pub fn invalidate(&mut self, tempo: &TempoData, meta: &MetaData) {
        self.reset();
        self.tail_mut().time_msec = meta.start_offset_ms;
        self.set_bpm(meta.bpm);

        for (_, element) in tempo.all_iter() {
            self.seek_to_measure(element.measure());
            let Some(payload) = element.as_tempo() else {
                continue;
            };
            match *payload {
                TempoPayload::Measure(length) => {
                    self.set_measure_length(element.measure().floor().max(0.0) as u32, length);
                }
                TempoPayload::Scroll(speed) => self.set_scroll(speed),
                TempoPayload::Bpm(bpm) => self.set_bpm(bpm),
                TempoPayload::BmsBpm(id) => match meta.bpm_channel.get(id as u16) {
                    Some(bpm) => self.set_bpm(bpm),
                    None => warn!("undefined BPM channel {id:02}, change skipped"),
                },
                TempoPayload::Stop(msec) => self.add_stop(msec),
                TempoPayload::BmsStop(id) => match meta.stop_channel.get(id as u16) {
                    Some(ticks) => {
                        // 192 ticks are one default measure, 4 beats.
                        let beats = ticks / 192.0 * 4.0;
                        let msec = beats / self.tail().bpm * 60_000.0;
                        self.add_stop(msec);
                    }
                    None => warn!("undefined STOP channel {id:02}, stop skipped"),
                },
                TempoPayload::Warp(beats) => self.set_warp(beats),
                TempoPayload::Tick(tick) => self.set_tick(tick),
            }
        }
    }

    /// Advances the tail segment to `measure`, deriving its beat and time
    /// from the current tail state.
    fn seek_to_measure(&mut self, measure: f64) {
        let beat = beat_from_measure_in(self.tail_bar(), measure, self.recover_measure_length);
        let time = time_from_beat_in(self.tail(), beat);
        self.seek(beat, time);
    }

    fn seek(&mut self, beat: f64, time_msec: f64) {
        let tail = self.tail();
        if beat < tail.beat {
            warn!("timing object going backwards at beat {beat}, clamped");
            return;
        }
        if tail.beat == beat {
            return;
        }
        let measure =
            measure_from_beat_in(self.tail_bar(), beat, self.recover_measure_length);
        let fresh = tail.copied_to(beat, time_msec, measure);
        if tail.is_manipulated {
            self.segments.push(fresh);
        } else {
            *self.tail_mut() = fresh;
        }
    }

    fn set_bpm(&mut self, bpm: f64) {
        if bpm <= 0.0 || !bpm.is_finite() {
            warn!("non-positive BPM {bpm} ignored");
            return;
        }
        if self.tail().bpm == bpm {
            return;
        }
        let tail = self.tail_mut();
        tail.bpm = bpm;
        tail.is_manipulated = true;
    }

    fn add_stop(&mut self, mut msec: f64) {
        if msec < 0.0 {
            warn!("negative stop {msec} msec coerced to positive");
            msec = -msec;
        }
        let tail = self.tail_mut();
        tail.stoptime += msec;
        tail.is_manipulated = true;
    }

    fn set_warp(&mut self, mut beats: f64) {
        if beats < 0.0 {
            // Rare, but present in some songs in the wild.
            warn!("negative warp length {beats} coerced to positive");
            beats = -beats;
        }
        let tail = self.tail_mut();
        tail.warpbeat = beats;
        tail.is_manipulated = true;
    }

    fn set_scroll(&mut self, mut speed: f64) {
        if speed <= 0.0 || !speed.is_finite() {
            warn!("non-positive scroll speed {speed} coerced to 1");
            speed = 1.0;
        }
        if self.tail().scrollspeed == speed {
            return;
        }
        let tail = self.tail_mut();
        tail.scrollspeed = speed;
        tail.is_manipulated = true;
    }

    fn set_tick(&mut self, tick: u32) {
        let tail = self.tail_mut();
        tail.tick = tick;
        tail.is_manipulated = true;
    }

    fn set_measure_length(&mut self, measure_idx: u32, barlength: f64) {
        if barlength <= 0.0 || !barlength.is_finite() {
            warn!("measure length {barlength} at measure {measure_idx} ignored");
            return;
        }
        let recover = self.recover_measure_length;
        let bar = *self.tail_bar();
        if measure_idx < bar.measure {
            warn!("measure length change going backwards at measure {measure_idx}, ignored");
            return;
        }
        if measure_idx == bar.measure {
            if bar.barlength != barlength {
                self.bars.last_mut().expect("sentinel bar present").barlength = barlength;
            }
            return;
        }
        let mut measure_count = f64::from(measure_idx - bar.measure);
        let mut default_count = 0.0;
        if recover {
            default_count = measure_count - 1.0;
            measure_count = 1.0;
        }
        let beat = bar.beat
            + (measure_count * bar.barlength + default_count) * DEFAULT_MEASURE_LENGTH;
        self.bars.push(BarObject {
            measure: measure_idx,
            beat,
            barlength,
        });
    }

    fn segment_for_beat(&self, beat: f64) -> &TimingSegment {
        let idx = self
            .segments
            .partition_point(|s| s.beat <= beat)
            .saturating_sub(1);
        &self.segments[idx]
    }

    fn segment_for_time(&self, time_msec: f64) -> &TimingSegment {
        let idx = self
            .segments
            .partition_point(|s| s.time_msec <= time_msec)
            .saturating_sub(1);
        &self.segments[idx]
    }

    fn bar_for_measure(&self, measure: u32) -> &BarObject {
        let idx = self
            .bars
            .partition_point(|b| b.measure <= measure)
            .saturating_sub(1);
        &self.bars[idx]
    }

    fn bar_for_beat(&self, beat: f64) -> &BarObject {
        let idx = self
            .bars
            .partition_point(|b| b.beat <= beat)
            .saturating_sub(1);
        &self.bars[idx]
    }

    /// Time in milliseconds of a beat position.
    #[must_use]
    pub fn time_from_beat(&self, beat: f64) -> f64 {
        time_from_beat_in(self.segment_for_beat(beat), beat)
    }

    /// Beat position of a time in milliseconds.
    #[must_use]
    pub fn beat_from_time(&self, time_msec: f64) -> f64 {
        beat_from_time_in(self.segment_for_time(time_msec), time_msec)
    }

    /// Beat position of a measure position.
    #[must_use]
    pub fn beat_from_measure(&self, measure: f64) -> f64 {
        let idx = measure.floor().max(0.0) as u32;
        beat_from_measure_in(self.bar_for_measure(idx), measure, self.recover_measure_length)
    }

    /// Measure position of a beat position.
    #[must_use]
    pub fn measure_from_beat(&self, beat: f64) -> f64 {
        measure_from_beat_in(self.bar_for_beat(beat), beat, self.recover_measure_length)
    }

    /// Time in milliseconds of a measure position.
    #[must_use]
    pub fn time_from_measure(&self, measure: f64) -> f64 {
        self.time_from_beat(self.beat_from_measure(measure))
    }

    /// Measure position of a time in milliseconds.
    #[must_use]
    pub fn measure_from_time(&self, time_msec: f64) -> f64 {
        self.measure_from_beat(self.beat_from_time(time_msec))
    }

    /// Batch variant of [`TimingSegmentData::beat_from_measure`] for
    /// ascending inputs; streams through the bar spans once.
    #[must_use]
    pub fn beat_from_measure_arr(&self, sorted_measures: &[f64]) -> Vec<f64> {
        let mut beats = Vec::with_capacity(sorted_measures.len());
        let mut idx = 0;
        for &m in sorted_measures {
            while idx + 1 < self.bars.len() && m >= f64::from(self.bars[idx + 1].measure) {
                idx += 1;
            }
            beats.push(beat_from_measure_in(
                &self.bars[idx],
                m,
                self.recover_measure_length,
            ));
        }
        beats
    }

    /// Batch variant of [`TimingSegmentData::time_from_beat`] for
    /// ascending inputs.
    #[must_use]
    pub fn time_from_beat_arr(&self, sorted_beats: &[f64]) -> Vec<f64> {
        let mut times = Vec::with_capacity(sorted_beats.len());
        let mut idx = 0;
        for &b in sorted_beats {
            while idx + 1 < self.segments.len() && b >= self.segments[idx + 1].beat {
                idx += 1;
            }
            times.push(time_from_beat_in(&self.segments[idx], b));
        }
        times
    }

    /// Batch conversion measure → time for ascending inputs.
    #[must_use]
    pub fn time_from_measure_arr(&self, sorted_measures: &[f64]) -> Vec<f64> {
        self.time_from_beat_arr(&self.beat_from_measure_arr(sorted_measures))
    }

    /// Batch conversion time → measure for ascending inputs.
    #[must_use]
    pub fn measure_from_time_arr(&self, sorted_times: &[f64]) -> Vec<f64> {
        let mut beats = Vec::with_capacity(sorted_times.len());
        let mut idx = 0;
        for &t in sorted_times {
            while idx + 1 < self.segments.len() && t >= self.segments[idx + 1].time_msec {
                idx += 1;
            }
            beats.push(beat_from_time_in(&self.segments[idx], t));
        }
        let mut measures = Vec::with_capacity(beats.len());
        idx = 0;
        for &b in &beats {
            while idx + 1 < self.bars.len() && b >= self.bars[idx + 1].beat {
                idx += 1;
            }
            measures.push(measure_from_beat_in(
                &self.bars[idx],
                b,
                self.recover_measure_length,
            ));
        }
        measures
    }

    /// The highest BPM reached.
    #[must_use]
    pub fn max_bpm(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.bpm)
            .fold(f64::MIN, f64::max)
    }

    /// The lowest BPM reached.
    #[must_use]
    pub fn min_bpm(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.bpm)
            .fold(f64::MAX, f64::min)
    }

    /// Whether the BPM ever changes.
    #[must_use]
    pub fn has_bpm_change(&self) -> bool {
        let first = self.segments[0].bpm;
        self.segments.iter().any(|s| s.bpm != first)
    }

    /// Whether any stop or delay exists.
    #[must_use]
    pub fn has_stop(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.stoptime > 0.0 || s.delaytime > 0.0)
    }

    /// Whether any warp exists.
    #[must_use]
    pub fn has_warp(&self) -> bool {
        self.segments.iter().any(|s| s.warpbeat > 0.0)
    }

    /// The length fraction of the measure `measure`.
    #[must_use]
    pub fn bar_length(&self, measure: u32) -> f64 {
        let bar = self.bar_for_measure(measure);
        if self.recover_measure_length && bar.measure != measure {
            1.0
        } else {
            bar.barlength
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(tempo: &TempoData, meta: &MetaData, recover: bool) -> TimingSegmentData {
        let mut timing = TimingSegmentData::new();
        timing.set_measure_length_recover(recover);
        timing.invalidate(tempo, meta);
        timing
    }

    #[test]
    fn two_segment_bpm() {
        let mut tempo = TempoData::new();
        tempo.push(0.0, TempoPayload::Bpm(180.0));
        tempo.push(10.0, TempoPayload::Bpm(90.0));
        let timing = build(&tempo, &MetaData::default(), true);

        assert!((timing.time_from_beat(40.0) - 40.0 * 60000.0 / 180.0).abs() < 1e-6);
        let t48 = 40.0 * 60000.0 / 180.0 + 8.0 * 60000.0 / 90.0;
        assert!((timing.time_from_beat(48.0) - t48).abs() < 1e-6);
        assert!((timing.beat_from_time(19000.0) - 48.5).abs() < 1e-6);
        assert!(timing.has_bpm_change());
        assert_eq!(timing.max_bpm(), 180.0);
        assert_eq!(timing.min_bpm(), 90.0);
    }

    #[test]
    fn stop_adds_a_gap() {
        let mut tempo = TempoData::new();
        tempo.push(0.0, TempoPayload::Bpm(180.0));
        tempo.push(10.0, TempoPayload::Bpm(90.0));
        tempo.push(12.0, TempoPayload::Stop(2000.0));
        let timing = build(&tempo, &MetaData::default(), true);

        let before = timing.time_from_beat(47.99);
        let at = timing.time_from_beat(48.0);
        let msec_per_beat = 60000.0 / 90.0;
        assert!((at - before - 2000.0).abs() < msec_per_beat * 0.02);
        assert!(timing.has_stop());
    }

    #[test]
    fn measure_shrink_with_recover() {
        let mut tempo = TempoData::new();
        tempo.push(3.0, TempoPayload::Measure(0.5));
        let timing = build(&tempo, &MetaData::default(), true);

        let b3 = timing.beat_from_measure(3.0);
        let b4 = timing.beat_from_measure(4.0);
        let b5 = timing.beat_from_measure(5.0);
        assert!((b4 - b3 - 0.5 * 4.0).abs() < 1e-9);
        assert!((b5 - b4 - 4.0).abs() < 1e-9);
        assert!((timing.bar_length(3) - 0.5).abs() < 1e-12);
        assert!((timing.bar_length(4) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn measure_beat_round_trip() {
        let mut tempo = TempoData::new();
        tempo.push(2.0, TempoPayload::Measure(0.75));
        tempo.push(6.0, TempoPayload::Measure(1.5));
        let timing = build(&tempo, &MetaData::default(), true);
        for m in [0.0, 0.5, 1.999, 2.0, 2.5, 3.0, 5.25, 6.0, 6.9, 10.0] {
            let back = timing.measure_from_beat(timing.beat_from_measure(m));
            assert!((back - m).abs() < 1e-6, "m={m} back={back}");
        }
    }

    #[test]
    fn beat_time_round_trip() {
        let mut tempo = TempoData::new();
        tempo.push(0.0, TempoPayload::Bpm(150.0));
        tempo.push(4.0, TempoPayload::Bpm(75.0));
        tempo.push(8.0, TempoPayload::Stop(500.0));
        let timing = build(&tempo, &MetaData::default(), true);
        for b in [0.0, 3.0, 15.9, 16.0, 17.0, 40.0] {
            let back = timing.beat_from_time(timing.time_from_beat(b));
            assert!((back - b).abs() < 1e-6, "b={b} back={back}");
        }
    }

    #[test]
    fn warp_skips_beats() {
        let mut tempo = TempoData::new();
        tempo.push(0.0, TempoPayload::Bpm(120.0));
        tempo.push(1.0, TempoPayload::Warp(2.0));
        let timing = build(&tempo, &MetaData::default(), true);
        // Inside the warp window time stays at the segment start.
        let at_warp_start = timing.time_from_beat(4.0);
        let inside = timing.time_from_beat(5.0);
        assert!((inside - at_warp_start).abs() < 1e-9);
        assert!(timing.has_warp());
    }

    #[test]
    fn batch_matches_point_queries() {
        let mut tempo = TempoData::new();
        tempo.push(0.0, TempoPayload::Bpm(180.0));
        tempo.push(2.0, TempoPayload::Measure(0.5));
        tempo.push(10.0, TempoPayload::Bpm(90.0));
        let timing = build(&tempo, &MetaData::default(), true);
        let measures = [0.0, 1.5, 2.0, 2.5, 3.0, 9.0, 10.0, 12.75];
        let batch = timing.time_from_measure_arr(&measures);
        for (&m, &t) in measures.iter().zip(batch.iter()) {
            assert!((timing.time_from_measure(m) - t).abs() < 1e-9);
        }
    }

    #[test]
    fn coercions_do_not_panic() {
        let mut tempo = TempoData::new();
        tempo.push(0.0, TempoPayload::Measure(0.0));
        tempo.push(1.0, TempoPayload::Scroll(-2.0));
        tempo.push(2.0, TempoPayload::Warp(-1.0));
        tempo.push(3.0, TempoPayload::BmsBpm(99));
        let timing = build(&tempo, &MetaData::default(), true);
        // Zero measure length ignored, scroll coerced to 1, warp positive.
        assert!((timing.bar_length(0) - 1.0).abs() < 1e-12);
        assert!(timing.segments().iter().all(|s| s.scrollspeed == 1.0));
        assert!(timing.has_warp());
    }
}
