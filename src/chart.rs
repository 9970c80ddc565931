//! The normalized chart object model.
//!
//! A [`Chart`] owns metadata, the editable note/event/BGM/BGA tracks, the
//! timing note track and the derived [`TimingSegmentData`]. Edits go
//! through the track containers; [`Chart::invalidate`] afterwards rebuilds
//! the timeline and refreshes the derived beat/time position on every
//! element.

pub mod effector;
pub mod metadata;
pub mod note;
pub mod timing;
pub mod track;
pub mod tracks;

use md5::{Digest, Md5};

use self::metadata::MetaData;
use self::timing::TimingSegmentData;
use self::track::TrackData;
use self::tracks::{BgaData, BgmData, EventData, NoteData, TempoData};

/// One playable chart in the normalized model.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chart {
    /// Song and chart metadata, including the resource channel tables.
    pub metadata: MetaData,
    /// Playable notes.
    pub notes: NoteData,
    /// The timing note track.
    pub tempo: TempoData,
    /// Command events.
    pub events: EventData,
    /// Background animations.
    pub bga: BgaData,
    /// Autoplayed keysounds.
    pub bgm: BgmData,
    /// Derived tempo/bar timeline. Rebuilt by [`Chart::invalidate`].
    pub timing: TimingSegmentData,
    hash: Option<String>,
    filename: Option<String>,
}

impl Chart {
    /// Creates an empty chart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the derived timeline from the timing track and refreshes
    /// `beat`/`time_msec` on every element. Total: never fails, and
    /// running it twice yields the same result.
    pub fn invalidate(&mut self) {
        self.timing.invalidate(&self.tempo, &self.metadata);
        let timing = &self.timing;
        fill_positions(self.notes.tracks_mut(), timing);
        fill_positions(self.tempo.tracks_mut(), timing);
        fill_positions(self.events.tracks_mut(), timing);
        fill_positions(self.bga.tracks_mut(), timing);
        fill_positions(self.bgm.tracks_mut(), timing);
    }

    /// Appends the notes, events, BGM and BGA of `other`, shifted forward
    /// by `measure_from` measures. Timing data and metadata are not
    /// merged.
    pub fn merge(&mut self, other: &Chart, measure_from: f64) {
        merge_tracks(self.notes.tracks_mut(), other.notes.tracks(), measure_from);
        merge_tracks(self.events.tracks_mut(), other.events.tracks(), measure_from);
        merge_tracks(self.bga.tracks_mut(), other.bga.tracks(), measure_from);
        merge_tracks(self.bgm.tracks_mut(), other.bgm.tracks(), measure_from);
    }

    /// Number of scoreable note objects.
    #[must_use]
    pub fn score_note_count(&self) -> usize {
        self.notes.score_note_count()
    }

    /// Time of the last object of any kind, in milliseconds. Valid after
    /// [`Chart::invalidate`].
    #[must_use]
    pub fn song_last_object_time_ms(&self) -> f64 {
        let datas = [
            self.notes.tracks(),
            self.tempo.tracks(),
            self.events.tracks(),
            self.bga.tracks(),
            self.bgm.tracks(),
        ];
        datas
            .into_iter()
            .flat_map(TrackData::tracks)
            .filter_map(|t| t.last().map(note::NoteElement::time_msec))
            .fold(0.0, f64::max)
    }

    /// Whether the chart contains a longnote.
    #[must_use]
    pub fn has_long_note(&self) -> bool {
        self.notes.has_longnote()
    }

    /// Number of playable lanes in use.
    #[must_use]
    pub fn play_lane_count(&self) -> usize {
        self.notes.play_lane_count()
    }

    /// Whether there is no playable note.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// MD5 of the source bytes this chart was loaded from, if any.
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Computes and stores the MD5 digest of the canonical source bytes.
    pub fn set_source_hash(&mut self, source: &[u8]) {
        let digest = Md5::digest(source);
        let mut hex = String::with_capacity(32);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        self.hash = Some(hex);
    }

    /// File name inside the owning container, if known.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Records the file name inside the owning container.
    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = Some(filename.into());
    }
}

/// Refreshes derived beat/time on every element of `data`, one batch
/// query per track.
fn fill_positions(data: &mut TrackData, timing: &TimingSegmentData) {
    for track in data.tracks_mut() {
        let measures: Vec<f64> = track.iter().map(note::NoteElement::measure).collect();
        if measures.is_empty() {
            continue;
        }
        let beats = timing.beat_from_measure_arr(&measures);
        let times = timing.time_from_beat_arr(&beats);
        for ((element, beat), time) in track.iter_mut().zip(beats).zip(times) {
            element.set_derived(beat, time);
        }
    }
}

fn merge_tracks(into: &mut TrackData, from: &TrackData, measure_from: f64) {
    for (idx, src) in from.tracks().enumerate() {
        for element in src.iter() {
            let mut shifted = element.clone();
            shifted.set_measure(element.measure() + measure_from);
            into.push_to(idx, shifted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::note::{RowPos, TapKind, TempoPayload};
    use super::tracks::tap_element;
    use super::*;

    fn sample_chart() -> Chart {
        let mut chart = Chart::new();
        chart.metadata.bpm = 120.0;
        chart.tempo.push(4.0, TempoPayload::Bpm(240.0));
        chart
            .notes
            .push_tap(0, tap_element(0, RowPos::new(0, 4), TapKind::Normal, 0, 1, true));
        chart
            .notes
            .push_tap(1, tap_element(4, RowPos::new(0, 4), TapKind::Normal, 0, 2, true));
        chart.invalidate();
        chart
    }

    #[test]
    fn invalidate_fills_note_times() {
        let chart = sample_chart();
        let times: Vec<f64> = chart
            .notes
            .all_iter()
            .map(|(_, e)| e.time_msec())
            .collect();
        // 16 beats at 120 BPM.
        assert!((times[0] - 0.0).abs() < 1e-9);
        assert!((times[1] - 8000.0).abs() < 1e-6);
    }

    #[test]
    fn invalidate_is_idempotent() {
        let mut chart = sample_chart();
        let once = chart.clone();
        chart.invalidate();
        assert_eq!(chart, once);
    }

    #[test]
    fn merge_shifts_measures() {
        let mut chart = sample_chart();
        let other = sample_chart();
        chart.merge(&other, 8.0);
        chart.invalidate();
        assert_eq!(chart.score_note_count(), 4);
        let last = chart
            .notes
            .all_iter()
            .map(|(_, e)| e.measure())
            .fold(0.0, f64::max);
        assert!((last - 12.0).abs() < 1e-9);
    }

    #[test]
    fn hash_is_stable_hex() {
        let mut chart = Chart::new();
        chart.set_source_hash(b"#TITLE test\n");
        let hash = chart.hash().map(str::to_owned);
        chart.set_source_hash(b"#TITLE test\n");
        assert_eq!(chart.hash().map(str::to_owned), hash);
        assert_eq!(chart.hash().map(str::len), Some(32));
    }
}
