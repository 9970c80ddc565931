//! Specialized track containers: notes, timing, events, BGM and BGA.

use super::note::{
    BgaPayload, BgmPayload, ChainStatus, NoteElement, NotePayload, RowPos, TapKind, TapPayload,
    TempoPayload,
};
use super::track::{AllTrackIter, RowIter, Track, TrackData, TrackDatatype};

/// Timing track subtypes, in track-index order.
///
/// The order is load-bearing: the all-track iterator breaks position ties
/// by ascending track index, so an indirect `BmsBpm`/`BmsStop` lookup
/// sorts after a direct `Bpm`/`Stop` placed at the same position and
/// therefore overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimingKind {
    /// Measure length change.
    Measure,
    /// Scroll speed change.
    Scroll,
    /// Direct BPM change.
    Bpm,
    /// Direct stop, milliseconds.
    Stop,
    /// Warp, beats skipped.
    Warp,
    /// Tick rate.
    Tick,
    /// BPM change through the metadata BPM channel.
    BmsBpm,
    /// Stop through the metadata STOP channel.
    BmsStop,
}

impl TimingKind {
    /// Number of timing subtypes.
    pub const COUNT: usize = 8;

    /// The track index assigned to this subtype.
    #[must_use]
    pub const fn track_index(self) -> usize {
        match self {
            Self::Measure => 0,
            Self::Scroll => 1,
            Self::Bpm => 2,
            Self::Stop => 3,
            Self::Warp => 4,
            Self::Tick => 5,
            Self::BmsBpm => 6,
            Self::BmsStop => 7,
        }
    }
}

impl TempoPayload {
    /// The timing subtype of this payload.
    #[must_use]
    pub const fn kind(&self) -> TimingKind {
        match self {
            Self::Measure(_) => TimingKind::Measure,
            Self::Scroll(_) => TimingKind::Scroll,
            Self::Bpm(_) => TimingKind::Bpm,
            Self::Stop(_) => TimingKind::Stop,
            Self::Warp(_) => TimingKind::Warp,
            Self::Tick(_) => TimingKind::Tick,
            Self::BmsBpm(_) => TimingKind::BmsBpm,
            Self::BmsStop(_) => TimingKind::BmsStop,
        }
    }
}

/// Event track subtypes, in track-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// Main BGA switch.
    BgaMain,
    /// Miss-layer BGA switch.
    BgaMiss,
    /// Overlay layer 1 switch.
    BgaLayer1,
    /// Overlay layer 2 switch.
    BgaLayer2,
    /// BGM command event.
    Bgm,
    /// MIDI command event.
    Midi,
    /// Key-bound BGA layer (`#SWBGA`).
    BmsKeyBind,
    /// `#EXTCHR` command.
    BmsExtChr,
    /// `#TEXT`/`#SONG` message, also the catch-all for unknown channels.
    BmsText,
    /// `#CHANGEOPTION` message.
    BmsOption,
    /// BGA opacity (`#ARGB` channel).
    BmsArgbLayer,
}

impl EventKind {
    /// Number of event subtypes.
    pub const COUNT: usize = 11;

    /// The track index assigned to this subtype.
    #[must_use]
    pub const fn track_index(self) -> usize {
        match self {
            Self::BgaMain => 0,
            Self::BgaMiss => 1,
            Self::BgaLayer1 => 2,
            Self::BgaLayer2 => 3,
            Self::Bgm => 4,
            Self::Midi => 5,
            Self::BmsKeyBind => 6,
            Self::BmsExtChr => 7,
            Self::BmsText => 8,
            Self::BmsOption => 9,
            Self::BmsArgbLayer => 10,
        }
    }
}

/// The four BGA layers, in track-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BgaLayer {
    /// Base layer.
    Main,
    /// Shown on miss.
    Miss,
    /// Overlay layer 1.
    Layer1,
    /// Overlay layer 2.
    Layer2,
}

impl BgaLayer {
    /// Number of layers.
    pub const COUNT: usize = 4;

    /// The track index assigned to this layer.
    #[must_use]
    pub const fn track_index(self) -> usize {
        match self {
            Self::Main => 0,
            Self::Miss => 1,
            Self::Layer1 => 2,
            Self::Layer2 => 3,
        }
    }
}

/// Playable and visible notes, one track per lane.
///
/// The lane numbering is `player * LANES_PER_PLAYER + lane`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteData {
    tracks: TrackData,
}

/// Lanes reserved per player side in [`NoteData`].
pub const LANES_PER_PLAYER: usize = 16;

impl Default for NoteData {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteData {
    /// Creates an empty note container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracks: TrackData::new(TrackDatatype::Note, 0),
        }
    }

    /// The underlying track container.
    #[must_use]
    pub const fn tracks(&self) -> &TrackData {
        &self.tracks
    }

    /// Mutable access to the underlying track container.
    pub const fn tracks_mut(&mut self) -> &mut TrackData {
        &mut self.tracks
    }

    /// Global lane index for `player` and in-player `lane`.
    #[must_use]
    pub const fn lane_index(player: u8, lane: usize) -> usize {
        player as usize * LANES_PER_PLAYER + lane
    }

    /// Inserts a tap element into the lane derived from its payload.
    pub fn push_tap(&mut self, lane: usize, element: NoteElement) {
        self.tracks.push_to(lane, element);
    }

    /// Merged iteration over every lane.
    #[must_use]
    pub fn all_iter(&self) -> AllTrackIter<'_> {
        self.tracks.all_iter()
    }

    /// Row iteration over every lane.
    #[must_use]
    pub fn row_iter(&self) -> RowIter<'_> {
        self.tracks.row_iter()
    }

    /// Applies a lane permutation; see
    /// [`TrackData::remap_tracks`].
    pub fn remap_tracks(&mut self, mapping: &[usize]) {
        self.tracks.remap_tracks(mapping);
    }

    /// Whether a longnote spans `measure` in any lane.
    #[must_use]
    pub fn has_hold_at(&self, measure: f64) -> bool {
        self.tracks.has_hold_at(measure)
    }

    /// Whether any lane contains a longnote.
    #[must_use]
    pub fn has_longnote(&self) -> bool {
        self.tracks.has_longnote()
    }

    /// Number of scoreable note objects. Longnotes count once, at their
    /// head.
    #[must_use]
    pub fn score_note_count(&self) -> usize {
        self.tracks
            .tracks()
            .flat_map(Track::iter)
            .filter(|e| {
                matches!(e.chain(), ChainStatus::Tap | ChainStatus::Start)
                    && e.as_tap().is_some_and(|t| t.scoreable)
            })
            .count()
    }

    /// Number of lanes in use (highest non-empty lane + 1).
    #[must_use]
    pub fn play_lane_count(&self) -> usize {
        self.tracks
            .tracks()
            .enumerate()
            .filter(|(_, t)| !t.is_empty())
            .map(|(i, _)| i + 1)
            .max()
            .unwrap_or(0)
    }

    /// Whether there is no note at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// The timing note track, one track per [`TimingKind`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TempoData {
    tracks: TrackData,
}

impl Default for TempoData {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoData {
    /// Creates an empty timing track set.
    #[must_use]
    pub fn new() -> Self {
        let mut tracks = TrackData::new(TrackDatatype::Tempo, TimingKind::COUNT);
        // Several stops may pile up at one position; the other subtypes
        // replace on position collision.
        for kind in [TimingKind::Stop, TimingKind::BmsStop] {
            if let Some(t) = tracks.track_mut(kind.track_index()) {
                t.set_duplicable(true);
            }
        }
        Self { tracks }
    }

    /// The underlying track container.
    #[must_use]
    pub const fn tracks(&self) -> &TrackData {
        &self.tracks
    }

    /// Mutable access to the underlying track container.
    pub const fn tracks_mut(&mut self) -> &mut TrackData {
        &mut self.tracks
    }

    /// Inserts a timing object at a measure position.
    pub fn push(&mut self, measure: f64, payload: TempoPayload) {
        let track = payload.kind().track_index();
        self.tracks
            .push_to(track, NoteElement::new(measure, NotePayload::Tempo(payload)));
    }

    /// Inserts a timing object with a rational in-measure offset.
    pub fn push_at_row(&mut self, measure_idx: u32, row: RowPos, payload: TempoPayload) {
        let track = payload.kind().track_index();
        self.tracks.push_to(
            track,
            NoteElement::at_row(measure_idx, row, NotePayload::Tempo(payload)),
        );
    }

    /// Merged iteration in the authoritative order.
    #[must_use]
    pub fn all_iter(&self) -> AllTrackIter<'_> {
        self.tracks.all_iter()
    }

    /// Whether no timing object exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Command events, one track per [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventData {
    tracks: TrackData,
}

impl Default for EventData {
    fn default() -> Self {
        Self::new()
    }
}

impl EventData {
    /// Creates an empty event track set.
    #[must_use]
    pub fn new() -> Self {
        let mut tracks = TrackData::new(TrackDatatype::Event, EventKind::COUNT);
        tracks.set_duplicable(true);
        Self { tracks }
    }

    /// The underlying track container.
    #[must_use]
    pub const fn tracks(&self) -> &TrackData {
        &self.tracks
    }

    /// Mutable access to the underlying track container.
    pub const fn tracks_mut(&mut self) -> &mut TrackData {
        &mut self.tracks
    }

    /// Inserts an event element.
    pub fn push(&mut self, kind: EventKind, element: NoteElement) {
        self.tracks.push_to(kind.track_index(), element);
    }

    /// Merged iteration over every event track.
    #[must_use]
    pub fn all_iter(&self) -> AllTrackIter<'_> {
        self.tracks.all_iter()
    }

    /// Total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.element_count()
    }

    /// Whether no event exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Autoplayed keysound notes, one track per BGM column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgmData {
    tracks: TrackData,
}

impl Default for BgmData {
    fn default() -> Self {
        Self::new()
    }
}

impl BgmData {
    /// Creates an empty BGM container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracks: TrackData::new(TrackDatatype::Bgm, 0),
        }
    }

    /// The underlying track container.
    #[must_use]
    pub const fn tracks(&self) -> &TrackData {
        &self.tracks
    }

    /// Mutable access to the underlying track container.
    pub const fn tracks_mut(&mut self) -> &mut TrackData {
        &mut self.tracks
    }

    /// Inserts a BGM note into `column`.
    pub fn push(&mut self, column: usize, measure_idx: u32, row: RowPos, sound_id: u32) {
        self.tracks.push_to(
            column,
            NoteElement::at_row(measure_idx, row, NotePayload::Bgm(BgmPayload { sound_id })),
        );
    }

    /// Merged iteration over every column.
    #[must_use]
    pub fn all_iter(&self) -> AllTrackIter<'_> {
        self.tracks.all_iter()
    }

    /// Whether no BGM note exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Background animation notes, one track per [`BgaLayer`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgaData {
    tracks: TrackData,
}

impl Default for BgaData {
    fn default() -> Self {
        Self::new()
    }
}

impl BgaData {
    /// Creates an empty BGA container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracks: TrackData::new(TrackDatatype::Bga, BgaLayer::COUNT),
        }
    }

    /// The underlying track container.
    #[must_use]
    pub const fn tracks(&self) -> &TrackData {
        &self.tracks
    }

    /// Mutable access to the underlying track container.
    pub const fn tracks_mut(&mut self) -> &mut TrackData {
        &mut self.tracks
    }

    /// Inserts a BGA switch into `layer`.
    pub fn push(&mut self, layer: BgaLayer, measure_idx: u32, row: RowPos, image_id: u32) {
        self.tracks.push_to(
            layer.track_index(),
            NoteElement::at_row(measure_idx, row, NotePayload::Bga(BgaPayload { image_id })),
        );
    }

    /// Merged iteration over the four layers.
    #[must_use]
    pub fn all_iter(&self) -> AllTrackIter<'_> {
        self.tracks.all_iter()
    }

    /// Whether no BGA note exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Convenience constructor for a playable tap element.
#[must_use]
pub fn tap_element(
    measure_idx: u32,
    row: RowPos,
    kind: TapKind,
    player: u8,
    sound_id: u32,
    scoreable: bool,
) -> NoteElement {
    NoteElement::at_row(
        measure_idx,
        row,
        NotePayload::Tap(TapPayload {
            kind,
            player,
            sound_id,
            scoreable,
            ..TapPayload::default()
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_tracks_follow_subtype_order() {
        let mut td = TempoData::new();
        td.push(0.0, TempoPayload::BmsBpm(1));
        td.push(0.0, TempoPayload::Bpm(150.0));
        let kinds: Vec<TimingKind> = td
            .all_iter()
            .filter_map(|(_, e)| e.as_tempo().map(TempoPayload::kind))
            .collect();
        // The indirect change sorts after the direct one at the same spot.
        assert_eq!(kinds, vec![TimingKind::Bpm, TimingKind::BmsBpm]);
    }

    #[test]
    fn score_count_skips_tails_and_invisibles() {
        let mut nd = NoteData::new();
        let mut head = tap_element(0, RowPos::new(0, 4), TapKind::Normal, 0, 1, true);
        head.set_chain(ChainStatus::Start);
        let mut tail = tap_element(1, RowPos::new(0, 4), TapKind::Normal, 0, 1, false);
        tail.set_chain(ChainStatus::End);
        nd.push_tap(0, head);
        nd.push_tap(0, tail);
        nd.push_tap(1, tap_element(0, RowPos::new(1, 4), TapKind::Invisible, 0, 2, false));
        nd.push_tap(2, tap_element(0, RowPos::new(2, 4), TapKind::Normal, 0, 3, true));
        assert_eq!(nd.score_note_count(), 2);
        assert_eq!(nd.play_lane_count(), 3);
        assert!(nd.has_longnote());
    }
}
