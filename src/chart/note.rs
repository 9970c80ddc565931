//! The element type stored in chart tracks.
//!
//! A [`NoteElement`] carries three positional views that are kept
//! consistent by [`Chart::invalidate`](crate::chart::Chart::invalidate):
//! the edit-time canonical `measure`, the derived `beat` (quarter notes)
//! and the derived `time_msec`. Parsers additionally record a rational
//! [`RowPos`] so that integer ratios from the source survive without
//! float drift.
//!
//! The payload is a tagged variant, one per track datatype; the track
//! level [`TrackDatatype`](crate::chart::track::TrackDatatype) is the
//! discriminator.

/// A rational offset inside one measure: `num / deno` of the measure span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowPos {
    /// Offset numerator.
    pub num: u32,
    /// Offset denominator. Never zero.
    pub deno: u32,
}

impl RowPos {
    /// Creates a row position. A zero denominator is coerced to 1.
    #[must_use]
    pub const fn new(num: u32, deno: u32) -> Self {
        let deno = if deno == 0 { 1 } else { deno };
        Self { num, deno }
    }

    /// The offset as a fraction in `[0, 1)`.
    #[must_use]
    pub fn fraction(self) -> f64 {
        f64::from(self.num) / f64::from(self.deno)
    }
}

impl Default for RowPos {
    fn default() -> Self {
        Self { num: 0, deno: 1 }
    }
}

/// Chain status of an element, for longnotes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChainStatus {
    /// A plain, unchained object.
    #[default]
    Tap,
    /// Head of a longnote.
    Start,
    /// Intermediate point of a longnote chain.
    Body,
    /// Tail of a longnote.
    End,
}

/// A column/position hint, used by touch layouts and BGM columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NotePoint {
    /// Horizontal position or column index.
    pub x: i32,
    /// Vertical position.
    pub y: i32,
    /// Depth position.
    pub z: i32,
}

/// What kind of sound a note references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SoundKind {
    /// No sound attached.
    #[default]
    None,
    /// A keysound from the WAV channel table.
    Wav,
    /// A MIDI event (VOS charts).
    Midi,
}

/// Sound property of a note.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SoundProperty {
    /// The sound source kind.
    pub kind: SoundKind,
    /// Sound length in milliseconds; zero when unknown.
    pub length: f64,
    /// Pitch or MIDI key.
    pub key: i32,
    /// Play volume in `[0, 1]`.
    pub volume: f32,
}

impl Default for SoundProperty {
    fn default() -> Self {
        Self {
            kind: SoundKind::None,
            length: 0.0,
            key: 0,
            volume: 1.0,
        }
    }
}

/// Detailed kind of a playable note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TapKind {
    /// General tappable, scorable note.
    #[default]
    Normal,
    /// Invisible keysound-change note; scorable in some modes, never drawn.
    Invisible,
    /// Mine/shock note.
    Mine,
    /// Drawn and sounded but not judged.
    Auto,
    /// Drawn but neither judged nor sounded.
    Fake,
    /// Free combo zone.
    Free,
}

/// Payload of a playable note.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TapPayload {
    /// Note kind.
    pub kind: TapKind,
    /// Player side, 0 or 1.
    pub player: u8,
    /// Keysound channel id (or damage value for mines).
    pub sound_id: u32,
    /// Whether the note contributes to scoring.
    pub scoreable: bool,
    /// Sound property.
    pub sound: SoundProperty,
}

/// Payload of an autoplayed BGM note referencing the sound channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgmPayload {
    /// Keysound channel id.
    pub sound_id: u32,
}

/// Payload of a BGA note referencing the BGA channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgaPayload {
    /// Image channel id.
    pub image_id: u32,
}

/// Payload of a timing object. The variant selects the timing track.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TempoPayload {
    /// Measure length multiplier from this measure on.
    Measure(f64),
    /// Scroll speed multiplier.
    Scroll(f64),
    /// Direct BPM change.
    Bpm(f64),
    /// Stop, in milliseconds.
    Stop(f64),
    /// Warp, in beats skipped.
    Warp(f64),
    /// Tick rate (SDVX style).
    Tick(u32),
    /// Indirect BPM change via the metadata BPM channel.
    BmsBpm(u32),
    /// Indirect stop via the metadata STOP channel.
    BmsStop(u32),
}

/// Payload of a command event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventPayload {
    /// A channel-id reference (BGA switch, keybind, ARGB id and the like).
    Id(u32),
    /// Raw text (`#TEXT`, `#CHANGEOPTION`, unknown-channel captures).
    Text(String),
}

/// The tagged value of a [`NoteElement`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NotePayload {
    /// Playable note data.
    Tap(TapPayload),
    /// Autoplayed keysound data.
    Bgm(BgmPayload),
    /// Background animation data.
    Bga(BgaPayload),
    /// Timing object data.
    Tempo(TempoPayload),
    /// Command event data.
    Event(EventPayload),
}

/// A positioned object inside one track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteElement {
    measure: f64,
    beat: f64,
    time_msec: f64,
    row: RowPos,
    chain: ChainStatus,
    point: NotePoint,
    payload: NotePayload,
}

impl NoteElement {
    /// Creates an element at `measure` with the given payload.
    #[must_use]
    pub fn new(measure: f64, payload: NotePayload) -> Self {
        Self {
            measure,
            beat: 0.0,
            time_msec: 0.0,
            row: RowPos::default(),
            chain: ChainStatus::Tap,
            point: NotePoint::default(),
            payload,
        }
    }

    /// Creates an element from a measure index and a rational in-measure
    /// offset, keeping the ratio for later serialization.
    #[must_use]
    pub fn at_row(measure_idx: u32, row: RowPos, payload: NotePayload) -> Self {
        let mut e = Self::new(f64::from(measure_idx) + row.fraction(), payload);
        e.row = row;
        e
    }

    /// Edit-time canonical position.
    #[must_use]
    pub const fn measure(&self) -> f64 {
        self.measure
    }

    /// Moves the element, refreshing the rational view with a denominator
    /// that preserves the fractional part as closely as representable.
    pub fn set_measure(&mut self, measure: f64) {
        self.measure = measure;
        let frac = measure - measure.floor();
        let deno = u64::from(self.row.deno).max(192);
        self.row = RowPos::new((frac * deno as f64).round() as u32, deno as u32);
    }

    /// Position in beats, valid after the owning chart was invalidated.
    #[must_use]
    pub const fn beat(&self) -> f64 {
        self.beat
    }

    /// Position in milliseconds, valid after the owning chart was
    /// invalidated.
    #[must_use]
    pub const fn time_msec(&self) -> f64 {
        self.time_msec
    }

    pub(crate) const fn set_derived(&mut self, beat: f64, time_msec: f64) {
        self.beat = beat;
        self.time_msec = time_msec;
    }

    /// The rational in-measure offset recorded by the parser.
    #[must_use]
    pub const fn row(&self) -> RowPos {
        self.row
    }

    /// Longnote chain status.
    #[must_use]
    pub const fn chain(&self) -> ChainStatus {
        self.chain
    }

    /// Sets the longnote chain status.
    pub const fn set_chain(&mut self, chain: ChainStatus) {
        self.chain = chain;
    }

    /// Column/position hint.
    #[must_use]
    pub const fn point(&self) -> NotePoint {
        self.point
    }

    /// Sets the column/position hint.
    pub const fn set_point(&mut self, point: NotePoint) {
        self.point = point;
    }

    /// The tagged payload.
    #[must_use]
    pub const fn payload(&self) -> &NotePayload {
        &self.payload
    }

    /// Mutable access to the payload.
    pub const fn payload_mut(&mut self) -> &mut NotePayload {
        &mut self.payload
    }

    /// The playable payload, if this is a tap element.
    #[must_use]
    pub const fn as_tap(&self) -> Option<&TapPayload> {
        match &self.payload {
            NotePayload::Tap(tap) => Some(tap),
            _ => None,
        }
    }

    /// The timing payload, if this is a tempo element.
    #[must_use]
    pub const fn as_tempo(&self) -> Option<&TempoPayload> {
        match &self.payload {
            NotePayload::Tempo(t) => Some(t),
            _ => None,
        }
    }

    /// Compares by measure position only.
    #[must_use]
    pub fn cmp_measure(&self, other: &Self) -> std::cmp::Ordering {
        self.measure.total_cmp(&other.measure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_row_places_fraction() {
        let e = NoteElement::at_row(3, RowPos::new(1, 4), NotePayload::Bgm(BgmPayload { sound_id: 1 }));
        assert!((e.measure() - 3.25).abs() < 1e-12);
        assert_eq!(e.row(), RowPos::new(1, 4));
    }

    #[test]
    fn set_measure_refreshes_row() {
        let mut e = NoteElement::new(0.0, NotePayload::Bgm(BgmPayload { sound_id: 1 }));
        e.set_measure(2.5);
        assert_eq!(e.row().num, 96);
        assert_eq!(e.row().deno, 192);
    }

    #[test]
    fn zero_denominator_is_coerced() {
        assert_eq!(RowPos::new(0, 0).deno, 1);
    }
}
