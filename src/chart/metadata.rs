//! Chart metadata and the id-keyed resource channel tables.

use std::collections::BTreeMap;
use std::str::FromStr;

/// Fallback BPM when a chart defines none.
pub const DEFAULT_BPM: f64 = 130.0;

/// A source/destination rectangle for BGA cropping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub w: i32,
    /// Height.
    pub h: i32,
}

/// One image registration in the BGA channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgaHeader {
    /// Image or video file name.
    pub file: String,
    /// Source crop.
    pub src: Rect,
    /// Destination placement.
    pub dst: Rect,
}

/// An ordered MIDI program change (VOS charts).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MidiProgramChange {
    /// MIDI command byte.
    pub command: i32,
    /// Command value (program number).
    pub value: i32,
    /// Tick position the change applies from.
    pub position: u64,
}

/// Keysound registrations: channel id → file name, plus ordered MIDI
/// program changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SoundChannel {
    /// File name per channel id.
    pub files: BTreeMap<u16, String>,
    /// Program changes, ordered by position.
    pub programs: Vec<MidiProgramChange>,
}

/// BGA registrations: channel id → image header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgaChannel {
    /// Image header per channel id.
    pub headers: BTreeMap<u16, BgaHeader>,
}

/// `#BPMxx`/`#EXBPMxx` definitions: channel id → BPM.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BmsBpmChannel {
    /// BPM per channel id.
    pub bpm: BTreeMap<u16, f64>,
}

impl BmsBpmChannel {
    /// Looks up a registered BPM.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<f64> {
        self.bpm.get(&id).copied()
    }
}

/// `#STOPxx` definitions: channel id → stop length in ticks.
///
/// 192 ticks equal one default measure, which is 4 beats.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BmsStopChannel {
    /// Stop ticks per channel id.
    pub ticks: BTreeMap<u16, f64>,
}

impl BmsStopChannel {
    /// Looks up registered stop ticks.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<f64> {
        self.ticks.get(&id).copied()
    }
}

/// Song and chart metadata.
///
/// The commonly used fields are typed; anything else round-trips through
/// [`MetaData::set_attr`] / [`MetaData::get_attr`] as strings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetaData {
    /// Song title.
    pub title: Option<String>,
    /// Song subtitle.
    pub subtitle: Option<String>,
    /// Song artist.
    pub artist: Option<String>,
    /// Co-artist.
    pub subartist: Option<String>,
    /// Genre.
    pub genre: Option<String>,
    /// Chart name (NORMAL, HYPER, ANOTHER, ...).
    pub chart_name: Option<String>,
    /// Who arranged the notes.
    pub chart_maker: Option<String>,
    /// Number of players, 1 or 2.
    pub player_count: u8,
    /// Player side the chart is authored for, 0 or 1.
    pub player_side: u8,
    /// Difficulty slot.
    pub difficulty: u32,
    /// Play level.
    pub level: u32,
    /// Basic BPM.
    pub bpm: f64,
    /// Judge difficulty on a 100 scale.
    pub judge_rank: f64,
    /// Gauge total.
    pub gauge_total: f64,
    /// BMS `#LNTYPE`, 1 or 2.
    pub ln_type: u32,
    /// BMS `#LNOBJ` terminator keysound id.
    pub ln_obj: Option<u16>,
    /// Background image shown while playing.
    pub back_image: Option<String>,
    /// Loading screen image.
    pub stage_image: Option<String>,
    /// Banner image.
    pub banner_image: Option<String>,
    /// Select-screen preview sound.
    pub preview_music: Option<String>,
    /// The song file played alongside the chart, if one exists.
    pub music: Option<String>,
    /// Lyrics file.
    pub lyrics: Option<String>,
    /// Chart start offset in milliseconds.
    pub start_offset_ms: f64,
    /// Editor row resolution per measure.
    pub resolution: u32,
    /// Verbatim text of conditional source statements, kept for
    /// diagnostics and re-evaluation.
    pub script: String,
    /// Uncategorized attributes.
    pub attributes: BTreeMap<String, String>,
    /// Keysound channel table.
    pub sound_channel: SoundChannel,
    /// BGA channel table.
    pub bga_channel: BgaChannel,
    /// Indirect BPM channel table.
    pub bpm_channel: BmsBpmChannel,
    /// Indirect STOP channel table.
    pub stop_channel: BmsStopChannel,
}

impl Default for MetaData {
    fn default() -> Self {
        Self {
            title: None,
            subtitle: None,
            artist: None,
            subartist: None,
            genre: None,
            chart_name: None,
            chart_maker: None,
            player_count: 1,
            player_side: 0,
            difficulty: 0,
            level: 0,
            bpm: DEFAULT_BPM,
            judge_rank: 50.0,
            gauge_total: 0.0,
            ln_type: 1,
            ln_obj: None,
            back_image: None,
            stage_image: None,
            banner_image: None,
            preview_music: None,
            music: None,
            lyrics: None,
            start_offset_ms: 0.0,
            resolution: 192,
            script: String::new(),
            attributes: BTreeMap::new(),
            sound_channel: SoundChannel::default(),
            bga_channel: BgaChannel::default(),
            bpm_channel: BmsBpmChannel::default(),
            stop_channel: BmsStopChannel::default(),
        }
    }
}

impl MetaData {
    /// Reads an attribute, parsing it into `T`. Returns `fallback` when
    /// the key is missing or unparseable.
    #[must_use]
    pub fn get_attr<T: FromStr>(&self, key: &str, fallback: T) -> T {
        self.attributes
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(fallback)
    }

    /// Stores an attribute as its string form.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl ToString) {
        self.attributes.insert(key.into(), value.to_string());
    }

    /// Whether an attribute is present.
    #[must_use]
    pub fn has_attr(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_round_trip_through_strings() {
        let mut meta = MetaData::default();
        meta.set_attr("playlevel", 12);
        assert_eq!(meta.get_attr("playlevel", 0), 12);
        assert_eq!(meta.get_attr::<f64>("playlevel", 0.0), 12.0);
        assert_eq!(meta.get_attr("missing", 7), 7);
        meta.set_attr("rank", "not a number");
        assert_eq!(meta.get_attr("rank", 2), 2);
    }

    #[test]
    fn channels_are_always_usable() {
        let mut meta = MetaData::default();
        assert!(meta.bpm_channel.get(1).is_none());
        meta.bpm_channel.bpm.insert(1, 178.0);
        assert_eq!(meta.bpm_channel.get(1), Some(178.0));
    }
}
