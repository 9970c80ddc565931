//! Re-exports of the commonly used types.
//!
//! `use chart_rs::prelude::*;` pulls in the whole public model at once.

pub use crate::bms::{LoadOptions, LoadOutput, LoadWarning, load, load_str, write_chart};
pub use crate::chart::{
    Chart,
    effector::{
        self, EffectorParam, LaneType, all_sc, flip, h_random, mirror, r_random, random, s_random,
    },
    metadata::{
        BgaChannel, BgaHeader, BmsBpmChannel, BmsStopChannel, DEFAULT_BPM, MetaData,
        MidiProgramChange, Rect, SoundChannel,
    },
    note::{
        BgaPayload, BgmPayload, ChainStatus, EventPayload, NoteElement, NotePayload, NotePoint,
        RowPos, SoundKind, SoundProperty, TapKind, TapPayload, TempoPayload,
    },
    timing::{BarObject, DEFAULT_MEASURE_LENGTH, TimingSegment, TimingSegmentData},
    track::{AllTrackIter, MAX_TRACK_COUNT, Row, RowIter, Track, TrackData, TrackDatatype},
    tracks::{
        BgaData, BgaLayer, BgmData, EventData, EventKind, LANES_PER_PLAYER, NoteData, TempoData,
        TimingKind, tap_element,
    },
};
pub use crate::encoding::SourceEncoding;
pub use crate::html::export_chart;
pub use crate::rng::{Rng, RngMock, SplitMix64};
pub use crate::song::{Directory, FolderDirectory, Song, SongError, SongType};
pub use crate::vos::{VosError, VosOutput};

#[cfg(feature = "rand")]
pub use crate::rng::RandRng;
