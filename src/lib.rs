//! Rhythm game chart parser, editor and timing engine.
//!
//! This crate reads rhythm game chart files, notably the BMS family
//! (.bms/.bme/.bml/.pms) and VOS v2/v3, into one normalized, editable
//! model, and converts between the three positional views every chart
//! object carries: *measure*, *beat* and *time* in milliseconds.
//!
//! # Usage
//!
//! ```
//! use chart_rs::bms::{LoadOptions, load_str};
//!
//! let source = "
//! #TITLE example
//! #ARTIST someone
//! #BPM 150
//! #WAV01 kick.wav
//! #00111:01010101
//! ";
//! let output = load_str(source, &LoadOptions::with_seed(42));
//! assert_eq!(output.warnings, vec![]);
//! assert_eq!(output.chart.score_note_count(), 4);
//! let beat = output.chart.timing.beat_from_measure(1.0);
//! assert_eq!(output.chart.timing.time_from_beat(beat), 1600.0);
//! ```
//!
//! # Model
//!
//! A [`song::Song`] owns a backing container and its [`chart::Chart`]s.
//! Every chart bundles metadata with five track containers (notes,
//! timing, events, BGM, BGA) plus the derived
//! [`chart::timing::TimingSegmentData`]. Edits go through the tracks;
//! [`chart::Chart::invalidate`] afterwards rebuilds the timeline and the
//! derived positions. Lane permutation effectors (RANDOM, MIRROR and
//! friends) live in [`chart::effector`].
//!
//! # Features
//!
//! - `rand` (default) enables [`rng::RandRng`], backed by the `rand`
//!   crate; the built-in seeded generator works without it.
//! - `serde` derives `Serialize`/`Deserialize` on the model types.
//! - `cli` builds the `chartutil` binary.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bms;
pub mod chart;
pub mod encoding;
pub mod html;
pub mod prelude;
pub mod rng;
pub mod song;
pub mod vos;
