//! The BMS family loader and writer (.bms/.bme/.bml/.pms).
//!
//! Loading runs in three phases: the conditional [`preprocess`]or
//! evaluates `#RANDOM`/`#IF`/`#SWITCH` blocks into a flat line sequence,
//! the header pass fills [`MetaData`](crate::chart::metadata::MetaData)
//! and the channel tables, and the object pass decodes `#MMMCC:payload`
//! lines into tracks. The loader never fails on malformed content; it
//! drops the offending line and records a [`LoadWarning`].
//!
//! [`preprocess`]: self::preprocess::preprocess

pub mod load;
pub mod preprocess;
pub mod write;

use thiserror::Error;

pub use load::{LoadOutput, load, load_str, load_str_with_rng};
pub use write::write_chart;

/// Options of one load call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadOptions {
    /// Seed of the conditional evaluation. `None` draws one from the wall
    /// clock at load start.
    pub seed: Option<u64>,
    /// Materialize conditional blocks (the default). When off, branch
    /// content is skipped entirely and only [`MetaData::script`] keeps the
    /// conditional source for a later re-evaluation.
    ///
    /// [`MetaData::script`]: crate::chart::metadata::MetaData::script
    pub process_conditionals: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            seed: None,
            process_conditionals: true,
        }
    }
}

impl LoadOptions {
    /// Options with a pinned seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// A diagnostic recorded while loading. Never fatal.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadWarning {
    /// A line could not be decoded and was dropped.
    #[error("line {line}: {reason}")]
    MalformedLine {
        /// 1-based source line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// An object line used a channel the loader does not know. The
    /// payload went to the catch-all text event track.
    #[error("line {line}: unknown channel `{channel}`")]
    UnknownChannel {
        /// 1-based source line number.
        line: usize,
        /// The channel string.
        channel: String,
    },
    /// A conditional directive appeared outside a matching block.
    #[error("line {line}: stray `{directive}`")]
    StrayDirective {
        /// 1-based source line number.
        line: usize,
        /// The directive that was ignored.
        directive: String,
    },
    /// A `#LNOBJ` terminator had no preceding note to convert.
    #[error("line {line}: LNOBJ terminator without a preceding note")]
    DanglingLnObj {
        /// 1-based source line number.
        line: usize,
    },
    /// The source bytes matched no known encoding and were decoded
    /// lossily.
    #[error("source encoding not recognized, decoded with replacements")]
    Encoding,
}
