//! The BMS header and object passes.
//!
//! # Longnote notation
//!
//! Channels 51–59/61–69 hold longnotes. With `#LNTYPE 1` values toggle
//! start and end per lane. With `#LNTYPE 2` a run of non-zero values
//! starts a longnote at the first value and the first `00` after the run
//! ends it at its own position; the head keeps the first keysound.
//! Additionally a visible note whose value equals `#LNOBJ` converts the
//! previous note of that lane into a longnote ending at the `#LNOBJ`
//! position; the terminator itself is not scorable.

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::chart::Chart;
use crate::chart::metadata::BgaHeader;
use crate::chart::note::{
    ChainStatus, EventPayload, NoteElement, NotePayload, RowPos, TapKind, TempoPayload,
};
use crate::chart::tracks::{BgaLayer, EventKind, NoteData, tap_element};
use crate::encoding::{self, SourceEncoding};
use crate::rng::{Rng, SplitMix64};

use super::preprocess::{SourceLine, preprocess};
use super::{LoadOptions, LoadWarning};

/// Result of one load call.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutput {
    /// The loaded, invalidated chart.
    pub chart: Chart,
    /// Diagnostics collected along the way.
    pub warnings: Vec<LoadWarning>,
}

/// Loads a BMS chart from raw bytes, decoding the encoding first.
#[must_use]
pub fn load(bytes: &[u8], options: &LoadOptions) -> LoadOutput {
    let (text, source_encoding) = encoding::decode(bytes);
    let mut output = load_str(&text, options);
    if source_encoding == SourceEncoding::LossyFallback {
        output.warnings.push(LoadWarning::Encoding);
    }
    output.chart.set_source_hash(bytes);
    output
}

/// Loads a BMS chart from UTF-8 text.
#[must_use]
pub fn load_str(source: &str, options: &LoadOptions) -> LoadOutput {
    let seed = options.seed.unwrap_or_else(clock_seed);
    load_str_with_rng(source, options, SplitMix64::new(seed))
}

/// Loads a BMS chart with a caller supplied random source for the
/// conditional evaluation.
pub fn load_str_with_rng(source: &str, options: &LoadOptions, mut rng: impl Rng) -> LoadOutput {
    let mut chart = Chart::new();
    let pre = preprocess(source, &mut rng, options.process_conditionals);
    let mut warnings = pre.warnings;
    chart.metadata.script = pre.script;

    let mut measure_lengths: BTreeMap<u32, f64> = BTreeMap::new();
    let mut objects: Vec<RawObject> = Vec::new();
    let mut collector = ObjectCollector::default();

    for line in &pre.lines {
        if is_object_line(line.text) {
            collector.collect(line, &mut objects, &mut measure_lengths, &mut chart, &mut warnings);
        } else {
            parse_header(line, &mut chart, &mut warnings);
        }
    }

    objects.sort_by(|a, b| {
        (a.measure, a.fraction())
            .partial_cmp(&(b.measure, b.fraction()))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    place_objects(&objects, &mut chart, &mut warnings);

    for (&measure, &length) in &measure_lengths {
        chart
            .tempo
            .push(f64::from(measure), TempoPayload::Measure(length));
    }

    chart.timing.set_measure_length_recover(true);
    chart.invalidate();
    LoadOutput { chart, warnings }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn base36_digit(byte: u8) -> Option<u32> {
    match byte {
        b'0'..=b'9' => Some(u32::from(byte - b'0')),
        b'a'..=b'z' => Some(u32::from(byte - b'a') + 10),
        b'A'..=b'Z' => Some(u32::from(byte - b'A') + 10),
        _ => None,
    }
}

fn parse_base36(text: &str) -> Option<u32> {
    text.bytes()
        .try_fold(0u32, |acc, b| Some(acc * 36 + base36_digit(b)?))
}

fn parse_base16_pair(hi: u8, lo: u8) -> Option<u32> {
    let hex = |b: u8| (b as char).to_digit(16);
    Some(hex(hi)? * 16 + hex(lo)?)
}

fn is_object_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() > 6
        && bytes[0] == b'#'
        && bytes[1..4].iter().all(u8::is_ascii_digit)
        && bytes[4..6].iter().all(u8::is_ascii_alphanumeric)
        && bytes[6] == b':'
}

fn split_header(line: &str) -> (String, &str) {
    let body = &line[1..];
    let name_end = body
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(body.len());
    let name = body[..name_end].to_ascii_lowercase();
    let value = body[name_end..].trim();
    (name, value)
}

fn parse_header(line: &SourceLine<'_>, chart: &mut Chart, warnings: &mut Vec<LoadWarning>) {
    let (name, value) = split_header(line.text);
    let meta = &mut chart.metadata;
    let malformed = |warnings: &mut Vec<LoadWarning>, reason: &str| {
        warnings.push(LoadWarning::MalformedLine {
            line: line.number,
            reason: reason.into(),
        });
    };

    match name.as_str() {
        "title" => meta.title = Some(value.to_owned()),
        "subtitle" => meta.subtitle = Some(value.to_owned()),
        "artist" => meta.artist = Some(value.to_owned()),
        "subartist" => meta.subartist = Some(value.to_owned()),
        "genre" => meta.genre = Some(value.to_owned()),
        "maker" => meta.chart_maker = Some(value.to_owned()),
        "player" => match value.parse::<u8>() {
            // 1 = single, 2 = couple, 3 = double; both latter use two sides.
            Ok(1) => meta.player_count = 1,
            Ok(2 | 3) => meta.player_count = 2,
            _ => malformed(warnings, "unparsable #PLAYER"),
        },
        "playlevel" => match value.parse() {
            Ok(level) => meta.level = level,
            Err(_) => malformed(warnings, "unparsable #PLAYLEVEL"),
        },
        "difficulty" => match value.parse() {
            Ok(difficulty) => meta.difficulty = difficulty,
            Err(_) => malformed(warnings, "unparsable #DIFFICULTY"),
        },
        "rank" => match value.parse::<f64>() {
            // The 0-4 rank scale maps onto a 100 judge scale.
            Ok(rank) => meta.judge_rank = rank / 4.0 * 100.0,
            Err(_) => malformed(warnings, "unparsable #RANK"),
        },
        "total" => match value.parse() {
            Ok(total) => meta.gauge_total = total,
            Err(_) => malformed(warnings, "unparsable #TOTAL"),
        },
        "banner" => meta.banner_image = Some(value.to_owned()),
        "backbmp" => meta.back_image = Some(value.to_owned()),
        "stagefile" => meta.stage_image = Some(value.to_owned()),
        "bpm" => match value.parse::<f64>() {
            Ok(bpm) if bpm > 0.0 => meta.bpm = bpm,
            _ => malformed(warnings, "unparsable #BPM"),
        },
        "lntype" => match value.parse() {
            Ok(ln_type @ (1 | 2)) => meta.ln_type = ln_type,
            _ => malformed(warnings, "unsupported #LNTYPE"),
        },
        "lnobj" => match parse_base36(value) {
            Some(id) if value.len() == 2 => meta.ln_obj = Some(id as u16),
            _ => malformed(warnings, "unparsable #LNOBJ"),
        },
        "music" => meta.music = Some(value.to_owned()),
        "preview" => meta.preview_music = Some(value.to_owned()),
        "offset" => match value.parse() {
            Ok(offset) => meta.start_offset_ms = offset,
            Err(_) => malformed(warnings, "unparsable #OFFSET"),
        },
        "stp" => {
            // `#STP mmm.fff zzzz`: a stop of zzzz milliseconds at the
            // fractional measure position.
            let mut parts = value.split_ascii_whitespace();
            match (
                parts.next().and_then(|p| p.parse::<f64>().ok()),
                parts.next().and_then(|p| p.parse::<f64>().ok()),
            ) {
                (Some(position), Some(msec)) if position >= 0.0 => {
                    chart.tempo.push(position, TempoPayload::Stop(msec));
                }
                _ => malformed(warnings, "unparsable #STP"),
            }
        }
        _ => {
            if let Some(rest) = name.strip_prefix("wav") {
                match (parse_base36(rest), rest.len()) {
                    (Some(id), 2) => {
                        meta.sound_channel.files.insert(id as u16, value.to_owned());
                    }
                    _ => malformed(warnings, "unparsable #WAV id"),
                }
            } else if let Some(rest) = name.strip_prefix("bmp") {
                match (parse_base36(rest), rest.len()) {
                    (Some(id), 2) => {
                        meta.bga_channel.headers.insert(
                            id as u16,
                            BgaHeader {
                                file: value.to_owned(),
                                ..BgaHeader::default()
                            },
                        );
                    }
                    _ => malformed(warnings, "unparsable #BMP id"),
                }
            } else if let Some(rest) = name.strip_prefix("exbpm").or_else(|| name.strip_prefix("bpm")) {
                match (parse_base36(rest), rest.len(), value.parse::<f64>()) {
                    (Some(id), 2, Ok(bpm)) => {
                        meta.bpm_channel.bpm.insert(id as u16, bpm);
                    }
                    _ => malformed(warnings, "unparsable BPM definition"),
                }
            } else if let Some(rest) = name.strip_prefix("stop") {
                match (parse_base36(rest), rest.len(), value.parse::<f64>()) {
                    (Some(id), 2, Ok(ticks)) => {
                        meta.stop_channel.ticks.insert(id as u16, ticks);
                    }
                    _ => malformed(warnings, "unparsable #STOP definition"),
                }
            } else {
                // Round-trip everything else through the attribute map.
                meta.set_attr(name, value);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelKind {
    Bgm { column: u32 },
    Bpm,
    BmsBpm,
    BmsStop,
    Bga(BgaLayer),
    Visible { player: u8, lane: usize },
    Invisible { player: u8, lane: usize },
    Long { player: u8, lane: usize },
    Mine { player: u8, lane: usize },
}

#[derive(Debug, Clone)]
struct RawObject {
    measure: u32,
    num: u32,
    deno: u32,
    kind: ChannelKind,
    value: u32,
    value_prev: u32,
    line: usize,
}

impl RawObject {
    fn fraction(&self) -> f64 {
        RowPos::new(self.num, self.deno).fraction()
    }

    fn row(&self) -> RowPos {
        RowPos::new(self.num, self.deno)
    }
}

#[derive(Default)]
struct ObjectCollector {
    bgm_columns: HashMap<u32, u32>,
    value_prev: HashMap<String, u32>,
}

impl ObjectCollector {
    fn collect(
        &mut self,
        line: &SourceLine<'_>,
        objects: &mut Vec<RawObject>,
        measure_lengths: &mut BTreeMap<u32, f64>,
        chart: &mut Chart,
        warnings: &mut Vec<LoadWarning>,
    ) {
        let text = line.text;
        let Ok(measure) = text[1..4].parse::<u32>() else {
            warnings.push(LoadWarning::MalformedLine {
                line: line.number,
                reason: "unparsable measure number".into(),
            });
            return;
        };
        let channel = text[4..6].to_ascii_uppercase();
        let payload = text[7..].trim();

        if channel == "02" {
            match payload.parse::<f64>() {
                Ok(length) => {
                    measure_lengths.insert(measure, length);
                }
                Err(_) => warnings.push(LoadWarning::MalformedLine {
                    line: line.number,
                    reason: "unparsable measure length".into(),
                }),
            }
            return;
        }

        let Some(kind) = classify_channel(&channel, &mut self.bgm_columns, measure) else {
            warnings.push(LoadWarning::UnknownChannel {
                line: line.number,
                channel: channel.clone(),
            });
            let element = NoteElement::at_row(
                measure,
                RowPos::new(0, 1),
                NotePayload::Event(EventPayload::Text(format!("{channel}:{payload}"))),
            );
            chart.events.push(EventKind::BmsText, element);
            return;
        };

        if payload.len() % 2 != 0 {
            warnings.push(LoadWarning::MalformedLine {
                line: line.number,
                reason: "odd object payload length".into(),
            });
        }
        let pairs = payload.len() / 2;
        if pairs == 0 {
            return;
        }
        let bytes = payload.as_bytes();
        for i in 0..pairs {
            let (hi, lo) = (bytes[i * 2], bytes[i * 2 + 1]);
            let value = if matches!(kind, ChannelKind::Bpm) {
                parse_base16_pair(hi, lo)
            } else {
                base36_digit(hi).and_then(|h| base36_digit(lo).map(|l| h * 36 + l))
            };
            let Some(value) = value else {
                warnings.push(LoadWarning::MalformedLine {
                    line: line.number,
                    reason: "object value out of radix".into(),
                });
                continue;
            };
            let value_prev = self
                .value_prev
                .insert(channel.clone(), value)
                .unwrap_or(0);
            // Rests only matter as longnote terminators.
            if value == 0 && !matches!(kind, ChannelKind::Long { .. }) {
                continue;
            }
            objects.push(RawObject {
                measure,
                num: i as u32,
                deno: pairs as u32,
                kind,
                value,
                value_prev,
                line: line.number,
            });
        }
    }
}

fn classify_channel(
    channel: &str,
    bgm_columns: &mut HashMap<u32, u32>,
    measure: u32,
) -> Option<ChannelKind> {
    let bytes = channel.as_bytes();
    let (head, tail) = (bytes[0], bytes[1]);
    match channel {
        "01" => {
            let column = bgm_columns.entry(measure).or_insert(0);
            let kind = ChannelKind::Bgm { column: *column };
            *column += 1;
            return Some(kind);
        }
        "03" => return Some(ChannelKind::Bpm),
        "08" => return Some(ChannelKind::BmsBpm),
        "09" => return Some(ChannelKind::BmsStop),
        "04" => return Some(ChannelKind::Bga(BgaLayer::Main)),
        "06" => return Some(ChannelKind::Bga(BgaLayer::Miss)),
        "07" => return Some(ChannelKind::Bga(BgaLayer::Layer1)),
        "0A" => return Some(ChannelKind::Bga(BgaLayer::Layer2)),
        _ => {}
    }
    if !(b'1'..=b'9').contains(&tail) {
        return None;
    }
    let lane = usize::from(tail - b'1');
    match head {
        b'1' => Some(ChannelKind::Visible { player: 0, lane }),
        b'2' => Some(ChannelKind::Visible { player: 1, lane }),
        b'3' => Some(ChannelKind::Invisible { player: 0, lane }),
        b'4' => Some(ChannelKind::Invisible { player: 1, lane }),
        b'5' => Some(ChannelKind::Long { player: 0, lane }),
        b'6' => Some(ChannelKind::Long { player: 1, lane }),
        b'D' => Some(ChannelKind::Mine { player: 0, lane }),
        b'E' => Some(ChannelKind::Mine { player: 1, lane }),
        _ => None,
    }
}

fn place_objects(objects: &[RawObject], chart: &mut Chart, warnings: &mut Vec<LoadWarning>) {
    // Per-lane open state for #LNTYPE 1 pairing.
    let mut ln_open: HashMap<usize, bool> = HashMap::new();

    for obj in objects {
        let row = obj.row();
        match obj.kind {
            ChannelKind::Bgm { column } => {
                chart
                    .bgm
                    .push(column as usize, obj.measure, row, obj.value);
            }
            ChannelKind::Bpm => {
                chart
                    .tempo
                    .push_at_row(obj.measure, row, TempoPayload::Bpm(f64::from(obj.value)));
            }
            ChannelKind::BmsBpm => {
                chart
                    .tempo
                    .push_at_row(obj.measure, row, TempoPayload::BmsBpm(obj.value));
            }
            ChannelKind::BmsStop => {
                chart
                    .tempo
                    .push_at_row(obj.measure, row, TempoPayload::BmsStop(obj.value));
            }
            ChannelKind::Bga(layer) => {
                chart.bga.push(layer, obj.measure, row, obj.value);
            }
            ChannelKind::Visible { player, lane } => {
                let track = NoteData::lane_index(player, lane);
                if chart.metadata.ln_obj == Some(obj.value as u16) {
                    convert_lnobj(chart, track, obj, warnings);
                } else {
                    chart.notes.push_tap(
                        track,
                        tap_element(obj.measure, row, TapKind::Normal, player, obj.value, true),
                    );
                }
            }
            ChannelKind::Invisible { player, lane } => {
                let track = NoteData::lane_index(player, lane);
                chart.notes.push_tap(
                    track,
                    tap_element(obj.measure, row, TapKind::Invisible, player, obj.value, false),
                );
            }
            ChannelKind::Mine { player, lane } => {
                let track = NoteData::lane_index(player, lane);
                chart.notes.push_tap(
                    track,
                    tap_element(obj.measure, row, TapKind::Mine, player, obj.value, false),
                );
            }
            ChannelKind::Long { player, lane } => {
                let track = NoteData::lane_index(player, lane);
                if chart.metadata.ln_type == 2 {
                    place_lntype2(chart, track, player, obj);
                } else {
                    if obj.value == 0 {
                        continue;
                    }
                    let open = ln_open.entry(track).or_insert(false);
                    let (status, scoreable) = if *open {
                        (ChainStatus::End, false)
                    } else {
                        (ChainStatus::Start, true)
                    };
                    *open = !*open;
                    let mut element =
                        tap_element(obj.measure, obj.row(), TapKind::Normal, player, obj.value, scoreable);
                    element.set_chain(status);
                    chart.notes.push_tap(track, element);
                }
            }
        }
    }
}

fn place_lntype2(chart: &mut Chart, track: usize, player: u8, obj: &RawObject) {
    let starting = obj.value != 0 && obj.value_prev == 0;
    let ending = obj.value == 0 && obj.value_prev != 0;
    if starting {
        let mut element =
            tap_element(obj.measure, obj.row(), TapKind::Normal, player, obj.value, true);
        element.set_chain(ChainStatus::Start);
        chart.notes.push_tap(track, element);
    } else if ending {
        // The first rest after a run closes the hold at its own position,
        // keeping the last sounded value.
        let mut element = tap_element(
            obj.measure,
            obj.row(),
            TapKind::Normal,
            player,
            obj.value_prev,
            false,
        );
        element.set_chain(ChainStatus::End);
        chart.notes.push_tap(track, element);
    }
    // Values inside a run only extend it.
}

fn convert_lnobj(
    chart: &mut Chart,
    track: usize,
    obj: &RawObject,
    warnings: &mut Vec<LoadWarning>,
) {
    let position = f64::from(obj.measure) + obj.fraction();
    let Some(previous) = chart
        .notes
        .tracks_mut()
        .track_mut(track)
        .and_then(|t| t.last_before_mut(position))
    else {
        warnings.push(LoadWarning::DanglingLnObj { line: obj.line });
        return;
    };
    previous.set_chain(ChainStatus::Start);
    let player = previous.as_tap().map_or(0, |t| t.player);
    let mut end = tap_element(obj.measure, obj.row(), TapKind::Normal, player, obj.value, false);
    end.set_chain(ChainStatus::End);
    chart.notes.push_tap(track, end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_pairs() {
        assert_eq!(parse_base36("01"), Some(1));
        assert_eq!(parse_base36("ZZ"), Some(35 * 36 + 35));
        assert_eq!(parse_base36("zz"), Some(35 * 36 + 35));
        assert_eq!(parse_base36("0-"), None);
        assert_eq!(parse_base16_pair(b'F', b'0'), Some(240));
    }

    #[test]
    fn object_line_detection() {
        assert!(is_object_line("#00111:0011"));
        assert!(is_object_line("#0030A:AA"));
        assert!(!is_object_line("#TITLE x"));
        assert!(!is_object_line("#WAV01 a.wav"));
        assert!(!is_object_line("#00111 0011"));
    }
}
