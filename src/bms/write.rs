//! Serializes a chart back into BMS text.
//!
//! Writing runs in two phases: the metadata block, then the object lines.
//! Per measure and channel the payload resolution is the least common
//! multiple of the note row denominators, floored at 192 so editor rows
//! survive a round trip.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use num::Integer;

use crate::chart::Chart;
use crate::chart::note::{ChainStatus, NotePayload, RowPos, TapKind, TempoPayload};
use crate::chart::tracks::LANES_PER_PLAYER;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Hard cap of one line's resolution; beyond it positions are rounded.
const MAX_RESOLUTION: u32 = 3840;

fn id36(id: u32) -> String {
    let id = id.min(36 * 36 - 1);
    let hi = BASE36[(id / 36) as usize] as char;
    let lo = BASE36[(id % 36) as usize] as char;
    format!("{hi}{lo}")
}

fn id16(id: u32) -> String {
    format!("{:02X}", id.min(255))
}

fn fmt_num(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value}")
    }
}

#[derive(Debug)]
enum LinePayload {
    /// Value pairs at rational positions; `hex` switches the radix.
    Pairs { entries: Vec<(RowPos, u32)>, hex: bool },
    /// A literal payload, used for measure length lines.
    Literal(String),
}

#[derive(Debug, Default)]
struct ObjectLines {
    // (measure, channel, sub column) → payload
    lines: BTreeMap<(u32, String, u32), LinePayload>,
}

impl ObjectLines {
    fn pair(&mut self, measure: u32, channel: String, column: u32, row: RowPos, value: u32, hex: bool) {
        let payload = self
            .lines
            .entry((measure, channel, column))
            .or_insert_with(|| LinePayload::Pairs {
                entries: Vec::new(),
                hex,
            });
        if let LinePayload::Pairs { entries, .. } = payload {
            entries.push((row, value));
        }
    }

    fn literal(&mut self, measure: u32, channel: String, text: String) {
        self.lines
            .insert((measure, channel, 0), LinePayload::Literal(text));
    }

    fn render(&self, out: &mut String) {
        for ((measure, channel, _), payload) in &self.lines {
            match payload {
                LinePayload::Literal(text) => {
                    let _ = writeln!(out, "#{measure:03}{channel}:{text}");
                }
                LinePayload::Pairs { entries, hex } => {
                    let resolution = entries
                        .iter()
                        .fold(192u64, |acc, (row, _)| {
                            let folded = acc.lcm(&u64::from(row.deno));
                            folded.min(u64::from(MAX_RESOLUTION))
                        }) as u32;
                    let mut slots = vec![0u32; resolution as usize];
                    for (row, value) in entries {
                        let idx = ((row.fraction() * f64::from(resolution)).round() as usize)
                            .min(resolution as usize - 1);
                        slots[idx] = *value;
                    }
                    let mut payload = String::with_capacity(slots.len() * 2);
                    for value in slots {
                        payload.push_str(&if *hex { id16(value) } else { id36(value) });
                    }
                    let _ = writeln!(out, "#{measure:03}{channel}:{payload}");
                }
            }
        }
    }
}

/// `#BPMxx` definitions written out: the chart's own table plus entries
/// allocated for direct BPM changes outside the 1–255 integer range.
#[derive(Debug, Default)]
struct BpmDefs {
    defs: BTreeMap<u16, f64>,
}

impl BpmDefs {
    fn id_for(&mut self, bpm: f64) -> u32 {
        if let Some((&id, _)) = self.defs.iter().find(|&(_, &v)| v == bpm) {
            return u32::from(id);
        }
        let mut candidate = 1u16;
        while self.defs.contains_key(&candidate) {
            candidate += 1;
        }
        self.defs.insert(candidate, bpm);
        u32::from(candidate)
    }
}

/// Serializes `chart` as BMS text.
#[must_use]
pub fn write_chart(chart: &Chart) -> String {
    let meta = &chart.metadata;
    let mut out = String::new();

    let mut lines = ObjectLines::default();
    let mut stp_lines: Vec<String> = Vec::new();
    let mut bpm_defs = BpmDefs {
        defs: meta.bpm_channel.bpm.clone(),
    };
    collect_tempo(chart, &mut lines, &mut stp_lines, &mut bpm_defs);
    collect_bga(chart, &mut lines);
    collect_bgm(chart, &mut lines);
    collect_notes(chart, &mut lines);

    out.push_str("*---------------------- HEADER FIELD\n\n");
    let _ = writeln!(out, "#PLAYER {}", meta.player_count);
    for (command, value) in [
        ("#TITLE", &meta.title),
        ("#SUBTITLE", &meta.subtitle),
        ("#ARTIST", &meta.artist),
        ("#SUBARTIST", &meta.subartist),
        ("#GENRE", &meta.genre),
        ("#MAKER", &meta.chart_maker),
        ("#STAGEFILE", &meta.stage_image),
        ("#BANNER", &meta.banner_image),
        ("#BACKBMP", &meta.back_image),
        ("#PREVIEW", &meta.preview_music),
        ("#MUSIC", &meta.music),
    ] {
        if let Some(value) = value {
            let _ = writeln!(out, "{command} {value}");
        }
    }
    let _ = writeln!(out, "#BPM {}", fmt_num(meta.bpm));
    let _ = writeln!(out, "#PLAYLEVEL {}", meta.level);
    let _ = writeln!(out, "#DIFFICULTY {}", meta.difficulty);
    let _ = writeln!(out, "#RANK {}", (meta.judge_rank / 100.0 * 4.0).round() as i64);
    if meta.gauge_total > 0.0 {
        let _ = writeln!(out, "#TOTAL {}", fmt_num(meta.gauge_total));
    }
    let _ = writeln!(out, "#LNTYPE 1");
    if meta.start_offset_ms != 0.0 {
        let _ = writeln!(out, "#OFFSET {}", fmt_num(meta.start_offset_ms));
    }
    for (key, value) in &meta.attributes {
        let _ = writeln!(out, "#{} {}", key.to_ascii_uppercase(), value);
    }
    out.push('\n');

    for (&id, file) in &meta.sound_channel.files {
        let _ = writeln!(out, "#WAV{} {}", id36(u32::from(id)), file);
    }
    for (&id, header) in &meta.bga_channel.headers {
        let _ = writeln!(out, "#BMP{} {}", id36(u32::from(id)), header.file);
    }
    for (&id, bpm) in &bpm_defs.defs {
        let _ = writeln!(out, "#BPM{} {}", id36(u32::from(id)), fmt_num(*bpm));
    }
    for (&id, ticks) in &meta.stop_channel.ticks {
        let _ = writeln!(out, "#STOP{} {}", id36(u32::from(id)), fmt_num(*ticks));
    }

    for line in stp_lines {
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str("\n*---------------------- MAIN DATA FIELD\n\n");
    lines.render(&mut out);
    out
}

fn measure_of(e: &crate::chart::note::NoteElement) -> u32 {
    e.measure().floor().max(0.0) as u32
}

fn collect_tempo(
    chart: &Chart,
    lines: &mut ObjectLines,
    stp_lines: &mut Vec<String>,
    bpm_defs: &mut BpmDefs,
) {
    for (_, element) in chart.tempo.all_iter() {
        let measure = measure_of(element);
        let row = element.row();
        let Some(payload) = element.as_tempo() else {
            continue;
        };
        match *payload {
            TempoPayload::Measure(length) => {
                lines.literal(measure, "02".into(), fmt_num(length));
            }
            TempoPayload::Bpm(bpm) => {
                let integral = (bpm - bpm.round()).abs() < 1e-9;
                if integral && bpm > 0.0 && bpm <= 255.0 {
                    lines.pair(measure, "03".into(), 0, row, bpm.round() as u32, true);
                } else {
                    // Outside the direct hex range; route through a
                    // definition entry instead.
                    let id = bpm_defs.id_for(bpm);
                    lines.pair(measure, "08".into(), 0, row, id, false);
                }
            }
            TempoPayload::BmsBpm(id) => {
                lines.pair(measure, "08".into(), 0, row, id, false);
            }
            TempoPayload::BmsStop(id) => {
                lines.pair(measure, "09".into(), 0, row, id, false);
            }
            TempoPayload::Stop(msec) => {
                let position = element.measure().max(0.0);
                stp_lines.push(format!(
                    "#STP {:03}.{:03} {}",
                    position.floor() as u32,
                    ((position.fract() * 1000.0).round() as u32).min(999),
                    fmt_num(msec)
                ));
            }
            TempoPayload::Scroll(_) | TempoPayload::Warp(_) | TempoPayload::Tick(_) => {
                // No BMS notation for these; they come from other formats.
            }
        }
    }
}

fn collect_bga(chart: &Chart, lines: &mut ObjectLines) {
    for (track, element) in chart.bga.all_iter() {
        let channel = match track {
            0 => "04",
            1 => "06",
            2 => "07",
            _ => "0A",
        };
        if let NotePayload::Bga(bga) = element.payload() {
            lines.pair(
                measure_of(element),
                channel.into(),
                0,
                element.row(),
                bga.image_id,
                false,
            );
        }
    }
}

fn collect_bgm(chart: &Chart, lines: &mut ObjectLines) {
    for (column, element) in chart.bgm.all_iter() {
        if let NotePayload::Bgm(bgm) = element.payload() {
            lines.pair(
                measure_of(element),
                "01".into(),
                column as u32,
                element.row(),
                bgm.sound_id,
                false,
            );
        }
    }
}

fn collect_notes(chart: &Chart, lines: &mut ObjectLines) {
    for (track, element) in chart.notes.all_iter() {
        let Some(tap) = element.as_tap() else {
            continue;
        };
        let player = track / LANES_PER_PLAYER;
        let lane = track % LANES_PER_PLAYER;
        if lane >= 9 || player >= 2 {
            continue;
        }
        let digit = BASE36[lane + 1] as char;
        let head = match (tap.kind, element.chain()) {
            (TapKind::Normal, ChainStatus::Start | ChainStatus::Body | ChainStatus::End) => {
                if player == 0 { '5' } else { '6' }
            }
            (TapKind::Normal, ChainStatus::Tap) => {
                if player == 0 { '1' } else { '2' }
            }
            (TapKind::Invisible, _) => {
                if player == 0 { '3' } else { '4' }
            }
            (TapKind::Mine, _) => {
                if player == 0 { 'D' } else { 'E' }
            }
            _ => continue,
        };
        lines.pair(
            measure_of(element),
            format!("{head}{digit}"),
            0,
            element.row(),
            tap.sound_id,
            false,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_formatting() {
        assert_eq!(id36(0), "00");
        assert_eq!(id36(1), "01");
        assert_eq!(id36(35), "0Z");
        assert_eq!(id36(36), "10");
        assert_eq!(id16(240), "F0");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_num(130.0), "130");
        assert_eq!(fmt_num(0.5), "0.5");
    }
}
