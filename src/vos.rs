//! The VOS (v2/v3) binary chart loader.
//!
//! A VOS file carries key/timing records plus an embedded standard MIDI
//! file starting at `MThd`; all tempo information lives in the MIDI
//! stream, so the loader builds the timing track from MIDI tempo meta
//! events first and then places the note records, which are timed in
//! milliseconds, through the resulting timeline.

use thiserror::Error;

use crate::chart::Chart;
use crate::chart::metadata::MidiProgramChange;
use crate::chart::note::{ChainStatus, SoundKind, SoundProperty, TapKind, TempoPayload};
use crate::chart::tracks::{NoteData, tap_element};

/// A structural failure while reading a VOS container.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum VosError {
    /// The bytes ended before the structure did.
    #[error("source truncated inside the VOS structure")]
    Truncated,
    /// The version tag is neither 2 nor 3.
    #[error("unsupported VOS version {0}")]
    UnsupportedVersion(u32),
    /// No embedded MIDI stream was found.
    #[error("embedded MIDI stream missing its MThd signature")]
    MidiSignatureMissing,
}

type Result<T> = core::result::Result<T, VosError>;

/// Result of a VOS load.
#[derive(Debug, Clone, PartialEq)]
pub struct VosOutput {
    /// The loaded, invalidated chart.
    pub chart: Chart,
}

/// One decoded note record, timed in milliseconds.
#[derive(Debug, Clone, Copy)]
struct VosNote {
    time_ms: u32,
    duration_ms: u32,
    channel: usize,
    pitch: u8,
    volume: u8,
    playable: bool,
    long: bool,
}

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(VosError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(VosError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn peek(&self, len: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos + len)
    }
}

fn frame_text(bytes: &[u8]) -> String {
    let (text, _) = crate::encoding::decode(bytes);
    text.trim_end_matches('\0').trim().to_owned()
}

/// Loads a VOS chart from raw bytes.
pub fn load(bytes: &[u8]) -> Result<VosOutput> {
    let mut cursor = ByteCursor::new(bytes);
    let version = cursor.read_u32_le()?;
    let notes = match version {
        2 => read_v2(&mut cursor)?,
        3 => read_v3(&mut cursor)?,
        other => return Err(VosError::UnsupportedVersion(other)),
    };

    let mut chart = notes.chart;
    chart.set_source_hash(bytes);

    let midi_start = bytes
        .windows(4)
        .position(|w| w == b"MThd")
        .ok_or(VosError::MidiSignatureMissing)?;
    read_midi_timing(&bytes[midi_start..], &mut chart)?;

    chart.timing.set_measure_length_recover(false);
    chart.invalidate();
    place_notes(&mut chart, &notes.notes);
    chart.invalidate();
    Ok(VosOutput { chart })
}

struct RawVos {
    chart: Chart,
    notes: Vec<VosNote>,
}

fn read_v2(cursor: &mut ByteCursor<'_>) -> Result<RawVos> {
    let mut chart = Chart::new();
    let filename_len = cursor.read_u32_le()? as usize;
    cursor.skip(filename_len)?;
    let _blob_len = cursor.read_u32_le()?;

    // Up to five variable frames, terminated by a zero length frame:
    // title, artist, co-artist, genre, extra.
    for slot in 0..5 {
        let len = cursor.read_u16_le()? as usize;
        if len == 0 {
            break;
        }
        let text = frame_text(cursor.take(len)?);
        let meta = &mut chart.metadata;
        match slot {
            0 => meta.title = Some(text),
            1 => meta.artist = Some(text),
            2 => meta.subartist = Some(text),
            3 => meta.genre = Some(text),
            _ => {}
        }
    }

    cursor.skip(26)?;
    // Older containers are four bytes shorter past this point.
    if cursor.peek(6) == Some(b"VOS009".as_slice()) {
        cursor.skip(1013)?;
    } else {
        cursor.skip(1017)?;
    }

    let instrument_count = cursor.read_u32_le()? as usize;
    let chart_count = cursor.read_u32_le()? as usize;
    for _ in 0..instrument_count.min(64) {
        cursor.skip(1)?;
        let _midi_channel = cursor.read_u32_le()?;
    }
    for _ in 0..chart_count.min(16) {
        let _playmode = cursor.read_u8()?;
        let level = cursor.read_u8()?;
        chart.metadata.level = u32::from(level) + 1;
        let title_len = cursor.read_u16_le()? as usize;
        let text = frame_text(cursor.take(title_len)?);
        chart.metadata.chart_name = Some(text);
        cursor.skip(4)?;
    }

    // Note records per channel; 15 bytes each.
    let mut notes = Vec::new();
    for channel in 0..7usize {
        let count = cursor.read_u32_le()? as usize;
        for _ in 0..count {
            let time_ms = cursor.read_u32_le()?;
            let pitch = cursor.read_u8()?;
            let _source = cursor.read_u8()?;
            let volume = cursor.read_u8()?;
            let playable = cursor.read_u8()? != 0;
            let _soundable = cursor.read_u8()?;
            let long = cursor.read_u8()? != 0;
            let duration_ms = cursor.read_u32_le()?;
            let _flag = cursor.read_u8()?;
            notes.push(VosNote {
                time_ms,
                duration_ms,
                channel,
                pitch,
                volume,
                playable,
                long,
            });
        }
    }

    Ok(RawVos { chart, notes })
}

fn read_v3(cursor: &mut ByteCursor<'_>) -> Result<RawVos> {
    let mut chart = Chart::new();
    let _header_size = cursor.read_u32_le()?;
    cursor.skip(4)?;
    cursor.skip(12)?;
    let _inf_end = cursor.read_u32_le()?;
    cursor.skip(4)?;
    cursor.skip(12)?;
    let _mid_pos = cursor.read_u32_le()?;
    cursor.skip(4)?;
    cursor.skip(12)?;

    // Four variable frames: title, artist, chart maker, genre.
    for slot in 0..4 {
        let len = cursor.read_u32_le()? as usize;
        if len > 4096 {
            return Err(VosError::Truncated);
        }
        let text = frame_text(cursor.take(len)?);
        let meta = &mut chart.metadata;
        match slot {
            0 => meta.title = Some(text),
            1 => meta.artist = Some(text),
            2 => meta.chart_maker = Some(text),
            _ => meta.genre = Some(text),
        }
    }

    let _genre_id = cursor.read_u8()?;
    cursor.skip(1)?;
    let _song_length = cursor.read_u32_le()?;
    let level = cursor.read_u8()?;
    chart.metadata.level = u32::from(level) + 1;
    cursor.skip(4)?;
    cursor.skip(1)?;
    cursor.skip(1018)?;

    // Note blocks per instrument; 14 bytes per record.
    let mut notes = Vec::new();
    loop {
        let _midi_instrument = cursor.read_u32_le()?;
        let count = cursor.read_u16_le()? as usize;
        cursor.skip(2)?;
        if count == 0 {
            break;
        }
        cursor.skip(16)?;
        for _ in 0..count {
            let time_ms = cursor.read_u32_le()?;
            let duration_ms = u32::from(cursor.read_u16_le()?);
            cursor.skip(2)?;
            let _track = cursor.read_u8()?;
            let pitch = cursor.read_u8()?;
            let volume = cursor.read_u8()?;
            let channel = cursor.read_u8()?;
            cursor.skip(2)?;
            notes.push(VosNote {
                time_ms,
                duration_ms,
                channel: usize::from(channel.min(6)),
                pitch,
                volume,
                playable: channel < 7,
                long: duration_ms > 0,
            });
        }
    }

    Ok(RawVos { chart, notes })
}

fn read_varlen(cursor: &mut ByteCursor<'_>) -> Result<u32> {
    let mut value: u32 = 0;
    for _ in 0..4 {
        let byte = cursor.read_u8()?;
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Ok(value)
}

/// Walks the embedded SMF stream and turns tempo meta events into BPM
/// timing notes. Program changes are recorded into the sound channel.
fn read_midi_timing(data: &[u8], chart: &mut Chart) -> Result<()> {
    let mut cursor = ByteCursor::new(data);
    if cursor.take(4)? != b"MThd" {
        return Err(VosError::MidiSignatureMissing);
    }
    let header_len = {
        let b = cursor.take(4)?;
        u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
    };
    let header = cursor.take(header_len)?;
    if header.len() < 6 {
        return Err(VosError::Truncated);
    }
    let track_count = u16::from_be_bytes([header[2], header[3]]);
    let division = u16::from_be_bytes([header[4], header[5]]);
    // SMPTE divisions do not appear in VOS files; fall back to the common
    // resolution if one shows up anyway.
    let ticks_per_beat = if division & 0x8000 != 0 || division == 0 {
        480.0
    } else {
        f64::from(division)
    };

    let mut first_bpm: Option<f64> = None;
    for _ in 0..track_count {
        let Some(sig) = cursor.peek(4) else {
            break;
        };
        if sig != b"MTrk" {
            break;
        }
        cursor.skip(4)?;
        let track_len = {
            let b = cursor.take(4)?;
            u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
        };
        let mut track = ByteCursor::new(cursor.take(track_len)?);
        let mut tick: u64 = 0;
        let mut running_status: u8 = 0;
        while track.pos < track.data.len() {
            tick += u64::from(read_varlen(&mut track)?);
            let mut status = track.read_u8()?;
            if status < 0x80 {
                // Running status: re-use the previous status byte.
                track.pos -= 1;
                status = running_status;
            } else {
                running_status = status;
            }
            match status {
                0xFF => {
                    let kind = track.read_u8()?;
                    let len = read_varlen(&mut track)? as usize;
                    let body = track.take(len)?;
                    if kind == 0x51 && body.len() == 3 {
                        let usec_per_beat = u32::from_be_bytes([0, body[0], body[1], body[2]]);
                        if usec_per_beat > 0 {
                            let bpm = 60_000_000.0 / f64::from(usec_per_beat);
                            let beat = tick as f64 / ticks_per_beat;
                            if first_bpm.is_none() {
                                first_bpm = Some(bpm);
                                chart.metadata.bpm = bpm;
                            }
                            chart
                                .tempo
                                .push(beat / 4.0, TempoPayload::Bpm(bpm));
                        }
                    } else if kind == 0x2F {
                        break;
                    }
                }
                0xF0 | 0xF7 => {
                    let len = read_varlen(&mut track)? as usize;
                    track.skip(len)?;
                }
                status if status & 0xF0 == 0xC0 => {
                    let program = track.read_u8()?;
                    chart.metadata.sound_channel.programs.push(MidiProgramChange {
                        command: i32::from(status),
                        value: i32::from(program),
                        position: tick,
                    });
                }
                status if status & 0xF0 == 0xD0 => {
                    track.skip(1)?;
                }
                _ => {
                    track.skip(2)?;
                }
            }
        }
    }
    Ok(())
}

fn place_notes(chart: &mut Chart, notes: &[VosNote]) {
    let mut bgm_column = 0usize;
    for note in notes {
        let sound = SoundProperty {
            kind: SoundKind::Midi,
            length: f64::from(note.duration_ms),
            key: i32::from(note.pitch),
            volume: f32::from(note.volume) / 127.0,
        };
        let start_measure = chart.timing.measure_from_time(f64::from(note.time_ms));
        if note.playable {
            let track = NoteData::lane_index(0, note.channel);
            if note.long {
                let end_measure = chart
                    .timing
                    .measure_from_time(f64::from(note.time_ms + note.duration_ms));
                let mut head = tap_element(0, Default::default(), TapKind::Normal, 0, 0, true);
                head.set_measure(start_measure);
                head.set_chain(ChainStatus::Start);
                if let crate::chart::note::NotePayload::Tap(tap) = head.payload_mut() {
                    tap.sound = sound;
                }
                chart.notes.push_tap(track, head);
                let mut tail = tap_element(0, Default::default(), TapKind::Normal, 0, 0, false);
                tail.set_measure(end_measure.max(start_measure));
                tail.set_chain(ChainStatus::End);
                chart.notes.push_tap(track, tail);
            } else {
                let mut element = tap_element(0, Default::default(), TapKind::Normal, 0, 0, true);
                element.set_measure(start_measure);
                if let crate::chart::note::NotePayload::Tap(tap) = element.payload_mut() {
                    tap.sound = sound;
                }
                chart.notes.push_tap(track, element);
            }
        } else {
            let measure_idx = start_measure.floor().max(0.0) as u32;
            let frac = start_measure - f64::from(measure_idx);
            let row = crate::chart::note::RowPos::new((frac * 192.0).round() as u32, 192);
            chart
                .bgm
                .push(bgm_column % 16, measure_idx, row, u32::from(note.pitch));
            bgm_column += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_version() {
        let bytes = 9u32.to_le_bytes();
        assert_eq!(load(&bytes), Err(VosError::UnsupportedVersion(9)));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let bytes = [2u8, 0, 0, 0, 0xFF];
        assert_eq!(load(&bytes), Err(VosError::Truncated));
    }

    #[test]
    fn varlen_decoding() {
        let data = [0x81, 0x48];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(read_varlen(&mut cursor), Ok(0xC8));
    }

    #[test]
    fn midi_tempo_becomes_timing() {
        // Minimal V3 shell is cumbersome; drive the MIDI walker directly.
        let mut chart = Chart::new();
        let mut midi: Vec<u8> = Vec::new();
        midi.extend_from_slice(b"MThd");
        midi.extend_from_slice(&6u32.to_be_bytes());
        midi.extend_from_slice(&1u16.to_be_bytes()); // format
        midi.extend_from_slice(&1u16.to_be_bytes()); // tracks
        midi.extend_from_slice(&480u16.to_be_bytes()); // division
        let track: Vec<u8> = vec![
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000 us = 120 BPM
            0x00, 0xFF, 0x2F, 0x00, // end of track
        ];
        midi.extend_from_slice(b"MTrk");
        midi.extend_from_slice(&(track.len() as u32).to_be_bytes());
        midi.extend_from_slice(&track);

        read_midi_timing(&midi, &mut chart).unwrap();
        assert!((chart.metadata.bpm - 120.0).abs() < 1e-9);
        assert!(!chart.tempo.is_empty());
    }
}
