//! Writing a chart and loading it back.

use chart_rs::prelude::*;
use pretty_assertions::assert_eq;

fn reload(chart: &Chart) -> Chart {
    let text = write_chart(chart);
    let output = load_str(&text, &LoadOptions::with_seed(1));
    assert!(output.warnings.is_empty(), "{:?}\n{text}", output.warnings);
    output.chart
}

fn note_shape(chart: &Chart) -> Vec<(usize, f64, ChainStatus, u32)> {
    chart
        .notes
        .all_iter()
        .map(|(lane, e)| {
            let sound = e.as_tap().map_or(0, |t| t.sound_id);
            (lane, e.measure(), e.chain(), sound)
        })
        .collect()
}

#[test]
fn metadata_survives_a_round_trip() {
    const SRC: &str = "
#PLAYER 1
#TITLE roundtrip
#ARTIST tester
#GENRE test
#BPM 162.5
#PLAYLEVEL 9
#DIFFICULTY 3
#RANK 2
#TOTAL 250
#WAV01 kick.wav
#WAV02 snare.wav
#BMP01 bga.mpg
#BPM01 81.25
#STOP01 48
";
    let source = load_str(SRC, &LoadOptions::with_seed(1)).chart;
    let reloaded = reload(&source);
    let (a, b) = (&source.metadata, &reloaded.metadata);
    assert_eq!(a.title, b.title);
    assert_eq!(a.artist, b.artist);
    assert_eq!(a.genre, b.genre);
    assert_eq!(a.bpm, b.bpm);
    assert_eq!(a.level, b.level);
    assert_eq!(a.difficulty, b.difficulty);
    assert_eq!(a.judge_rank, b.judge_rank);
    assert_eq!(a.gauge_total, b.gauge_total);
    assert_eq!(a.sound_channel.files, b.sound_channel.files);
    assert_eq!(a.bga_channel.headers, b.bga_channel.headers);
    assert_eq!(a.bpm_channel.bpm, b.bpm_channel.bpm);
    assert_eq!(a.stop_channel.ticks, b.stop_channel.ticks);
}

#[test]
fn notes_and_longnotes_survive_a_round_trip() {
    const SRC: &str = "
#BPM 140
#LNTYPE 1
#WAV01 a.wav
#WAV02 b.wav
#00111:01000200
#00113:000002
#00155:01000001
#00216:0102
#001D3:02
";
    let source = load_str(SRC, &LoadOptions::with_seed(1)).chart;
    let reloaded = reload(&source);
    assert_eq!(note_shape(&source), note_shape(&reloaded));
    assert_eq!(source.score_note_count(), reloaded.score_note_count());
    assert_eq!(source.has_long_note(), reloaded.has_long_note());
}

#[test]
fn timing_track_survives_a_round_trip() {
    const SRC: &str = "
#BPM 130
#BPM01 260.5
#STOP01 96
#00302:0.5
#00103:B4
#00108:01
#00209:01
#STP 004.500 1200
";
    let source = load_str(SRC, &LoadOptions::with_seed(1)).chart;
    let reloaded = reload(&source);
    for beat in [0.0, 2.0, 4.0, 7.9, 8.0, 8.1, 12.0, 13.9, 14.0, 18.5, 30.0] {
        let a = source.timing.time_from_beat(beat);
        let b = reloaded.timing.time_from_beat(beat);
        assert!((a - b).abs() < 1e-6, "beat {beat}: {a} vs {b}");
    }
    assert_eq!(source.timing.bar_length(3), reloaded.timing.bar_length(3));
    assert_eq!(source.timing.max_bpm(), reloaded.timing.max_bpm());
}

#[test]
fn bgm_columns_survive_a_round_trip() {
    const SRC: &str = "
#BPM 120
#WAV01 a.wav
#WAV02 b.wav
#00101:0102
#00101:0200
";
    let source = load_str(SRC, &LoadOptions::with_seed(1)).chart;
    let reloaded = reload(&source);
    let shape = |chart: &Chart| -> Vec<(usize, f64, u32)> {
        chart
            .bgm
            .all_iter()
            .map(|(col, e)| {
                let id = match e.payload() {
                    NotePayload::Bgm(b) => b.sound_id,
                    _ => 0,
                };
                (col, e.measure(), id)
            })
            .collect()
    };
    assert_eq!(shape(&source), shape(&reloaded));
}

#[test]
fn fractional_direct_bpm_routes_through_a_definition() {
    let mut chart = Chart::new();
    chart.metadata.bpm = 120.0;
    chart.tempo.push(2.0, TempoPayload::Bpm(87.3));
    chart.invalidate();
    let text = write_chart(&chart);
    assert!(text.contains("#BPM01 87.3"));
    let reloaded = load_str(&text, &LoadOptions::with_seed(1)).chart;
    assert_eq!(reloaded.timing.min_bpm(), 87.3);
}
