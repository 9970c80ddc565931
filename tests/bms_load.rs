//! Loader behavior over whole BMS sources.

use chart_rs::prelude::*;
use pretty_assertions::assert_eq;

fn load_seeded(source: &str) -> LoadOutput {
    load_str(source, &LoadOptions::with_seed(1))
}

#[test]
fn header_pass_fills_metadata() {
    const SRC: &str = "
#PLAYER 1
#TITLE Lilium
#SUBTITLE -another-
#ARTIST someone
#SUBARTIST obj: someone else
#GENRE RAVE
#MAKER layouter
#BPM 185
#PLAYLEVEL 11
#DIFFICULTY 4
#RANK 2
#TOTAL 360.5
#STAGEFILE stage.png
#BANNER banner.png
#BACKBMP back.bmp
#PREVIEW preview.ogg
#WAV01 kick.wav
#WAVZZ snare.wav
#BMP02 miss.bmp
#BPM01 92.5
#STOP01 96
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings, vec![]);
    let meta = &output.chart.metadata;
    assert_eq!(meta.title.as_deref(), Some("Lilium"));
    assert_eq!(meta.subtitle.as_deref(), Some("-another-"));
    assert_eq!(meta.artist.as_deref(), Some("someone"));
    assert_eq!(meta.subartist.as_deref(), Some("obj: someone else"));
    assert_eq!(meta.genre.as_deref(), Some("RAVE"));
    assert_eq!(meta.chart_maker.as_deref(), Some("layouter"));
    assert_eq!(meta.bpm, 185.0);
    assert_eq!(meta.level, 11);
    assert_eq!(meta.difficulty, 4);
    assert_eq!(meta.judge_rank, 50.0);
    assert_eq!(meta.gauge_total, 360.5);
    assert_eq!(meta.stage_image.as_deref(), Some("stage.png"));
    assert_eq!(meta.banner_image.as_deref(), Some("banner.png"));
    assert_eq!(meta.back_image.as_deref(), Some("back.bmp"));
    assert_eq!(meta.preview_music.as_deref(), Some("preview.ogg"));
    assert_eq!(meta.sound_channel.files.get(&1).map(String::as_str), Some("kick.wav"));
    assert_eq!(
        meta.sound_channel.files.get(&(35 * 36 + 35)).map(String::as_str),
        Some("snare.wav")
    );
    assert_eq!(meta.bga_channel.headers.get(&2).map(|h| h.file.as_str()), Some("miss.bmp"));
    assert_eq!(meta.bpm_channel.get(1), Some(92.5));
    assert_eq!(meta.stop_channel.get(1), Some(96.0));
}

#[test]
fn objects_land_on_rational_positions() {
    const SRC: &str = "
#BPM 120
#WAV0A a.wav
#00111:0A000A00
#00213:000A
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings, vec![]);
    let positions: Vec<(f64, RowPos)> = output
        .chart
        .notes
        .all_iter()
        .map(|(_, e)| (e.measure(), e.row()))
        .collect();
    assert_eq!(
        positions,
        vec![
            (1.0, RowPos::new(0, 4)),
            (1.5, RowPos::new(2, 4)),
            (2.5, RowPos::new(1, 2)),
        ]
    );
}

#[test]
fn lnobj_converts_previous_note() {
    const SRC: &str = "
#BPM 120
#LNOBJ ZZ
#WAVAA a.wav
#00111:AA00ZZ00
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings, vec![]);
    let chart = &output.chart;
    assert_eq!(chart.score_note_count(), 1);
    assert!(chart.has_long_note());
    let notes: Vec<(f64, ChainStatus)> = chart
        .notes
        .all_iter()
        .map(|(_, e)| (e.measure(), e.chain()))
        .collect();
    assert_eq!(notes, vec![(1.0, ChainStatus::Start), (1.5, ChainStatus::End)]);
}

#[test]
fn dangling_lnobj_warns() {
    const SRC: &str = "
#BPM 120
#LNOBJ ZZ
#00111:ZZ
";
    let output = load_seeded(SRC);
    assert_eq!(
        output.warnings,
        vec![LoadWarning::DanglingLnObj { line: 4 }]
    );
    assert!(output.chart.is_empty());
}

#[test]
fn random_materializes_selected_branch() {
    const SRC: &str = "
#RANDOM 2
#IF 1
#00111:AA00
#ELSE
#00111:00BB
#ENDIF
#ENDRANDOM
";
    let one = load_str_if_branch(SRC, 1);
    assert_eq!(one, vec![(1.0, RowPos::new(0, 2), 370)]);
    let two = load_str_if_branch(SRC, 2);
    assert_eq!(two, vec![(1.5, RowPos::new(1, 2), 407)]);
}

fn load_str_if_branch(source: &str, value: u64) -> Vec<(f64, RowPos, u32)> {
    let output = chart_rs::bms::load_str_with_rng(
        source,
        &LoadOptions::default(),
        RngMock([value]),
    );
    output
        .chart
        .notes
        .all_iter()
        .map(|(_, e)| {
            let sound = e.as_tap().map_or(0, |t| t.sound_id);
            (e.measure(), e.row(), sound)
        })
        .collect()
}

#[test]
fn script_preserves_conditional_source() {
    const SRC: &str = "
#TITLE with script
#RANDOM 2
#IF 1
#00111:AA00
#ENDIF
#ENDRANDOM
";
    let output = load_seeded(SRC);
    let script = &output.chart.metadata.script;
    assert!(script.contains("#RANDOM 2"));
    assert!(script.contains("#IF 1"));
    assert!(script.contains("#00111:AA00"));
    assert!(script.contains("#ENDRANDOM"));
}

#[test]
fn preserve_mode_skips_branches_but_keeps_script() {
    const SRC: &str = "
#TITLE preserved
#RANDOM 2
#IF 1
#00111:AA00
#ELSE
#00111:BB00
#ENDIF
#ENDRANDOM
";
    let options = LoadOptions {
        process_conditionals: false,
        ..LoadOptions::with_seed(1)
    };
    let output = load_str(SRC, &options);
    assert!(output.chart.is_empty());
    assert_eq!(output.chart.metadata.title.as_deref(), Some("preserved"));
    // Re-evaluating the preserved script materializes one branch.
    let again = load_str(&output.chart.metadata.script, &LoadOptions::with_seed(7));
    assert_eq!(again.chart.score_note_count(), 1);
}

#[test]
fn lntype1_pairs_toggle() {
    const SRC: &str = "
#BPM 120
#LNTYPE 1
#WAV01 a.wav
#00151:01000100
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings, vec![]);
    let notes: Vec<(f64, ChainStatus)> = output
        .chart
        .notes
        .all_iter()
        .map(|(_, e)| (e.measure(), e.chain()))
        .collect();
    assert_eq!(notes, vec![(1.0, ChainStatus::Start), (1.5, ChainStatus::End)]);
    assert_eq!(output.chart.score_note_count(), 1);
}

#[test]
fn lntype2_run_ends_at_first_rest() {
    const SRC: &str = "
#BPM 120
#LNTYPE 2
#WAV01 a.wav
#00151:0101010000
";
    let output = load_seeded(SRC);
    let notes: Vec<(f64, ChainStatus, bool)> = output
        .chart
        .notes
        .all_iter()
        .map(|(_, e)| {
            (
                e.measure(),
                e.chain(),
                e.as_tap().is_some_and(|t| t.scoreable),
            )
        })
        .collect();
    assert_eq!(
        notes,
        vec![
            (1.0, ChainStatus::Start, true),
            (1.6, ChainStatus::End, false),
        ]
    );
}

#[test]
fn bgm_lines_become_columns() {
    const SRC: &str = "
#BPM 120
#WAV01 a.wav
#WAV02 b.wav
#00101:0102
#00101:0300
";
    let output = load_seeded(SRC);
    let bgm = &output.chart.bgm;
    let by_column: Vec<(usize, f64)> = bgm.all_iter().map(|(c, e)| (c, e.measure())).collect();
    assert_eq!(by_column, vec![(0, 1.0), (1, 1.0), (0, 1.5)]);
}

#[test]
fn unknown_channel_is_captured_as_text_event() {
    const SRC: &str = "
#BPM 120
#001XX:0101
";
    let output = load_seeded(SRC);
    assert_eq!(
        output.warnings,
        vec![LoadWarning::UnknownChannel {
            line: 3,
            channel: "XX".into(),
        }]
    );
    assert_eq!(output.chart.events.len(), 1);
}

#[test]
fn measure_length_becomes_timing_note() {
    const SRC: &str = "
#BPM 120
#00202:0.75
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings, vec![]);
    let timing = &output.chart.timing;
    assert_eq!(timing.bar_length(2), 0.75);
    assert_eq!(timing.bar_length(3), 1.0);
    let b2 = timing.beat_from_measure(2.0);
    let b3 = timing.beat_from_measure(3.0);
    assert_eq!(b3 - b2, 3.0);
}

#[test]
fn indirect_bpm_wins_over_direct_at_same_position() {
    const SRC: &str = "
#BPM 130
#BPM01 210
#00103:5A
#00108:01
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings, vec![]);
    let timing = &output.chart.timing;
    // The channel lookup lands after the direct change, so it wins.
    assert_eq!(timing.max_bpm(), 210.0);
    assert!(timing.segments().iter().all(|s| s.bpm != 90.0));
}

#[test]
fn stop_channel_ticks_convert_to_milliseconds() {
    const SRC: &str = "
#BPM 120
#STOP01 192
#00109:01
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings, vec![]);
    let timing = &output.chart.timing;
    // 192 ticks = 4 beats; at 120 BPM that is two seconds.
    let before = timing.time_from_beat(3.999);
    let after = timing.time_from_beat(4.0);
    assert!((after - before - 2000.0).abs() < 5.0);
}

#[test]
fn load_from_bytes_records_hash_and_encoding() {
    let source = b"#TITLE \x89\xD4\n#BPM 120\n#00111:0101\n";
    let output = load(source, &LoadOptions::with_seed(1));
    assert_eq!(output.chart.metadata.title.as_deref(), Some("花"));
    assert_eq!(output.chart.hash().map(str::len), Some(32));
    assert_eq!(output.chart.score_note_count(), 2);
}

#[test]
fn malformed_lines_are_dropped_not_fatal() {
    const SRC: &str = "
#BPM not-a-number
#PLAYER x
#00102:zzz
#00111:0A0
#00112:01
";
    let output = load_seeded(SRC);
    assert_eq!(output.warnings.len(), 4);
    // The valid trailing note still loads.
    assert_eq!(output.chart.score_note_count(), 2);
}
