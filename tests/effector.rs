//! Effector passes over loaded charts.

use chart_rs::prelude::*;

const SEVEN_LANE_SRC: &str = "
#BPM 150
#WAV01 a.wav
#00111:01
#00112:0001
#00113:01
#00114:000001
#00115:01
#00116:0001
#00117:01
";

fn load_seven() -> Chart {
    let output = load_str(SEVEN_LANE_SRC, &LoadOptions::with_seed(1));
    assert!(output.warnings.is_empty());
    output.chart
}

fn lane_sequence(chart: &Chart) -> Vec<usize> {
    chart.notes.all_iter().map(|(lane, _)| lane).collect()
}

#[test]
fn mirror_twice_restores_original_lanes() {
    let param = EffectorParam::seven_keys();
    let mut chart = load_seven();
    let original = lane_sequence(&chart);
    effector::mirror(&mut chart, &param);
    assert_ne!(lane_sequence(&chart), original);
    effector::mirror(&mut chart, &param);
    assert_eq!(lane_sequence(&chart), original);
}

#[test]
fn random_keeps_the_note_multiset() {
    let mut param = EffectorParam::seven_keys();
    param.seed = 99;
    let mut chart = load_seven();
    let count = chart.score_note_count();
    let measures_before: Vec<f64> =
        chart.notes.all_iter().map(|(_, e)| e.measure()).collect();
    effector::random(&mut chart, &param);
    chart.invalidate();
    assert_eq!(chart.score_note_count(), count);
    let measures_after: Vec<f64> =
        chart.notes.all_iter().map(|(_, e)| e.measure()).collect();
    assert_eq!(measures_before, measures_after);
}

#[test]
fn flip_reverses_the_layout() {
    let param = EffectorParam::seven_keys();
    let mut chart = load_seven();
    let original = lane_sequence(&chart);
    effector::flip(&mut chart, &param);
    let flipped = lane_sequence(&chart);
    let expected: Vec<usize> = original.iter().map(|&l| 6 - l).collect();
    assert_eq!(flipped, expected);
}

#[test]
fn s_random_is_deterministic() {
    let mut param = EffectorParam::seven_keys();
    param.seed = 5;
    let mut a = load_seven();
    let mut b = load_seven();
    effector::s_random(&mut a, &param);
    effector::s_random(&mut b, &param);
    assert_eq!(lane_sequence(&a), lane_sequence(&b));
    assert_eq!(a.score_note_count(), 7);
}

#[test]
fn h_random_does_not_break_longnotes() {
    const SRC: &str = "
#BPM 150
#LNTYPE 1
#WAV01 a.wav
#00151:01
#00251:0001
#00112:00000001
#00213:01
";
    let mut param = EffectorParam::seven_keys();
    param.seed = 11;
    let output = load_str(SRC, &LoadOptions::with_seed(1));
    let mut chart = output.chart;
    let spans_before = chart.has_long_note();
    effector::h_random(&mut chart, &param);
    chart.invalidate();
    assert_eq!(chart.has_long_note(), spans_before);
    // Start/End pairing per lane must survive the shuffle.
    for track in chart.notes.tracks().tracks() {
        let mut open = false;
        for e in track.iter() {
            match e.chain() {
                ChainStatus::Start => {
                    assert!(!open, "nested longnote start");
                    open = true;
                }
                ChainStatus::End => {
                    assert!(open, "longnote end without start");
                    open = false;
                }
                _ => {}
            }
        }
        assert!(!open, "unterminated longnote");
    }
}

#[test]
fn r_random_rotates_within_note_lanes() {
    let mut param = EffectorParam::seven_keys();
    param.seed = 3;
    let mut chart = load_seven();
    effector::r_random(&mut chart, &param, false);
    let lanes = lane_sequence(&chart);
    assert_eq!(lanes.len(), 7);
    assert!(lanes.iter().all(|&l| l < 7));
    // A rotation is a bijection on occupied rows: no two notes of one
    // row may collide. Every source row held one note, so counts hold.
    assert_eq!(chart.score_note_count(), 7);
}

#[test]
fn all_sc_fills_free_scratch_rows() {
    const SRC: &str = "
#BPM 150
#WAV01 a.wav
#00111:01
#00212:01
";
    let param = EffectorParam::bms_single(0);
    let output = load_str(SRC, &LoadOptions::with_seed(1));
    let mut chart = output.chart;
    effector::all_sc(&mut chart, &param);
    let lanes = lane_sequence(&chart);
    assert_eq!(lanes, vec![7, 7]);
}
