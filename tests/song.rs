//! Song-level container behavior.

use std::fs;

use chart_rs::prelude::*;

const SRC: &str = "#TITLE folder song
#ARTIST tester
#BPM 150
#WAV01 a.wav
#00111:01010101
";

#[test]
fn open_folder_loads_every_chart() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("normal.bms"), SRC).unwrap();
    fs::write(dir.path().join("another.bme"), SRC.replace("150", "200")).unwrap();
    fs::write(dir.path().join("readme.txt"), "not a chart").unwrap();

    let song = Song::open(dir.path(), &LoadOptions::with_seed(1)).unwrap();
    assert_eq!(song.song_type(), SongType::Bms);
    assert_eq!(song.charts().len(), 2);
    let mut bpms: Vec<f64> = song.charts().iter().map(|c| c.metadata.bpm).collect();
    bpms.sort_by(f64::total_cmp);
    assert_eq!(bpms, vec![150.0, 200.0]);
    assert!(song.charts().iter().all(|c| c.filename().is_some()));
}

#[test]
fn open_single_file_loads_only_that_chart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solo.bms");
    fs::write(&path, SRC).unwrap();
    fs::write(dir.path().join("other.bms"), SRC).unwrap();

    let song = Song::open(&path, &LoadOptions::with_seed(1)).unwrap();
    assert_eq!(song.charts().len(), 1);
    assert_eq!(song.charts()[0].filename(), Some("solo.bms"));
    assert_eq!(song.charts()[0].score_note_count(), 4);
}

#[test]
fn open_unrecognized_folder_fails() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("readme.txt"), "nothing here").unwrap();
    let result = Song::open(dir.path(), &LoadOptions::with_seed(1));
    assert!(matches!(result, Err(SongError::Unrecognized(_))));
}

#[test]
fn save_writes_charts_back_into_the_folder() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("chart.bms"), SRC).unwrap();

    let mut song = Song::open(dir.path(), &LoadOptions::with_seed(1)).unwrap();
    song.save().unwrap();

    let written = fs::read_to_string(dir.path().join("chart.bms")).unwrap();
    assert!(written.contains("#TITLE folder song"));

    let reopened = Song::open(dir.path(), &LoadOptions::with_seed(1)).unwrap();
    assert_eq!(reopened.charts()[0].score_note_count(), 4);
    assert_eq!(
        reopened.charts()[0].metadata.title.as_deref(),
        Some("folder song")
    );
}
