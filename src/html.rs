//! Human-readable HTML dump of a chart.
//!
//! The dump is a nested `<div>` tree: a metadata block, the resource
//! channel tables, and one box per measure holding its objects with
//! `top`/`height` percentages relative to the measure span.

use crate::chart::Chart;
use crate::chart::note::{ChainStatus, NoteElement};

struct HtmlWriter {
    indent: usize,
    out: String,
}

impl HtmlWriter {
    fn new() -> Self {
        Self {
            indent: 0,
            out: String::new(),
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(text);
    }

    fn push(&mut self) {
        self.indent += 1;
    }

    fn pop(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn desc_line(w: &mut HtmlWriter, class: &str, label: &str, text: &str) {
    w.line(&format!(
        "<span class='desc {class}'><span class='label'>{label}</span><span class='text'>{}</span></span>",
        escape(text)
    ));
}

/// Renders `chart` as an HTML fragment. The chart should be invalidated.
#[must_use]
pub fn export_chart(chart: &Chart) -> String {
    let mut w = HtmlWriter::new();
    let meta = &chart.metadata;

    w.line(&format!(
        "<div id='chart-container' class='playlane-{}key'>",
        chart.play_lane_count()
    ));
    w.push();

    // Metadata block.
    w.line("<div id='metadata' class='content metadata'>");
    w.push();
    w.line("<span class='title'>Metadata Info</span>");
    desc_line(&mut w, "meta_title", "Title", meta.title.as_deref().unwrap_or(""));
    desc_line(&mut w, "meta_subtitle", "Subtitle", meta.subtitle.as_deref().unwrap_or(""));
    desc_line(&mut w, "meta_artist", "Artist", meta.artist.as_deref().unwrap_or(""));
    desc_line(&mut w, "meta_genre", "Genre", meta.genre.as_deref().unwrap_or(""));
    desc_line(&mut w, "meta_level", "Level", &meta.level.to_string());
    desc_line(&mut w, "meta_bpm", "BPM", &meta.bpm.to_string());
    desc_line(&mut w, "meta_total", "Gauge Total", &meta.gauge_total.to_string());
    desc_line(&mut w, "meta_diff", "Difficulty", &meta.difficulty.to_string());
    desc_line(
        &mut w,
        "meta_notecount",
        "Note Count",
        &chart.score_note_count().to_string(),
    );
    desc_line(&mut w, "meta_eventcount", "Event Count", &chart.events.len().to_string());
    desc_line(&mut w, "meta_maxbpm", "Max BPM", &chart.timing.max_bpm().to_string());
    desc_line(&mut w, "meta_minbpm", "Min BPM", &chart.timing.min_bpm().to_string());
    desc_line(
        &mut w,
        "meta_isbpmchange",
        "BPM Change?",
        if chart.timing.has_bpm_change() { "Yes" } else { "No" },
    );
    desc_line(
        &mut w,
        "meta_hasstop",
        "STOP?",
        if chart.timing.has_stop() { "Yes" } else { "No" },
    );
    desc_line(
        &mut w,
        "meta_haswarp",
        "WARP?",
        if chart.timing.has_warp() { "Yes" } else { "No" },
    );
    let last_ms = chart.song_last_object_time_ms().max(0.0) as u64;
    desc_line(
        &mut w,
        "meta_songlength",
        "Song Length",
        &format!(
            "{:02}:{:02}:{:02}",
            last_ms / 3_600_000,
            last_ms / 60_000 % 60,
            last_ms / 1000 % 60
        ),
    );
    if !meta.script.is_empty() {
        w.line(&format!(
            "<span class='desc meta_script'><span class='label'>Script</span><span class='text hide'>{}</span></span>",
            escape(&meta.script)
        ));
    }
    w.pop();
    w.line("</div>");

    // Resource block.
    w.line("<div id='resourcedata' class='content resourcedata'>");
    w.push();
    w.line("<span class='title'>Resource Info</span>");
    resource_list(&mut w, "soundresource", meta.sound_channel.files.iter());
    resource_list(
        &mut w,
        "bgaresource",
        meta.bga_channel.headers.iter().map(|(id, h)| (id, &h.file)),
    );
    w.line("<ul id='bpmresource'>");
    w.push();
    for (id, bpm) in &meta.bpm_channel.bpm {
        w.line(&format!(
            "<li data-channel='{id}' data-value='{bpm}'>Channel {id}, {bpm}</li>"
        ));
    }
    w.pop();
    w.line("</ul>");
    w.line("<ul id='stopresource'>");
    w.push();
    for (id, ticks) in &meta.stop_channel.ticks {
        w.line(&format!(
            "<li data-channel='{id}' data-value='{ticks}'>Channel {id}, {ticks}</li>"
        ));
    }
    w.pop();
    w.line("</ul>");
    w.pop();
    w.line("</div>");

    export_notes(chart, &mut w);

    w.pop();
    w.line("</div>");
    w.out
}

fn resource_list<'a, I, V>(w: &mut HtmlWriter, id: &str, entries: I)
where
    I: Iterator<Item = (&'a u16, V)>,
    V: std::fmt::Display,
{
    w.line(&format!("<ul id='{id}'>"));
    w.push();
    for (channel, value) in entries {
        w.line(&format!(
            "<li data-channel='{channel}' data-value='{value}'>Channel {channel}, {value}</li>"
        ));
    }
    w.pop();
    w.line("</ul>");
}

/// A longnote still running past the current measure.
struct OpenLongnote {
    lane: usize,
    end_measure: f64,
    start_time: f64,
}

fn export_notes(chart: &Chart, w: &mut HtmlWriter) {
    w.line("<div class='content notedata' id='notedata'>");
    w.push();

    let notes: Vec<(usize, &NoteElement)> = chart.notes.all_iter().collect();
    let tempos: Vec<(usize, &NoteElement)> = chart.tempo.all_iter().collect();
    // End measure per longnote head, per lane.
    let mut ends: Vec<(usize, f64, f64)> = Vec::new(); // (lane, start, end)
    for (lane, track) in chart.notes.tracks().tracks().enumerate() {
        let mut open: Option<f64> = None;
        for e in track.iter() {
            match e.chain() {
                ChainStatus::Start => open = Some(e.measure()),
                ChainStatus::End => {
                    if let Some(start) = open.take() {
                        ends.push((lane, start, e.measure()));
                    }
                }
                _ => {}
            }
        }
    }
    // A head with no tail keeps its own position as the span end.
    let end_of = |lane: usize, start: f64| -> f64 {
        ends.iter()
            .find(|&&(l, s, _)| l == lane && s == start)
            .map_or(start, |&(_, _, e)| e)
    };

    let measure_count = notes
        .iter()
        .map(|(_, e)| e.measure())
        .chain(tempos.iter().map(|(_, e)| e.measure()))
        .fold(0.0, f64::max)
        .floor() as u32
        + 1;

    let mut note_idx = 0usize;
    let mut tempo_idx = 0usize;
    let mut running: Vec<OpenLongnote> = Vec::new();

    for measure in 0..measure_count {
        let m = f64::from(measure);
        w.line(&format!(
            "<div id='measure{measure}' class='measurebox' data-measure={measure} data-length={}><div class='inner'>",
            chart.timing.bar_length(measure)
        ));
        w.push();
        w.line(&format!("<div class='measureno'>{measure}</div>"));

        // Longnotes continuing from earlier measures.
        running.retain(|open| {
            let ends_here = open.end_measure < m + 1.0;
            let span_end = if ends_here { open.end_measure } else { m + 1.0 };
            let height = ((span_end - m) * 100.0) as i32 + 1;
            w.line(&format!(
                "<div class='chartobject noteobject longnote longnote_body lane{lane}' style='top:0%; height:{height}%' data-x={lane} data-time={time}></div>",
                lane = open.lane,
                time = open.start_time,
            ));
            if ends_here {
                w.line(&format!(
                    "<div class='chartobject noteobject longnote longnote_end lane{lane}' style='top:{height}%' data-x={lane}></div>",
                    lane = open.lane,
                ));
            }
            !ends_here
        });

        // Notes starting in this measure.
        while note_idx < notes.len() && notes[note_idx].1.measure() < m + 1.0 {
            let (lane, e) = notes[note_idx];
            note_idx += 1;
            if e.chain() == ChainStatus::End {
                continue; // drawn with its head
            }
            let top = ((e.measure() - m) * 100.0) as i32;
            let is_long = e.chain() == ChainStatus::Start;
            let class = if is_long {
                "longnote longnote_begin"
            } else {
                "tapnote"
            };
            w.line(&format!(
                "<div id='nd{idx}' class='chartobject noteobject {class} lane{lane}' style='top:{top}%' data-x={lane} data-y={top} data-beat={beat} data-time={time}></div>",
                idx = note_idx - 1,
                beat = e.measure(),
                time = e.time_msec(),
            ));
            if is_long {
                let end = end_of(lane, e.measure());
                let ends_here = end < m + 1.0;
                let span_end = if ends_here { end } else { m + 1.0 };
                let height = ((span_end - e.measure()) * 100.0) as i32 + 1;
                w.line(&format!(
                    "<div class='chartobject noteobject longnote longnote_body lane{lane}' style='top:{top}%; height:{height}%' data-x={lane}></div>",
                ));
                if ends_here {
                    w.line(&format!(
                        "<div class='chartobject noteobject longnote longnote_end lane{lane}' style='top:{}%' data-x={lane}></div>",
                        top + height,
                    ));
                } else {
                    running.push(OpenLongnote {
                        lane,
                        end_measure: end,
                        start_time: e.time_msec(),
                    });
                }
            }
        }

        // Timing objects in this measure.
        while tempo_idx < tempos.len() && tempos[tempo_idx].1.measure() < m + 1.0 {
            let (kind, e) = tempos[tempo_idx];
            tempo_idx += 1;
            let top = ((e.measure() - m) * 100.0) as i32;
            w.line(&format!(
                "<div id='td{idx}' class='chartobject tempoobject tempotype{kind}' style='top:{top}%' data-y={top} data-beat={beat} data-time={time}></div>",
                idx = tempo_idx - 1,
                beat = e.measure(),
                time = e.time_msec(),
            ));
        }

        w.pop();
        w.line("</div></div>");
    }

    w.pop();
    w.line("</div>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bms::{LoadOptions, load_str};

    #[test]
    fn export_contains_measures_and_notes() {
        const SRC: &str = "
#TITLE export test
#BPM 120
#WAV01 a.wav
#00111:01000100
#00211:0001
";
        let output = load_str(SRC, &LoadOptions::with_seed(1));
        let html = export_chart(&output.chart);
        assert!(html.contains("Metadata Info"));
        assert!(html.contains("export test"));
        assert!(html.contains("id='measure2'"));
        assert!(html.contains("tapnote"));
        assert!(html.contains("Channel 1, a.wav"));
    }

    #[test]
    fn longnote_spanning_measures_gets_body_parts() {
        const SRC: &str = "
#TITLE ln
#BPM 120
#LNTYPE 1
#WAV01 a.wav
#00151:0100
#00251:0001
";
        let output = load_str(SRC, &LoadOptions::with_seed(1));
        let html = export_chart(&output.chart);
        assert!(html.contains("longnote_begin"));
        assert!(html.contains("longnote_body"));
        assert!(html.contains("longnote_end"));
    }
}
