//! Chart inspection utility: profiles charts and dumps them as HTML.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use chart_rs::bms::LoadOptions;
use chart_rs::chart::Chart;
use chart_rs::html;
use chart_rs::song::Song;

#[derive(Debug, Parser)]
#[command(name = "chartutil", about = "Profile rhythm game charts and export them as HTML.")]
struct Args {
    /// Write an HTML dump next to each chart.
    #[arg(long)]
    html: bool,

    /// Print a chart profile to stdout.
    #[arg(long)]
    profile: bool,

    /// Treat positional arguments as song folders instead of files.
    #[arg(long)]
    folder: bool,

    /// Verbose logging.
    #[arg(long)]
    verbose: bool,

    /// Output directory for generated files.
    #[arg(long, value_name = "dir")]
    output: Option<PathBuf>,

    /// Chart files, or song folders with --folder.
    #[arg(value_name = "path", required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let mut failed = false;
    for path in &args.paths {
        if let Err(message) = process_path(&args, path) {
            eprintln!("{}: {message}", path.display());
            failed = true;
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn process_path(args: &Args, path: &Path) -> Result<(), String> {
    if args.folder && !path.is_dir() {
        return Err("not a folder".into());
    }
    let song = Song::open(path, &LoadOptions::default()).map_err(|e| e.to_string())?;
    for warning in song.warnings() {
        log::warn!("{}: {warning}", path.display());
    }
    for chart in song.charts() {
        if args.profile {
            print_profile(chart);
        }
        if args.html {
            write_html(args, path, chart).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

fn print_profile(chart: &Chart) {
    let meta = &chart.metadata;
    println!("==== {}", chart.filename().unwrap_or("(unnamed)"));
    println!("Title:      {}", meta.title.as_deref().unwrap_or("-"));
    println!("Artist:     {}", meta.artist.as_deref().unwrap_or("-"));
    println!("Genre:      {}", meta.genre.as_deref().unwrap_or("-"));
    println!("Level:      {}", meta.level);
    println!("BPM:        {} ({} - {})", meta.bpm, chart.timing.min_bpm(), chart.timing.max_bpm());
    println!("Notes:      {}", chart.score_note_count());
    println!("Lanes:      {}", chart.play_lane_count());
    println!("Longnote:   {}", if chart.has_long_note() { "yes" } else { "no" });
    println!("BPM change: {}", if chart.timing.has_bpm_change() { "yes" } else { "no" });
    println!("Stop/Warp:  {}/{}", chart.timing.has_stop(), chart.timing.has_warp());
    let last = chart.song_last_object_time_ms().max(0.0) as u64;
    println!("Length:     {:02}:{:02}.{:03}", last / 60_000, last / 1000 % 60, last % 1000);
    if let Some(hash) = chart.hash() {
        println!("MD5:        {hash}");
    }
}

fn write_html(args: &Args, source: &Path, chart: &Chart) -> std::io::Result<()> {
    let stem = chart
        .filename()
        .map(|name| Path::new(name).file_stem().unwrap_or_default().to_owned())
        .unwrap_or_else(|| source.file_stem().unwrap_or_default().to_owned());
    let mut target = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&target)?;
    target.push(format!("{}.html", stem.to_string_lossy()));
    fs::write(&target, html::export_chart(chart))?;
    println!("wrote {}", target.display());
    Ok(())
}
