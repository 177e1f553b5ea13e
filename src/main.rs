mod cli;

use anyhow::{Context as _, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use cli::Cli;
use mdspectra::audio::analysis::{ChunkSink, NoChunks};
use mdspectra::audio::decode;
use mdspectra::audio::signal::{Role, Signal};
use mdspectra::config;
use mdspectra::context::Context;
use mdspectra::encode::wav::{self, WavChunkWriter};
use mdspectra::engine::{self, Output};
use mdspectra::profile::{loader, Timeline};
use mdspectra::report::{self, Report};

fn chunk_sink(cli: &Cli, out_dir: &Path, source: &Path, label: &str) -> Result<Box<dyn ChunkSink>> {
    if !cli.chunks {
        return Ok(Box::new(NoChunks));
    }
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let writer = WavChunkWriter::new(&out_dir.join("chunks"), &format!("{}_{}", stem, label))
        .context("Failed to create the chunk directory")?;
    Ok(Box::new(writer))
}

/// Analyse one prepared recording, writing both filtered outputs when
/// reconstruction is on. Returns the signal whose tables go in the report.
fn process(
    cli: &Cli,
    prepared: &Signal,
    path: &Path,
    out_dir: &Path,
    timeline: &Timeline,
    ctx: &mut Context,
    pb: &ProgressBar,
) -> Result<Signal> {
    if !ctx.config.reconstruct {
        let mut sink = chunk_sink(cli, out_dir, path, "tables")?;
        let analysis = engine::analyze(prepared.clone(), timeline, ctx, sink.as_mut(), pb)
            .with_context(|| format!("Failed to analyse {}", path.display()))?;
        return Ok(analysis.signal);
    }

    let mut tables = None;
    for output in Output::ALL {
        let mut sink = chunk_sink(cli, out_dir, path, output.label())?;
        let analysis = engine::analyze_output(prepared, output, timeline, ctx, sink.as_mut(), pb)
            .with_context(|| format!("Failed to analyse {}", path.display()))?;
        let target = wav::output_path(out_dir, path, output.label());
        wav::write_signal(&target, &analysis.signal)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        if tables.is_none() {
            tables = Some(analysis.signal);
        }
    }
    tables.context("No output was produced")
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    // Load config: explicit --config path, or auto-detect mdspectra.toml / user config
    let config_path = cli.config.clone().or_else(config::find_config);
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            cli.merge(cfg);
        }
    }
    let out_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| config::OutputConfig::default().dir);

    let mut analysis_config = cli.analysis_config();
    analysis_config.sanitize()?;

    // 1. Profile
    let mut timeline = loader::load_profile(&cli.profile)
        .with_context(|| format!("Failed to load profile {}", cli.profile.display()))?;
    if analysis_config.compress_to_blocks {
        timeline.compress_to_blocks();
        log::info!("Repeated blocks folded, {} entries", timeline.len());
    }
    log::info!(
        "Profile '{}': {} entries, {:.2}s at {:.4}ms per frame",
        timeline.name,
        timeline.len(),
        timeline.total_seconds(timeline.ms_per_frame),
        timeline.ms_per_frame
    );

    // 2. Decode
    let mut recordings = vec![(cli.reference.clone(), Role::Reference)];
    if let Some(ref compare) = cli.compare {
        recordings.push((compare.clone(), Role::Comparison));
    }
    let mut signals = Vec::with_capacity(recordings.len());
    for (path, role) in &recordings {
        let signal = decode::decode_signal(path, *role)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        signals.push(signal);
    }

    // 3. Sync every recording before analysing any of them
    let mut ctx = Context::new(analysis_config);
    for (signal, (path, _)) in signals.iter_mut().zip(&recordings) {
        engine::prepare(signal, &timeline, &mut ctx)
            .with_context(|| format!("Failed to synchronise {}", path.display()))?;
    }

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    // 4. Analyse
    let passes = if ctx.config.reconstruct { 2 * Output::ALL.len() } else { 1 };
    let pb = ProgressBar::new((timeline.len() * passes * signals.len()) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut analysed = Vec::with_capacity(signals.len());
    for (signal, (path, _)) in signals.iter().zip(&recordings) {
        analysed.push(process(&cli, signal, path, &out_dir, &timeline, &mut ctx, &pb)?);
    }
    pb.finish();

    // 5. Report
    if cli.json {
        let stem = cli
            .reference
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        let path = out_dir.join(format!("{}.json", stem));
        report::write_report(&path, &Report::new(&timeline.name, &ctx, &analysed))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    log::info!(
        "Done, {} recording(s) analysed, output in {}",
        analysed.len(),
        out_dir.display()
    );
    Ok(())
}
