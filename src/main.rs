use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use serde::Serialize;

use indicatif::ProgressStyle;
use tracing::{info, info_span, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rigid_flow::config::*;
use rigid_flow::rigid_box::{RigidBox, RigidTransform};
use rigid_flow::session::{EstimatorConfig, TrackingSession};
use rigid_flow::synthetic::{SceneParams, SyntheticVideo};

#[derive(Parser)]
pub struct Args {
    /// JSON lines with the tracked and the true box of every frame
    #[clap(short, long, default_value = "./rigid-flow.jsonl")]
    pub output: PathBuf,
    #[clap(long, default_value = "120")]
    pub frames: usize,
    /// per-frame motion of the synthetic object
    #[clap(long, default_value = "1.5", allow_hyphen_values = true)]
    pub dx: f32,
    #[clap(long, default_value = "-0.5", allow_hyphen_values = true)]
    pub dy: f32,
    /// degrees
    #[clap(long, default_value = "0.5", allow_hyphen_values = true)]
    pub dphi: f32,
    #[clap(flatten)]
    pub config: Config,
}

#[derive(Serialize)]
struct FrameRecord {
    frame: usize,
    moved: bool,
    tracked: RigidBox,
    truth: RigidBox,
    center_error: f32,
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();
    let config = EstimatorConfig::from(&args.config);

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .init();

    let params = SceneParams {
        frame_count: args.frames,
        motion: RigidTransform::new(args.dx, args.dy, args.dphi),
        seed: config.seed,
        ..Default::default()
    };
    let video = SyntheticVideo::new(params)?;
    let file = File::create(&args.output).with_context(|| format!("cannot create {:?}", args.output))?;
    let mut writer = BufWriter::new(file);

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    header_span.pb_set_length(video.frame_count() as u64);
    let header_span_enter = header_span.enter();

    info!("tracking {} frames in {:?} mode", video.frame_count(), config.mode);
    let mut session = TrackingSession::new(config);
    let mut bb: Option<RigidBox> = None;
    let mut total_error = 0.;
    let mut frame_count = 0;
    for frame in video {
        // the first frame hands in the true box, tracking takes over from there
        let tracked = bb.get_or_insert(frame.truth);
        let moved = session.track(frame.number, &frame.image, tracked);
        let center_error = (tracked.center() - frame.truth.center()).norm();

        let record = FrameRecord {
            frame: frame.number,
            moved,
            tracked: *tracked,
            truth: frame.truth,
            center_error,
        };
        serde_json::to_writer(&mut writer, &record)?;
        writeln!(writer)?;

        total_error += center_error;
        frame_count += 1;
        Span::current().pb_inc(1);
    }
    writer.flush()?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    info!(
        "mean center error {:.3} px over {} frames, written to {:?}",
        total_error / frame_count.max(1) as f32,
        frame_count,
        args.output
    );
    Ok(())
}
