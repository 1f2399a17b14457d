//! Command-line front end: load a study, run it on the worker, print results.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::eyre;
use oatlab_core::analysis::DEFAULT_SATURATION;
use oatlab_core::{
    ColorScale, ControllerState, QuantityRef, SessionEvent, SessionSnapshot, Statistic,
    ValueMatrix,
};

use crate::report::{JsonReport, ReportOptions, render_matrix, render_runs};
use crate::study::Study;
use crate::worker::{AnalysisRequest, AnalysisResponse, AnalysisWorker};

#[derive(Parser, Debug)]
#[command(name = "oatlab")]
#[command(about = "One-at-a-time sensitivity analysis for optimization models")]
pub struct Args {
    /// Study file (YAML)
    pub study: PathBuf,

    /// Path to the data directory (default: ~/.oatlab/)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Also write log output to stderr
    #[arg(long)]
    pub log_stderr: bool,

    /// Summary statistic (mean, min, max, initial, final, sum)
    #[arg(short, long, default_value = "mean")]
    pub statistic: Statistic,

    /// Show % change vs the baseline run instead of absolute values
    #[arg(short, long)]
    pub relative: bool,

    /// % change at which the color scale saturates
    #[arg(long, default_value_t = DEFAULT_SATURATION)]
    pub saturation: f64,

    /// Override the study's delta (e.g. 5, -10, 2.5%)
    #[arg(long, allow_hyphen_values = true)]
    pub delta: Option<String>,

    /// Leave this parameter's run out of the table (repeatable)
    #[arg(long = "exclude-parameter", value_name = "REF")]
    pub exclude_parameters: Vec<QuantityRef>,

    /// Leave this outcome's row out of the table (repeatable)
    #[arg(long = "exclude-outcome", value_name = "REF")]
    pub exclude_outcomes: Vec<QuantityRef>,

    /// Pause after this many runs, print the partial table, then resume
    #[arg(long, value_name = "RUNS")]
    pub pause_after: Option<usize>,

    /// Print the session and matrix as JSON
    #[arg(long)]
    pub json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".oatlab")
}

/// Everything a finished invocation produced
#[derive(Debug)]
pub struct Summary {
    pub state: ControllerState,
    pub snapshot: SessionSnapshot,
    pub matrix: ValueMatrix,
    /// Tables captured at each pause
    pub partials: Vec<ValueMatrix>,
}

impl Args {
    fn matrix_request(&self) -> AnalysisRequest {
        AnalysisRequest::Matrix {
            statistic: self.statistic,
            relative: self.relative,
            excluded_parameters: self.exclude_parameters.clone(),
            excluded_outcomes: self.exclude_outcomes.clone(),
        }
    }
}

/// Wait for the reply to a request, handing forwarded events to `on_event`
fn reply(
    worker: &AnalysisWorker,
    on_event: &mut impl FnMut(&SessionEvent),
) -> color_eyre::Result<AnalysisResponse> {
    loop {
        match worker.recv() {
            Some(AnalysisResponse::Event(event)) => on_event(&event),
            Some(AnalysisResponse::Error(msg)) => return Err(eyre!(msg)),
            Some(other) => return Ok(other),
            None => return Err(eyre!("analysis worker exited unexpectedly")),
        }
    }
}

fn expect_matrix(response: AnalysisResponse) -> color_eyre::Result<ValueMatrix> {
    match response {
        AnalysisResponse::Matrix(matrix) => Ok(*matrix),
        other => Err(eyre!("expected a matrix, got {other:?}")),
    }
}

/// Load the study and run the whole sequence on a worker thread.
///
/// `on_event` sees every session event as it happens.
pub fn execute(
    args: &Args,
    mut on_event: impl FnMut(&SessionEvent),
) -> color_eyre::Result<Summary> {
    let study = Study::load(&args.study)?;
    let session = study.build_session(args.delta.as_deref())?;
    let worker = AnalysisWorker::spawn(session, study.model);

    let mut partials = Vec::new();
    let mut pause_after = args.pause_after.filter(|&n| n > 0);
    let state = loop {
        worker.send(AnalysisRequest::Run {
            pause_after: pause_after.take(),
        });
        match reply(&worker, &mut on_event)? {
            AnalysisResponse::Settled {
                state: ControllerState::Paused,
                progress,
            } => {
                tracing::info!(%progress, "sequence paused");
                worker.send(args.matrix_request());
                partials.push(expect_matrix(reply(&worker, &mut on_event)?)?);
            }
            AnalysisResponse::Settled { state, .. } => break state,
            other => return Err(eyre!("unexpected worker reply {other:?}")),
        }
    };

    worker.send(args.matrix_request());
    let matrix = expect_matrix(reply(&worker, &mut on_event)?)?;
    worker.send(AnalysisRequest::Snapshot);
    let snapshot = match reply(&worker, &mut on_event)? {
        AnalysisResponse::Snapshot(snapshot) => *snapshot,
        other => return Err(eyre!("expected a snapshot, got {other:?}")),
    };

    tracing::info!(
        %state,
        runs = snapshot.runs.len(),
        failures = snapshot.failures,
        "analysis finished"
    );
    Ok(Summary {
        state,
        snapshot,
        matrix,
        partials,
    })
}

/// Run the CLI and print to stdout
pub fn run(args: &Args) -> color_eyre::Result<()> {
    let options = ReportOptions {
        scale: ColorScale::diverging(args.saturation)?,
        styled: !args.no_color && !args.json && std::io::stdout().is_terminal(),
    };
    let quiet = args.json;

    let summary = execute(args, |event| {
        if quiet {
            return;
        }
        if let SessionEvent::RunRecorded {
            index,
            label,
            failed,
        } = event
        {
            let status = if *failed { "failed" } else { "ok" };
            println!("run {index:>3}  {label:<28} {status}");
        }
    })?;

    if args.json {
        let report = JsonReport {
            session: &summary.snapshot,
            matrix: &summary.matrix,
        };
        println!("{}", report.to_json()?);
        return Ok(());
    }

    for partial in &summary.partials {
        println!();
        println!("(paused)");
        print!("{}", render_matrix(partial, &options));
    }
    println!();
    print!("{}", render_runs(&summary.snapshot));
    println!();
    print!("{}", render_matrix(&summary.matrix, &options));
    Ok(())
}
