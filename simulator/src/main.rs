use anyhow::Context;
use clap::Parser;
use diag_bridge::bridge::{bind_address, DiagBridge};
use diag_bridge::model::DiagnosticsModel;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{Runner, WorkflowResult};

mod analysis;
mod diag_bridge;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline intercept simulator for the sonar core")]
struct Args {
    /// Run the configured scenario once and append a report
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Override the number of detection cycles
    #[arg(long)]
    cycles: Option<usize>,
    /// Override the ambient temperature in Celsius
    #[arg(long)]
    temperature: Option<f32>,
    /// Export telemetry as JSON lines
    #[arg(long)]
    telemetry: Option<PathBuf>,
    /// Run detection-performance, chirp sweep and beam-pattern analysis
    #[arg(long, default_value_t = false)]
    analyze: bool,
    /// Keep the diagnostics bridge alive for scenario requests
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value_t = 9000)]
    port: u16,
}

fn format_report(result: &WorkflowResult) -> String {
    let mut report = format!(
        "scenario={} cycles={} detections={} calibrated={} intercepted={} intercept_cycle={:?} final_distance_m={:?}\n",
        result.scenario.as_deref().unwrap_or("default"),
        result.cycles.len(),
        result.detection_count(),
        result.calibrated,
        result.intercepted,
        result.intercept_cycle,
        result.final_distance_m
    );
    for cycle in &result.cycles {
        report.push_str(&format!(
            "  cycle={} truth_cm={:?} range_cm={:?} az_deg={:?} el_deg={:?} clusters={} thrust={:?} latency_us={}\n",
            cycle.cycle,
            cycle.truth_range_cm,
            cycle.range_cm,
            cycle.azimuth_deg,
            cycle.elevation_deg,
            cycle.clusters,
            cycle.thrust,
            cycle.latency_us
        ));
    }
    report
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut workflow_config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    workflow_config.apply_overrides(args.cycles, args.temperature);
    if args.telemetry.is_some() {
        workflow_config.telemetry_path = args.telemetry.clone();
    }
    workflow_config
        .validate()
        .context("validating workflow configuration")?;

    env_logger::Builder::new()
        .filter_level(workflow_config.log_filter())
        .parse_default_env()
        .init();

    let runner = Arc::new(Runner::new(workflow_config));
    let bridge = DiagBridge::new(runner.clone());

    if args.offline {
        let result = runner.execute().context("running offline scenario")?;

        println!(
            "Offline run -> cycles {}, detections {}, intercepted {} (cycle {:?})",
            result.cycles.len(),
            result.detection_count(),
            result.intercepted,
            result.intercept_cycle
        );

        bridge.publish(DiagnosticsModel::from(&result));
        bridge.publish_status("Offline scenario results ready.");

        let report_path = PathBuf::from("tools/data/offline_intercept.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)
            .with_context(|| format!("opening {}", report_path.display()))?;
        file.write_all(format_report(&result).as_bytes())
            .context("writing offline report")?;
    }
    if args.analyze {
        let report = analysis::run(runner.config()).context("running analysis")?;
        for level in &report.performance {
            println!(
                "noise {:>7.1} -> detection rate {:.2}, range rmse {:?} cm, angle rmse {:?} deg, snr {:.1} dB",
                level.noise_std,
                level.detection_rate,
                level.range_rmse_cm,
                level.angle_rmse_deg,
                level.mean_snr_db
            );
        }
        let report_path = PathBuf::from("tools/data/analysis_report.json");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&report).context("encoding analysis report")?;
        fs::write(&report_path, json)
            .with_context(|| format!("writing {}", report_path.display()))?;
        println!("Analysis report written to {}", report_path.display());
    }
    if args.serve {
        bridge.serve(bind_address(args.port));
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
