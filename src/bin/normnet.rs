#![forbid(unsafe_code)]

use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use normative_network::config::{load_config_from_path, StrategyPolicy, SynthesisConfig};
use normative_network::norm::Goal;
use normative_network::simulation::{run_simulation, SimulationConfig};
use normative_network::synthesis::TickReport;
use normative_network::trace::{JsonlTraceSink, TickTrace, TraceSink};

#[derive(Parser)]
#[command(name = "normnet", version, about = "Normative network synthesis CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List strategy presets and their parameters
    Presets,
    /// Validate a JSON synthesis config and print it with defaults filled in
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run the synthetic junction world
    Demo {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Strategy preset; overrides the config's policy
        #[arg(long)]
        preset: Option<String>,
        #[arg(long, default_value_t = 300)]
        ticks: u64,
        #[arg(long, default_value_t = 24)]
        agents: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Keep running after convergence
        #[arg(long)]
        no_stop: bool,
        /// JSONL tick reports
        #[arg(long)]
        out: Option<PathBuf>,
        /// JSONL tick trace (compact, one row per tick)
        #[arg(long)]
        trace: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn demo_config(
    path: Option<&Path>,
    preset: Option<String>,
) -> Result<SynthesisConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => load_config_from_path(path)?,
        None => SynthesisConfig {
            goals: vec![Goal::from("safety")],
            ..SynthesisConfig::default()
        },
    };
    if preset.is_some() {
        config.preset = preset;
        config.apply_preset()?;
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Presets => {
            for name in StrategyPolicy::preset_names() {
                let policy = StrategyPolicy::preset(name).ok_or("unknown preset")?;
                println!("{name}\t{}", serde_json::to_string(&policy)?);
            }
        }
        Commands::CheckConfig { config } => {
            let config = load_config_from_path(config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Demo {
            config,
            preset,
            ticks,
            agents,
            seed,
            no_stop,
            out,
            trace,
        } => {
            if agents == 0 {
                return Err("--agents must be >= 1".into());
            }
            let config = demo_config(config.as_deref(), preset)?;
            let sim = SimulationConfig {
                ticks,
                agents_per_tick: agents,
                stop_on_convergence: !no_stop,
                seed,
                ..SimulationConfig::default()
            };

            let (trace_sink, trace_worker) = if let Some(path) = trace {
                let (sink, worker) = JsonlTraceSink::<TickTrace>::new(path)?;
                (Some(sink), Some(worker))
            } else {
                (None, None)
            };
            let trace_ref = trace_sink.as_ref().map(|sink| sink as &dyn TraceSink);

            eprintln!("demo: up to {ticks} ticks, {agents} agents/tick, seed {seed}");
            let run = run_simulation(config, &sim, trace_ref)?;

            drop(trace_sink);
            if let Some(worker) = trace_worker {
                let rows = worker.join()?;
                eprintln!("trace: {rows} rows");
            }

            if let Some(out) = out {
                let (sink, worker) = JsonlTraceSink::<TickReport>::new(out)?;
                for report in &run.reports {
                    sink.record(report.clone())?;
                }
                drop(sink);
                let rows = worker.join()?;
                eprintln!("reports: {rows} rows");
            }

            match run.converged_at {
                Some(tick) => eprintln!("converged at tick {tick}"),
                None => eprintln!("did not converge within {} ticks", run.ticks),
            }
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
    }

    Ok(())
}
