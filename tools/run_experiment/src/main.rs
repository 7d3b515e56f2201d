use std::{
    collections::BTreeMap,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use env_logger::Builder;
use mvno_sim::{
    config::SimulationConfig,
    experiment::{Case, Experiment, RunResult},
    metrics::Metrics,
};
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    /// Scenario directories with machine_attributes.json / task_events.json.
    cases: Vec<PathBuf>,
    /// Parameter files, one simulation configuration each.
    params: Vec<PathBuf>,
    seeds: Vec<u64>,
}

/// Runs batch experiment.
#[derive(Parser, Debug)]
struct Args {
    /// Path to config.
    #[arg(short, long)]
    config: PathBuf,

    /// Path to file with results.
    #[arg(short, long)]
    output: PathBuf,

    /// Do not run experiments, just read results from --output.
    #[arg(long)]
    precalculated: bool,

    /// Number of threads.
    #[arg(long, default_value_t = std::thread::available_parallelism().unwrap().get())]
    threads: usize,
}

fn filename(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .split('.')
        .next()
        .unwrap()
        .to_string()
}

struct ResultRow {
    case: String,
    config: String,
    mno_block_rate: f64,
    mvno_block_rate: f64,
    mno_fitness: f64,
    mvno_fitness: f64,
    lease_cost: f64,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let values = values.collect::<Vec<_>>();
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_rate(rows: &[[f64; 3]]) -> f64 {
    mean(rows.iter().flatten().copied())
}

fn summarize(metrics: &Metrics) -> (f64, f64, f64, f64, f64) {
    (
        mean_rate(&metrics.mno.block_rate),
        mean_rate(&metrics.mvno.block_rate),
        mean_rate(&metrics.mno.task_fitness),
        mean_rate(&metrics.mvno.task_fitness),
        mean(metrics.mvno_vm_cost.iter().copied()),
    )
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let config: Config = serde_yaml::from_str(&std::fs::read_to_string(args.config).expect("Can't read config file"))
        .expect("Can't parse config file");

    let result: Vec<RunResult> = if args.precalculated {
        serde_json::from_str(&std::fs::read_to_string(args.output).expect("Can't read file with result"))
            .expect("Can't parse file with result")
    } else {
        let experiment = Experiment::new(
            config
                .cases
                .into_iter()
                .enumerate()
                .map(|(i, dir)| Case {
                    name: format!("{}_{}", i, filename(&dir)),
                    dir,
                })
                .collect(),
            config
                .params
                .into_iter()
                .enumerate()
                .map(|(i, path)| {
                    let name = format!("{}_{}", i, filename(&path));
                    (name, SimulationConfig::from_yaml(path).expect("Can't read parameter file"))
                })
                .collect(),
            config.seeds,
        );

        let result = experiment.run(args.threads);
        File::create(args.output)
            .expect("Can't create output file")
            .write_all(serde_json::to_string_pretty(&result).unwrap().as_bytes())
            .expect("Can't write to output file");
        result
    };

    let mut grouped: BTreeMap<(String, String), Vec<(f64, f64, f64, f64, f64)>> = BTreeMap::new();
    for run in result.iter() {
        grouped
            .entry((run.case.clone(), run.config.clone()))
            .or_default()
            .push(summarize(&run.metrics));
    }

    let rows = grouped
        .into_iter()
        .map(|((case, config), summaries)| ResultRow {
            case,
            config,
            mno_block_rate: mean(summaries.iter().map(|s| s.0)),
            mvno_block_rate: mean(summaries.iter().map(|s| s.1)),
            mno_fitness: mean(summaries.iter().map(|s| s.2)),
            mvno_fitness: mean(summaries.iter().map(|s| s.3)),
            lease_cost: mean(summaries.iter().map(|s| s.4)),
        })
        .collect::<Vec<_>>();

    let case_width = rows.iter().map(|row| row.case.len()).max().unwrap_or(4).max(4);
    let config_width = rows.iter().map(|row| row.config.len()).max().unwrap_or(6).max(6);
    println!(
        "| {: <case_width$} | {: <config_width$} | mno block | mvno block | mno fitness | mvno fitness | lease cost |",
        "case",
        "config",
        case_width = case_width,
        config_width = config_width
    );
    println!(
        "|-{:-<case_width$}-|-{:-<config_width$}-|-----------|------------|-------------|--------------|------------|",
        "",
        "",
        case_width = case_width,
        config_width = config_width
    );
    for row in rows.into_iter() {
        println!(
            "| {: <case_width$} | {: <config_width$} | {: >8.2}% | {: >9.2}% | {: >11.3} | {: >12.3} | {: >10.2} |",
            row.case,
            row.config,
            row.mno_block_rate * 100.,
            row.mvno_block_rate * 100.,
            row.mno_fitness,
            row.mvno_fitness,
            row.lease_cost,
            case_width = case_width,
            config_width = config_width
        );
    }
}
