//! Batch runner: a cartesian grid of scenario cases, parameter sets and
//! seeds, executed on a thread pool.

use std::{
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use itertools::Itertools;
use log::error;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use crate::{config::SimulationConfig, metrics::Metrics, simulation::Simulation};

/// One scenario directory with a display name.
#[derive(Clone)]
pub struct Case {
    pub name: String,
    pub dir: PathBuf,
}

struct Run {
    case: Case,
    config: (String, SimulationConfig),
    seed: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub case: String,
    pub config: String,
    pub seed: u64,
    pub metrics: Metrics,
}

pub struct Experiment {
    cases: Vec<Case>,
    configs: Vec<(String, SimulationConfig)>,
    seeds: Vec<u64>,
}

impl Experiment {
    pub fn new(cases: Vec<Case>, configs: Vec<(String, SimulationConfig)>, seeds: Vec<u64>) -> Self {
        Self { cases, configs, seeds }
    }

    pub fn run(self, threads: usize) -> Vec<RunResult> {
        let runs = self
            .cases
            .into_iter()
            .cartesian_product(self.configs)
            .cartesian_product(self.seeds)
            .map(|((case, config), seed)| Run { case, config, seed })
            .collect::<Vec<_>>();

        let total_runs = runs.len();

        let finished_run_atomic = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        let pool = ThreadPool::new(threads);
        let start_time = Instant::now();
        for run in runs.into_iter() {
            let finished_run_atomic = finished_run_atomic.clone();
            let results = results.clone();
            pool.execute(move || {
                let mut config = run.config.1.clone();
                config.seed = run.seed;
                match Simulation::from_case(config, &run.case.dir).and_then(Simulation::run) {
                    Ok(metrics) => results.lock().unwrap().push(RunResult {
                        case: run.case.name,
                        config: run.config.0,
                        seed: run.seed,
                        metrics,
                    }),
                    Err(err) => error!(
                        "run ({}, {}, seed {}) failed: {}",
                        run.case.name, run.config.0, run.seed, err
                    ),
                }

                finished_run_atomic.fetch_add(1, Ordering::SeqCst);
                let finished_runs = finished_run_atomic.load(Ordering::SeqCst);

                let elapsed = start_time.elapsed();
                let remaining = Duration::from_secs_f64(
                    elapsed.as_secs_f64() / finished_runs as f64 * (total_runs - finished_runs) as f64,
                );
                print!("\r{}", " ".repeat(70));
                print!(
                    "\rFinished {}/{} [{}%] runs in {:.2?}, remaining time: {:.2?}",
                    finished_runs,
                    total_runs,
                    (finished_runs as f64 * 100. / total_runs as f64).round() as i32,
                    elapsed,
                    remaining
                );
                std::io::stdout().flush().unwrap();
            });
        }

        pool.join();

        print!("\r{}", " ".repeat(70));
        println!("\rFinished {} runs in {:.2?}", total_runs, start_time.elapsed());

        let mut results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
        results.sort_by_cached_key(|run| (run.case.clone(), run.config.clone(), run.seed));
        results
    }
}
