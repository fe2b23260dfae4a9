use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activation::activation::ActivationFunction;
use crate::data::pipeline::Batch;
use crate::data::split::TrainValSplit;
use crate::error::Result;
use crate::metrics::stats::Stats;
use crate::network::network::Network;
use crate::network::topology::Topology;
use crate::optim::adam::Adam;
use crate::optim::scheduler::LrScheduler;
use crate::train::train_config::TrainConfig;

/// Hyperparameters for one sweep entry. Hidden layers use ReLU, the output
/// layer softmax, and training always runs Adam with a step-decay schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub hidden: Vec<usize>,
    pub batch_size: usize,
    pub eta: f32,
    pub lambda: f32,
    pub decay_rate: f32,
    pub steps_decay: usize,
    pub min_eta: f32,
    pub early_stopping: usize,
    pub max_time_ms: u64,
    pub max_epochs: usize,
}

/// Smallest, largest, and mean of a series of run measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl Summary {
    pub fn of(values: &[f32]) -> Option<Summary> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        Some(Summary { min, max, mean })
    }
}

/// Aggregate of `runs` trainings of one configuration, measured on the test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigResult {
    pub configuration: Configuration,
    pub topology: String,
    pub accuracy: Summary,
    pub loss: Summary,
    pub minutes: Summary,
}

/// A single training of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub configuration: Configuration,
    pub topology: String,
    pub test: Stats,
    pub minutes: f32,
}

/// Trains candidate configurations on a fixed train/validation split and
/// scores each on a held-out test set.
pub struct ConfigTester<'a> {
    split: &'a TrainValSplit,
    test: &'a Batch,
    input_size: usize,
    output_size: usize,
    workers: usize,
    seed: Option<u64>,
}

impl<'a> ConfigTester<'a> {
    pub fn new(
        split: &'a TrainValSplit,
        test: &'a Batch,
        input_size: usize,
        output_size: usize,
    ) -> ConfigTester<'a> {
        ConfigTester {
            split,
            test,
            input_size,
            output_size,
            workers: rayon::current_num_threads(),
            seed: None,
        }
    }

    /// Worker threads per network in `test_configs`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Makes weight init and shuffling reproducible; run `i` uses `seed + i`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn topology(&self, config: &Configuration) -> Result<Topology> {
        let mut builder = Topology::builder().input(self.input_size);
        for &size in &config.hidden {
            builder = builder.layer(size, ActivationFunction::ReLU);
        }
        builder.layer(self.output_size, ActivationFunction::Softmax).build()
    }

    fn run_once(&self, config: &Configuration, workers: usize, run: u64) -> Result<RunResult> {
        let topology = self.topology(config)?;
        let described = topology.describe();
        let seed = self.seed.map(|s| s.wrapping_add(run));
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut network = Network::with_rng(topology, Box::new(Adam::default()), workers, &mut rng)?;
        let mut scheduler = LrScheduler::new(config.eta, config.min_eta, config.decay_rate, config.steps_decay)?;
        let train_config = TrainConfig {
            epochs: config.max_epochs,
            batch_size: config.batch_size,
            eta: config.eta,
            lambda: config.lambda,
            early_stopping: config.early_stopping,
            max_time_ms: config.max_time_ms,
            seed,
            progress_tx: None,
        };

        let started = Instant::now();
        network.fit(self.split, &train_config, Some(&mut scheduler))?;
        let minutes = started.elapsed().as_secs_f32() / 60.0;

        let test = network.evaluate(self.test)?.unwrap_or_default();
        Ok(RunResult {
            configuration: config.clone(),
            topology: described,
            test,
            minutes,
        })
    }

    /// Trains every configuration `runs` times in turn and returns their test
    /// summaries, best mean accuracy first.
    pub fn test_configs(&self, configurations: &[Configuration], runs: usize) -> Result<Vec<ConfigResult>> {
        let mut results = Vec::with_capacity(configurations.len());

        for config in configurations {
            let mut accuracies = Vec::with_capacity(runs);
            let mut losses = Vec::with_capacity(runs);
            let mut minutes = Vec::with_capacity(runs);
            let mut topology = String::new();

            for run in 0..runs {
                let r = self.run_once(config, self.workers, run as u64)?;
                info!(
                    topology = %r.topology,
                    run = run + 1,
                    runs,
                    accuracy = r.test.accuracy,
                    cross_entropy = r.test.cross_entropy,
                    minutes = r.minutes,
                    "configuration run finished"
                );
                accuracies.push(r.test.accuracy);
                losses.push(r.test.cross_entropy);
                minutes.push(r.minutes);
                topology = r.topology;
            }

            results.push(ConfigResult {
                configuration: config.clone(),
                topology,
                accuracy: Summary::of(&accuracies).unwrap_or_default(),
                loss: Summary::of(&losses).unwrap_or_default(),
                minutes: Summary::of(&minutes).unwrap_or_default(),
            });
        }

        results.sort_by(|a, b| b.accuracy.mean.total_cmp(&a.accuracy.mean));
        for r in &results {
            info!(topology = %r.topology, accuracy = r.accuracy.mean, "final ranking");
        }
        Ok(results)
    }

    /// Trains every configuration once, configurations side by side on the
    /// global rayon pool with a single worker per network. Results keep the
    /// input order.
    pub fn run_parallel(&self, configurations: &[Configuration]) -> Result<Vec<RunResult>> {
        configurations
            .par_iter()
            .enumerate()
            .map(|(i, config)| {
                let r = self.run_once(config, 1, i as u64)?;
                info!(
                    topology = %r.topology,
                    batch_size = config.batch_size,
                    eta = config.eta,
                    lambda = config.lambda,
                    accuracy = r.test.accuracy,
                    cross_entropy = r.test.cross_entropy,
                    minutes = r.minutes,
                    "configuration finished"
                );
                Ok(r)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::Matrix;

    fn quadrants(n: usize) -> Batch {
        let mut rows = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let label = (i % 2) as u32;
            let sign = if label == 0 { -1.0 } else { 1.0 };
            let t = (i as f32 * 0.91).cos() * 0.2;
            rows.push(vec![sign * (0.8 + t), sign * (0.8 - t)]);
            labels.push(label);
        }
        Batch::new(Matrix::from_rows(rows).unwrap(), labels).unwrap()
    }

    fn configuration(hidden: Vec<usize>, eta: f32) -> Configuration {
        Configuration {
            hidden,
            batch_size: 8,
            eta,
            lambda: 0.0,
            decay_rate: 0.5,
            steps_decay: 1000,
            min_eta: 1e-4,
            early_stopping: 0,
            max_time_ms: 0,
            max_epochs: 15,
        }
    }

    #[test]
    fn summary_of_values() {
        let s = Summary::of(&[2.0, 4.0, 9.0]).unwrap();
        assert_eq!(s, Summary { min: 2.0, max: 9.0, mean: 5.0 });
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn ranks_configurations_by_accuracy() {
        let split = TrainValSplit { train: quadrants(64), validation: quadrants(16) };
        let test = quadrants(20);
        let tester = ConfigTester::new(&split, &test, 2, 2).with_workers(2).with_seed(5);

        let configs = vec![configuration(vec![4], 0.0), configuration(vec![6, 4], 0.05)];
        let results = tester.test_configs(&configs, 2).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].accuracy.mean >= results[1].accuracy.mean);
        let mut topologies: Vec<_> = results.iter().map(|r| r.topology.as_str()).collect();
        topologies.sort();
        assert_eq!(topologies, vec!["2x4x2", "2x6x4x2"]);
        for r in &results {
            assert!(r.accuracy.min <= r.accuracy.mean && r.accuracy.mean <= r.accuracy.max);
            assert!(r.minutes.min >= 0.0);
        }
    }

    #[test]
    fn parallel_runs_keep_input_order() {
        let split = TrainValSplit { train: quadrants(32), validation: quadrants(8) };
        let test = quadrants(8);
        let tester = ConfigTester::new(&split, &test, 2, 2).with_seed(1);

        let configs = vec![configuration(vec![3], 0.01), configuration(vec![5], 0.01)];
        let results = tester.run_parallel(&configs).unwrap();

        let topologies: Vec<_> = results.iter().map(|r| r.topology.as_str()).collect();
        assert_eq!(topologies, vec!["2x3x2", "2x5x2"]);
    }

    #[test]
    fn invalid_configuration_is_reported() {
        let split = TrainValSplit { train: quadrants(8), validation: quadrants(4) };
        let test = quadrants(4);
        let tester = ConfigTester::new(&split, &test, 2, 2);
        let mut bad = configuration(vec![0], 0.01);
        assert!(tester.test_configs(std::slice::from_ref(&bad), 1).is_err());
        bad.hidden = vec![3];
        bad.steps_decay = 0;
        assert!(tester.run_parallel(&[bad]).is_err());
    }
}
