use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::activation::activation::ActivationFunction;
use crate::data::pipeline::{check_aligned, sub_batch, Batch};
use crate::data::split::TrainValSplit;
use crate::error::{NetError, Result};
use crate::layers::dense::{DenseLayer, LayerGradients};
use crate::layers::gradients::Gradients;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::matrix::Matrix;
use crate::metrics::stats::{argmax_rows, Stats};
use crate::metrics::weights::WeightStats;
use crate::network::topology::Topology;
use crate::optim::optimizer::Optimizer;
use crate::optim::scheduler::LrScheduler;
use crate::train::loop_fn::{train_loop, FitReport};
use crate::train::train_config::TrainConfig;

/// Activations of one worker's sub-batch, kept between the forward and the
/// backward pass. `activations[0]` is the input; `derivatives[i]` is the
/// activation derivative of layer `i` and is empty for the input and output
/// layers.
#[derive(Debug, Default)]
struct WorkerScratch {
    activations: Vec<Matrix>,
    derivatives: Vec<Matrix>,
}

/// A dense feed-forward network together with its optimizer and the worker
/// pool that trains it.
///
/// Parameters are only mutated between minibatches (`weight_decay`,
/// `update_weights`); during a pass the workers read them concurrently and
/// write nothing but their own scratch slot.
pub struct Network {
    topology: Topology,
    layers: Vec<DenseLayer>,
    gradients: Gradients,
    optimizer: Box<dyn Optimizer>,
    pool: ThreadPool,
    scratch: Vec<WorkerScratch>,
}

impl Network {
    /// Builds a network with freshly initialized weights and `workers`
    /// training threads.
    pub fn new(topology: Topology, optimizer: Box<dyn Optimizer>, workers: usize) -> Result<Network> {
        Network::with_rng(topology, optimizer, workers, &mut StdRng::from_entropy())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        topology: Topology,
        mut optimizer: Box<dyn Optimizer>,
        workers: usize,
        rng: &mut R,
    ) -> Result<Network> {
        if workers == 0 {
            return Err(NetError::InvalidConfig("worker count must be at least 1".into()));
        }

        let layers: Vec<DenseLayer> = topology
            .gaps()
            .map(|(from, to)| DenseLayer::new(from.size, to.size, to.activation, rng))
            .collect();

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ffnn-worker-{i}"))
            .build()
            .map_err(|e| NetError::InvalidConfig(format!("cannot start worker pool: {e}")))?;

        optimizer.init(&layers);

        debug!(
            topology = %topology.describe(),
            workers,
            optimizer = optimizer.name(),
            "network initialized"
        );

        Ok(Network {
            gradients: Gradients::zeros_like(&layers),
            scratch: (0..workers).map(|_| WorkerScratch::default()).collect(),
            topology,
            layers,
            optimizer,
            pool,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn workers(&self) -> usize {
        self.scratch.len()
    }

    /// Gradients accumulated by the most recent `forward_backward_pass`.
    pub fn gradients(&self) -> &Gradients {
        &self.gradients
    }

    pub fn optimizer_name(&self) -> &'static str {
        self.optimizer.name()
    }

    /// Activations stored by the last pass of `worker_id`, input first.
    pub fn worker_activations(&self, worker_id: usize) -> Option<&[Matrix]> {
        self.scratch.get(worker_id).map(|s| s.activations.as_slice())
    }

    fn check_trainable(&self) -> Result<()> {
        let out = self.topology.output_layer().activation;
        if out != ActivationFunction::Softmax {
            return Err(NetError::OutputActivationMismatch(out));
        }
        Ok(())
    }

    /// Runs a forward pass on one worker's slot and returns the stats of its
    /// predictions.
    pub fn forward_pass(&mut self, data: &Matrix, labels: &[u32], worker_id: usize) -> Result<Stats> {
        self.check_trainable()?;
        let workers = self.workers();
        let scratch = self.scratch.get_mut(worker_id).ok_or_else(|| {
            NetError::InvalidConfig(format!("worker {worker_id} out of range (pool has {workers})"))
        })?;
        forward_into(&self.layers, data, labels, scratch)
    }

    /// One data-parallel forward and backward pass over a minibatch that is
    /// already split into at most `workers()` sub-batches.
    ///
    /// Each worker returns private gradients; they are summed into
    /// `gradients()` on the calling thread in worker order after every worker
    /// has finished. Bias gradients are column sums of the output delta
    /// divided by that worker's row count. Returns the stats averaged over the
    /// non-empty sub-batches.
    pub fn forward_backward_pass(&mut self, sub_batches: &[Batch]) -> Result<Stats> {
        self.check_trainable()?;
        if sub_batches.len() > self.workers() {
            return Err(NetError::InvalidConfig(format!(
                "{} sub-batches for {} workers",
                sub_batches.len(),
                self.workers()
            )));
        }
        for b in sub_batches {
            check_aligned(&b.data, &b.labels)?;
        }

        self.gradients.reset();

        let transposed: Vec<Matrix> = self.layers.iter().map(|l| l.weights.transpose()).collect();

        let Network { pool, scratch, layers, .. } = self;
        let layers: &[DenseLayer] = layers;
        let results: Vec<Result<(Stats, Gradients)>> = pool.install(|| {
            scratch
                .par_iter_mut()
                .zip(sub_batches.par_iter())
                .filter(|(_, batch)| !batch.is_empty())
                .map(|(slot, batch)| {
                    let stats = forward_into(layers, &batch.data, &batch.labels, slot)?;
                    let grads = backward(layers, &transposed, &batch.labels, slot)?;
                    Ok((stats, grads))
                })
                .collect()
        });

        let mut stats = Vec::with_capacity(results.len());
        for result in results {
            let (s, g) = result?;
            self.gradients.accumulate(&g)?;
            stats.push(s);
        }

        Ok(Stats::mean(&stats).unwrap_or_default())
    }

    /// Multiplies every weight (not bias) by `1 - lambda`.
    pub fn weight_decay(&mut self, lambda: f32) {
        if lambda == 0.0 {
            return;
        }
        let coeff = 1.0 - lambda;
        for layer in &mut self.layers {
            layer.weights *= coeff;
        }
    }

    /// Hands the accumulated gradients to the optimizer. The update runs on
    /// the network's own pool, so parallel optimizers use `workers` threads.
    pub fn update_weights(&mut self, batch_size: usize, eta: f32) -> Result<()> {
        let Network { pool, optimizer, layers, gradients, .. } = self;
        pool.install(|| optimizer.update(layers, gradients, batch_size, eta))
    }

    /// Single-threaded forward pass without any bookkeeping.
    pub fn predict(&self, data: &Matrix) -> Result<Matrix> {
        feed_forward(&self.layers, data)
    }

    /// Predicted class per row.
    pub fn predict_classes(&self, data: &Matrix) -> Result<Vec<usize>> {
        Ok(argmax_rows(&self.predict(data)?))
    }

    /// Evaluates several batches on the worker pool; stats are averaged over
    /// the non-empty batches. `None` when there is nothing to evaluate.
    pub fn predict_parallel(&self, batches: &[Batch]) -> Result<Option<Stats>> {
        let layers = &self.layers;
        let stats: Vec<Stats> = self.pool.install(|| {
            batches
                .par_iter()
                .filter(|b| !b.is_empty())
                .map(|b| Stats::compute(&feed_forward(layers, &b.data)?, &b.labels))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(Stats::mean(&stats))
    }

    /// Splits `batch` across the workers and evaluates it.
    pub fn evaluate(&self, batch: &Batch) -> Result<Option<Stats>> {
        self.predict_parallel(&sub_batch(batch, self.workers())?)
    }

    pub fn weight_stats(&self) -> Vec<WeightStats> {
        self.layers.iter().map(|l| WeightStats::of(&l.weights)).collect()
    }

    /// Trains on `split`; see `train_loop`.
    pub fn fit(
        &mut self,
        split: &TrainValSplit,
        config: &TrainConfig,
        scheduler: Option<&mut LrScheduler>,
    ) -> Result<FitReport> {
        train_loop(self, split, config, scheduler)
    }
}

fn feed_forward(layers: &[DenseLayer], data: &Matrix) -> Result<Matrix> {
    let mut out = layers[0].forward(data)?;
    for layer in &layers[1..] {
        out = layer.forward(&out)?;
    }
    Ok(out)
}

fn forward_into(
    layers: &[DenseLayer],
    data: &Matrix,
    labels: &[u32],
    scratch: &mut WorkerScratch,
) -> Result<Stats> {
    scratch.activations.clear();
    scratch.derivatives.clear();
    scratch.activations.push(data.clone());
    scratch.derivatives.push(Matrix::default());

    let last = layers.len() - 1;
    for (i, layer) in layers.iter().enumerate() {
        let out = layer.forward(&scratch.activations[i])?;
        let derivative = if i == last {
            Matrix::default()
        } else {
            let mut d = out.clone();
            layer.activation.derivative(&mut d)?;
            d
        };
        scratch.activations.push(out);
        scratch.derivatives.push(derivative);
    }

    Stats::compute(&scratch.activations[layers.len()], labels)
}

fn backward(
    layers: &[DenseLayer],
    transposed: &[Matrix],
    labels: &[u32],
    scratch: &WorkerScratch,
) -> Result<Gradients> {
    let rows = labels.len() as f32;
    let mut grads = Vec::with_capacity(layers.len());

    let mut delta = CrossEntropyLoss::delta(&scratch.activations[layers.len()], labels)?;
    for gap in (0..layers.len()).rev() {
        let weights = scratch.activations[gap].transpose().matmul(&delta)?;
        let biases = delta.column_sums().into_iter().map(|s| s / rows).collect();
        grads.push(LayerGradients { weights, biases });

        if gap > 0 {
            let mut next = delta.matmul(&transposed[gap])?;
            next.hadamard(&scratch.derivatives[gap])?;
            delta = next;
        }
    }

    grads.reverse();
    Ok(Gradients { layers: grads })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pipeline::batch;
    use crate::optim::sgd::Sgd;
    use approx::assert_abs_diff_eq;
    use ActivationFunction::*;

    fn network(workers: usize, seed: u64) -> Network {
        let topology = Topology::builder()
            .input(3)
            .layer(5, Sigmoid)
            .layer(4, ReLU)
            .layer(2, Softmax)
            .build()
            .unwrap();
        Network::with_rng(topology, Box::new(Sgd::new()), workers, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    fn toy_batch(rows: usize) -> Batch {
        let data = Matrix::from_vec(
            rows,
            3,
            (0..rows * 3).map(|x| ((x * 7 % 11) as f32) / 11.0 - 0.4).collect(),
        )
        .unwrap();
        let labels = (0..rows).map(|i| (i % 2) as u32).collect();
        Batch::new(data, labels).unwrap()
    }

    #[test]
    fn builds_parameter_shapes_from_topology() {
        let net = network(2, 0);
        let shapes: Vec<_> = net.layers().iter().map(|l| l.weights.shape()).collect();
        assert_eq!(shapes, vec![(3, 5), (5, 4), (4, 2)]);
        assert!(net.layers().iter().all(|l| l.biases.iter().all(|&b| b == 0.0)));
        assert_eq!(net.workers(), 2);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let topology = Topology::builder().input(2).layer(2, Softmax).build().unwrap();
        assert!(Network::new(topology, Box::new(Sgd::new()), 0).is_err());
    }

    #[test]
    fn predict_outputs_distributions() {
        let net = network(1, 1);
        let out = net.predict(&toy_batch(6).data).unwrap();
        assert_eq!(out.shape(), (6, 2));
        for i in 0..6 {
            assert_abs_diff_eq!(out.row(i).iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        }
        assert!(net.predict(&Matrix::zeros(2, 4)).is_err());
    }

    #[test]
    fn forward_pass_fills_worker_slot() {
        let mut net = network(2, 2);
        let b = toy_batch(4);
        let stats = net.forward_pass(&b.data, &b.labels, 1).unwrap();
        assert!((0.0..=100.0).contains(&stats.accuracy));

        let acts = net.worker_activations(1).unwrap();
        assert_eq!(acts.len(), 4);
        assert_eq!(acts[0], b.data);
        assert_eq!(acts[3], net.predict(&b.data).unwrap());
        assert!(net.worker_activations(0).unwrap().is_empty());

        assert!(net.forward_pass(&b.data, &b.labels, 2).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let topology = Topology::builder().input(3).layer(4, Sigmoid).layer(2, Softmax).build().unwrap();
        let mut net =
            Network::with_rng(topology, Box::new(Sgd::new()), 1, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = toy_batch(1);

        net.forward_backward_pass(std::slice::from_ref(&b)).unwrap();
        let analytic = net.gradients().layers[0].weights.get(1, 2);

        // The training loss is categorical cross-entropy: -ln p[label].
        let loss = |net: &Network| -> f32 {
            let p = net.predict(&b.data).unwrap();
            -(p.get(0, b.labels[0] as usize) as f64).ln() as f32
        };
        let h = 1e-2;
        let w = net.layers[0].weights.get(1, 2);
        net.layers[0].weights.set(1, 2, w + h);
        let up = loss(&net);
        net.layers[0].weights.set(1, 2, w - h);
        let down = loss(&net);

        assert_abs_diff_eq!(analytic, (up - down) / (2.0 * h), epsilon = 2e-3);
    }

    #[test]
    fn parallel_pass_matches_single_worker() {
        let mut net = network(4, 5);
        let b = toy_batch(8);

        net.forward_backward_pass(&sub_batch(&b, 1).unwrap()).unwrap();
        let single = net.gradients().clone();

        net.forward_backward_pass(&sub_batch(&b, 4).unwrap()).unwrap();
        let split = net.gradients().clone();

        for (s, p) in single.layers.iter().zip(&split.layers) {
            for (a, b) in s.weights.as_slice().iter().zip(p.weights.as_slice()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-5);
            }
            // four equal sub-batches, each normalized by its own row count
            for (a, b) in s.biases.iter().zip(&p.biases) {
                assert_abs_diff_eq!(4.0 * a, b, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn accumulator_is_reset_between_passes() {
        let mut net = network(2, 6);
        let subs = sub_batch(&toy_batch(6), 2).unwrap();

        net.forward_backward_pass(&subs).unwrap();
        let first = net.gradients().clone();
        net.forward_backward_pass(&subs).unwrap();
        assert_eq!(net.gradients(), &first);
    }

    #[test]
    fn rejects_more_sub_batches_than_workers() {
        let mut net = network(2, 0);
        let subs = batch(&toy_batch(6).data, &toy_batch(6).labels, 2).unwrap();
        assert!(matches!(net.forward_backward_pass(&subs), Err(NetError::InvalidConfig(_))));
    }

    #[test]
    fn non_softmax_output_cannot_backpropagate() {
        let topology = Topology::builder().input(3).layer(2, Sigmoid).build().unwrap();
        let mut net = Network::new(topology, Box::new(Sgd::new()), 1).unwrap();
        let before = net.layers()[0].weights.clone();

        let b = toy_batch(2);
        let err = net.forward_backward_pass(std::slice::from_ref(&b)).unwrap_err();
        assert!(matches!(err, NetError::OutputActivationMismatch(Sigmoid)));
        assert!(net.forward_pass(&b.data, &b.labels, 0).is_err());
        assert_eq!(net.layers()[0].weights, before);
    }

    #[test]
    fn weight_decay_shrinks_weights_only() {
        let mut net = network(1, 3);
        let before = net.layers()[1].weights.clone();
        net.layers[1].biases = vec![1.0; 4];

        net.weight_decay(0.0);
        assert_eq!(net.layers()[1].weights, before);

        net.weight_decay(0.5);
        assert_abs_diff_eq!(net.layers()[1].weights.get(2, 3), before.get(2, 3) * 0.5);
        assert_eq!(net.layers()[1].biases, vec![1.0; 4]);
    }

    #[test]
    fn update_moves_against_gradient() {
        let mut net = network(2, 4);
        let b = toy_batch(8);
        let subs = sub_batch(&b, 2).unwrap();

        let loss_before = net.forward_backward_pass(&subs).unwrap().cross_entropy;
        for _ in 0..20 {
            net.forward_backward_pass(&subs).unwrap();
            net.update_weights(8, 0.5).unwrap();
        }
        let loss_after = net.forward_backward_pass(&subs).unwrap().cross_entropy;
        assert!(loss_after < loss_before, "{loss_after} >= {loss_before}");
    }

    #[test]
    fn parallel_evaluation_averages_batches() {
        let net = network(3, 8);
        let b = toy_batch(9);
        let stats = net.evaluate(&b).unwrap().unwrap();

        let parts = sub_batch(&b, 3).unwrap();
        let expected: Vec<Stats> = parts
            .iter()
            .map(|p| Stats::compute(&net.predict(&p.data).unwrap(), &p.labels).unwrap())
            .collect();
        let expected = Stats::mean(&expected).unwrap();
        assert_abs_diff_eq!(stats.accuracy, expected.accuracy, epsilon = 1e-4);
        assert_abs_diff_eq!(stats.cross_entropy, expected.cross_entropy, epsilon = 1e-5);

        assert!(net.predict_parallel(&[]).unwrap().is_none());
    }

    /// Records which thread ran each update.
    struct ThreadRecorder(std::sync::Arc<std::sync::Mutex<Vec<Option<String>>>>);

    impl Optimizer for ThreadRecorder {
        fn update(&mut self, _layers: &mut [DenseLayer], _grads: &Gradients, _batch_size: usize, _eta: f32) -> Result<()> {
            let name = std::thread::current().name().map(str::to_owned);
            self.0.lock().unwrap().push(name);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[test]
    fn update_runs_on_the_network_pool() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let topology = Topology::builder().input(3).layer(2, Softmax).build().unwrap();
        let mut net = Network::with_rng(
            topology,
            Box::new(ThreadRecorder(seen.clone())),
            2,
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();

        net.update_weights(4, 0.1).unwrap();
        net.update_weights(4, 0.1).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for name in seen.iter() {
            let name = name.as_deref().unwrap_or_default();
            assert!(name.starts_with("ffnn-worker-"), "ran on {name:?}");
        }
    }

    #[test]
    fn adam_update_on_pool_matches_single_worker() {
        use crate::optim::adam::Adam;

        let b = toy_batch(8);
        let run = |workers: usize| {
            let topology = Topology::builder().input(3).layer(5, Sigmoid).layer(2, Softmax).build().unwrap();
            let mut net =
                Network::with_rng(topology, Box::new(Adam::default()), workers, &mut StdRng::seed_from_u64(10)).unwrap();
            for _ in 0..3 {
                net.forward_backward_pass(&sub_batch(&b, 1).unwrap()).unwrap();
                net.update_weights(b.len(), 0.01).unwrap();
            }
            net.layers()[0].weights.clone()
        };

        let one = run(1);
        let three = run(3);
        for (x, y) in one.as_slice().iter().zip(three.as_slice()) {
            assert!(x.is_finite());
            assert_abs_diff_eq!(x, y, epsilon = 1e-6);
        }
    }
}
