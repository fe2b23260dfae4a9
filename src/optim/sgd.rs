use crate::error::Result;
use crate::layers::dense::DenseLayer;
use crate::layers::gradients::Gradients;
use crate::optim::optimizer::{batch_eta, Optimizer};

/// Plain mini-batch gradient descent: `w -= (eta / batch_size) * grad`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sgd;

impl Sgd {
    pub fn new() -> Sgd {
        Sgd
    }
}

impl Optimizer for Sgd {
    fn update(
        &mut self,
        layers: &mut [DenseLayer],
        grads: &Gradients,
        batch_size: usize,
        eta: f32,
    ) -> Result<()> {
        grads.check_matches(layers)?;
        let step = batch_eta(eta, batch_size)?;

        for (layer, g) in layers.iter_mut().zip(&grads.layers) {
            layer
                .weights
                .as_mut_slice()
                .iter_mut()
                .zip(g.weights.as_slice())
                .for_each(|(w, d)| *w -= step * d);
            layer
                .biases
                .iter_mut()
                .zip(&g.biases)
                .for_each(|(b, d)| *b -= step * d);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}
