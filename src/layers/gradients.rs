use crate::error::{NetError, Result};
use crate::layers::dense::{DenseLayer, LayerGradients};

/// Per-layer gradients for a whole network, in layer order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub layers: Vec<LayerGradients>,
}

impl Gradients {
    pub fn zeros_like(layers: &[DenseLayer]) -> Gradients {
        Gradients {
            layers: layers.iter().map(LayerGradients::zeros_like).collect(),
        }
    }

    pub fn reset(&mut self) {
        self.layers.iter_mut().for_each(LayerGradients::reset);
    }

    /// Adds `other` layer by layer.
    pub fn accumulate(&mut self, other: &Gradients) -> Result<()> {
        if self.layers.len() != other.layers.len() {
            return Err(NetError::shape(
                "Gradients::accumulate",
                format!("{} layers", self.layers.len()),
                format!("{} layers", other.layers.len()),
            ));
        }
        for (acc, g) in self.layers.iter_mut().zip(&other.layers) {
            acc.accumulate(g)?;
        }
        Ok(())
    }

    /// Confirms the gradients line up with `layers` before anything mutates them.
    pub fn check_matches(&self, layers: &[DenseLayer]) -> Result<()> {
        if self.layers.len() != layers.len() {
            return Err(NetError::shape(
                "Gradients::check_matches",
                format!("{} layers", layers.len()),
                format!("{} layers", self.layers.len()),
            ));
        }
        for (i, (g, layer)) in self.layers.iter().zip(layers).enumerate() {
            if g.weights.shape() != layer.weights.shape() || g.biases.len() != layer.biases.len() {
                return Err(NetError::shape(
                    "Gradients::check_matches",
                    format!("layer {i}: {:?} + {} biases", layer.weights.shape(), layer.biases.len()),
                    format!("{:?} + {} biases", g.weights.shape(), g.biases.len()),
                ));
            }
        }
        Ok(())
    }
}
