use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{NetError, Result};

/// One layer of the network: its width and the activation applied to it.
///
/// The input layer's activation is never applied and must be `Identity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    #[serde(default = "default_activation")]
    pub activation: ActivationFunction,
}

fn default_activation() -> ActivationFunction {
    ActivationFunction::Identity
}

impl LayerSpec {
    pub fn new(size: usize, activation: ActivationFunction) -> LayerSpec {
        LayerSpec { size, activation }
    }
}

/// Validated, ordered list of layers (input first, output last).
///
/// A `Topology` can only be obtained through validation, so the rest of the
/// crate may assume: at least two layers, no empty layer, an `Identity` input
/// layer, and `Softmax` nowhere but the last position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LayerSpec>", into = "Vec<LayerSpec>")]
pub struct Topology {
    layers: Vec<LayerSpec>,
}

impl Topology {
    pub fn new(layers: Vec<LayerSpec>) -> Result<Topology> {
        if layers.len() < 2 {
            return Err(NetError::InvalidTopology(format!(
                "need at least an input and an output layer, got {} layer(s)",
                layers.len()
            )));
        }

        for (i, layer) in layers.iter().enumerate() {
            if layer.size == 0 {
                return Err(NetError::InvalidTopology(format!("layer {i} has no neurons")));
            }
            if layer.activation == ActivationFunction::Softmax && i != layers.len() - 1 {
                return Err(NetError::InvalidTopology(format!(
                    "softmax is only allowed on the output layer, found it on layer {i}"
                )));
            }
        }

        if layers[0].activation != ActivationFunction::Identity {
            return Err(NetError::InvalidTopology(format!(
                "input layer must use identity, got {}",
                layers[0].activation
            )));
        }

        Ok(Topology { layers })
    }

    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].size
    }

    pub fn output_size(&self) -> usize {
        self.output_layer().size
    }

    pub fn output_layer(&self) -> &LayerSpec {
        &self.layers[self.layers.len() - 1]
    }

    /// Iterates `(from, to)` for every pair of adjacent layers.
    pub fn gaps(&self) -> impl Iterator<Item = (&LayerSpec, &LayerSpec)> {
        self.layers.iter().zip(self.layers.iter().skip(1))
    }

    /// Training pairs the output with cross-entropy, which only works for a
    /// softmax output layer.
    pub fn require_softmax_output(&self) -> Result<()> {
        let out = self.output_layer().activation;
        if out != ActivationFunction::Softmax {
            return Err(NetError::InvalidTopology(format!(
                "cross-entropy training needs a softmax output layer, got {out}"
            )));
        }
        Ok(())
    }

    /// Human-readable shape, e.g. `784x128x64x10`.
    pub fn describe(&self) -> String {
        self.layers
            .iter()
            .map(|l| l.size.to_string())
            .collect::<Vec<_>>()
            .join("x")
    }

    /// Serializes the topology to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes and validates a topology written by `save_json`.
    pub fn load_json(path: &str) -> Result<Topology> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl TryFrom<Vec<LayerSpec>> for Topology {
    type Error = NetError;

    fn try_from(layers: Vec<LayerSpec>) -> Result<Self> {
        Topology::new(layers)
    }
}

impl From<Topology> for Vec<LayerSpec> {
    fn from(topology: Topology) -> Self {
        topology.layers
    }
}

/// Chained construction: `Topology::builder().layer(784, Identity)...build()`.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    layers: Vec<LayerSpec>,
}

impl TopologyBuilder {
    pub fn input(self, size: usize) -> Self {
        self.layer(size, ActivationFunction::Identity)
    }

    pub fn layer(mut self, size: usize, activation: ActivationFunction) -> Self {
        self.layers.push(LayerSpec::new(size, activation));
        self
    }

    pub fn build(self) -> Result<Topology> {
        Topology::new(self.layers)
    }
}
