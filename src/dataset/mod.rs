//! Graph datasets consumed by the trainer.
//!
//! A [`GraphData`] holds the global edge list, the dense feature matrix, the
//! class labels and the train/validation/test masks. Every worker builds the
//! same `GraphData` and keeps only its own rows via [`GraphData::shard`].
//!
//! Graphs are selected by name:
//! - `cycle`: an undirected N-cycle with random features
//! - `random`: a seeded random edge sample with random features and labels
//! - anything else: `<data_dir>/<name>.csv`, an edge list read by
//!   [`loader::EdgeListLoader`]

pub mod loader;
pub mod synthetic;

pub use loader::{EdgeListConfig, EdgeListLoader};

use std::path::PathBuf;

use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::constants::*;
use crate::core::error::{GcnError, Result};
use crate::core::types::{ClassLabel, Rank, Scalar, VertexId};
use crate::partition::{Edge, VertexPartition};

/// Dataset section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding `<graph_name>.csv` edge lists
    pub data_dir: PathBuf,
    /// Vertex count of the built-in graphs
    pub num_vertices: usize,
    /// Feature width of generated features
    pub num_features: usize,
    /// Number of classes of generated labels
    pub num_classes: usize,
    /// Edge count of the `random` graph
    pub num_edges: usize,
    /// Fraction of vertices flagged for training
    pub train_fraction: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            data_dir: PathBuf::from("data"),
            num_vertices: DEFAULT_NUM_VERTICES,
            num_features: DEFAULT_NUM_FEATURES,
            num_classes: DEFAULT_NUM_CLASSES,
            num_edges: DEFAULT_NUM_EDGES,
            train_fraction: DEFAULT_TRAIN_FRACTION,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_vertices == 0 {
            return Err(GcnError::invalid_parameter(
                "dataset.num_vertices",
                "0",
                "graphs need at least one vertex",
            ));
        }
        if self.num_features == 0 {
            return Err(GcnError::invalid_parameter(
                "dataset.num_features",
                "0",
                "features need at least one column",
            ));
        }
        if self.num_classes == 0 {
            return Err(GcnError::invalid_parameter(
                "dataset.num_classes",
                "0",
                "labels need at least one class",
            ));
        }
        if !(0.0..=1.0).contains(&self.train_fraction) {
            return Err(GcnError::invalid_parameter(
                "dataset.train_fraction",
                self.train_fraction.to_string(),
                "must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// A full graph with features, labels and masks.
#[derive(Debug, Clone)]
pub struct GraphData {
    num_vertices: usize,
    num_classes: usize,
    edges: Vec<Edge>,
    features: Array2<Scalar>,
    labels: Vec<ClassLabel>,
    train_mask: Vec<bool>,
    val_mask: Vec<bool>,
    test_mask: Vec<bool>,
}

/// The rows of a [`GraphData`] owned by one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphShard {
    pub features: Array2<Scalar>,
    pub labels: Vec<ClassLabel>,
    pub train_mask: Vec<bool>,
}

impl GraphShard {
    /// Number of rows flagged for training.
    pub fn num_train(&self) -> usize {
        self.train_mask.iter().filter(|&&m| m).count()
    }
}

impl GraphData {
    /// Assemble and validate a graph. Validation and test masks start empty.
    pub fn new(
        num_vertices: usize,
        num_classes: usize,
        edges: Vec<Edge>,
        features: Array2<Scalar>,
        labels: Vec<ClassLabel>,
        train_mask: Vec<bool>,
    ) -> Result<Self> {
        let data = GraphData {
            num_vertices,
            num_classes,
            edges,
            features,
            labels,
            train_mask,
            val_mask: vec![false; num_vertices],
            test_mask: vec![false; num_vertices],
        };
        data.validate()?;
        Ok(data)
    }

    /// Replace the validation and test masks.
    pub fn with_eval_masks(mut self, val_mask: Vec<bool>, test_mask: Vec<bool>) -> Result<Self> {
        self.val_mask = val_mask;
        self.test_mask = test_mask;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.num_vertices;
        if n == 0 {
            return Err(GcnError::dataset("graph has no vertices"));
        }
        crate::ensure_shape!("feature rows", n, self.features.nrows());
        crate::ensure_shape!("label count", n, self.labels.len());
        crate::ensure_shape!("train mask", n, self.train_mask.len());
        crate::ensure_shape!("validation mask", n, self.val_mask.len());
        crate::ensure_shape!("test mask", n, self.test_mask.len());

        if let Some(e) = self
            .edges
            .iter()
            .find(|e| e.src >= n as VertexId || e.dst >= n as VertexId)
        {
            return Err(GcnError::dataset(format!(
                "edge ({}, {}) references a vertex outside [0, {})",
                e.src, e.dst, n
            )));
        }
        if let Some(&label) = self
            .labels
            .iter()
            .find(|&&l| l < 0 || l >= self.num_classes as ClassLabel)
        {
            return Err(GcnError::dataset(format!(
                "label {} outside [0, {})",
                label, self.num_classes
            )));
        }
        Ok(())
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn features(&self) -> &Array2<Scalar> {
        &self.features
    }

    pub fn labels(&self) -> &[ClassLabel] {
        &self.labels
    }

    pub fn train_mask(&self) -> &[bool] {
        &self.train_mask
    }

    pub fn val_mask(&self) -> &[bool] {
        &self.val_mask
    }

    pub fn test_mask(&self) -> &[bool] {
        &self.test_mask
    }

    /// Replace the training mask.
    pub fn set_train_mask(&mut self, mask: Vec<bool>) -> Result<()> {
        crate::ensure_shape!("train mask", self.num_vertices, mask.len());
        self.train_mask = mask;
        Ok(())
    }

    /// Rows owned by `rank` under `partition`.
    pub fn shard(&self, partition: &VertexPartition, rank: Rank) -> Result<GraphShard> {
        crate::ensure_shape!("partition size", self.num_vertices, partition.num_vertices());
        if rank >= partition.num_parts() {
            return Err(GcnError::partition(format!(
                "rank {} outside a {}-way partition",
                rank,
                partition.num_parts()
            )));
        }
        let rows = partition.block_range(rank);
        Ok(GraphShard {
            features: self.features.slice(s![rows.clone(), ..]).to_owned(),
            labels: self.labels[rows.clone()].to_vec(),
            train_mask: self.train_mask[rows].to_vec(),
        })
    }
}

/// Edge list with exactly one self-loop per vertex.
///
/// Existing self-loops keep their weight (the last one wins when repeated);
/// vertices without one get a unit-weight loop. Loops are appended after the
/// non-loop edges in vertex order.
pub fn add_remaining_self_loops(edges: &[Edge], num_vertices: usize) -> Vec<Edge> {
    let mut loop_weight: Vec<Scalar> = vec![1.0; num_vertices];
    let mut out: Vec<Edge> = Vec::with_capacity(edges.len() + num_vertices);
    for edge in edges {
        if edge.src == edge.dst {
            if let Some(w) = usize::try_from(edge.src).ok().and_then(|v| loop_weight.get_mut(v)) {
                *w = edge.weight;
            }
        } else {
            out.push(*edge);
        }
    }
    out.extend(
        loop_weight
            .into_iter()
            .enumerate()
            .map(|(v, w)| Edge::weighted(v as VertexId, v as VertexId, w)),
    );
    out
}

/// `num_vertices × num_features` matrix of uniform `[0, 1)` values.
pub fn random_features(rng: &mut StdRng, num_vertices: usize, num_features: usize) -> Array2<Scalar> {
    Array2::from_shape_simple_fn((num_vertices, num_features), || rng.gen::<Scalar>())
}

/// Uniform labels in `[0, num_classes)`.
pub fn random_labels(rng: &mut StdRng, num_vertices: usize, num_classes: usize) -> Vec<ClassLabel> {
    (0..num_vertices)
        .map(|_| rng.gen_range(0..num_classes) as ClassLabel)
        .collect()
}

/// Each vertex is a training example with probability `fraction`.
pub fn random_train_mask(rng: &mut StdRng, num_vertices: usize, fraction: f64) -> Vec<bool> {
    if fraction >= 1.0 {
        return vec![true; num_vertices];
    }
    (0..num_vertices).map(|_| rng.gen_bool(fraction)).collect()
}

/// Load the graph selected by `graph_name`.
pub fn load(graph_name: &str, config: &DatasetConfig, seed: u64) -> Result<GraphData> {
    config.validate()?;
    let data = match graph_name {
        "cycle" => synthetic::cycle(config, seed)?,
        "random" => synthetic::random(config, seed)?,
        name => {
            let path = config.data_dir.join(format!("{}.csv", name));
            let edges = EdgeListLoader::new(EdgeListConfig::default()).load(&path)?;
            let num_vertices = edges
                .iter()
                .map(|e| e.src.max(e.dst) as usize + 1)
                .max()
                .unwrap_or(0);

            let mut rng = StdRng::seed_from_u64(seed);
            let features = random_features(&mut rng, num_vertices, config.num_features);
            let labels = random_labels(&mut rng, num_vertices, config.num_classes);
            GraphData::new(
                num_vertices,
                config.num_classes,
                edges,
                features,
                labels,
                vec![true; num_vertices],
            )?
        }
    };

    log::info!(
        "Loaded graph '{}': {} vertices, {} edges, {} features, {} classes",
        graph_name,
        data.num_vertices(),
        data.edges().len(),
        data.num_features(),
        data.num_classes()
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn tiny() -> GraphData {
        GraphData::new(
            3,
            2,
            vec![Edge::new(0, 1), Edge::new(1, 2), Edge::new(2, 2)],
            array![[1.0], [2.0], [3.0]],
            vec![0, 1, 1],
            vec![true, false, true],
        )
        .unwrap()
    }

    #[test]
    fn test_validation_rejects_bad_inputs() {
        let bad_edge = GraphData::new(2, 2, vec![Edge::new(0, 2)], Array2::zeros((2, 1)), vec![0, 1], vec![true; 2]);
        assert_eq!(bad_edge.unwrap_err().category(), "dataset");

        let bad_label = GraphData::new(2, 2, vec![], Array2::zeros((2, 1)), vec![0, 2], vec![true; 2]);
        assert!(bad_label.is_err());

        let bad_rows = GraphData::new(2, 2, vec![], Array2::zeros((3, 1)), vec![0, 1], vec![true; 2]);
        assert_eq!(bad_rows.unwrap_err().category(), "shape_mismatch");
    }

    #[test]
    fn test_shard_follows_partition() {
        let data = tiny();
        let partition = VertexPartition::new(3, 2).unwrap();
        let last = data.shard(&partition, 1).unwrap();
        assert_eq!(last.features, array![[3.0]]);
        assert_eq!(last.labels, vec![1]);
        assert_eq!(last.num_train(), 1);
        assert!(data.shard(&partition, 2).is_err());
    }

    #[test]
    fn test_remaining_self_loops() {
        let edges = vec![Edge::new(0, 1), Edge::weighted(1, 1, 0.5), Edge::new(1, 0)];
        let out = add_remaining_self_loops(&edges, 3);
        assert_eq!(
            out,
            vec![
                Edge::new(0, 1),
                Edge::new(1, 0),
                Edge::new(0, 0),
                Edge::weighted(1, 1, 0.5),
                Edge::new(2, 2),
            ]
        );
    }

    #[test]
    fn test_load_builtin_and_missing_file() {
        let config = DatasetConfig {
            num_vertices: 8,
            num_edges: 20,
            ..DatasetConfig::default()
        };
        assert_eq!(load("cycle", &config, 0).unwrap().num_vertices(), 8);
        assert_eq!(load("random", &config, 0).unwrap().edges().len(), 20);

        let missing = DatasetConfig {
            data_dir: PathBuf::from("/nonexistent/graphs"),
            ..config
        };
        assert!(load("nope", &missing, 0).is_err());
    }

    #[test]
    fn test_config_validation() {
        let config = DatasetConfig {
            train_fraction: 1.5,
            ..DatasetConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(DatasetConfig::default().validate().is_ok());
    }
}
