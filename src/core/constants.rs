//! Default configuration values and fixed numerical constants.

/// Default number of workers.
pub const DEFAULT_WORLD_SIZE: usize = 1;

/// Default number of accelerators per host used for `rank % n` device ids.
pub const DEFAULT_ACCELERATORS_PER_HOST: usize = 1;

/// Default optimizer learning rate.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Default seed for weight initialisation and synthetic data.
pub const DEFAULT_SEED: u64 = 0;

/// Adam first-moment decay.
pub const ADAM_BETA1: f32 = 0.9;

/// Adam second-moment decay.
pub const ADAM_BETA2: f32 = 0.999;

/// Adam denominator epsilon.
pub const ADAM_EPSILON: f32 = 1e-8;

/// Seconds a TCP rank keeps retrying to reach a lower-ranked peer.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;

/// Pause between TCP connection attempts, in milliseconds.
pub const CONNECT_RETRY_INTERVAL_MS: u64 = 50;

/// Largest TCP frame payload a receiver will allocate, in bytes.
pub const MAX_FRAME_BYTES: u64 = 1 << 32;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "DISTGCN_";

/// Default vertex count for built-in synthetic graphs.
pub const DEFAULT_NUM_VERTICES: usize = 1024;

/// Default feature width for built-in synthetic graphs.
pub const DEFAULT_NUM_FEATURES: usize = 16;

/// Default class count for built-in synthetic graphs.
pub const DEFAULT_NUM_CLASSES: usize = 4;

/// Default edge count for the `random` built-in graph.
pub const DEFAULT_NUM_EDGES: usize = 8192;

/// Default fraction of vertices flagged as training examples.
pub const DEFAULT_TRAIN_FRACTION: f64 = 1.0;
