//! # Watchtower Pipeline - Block and Checkpoint Processing
//!
//! Two ordered consumers sit between the gateway's event stream and the
//! aggregators:
//!
//! - [`BlockPipeline`]: per-height processing in strictly ascending order,
//!   behind a finality lag, with exactly-once semantics per process
//!   lifetime and a synchronous gap catch-up for restarts.
//! - [`CheckpointPipeline`]: per-epoch lookup of the injected checkpoint
//!   transaction and extraction of its BLS vote set, at most once per
//!   epoch per process lifetime.
//!
//! Observations flow to the aggregators through the outbound handler
//! ports; pipelines never know which aggregators sit behind them.

pub mod block;
pub mod checkpoint;
pub mod epoch;
pub mod error;
pub mod ports;

pub use block::{BlockPipeline, BlockPipelineConfig};
pub use checkpoint::CheckpointPipeline;
pub use epoch::EpochTracker;
pub use error::{PipelineError, PipelineResult};
pub use ports::{BlockObservationHandler, CheckpointObservationHandler};
