//! In-memory broker engine: topics split into append-only partition logs,
//! per consumer group cursors, and cancellable live delivery streams.
//!
//! Every call takes a [`CancellationToken`] as its context. Delivery streams
//! stop promptly when that token or the engine's shutdown token fires.

pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
mod lock;
pub mod partition;
pub mod partitioner;
pub mod record;
pub mod stream;
pub mod subscription;
pub mod topic;

pub use config::{BrokerConfig, EngineConfig, TopicConfig};
pub use engine::{BrokerEngine, EngineStats, GroupPartitionOffset, Produced};
pub use error::{BrokerError, ErrorKind};
pub use record::{DeliveredRecord, ProducerRecord, Record};
pub use stream::{Completion, Delivery, DeliveryStream, StreamState};
pub use subscription::Subscription;
pub use topic::{PartitionInfo, TopicInfo};
pub use tokio_util::sync::CancellationToken;
