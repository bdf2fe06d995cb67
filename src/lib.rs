// Tabletop Sync - plugin document synchronization and mapping layer

pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod migration;
pub mod observer;
pub mod session;
pub mod tree;
pub mod turn;

pub use codec::{decode, encode, CodecOptions};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use observer::{ObserverService, Subscription, SubscriptionId};
pub use session::Session;
pub use tree::{Element, MemoryTree, Node, NodeId, Scalar, TreeEvent, TreeStore};
