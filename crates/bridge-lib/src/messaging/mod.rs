//! Asynchronous messaging with the platform bus
//!
//! The [`MessagingClient`] owns one bus connection at a time, reconnects with
//! exponential backoff and correlates replies with the requests that caused
//! them. Transports plug in through [`Connector`]: STOMP for a real broker,
//! [`MemoryBroker`] for embedded runs and tests.

pub mod client;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod operations;
pub mod registry;
pub mod stomp;
pub mod topics;
pub mod transport;


pub use client::{
    ConnectionState, ConnectionStats, MessagingClient, MessagingClientBuilder, MessagingConfig,
};
pub use envelope::{error_body, reply_outcome, reply_status, Annotations, Envelope};
pub use error::MessagingError;
pub use memory::MemoryBroker;
pub use operations::{CloudDefinition, CloudCredentials, PolicyEntry, SshCredentials, UndeployReceipt};
pub use registry::{CorrelationRegistry, PendingReply};
pub use stomp::{StompConfig, StompConnector};
pub use transport::{Connection, Connector, TopicSender};
