//! Inbound request handlers
//!
//! Each handler is bound to one inbound topic. The messaging client spawns
//! a task per inbound envelope, so handlers may await store reads or nested
//! correlated sends. Replies carry the request's correlation id back.

mod descriptor;
mod lifecycle;
mod user;


pub use descriptor::DescriptorHandler;
pub use lifecycle::LifecycleHandler;
pub use user::{UserInfo, UserInfoHandler};

use crate::messaging::{Envelope, MessagingClient};
use crate::store::{ApplicationStore, UserStore};
use async_trait::async_trait;
use std::sync::Arc;

/// Handler for requests pushed to a well-known topic
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// Full topic address this handler is bound to
    fn topic(&self) -> &str;

    async fn handle(&self, client: &MessagingClient, envelope: Envelope) -> anyhow::Result<()>;
}

/// The handlers the bridge service registers
pub fn bridge_handlers(
    applications: Arc<dyn ApplicationStore>,
    users: Arc<dyn UserStore>,
) -> Vec<Arc<dyn InboundHandler>> {
    vec![
        Arc::new(DescriptorHandler::new(applications.clone())),
        Arc::new(UserInfoHandler::new(users)),
        Arc::new(LifecycleHandler::new(applications)),
    ]
}
