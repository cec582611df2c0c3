//! Trait definitions for peer-to-peer transport.

use crate::message::Message;
use archethic_types::keys::PublicKey;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("no route to node {0}")]
    UnknownNode(String),
    #[error("peer mailbox closed for node {0}")]
    MailboxClosed(String),
}

/// A pluggable transport for the mining protocol. Implementations route
/// [`Message`]s to the worker handling their `address()` on the destination
/// node; this crate does not assume libp2p, gRPC, or any specific transport.
#[async_trait]
pub trait P2P: Send + Sync {
    /// Sends `message` to a single node.
    async fn send_message(&self, to: &PublicKey, message: Message) -> Result<(), NetworkError>;

    /// Sends `message` to every node in `to`, continuing past individual
    /// failures and returning the first error encountered, if any.
    async fn broadcast_message(&self, to: &[PublicKey], message: Message) -> Result<(), NetworkError> {
        let mut first_err = None;
        for node in to {
            if let Err(e) = self.send_message(node, message.clone()).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Nodes currently part of the authorized network membership.
    fn authorized_nodes(&self) -> Vec<PublicKey>;

    /// The subset of [`P2P::authorized_nodes`] currently reachable.
    fn available_nodes(&self) -> Vec<PublicKey>;

    /// `available_nodes()` minus the local node's own key.
    fn distinct_nodes(&self, local: &PublicKey) -> Vec<PublicKey> {
        self.available_nodes()
            .into_iter()
            .filter(|k| k != local)
            .collect()
    }
}
