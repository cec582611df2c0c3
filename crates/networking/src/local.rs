//! In-process transport used by node integration tests and single-binary
//! simulations: every registered node's mailbox is a `tokio::mpsc` channel
//! held in a shared registry, mirroring the libp2p swarm-command channel the
//! networking crate this is adapted from uses to hand work to its transport
//! worker.

use crate::message::Message;
use crate::traits::{NetworkError, P2P};
use archethic_types::keys::PublicKey;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
pub struct LocalP2P {
    mailboxes: Arc<DashMap<PublicKey, mpsc::Sender<Message>>>,
}

impl LocalP2P {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` with a fresh mailbox of the given capacity, returning
    /// the receiving end for the caller's worker loop to drain.
    pub fn register(&self, node: PublicKey, capacity: usize) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity);
        self.mailboxes.insert(node, tx);
        rx
    }

    pub fn unregister(&self, node: &PublicKey) {
        self.mailboxes.remove(node);
    }
}

#[async_trait]
impl P2P for LocalP2P {
    async fn send_message(&self, to: &PublicKey, message: Message) -> Result<(), NetworkError> {
        let sender = self
            .mailboxes
            .get(to)
            .ok_or_else(|| NetworkError::UnknownNode(to.to_string()))?
            .clone();
        sender
            .send(message)
            .await
            .map_err(|_| NetworkError::MailboxClosed(to.to_string()))
    }

    fn authorized_nodes(&self) -> Vec<PublicKey> {
        self.mailboxes.iter().map(|e| e.key().clone()).collect()
    }

    fn available_nodes(&self) -> Vec<PublicKey> {
        self.authorized_nodes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> PublicKey {
        PublicKey::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn address(fill: u8) -> archethic_types::keys::Address {
        archethic_types::keys::Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    #[tokio::test]
    async fn send_routes_to_registered_mailbox() {
        let transport = LocalP2P::new();
        let node_b = key(2);
        let mut inbox = transport.register(node_b.clone(), 8);

        transport
            .send_message(
                &node_b,
                Message::Error {
                    address: address(1),
                    reason: "test".into(),
                    from: key(1),
                },
            )
            .await
            .unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received.from(), &key(1));
    }

    #[tokio::test]
    async fn send_to_unknown_node_is_an_error() {
        let transport = LocalP2P::new();
        let err = transport
            .send_message(
                &key(9),
                Message::Error {
                    address: address(1),
                    reason: "test".into(),
                    from: key(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::UnknownNode(_)));
    }

    #[tokio::test]
    async fn broadcast_continues_past_unknown_nodes() {
        let transport = LocalP2P::new();
        let node_b = key(2);
        let mut inbox = transport.register(node_b.clone(), 8);
        let err = transport
            .broadcast_message(
                &[key(9), node_b],
                Message::Error {
                    address: address(1),
                    reason: "test".into(),
                    from: key(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::UnknownNode(_)));
        assert!(inbox.recv().await.is_some());
    }
}
