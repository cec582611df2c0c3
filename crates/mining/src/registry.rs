//! Process-wide map from transaction address to the mailbox of the
//! `MiningWorker` handling it, so incoming P2P messages can be routed without
//! the sender knowing which task owns a given transaction.

use archethic_networking::Message;
use archethic_types::keys::Address;
use dashmap::DashMap;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct WorkflowRegistry {
    workers: DashMap<Address, mpsc::Sender<Message>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: Address, mailbox: mpsc::Sender<Message>) {
        self.workers.insert(address, mailbox);
    }

    pub fn unregister(&self, address: &Address) {
        self.workers.remove(address);
    }

    /// Routes `message` to the worker handling its address, if one is
    /// currently registered. A missing worker (already stopped, or not yet
    /// spawned) is not an error: the message is simply dropped.
    pub async fn dispatch(&self, message: Message) {
        let address = message.address().clone();
        let sender = self.workers.get(&address).map(|e| e.clone());
        match sender {
            Some(sender) => {
                if sender.send(message).await.is_err() {
                    tracing::debug!(target: "mining", %address, "worker mailbox closed, dropping message");
                    self.unregister(&address);
                }
            }
            None => {
                tracing::debug!(target: "mining", %address, "no worker registered for address, dropping message");
            }
        }
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.workers.contains_key(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archethic_types::keys::PublicKey;

    fn address(fill: u8) -> Address {
        Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn key(fill: u8) -> PublicKey {
        PublicKey::new(0, 0, vec![fill; 32]).unwrap()
    }

    #[tokio::test]
    async fn dispatch_routes_to_registered_worker() {
        let registry = WorkflowRegistry::new();
        let addr = address(0x01);
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(addr.clone(), tx);

        registry
            .dispatch(Message::Error {
                address: addr.clone(),
                reason: "test".into(),
                from: key(1),
            })
            .await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.address(), &addr);
    }

    #[tokio::test]
    async fn dispatch_drops_messages_for_unknown_address() {
        let registry = WorkflowRegistry::new();
        registry
            .dispatch(Message::Error {
                address: address(0x02),
                reason: "test".into(),
                from: key(1),
            })
            .await;
        assert!(!registry.is_registered(&address(0x02)));
    }
}
