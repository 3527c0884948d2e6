use crate::errors::BridgeError;
use crate::protocol::DebuggerSignal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Bidirectional link to the debugger. Outbound messages are serialized
/// envelopes; inbound messages are the text form of a [`DebuggerSignal`].
pub trait MessageChannel: Send + Sync {
    fn send(&self, message: &str) -> Result<(), BridgeError>;
    fn try_recv(&self) -> Option<String>;

    /// An outbound message that was dropped from the backlog and will never
    /// be sent.
    fn discarded(&self, _message: &str) {}
}

impl<T: MessageChannel + ?Sized> MessageChannel for Arc<T> {
    fn send(&self, message: &str) -> Result<(), BridgeError> {
        (**self).send(message)
    }

    fn try_recv(&self) -> Option<String> {
        (**self).try_recv()
    }

    fn discarded(&self, message: &str) {
        (**self).discarded(message)
    }
}

impl<T: MessageChannel + ?Sized> MessageChannel for Box<T> {
    fn send(&self, message: &str) -> Result<(), BridgeError> {
        (**self).send(message)
    }

    fn try_recv(&self) -> Option<String> {
        (**self).try_recv()
    }

    fn discarded(&self, message: &str) {
        (**self).discarded(message)
    }
}

/// In-memory channel for tests. Clones share the same buffers.
#[derive(Default, Clone)]
pub struct MemoryChannel {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: Arc<Mutex<VecDeque<String>>>,
    fail_next: Arc<Mutex<Option<BridgeError>>>,
}

impl MemoryChannel {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn push_signal(&self, signal: &DebuggerSignal) {
        self.push_raw(&signal.to_json());
    }

    pub fn push_raw(&self, raw: &str) {
        self.inbound
            .lock()
            .expect("inbound lock")
            .push_back(raw.to_string());
    }

    pub fn set_fail_next(&self, error: BridgeError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }
}

impl MessageChannel for MemoryChannel {
    fn send(&self, message: &str) -> Result<(), BridgeError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push(message.to_string());
        Ok(())
    }

    fn try_recv(&self) -> Option<String> {
        self.inbound.lock().expect("inbound lock").pop_front()
    }
}

/// Bridge side of an in-process link backed by tokio unbounded channels.
pub struct InProcessChannel {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
}

/// Debugger side of an in-process link.
pub struct DebuggerEndpoint {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
}

pub fn in_process() -> (InProcessChannel, DebuggerEndpoint) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        InProcessChannel {
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
        },
        DebuggerEndpoint {
            outbound: outbound_rx,
            inbound: inbound_tx,
        },
    )
}

impl MessageChannel for InProcessChannel {
    fn send(&self, message: &str) -> Result<(), BridgeError> {
        self.outbound
            .send(message.to_string())
            .map_err(|_| BridgeError::Channel("debugger endpoint dropped".to_string()))
    }

    fn try_recv(&self) -> Option<String> {
        self.inbound.lock().ok()?.try_recv().ok()
    }
}

impl DebuggerEndpoint {
    pub fn send_signal(&self, signal: &DebuggerSignal) -> Result<(), BridgeError> {
        self.inbound
            .send(signal.to_json())
            .map_err(|_| BridgeError::Channel("bridge channel dropped".to_string()))
    }

    /// Next message already delivered by the bridge, without waiting.
    pub fn try_next(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ExecutionId;

    #[test]
    fn in_process_link_moves_messages_both_ways() {
        let (bridge_side, mut debugger) = in_process();
        bridge_side.send("one").expect("send");
        bridge_side.send("two").expect("send");
        assert_eq!(debugger.drain(), vec!["one".to_string(), "two".to_string()]);

        debugger
            .send_signal(&DebuggerSignal::Remember(ExecutionId::from("e1")))
            .expect("signal");
        let raw = bridge_side.try_recv().expect("inbound");
        assert_eq!(
            DebuggerSignal::parse(&raw).expect("parse"),
            DebuggerSignal::Remember(ExecutionId::from("e1"))
        );
        assert!(bridge_side.try_recv().is_none());
    }

    #[test]
    fn send_fails_once_the_debugger_is_gone() {
        let (bridge_side, debugger) = in_process();
        drop(debugger);
        let err = bridge_side.send("lost").expect_err("closed");
        assert!(matches!(err, BridgeError::Channel(_)));
    }

    #[test]
    fn memory_channel_clones_share_buffers() {
        let channel = MemoryChannel::default();
        let boxed: Box<dyn MessageChannel> = Box::new(channel.clone());
        boxed.send("hello").expect("send");
        channel.push_signal(&DebuggerSignal::Ping);
        assert_eq!(channel.sent(), vec!["hello".to_string()]);
        assert_eq!(boxed.try_recv().as_deref(), Some(r#"{"type":"ping"}"#));
    }
}
