use crate::errors::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
        }
    }
}

/// Which side opened the handshake. A `pong` answers our startup `ping`
/// (debugger was already open); a `ping` means the debugger opened later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeSignal {
    Ping,
    Pong,
}

impl HandshakeSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// First handshake signal: caller must send `init` and flush the backlog.
    Connected,
    /// Redundant signal after the connection was already made.
    AlreadyConnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub state: ConnectionState,
    pub connected_via: Option<HandshakeSignal>,
    pub redundant_signals: u32,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connected_via: None,
            redundant_signals: 0,
        }
    }
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn transition(&mut self, next: ConnectionState) -> Result<(), BridgeError> {
        validate_transition(self.state, next)?;
        self.state = next;
        Ok(())
    }

    pub fn on_handshake(&mut self, signal: HandshakeSignal) -> HandshakeOutcome {
        if self.transition(ConnectionState::Connected).is_err() {
            self.redundant_signals = self.redundant_signals.saturating_add(1);
            return HandshakeOutcome::AlreadyConnected;
        }
        self.connected_via = Some(signal);
        HandshakeOutcome::Connected
    }
}

pub fn validate_transition(from: ConnectionState, to: ConnectionState) -> Result<(), BridgeError> {
    use ConnectionState as S;

    let allowed = matches!((from, to), (S::Disconnected, S::Connected));
    if !allowed {
        return Err(BridgeError::Protocol(format!(
            "illegal connection transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}
