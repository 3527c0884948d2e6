use std::collections::VecDeque;

/// FIFO of serialized messages produced while no debugger is attached.
///
/// Unbounded unless `max_entries` is set; a bounded backlog evicts its
/// oldest entry to make room and counts the eviction.
#[derive(Debug, Clone, Default)]
pub struct Backlog {
    entries: VecDeque<String>,
    max_entries: Option<usize>,
    dropped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogDrain {
    pub messages: Vec<String>,
    pub dropped: u64,
}

impl Backlog {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
            dropped: 0,
        }
    }

    /// Queue a message. Returns the evicted message when the bound was hit.
    /// A bound of zero keeps nothing: the message itself is returned.
    pub fn push(&mut self, message: String) -> Option<String> {
        let evicted = match self.max_entries {
            Some(0) => {
                self.dropped = self.dropped.saturating_add(1);
                return Some(message);
            }
            Some(max) if self.entries.len() >= max => {
                self.dropped = self.dropped.saturating_add(1);
                self.entries.pop_front()
            }
            _ => None,
        };
        self.entries.push_back(message);
        evicted
    }

    /// Take every queued message in arrival order and reset the backlog.
    pub fn drain(&mut self) -> BacklogDrain {
        let drained = BacklogDrain {
            messages: self.entries.drain(..).collect(),
            dropped: self.dropped,
        };
        self.dropped = 0;
        drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
