use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    /// How many query records the ring keeps.
    #[serde(default = "Config::default_capacity")]
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
        }
    }
}

impl Config {
    pub fn default_capacity() -> usize {
        1000
    }

    pub fn build(&self) -> StatsHandler {
        StatsHandler::new(self.capacity)
    }
}

/// One record per handled query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionLog {
    #[serde(serialize_with = "epoch_seconds")]
    pub timestamp: SystemTime,
    pub client: String,
    pub qname: String,
    pub qtype: String,
    pub rcode: u8,
    #[serde(serialize_with = "float_seconds")]
    pub querytime: Duration,
    pub acl: bool,
    pub blocked: bool,
    pub cached: bool,
    pub error: bool,
}

impl ConnectionLog {
    pub fn new(client: SocketAddr) -> Self {
        Self {
            timestamp: SystemTime::now(),
            client: client.to_string(),
            qname: String::new(),
            qtype: String::new(),
            rcode: 0,
            querytime: Duration::default(),
            acl: false,
            blocked: false,
            cached: false,
            error: false,
        }
    }
}

fn epoch_seconds<S: serde::Serializer>(
    value: &SystemTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let seconds = value
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    serializer.serialize_u64(seconds)
}

fn float_seconds<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f32(value.as_secs_f32())
}

type Hook<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    buffer: Vec<T>,
    capacity: usize,
    position: usize,
    hooks: Vec<(String, Hook<T>)>,
}

/// Fixed-capacity ring; once full the oldest item is overwritten. Hooks
/// run synchronously under the lock on every insert, so they must not
/// block.
pub struct CircularBuffer<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                buffer: Vec::with_capacity(capacity),
                capacity,
                position: 0,
                hooks: Vec::new(),
            }),
        }
    }

    pub fn insert(&self, item: T) {
        let mut inner = self.inner.lock().expect("stats lock");
        let position = inner.position;
        if inner.buffer.len() < inner.capacity {
            inner.buffer.push(item);
        } else {
            inner.buffer[position] = item;
        }
        inner.position = (position + 1) % inner.capacity;

        let stored = &inner.buffer[position];
        for (_, hook) in &inner.hooks {
            hook(stored);
        }
    }

    /// The `n` newest items, newest first.
    pub fn tail(&self, n: usize) -> Vec<T> {
        self.tail_between(n, None, None, None)
    }

    /// Walk newest to oldest: skip until `start` matches (when given),
    /// stop when `end` matches (exclusive), collect items matching
    /// `item`, up to `n`.
    pub fn tail_between(
        &self,
        n: usize,
        start: Option<&dyn Fn(&T) -> bool>,
        end: Option<&dyn Fn(&T) -> bool>,
        item: Option<&dyn Fn(&T) -> bool>,
    ) -> Vec<T> {
        let inner = self.inner.lock().expect("stats lock");
        let length = inner.buffer.len();
        let mut result = Vec::new();
        let mut started = start.is_none();

        for i in 0..length {
            if result.len() >= n {
                break;
            }
            let index = (inner.position + inner.capacity - 1 - i) % inner.capacity;
            let found = &inner.buffer[index];

            if !started {
                if let Some(predicate) = start {
                    if !predicate(found) {
                        continue;
                    }
                    started = true;
                }
            }
            if let Some(predicate) = end {
                if predicate(found) {
                    break;
                }
            }
            if item.map(|predicate| predicate(found)).unwrap_or(true) {
                result.push(found.clone());
            }
        }

        result
    }

    pub fn add_hook(&self, id: &str, hook: Hook<T>) {
        let mut inner = self.inner.lock().expect("stats lock");
        inner.hooks.retain(|(found, _)| found != id);
        inner.hooks.push((id.to_string(), hook));
    }

    pub fn delete_hook(&self, id: &str) {
        let mut inner = self.inner.lock().expect("stats lock");
        inner.hooks.retain(|(found, _)| found != id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("stats lock").buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Query telemetry: the ring of recent records plus push hooks for live
/// subscribers.
pub struct StatsHandler {
    connections: CircularBuffer<ConnectionLog>,
}

impl StatsHandler {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: CircularBuffer::new(capacity),
        }
    }

    pub fn insert(&self, record: ConnectionLog) {
        self.connections.insert(record);
    }

    pub fn tail(&self, n: usize) -> Vec<ConnectionLog> {
        self.connections.tail(n)
    }

    pub fn tail_between(
        &self,
        n: usize,
        start: Option<&dyn Fn(&ConnectionLog) -> bool>,
        end: Option<&dyn Fn(&ConnectionLog) -> bool>,
        item: Option<&dyn Fn(&ConnectionLog) -> bool>,
    ) -> Vec<ConnectionLog> {
        self.connections.tail_between(n, start, end, item)
    }

    /// Register a live subscriber: every record is serialized to JSON and
    /// pushed through a bounded channel. The hook runs under the ring's
    /// lock, so a full channel drops the record instead of blocking.
    pub fn log_channel(&self, id: &str, capacity: usize) -> crossbeam_channel::Receiver<String> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        self.connections.add_hook(
            id,
            Box::new(move |record| {
                if let Ok(payload) = serde_json::to_string(record) {
                    let _ = sender.try_send(payload);
                }
            }),
        );
        receiver
    }

    /// Delete the hook before closing the subscriber's channel.
    pub fn close_log_channel(&self, id: &str) {
        self.connections.delete_hook(id);
    }
}
