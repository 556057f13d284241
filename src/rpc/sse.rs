//! Server-sent events multiplexer: bounded per-client channels, ring
//! buffer replay, heartbeats, and event-type filters.

use crate::metrics::Metrics;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
pub struct SseEvent {
    pub id: Option<u64>,
    pub event_type: Option<String>,
    pub data: serde_json::Value,
    pub retry: Option<u64>,
}

impl SseEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: None,
            event_type: Some(event_type.into()),
            data,
            retry: None,
        }
    }

    /// Render into standard SSE wire framing.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        if let Some(id) = self.id {
            out.push_str(&format!("id: {id}\n"));
        }
        if let Some(ref event_type) = self.event_type {
            out.push_str(&format!("event: {event_type}\n"));
        }
        if let Some(retry) = self.retry {
            out.push_str(&format!("retry: {retry}\n"));
        }
        out.push_str(&format!("data: {}\n\n", self.data));
        out
    }
}

struct Client {
    sender: mpsc::Sender<SseEvent>,
    filter: Option<Vec<String>>,
}

pub struct SseMultiplexer {
    clients: RwLock<HashMap<u64, Client>>,
    history: RwLock<VecDeque<SseEvent>>,
    next_client_id: AtomicU64,
    next_event_id: AtomicU64,
    max_clients: usize,
    history_size: usize,
    buffer_size: usize,
    metrics: Arc<Metrics>,
}

impl SseMultiplexer {
    pub fn new(max_clients: usize, history_size: usize, buffer_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(history_size)),
            next_client_id: AtomicU64::new(1),
            next_event_id: AtomicU64::new(1),
            max_clients,
            history_size,
            buffer_size,
            metrics,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// Registers a new client, replaying recent history through its
    /// filter. Returns `None` when the server is at capacity.
    pub fn register(&self, filter: Option<Vec<String>>) -> Option<(u64, mpsc::Receiver<SseEvent>)> {
        let mut clients = self.clients.write().unwrap();
        if clients.len() >= self.max_clients {
            return None;
        }
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.buffer_size);

        for event in self.history.read().unwrap().iter() {
            if matches_filter(event, &filter) {
                let _ = tx.try_send(event.clone());
            }
        }

        clients.insert(id, Client { sender: tx, filter });
        self.metrics.inc_sse_clients_connected();
        Some((id, rx))
    }

    pub fn unregister(&self, client_id: u64) {
        self.clients.write().unwrap().remove(&client_id);
    }

    /// Broadcasts to every registered client matching its filter. A
    /// client whose channel is full is evicted rather than blocked.
    pub fn broadcast(&self, mut event: SseEvent) {
        event.id = Some(self.next_event_id.fetch_add(1, Ordering::SeqCst));

        {
            let mut history = self.history.write().unwrap();
            if history.len() >= self.history_size {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let mut evicted = Vec::new();
        {
            let clients = self.clients.read().unwrap();
            for (id, client) in clients.iter() {
                if !matches_filter(&event, &client.filter) {
                    continue;
                }
                if client.sender.try_send(event.clone()).is_err() {
                    evicted.push(*id);
                }
            }
        }
        if !evicted.is_empty() {
            let mut clients = self.clients.write().unwrap();
            for id in evicted {
                clients.remove(&id);
                self.metrics.inc_sse_clients_evicted();
            }
        }
    }

    /// Heartbeats bypass client filters entirely.
    pub fn broadcast_heartbeat(&self) {
        let event = SseEvent {
            id: None,
            event_type: Some("heartbeat".to_string()),
            data: serde_json::json!({"ts": chrono_now_rfc3339()}),
            retry: None,
        };
        let clients = self.clients.read().unwrap();
        for client in clients.values() {
            let _ = client.sender.try_send(event.clone());
        }
    }
}

fn chrono_now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn matches_filter(event: &SseEvent, filter: &Option<Vec<String>>) -> bool {
    match filter {
        None => true,
        Some(allowed) => match &event.event_type {
            Some(t) => allowed.iter().any(|a| a == t),
            None => false,
        },
    }
}
