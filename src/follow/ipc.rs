//! Unix-domain-socket control plane for the follow-mode coordinator.
//! Frames are newline-delimited JSON-RPC 2.0 requests/responses reusing
//! [`crate::rpc::envelope`].

use super::coordinator::FollowCoordinator;
use crate::rpc::envelope::{RpcError, RpcRequest, RpcResponse, METHOD_NOT_FOUND};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub struct IpcServer {
    coordinator: Arc<FollowCoordinator>,
    socket_path: String,
    stop: Arc<AtomicBool>,
}

impl IpcServer {
    pub fn new(coordinator: Arc<FollowCoordinator>, socket_path: String) -> Self {
        Self {
            coordinator,
            socket_path,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Removes a stale socket left by a crashed instance after probing
    /// that nothing is actually listening on it, then binds fresh.
    pub async fn bind(&self) -> crate::error::Result<UnixListener> {
        let path = Path::new(&self.socket_path);
        if path.exists() {
            if tokio::time::timeout(Duration::from_millis(100), UnixStream::connect(path)).await.is_ok() {
                return Err(crate::error::RagentError::new(
                    crate::error::ErrorCategory::Unknown,
                    "ErrAnotherInstanceRunning: a live process is already listening on the control socket",
                ));
            }
            let _ = std::fs::remove_file(path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::RagentError::new(crate::error::ErrorCategory::FileRead, e.to_string()))?;
        }
        let listener = UnixListener::bind(path)
            .map_err(|e| crate::error::RagentError::new(crate::error::ErrorCategory::Unknown, format!("binding control socket: {e}")))?;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .map_err(|e| crate::error::RagentError::new(crate::error::ErrorCategory::FileRead, e.to_string()))?;
        Ok(listener)
    }

    /// Runs the accept loop until `stop()` is called, joining every
    /// spawned connection handler before returning.
    pub async fn serve(&self, listener: UnixListener) {
        let mut handlers = Vec::new();
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let accept = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
            let (stream, _addr) = match accept {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    tracing::warn!("control socket accept error: {e}");
                    continue;
                }
                Err(_) => continue,
            };
            let coordinator = self.coordinator.clone();
            let stop = self.stop.clone();
            handlers.push(tokio::spawn(async move {
                handle_connection(stream, coordinator, stop).await;
            }));
        }
        for h in handlers {
            let _ = h.await;
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

async fn handle_connection(stream: UnixStream, coordinator: Arc<FollowCoordinator>, stop: Arc<AtomicBool>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatch(&line, &coordinator, &stop);
        let mut payload = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
        payload.push('\n');
        if writer.write_all(payload.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn dispatch(raw: &str, coordinator: &Arc<FollowCoordinator>, stop: &Arc<AtomicBool>) -> RpcResponse {
    let request = match RpcRequest::parse(raw) {
        Ok(r) => r,
        Err(e) => return RpcResponse::parse_failure(e),
    };

    match request.method.as_str() {
        "status.get" => {
            let status = coordinator.status();
            RpcResponse::success(request.id, serde_json::to_value(status).unwrap_or(serde_json::Value::Null))
        }
        "progress.get" => {
            let progress = coordinator.progress();
            RpcResponse::success(request.id, serde_json::to_value(progress).unwrap_or(serde_json::Value::Null))
        }
        "control.stop" => {
            stop.store(true, Ordering::SeqCst);
            RpcResponse::success(
                request.id,
                serde_json::json!({ "acknowledged": true, "message": "shutdown requested" }),
            )
        }
        other => RpcResponse::failure(request.id, RpcError::new(METHOD_NOT_FOUND, format!("unknown method: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::{FakeEmbeddingClient, FakeSearchIndex, FakeVectorStore};
    use crate::backend::{Scanner, ScannedItem};
    use crate::config::{FollowModeConfig, PipelineConfig};
    use crate::pipeline::{FingerprintStore, VectorizePipeline};

    struct EmptyScanner;

    #[async_trait::async_trait]
    impl Scanner for EmptyScanner {
        async fn scan(&self) -> crate::error::Result<Vec<ScannedItem>> {
            Ok(vec![])
        }
    }

    fn test_coordinator() -> Arc<FollowCoordinator> {
        let pipeline = Arc::new(VectorizePipeline {
            scanner: Arc::new(EmptyScanner),
            embedder: Arc::new(FakeEmbeddingClient { dimension: 4 }),
            vector_store: Arc::new(FakeVectorStore::default()),
            search_index: Arc::new(FakeSearchIndex::default()),
            fingerprints: Arc::new(FingerprintStore::in_memory().unwrap()),
            config: PipelineConfig {
                concurrency: 1,
                max_tokens: 7000,
                chunk_overlap_tokens: 200,
                retry_max_attempts: 1,
                retry_base_delay: Duration::from_millis(1),
                retry_max_delay: Duration::from_millis(5),
            },
            metrics: Arc::new(crate::metrics::Metrics::new()),
        });
        Arc::new(FollowCoordinator::new(
            pipeline,
            FollowModeConfig {
                interval: Duration::from_secs(1800),
                min_interval: Duration::from_secs(300),
                pid_file_dir: "/tmp".to_string(),
                socket_path: "/tmp/ragent-ipc-test.sock".to_string(),
            },
        ))
    }

    #[test]
    fn unknown_method_returns_method_not_found() {
        let coordinator = test_coordinator();
        let stop = Arc::new(AtomicBool::new(false));
        let response = dispatch(r#"{"jsonrpc":"2.0","id":1,"method":"nope"}"#, &coordinator, &stop);
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn malformed_json_returns_parse_failure() {
        let coordinator = test_coordinator();
        let stop = Arc::new(AtomicBool::new(false));
        let response = dispatch("not json", &coordinator, &stop);
        assert!(response.error.is_some());
    }

    #[test]
    fn control_stop_sets_the_flag() {
        let coordinator = test_coordinator();
        let stop = Arc::new(AtomicBool::new(false));
        let response = dispatch(r#"{"jsonrpc":"2.0","id":1,"method":"control.stop"}"#, &coordinator, &stop);
        assert!(response.result.is_some());
        assert!(stop.load(Ordering::SeqCst));
    }

    #[test]
    fn status_get_reports_idle_before_any_tick() {
        let coordinator = test_coordinator();
        let stop = Arc::new(AtomicBool::new(false));
        let response = dispatch(r#"{"jsonrpc":"2.0","id":1,"method":"status.get"}"#, &coordinator, &stop);
        let result = response.result.unwrap();
        assert_eq!(result["state"], "idle");
    }

    #[tokio::test]
    async fn bind_succeeds_and_removes_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("control.sock").to_string_lossy().to_string();
        std::fs::write(&socket_path, b"stale").unwrap();

        let coordinator = test_coordinator();
        let server = IpcServer::new(coordinator, socket_path);
        let listener = server.bind().await.unwrap();
        drop(listener);
    }
}
