use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{DownloadEngine, EngineError, EngineEvent, EngineEventSink, EngineRequest, EngineStatus};
use crate::domain::{EngineTaskId, TransferProgress};
use crate::utils::absolute_dir;

const RPC_TIMEOUT: Duration = Duration::from_secs(5);
const START_ATTEMPTS: u32 = 10;
const START_POLL: Duration = Duration::from_millis(300);
const MAX_POLL_FAILURES: u32 = 5;
const STATUS_KEYS: [&str; 5] = [
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "errorMessage",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aria2Config {
    pub rpc_url: String,
    pub secret: Option<String>,
    pub binary: PathBuf,
    pub download_dir: PathBuf,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:6800/jsonrpc".to_string(),
            secret: None,
            binary: PathBuf::from("aria2c"),
            download_dir: PathBuf::from("downloads"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    result: Option<Value>,
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
}

/// Thin JSON-RPC client, cloned into the status pollers.
#[derive(Clone)]
struct Aria2Rpc {
    http: Client,
    url: String,
    secret: Option<String>,
}

impl Aria2Rpc {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, EngineError> {
        let mut all_params = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            all_params.push(Value::String(format!("token:{}", secret)));
        }
        all_params.extend(params);

        let body = json!({
            "jsonrpc": "2.0",
            "id": "scd",
            "method": method,
            "params": all_params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    EngineError::Unreachable
                } else {
                    EngineError::Rpc(e.to_string())
                }
            })?;

        // aria2 reports RPC faults with a 4xx status and a JSON body.
        let reply: RpcReply = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidReply(e.to_string()))?;

        match (reply.result, reply.error) {
            (_, Some(fault)) => Err(EngineError::Rpc(format!(
                "{} (code {})",
                fault.message, fault.code
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(EngineError::InvalidReply("reply has no result".to_string())),
        }
    }

    async fn tell_status(&self, id: &EngineTaskId) -> Result<EngineEvent, EngineError> {
        let reply = self
            .call("aria2.tellStatus", vec![json!(id.0), json!(STATUS_KEYS)])
            .await?;
        parse_status(id, &reply)
    }
}

/// Map a `tellStatus` reply onto an engine event.
pub fn parse_status(id: &EngineTaskId, reply: &Value) -> Result<EngineEvent, EngineError> {
    let field = |name: &str| reply.get(name).and_then(Value::as_str);
    let number = |name: &str| field(name).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

    let status = match field("status") {
        Some("active") => EngineStatus::Active,
        Some("waiting") => EngineStatus::Waiting,
        Some("paused") => EngineStatus::Paused,
        Some("complete") => EngineStatus::Complete,
        Some("removed") => EngineStatus::Removed,
        Some("error") => EngineStatus::Error(
            field("errorMessage")
                .unwrap_or("download failed")
                .to_string(),
        ),
        other => {
            return Err(EngineError::InvalidReply(format!(
                "unknown status {:?}",
                other
            )))
        }
    };

    Ok(EngineEvent {
        id: id.clone(),
        status,
        progress: TransferProgress {
            completed: number("completedLength"),
            total: number("totalLength"),
            speed: number("downloadSpeed"),
        },
    })
}

/// Drives an aria2 daemon over JSON-RPC.
pub struct Aria2Engine {
    rpc: Aria2Rpc,
    config: Aria2Config,
    daemon: Mutex<Option<Child>>,
}

impl Aria2Engine {
    pub fn new(config: Aria2Config) -> Result<Self, EngineError> {
        let http = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Rpc(e.to_string()))?;

        Ok(Self {
            rpc: Aria2Rpc {
                http,
                url: config.rpc_url.clone(),
                secret: config.secret.clone(),
            },
            config,
            daemon: Mutex::new(None),
        })
    }

    /// Whether the daemon this engine launched is still alive.
    fn daemon_running(&self) -> bool {
        let Ok(mut daemon) = self.daemon.lock() else {
            return false;
        };
        match daemon.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!(%status, "previous aria2 daemon exited");
                *daemon = None;
                false
            }
            Some(Err(e)) => {
                warn!(error = %e, "could not query aria2 daemon");
                false
            }
            None => false,
        }
    }

    fn spawn_daemon(&self) -> bool {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("--enable-rpc")
            .arg("--rpc-listen-all=false")
            .arg(format!("--rpc-listen-port={}", self.rpc_port()))
            .arg(format!("--dir={}", absolute_dir(&self.config.download_dir).display()))
            .arg("--continue=true")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(secret) = &self.config.secret {
            command.arg(format!("--rpc-secret={}", secret));
        }

        match command.spawn() {
            Ok(child) => {
                if let Ok(mut daemon) = self.daemon.lock() {
                    *daemon = Some(child);
                }
                true
            }
            Err(e) => {
                warn!(binary = %self.config.binary.display(), error = %e, "failed to launch aria2");
                false
            }
        }
    }

    fn rpc_port(&self) -> u16 {
        url::Url::parse(&self.config.rpc_url)
            .ok()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(6800)
    }
}

async fn watch(rpc: Aria2Rpc, id: EngineTaskId, sink: EngineEventSink, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut last: Option<(EngineStatus, u64)> = None;
    let mut failures = 0;

    loop {
        ticker.tick().await;
        match rpc.tell_status(&id).await {
            Ok(event) => {
                failures = 0;
                let terminal = event.status.is_terminal();
                let snapshot = (event.status.clone(), event.progress.completed);
                if last.as_ref() != Some(&snapshot) {
                    last = Some(snapshot);
                    sink(event);
                }
                if terminal {
                    debug!(gid = %id, "stopped watching finished job");
                    break;
                }
            }
            Err(e) => {
                failures += 1;
                warn!(gid = %id, error = %e, failures, "status poll failed");
                if failures >= MAX_POLL_FAILURES {
                    sink(EngineEvent {
                        id: id.clone(),
                        status: EngineStatus::Error(format!("engine stopped responding: {}", e)),
                        progress: TransferProgress::default(),
                    });
                    break;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl DownloadEngine for Aria2Engine {
    async fn test_reachable(&self) -> bool {
        match self.rpc.call("aria2.getVersion", Vec::new()).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "aria2 not reachable");
                false
            }
        }
    }

    async fn start(&self) -> bool {
        // Replacing a live child would kill it along with its downloads.
        if self.daemon_running() {
            info!("aria2 daemon already running, waiting for it to answer");
        } else if !self.spawn_daemon() {
            return false;
        }

        for _ in 0..START_ATTEMPTS {
            tokio::time::sleep(START_POLL).await;
            if self.test_reachable().await {
                info!("aria2 daemon started");
                return true;
            }
        }
        warn!("aria2 daemon did not come up");
        false
    }

    async fn download(
        &self,
        request: EngineRequest,
        on_event: EngineEventSink,
    ) -> Result<EngineTaskId, EngineError> {
        let options = json!({
            "dir": absolute_dir(&request.directory).display().to_string(),
            "out": request.file_name,
        });
        let reply = self
            .rpc
            .call("aria2.addUri", vec![json!([request.uri]), options])
            .await?;
        let id = reply
            .as_str()
            .map(|gid| EngineTaskId(gid.to_string()))
            .ok_or_else(|| EngineError::InvalidReply(format!("expected gid, got {}", reply)))?;

        info!(
            gid = %id,
            file = %request.metadata.file_name,
            core = ?request.metadata.core_name,
            "aria2 accepted download"
        );

        if request.watch {
            tokio::spawn(watch(
                self.rpc.clone(),
                id.clone(),
                on_event,
                request.poll_interval,
            ));
        }
        Ok(id)
    }

    async fn pause(&self, id: &EngineTaskId) -> Result<(), EngineError> {
        self.rpc.call("aria2.pause", vec![json!(id.0)]).await.map(|_| ())
    }

    async fn resume(&self, id: &EngineTaskId) -> Result<(), EngineError> {
        self.rpc.call("aria2.unpause", vec![json!(id.0)]).await.map(|_| ())
    }

    async fn cancel(&self, id: &EngineTaskId) -> Result<(), EngineError> {
        self.rpc.call("aria2.remove", vec![json!(id.0)]).await.map(|_| ())
    }
}
