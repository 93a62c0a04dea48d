#![allow(dead_code)]

//! A file-backed stand-in for the middleware, shared by the integration tests.
//!
//! Each topic maps to two append-only files in a temp directory: one carries
//! messages from the command to the node, the other from the node to the
//! command. Every line is `<reliability> <durability> <data>`, and both sides
//! only accept a line when the reader's QoS is compatible with the writer's.

use parking_lot::Mutex;
use qos_conformance::node::{EndpointId, MessageCallback, NodeError, StringMessage, TopicNode};
use qos_conformance::{is_compatible, Durability, HarnessConfig, QosProfile, Reliability};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tempfile::TempDir;

pub const FAKE_IMPLEMENTATION: &str = "rmw_filebus_cpp";
pub const BUS_ENV: &str = "FAKE_BUS_DIR";
/// Where the fake `daemon start` records the pid of the background daemon it forks.
pub const DAEMON_PID_ENV: &str = "FAKE_DAEMON_PID_FILE";
/// Makes the fake `topic` commands ignore SIGINT.
pub const IGNORE_INT_ENV: &str = "FAKE_IGNORE_INT";
/// Makes the fake echo print everything regardless of QoS.
pub const IGNORE_QOS_ENV: &str = "FAKE_IGNORE_QOS";

const FAKE_CLI: &str = r#"#!/bin/sh
# `topic pub|echo` and `daemon stop|start` over the file bus in $FAKE_BUS_DIR
bus="${FAKE_BUS_DIR:?}"
if [ "$1" = "daemon" ]; then
  if [ "$2" = "start" ] && [ -n "${FAKE_DAEMON_PID_FILE:-}" ]; then
    sleep 60 </dev/null >/dev/null 2>&1 &
    echo $! > "$FAKE_DAEMON_PID_FILE"
  fi
  echo "The daemon has been ${2}ed"
  exit 0
fi
shift
verb="$1"
shift
rel=reliable
dur=volatile
while [ $# -gt 0 ]; do
  case "$1" in
    --qos-reliability) rel="$2"; shift 2 ;;
    --qos-durability) dur="$2"; shift 2 ;;
    *) break ;;
  esac
done
topic="$1"
name=$(printf '%s' "$topic" | tr '/' '_')
rank() {
  case "$1" in
    reliable|transient_local) echo 1 ;;
    *) echo 0 ;;
  esac
}
[ -n "${FAKE_IGNORE_INT:-}" ] && trap '' INT
echo "[${RMW_IMPLEMENTATION}] participant created"
case "$verb" in
  pub)
    data="${3#data: }"
    echo "publisher: beginning loop"
    n=1
    while true; do
      echo "$rel $dur $data" >> "$bus/$name.to_node"
      echo "publishing #$n: data: $data"
      n=$((n + 1))
      sleep 0.2
    done
    ;;
  echo)
    file="$bus/$name.to_cli"
    touch "$file"
    tail -n 0 -f "$file" | while read -r prel pdur pdata; do
      if [ -n "${FAKE_IGNORE_QOS:-}" ] || { [ "$(rank "$rel")" -le "$(rank "$prel")" ] && [ "$(rank "$dur")" -le "$(rank "$pdur")" ]; }; then
        echo "data: $pdata"
        echo "---"
      fi
    done
    ;;
esac
"#;

/// Temp directory holding the bus files and the fake command.
pub struct Bus {
    dir: TempDir,
    cli: PathBuf,
}

impl Bus {
    pub fn new() -> Self {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let cli = dir.path().join("fake-ros2");
        std::fs::write(&cli, FAKE_CLI).expect("write fake cli");
        std::fs::set_permissions(&cli, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake cli");
        Self { dir, cli }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn cli(&self) -> &Path {
        &self.cli
    }

    /// Short timings so a full scenario takes a few seconds at most.
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig::default()
            .with_cli(self.cli.display().to_string())
            .with_implementations(vec![FAKE_IMPLEMENTATION.to_owned()])
            .with_env(BUS_ENV, self.path().display().to_string())
            .with_message_timeout(Duration::from_secs(3))
            .with_echo_window(Duration::from_millis(1500))
            .with_shutdown_timeout(Duration::from_secs(3))
            .with_publish_period(Duration::from_millis(200))
            .with_retry_attempts(3)
            .with_restart_daemon(false)
    }

    pub fn node(&self) -> Arc<FileBusNode> {
        Arc::new(FileBusNode::new(self.path(), false))
    }

    /// A node that ignores QoS and delivers everything.
    pub fn leaky_node(&self) -> Arc<FileBusNode> {
        Arc::new(FileBusNode::new(self.path(), true))
    }
}

fn topic_file(bus: &Path, topic: &str, direction: &str) -> PathBuf {
    bus.join(format!("{}.{direction}", topic.replace('/', "_")))
}

fn parse_line(line: &str) -> Option<(QosProfile, String)> {
    let mut parts = line.splitn(3, ' ');
    let reliability: Reliability = parts.next()?.parse().ok()?;
    let durability: Durability = parts.next()?.parse().ok()?;
    let data = parts.next()?.to_owned();
    let qos = QosProfile::with_raw_depth(reliability, durability, 10).ok()?;
    Some((qos, data))
}

struct SubscriptionWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SubscriptionWorker {
    fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub struct FileBusNode {
    bus: PathBuf,
    leaky: bool,
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<EndpointId, SubscriptionWorker>>,
    publishers: Mutex<HashMap<EndpointId, (PathBuf, QosProfile)>>,
    created: AtomicU64,
}

impl FileBusNode {
    pub fn new(bus: &Path, leaky: bool) -> Self {
        Self {
            bus: bus.to_path_buf(),
            leaky,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
            publishers: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
        }
    }

    /// Endpoints created and not yet destroyed.
    pub fn live_endpoints(&self) -> usize {
        self.subscriptions.lock().len() + self.publishers.lock().len()
    }

    pub fn created_endpoints(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    fn next(&self) -> EndpointId {
        self.created.fetch_add(1, Ordering::Relaxed);
        EndpointId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl TopicNode for FileBusNode {
    fn node_name(&self) -> &str {
        "cli_echo_pub_test_node"
    }

    fn create_subscription(
        &self,
        topic: &str,
        qos: QosProfile,
        callback: MessageCallback,
    ) -> Result<EndpointId, NodeError> {
        let path = topic_file(&self.bus, topic, "to_node");
        let stop = Arc::new(AtomicBool::new(false));
        let leaky = self.leaky;
        // only lines written after the subscription exists are seen
        let mut offset = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let thread = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut pending = String::new();
                while !stop.load(Ordering::Acquire) {
                    if let Ok(mut file) = File::open(&path) {
                        let mut chunk = String::new();
                        if file.seek(SeekFrom::Start(offset)).is_ok() {
                            if let Ok(n) = file.read_to_string(&mut chunk) {
                                offset += n as u64;
                                pending.push_str(&chunk);
                            }
                        }
                    }
                    while let Some(pos) = pending.find('\n') {
                        let line: String = pending.drain(..=pos).collect();
                        if let Some((writer_qos, data)) = parse_line(line.trim_end()) {
                            if leaky || is_compatible(&qos, &writer_qos) {
                                callback(StringMessage::new(data));
                            }
                        }
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            })
        };

        let id = self.next();
        self.subscriptions.lock().insert(
            id,
            SubscriptionWorker {
                stop,
                thread: Some(thread),
            },
        );
        Ok(id)
    }

    fn create_publisher(&self, topic: &str, qos: QosProfile) -> Result<EndpointId, NodeError> {
        let id = self.next();
        self.publishers
            .lock()
            .insert(id, (topic_file(&self.bus, topic, "to_cli"), qos));
        Ok(id)
    }

    fn publish(&self, publisher: EndpointId, message: &StringMessage) -> Result<(), NodeError> {
        let (path, qos) = self
            .publishers
            .lock()
            .get(&publisher)
            .cloned()
            .ok_or(NodeError::NotAPublisher(publisher))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| NodeError::PublishFailed(e.to_string()))?;
        writeln!(
            file,
            "{} {} {}",
            qos.reliability(),
            qos.durability(),
            message.data
        )
        .map_err(|e| NodeError::PublishFailed(e.to_string()))
    }

    fn destroy(&self, endpoint: EndpointId) -> Result<(), NodeError> {
        let worker = self.subscriptions.lock().remove(&endpoint);
        if let Some(worker) = worker {
            worker.stop();
            return Ok(());
        }
        if self.publishers.lock().remove(&endpoint).is_some() {
            return Ok(());
        }
        Err(NodeError::UnknownEndpoint(endpoint))
    }
}
