//! Room directory client.
//!
//! The directory is an external registry: `POST /rooms` upserts a heartbeat
//! entry, `GET /rooms` lists live rooms. Staleness eviction is the server's
//! job. Every failure here is non-fatal; a room that cannot publish keeps
//! playing and tries again on the next scheduled heartbeat.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Heartbeat cadence, in 60 Hz ticks.
pub const HEARTBEAT_INTERVAL_TICKS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub players: usize,
    pub max_players: usize,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to start http runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("directory request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Blocking one-shot request driver. Built per call the way short-lived
/// launcher checks do it; all calls run on the worker thread, never the
/// simulation loop.
fn block_on<F, T>(future: F) -> Result<T, DirectoryError>
where
    F: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DirectoryError::Runtime)?;
    runtime.block_on(future).map_err(DirectoryError::from)
}

pub fn fetch_rooms(base_url: &str) -> Result<Vec<RoomInfo>, DirectoryError> {
    let url = format!("{}/rooms", base_url.trim_end_matches('/'));
    block_on(async move {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RoomInfo>>()
            .await
    })
}

pub fn publish_room(base_url: &str, room: &RoomInfo) -> Result<(), DirectoryError> {
    let url = format!("{}/rooms", base_url.trim_end_matches('/'));
    let body = room.clone();
    block_on(async move {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    })
}

enum WorkerCommand {
    Publish(RoomInfo),
    Shutdown,
}

/// Fire-and-forget heartbeat publisher. The game loop hands it a `RoomInfo`
/// every heartbeat interval; failures are logged on the worker and simply
/// wait for the next beat.
pub struct HeartbeatWorker {
    sender: mpsc::Sender<WorkerCommand>,
    handle: Option<thread::JoinHandle<()>>,
}

impl HeartbeatWorker {
    pub fn spawn(base_url: &str) -> Self {
        let (sender, receiver) = mpsc::channel();
        let url = base_url.to_string();
        let handle = thread::Builder::new()
            .name("room-heartbeat".to_string())
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    match command {
                        WorkerCommand::Publish(room) => {
                            match publish_room(&url, &room) {
                                Ok(()) => debug!(room = %room.id, "room_published"),
                                Err(error) => {
                                    warn!(%error, room = %room.id, "room_publish_failed")
                                }
                            }
                        }
                        WorkerCommand::Shutdown => break,
                    }
                }
            })
            .ok();
        if handle.is_none() {
            warn!("heartbeat_worker_spawn_failed");
        }
        Self { sender, handle }
    }

    pub fn publish(&self, room: RoomInfo) {
        // A dead worker just drops the beat; the next one retries.
        let _ = self.sender.send(WorkerCommand::Publish(room));
    }
}

impl Drop for HeartbeatWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_info_wire_shape() {
        let room = RoomInfo {
            id: "127.0.0.1:4600".into(),
            name: "alice's run".into(),
            players: 2,
            max_players: 4,
        };
        let json = serde_json::to_string(&room).expect("serialize");
        assert!(json.contains(r#""maxPlayers":4"#));
        let back: RoomInfo = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, room);
    }

    #[test]
    fn fetch_against_dead_endpoint_is_an_error_not_a_panic() {
        let result = fetch_rooms("http://127.0.0.1:1");
        assert!(result.is_err());
    }

    #[test]
    fn heartbeat_worker_swallows_failures() {
        let worker = HeartbeatWorker::spawn("http://127.0.0.1:1");
        worker.publish(RoomInfo {
            id: "x".into(),
            name: "x".into(),
            players: 1,
            max_players: 4,
        });
        // Dropping joins the worker; a failed publish must not poison it.
        drop(worker);
    }
}
