pub mod directory;
pub mod leaderboard;
pub mod manager;
pub mod protocol;
pub mod reconcile;
pub mod transport;

pub use directory::{HeartbeatWorker, RoomInfo, HEARTBEAT_INTERVAL_TICKS};
pub use leaderboard::LeaderboardEntry;
pub use manager::{ErrorKind, Role, SessionEvent, SessionManager};
pub use protocol::{Message, NetRate, RosterEntry, TrainSync};
pub use reconcile::{Phase, Reconciler};
pub use transport::{ConnId, MemoryHub, TcpTransport, Transport, TransportError, TransportEvent};
