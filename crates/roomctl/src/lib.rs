use std::io::Write;

use session::directory::{self, RoomInfo};
use session::leaderboard::{self, LeaderboardEntry};

pub const DEFAULT_URL: &str = "http://127.0.0.1:8090";

#[derive(Debug, Clone)]
pub struct CommonOptions {
    pub url: String,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
        }
    }
}

pub enum CommandKind {
    Rooms,
    Top,
}

/// Runs one subcommand. A dead or unreachable service is not a CLI failure;
/// the classified message goes to `out` and the exit code stays 0.
pub fn run(kind: CommandKind, options: CommonOptions, out: &mut dyn Write) -> Result<(), String> {
    match kind {
        CommandKind::Rooms => match directory::fetch_rooms(&options.url) {
            Ok(rooms) => write_output(out, &render_rooms_table(&rooms)),
            Err(error) => write_output(out, &format!("room directory unreachable: {error}")),
        },
        CommandKind::Top => match leaderboard::fetch_top(&options.url) {
            Ok(entries) => write_output(out, &render_top_table(&entries)),
            Err(error) => write_output(out, &format!("leaderboard unreachable: {error}")),
        },
    }
}

fn write_output(out: &mut dyn Write, text: &str) -> Result<(), String> {
    writeln!(out, "{text}").map_err(|error| format!("write output: {error}"))
}

pub fn render_rooms_table(rooms: &[RoomInfo]) -> String {
    if rooms.is_empty() {
        return "no rooms open".to_string();
    }
    let mut lines = vec![format!(
        "{:<24} {:<24} {:>7}",
        "ROOM", "NAME", "PLAYERS"
    )];
    for room in rooms {
        lines.push(format!(
            "{:<24} {:<24} {:>3}/{}",
            room.id, room.name, room.players, room.max_players
        ));
    }
    lines.join("\n")
}

pub fn render_top_table(entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "no scores yet".to_string();
    }
    let mut lines = vec![format!(
        "{:>4} {:<20} {:>9} {:>7} {:>5} {:<12}",
        "#", "NAME", "DISTANCE", "TIME", "DIFF", "DATE"
    )];
    for (rank, entry) in entries.iter().enumerate() {
        lines.push(format!(
            "{:>4} {:<20} {:>9} {:>6}s {:>5} {:<12}",
            rank + 1,
            entry.name,
            entry.distance,
            entry.time,
            entry.difficulty,
            entry.date
        ));
    }
    lines.join("\n")
}
