use std::sync::Mutex;

use tracing::debug;

use super::PlayerGate;

const SERVER_EVENT_MARKER: &str = "[Server Event]";
const SERVER_CHAT_MARKER: &str = "[Server Chat]";
const JOIN_SUFFIX: &str = "joins.";
const LEAVE_SUFFIX: &str = "left.";

#[derive(Debug, Default)]
struct Presence {
    online: u32,
    online_at_last_check: bool,
}

/// Tracks online players from server console lines.
///
/// Only lines with exactly one `[Server Event]` marker and no `[Server Chat]`
/// marker are trusted, so players cannot fake events by typing them in chat.
#[derive(Debug, Default)]
pub struct PlayerChecker {
    state: Mutex<Presence>,
}

enum Event {
    Join,
    Leave,
}

fn parse_event(line: &str) -> Option<Event> {
    if line.contains(SERVER_CHAT_MARKER) {
        return None;
    }
    if line.matches(SERVER_EVENT_MARKER).count() != 1 {
        return None;
    }
    let (_, rest) = line.split_once(SERVER_EVENT_MARKER)?;
    if rest.ends_with(JOIN_SUFFIX) {
        Some(Event::Join)
    } else if rest.ends_with(LEAVE_SUFFIX) {
        Some(Event::Leave)
    } else {
        None
    }
}

impl PlayerChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of server output.
    pub fn handle_output(&self, line: &str) {
        let Some(event) = parse_event(line) else {
            return;
        };
        let mut state = self.lock();
        match event {
            Event::Join => state.online += 1,
            Event::Leave => state.online = state.online.saturating_sub(1),
        }
        debug!(players = state.online, "player count changed");
    }

    pub fn player_count(&self) -> u32 {
        self.lock().online
    }

    pub fn players_online(&self) -> bool {
        self.player_count() > 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Presence> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlayerGate for PlayerChecker {
    fn should_backup(&self) -> bool {
        let mut state = self.lock();
        let online_now = state.online > 0;
        let online_before = state.online_at_last_check;
        state.online_at_last_check = online_now;
        online_now || online_before
    }
}
