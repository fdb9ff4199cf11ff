//! Minimal hook handler: counts events per session and keeps a short log.
//!
//! Run: HOOKSTATE_STORAGE=sqlite HOOKSTATE_PATH=/tmp/hooks.db \
//!      cargo run --example hook_counter --features logging -- session-1 PreToolUse

use hookstate_core::{StateConfig, StateStore};
use serde_json::json;

const LOG_LIMIT: usize = 20;

fn main() -> hookstate_core::StateResult<()> {
    hookstate_core::logging::init();

    let mut args = std::env::args().skip(1);
    let session_id = args.next().unwrap_or_else(|| "default".to_string());
    let event = args.next().unwrap_or_else(|| "Unknown".to_string());

    let store = StateStore::open(&StateConfig::from_env()?)?;
    let session = store.namespace(&session_id)?;

    let total = store.incr("events_total")?;
    let per_event = session.incr(&event)?;
    session.append("log", &json!({ "event": event, "n": per_event }))?;

    // keep the log bounded
    session.update("log", |log: Option<Vec<serde_json::Value>>| {
        let mut log = log.unwrap_or_default();
        let overflow = log.len().saturating_sub(LOG_LIMIT);
        log.drain(..overflow);
        log
    })?;

    println!("{event}: {per_event} in {session_id}, {total} overall");
    println!("session keys: {:?}", session.keys()?);

    store.close()
}
