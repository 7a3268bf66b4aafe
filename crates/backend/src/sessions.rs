// =============================================================================
// Riparian API - Sessions API
// =============================================================================
// Per-user cover edits. Each session owns an OverrideSet applied to a copy of
// the base table; sessions never see each other's edits. Sessions idle longer
// than the configured limit are dropped whenever a new one is created.
// =============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use riparian_geo::OverrideSet;

use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// Session Record
// =============================================================================

/// One user's edits plus the time they were last touched
#[derive(Debug, Clone)]
pub struct Session {
    pub overrides: OverrideSet,
    pub last_used: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            overrides: OverrideSet::new(),
            last_used: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.last_used = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop sessions not used since `now - idle`. Returns how many were dropped.
pub fn expire_idle(sessions: &mut HashMap<Uuid, Session>, idle: Duration, now: DateTime<Utc>) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| now - session.last_used <= idle);
    before - sessions.len()
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CoversResponse {
    pub session: Uuid,
    pub parcel_id: i64,
    /// Fields actually written; null and zero values are skipped
    pub written: usize,
    pub version: u64,
}

// =============================================================================
// Helpers
// =============================================================================

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Session {} not found", id))
}

/// Snapshot of a session's overrides. No session means no edits.
pub fn session_overrides(state: &AppState, session: Option<Uuid>) -> Result<OverrideSet, ApiError> {
    let Some(id) = session else {
        return Ok(OverrideSet::new());
    };
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
    session.touch();
    Ok(session.overrides.clone())
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/sessions
pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionResponse>) {
    let session = Uuid::new_v4();
    let idle = Duration::minutes(state.config.session_idle_minutes);

    let mut sessions = state.sessions.write();
    let expired = expire_idle(&mut sessions, idle, Utc::now());
    if expired > 0 {
        tracing::info!("Expired {} idle sessions", expired);
    }
    sessions.insert(session, Session::new());
    tracing::info!("Created session {} ({} active)", session, sessions.len());

    (StatusCode::CREATED, Json(SessionResponse { session }))
}

/// DELETE /api/sessions/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .write()
        .remove(&session)
        .ok_or_else(|| not_found(session))?;
    tracing::info!("Deleted session {}", session);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/sessions/:id/parcels/:fid/covers
pub async fn set_covers(
    State(state): State<AppState>,
    Path((session, parcel_id)): Path<(Uuid, i64)>,
    Json(body): Json<BTreeMap<String, Option<f64>>>,
) -> Result<Json<CoversResponse>, ApiError> {
    let pairs: Vec<(String, Option<f64>)> = body.into_iter().collect();

    let store = state.store.read();
    let mut sessions = state.sessions.write();
    let entry = sessions.get_mut(&session).ok_or_else(|| not_found(session))?;
    entry.touch();
    let written = entry
        .overrides
        .set(store.table(), &store.config().cover_marker, parcel_id, &pairs)?;

    Ok(Json(CoversResponse {
        session,
        parcel_id,
        written,
        version: entry.overrides.version(),
    }))
}

/// DELETE /api/sessions/:id/parcels/:fid/covers
pub async fn reset_covers(
    State(state): State<AppState>,
    Path((session, parcel_id)): Path<(Uuid, i64)>,
) -> Result<StatusCode, ApiError> {
    let mut sessions = state.sessions.write();
    let entry = sessions.get_mut(&session).ok_or_else(|| not_found(session))?;
    entry.touch();
    entry.overrides.reset_parcel(parcel_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_idle_keeps_recent_sessions() {
        let now = Utc::now();
        let mut sessions = HashMap::new();
        let fresh = Uuid::new_v4();
        let stale = Uuid::new_v4();
        sessions.insert(fresh, Session { overrides: OverrideSet::new(), last_used: now - Duration::minutes(5) });
        sessions.insert(stale, Session { overrides: OverrideSet::new(), last_used: now - Duration::minutes(90) });

        assert_eq!(expire_idle(&mut sessions, Duration::minutes(60), now), 1);
        assert!(sessions.contains_key(&fresh));
        assert!(!sessions.contains_key(&stale));
    }
}
