// ─── Session Set ───
// The cached accounts and which one is selected, persisted as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::session::Session;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSet {
    #[serde(default)]
    available_sessions: Vec<Session>,
    /// Profile id of the selected session.
    #[serde(default)]
    selected: Option<String>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(None)` when nothing has been saved at `path` yet.
    pub async fn load(path: &Path) -> LauncherResult<Option<Self>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No session file at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(LauncherError::io(path, e)),
        };

        let mut set: SessionSet = serde_json::from_str(&raw)?;
        for session in &mut set.available_sessions {
            session.reset_state();
        }
        if let Some(id) = set.selected.clone() {
            if set.get_available(&id).is_none() {
                warn!("Selected profile {} is not cached, clearing selection", id);
                set.selected = None;
            }
        }
        info!(
            "Loaded {} cached session(s) from {:?}",
            set.available_sessions.len(),
            path
        );
        Ok(Some(set))
    }

    pub async fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let mut temp = path.as_os_str().to_owned();
        temp.push(".part");
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        tokio::fs::rename(&temp, path)
            .await
            .map_err(|e| LauncherError::io(path, e))
    }

    pub fn available(&self) -> &[Session] {
        &self.available_sessions
    }

    /// Add `session`, replacing any cached entry with the same profile id.
    pub fn add_available(&mut self, session: Session) {
        match self
            .available_sessions
            .iter_mut()
            .find(|s| s.profile_id == session.profile_id)
        {
            Some(existing) => *existing = session,
            None => self.available_sessions.push(session),
        }
    }

    /// Remove a cached session. Clears the selection if it pointed at it.
    pub fn remove_available(&mut self, profile_id: &str) -> Option<Session> {
        let pos = self
            .available_sessions
            .iter()
            .position(|s| s.profile_id == profile_id)?;
        if self.selected.as_deref() == Some(profile_id) {
            self.selected = None;
        }
        Some(self.available_sessions.remove(pos))
    }

    pub fn get_available(&self, profile_id: &str) -> Option<&Session> {
        self.available_sessions
            .iter()
            .find(|s| s.profile_id == profile_id)
    }

    pub fn get_available_mut(&mut self, profile_id: &str) -> Option<&mut Session> {
        self.available_sessions
            .iter_mut()
            .find(|s| s.profile_id == profile_id)
    }

    /// Select a cached session. Replaces any previous selection.
    pub fn set_selected(&mut self, profile_id: &str) -> LauncherResult<()> {
        if self.get_available(profile_id).is_none() {
            return Err(LauncherError::SessionNotFound(profile_id.to_string()));
        }
        self.selected = Some(profile_id.to_string());
        Ok(())
    }

    pub fn clear_selected(&mut self) {
        self.selected = None;
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_session(&self) -> Option<&Session> {
        self.get_available(self.selected.as_deref()?)
    }

    pub fn selected_session_mut(&mut self) -> Option<&mut Session> {
        let id = self.selected.clone()?;
        self.get_available_mut(&id)
    }

    /// Start-up override of the selection. Unknown ids are ignored.
    pub fn apply_profile_override(&mut self, profile_id: &str) {
        match self.set_selected(profile_id) {
            Ok(()) => info!("Selected profile {} from override", profile_id),
            Err(_) => warn!("Profile override {} is not cached, ignoring", profile_id),
        }
    }
}

/// Same members in any order and the same selection.
impl PartialEq for SessionSet {
    fn eq(&self, other: &Self) -> bool {
        self.selected == other.selected
            && self.available_sessions.len() == other.available_sessions.len()
            && self
                .available_sessions
                .iter()
                .all(|s| other.get_available(&s.profile_id) == Some(s))
    }
}

impl Eq for SessionSet {}
