//! Roster of connected sessions
//!
//! Each session owns two outbound lanes besides the shared broadcast queue:
//! a direct lane for replies and lifecycle announcements, and a snapshot
//! slot that only ever holds the latest entity snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use blockcast_protocol::{encode_line, EntityAction, Quaternion, ServerMessage, Xyz};

use crate::broadcast::ConnectionId;
use crate::core::Result;
use super::entity::Entity;

/// One serialized, newline-terminated outbound message
pub type Line = Arc<str>;

struct SessionEntry {
    entity: Entity,
    /// Display name used in chat; starts out equal to the entity id
    nick: String,
    direct: mpsc::UnboundedSender<Line>,
    snapshot: watch::Sender<Option<Line>>,
}

/// Receiving side of a session's lanes, owned by its outbound duty
pub struct SessionHandle {
    pub id: ConnectionId,
    pub name: String,
    pub direct: mpsc::UnboundedReceiver<Line>,
    pub snapshot: watch::Receiver<Option<Line>>,
}

/// All connected sessions, keyed by connection
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, SessionEntry>>,
    next_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an identity for a new connection
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a session and announce it.
    ///
    /// Every existing session is told to create the newcomer's entity; the
    /// newcomer gets a create action for each existing session.
    pub fn register(&self, id: ConnectionId) -> Result<SessionHandle> {
        let name = format!("user{}", id.get());
        let entity = Entity::new(name.clone());
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);

        let mut sessions = self.sessions.lock();

        let announce: Line = encode_line(&ServerMessage::entities(vec![EntityAction::create(
            entity.to_data(),
        )]))?
        .into();
        let mut existing = Vec::with_capacity(sessions.len());
        for other in sessions.values() {
            let _ = other.direct.send(announce.clone());
            existing.push(EntityAction::create(other.entity.to_data()));
        }
        let initial: Line = encode_line(&ServerMessage::entities(existing))?.into();
        let _ = direct_tx.send(initial);

        sessions.insert(
            id,
            SessionEntry {
                nick: name.clone(),
                entity,
                direct: direct_tx,
                snapshot: snapshot_tx,
            },
        );
        log::info!("Session {} registered as {} ({} online)", id, name, sessions.len());

        Ok(SessionHandle {
            id,
            name,
            direct: direct_rx,
            snapshot: snapshot_rx,
        })
    }

    /// Remove a session and tell everyone else to delete its entity
    pub fn remove(&self, id: ConnectionId) -> Option<Entity> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.remove(&id)?;

        match encode_line(&ServerMessage::entities(vec![EntityAction::delete(
            entry.entity.to_data(),
        )])) {
            Ok(line) => {
                let line: Line = line.into();
                for other in sessions.values() {
                    let _ = other.direct.send(line.clone());
                }
            }
            Err(e) => log::error!("Failed to encode delete for {}: {}", entry.entity.id, e),
        }

        log::info!("Session {} ({}) removed ({} online)", id, entry.entity.id, sessions.len());
        Some(entry.entity)
    }

    /// Record a session's reported transform
    pub fn update_transform(
        &self,
        id: ConnectionId,
        pos: Xyz<f32>,
        vel: Xyz<f32>,
        rot: Quaternion,
    ) -> bool {
        match self.sessions.lock().get_mut(&id) {
            Some(entry) => {
                entry.entity.set_transform(pos, vel, rot);
                true
            }
            None => false,
        }
    }

    /// Queue a line on one session's direct lane
    pub fn send_direct(&self, id: ConnectionId, line: Line) -> bool {
        match self.sessions.lock().get(&id) {
            Some(entry) => entry.direct.send(line).is_ok(),
            None => false,
        }
    }

    /// Chat name of a session
    pub fn name_of(&self, id: ConnectionId) -> Option<String> {
        self.sessions.lock().get(&id).map(|entry| entry.nick.clone())
    }

    /// Change a session's chat name, returning the old one. The entity id
    /// is left alone so clients keep tracking the same entity.
    pub fn rename(&self, id: ConnectionId, nick: impl Into<String>) -> Option<String> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(&id)?;
        Some(std::mem::replace(&mut entry.nick, nick.into()))
    }

    /// Chat names of everyone online, ordered by connection
    pub fn names(&self) -> Vec<String> {
        let sessions = self.sessions.lock();
        let mut entries: Vec<_> = sessions.iter().collect();
        entries.sort_by_key(|(id, _)| **id);
        entries.into_iter().map(|(_, entry)| entry.nick.clone()).collect()
    }

    pub fn entity(&self, id: ConnectionId) -> Option<Entity> {
        self.sessions.lock().get(&id).map(|entry| entry.entity.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Replace every session's snapshot with the current transforms of all
    /// other sessions. Returns the number of sessions updated.
    pub fn snapshot_round(&self) -> Result<usize> {
        let sessions = self.sessions.lock();
        let all: Vec<(ConnectionId, EntityAction)> = sessions
            .iter()
            .map(|(&id, entry)| (id, EntityAction::update(entry.entity.to_data())))
            .collect();

        for (&id, entry) in sessions.iter() {
            let actions = all
                .iter()
                .filter(|(other, _)| *other != id)
                .map(|(_, action)| action.clone())
                .collect();
            let line: Line = encode_line(&ServerMessage::entities(actions))?.into();
            entry.snapshot.send_replace(Some(line));
        }

        Ok(sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(line: &Line) -> Value {
        serde_json::from_str(line).unwrap()
    }

    fn register(registry: &SessionRegistry) -> SessionHandle {
        let id = registry.next_connection_id();
        registry.register(id).unwrap()
    }

    #[test]
    fn test_ids_and_names_unique() {
        let registry = SessionRegistry::new();
        let a = register(&registry);
        let b = register(&registry);
        assert_ne!(a.id, b.id);
        assert_ne!(a.name, b.name);
        assert_eq!(registry.name_of(a.id).as_deref(), Some(a.name.as_str()));
    }

    #[test]
    fn test_register_announces_both_ways() {
        let registry = SessionRegistry::new();
        let mut a = register(&registry);

        let first = parse(&a.direct.try_recv().unwrap());
        assert_eq!(first["type"], "update_entities");
        assert_eq!(first["actions"].as_array().unwrap().len(), 0);

        let mut b = register(&registry);
        let to_a = parse(&a.direct.try_recv().unwrap());
        assert_eq!(to_a["actions"][0]["type"], "create");
        assert_eq!(to_a["actions"][0]["data"]["id"], b.name.as_str());

        let to_b = parse(&b.direct.try_recv().unwrap());
        assert_eq!(to_b["actions"][0]["type"], "create");
        assert_eq!(to_b["actions"][0]["data"]["id"], a.name.as_str());
    }

    #[test]
    fn test_remove_announces_delete() {
        let registry = SessionRegistry::new();
        let mut a = register(&registry);
        let b = register(&registry);
        while a.direct.try_recv().is_ok() {}

        let gone = registry.remove(b.id).unwrap();
        assert_eq!(gone.id, b.name);
        let msg = parse(&a.direct.try_recv().unwrap());
        assert_eq!(msg["actions"][0]["type"], "delete");
        assert_eq!(msg["actions"][0]["data"]["id"], b.name.as_str());
        assert!(registry.remove(b.id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_round_excludes_self() {
        let registry = SessionRegistry::new();
        let mut a = register(&registry);
        let b = register(&registry);
        registry.update_transform(
            b.id,
            Xyz::new(4.0, 5.0, 6.0),
            Xyz::default(),
            Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 },
        );

        assert_eq!(registry.snapshot_round().unwrap(), 2);
        assert!(a.snapshot.has_changed().unwrap());
        let line = a.snapshot.borrow_and_update().clone().unwrap();
        let msg = parse(&line);
        let actions = msg["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["type"], "update");
        assert_eq!(actions[0]["data"]["id"], b.name.as_str());
        assert_eq!(actions[0]["data"]["pos"]["y"], 5.0);
    }

    #[test]
    fn test_snapshot_keeps_only_latest() {
        let registry = SessionRegistry::new();
        let mut a = register(&registry);
        let b = register(&registry);

        for x in 0..5 {
            registry.update_transform(b.id, Xyz::new(x as f32, 0.0, 0.0), Xyz::default(), Quaternion::default());
            registry.snapshot_round().unwrap();
        }

        let line = a.snapshot.borrow_and_update().clone().unwrap();
        assert_eq!(parse(&line)["actions"][0]["data"]["pos"]["x"], 4.0);
        assert!(!a.snapshot.has_changed().unwrap());
    }

    #[test]
    fn test_update_unknown_session() {
        let registry = SessionRegistry::new();
        assert!(!registry.update_transform(
            ConnectionId::new(99),
            Xyz::default(),
            Xyz::default(),
            Quaternion::default()
        ));
        assert!(!registry.send_direct(ConnectionId::new(99), Line::from("x\n")));
    }

    #[test]
    fn test_rename_keeps_entity_id() {
        let registry = SessionRegistry::new();
        let a = register(&registry);
        let b = register(&registry);

        assert_eq!(registry.rename(a.id, "builder").as_deref(), Some(a.name.as_str()));
        assert_eq!(registry.name_of(a.id).as_deref(), Some("builder"));
        assert_eq!(registry.entity(a.id).unwrap().id, a.name);
        assert_eq!(registry.names(), vec!["builder".to_string(), b.name.clone()]);
        assert!(registry.rename(ConnectionId::new(99), "ghost").is_none());
    }
}
