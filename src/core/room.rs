//! Room state store
//! Authoritative in-memory state per room id: a state blob treated as an
//! immutable snapshot swapped wholesale, a monotonic version counter, and a
//! membership map of user -> presence. Rooms are ephemeral and live exactly
//! as long as they have at least one member.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::core::connection::ConnectionId;
use crate::core::message_types::{CursorPos, UserInfo};

/// A user's live metadata within one room
#[derive(Debug, Clone)]
pub struct Presence {
    pub user_id: String,
    pub user_name: String,
    pub color: String,
    pub cursor: Option<CursorPos>,
    pub last_activity: DateTime<Utc>,
}

impl Presence {
    pub fn new(user_id: String, user_name: String, color: String) -> Self {
        Self {
            user_id,
            user_name,
            color,
            cursor: None,
            last_activity: Utc::now(),
        }
    }

    pub fn to_user_info(&self) -> UserInfo {
        UserInfo {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            color: self.color.clone(),
            cursor: self.cursor,
        }
    }
}

/// Result of an optimistic patch attempt
#[derive(Debug, Clone)]
pub enum PatchOutcome {
    /// Patch merged; carries the new version
    Applied(u64),
    /// Stale expected version; carries the authoritative state and version
    /// so the sender can re-base. The store was not mutated.
    Conflict { version: u64, state: Value },
}

/// Post-join view of a room, taken while the membership change is applied
pub struct JoinSnapshot {
    pub state: Value,
    pub version: u64,
    pub users: Vec<UserInfo>,
    pub members: Vec<ConnectionId>,
    /// Identity this connection previously held in the room, if re-joining
    /// under a new user id displaced it
    pub departed_user: Option<String>,
}

/// A named collaboration session
pub struct Room {
    pub id: String,
    state: Value,
    version: u64,
    /// user id -> presence
    presence: HashMap<String, Presence>,
    /// connection handle -> user id, for fan-out and departure bookkeeping
    members: HashMap<ConnectionId, String>,
}

impl Room {
    pub fn new(id: String, initial_state: Option<Value>) -> Self {
        Self {
            id,
            state: initial_state.unwrap_or(Value::Null),
            version: 0,
            presence: HashMap::new(),
            members: HashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Point-in-time view: state, version and presence from one revision
    pub fn snapshot(&self) -> (Value, u64, Vec<UserInfo>) {
        let users = self.presence.values().map(Presence::to_user_info).collect();
        (self.state.clone(), self.version, users)
    }

    /// Shallow-merge `patch` into the current state iff `expected` matches
    /// the current version. Top-level keys of the patch overwrite; keys
    /// absent from the patch are left untouched. A null value overwrites
    /// like any other (no tombstone deletion).
    pub fn apply_patch(&mut self, expected: u64, patch: &Value) -> PatchOutcome {
        if expected != self.version {
            return PatchOutcome::Conflict {
                version: self.version,
                state: self.state.clone(),
            };
        }

        match patch.as_object() {
            Some(entries) => {
                if !self.state.is_object() {
                    self.state = Value::Object(serde_json::Map::new());
                }
                if let Value::Object(target) = &mut self.state {
                    for (key, value) in entries {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
            // Non-object patch: advisory last-writer-wins, replace wholesale
            None => self.state = patch.clone(),
        }

        self.version += 1;
        PatchOutcome::Applied(self.version)
    }

    /// Unconditional replacement. Still advances the version so patches
    /// from clients holding the old version are rejected as stale.
    pub fn replace_state(&mut self, new_state: Value) -> u64 {
        self.state = new_state;
        self.version += 1;
        self.version
    }

    /// Insert or refresh this user's presence. A connection that re-joins
    /// under a different user id (re-auth is last-write-wins) takes its old
    /// identity out of the room first, unless another connection of that
    /// user remains. The departed id is returned so the caller can announce
    /// the departure.
    pub fn insert_member(&mut self, conn_id: ConnectionId, presence: Presence) -> Option<String> {
        let departed = match self.members.get(&conn_id) {
            Some(old_user) if old_user != &presence.user_id => {
                let old_user = old_user.clone();
                self.members.remove(&conn_id);
                if self.members.values().any(|u| u == &old_user) {
                    None
                } else {
                    self.presence.remove(&old_user);
                    Some(old_user)
                }
            }
            _ => None,
        };
        self.members.insert(conn_id, presence.user_id.clone());
        self.presence.insert(presence.user_id.clone(), presence);
        departed
    }

    /// Remove a connection from the room; the user's presence goes with it
    /// unless another connection of the same user remains. Returns the
    /// departed user id when presence was actually removed.
    pub fn remove_member(&mut self, conn_id: &str) -> Option<String> {
        let user_id = self.members.remove(conn_id)?;
        if self.members.values().any(|u| u == &user_id) {
            return None;
        }
        self.presence.remove(&user_id);
        Some(user_id)
    }

    pub fn has_member(&self, conn_id: &str) -> bool {
        self.members.contains_key(conn_id)
    }

    /// User id bound to a member connection
    pub fn member_user(&self, conn_id: &str) -> Option<&String> {
        self.members.get(conn_id)
    }

    pub fn update_cursor(&mut self, user_id: &str, cursor: CursorPos) -> bool {
        match self.presence.get_mut(user_id) {
            Some(presence) => {
                presence.cursor = Some(cursor);
                presence.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn touch(&mut self, user_id: &str) {
        if let Some(presence) = self.presence.get_mut(user_id) {
            presence.last_activity = Utc::now();
        }
    }

    pub fn member_connections(&self) -> Vec<ConnectionId> {
        self.members.keys().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Manages all live rooms. Each room sits behind its own mutex so that
/// unrelated rooms never contend; operations on one room are strictly
/// ordered. Lock order is always outer map, then room.
pub struct RoomStore {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Return the existing room or create one with version 0 and the
    /// supplied initial state (null when none is given).
    pub async fn get_or_create(
        &self,
        room_id: &str,
        initial_state: Option<Value>,
    ) -> Arc<Mutex<Room>> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Room::new(room_id.to_string(), initial_state)))
            })
            .clone()
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Create the room if needed and insert the member in one step, holding
    /// the map lock throughout so a concurrent last-leave's
    /// `remove_if_empty` cannot delete the room between creation and
    /// insertion (which would strand the joiner in an orphaned room).
    pub async fn join_member(
        &self,
        room_id: &str,
        initial_state: Option<Value>,
        conn_id: ConnectionId,
        presence: Presence,
    ) -> JoinSnapshot {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Room::new(room_id.to_string(), initial_state)))
            })
            .clone();
        let mut room = room.lock().await;
        let departed_user = room.insert_member(conn_id, presence);
        let (state, version, users) = room.snapshot();
        JoinSnapshot {
            state,
            version,
            users,
            members: room.member_connections(),
            departed_user,
        }
    }

    /// Consistent point-in-time view of one room, or None when it is absent
    pub async fn snapshot(&self, room_id: &str) -> Option<(Value, u64, Vec<UserInfo>)> {
        let room = self.get(room_id).await?;
        let room = room.lock().await;
        Some(room.snapshot())
    }

    pub async fn apply_patch_if_version_matches(
        &self,
        room_id: &str,
        expected: u64,
        patch: &Value,
    ) -> Option<PatchOutcome> {
        let room = self.get(room_id).await?;
        let mut room = room.lock().await;
        Some(room.apply_patch(expected, patch))
    }

    pub async fn replace_full_state(&self, room_id: &str, new_state: Value) -> Option<u64> {
        let room = self.get(room_id).await?;
        let mut room = room.lock().await;
        Some(room.replace_state(new_state))
    }

    /// Delete the room iff its membership is empty. State and version are
    /// discarded; a later join re-creates the room fresh at version 0.
    pub async fn remove_if_empty(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let empty = match rooms.get(room_id) {
            Some(room) => room.lock().await.is_empty(),
            None => return false,
        };
        if empty {
            rooms.remove(room_id);
        }
        empty
    }

    /// Read-only snapshot for the stats endpoint
    pub async fn member_counts(&self) -> HashMap<String, usize> {
        let rooms = self.rooms.read().await;
        let mut counts = HashMap::with_capacity(rooms.len());
        for (id, room) in rooms.iter() {
            counts.insert(id.clone(), room.lock().await.member_count());
        }
        counts
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn presence(user_id: &str) -> Presence {
        Presence::new(user_id.to_string(), user_id.to_uppercase(), "#008080".to_string())
    }

    #[test]
    fn test_version_increments_by_one_per_accepted_mutation() {
        let mut room = Room::new("doc-1".to_string(), Some(json!({"text": ""})));
        assert_eq!(room.version(), 0);

        match room.apply_patch(0, &json!({"text": "hello"})) {
            PatchOutcome::Applied(v) => assert_eq!(v, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(room.replace_state(json!({"text": "reset"})), 2);
        match room.apply_patch(2, &json!({"extra": true})) {
            PatchOutcome::Applied(v) => assert_eq!(v, 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_stale_patch_leaves_room_untouched() {
        let mut room = Room::new("doc-1".to_string(), Some(json!({"text": "hello"})));
        room.apply_patch(0, &json!({"text": "world"}));

        match room.apply_patch(0, &json!({"text": "goodbye"})) {
            PatchOutcome::Conflict { version, state } => {
                assert_eq!(version, 1);
                assert_eq!(state, json!({"text": "world"}));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(room.version(), 1);
        assert_eq!(room.state(), &json!({"text": "world"}));
    }

    #[test]
    fn test_shallow_merge_keeps_untouched_keys() {
        let mut room = Room::new(
            "doc-1".to_string(),
            Some(json!({"title": "Doc", "body": {"a": 1}})),
        );
        room.apply_patch(0, &json!({"body": {"b": 2}}));

        // Top-level overwrite: the nested object is swapped, not merged
        assert_eq!(
            room.state(),
            &json!({"title": "Doc", "body": {"b": 2}})
        );
    }

    #[test]
    fn test_patch_against_null_state_starts_from_empty_object() {
        let mut room = Room::new("doc-1".to_string(), None);
        room.apply_patch(0, &json!({"text": "hi"}));
        assert_eq!(room.state(), &json!({"text": "hi"}));
    }

    #[test]
    fn test_cursor_never_touches_version() {
        let mut room = Room::new("doc-1".to_string(), None);
        room.insert_member("c1".to_string(), presence("u1"));
        for i in 0..1000 {
            let moved = room.update_cursor(
                "u1",
                CursorPos {
                    x: i as f64,
                    y: 0.0,
                },
            );
            assert!(moved);
        }
        assert_eq!(room.version(), 0);
    }

    #[test]
    fn test_remove_member_drops_presence() {
        let mut room = Room::new("doc-1".to_string(), None);
        room.insert_member("c1".to_string(), presence("u1"));
        room.insert_member("c2".to_string(), presence("u2"));

        assert_eq!(room.remove_member("c1"), Some("u1".to_string()));
        assert_eq!(room.member_count(), 1);
        let (_, _, users) = room.snapshot();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "u2");

        // Unknown connection is a no-op
        assert_eq!(room.remove_member("c1"), None);
    }

    #[test]
    fn test_rejoin_under_new_identity_displaces_old_presence() {
        let mut room = Room::new("doc-1".to_string(), None);
        assert!(room
            .insert_member("c1".to_string(), presence("u1"))
            .is_none());

        // Same connection, new identity: the old presence leaves with it
        let departed = room.insert_member("c1".to_string(), presence("u2"));
        assert_eq!(departed, Some("u1".to_string()));
        assert_eq!(room.member_count(), 1);

        let (_, _, users) = room.snapshot();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "u2");
    }

    #[test]
    fn test_rejoin_under_new_identity_spares_other_connections() {
        let mut room = Room::new("doc-1".to_string(), None);
        room.insert_member("c1".to_string(), presence("u1"));
        room.insert_member("c2".to_string(), presence("u1"));

        // u1 is still present through c2, so nothing departs
        let departed = room.insert_member("c1".to_string(), presence("u2"));
        assert_eq!(departed, None);

        let (_, _, users) = room.snapshot();
        let mut ids: Vec<_> = users.iter().map(|u| u.user_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_join_member_survives_concurrent_room_deletion() {
        let store = RoomStore::new();

        // A joiner that raced a last leave holds an Arc to a room the
        // store has already deleted
        let _stale = store.get_or_create("doc-1", None).await;
        assert!(store.remove_if_empty("doc-1").await);

        let snapshot = store
            .join_member(
                "doc-1",
                Some(json!({"text": "x"})),
                "c1".to_string(),
                presence("u1"),
            )
            .await;
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.members, vec!["c1".to_string()]);
        assert!(store.room_exists("doc-1").await);

        // The joiner landed in the live room: later operations find it
        match store
            .apply_patch_if_version_matches("doc-1", 0, &json!({"text": "y"}))
            .await
            .unwrap()
        {
            PatchOutcome::Applied(v) => assert_eq!(v, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let (_, _, users) = store.snapshot("doc-1").await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_rejoin_after_empty_starts_fresh() {
        let store = RoomStore::new();
        {
            let room = store
                .get_or_create("doc-1", Some(json!({"text": "old"})))
                .await;
            let mut room = room.lock().await;
            room.insert_member("c1".to_string(), presence("u1"));
            room.apply_patch(0, &json!({"text": "edited"}));
            room.remove_member("c1");
        }
        assert!(store.remove_if_empty("doc-1").await);
        assert!(!store.room_exists("doc-1").await);

        // No state leaked from the prior session
        let room = store
            .get_or_create("doc-1", Some(json!({"text": "new"})))
            .await;
        let room = room.lock().await;
        assert_eq!(room.version(), 0);
        assert_eq!(room.state(), &json!({"text": "new"}));
    }

    #[tokio::test]
    async fn test_remove_if_empty_keeps_occupied_rooms() {
        let store = RoomStore::new();
        let room = store.get_or_create("doc-1", None).await;
        room.lock().await.insert_member("c1".to_string(), presence("u1"));

        assert!(!store.remove_if_empty("doc-1").await);
        assert!(store.room_exists("doc-1").await);
    }

    #[tokio::test]
    async fn test_concurrent_patches_same_version_one_wins() {
        let store = Arc::new(RoomStore::new());
        store.get_or_create("doc-1", Some(json!({"n": 0}))).await;

        let mut handles = vec![];
        for i in 0..2 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_patch_if_version_matches("doc-1", 0, &json!({ "n": i + 1 }))
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                PatchOutcome::Applied(v) => {
                    assert_eq!(v, 1);
                    applied += 1;
                }
                PatchOutcome::Conflict { version, .. } => {
                    assert_eq!(version, 1);
                    conflicts += 1;
                }
            }
        }
        assert_eq!((applied, conflicts), (1, 1));

        let (_, version, _) = store.snapshot("doc-1").await.unwrap();
        assert_eq!(version, 1);
    }
}
