// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory store implementations
//!
//! DashMap-backed reference implementations of the store traits, used by the
//! test suites and by single-process deployments. Version checks are atomic:
//! the check-and-write happens under the map's shard lock via the entry API,
//! so concurrent upserts for the same key cannot lose updates.

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use shared_types::{PhoneHash, PhoneNumber};
use tracing::debug;
use uuid::Uuid;

use crate::{
    SpamProfileStore, UserInteractionStore, WhitelistStore,
    error::{StoreError, StoreResult},
    records::{SpamProfile, UserSpamInteraction, WhitelistEntry},
};

type UserPhoneKey = (Uuid, String);

/// In-memory whitelist store
#[derive(Debug, Default)]
pub struct MemoryWhitelistStore {
    entries: DashMap<UserPhoneKey, WhitelistEntry>,
    by_id: DashMap<Uuid, UserPhoneKey>,
}

impl MemoryWhitelistStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(user_id: Uuid, phone: &PhoneNumber) -> UserPhoneKey {
        (user_id, phone.as_str().to_string())
    }
}

#[async_trait]
impl WhitelistStore for MemoryWhitelistStore {
    async fn get(
        &self,
        user_id: Uuid,
        phone: &PhoneNumber,
    ) -> StoreResult<Option<WhitelistEntry>> {
        Ok(self
            .entries
            .get(&Self::key(user_id, phone))
            .map(|entry| entry.clone()))
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<WhitelistEntry> {
        let key = self
            .by_id
            .get(&id)
            .map(|key| key.clone())
            .ok_or_else(|| StoreError::not_found(format!("whitelist entry {id}")))?;
        self.entries
            .get(&key)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::not_found(format!("whitelist entry {id}")))
    }

    async fn upsert(&self, mut entry: WhitelistEntry) -> StoreResult<WhitelistEntry> {
        let key = Self::key(entry.user_id, &entry.phone);
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut current) => {
                let stored_version = current.get().version;
                if stored_version != entry.version {
                    debug!(
                        user_id = %entry.user_id,
                        expected = entry.version,
                        found = stored_version,
                        "whitelist upsert version conflict"
                    );
                    return Err(StoreError::conflict(format!(
                        "whitelist entry for user {}: expected version {}, found {}",
                        entry.user_id, entry.version, stored_version
                    )));
                }
                entry.version += 1;
                current.insert(entry.clone());
            }
            Entry::Vacant(slot) => {
                if entry.version != 0 {
                    return Err(StoreError::conflict(format!(
                        "whitelist entry for user {} was deleted concurrently",
                        entry.user_id
                    )));
                }
                entry.version = 1;
                slot.insert(entry.clone());
            }
        }
        self.by_id.insert(entry.id, key);
        Ok(entry)
    }

    async fn delete(&self, user_id: Uuid, phone: &PhoneNumber) -> StoreResult<bool> {
        match self.entries.remove(&Self::key(user_id, phone)) {
            Some((_, entry)) => {
                self.by_id.remove(&entry.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn name(&self) -> &'static str {
        "memory-whitelist"
    }
}

/// In-memory spam profile store
#[derive(Debug, Default)]
pub struct MemorySpamProfileStore {
    profiles: DashMap<String, SpamProfile>,
}

impl MemorySpamProfileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the store holds no profiles
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl SpamProfileStore for MemorySpamProfileStore {
    async fn get(&self, phone_hash: &PhoneHash) -> StoreResult<Option<SpamProfile>> {
        Ok(self
            .profiles
            .get(phone_hash.as_str())
            .map(|profile| profile.clone()))
    }

    async fn upsert(&self, mut profile: SpamProfile) -> StoreResult<SpamProfile> {
        match self.profiles.entry(profile.phone_hash.as_str().to_string()) {
            Entry::Occupied(mut current) => {
                let stored_version = current.get().version;
                if stored_version != profile.version {
                    debug!(
                        phone = %profile.phone_hash.short(),
                        expected = profile.version,
                        found = stored_version,
                        "spam profile upsert version conflict"
                    );
                    return Err(StoreError::conflict(format!(
                        "spam profile {}: expected version {}, found {}",
                        profile.phone_hash.short(),
                        profile.version,
                        stored_version
                    )));
                }
                profile.version += 1;
                current.insert(profile.clone());
            }
            Entry::Vacant(slot) => {
                if profile.version != 0 {
                    return Err(StoreError::conflict(format!(
                        "spam profile {} was deleted concurrently",
                        profile.phone_hash.short()
                    )));
                }
                profile.version = 1;
                slot.insert(profile.clone());
            }
        }
        Ok(profile)
    }

    fn name(&self) -> &'static str {
        "memory-spam-profile"
    }
}

/// In-memory user interaction store
#[derive(Debug, Default)]
pub struct MemoryUserInteractionStore {
    interactions: DashMap<UserPhoneKey, UserSpamInteraction>,
}

impl MemoryUserInteractionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    fn key(user_id: Uuid, phone_hash: &PhoneHash) -> UserPhoneKey {
        (user_id, phone_hash.as_str().to_string())
    }
}

#[async_trait]
impl UserInteractionStore for MemoryUserInteractionStore {
    async fn get(
        &self,
        user_id: Uuid,
        phone_hash: &PhoneHash,
    ) -> StoreResult<Option<UserSpamInteraction>> {
        Ok(self
            .interactions
            .get(&Self::key(user_id, phone_hash))
            .map(|interaction| interaction.clone()))
    }

    async fn upsert(
        &self,
        mut interaction: UserSpamInteraction,
    ) -> StoreResult<UserSpamInteraction> {
        match self
            .interactions
            .entry(Self::key(interaction.user_id, &interaction.phone_hash))
        {
            Entry::Occupied(mut current) => {
                let stored_version = current.get().version;
                if stored_version != interaction.version {
                    return Err(StoreError::conflict(format!(
                        "interaction for user {}: expected version {}, found {}",
                        interaction.user_id, interaction.version, stored_version
                    )));
                }
                interaction.version += 1;
                current.insert(interaction.clone());
            }
            Entry::Vacant(slot) => {
                if interaction.version != 0 {
                    return Err(StoreError::conflict(format!(
                        "interaction for user {} was deleted concurrently",
                        interaction.user_id
                    )));
                }
                interaction.version = 1;
                slot.insert(interaction.clone());
            }
        }
        Ok(interaction)
    }

    fn name(&self) -> &'static str {
        "memory-user-interaction"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("+8613800000001").unwrap()
    }

    #[tokio::test]
    async fn whitelist_round_trip() {
        let store = MemoryWhitelistStore::new();
        let user_id = Uuid::new_v4();
        let entry = WhitelistEntry::manual(user_id, phone());
        let entry_id = entry.id;

        let stored = store.upsert(entry).await.unwrap();
        assert_eq!(stored.version, 1);

        let fetched = store.get(user_id, &phone()).await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        let by_id = store.get_by_id(entry_id).await.unwrap();
        assert_eq!(by_id, stored);
    }

    #[tokio::test]
    async fn whitelist_get_by_id_not_found() {
        let store = MemoryWhitelistStore::new();
        let err = store.get_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn whitelist_delete() {
        let store = MemoryWhitelistStore::new();
        let user_id = Uuid::new_v4();
        let stored = store
            .upsert(WhitelistEntry::manual(user_id, phone()))
            .await
            .unwrap();

        assert!(store.delete(user_id, &phone()).await.unwrap());
        assert!(!store.delete(user_id, &phone()).await.unwrap());
        assert!(store.get(user_id, &phone()).await.unwrap().is_none());
        assert!(store.get_by_id(stored.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemorySpamProfileStore::new();
        let profile = SpamProfile::new(phone().hash());

        let stored = store.upsert(profile.clone()).await.unwrap();
        assert_eq!(stored.version, 1);

        // A writer still holding the version-0 copy must conflict
        let err = store.upsert(profile).await.unwrap_err();
        assert!(err.is_conflict());

        // The current version goes through
        let updated = store.upsert(stored).await.unwrap();
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn concurrent_upserts_never_lose_updates() {
        let store = Arc::new(MemorySpamProfileStore::new());
        let hash = phone().hash();
        store.upsert(SpamProfile::new(hash.clone())).await.unwrap();

        let writers = 8;
        let mut handles = Vec::new();
        for _ in 0..writers {
            let store = Arc::clone(&store);
            let hash = hash.clone();
            handles.push(tokio::spawn(async move {
                // Read-modify-write with retry on conflict
                loop {
                    let mut profile = store.get(&hash).await.unwrap().unwrap();
                    profile.total_reports += 1;
                    if store.upsert(profile).await.is_ok() {
                        break;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let profile = store.get(&hash).await.unwrap().unwrap();
        assert_eq!(profile.total_reports, writers);
        assert_eq!(profile.version, writers + 1);
    }

    #[tokio::test]
    async fn interaction_round_trip() {
        let store = MemoryUserInteractionStore::new();
        let user_id = Uuid::new_v4();
        let hash = phone().hash();

        assert!(store.get(user_id, &hash).await.unwrap().is_none());

        let mut interaction = UserSpamInteraction::new(user_id, hash.clone());
        interaction.note_interaction(true, chrono::Utc::now());
        let stored = store.upsert(interaction).await.unwrap();
        assert_eq!(stored.version, 1);

        let fetched = store.get(user_id, &hash).await.unwrap().unwrap();
        assert_eq!(fetched.block_count, 1);
    }

    #[tokio::test]
    async fn store_names() {
        assert_eq!(MemoryWhitelistStore::new().name(), "memory-whitelist");
        assert_eq!(MemorySpamProfileStore::new().name(), "memory-spam-profile");
        assert_eq!(
            MemoryUserInteractionStore::new().name(),
            "memory-user-interaction"
        );
    }
}
