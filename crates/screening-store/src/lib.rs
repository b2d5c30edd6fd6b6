// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Repository traits and durable record types for the call screening engine
//!
//! This crate defines the boundary between the evaluation engine and durable
//! storage. The engine depends only on the traits here; production deployments
//! plug in database-backed implementations, while the in-memory
//! implementations in [`memory`] serve tests and single-process deployments.
//!
//! # Core Abstractions
//!
//! - **Record Types**: `WhitelistEntry`, `SpamProfile`, `UserSpamInteraction`
//!   with optimistic-concurrency version counters
//! - **Store Traits**: object-safe async traits so the engine can hold
//!   `Arc<dyn Trait>` collaborators
//! - **Error Handling**: `StoreError` taxonomy with retry classification
//!
//! # Concurrency Contract
//!
//! `upsert` is safe under concurrent calls for the same key: every record
//! carries the `version` the writer read (0 for a new record), and the store
//! atomically rejects writes whose version is stale with
//! [`StoreError::Conflict`]. Callers re-read and retry on conflict.

use async_trait::async_trait;
use shared_types::{PhoneHash, PhoneNumber};
use uuid::Uuid;

pub mod error;
pub mod memory;
pub mod records;

pub use error::{StoreError, StoreResult};
pub use memory::{MemorySpamProfileStore, MemoryUserInteractionStore, MemoryWhitelistStore};
pub use records::{SpamProfile, UserSpamInteraction, WhitelistEntry};

/// Durable store for per-user whitelist entries
#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// Look up the entry for a (user, phone) pair
    ///
    /// Returns `Ok(None)` when no entry exists; expiry is not evaluated here,
    /// callers decide usability via [`WhitelistEntry::is_usable`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the record cannot
    /// be decoded.
    async fn get(&self, user_id: Uuid, phone: &PhoneNumber)
    -> StoreResult<Option<WhitelistEntry>>;

    /// Look up an entry by its id
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entry has this id.
    async fn get_by_id(&self, id: Uuid) -> StoreResult<WhitelistEntry>;

    /// Insert or update an entry, checking its version
    ///
    /// Returns the stored record with its version bumped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the entry's version is stale.
    async fn upsert(&self, entry: WhitelistEntry) -> StoreResult<WhitelistEntry>;

    /// Delete the entry for a (user, phone) pair
    ///
    /// Returns whether an entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn delete(&self, user_id: Uuid, phone: &PhoneNumber) -> StoreResult<bool>;

    /// Get the name/identifier of this store implementation
    fn name(&self) -> &'static str;
}

/// Durable store for shared, hash-keyed spam profiles
#[async_trait]
pub trait SpamProfileStore: Send + Sync {
    /// Look up the profile for a phone hash
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the record cannot
    /// be decoded.
    async fn get(&self, phone_hash: &PhoneHash) -> StoreResult<Option<SpamProfile>>;

    /// Insert or update a profile, checking its version
    ///
    /// Returns the stored record with its version bumped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the profile's version is stale.
    async fn upsert(&self, profile: SpamProfile) -> StoreResult<SpamProfile>;

    /// Get the name/identifier of this store implementation
    fn name(&self) -> &'static str;
}

/// Durable store for per-user interaction history
#[async_trait]
pub trait UserInteractionStore: Send + Sync {
    /// Look up the interaction record for a (user, phone hash) pair
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the record cannot
    /// be decoded.
    async fn get(
        &self,
        user_id: Uuid,
        phone_hash: &PhoneHash,
    ) -> StoreResult<Option<UserSpamInteraction>>;

    /// Insert or update an interaction record, checking its version
    ///
    /// Returns the stored record with its version bumped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the record's version is stale.
    async fn upsert(&self, interaction: UserSpamInteraction) -> StoreResult<UserSpamInteraction>;

    /// Get the name/identifier of this store implementation
    fn name(&self) -> &'static str;
}
