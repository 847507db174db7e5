// This file is part of the terraform-provider-azurerm project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide named locks.
//!
//! Some Azure objects are shared between several Terraform resources (a
//! subnet used by multiple caches, a database and its replication partners).
//! Concurrent writes to those parents are rejected by the API, so handlers
//! take a named lock for the duration of the operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

lazy_static! {
    static ref LOCKS: Mutex<HashMap<String, Arc<AsyncMutex<()>>>> = Mutex::new(HashMap::new());
}

/// Holds a named lock until dropped
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        tracing::debug!(key = %self.key, "unlocking");
    }
}

fn entry(key: &str) -> Arc<AsyncMutex<()>> {
    let mut locks = match LOCKS.lock() {
        Ok(locks) => locks,
        Err(poisoned) => poisoned.into_inner(),
    };
    locks
        .entry(key.to_owned())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

async fn lock(key: String) -> LockGuard {
    tracing::debug!(key = %key, "locking");
    let guard = entry(&key).lock_owned().await;
    LockGuard { key, _guard: guard }
}

/// Lock an object by its resource ID
pub async fn by_id(id: &str) -> LockGuard {
    lock(id.to_owned()).await
}

/// Lock an object by name within a resource type
pub async fn by_name(name: &str, resource_type: &str) -> LockGuard {
    lock(format!("{resource_type}.{name}")).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn serialises_same_name() {
        let first = by_name("vnet-serialise", "azurerm_virtual_network").await;

        let waiter = tokio::spawn(async {
            let _second = by_name("vnet-serialise", "azurerm_virtual_network").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second lock should be granted")
            .unwrap();
    }

    #[tokio::test]
    async fn different_types_do_not_collide() {
        let _vnet = by_name("shared-name", "azurerm_virtual_network").await;
        let subnet = tokio::time::timeout(
            Duration::from_millis(100),
            by_name("shared-name", "azurerm_subnet"),
        )
        .await;
        assert!(subnet.is_ok());
    }
}
