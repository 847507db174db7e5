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

//! In-memory Resource Manager used by the unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::client::{ArmClient, Request, Response, Transport};
use crate::error::ArmError;
use crate::provider::{ClientHandle, Clients};

pub const ENDPOINT: &str = "https://management.azure.com";
pub const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Default)]
struct Inner {
    /// Objects by lowercase path
    objects: BTreeMap<String, Value>,
    scripted: HashMap<(Method, String), VecDeque<Response>>,
    defaults: Vec<(String, Value)>,
    requests: Vec<(Method, String, Option<Value>)>,
}

/// Transport answering like the Resource Manager from an in-memory store.
///
/// PUT stores the body (over the registered defaults) and answers it back,
/// PATCH merges into an existing object, DELETE removes an object and its
/// children, POST answers the object stored at the path. GET on a collection
/// lists its direct children. A scripted response replaces the answer, the
/// store is still updated.
#[derive(Debug, Clone, Default)]
pub struct FakeArm(Arc<Mutex<Inner>>);

fn key(path: &str) -> String {
    path.to_lowercase()
}

fn segments(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (k, v) in patch {
                merge(target.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn respond(status: StatusCode, body: &Value) -> Response {
    Response::new(status, body.to_string())
}

fn not_found(path: &str) -> Response {
    respond(
        StatusCode::NOT_FOUND,
        &json!({"error": {
            "code": "ResourceNotFound",
            "message": format!("The Resource '{path}' was not found."),
        }}),
    )
}

impl FakeArm {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        match self.0.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn client(&self) -> ArmClient {
        ArmClient::new(ENDPOINT, Arc::new(self.clone()))
    }

    /// Client handle of a configured provider backed by this fake
    pub fn handle(&self) -> ClientHandle {
        let handle = ClientHandle::default();
        handle.set(Clients {
            subscription_id: SUBSCRIPTION.to_owned(),
            arm: self.client(),
        });
        handle
    }

    /// Store an object as if it existed already
    pub fn insert(&self, path: &str, mut object: Value) {
        if let Value::Object(fields) = &mut object {
            fields
                .entry("id")
                .or_insert_with(|| Value::String(path.to_owned()));
            if let Some(name) = path.rsplit('/').next() {
                fields
                    .entry("name")
                    .or_insert_with(|| Value::String(name.to_owned()));
            }
        }
        self.inner().objects.insert(key(path), object);
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.inner().objects.get(&key(path)).cloned()
    }

    /// Merge `patch` into a stored object
    pub fn update(&self, path: &str, patch: Value) {
        if let Some(object) = self.inner().objects.get_mut(&key(path)) {
            merge(object, &patch);
        }
    }

    pub fn remove(&self, path: &str) {
        self.inner().objects.remove(&key(path));
    }

    /// Fields added to every object PUT under a path containing `fragment`
    pub fn defaults(&self, fragment: &str, defaults: Value) {
        self.inner().defaults.push((key(fragment), defaults));
    }

    /// Serve `response` to the next `method` request on `path`
    pub fn enqueue(&self, method: Method, path: &str, response: Response) {
        self.inner()
            .scripted
            .entry((method, key(path)))
            .or_default()
            .push_back(response);
    }

    /// Method and path of every request received
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.inner()
            .requests
            .iter()
            .map(|(method, path, _)| (method.clone(), path.clone()))
            .collect()
    }

    /// Bodies sent with `method` to `path`
    pub fn sent(&self, method: Method, path: &str) -> Vec<Value> {
        self.inner()
            .requests
            .iter()
            .filter(|(m, p, _)| *m == method && key(p) == key(path))
            .filter_map(|(_, _, body)| body.clone())
            .collect()
    }

    fn handle_request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut inner = self.inner();
        inner
            .requests
            .push((method.clone(), path.to_owned(), body.clone()));

        let scripted = inner
            .scripted
            .get_mut(&(method.clone(), key(path)))
            .and_then(VecDeque::pop_front);
        let response = Self::apply(&mut inner, method, path, body);
        scripted.unwrap_or(response)
    }

    fn apply(inner: &mut Inner, method: Method, path: &str, body: Option<Value>) -> Response {
        let k = key(path);
        match method {
            Method::GET if segments(path) % 2 == 1 => {
                let prefix = format!("{k}/");
                let depth = segments(path) + 1;
                let children: Vec<Value> = inner
                    .objects
                    .iter()
                    .filter(|(child, _)| child.starts_with(&prefix) && segments(child) == depth)
                    .map(|(_, object)| object.clone())
                    .collect();
                respond(StatusCode::OK, &json!({ "value": children }))
            }
            Method::GET | Method::POST => match inner.objects.get(&k) {
                Some(object) => respond(StatusCode::OK, object),
                None => not_found(path),
            },
            Method::PUT => {
                let mut object = json!({});
                for (fragment, defaults) in &inner.defaults {
                    if k.contains(fragment.as_str()) {
                        merge(&mut object, defaults);
                    }
                }
                if let Some(body) = &body {
                    merge(&mut object, body);
                }
                object["id"] = Value::String(path.to_owned());
                if let Some(name) = path.rsplit('/').next() {
                    object["name"] = Value::String(name.to_owned());
                }
                inner.objects.insert(k, object.clone());
                respond(StatusCode::OK, &object)
            }
            Method::PATCH => match inner.objects.get_mut(&k) {
                Some(object) => {
                    if let Some(body) = &body {
                        merge(object, body);
                    }
                    respond(StatusCode::OK, object)
                }
                None => not_found(path),
            },
            Method::DELETE => {
                let prefix = format!("{k}/");
                inner.objects.retain(|child, _| !child.starts_with(&prefix));
                match inner.objects.remove(&k) {
                    Some(_) => Response::new(StatusCode::OK, ""),
                    None => Response::new(StatusCode::NO_CONTENT, ""),
                }
            }
            _ => respond(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({"error": {"code": "MethodNotAllowed", "message": method.as_str()}}),
            ),
        }
    }
}

#[async_trait]
impl Transport for FakeArm {
    async fn send(&self, request: Request) -> Result<Response, ArmError> {
        let url = request.url.strip_prefix(ENDPOINT).unwrap_or(&request.url);
        let path = url.split('?').next().unwrap_or(url);
        Ok(self.handle_request(request.method, path, request.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_nested_objects() {
        let mut target = json!({"properties": {"port": 6379, "sku": {"name": "Basic"}}});
        merge(
            &mut target,
            &json!({"properties": {"sku": {"name": "Standard"}}, "tags": {"a": "b"}}),
        );
        assert_eq!(
            target,
            json!({"properties": {"port": 6379, "sku": {"name": "Standard"}}, "tags": {"a": "b"}})
        );
    }

    #[tokio::test]
    async fn lists_direct_children() {
        let fake = FakeArm::new();
        fake.insert("/servers/s1/databases/db1", json!({}));
        fake.insert("/servers/s1/databases/db2", json!({}));
        fake.insert("/servers/s1/databases/db2/replicationLinks/l1", json!({}));

        let response = fake.handle_request(Method::GET, "/servers/s1/databases", None);
        let list: Value = response.json().unwrap();
        assert_eq!(list["value"].as_array().map(Vec::len), Some(2));
    }
}
