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

use anyhow::anyhow;
use tf_provider::serve;

use crate::provider::AzureProvider;

mod client;
mod error;
mod ids;
mod locks;
mod logging;
mod provider;
mod redis;
mod resource;
mod schema;
mod sql;
#[cfg(test)]
mod testing;
mod timeouts;
mod utils;
mod validate;
mod wait;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting the azurerm provider");

    serve("azurerm", AzureProvider::default())
        .await
        .map_err(|err| anyhow!("serving the azurerm provider: {err}"))
}
