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

//! Azure SQL resources and data sources.

mod data_source;
mod database;
mod elastic_pool;
mod failover_group;
mod firewall_rule;
mod models;
mod server;
mod virtual_network_rule;

pub use data_source::{SqlDatabaseDataSource, SqlServerDataSource};
pub use database::SqlDatabaseResource;
pub use elastic_pool::SqlElasticPoolResource;
pub use failover_group::SqlFailoverGroupResource;
pub use firewall_rule::SqlFirewallRuleResource;
pub use server::SqlServerResource;
pub use virtual_network_rule::SqlVirtualNetworkRuleResource;

pub(crate) const API_VERSION: &str = "2021-11-01";
