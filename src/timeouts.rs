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

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, NestedBlock};
use tf_provider::value::{Value, ValueList, ValueString};
use tf_provider::schema::Description;
use tf_provider::{map, AttributePath, Diagnostics};

/// Deadline of a data source lookup
pub const DATA_SOURCE_READ: Duration = Duration::from_secs(5 * 60);

/// Operation deadlines of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(read * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }

    /// Apply the user provided `timeouts` block on top of the defaults
    pub fn resolve(self, block: &ValueList<Value<TimeoutsState<'_>>>) -> Result<Self> {
        let Some(state) = block
            .as_ref_option()
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.as_ref_option())
        else {
            return Ok(self);
        };

        let pick = |value: &ValueString<'_>, default: Duration| -> Result<Duration> {
            match value.as_deref_option() {
                Some(s) => parse_duration(s),
                None => Ok(default),
            }
        };

        Ok(Self {
            create: pick(&state.create, self.create)?,
            read: pick(&state.read, self.read)?,
            update: pick(&state.update, self.update)?,
            delete: pick(&state.delete, self.delete)?,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsState<'a> {
    pub create: ValueString<'a>,
    pub read: ValueString<'a>,
    pub update: ValueString<'a>,
    pub delete: ValueString<'a>,
}

/// `timeouts` block of a resource.
///
/// `update` is always declared since every state carries it. Resources
/// replaced on any change document it as unused.
pub fn schema(defaults: Timeouts, with_update: bool) -> NestedBlock {
    let attribute = |description: String| Attribute {
        attr_type: AttributeType::String,
        description: Description::plain(description),
        constraint: AttributeConstraint::Optional,
        ..Default::default()
    };
    let operation = |op: &str, default: Duration| {
        attribute(format!(
            "Maximum duration of the {op} operation (default: {}m)",
            default.as_secs() / 60
        ))
    };

    let update = if with_update {
        operation("update", defaults.update)
    } else {
        attribute("Unused, every change replaces the resource".to_owned())
    };

    NestedBlock::List(Block {
        description: Description::plain("Operation timeouts"),
        attributes: map! {
            "create" => operation("create", defaults.create),
            "read"   => operation("read", defaults.read),
            "update" => update,
            "delete" => operation("delete", defaults.delete),
        },
        ..Default::default()
    })
}

pub fn validate(diags: &mut Diagnostics, block: &ValueList<Value<TimeoutsState<'_>>>) {
    for (i, state) in crate::schema::elements(block).enumerate() {
        for (name, value) in [
            ("create", &state.create),
            ("read", &state.read),
            ("update", &state.update),
            ("delete", &state.delete),
        ] {
            if let Some(s) = value.as_deref_option() {
                if let Err(err) = parse_duration(s) {
                    diags.error(
                        "Invalid timeout",
                        err.to_string(),
                        AttributePath::new("timeouts")
                            .index(i as i64)
                            .attribute(name),
                    );
                }
            }
        }
    }
}

/// Parse a duration such as `90m`, `1h30m` or `45s`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let mut total = Duration::ZERO;
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(anyhow!("empty duration"));
    }

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow!("missing unit in duration {input:?}"))?;
        if digits == 0 {
            return Err(anyhow!("invalid duration {input:?}"));
        }
        let amount: u64 = rest[..digits].parse()?;
        rest = &rest[digits..];

        let unit = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let scale = match &rest[..unit] {
            "h" => 3_600_000,
            "m" => 60_000,
            "s" => 1_000,
            "ms" => 1,
            other => return Err(anyhow!("unknown unit {other:?} in duration {input:?}")),
        };
        rest = &rest[unit..];

        total += Duration::from_millis(amount * scale);
    }

    Ok(total)
}
