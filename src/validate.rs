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

//! Validators for attribute values known at plan time.
//!
//! Each validator returns the reason a value is rejected. The `string` and
//! `number` helpers skip null and unknown values and turn a
//! rejection into a diagnostic attached to the attribute.

use std::net::Ipv4Addr;

use lazy_static::lazy_static;
use regex::Regex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::utils::DisplayJoinable;

lazy_static! {
    static ref SQL_SERVER_NAME: Regex =
        Regex::new(r"^[0-9a-z]([-0-9a-z]{0,61}[0-9a-z])?$").unwrap();
    static ref SQL_DATABASE_NAME: Regex = Regex::new(r#"^[^<>*%&:\\/?]{0,127}[^<>*%&:\\/?. ]$"#).unwrap();
    static ref SQL_VIRTUAL_NETWORK_RULE_NAME: Regex =
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.\-]{0,62}[a-zA-Z0-9_]$").unwrap();
    static ref SQL_ELASTIC_POOL_NAME: Regex = Regex::new(r"^[^<>*%&:\\/?.]{1,128}$").unwrap();
    static ref REDIS_CACHE_NAME: Regex = Regex::new(r"^[A-Za-z0-9](-?[A-Za-z0-9]){0,62}$").unwrap();
    static ref REDIS_FIREWALL_RULE_NAME: Regex = Regex::new(r"^\w+$").unwrap();
    static ref ISO8601_DURATION: Regex = Regex::new(
        r"^P(\d+Y)?(\d+M)?(\d+W)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$"
    )
    .unwrap();
}

pub const MAXMEMORY_POLICIES: &[&str] = &[
    "noeviction",
    "allkeys-lru",
    "volatile-lru",
    "allkeys-random",
    "volatile-random",
    "volatile-ttl",
    "allkeys-lfu",
    "volatile-lfu",
];

pub const DAYS_OF_WEEK: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
    "Everyday",
    "Weekend",
];

const BACKUP_FREQUENCIES: &[i64] = &[15, 30, 60, 360, 720, 1440];

/// Report `validator`'s rejection of a known string value
pub fn string<F>(diags: &mut Diagnostics, path: AttributePath, value: &ValueString<'_>, validator: F)
where
    F: FnOnce(&str) -> Result<(), String>,
{
    if let Value::Value(value) = value {
        if let Err(reason) = validator(value) {
            diags.error(format!("Invalid value {value:?}"), reason, path);
        }
    }
}

/// Report a known number outside of `[min, max]`
pub fn number(diags: &mut Diagnostics, path: AttributePath, value: &ValueNumber, min: i64, max: i64) {
    if let Value::Value(value) = value {
        if let Err(reason) = int_between(*value, min, max) {
            diags.error(format!("Invalid value {value}"), reason, path);
        }
    }
}

fn matching(value: &str, regex: &Regex, what: &str) -> Result<(), String> {
    if regex.is_match(value) {
        Ok(())
    } else {
        Err(format!("{what} must match {}", regex.as_str()))
    }
}

pub fn sql_server_name(value: &str) -> Result<(), String> {
    matching(
        value,
        &SQL_SERVER_NAME,
        "SQL server name: lowercase letters, digits and hyphens, 1 to 63 characters,",
    )
}

pub fn sql_database_name(value: &str) -> Result<(), String> {
    matching(value, &SQL_DATABASE_NAME, "SQL database name")
}

pub fn sql_elastic_pool_name(value: &str) -> Result<(), String> {
    matching(value, &SQL_ELASTIC_POOL_NAME, "SQL elastic pool name")
}

pub fn sql_virtual_network_rule_name(value: &str) -> Result<(), String> {
    matching(
        value,
        &SQL_VIRTUAL_NETWORK_RULE_NAME,
        "virtual network rule name",
    )
}

pub fn redis_cache_name(value: &str) -> Result<(), String> {
    matching(value, &REDIS_CACHE_NAME, "Redis cache name")
}

pub fn redis_firewall_rule_name(value: &str) -> Result<(), String> {
    matching(value, &REDIS_FIREWALL_RULE_NAME, "Redis firewall rule name")
}

pub fn ipv4(value: &str) -> Result<(), String> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|err| format!("expected an IPv4 address: {err}"))
}

pub fn not_empty(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("value must not be empty".to_owned())
    } else {
        Ok(())
    }
}

/// Build a validator accepting one of `values`
pub fn one_of(values: &'static [&'static str], ignore_case: bool) -> impl Fn(&str) -> Result<(), String> {
    move |value| {
        let found = values.iter().any(|candidate| {
            if ignore_case {
                candidate.eq_ignore_ascii_case(value)
            } else {
                *candidate == value
            }
        });
        if found {
            Ok(())
        } else {
            Err(format!(
                "expected one of: {}",
                values.iter().join_with(", ")
            ))
        }
    }
}

pub fn decimal(value: &str) -> Result<(), String> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(()),
        _ => Err(format!("{value:?} is not a number")),
    }
}

pub fn int_between(value: i64, min: i64, max: i64) -> Result<(), String> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("expected a value between {min} and {max}"))
    }
}

pub fn backup_frequency(value: i64) -> Result<(), String> {
    if BACKUP_FREQUENCIES.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "expected one of: {}",
            BACKUP_FREQUENCIES.iter().join_with(", ")
        ))
    }
}

pub fn iso8601_duration(value: &str) -> Result<(), String> {
    if value == "P" || value.ends_with('T') || !ISO8601_DURATION.is_match(value) {
        Err("expected an ISO 8601 duration such as PT5H".to_owned())
    } else {
        Ok(())
    }
}

pub fn rfc3339(value: &str) -> Result<(), String> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map(|_| ())
        .map_err(|err| format!("expected an RFC 3339 timestamp: {err}"))
}

/// Build a validator checking that a value parses as a resource ID
pub fn resource_id<T, E>(parse: fn(&str) -> Result<T, E>) -> impl Fn(&str) -> Result<(), String>
where
    E: std::fmt::Display,
{
    move |value| parse(value).map(|_| ()).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use crate::ids::SubnetId;

    use super::*;

    #[test]
    fn sql_server_names() {
        assert!(sql_server_name("my-server-01").is_ok());
        assert!(sql_server_name("a").is_ok());
        assert!(sql_server_name("-server").is_err());
        assert!(sql_server_name("server-").is_err());
        assert!(sql_server_name("Server").is_err());
        assert!(sql_server_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn virtual_network_rule_names() {
        assert!(sql_virtual_network_rule_name("rule_1.internal").is_ok());
        assert!(sql_virtual_network_rule_name("rule-").is_err());
        assert!(sql_virtual_network_rule_name("_rule").is_err());
        assert!(sql_virtual_network_rule_name("r").is_err());
    }

    #[test]
    fn redis_names() {
        assert!(redis_cache_name("cache-01").is_ok());
        assert!(redis_cache_name("cache--01").is_err());
        assert!(redis_firewall_rule_name("allow_office").is_ok());
        assert!(redis_firewall_rule_name("allow-office").is_err());
    }

    #[test]
    fn addresses() {
        assert!(ipv4("10.0.0.1").is_ok());
        assert!(ipv4("10.0.0.256").is_err());
        assert!(ipv4("::1").is_err());
    }

    #[test]
    fn enumerations() {
        let policy = one_of(MAXMEMORY_POLICIES, false);
        assert!(policy("allkeys-lru").is_ok());
        assert!(policy("AllKeys-LRU").is_err());

        let day = one_of(DAYS_OF_WEEK, true);
        assert!(day("monday").is_ok());
        assert_eq!(
            one_of(&["1.0", "1.2"], false)("1.1").unwrap_err(),
            "expected one of: 1.0, 1.2"
        );

        assert!(backup_frequency(60).is_ok());
        assert!(backup_frequency(45).is_err());
    }

    #[test]
    fn durations_and_times() {
        assert!(iso8601_duration("PT5H").is_ok());
        assert!(iso8601_duration("P1DT30M").is_ok());
        assert!(iso8601_duration("P").is_err());
        assert!(iso8601_duration("PT").is_err());
        assert!(iso8601_duration("5H").is_err());

        assert!(rfc3339("2024-03-01T10:00:00Z").is_ok());
        assert!(rfc3339("2024-03-01 10:00").is_err());
    }

    #[test]
    fn diagnostics() {
        let mut diags = Diagnostics::default();
        string(
            &mut diags,
            AttributePath::new("subnet_id"),
            &Value::Value(Cow::Borrowed("not-an-id")),
            resource_id(SubnetId::parse),
        );
        string(
            &mut diags,
            AttributePath::new("name"),
            &Value::Unknown,
            sql_server_name,
        );
        number(
            &mut diags,
            AttributePath::new("start_hour_utc"),
            &Value::Value(24),
            0,
            23,
        );
        assert_eq!(diags.errors.len(), 2);
    }
}
