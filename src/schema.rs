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

//! Shared schema builders and state value helpers.

use std::borrow::Cow;
use std::collections::BTreeMap;

use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType};
use tf_provider::value::{Value, ValueList, ValueMap, ValueString};
use tf_provider::schema::Description;

pub fn attribute(
    attr_type: AttributeType,
    constraint: AttributeConstraint,
    description: &str,
) -> Attribute {
    Attribute {
        attr_type,
        description: Description::plain(description),
        constraint,
        ..Default::default()
    }
}

pub fn required(attr_type: AttributeType, description: &str) -> Attribute {
    attribute(attr_type, AttributeConstraint::Required, description)
}

pub fn optional(attr_type: AttributeType, description: &str) -> Attribute {
    attribute(attr_type, AttributeConstraint::Optional, description)
}

pub fn computed(attr_type: AttributeType, description: &str) -> Attribute {
    attribute(attr_type, AttributeConstraint::Computed, description)
}

/// Optional attribute whose value is filled by the provider when not configured
pub fn defaulted(attr_type: AttributeType, description: &str) -> Attribute {
    attribute(attr_type, AttributeConstraint::OptionalComputed, description)
}

pub fn sensitive(attribute: Attribute) -> Attribute {
    Attribute {
        sensitive: true,
        ..attribute
    }
}

pub fn string_set() -> AttributeType {
    AttributeType::Set(Box::new(AttributeType::String))
}

pub fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

pub fn string_map() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

pub fn id() -> Attribute {
    computed(AttributeType::String, "ID of the resource")
}

pub fn resource_group_name() -> Attribute {
    required(
        AttributeType::String,
        "Name of the resource group the resource belongs to",
    )
}

pub fn location() -> Attribute {
    required(
        AttributeType::String,
        "Azure region where the resource exists",
    )
}

pub fn tags() -> Attribute {
    optional(string_map(), "Tags assigned to the resource")
}

/// Canonical form of an Azure region (`West Europe` -> `westeurope`)
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

pub fn string<'a>(value: impl Into<String>) -> ValueString<'a> {
    Value::Value(Cow::Owned(value.into()))
}

pub fn optional_string<'a, S: Into<String>>(value: Option<S>) -> ValueString<'a> {
    value.map_or(Value::Null, string)
}

pub fn value_of<T>(value: Option<T>) -> Value<T> {
    value.map_or(Value::Null, Value::Value)
}

/// Known string value, `None` when null or unknown
pub fn known<'b>(value: &'b ValueString<'_>) -> Option<&'b str> {
    value.as_deref_option().filter(|s| !s.is_empty())
}

/// Replace a null value by `default`
pub fn default_to<T>(field: &mut Value<T>, default: T) {
    if field.is_null() {
        *field = Value::Value(default);
    }
}

/// Known number carried as a decimal string, for attributes with a fractional part
pub fn decimal(value: &ValueString<'_>) -> Option<f64> {
    known(value)?.parse().ok()
}

pub fn from_decimal<'a>(value: Option<f64>) -> ValueString<'a> {
    optional_string(value.map(|value| value.to_string()))
}

/// Content of a block limited to a single element
pub fn single<T>(blocks: &ValueList<Value<T>>) -> Option<&T> {
    blocks.as_ref_option()?.first()?.as_ref_option()
}

/// Number of elements of a block list, `None` while unknown
pub fn block_len<T>(blocks: &ValueList<Value<T>>) -> Option<usize> {
    match blocks {
        Value::Value(blocks) => Some(blocks.len()),
        Value::Null => Some(0),
        Value::Unknown => None,
    }
}

pub fn block<T>(value: T) -> ValueList<Value<T>> {
    Value::Value(vec![Value::Value(value)])
}

/// Same list shape as `current` for an empty API answer
pub fn empty_like<T>(current: &ValueList<T>) -> ValueList<T> {
    match current {
        Value::Value(_) => Value::Value(Vec::new()),
        _ => Value::Null,
    }
}

pub fn expand_tags(tags: &ValueMap<'_, ValueString<'_>>) -> Option<BTreeMap<String, String>> {
    let tags = tags.as_ref_option()?;
    Some(
        tags.iter()
            .filter_map(|(key, value)| Some((key.to_string(), value.as_deref_option()?.to_owned())))
            .collect(),
    )
}

/// Empty and missing tags are both stored as null
pub fn flatten_tags<'a>(tags: Option<&BTreeMap<String, String>>) -> ValueMap<'a, ValueString<'a>> {
    match tags {
        Some(tags) if !tags.is_empty() => Value::Value(
            tags.iter()
                .map(|(key, value)| (Cow::Owned(key.clone()), string(value.as_str())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Known elements of a list or block
pub fn elements<T>(list: &ValueList<Value<T>>) -> impl Iterator<Item = &T> {
    list.as_ref_option()
        .into_iter()
        .flatten()
        .filter_map(Value::as_ref_option)
}

pub fn elements_mut<T>(list: &mut ValueList<Value<T>>) -> impl Iterator<Item = &mut T> {
    let list = match list {
        Value::Value(list) => Some(list),
        _ => None,
    };
    list.into_iter().flatten().filter_map(|element| match element {
        Value::Value(element) => Some(element),
        _ => None,
    })
}

pub fn expand_string_set(values: &ValueList<ValueString<'_>>) -> Vec<String> {
    elements(values).map(|value| value.to_string()).collect()
}

/// How the values returned by the API are merged into a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// After create or update: only the values the plan left unknown
    Unknowns,
    /// On read: every value, to detect drift
    All,
}

impl Refresh {
    pub fn set<T>(self, field: &mut Value<T>, value: Value<T>) {
        if self == Refresh::All || field.is_unknown() {
            *field = value;
        }
    }

    /// Set a string that the API may return with a different casing
    pub fn set_ignoring_case<'a>(self, field: &mut ValueString<'a>, value: Option<&str>) {
        let same = matches!(
            (field.as_deref_option(), value),
            (Some(current), Some(value)) if current.eq_ignore_ascii_case(value)
        );
        if !same {
            self.set(field, optional_string(value));
        }
    }

    /// Set a location, keeping the configured spelling when equivalent
    pub fn set_location<'a>(self, field: &mut ValueString<'a>, value: Option<&str>) {
        let same = matches!(
            (field.as_deref_option(), value),
            (Some(current), Some(value)) if normalize_location(current) == normalize_location(value)
        );
        if !same {
            self.set(field, optional_string(value.map(normalize_location)));
        }
    }
}

/// Attribute paths whose value differs between the prior and proposed states
macro_rules! force_new {
    ($prior:expr, $proposed:expr, [$($field:ident),* $(,)?]) => {{
        let mut paths: Vec<tf_provider::AttributePath> = Vec::new();
        $(
            if $prior.$field != $proposed.$field {
                paths.push(tf_provider::AttributePath::new(stringify!($field)));
            }
        )*
        paths
    }};
}

pub(crate) use force_new;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations() {
        assert_eq!(normalize_location("West Europe"), "westeurope");

        let mut field = string("West Europe");
        Refresh::All.set_location(&mut field, Some("westeurope"));
        assert_eq!(field.as_str(), "West Europe");

        Refresh::All.set_location(&mut field, Some("North Europe"));
        assert_eq!(field.as_str(), "northeurope");
    }

    #[test]
    fn refresh_modes() {
        let mut known = string("configured");
        Refresh::Unknowns.set(&mut known, string("returned"));
        assert_eq!(known.as_str(), "configured");

        let mut unknown: ValueString = Value::Unknown;
        Refresh::Unknowns.set(&mut unknown, string("returned"));
        assert_eq!(unknown.as_str(), "returned");

        Refresh::All.set(&mut known, Value::Null);
        assert!(known.is_null());

        let mut family = string("p");
        Refresh::All.set_ignoring_case(&mut family, Some("P"));
        assert_eq!(family.as_str(), "p");
    }

    #[test]
    fn tags_round_trip() {
        assert!(flatten_tags(Some(&BTreeMap::new())).is_null());

        let tags = BTreeMap::from([("env".to_owned(), "prod".to_owned())]);
        let flattened = flatten_tags(Some(&tags));
        assert_eq!(expand_tags(&flattened), Some(tags));
        assert_eq!(expand_tags(&Value::Null), None);
    }

    #[test]
    fn decimals_and_blocks() {
        assert_eq!(decimal(&string("0.25")), Some(0.25));
        assert_eq!(decimal(&string("a quarter")), None);
        assert_eq!(from_decimal(Some(2.0)).as_str(), "2");

        let blocks = block(string("only"));
        assert_eq!(single(&blocks).map(|value| value.as_str()), Some("only"));
        assert!(single::<ValueString>(&Value::Value(vec![])).is_none());
    }

    #[test]
    fn replacement_paths() {
        struct State {
            name: ValueString<'static>,
            location: ValueString<'static>,
        }
        let prior = State {
            name: string("a"),
            location: string("westeurope"),
        };
        let proposed = State {
            name: string("b"),
            location: string("westeurope"),
        };
        let paths = force_new!(prior, proposed, [name, location]);
        assert_eq!(paths.len(), 1);
    }
}
