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

use super::IdError;

/// One `key/value` pair of an ID template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Fixed key followed by a user value, with the name of the field storing it
    Value(&'static str, &'static str),
    /// Fixed key followed by a fixed value (`providers/Microsoft.Sql`)
    Constant(&'static str, &'static str),
}

impl Segment {
    fn key(&self) -> &'static str {
        match self {
            Segment::Value(key, _) | Segment::Constant(key, _) => *key,
        }
    }
}

fn template(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Value(key, field) => format!("/{key}/{{{field}}}"),
            Segment::Constant(key, value) => format!("/{key}/{value}"),
        })
        .collect()
}

fn matches(expected: &str, found: &str, insensitive: bool) -> bool {
    if insensitive {
        expected.eq_ignore_ascii_case(found)
    } else {
        expected == found
    }
}

/// Split `id` along `segments`, returning the values in template order
pub(crate) fn parse_segments(
    description: &'static str,
    segments: &[Segment],
    id: &str,
    insensitive: bool,
) -> Result<Vec<String>, IdError> {
    let parts: Vec<&str> = id
        .strip_prefix('/')
        .unwrap_or(id)
        .trim_end_matches('/')
        .split('/')
        .collect();

    let expected = segments.len() * 2;
    if !id.starts_with('/') || parts.len() != expected {
        return Err(IdError::Length {
            description,
            id: id.to_string(),
            expected,
            found: if id.is_empty() { 0 } else { parts.len() },
            template: template(segments),
        });
    }

    let mut values = Vec::new();
    for (i, (segment, pair)) in segments.iter().zip(parts.chunks(2)).enumerate() {
        let (key, value) = (pair[0], pair[1]);
        let segment_error = |expected: &str| IdError::Segment {
            description,
            id: id.to_string(),
            expected: expected.to_string(),
            position: i * 2,
            template: template(segments),
        };

        if !matches(segment.key(), key, insensitive) {
            return Err(segment_error(segment.key()));
        }

        match segment {
            Segment::Constant(_, constant) => {
                if !matches(constant, value, insensitive) {
                    return Err(segment_error(constant));
                }
            }
            Segment::Value(key, _) => {
                if value.is_empty() {
                    return Err(IdError::EmptyValue {
                        description,
                        id: id.to_string(),
                        key: *key,
                    });
                }
                values.push(value.to_string());
            }
        }
    }

    Ok(values)
}

pub(crate) fn format_segments(
    f: &mut std::fmt::Formatter<'_>,
    segments: &[Segment],
    values: &[&String],
) -> std::fmt::Result {
    let mut values = values.iter();
    for segment in segments {
        match segment {
            Segment::Value(key, _) => {
                let value = values.next().map(|v| v.as_str()).unwrap_or_default();
                write!(f, "/{key}/{value}")?;
            }
            Segment::Constant(key, value) => write!(f, "/{key}/{value}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEGMENTS: &[Segment] = &[
        Segment::Value("subscriptions", "subscription_id"),
        Segment::Constant("providers", "Microsoft.Cache"),
        Segment::Value("redis", "redis_name"),
    ];

    #[test]
    fn template_rendering() {
        assert_eq!(
            template(SEGMENTS),
            "/subscriptions/{subscription_id}/providers/Microsoft.Cache/redis/{redis_name}"
        );
    }

    #[test]
    fn trailing_slash() {
        let values = parse_segments(
            "test",
            SEGMENTS,
            "/subscriptions/sub/providers/Microsoft.Cache/redis/cache/",
            false,
        )
        .unwrap();
        assert_eq!(values, vec!["sub", "cache"]);
    }

    #[test]
    fn missing_leading_slash() {
        let err = parse_segments(
            "test",
            SEGMENTS,
            "subscriptions/sub/providers/Microsoft.Cache/redis/cache",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, IdError::Length { .. }));
    }

    #[test]
    fn empty_id() {
        let err = parse_segments("test", SEGMENTS, "", false).unwrap_err();
        assert!(matches!(err, IdError::Length { found: 0, .. }));
    }

    #[test]
    fn constant_mismatch() {
        let err = parse_segments(
            "test",
            SEGMENTS,
            "/subscriptions/sub/providers/Microsoft.Sql/redis/cache",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, IdError::Segment { position: 2, .. }));
    }
}
