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

use std::cell::RefCell;
use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tf_provider::schema::Schema;
use tf_provider::{AttributePath, Diagnostics};

pub(crate) trait WithSchema {
    fn schema() -> Schema;
}

pub(crate) trait WithValidate {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath);
}

/// Turn a failed operation into a root diagnostic
pub(crate) trait Report<T> {
    fn report(self, diags: &mut Diagnostics, summary: &str) -> Option<T>;
}

impl<T> Report<T> for anyhow::Result<T> {
    fn report(self, diags: &mut Diagnostics, summary: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!("{summary}: {err:#}");
                diags.root_error(summary.to_owned(), format!("{err:#}"));
                None
            }
        }
    }
}

/// Bound `future` by an operation timeout
pub(crate) async fn with_timeout<T, F>(timeout: Duration, future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("operation timed out after {timeout:?}")),
    }
}

pub struct DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    iter: RefCell<T>,
    sep: &'a str,
}

pub trait DisplayJoinable {
    type Joiner<'a>;
    fn join_with(self, sep: &str) -> Self::Joiner<'_>;
}

impl<T, I> DisplayJoinable for T
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    type Joiner<'a> = DisplayJoiner<'a, T, I>;

    fn join_with(self, sep: &str) -> Self::Joiner<'_> {
        DisplayJoiner {
            iter: RefCell::new(self),
            sep,
        }
    }
}

impl<'a, T, I> std::fmt::Display for DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sep = "";
        let mut iter = self.iter.try_borrow_mut().or(Err(std::fmt::Error))?;
        for elt in iter.by_ref() {
            f.write_str(sep)?;
            f.write_fmt(format_args!("{elt}"))?;
            sep = self.sep;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join() {
        let joined = ["Scaling", "Updating"].iter().join_with(", ").to_string();
        assert_eq!(joined, "Scaling, Updating");
        assert_eq!(std::iter::empty::<&str>().join_with("|").to_string(), "");
    }

    #[test]
    fn report_adds_root_error() {
        let mut diags = Diagnostics::default();
        let ok: anyhow::Result<u8> = Ok(3);
        assert_eq!(ok.report(&mut diags, "Failed"), Some(3));

        let failed: anyhow::Result<u8> = Err(anyhow!("boom"));
        assert_eq!(failed.report(&mut diags, "Failed"), None);
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_elapses() {
        let result = with_timeout(Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }
}
