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

//! Polling helpers for long-running Azure operations.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};

use crate::utils::DisplayJoinable;

const MAX_BACKOFF: Duration = Duration::from_secs(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?}){}",
        expected.iter().join_with(", "),
        last_error.as_deref().map(|err| format!(": {err}")).unwrap_or_default()
    )]
    Timeout {
        last_state: String,
        expected: Vec<String>,
        timeout: Duration,
        /// Why the last refresh did not yield a state, if it did not
        last_error: Option<String>,
    },

    #[error(
        "unexpected state '{state}', wanted target '{}'",
        expected.iter().join_with(", ")
    )]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("couldn't find resource ({retries} retries)")]
    NotFound { retries: usize },
}

/// Poll a refresh function until the observed state reaches a target.
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pending: Vec<String>,
    target: Vec<String>,
    delay: Duration,
    min_timeout: Duration,
    poll_interval: Duration,
    timeout: Duration,
    not_found_checks: usize,
    continuous_target_occurence: usize,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            timeout: Duration::from_secs(20 * 60),
            not_found_checks: 20,
            continuous_target_occurence: 1,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn continuous_target_occurence(mut self, occurence: usize) -> Self {
        self.continuous_target_occurence = occurence.max(1);
        self
    }

    /// Run `refresh` until a target state is observed.
    ///
    /// `refresh` yields `None` when the object does not exist (yet), or the
    /// object together with its current state. Errors from `refresh` abort
    /// the wait immediately.
    pub async fn wait_for_state<T, E, F, Fut>(&self, mut refresh: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>, E>>,
        E: From<WaitError>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_state = String::new();
        let mut last_error = None;

        let poll = async {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }

            let mut wait = Duration::from_millis(100);
            let mut not_found = 0;
            let mut target_occurence = 0;

            loop {
                match refresh().await? {
                    None => {
                        not_found += 1;
                        let err = WaitError::NotFound { retries: not_found };
                        if not_found > self.not_found_checks {
                            return Err(err.into());
                        }
                        last_error = Some(err.to_string());
                    }
                    Some((value, state)) => {
                        not_found = 0;
                        last_error = None;
                        tracing::debug!(state = %state, "refreshed state");

                        if self.target.contains(&state) {
                            target_occurence += 1;
                            if target_occurence >= self.continuous_target_occurence {
                                return Ok(value);
                            }
                        } else if self.pending.contains(&state) {
                            target_occurence = 0;
                        } else if !self.pending.is_empty() {
                            return Err(WaitError::UnexpectedState {
                                state,
                                expected: self.target.clone(),
                            }
                            .into());
                        }
                        last_state = state;
                    }
                }

                // Back off unless the target has to be observed again
                if target_occurence == 0 {
                    wait *= 2;
                }
                if !self.poll_interval.is_zero() && self.poll_interval < MAX_POLL_INTERVAL {
                    wait = self.poll_interval;
                } else {
                    wait = wait.min(MAX_BACKOFF).max(self.min_timeout);
                }

                tracing::trace!(?wait, "waiting before next refresh");
                sleep(wait).await;
            }
        };

        let result = timeout_at(deadline, poll).await;
        match result {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout {
                last_state,
                expected: self.target.clone(),
                timeout: self.timeout,
                last_error,
            }
            .into()),
        }
    }
}

/// Outcome of a single attempt inside [`retry`]
#[derive(Debug)]
pub enum Retry<E> {
    Retryable(E),
    NonRetryable(E),
}

/// Re-run `f` until it succeeds, fails permanently or `timeout` elapses.
///
/// On timeout the last retryable error is returned.
pub async fn retry<T, E, F, Fut>(timeout: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Retry<E>>>,
    E: From<WaitError> + std::fmt::Display,
{
    let deadline = Instant::now() + timeout;
    let mut wait = Duration::from_millis(500);
    let mut last_error = None;

    loop {
        match timeout_at(deadline, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(Retry::NonRetryable(err))) => return Err(err),
            Ok(Err(Retry::Retryable(err))) => {
                tracing::debug!(error = %err, "retrying");
                last_error = Some(err);
            }
            Err(_) => break,
        }

        let next = Instant::now() + wait;
        if next >= deadline {
            sleep_until(deadline).await;
            break;
        }
        sleep_until(next).await;
        wait = (wait * 2).min(MAX_BACKOFF);
    }

    Err(last_error.unwrap_or_else(|| {
        WaitError::Timeout {
            last_state: "retryableerror".to_string(),
            expected: vec!["success".to_string()],
            timeout,
            last_error: None,
        }
        .into()
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("api failure: {0}")]
        Api(String),
        #[error(transparent)]
        Wait(#[from] WaitError),
    }

    fn scripted(
        states: &'static [Option<&'static str>],
    ) -> (
        Arc<AtomicUsize>,
        impl FnMut() -> std::future::Ready<Result<Option<(usize, String)>, TestError>>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let refresh = move || {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            let state = states[i.min(states.len() - 1)];
            std::future::ready(Ok(state.map(|s| (i, s.to_string()))))
        };
        (calls, refresh)
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_after_pending() {
        let (calls, refresh) = scripted(&[
            Some("Creating"),
            Some("Scaling"),
            Some("Succeeded"),
        ]);
        let conf = StateChangeConf::new(&["Creating", "Scaling"], &["Succeeded"])
            .min_timeout(Duration::from_secs(15));

        let started = Instant::now();
        let value = conf.wait_for_state(refresh).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two waits clamped to the minimum timeout
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_is_terminal() {
        let (_, refresh) = scripted(&[Some("Creating"), Some("Failed")]);
        let conf = StateChangeConf::new(&["Creating"], &["Succeeded"]);

        let err = conf.wait_for_state(refresh).await.unwrap_err();
        match err {
            TestError::Wait(WaitError::UnexpectedState { state, expected }) => {
                assert_eq!(state, "Failed");
                assert_eq!(expected, vec!["Succeeded".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_target_occurence() {
        let (calls, refresh) = scripted(&[
            Some("Online"),
            Some("Scaling"),
            Some("Online"),
            Some("Online"),
        ]);
        let conf = StateChangeConf::new(&["Scaling"], &["Online"]).continuous_target_occurence(2);

        conf.wait_for_state(refresh).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_last_state() {
        let (_, refresh) = scripted(&[Some("Updating")]);
        let conf = StateChangeConf::new(&["Updating"], &["Succeeded"])
            .poll_interval(Duration::from_secs(30))
            .timeout(Duration::from_secs(120));

        let err = conf.wait_for_state(refresh).await.unwrap_err();
        match err {
            TestError::Wait(WaitError::Timeout {
                last_state, last_error, ..
            }) => {
                assert_eq!(last_state, "Updating");
                assert_eq!(last_error, None);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_while_missing() {
        let (_, refresh) = scripted(&[Some("Creating"), None]);
        let conf = StateChangeConf::new(&["Creating"], &["Succeeded"])
            .poll_interval(Duration::from_secs(30))
            .not_found_checks(100)
            .timeout(Duration::from_secs(120));

        let err = conf.wait_for_state(refresh).await.unwrap_err();
        match &err {
            TestError::Wait(WaitError::Timeout {
                last_state,
                last_error: Some(last_error),
                ..
            }) => {
                assert_eq!(last_state, "Creating");
                assert!(last_error.starts_with("couldn't find resource"), "{last_error}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().ends_with("retries)"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_checks_exhausted() {
        let (calls, refresh) = scripted(&[None]);
        let conf = StateChangeConf::new(&["Creating"], &["Succeeded"]).not_found_checks(3);

        let err = conf.wait_for_state(refresh).await.unwrap_err();
        assert!(matches!(
            err,
            TestError::Wait(WaitError::NotFound { retries: 4 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_error_aborts() {
        let conf = StateChangeConf::new(&["Creating"], &["Succeeded"]);
        let err = conf
            .wait_for_state(|| async {
                Err::<Option<((), String)>, _>(TestError::Api("throttled".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "api failure: throttled");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pending_accepts_any_state() {
        let (calls, refresh) = scripted(&[Some("Whatever"), Some("Ready")]);
        let conf = StateChangeConf::new(&[], &["Ready"]);

        conf.wait_for_state(refresh).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_until_success() {
        let attempts = AtomicUsize::new(0);
        let value = retry(Duration::from_secs(60), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(Retry::Retryable(TestError::Api("not yet".into())))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_last_error_on_timeout() {
        let err = retry(Duration::from_secs(5), || async {
            Err::<(), _>(Retry::Retryable(TestError::Api("still missing".into())))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "api failure: still missing");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_permanent_error() {
        let attempts = AtomicUsize::new(0);
        let err = retry(Duration::from_secs(60), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Retry::NonRetryable(TestError::Api("forbidden".into()))) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "api failure: forbidden");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
