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

use reqwest::StatusCode;
use thiserror::Error;

use crate::ids::IdError;
use crate::wait::WaitError;

/// Errors returned by the Resource Manager client
#[derive(Debug, Error)]
pub enum ArmError {
    /// The API answered with a non-success status
    #[error("unexpected status {status} with error: {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("sending request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decoding response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("obtaining an access token: {0}")]
    Auth(String),

    /// A long-running operation ended in a non successful state
    #[error("long-running operation ended with status {status}: {code}: {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Id(#[from] IdError),
}

impl ArmError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ArmError::Api {
                status: StatusCode::NOT_FOUND,
                ..
            }
        )
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ArmError::Api { status, .. } => Some(*status),
            ArmError::Http(err) => err.status(),
            _ => None,
        }
    }
}

/// Check whether an error chain was caused by a 404 from the API
pub fn was_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<ArmError>())
        .any(ArmError::is_not_found)
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    fn api(status: StatusCode) -> ArmError {
        ArmError::Api {
            status,
            code: "ResourceNotFound".into(),
            message: "The Resource was not found.".into(),
        }
    }

    #[test]
    fn not_found_detection() {
        assert!(api(StatusCode::NOT_FOUND).is_not_found());
        assert!(!api(StatusCode::CONFLICT).is_not_found());
        assert!(!ArmError::Auth("expired".into()).is_not_found());
    }

    #[test]
    fn not_found_through_context() {
        let err = Err::<(), _>(api(StatusCode::NOT_FOUND))
            .context("retrieving Redis cache")
            .unwrap_err();
        assert!(was_not_found(&err));

        let err = Err::<(), _>(api(StatusCode::BAD_REQUEST))
            .context("retrieving Redis cache")
            .unwrap_err();
        assert!(!was_not_found(&err));
    }

    #[test]
    fn display() {
        let err = api(StatusCode::NOT_FOUND);
        assert_eq!(
            err.to_string(),
            "unexpected status 404 Not Found with error: ResourceNotFound: The Resource was not found."
        );
    }
}
