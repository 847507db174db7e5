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

//! Glue between Terraform resource callbacks and the ARM handlers.
//!
//! Every Azure resource is a struct holding the shared [`ClientHandle`] with
//! inherent handlers:
//!
//! * `plan_state(&self, diags, &mut state, prior)` fills defaults and marks
//!   computed values unknown (all of them when `prior` is `None`),
//! * `replacements(prior, proposed)` lists the attributes forcing a new object,
//! * `create_state`, `read_state`, `update_state`, `delete_state` talk to the
//!   API and return `anyhow` errors with context,
//! * `import_state(id)` builds a state from an import ID.
//!
//! [`arm_resource!`] implements [`tf_provider::Resource`] on top of them,
//! bounding each call by the `timeouts` block of the state.
//!
//! [`ClientHandle`]: crate::provider::ClientHandle

macro_rules! arm_resource {
    ($resource:ident, $state:ident, $what:literal, $timeouts:expr) => {
        #[derive(Debug, Default, Clone)]
        pub struct $resource {
            clients: $crate::provider::ClientHandle,
        }

        impl $resource {
            pub fn new(clients: $crate::provider::ClientHandle) -> Self {
                Self { clients }
            }

            fn timeouts(
                diags: &mut tf_provider::Diagnostics,
                state: &$state<'_>,
            ) -> Option<$crate::timeouts::Timeouts> {
                use $crate::utils::Report;
                $timeouts
                    .resolve(&state.timeouts)
                    .report(diags, "Invalid timeouts")
            }
        }

        #[async_trait::async_trait]
        impl tf_provider::Resource for $resource {
            type State<'a> = $state<'a>;
            type PrivateState<'a> = tf_provider::value::ValueEmpty;
            type ProviderMetaState<'a> = tf_provider::value::ValueEmpty;

            fn schema(&self, _diags: &mut tf_provider::Diagnostics) -> Option<tf_provider::schema::Schema> {
                Some(<$state as $crate::utils::WithSchema>::schema())
            }

            async fn validate<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                config: Self::State<'a>,
            ) -> Option<()> {
                <$state as $crate::utils::WithValidate>::validate(
                    &config,
                    diags,
                    tf_provider::AttributePath::default(),
                );

                if diags.errors.is_empty() {
                    Some(())
                } else {
                    None
                }
            }

            async fn read<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                state: Self::State<'a>,
                private_state: Self::PrivateState<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
                use $crate::utils::Report;

                let clients = self.clients.get_or_report(diags)?;
                let timeouts = Self::timeouts(diags, &state)?;
                let id = state.id.as_str().to_owned();

                let refreshed = $crate::utils::with_timeout(
                    timeouts.read,
                    self.read_state(&clients, state),
                )
                .await
                .report(diags, concat!("Failed to read ", $what))?;

                match refreshed {
                    Some(state) => Some((state, private_state)),
                    None => {
                        tracing::info!(%id, "{} not found, removing it from state", $what);
                        None
                    }
                }
            }

            async fn plan_create<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                proposed_state: Self::State<'a>,
                _config_state: Self::State<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
                let mut state = proposed_state;
                state.id = tf_provider::value::Value::Unknown;
                self.plan_state(diags, &mut state, None);

                if diags.errors.is_empty() {
                    Some((state, Default::default()))
                } else {
                    None
                }
            }

            async fn plan_update<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                prior_state: Self::State<'a>,
                proposed_state: Self::State<'a>,
                _config_state: Self::State<'a>,
                prior_private_state: Self::PrivateState<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<(
                Self::State<'a>,
                Self::PrivateState<'a>,
                Vec<tf_provider::AttributePath>,
            )> {
                let mut state = proposed_state;
                let trigger_replace = Self::replacements(&prior_state, &state);

                if trigger_replace.is_empty() {
                    self.plan_state(diags, &mut state, Some(&prior_state));
                } else {
                    state.id = tf_provider::value::Value::Unknown;
                    self.plan_state(diags, &mut state, None);
                }

                if diags.errors.is_empty() {
                    Some((state, prior_private_state, trigger_replace))
                } else {
                    None
                }
            }

            async fn plan_destroy<'a>(
                &self,
                _diags: &mut tf_provider::Diagnostics,
                _prior_state: Self::State<'a>,
                prior_private_state: Self::PrivateState<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<Self::PrivateState<'a>> {
                Some(prior_private_state)
            }

            async fn create<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                planned_state: Self::State<'a>,
                _config_state: Self::State<'a>,
                private_state: Self::PrivateState<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
                use $crate::utils::Report;

                let clients = self.clients.get_or_report(diags)?;
                let timeouts = Self::timeouts(diags, &planned_state)?;

                let state = $crate::utils::with_timeout(
                    timeouts.create,
                    self.create_state(&clients, planned_state, timeouts),
                )
                .await
                .report(diags, concat!("Failed to create ", $what))?;

                Some((state, private_state))
            }

            async fn update<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                prior_state: Self::State<'a>,
                planned_state: Self::State<'a>,
                _config_state: Self::State<'a>,
                private_state: Self::PrivateState<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
                use $crate::utils::Report;

                let clients = self.clients.get_or_report(diags)?;
                let timeouts = Self::timeouts(diags, &planned_state)?;

                let state = $crate::utils::with_timeout(
                    timeouts.update,
                    self.update_state(&clients, prior_state, planned_state, timeouts),
                )
                .await
                .report(diags, concat!("Failed to update ", $what))?;

                Some((state, private_state))
            }

            async fn destroy<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                state: Self::State<'a>,
                _planned_private_state: Self::PrivateState<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<()> {
                use $crate::utils::Report;

                let clients = self.clients.get_or_report(diags)?;
                let timeouts = Self::timeouts(diags, &state)?;

                $crate::utils::with_timeout(
                    timeouts.delete,
                    self.delete_state(&clients, state, timeouts),
                )
                .await
                .report(diags, concat!("Failed to delete ", $what))
            }

            async fn import<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                id: String,
            ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
                use $crate::utils::Report;

                let state = Self::import_state(&id).report(diags, concat!("Failed to import ", $what))?;
                Some((state, Default::default()))
            }
        }
    };
}

pub(crate) use arm_resource;

/// Error returned when creating an object that already exists
pub fn already_exists(resource_type: &str, id: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!(
        "a resource with the ID \"{id}\" already exists - to be managed via Terraform this resource needs to be imported into the State. Please see the resource documentation for {resource_type:?} for more information"
    )
}

/// Implement [`tf_provider::DataSource`] for a struct holding a
/// [`ClientHandle`](crate::provider::ClientHandle), on top of an inherent
/// `read_state(&self, clients, config)` returning the looked-up state.
macro_rules! arm_data_source {
    ($data_source:ident, $state:ident, $what:literal) => {
        #[derive(Debug, Default, Clone)]
        pub struct $data_source {
            clients: $crate::provider::ClientHandle,
        }

        impl $data_source {
            pub fn new(clients: $crate::provider::ClientHandle) -> Self {
                Self { clients }
            }
        }

        #[async_trait::async_trait]
        impl tf_provider::DataSource for $data_source {
            type State<'a> = $state<'a>;
            type ProviderMetaState<'a> = tf_provider::value::ValueEmpty;

            fn schema(&self, _diags: &mut tf_provider::Diagnostics) -> Option<tf_provider::schema::Schema> {
                Some(<$state as $crate::utils::WithSchema>::schema())
            }

            async fn validate<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                config: Self::State<'a>,
            ) -> Option<()> {
                <$state as $crate::utils::WithValidate>::validate(
                    &config,
                    diags,
                    tf_provider::AttributePath::default(),
                );

                if diags.errors.is_empty() {
                    Some(())
                } else {
                    None
                }
            }

            async fn read<'a>(
                &self,
                diags: &mut tf_provider::Diagnostics,
                config: Self::State<'a>,
                _provider_meta_state: Self::ProviderMetaState<'a>,
            ) -> Option<Self::State<'a>> {
                use $crate::utils::Report;

                let clients = self.clients.get_or_report(diags)?;
                $crate::utils::with_timeout(
                    $crate::timeouts::DATA_SOURCE_READ,
                    self.read_state(&clients, config),
                )
                .await
                .report(diags, concat!("Failed to read ", $what))
            }
        }
    };
}

pub(crate) use arm_data_source;
