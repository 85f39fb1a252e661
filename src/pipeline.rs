//! Backend discovery orchestration.
//!
//! A linear state machine with no back-edges: configuration loading,
//! lifecycle hooks, access checks, delegate resolution,
//! validate → build → discover, environment aggregation. Every step's
//! failure aborts the whole run and propagates untouched.

use crate::api::{self, CloudApi};
use crate::backend::BackendSpec;
use crate::config::{ProjectConfig, ProjectRc};
use crate::env;
use crate::error::{Error, Result};
use crate::hooks;
use crate::output;
use crate::request::DiscoveryRequest;
use crate::runtimes::{self, DelegateContext};
use crate::spawn::StdioPolicy;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

/// Everything a completed run hands to the formatter.
#[derive(Debug)]
pub struct DiscoveryOutcome {
    pub context: DelegateContext,
    pub runtime_config: Value,
    /// Result of the runtime-config API gate probe; `None` when the
    /// caller supplied the configuration and the probe was skipped.
    pub runtime_config_enabled: Option<bool>,
    pub backend: BackendSpec,
    pub ignore: Vec<String>,
}

/// Discovery pipeline over a set of remote collaborators.
pub struct DiscoveryPipeline<'a> {
    api: &'a dyn CloudApi,
    policy: StdioPolicy,
}

impl<'a> DiscoveryPipeline<'a> {
    pub fn new(api: &'a dyn CloudApi, policy: StdioPolicy) -> Self {
        DiscoveryPipeline { api, policy }
    }

    pub async fn run(&self, request: &DiscoveryRequest) -> Result<DiscoveryOutcome> {
        let start = Instant::now();

        let config = ProjectConfig::load(&request.firebase_config)?;
        let rc = ProjectRc::load(&config.project_dir)?;
        let project_id = rc.resolve_alias(&request.alias);
        if project_id.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "alias {:?} resolves to an empty project id",
                request.alias
            )));
        }
        info!(project_id = %project_id, "Preparing backend discovery");

        hooks::run_predeploy(
            config.predeploy(),
            &project_id,
            &config.project_dir,
            config.source_dir().ok().as_deref(),
            self.policy,
        )
        .await?;

        let missing = self
            .api
            .test_permissions(&project_id, &[api::CONFIG_GET_PERMISSION])
            .await?;
        if !missing.is_empty() {
            return Err(Error::Permission(missing));
        }
        self.api.check_service_account_iam(&project_id).await?;

        // Source configuration is a fatal precondition, checked before
        // any delegate resolution.
        let source_dir = config.source_dir()?;
        if !source_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "functions source directory {} does not exist",
                source_dir.display()
            )));
        }

        let context = DelegateContext {
            project_id: project_id.clone(),
            source_dir,
            project_dir: config.project_dir.clone(),
            runtime: config.runtime().to_string(),
        };
        let delegate = runtimes::resolve(&context, self.policy).await?;

        info!("Validating {} source", delegate.name());
        delegate.validate().await?;
        info!("Building {} source", delegate.name());
        delegate.build().await?;

        // The two read-only probes are independent; fan out and join.
        let runtime_config_enabled = if request.runtime_config.is_some() {
            self.api
                .ensure_api_enabled(&project_id, api::CLOUD_FUNCTIONS_API)
                .await?;
            None
        } else {
            let ((), enabled) = tokio::try_join!(
                self.api
                    .ensure_api_enabled(&project_id, api::CLOUD_FUNCTIONS_API),
                self.api
                    .check_api_enabled(&project_id, api::RUNTIME_CONFIG_API),
            )?;
            Some(enabled)
        };

        let firebase_config = self.api.get_firebase_config(&project_id).await?;

        let runtime_config = match (&request.runtime_config, runtime_config_enabled) {
            (Some(supplied), _) => {
                debug!("using caller-supplied runtime config");
                supplied.clone()
            }
            (None, Some(true)) => self.api.get_runtime_config(&project_id).await?,
            _ => Value::Null,
        };

        let firebase_envs = env::firebase_envs(&firebase_config, &project_id)?;
        let user_envs = env::load_user_envs(&context.source_dir, &project_id, &request.alias)?;

        info!("Analyzing {} backend spec", delegate.name());
        let mut backend = delegate
            .discover_spec(&runtime_config, &firebase_envs)
            .await?;
        backend.environment_variables = env::merge(&firebase_envs, &user_envs);

        info!(
            endpoints = backend.endpoint_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Discovery complete"
        );
        Ok(DiscoveryOutcome {
            ignore: output::ignore_patterns(config.ignore()),
            context,
            runtime_config,
            runtime_config_enabled,
            backend,
        })
    }
}
