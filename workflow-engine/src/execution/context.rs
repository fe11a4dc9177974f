// Run Context
// Trigger payload, environment assembly, and secret resolution for a run

use crate::error::ExecError;
use crate::execution::matrix::MatrixInstance;
use crate::parser::models::JobSpec;
use crate::secrets::SecretStore;

use std::collections::HashMap;
use std::path::PathBuf;

/// The release event that triggered the run
#[derive(Debug, Clone, Default)]
pub struct ReleaseEvent {
    /// Version/tag identifier, e.g. "v1.0.2"
    pub tag: String,
    /// Release title, if any
    pub name: Option<String>,
    /// Whether the release is marked as a prerelease
    pub prerelease: bool,
}

impl ReleaseEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            name: None,
            prerelease: false,
        }
    }
}

/// Context shared by every instance of a run
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Working directory instances execute in
    pub working_dir: PathBuf,
    /// Triggering release event
    pub release: ReleaseEvent,
    /// Workflow-level environment (from the `env:` block)
    pub base_env: HashMap<String, String>,
    /// Secrets available to jobs that declare them
    pub secrets: SecretStore,
}

impl RunContext {
    pub fn new(working_dir: impl Into<PathBuf>, release: ReleaseEvent) -> Self {
        Self {
            working_dir: working_dir.into(),
            release,
            base_env: HashMap::new(),
            secrets: SecretStore::new(),
        }
    }

    pub fn with_base_env(mut self, env: HashMap<String, String>) -> Self {
        self.base_env = env;
        self
    }

    pub fn with_secrets(mut self, secrets: SecretStore) -> Self {
        self.secrets = secrets;
        self
    }

    /// Assemble the environment for one job instance.
    ///
    /// Later layers win: workflow env, job env, `with` inputs (INPUT_*),
    /// matrix values (MATRIX_*), release payload (RELEASE_*), then the
    /// job's declared secrets by name. A declared secret that the store
    /// cannot resolve fails the instance before any step runs.
    pub fn instance_env(
        &self,
        job: &JobSpec,
        matrix: &MatrixInstance,
    ) -> Result<HashMap<String, String>, ExecError> {
        let mut env = self.base_env.clone();

        for (key, value) in &job.env {
            env.insert(key.clone(), value.clone());
        }

        for (key, value) in &job.with {
            env.insert(format!("INPUT_{}", env_name(key)), value.as_string());
        }

        for (axis, value) in &matrix.values {
            env.insert(format!("MATRIX_{}", env_name(axis)), value.as_string());
        }

        env.insert("RELEASE_TAG".to_string(), self.release.tag.clone());
        if let Some(name) = &self.release.name {
            env.insert("RELEASE_NAME".to_string(), name.clone());
        }
        env.insert(
            "RELEASE_PRERELEASE".to_string(),
            self.release.prerelease.to_string(),
        );

        for name in &job.secrets {
            let secret = self
                .secrets
                .resolve(name)
                .ok_or_else(|| ExecError::MissingSecret { name: name.clone() })?;
            env.insert(name.clone(), secret.expose().to_string());
        }

        Ok(env)
    }
}

/// Uppercase a key and replace anything that is not alphanumeric with '_'
fn env_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::models::Value;
    use std::collections::BTreeMap;

    fn make_job() -> JobSpec {
        let mut with = BTreeMap::new();
        with.insert("registry".to_string(), Value::from("main"));

        let mut env = HashMap::new();
        env.insert("JOB_VAR".to_string(), "job".to_string());

        JobSpec {
            with,
            env,
            secrets: vec!["REGISTRY_TOKEN".to_string()],
            ..Default::default()
        }
    }

    fn make_matrix() -> MatrixInstance {
        let mut values = BTreeMap::new();
        values.insert("os".to_string(), Value::from("linux"));
        values.insert("python-version".to_string(), Value::from("3.9"));
        MatrixInstance { values }
    }

    #[test]
    fn test_instance_env_layers() {
        let mut base = HashMap::new();
        base.insert("WF_VAR".to_string(), "wf".to_string());

        let mut release = ReleaseEvent::new("v1.0.2");
        release.name = Some("First fix release".to_string());

        let ctx = RunContext::new("/tmp", release)
            .with_base_env(base)
            .with_secrets(SecretStore::from_pairs([("REGISTRY_TOKEN", "tok")]));

        let env = ctx.instance_env(&make_job(), &make_matrix()).unwrap();

        assert_eq!(env["WF_VAR"], "wf");
        assert_eq!(env["JOB_VAR"], "job");
        assert_eq!(env["INPUT_REGISTRY"], "main");
        assert_eq!(env["MATRIX_OS"], "linux");
        assert_eq!(env["MATRIX_PYTHON_VERSION"], "3.9");
        assert_eq!(env["RELEASE_TAG"], "v1.0.2");
        assert_eq!(env["RELEASE_NAME"], "First fix release");
        assert_eq!(env["RELEASE_PRERELEASE"], "false");
        assert_eq!(env["REGISTRY_TOKEN"], "tok");
    }

    #[test]
    fn test_missing_secret_fails() {
        let ctx = RunContext::new("/tmp", ReleaseEvent::new("v1.0.0"));

        let err = ctx
            .instance_env(&make_job(), &MatrixInstance::default())
            .unwrap_err();
        assert!(matches!(err, ExecError::MissingSecret { name } if name == "REGISTRY_TOKEN"));
    }

    #[test]
    fn test_secrets_only_for_declaring_jobs() {
        let ctx = RunContext::new("/tmp", ReleaseEvent::new("v1.0.0"))
            .with_secrets(SecretStore::from_pairs([("REGISTRY_TOKEN", "tok")]));

        let job = JobSpec::default();
        let env = ctx.instance_env(&job, &MatrixInstance::default()).unwrap();
        assert!(!env.contains_key("REGISTRY_TOKEN"));
    }

    #[test]
    fn test_env_name_sanitizes() {
        assert_eq!(env_name("python-version"), "PYTHON_VERSION");
        assert_eq!(env_name("os"), "OS");
    }
}
