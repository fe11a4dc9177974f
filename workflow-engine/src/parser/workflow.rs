// Workflow YAML Parser
// Parses release-workflow documents into the typed model

use crate::parser::error::{ParseError, ParseErrorKind, ParseResult};
use crate::parser::models::Workflow;

use std::fs;
use std::path::Path;

/// Workflow document parser
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow from a YAML string
    pub fn parse(content: &str) -> ParseResult<Workflow> {
        let workflow: Workflow =
            serde_yaml::from_str(content).map_err(|e| ParseError::from_yaml_error(&e, content))?;

        Ok(workflow)
    }

    /// Parse a workflow from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<Workflow> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ParseError::io(format!("failed to read {}: {}", path.display(), e))
                .with_kind(ParseErrorKind::IoError)
        })?;

        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::models::{StepAction, Value};

    const RELEASE_WORKFLOW: &str = r#"
name: upload release
on:
  release:
    types: [created]

env:
  CARGO_TERM_COLOR: always

jobs:
  package:
    name: Build distribution
    steps:
      - name: build
        run: make dist

  test:
    needs: package
    strategy:
      fail-fast: true
      matrix:
        os: [linux, macos]
        python: ["3.9", "3.10"]
    steps:
      - run: make test

  publish:
    needs: [package, test]
    secrets: [REGISTRY_TOKEN]
    with:
      registry: main
    steps:
      - name: upload
        publish:
          package: cmethods
          path: dist/cmethods.tar.gz
"#;

    #[test]
    fn test_parse_release_workflow() {
        let workflow = WorkflowParser::parse(RELEASE_WORKFLOW).unwrap();

        assert_eq!(workflow.name.as_deref(), Some("upload release"));
        assert_eq!(workflow.jobs.len(), 3);

        let trigger = workflow.trigger.unwrap();
        let release = trigger.release.unwrap();
        assert_eq!(release.types, vec!["created"]);

        let test = &workflow.jobs["test"];
        assert_eq!(test.needs.ids(), vec!["package"]);
        let strategy = test.strategy.as_ref().unwrap();
        assert!(strategy.fail_fast);
        let matrix = strategy.matrix.as_ref().unwrap();
        assert_eq!(matrix["os"].len(), 2);
        assert_eq!(matrix["python"][0], Value::String("3.9".to_string()));

        let publish = &workflow.jobs["publish"];
        assert_eq!(publish.needs.ids(), vec!["package", "test"]);
        assert_eq!(publish.secrets, vec!["REGISTRY_TOKEN"]);
        assert_eq!(
            publish.with.get("registry"),
            Some(&Value::String("main".to_string()))
        );
    }

    #[test]
    fn test_parse_step_actions() {
        let workflow = WorkflowParser::parse(RELEASE_WORKFLOW).unwrap();

        let package = &workflow.jobs["package"];
        match &package.steps[0].action {
            StepAction::Run(run) => assert_eq!(run.run, "make dist"),
            other => panic!("expected run step, got {:?}", other),
        }

        let publish = &workflow.jobs["publish"];
        match &publish.steps[0].action {
            StepAction::Publish(p) => {
                assert_eq!(p.publish.package, "cmethods");
                assert_eq!(p.publish.version, None);
                assert_eq!(p.publish.path, "dist/cmethods.tar.gz");
            }
            other => panic!("expected publish step, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_invalid_yaml_reports_location() {
        let err = WorkflowParser::parse("jobs:\n  a:\n   - broken").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::YamlSyntax);
        assert!(err.line > 0);
    }

    #[test]
    fn test_parse_missing_file() {
        let err = WorkflowParser::parse_file("/nonexistent/workflow.yaml").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::IoError);
    }

    #[test]
    fn test_empty_document_is_empty_workflow() {
        let workflow = WorkflowParser::parse("{}").unwrap();
        assert!(workflow.jobs.is_empty());
        assert!(workflow.name.is_none());
    }
}
