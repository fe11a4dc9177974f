// Step Runners
// Shell execution and artifact publishing

pub mod publish;
pub mod shell;

pub use publish::{ArtifactPublisher, DirRegistry, PublishError, PublishReceipt};
pub use shell::{Shell, ShellConfig, ShellOutput, ShellRunner};
