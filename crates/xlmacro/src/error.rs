//! Error types for xlmacro.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::bridge::BridgeError;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Steps of an export run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    PrepareOutput,
    AcquireApplication,
    SuppressUi,
    OpenWorkbook,
    ImportModule,
    RunMacro,
    SetFooter,
    ExportPdf,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::PrepareOutput => "prepare output",
            Step::AcquireApplication => "start Excel",
            Step::SuppressUi => "suppress Excel UI",
            Step::OpenWorkbook => "open workbook",
            Step::ImportModule => "import macro module",
            Step::RunMacro => "run macro",
            Step::SetFooter => "set page footer",
            Step::ExportPdf => "export PDF",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure on one of the job's files
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport or process failure talking to the bridge
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Excel rejected an automation call
    #[error("Automation call failed: {0}")]
    Automation(String),

    /// Quit/close/release failed while tearing down a scoped handle
    #[error("Teardown of {resource} failed: {source}")]
    Teardown {
        resource: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A step of the export run failed; the remaining steps were skipped
    #[error("Failed to {step}: {source}")]
    Step {
        step: Step,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn automation<S: Into<String>>(msg: S) -> Self {
        Error::Automation(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// The step a job failed at, if this error came out of a job run.
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Tags errors with the orchestration step they came from.
pub(crate) trait StepContext<T> {
    fn at_step(self, step: Step) -> Result<T>;
}

impl<T> StepContext<T> for Result<T> {
    fn at_step(self, step: Step) -> Result<T> {
        self.map_err(|source| Error::Step {
            step,
            source: Box::new(source),
        })
    }
}
