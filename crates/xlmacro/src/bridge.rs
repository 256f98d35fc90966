//! Subprocess management and JSON IPC for the Excel COM bridge process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use excel_com_protocol::{
    Command as BridgeCommand, FooterPosition, Request, Response, ResponseData, ResponseResult,
    SheetRef,
};

use crate::automation::{
    AppHandle, Automation, ObjectId, PdfOptions, WorkbookHandle, WorksheetHandle,
};
use crate::error::{Error, Result};

const BRIDGE_EXE: &str = "excel-com-bridge.exe";

/// Errors from the Excel COM bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The bridge could not clean up its Excel session on shutdown.
    #[error("Bridge returned error: {0}")]
    BridgeError(String),

    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error("Launcher '{0}' not found. Install WINE and ensure it is in PATH.")]
    LauncherNotFound(String),

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),
}

/// Configuration for the Excel COM bridge.
#[derive(Debug, Clone)]
pub struct ExcelBridgeConfig {
    /// Path to the `excel-com-bridge.exe` Windows executable.
    /// If None, searched next to the current binary and under `target/`.
    pub bridge_exe_path: Option<PathBuf>,

    /// Program that runs the bridge executable (`wine`). None runs it
    /// directly, which is what a Windows host wants.
    pub launcher: Option<PathBuf>,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,
}

impl Default for ExcelBridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            launcher: if cfg!(windows) {
                None
            } else {
                Some(PathBuf::from("wine"))
            },
            wine_prefix: None,
        }
    }
}

/// A running bridge process driving one Excel instance.
///
/// Dropping the bridge without calling [`shutdown`](ExcelBridge::shutdown)
/// still asks the process to shut down.
pub struct ExcelBridge {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
    /// Paths must be translated to `Z:\...` form when running under WINE.
    wine_paths: bool,
    shut_down: bool,
}

impl ExcelBridge {
    /// Spawn the bridge process. Excel itself is started by
    /// [`Automation::create_application`].
    pub fn start(config: ExcelBridgeConfig) -> std::result::Result<Self, BridgeError> {
        let exe_path = config.bridge_exe_path.unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(BridgeError::BridgeExeNotFound(
                exe_path.display().to_string(),
            ));
        }

        let mut cmd = match &config.launcher {
            Some(launcher) => {
                let mut cmd = std::process::Command::new(launcher);
                cmd.arg(&exe_path);
                cmd
            }
            None => std::process::Command::new(&exe_path),
        };

        if let Some(prefix) = &config.wine_prefix {
            cmd.env("WINEPREFIX", prefix);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge diagnostics go to our stderr

        tracing::info!("Starting Excel COM bridge: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| match (&config.launcher, e.kind()) {
            (Some(launcher), std::io::ErrorKind::NotFound) => {
                BridgeError::LauncherNotFound(launcher.display().to_string())
            }
            _ => BridgeError::SpawnFailed(e),
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::NotRunning);
        };

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
            wine_paths: config.launcher.is_some(),
            shut_down: false,
        })
    }

    /// Send a command to the bridge and wait for the response.
    fn send_command(
        &self,
        command: BridgeCommand,
    ) -> std::result::Result<ResponseResult, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;
        tracing::debug!(id, "-> {json}");

        {
            let mut stdin = self.stdin.lock().map_err(|_| BridgeError::NotRunning)?;
            writeln!(stdin, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
            stdin
                .flush()
                .map_err(|e| BridgeError::SendFailed(e.to_string()))?;
        }

        let response: Response = {
            let mut stdout = self.stdout.lock().map_err(|_| BridgeError::NotRunning)?;
            let mut line = String::new();
            stdout
                .read_line(&mut line)
                .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;

            if line.is_empty() {
                return Err(BridgeError::NotRunning);
            }

            tracing::debug!(id, "<- {}", line.trim_end());
            serde_json::from_str(&line)?
        };

        if response.id != id {
            return Err(BridgeError::ReadFailed(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }

        Ok(response.result)
    }

    /// Send one automation command. A transport failure is `Error::Bridge`;
    /// an error reported by Excel itself is `Error::Automation`.
    fn call(&self, command: BridgeCommand) -> Result<Option<ResponseData>> {
        match self.send_command(command)? {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(Error::Automation(message)),
        }
    }

    fn expect_object(&self, command: BridgeCommand, what: &'static str) -> Result<ObjectId> {
        match self.call(command)? {
            Some(ResponseData::Object { object }) => Ok(ObjectId(object)),
            _ => Err(BridgeError::UnexpectedResponse(what).into()),
        }
    }

    fn expect_text(&self, command: BridgeCommand, what: &'static str) -> Result<String> {
        match self.call(command)? {
            Some(ResponseData::Text { text }) => Ok(text),
            _ => Err(BridgeError::UnexpectedResponse(what).into()),
        }
    }

    fn expect_ok(&self, command: BridgeCommand) -> Result<()> {
        self.call(command)?;
        Ok(())
    }

    /// Translate a local path to what Excel on the other side can open.
    fn host_path(&self, path: &Path) -> Result<String> {
        let abs = std::path::absolute(path).map_err(|e| Error::io(path, e))?;
        if self.wine_paths {
            Ok(linux_to_wine_path(&abs))
        } else {
            Ok(abs.display().to_string())
        }
    }

    /// Shut down the bridge: release leftovers, quit Excel, and wait for the
    /// process to exit.
    pub fn shutdown(mut self) -> std::result::Result<(), BridgeError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> std::result::Result<(), BridgeError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let sent = self
            .send_command(BridgeCommand::Shutdown)
            .and_then(|result| match result {
                ResponseResult::Ok { .. } => Ok(()),
                ResponseResult::Error { message } => Err(BridgeError::BridgeError(message)),
            });

        let mut child = self.child.lock().map_err(|_| BridgeError::NotRunning)?;
        if sent.is_err() {
            let _ = child.kill();
        }
        let _ = child.wait();
        sent
    }
}

impl Drop for ExcelBridge {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            tracing::warn!(error = %e, "Bridge shutdown failed");
        }
    }
}

impl Automation for ExcelBridge {
    fn create_application(&self) -> Result<AppHandle> {
        self.expect_object(BridgeCommand::Init, "Init").map(AppHandle)
    }

    fn suppress_ui(&self, app: AppHandle) -> Result<()> {
        self.expect_ok(BridgeCommand::ConfigureApplication {
            app: app.0 .0,
            screen_updating: false,
            display_alerts: false,
            visible: false,
        })
    }

    fn open_workbook(&self, app: AppHandle, path: &Path) -> Result<WorkbookHandle> {
        let path = self.host_path(path)?;
        self.expect_object(BridgeCommand::OpenWorkbook { app: app.0 .0, path }, "OpenWorkbook")
            .map(WorkbookHandle)
    }

    fn workbook_name(&self, workbook: WorkbookHandle) -> Result<String> {
        self.expect_text(
            BridgeCommand::GetWorkbookName {
                workbook: workbook.0 .0,
            },
            "GetWorkbookName",
        )
    }

    fn import_module(&self, workbook: WorkbookHandle, path: &Path) -> Result<String> {
        let path = self.host_path(path)?;
        self.expect_text(
            BridgeCommand::ImportModule {
                workbook: workbook.0 .0,
                path,
            },
            "ImportModule",
        )
    }

    fn run_macro(&self, app: AppHandle, qualified_name: &str) -> Result<()> {
        self.expect_ok(BridgeCommand::RunMacro {
            app: app.0 .0,
            name: qualified_name.to_string(),
        })
    }

    fn worksheet(&self, workbook: WorkbookHandle, sheet: &SheetRef) -> Result<WorksheetHandle> {
        self.expect_object(
            BridgeCommand::GetWorksheet {
                workbook: workbook.0 .0,
                sheet: sheet.clone(),
            },
            "GetWorksheet",
        )
        .map(WorksheetHandle)
    }

    fn page_count(&self, worksheet: WorksheetHandle) -> Result<u32> {
        match self.call(BridgeCommand::GetPageCount {
            worksheet: worksheet.0 .0,
        })? {
            Some(ResponseData::Count { count }) => Ok(count),
            _ => Err(BridgeError::UnexpectedResponse("GetPageCount").into()),
        }
    }

    fn set_footer(
        &self,
        worksheet: WorksheetHandle,
        position: FooterPosition,
        text: &str,
    ) -> Result<()> {
        self.expect_ok(BridgeCommand::SetFooter {
            worksheet: worksheet.0 .0,
            position,
            text: text.to_string(),
        })
    }

    fn export_pdf(
        &self,
        workbook: WorkbookHandle,
        path: &Path,
        options: PdfOptions,
    ) -> Result<()> {
        let path = self.host_path(path)?;
        self.expect_ok(BridgeCommand::ExportPdf {
            workbook: workbook.0 .0,
            path,
            open_after_publish: options.open_after_publish,
        })
    }

    fn close_workbook(&self, workbook: WorkbookHandle) -> Result<()> {
        self.expect_ok(BridgeCommand::CloseWorkbook {
            workbook: workbook.0 .0,
            save_changes: false,
        })
    }

    fn quit(&self, app: AppHandle) -> Result<()> {
        self.expect_ok(BridgeCommand::Quit { app: app.0 .0 })
    }

    fn release(&self, object: ObjectId) -> Result<()> {
        self.expect_ok(BridgeCommand::Release { object: object.0 })
    }
}

/// Convert an absolute Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes `Z:\home\user\file.xlsx`.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    format!("Z:{}", linux_path.display()).replace('/', "\\")
}

/// Attempt to locate the bridge exe relative to the current executable or in common paths.
fn find_bridge_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join(BRIDGE_EXE);
        if candidate.exists() {
            return candidate;
        }
    }

    // Development builds
    for profile in ["release", "debug"] {
        let candidate = PathBuf::from("target/x86_64-pc-windows-gnu")
            .join(profile)
            .join(BRIDGE_EXE);
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from(BRIDGE_EXE)
}
