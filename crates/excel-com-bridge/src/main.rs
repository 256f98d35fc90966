//! Excel COM Bridge — a Windows process that automates Excel via COM,
//! controlled by JSON commands over stdin/stdout.
//!
//! Runs natively on Windows, or cross-compiled from Linux and run under WINE.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostic/log messages go to stderr (never stdout)

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod excel;

#[cfg(not(windows))]
fn main() {
    eprintln!("excel-com-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run natively or under WINE on Linux.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead};

    use excel_com_protocol::*;

    eprintln!("[excel-com-bridge] Starting up...");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut state = BridgeState {
        session: excel::ExcelSession::new(),
        com_initialized: false,
    };

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("[excel-com-bridge] stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                let response = handle_command(&mut state, &request);
                let done = matches!(request.command, Command::Shutdown)
                    && matches!(response.result, ResponseResult::Ok { .. });
                if !write_response(&mut out, &response) || done {
                    if done {
                        eprintln!("[excel-com-bridge] Shutdown complete, exiting.");
                    }
                    break;
                }
                continue;
            }
            Err(e) => {
                eprintln!("[excel-com-bridge] JSON parse error: {e}");
                eprintln!("[excel-com-bridge] Line was: {line}");
                // id=0 since the request could not be parsed
                Response {
                    id: 0,
                    result: ResponseResult::Error {
                        message: format!("JSON parse error: {e}"),
                    },
                }
            }
        };
        if !write_response(&mut out, &response) {
            break;
        }
    }

    if state.com_initialized {
        if !state.session.is_empty() {
            eprintln!("[excel-com-bridge] stdin closed with live objects, cleaning up...");
            if let Err(e) = state.session.shutdown() {
                eprintln!("[excel-com-bridge] Cleanup failed: {e}");
            }
        }
        uninit_com(&mut state);
    }

    eprintln!("[excel-com-bridge] Process exiting.");
}

#[cfg(windows)]
struct BridgeState {
    session: excel::ExcelSession,
    com_initialized: bool,
}

/// Returns false when stdout is gone and the loop should stop.
#[cfg(windows)]
fn write_response(out: &mut impl std::io::Write, response: &excel_com_protocol::Response) -> bool {
    use std::io::Write;

    let json = match serde_json::to_string(response) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("[excel-com-bridge] Failed to encode response: {e}");
            return true;
        }
    };
    writeln!(out, "{json}").and_then(|_| out.flush()).is_ok()
}

#[cfg(windows)]
fn handle_command(
    state: &mut BridgeState,
    request: &excel_com_protocol::Request,
) -> excel_com_protocol::Response {
    use excel_com_protocol::*;

    let id = request.id;

    let outcome = match &request.command {
        Command::Init => init_com(state)
            .and_then(|()| state.session.create_application())
            .map(|app| {
                eprintln!("[excel-com-bridge] Excel.Application created (object {app})");
                ResponseResult::object(app)
            }),
        Command::ConfigureApplication {
            app,
            screen_updating,
            display_alerts,
            visible,
        } => state
            .session
            .configure_application(*app, *screen_updating, *display_alerts, *visible)
            .map(|()| ResponseResult::ok()),
        Command::OpenWorkbook { app, path } => state
            .session
            .open_workbook(*app, path)
            .map(ResponseResult::object),
        Command::GetWorkbookName { workbook } => state
            .session
            .workbook_name(*workbook)
            .map(ResponseResult::text),
        Command::ImportModule { workbook, path } => state
            .session
            .import_module(*workbook, path)
            .map(ResponseResult::text),
        Command::RunMacro { app, name } => state
            .session
            .run_macro(*app, name)
            .map(|()| ResponseResult::ok()),
        Command::GetWorksheet { workbook, sheet } => state
            .session
            .get_worksheet(*workbook, sheet)
            .map(ResponseResult::object),
        Command::GetPageCount { worksheet } => state
            .session
            .page_count(*worksheet)
            .map(ResponseResult::count),
        Command::SetFooter {
            worksheet,
            position,
            text,
        } => state
            .session
            .set_footer(*worksheet, *position, text)
            .map(|()| ResponseResult::ok()),
        Command::ExportPdf {
            workbook,
            path,
            open_after_publish,
        } => state
            .session
            .export_pdf(*workbook, path, *open_after_publish)
            .map(|()| ResponseResult::ok()),
        Command::CloseWorkbook {
            workbook,
            save_changes,
        } => state
            .session
            .close_workbook(*workbook, *save_changes)
            .map(|()| ResponseResult::ok()),
        Command::Quit { app } => state.session.quit(*app).map(|()| ResponseResult::ok()),
        Command::Release { object } => state
            .session
            .release(*object)
            .map(|()| ResponseResult::ok()),
        Command::Shutdown => state
            .session
            .shutdown()
            .map_err(|e| format!("Shutdown failed: {e}"))
            .map(|()| {
                if state.com_initialized {
                    uninit_com(state);
                }
                ResponseResult::ok()
            }),
    };

    let result = match outcome {
        Ok(result) => result,
        Err(message) => {
            eprintln!("[excel-com-bridge] request {id} failed: {message}");
            ResponseResult::Error { message }
        }
    };

    Response { id, result }
}

/// Initialize COM in Single-Threaded Apartment mode (required by Excel).
#[cfg(windows)]
fn init_com(state: &mut BridgeState) -> Result<(), String> {
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if state.com_initialized {
        return Ok(());
    }
    unsafe {
        CoInitializeEx(None, COINIT_APARTMENTTHREADED)
            .ok()
            .map_err(|e| format!("CoInitializeEx failed: {e}"))?;
    }
    state.com_initialized = true;
    eprintln!("[excel-com-bridge] COM initialized (STA)");
    Ok(())
}

#[cfg(windows)]
fn uninit_com(state: &mut BridgeState) {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    state.com_initialized = false;
    eprintln!("[excel-com-bridge] COM uninitialized");
}
