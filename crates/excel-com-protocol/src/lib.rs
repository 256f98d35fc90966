//! Shared protocol types for communication between the `xlmacro` client
//! and the Windows COM bridge process (run natively or under WINE).
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! Every COM object the bridge hands out is identified by a `u64` object id.
//! Ids stay valid until the client sends `Release` for them.

use serde::{Deserialize, Serialize};

/// A command sent from the client to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and create the Excel.Application instance.
    /// Returns an object id for the application.
    Init,

    /// Set the application's UI flags.
    ConfigureApplication {
        app: u64,
        screen_updating: bool,
        display_alerts: bool,
        visible: bool,
    },

    /// Open an existing workbook from a file path (Windows path).
    /// Returns an object id for the workbook.
    OpenWorkbook { app: u64, path: String },

    /// Read `Workbook.Name`.
    GetWorkbookName { workbook: u64 },

    /// Import a VBA module into the workbook's project from a file
    /// (Windows path). Returns the imported component's name.
    ImportModule { workbook: u64, path: String },

    /// Run a macro by its qualified name (`Book.xlsx!Module.Entry`).
    RunMacro { app: u64, name: String },

    /// Look up a worksheet. Returns an object id for the worksheet.
    GetWorksheet { workbook: u64, sheet: SheetRef },

    /// Read `PageSetup.Pages.Count` for a worksheet.
    GetPageCount { worksheet: u64 },

    /// Set one of the worksheet's print footers.
    SetFooter {
        worksheet: u64,
        position: FooterPosition,
        text: String,
    },

    /// Export the workbook as PDF (`ExportAsFixedFormat`) to a Windows path.
    ExportPdf {
        workbook: u64,
        path: String,
        open_after_publish: bool,
    },

    /// Close a workbook. The object id stays valid until released.
    CloseWorkbook { workbook: u64, save_changes: bool },

    /// Quit the application. The object id stays valid until released.
    Quit { app: u64 },

    /// Drop the bridge's reference to a COM object.
    Release { object: u64 },

    /// Shut down the bridge: release leftover objects, quit Excel if it is
    /// still running, uninitialize COM.
    Shutdown,
}

/// Reference to a worksheet — by 0-based index or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetRef {
    Index(u32),
    Name(String),
}

impl Default for SheetRef {
    fn default() -> Self {
        SheetRef::Index(0)
    }
}

/// Excel's `Worksheets.Item` index for a 0-based protocol index, or `None`
/// when it does not fit a COM `long`.
pub fn excel_sheet_index(index: u32) -> Option<i32> {
    i32::try_from(index).ok()?.checked_add(1)
}

impl std::fmt::Display for SheetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetRef::Index(i) => write!(f, "#{i}"),
            SheetRef::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// Which `PageSetup` footer property to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FooterPosition {
    Left,
    #[default]
    Center,
    Right,
}

impl FooterPosition {
    /// Name of the `PageSetup` property backing this footer.
    pub fn property_name(self) -> &'static str {
        match self {
            FooterPosition::Left => "LeftFooter",
            FooterPosition::Center => "CenterFooter",
            FooterPosition::Right => "RightFooter",
        }
    }
}

/// A response sent from the bridge back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Data returned in successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Id of a newly acquired COM object.
    Object { object: u64 },
    /// A string property (workbook name, module name).
    Text { text: String },
    /// A count (printed pages).
    Count { count: u32 },
}

impl ResponseResult {
    pub fn ok() -> Self {
        ResponseResult::Ok { data: None }
    }

    pub fn object(object: u64) -> Self {
        ResponseResult::Ok {
            data: Some(ResponseData::Object { object }),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ResponseResult::Ok {
            data: Some(ResponseData::Text { text: text.into() }),
        }
    }

    pub fn count(count: u32) -> Self {
        ResponseResult::Ok {
            data: Some(ResponseData::Count { count }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let req = Request {
            id: 7,
            command: Command::RunMacro {
                app: 1,
                name: "Workbook.xlsx!TestMacro.TestMacro".into(),
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "cmd": "RunMacro",
                "params": { "app": 1, "name": "Workbook.xlsx!TestMacro.TestMacro" }
            })
        );
    }

    #[test]
    fn test_unit_command_has_no_params() {
        let json = serde_json::to_string(&Request {
            id: 1,
            command: Command::Init,
        })
        .unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.command, Command::Init));
    }

    #[test]
    fn test_sheet_ref_untagged() {
        let idx: SheetRef = serde_json::from_str("2").unwrap();
        assert_eq!(idx, SheetRef::Index(2));
        let name: SheetRef = serde_json::from_str("\"Summary\"").unwrap();
        assert_eq!(name, SheetRef::Name("Summary".into()));
    }

    #[test]
    fn test_response_data_variants() {
        let resp: Response =
            serde_json::from_str(r#"{"id":3,"status":"ok","data":{"count":3}}"#).unwrap();
        match resp.result {
            ResponseResult::Ok { data } => assert_eq!(data, Some(ResponseData::Count { count: 3 })),
            other => panic!("unexpected result: {other:?}"),
        }

        let resp: Response =
            serde_json::from_str(r#"{"id":4,"status":"error","message":"boom"}"#).unwrap();
        assert!(matches!(resp.result, ResponseResult::Error { message } if message == "boom"));

        let resp: Response = serde_json::from_str(r#"{"id":5,"status":"ok"}"#).unwrap();
        assert!(matches!(resp.result, ResponseResult::Ok { data: None }));
    }

    #[test]
    fn test_footer_property_names() {
        assert_eq!(FooterPosition::default().property_name(), "CenterFooter");
        assert_eq!(FooterPosition::Left.property_name(), "LeftFooter");
        assert_eq!(FooterPosition::Right.property_name(), "RightFooter");
    }

    #[test]
    fn test_excel_sheet_index_bounds() {
        assert_eq!(excel_sheet_index(0), Some(1));
        assert_eq!(excel_sheet_index(i32::MAX as u32 - 1), Some(i32::MAX));
        assert_eq!(excel_sheet_index(i32::MAX as u32), None);
        assert_eq!(excel_sheet_index(u32::MAX), None);
    }
}
