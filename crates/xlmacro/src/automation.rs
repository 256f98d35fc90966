//! The slice of Excel's object model an export run drives.
//!
//! [`ExcelBridge`](crate::ExcelBridge) implements [`Automation`] against a real
//! Excel instance; tests implement it with recording fakes.

use std::fmt;
use std::path::Path;

pub use excel_com_protocol::{FooterPosition, SheetRef};

use crate::error::Result;

/// Id of an object held by the automation host on our behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `Excel.Application`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppHandle(pub ObjectId);

/// An open `Workbook`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkbookHandle(pub ObjectId);

/// A `Worksheet` inside an open workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorksheetHandle(pub ObjectId);

/// Export options passed to `ExportAsFixedFormat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PdfOptions {
    /// Open the PDF in the default viewer once written.
    pub open_after_publish: bool,
}

/// Operations consumed from the spreadsheet application.
///
/// Every handle returned here must eventually be passed to
/// [`release`](Automation::release) exactly once.
pub trait Automation {
    fn create_application(&self) -> Result<AppHandle>;

    /// Turn off screen updating, alerts, and window visibility.
    fn suppress_ui(&self, app: AppHandle) -> Result<()>;

    fn open_workbook(&self, app: AppHandle, path: &Path) -> Result<WorkbookHandle>;

    /// `Workbook.Name`, e.g. `Workbook.xlsx`.
    fn workbook_name(&self, workbook: WorkbookHandle) -> Result<String>;

    /// Import a VBA module from a file; returns the module's name.
    fn import_module(&self, workbook: WorkbookHandle, path: &Path) -> Result<String>;

    fn run_macro(&self, app: AppHandle, qualified_name: &str) -> Result<()>;

    fn worksheet(&self, workbook: WorkbookHandle, sheet: &SheetRef) -> Result<WorksheetHandle>;

    /// Number of printed pages the worksheet currently lays out to.
    fn page_count(&self, worksheet: WorksheetHandle) -> Result<u32>;

    fn set_footer(
        &self,
        worksheet: WorksheetHandle,
        position: FooterPosition,
        text: &str,
    ) -> Result<()>;

    fn export_pdf(&self, workbook: WorkbookHandle, path: &Path, options: PdfOptions)
        -> Result<()>;

    /// Close without saving.
    fn close_workbook(&self, workbook: WorkbookHandle) -> Result<()>;

    fn quit(&self, app: AppHandle) -> Result<()>;

    fn release(&self, object: ObjectId) -> Result<()>;
}
