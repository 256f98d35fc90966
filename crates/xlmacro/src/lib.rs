//! Drive Excel through a COM bridge process to run a VBA macro against a
//! workbook and export the result as PDF.
//!
//! # Architecture
//!
//! ```text
//! xlmacro CLI / your Rust code
//!     └── ExportJob::run (this crate)
//!           └── ExcelBridge: impl Automation
//!                 └── spawns: [wine] excel-com-bridge.exe
//!                       └── COM: Excel.Application
//! ```
//!
//! Every object Excel hands out is held in a [`ScopedHandle`], so the workbook
//! is closed and Excel is quit even when a step fails part way.
//!
//! # Example
//!
//! ```rust,no_run
//! use xlmacro::{ExcelBridge, ExcelBridgeConfig, ExportJob};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = ExcelBridge::start(ExcelBridgeConfig::default())?;
//!     let report = ExportJob::in_dir("/srv/reports").run(&bridge)?;
//!     println!("footer: {}", report.footer);
//!     bridge.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod automation;
mod bridge;
pub mod error;
pub mod job;
mod scoped;

pub use automation::{
    AppHandle, Automation, FooterPosition, ObjectId, PdfOptions, SheetRef, WorkbookHandle,
    WorksheetHandle,
};
pub use bridge::{linux_to_wine_path, BridgeError, ExcelBridge, ExcelBridgeConfig};
pub use error::{Error, Result, Step};
pub use job::{footer_text, qualified_macro_name, ExportJob, ExportReport};
pub use scoped::ScopedHandle;
