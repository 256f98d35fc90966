//! The export run: open a workbook, inject and run a macro, stamp a page
//! footer, and write the workbook out as PDF.

use std::path::{Path, PathBuf};

use crate::automation::{Automation, FooterPosition, PdfOptions, SheetRef, WorkbookHandle};
use crate::error::{Error, Result, Step, StepContext};
use crate::scoped::ScopedHandle;

/// Footer template; Excel expands `&P` to the current page number.
pub const FOOTER_PREFIX: &str = "Page &P of ";

pub const DEFAULT_WORKBOOK: &str = "Workbook.xlsx";
pub const DEFAULT_MACRO_FILE: &str = "TestMacro.macro";
pub const DEFAULT_ENTRY_POINT: &str = "TestMacro";
pub const DEFAULT_OUTPUT: &str = "Workbook.pdf";

/// Everything one export run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub workbook_path: PathBuf,
    /// Exported VBA module (`.bas`/`.macro`) to import into the workbook.
    pub macro_path: PathBuf,
    /// Sub to run inside the imported module.
    pub entry_point: String,
    /// Destination PDF. An existing file here is deleted first.
    pub output_path: PathBuf,
    /// Worksheet that gets the footer.
    pub sheet: SheetRef,
    pub footer_position: FooterPosition,
    pub open_after_publish: bool,
}

impl ExportJob {
    /// The fixed file layout: `Workbook.xlsx`, `TestMacro.macro`, and
    /// `Workbook.pdf` inside `dir`, running `TestMacro`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            workbook_path: dir.join(DEFAULT_WORKBOOK),
            macro_path: dir.join(DEFAULT_MACRO_FILE),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            output_path: dir.join(DEFAULT_OUTPUT),
            sheet: SheetRef::default(),
            footer_position: FooterPosition::default(),
            open_after_publish: false,
        }
    }

    /// Run the job to completion or to the first failing step.
    ///
    /// Whatever was acquired is torn down before this returns, worksheet
    /// first, then the workbook (close, release), then Excel (quit, release),
    /// regardless of the outcome.
    pub fn run<A: Automation + ?Sized>(&self, xl: &A) -> Result<ExportReport> {
        remove_stale_output(&self.output_path).at_step(Step::PrepareOutput)?;

        let app = xl.create_application().at_step(Step::AcquireApplication)?;
        let app = ScopedHandle::new("application", app, move |h| xl.release(h.0))
            .with_session_end(move |h| xl.quit(*h));
        tracing::info!("Excel started (object {})", app.0);

        xl.suppress_ui(*app).at_step(Step::SuppressUi)?;

        let workbook = xl
            .open_workbook(*app, &self.workbook_path)
            .at_step(Step::OpenWorkbook)?;
        let workbook = ScopedHandle::new("workbook", workbook, move |h| xl.release(h.0))
            .with_session_end(move |h| xl.close_workbook(*h));
        tracing::info!(path = %self.workbook_path.display(), "Opened workbook");

        let module = xl
            .import_module(*workbook, &self.macro_path)
            .at_step(Step::ImportModule)?;
        tracing::info!(module = %module, "Imported macro module");

        let book_name = xl.workbook_name(*workbook).at_step(Step::ImportModule)?;
        let macro_name = qualified_macro_name(&book_name, &module, &self.entry_point);
        xl.run_macro(*app, &macro_name).at_step(Step::RunMacro)?;
        tracing::info!(%macro_name, "Macro finished");

        let footer = self.stamp_footer(xl, *workbook).at_step(Step::SetFooter)?;
        tracing::info!(%footer, sheet = %self.sheet, "Footer set");

        xl.export_pdf(
            *workbook,
            &self.output_path,
            PdfOptions {
                open_after_publish: self.open_after_publish,
            },
        )
        .at_step(Step::ExportPdf)?;
        tracing::info!(path = %self.output_path.display(), "Exported PDF");

        Ok(ExportReport {
            macro_name,
            footer,
            output_path: self.output_path.clone(),
        })
    }

    fn stamp_footer<A: Automation + ?Sized>(
        &self,
        xl: &A,
        workbook: WorkbookHandle,
    ) -> Result<String> {
        let sheet = xl.worksheet(workbook, &self.sheet)?;
        let sheet = ScopedHandle::new("worksheet", sheet, move |h| xl.release(h.0));
        let text = footer_text(xl.page_count(*sheet)?);
        xl.set_footer(*sheet, self.footer_position, &text)?;
        Ok(text)
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub macro_name: String,
    pub footer: String,
    pub output_path: PathBuf,
}

/// The name `Application.Run` wants for a macro in a specific workbook:
/// `Book.xlsx!Module.Entry`.
pub fn qualified_macro_name(workbook: &str, module: &str, entry_point: &str) -> String {
    format!("{workbook}!{module}.{entry_point}")
}

pub fn footer_text(page_count: u32) -> String {
    format!("{FOOTER_PREFIX}{page_count}")
}

fn remove_stale_output(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Removed existing output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_macro_name() {
        assert_eq!(
            qualified_macro_name("Workbook.xlsx", "TestMacro", "TestMacro"),
            "Workbook.xlsx!TestMacro.TestMacro"
        );
        assert_eq!(
            qualified_macro_name("Q3 Report.xlsm", "Module1", "Refresh"),
            "Q3 Report.xlsm!Module1.Refresh"
        );
    }

    #[test]
    fn test_footer_text() {
        assert_eq!(footer_text(3), "Page &P of 3");
        assert_eq!(footer_text(0), "Page &P of 0");
    }

    #[test]
    fn test_in_dir_layout() {
        let job = ExportJob::in_dir("/srv/reports");
        assert_eq!(job.workbook_path, Path::new("/srv/reports/Workbook.xlsx"));
        assert_eq!(job.macro_path, Path::new("/srv/reports/TestMacro.macro"));
        assert_eq!(job.output_path, Path::new("/srv/reports/Workbook.pdf"));
        assert_eq!(job.entry_point, "TestMacro");
        assert_eq!(job.sheet, SheetRef::Index(0));
        assert_eq!(job.footer_position, FooterPosition::Center);
        assert!(!job.open_after_publish);
    }

    #[test]
    fn test_remove_stale_output_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_stale_output(&dir.path().join("absent.pdf")).unwrap();
    }
}
