//! Export runs against a recording fake of the Excel automation surface.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use xlmacro::{
    AppHandle, Automation, Error, ExportJob, FooterPosition, ObjectId, PdfOptions, SheetRef, Step,
    WorkbookHandle, WorksheetHandle,
};

const APP: ObjectId = ObjectId(1);
const BOOK: ObjectId = ObjectId(2);
const SHEET: ObjectId = ObjectId(3);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    CreateApplication,
    SuppressUi,
    OpenWorkbook(PathBuf),
    WorkbookName,
    ImportModule(PathBuf),
    RunMacro(String),
    Worksheet(SheetRef),
    PageCount,
    SetFooter(FooterPosition, String),
    /// Records whether the target already existed when export started.
    ExportPdf { existed: bool },
    CloseWorkbook,
    Quit,
    Release(ObjectId),
}

/// Records every call; fails the operation named in `fail_on`.
struct FakeExcel {
    calls: RefCell<Vec<Call>>,
    fail_on: Option<&'static str>,
    failing_releases: HashSet<ObjectId>,
    pages: u32,
    book_name: String,
    module_name: String,
    released: RefCell<HashSet<ObjectId>>,
    double_releases: Cell<u32>,
}

impl FakeExcel {
    fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail_on: None,
            failing_releases: HashSet::new(),
            pages: 3,
            book_name: "Workbook.xlsx".into(),
            module_name: "TestMacro".into(),
            released: RefCell::new(HashSet::new()),
            double_releases: Cell::new(0),
        }
    }

    fn failing_on(op: &'static str) -> Self {
        Self {
            fail_on: Some(op),
            ..Self::new()
        }
    }

    fn record(&self, op: &'static str, call: Call) -> xlmacro::Result<()> {
        self.calls.borrow_mut().push(call);
        if self.fail_on == Some(op) {
            Err(Error::automation(format!("{op} exploded")))
        } else {
            Ok(())
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Teardown calls only, in order.
    fn teardown(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CloseWorkbook | Call::Quit | Call::Release(_)))
            .collect()
    }
}

impl Automation for FakeExcel {
    fn create_application(&self) -> xlmacro::Result<AppHandle> {
        self.record("create_application", Call::CreateApplication)?;
        Ok(AppHandle(APP))
    }

    fn suppress_ui(&self, app: AppHandle) -> xlmacro::Result<()> {
        assert_eq!(app, AppHandle(APP));
        self.record("suppress_ui", Call::SuppressUi)
    }

    fn open_workbook(&self, _app: AppHandle, path: &Path) -> xlmacro::Result<WorkbookHandle> {
        self.record("open_workbook", Call::OpenWorkbook(path.to_path_buf()))?;
        Ok(WorkbookHandle(BOOK))
    }

    fn workbook_name(&self, _workbook: WorkbookHandle) -> xlmacro::Result<String> {
        self.record("workbook_name", Call::WorkbookName)?;
        Ok(self.book_name.clone())
    }

    fn import_module(&self, _workbook: WorkbookHandle, path: &Path) -> xlmacro::Result<String> {
        self.record("import_module", Call::ImportModule(path.to_path_buf()))?;
        Ok(self.module_name.clone())
    }

    fn run_macro(&self, _app: AppHandle, qualified_name: &str) -> xlmacro::Result<()> {
        self.record("run_macro", Call::RunMacro(qualified_name.to_string()))
    }

    fn worksheet(
        &self,
        workbook: WorkbookHandle,
        sheet: &SheetRef,
    ) -> xlmacro::Result<WorksheetHandle> {
        assert_eq!(workbook, WorkbookHandle(BOOK));
        self.record("worksheet", Call::Worksheet(sheet.clone()))?;
        Ok(WorksheetHandle(SHEET))
    }

    fn page_count(&self, _worksheet: WorksheetHandle) -> xlmacro::Result<u32> {
        self.record("page_count", Call::PageCount)?;
        Ok(self.pages)
    }

    fn set_footer(
        &self,
        _worksheet: WorksheetHandle,
        position: FooterPosition,
        text: &str,
    ) -> xlmacro::Result<()> {
        self.record("set_footer", Call::SetFooter(position, text.to_string()))
    }

    fn export_pdf(
        &self,
        _workbook: WorkbookHandle,
        path: &Path,
        _options: PdfOptions,
    ) -> xlmacro::Result<()> {
        self.record(
            "export_pdf",
            Call::ExportPdf {
                existed: path.exists(),
            },
        )?;
        std::fs::write(path, b"%PDF-1.7\n").map_err(|e| Error::automation(e.to_string()))
    }

    fn close_workbook(&self, _workbook: WorkbookHandle) -> xlmacro::Result<()> {
        self.record("close_workbook", Call::CloseWorkbook)
    }

    fn quit(&self, _app: AppHandle) -> xlmacro::Result<()> {
        self.record("quit", Call::Quit)
    }

    fn release(&self, object: ObjectId) -> xlmacro::Result<()> {
        self.calls.borrow_mut().push(Call::Release(object));
        if !self.released.borrow_mut().insert(object) {
            self.double_releases.set(self.double_releases.get() + 1);
        }
        if self.failing_releases.contains(&object) {
            Err(Error::automation(format!("release of {object} failed")))
        } else {
            Ok(())
        }
    }
}

fn job_in(dir: &Path) -> ExportJob {
    ExportJob::in_dir(dir)
}

fn full_teardown() -> Vec<Call> {
    vec![
        Call::Release(SHEET),
        Call::CloseWorkbook,
        Call::Release(BOOK),
        Call::Quit,
        Call::Release(APP),
    ]
}

#[test]
fn test_successful_run_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let job = job_in(dir.path());
    let xl = FakeExcel::new();

    let report = job.run(&xl).unwrap();

    assert_eq!(report.macro_name, "Workbook.xlsx!TestMacro.TestMacro");
    assert_eq!(report.footer, "Page &P of 3");
    assert_eq!(report.output_path, dir.path().join("Workbook.pdf"));
    assert!(report.output_path.exists());

    let mut expected = vec![
        Call::CreateApplication,
        Call::SuppressUi,
        Call::OpenWorkbook(dir.path().join("Workbook.xlsx")),
        Call::ImportModule(dir.path().join("TestMacro.macro")),
        Call::WorkbookName,
        Call::RunMacro("Workbook.xlsx!TestMacro.TestMacro".into()),
        Call::Worksheet(SheetRef::Index(0)),
        Call::PageCount,
        Call::SetFooter(FooterPosition::Center, "Page &P of 3".into()),
        Call::Release(SHEET),
        Call::ExportPdf { existed: false },
    ];
    expected.extend(full_teardown().into_iter().skip(1));
    assert_eq!(xl.calls(), expected);
    assert_eq!(xl.double_releases.get(), 0);
}

#[test]
fn test_existing_output_is_removed_before_export() {
    let dir = tempfile::tempdir().unwrap();
    let job = job_in(dir.path());
    std::fs::write(&job.output_path, b"stale").unwrap();
    let xl = FakeExcel::new();

    job.run(&xl).unwrap();

    assert!(xl.calls().contains(&Call::ExportPdf { existed: false }));
    assert_eq!(std::fs::read(&job.output_path).unwrap(), b"%PDF-1.7\n");
}

#[test]
fn test_existing_output_is_removed_even_if_run_fails() {
    let dir = tempfile::tempdir().unwrap();
    let job = job_in(dir.path());
    std::fs::write(&job.output_path, b"stale").unwrap();
    let xl = FakeExcel::failing_on("run_macro");

    assert!(job.run(&xl).is_err());
    assert!(!job.output_path.exists());
}

#[test]
fn test_footer_uses_reported_page_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = job_in(dir.path());
    job.footer_position = FooterPosition::Right;
    job.sheet = SheetRef::Name("Summary".into());
    let xl = FakeExcel {
        pages: 12,
        ..FakeExcel::new()
    };

    let report = job.run(&xl).unwrap();

    assert_eq!(report.footer, "Page &P of 12");
    let calls = xl.calls();
    assert!(calls.contains(&Call::Worksheet(SheetRef::Name("Summary".into()))));
    assert!(calls.contains(&Call::SetFooter(
        FooterPosition::Right,
        "Page &P of 12".into()
    )));
}

#[test]
fn test_macro_name_uses_workbook_and_module_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = job_in(dir.path());
    job.entry_point = "Refresh".into();
    let xl = FakeExcel {
        book_name: "Sales.xlsm".into(),
        module_name: "Module1".into(),
        ..FakeExcel::new()
    };

    let report = job.run(&xl).unwrap();

    assert_eq!(report.macro_name, "Sales.xlsm!Module1.Refresh");
    assert!(xl
        .calls()
        .contains(&Call::RunMacro("Sales.xlsm!Module1.Refresh".into())));
}

#[test]
fn test_failing_step_tears_down_in_order() {
    let cases: &[(&str, Step, Vec<Call>)] = &[
        ("create_application", Step::AcquireApplication, vec![]),
        (
            "suppress_ui",
            Step::SuppressUi,
            vec![Call::Quit, Call::Release(APP)],
        ),
        (
            "open_workbook",
            Step::OpenWorkbook,
            vec![Call::Quit, Call::Release(APP)],
        ),
        (
            "import_module",
            Step::ImportModule,
            full_teardown()[1..].to_vec(),
        ),
        // The macro name is built from the workbook name; the macro never started.
        (
            "workbook_name",
            Step::ImportModule,
            full_teardown()[1..].to_vec(),
        ),
        ("run_macro", Step::RunMacro, full_teardown()[1..].to_vec()),
        ("worksheet", Step::SetFooter, full_teardown()[1..].to_vec()),
        ("page_count", Step::SetFooter, full_teardown()),
        ("set_footer", Step::SetFooter, full_teardown()),
        ("export_pdf", Step::ExportPdf, full_teardown()),
    ];

    for (op, step, teardown) in cases {
        let dir = tempfile::tempdir().unwrap();
        let xl = FakeExcel::failing_on(*op);

        let err = job_in(dir.path()).run(&xl).unwrap_err();

        assert_eq!(err.step(), Some(*step), "failing op: {op}");
        assert!(err.to_string().contains(&format!("{op} exploded")), "{err}");
        assert_eq!(&xl.teardown(), teardown, "failing op: {op}");
        assert_eq!(xl.double_releases.get(), 0, "failing op: {op}");
    }
}

#[test]
fn test_failed_close_still_releases_workbook_and_app() {
    let dir = tempfile::tempdir().unwrap();
    let xl = FakeExcel::failing_on("close_workbook");

    // teardown failures are logged, not reported
    job_in(dir.path()).run(&xl).unwrap();

    assert_eq!(xl.teardown(), full_teardown());
}

#[test]
fn test_failed_inner_release_does_not_block_outer_release() {
    let dir = tempfile::tempdir().unwrap();
    let xl = FakeExcel {
        failing_releases: [BOOK].into_iter().collect(),
        ..FakeExcel::failing_on("run_macro")
    };

    let err = job_in(dir.path()).run(&xl).unwrap_err();

    assert_eq!(err.step(), Some(Step::RunMacro));
    assert_eq!(xl.teardown(), full_teardown()[1..].to_vec());
}

#[test]
fn test_quit_failure_still_releases_app() {
    let dir = tempfile::tempdir().unwrap();
    let xl = FakeExcel::failing_on("quit");

    job_in(dir.path()).run(&xl).unwrap();

    let teardown = xl.teardown();
    assert_eq!(teardown.last(), Some(&Call::Release(APP)));
    assert_eq!(teardown, full_teardown());
}

#[test]
fn test_unremovable_output_fails_before_excel_starts() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = job_in(dir.path());
    // a directory can't be removed with remove_file
    job.output_path = dir.path().join("taken");
    std::fs::create_dir(&job.output_path).unwrap();
    let xl = FakeExcel::new();

    let err = job.run(&xl).unwrap_err();

    assert_eq!(err.step(), Some(Step::PrepareOutput));
    assert!(xl.calls().is_empty());
}
