//! Excel object model operations on top of the `IDispatch` wrapper.
//!
//! COM references handed to the client live in an object table keyed by id.
//! `release` removes an entry, which drops the `IDispatch` reference.

#![cfg(windows)]

use std::collections::HashMap;

use excel_com_protocol::{excel_sheet_index, FooterPosition, SheetRef};

use crate::dispatch::{variant_bool, variant_i32, variant_missing, variant_str, DispatchObject};

/// xlTypePDF
const XL_TYPE_PDF: i32 = 0;
/// xlQualityStandard
const XL_QUALITY_STANDARD: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Application,
    Workbook,
    Worksheet,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ObjectKind::Application => "application",
            ObjectKind::Workbook => "workbook",
            ObjectKind::Worksheet => "worksheet",
        })
    }
}

struct Entry {
    kind: ObjectKind,
    object: DispatchObject,
    /// Cleared once `Quit`/`Close` has been sent.
    live: bool,
}

/// All COM objects the bridge currently holds on behalf of the client.
pub struct ExcelSession {
    objects: HashMap<u64, Entry>,
    next_handle: u64,
}

impl ExcelSession {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_handle: 1,
        }
    }

    fn insert(&mut self, kind: ObjectKind, object: DispatchObject) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(
            handle,
            Entry {
                kind,
                object,
                live: true,
            },
        );
        handle
    }

    fn get(&self, handle: u64, kind: ObjectKind) -> Result<&DispatchObject, String> {
        match self.objects.get(&handle) {
            Some(entry) if entry.kind == kind => Ok(&entry.object),
            Some(entry) => Err(format!(
                "Object {handle} is a {}, expected a {kind}",
                entry.kind
            )),
            None => Err(format!("Unknown {kind} handle: {handle}")),
        }
    }

    fn mark_ended(&mut self, handle: u64) {
        if let Some(entry) = self.objects.get_mut(&handle) {
            entry.live = false;
        }
    }

    /// Create the Excel.Application instance.
    pub fn create_application(&mut self) -> Result<u64, String> {
        let app = DispatchObject::create_from_progid("Excel.Application")?;
        Ok(self.insert(ObjectKind::Application, app))
    }

    pub fn configure_application(
        &self,
        app: u64,
        screen_updating: bool,
        display_alerts: bool,
        visible: bool,
    ) -> Result<(), String> {
        let app = self.get(app, ObjectKind::Application)?;
        app.set_property("ScreenUpdating", variant_bool(screen_updating))?;
        app.set_property("DisplayAlerts", variant_bool(display_alerts))?;
        app.set_property("Visible", variant_bool(visible))?;
        Ok(())
    }

    pub fn open_workbook(&mut self, app: u64, path: &str) -> Result<u64, String> {
        let wb = self
            .get(app, ObjectKind::Application)?
            .get_child("Workbooks")?
            .invoke_child("Open", &[variant_str(path)])?;
        Ok(self.insert(ObjectKind::Workbook, wb))
    }

    pub fn workbook_name(&self, workbook: u64) -> Result<String, String> {
        self.get(workbook, ObjectKind::Workbook)?.get_string("Name")
    }

    /// `Workbook.VBProject.VBComponents.Import(path).Name`
    ///
    /// Needs "Trust access to the VBA project object model" enabled in Excel.
    pub fn import_module(&self, workbook: u64, path: &str) -> Result<String, String> {
        let component = self
            .get(workbook, ObjectKind::Workbook)?
            .get_path(&["VBProject", "VBComponents"])?
            .invoke_child("Import", &[variant_str(path)])?;
        component.get_string("Name")
    }

    pub fn run_macro(&self, app: u64, name: &str) -> Result<(), String> {
        self.get(app, ObjectKind::Application)?
            .invoke_method("Run", &[variant_str(name)])?;
        Ok(())
    }

    pub fn get_worksheet(&mut self, workbook: u64, sheet: &SheetRef) -> Result<u64, String> {
        let sheets = self
            .get(workbook, ObjectKind::Workbook)?
            .get_child("Worksheets")?;
        let ws = match sheet {
            // Excel worksheets are 1-based, the protocol uses 0-based
            SheetRef::Index(idx) => {
                let item = excel_sheet_index(*idx)
                    .ok_or_else(|| format!("Worksheet index {idx} out of range"))?;
                sheets.get_indexed("Item", &variant_i32(item))?
            }
            SheetRef::Name(name) => sheets.get_indexed("Item", &variant_str(name))?,
        };
        Ok(self.insert(ObjectKind::Worksheet, ws))
    }

    /// `Worksheet.PageSetup.Pages.Count`
    pub fn page_count(&self, worksheet: u64) -> Result<u32, String> {
        self.get(worksheet, ObjectKind::Worksheet)?
            .get_path(&["PageSetup", "Pages"])?
            .get_count("Count")
    }

    pub fn set_footer(
        &self,
        worksheet: u64,
        position: FooterPosition,
        text: &str,
    ) -> Result<(), String> {
        self.get(worksheet, ObjectKind::Worksheet)?
            .get_child("PageSetup")?
            .set_property(position.property_name(), variant_str(text))
    }

    /// `Workbook.ExportAsFixedFormat(xlTypePDF, path, ...)`
    pub fn export_pdf(
        &self,
        workbook: u64,
        path: &str,
        open_after_publish: bool,
    ) -> Result<(), String> {
        // Type, Filename, Quality, IncludeDocProperties, IgnorePrintAreas,
        // From, To, OpenAfterPublish
        self.get(workbook, ObjectKind::Workbook)?.invoke_method(
            "ExportAsFixedFormat",
            &[
                variant_i32(XL_TYPE_PDF),
                variant_str(path),
                variant_i32(XL_QUALITY_STANDARD),
                variant_bool(true),
                variant_bool(false),
                variant_missing(),
                variant_missing(),
                variant_bool(open_after_publish),
            ],
        )?;
        Ok(())
    }

    pub fn close_workbook(&mut self, workbook: u64, save_changes: bool) -> Result<(), String> {
        self.get(workbook, ObjectKind::Workbook)?
            .invoke_method("Close", &[variant_bool(save_changes)])?;
        self.mark_ended(workbook);
        Ok(())
    }

    pub fn quit(&mut self, app: u64) -> Result<(), String> {
        self.get(app, ObjectKind::Application)?
            .invoke_method("Quit", &[])?;
        self.mark_ended(app);
        Ok(())
    }

    /// Drop the reference to an object. Unknown ids are an error so the
    /// client notices double releases.
    pub fn release(&mut self, object: u64) -> Result<(), String> {
        match self.objects.remove(&object) {
            Some(_) => Ok(()),
            None => Err(format!("Unknown object handle: {object}")),
        }
    }

    /// Tear down whatever the client left behind: worksheets first, then
    /// workbooks (closed without saving), then applications (quit).
    pub fn shutdown(&mut self) -> Result<(), String> {
        let mut first_error = None;
        for kind in [
            ObjectKind::Worksheet,
            ObjectKind::Workbook,
            ObjectKind::Application,
        ] {
            let handles: Vec<u64> = self
                .objects
                .iter()
                .filter(|(_, e)| e.kind == kind)
                .map(|(h, _)| *h)
                .collect();
            for handle in handles {
                let Some(entry) = self.objects.remove(&handle) else {
                    continue;
                };
                if !entry.live {
                    continue;
                }
                let ended = match kind {
                    ObjectKind::Workbook => entry
                        .object
                        .invoke_method("Close", &[variant_bool(false)])
                        .map(|_| ()),
                    ObjectKind::Application => {
                        entry.object.invoke_method("Quit", &[]).map(|_| ())
                    }
                    ObjectKind::Worksheet => Ok(()),
                };
                if let Err(e) = ended {
                    eprintln!("[excel-com-bridge] Failed to end {kind} {handle}: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
