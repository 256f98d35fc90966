//! Late-bound COM automation over `IDispatch`.
//!
//! Excel's object model (Application, Workbook, VBProject, PageSetup, ...) is
//! reached member-by-member through `GetIDsOfNames` + `Invoke`, the same way
//! VBScript does it. Dropping a [`DispatchObject`] releases its COM reference.

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, DISP_E_PARAMNOTFOUND, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_LOCAL_SERVER, DISPATCH_FLAGS,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
            },
            Ole::DISPID_PROPERTYPUT,
            Variant::{
                VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_ERROR, VT_I2, VT_I4, VT_NULL,
                VT_R4, VT_R8,
            },
        },
    },
};

// -- VARIANT construction --
// The VARIANT struct wraps inner unions in ManuallyDrop, so fields are set
// with ptr::write.

pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let bstr = BSTR::from(val);
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(bstr));
        v
    }
}

/// An omitted optional argument (`VT_ERROR` / `DISP_E_PARAMNOTFOUND`).
///
/// Lets positional calls skip parameters such as `From`/`To` of
/// `ExportAsFixedFormat`.
pub fn variant_missing() -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_ERROR);
        ptr::write(&mut inner.Anonymous.scode, DISP_E_PARAMNOTFOUND.0);
        v
    }
}

// -- VARIANT inspection --

pub fn variant_vt(v: &VARIANT) -> u16 {
    unsafe { v.Anonymous.Anonymous.vt.0 }
}

/// Extract a number, accepting the integer and float VTs Excel returns.
pub fn variant_get_f64(v: &VARIANT) -> Option<f64> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_R8 {
            Some(anon.dblVal)
        } else if vt == VT_R4 {
            Some(anon.fltVal as f64)
        } else if vt == VT_I4 {
            Some(anon.lVal as f64)
        } else if vt == VT_I2 {
            Some(anon.iVal as f64)
        } else {
            None
        }
    }
}

pub fn variant_get_string(v: &VARIANT) -> Option<String> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BSTR {
            let bstr = &v.Anonymous.Anonymous.Anonymous.bstrVal;
            Some(bstr.to_string())
        } else {
            None
        }
    }
}

pub fn variant_get_dispatch(v: &VARIANT) -> Option<IDispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_DISPATCH {
            // pdispVal is ManuallyDrop<Option<IDispatch>>
            let opt_disp: &Option<IDispatch> = &v.Anonymous.Anonymous.Anonymous.pdispVal;
            opt_disp.clone()
        } else {
            None
        }
    }
}

pub fn variant_is_empty(v: &VARIANT) -> bool {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        vt == VT_EMPTY || vt == VT_NULL
    }
}

// -- DispatchObject --

/// One COM reference to an automation object.
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Create a COM object from a ProgID string (e.g., "Excel.Application").
    pub fn create_from_progid(progid: &str) -> Result<Self, String> {
        unsafe {
            let hstr = HSTRING::from(progid);
            let clsid =
                CLSIDFromProgID(&hstr).map_err(|e| format!("CLSIDFromProgID failed: {e}"))?;
            let disp: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance failed for '{progid}': {e}"))?;
            Ok(Self { inner: disp })
        }
    }

    fn get_dispid(&self, name: &str) -> Result<i32, String> {
        unsafe {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let names = [PCWSTR(wide.as_ptr())];
            let mut dispid = 0i32;
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
            Ok(dispid)
        }
    }

    /// Single entry point for `IDispatch::Invoke`.
    ///
    /// `args` are given in natural order; DISPPARAMS wants them reversed.
    /// Property puts pass their value as the named `DISPID_PROPERTYPUT` arg.
    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &[VARIANT],
        named_put: bool,
    ) -> Result<VARIANT, String> {
        let dispid = self.get_dispid(name)?;
        let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let mut named_args = [DISPID_PROPERTYPUT];
        let params = DISPPARAMS {
            rgvarg: if reversed.is_empty() {
                ptr::null_mut()
            } else {
                reversed.as_mut_ptr()
            },
            rgdispidNamedArgs: if named_put {
                named_args.as_mut_ptr()
            } else {
                ptr::null_mut()
            },
            cArgs: reversed.len() as u32,
            cNamedArgs: if named_put { 1 } else { 0 },
        };
        let mut result = VARIANT::default();
        let mut except = EXCEPINFO::default();
        unsafe {
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
        }
        Ok(result)
    }

    /// `obj.Name`
    pub fn get_property(&self, name: &str) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[], false)
    }

    /// `obj.Name = value`
    pub fn set_property(&self, name: &str, value: VARIANT) -> Result<(), String> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &[value], true)?;
        Ok(())
    }

    /// `obj.Name(args...)`
    pub fn invoke_method(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args, false)
    }

    /// A property that returns another object.
    pub fn get_child(&self, name: &str) -> Result<DispatchObject, String> {
        let variant = self.get_property(name)?;
        extract_dispatch(&variant, name)
    }

    /// Walk a chain of object properties, e.g. `["VBProject", "VBComponents"]`.
    pub fn get_path(&self, path: &[&str]) -> Result<DispatchObject, String> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| "empty property path".to_string())?;
        let mut current = self.get_child(first)?;
        for name in rest {
            current = current.get_child(name)?;
        }
        Ok(current)
    }

    /// A method that returns another object.
    pub fn invoke_child(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        let variant = self.invoke_method(name, args)?;
        extract_dispatch(&variant, name)
    }

    /// An indexed property, e.g. `Worksheets.Item(1)`.
    pub fn get_indexed(&self, name: &str, index: &VARIANT) -> Result<DispatchObject, String> {
        let result = self.invoke(name, DISPATCH_PROPERTYGET, std::slice::from_ref(index), false)?;
        extract_dispatch(&result, name)
    }

    /// A string property, e.g. `Workbook.Name`.
    pub fn get_string(&self, name: &str) -> Result<String, String> {
        let variant = self.get_property(name)?;
        variant_get_string(&variant).ok_or_else(|| {
            format!(
                "'{name}' returned non-string VARIANT (VT={})",
                variant_vt(&variant)
            )
        })
    }

    /// A numeric property read as a non-negative count.
    pub fn get_count(&self, name: &str) -> Result<u32, String> {
        let variant = self.get_property(name)?;
        match variant_get_f64(&variant) {
            Some(n) if n >= 0.0 => Ok(n as u32),
            Some(n) => Err(format!("'{name}' returned negative count {n}")),
            None => Err(format!(
                "'{name}' returned non-numeric VARIANT (VT={})",
                variant_vt(&variant)
            )),
        }
    }
}

fn extract_dispatch(variant: &VARIANT, context: &str) -> Result<DispatchObject, String> {
    if let Some(disp) = variant_get_dispatch(variant) {
        Ok(DispatchObject { inner: disp })
    } else if variant_is_empty(variant) {
        Err(format!("'{context}' returned empty/null"))
    } else {
        let vt = variant_vt(variant);
        Err(format!(
            "'{context}' returned non-object VARIANT (VT={vt}), expected VT_DISPATCH"
        ))
    }
}

/// Format an Invoke error, including EXCEPINFO details if available.
fn format_invoke_error(err: windows::core::Error, except: &EXCEPINFO, member_name: &str) -> String {
    if err.code() == DISP_E_EXCEPTION {
        let desc = if !except.bstrDescription.is_empty() {
            except.bstrDescription.to_string()
        } else {
            String::from("(no description)")
        };
        let source = if !except.bstrSource.is_empty() {
            except.bstrSource.to_string()
        } else {
            String::from("(no source)")
        };
        format!("COM exception in '{member_name}': {desc} (source: {source})")
    } else {
        format!("Invoke('{member_name}') failed: {err}")
    }
}
