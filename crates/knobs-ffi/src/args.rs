use std::ffi::CStr;
use std::os::raw::c_char;

use crate::error;

/// Convert an optional C string argument into UTF-8 `&str`.
///
/// Null yields `Some(None)`; invalid UTF-8 records an error and yields `None`.
///
/// # Safety
/// `value` must be null or point to a valid NUL-terminated C string.
pub(crate) unsafe fn optional_str_arg<'a>(
    value: *const c_char,
    name: &str,
) -> Option<Option<&'a str>> {
    if value.is_null() {
        return Some(None);
    }

    let as_cstr = {
        // SAFETY: The caller guarantees `value` points to a valid NUL-terminated C string.
        unsafe { CStr::from_ptr(value) }
    };

    match as_cstr.to_str() {
        Ok(v) => Some(Some(v)),
        Err(_) => {
            let _ = error::set_invalid_argument(format!("{name} must be valid UTF-8"));
            None
        }
    }
}

/// Convert a C index into `usize`, recording an error for negatives.
pub(crate) fn index_arg(index: i32, capacity: usize) -> Result<usize, crate::types::KnobsResult> {
    usize::try_from(index).map_err(|_| error::set_index_out_of_bounds(index, capacity))
}

/// Write `value` through `out`.
pub(crate) fn write_out<T>(out: *mut T, value: T, name: &str) -> crate::types::KnobsResult {
    if out.is_null() {
        return error::set_invalid_argument(format!("{name} cannot be null"));
    }

    // SAFETY: Pointer was checked for null above; validity is guaranteed by the caller.
    unsafe {
        *out = value;
    }
    crate::types::KnobsResult::Ok
}
