use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use knobs_channel::ChannelError;

use crate::types::KnobsResult;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::default();
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let sanitized = message.into().replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized).unwrap_or_default();
    });
}

pub(crate) fn set_invalid_argument(message: impl Into<String>) -> KnobsResult {
    set_error_message(message);
    KnobsResult::InvalidArgument
}

pub(crate) fn set_index_out_of_bounds(index: i32, capacity: usize) -> KnobsResult {
    set_error_message(format!(
        "knob index {index} out of bounds (capacity {capacity})"
    ));
    KnobsResult::IndexOutOfBounds
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

pub(crate) fn map_channel_error(err: &ChannelError) -> KnobsResult {
    set_error_message(err.to_string());
    match err {
        ChannelError::Transport(_) => KnobsResult::TransportError,
        ChannelError::Frame(_) => KnobsResult::FrameError,
        ChannelError::IndexOutOfBounds { .. } => KnobsResult::IndexOutOfBounds,
        ChannelError::InvalidCapacity
        | ChannelError::Config(_)
        | ChannelError::ConfigIo { .. } => KnobsResult::InvalidArgument,
        ChannelError::Spawn(_) => KnobsResult::Internal,
    }
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}
