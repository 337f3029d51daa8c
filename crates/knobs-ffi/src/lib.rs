//! knobs-ffi: C-ABI exports for the knob channel.
//!
//! Every call clears the thread's last error first; when a call fails,
//! `knobs_last_error` describes why until the next call on that thread.

mod args;
mod channel;
mod error;
mod types;

use std::panic::AssertUnwindSafe;

pub use channel::{
    knobs_channel_copy_raw, knobs_channel_free, knobs_channel_get, knobs_channel_get_max,
    knobs_channel_get_range, knobs_channel_is_running, knobs_channel_new, knobs_channel_start,
    knobs_channel_state, knobs_channel_stop,
};
pub use types::{
    KnobsChannelHandle, KnobsResult, KNOBS_ERR_FRAME, KNOBS_ERR_INDEX_OUT_OF_BOUNDS,
    KNOBS_ERR_INTERNAL, KNOBS_ERR_INVALID_ARGUMENT, KNOBS_ERR_TRANSPORT, KNOBS_OK,
    KNOBS_STATE_CONNECTING, KNOBS_STATE_DISCONNECTED, KNOBS_STATE_FAILED, KNOBS_STATE_IDLE,
    KNOBS_STATE_INVALID, KNOBS_STATE_RUNNING, KNOBS_STATE_STOPPED,
};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

#[no_mangle]
pub extern "C" fn knobs_init() -> KnobsResult {
    ffi_boundary(KnobsResult::Internal, || {
        error::clear_error_state();
        KnobsResult::Ok
    })
}

#[no_mangle]
pub extern "C" fn knobs_cleanup() {
    ffi_boundary((), || {
        error::clear_error_state();
    });
}

#[no_mangle]
pub extern "C" fn knobs_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}
