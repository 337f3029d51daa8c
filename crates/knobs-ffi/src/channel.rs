use std::os::raw::c_char;

use knobs_channel::{ChannelConfig, Endpoint, KnobChannel};
use knobs_transport::DEFAULT_HOST;

use crate::args::{index_arg, optional_str_arg, write_out};
use crate::error;
use crate::types::{state_code, ChannelHandle, KnobsChannelHandle, KnobsResult, KNOBS_STATE_INVALID};

fn with_channel<T>(
    handle: KnobsChannelHandle,
    on_error: T,
    f: impl FnOnce(&KnobChannel) -> T,
) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("channel handle cannot be null");
        return on_error;
    }

    let channel_handle = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &*(handle as *const ChannelHandle) }
    };

    f(&channel_handle.channel)
}

fn read_value(
    handle: KnobsChannelHandle,
    index: i32,
    out: *mut f32,
    read: impl FnOnce(&KnobChannel, usize) -> knobs_channel::Result<f32>,
) -> KnobsResult {
    with_channel(handle, KnobsResult::InvalidArgument, |channel| {
        let index = match index_arg(index, channel.capacity()) {
            Ok(index) => index,
            Err(result) => return result,
        };
        match read(channel, index) {
            Ok(value) => write_out(out, value, "out"),
            Err(err) => error::map_channel_error(&err),
        }
    })
}

/// Create a channel for `host:port`. A null `host` means `localhost`.
///
/// The channel is idle until `knobs_channel_start`. Returns null on error.
///
/// # Safety
/// `host` must be null or a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_new(host: *const c_char, port: u16) -> KnobsChannelHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        let host = {
            // SAFETY: We validate UTF-8 in helper.
            match unsafe { optional_str_arg(host, "host") } {
                Some(v) => v.unwrap_or(DEFAULT_HOST),
                None => return std::ptr::null_mut(),
            }
        };

        let config = ChannelConfig::default().with_endpoint(Endpoint::new(host, port));
        let handle = ChannelHandle {
            channel: KnobChannel::new(config),
        };
        Box::into_raw(Box::new(handle)) as KnobsChannelHandle
    })
}

/// Stop and free a channel.
///
/// # Safety
/// `handle` must be null or a handle returned by `knobs_channel_new`.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_free(handle: KnobsChannelHandle) {
    crate::ffi_boundary((), || {
        if handle.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by knobs_channel_new.
        unsafe {
            drop(Box::from_raw(handle as *mut ChannelHandle));
        }
    });
}

/// Connect and start receiving `capacity` knobs. Succeeds without effect if
/// already running.
///
/// # Safety
/// `handle` must be a valid channel handle.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_start(
    handle: KnobsChannelHandle,
    capacity: i32,
) -> KnobsResult {
    crate::ffi_boundary(KnobsResult::Internal, || {
        error::clear_error_state();

        let capacity = match usize::try_from(capacity) {
            Ok(capacity) if capacity > 0 => capacity,
            _ => return error::set_invalid_argument("capacity must be greater than zero"),
        };

        with_channel(handle, KnobsResult::InvalidArgument, |channel| {
            match channel.start(capacity) {
                Ok(_) => KnobsResult::Ok,
                Err(err) => error::map_channel_error(&err),
            }
        })
    })
}

/// Close the connection. Succeeds without effect if not running.
///
/// # Safety
/// `handle` must be a valid channel handle.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_stop(handle: KnobsChannelHandle) -> KnobsResult {
    crate::ffi_boundary(KnobsResult::Internal, || {
        error::clear_error_state();

        with_channel(handle, KnobsResult::InvalidArgument, |channel| {
            channel.stop();
            KnobsResult::Ok
        })
    })
}

/// Write knob `index` in `[0, 1]` to `out`.
///
/// # Safety
/// `handle` must be a valid channel handle and `out` a writable `float`.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_get(
    handle: KnobsChannelHandle,
    index: i32,
    out: *mut f32,
) -> KnobsResult {
    crate::ffi_boundary(KnobsResult::Internal, || {
        error::clear_error_state();
        read_value(handle, index, out, |channel, index| channel.get(index))
    })
}

/// Write knob `index` in `[0, max]` to `out`.
///
/// # Safety
/// `handle` must be a valid channel handle and `out` a writable `float`.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_get_max(
    handle: KnobsChannelHandle,
    index: i32,
    max: f32,
    out: *mut f32,
) -> KnobsResult {
    crate::ffi_boundary(KnobsResult::Internal, || {
        error::clear_error_state();
        read_value(handle, index, out, |channel, index| {
            channel.get_to(index, max)
        })
    })
}

/// Write knob `index` in `[min, max]` to `out`.
///
/// # Safety
/// `handle` must be a valid channel handle and `out` a writable `float`.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_get_range(
    handle: KnobsChannelHandle,
    index: i32,
    min: f32,
    max: f32,
    out: *mut f32,
) -> KnobsResult {
    crate::ffi_boundary(KnobsResult::Internal, || {
        error::clear_error_state();
        read_value(handle, index, out, |channel, index| {
            channel.get_range(index, min, max)
        })
    })
}

/// Copy the latest raw frame into `out` (at most `len` bytes) and store the
/// number of bytes copied in `out_written`.
///
/// # Safety
/// `handle` must be a valid channel handle. `out` must be writable for `len`
/// bytes and `out_written` must be a writable `size_t`.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_copy_raw(
    handle: KnobsChannelHandle,
    out: *mut u8,
    len: usize,
    out_written: *mut usize,
) -> KnobsResult {
    crate::ffi_boundary(KnobsResult::Internal, || {
        error::clear_error_state();

        if out.is_null() && len > 0 {
            return error::set_invalid_argument("out cannot be null when len > 0");
        }
        if out_written.is_null() {
            return error::set_invalid_argument("out_written cannot be null");
        }

        with_channel(handle, KnobsResult::InvalidArgument, |channel| {
            let snapshot = channel.snapshot();
            let bytes = snapshot.as_bytes();
            let count = bytes.len().min(len);
            if count > 0 {
                // SAFETY: `out` is non-null and writable for `len >= count` bytes.
                unsafe {
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), out, count);
                }
            }
            write_out(out_written, count, "out_written")
        })
    })
}

/// Lifecycle state as a `KNOBS_STATE_*` code; `KNOBS_STATE_INVALID` for a
/// null handle.
///
/// # Safety
/// `handle` must be null or a valid channel handle.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_state(handle: KnobsChannelHandle) -> i32 {
    crate::ffi_boundary(KNOBS_STATE_INVALID, || {
        error::clear_error_state();
        with_channel(handle, KNOBS_STATE_INVALID, |channel| {
            state_code(channel.state())
        })
    })
}

/// 1 while the receiver is running, otherwise 0.
///
/// # Safety
/// `handle` must be null or a valid channel handle.
#[no_mangle]
pub unsafe extern "C" fn knobs_channel_is_running(handle: KnobsChannelHandle) -> i32 {
    crate::ffi_boundary(0, || {
        error::clear_error_state();
        with_channel(handle, 0, |channel| i32::from(channel.is_running()))
    })
}
