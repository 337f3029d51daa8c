use std::ffi::c_void;

use knobs_channel::{ChannelState, KnobChannel};

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnobsResult {
    Ok = 0,
    InvalidArgument = 1,
    TransportError = 2,
    FrameError = 3,
    IndexOutOfBounds = 4,
    Internal = 99,
}

#[allow(dead_code)]
pub const KNOBS_OK: KnobsResult = KnobsResult::Ok;
#[allow(dead_code)]
pub const KNOBS_ERR_INVALID_ARGUMENT: KnobsResult = KnobsResult::InvalidArgument;
#[allow(dead_code)]
pub const KNOBS_ERR_TRANSPORT: KnobsResult = KnobsResult::TransportError;
#[allow(dead_code)]
pub const KNOBS_ERR_FRAME: KnobsResult = KnobsResult::FrameError;
#[allow(dead_code)]
pub const KNOBS_ERR_INDEX_OUT_OF_BOUNDS: KnobsResult = KnobsResult::IndexOutOfBounds;
#[allow(dead_code)]
pub const KNOBS_ERR_INTERNAL: KnobsResult = KnobsResult::Internal;

pub const KNOBS_STATE_INVALID: i32 = -1;
pub const KNOBS_STATE_IDLE: i32 = 0;
pub const KNOBS_STATE_RUNNING: i32 = 1;
pub const KNOBS_STATE_STOPPED: i32 = 2;
pub const KNOBS_STATE_DISCONNECTED: i32 = 3;
pub const KNOBS_STATE_FAILED: i32 = 4;
pub const KNOBS_STATE_CONNECTING: i32 = 5;

pub(crate) fn state_code(state: ChannelState) -> i32 {
    match state {
        ChannelState::Idle => KNOBS_STATE_IDLE,
        ChannelState::Connecting => KNOBS_STATE_CONNECTING,
        ChannelState::Running => KNOBS_STATE_RUNNING,
        ChannelState::Stopped => KNOBS_STATE_STOPPED,
        ChannelState::Disconnected => KNOBS_STATE_DISCONNECTED,
        ChannelState::Failed => KNOBS_STATE_FAILED,
    }
}

pub type KnobsChannelHandle = *mut c_void;

pub(crate) struct ChannelHandle {
    pub(crate) channel: KnobChannel,
}
