//! Flow tick timer using ESP-IDF's esp_timer API.
//!
//! One periodic timer pushes [`Event::FlowTick`] into the lock-free SPSC
//! queue.  The callback runs in the esp_timer task (not ISR), which makes
//! it the queue's single producer.

#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::{info, warn};

#[cfg(target_os = "espidf")]
static mut FLOW_TIMER: esp_timer_handle_t = core::ptr::null_mut();

/// SAFETY: FLOW_TIMER is written once in `start_flow_timer()` before any
/// timer callbacks fire.  Only called from the single main task.
#[cfg(target_os = "espidf")]
unsafe fn flow_timer() -> esp_timer_handle_t { unsafe { FLOW_TIMER } }

#[cfg(target_os = "espidf")]
unsafe extern "C" fn flow_tick_cb(_arg: *mut core::ffi::c_void) {
    if !push_event(Event::FlowTick) {
        // The main loop is stuck in a publish backoff; the pulses stay in
        // the accumulator and are picked up by the next tick.
        warn!("hw_timer: event queue full, flow tick dropped");
    }
}

/// Start the periodic flow tick.
#[cfg(target_os = "espidf")]
pub fn start_flow_timer(period_ms: u32) {
    // SAFETY: FLOW_TIMER is written here once at boot from the single
    // main-task context before the callback can fire.  The callback only
    // calls push_event(), which is lock-free.
    unsafe {
        let args = esp_timer_create_args_t {
            callback: Some(flow_tick_cb),
            arg: core::ptr::null_mut(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"flow\0".as_ptr() as *const _,
            skip_unhandled_events: true,
        };
        let ret = esp_timer_create(&args, &raw mut FLOW_TIMER);
        if ret != ESP_OK {
            log::error!("hw_timer: flow timer create failed (rc={})", ret);
            return;
        }
        let ret = esp_timer_start_periodic(FLOW_TIMER, u64::from(period_ms) * 1_000);
        if ret != ESP_OK {
            log::error!("hw_timer: flow timer start failed (rc={})", ret);
            return;
        }

        info!("hw_timer: flow tick every {} ms", period_ms);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn start_flow_timer(period_ms: u32) {
    log::info!("hw_timer(sim): flow timer not started ({} ms period)", period_ms);
}

#[cfg(target_os = "espidf")]
pub fn stop_flow_timer() {
    // SAFETY: flow_timer() contract, main task only; null-check covers a
    // failed or missing start.
    unsafe {
        let t = flow_timer();
        if !t.is_null() {
            esp_timer_stop(t);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn stop_flow_timer() {}
