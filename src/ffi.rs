//! FFI bindings for Synheart Formtrace
//!
//! This module provides C-compatible functions for driving a session aggregator
//! from other languages (typically the HTTP layer that receives client events).
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `formtrace_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::aggregator::SessionAggregator;
use crate::error::TelemetryError;

// Thread-local storage for the last error message and its code
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static LAST_ERROR_CODE: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message and code
fn set_last_error(code: &str, msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
    LAST_ERROR_CODE.with(|e| {
        *e.borrow_mut() = CString::new(code).ok();
    });
}

fn set_telemetry_error(err: &TelemetryError) {
    set_last_error(err.code(), &err.to_string());
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
    LAST_ERROR_CODE.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error("ENCODING_ERROR", &e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Aggregator API
// ============================================================================

/// Opaque handle to a SessionAggregator
pub struct FormtraceAggregatorHandle {
    aggregator: SessionAggregator,
}

/// Create a new, empty session aggregator.
///
/// # Safety
/// - Returns a pointer to a newly allocated aggregator.
/// - Must be freed with `formtrace_aggregator_free`.
#[no_mangle]
pub unsafe extern "C" fn formtrace_aggregator_new() -> *mut FormtraceAggregatorHandle {
    clear_last_error();

    let handle = Box::new(FormtraceAggregatorHandle {
        aggregator: SessionAggregator::new(),
    });
    Box::into_raw(handle)
}

/// Free a session aggregator.
///
/// # Safety
/// - `aggregator` must be a valid pointer returned by `formtrace_aggregator_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn formtrace_aggregator_free(aggregator: *mut FormtraceAggregatorHandle) {
    if !aggregator.is_null() {
        drop(Box::from_raw(aggregator));
    }
}

/// Ingest one event and return the outcome as JSON
/// (`{"status": ..., "record": {...}}`).
///
/// The handle may be shared between threads; calls for the same session are
/// serialized internally.
///
/// # Safety
/// - `aggregator` must be a valid pointer returned by `formtrace_aggregator_new`.
/// - `session_id`, `kind`, and `payload` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `formtrace_free_string`.
/// - Returns NULL on error; call `formtrace_last_error` / `formtrace_last_error_code`.
#[no_mangle]
pub unsafe extern "C" fn formtrace_aggregator_ingest(
    aggregator: *const FormtraceAggregatorHandle,
    session_id: *const c_char,
    kind: *const c_char,
    payload: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if aggregator.is_null() {
        set_last_error("NULL_POINTER", "Null aggregator pointer");
        return ptr::null_mut();
    }

    let handle = &*aggregator;

    let session_str = match cstr_to_string(session_id) {
        Some(s) => s,
        None => {
            set_last_error("NULL_POINTER", "Invalid session_id string pointer");
            return ptr::null_mut();
        }
    };

    let kind_str = match cstr_to_string(kind) {
        Some(s) => s,
        None => {
            set_last_error("NULL_POINTER", "Invalid kind string pointer");
            return ptr::null_mut();
        }
    };

    let payload_str = match cstr_to_string(payload) {
        Some(s) => s,
        None => {
            set_last_error("NULL_POINTER", "Invalid payload string pointer");
            return ptr::null_mut();
        }
    };

    match handle
        .aggregator
        .ingest(&session_str, &kind_str, payload_str.as_bytes())
    {
        Ok(outcome) => json_to_cstr(&outcome),
        Err(e) => {
            set_telemetry_error(&e);
            ptr::null_mut()
        }
    }
}

/// Ingest a raw request body routed by its `sessionId` / `eventType` fields.
///
/// # Safety
/// - `aggregator` must be a valid pointer returned by `formtrace_aggregator_new`.
/// - `body` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `formtrace_free_string`.
/// - Returns NULL on error; call `formtrace_last_error` / `formtrace_last_error_code`.
#[no_mangle]
pub unsafe extern "C" fn formtrace_aggregator_ingest_body(
    aggregator: *const FormtraceAggregatorHandle,
    body: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if aggregator.is_null() {
        set_last_error("NULL_POINTER", "Null aggregator pointer");
        return ptr::null_mut();
    }

    let handle = &*aggregator;

    let body_str = match cstr_to_string(body) {
        Some(s) => s,
        None => {
            set_last_error("NULL_POINTER", "Invalid body string pointer");
            return ptr::null_mut();
        }
    };

    match handle.aggregator.ingest_body(body_str.as_bytes()) {
        Ok(outcome) => json_to_cstr(&outcome),
        Err(e) => {
            set_telemetry_error(&e);
            ptr::null_mut()
        }
    }
}

/// Get the stored record for a session as JSON, or `null` if none exists.
///
/// # Safety
/// - `aggregator` must be a valid pointer returned by `formtrace_aggregator_new`.
/// - `session_id` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `formtrace_free_string`.
#[no_mangle]
pub unsafe extern "C" fn formtrace_aggregator_get(
    aggregator: *const FormtraceAggregatorHandle,
    session_id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if aggregator.is_null() {
        set_last_error("NULL_POINTER", "Null aggregator pointer");
        return ptr::null_mut();
    }

    let handle = &*aggregator;

    let session_str = match cstr_to_string(session_id) {
        Some(s) => s,
        None => {
            set_last_error("NULL_POINTER", "Invalid session_id string pointer");
            return ptr::null_mut();
        }
    };

    json_to_cstr(&handle.aggregator.get(&session_str))
}

/// Get aggregate counters as JSON.
///
/// # Safety
/// - `aggregator` must be a valid pointer returned by `formtrace_aggregator_new`.
/// - Returns a newly allocated string that must be freed with `formtrace_free_string`.
#[no_mangle]
pub unsafe extern "C" fn formtrace_aggregator_stats(
    aggregator: *const FormtraceAggregatorHandle,
) -> *mut c_char {
    clear_last_error();

    if aggregator.is_null() {
        set_last_error("NULL_POINTER", "Null aggregator pointer");
        return ptr::null_mut();
    }

    let handle = &*aggregator;
    json_to_cstr(&handle.aggregator.stats())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Formtrace functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Formtrace function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn formtrace_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Formtrace function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn formtrace_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the machine-readable code of the last error (e.g. `INVALID_ENUM_VALUE`).
///
/// # Safety
/// Same lifetime rules as `formtrace_last_error`. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn formtrace_last_error_code() -> *const c_char {
    LAST_ERROR_CODE.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Formtrace library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn formtrace_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
