//! FFI bindings for the doomscroll engine
//!
//! This module provides C-compatible functions for driving the engine from a host
//! (browser extension native host, mobile shell, ...). All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the caller
//! using `doom_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::pipeline::{parse_snapshot, DoomscrollEngine};
use crate::sink::NudgeHistory;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
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

// ============================================================================
// Engine API
// ============================================================================

/// Opaque handle to a DoomscrollEngine
pub struct DoomEngineHandle {
    engine: DoomscrollEngine,
    history: Rc<RefCell<NudgeHistory>>,
}

impl DoomEngineHandle {
    fn new(config: EngineConfig) -> Result<Self, crate::EngineError> {
        let history = Rc::new(RefCell::new(NudgeHistory::new(config.nudge_history_capacity)));
        let engine = DoomscrollEngine::new(config)?.with_nudge_log(history.clone());
        Ok(Self { engine, history })
    }
}

/// Create a new engine with the default configuration.
///
/// # Safety
/// - Returns a pointer to a newly allocated engine.
/// - Must be freed with `doom_engine_free`.
#[no_mangle]
pub unsafe extern "C" fn doom_engine_new() -> *mut DoomEngineHandle {
    clear_last_error();

    match DoomEngineHandle::new(EngineConfig::default()) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Create a new engine from a JSON configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `doom_engine_free`.
/// - Returns NULL on error; call `doom_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn doom_engine_new_with_config(
    config_json: *const c_char,
) -> *mut DoomEngineHandle {
    clear_last_error();

    let json_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    let handle = EngineConfig::from_json(&json_str).and_then(DoomEngineHandle::new);
    match handle {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `doom_engine_new*`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn doom_engine_free(engine: *mut DoomEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Analyze one session snapshot and return the analysis JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `doom_engine_new*`.
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `doom_free_string`.
/// - Returns NULL on error; call `doom_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn doom_engine_process(
    engine: *mut DoomEngineHandle,
    snapshot_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let json_str = match cstr_to_string(snapshot_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match handle.engine.process_json(&json_str) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Analyze a snapshot subject to the evaluation interval.
///
/// Returns the JSON literal `null` when the session was evaluated too recently.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `doom_engine_new*`.
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `doom_free_string`.
/// - Returns NULL on error; call `doom_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn doom_engine_ingest(
    engine: *mut DoomEngineHandle,
    snapshot_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let json_str = match cstr_to_string(snapshot_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let snapshot = match parse_snapshot(&json_str) {
        Ok(s) => s,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let analysis = handle.engine.ingest(&snapshot);
    match serde_json::to_string(&analysis) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Current process-wide escalation state as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `doom_engine_new*`.
/// - Returns a newly allocated string that must be freed with `doom_free_string`.
/// - Returns NULL on error; call `doom_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn doom_engine_nudge_state(engine: *mut DoomEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    match serde_json::to_string(handle.engine.nudge_state()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Retained nudge records as a JSON array, oldest first.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `doom_engine_new*`.
/// - Returns a newly allocated string that must be freed with `doom_free_string`.
/// - Returns NULL on error; call `doom_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn doom_engine_nudge_history(engine: *mut DoomEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;
    let json = handle.history.borrow().to_json();

    match json {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by engine functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an engine function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn doom_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next engine function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn doom_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the engine library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn doom_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
