use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

use crate::feature_buffer::Node;
use crate::model::Model;
use crate::persistence;
use crate::regressor;

unsafe fn path_from_c<'a>(path: *const c_char) -> Option<&'a str> {
    if path.is_null() {
        return None;
    }
    CStr::from_ptr(path).to_str().ok()
}

/// Loads a text model. Returns null when the file cannot be opened or parsed.
///
/// # Safety
/// `path` must be null or a nul-terminated string. The returned model is owned by the caller
/// and has to be released with `ffm_destroy_model`.
#[no_mangle]
pub unsafe extern "C" fn ffm_load_model(path: *const c_char) -> *mut Model {
    let path = match path_from_c(path) {
        Some(path) => path,
        None => return ptr::null_mut(),
    };
    match persistence::load_model_from_filename(path) {
        Ok(model) => Box::into_raw(Box::new(model)),
        Err(e) => {
            log::error!("ffm_load_model: {}", e);
            ptr::null_mut()
        }
    }
}

/// Returns 0 on success, 1 on failure.
///
/// # Safety
/// `model` must be null or come from `ffm_load_model`, `path` null or a nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ffm_save_model(model: *const Model, path: *const c_char) -> c_int {
    let path = match path_from_c(path) {
        Some(path) => path,
        None => return 1,
    };
    let model = match model.as_ref() {
        Some(model) => model,
        None => return 1,
    };
    match persistence::save_model_to_filename(model, path) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("ffm_save_model: {}", e);
            1
        }
    }
}

/// Probability of the positive class for `len` nodes starting at `nodes`.
///
/// # Safety
/// `nodes` must point to `len` initialized nodes (or be null with `len` 0), `model` must be
/// a live model from `ffm_load_model`.
#[no_mangle]
pub unsafe extern "C" fn ffm_predict(nodes: *const Node, len: usize, model: *const Model) -> f32 {
    let model = {
        assert!(!model.is_null());
        &*model
    };
    let nodes: &[Node] = if nodes.is_null() || len == 0 { &[] } else { slice::from_raw_parts(nodes, len) };
    regressor::predict(nodes, model)
}

/// Frees the model and nulls the handle. Null handles and already released models are left alone.
///
/// # Safety
/// `model` must be null or point to a handle that is null or came from `ffm_load_model`.
#[no_mangle]
pub unsafe extern "C" fn ffm_destroy_model(model: *mut *mut Model) {
    if model.is_null() || (*model).is_null() {
        return;
    }
    drop(Box::from_raw(*model));
    *model = ptr::null_mut();
}
