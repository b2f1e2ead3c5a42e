use core::ffi::{CStr, c_char};

/// Convert a C string pointer to a Rust `&str`.
///
/// Returns `"<null>"` for null pointers and `"<invalid utf-8>"` for
/// non-UTF-8 data. Intended for FFI-style boundaries where a
/// `*const c_char` arrives from C-flavoured APIs (driver names,
/// IRQ handler labels, etc.).
///
/// # Safety
///
/// The pointer must be valid and point to a NUL-terminated string,
/// or be null.
#[inline]
pub unsafe fn cstr_to_str(ptr: *const c_char) -> &'static str {
    if ptr.is_null() {
        return "<null>";
    }
    unsafe { CStr::from_ptr(ptr).to_str().unwrap_or("<invalid utf-8>") }
}
