//! C ABI wrapper for the Sapphire engines.
//!
//! Exposes a small set of functions to create/destroy an engine, render
//! interleaved f32 samples, and set parameters by index.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `SapphireEngine` (heap-allocated; you own/delete it).
//! - Engine kinds: 0 = Elastika, 1 = Nucleus, 2 = Tube Unit.
//! - Parameter ids index the engine's parameter table, see `include/sapphire.h`.
//! - Failures come back as null handles or zero counts; nothing panics across the ABI.
//!
//! Threading
//! - The object is NOT thread-safe; call all functions from the same audio thread.

use log::warn;
use sapphire_engine::{EngineKind, Host, StereoEngine};

/// Opaque engine wrapper we hand to C.
pub struct SapphireEngine {
    kind: EngineKind,
    inner: Host<Box<dyn StereoEngine + Send>>,
}

impl SapphireEngine {
    fn new(kind: EngineKind, sr: f32) -> Option<Self> {
        let engine = match kind.build(sr) {
            Ok(e) => e,
            Err(e) => {
                warn!("sapphire_create: {e}");
                return None;
            }
        };
        match Host::new(engine, sr) {
            Ok(inner) => Some(Self { kind, inner }),
            Err(e) => {
                warn!("sapphire_create: {e}");
                None
            }
        }
    }
}

/// Borrow the engine behind a handle, or `None` for null.
///
/// # Safety
/// `engine` must be null or a live pointer from `sapphire_create`.
unsafe fn handle<'a>(engine: *mut SapphireEngine) -> Option<&'a mut SapphireEngine> {
    engine.as_mut()
}

// --- Creation / destruction -------------------------------------------------------

/// Create an engine of `kind` running at `sample_rate`.
/// Returns null for an unknown kind or an invalid sample rate.
#[no_mangle]
pub extern "C" fn sapphire_create(kind: u32, sample_rate: f32) -> *mut SapphireEngine {
    let Some(kind) = EngineKind::from_id(kind) else {
        warn!("sapphire_create: unknown engine kind {kind}");
        return std::ptr::null_mut();
    };
    match SapphireEngine::new(kind, sample_rate) {
        Some(e) => Box::into_raw(Box::new(e)),
        None => std::ptr::null_mut(),
    }
}

/// Destroy an engine previously returned by `sapphire_create`.
///
/// # Safety
/// `engine` must be null or a pointer from `sapphire_create` not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn sapphire_destroy(engine: *mut SapphireEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Restore default parameters and silence, at a possibly new sample rate.
/// Returns 1 on success, 0 for a null handle or invalid sample rate.
///
/// # Safety
/// `engine` must be null or a live pointer from `sapphire_create`.
#[no_mangle]
pub unsafe extern "C" fn sapphire_reset(engine: *mut SapphireEngine, sample_rate: f32) -> u32 {
    let Some(e) = handle(engine) else { return 0 };
    if let Err(err) = e.inner.set_sample_rate(sample_rate) {
        warn!("sapphire_reset: {err}");
        return 0;
    }
    e.inner.reset();
    1
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` of audio into an interleaved f32 buffer with `channels` channels.
///
/// `input_interleaved` may be null for silence, otherwise it holds `frames`
/// stereo frames (left, right). Mono output gets the average of left and right;
/// channels past the second are zeroed.
///
/// Returns the number of frames rendered (0 on error).
///
/// # Safety
/// `engine` must be a live handle; `out_interleaved` must hold `frames · channels`
/// floats; `input_interleaved` must be null or hold `2 · frames` floats.
#[no_mangle]
pub unsafe extern "C" fn sapphire_render_interleaved_f32(
    engine: *mut SapphireEngine,
    input_interleaved: *const f32,
    out_interleaved: *mut f32,
    frames: u32,
    channels: u32,
) -> u32 {
    let Some(e) = handle(engine) else { return 0 };
    if out_interleaved.is_null() || frames == 0 || channels == 0 {
        return 0;
    }
    let frames = frames as usize;
    let out = std::slice::from_raw_parts_mut(out_interleaved, frames * channels as usize);
    let input = if input_interleaved.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(input_interleaved, 2 * frames))
    };

    let start = e.inner.frames();
    let rendered = e.inner.render_interleaved(out, channels as usize, |n| match input {
        Some(buf) => {
            let i = 2 * (n - start) as usize;
            [buf[i], buf[i + 1]]
        }
        None => [0.0, 0.0],
    });
    rendered as u32
}

// --- Parameters ------------------------------------------------------------------

/// Number of parameters the engine accepts. 0 for a null handle.
///
/// # Safety
/// `engine` must be null or a live pointer from `sapphire_create`.
#[no_mangle]
pub unsafe extern "C" fn sapphire_param_count(engine: *mut SapphireEngine) -> u32 {
    handle(engine).map_or(0, |e| e.inner.engine().param_names().len() as u32)
}

/// Set parameter `param_id` (an index into the engine's table). Values are
/// clamped by the engine. Returns 1 on success, 0 for a bad handle or id.
///
/// # Safety
/// `engine` must be null or a live pointer from `sapphire_create`.
#[no_mangle]
pub unsafe extern "C" fn sapphire_set_param(engine: *mut SapphireEngine, param_id: u32, value: f32) -> u32 {
    let Some(e) = handle(engine) else { return 0 };
    let Some(&name) = e.inner.engine().param_names().get(param_id as usize) else {
        warn!("sapphire_set_param: {} has no parameter {param_id}", e.kind.name());
        return 0;
    };
    u32::from(e.inner.set_param(name, value))
}

/// Turn the output on or off with a short fade.
///
/// # Safety
/// `engine` must be null or a live pointer from `sapphire_create`.
#[no_mangle]
pub unsafe extern "C" fn sapphire_set_power(engine: *mut SapphireEngine, on: u32) {
    if let Some(e) = handle(engine) {
        e.inner.set_power(on != 0);
    }
}

/// How hard the output limiter is working: 0 when idle. 0 for a null handle.
///
/// # Safety
/// `engine` must be null or a live pointer from `sapphire_create`.
#[no_mangle]
pub unsafe extern "C" fn sapphire_agc_distortion(engine: *mut SapphireEngine) -> f32 {
    handle(engine).map_or(0.0, |e| e.inner.engine().agc_distortion())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        assert!(sapphire_create(7, 48_000.0).is_null());
        assert!(sapphire_create(0, -1.0).is_null());

        for kind in 0..3 {
            let e = sapphire_create(kind, 48_000.0);
            assert!(!e.is_null());
            unsafe {
                let n = sapphire_param_count(e);
                assert!(n > 0);
                assert_eq!(sapphire_set_param(e, 0, 0.5), 1);
                assert_eq!(sapphire_set_param(e, n, 0.5), 0);

                let input = [0.5_f32, -0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
                let mut out = [9.0_f32; 12];
                assert_eq!(sapphire_render_interleaved_f32(e, input.as_ptr(), out.as_mut_ptr(), 4, 3), 4);
                assert!(out.iter().all(|x| x.is_finite()));
                assert_eq!(out[2], 0.0);
                assert_eq!(sapphire_render_interleaved_f32(e, std::ptr::null(), out.as_mut_ptr(), 4, 3), 4);

                assert_eq!(sapphire_reset(e, 44_100.0), 1);
                assert_eq!(sapphire_reset(e, 0.0), 0);
                assert!(sapphire_agc_distortion(e) >= 0.0);
                sapphire_destroy(e);
            }
        }
        unsafe {
            assert_eq!(sapphire_param_count(std::ptr::null_mut()), 0);
            sapphire_destroy(std::ptr::null_mut());
        }
    }
}
