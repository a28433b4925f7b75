use std::error::Error;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;

use tether_types::{InvariantError, Stack, StackFrame};

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub max_frames: NonZeroUsize,
    pub skip_frames: usize,
    /// Resolve symbol names and source locations for each frame.
    pub symbolize: bool,
}

impl CaptureOptions {
    pub fn shallow(max_frames: NonZeroUsize) -> Self {
        Self {
            max_frames,
            ..Self::default()
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_frames: NonZeroUsize::new(8).expect("invariant violated: default max_frames must be non-zero"),
            skip_frames: 0,
            symbolize: true,
        }
    }
}

#[derive(Debug)]
pub enum CaptureError {
    EmptyBacktrace,
    IpBeforeModuleBase { ip: u64, module_base: u64 },
    InvariantViolation {
        context: &'static str,
        source: InvariantError,
    },
}

impl CaptureError {
    fn invariant(context: &'static str, source: InvariantError) -> Self {
        Self::InvariantViolation { context, source }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBacktrace => write!(f, "captured backtrace is empty after skipping frames"),
            Self::IpBeforeModuleBase { ip, module_base } => write!(
                f,
                "invariant violated: instruction pointer 0x{ip:x} is below module base 0x{module_base:x}"
            ),
            Self::InvariantViolation { context, source } => {
                write!(f, "invariant violated in {context}: {source}")
            }
        }
    }
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvariantViolation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Frames examined past `skip_frames + max_frames` to make room for the
/// leading frames a filter drops.
const LEADING_FRAME_ALLOWANCE: usize = 32;

/// Captures up to `options.max_frames` frames of the calling thread's stack.
pub fn capture_current(options: CaptureOptions) -> Result<Stack, CaptureError> {
    capture_current_filtered(options, |_ip| false)
}

/// Like [`capture_current`], but first drops the leading frames for which
/// `is_leading` holds. `max_frames` counts only the frames kept after that.
#[inline(never)]
pub fn capture_current_filtered(
    options: CaptureOptions,
    mut is_leading: impl FnMut(u64) -> bool,
) -> Result<Stack, CaptureError> {
    let budget = options.skip_frames + options.max_frames.get() + LEADING_FRAME_ALLOWANCE;
    let mut raw_ips = Vec::new();
    let mut skip_remaining = options.skip_frames;

    backtrace::trace(|frame| {
        if skip_remaining > 0 {
            skip_remaining -= 1;
            return true;
        }
        raw_ips.push(frame.ip() as usize as u64);
        raw_ips.len() < budget
    });

    let first_kept = raw_ips
        .iter()
        .position(|&ip| !is_leading(ip))
        .unwrap_or(raw_ips.len());
    let kept: Vec<u64> = raw_ips
        .into_iter()
        .skip(first_kept)
        .take(options.max_frames.get())
        .collect();

    if kept.is_empty() {
        return Err(CaptureError::EmptyBacktrace);
    }

    let mut frames = Vec::with_capacity(kept.len());
    for ip in kept {
        frames.push(frame_for_ip(ip, options.symbolize)?);
    }

    Stack::new(frames).map_err(|err| CaptureError::invariant("stack", err))
}

/// Demangled name of the function containing `ip`, if symbols are available.
pub fn symbol_name(ip: u64) -> Option<String> {
    let mut name = None;
    backtrace::resolve(ip as usize as *mut c_void, |symbol| {
        if name.is_none() {
            name = symbol.name().map(|name| name.to_string());
        }
    });
    name
}

fn frame_for_ip(ip: u64, symbolize: bool) -> Result<StackFrame, CaptureError> {
    let mut frame = StackFrame::from_ip(ip);

    if let Some(module) = platform::module_info_for_ip(ip) {
        if ip < module.runtime_base {
            return Err(CaptureError::IpBeforeModuleBase {
                ip,
                module_base: module.runtime_base,
            });
        }
        frame.rel_pc = Some(ip - module.runtime_base);
        frame.module_path = Some(module.path);
    }

    if symbolize {
        backtrace::resolve(ip as usize as *mut c_void, |symbol| {
            if frame.symbol.is_some() {
                return;
            }
            frame.symbol = symbol.name().map(|name| name.to_string());
            frame.file = symbol.filename().map(|path| path.display().to_string());
            frame.line = symbol.lineno();
        });
    }

    Ok(frame)
}

struct RawModuleInfo {
    runtime_base: u64,
    path: String,
}

#[cfg(unix)]
mod platform {
    use super::RawModuleInfo;
    use std::ffi::{c_void, CStr};

    pub(super) fn module_info_for_ip(ip: u64) -> Option<RawModuleInfo> {
        let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
        let ok = unsafe { libc::dladdr(ip as usize as *const c_void, info.as_mut_ptr()) };
        if ok == 0 {
            return None;
        }

        let info = unsafe { info.assume_init() };
        if info.dli_fbase.is_null() || info.dli_fname.is_null() {
            return None;
        }

        let path = unsafe { CStr::from_ptr(info.dli_fname) }
            .to_string_lossy()
            .into_owned();
        if path.is_empty() {
            return None;
        }

        Some(RawModuleInfo {
            runtime_base: info.dli_fbase as usize as u64,
            path,
        })
    }
}

#[cfg(not(unix))]
mod platform {
    use super::RawModuleInfo;

    pub(super) fn module_info_for_ip(_ip: u64) -> Option<RawModuleInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_at_most_max_frames() {
        let options = CaptureOptions {
            symbolize: false,
            ..CaptureOptions::shallow(NonZeroUsize::new(2).expect("two is non-zero"))
        };
        let stack = capture_current(options).expect("capture should succeed");
        assert!(!stack.is_empty());
        assert!(stack.len() <= 2);
        assert!(stack.frames().iter().all(|frame| frame.symbol.is_none()));
    }

    #[test]
    fn skipping_past_the_whole_stack_is_an_error() {
        let options = CaptureOptions {
            skip_frames: 100_000,
            ..CaptureOptions::default()
        };
        let err = capture_current(options).expect_err("nothing left to capture");
        assert!(matches!(err, CaptureError::EmptyBacktrace));
    }

    #[test]
    fn filtered_capture_starts_at_the_caller() {
        let options = CaptureOptions::shallow(NonZeroUsize::new(3).expect("three is non-zero"));
        let stack = capture_current_filtered(options, |ip| {
            symbol_name(ip).is_some_and(|name| {
                name.starts_with("backtrace::") || name.starts_with("tether_trace_capture::capture_current")
            })
        })
        .expect("capture should succeed");

        assert!(stack.len() <= 3);
        let first = stack.frames()[0]
            .symbol
            .as_deref()
            .expect("test binaries carry symbols");
        assert!(
            first.contains("filtered_capture_starts_at_the_caller"),
            "first frame should be the caller, got {first}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn frames_are_module_relative() {
        let stack = capture_current(CaptureOptions::default()).expect("capture should succeed");
        for frame in stack.frames() {
            if let Some(rel_pc) = frame.rel_pc {
                assert!(rel_pc <= frame.ip);
                assert!(frame.module_path.is_some());
            }
        }
    }
}
