//! Minimal `perf_event_open(2)` bindings. libc exposes the syscall number
//! but not the attribute struct.

#[cfg(target_os = "linux")]
use std::io;
#[cfg(target_os = "linux")]
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;

pub const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
pub const PERF_COUNT_HW_INSTRUCTIONS: u64 = 1;
pub const PERF_COUNT_HW_CACHE_REFERENCES: u64 = 2;
pub const PERF_COUNT_HW_CACHE_MISSES: u64 = 3;
pub const PERF_COUNT_HW_BRANCH_INSTRUCTIONS: u64 = 4;
pub const PERF_COUNT_HW_BRANCH_MISSES: u64 = 5;

pub const PERF_COUNT_SW_PAGE_FAULTS: u64 = 2;
pub const PERF_COUNT_SW_CONTEXT_SWITCHES: u64 = 3;

pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;

const FLAG_DISABLED: u64 = 1 << 0;
const FLAG_EXCLUDE_HV: u64 = 1 << 6;
const FLAG_EXCLUDE_IDLE: u64 = 1 << 7;

#[cfg(target_os = "linux")]
const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;
#[cfg(target_os = "linux")]
const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;

/// `PERF_ATTR_SIZE_VER5`; newer kernels accept the shorter struct.
pub const PERF_ATTR_SIZE: u32 = 112;

/// `{ value, time_enabled, time_running }` as requested by the read format.
pub const READ_RECORD_BYTES: usize = 24;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PerfEventAttr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub reserved: u16,
}

impl PerfEventAttr {
    /// A counting (non-sampling) event that starts disabled and reports
    /// enabled/running times for multiplexing correction.
    pub fn counting(type_: u32, config: u64) -> Self {
        PerfEventAttr {
            type_,
            size: PERF_ATTR_SIZE,
            config,
            read_format: PERF_FORMAT_TOTAL_TIME_ENABLED | PERF_FORMAT_TOTAL_TIME_RUNNING,
            flags: FLAG_DISABLED | FLAG_EXCLUDE_HV | FLAG_EXCLUDE_IDLE,
            ..PerfEventAttr::default()
        }
    }
}

#[cfg(target_os = "linux")]
pub fn perf_event_open(attr: &PerfEventAttr, pid: i32, cpu: i32) -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            attr as *const PerfEventAttr,
            pid as libc::pid_t,
            cpu as libc::c_int,
            -1 as libc::c_int,
            PERF_FLAG_FD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // the kernel handed us a fresh descriptor that nothing else owns
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

#[cfg(target_os = "linux")]
pub fn enable(fd: &impl AsRawFd) -> io::Result<()> {
    let rc = unsafe { libc::ioctl(fd.as_raw_fd(), PERF_EVENT_IOC_ENABLE as _, 0) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Decodes one read record. Returns `None` for a short buffer.
pub fn decode_record(buf: &[u8]) -> Option<(u64, u64, u64)> {
    if buf.len() < READ_RECORD_BYTES {
        return None;
    }
    let word = |i: usize| -> Option<u64> {
        let bytes: [u8; 8] = buf.get(i * 8..i * 8 + 8)?.try_into().ok()?;
        Some(u64::from_ne_bytes(bytes))
    };
    Some((word(0)?, word(1)?, word(2)?))
}

/// Extrapolates a multiplexed count to the full enabled window. `None` when
/// the counter never ran.
pub fn scale_count(value: u64, time_enabled: u64, time_running: u64) -> Option<u64> {
    if time_running == 0 {
        return None;
    }
    if time_running >= time_enabled {
        return Some(value);
    }
    let scaled = value as u128 * time_enabled as u128 / time_running as u128;
    Some(scaled.min(u64::MAX as u128) as u64)
}
