// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System V implementation of shared memory segments and semaphore sets.
// Keys come from ftok(path, project id), so two processes that agree on a
// path agree on every resource of a channel.

use std::ffi::CString;
use std::io;
use std::ptr;

/// System V IPC key.
pub type Key = libc::key_t;

/// Derive the IPC key for `path` and an 8-bit project id.
///
/// `path` must name an existing file; only its device and inode matter.
pub fn ipc_key(path: &str, proj_id: u8) -> io::Result<Key> {
    let c_path =
        CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let key = unsafe { libc::ftok(c_path.as_ptr(), proj_id as libc::c_int) };
    if key == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(key)
}

/// Largest segment the kernel will hand out, if it can be queried.
#[cfg(target_os = "linux")]
pub fn max_segment_size() -> Option<usize> {
    let raw = std::fs::read_to_string("/proc/sys/kernel/shmmax").ok()?;
    let value: u64 = raw.trim().parse().ok()?;
    Some(usize::try_from(value).unwrap_or(usize::MAX))
}

#[cfg(target_os = "macos")]
pub fn max_segment_size() -> Option<usize> {
    let name = CString::new("kern.sysv.shmmax").ok()?;
    let mut value: u64 = 0;
    let mut len = std::mem::size_of::<u64>();
    let ret = unsafe {
        libc::sysctlbyname(
            name.as_ptr(),
            &mut value as *mut u64 as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if ret != 0 {
        return None;
    }
    Some(usize::try_from(value).unwrap_or(usize::MAX))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn max_segment_size() -> Option<usize> {
    None
}

// ---------------------------------------------------------------------------
// PlatformSegment: one attached shmget/shmat segment
// ---------------------------------------------------------------------------

pub struct PlatformSegment {
    id: libc::c_int,
    mem: *mut u8,
    size: usize,
    read_only: bool,
    owner: bool, // creator removes the segment id when dropped
}

// Safety: the segment is process-shared memory; access is serialised by the
// channel's semaphore protocol.
unsafe impl Send for PlatformSegment {}
unsafe impl Sync for PlatformSegment {}

impl PlatformSegment {
    /// Create a new segment of `size` bytes exclusively and attach it
    /// read-write. Fails with `EEXIST` if `key` is already in use.
    pub fn create(key: Key, size: usize, perms: u32) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }
        let flags = libc::IPC_CREAT | libc::IPC_EXCL | perms as libc::c_int;
        let id = unsafe { libc::shmget(key, size, flags) };
        if id == -1 {
            return Err(io::Error::last_os_error());
        }
        match Self::attach(id, size, false, true) {
            Ok(seg) => Ok(seg),
            Err(e) => {
                // Never leave a created-but-unattached id behind.
                unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
                Err(e)
            }
        }
    }

    /// Attach an existing segment. The kernel-reported size is used, so the
    /// caller does not need to know how large the creator made it.
    pub fn open(key: Key, read_only: bool) -> io::Result<Self> {
        let id = unsafe { libc::shmget(key, 0, 0) };
        if id == -1 {
            return Err(io::Error::last_os_error());
        }
        let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(id, libc::IPC_STAT, &mut ds) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Self::attach(id, ds.shm_segsz as usize, read_only, false)
    }

    fn attach(id: libc::c_int, size: usize, read_only: bool, owner: bool) -> io::Result<Self> {
        let flags = if read_only { libc::SHM_RDONLY } else { 0 };
        let mem = unsafe { libc::shmat(id, ptr::null(), flags) };
        if mem as isize == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            id,
            mem: mem as *mut u8,
            size,
            read_only,
            owner,
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Remove a segment by key without attaching it. Missing keys are ignored.
    pub fn remove_by_key(key: Key) {
        let id = unsafe { libc::shmget(key, 0, 0) };
        if id != -1 {
            unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
        }
    }
}

impl Drop for PlatformSegment {
    fn drop(&mut self) {
        unsafe { libc::shmdt(self.mem as *const libc::c_void) };
        if self.owner {
            // The kernel frees the memory once the last peer detaches.
            unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformSemaphores: one semget semaphore set
// ---------------------------------------------------------------------------

/// One semaphore operation: `(index, delta, no_wait)`.
///
/// A delta of 0 waits until the semaphore is zero.
pub type SemOp = (u16, i16, bool);

#[derive(Debug)]
pub struct PlatformSemaphores {
    id: libc::c_int,
    owner: bool,
}

impl PlatformSemaphores {
    /// Create a set of `count` semaphores exclusively, all initialised to 0.
    pub fn create(key: Key, count: u16, perms: u32) -> io::Result<Self> {
        let flags = libc::IPC_CREAT | libc::IPC_EXCL | perms as libc::c_int;
        let id = unsafe { libc::semget(key, count as libc::c_int, flags) };
        if id == -1 {
            return Err(io::Error::last_os_error());
        }
        for n in 0..count {
            if unsafe { libc::semctl(id, n as libc::c_int, libc::SETVAL, 0 as libc::c_int) } == -1 {
                let err = io::Error::last_os_error();
                unsafe { libc::semctl(id, 0, libc::IPC_RMID) };
                return Err(err);
            }
        }
        Ok(Self { id, owner: true })
    }

    /// Open an existing set.
    pub fn open(key: Key) -> io::Result<Self> {
        let id = unsafe { libc::semget(key, 0, 0) };
        if id == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { id, owner: false })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Apply `ops` atomically. Blocks unless every op is `no_wait`.
    ///
    /// Returns `Ok(false)` if a `no_wait` op would have blocked.
    pub fn apply(&self, ops: &[SemOp]) -> io::Result<bool> {
        let mut bufs: Vec<libc::sembuf> = ops
            .iter()
            .map(|&(num, op, no_wait)| libc::sembuf {
                sem_num: num as libc::c_ushort,
                sem_op: op as libc::c_short,
                sem_flg: if no_wait { libc::IPC_NOWAIT as libc::c_short } else { 0 },
            })
            .collect();
        loop {
            let ret = unsafe { libc::semop(self.id, bufs.as_mut_ptr(), bufs.len() as _) };
            if ret == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    /// Current value of semaphore `num`.
    pub fn value(&self, num: u16) -> io::Result<i32> {
        let v = unsafe { libc::semctl(self.id, num as libc::c_int, libc::GETVAL) };
        if v == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(v)
    }

    /// Remove a set by id. Blocked waiters on other threads or processes
    /// wake with `EIDRM`.
    pub fn remove_by_id(id: i32) {
        unsafe { libc::semctl(id, 0, libc::IPC_RMID) };
    }

    /// Remove a set by key without opening it. Missing keys are ignored.
    pub fn remove_by_key(key: Key) {
        let id = unsafe { libc::semget(key, 0, 0) };
        if id != -1 {
            Self::remove_by_id(id);
        }
    }
}

impl Drop for PlatformSemaphores {
    fn drop(&mut self) {
        if self.owner {
            Self::remove_by_id(self.id);
        }
    }
}
