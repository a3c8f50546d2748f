//! The `int 0x80` dispatcher and the system call handlers.
//!
//! Every call runs on the kernel directory. Handlers return
//! `Result<u32, Errno>`; the dispatcher encodes it into `eax` and then always
//! reschedules, so the frame handed back to the trap stub may belong to a
//! different process. Unknown call numbers are the one exception: the caller
//! gets `ENOSYS` and resumes directly.

use crate::console::Console;
use crate::context::{Kernel, user_range_ok};
use crate::fs::FileLookup;
use crate::process::{Pid, ProcessName, ProcessState, WaitTarget};
use crate::trap::TrapFrame;
use crate::userland::{LoadError, clone_region, load_image_into, release_user_region};
use kernel_memory_addresses::VirtualAddress;
use kernel_syscall::{Errno, SyscallArgs, Sysno, encode};
use kernel_vmem::{Mmu, PhysMapper};
use log::{debug, info, warn};

/// Longest path `execve` accepts, including the terminating NUL.
pub const PATH_MAX: usize = initramfs::NAME_LEN;

/// Chunk size for copying user buffers to the console.
const WRITE_CHUNK: usize = 128;

impl<M: PhysMapper, U: Mmu, F: FileLookup, C: Console> Kernel<'_, M, U, F, C> {
    /// Handle one system call trap.
    ///
    /// `frame` must come from the `int 0x80` stub.
    pub fn handle_syscall(&mut self, frame: &mut TrapFrame) {
        debug_assert!(frame.is_syscall(), "trap {} is not a system call", frame.int_no);
        self.vmm.switch_to_kernel();
        let args = frame.syscall_args();

        let sysno = match Sysno::try_from(args.number) {
            Ok(sysno) => sysno,
            Err(e) => {
                warn!(
                    "syscall error: unknown syscall (code={}, eax={}, eip={:#x})",
                    e.code(),
                    args.number,
                    frame.eip
                );
                frame.set_return(e.as_return());
                if let Some(p) = self.procs.current() {
                    let directory = p.directory;
                    self.vmm.switch(directory);
                }
                return;
            }
        };

        let result = self.dispatch(sysno, args, frame);
        match result {
            Err(Errno::EBUSY) => debug!("{}: no zombie child yet", sysno.name()),
            Err(e) => warn!(
                "syscall error: {} (code={}, eax={}, eip={:#x}): {e}",
                sysno.name(),
                e.code(),
                args.number,
                frame.eip
            ),
            Ok(_) => {}
        }
        frame.set_return(encode(result));

        if self.schedule(frame).is_err() {
            self.prepare_kernel_return(frame);
        }
    }

    fn dispatch(&mut self, sysno: Sysno, args: SyscallArgs, frame: &mut TrapFrame) -> Result<u32, Errno> {
        match sysno {
            Sysno::Write => self.sys_write(args.arg1, args.arg2, args.arg3),
            Sysno::Exit => self.sys_exit(args.arg1_signed()),
            Sysno::Getpid => self.sys_getpid(),
            Sysno::Brk => Err(Errno::ENOSYS),
            Sysno::Fork => self.sys_fork(frame),
            Sysno::Execve => self.sys_execve(frame, args.arg1),
            Sysno::Waitpid => self.sys_waitpid(args.arg1_signed()),
        }
    }

    /// Copy `len` bytes at `buf` to the console. Only fd 1 exists.
    ///
    /// # Errors
    /// `EBADF`, `EINVAL` for a null or empty buffer, `EFAULT` if the buffer
    /// is not user memory of the caller.
    pub fn sys_write(&mut self, fd: u32, buf: u32, len: u32) -> Result<u32, Errno> {
        if fd != 1 {
            return Err(Errno::EBADF);
        }
        if buf == 0 || len == 0 {
            return Err(Errno::EINVAL);
        }
        let p = self.procs.current().ok_or(Errno::EPERM)?;
        let (directory, image) = (p.directory, p.image);
        if !user_range_ok(&self.vmm, directory, &image, buf, len) {
            return Err(Errno::EFAULT);
        }

        let mut chunk = [0u8; WRITE_CHUNK];
        let mut done = 0u32;
        while done < len {
            #[allow(clippy::cast_possible_truncation)]
            let n = (len - done).min(WRITE_CHUNK as u32) as usize;
            self.vmm
                .read_bytes(directory, VirtualAddress::new(buf + done), &mut chunk[..n])
                .map_err(|_| Errno::EFAULT)?;
            self.console.write_bytes(&chunk[..n]);
            #[allow(clippy::cast_possible_truncation)]
            let n = n as u32;
            done += n;
        }
        Ok(len)
    }

    /// Turn the caller into a zombie and wake its parent if it waits for it.
    ///
    /// # Errors
    /// `EPERM` without a running process.
    #[allow(clippy::cast_sign_loss)]
    pub fn sys_exit(&mut self, code: i32) -> Result<u32, Errno> {
        let p = self.procs.current_mut().ok_or(Errno::EPERM)?;
        p.exit_status = code;
        p.state = ProcessState::Zombie;
        let (pid, parent) = (p.pid, p.parent);
        info!("pid {pid} exited with status {code}");

        if let Some(parent) = parent
            && let Some((_, waiter)) = self.procs.iter_mut().find(|(_, w)| {
                w.pid == parent
                    && w.state == ProcessState::Waiting
                    && w.waiting_for.is_some_and(|t| t.matches(pid))
            })
        {
            waiter.context.set_return(pid.as_u32());
            waiter.state = ProcessState::Runnable;
            waiter.waiting_for = None;
            debug!("woke pid {parent} waiting for pid {pid}");
        }
        Ok(code as u32)
    }

    /// # Errors
    /// `EPERM` without a running process.
    pub fn sys_getpid(&self) -> Result<u32, Errno> {
        self.procs.current_pid().map(Pid::as_u32).ok_or(Errno::EPERM)
    }

    /// Duplicate the caller. The child resumes from `frame` with `eax = 0`.
    ///
    /// # Errors
    /// `ENOMEM` if there is no free slot or memory runs out; nothing of the
    /// child survives then.
    pub fn sys_fork(&mut self, frame: &TrapFrame) -> Result<u32, Errno> {
        let parent = *self.procs.current().ok_or(Errno::EPERM)?;
        let slot = self.procs.free_slot().map_err(|e| {
            warn!("fork: {e}");
            Errno::ENOMEM
        })?;
        let directory = self
            .vmm
            .create_address_space(&mut *self.pmm)
            .map_err(|_| Errno::ENOMEM)?;

        let (low, high) = (parent.image.lowest, parent.image.highest);
        if let Err(e) = clone_region(&mut self.vmm, &mut *self.pmm, parent.directory, directory, low, high) {
            warn!("fork: cannot clone {low}..{high}: {e}");
            release_user_region(&mut self.vmm, &mut *self.pmm, directory);
            return Err(Errno::ENOMEM);
        }

        let mut context = *frame;
        context.set_return(0);
        let pid = self.procs.install(
            slot,
            parent.name.as_str(),
            Some(parent.pid),
            directory,
            parent.image,
            context,
        );
        info!("pid {} forked pid {pid}", parent.pid);
        Ok(pid.as_u32())
    }

    /// Reap a zombie child, or start waiting for one.
    ///
    /// `-1` matches any child, a positive value that pid.
    ///
    /// # Errors
    /// - `EINVAL` for any other filter.
    /// - `EBUSY` if a child is alive but none matching has exited; the caller
    ///   is now `Waiting` and is woken with the child's pid in `eax`.
    /// - `ECHILD` if the caller has no children at all.
    #[allow(clippy::cast_sign_loss)]
    pub fn sys_waitpid(&mut self, filter: i32) -> Result<u32, Errno> {
        let target = match filter {
            -1 => WaitTarget::Any,
            f if f > 0 => Pid::new(f as u32).map(WaitTarget::Pid).ok_or(Errno::EINVAL)?,
            _ => return Err(Errno::EINVAL),
        };
        let me = self.procs.current_pid().ok_or(Errno::EPERM)?;

        let zombie = self.procs.iter().find_map(|(slot, p)| {
            (p.is_child_of(me) && p.state == ProcessState::Zombie && target.matches(p.pid)).then_some(slot)
        });
        if let Some(child) = zombie.and_then(|slot| self.procs.remove(slot)) {
            release_user_region(&mut self.vmm, &mut *self.pmm, child.directory);
            info!("pid {me} reaped pid {} (status {})", child.pid, child.exit_status);
            return Ok(child.pid.as_u32());
        }

        if !self.procs.iter().any(|(_, p)| p.is_child_of(me)) {
            return Err(Errno::ECHILD);
        }
        if let Some(p) = self.procs.current_mut() {
            p.state = ProcessState::Waiting;
            p.waiting_for = Some(target);
        }
        Err(Errno::EBUSY)
    }

    /// Replace the caller's image with the file at `path` and restart it at
    /// the new entry point with a fresh stack. `frame` becomes the new
    /// initial context.
    ///
    /// The new image is built in a fresh address space; the old one is only
    /// released once loading succeeded, so a failed `execve` returns to the
    /// unchanged caller.
    ///
    /// # Errors
    /// - `EFAULT` if the path is not readable user memory.
    /// - `EINVAL` if it is not NUL-terminated within [`PATH_MAX`] bytes.
    /// - `ENOENT`, `ENOEXEC`, `ENOMEM`.
    pub fn sys_execve(&mut self, frame: &mut TrapFrame, path: u32) -> Result<u32, Errno> {
        let mut buf = [0u8; PATH_MAX];
        let path = self.read_user_path(path, &mut buf)?;
        let bytes = self.files.lookup(path).ok_or(Errno::ENOENT)?;
        let old = *self.procs.current().ok_or(Errno::EPERM)?;

        let directory = self
            .vmm
            .create_address_space(&mut *self.pmm)
            .map_err(|_| Errno::ENOMEM)?;
        let image = match load_image_into(&mut self.vmm, &mut *self.pmm, bytes, directory) {
            Ok(image) => image,
            Err(e) => {
                warn!("execve {path}: {e}");
                release_user_region(&mut self.vmm, &mut *self.pmm, directory);
                return Err(match e {
                    LoadError::OutOfMemory => Errno::ENOMEM,
                    _ => Errno::ENOEXEC,
                });
            }
        };
        release_user_region(&mut self.vmm, &mut *self.pmm, old.directory);

        let context = TrapFrame::user_initial(image.entry, image.stack_top);
        if let Some(p) = self.procs.current_mut() {
            p.directory = directory;
            p.image = image;
            p.context = context;
            p.name = ProcessName::new(path);
        }
        *frame = context;
        info!("pid {} exec {path} (entry {})", old.pid, image.entry);
        Ok(0)
    }

    /// Copy a NUL-terminated path out of the caller's memory into `buf`.
    fn read_user_path<'b>(&self, ptr: u32, buf: &'b mut [u8; PATH_MAX]) -> Result<&'b str, Errno> {
        let p = self.procs.current().ok_or(Errno::EPERM)?;
        if ptr == 0 || !user_range_ok(&self.vmm, p.directory, &p.image, ptr, 1) {
            return Err(Errno::EFAULT);
        }

        for i in 0..PATH_MAX {
            #[allow(clippy::cast_possible_truncation)]
            let at = ptr.checked_add(i as u32).ok_or(Errno::EFAULT)?;
            if !user_range_ok(&self.vmm, p.directory, &p.image, at, 1) {
                return Err(Errno::EFAULT);
            }
            self.vmm
                .read_bytes(p.directory, VirtualAddress::new(at), &mut buf[i..=i])
                .map_err(|_| Errno::EFAULT)?;
            if buf[i] == 0 {
                return core::str::from_utf8(&buf[..i]).map_err(|_| Errno::ENOENT);
            }
        }
        Err(Errno::EINVAL)
    }
}
