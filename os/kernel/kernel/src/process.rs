//! Process records and the fixed-size process table.
//!
//! The table is an arena of [`MAX_PROCESSES`] slots; a slot index is the
//! stable handle the scheduler works with, the [`Pid`] is what user code sees.
//!
//! ```text
//! Unused --spawn/fork--> Runnable --scheduled--> Running
//! Running --syscall returns--> Runnable
//! Running --exit--> Zombie --reaped--> Unused
//! Running --waitpid, no zombie yet--> Waiting --child exits--> Runnable
//! ```

use crate::trap::TrapFrame;
use core::fmt;
use core::num::NonZeroU32;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::RootPage;

/// Number of process slots.
pub const MAX_PROCESSES: usize = 8;

/// Bytes kept of a process name.
pub const NAME_LEN: usize = 31;

/// Process identifier. Assigned from 1 upward and never reused.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pid(NonZeroU32);

impl Pid {
    #[must_use]
    pub const fn new(v: u32) -> Option<Self> {
        match NonZeroU32::new(v) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ProcessState {
    #[default]
    Unused,
    Runnable,
    Running,
    Waiting,
    Zombie,
}

impl ProcessState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Runnable => "runnable",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Zombie => "zombie",
        }
    }
}

/// Layout of a loaded user image, as reported by the image loader.
///
/// `[lowest, highest)` covers every segment and the stack.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProcessImage {
    pub entry: VirtualAddress,
    pub lowest: VirtualAddress,
    pub highest: VirtualAddress,
    pub stack_base: VirtualAddress,
    pub stack_top: VirtualAddress,
}

impl ProcessImage {
    pub const EMPTY: Self = Self {
        entry: VirtualAddress::new(0),
        lowest: VirtualAddress::new(0),
        highest: VirtualAddress::new(0),
        stack_base: VirtualAddress::new(0),
        stack_top: VirtualAddress::new(0),
    };

    /// `true` if `[ptr, end)` lies inside `[lowest, highest)`.
    #[must_use]
    pub fn contains(&self, ptr: VirtualAddress, end: VirtualAddress) -> bool {
        ptr >= self.lowest && end <= self.highest && ptr < end
    }
}

/// Which children a waiting process is interested in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WaitTarget {
    Any,
    Pid(Pid),
}

impl WaitTarget {
    #[must_use]
    pub fn matches(self, pid: Pid) -> bool {
        match self {
            Self::Any => true,
            Self::Pid(p) => p == pid,
        }
    }
}

/// A short, NUL-free process name.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct ProcessName {
    bytes: [u8; NAME_LEN],
    len: u8,
}

impl ProcessName {
    /// Keeps at most [`NAME_LEN`] bytes, cut at a character boundary.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0; NAME_LEN];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self {
            bytes,
            len: end as u8,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or("?")
    }
}

impl fmt::Debug for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Process {
    pub pid: Pid,
    /// `None` for processes spawned by the kernel.
    pub parent: Option<Pid>,
    pub state: ProcessState,
    /// Saved registers while the process is not running.
    pub context: TrapFrame,
    pub image: ProcessImage,
    pub exit_status: i32,
    pub waiting_for: Option<WaitTarget>,
    pub directory: RootPage,
    pub name: ProcessName,
}

impl Process {
    #[must_use]
    pub fn is_child_of(&self, parent: Pid) -> bool {
        self.parent == Some(parent)
    }
}

/// One row of the process listing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub state: &'static str,
    pub name: ProcessName,
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ppid = self.parent.map_or(0, Pid::as_u32);
        write!(f, "{:<4} {:<5} {:<8} {}", self.pid, ppid, self.state, self.name)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("no free process slot")]
    NoFreeSlot,
    #[error("no process is running")]
    NoCurrent,
}

/// The process arena.
pub struct ProcessTable {
    slots: [Option<Process>; MAX_PROCESSES],
    next_pid: u32,
    current: Option<usize>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_PROCESSES],
            next_pid: 1,
            current: None,
        }
    }

    /// Index of the first unused slot.
    ///
    /// # Errors
    /// [`ProcessError::NoFreeSlot`] if the table is full.
    pub fn free_slot(&self) -> Result<usize, ProcessError> {
        self.slots
            .iter()
            .position(Option::is_none)
            .ok_or(ProcessError::NoFreeSlot)
    }

    /// Put a fully built process into `slot` and give it the next pid.
    ///
    /// The slot must come from [`free_slot`](Self::free_slot) with no insert in between.
    pub fn install(
        &mut self,
        slot: usize,
        name: &str,
        parent: Option<Pid>,
        directory: RootPage,
        image: ProcessImage,
        context: TrapFrame,
    ) -> Pid {
        debug_assert!(self.slots[slot].is_none(), "slot {slot} is in use");
        let pid = Pid(NonZeroU32::MIN.saturating_add(self.next_pid - 1));
        self.next_pid = self.next_pid.saturating_add(1);
        self.slots[slot] = Some(Process {
            pid,
            parent,
            state: ProcessState::Runnable,
            context,
            image,
            exit_status: 0,
            waiting_for: None,
            directory,
            name: ProcessName::new(name),
        });
        pid
    }

    /// Turn `slot` back into an unused slot, returning what was in it.
    pub fn remove(&mut self, slot: usize) -> Option<Process> {
        let p = self.slots.get_mut(slot)?.take();
        if self.current == Some(slot) {
            self.current = None;
        }
        p
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&Process> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Process> {
        self.slots.get_mut(slot)?.as_mut()
    }

    #[must_use]
    pub fn slot_of(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| p.pid == pid))
    }

    #[must_use]
    pub fn by_pid(&self, pid: Pid) -> Option<&Process> {
        self.get(self.slot_of(pid)?)
    }

    #[must_use]
    pub fn state_of(&self, pid: Pid) -> ProcessState {
        self.by_pid(pid).map_or(ProcessState::Unused, |p| p.state)
    }

    /// Slot of the process last entered by the scheduler.
    #[must_use]
    pub const fn current_slot(&self) -> Option<usize> {
        self.current
    }

    pub const fn set_current(&mut self, slot: usize) {
        self.current = Some(slot);
    }

    /// The process currently in the `Running` state.
    #[must_use]
    pub fn current(&self) -> Option<&Process> {
        self.get(self.current?)
            .filter(|p| p.state == ProcessState::Running)
    }

    pub fn current_mut(&mut self) -> Option<&mut Process> {
        let slot = self.current?;
        self.get_mut(slot)
            .filter(|p| p.state == ProcessState::Running)
    }

    #[must_use]
    pub fn current_pid(&self) -> Option<Pid> {
        self.current().map(|p| p.pid)
    }

    /// First `Runnable` slot after the current one, wrapping around.
    #[must_use]
    pub fn next_runnable(&self) -> Option<usize> {
        let start = self.current.map_or(0, |c| c + 1);
        (0..MAX_PROCESSES)
            .map(|i| (start + i) % MAX_PROCESSES)
            .find(|&i| self.get(i).is_some_and(|p| p.state == ProcessState::Runnable))
    }

    /// Live processes with their slot index, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Process)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, p)| Some((i, p.as_ref()?)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Process)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, p)| Some((i, p.as_mut()?)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalPage;

    fn dir() -> RootPage {
        PhysicalPage::from_index(0x200).unwrap()
    }

    fn spawn(table: &mut ProcessTable, name: &str) -> (usize, Pid) {
        let slot = table.free_slot().unwrap();
        let pid = table.install(slot, name, None, dir(), ProcessImage::EMPTY, TrapFrame::default());
        (slot, pid)
    }

    #[test]
    fn pids_are_never_reused() {
        let mut t = ProcessTable::new();
        let (slot, first) = spawn(&mut t, "a");
        assert_eq!(first.as_u32(), 1);
        t.remove(slot);
        let (again, second) = spawn(&mut t, "b");
        assert_eq!(again, slot);
        assert_eq!(second.as_u32(), 2);
        assert_eq!(t.state_of(first), ProcessState::Unused);
    }

    #[test]
    fn table_fills_up() {
        let mut t = ProcessTable::new();
        for i in 0..MAX_PROCESSES {
            spawn(&mut t, &format!("p{i}"));
        }
        assert_eq!(t.free_slot(), Err(ProcessError::NoFreeSlot));
        assert_eq!(t.len(), MAX_PROCESSES);
    }

    #[test]
    fn next_runnable_wraps_after_current() {
        let mut t = ProcessTable::new();
        for name in ["a", "b", "c"] {
            spawn(&mut t, name);
        }
        assert_eq!(t.next_runnable(), Some(0));
        t.set_current(1);
        assert_eq!(t.next_runnable(), Some(2));
        t.set_current(2);
        assert_eq!(t.next_runnable(), Some(0));

        t.get_mut(0).unwrap().state = ProcessState::Zombie;
        t.get_mut(2).unwrap().state = ProcessState::Running;
        assert_eq!(t.next_runnable(), Some(1));
        assert_eq!(t.current_pid(), t.get(2).map(|p| p.pid));
    }

    #[test]
    fn only_running_process_is_current() {
        let mut t = ProcessTable::new();
        let (slot, _) = spawn(&mut t, "a");
        t.set_current(slot);
        assert!(t.current().is_none());
        t.get_mut(slot).unwrap().state = ProcessState::Running;
        assert!(t.current().is_some());
    }

    #[test]
    fn names_are_truncated_on_char_boundaries() {
        assert_eq!(ProcessName::new("init").as_str(), "init");
        let long = "x".repeat(40);
        assert_eq!(ProcessName::new(&long).as_str().len(), NAME_LEN);
        let wide = format!("{}é", "y".repeat(NAME_LEN - 1));
        assert_eq!(ProcessName::new(&wide).as_str(), "y".repeat(NAME_LEN - 1));
    }

    #[test]
    fn image_bounds_are_half_open() {
        let image = ProcessImage {
            lowest: VirtualAddress::new(0x0400_0000),
            highest: VirtualAddress::new(0x0410_0000),
            ..ProcessImage::EMPTY
        };
        assert!(image.contains(VirtualAddress::new(0x0400_0000), VirtualAddress::new(0x0400_0001)));
        assert!(image.contains(VirtualAddress::new(0x040F_FFFF), VirtualAddress::new(0x0410_0000)));
        assert!(!image.contains(VirtualAddress::new(0x040F_FFFF), VirtualAddress::new(0x0410_0001)));
        assert!(!image.contains(VirtualAddress::new(0x03FF_FFFF), VirtualAddress::new(0x0400_0001)));
    }

    #[test]
    fn listing_format() {
        let mut t = ProcessTable::new();
        spawn(&mut t, "init");
        let (_, p) = t.iter().next().unwrap();
        let row = ProcessInfo {
            pid: p.pid,
            parent: p.parent,
            state: p.state.name(),
            name: p.name,
        };
        assert_eq!(row.to_string(), "1    0     runnable init");
    }
}
