//! Round-robin task scheduler.
//!
//! Owns the task arena and the "current task" cursor. All mutation after
//! boot happens inside the timer interrupt, which is not re-entrant on a
//! single core, so the spinlock around the global instance is uncontended by
//! design; foreground code must only touch it before interrupts are enabled
//! (or inside `hal::without_interrupts`).

use spin::Mutex;

use super::Task;
use crate::error::{KernelResult, TaskError};
use crate::kerror;

/// Size of the task arena. Slots are cheap; the boot set uses two.
pub const MAX_TASKS: usize = 8;

/// Process-wide scheduler instance.
pub static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

pub struct Scheduler {
    /// Task arena; slots `0..count` are occupied, in creation order.
    tasks: [Option<Task>; MAX_TASKS],
    count: usize,
    /// Round-robin cursor. `None` until the boot context is adopted;
    /// switching before that is a fatal initialization-order bug.
    current: Option<usize>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler {
            tasks: [const { None }; MAX_TASKS],
            count: 0,
            current: None,
        }
    }

    /// Install the boot flow of control as the current (running) task.
    ///
    /// Must happen before interrupts are enabled; the first tick already
    /// expects a running task to switch away from.
    pub fn adopt_boot_task(&mut self, mut task: Task) -> KernelResult<usize> {
        if self.current.is_some() {
            return kerror!(TaskError::AlreadyRunning);
        }

        task.resume();
        let id = self.insert(task)?;
        self.current = Some(id);
        Ok(id)
    }

    /// Add a suspended task to the rotation.
    pub fn add_task(&mut self, task: Task) -> KernelResult<usize> {
        self.insert(task)
    }

    /// Perform one preemptive switch.
    ///
    /// `current_sp` is the live stack pointer of the interrupted task, i.e.
    /// the address of the register frame the interrupt entry path pushed.
    /// It is saved into the running task, the cursor advances to the next
    /// slot, and that task's saved stack pointer is returned for the
    /// trampoline to resume from. With a single task this degenerates to
    /// returning `current_sp` unchanged.
    ///
    /// # Panics
    ///
    /// Panics if no boot task was adopted yet. There is no recovering from
    /// a switch without a current task; callers must guarantee the
    /// initialization order instead.
    pub fn schedule(&mut self, current_sp: usize) -> usize {
        let current = self
            .current
            .expect("schedule() before a boot task was adopted");

        self.tasks[current]
            .as_mut()
            .expect("current cursor points at an empty slot")
            .suspend_at(current_sp);

        let next = (current + 1) % self.count;
        self.current = Some(next);

        self.tasks[next]
            .as_mut()
            .expect("task arena has a hole inside 0..count")
            .resume()
    }

    /// Arena index of the running task.
    pub fn current_task(&self) -> Option<usize> {
        self.current
    }

    pub fn task(&self, id: usize) -> Option<&Task> {
        self.tasks.get(id).and_then(|slot| slot.as_ref())
    }

    pub fn task_count(&self) -> usize {
        self.count
    }

    fn insert(&mut self, task: Task) -> KernelResult<usize> {
        if self.count == MAX_TASKS {
            return kerror!(TaskError::TooManyTasks);
        }

        let id = self.count;
        self.tasks[id] = Some(task);
        self.count += 1;
        Ok(id)
    }
}
