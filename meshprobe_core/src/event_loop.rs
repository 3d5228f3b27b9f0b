use crate::stack::LoopHandle;
use std::collections::VecDeque;

pub type Task<C> = Box<dyn FnOnce(&mut C, &mut LoopControl<C>)>;

/// Handed to each running task; lets it queue follow-up work or stop the loop.
pub struct LoopControl<C> {
    stop_requested: bool,
    spawned: Vec<Task<C>>,
}

impl<C> LoopControl<C> {
    fn new() -> Self {
        Self {
            stop_requested: false,
            spawned: Vec::new(),
        }
    }

    pub fn schedule<F>(&mut self, task: F)
    where
        F: FnOnce(&mut C, &mut LoopControl<C>) + 'static,
    {
        self.spawned.push(Box::new(task));
    }

    pub fn stop(&mut self) {
        self.stop_requested = true;
    }
}

impl<C> LoopHandle for LoopControl<C> {
    fn stop_event_loop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A task asked the loop to stop.
    Stopped,
    /// The queue ran dry with no stop request.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub tasks_run: usize,
    pub exit: LoopExit,
}

/// Single-threaded FIFO of deferred work over a context `C`.
pub struct EventLoop<C> {
    queue: VecDeque<Task<C>>,
}

impl<C> Default for EventLoop<C> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<C> EventLoop<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&mut self, task: F)
    where
        F: FnOnce(&mut C, &mut LoopControl<C>) + 'static,
    {
        self.queue.push_back(Box::new(task));
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Runs tasks in order until one requests a stop or the queue is empty.
    ///
    /// Work spawned by a task is queued behind everything already pending, so a
    /// stop request queued earlier always runs first.
    pub fn run(&mut self, ctx: &mut C) -> DrainStats {
        let mut tasks_run = 0;
        while let Some(task) = self.queue.pop_front() {
            let mut control = LoopControl::new();
            task(ctx, &mut control);
            tasks_run += 1;
            self.queue.extend(control.spawned);
            if control.stop_requested {
                return DrainStats {
                    tasks_run,
                    exit: LoopExit::Stopped,
                };
            }
        }
        DrainStats {
            tasks_run,
            exit: LoopExit::Idle,
        }
    }
}
