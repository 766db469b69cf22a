//! Tick-based task scheduling.

use super::{Liveness, TaskToken};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A scheduled unit of work. Returning [`Liveness::Inert`] drops the task.
pub type TaskAction = Rc<dyn Fn() -> Liveness>;

/// Host-side task scheduler.
///
/// Delays and periods are counted in ticks. A delay of zero runs the task on
/// the next tick.
pub trait Scheduler {
    /// Run `action` once after `delay` ticks.
    fn schedule_once(&self, owner: &str, delay: u64, action: TaskAction) -> TaskToken;

    /// Run `action` after `delay` ticks, then every `period` ticks.
    fn schedule_repeating(
        &self,
        owner: &str,
        delay: u64,
        period: u64,
        action: TaskAction,
    ) -> TaskToken;
}

struct ScheduledTask {
    owner: String,
    due: u64,
    period: Option<u64>,
    action: TaskAction,
}

#[derive(Default)]
struct SchedulerState {
    now: u64,
    next_token: u64,
    tasks: BTreeMap<u64, ScheduledTask>,
}

/// Single-threaded scheduler driven by explicit [`LocalScheduler::tick`] calls.
#[derive(Default)]
pub struct LocalScheduler {
    state: RefCell<SchedulerState>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks elapsed so far.
    pub fn current_tick(&self) -> u64 {
        self.state.borrow().now
    }

    /// Tasks still waiting to run.
    pub fn pending(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Tasks still waiting to run for one owner.
    pub fn pending_for(&self, owner: &str) -> usize {
        self.state
            .borrow()
            .tasks
            .values()
            .filter(|task| task.owner == owner)
            .count()
    }

    /// Advance one tick and run every task that is due, in token order.
    ///
    /// Returns the number of tasks that ran.
    pub fn tick(&self) -> usize {
        let due: Vec<(u64, TaskAction)> = {
            let mut state = self.state.borrow_mut();
            state.now += 1;
            let now = state.now;

            let tokens: Vec<u64> = state
                .tasks
                .iter()
                .filter(|(_, task)| task.due <= now)
                .map(|(token, _)| *token)
                .collect();

            let mut due = Vec::with_capacity(tokens.len());
            for token in tokens {
                let repeat = match state.tasks.get_mut(&token) {
                    Some(task) => match task.period {
                        Some(period) => {
                            task.due = now + period;
                            due.push((token, Rc::clone(&task.action)));
                            true
                        }
                        None => false,
                    },
                    None => continue,
                };
                if !repeat {
                    if let Some(task) = state.tasks.remove(&token) {
                        due.push((token, task.action));
                    }
                }
            }
            due
        };

        // Actions may schedule more work, so the state borrow is released first.
        let ran = due.len();
        for (token, action) in due {
            if action() == Liveness::Inert {
                self.state.borrow_mut().tasks.remove(&token);
            }
        }
        ran
    }

    /// Run `ticks` ticks. Returns the total number of tasks that ran.
    pub fn advance(&self, ticks: u64) -> usize {
        (0..ticks).map(|_| self.tick()).sum()
    }

    fn insert(&self, owner: &str, delay: u64, period: Option<u64>, action: TaskAction) -> TaskToken {
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        let token = state.next_token;
        let due = state.now + delay.max(1);
        state.tasks.insert(
            token,
            ScheduledTask {
                owner: owner.to_string(),
                due,
                period,
                action,
            },
        );
        TaskToken(token)
    }
}

impl Scheduler for LocalScheduler {
    fn schedule_once(&self, owner: &str, delay: u64, action: TaskAction) -> TaskToken {
        self.insert(owner, delay, None, action)
    }

    fn schedule_repeating(
        &self,
        owner: &str,
        delay: u64,
        period: u64,
        action: TaskAction,
    ) -> TaskToken {
        self.insert(owner, delay, Some(period.max(1)), action)
    }
}
