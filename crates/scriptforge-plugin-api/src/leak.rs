//! Delayed checks that torn-down interpreters were actually freed.

use crate::host::{Liveness, Scheduler, TaskToken};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// An interpreter that outlived its teardown.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakWarning {
    pub plugin: String,

    /// When the context was destroyed.
    pub destroyed_at: DateTime<Utc>,

    /// Strong references still alive at check time.
    pub strong_refs: usize,
}

#[derive(Debug, Default)]
struct LeakLog {
    pending: usize,
    completed: usize,
    warnings: Vec<LeakWarning>,
}

/// Records leak checks and their outcome.
#[derive(Debug, Clone, Default)]
pub struct LeakTracker {
    log: Rc<RefCell<LeakLog>>,
}

impl LeakTracker {
    /// Check `released` after `delay` ticks; warn if it can still be upgraded.
    pub fn watch<T: 'static>(
        &self,
        plugin: &str,
        released: Weak<T>,
        scheduler: &dyn Scheduler,
        delay: u64,
    ) -> TaskToken {
        self.log.borrow_mut().pending += 1;

        let log = Rc::clone(&self.log);
        let plugin_name = plugin.to_string();
        let destroyed_at = Utc::now();

        scheduler.schedule_once(
            plugin,
            delay,
            Rc::new(move || {
                let strong_refs = released.strong_count();
                let mut log = log.borrow_mut();
                log.pending = log.pending.saturating_sub(1);
                log.completed += 1;

                if strong_refs > 0 {
                    warn!(
                        plugin = %plugin_name,
                        strong_refs,
                        "Interpreter for plugin '{}' is still reachable after teardown; \
                         something is holding a reference to it",
                        plugin_name
                    );
                    log.warnings.push(LeakWarning {
                        plugin: plugin_name.clone(),
                        destroyed_at,
                        strong_refs,
                    });
                } else {
                    debug!("Interpreter for plugin '{}' was released", plugin_name);
                }
                Liveness::Inert
            }),
        )
    }

    /// Checks scheduled but not yet run.
    pub fn pending(&self) -> usize {
        self.log.borrow().pending
    }

    pub fn completed(&self) -> usize {
        self.log.borrow().completed
    }

    pub fn warnings(&self) -> Vec<LeakWarning> {
        self.log.borrow().warnings.clone()
    }

    /// Warnings recorded for one plugin.
    pub fn warnings_for(&self, plugin: &str) -> Vec<LeakWarning> {
        self.log
            .borrow()
            .warnings
            .iter()
            .filter(|w| w.plugin == plugin)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalScheduler;

    #[test]
    fn test_released_value_is_not_reported() {
        let scheduler = LocalScheduler::new();
        let tracker = LeakTracker::default();

        let value = Rc::new(5);
        tracker.watch("clean", Rc::downgrade(&value), &scheduler, 3);
        drop(value);

        scheduler.advance(3);
        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.completed(), 1);
        assert!(tracker.warnings().is_empty());
    }

    #[test]
    fn test_retained_value_is_reported_after_delay() {
        let scheduler = LocalScheduler::new();
        let tracker = LeakTracker::default();

        let value = Rc::new(5);
        tracker.watch("leaky", Rc::downgrade(&value), &scheduler, 2);

        scheduler.tick();
        assert_eq!(tracker.pending(), 1);
        scheduler.tick();

        let warnings = tracker.warnings_for("leaky");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].strong_refs, 1);
        drop(value);
    }
}
