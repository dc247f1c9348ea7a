//! Post-write hooks
//!
//! Hooks observe successful writes. They run after the new content is in
//! place, so a failing hook is reported through tracing and never rolls the
//! write back.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::WriteEvent;

/// Observer invoked after every successful write
pub trait WriteHook: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Called with the completed change
    fn after_write(&self, event: &WriteEvent) -> anyhow::Result<()>;
}

/// Ordered set of write hooks
#[derive(Clone, Default)]
pub struct HookSet {
    hooks: Vec<Arc<dyn WriteHook>>,
}

impl HookSet {
    /// Creates an empty hook set
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook; hooks run in registration order
    pub fn push(&mut self, hook: Arc<dyn WriteHook>) {
        self.hooks.push(hook);
    }

    /// Whether any hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook, logging failures
    pub fn dispatch(&self, event: &WriteEvent) {
        for hook in &self.hooks {
            debug!(hook = hook.name(), path = %event.path.display(), "Calling write hook");
            if let Err(e) = hook.after_write(event) {
                warn!(
                    hook = hook.name(),
                    path = %event.path.display(),
                    error = %e,
                    "Write hook failed"
                );
            }
        }
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationType;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl WriteHook for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn after_write(&self, event: &WriteEvent) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.path.clone());
            Ok(())
        }
    }

    struct Failing;

    impl WriteHook for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn after_write(&self, _event: &WriteEvent) -> anyhow::Result<()> {
            anyhow::bail!("hook exploded")
        }
    }

    fn event() -> WriteEvent {
        WriteEvent {
            path: PathBuf::from("a.txt"),
            absolute_path: PathBuf::from("/ws/a.txt"),
            operation: OperationType::Create,
            content_hash: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_failing_hook_does_not_stop_later_hooks() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut hooks = HookSet::new();
        hooks.push(Arc::new(Failing));
        hooks.push(recorder.clone());

        hooks.dispatch(&event());
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), &[PathBuf::from("a.txt")]);
    }

    #[test]
    fn test_debug_lists_hook_names() {
        let mut hooks = HookSet::new();
        assert!(hooks.is_empty());
        hooks.push(Arc::new(Failing));
        assert_eq!(format!("{:?}", hooks), "[\"failing\"]");
    }
}
