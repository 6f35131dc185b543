use std::sync::{Arc, RwLock};

pub type LoggerHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type ProgressHook = Arc<dyn Fn() + Send + Sync>;

/// Caller-registered callbacks shared by every component of one runner.
///
/// Both hooks are optional and may be replaced at any time; clones share the
/// same registrations.
#[derive(Clone, Default)]
pub struct Hooks {
    logger: Arc<RwLock<Option<LoggerHook>>>,
    progress: Arc<RwLock<Option<ProgressHook>>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_logger<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.logger.write() {
            *guard = Some(Arc::new(hook));
        }
    }

    pub fn set_progress<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.progress.write() {
            *guard = Some(Arc::new(hook));
        }
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!("{message}");
        let hook = self.logger.read().ok().and_then(|guard| guard.clone());
        if let Some(hook) = hook {
            hook(message);
        }
    }

    pub fn progress(&self) {
        let hook = self.progress.read().ok().and_then(|guard| guard.clone());
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn clones_share_registrations() {
        let hooks = Hooks::new();
        hooks.log("dropped without a logger");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        hooks.clone().set_logger(move |msg| sink.lock().unwrap().push(msg.to_string()));
        hooks.log("hello");
        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);

        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        hooks.set_progress(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        hooks.progress();
        hooks.progress();
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
