use super::errors::{panic_message, WorkerFailure};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};


type Factory<C> = Arc<dyn Fn() -> C + Send + Sync>;
type Destructor<C> = Arc<dyn Fn(C) + Send + Sync>;

/// Как создать и как освободить контекст одного воркера.
///
/// Фабрика вызывается один раз на старте каждого потока, уже внутри этого потока,
/// поэтому сам `C` не обязан быть `Send`. Деструктор вызывается ровно один раз на выходе потока.
pub struct ContextHooks<C> {
    factory: Factory<C>,
    destructor: Option<Destructor<C>>,
}

impl<C> Clone for ContextHooks<C> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            destructor: self.destructor.clone(),
        }
    }
}

impl<C: Default + 'static> Default for ContextHooks<C> {
    fn default() -> Self {
        Self::new(C::default)
    }
}

impl<C> ContextHooks<C> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            destructor: None,
        }
    }

    pub fn with_destructor<D>(mut self, destructor: D) -> Self
    where
        D: Fn(C) + Send + Sync + 'static,
    {
        self.destructor = Some(Arc::new(destructor));
        self
    }

    /// Создает контекст для воркера `index`. Паника фабрики не уходит за пределы потока.
    pub(crate) fn create(&self, index: usize) -> Result<C, WorkerFailure> {
        let factory = Arc::clone(&self.factory);
        panic::catch_unwind(AssertUnwindSafe(|| factory())).map_err(|payload| WorkerFailure {
            index,
            message: panic_message(payload.as_ref()),
        })
    }

    /// Отдает контекст телу потока, затем ровно один раз освобождает его.
    /// Паника тела пробрасывается дальше уже после деструктора.
    pub(crate) fn scope<R>(&self, mut context: C, body: impl FnOnce(&mut C) -> R) -> R {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut context)));
        self.release(context);
        match outcome {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn release(&self, context: C) {
        match &self.destructor {
            Some(destructor) => destructor(context),
            None => drop(context),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hooks(destroyed: &Arc<AtomicUsize>) -> ContextHooks<Vec<u8>> {
        let counter = destroyed.clone();
        ContextHooks::new(|| vec![1u8, 2, 3]).with_destructor(move |ctx: Vec<u8>| {
            assert_eq!(ctx.len(), 4);
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn destructor_runs_once_after_scope() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let hooks = counting_hooks(&destroyed);

        let context = hooks.create(0).unwrap();
        let len = hooks.scope(context, |ctx| {
            ctx.push(4);
            ctx.len()
        });

        assert_eq!(len, 4);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destructor_runs_when_body_panics() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let hooks = counting_hooks(&destroyed);
        let prev = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        let context = hooks.create(1).unwrap();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            hooks.scope(context, |ctx| {
                ctx.push(4);
                panic!("body failed");
            })
        }));
        panic::set_hook(prev);

        assert!(result.is_err());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_hooks_build_default_context() {
        let hooks: ContextHooks<Vec<u8>> = ContextHooks::default();
        let context = hooks.create(0).unwrap();
        assert!(hooks.scope(context, |ctx| ctx.is_empty()));
    }

    #[test]
    fn factory_panic_becomes_failure() {
        let hooks: ContextHooks<u32> = ContextHooks::new(|| panic!("no database"));
        let prev = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let failure = hooks.create(5).err().unwrap();
        panic::set_hook(prev);

        assert_eq!(failure.index, 5);
        assert_eq!(failure.message, "no database");
    }
}
