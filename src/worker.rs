use super::{
    context::ContextHooks,
    errors::{panic_message, WorkerFailure},
    handle::TaskSlot,
    pool::Shared,
};
use crossbeam::channel::Sender;
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{atomic::Ordering, Arc},
    thread::{self, JoinHandle},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};


pub(crate) type ReadySender = Sender<Result<(), WorkerFailure>>;

pub(crate) fn spawn<I, O, C>(
    index: usize,
    shared: Arc<Shared<I, O, C>>,
    hooks: ContextHooks<C>,
    token: CancellationToken,
    ready: ReadySender,
) -> io::Result<JoinHandle<()>>
where
    I: Send + 'static,
    O: Send + 'static,
    C: 'static,
{
    let config = &shared.config;
    let mut builder = thread::Builder::new()
        .name(format!("{}-{}", config.thread_name_prefix, index));
    if let Some(size) = config.stack_size {
        builder = builder.stack_size(size);
    }
    builder.spawn(move || worker_loop(index, shared, hooks, token, ready))
}

/// Учитывает поток в `live`, пока жив. Снимается раньше контекста,
/// поэтому деструктор контекста выполняется уже после декремента.
struct LiveRegistration<'a, I, O, C> {
    shared: &'a Shared<I, O, C>,
}

impl<'a, I, O, C> LiveRegistration<'a, I, O, C> {
    fn enter(shared: &'a Shared<I, O, C>) -> Self {
        shared.run.lock().live += 1;
        shared.run_changed.notify_all();
        Self { shared }
    }
}

impl<I, O, C> Drop for LiveRegistration<'_, I, O, C> {
    fn drop(&mut self) {
        self.shared.run.lock().live -= 1;
        self.shared.run_changed.notify_all();
    }
}

fn worker_loop<I, O, C>(
    index: usize,
    shared: Arc<Shared<I, O, C>>,
    hooks: ContextHooks<C>,
    token: CancellationToken,
    ready: ReadySender,
) {
    let context = match hooks.create(index) {
        Ok(context) => context,
        Err(failure) => {
            let _ = ready.send(Err(failure));
            return;
        }
    };

    // `_live` живет только внутри scope: декремент раньше деструктора контекста.
    hooks.scope(context, |context| {
        let _live = LiveRegistration::enter(&shared);
        let _ = ready.send(Ok(()));
        drop(ready);

        debug!(worker = index, "worker started");

        loop {
            wait_for_input(&shared, &token);
            if token.is_cancelled() {
                break;
            }
            if !shared.has_input_fast() {
                continue;
            }

            // Пометка ставится до того, как вход покинет очередь: is_working не увидит "дыры".
            shared.working.fetch_add(1, Ordering::SeqCst);
            let slot = shared.lock_input().pop_front();
            if let Some(slot) = slot {
                execute(index, &shared, slot, context);
            }
            shared.working.fetch_sub(1, Ordering::SeqCst);
        }
    });

    debug!(worker = index, "worker exiting");
}

/// Ждет входа или отмены. Сначала дешевая подсказка без замка, затем
/// проверка под замком и ограниченный по времени сон на condvar.
fn wait_for_input<I, O, C>(shared: &Shared<I, O, C>, token: &CancellationToken) {
    if shared.has_input_fast() || token.is_cancelled() {
        return;
    }
    let deadline = Instant::now() + shared.config.idle_timeout;
    let mut queue = shared.lock_input();
    if queue.is_empty() && !token.is_cancelled() {
        let _ = queue.wait_until(&shared.input_ready, deadline);
    }
}

fn execute<I, O, C>(
    index: usize,
    shared: &Shared<I, O, C>,
    slot: TaskSlot<I, O, C>,
    context: &mut C,
) {
    trace!(worker = index, "running task");
    match panic::catch_unwind(AssertUnwindSafe(|| slot.invoke(context))) {
        Ok(output) => {
            // Счетчик растет до публикации: получивший результат видит его уже учтенным.
            shared.completed_tasks.fetch_add(1, Ordering::Relaxed);
            if let Some(output) = output {
                shared.publish(output);
            }
        }
        Err(payload) => {
            shared.failed_tasks.fetch_add(1, Ordering::Relaxed);
            error!(
                worker = index,
                panic = %panic_message(payload.as_ref()),
                "task panicked, output dropped"
            );
        }
    }
}
