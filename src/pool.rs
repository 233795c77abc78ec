use super::{
    context::ContextHooks,
    errors::StartError,
    handle::{Task, TaskRef},
    model::{PoolMetrics, PoolState},
    queue::{InputGuard, OutputGuard, PairedQueue, ResultQueue},
    worker,
};
use crossbeam::{channel, utils::CachePadded};
use parking_lot::{Condvar, Mutex};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};


/// Конфигурация пула потоков
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
    /// Верхняя граница сна простаивающего воркера перед повторной проверкой очереди.
    pub idle_timeout: Duration,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            idle_timeout: Duration::from_millis(100),
            stack_size: None,
            thread_name_prefix: "relay-worker".to_string(),
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            num_threads: num_cpus::get(),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            num_threads: num_cpus::get() * 2,
            idle_timeout: Duration::from_millis(250),
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}


pub(crate) struct RunState {
    pub state: PoolState,
    pub desired: usize,
    pub live: usize,
    /// Флаг работы текущего запуска; на каждый `start` создается новый токен.
    pub token: Option<CancellationToken>,
}

/// Все, что видят воркеры. Каждый ресурс под своим замком.
pub(crate) struct Shared<I, O, C> {
    input: Mutex<PairedQueue<I, O, C>>,
    input_hint: CachePadded<AtomicUsize>,
    pub(crate) input_ready: Condvar,

    output: Mutex<ResultQueue<O>>,
    output_hint: CachePadded<AtomicUsize>,
    output_ready: Condvar,
    pub(crate) output_notify: Notify,

    pub(crate) working: CachePadded<AtomicUsize>,

    pub(crate) run: Mutex<RunState>,
    pub(crate) run_changed: Condvar,

    pub(crate) total_submitted: AtomicUsize,
    pub(crate) completed_tasks: AtomicUsize,
    pub(crate) failed_tasks: AtomicUsize,

    pub(crate) config: Config,
}

impl<I, O, C> Shared<I, O, C> {
    fn new(config: Config) -> Self {
        Self {
            input: Mutex::new(PairedQueue::new()),
            input_hint: CachePadded::new(AtomicUsize::new(0)),
            input_ready: Condvar::new(),
            output: Mutex::new(ResultQueue::new()),
            output_hint: CachePadded::new(AtomicUsize::new(0)),
            output_ready: Condvar::new(),
            output_notify: Notify::new(),
            working: CachePadded::new(AtomicUsize::new(0)),
            run: Mutex::new(RunState {
                state: PoolState::Stopped,
                desired: 0,
                live: 0,
                token: None,
            }),
            run_changed: Condvar::new(),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
            config,
        }
    }

    #[inline]
    pub(crate) fn lock_input(&self) -> InputGuard<'_, I, O, C> {
        InputGuard::new(self.input.lock(), &self.input_hint)
    }

    #[inline]
    pub(crate) fn lock_output(&self) -> OutputGuard<'_, O> {
        OutputGuard::new(self.output.lock(), &self.output_hint)
    }

    #[inline]
    pub(crate) fn has_input_fast(&self) -> bool {
        self.input_hint.load(Ordering::Relaxed) != 0
    }

    #[inline]
    fn has_output_fast(&self) -> bool {
        self.output_hint.load(Ordering::Relaxed) != 0
    }

    /// Кладет результат и будит как блокирующих, так и async-потребителей.
    pub(crate) fn publish(&self, output: O) {
        self.lock_output().push(output);
        self.output_ready.notify_all();
        self.output_notify.notify_waiters();
    }

    /// Будит всех спящих воркеров. Замок берется, чтобы пробуждение не проскочило
    /// между проверкой флага воркером и его уходом в ожидание.
    fn wake_all_workers(&self) {
        let _queue = self.input.lock();
        self.input_ready.notify_all();
    }
}


/// Пул рабочих потоков с парной очередью входа и очередью результатов.
///
/// `I` — вход задачи, `O` — результат, `C` — контекст одного воркера.
/// Пул не владеет полезной нагрузкой сверх самих значений: все, что вынимается
/// из очередей (`get_output`, `remove_*_at`, `clear_*`), отдается вызывающему.
pub struct WorkerPool<I, O, C = ()> {
    shared: Arc<Shared<I, O, C>>,
    /// Сериализует start/stop и хранит хендлы потоков текущего запуска.
    lifecycle: Mutex<Vec<JoinHandle<()>>>,
}

impl<I, O, C> WorkerPool<I, O, C>
where
    I: Send + 'static,
    O: Send + 'static,
    C: 'static,
{
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
            lifecycle: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Запускает `threads` воркеров и ждет, пока все они поднимутся.
    ///
    /// Если хотя бы один воркер не стартовал, уже запущенные останавливаются,
    /// а пул остается в `Stopped`.
    pub fn try_start(&self, threads: usize, hooks: ContextHooks<C>) -> Result<(), StartError> {
        let Some(mut handles) = self.lifecycle.try_lock() else {
            return Err(StartError::NotStopped(self.state()));
        };

        let token = {
            let mut run = self.shared.run.lock();
            if run.state != PoolState::Stopped {
                return Err(StartError::NotStopped(run.state));
            }
            if threads == 0 {
                return Err(StartError::ZeroThreads);
            }
            let token = CancellationToken::new();
            run.state = PoolState::Starting;
            run.desired = threads;
            run.live = 0;
            run.token = Some(token.clone());
            token
        };
        self.shared.working.store(0, Ordering::SeqCst);

        debug!(threads, "starting worker pool");

        let (ready_tx, ready_rx) = channel::bounded(threads);
        let mut failure: Option<StartError> = None;
        for index in 0..threads {
            let spawned = worker::spawn(
                index,
                Arc::clone(&self.shared),
                hooks.clone(),
                token.clone(),
                ready_tx.clone(),
            );
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    failure = Some(StartError::Spawn { index, source });
                    break;
                }
            }
        }
        drop(ready_tx);

        // Каждый запущенный воркер присылает ровно одно сообщение: поднялся или нет.
        for _ in 0..handles.len() {
            match ready_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(worker_failure)) => {
                    if failure.is_none() {
                        failure = Some(worker_failure.into());
                    }
                }
                Err(_) => break,
            }
        }

        if let Some(err) = failure {
            warn!(error = %err, "worker pool failed to start, rolling back");
            self.shutdown(&mut handles);
            return Err(err);
        }

        self.shared.run.lock().state = PoolState::Running;
        info!(threads, "worker pool started");
        Ok(())
    }

    pub fn start_with_context(&self, threads: usize, hooks: ContextHooks<C>) -> bool {
        match self.try_start(threads, hooks) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "start rejected");
                false
            }
        }
    }

    /// Останавливает воркеры и ждет их выхода. Уже идущие вызовы колбэков доводятся до конца.
    ///
    /// Нельзя вызывать из колбэка этого же пула: поток будет ждать сам себя.
    pub fn stop(&self) {
        let mut handles = self.lifecycle.lock();
        self.shutdown(&mut handles);
    }

    pub fn add_input<T>(&self, task: T, input: I)
    where
        T: Task<I, O, C> + 'static,
    {
        self.add_input_shared(Arc::new(task), input);
    }

    pub fn add_input_shared(&self, task: TaskRef<I, O, C>, input: I) {
        self.shared.lock_input().push(task, input);
        self.shared.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.input_ready.notify_one();
    }

    /// Быстрая проверка без замка. Может врать; `true` стоит подтвердить через `has_input`.
    #[inline]
    pub fn has_input_fast(&self) -> bool {
        self.shared.has_input_fast()
    }

    pub fn has_input(&self) -> bool {
        !self.shared.lock_input().is_empty()
    }

    pub fn input_size(&self) -> usize {
        self.shared.lock_input().len()
    }

    pub fn get_input_at(&self, index: usize) -> Option<I>
    where
        I: Clone,
    {
        self.shared.lock_input().input_at(index).cloned()
    }

    /// Убирает задачу из очереди и возвращает ее вход, колбэк не вызывается.
    pub fn remove_input_at(&self, index: usize) -> Option<I> {
        self.shared.lock_input().remove_at(index).map(|slot| slot.input)
    }

    /// Держит очередь входа до конца жизни guard (аналог пары Lock/Unlock).
    ///
    /// Через guard можно смотреть и удалять, но не добавлять: новая задача
    /// идет только через `add_input`, который будит воркера.
    ///
    /// ```compile_fail
    /// use relay_pool::{task_ref, WorkerPool};
    ///
    /// let pool: WorkerPool<u32, u32> = WorkerPool::new();
    /// pool.lock_input().push(task_ref(|v: u32, _: &mut ()| Some(v)), 1);
    /// ```
    pub fn lock_input(&self) -> InputGuard<'_, I, O, C> {
        self.shared.lock_input()
    }

    #[inline]
    pub fn has_output_fast(&self) -> bool {
        self.shared.has_output_fast()
    }

    pub fn has_output(&self) -> bool {
        !self.shared.lock_output().is_empty()
    }

    pub fn output_size(&self) -> usize {
        self.shared.lock_output().len()
    }

    /// Вынимает самый старый результат.
    ///
    /// # Panics
    ///
    /// Если очередь результатов пуста. Сначала проверяйте `has_output`
    /// или пользуйтесь `try_get_output`.
    pub fn get_output(&self) -> O {
        match self.try_get_output() {
            Some(output) => output,
            None => panic!("get_output called on an empty output queue"),
        }
    }

    pub fn try_get_output(&self) -> Option<O> {
        self.shared.lock_output().pop_front()
    }

    /// Блокирующее ожидание результата не дольше `timeout`.
    pub fn wait_output(&self, timeout: Duration) -> Option<O> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.lock_output();
        loop {
            if let Some(output) = queue.pop_front() {
                return Some(output);
            }
            if queue.wait_until(&self.shared.output_ready, deadline).timed_out() {
                return queue.pop_front();
            }
        }
    }

    pub fn get_output_at(&self, index: usize) -> Option<O>
    where
        O: Clone,
    {
        self.shared.lock_output().get(index).cloned()
    }

    pub fn remove_output_at(&self, index: usize) -> Option<O> {
        self.shared.lock_output().remove_at(index)
    }

    pub fn lock_output(&self) -> OutputGuard<'_, O> {
        self.shared.lock_output()
    }

    /// Очищает обе очереди и возвращает их содержимое вызывающему.
    pub fn clear(&self) -> (Vec<I>, Vec<O>) {
        (self.clear_input(), self.clear_output())
    }

    pub fn clear_input(&self) -> Vec<I> {
        self.shared.lock_input().drain()
    }

    pub fn clear_output(&self) -> Vec<O> {
        self.shared.lock_output().drain()
    }

    /// Есть ли результат, ожидающий вход или воркер посреди колбэка.
    ///
    /// Порядок проверок важен: воркер сначала помечает себя работающим и только
    /// потом забирает вход, а результат публикует до снятия пометки. Поэтому
    /// проверка счетчика последней не пропускает задачу "в пути".
    pub fn is_working(&self) -> bool {
        if self.has_output_fast() && self.has_output() {
            return true;
        }
        if self.has_input_fast() && self.has_input() {
            return true;
        }
        self.num_threads_working() != 0
    }

    #[inline]
    pub fn num_threads_working(&self) -> usize {
        self.shared.working.load(Ordering::SeqCst)
    }

    /// `true` только между успешным `start` и началом `stop`.
    pub fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    pub fn state(&self) -> PoolState {
        self.shared.run.lock().state
    }

    pub fn live_threads(&self) -> usize {
        self.shared.run.lock().live
    }

    /// Сколько воркеров запрошено текущим запуском (0 для остановленного пула).
    pub fn desired_threads(&self) -> usize {
        self.shared.run.lock().desired
    }

    pub fn metrics(&self) -> PoolMetrics {
        let live_threads = self.live_threads();
        PoolMetrics {
            live_threads,
            working_threads: self.num_threads_working(),
            queued_inputs: self.input_size(),
            queued_outputs: self.output_size(),
            total_submitted: self.shared.total_submitted.load(Ordering::Relaxed),
            completed_tasks: self.shared.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.shared.failed_tasks.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn shared(&self) -> &Shared<I, O, C> {
        &self.shared
    }
}

impl<I, O, C> WorkerPool<I, O, C>
where
    I: Send + 'static,
    O: Send + 'static,
    C: Default + 'static,
{
    pub fn start(&self, threads: usize) -> bool {
        self.start_with_context(threads, ContextHooks::default())
    }

    pub fn start_default(&self) -> bool {
        self.start(self.shared.config.num_threads)
    }
}

impl<I, O, C> Default for WorkerPool<I, O, C>
where
    I: Send + 'static,
    O: Send + 'static,
    C: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O, C> WorkerPool<I, O, C> {
    fn shutdown(&self, handles: &mut Vec<JoinHandle<()>>) {
        let token = {
            let mut run = self.shared.run.lock();
            if run.state == PoolState::Stopped {
                return;
            }
            run.state = PoolState::Stopping;
            run.token.clone()
        };

        if let Some(token) = token {
            token.cancel();
        }
        self.shared.wake_all_workers();

        {
            let mut run = self.shared.run.lock();
            while run.live > 0 {
                self.shared.run_changed.wait(&mut run);
            }
        }

        let threads = handles.len();
        for handle in handles.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread terminated by panic");
            }
        }

        let mut run = self.shared.run.lock();
        run.state = PoolState::Stopped;
        run.desired = 0;
        run.token = None;
        info!(threads, "worker pool stopped");
    }
}

impl<I, O, C> Drop for WorkerPool<I, O, C> {
    fn drop(&mut self) {
        let mut handles = std::mem::take(self.lifecycle.get_mut());
        self.shutdown(&mut handles);
        self.shared.lock_input().drain();
        self.shared.lock_output().drain();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_presets_scale_with_cpus() {
        let cpus = num_cpus::get();
        assert_eq!(Config::cpu_bound().num_threads, cpus);
        assert_eq!(Config::io_bound().num_threads, cpus * 2);

        let config = Config::default()
            .with_threads(3)
            .with_stack_size(256 * 1024)
            .with_thread_name_prefix("codec");
        assert_eq!(config.num_threads, 3);
        assert_eq!(config.stack_size, Some(256 * 1024));
        assert_eq!(config.thread_name_prefix, "codec");
    }

    #[test]
    fn fast_hints_follow_guards() {
        let pool: WorkerPool<u32, u32> = WorkerPool::new();
        assert!(!pool.has_input_fast());
        pool.add_input(|v: u32, _: &mut ()| Some(v), 1);
        assert!(pool.has_input_fast());
        assert_eq!(pool.clear_input(), vec![1]);
        assert!(!pool.has_input_fast());
    }
}
