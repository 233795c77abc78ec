/// Фаза жизненного цикла пула.
///
/// `Stopped → Starting → Running → Stopping → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}


#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub live_threads: usize,
    pub working_threads: usize,
    pub queued_inputs: usize,
    pub queued_outputs: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.live_threads == 0 {
            return 0.0;
        }
        self.working_threads as f64 / self.live_threads as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        self.queued_inputs as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }

    /// Сколько задач еще не дошло до конца: ждут в очереди или выполняются.
    /// Входы, снятые через `remove_input_at`, `retain` или `clear`, сюда не попадают.
    pub fn in_flight(&self) -> usize {
        self.queued_inputs + self.working_threads
    }
}
