use std::sync::Arc;


/// Колбэк, который воркер вызывает для одного входного значения.
///
/// `None` означает "результат не нужен": в очередь вывода ничего не попадает.
/// `context` принадлежит воркеру, на котором идет вызов, и живет столько же, сколько поток.
pub trait Task<I, O, C = ()>: Send + Sync {
    fn run(&self, input: I, context: &mut C) -> Option<O>;
}

impl<I, O, C, F> Task<I, O, C> for F
where
    F: Fn(I, &mut C) -> Option<O> + Send + Sync,
{
    #[inline]
    fn run(&self, input: I, context: &mut C) -> Option<O> {
        self(input, context)
    }
}

/// Разделяемая ссылка на колбэк: один и тот же колбэк можно отправлять многократно.
pub type TaskRef<I, O, C = ()> = Arc<dyn Task<I, O, C>>;

/// Упаковывает замыкание в `TaskRef`.
///
/// Через `Fn`-границу компилятор сам выводит сигнатуру замыкания, поэтому
/// `task_ref(|v: u32, _ctx: &mut ()| Some(v + 1))` не требует аннотаций результата.
pub fn task_ref<I, O, C, F>(f: F) -> TaskRef<I, O, C>
where
    F: Fn(I, &mut C) -> Option<O> + Send + Sync + 'static,
{
    Arc::new(f)
}


/// Ожидающая выполнения пара (колбэк, вход).
pub struct TaskSlot<I, O, C = ()> {
    pub task: TaskRef<I, O, C>,
    pub input: I,
}

impl<I, O, C> TaskSlot<I, O, C> {
    #[inline]
    pub fn new(task: TaskRef<I, O, C>, input: I) -> Self {
        Self { task, input }
    }

    /// Запускает колбэк, потребляя вход.
    #[inline]
    pub fn invoke(self, context: &mut C) -> Option<O> {
        self.task.run(self.input, context)
    }
}

impl<I: std::fmt::Debug, O, C> std::fmt::Debug for TaskSlot<I, O, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSlot").field("input", &self.input).finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    struct Scale(u64);

    impl Task<u64, u64, Vec<u64>> for Scale {
        fn run(&self, input: u64, seen: &mut Vec<u64>) -> Option<u64> {
            seen.push(input);
            Some(input * self.0)
        }
    }

    #[test]
    fn closures_and_structs_are_tasks() {
        let mut seen = Vec::new();
        let slot = TaskSlot::new(Arc::new(Scale(3)) as TaskRef<u64, u64, Vec<u64>>, 7);
        assert_eq!(slot.invoke(&mut seen), Some(21));
        assert_eq!(seen, vec![7]);

        let sink = task_ref(|_: u64, _: &mut ()| None::<u64>);
        assert_eq!(TaskSlot::new(sink, 1).invoke(&mut ()), None);
    }
}
