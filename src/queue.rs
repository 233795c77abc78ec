//! Очереди пула. Сами очереди ничего не блокируют: доступ к ним идет
//! только через `InputGuard` / `OutputGuard`, которые держат мьютекс пула.

use super::handle::{TaskRef, TaskSlot};
use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, MutexGuard, WaitTimeoutResult};
use std::{
    collections::VecDeque,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};


/// Две параллельные FIFO-последовательности: колбэки и входы.
///
/// Индекс `i` в одной всегда соответствует индексу `i` в другой,
/// любое удаление затрагивает обе сразу.
pub struct PairedQueue<I, O, C = ()> {
    tasks: VecDeque<TaskRef<I, O, C>>,
    inputs: VecDeque<I>,
}

impl<I, O, C> Default for PairedQueue<I, O, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O, C> PairedQueue<I, O, C> {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            inputs: VecDeque::new(),
        }
    }

    /// Только через пул: `add_input` еще будит воркера и считает задачу.
    pub(crate) fn push(&mut self, task: TaskRef<I, O, C>, input: I) {
        self.tasks.push_back(task);
        self.inputs.push_back(input);
        debug_assert_eq!(self.tasks.len(), self.inputs.len());
    }

    pub fn pop_front(&mut self) -> Option<TaskSlot<I, O, C>> {
        let task = self.tasks.pop_front()?;
        let input = self.inputs.pop_front()?;
        Some(TaskSlot::new(task, input))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(&TaskRef<I, O, C>, &I)> {
        Some((self.tasks.get(index)?, self.inputs.get(index)?))
    }

    #[inline]
    pub fn input_at(&self, index: usize) -> Option<&I> {
        self.inputs.get(index)
    }

    /// Вынимает пару по индексу и отдает ее вызывающему; сама очередь значение не освобождает.
    pub fn remove_at(&mut self, index: usize) -> Option<TaskSlot<I, O, C>> {
        if index >= self.len() {
            return None;
        }
        let task = self.tasks.remove(index)?;
        let input = self.inputs.remove(index)?;
        Some(TaskSlot::new(task, input))
    }

    /// Оставляет только пары, чей вход проходит `keep`. Возвращает вынутые входы по порядку.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<I>
    where
        F: FnMut(&I) -> bool,
    {
        let mut removed = Vec::new();
        let mut index = 0;
        while index < self.inputs.len() {
            if keep(&self.inputs[index]) {
                index += 1;
            } else if let Some(slot) = self.remove_at(index) {
                removed.push(slot.input);
            }
        }
        removed
    }

    /// Опустошает обе последовательности, возвращая входы вызывающему.
    pub fn drain(&mut self) -> Vec<I> {
        self.tasks.clear();
        self.inputs.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &I> + '_ {
        self.inputs.iter()
    }
}


/// FIFO результатов в порядке завершения задач.
pub struct ResultQueue<O> {
    outputs: VecDeque<O>,
}

impl<O> Default for ResultQueue<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> ResultQueue<O> {
    pub fn new() -> Self {
        Self {
            outputs: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, output: O) {
        self.outputs.push_back(output);
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<O> {
        self.outputs.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&O> {
        self.outputs.get(index)
    }

    pub fn remove_at(&mut self, index: usize) -> Option<O> {
        self.outputs.remove(index)
    }

    pub fn drain(&mut self) -> Vec<O> {
        self.outputs.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &O> + '_ {
        self.outputs.iter()
    }
}


/// Удерживаемый замок очереди входа.
///
/// Пока guard жив, воркеры не могут забрать задачу, так что "найти и отменить"
/// выполняется атомарно. При освобождении обновляет быструю подсказку о длине.
pub struct InputGuard<'a, I, O, C = ()> {
    queue: MutexGuard<'a, PairedQueue<I, O, C>>,
    hint: &'a CachePadded<AtomicUsize>,
}

impl<'a, I, O, C> InputGuard<'a, I, O, C> {
    pub(crate) fn new(
        queue: MutexGuard<'a, PairedQueue<I, O, C>>,
        hint: &'a CachePadded<AtomicUsize>,
    ) -> Self {
        Self { queue, hint }
    }

    pub(crate) fn wait_until(&mut self, cond: &Condvar, deadline: Instant) -> WaitTimeoutResult {
        cond.wait_until(&mut self.queue, deadline)
    }
}

impl<I, O, C> Deref for InputGuard<'_, I, O, C> {
    type Target = PairedQueue<I, O, C>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

impl<I, O, C> DerefMut for InputGuard<'_, I, O, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.queue
    }
}

impl<I, O, C> Drop for InputGuard<'_, I, O, C> {
    fn drop(&mut self) {
        self.hint.store(self.queue.len(), Ordering::Release);
    }
}


/// Удерживаемый замок очереди результатов.
pub struct OutputGuard<'a, O> {
    queue: MutexGuard<'a, ResultQueue<O>>,
    hint: &'a CachePadded<AtomicUsize>,
}

impl<'a, O> OutputGuard<'a, O> {
    pub(crate) fn new(
        queue: MutexGuard<'a, ResultQueue<O>>,
        hint: &'a CachePadded<AtomicUsize>,
    ) -> Self {
        Self { queue, hint }
    }

    pub(crate) fn wait_until(&mut self, cond: &Condvar, deadline: Instant) -> WaitTimeoutResult {
        cond.wait_until(&mut self.queue, deadline)
    }
}

impl<O> Deref for OutputGuard<'_, O> {
    type Target = ResultQueue<O>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

impl<O> DerefMut for OutputGuard<'_, O> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.queue
    }
}

impl<O> Drop for OutputGuard<'_, O> {
    fn drop(&mut self) {
        self.hint.store(self.queue.len(), Ordering::Release);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::task_ref;

    fn labelled(label: &'static str) -> TaskRef<u32, String> {
        task_ref(move |v: u32, _: &mut ()| Some(format!("{label}{v}")))
    }

    #[test]
    fn paired_queue_is_fifo() {
        let mut queue = PairedQueue::new();
        for v in 0..4 {
            queue.push(labelled("a"), v);
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_front())
            .map(|slot| slot.input)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn remove_at_keeps_pairs_aligned() {
        let mut queue = PairedQueue::new();
        queue.push(labelled("a"), 1);
        queue.push(labelled("b"), 2);
        queue.push(labelled("c"), 3);

        let removed = queue.remove_at(1).unwrap();
        assert_eq!(removed.input, 2);
        assert_eq!(queue.len(), 2);

        let (task, input) = queue.get(1).unwrap();
        assert_eq!(task.run(*input, &mut ()), Some("c3".to_string()));
        assert!(queue.remove_at(2).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn retain_removes_matching_inputs() {
        let mut queue = PairedQueue::new();
        for v in 0..6 {
            queue.push(labelled("x"), v);
        }
        let cancelled = queue.retain(|v| v % 2 == 0);
        assert_eq!(cancelled, vec![1, 3, 5]);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![0, 2, 4]);

        let (task, input) = queue.get(2).unwrap();
        assert_eq!(task.run(*input, &mut ()), Some("x4".to_string()));
    }

    #[test]
    fn result_queue_indexed_access() {
        let mut queue = ResultQueue::new();
        queue.push("first");
        queue.push("second");
        queue.push("third");

        assert_eq!(queue.get(2), Some(&"third"));
        assert_eq!(queue.remove_at(0), Some("first"));
        assert_eq!(queue.pop_front(), Some("second"));
        assert_eq!(queue.drain(), vec!["third"]);
        assert!(queue.is_empty());
    }
}
