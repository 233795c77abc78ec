//! Async-сторона потребителя: ожидание результатов без опроса в цикле.

use super::pool::WorkerPool;
use futures::stream::{self, Stream};
use tokio::time::Duration;


impl<I, O, C> WorkerPool<I, O, C>
where
    I: Send + 'static,
    O: Send + 'static,
    C: 'static,
{
    /// Ждет следующий результат. Не завершится, если результатов больше не будет.
    pub async fn next_output(&self) -> O {
        let shared = self.shared();
        loop {
            // Подписка оформляется до проверки очереди, иначе publish между
            // проверкой и await разбудит пустое место.
            let notified = shared.output_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(output) = self.try_get_output() {
                return output;
            }
            notified.await;
        }
    }

    pub async fn next_output_timeout(&self, timeout: Duration) -> Option<O> {
        tokio::time::timeout(timeout, self.next_output()).await.ok()
    }

    /// Бесконечный поток результатов в порядке их публикации.
    pub fn outputs(&self) -> impl Stream<Item = O> + '_ {
        stream::unfold(self, |pool| async move {
            let output = pool.next_output().await;
            Some((output, pool))
        })
    }

    /// Завершается, когда текущий запуск получил сигнал остановки.
    /// Для остановленного пула завершается сразу.
    pub async fn stopped(&self) {
        let token = self.shared().run.lock().token.clone();
        if let Some(token) = token {
            token.cancelled().await;
        }
    }
}
