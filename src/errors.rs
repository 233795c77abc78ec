use super::model::PoolState;
use thiserror::Error;


/// Почему `WorkerPool::try_start` не смог поднять воркеры.
///
/// Во всех случаях, кроме `NotStopped`, пул уже откатился обратно в `Stopped`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("pool is {0:?}, expected Stopped")]
    NotStopped(PoolState),

    #[error("thread count must be greater than zero")]
    ZeroThreads,

    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("context factory panicked on worker {index}: {message}")]
    ContextFactory {
        index: usize,
        message: String,
    },
}

/// Сообщение воркера стартующему потоку о том, что фабрика контекста упала.
#[derive(Debug, Clone)]
pub(crate) struct WorkerFailure {
    pub index: usize,
    pub message: String,
}

impl From<WorkerFailure> for StartError {
    fn from(failure: WorkerFailure) -> Self {
        StartError::ContextFactory {
            index: failure.index,
            message: failure.message,
        }
    }
}

/// Достает текст из payload паники (`&str` или `String`).
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
