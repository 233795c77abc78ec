//! Пул рабочих потоков для разгрузки однотипной работы (сериализация,
//! обработка пакетов на соединение) с отдельной очередью результатов.
//!
//! # Features
//! - Парная FIFO-очередь (колбэк, вход) и очередь результатов в порядке завершения
//! - Старт/стоп с откатом при ошибке запуска, повторный старт после стопа
//! - Контекст на воркер с гарантированным вызовом деструктора
//! - Быстрые (без замка) и точные (под замком) проверки состояния
//! - Ручная блокировка очередей для "найти и отменить"
//! - Async-ожидание результатов и поток результатов
//! - Метрики и перехват паник в задачах

pub mod context;
pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod queue;
pub mod stream;
mod worker;

pub use context::ContextHooks;
pub use errors::StartError;
pub use handle::{task_ref, Task, TaskRef, TaskSlot};
pub use model::{PoolMetrics, PoolState};
pub use pool::{Config, WorkerPool};
pub use queue::{InputGuard, OutputGuard, PairedQueue, ResultQueue};
