use futures::StreamExt;
use relay_pool::{task_ref, Config, ContextHooks, WorkerPool};
use std::time::Instant;
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;


/// Буфер сериализации, переиспользуемый одним воркером между задачами.
#[derive(Default)]
struct Scratch {
    buf: Vec<u8>,
    encoded: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let pool: WorkerPool<u32, (u32, usize), Scratch> =
        WorkerPool::with_config(Config::cpu_bound().with_thread_name_prefix("encoder"));

    let hooks = ContextHooks::default().with_destructor(|scratch: Scratch| {
        tracing::info!(encoded = scratch.encoded, "worker scratch released");
    });
    if !pool.start_with_context(pool.config().num_threads, hooks) {
        eprintln!("pool failed to start");
        return;
    }

    let encode = task_ref(|id: u32, scratch: &mut Scratch| {
        scratch.buf.clear();
        scratch.buf.extend_from_slice(&id.to_le_bytes());
        scratch.buf.extend(std::iter::repeat(0xAB).take((id % 64) as usize));
        scratch.encoded += 1;
        Some((id, scratch.buf.len()))
    });

    const PACKETS: usize = 100_000;
    let now = Instant::now();
    for id in 0..PACKETS as u32 {
        pool.add_input_shared(encode.clone(), id);
    }

    let total_bytes = rt.block_on(async {
        pool.outputs()
            .take(PACKETS)
            .fold(0usize, |acc, (_, len)| async move { acc + len })
            .await
    });

    let metrics = pool.metrics();
    pool.stop();
    println!(
        "encoded {} packets ({} bytes) in {:?}, success rate {:.1}%",
        metrics.completed_tasks,
        total_bytes,
        now.elapsed(),
        metrics.success_rate() * 100.0
    );
}
