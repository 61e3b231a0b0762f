//! 有界并发执行
//!
//! JoinSet + Semaphore，带整体时间预算。结果按输入下标返回，
//! 预算耗尽时未完成的任务被取消，对应位置为 `None`。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{error, warn};

/// 并发执行任务
///
/// # 参数
/// * `items` - 输入
/// * `limit` - 最大并发数
/// * `budget` - 整体时间预算
/// * `task` - 为每个输入创建任务
///
/// # 返回
/// * 与输入等长，未完成的位置为 `None`
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    budget: Duration,
    mut task: F,
) -> Vec<Option<T>>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let deadline = Instant::now() + budget;
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();

    let total = items.len();
    for (index, item) in items.into_iter().enumerate() {
        let fut = task(item);
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            (index, fut.await)
        });
    }

    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    loop {
        match timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok((index, value)))) => results[index] = Some(value),
            Ok(Some(Err(e))) => error!("探测任务异常退出: {}", e),
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "运行时间预算 {}s 已用完，取消 {} 个未完成的任务",
                    budget.as_secs(),
                    set.len()
                );
                set.abort_all();
                break;
            }
        }
    }

    results
}
