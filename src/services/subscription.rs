use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 实时订阅句柄
///
/// Delivers the current state as soon as the background task runs, then once
/// per observed change. After `unsubscribe` (or drop) returns, the callback
/// is never invoked again. The callback must not unsubscribe its own handle.
pub struct Subscription {
    active: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Follows `changes`, turning each observed value into a delivery with
    /// the async `resolve` step.
    pub fn spawn<T, V, R, Fut, C>(mut changes: watch::Receiver<T>, mut resolve: R, mut callback: C) -> Self
    where
        T: Clone + Send + Sync + 'static,
        V: Send + 'static,
        R: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = V> + Send,
        C: FnMut(V) + Send + 'static,
    {
        let active = Arc::new(Mutex::new(true));
        let flag = active.clone();

        let task = tokio::spawn(async move {
            loop {
                let current = changes.borrow_and_update().clone();
                let value = resolve(current).await;
                {
                    // 回调在锁内执行，取消订阅需等待当前回调结束
                    let guard = flag.lock();
                    if !*guard {
                        break;
                    }
                    callback(value);
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        Self {
            active,
            task: Some(task),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        *self.active.lock() = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
